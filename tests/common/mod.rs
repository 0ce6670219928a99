//! In-memory network for multi-participant tests
//!
//! Every participant uses a `RecordingTransport`. The network collects each
//! participant's outbox into a per-author log and tracks, per (author,
//! receiver) pair, how much of that log was delivered. Delivery preserves
//! each author's own order.

#![allow(dead_code)]

use std::collections::BTreeMap;
use stepsync_core::sync::Reconciliation;
use stepsync_core::{EngineConfig, Oid, Participant, RecordingTransport, Snapshot, Step};

pub type Peer = Participant<RecordingTransport>;

pub struct Network {
    pub peers: BTreeMap<String, Peer>,
    logs: BTreeMap<String, Vec<Step>>,
    delivered: BTreeMap<(String, String), usize>,
}

impl Network {
    /// Participants `ids`, all bootstrapped from the same fixture
    pub fn from_markup(markup: &str, ids: &[&str]) -> Self {
        let snapshot = Snapshot::from_markup(markup, "div").unwrap();
        let peers = ids
            .iter()
            .map(|id| {
                let peer = Participant::from_snapshot(EngineConfig::new(*id), RecordingTransport::new(), &snapshot)
                    .unwrap();
                (id.to_string(), peer)
            })
            .collect();
        Self {
            peers,
            logs: BTreeMap::new(),
            delivered: BTreeMap::new(),
        }
    }

    pub fn peer(&mut self, id: &str) -> &mut Peer {
        self.peers.get_mut(id).unwrap()
    }

    pub fn get(&self, id: &str) -> &Peer {
        &self.peers[id]
    }

    /// Move everything `id` sent into its log
    fn collect(&mut self, id: &str) {
        let sent = self.peer(id).transport_mut().take_sent();
        self.logs.entry(id.to_string()).or_default().extend(sent);
    }

    /// Steps authored by `id` so far
    pub fn log(&mut self, id: &str) -> Vec<Step> {
        self.collect(id);
        self.logs.get(id).cloned().unwrap_or_default()
    }

    /// Next undelivered step from `from` to `to`, without delivering it
    pub fn peek(&mut self, from: &str, to: &str) -> Option<Step> {
        self.collect(from);
        let index = self
            .delivered
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(0);
        self.logs.get(from)?.get(index).cloned()
    }

    /// Deliver the next step only if `to` already holds its parent
    pub fn deliver_causal(&mut self, from: &str, to: &str) -> Option<Reconciliation> {
        let step = self.peek(from, to)?;
        if !self.get(to).history().contains(&step.previous) {
            return None;
        }
        self.deliver_one(from, to)
    }

    /// Deliver causally until nothing moves
    pub fn quiesce(&mut self) {
        let ids: Vec<String> = self.peers.keys().cloned().collect();
        loop {
            let mut progress = false;
            for from in &ids {
                for to in &ids {
                    if from != to && self.deliver_causal(from, to).is_some() {
                        progress = true;
                    }
                }
            }
            if !progress {
                break;
            }
        }
    }

    /// Deliver the next undelivered step from `from` to `to`
    pub fn deliver_one(&mut self, from: &str, to: &str) -> Option<Reconciliation> {
        self.collect(from);
        let key = (from.to_string(), to.to_string());
        let index = self.delivered.get(&key).copied().unwrap_or(0);
        let step = self.logs.get(from)?.get(index)?.clone();
        self.delivered.insert(key, index + 1);
        Some(self.peer(to).on_incoming_step(step))
    }

    /// Deliver everything pending from `from` to `to`
    pub fn deliver(&mut self, from: &str, to: &str) -> Vec<Reconciliation> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.deliver_one(from, to) {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Deliver everything to everyone, in participant order
    pub fn sync_all(&mut self) {
        let ids: Vec<String> = self.peers.keys().cloned().collect();
        // a delivery can never produce new local steps, so one pass suffices
        for from in &ids {
            for to in &ids {
                if from != to {
                    self.deliver(from, to);
                }
            }
        }
    }

    /// Whether every participant holds the same tree and history
    pub fn assert_converged(&self) {
        let mut peers = self.peers.values();
        let Some(first) = peers.next() else {
            return;
        };
        let json = first.document().to_json().unwrap();
        let history: Vec<String> = first.history().step_ids().iter().map(|id| id.to_string()).collect();
        let walk: Vec<Oid> = first.document().walk().into_iter().map(|n| n.oid().clone()).collect();
        for peer in peers {
            assert_eq!(peer.document().to_json().unwrap(), json, "tree of {}", peer.id());
            let other: Vec<String> = peer.history().step_ids().iter().map(|id| id.to_string()).collect();
            assert_eq!(other, history, "history of {}", peer.id());
            let other_walk: Vec<Oid> = peer.document().walk().into_iter().map(|n| n.oid().clone()).collect();
            assert_eq!(other_walk, walk, "oid walk of {}", peer.id());
        }
    }
}
