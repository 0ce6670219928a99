//! Outbound side of the engine
//!
//! The engine never moves bytes itself. Whatever carries steps between
//! participants (a relay, a peer-to-peer mesh, a test harness) implements
//! `Transport`.

use crate::history::Step;

/// Callbacks the engine needs from its host
pub trait Transport {
    /// Broadcast a locally authored step. Best effort.
    fn send_step(&mut self, step: &Step);

    /// Ask for a full snapshot; the host answers with `reset_and_sync`
    fn request_resynchronization(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_step(&mut self, step: &Step) {
        (**self).send_step(step)
    }

    fn request_resynchronization(&mut self) {
        (**self).request_resynchronization()
    }
}

/// Transport that only remembers what it was asked to do
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Vec<Step>,
    resync_requests: usize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps sent so far, oldest first
    pub fn sent(&self) -> &[Step] {
        &self.sent
    }

    /// Drain the outbox
    pub fn take_sent(&mut self) -> Vec<Step> {
        std::mem::take(&mut self.sent)
    }

    /// How many times a resynchronization was requested
    pub fn resync_requests(&self) -> usize {
        self.resync_requests
    }
}

impl Transport for RecordingTransport {
    fn send_step(&mut self, step: &Step) {
        self.sent.push(step.clone());
    }

    fn request_resynchronization(&mut self) {
        self.resync_requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::StepId;
    use crate::selection::SelectionSnapshot;
    use crate::tree::Oid;

    #[test]
    fn test_recording_transport() {
        let mut transport = RecordingTransport::new();
        let step = Step::new(
            "c1".to_string(),
            StepId::init(),
            SelectionSnapshot::collapsed(Oid::root(), 0),
            Vec::new(),
        );
        transport.send_step(&step);
        transport.request_resynchronization();

        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.resync_requests(), 1);
        assert_eq!(transport.take_sent(), vec![step]);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_boxed_transport() {
        let mut boxed: Box<dyn Transport> = Box::new(RecordingTransport::new());
        boxed.request_resynchronization();
    }
}
