/// Mutation Recorder
///
/// Collects the records produced by local edits into one batch per user
/// action. The document feeds every successfully applied record through
/// `record`; replaying history must not look like new local edits, so the
/// reconciler suppresses the recorder for the duration of any apply/revert.
use super::MutationRecord;

/// Batches local mutations (and their live inverses) between `take` calls
#[derive(Debug, Clone, Default)]
pub struct MutationRecorder {
    forward: Vec<MutationRecord>,
    inverse: Vec<MutationRecord>,
    suppressed: u32,
}

impl MutationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one applied mutation. Ignored while suppressed.
    pub fn record(&mut self, forward: MutationRecord, inverse: MutationRecord) {
        if self.is_suppressed() {
            return;
        }
        self.forward.push(forward);
        self.inverse.push(inverse);
    }

    /// Stop observing. Nests: each call needs a matching `resume`.
    pub fn suppress(&mut self) {
        self.suppressed += 1;
    }

    pub fn resume(&mut self) {
        self.suppressed = self.suppressed.saturating_sub(1);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed > 0
    }

    /// Records observed since the last `take`
    pub fn pending(&self) -> &[MutationRecord] {
        &self.forward
    }

    /// Number of pending records
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Drain the batch: forward records and their inverses, both in
    /// application order
    pub fn take(&mut self) -> (Vec<MutationRecord>, Vec<MutationRecord>) {
        (
            std::mem::take(&mut self.forward),
            std::mem::take(&mut self.inverse),
        )
    }

    /// Forget records past `len` (used when a batch is rolled back)
    pub(crate) fn truncate(&mut self, len: usize) {
        self.forward.truncate(len);
        self.inverse.truncate(len);
    }
}
