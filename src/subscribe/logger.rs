//! Trace logging for events sent on a subscription.

use crate::stream::Event;
use tracing::trace;

/// Traces the end of the snapshot, then every event after it.
#[derive(Debug, Default)]
pub(crate) struct EventLogger {
    snapshot_done: bool,
    /// Records sent so far.
    count: u64,
}

impl EventLogger {
    pub(crate) fn trace(&mut self, event: &Event) {
        if event.is_sentinel() {
            self.snapshot_done = true;
            trace!(index = event.index, sent = self.count, "snapshot complete");
            return;
        }
        if self.snapshot_done {
            trace!(
                index = event.index,
                sent = self.count,
                batch_size = event.len(),
                "sending events"
            );
        }
        self.count += event.len() as u64;
    }
}
