//! Append-only trace recorder.

use paysim_core::{TraceEntry, TraceEvent, TraceSource};
use std::time::Duration;

/// Records the simulation's trace stream.
///
/// Entries are appended in driver order, which is deterministic, so equal
/// inputs and seed reproduce the stream bit for bit. The recorder never
/// drops entries; analysis is an offline fold over [`entries`](Self::entries).
#[derive(Debug, Default)]
pub struct TraceRecorder {
    entries: Vec<TraceEntry>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry at the given virtual time.
    pub fn record(&mut self, time: Duration, source: TraceSource, event: TraceEvent) {
        tracing::trace!(?time, ?source, ?event, "trace");
        self.entries.push(TraceEntry {
            time,
            source,
            event,
        });
    }

    /// The recorded stream, in append order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Consume the recorder, returning the stream.
    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysim_core::ClientTrace;

    #[test]
    fn records_in_append_order() {
        let mut rec = TraceRecorder::new();
        rec.record(
            Duration::from_millis(2),
            TraceSource::Client(1),
            TraceEvent::Client(ClientTrace::WakeUp { slot: 4 }),
        );
        rec.record(
            Duration::from_millis(1),
            TraceSource::Client(2),
            TraceEvent::Client(ClientTrace::WakeUp { slot: 5 }),
        );
        let entries = rec.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, TraceSource::Client(1));
        assert_eq!(entries[1].source, TraceSource::Client(2));
    }
}
