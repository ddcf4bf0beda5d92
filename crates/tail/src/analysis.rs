//! Offline trace analysis: throughput and network usage.

use paysim_core::{ClientTrace, MuxTrace, TraceEntry, TraceEvent, TraceSource};
use paysim_types::Slot;
use std::time::Duration;
use tracing::info;

/// Folded metrics of one tail run.
#[derive(Debug, Clone, PartialEq)]
pub struct TailReport {
    /// Number of acknowledged submissions.
    pub confirmed_txs: u64,
    /// Bytes entering the server, as observed at its read side.
    pub read_usage: u64,
    /// Bytes leaving the server, as observed at its write side.
    pub write_usage: u64,
    /// Virtual time of the last confirmation.
    pub last_tx_time: Duration,
    /// Simulated duration in slots.
    pub last_slot: Slot,
    /// Wall of one slot.
    pub slot_length: Duration,
}

impl TailReport {
    /// Confirmations per second over the whole simulated window.
    pub fn max_throughput(&self) -> f64 {
        let window = self.last_slot as f64 * self.slot_length.as_secs_f64();
        if window == 0.0 {
            return 0.0;
        }
        self.confirmed_txs as f64 / window
    }

    /// Confirmations per second up to the last confirmation.
    pub fn actual_throughput(&self) -> f64 {
        self.confirmed_txs as f64 / (1.0 + self.last_tx_time.as_secs_f64())
    }

    fn kbps(&self, bytes: u64) -> f64 {
        let window = self.last_slot as f64 * self.slot_length.as_secs_f64();
        if window == 0.0 {
            return 0.0;
        }
        bytes as f64 * 8.0 / 1024.0 / window
    }

    /// Server inbound usage in kbit/s of simulated time.
    pub fn read_kbps(&self) -> f64 {
        self.kbps(self.read_usage)
    }

    /// Server outbound usage in kbit/s of simulated time.
    pub fn write_kbps(&self) -> f64 {
        self.kbps(self.write_usage)
    }

    /// Print a human-readable summary.
    pub fn print_summary(&self) {
        println!();
        println!("==================== TAIL SIMULATION =====================");
        println!("Confirmed Txs:      {}", self.confirmed_txs);
        println!(
            "Duration:           {} slots of {:.2}s",
            self.last_slot,
            self.slot_length.as_secs_f64()
        );
        println!("Max Throughput:     {:.2} tx/s", self.max_throughput());
        println!("Actual Throughput:  {:.2} tx/s", self.actual_throughput());
        println!("Server Read:        {:.2} kbit/s", self.read_kbps());
        println!("Server Write:       {:.2} kbit/s", self.write_kbps());
        println!("==========================================================");
    }
}

/// Fold the trace stream into a [`TailReport`].
pub fn analyze(trace: &[TraceEntry], last_slot: Slot, slot_length: Duration) -> TailReport {
    let mut report = TailReport {
        confirmed_txs: 0,
        read_usage: 0,
        write_usage: 0,
        last_tx_time: Duration::ZERO,
        last_slot,
        slot_length,
    };
    let mut current_slot: Option<Slot> = None;

    for entry in trace {
        match (&entry.source, &entry.event) {
            (TraceSource::Client(_), TraceEvent::Mux(MuxTrace::RecvTrailing { kind })) => {
                if *kind == "AckTx" {
                    report.confirmed_txs += 1;
                    report.last_tx_time = report.last_tx_time.max(entry.time);
                }
            }
            (TraceSource::Server, TraceEvent::Mux(MuxTrace::RecvLeading { bytes })) => {
                report.read_usage += bytes;
            }
            (TraceSource::Server, TraceEvent::Mux(MuxTrace::SendLeading { bytes })) => {
                report.write_usage += bytes;
            }
            (TraceSource::Client(_), TraceEvent::Client(ClientTrace::WakeUp { slot })) => {
                if current_slot.map_or(true, |s| *slot > s) {
                    info!(slot, confirmed = report.confirmed_txs, "slot progress");
                    current_slot = Some(*slot);
                }
            }
            _ => {}
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time_ms: u64, source: TraceSource, event: TraceEvent) -> TraceEntry {
        TraceEntry {
            time: Duration::from_millis(time_ms),
            source,
            event,
        }
    }

    #[test]
    fn counts_acks_and_usage() {
        let trace = vec![
            entry(
                5,
                TraceSource::Server,
                TraceEvent::Mux(MuxTrace::RecvLeading { bytes: 300 }),
            ),
            entry(
                7,
                TraceSource::Server,
                TraceEvent::Mux(MuxTrace::SendLeading { bytes: 32 }),
            ),
            entry(
                9,
                TraceSource::Client(1),
                TraceEvent::Mux(MuxTrace::RecvTrailing { kind: "AckTx" }),
            ),
            // A notify delivery is not a confirmation.
            entry(
                11,
                TraceSource::Client(2),
                TraceEvent::Mux(MuxTrace::RecvTrailing { kind: "NotifyTx" }),
            ),
        ];
        let report = analyze(&trace, 10, Duration::from_secs(1));
        assert_eq!(report.confirmed_txs, 1);
        assert_eq!(report.read_usage, 300);
        assert_eq!(report.write_usage, 32);
        assert_eq!(report.last_tx_time, Duration::from_millis(9));
        assert!((report.max_throughput() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn server_bytes_do_not_count_client_side() {
        let trace = vec![entry(
            1,
            TraceSource::Client(1),
            TraceEvent::Mux(MuxTrace::RecvLeading { bytes: 1_000 }),
        )];
        let report = analyze(&trace, 1, Duration::from_secs(1));
        assert_eq!(report.read_usage, 0);
    }

    #[test]
    fn usage_is_reported_in_kbit_per_second() {
        let trace = vec![entry(
            0,
            TraceSource::Server,
            TraceEvent::Mux(MuxTrace::RecvLeading { bytes: 1_024 }),
        )];
        let report = analyze(&trace, 8, Duration::from_secs(1));
        // 1024 bytes = 8 kbit over 8 seconds = 1 kbit/s.
        assert!((report.read_kbps() - 1.0).abs() < 1e-9);
    }
}
