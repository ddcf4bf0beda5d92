//! Bandwidth- and latency-modelled point-to-point messaging.
//!
//! A [`MuxNet`] owns a set of labelled endpoints and the links between
//! them. Each endpoint has separate write and read byte-per-second
//! capacities and bounded in-flight windows; each link has a one-way
//! latency. Transmissions are serialised per endpoint, so a message of size
//! `s` sent at `t` becomes visible to the peer at
//!
//! ```text
//! read_end(max(write_end(max(t, write cursor)) + latency, read cursor))
//! ```
//!
//! where `write_end`/`read_end` add `s / capacity`. Full windows push the
//! start time out instead of dropping: producers block, bytes are never
//! lost.
//!
//! [`send`](MuxNet::send) only accounts the transfer; the driver keeps the
//! message in its event queue and hands it back through
//! [`deliver`](MuxNet::deliver) when the returned [`Delivery`] fires, so an
//! endpoint's inbox never shows a message before its read completed.

use crate::trace::TraceRecorder;
use paysim_core::{MuxTrace, TraceEvent, TraceSource, WireMessage};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Index of an endpoint within a [`MuxNet`].
pub type EndpointId = u32;

/// Static description of one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Trace source the endpoint's transfers are attributed to.
    pub source: TraceSource,
    /// Outbound capacity in bytes per second.
    pub write_capacity: u64,
    /// Inbound capacity in bytes per second.
    pub read_capacity: u64,
    /// Maximum in-flight outbound messages before senders block.
    pub out_buffer: usize,
    /// Maximum in-flight inbound messages before reads block.
    pub in_buffer: usize,
}

#[derive(Debug)]
struct Endpoint<M> {
    cfg: EndpointConfig,
    /// Instant the write side is free again.
    write_cursor: Duration,
    /// Instant the read side is free again.
    read_cursor: Duration,
    /// Completion times of in-flight writes, oldest first (monotone).
    out_window: VecDeque<Duration>,
    /// Completion times of in-flight reads, oldest first (monotone).
    in_window: VecDeque<Duration>,
    /// Messages visible to the owner, oldest first, with their sender.
    inbox: VecDeque<(EndpointId, M)>,
}

/// A scheduled arrival: wake the owner of `to` at `at` and hand the message
/// back through [`MuxNet::deliver`].
#[derive(Debug, Clone, Copy)]
pub struct Delivery {
    pub to: EndpointId,
    pub at: Duration,
}

/// The set of endpoints and links of one simulation.
#[derive(Debug)]
pub struct MuxNet<M> {
    endpoints: Vec<Endpoint<M>>,
    /// One-way latency per directed link.
    links: HashMap<(EndpointId, EndpointId), Duration>,
}

impl<M: WireMessage> MuxNet<M> {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            links: HashMap::new(),
        }
    }

    /// Register an endpoint, returning its id.
    pub fn add_endpoint(&mut self, cfg: EndpointConfig) -> EndpointId {
        let id = self.endpoints.len() as EndpointId;
        self.endpoints.push(Endpoint {
            cfg,
            write_cursor: Duration::ZERO,
            read_cursor: Duration::ZERO,
            out_window: VecDeque::new(),
            in_window: VecDeque::new(),
            inbox: VecDeque::new(),
        });
        id
    }

    /// Install a bidirectional link with the given one-way latency.
    pub fn connect(&mut self, a: EndpointId, b: EndpointId, latency: Duration) {
        self.links.insert((a, b), latency);
        self.links.insert((b, a), latency);
    }

    fn latency(&self, from: EndpointId, to: EndpointId) -> Duration {
        *self
            .links
            .get(&(from, to))
            .unwrap_or_else(|| panic!("no link {from} -> {to}"))
    }

    /// Account the transmission of `msg` from `from` to `to`, starting no
    /// earlier than `now`.
    ///
    /// Charges the sender's write capacity, the link latency, and the
    /// receiver's read capacity; records the four leading/trailing trace
    /// events. The message itself stays with the caller: schedule a wake at
    /// the returned time and pass it to [`deliver`](Self::deliver) there.
    pub fn send(
        &mut self,
        now: Duration,
        from: EndpointId,
        to: EndpointId,
        msg: &M,
        trace: &mut TraceRecorder,
    ) -> Delivery {
        let bytes = msg.wire_size();
        let latency = self.latency(from, to);

        // Write side: serialised, bounded window.
        let sender = &mut self.endpoints[from as usize];
        while sender.out_window.front().is_some_and(|&t| t <= now) {
            sender.out_window.pop_front();
        }
        let mut write_start = now.max(sender.write_cursor);
        if sender.out_window.len() >= sender.cfg.out_buffer {
            let idx = sender.out_window.len() - sender.cfg.out_buffer;
            write_start = write_start.max(sender.out_window[idx]);
        }
        let write_end = write_start + transfer_time(bytes, sender.cfg.write_capacity);
        sender.write_cursor = write_end;
        sender.out_window.push_back(write_end);
        let sender_source = sender.cfg.source;
        trace.record(
            write_start,
            sender_source,
            TraceEvent::Mux(MuxTrace::SendLeading { bytes }),
        );
        trace.record(
            write_end,
            sender_source,
            TraceEvent::Mux(MuxTrace::SendTrailing),
        );

        let arrival = write_end + latency;

        // Read side: serialised, bounded window.
        let receiver = &mut self.endpoints[to as usize];
        while receiver.in_window.front().is_some_and(|&t| t <= arrival) {
            receiver.in_window.pop_front();
        }
        let mut read_start = arrival.max(receiver.read_cursor);
        if receiver.in_window.len() >= receiver.cfg.in_buffer {
            let idx = receiver.in_window.len() - receiver.cfg.in_buffer;
            read_start = read_start.max(receiver.in_window[idx]);
        }
        let read_end = read_start + transfer_time(bytes, receiver.cfg.read_capacity);
        receiver.read_cursor = read_end;
        receiver.in_window.push_back(read_end);
        let receiver_source = receiver.cfg.source;
        trace.record(
            read_start,
            receiver_source,
            TraceEvent::Mux(MuxTrace::RecvLeading { bytes }),
        );
        trace.record(
            read_end,
            receiver_source,
            TraceEvent::Mux(MuxTrace::RecvTrailing { kind: msg.kind() }),
        );

        tracing::trace!(from, to, bytes, ?read_end, "transfer accounted");
        Delivery { to, at: read_end }
    }

    /// Append an arrived (or locally injected) message to an endpoint's
    /// inbox. Bandwidth was accounted at [`send`](Self::send) time, if ever.
    pub fn deliver(&mut self, ep: EndpointId, from: EndpointId, msg: M) {
        self.endpoints[ep as usize].inbox.push_back((from, msg));
    }

    /// Pop the oldest visible message from an endpoint's inbox.
    pub fn recv(&mut self, ep: EndpointId) -> Option<(EndpointId, M)> {
        self.endpoints[ep as usize].inbox.pop_front()
    }

    /// Put a message back at the *front* of an endpoint's inbox without
    /// charging bandwidth. Used to retry deliveries that could not be
    /// processed; the caller schedules the matching wake itself.
    pub fn reenqueue(&mut self, ep: EndpointId, from: EndpointId, msg: M) {
        self.endpoints[ep as usize].inbox.push_front((from, msg));
    }

    /// Number of messages currently visible to an endpoint.
    pub fn inbox_len(&self, ep: EndpointId) -> usize {
        self.endpoints[ep as usize].inbox.len()
    }
}

impl<M: WireMessage> Default for MuxNet<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Time to move `bytes` at `capacity` bytes/second. Zero-byte control
/// messages and unlimited capacity both transfer instantly.
fn transfer_time(bytes: u64, capacity: u64) -> Duration {
    if bytes == 0 || capacity == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(bytes as f64 / capacity as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Frame(u64);

    impl WireMessage for Frame {
        fn wire_size(&self) -> u64 {
            self.0
        }
        fn kind(&self) -> &'static str {
            "Frame"
        }
    }

    fn two_endpoint_net(write: u64, read: u64) -> (MuxNet<Frame>, EndpointId, EndpointId) {
        let mut net = MuxNet::new();
        let a = net.add_endpoint(EndpointConfig {
            source: TraceSource::Client(1),
            write_capacity: write,
            read_capacity: read,
            out_buffer: 1_000,
            in_buffer: 1_000,
        });
        let b = net.add_endpoint(EndpointConfig {
            source: TraceSource::Server,
            write_capacity: write,
            read_capacity: read,
            out_buffer: 1_000,
            in_buffer: 1_000,
        });
        net.connect(a, b, Duration::from_millis(10));
        (net, a, b)
    }

    #[test]
    fn charges_write_latency_and_read() {
        let (mut net, a, b) = two_endpoint_net(1_000, 2_000);
        let mut trace = TraceRecorder::new();

        // 100 bytes: 100ms write at 1kB/s, 10ms latency, 50ms read at 2kB/s.
        let delivery = net.send(Duration::ZERO, a, b, &Frame(100), &mut trace);
        assert_eq!(delivery.to, b);
        assert_eq!(delivery.at, Duration::from_millis(160));
    }

    #[test]
    fn writes_serialise_per_endpoint() {
        let (mut net, a, b) = two_endpoint_net(1_000, 1_000_000);
        let mut trace = TraceRecorder::new();

        let d1 = net.send(Duration::ZERO, a, b, &Frame(100), &mut trace);
        let d2 = net.send(Duration::ZERO, a, b, &Frame(100), &mut trace);
        // Second write starts only after the first completes.
        assert!(d2.at >= d1.at + Duration::from_millis(100));
    }

    #[test]
    fn deliveries_keep_fifo_order_per_link() {
        let (mut net, a, b) = two_endpoint_net(1_000, 1_000);
        let mut trace = TraceRecorder::new();
        let d1 = net.send(Duration::ZERO, a, b, &Frame(1), &mut trace);
        let d2 = net.send(Duration::ZERO, a, b, &Frame(2), &mut trace);
        assert!(d1.at <= d2.at);

        net.deliver(b, a, Frame(1));
        net.deliver(b, a, Frame(2));
        assert_eq!(net.recv(b).unwrap().1 .0, 1);
        assert_eq!(net.recv(b).unwrap().1 .0, 2);
    }

    #[test]
    fn reenqueue_goes_to_front_without_charges() {
        let (mut net, a, b) = two_endpoint_net(1_000, 1_000);
        let mut trace = TraceRecorder::new();
        net.deliver(b, a, Frame(1));
        net.deliver(b, a, Frame(2));

        let (from, first) = net.recv(b).unwrap();
        let traced = trace.entries().len();
        net.reenqueue(b, from, first);
        assert_eq!(trace.entries().len(), traced, "reenqueue must not trace");
        assert_eq!(net.recv(b).unwrap().1 .0, 1, "front of the queue");
        assert_eq!(net.recv(b).unwrap().1 .0, 2);
    }

    #[test]
    fn full_out_window_blocks_instead_of_dropping() {
        let mut net: MuxNet<Frame> = MuxNet::new();
        let a = net.add_endpoint(EndpointConfig {
            source: TraceSource::Client(1),
            write_capacity: 1_000,
            read_capacity: 1_000_000,
            out_buffer: 2,
            in_buffer: 1_000,
        });
        let b = net.add_endpoint(EndpointConfig {
            source: TraceSource::Server,
            write_capacity: 1_000,
            read_capacity: 1_000_000,
            out_buffer: 2,
            in_buffer: 1_000,
        });
        net.connect(a, b, Duration::ZERO);
        let mut trace = TraceRecorder::new();

        // Three 100-byte sends with a window of two: the third must wait
        // for the first write slot to free (at 100ms), starting at 200ms.
        let mut deliveries = Vec::new();
        for _ in 0..3 {
            deliveries.push(net.send(Duration::ZERO, a, b, &Frame(100), &mut trace));
        }
        let send_leads: Vec<Duration> = trace
            .entries()
            .iter()
            .filter(|e| matches!(e.event, TraceEvent::Mux(MuxTrace::SendLeading { .. })))
            .map(|e| e.time)
            .collect();
        assert_eq!(send_leads[2], Duration::from_millis(200));
        assert_eq!(deliveries.len(), 3, "nothing dropped");
    }

    #[test]
    fn bytes_are_conserved_between_peers() {
        let (mut net, a, b) = two_endpoint_net(10_000, 10_000);
        let mut trace = TraceRecorder::new();
        for size in [10u64, 200, 57, 32] {
            net.send(Duration::ZERO, a, b, &Frame(size), &mut trace);
        }
        let sent: u64 = trace
            .entries()
            .iter()
            .filter(|e| e.source == TraceSource::Client(1))
            .filter_map(|e| match e.event {
                TraceEvent::Mux(MuxTrace::SendLeading { bytes }) => Some(bytes),
                _ => None,
            })
            .sum();
        let received: u64 = trace
            .entries()
            .iter()
            .filter(|e| e.source == TraceSource::Server)
            .filter_map(|e| match e.event {
                TraceEvent::Mux(MuxTrace::RecvLeading { bytes }) => Some(bytes),
                _ => None,
            })
            .sum();
        assert_eq!(sent, received);
        assert_eq!(sent, 299);
    }

    #[test]
    fn zero_size_control_messages_only_pay_latency() {
        let (mut net, a, b) = two_endpoint_net(1_000, 1_000);
        let mut trace = TraceRecorder::new();
        let d = net.send(Duration::from_millis(5), a, b, &Frame(0), &mut trace);
        assert_eq!(d.at, Duration::from_millis(15));
    }
}
