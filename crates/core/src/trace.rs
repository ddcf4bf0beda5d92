//! Trace event taxonomy.
//!
//! The simulation appends `(source, virtual time, event)` entries to an
//! in-memory stream; the tail analysis folds over it offline. Entries are
//! recorded in scheduling order, so two runs with the same inputs and seed
//! produce identical streams.

use crate::message::MsgKind;
use paysim_types::{ClientId, NodeId, Slot, SnapN, TxRef};
use std::time::Duration;

/// Which task produced a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceSource {
    /// The tail server.
    Server,
    /// A tail client.
    Client(ClientId),
    /// A head protocol node.
    Node(NodeId),
}

/// Events traced by head nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadTrace {
    /// A transaction gained its aggregate signature.
    TxConfirmed { txref: TxRef },
    /// A snapshot gained its aggregate signature.
    SnapConfirmed { n: SnapN },
    /// An event was rejected as structurally inconsistent.
    InvalidTransition { reason: String },
}

/// Events traced by the tail server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTrace {
    /// A delivery for an offline client was appended to its mailbox.
    StoreInMailbox {
        client: ClientId,
        kind: MsgKind,
        mailbox_len: usize,
    },
    /// A `NewTx` was parked on the sender's queue because a recipient is
    /// blocked.
    Parked { sender: ClientId, queue_len: usize },
    /// A client's parked messages were pushed back into the inbox.
    Drained { client: ClientId, count: usize },
}

/// Events traced by tail clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientTrace {
    /// The client reconnected to submit events for `slot`.
    WakeUp { slot: Slot },
}

/// Events traced by multiplexer endpoints.
///
/// Leading events mark the start of a bandwidth charge, trailing events its
/// completion; the analysis sums leading sizes for usage and watches
/// trailing kinds for confirmations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxTrace {
    SendLeading { bytes: u64 },
    SendTrailing,
    RecvLeading { bytes: u64 },
    RecvTrailing { kind: &'static str },
}

/// A trace event from any task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Head(HeadTrace),
    Server(ServerTrace),
    Client(ClientTrace),
    Mux(MuxTrace),
}

/// One entry of the recorded stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub time: Duration,
    pub source: TraceSource,
    pub event: TraceEvent,
}
