//! Protocol message sets and the wire-size model.

use paysim_types::crypto::{AggSignature, Signature};
use paysim_types::{ClientId, SnapN, Tx, TxRef};

/// Wire overhead of a transaction body (length header).
pub const TX_HEAD_BYTES: u64 = 2;
/// Wire size of one recipient address.
pub const ADDR_BYTES: u64 = 57;
/// Wire size of a transaction reference.
pub const TXREF_BYTES: u64 = 32;
/// Wire size of a single signature.
pub const SIG_BYTES: u64 = 64;
/// Wire size of an aggregate signature.
pub const AGG_SIG_BYTES: u64 = 128;
/// Wire size of a snapshot number.
pub const SNAPN_BYTES: u64 = 8;

/// Anything the multiplexer can carry: it has a modelled wire size and a
/// stable kind label for traces.
pub trait WireMessage {
    /// Modelled size in bytes. Connection and snapshot control messages are
    /// zero-sized.
    fn wire_size(&self) -> u64;

    /// Message kind label for traces and telemetry.
    fn kind(&self) -> &'static str;
}

/// Message kinds of the tail protocol, used in traces and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgKind {
    NewTx,
    Pull,
    Connect,
    Disconnect,
    SnapshotStart,
    SnapshotEnd,
    AckTx,
    NotifyTx,
}

impl std::fmt::Display for MsgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Tail protocol messages, flowing both client→server and server→client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMsg<T> {
    /// Submit a payment to be fanned out to `recipients`.
    NewTx { tx: T, recipients: Vec<ClientId> },
    /// Ask the server to flush this client's mailbox.
    Pull,
    Connect,
    Disconnect,
    /// Client enters synchronous settlement; server must hold deliveries.
    SnapshotStart,
    /// Settlement finished; parked messages are retried.
    SnapshotEnd,
    /// Server confirmation of a submitted payment.
    AckTx { txref: TxRef },
    /// Server fan-out of a payment to one of its recipients.
    NotifyTx { tx: T },
}

impl<T> ClientMsg<T> {
    pub fn msg_kind(&self) -> MsgKind {
        match self {
            ClientMsg::NewTx { .. } => MsgKind::NewTx,
            ClientMsg::Pull => MsgKind::Pull,
            ClientMsg::Connect => MsgKind::Connect,
            ClientMsg::Disconnect => MsgKind::Disconnect,
            ClientMsg::SnapshotStart => MsgKind::SnapshotStart,
            ClientMsg::SnapshotEnd => MsgKind::SnapshotEnd,
            ClientMsg::AckTx { .. } => MsgKind::AckTx,
            ClientMsg::NotifyTx { .. } => MsgKind::NotifyTx,
        }
    }
}

impl<T: Tx> WireMessage for ClientMsg<T> {
    fn wire_size(&self) -> u64 {
        match self {
            ClientMsg::NewTx { tx, recipients } => {
                TX_HEAD_BYTES + tx.size() + ADDR_BYTES * recipients.len() as u64
            }
            ClientMsg::NotifyTx { tx } => TX_HEAD_BYTES + tx.size(),
            ClientMsg::AckTx { .. } => TXREF_BYTES,
            ClientMsg::Pull
            | ClientMsg::Connect
            | ClientMsg::Disconnect
            | ClientMsg::SnapshotStart
            | ClientMsg::SnapshotEnd => 0,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ClientMsg::NewTx { .. } => "NewTx",
            ClientMsg::Pull => "Pull",
            ClientMsg::Connect => "Connect",
            ClientMsg::Disconnect => "Disconnect",
            ClientMsg::SnapshotStart => "SnapshotStart",
            ClientMsg::SnapshotEnd => "SnapshotEnd",
            ClientMsg::AckTx { .. } => "AckTx",
            ClientMsg::NotifyTx { .. } => "NotifyTx",
        }
    }
}

/// Inputs to the head node state machine.
///
/// `New` and `NewSn` are local client events; the rest arrive from peers
/// over the multiplexer. Signing acknowledgements flow back to the issuer
/// (resp. the snapshot leader), confirmations are multicast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadEvent<T> {
    /// Local client submits a new transaction.
    New { tx: T },
    /// Local trigger: seal the next snapshot (leader only).
    NewSn,
    /// Request to sign a transaction.
    SigReqTx { tx: T },
    /// A party's signature over a transaction, sent to the issuer.
    SigAckTx { txref: TxRef, sig: Signature },
    /// Aggregate confirmation of a transaction.
    SigConfTx { txref: TxRef, agg: AggSignature },
    /// Request to sign snapshot `n` covering `included`.
    SigReqSn { n: SnapN, included: Vec<TxRef> },
    /// A party's signature over snapshot `n`, sent to the leader.
    SigAckSn { n: SnapN, sig: Signature },
    /// Aggregate confirmation of snapshot `n`.
    SigConfSn { n: SnapN, agg: AggSignature },
}

impl<T: Tx> WireMessage for HeadEvent<T> {
    fn wire_size(&self) -> u64 {
        match self {
            HeadEvent::New { tx } | HeadEvent::SigReqTx { tx } => TX_HEAD_BYTES + tx.size(),
            HeadEvent::NewSn => 0,
            HeadEvent::SigAckTx { .. } => TXREF_BYTES + SIG_BYTES,
            HeadEvent::SigConfTx { .. } => TXREF_BYTES + AGG_SIG_BYTES,
            HeadEvent::SigReqSn { included, .. } => {
                SNAPN_BYTES + TXREF_BYTES * included.len() as u64
            }
            HeadEvent::SigAckSn { .. } => SNAPN_BYTES + SIG_BYTES,
            HeadEvent::SigConfSn { .. } => SNAPN_BYTES + AGG_SIG_BYTES,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            HeadEvent::New { .. } => "New",
            HeadEvent::NewSn => "NewSn",
            HeadEvent::SigReqTx { .. } => "SigReqTx",
            HeadEvent::SigAckTx { .. } => "SigAckTx",
            HeadEvent::SigConfTx { .. } => "SigConfTx",
            HeadEvent::SigReqSn { .. } => "SigReqSn",
            HeadEvent::SigAckSn { .. } => "SigAckSn",
            HeadEvent::SigConfSn { .. } => "SigConfSn",
        }
    }
}
