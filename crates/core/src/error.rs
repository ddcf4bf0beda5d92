//! Fatal simulation errors.

use crate::message::MsgKind;
use paysim_types::ClientId;

/// Errors that terminate a simulation run.
///
/// Protocol-invalid head events are *not* errors; they are traced and
/// dropped. These variants cover structural faults: a task received a
/// message its protocol role can never handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The tail server received a message outside its protocol.
    #[error("server received unexpected {kind} from client {client}")]
    UnexpectedServerMsg { client: ClientId, kind: MsgKind },

    /// A tail client received a message outside its protocol.
    #[error("client {client} received unexpected {kind}")]
    UnexpectedClientMsg { client: ClientId, kind: MsgKind },

    /// The tail server was handed a message for a client it never
    /// registered.
    #[error("unknown client {client}")]
    UnknownClient { client: ClientId },
}
