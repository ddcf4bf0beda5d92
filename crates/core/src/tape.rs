//! Client input tapes.

use crate::message::ClientMsg;
use paysim_types::{ClientId, MockTx, Slot};

/// One entry of the deterministic client-input tape.
///
/// Tapes only ever contain `Pull` and `NewTx` messages; the remaining
/// `ClientMsg` variants are produced by the client state machine itself
/// (connection management, settlement control) or by the server (acks and
/// notifications).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeEvent {
    pub slot: Slot,
    pub client: ClientId,
    pub msg: ClientMsg<MockTx>,
}

impl TapeEvent {
    pub fn new(slot: Slot, client: ClientId, msg: ClientMsg<MockTx>) -> Self {
        Self { slot, client, msg }
    }
}
