//! Core protocol vocabularies for the paysim simulators.
//!
//! This crate defines the event and message types both protocol models are
//! written against:
//!
//! - [`HeadEvent`]: inputs to the head node state machine
//! - [`Decision`] / [`Outgoing`]: outputs of the head transition function
//! - [`ClientMsg`]: the tail client/server message set
//! - [`TapeEvent`]: entries of the deterministic client-input tape
//! - trace taxonomy consumed by the offline analysis
//! - [`SimError`]: fatal simulation errors
//!
//! The state machines themselves live in `paysim-head` and `paysim-tail`;
//! the deterministic substrate that drives them lives in
//! `paysim-simulation`.

mod decision;
mod error;
mod message;
mod tape;
mod trace;

pub use decision::{Decision, Outgoing};
pub use error::SimError;
pub use message::{ClientMsg, HeadEvent, MsgKind, WireMessage};
pub use message::{ADDR_BYTES, AGG_SIG_BYTES, SIG_BYTES, SNAPN_BYTES, TXREF_BYTES, TX_HEAD_BYTES};
pub use tape::TapeEvent;
pub use trace::{ClientTrace, HeadTrace, MuxTrace, ServerTrace, TraceEntry, TraceEvent, TraceSource};
