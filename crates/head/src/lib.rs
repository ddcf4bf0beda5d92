//! Head protocol: concurrent multi-party transaction signing with
//! aggregate-signature snapshots.
//!
//! Every party runs the same deterministic state machine ([`HeadNode`]).
//! Transactions are signed by all parties through explicit
//! request/acknowledge/confirm rounds; the designated leader periodically
//! seals a snapshot of the confirmed state, which goes through the same
//! three-phase signing. [`HeadSimulation`] wires `n` nodes over
//! bandwidth-modelled links and runs the whole exchange in virtual time.

mod driver;
mod state;

pub use driver::{genesis_output, HeadOptions, HeadSimulation, HeadStats};
pub use state::{leader_mod_n, HeadNode, HeadState, LeaderFn};
