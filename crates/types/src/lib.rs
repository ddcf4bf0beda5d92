//! Foundational types for the paysim simulators.
//!
//! This crate provides the vocabulary shared by the head and tail protocol
//! models:
//!
//! - [`DelayedComp`]: a pure result bundled with its modelled CPU cost
//! - [`TxRef`]: opaque 32-byte content-addressed transaction reference
//! - [`Tx`] / [`MockTx`]: the transaction abstraction and its mock instance
//! - modelled signatures in [`crypto`] (single and aggregate, all costed)
//! - snapshots in [`snap`]
//! - [`Region`] and the region-pair latency table
//!
//! Everything here is deterministic and free of I/O; virtual-time costs are
//! data, charged by the simulation driver.

mod delay;
mod hash;
mod region;
pub mod crypto;
pub mod snap;
pub mod tx;

pub use delay::DelayedComp;
pub use hash::TxRef;
pub use region::{latency, Region};
pub use snap::{Snap, SnapN, TxRecord};
pub use tx::{MockTx, Tx, TxIn};

/// Slot number type.
pub type Slot = u64;

/// Head protocol party / routing address. Also the party index into the
/// verification-key list.
pub type NodeId = u32;

/// Tail protocol client identifier. Client ids start at 1; 0 is the server.
pub type ClientId = u32;

/// Amount moved by a payment, in the model's abstract unit.
pub type Amount = i64;
