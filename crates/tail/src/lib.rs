//! Tail protocol: a many-client/one-server mailbox model.
//!
//! Clients walk a pre-generated event tape, submitting payments to a
//! central broker over bandwidth-modelled links. The server fans each
//! payment out to its recipients, storing deliveries for offline clients in
//! per-client mailboxes and parking deliveries involving blocked clients
//! until settlement finishes. Clients carry a payment window; leaving it
//! forces a synchronous settlement stall.
//!
//! The crate also houses tape generation ([`generate_tape`]), the CSV tape
//! format, and the offline trace analysis.

mod analysis;
mod client;
mod config;
mod driver;
mod events;
mod server;
mod tape_csv;

pub use analysis::{analyze, TailReport};
pub use client::{Balance, Next, StepOutput, TailClient};
pub use config::{ClientOptions, PrepareOptions, RunOptions, ServerOptions};
pub use driver::TailSimulation;
pub use events::{default_recipients, generate_tape, step_client};
pub use server::{Conn, ServerOutput, TailServer, CLIENT_LOOKUP_COST};
pub use tape_csv::{load_tape, read_tape, save_tape, write_tape, TapeError};
