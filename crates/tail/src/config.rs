//! Simulation configuration.

use paysim_types::{Amount, Region};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-client behaviour knobs for tape generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Probability (0..1) that a client is online in a given slot.
    pub online_likelihood: f64,
    /// Probability (0..1) that an online client also submits a payment.
    pub submit_likelihood: f64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            online_likelihood: 0.5,
            submit_likelihood: 0.35,
        }
    }
}

/// Options for generating a client event tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareOptions {
    pub number_of_clients: u32,
    /// Tape length in slots.
    pub duration: u64,
    pub client_options: ClientOptions,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            number_of_clients: 10,
            duration: 60,
            client_options: ClientOptions::default(),
        }
    }
}

/// Server placement and capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOptions {
    pub region: Region,
    /// Outbound capacity in bytes per second.
    pub write_capacity: u64,
    /// Inbound capacity in bytes per second.
    pub read_capacity: u64,
    /// Number of handler loops competing for the registry. Handler bodies
    /// hold the registry exclusively, so modelled time is governed by that
    /// lock regardless of this value.
    pub concurrency: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            region: Region::FrankfurtAWS,
            write_capacity: 12_500_000,
            read_capacity: 12_500_000,
            concurrency: 16,
        }
    }
}

/// Options for running the tail simulation over a tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    pub slot_length: Duration,
    /// Settlement stall length, in slots.
    pub settlement_delay: u64,
    /// Payment window `(lower, upper)` around the initial balance; `None`
    /// disables settlement stalls.
    pub payment_window: Option<(Amount, Amount)>,
    pub server: ServerOptions,
    /// Client regions, cycled when there are more clients than entries.
    pub client_regions: Vec<Region>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            slot_length: Duration::from_secs(1),
            settlement_delay: 10,
            payment_window: None,
            server: ServerOptions::default(),
            client_regions: Region::ALL.to_vec(),
        }
    }
}
