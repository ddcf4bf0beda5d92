//! paysim CLI
//!
//! Prepare deterministic client tapes and run the tail or head simulators.
//!
//! # Examples
//!
//! ```bash
//! # Generate a 60-slot tape for 20 clients
//! paysim prepare --clients 20 --duration 60 --seed 42 --output tape.csv
//!
//! # Run the tail simulation over it
//! paysim run --tape tape.csv --clients 20 --settlement-delay 10
//!
//! # Run a small head protocol exchange
//! paysim head --parties 3
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use paysim_head::{genesis_output, HeadOptions, HeadSimulation};
use paysim_tail::{
    generate_tape, load_tape, save_tape, ClientOptions, PrepareOptions, RunOptions, ServerOptions,
    TailSimulation,
};
use paysim_types::{MockTx, Region};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Hard stop for simulation runs; generous next to any realistic tape.
const HORIZON: Duration = Duration::from_secs(86_400);

#[derive(Parser, Debug)]
#[command(name = "paysim")]
#[command(version, about = "Off-chain payment network simulators", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a client event tape as CSV.
    Prepare {
        /// Number of clients
        #[arg(short, long, default_value = "10")]
        clients: u32,

        /// Tape length in slots
        #[arg(short, long, default_value = "60")]
        duration: u64,

        /// Probability (0..1) that a client is online in a slot
        #[arg(long, default_value = "0.5")]
        online_likelihood: f64,

        /// Probability (0..1) that an online client submits a payment
        #[arg(long, default_value = "0.35")]
        submit_likelihood: f64,

        /// Random seed. When omitted, a random seed is used.
        #[arg(long)]
        seed: Option<u64>,

        /// Output path
        #[arg(short, long, default_value = "tape.csv")]
        output: PathBuf,
    },

    /// Run the tail simulation over a tape and report throughput.
    Run {
        /// Tape CSV path
        #[arg(short, long, default_value = "tape.csv")]
        tape: PathBuf,

        /// Number of clients the tape was generated for
        #[arg(short, long, default_value = "10")]
        clients: u32,

        /// Slot length in seconds
        #[arg(long, default_value = "1.0")]
        slot_length: f64,

        /// Settlement stall length in slots
        #[arg(long, default_value = "10")]
        settlement_delay: u64,

        /// Payment window lower bound (requires --window-upper)
        #[arg(long, requires = "window_upper", allow_hyphen_values = true)]
        window_lower: Option<i64>,

        /// Payment window upper bound (requires --window-lower)
        #[arg(long, requires = "window_lower")]
        window_upper: Option<i64>,

        /// Server region
        #[arg(long, default_value = "frankfurt")]
        region: String,

        /// Server outbound capacity, bytes per second
        #[arg(long, default_value = "12500000")]
        write_capacity: u64,

        /// Server inbound capacity, bytes per second
        #[arg(long, default_value = "12500000")]
        read_capacity: u64,

        /// Server handler loops
        #[arg(long, default_value = "16")]
        concurrency: usize,
    },

    /// Run a small head protocol exchange and report confirmed state.
    Head {
        /// Number of parties
        #[arg(short, long, default_value = "3")]
        parties: u32,
    },
}

fn parse_region(name: &str) -> Result<Region> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "frankfurt" => Region::FrankfurtAWS,
        "ireland" => Region::IrelandAWS,
        "london" => Region::LondonAWS,
        "ncalifornia" | "california" => Region::NCaliforniaAWS,
        "tokyo" => Region::TokyoAWS,
        other => bail!("unknown region `{other}`"),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Args::parse().command {
        Command::Prepare {
            clients,
            duration,
            online_likelihood,
            submit_likelihood,
            seed,
            output,
        } => {
            let seed = seed.unwrap_or_else(rand::random);
            let opts = PrepareOptions {
                number_of_clients: clients,
                duration,
                client_options: ClientOptions {
                    online_likelihood,
                    submit_likelihood,
                },
            };
            info!(clients, duration, seed, "preparing tape");
            let tape = generate_tape(&opts, seed);
            save_tape(&output, &tape).with_context(|| format!("writing {}", output.display()))?;
            println!("{} events -> {}", tape.len(), output.display());
        }

        Command::Run {
            tape,
            clients,
            slot_length,
            settlement_delay,
            window_lower,
            window_upper,
            region,
            write_capacity,
            read_capacity,
            concurrency,
        } => {
            let events =
                load_tape(&tape).with_context(|| format!("reading {}", tape.display()))?;
            let opts = RunOptions {
                slot_length: Duration::from_secs_f64(slot_length),
                settlement_delay,
                payment_window: window_lower.zip(window_upper),
                server: ServerOptions {
                    region: parse_region(&region)?,
                    write_capacity,
                    read_capacity,
                    concurrency,
                },
                ..RunOptions::default()
            };
            let mut sim = TailSimulation::new(events, clients, opts);
            sim.run_until(HORIZON)?;
            sim.report().print_summary();
        }

        Command::Head { parties } => {
            let mut sim: HeadSimulation<MockTx> = HeadSimulation::new(HeadOptions {
                parties,
                ..HeadOptions::default()
            });
            for node in 0..parties {
                let tx = MockTx::with_utxo(
                    node,
                    0,
                    10,
                    256,
                    BTreeSet::from([genesis_output(node)]),
                    1,
                );
                sim.submit(node, Duration::ZERO, tx);
            }
            sim.run_until(HORIZON);
            sim.request_snapshot(0, sim.now());
            sim.run_until(HORIZON);
            sim.check_invariants();

            let stats = sim.stats();
            println!();
            println!("==================== HEAD SIMULATION =====================");
            println!("Parties:            {parties}");
            println!("Events processed:   {}", stats.events_processed);
            println!("Invalid events:     {}", stats.invalid);
            println!("Virtual end time:   {:.3}s", sim.now().as_secs_f64());
            for node in sim.nodes() {
                let state = node.state();
                println!(
                    "Node {}: snapshot {} confirmed, {} txs pending, {} utxos",
                    node.id(),
                    state.snap_n_conf.0,
                    state.txs_conf.len(),
                    state.utxo_conf.len(),
                );
            }
            println!("==========================================================");
        }
    }
    Ok(())
}
