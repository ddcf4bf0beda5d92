//! Client event generation.
//!
//! Each client owns one seeded RNG walked slot by slot; replaying the same
//! seed reproduces the same tape. Amounts and sizes come from fixed
//! frequency tables measured on real payment traffic.

use crate::config::{ClientOptions, PrepareOptions};
use paysim_core::{ClientMsg, TapeEvent};
use paysim_types::{Amount, ClientId, MockTx, Slot};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// Payment amount frequency table: `(weight, decade)`.
const AMOUNT_FREQ: [(u32, (Amount, Amount)); 6] = [
    (122, (1, 10)),
    (144, (10, 100)),
    (143, (100, 1_000)),
    (92, (1_000, 10_000)),
    (41, (10_000, 100_000)),
    (12, (100_000, 1_000_000)),
];

/// Transaction size frequency table: `(weight, byte range)`.
const SIZE_FREQ: [(u32, (u64, u64)); 6] = [
    (318, (192, 512)),
    (129, (512, 1_024)),
    (37, (1_024, 2_048)),
    (12, (2_048, 4_096)),
    (43, (4_096, 8_192)),
    (17, (8_192, 16_384)),
];

fn draw_weighted<T: Copy>(rng: &mut ChaCha8Rng, table: &[(u32, (T, T))]) -> (T, T) {
    let total: u32 = table.iter().map(|(w, _)| w).sum();
    let mut roll = rng.gen_range(0..total);
    for (weight, range) in table {
        if roll < *weight {
            return *range;
        }
        roll -= weight;
    }
    unreachable!("weights are exhaustive")
}

fn draw_amount(rng: &mut ChaCha8Rng) -> Amount {
    let (lo, hi) = draw_weighted(rng, &AMOUNT_FREQ);
    rng.gen_range(lo..hi)
}

fn draw_size(rng: &mut ChaCha8Rng) -> u64 {
    let (lo, hi) = draw_weighted(rng, &SIZE_FREQ);
    rng.gen_range(lo..hi)
}

/// The default recipient oracle: the next client id, wrapping past the
/// last client and never targeting the server.
pub fn default_recipients(client: ClientId, n_clients: u32) -> Vec<ClientId> {
    vec![((client + 1) % (n_clients + 1)).max(1)]
}

/// Generate one client's events for one slot.
///
/// Both likelihood draws happen every slot, so the RNG stream stays aligned
/// whether or not the client acts. An online client pulls; if it also
/// submits, the `NewTx` follows the `Pull`.
pub fn step_client(
    client: ClientId,
    slot: Slot,
    rng: &mut ChaCha8Rng,
    opts: &ClientOptions,
    recipients: impl Fn(ClientId) -> Vec<ClientId>,
) -> Vec<TapeEvent> {
    let p_online: u32 = rng.gen_range(1..=100);
    let p_submit: u32 = rng.gen_range(1..=100);
    let online = p_online as f64 <= opts.online_likelihood * 100.0;
    let submits = online && p_submit as f64 <= opts.submit_likelihood * 100.0;

    let mut events = Vec::new();
    if online {
        events.push(TapeEvent::new(slot, client, ClientMsg::Pull));
    }
    if submits {
        let amount = draw_amount(rng);
        let size = draw_size(rng);
        events.push(TapeEvent::new(
            slot,
            client,
            ClientMsg::NewTx {
                tx: MockTx::new(client, slot, amount, size),
                recipients: recipients(client),
            },
        ));
    }
    events
}

/// Generate the full tape for `opts`, ordered by slot then client id.
pub fn generate_tape(opts: &PrepareOptions, seed: u64) -> Vec<TapeEvent> {
    let n = opts.number_of_clients;
    let mut rngs: Vec<ChaCha8Rng> = (1..=n)
        .map(|client| {
            let stream = seed
                .wrapping_add(client as u64)
                .wrapping_mul(0x517c_c1b7_2722_0a95);
            ChaCha8Rng::seed_from_u64(stream)
        })
        .collect();

    let mut tape = Vec::new();
    for slot in 0..opts.duration {
        for client in 1..=n {
            tape.extend(step_client(
                client,
                slot,
                &mut rngs[(client - 1) as usize],
                &opts.client_options,
                |c| default_recipients(c, n),
            ));
        }
    }
    info!(
        clients = n,
        slots = opts.duration,
        events = tape.len(),
        seed,
        "generated client tape"
    );
    tape
}
