//! Geographic regions and the modelled inter-region latency table.

use std::time::Duration;

/// Datacenter regions nodes and the tail server can be placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Region {
    FrankfurtAWS,
    IrelandAWS,
    LondonAWS,
    NCaliforniaAWS,
    TokyoAWS,
}

impl Region {
    /// All regions, in table order.
    pub const ALL: [Region; 5] = [
        Region::FrankfurtAWS,
        Region::IrelandAWS,
        Region::LondonAWS,
        Region::NCaliforniaAWS,
        Region::TokyoAWS,
    ];

    fn index(self) -> usize {
        match self {
            Region::FrankfurtAWS => 0,
            Region::IrelandAWS => 1,
            Region::LondonAWS => 2,
            Region::NCaliforniaAWS => 3,
            Region::TokyoAWS => 4,
        }
    }
}

/// One-way latencies in microseconds, upper triangle of a symmetric matrix.
///
/// Figures are half the averaged inter-datacenter RTTs; same-region traffic
/// still crosses a switch fabric, hence the non-zero diagonal.
const ONE_WAY_US: [[u64; 5]; 5] = [
    // Frankfurt  Ireland   London    NCalif    Tokyo
    [500, 12_500, 6_500, 73_500, 111_500],     // Frankfurt
    [12_500, 500, 5_000, 66_500, 106_000],     // Ireland
    [6_500, 5_000, 500, 69_000, 108_500],      // London
    [73_500, 66_500, 69_000, 500, 52_500],     // N. California
    [111_500, 106_000, 108_500, 52_500, 500],  // Tokyo
];

/// One-way network latency between two regions.
///
/// Pure and symmetric: `latency(a, b) == latency(b, a)` for every pair, and
/// the same pair always yields the same value.
pub fn latency(a: Region, b: Region) -> Duration {
    Duration::from_micros(ONE_WAY_US[a.index()][b.index()])
}
