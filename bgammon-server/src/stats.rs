//! Standalone dice-roll distribution harness, run via `--stats-only`. Not
//! wired into the match-serving code path: it exits before any listener is
//! bound.

use rand::Rng;
use rand_pcg::Pcg64Mcg;
use std::collections::BTreeMap;

const ROLLS: u64 = 10_000_000;

/// Rolls two dice `ROLLS` times and prints the observed distribution of
/// totals against the analytical expectation, as a sanity check on the
/// server's dice source.
pub fn run() {
    let mut rng = Pcg64Mcg::new(0xcafef00dd15ea5e5);
    let mut totals: BTreeMap<u8, u64> = BTreeMap::new();
    let mut doubles: u64 = 0;

    for _ in 0..ROLLS {
        let d1: u8 = rng.gen_range(1..=6);
        let d2: u8 = rng.gen_range(1..=6);
        *totals.entry(d1 + d2).or_insert(0) += 1;
        if d1 == d2 {
            doubles += 1;
        }
    }

    println!("rolls={ROLLS}");
    for (total, count) in &totals {
        let pct = *count as f64 / ROLLS as f64 * 100.0;
        println!("  total={total:>2} count={count:>9} ({pct:.3}%)");
    }
    let doubles_pct = doubles as f64 / ROLLS as f64 * 100.0;
    println!("doubles={doubles} ({doubles_pct:.3}%, expected ~16.667%)");
}
