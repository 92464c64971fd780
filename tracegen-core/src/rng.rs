//! Per-worker RNG derivation (`spec.md` §5).
//!
//! A single master seed must expand into `n` independent-looking streams,
//! one per worker, so that a fixed `rng_seed` and a fixed `trace_num_workers`
//! reproduce the same set of traces regardless of scheduling. We derive each
//! worker's seed by mixing the worker index into the master seed with
//! SplitMix64, the same constants the `rand` book recommends for seeding
//! one PRNG from another.
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Derive worker `index`'s seed from `master_seed`. Two different indices
/// always yield different seeds; the same `(master_seed, index)` pair
/// always yields the same seed.
pub fn worker_seed(master_seed: u64, index: u32) -> u64 {
    let mut z = master_seed.wrapping_add(u64::from(index).wrapping_mul(0x9E3779B97F4A7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Build the seeded RNG for worker `index`.
pub fn worker_rng(master_seed: u64, index: u32) -> SmallRng {
    SmallRng::seed_from_u64(worker_seed(master_seed, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_and_index_always_derive_the_same_seed() {
        assert_eq!(worker_seed(42, 3), worker_seed(42, 3));
    }

    #[test]
    fn different_indices_derive_different_seeds() {
        let seeds: Vec<u64> = (0..8).map(|i| worker_seed(42, i)).collect();
        for i in 0..seeds.len() {
            for j in (i + 1)..seeds.len() {
                assert_ne!(seeds[i], seeds[j]);
            }
        }
    }

    #[test]
    fn different_master_seeds_derive_different_streams() {
        assert_ne!(worker_seed(1, 0), worker_seed(2, 0));
    }
}
