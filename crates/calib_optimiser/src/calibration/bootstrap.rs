//! Bootstrap resampling of observation sets.
//!
//! Each replica draws `N` row indices uniformly with replacement. The RNG
//! of replica `i` is seeded from `(seed, i)` through a counter-based mixer,
//! so a replica's indices do not depend on how replicas are scheduled
//! across threads.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use calib_core::types::Sample;

/// Derive the RNG seed of one replica from the run seed.
///
/// SplitMix64 finaliser over `seed + (index + 1) · γ`.
pub fn replica_seed(seed: u64, replica: u64) -> u64 {
    let mut z = seed.wrapping_add(replica.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Row indices of one bootstrap replica over `size` observations.
///
/// # Examples
///
/// ```
/// use calib_optimiser::calibration::bootstrap_indices;
///
/// let a = bootstrap_indices(10, 42, 3);
/// assert_eq!(a.len(), 10);
/// assert!(a.iter().all(|&i| i < 10));
/// assert_eq!(a, bootstrap_indices(10, 42, 3));
/// ```
pub fn bootstrap_indices(size: usize, seed: u64, replica: usize) -> Vec<usize> {
    if size == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(replica_seed(seed, replica as u64));
    (0..size).map(|_| rng.gen_range(0..size)).collect()
}

/// Resample paired observations with shared indices.
pub fn resample_pair(
    inputs: &Sample,
    outputs: &Sample,
    seed: u64,
    replica: usize,
) -> (Sample, Sample) {
    let indices = bootstrap_indices(inputs.size(), seed, replica);
    (inputs.select(&indices), outputs.select(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_replica_seeds_differ() {
        let seeds: Vec<u64> = (0..100).map(|i| replica_seed(7, i)).collect();
        let mut unique = seeds.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seeds.len());
        assert_ne!(replica_seed(0, 0), 0);
    }

    #[test]
    fn test_indices_depend_on_seed_and_replica() {
        let base = bootstrap_indices(50, 1, 0);
        assert_ne!(base, bootstrap_indices(50, 2, 0));
        assert_ne!(base, bootstrap_indices(50, 1, 1));
    }

    #[test]
    fn test_empty_sample() {
        assert!(bootstrap_indices(0, 1, 0).is_empty());
    }

    #[test]
    fn test_resample_pair_keeps_rows_aligned() {
        let inputs = Sample::from_rows(&[vec![0.0], vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        let outputs =
            Sample::from_rows(&[vec![0.0, 0.0], vec![10.0, 1.0], vec![20.0, 2.0], vec![30.0, 3.0]])
                .unwrap();
        let (x, y) = resample_pair(&inputs, &outputs, 99, 5);
        assert_eq!(x.size(), 4);
        assert_eq!(y.dimension(), 2);
        for (xi, yi) in x.rows().zip(y.rows()) {
            assert_eq!(yi[0], 10.0 * xi[0]);
            assert_eq!(yi[1], xi[0]);
        }
    }

    proptest! {
        #[test]
        fn prop_indices_in_range(size in 1usize..200, seed in any::<u64>(), replica in 0usize..1000) {
            let idx = bootstrap_indices(size, seed, replica);
            prop_assert_eq!(idx.len(), size);
            prop_assert!(idx.iter().all(|&i| i < size));
        }
    }
}
