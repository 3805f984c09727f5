//! Work partitioning for the worker pools.
//!
//! Extraction stripes layers across workers (worker `w` takes every
//! `workers`-th layer starting at `w`); rewiring hands each worker one
//! contiguous slice of the registry. Both cover every index exactly once.

use std::num::NonZeroUsize;
use std::ops::Range;

/// Indices worker `worker` handles under striped partitioning.
pub fn stripe_indices(len: usize, workers: usize, worker: usize) -> impl Iterator<Item = usize> {
    (worker..len).step_by(workers.max(1))
}

/// The contiguous slice of `0..len` owned by `worker`.
///
/// Slice `i` is `[i * len / workers, (i + 1) * len / workers)`, so slice sizes
/// differ by at most one.
#[must_use]
pub fn contiguous_range(len: usize, workers: usize, worker: usize) -> Range<usize> {
    let workers = workers.max(1);
    if worker >= workers {
        return len..len;
    }
    let start = worker * len / workers;
    let end = (worker + 1) * len / workers;
    start..end
}

/// Half the available cores, never less than one.
#[must_use]
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    (cores / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripes_interleave() {
        let w0: Vec<usize> = stripe_indices(7, 3, 0).collect();
        let w1: Vec<usize> = stripe_indices(7, 3, 1).collect();
        let w2: Vec<usize> = stripe_indices(7, 3, 2).collect();
        assert_eq!(w0, vec![0, 3, 6]);
        assert_eq!(w1, vec![1, 4]);
        assert_eq!(w2, vec![2, 5]);
    }

    #[test]
    fn ten_layers_over_three_workers() {
        let shards: Vec<Vec<usize>> = (0..3).map(|w| stripe_indices(10, 3, w).collect()).collect();
        assert_eq!(shards, vec![vec![0, 3, 6, 9], vec![1, 4, 7], vec![2, 5, 8]]);
    }

    #[test]
    fn more_workers_than_items_leaves_some_idle() {
        assert_eq!(stripe_indices(2, 4, 3).count(), 0);
        assert_eq!(contiguous_range(2, 4, 0), 0..0);
        assert_eq!(contiguous_range(2, 4, 1), 0..1);
        assert_eq!(contiguous_range(2, 4, 3), 1..2);
    }

    #[test]
    fn contiguous_slices_tile_the_range() {
        assert_eq!(contiguous_range(10, 3, 0), 0..3);
        assert_eq!(contiguous_range(10, 3, 1), 3..6);
        assert_eq!(contiguous_range(10, 3, 2), 6..10);
    }

    #[test]
    fn zero_workers_behaves_like_one() {
        assert_eq!(stripe_indices(3, 0, 0).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(contiguous_range(3, 0, 0), 0..3);
    }

    #[test]
    fn default_worker_count_is_positive() {
        assert!(default_worker_count() >= 1);
    }
}
