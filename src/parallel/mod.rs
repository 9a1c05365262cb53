//! The distributed reduce/broadcast capability consumed by the evaluators.
//!
//! Within one process all parallelism is fork-join over rayon worker threads with
//! per-worker accumulators folded at the join. Across processes, the evaluators
//! only require the minimal collective surface below: work is partitioned
//! statically by configuration-index modulo rank, partial results are summed by
//! an all-reduce and, where needed, a root's result is re-broadcast. Wire-level
//! communication is the surrounding application's responsibility; the
//! single-process implementation below makes every collective a no-op.

/// A reduce/broadcast capability over a set of process ranks.
pub trait Collective: Sync {
    /// The number of ranks.
    fn size(&self) -> usize {
        1
    }

    /// The rank of this process.
    fn rank(&self) -> usize {
        0
    }

    /// Sums `data` element-wise across all ranks, leaving the result on every
    /// rank.
    fn all_reduce_sum(&self, _data: &mut [f64]) {}

    /// Overwrites `data` on every rank with the values held by `root`.
    fn broadcast(&self, _data: &mut [f64], _root: usize) {}
}

/// The trivial single-process capability: one rank, no communication.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl Collective for SingleProcess {}
