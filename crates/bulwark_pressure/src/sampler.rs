//! # External Collaborators
//!
//! Everything the pressure controller needs from the host: a memory sampler,
//! an asset reclaimer, a collector and a way to restart the current state.

use std::task::Poll;

/// Reads the process's current memory usage.
pub trait MemorySampler {
    /// Counter name, for logs.
    fn name(&self) -> &str;

    /// Current usage in MB. `None` means this particular read failed.
    fn current_usage_mb(&mut self) -> Option<f64>;

    /// Whether the counter is usable at all.
    fn is_valid(&self) -> bool;

    /// Releases the counter. Called once, when the sampler is discarded.
    fn dispose(&mut self) {}
}

/// Reads the machine's total memory.
pub trait SystemMemorySampler {
    /// Total physical memory in MB, if it can be determined.
    fn total_system_memory_mb(&self) -> Option<f64>;
}

/// An asset unload that may take several ticks.
pub trait PendingUnload {
    /// Polls once. `Ready` carries the number of assets released.
    fn poll_unload(&mut self) -> Poll<usize>;
}

/// An unload that finished before it was returned.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompletedUnload(pub usize);

impl PendingUnload for CompletedUnload {
    fn poll_unload(&mut self) -> Poll<usize> {
        Poll::Ready(self.0)
    }
}

/// Releases caches that live outside the pools (textures, meshes, audio).
pub trait AssetReclaimer {
    /// Starts releasing unused assets.
    fn unload_unused_assets(&mut self) -> Box<dyn PendingUnload>;
}

/// Triggers the host allocator's reclamation passes.
pub trait GarbageCollectorControl {
    /// Runs one collection pass over `generation`.
    fn collect(&mut self, generation: u8, aggressive: bool);

    /// Blocks until deferred destructors queued by `collect` have run.
    fn wait_for_finalizers(&mut self);
}

/// Last-resort remedy: restart the current scene or process state.
pub trait ProcessRestart {
    /// Discards in-memory state and reloads the current state.
    fn restart_current_state(&mut self);
}

/// The host facilities a cleanup routine drives.
pub struct Reclaimers {
    /// Non-pool cache release.
    pub assets: Box<dyn AssetReclaimer>,
    /// Collection passes.
    pub gc: Box<dyn GarbageCollectorControl>,
    /// Hard reset.
    pub restart: Box<dyn ProcessRestart>,
}

impl Reclaimers {
    /// Bundles the three collaborators.
    #[must_use]
    pub fn new(
        assets: Box<dyn AssetReclaimer>,
        gc: Box<dyn GarbageCollectorControl>,
        restart: Box<dyn ProcessRestart>,
    ) -> Self {
        Self {
            assets,
            gc,
            restart,
        }
    }
}

/// Picks the first candidate that passes its validity check.
///
/// Each candidate is checked up to `attempts` times. Rejected candidates, and
/// every candidate after the winner, are disposed.
#[must_use]
pub fn select_sampler(
    candidates: Vec<Box<dyn MemorySampler>>,
    attempts: u32,
) -> Option<Box<dyn MemorySampler>> {
    let mut chosen: Option<Box<dyn MemorySampler>> = None;

    for mut candidate in candidates {
        if chosen.is_some() {
            candidate.dispose();
            continue;
        }

        if (0..attempts.max(1)).any(|_| candidate.is_valid()) {
            tracing::info!(sampler = candidate.name(), "memory sampler selected");
            chosen = Some(candidate);
        } else {
            tracing::debug!(sampler = candidate.name(), attempts, "memory sampler rejected");
            candidate.dispose();
        }
    }

    chosen
}
