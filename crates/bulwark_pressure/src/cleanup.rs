//! # Staged Cleanup
//!
//! A cleanup routine is a fixed list of stages executed one per host tick,
//! so a multi-pass sweep never stalls a single frame:
//!
//! ```text
//! Preemptive:  UnloadAssets → Collect(0)
//! Aggressive:  ClearPools → UnloadAssets → Collect(0) → Collect(1) → Collect(2) → Finalizers
//! Emergency:   ClearPools → UnloadAssets → [Collect(top, aggressive) → Finalizers] × passes
//! ```
//!
//! Every stage is idempotent: clearing empty pools or collecting twice is
//! harmless. A routine that is interrupted simply resumes at its cursor.

use std::fmt;
use std::task::Poll;

use bulwark_core::PoolRegistry;

use crate::config::PressureConfig;
use crate::sampler::{PendingUnload, Reclaimers};

/// Severity of a cleanup routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CleanupKind {
    /// Light: release caches, one young-generation pass.
    Preemptive,
    /// Clear pools, release caches, one pass per generation.
    Aggressive,
    /// Everything, repeated with aggressive full passes.
    Emergency,
}

impl fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preemptive => "preemptive",
            Self::Aggressive => "aggressive",
            Self::Emergency => "emergency",
        })
    }
}

/// One suspension-delimited step of a routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupStage {
    /// `PoolRegistry::clear_all`.
    ClearPools,
    /// Start an asset unload and wait for it across ticks.
    UnloadAssets,
    /// One collection pass.
    Collect {
        /// Generation to collect.
        generation: u8,
        /// Whether to compact aggressively.
        aggressive: bool,
    },
    /// Wait for deferred destructors.
    WaitForFinalizers,
}

/// What a finished routine accomplished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Pools cleared (summed over `ClearPools` stages).
    pub pools_cleared: usize,
    /// Assets released by the reclaimer.
    pub assets_released: usize,
    /// Collection passes run.
    pub collections: u32,
    /// Ticks the routine spanned.
    pub ticks: u32,
}

/// Whether a routine has more stages to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// More stages remain; call [`CleanupRoutine::step`] again next tick.
    Pending,
    /// All stages ran.
    Complete,
}

/// An in-flight cleanup.
pub struct CleanupRoutine {
    kind: CleanupKind,
    stages: Vec<CleanupStage>,
    cursor: usize,
    pending_unload: Option<Box<dyn PendingUnload>>,
    report: CleanupReport,
}

impl CleanupRoutine {
    /// Plans the stages for `kind`.
    #[must_use]
    pub fn plan(kind: CleanupKind, config: &PressureConfig) -> Self {
        let generations = config.collection_generations.max(1);
        let top = generations - 1;

        let stages = match kind {
            CleanupKind::Preemptive => vec![
                CleanupStage::UnloadAssets,
                CleanupStage::Collect {
                    generation: 0,
                    aggressive: false,
                },
            ],
            CleanupKind::Aggressive => {
                let mut stages = vec![CleanupStage::ClearPools, CleanupStage::UnloadAssets];
                stages.extend((0..generations).map(|generation| CleanupStage::Collect {
                    generation,
                    aggressive: false,
                }));
                stages.push(CleanupStage::WaitForFinalizers);
                stages
            }
            CleanupKind::Emergency => {
                let mut stages = vec![CleanupStage::ClearPools, CleanupStage::UnloadAssets];
                for _ in 0..config.emergency_passes.max(1) {
                    stages.push(CleanupStage::Collect {
                        generation: top,
                        aggressive: true,
                    });
                    stages.push(CleanupStage::WaitForFinalizers);
                }
                stages
            }
        };

        Self {
            kind,
            stages,
            cursor: 0,
            pending_unload: None,
            report: CleanupReport::default(),
        }
    }

    /// Routine severity.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> CleanupKind {
        self.kind
    }

    /// All planned stages.
    #[inline]
    #[must_use]
    pub fn stages(&self) -> &[CleanupStage] {
        &self.stages
    }

    /// The stage the next [`step`](Self::step) will run, if any.
    #[inline]
    #[must_use]
    pub fn current_stage(&self) -> Option<CleanupStage> {
        self.stages.get(self.cursor).copied()
    }

    /// Progress so far.
    #[inline]
    #[must_use]
    pub const fn report(&self) -> CleanupReport {
        self.report
    }

    /// Runs the current stage. Call once per tick.
    ///
    /// An asset unload that is still pending keeps the cursor in place.
    pub fn step(&mut self, pools: &PoolRegistry, reclaimers: &mut Reclaimers) -> StepOutcome {
        let Some(stage) = self.current_stage() else {
            return StepOutcome::Complete;
        };
        self.report.ticks += 1;

        let advanced = match stage {
            CleanupStage::ClearPools => {
                self.report.pools_cleared += pools.clear_all();
                true
            }
            CleanupStage::UnloadAssets => {
                let pending = self
                    .pending_unload
                    .get_or_insert_with(|| reclaimers.assets.unload_unused_assets());
                match pending.poll_unload() {
                    Poll::Ready(released) => {
                        self.report.assets_released += released;
                        self.pending_unload = None;
                        true
                    }
                    Poll::Pending => false,
                }
            }
            CleanupStage::Collect {
                generation,
                aggressive,
            } => {
                reclaimers.gc.collect(generation, aggressive);
                self.report.collections += 1;
                true
            }
            CleanupStage::WaitForFinalizers => {
                reclaimers.gc.wait_for_finalizers();
                true
            }
        };

        if advanced {
            tracing::trace!(kind = %self.kind, ?stage, "cleanup stage done");
            self.cursor += 1;
        }

        if self.cursor >= self.stages.len() {
            StepOutcome::Complete
        } else {
            StepOutcome::Pending
        }
    }
}

impl fmt::Debug for CleanupRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupRoutine")
            .field("kind", &self.kind)
            .field("cursor", &self.cursor)
            .field("stages", &self.stages.len())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}
