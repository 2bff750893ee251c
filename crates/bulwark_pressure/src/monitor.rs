//! # Memory Pressure Monitor
//!
//! Tier controller driven by the host tick.
//!
//! ## Tick Structure
//!
//! ```text
//! tick(now)
//!  ├─ sample?      every sample_interval, ignored inside the settling window
//!  │   ├─ baseline capture (once per settle)
//!  │   ├─ classify → TierChanged
//!  │   └─ trigger cleanup (cooldown, re-entrancy, sticky emergency)
//!  └─ step routine one stage; on completion decide recovery / escalation
//! ```
//!
//! Escalation ladder: preemptive → aggressive → emergency → hard reset.
//! A hard reset restarts the host state and re-enters the settling window;
//! the emergency flag stays raised until an emergency pass converges.

use std::time::Duration;

use bulwark_core::PoolRegistry;

use crate::cleanup::{CleanupKind, CleanupReport, CleanupRoutine, StepOutcome};
use crate::config::PressureConfig;
use crate::error::{PressureError, PressureResult};
use crate::events::{PressureEvent, PressureEventBus, PressureEventReceiver};
use crate::sampler::{select_sampler, MemorySampler, Reclaimers};
use crate::tier::{PressureTier, Thresholds};

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Samples classified.
    pub samples: u64,
    /// Samples skipped inside the settling window.
    pub ignored_samples: u64,
    /// Readings skipped because they were missing, negative or not finite.
    pub degraded_samples: u64,
    /// Tier transitions.
    pub tier_changes: u64,
    /// Preemptive routines started.
    pub preemptive_runs: u64,
    /// Aggressive routines started.
    pub aggressive_runs: u64,
    /// Emergency routines started.
    pub emergency_runs: u64,
    /// Triggers dropped because a routine was already running.
    pub dropped_triggers: u64,
    /// Hard resets issued.
    pub hard_resets: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    /// Sampling stopped; the in-flight routine finishes first.
    Draining,
    Stopped,
}

/// The memory pressure controller.
pub struct MemoryPressureMonitor {
    config: PressureConfig,
    configured: Thresholds,
    thresholds: Thresholds,
    sampler: Option<Box<dyn MemorySampler>>,
    reclaimers: Reclaimers,
    events: PressureEventBus,
    phase: Phase,

    tier: PressureTier,
    baseline: Option<f64>,
    settle_until: Option<Duration>,
    next_sample: Duration,
    last_cleanup_time: Option<Duration>,
    /// Start of the last aggressive or emergency routine.
    last_aggressive_time: Option<Duration>,
    consecutive_attempts: u32,
    emergency_required: bool,
    routine: Option<CleanupRoutine>,
    last_usage_mb: Option<f64>,
    stats: MonitorStats,
}

impl MemoryPressureMonitor {
    /// Builds a monitor from `config`, picking the first valid sampler.
    ///
    /// When no candidate is valid the monitor is returned disabled: it never
    /// classifies or cleans up, and the failure is logged once.
    ///
    /// # Errors
    ///
    /// Returns [`PressureError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        config: PressureConfig,
        samplers: Vec<Box<dyn MemorySampler>>,
        reclaimers: Reclaimers,
    ) -> PressureResult<Self> {
        config.validate()?;

        let tried = samplers.len();
        let sampler = select_sampler(samplers, config.sampler_probe_attempts);
        let phase = if sampler.is_some() {
            Phase::Running
        } else {
            let err = PressureError::SamplerUnavailable { tried };
            tracing::error!(error = %err, "memory pressure monitoring disabled");
            Phase::Stopped
        };

        Ok(Self {
            configured: config.thresholds,
            thresholds: config.thresholds,
            events: PressureEventBus::new(config.event_capacity),
            config,
            sampler,
            reclaimers,
            phase,
            tier: PressureTier::Nominal,
            baseline: None,
            settle_until: None,
            next_sample: Duration::ZERO,
            last_cleanup_time: None,
            last_aggressive_time: None,
            consecutive_attempts: 0,
            emergency_required: false,
            routine: None,
            last_usage_mb: None,
            stats: MonitorStats::default(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current tier.
    #[inline]
    #[must_use]
    pub const fn tier(&self) -> PressureTier {
        self.tier
    }

    /// Captured baseline, `None` until the first settled sample.
    #[inline]
    #[must_use]
    pub const fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Thresholds in effect (after baseline scaling).
    #[inline]
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Configuration this monitor was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &PressureConfig {
        &self.config
    }

    /// Whether sampling is active.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Whether the monitor is finishing its last routine before stopping.
    #[inline]
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.phase == Phase::Draining
    }

    /// Whether the monitor has fully stopped.
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.phase == Phase::Stopped
    }

    /// Sticky emergency flag. Session starts must be refused while set.
    #[inline]
    #[must_use]
    pub const fn is_in_emergency_mode(&self) -> bool {
        self.emergency_required
    }

    /// Whether a cleanup routine is running.
    #[inline]
    #[must_use]
    pub const fn cleanup_in_progress(&self) -> bool {
        self.routine.is_some()
    }

    /// Severity of the running routine, if any.
    #[must_use]
    pub fn active_cleanup(&self) -> Option<CleanupKind> {
        self.routine.as_ref().map(CleanupRoutine::kind)
    }

    /// Aggressive attempts since pressure last returned to nominal.
    #[inline]
    #[must_use]
    pub const fn consecutive_attempts(&self) -> u32 {
        self.consecutive_attempts
    }

    /// When the most recent routine started.
    #[inline]
    #[must_use]
    pub const fn last_cleanup_time(&self) -> Option<Duration> {
        self.last_cleanup_time
    }

    /// Most recent usage reading, in MB.
    #[inline]
    #[must_use]
    pub const fn last_usage_mb(&self) -> Option<f64> {
        self.last_usage_mb
    }

    /// Lifetime counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Name of the selected sampler.
    #[must_use]
    pub fn sampler_name(&self) -> Option<&str> {
        self.sampler.as_deref().map(MemorySampler::name)
    }

    /// Subscribes to pressure events.
    #[must_use]
    pub fn subscribe(&mut self) -> PressureEventReceiver {
        self.events.subscribe()
    }

    /// Events lost to full subscriber channels.
    #[must_use]
    pub const fn events_dropped(&self) -> u64 {
        self.events.dropped()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Advances the controller to `now` (time since host start).
    pub fn tick(&mut self, now: Duration, pools: &PoolRegistry) {
        match self.phase {
            Phase::Stopped => return,
            Phase::Draining => {}
            Phase::Running => {
                let settle_delay = self.config.settle_delay();
                let settle_until = *self.settle_until.get_or_insert(now + settle_delay);

                if now >= self.next_sample {
                    self.next_sample = now + self.config.sample_interval();
                    if now < settle_until {
                        self.stats.ignored_samples += 1;
                    } else {
                        self.sample(now);
                    }
                }
            }
        }

        self.step_routine(now, pools);

        if self.phase == Phase::Draining && self.routine.is_none() {
            self.finish_stop();
        }
    }

    /// Stops sampling. A running routine completes on subsequent ticks before
    /// the sampler is disposed.
    pub fn disable(&mut self) {
        if self.phase != Phase::Running {
            return;
        }
        tracing::info!("memory pressure monitor disabled");
        self.events.publish(&PressureEvent::MonitorDisabled {
            reason: "disabled by host",
        });
        self.begin_stop();
    }

    fn fault(&mut self, reason: &'static str) {
        if self.phase != Phase::Running {
            return;
        }
        tracing::error!(reason, "memory pressure monitoring disabled");
        self.events
            .publish(&PressureEvent::MonitorDisabled { reason });
        self.begin_stop();
    }

    fn begin_stop(&mut self) {
        // Without a controller nothing would ever lower the flag again.
        self.emergency_required = false;
        if self.routine.is_some() {
            self.phase = Phase::Draining;
        } else {
            self.finish_stop();
        }
    }

    fn finish_stop(&mut self) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.dispose();
        }
        self.phase = Phase::Stopped;
    }

    // =========================================================================
    // Sampling
    // =========================================================================

    fn read_usage(&mut self) -> Option<f64> {
        let valid = self.sampler.as_ref()?.is_valid();
        if !valid {
            self.fault("memory sampler became invalid");
            return None;
        }

        match self.sampler.as_mut()?.current_usage_mb() {
            Some(usage) if usage.is_finite() && usage >= 0.0 => {
                self.last_usage_mb = Some(usage);
                Some(usage)
            }
            other => {
                self.stats.degraded_samples += 1;
                tracing::warn!(reading = ?other, "degraded memory sample skipped");
                None
            }
        }
    }

    fn sample(&mut self, now: Duration) {
        let Some(usage) = self.read_usage() else {
            return;
        };
        self.stats.samples += 1;

        if self.baseline.is_none() {
            self.capture_baseline(usage);
        }

        let tier = self.thresholds.classify(usage);
        if tier != self.tier {
            tracing::info!(from = %self.tier, to = %tier, usage_mb = usage, "memory pressure tier changed");
            self.events.publish(&PressureEvent::TierChanged {
                from: self.tier,
                to: tier,
                usage_mb: usage,
            });
            self.tier = tier;
            self.stats.tier_changes += 1;
        }

        self.evaluate(now, tier, usage);
    }

    fn capture_baseline(&mut self, usage: f64) {
        let scale = (usage / self.configured.base).max(1.0);
        self.baseline = Some(usage);
        self.thresholds = self.configured.scaled(scale);
        tracing::info!(
            baseline_mb = usage,
            scale,
            warning = self.thresholds.warning,
            critical = self.thresholds.critical,
            emergency = self.thresholds.emergency,
            "memory baseline captured"
        );
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    fn evaluate(&mut self, now: Duration, tier: PressureTier, usage: f64) {
        if tier == PressureTier::Nominal {
            self.consecutive_attempts = 0;
        }

        if tier == PressureTier::Emergency && !self.emergency_required {
            tracing::warn!(usage_mb = usage, "entering emergency mode");
            self.emergency_required = true;
        }

        // A raised flag with nothing running means the last emergency pass
        // was cut short or a hard reset just settled: run another.
        if self.emergency_required {
            self.trigger(now, CleanupKind::Emergency, usage);
            return;
        }

        // Each severity is gated by its own window: a preemptive run never
        // holds back an aggressive one.
        let cooldown = self.config.cooldown();
        match tier {
            PressureTier::Warning if cooled_down(self.last_cleanup_time, now, cooldown) => {
                self.trigger(now, CleanupKind::Preemptive, usage);
            }
            PressureTier::Critical
                if cooled_down(self.last_aggressive_time, now, cooldown / 2) =>
            {
                self.trigger(now, CleanupKind::Aggressive, usage);
            }
            _ => {}
        }
    }

    fn trigger(&mut self, now: Duration, kind: CleanupKind, usage: f64) {
        if let Some(running) = self.active_cleanup() {
            self.stats.dropped_triggers += 1;
            tracing::debug!(%kind, %running, "cleanup already running, trigger dropped");
            return;
        }
        self.start_routine(now, kind, usage);
    }

    fn start_routine(&mut self, now: Duration, kind: CleanupKind, usage: f64) {
        self.last_cleanup_time = Some(now);
        match kind {
            CleanupKind::Preemptive => self.stats.preemptive_runs += 1,
            CleanupKind::Aggressive => {
                self.last_aggressive_time = Some(now);
                self.consecutive_attempts += 1;
                self.stats.aggressive_runs += 1;
            }
            CleanupKind::Emergency => {
                self.last_aggressive_time = Some(now);
                self.stats.emergency_runs += 1;
            }
        }

        tracing::info!(
            %kind,
            usage_mb = usage,
            attempts = self.consecutive_attempts,
            "cleanup started"
        );
        self.events
            .publish(&PressureEvent::CleanupStarted { kind, usage_mb: usage });
        self.routine = Some(CleanupRoutine::plan(kind, &self.config));
    }

    // =========================================================================
    // Routine completion
    // =========================================================================

    fn step_routine(&mut self, now: Duration, pools: &PoolRegistry) {
        let Some(routine) = self.routine.as_mut() else {
            return;
        };
        if routine.step(pools, &mut self.reclaimers) == StepOutcome::Pending {
            return;
        }
        if let Some(done) = self.routine.take() {
            self.finish_routine(now, done.kind(), done.report());
        }
    }

    fn finish_routine(&mut self, now: Duration, kind: CleanupKind, report: CleanupReport) {
        let running = self.phase == Phase::Running;
        let usage = if running { self.read_usage() } else { None };

        tracing::info!(%kind, ?report, usage_mb = ?usage, "cleanup finished");
        self.events.publish(&PressureEvent::CleanupFinished {
            kind,
            report,
            usage_mb: usage,
        });

        // The reading above may itself have disabled the monitor.
        if self.phase != Phase::Running {
            return;
        }

        match kind {
            CleanupKind::Preemptive => {
                if let (Some(usage), Some(baseline)) = (usage, self.baseline) {
                    if usage < baseline * self.config.baseline_shrink_ratio {
                        tracing::debug!(from = baseline, to = usage, "baseline lowered");
                        self.baseline = Some(usage);
                    }
                }
            }
            CleanupKind::Aggressive => {
                let stuck = usage.is_some_and(|u| u > self.thresholds.critical);
                let exhausted = self.consecutive_attempts >= self.config.max_attempts && stuck;
                if self.emergency_required || exhausted {
                    tracing::warn!(
                        attempts = self.consecutive_attempts,
                        usage_mb = ?usage,
                        "aggressive cleanup insufficient, escalating to emergency"
                    );
                    self.emergency_required = true;
                    let usage = usage.or(self.last_usage_mb).unwrap_or_default();
                    self.start_routine(now, CleanupKind::Emergency, usage);
                }
            }
            CleanupKind::Emergency => self.conclude_emergency(now, usage),
        }
    }

    fn conclude_emergency(&mut self, now: Duration, usage: Option<f64>) {
        let Some(usage) = usage else {
            tracing::warn!("no reading after emergency cleanup, staying in emergency mode");
            return;
        };

        if usage <= self.thresholds.critical {
            tracing::info!(usage_mb = usage, "emergency cleanup recovered");
            self.emergency_required = false;
            self.consecutive_attempts = 0;
            self.baseline = Some(usage);
            return;
        }

        tracing::error!(
            usage_mb = usage,
            critical = self.thresholds.critical,
            "emergency cleanup did not converge, restarting current state"
        );
        self.events.publish(&PressureEvent::HardReset { usage_mb: usage });
        self.reclaimers.restart.restart_current_state();

        self.stats.hard_resets += 1;
        self.consecutive_attempts = 0;
        self.baseline = None;
        self.thresholds = self.configured;
        self.settle_until = Some(now + self.config.settle_delay());
    }
}

fn cooled_down(last: Option<Duration>, now: Duration, window: Duration) -> bool {
    last.map_or(true, |last| now.saturating_sub(last) >= window)
}

impl Drop for MemoryPressureMonitor {
    fn drop(&mut self) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.dispose();
        }
    }
}

impl std::fmt::Debug for MemoryPressureMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPressureMonitor")
            .field("phase", &self.phase)
            .field("tier", &self.tier)
            .field("baseline", &self.baseline)
            .field("thresholds", &self.thresholds)
            .field("emergency", &self.emergency_required)
            .field("routine", &self.routine)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{
        AssetReclaimer, CompletedUnload, GarbageCollectorControl, PendingUnload, ProcessRestart,
    };
    use std::cell::Cell;
    use std::rc::Rc;

    struct Fixed {
        usage: Rc<Cell<f64>>,
        disposed: Rc<Cell<bool>>,
    }

    impl MemorySampler for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn current_usage_mb(&mut self) -> Option<f64> {
            Some(self.usage.get())
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn dispose(&mut self) {
            self.disposed.set(true);
        }
    }

    struct Never;

    impl MemorySampler for Never {
        fn name(&self) -> &str {
            "never"
        }
        fn current_usage_mb(&mut self) -> Option<f64> {
            None
        }
        fn is_valid(&self) -> bool {
            false
        }
    }

    struct Idle;

    impl AssetReclaimer for Idle {
        fn unload_unused_assets(&mut self) -> Box<dyn PendingUnload> {
            Box::new(CompletedUnload(0))
        }
    }

    impl GarbageCollectorControl for Idle {
        fn collect(&mut self, _generation: u8, _aggressive: bool) {}
        fn wait_for_finalizers(&mut self) {}
    }

    impl ProcessRestart for Idle {
        fn restart_current_state(&mut self) {}
    }

    fn idle() -> Reclaimers {
        Reclaimers::new(Box::new(Idle), Box::new(Idle), Box::new(Idle))
    }

    fn config() -> PressureConfig {
        PressureConfig {
            thresholds: Thresholds::new(500.0, 600.0, 700.0, 800.0),
            ..PressureConfig::default()
        }
    }

    fn monitor(usage: &Rc<Cell<f64>>) -> (MemoryPressureMonitor, Rc<Cell<bool>>) {
        let disposed = Rc::new(Cell::new(false));
        let sampler = Fixed {
            usage: Rc::clone(usage),
            disposed: Rc::clone(&disposed),
        };
        let monitor = MemoryPressureMonitor::new(config(), vec![Box::new(sampler)], idle()).unwrap();
        (monitor, disposed)
    }

    fn at(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_no_valid_sampler_disables() {
        let mut monitor =
            MemoryPressureMonitor::new(config(), vec![Box::new(Never)], idle()).unwrap();
        let pools = PoolRegistry::default();

        assert!(monitor.is_stopped());
        monitor.tick(at(10_000), &pools);
        assert_eq!(monitor.stats(), MonitorStats::default());
        assert!(!monitor.is_in_emergency_mode());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut bad = config();
        bad.thresholds = Thresholds::new(500.0, 900.0, 700.0, 800.0);
        let usage = Rc::new(Cell::new(0.0));
        let sampler = Fixed {
            usage,
            disposed: Rc::new(Cell::new(false)),
        };

        let result = MemoryPressureMonitor::new(bad, vec![Box::new(sampler)], idle());
        assert!(matches!(result, Err(PressureError::InvalidConfig(_))));
    }

    #[test]
    fn test_settling_window_ignores_spikes() {
        let usage = Rc::new(Cell::new(5_000.0));
        let (mut monitor, _) = monitor(&usage);
        let pools = PoolRegistry::default();

        for ms in (0..5_000).step_by(500) {
            monitor.tick(at(ms), &pools);
        }

        assert_eq!(monitor.stats().ignored_samples, 10);
        assert_eq!(monitor.stats().samples, 0);
        assert_eq!(monitor.baseline(), None);
        assert!(!monitor.cleanup_in_progress());
    }

    #[test]
    fn test_high_baseline_scales_thresholds() {
        let usage = Rc::new(Cell::new(1_000.0));
        let (mut monitor, _) = monitor(&usage);
        let pools = PoolRegistry::default();

        monitor.tick(at(0), &pools);
        monitor.tick(at(5_000), &pools);

        assert_eq!(monitor.baseline(), Some(1_000.0));
        assert_eq!(
            monitor.thresholds(),
            Thresholds::new(1_000.0, 1_200.0, 1_400.0, 1_600.0)
        );
        assert_eq!(monitor.tier(), PressureTier::Nominal);
    }

    #[test]
    fn test_low_baseline_keeps_configured_thresholds() {
        let usage = Rc::new(Cell::new(200.0));
        let (mut monitor, _) = monitor(&usage);
        let pools = PoolRegistry::default();

        monitor.tick(at(0), &pools);
        monitor.tick(at(5_000), &pools);

        assert_eq!(monitor.thresholds(), config().thresholds);
    }

    #[test]
    fn test_degraded_reading_is_skipped() {
        let usage = Rc::new(Cell::new(f64::NAN));
        let (mut monitor, _) = monitor(&usage);
        let pools = PoolRegistry::default();

        monitor.tick(at(0), &pools);
        monitor.tick(at(5_000), &pools);

        assert_eq!(monitor.stats().degraded_samples, 1);
        assert_eq!(monitor.baseline(), None);
        assert!(monitor.is_enabled());
    }

    #[test]
    fn test_disable_disposes_sampler() {
        let usage = Rc::new(Cell::new(100.0));
        let (mut monitor, disposed) = monitor(&usage);

        monitor.disable();

        assert!(monitor.is_stopped());
        assert!(disposed.get());
        assert_eq!(monitor.sampler_name(), None);
    }

    #[test]
    fn test_drop_disposes_sampler() {
        let usage = Rc::new(Cell::new(100.0));
        let (monitor, disposed) = monitor(&usage);
        assert_eq!(monitor.sampler_name(), Some("fixed"));

        drop(monitor);
        assert!(disposed.get());
    }
}
