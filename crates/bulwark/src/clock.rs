//! # Host Clock
//!
//! Produces the monotonically increasing timestamps the runtime ticks with.
//!
//! - **Realtime**: wall time since start, paced to a target tick rate.
//! - **Fixed step**: every tick advances by exactly one step. Deterministic,
//!   used by tests and the storm simulation.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum Mode {
    Realtime { start: Instant },
    FixedStep,
}

/// Tick timestamp source.
#[derive(Debug, Clone)]
pub struct HostClock {
    mode: Mode,
    /// Target tick duration.
    tick_duration: Duration,
    /// Timestamp of the latest tick.
    now: Duration,
    /// Total ticks issued.
    tick_count: u64,
    /// Ticks that arrived later than one tick duration after the previous one.
    late_ticks: u64,
}

impl HostClock {
    /// Wall-clock timestamps, paced to `tick_rate` ticks per second.
    #[must_use]
    pub fn realtime(tick_rate: u32) -> Self {
        Self::with_mode(
            Mode::Realtime {
                start: Instant::now(),
            },
            tick_rate,
        )
    }

    /// Simulated timestamps advancing by `1 / tick_rate` seconds per tick.
    #[must_use]
    pub fn fixed_step(tick_rate: u32) -> Self {
        Self::with_mode(Mode::FixedStep, tick_rate)
    }

    fn with_mode(mode: Mode, tick_rate: u32) -> Self {
        Self {
            mode,
            tick_duration: Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1))),
            now: Duration::ZERO,
            tick_count: 0,
            late_ticks: 0,
        }
    }

    /// Issues the next tick and returns its timestamp.
    pub fn advance(&mut self) -> Duration {
        let next = match self.mode {
            Mode::Realtime { start } => start.elapsed().max(self.now),
            Mode::FixedStep => self.now + self.tick_duration,
        };

        if self.tick_count > 0 && next.saturating_sub(self.now) > self.tick_duration * 2 {
            self.late_ticks += 1;
        }

        self.now = next;
        self.tick_count += 1;
        next
    }

    /// Sleeps until the next tick is due. No-op in fixed-step mode.
    pub fn wait_for_next_tick(&self) {
        let Mode::Realtime { start } = self.mode else {
            return;
        };

        let due = self.tick_duration * u32::try_from(self.tick_count).unwrap_or(u32::MAX);
        let elapsed = start.elapsed();
        if due > elapsed {
            std::thread::sleep(due - elapsed);
        }
    }

    /// Timestamp of the latest tick.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Ticks issued so far.
    #[inline]
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Target tick duration.
    #[inline]
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Ticks that arrived more than two tick durations after the previous one.
    #[inline]
    #[must_use]
    pub const fn late_ticks(&self) -> u64 {
        self.late_ticks
    }
}
