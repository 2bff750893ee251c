//! # Runtime Context
//!
//! Owns the pool registry and the pressure monitor. Everything that needs
//! either receives the runtime (or a borrow of its parts) explicitly.
//!
//! ```text
//! Runtime::tick(now)
//!  ├─ monitor.tick(now, &registry)   sample, classify, step cleanup
//!  ├─ registry.refresh_stats(now)    cached stats on their own cadence
//!  └─ shutdown complete?             teardown once the monitor has drained
//! ```

use std::fmt;
use std::time::Duration;

use bulwark_core::PoolRegistry;
use bulwark_pressure::{MemoryPressureMonitor, MemorySampler, PressureEventReceiver, Reclaimers};

use crate::config::RuntimeConfig;
use crate::error::{BulwarkResult, SessionError};

/// Identifier of a gameplay session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Running,
    ShuttingDown,
    Finished,
}

/// The explicit runtime context.
pub struct Runtime {
    registry: PoolRegistry,
    monitor: MemoryPressureMonitor,
    session: Option<SessionId>,
    sessions_started: u64,
    sessions_refused: u64,
    lifecycle: Lifecycle,
}

impl Runtime {
    /// Builds the registry and the monitor.
    ///
    /// # Errors
    ///
    /// Returns the pressure configuration error if `config.pressure` does
    /// not validate. A missing sampler is not an error: the monitor starts
    /// disabled.
    pub fn new(
        config: &RuntimeConfig,
        samplers: Vec<Box<dyn MemorySampler>>,
        reclaimers: Reclaimers,
    ) -> BulwarkResult<Self> {
        let monitor = MemoryPressureMonitor::new(config.pressure.clone(), samplers, reclaimers)?;
        let registry = PoolRegistry::new(&config.registry);

        tracing::info!(
            monitoring = monitor.is_enabled(),
            sampler = monitor.sampler_name().unwrap_or("none"),
            "runtime initialized"
        );

        Ok(Self {
            registry,
            monitor,
            session: None,
            sessions_started: 0,
            sessions_refused: 0,
            lifecycle: Lifecycle::Running,
        })
    }

    /// The pool registry.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// The pool registry, for declaring pools at start-up.
    #[inline]
    pub fn registry_mut(&mut self) -> &mut PoolRegistry {
        &mut self.registry
    }

    /// The pressure monitor.
    #[inline]
    #[must_use]
    pub const fn monitor(&self) -> &MemoryPressureMonitor {
        &self.monitor
    }

    /// Subscribes to pressure events.
    #[must_use]
    pub fn subscribe(&mut self) -> PressureEventReceiver {
        self.monitor.subscribe()
    }

    /// Advances the runtime to `now` (time since host start).
    pub fn tick(&mut self, now: Duration) {
        if self.lifecycle == Lifecycle::Finished {
            return;
        }

        self.monitor.tick(now, &self.registry);
        self.registry.refresh_stats(now);

        if self.lifecycle == Lifecycle::ShuttingDown && self.monitor.is_stopped() {
            self.finish_shutdown();
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Starts a gameplay session.
    ///
    /// # Errors
    ///
    /// - [`SessionError::EmergencyMode`] while the monitor is in emergency mode
    /// - [`SessionError::AlreadyActive`] if a session is running
    /// - [`SessionError::ShuttingDown`] after [`shutdown`](Self::shutdown)
    pub fn begin_session(&mut self) -> Result<SessionId, SessionError> {
        if self.lifecycle != Lifecycle::Running {
            return Err(SessionError::ShuttingDown);
        }
        if self.monitor.is_in_emergency_mode() {
            self.sessions_refused += 1;
            tracing::warn!(tier = %self.monitor.tier(), "session refused during memory emergency");
            return Err(SessionError::EmergencyMode);
        }
        if let Some(active) = self.session {
            tracing::debug!(%active, "session already active");
            return Err(SessionError::AlreadyActive);
        }

        self.sessions_started += 1;
        let id = SessionId(self.sessions_started);
        self.session = Some(id);
        tracing::info!(session = %id, "session started");
        Ok(id)
    }

    /// Ends the running session, if any.
    pub fn end_session(&mut self) -> Option<SessionId> {
        let ended = self.session.take();
        if let Some(id) = ended {
            tracing::info!(session = %id, "session ended");
        }
        ended
    }

    /// The running session.
    #[inline]
    #[must_use]
    pub const fn active_session(&self) -> Option<SessionId> {
        self.session
    }

    /// Sessions refused because of emergency mode.
    #[inline]
    #[must_use]
    pub const fn sessions_refused(&self) -> u64 {
        self.sessions_refused
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Begins shutdown: ends the session and disables the monitor.
    ///
    /// A cleanup routine in flight keeps running on later ticks; the
    /// registry is torn down once it completes.
    pub fn shutdown(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            return;
        }
        self.end_session();
        self.monitor.disable();
        self.lifecycle = Lifecycle::ShuttingDown;
        tracing::info!(draining = self.monitor.is_draining(), "runtime shutting down");

        if self.monitor.is_stopped() {
            self.finish_shutdown();
        }
    }

    fn finish_shutdown(&mut self) {
        self.registry.teardown();
        self.lifecycle = Lifecycle::Finished;
        tracing::info!("runtime shut down");
    }

    /// Whether shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lifecycle != Lifecycle::Running
    }

    /// Whether shutdown has completed.
    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.lifecycle == Lifecycle::Finished
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("lifecycle", &self.lifecycle)
            .field("session", &self.session)
            .field("pools", &self.registry.len())
            .field("monitor", &self.monitor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_pressure::{
        AssetReclaimer, CompletedUnload, GarbageCollectorControl, PendingUnload, ProcessRestart,
    };

    struct Inert;

    impl AssetReclaimer for Inert {
        fn unload_unused_assets(&mut self) -> Box<dyn PendingUnload> {
            Box::new(CompletedUnload(0))
        }
    }

    impl GarbageCollectorControl for Inert {
        fn collect(&mut self, _generation: u8, _aggressive: bool) {}
        fn wait_for_finalizers(&mut self) {}
    }

    impl ProcessRestart for Inert {
        fn restart_current_state(&mut self) {}
    }

    fn unmonitored() -> Runtime {
        let reclaimers = Reclaimers::new(Box::new(Inert), Box::new(Inert), Box::new(Inert));
        Runtime::new(&RuntimeConfig::default(), Vec::new(), reclaimers).unwrap()
    }

    #[test]
    fn test_sessions_allowed_without_monitoring() {
        let mut runtime = unmonitored();
        assert!(!runtime.monitor().is_enabled());

        let id = runtime.begin_session().unwrap();
        assert_eq!(runtime.begin_session(), Err(SessionError::AlreadyActive));
        assert_eq!(runtime.end_session(), Some(id));
        assert_eq!(runtime.end_session(), None);

        let next = runtime.begin_session().unwrap();
        assert_ne!(next, id);
    }

    #[test]
    fn test_shutdown_without_monitor_is_immediate() {
        let mut runtime = unmonitored();
        runtime.begin_session().unwrap();

        runtime.shutdown();

        assert!(runtime.is_shut_down());
        assert_eq!(runtime.active_session(), None);
        assert_eq!(runtime.begin_session(), Err(SessionError::ShuttingDown));
    }
}
