//! # Pressure Events
//!
//! Diagnostics stream for UI overlays and telemetry. Every subscriber gets
//! its own bounded channel; a full channel drops the event instead of
//! stalling the tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::cleanup::{CleanupKind, CleanupReport};
use crate::tier::PressureTier;

/// Something the controller did or observed.
#[derive(Clone, Debug, PartialEq)]
pub enum PressureEvent {
    /// The classified tier changed.
    TierChanged {
        /// Previous tier.
        from: PressureTier,
        /// New tier.
        to: PressureTier,
        /// Usage that caused the change, in MB.
        usage_mb: f64,
    },
    /// A cleanup routine started.
    CleanupStarted {
        /// Routine severity.
        kind: CleanupKind,
        /// Usage when it started, in MB.
        usage_mb: f64,
    },
    /// A cleanup routine ran all of its stages.
    CleanupFinished {
        /// Routine severity.
        kind: CleanupKind,
        /// What the stages did.
        report: CleanupReport,
        /// Usage measured afterwards, if a reading was available.
        usage_mb: Option<f64>,
    },
    /// Emergency cleanup did not converge; the current state is being restarted.
    HardReset {
        /// Usage that remained after the emergency pass, in MB.
        usage_mb: f64,
    },
    /// The controller stopped monitoring.
    MonitorDisabled {
        /// Why.
        reason: &'static str,
    },
}

/// Handle for receiving pressure events.
#[derive(Clone, Debug)]
pub struct PressureEventReceiver {
    receiver: Receiver<PressureEvent>,
}

impl PressureEventReceiver {
    /// Receives all pending events (non-blocking).
    #[inline]
    pub fn drain(&self) -> Vec<PressureEvent> {
        self.receiver.try_iter().collect()
    }

    /// Receives one event (non-blocking).
    #[inline]
    pub fn try_recv(&self) -> Option<PressureEvent> {
        self.receiver.try_recv().ok()
    }

    /// Checks if there are pending events.
    #[inline]
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.receiver.is_empty()
    }
}

/// Fan-out of pressure events to every subscriber.
#[derive(Debug)]
pub struct PressureEventBus {
    subscribers: Vec<Sender<PressureEvent>>,
    capacity: usize,
    dropped: u64,
}

impl PressureEventBus {
    /// Creates a bus whose per-subscriber channels hold `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Adds a subscriber.
    #[must_use]
    pub fn subscribe(&mut self) -> PressureEventReceiver {
        let (sender, receiver) = bounded(self.capacity);
        self.subscribers.push(sender);
        PressureEventReceiver { receiver }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Events dropped because a subscriber's channel was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Sends `event` to every subscriber without blocking.
    ///
    /// Subscribers whose receiver was dropped are forgotten.
    pub fn publish(&mut self, event: &PressureEvent) {
        let mut dropped = 0;
        self.subscribers
            .retain(|sender| match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
        self.dropped += dropped;
    }
}
