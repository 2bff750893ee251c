//! # BULWARK Pressure
//!
//! Tiered memory pressure controller for the BULWARK runtime.
//!
//! ## Escalation
//!
//! | Tier      | Trigger                         | Action                              |
//! |-----------|---------------------------------|-------------------------------------|
//! | Nominal   | `usage <= warning`              | none                                |
//! | Warning   | `warning < usage <= critical`   | preemptive cleanup, `cooldown`      |
//! | Critical  | `critical < usage <= emergency` | aggressive cleanup, `cooldown / 2`  |
//! | Emergency | `usage > emergency`             | emergency cleanup, then hard reset  |
//!
//! ## Architecture Rules
//!
//! 1. **One stage per tick** - cleanup never stalls a frame
//! 2. **One routine at a time** - triggers during a routine are dropped
//! 3. **No garbage data** - without a valid sampler the monitor stays off
//!
//! ## Example
//!
//! ```rust,ignore
//! use bulwark_pressure::{MemoryPressureMonitor, PressureConfig, ProcStatmSampler};
//!
//! let config = PressureConfig::from_toml_file("pressure.toml")?;
//! let mut monitor = MemoryPressureMonitor::new(
//!     config,
//!     vec![Box::new(ProcStatmSampler::new())],
//!     reclaimers,
//! )?;
//!
//! // Every host tick:
//! monitor.tick(clock.now(), &registry);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod cleanup;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod proc;
pub mod sampler;
pub mod tier;

pub use cleanup::{CleanupKind, CleanupReport, CleanupRoutine, CleanupStage, StepOutcome};
pub use config::{PressureConfig, REFERENCE_SYSTEM_MEMORY_MB};
pub use error::{PressureError, PressureResult};
pub use events::{PressureEvent, PressureEventBus, PressureEventReceiver};
pub use monitor::{MemoryPressureMonitor, MonitorStats};
pub use proc::{MeminfoSystemSampler, ProcStatmSampler};
pub use sampler::{
    select_sampler, AssetReclaimer, CompletedUnload, GarbageCollectorControl, MemorySampler,
    PendingUnload, ProcessRestart, Reclaimers, SystemMemorySampler,
};
pub use tier::{PressureTier, Thresholds};
