//! # BULWARK
//!
//! Bounded object pools under a tiered memory pressure controller.
//!
//! ## Units
//!
//! | Unit | Crate              | Responsibility                              |
//! |------|--------------------|---------------------------------------------|
//! | 1    | `bulwark_core`     | pooled resources, pools, the registry       |
//! | 2    | `bulwark_pressure` | sampling, tiers, staged cleanup, escalation |
//! | 3    | `bulwark`          | runtime context, clock, sessions            |
//!
//! ## Example
//!
//! ```rust,ignore
//! use bulwark::{HostClock, ProjectileSpawner, Runtime, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_toml_file("bulwark.toml")?;
//! let mut runtime = Runtime::new(&config, samplers, reclaimers)?;
//! let mut spawner = ProjectileSpawner::new(runtime.registry_mut(), config.projectiles)?;
//! let mut clock = HostClock::realtime(60);
//!
//! let session = runtime.begin_session()?;
//! loop {
//!     let now = clock.advance();
//!     spawner.update(clock.tick_duration().as_secs_f32())?;
//!     runtime.tick(now);
//!     clock.wait_for_next_tick();
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod error;
pub mod gameplay;
pub mod runtime;

pub use bulwark_core as core;
pub use bulwark_pressure as pressure;

pub use clock::HostClock;
pub use config::RuntimeConfig;
pub use error::{BulwarkError, BulwarkResult, SessionError};
pub use gameplay::{Projectile, ProjectileSpawner, SpawnStats};
pub use runtime::{Runtime, SessionId};
