//! # BULWARK Core
//!
//! Bounded resource pooling for spawn-heavy simulations:
//! - Zero allocations once a pool is warm
//! - Hard per-type ceilings, even under spawn storms
//! - One explicitly declared pool per resource type
//!
//! ## Architecture Rules
//!
//! 1. **Recycle, don't free** - instances cycle through a free list
//! 2. **Never grow silently** - a full pool answers with `PoolError::Exhausted`
//! 3. **Single logical thread** - pools are driven from the host tick, no locks
//!
//! ## Example
//!
//! ```rust,ignore
//! use bulwark_core::{PoolRegistry, PoolSettings};
//!
//! let mut registry = PoolRegistry::default();
//! let bullets = registry.create_pool("bullets", Bullet::new, PoolSettings::new(64, 512))?;
//!
//! let bullet = bullets.borrow_mut().acquire()?;
//! bullets.borrow_mut().release(bullet);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod memory;

pub use error::{PoolError, PoolResult};
pub use memory::{
    Clearable, Factory, MemoryProbe, Pool, PoolBuilder, PoolRegistry, PoolSettings, PoolStats,
    PoolStatsEntry, PooledResource, RegistryConfig, ResourceId, ResourceState, SharedPool,
};
