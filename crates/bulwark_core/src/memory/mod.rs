//! # Memory Management
//!
//! Bounded resource pools and the registry that owns them.
//!
//! ## Design Philosophy
//!
//! Resources are recycled, not freed. During gameplay:
//! - No heap allocations once a pool is warm
//! - No silent growth past a pool's ceiling
//! - Exhaustion is an explicit result the caller has to handle

mod pool;
mod registry;
mod resource;

pub use pool::{Factory, Pool, PoolBuilder, PoolSettings, PoolStats};
pub use registry::{Clearable, PoolRegistry, PoolStatsEntry, RegistryConfig, SharedPool};
pub use resource::{MemoryProbe, PooledResource, ResourceId, ResourceState};
