//! # Pooled Resource Contract
//!
//! The capability every poolable object must provide.

use std::fmt;

/// Stable identity of a pooled instance.
///
/// Assigned by whoever builds the instance (usually the pool factory) and
/// never reused while that instance is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Creates an id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a pooled instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Parked in a pool's free list.
    #[default]
    Inactive,
    /// Handed out to exactly one caller.
    Active,
}

/// An object that can be recycled through a [`Pool`](super::Pool).
///
/// The pool calls [`activate`](Self::activate) right before handing an
/// instance out and [`deactivate`](Self::deactivate) right before parking it
/// in the free list. Instances are moved in and out of the pool by value, so
/// an instance is never reachable from two owners at once.
///
/// # Example
///
/// ```rust,ignore
/// struct Bullet { id: ResourceId, state: ResourceState, ttl: f32 }
///
/// impl PooledResource for Bullet {
///     fn activate(&mut self) { self.state = ResourceState::Active; }
///     fn deactivate(&mut self) { self.state = ResourceState::Inactive; self.ttl = 0.0; }
///     fn resource_id(&self) -> ResourceId { self.id }
/// }
/// ```
pub trait PooledResource {
    /// Transitions the instance to [`ResourceState::Active`].
    fn activate(&mut self);

    /// Transitions the instance to [`ResourceState::Inactive`] and resets
    /// any per-use state.
    fn deactivate(&mut self);

    /// Identity handle of this instance.
    fn resource_id(&self) -> ResourceId;

    /// Approximate footprint of one instance in bytes.
    ///
    /// Used for the pool's active-memory estimate when no external probe is
    /// attached. Types owning heap buffers should override this.
    #[must_use]
    fn estimated_bytes() -> usize
    where
        Self: Sized,
    {
        std::mem::size_of::<Self>()
    }
}

/// External per-pool memory sampler (profiling handle).
///
/// Owned by a pool and released when the pool is cleared.
pub trait MemoryProbe {
    /// Bytes currently attributed to the pool, if the probe can tell.
    fn sampled_bytes(&self) -> Option<u64>;

    /// Releases whatever the probe holds. Called exactly once.
    fn dispose(&mut self) {}
}
