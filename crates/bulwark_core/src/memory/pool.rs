//! # Resource Pool
//!
//! Bounded recycler for objects that are spawned and despawned constantly.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::resource::{MemoryProbe, PooledResource};
use crate::error::{PoolError, PoolResult};

/// Factory used to build new instances when the free list runs dry.
pub type Factory<T> = Box<dyn FnMut() -> T>;

/// Capacity settings for one pool.
///
/// Kept separate from the factory so spawner capacity can live in a config
/// file next to the pressure thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Instances built eagerly at creation.
    pub initial_size: usize,
    /// Hard ceiling on active + free instances.
    pub max_size: usize,
}

impl PoolSettings {
    /// Creates settings with the given pre-warm count and ceiling.
    #[must_use]
    pub const fn new(initial_size: usize, max_size: usize) -> Self {
        Self {
            initial_size,
            max_size,
        }
    }

    /// Checks `0 < max_size` and `initial_size <= max_size`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidCapacity`] when either bound is violated.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 || self.initial_size > self.max_size {
            return Err(PoolError::InvalidCapacity {
                initial: self.initial_size,
                max: self.max_size,
            });
        }
        Ok(())
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::new(16, 256)
    }
}

/// Point-in-time statistics for one pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances parked in the free list.
    pub current: usize,
    /// Instances handed out and not yet released.
    pub active: usize,
    /// High-water mark of `active + current`.
    pub peak: usize,
    /// Hard ceiling.
    pub capacity: usize,
    /// Estimated bytes held by active instances.
    pub active_estimate_bytes: u64,
}

/// A bounded pool of recyclable resources.
///
/// Instances are moved out on [`acquire`](Self::acquire) and moved back in on
/// [`release`](Self::release). The free list grows on demand, one instance per
/// call, but `active + free` never exceeds `max_size`.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It is meant to be driven from the host tick.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = Pool::builder("bullets")
///     .factory(|| Bullet::new())
///     .initial_size(64)
///     .max_size(512)
///     .build()?;
///
/// // Acquire - O(1), no allocation while the free list is warm
/// let bullet = pool.acquire()?;
///
/// // Release - O(1), instance goes back to the free list
/// pool.release(bullet);
/// ```
pub struct Pool<T> {
    /// Pool name, used in logs, errors and statistics.
    name: Arc<str>,
    /// Inactive instances ready for reuse.
    free_list: VecDeque<T>,
    /// Builds a new instance when the free list is empty.
    factory: Factory<T>,
    /// Hard ceiling on active + free.
    max_size: usize,
    /// Instances currently handed out.
    active_count: usize,
    /// High-water mark of active + free.
    peak_count: usize,
    /// Whether the most recent acquire had to build a new instance.
    expanded_last_acquire: bool,
    /// Instances built on demand over the pool's lifetime.
    expansion_count: u64,
    /// Optional external memory sampler for this pool.
    probe: Option<Box<dyn MemoryProbe>>,
}

impl<T: PooledResource> Pool<T> {
    /// Starts building a pool.
    #[must_use]
    pub fn builder(name: &str) -> PoolBuilder<T> {
        PoolBuilder::new(name)
    }

    /// Creates a pool, pre-warming `settings.initial_size` instances.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidCapacity`] for a zero ceiling or a
    /// pre-warm count above the ceiling.
    pub fn new<F>(name: &str, factory: F, settings: PoolSettings) -> PoolResult<Self>
    where
        F: FnMut() -> T + 'static,
    {
        Self::from_parts(name, Box::new(factory), settings)
    }

    fn from_parts(name: &str, factory: Factory<T>, settings: PoolSettings) -> PoolResult<Self> {
        settings.validate()?;

        let mut pool = Self {
            name: Arc::from(name),
            free_list: VecDeque::with_capacity(settings.max_size),
            factory,
            max_size: settings.max_size,
            active_count: 0,
            peak_count: 0,
            expanded_last_acquire: false,
            expansion_count: 0,
            probe: None,
        };
        pool.prewarm(settings.initial_size);
        Ok(pool)
    }

    /// Returns the pool name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hard ceiling.
    #[inline]
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the number of instances currently handed out.
    #[inline]
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.active_count
    }

    /// Returns the number of instances parked in the free list.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Returns `active + free`.
    #[inline]
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.active_count + self.free_list.len()
    }

    /// Returns the high-water mark of `active + free`.
    #[inline]
    #[must_use]
    pub const fn peak_count(&self) -> usize {
        self.peak_count
    }

    /// Whether the most recent [`acquire`](Self::acquire) built a new instance.
    #[inline]
    #[must_use]
    pub const fn expanded_last_acquire(&self) -> bool {
        self.expanded_last_acquire
    }

    /// Number of instances built on demand since creation.
    #[inline]
    #[must_use]
    pub const fn expansion_count(&self) -> u64 {
        self.expansion_count
    }

    /// Builds up to `count` inactive instances into the free list.
    ///
    /// Stops at the ceiling. Returns how many were actually built.
    pub fn prewarm(&mut self, count: usize) -> usize {
        let room = self.max_size.saturating_sub(self.total_count());
        let count = count.min(room);

        for _ in 0..count {
            let mut item = (self.factory)();
            item.deactivate();
            self.free_list.push_back(item);
        }

        self.peak_count = self.peak_count.max(self.total_count());
        count
    }

    /// Takes an instance out of the pool.
    ///
    /// Reuses the front of the free list when possible. Otherwise builds one
    /// new instance if the ceiling allows it. The returned instance has been
    /// activated.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Exhausted`] when every slot up to the ceiling is
    /// active. The pool never grows past `max_size`.
    pub fn acquire(&mut self) -> PoolResult<T> {
        self.expanded_last_acquire = false;

        let mut item = if let Some(item) = self.free_list.pop_front() {
            item
        } else {
            let total = self.total_count();
            if total >= self.max_size {
                tracing::debug!(pool = %self.name, capacity = self.max_size, "pool exhausted");
                return Err(PoolError::Exhausted {
                    pool: Arc::clone(&self.name),
                    capacity: self.max_size,
                });
            }

            let item = (self.factory)();
            self.expanded_last_acquire = true;
            self.expansion_count += 1;
            self.peak_count = self.peak_count.max(total + 1);

            tracing::warn!(
                pool = %self.name,
                total = total + 1,
                capacity = self.max_size,
                "pool expanded past its warm size"
            );
            item
        };

        item.activate();
        self.active_count += 1;
        Ok(item)
    }

    /// Returns an instance to the pool.
    ///
    /// The instance is deactivated and parked at the back of the free list.
    /// Releasing more instances than were acquired is a caller bug: the
    /// surplus instance is dropped instead of breaching the ceiling.
    pub fn release(&mut self, mut item: T) {
        item.deactivate();

        if self.active_count == 0 {
            tracing::warn!(
                pool = %self.name,
                resource = %item.resource_id(),
                "release without a matching acquire, dropping instance"
            );
            return;
        }

        self.active_count -= 1;
        self.free_list.push_back(item);
    }

    /// Drops every parked instance and releases the attached probe.
    ///
    /// Active instances stay with their callers. When they are released
    /// later they are parked again as usual. Returns the number of instances
    /// dropped.
    ///
    /// The free list keeps its allocation, so releases after a clear stay
    /// allocation-free.
    pub fn clear(&mut self) -> usize {
        let dropped = self.free_list.len();
        self.free_list.clear();

        if let Some(mut probe) = self.probe.take() {
            probe.dispose();
        }

        if dropped > 0 {
            tracing::debug!(pool = %self.name, dropped, "pool cleared");
        }
        dropped
    }

    /// Attaches an external memory probe, disposing any previous one.
    pub fn attach_probe(&mut self, probe: Box<dyn MemoryProbe>) {
        if let Some(mut old) = self.probe.replace(probe) {
            old.dispose();
        }
    }

    /// Whether a probe is currently attached.
    #[inline]
    #[must_use]
    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    /// Bytes attributed to this pool: the probe's sample when available,
    /// otherwise `total * T::estimated_bytes()`.
    #[must_use]
    pub fn memory_estimate(&self) -> u64 {
        self.probe
            .as_ref()
            .and_then(|probe| probe.sampled_bytes())
            .unwrap_or_else(|| (self.total_count() * T::estimated_bytes()) as u64)
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            current: self.free_list.len(),
            active: self.active_count,
            peak: self.peak_count,
            capacity: self.max_size,
            active_estimate_bytes: (self.active_count * T::estimated_bytes()) as u64,
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("free", &self.free_list.len())
            .field("active", &self.active_count)
            .field("peak", &self.peak_count)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pool`].
///
/// A factory is mandatory: building without one fails immediately instead of
/// on the first acquire.
pub struct PoolBuilder<T> {
    name: String,
    factory: Option<Factory<T>>,
    settings: PoolSettings,
}

impl<T: PooledResource> PoolBuilder<T> {
    /// Creates a builder with default capacity settings.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            factory: None,
            settings: PoolSettings::default(),
        }
    }

    /// Sets the factory.
    #[must_use]
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: FnMut() -> T + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Sets the pre-warm count.
    #[must_use]
    pub fn initial_size(mut self, initial_size: usize) -> Self {
        self.settings.initial_size = initial_size;
        self
    }

    /// Sets the hard ceiling.
    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.settings.max_size = max_size;
        self
    }

    /// Replaces both capacity settings.
    #[must_use]
    pub fn settings(mut self, settings: PoolSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidFactory`] when no factory was set and
    /// [`PoolError::InvalidCapacity`] for bad capacity settings.
    pub fn build(self) -> PoolResult<Pool<T>> {
        let factory = self.factory.ok_or_else(|| PoolError::InvalidFactory {
            pool: Arc::from(self.name.as_str()),
        })?;
        Pool::from_parts(&self.name, factory, self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::resource::{ResourceId, ResourceState};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct Shell {
        id: ResourceId,
        state: ResourceState,
        uses: u32,
    }

    impl PooledResource for Shell {
        fn activate(&mut self) {
            self.state = ResourceState::Active;
            self.uses += 1;
        }

        fn deactivate(&mut self) {
            self.state = ResourceState::Inactive;
        }

        fn resource_id(&self) -> ResourceId {
            self.id
        }
    }

    fn shell_factory() -> impl FnMut() -> Shell {
        let mut next = 0;
        move || {
            next += 1;
            Shell {
                id: ResourceId::new(next),
                state: ResourceState::Active,
                uses: 0,
            }
        }
    }

    #[test]
    fn test_prewarm_parks_inactive_instances() {
        let pool = Pool::new("shells", shell_factory(), PoolSettings::new(3, 8)).unwrap();

        assert_eq!(pool.free_count(), 3);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.peak_count(), 3);
        assert!(pool.free_list.iter().all(|s| s.state == ResourceState::Inactive));
    }

    #[test]
    fn test_acquire_reuses_before_growing() {
        let mut pool = Pool::new("shells", shell_factory(), PoolSettings::new(1, 4)).unwrap();

        let a = pool.acquire().unwrap();
        assert!(!pool.expanded_last_acquire());
        assert_eq!(a.state, ResourceState::Active);

        let b = pool.acquire().unwrap();
        assert!(pool.expanded_last_acquire());
        assert_eq!(pool.expansion_count(), 1);

        pool.release(a);
        let c = pool.acquire().unwrap();
        assert!(!pool.expanded_last_acquire());
        assert_eq!(c.resource_id(), ResourceId::new(1));
        assert_eq!(c.uses, 2);

        pool.release(b);
        pool.release(c);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_exhaustion_at_ceiling() {
        let mut pool = Pool::new("shells", shell_factory(), PoolSettings::new(0, 3)).unwrap();

        let held: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
        let err = pool.acquire().unwrap_err();

        assert!(matches!(err, PoolError::Exhausted { capacity: 3, .. }));
        assert_eq!(pool.total_count(), 3);
        assert_eq!(held.len(), 3);
    }

    #[test]
    fn test_release_without_acquire_is_dropped() {
        let mut pool = Pool::new("shells", shell_factory(), PoolSettings::new(2, 2)).unwrap();
        let stray = Shell {
            id: ResourceId::new(99),
            state: ResourceState::Active,
            uses: 0,
        };

        pool.release(stray);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.total_count(), 2);
    }

    #[test]
    fn test_clear_keeps_active_and_readopts_on_release() {
        let mut pool = Pool::new("shells", shell_factory(), PoolSettings::new(4, 4)).unwrap();
        let held = pool.acquire().unwrap();

        assert_eq!(pool.clear(), 3);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.active_count(), 1);

        pool.release(held);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.active_count(), 0);

        // Clearing an empty pool is harmless.
        pool.clear();
        assert_eq!(pool.clear(), 0);
    }

    #[test]
    fn test_clear_disposes_probe() {
        struct Probe(Rc<Cell<bool>>);
        impl MemoryProbe for Probe {
            fn sampled_bytes(&self) -> Option<u64> {
                Some(4096)
            }
            fn dispose(&mut self) {
                self.0.set(true);
            }
        }

        let disposed = Rc::new(Cell::new(false));
        let mut pool = Pool::new("shells", shell_factory(), PoolSettings::new(1, 2)).unwrap();
        pool.attach_probe(Box::new(Probe(Rc::clone(&disposed))));
        assert_eq!(pool.memory_estimate(), 4096);

        pool.clear();
        assert!(disposed.get());
        assert!(!pool.has_probe());
        assert_eq!(pool.memory_estimate(), 0);
    }

    #[test]
    fn test_clear_keeps_free_list_capacity() {
        let mut pool = Pool::new("shells", shell_factory(), PoolSettings::new(4, 4)).unwrap();
        let held: Vec<_> = (0..2).map(|_| pool.acquire().unwrap()).collect();
        let capacity = pool.free_list.capacity();

        assert_eq!(pool.clear(), 2);
        assert_eq!(pool.free_list.capacity(), capacity);

        for shell in held {
            pool.release(shell);
        }
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.free_list.capacity(), capacity);
    }

    #[test]
    fn test_builder_requires_factory() {
        let err = Pool::<Shell>::builder("orphans").max_size(4).build().unwrap_err();
        assert!(matches!(err, PoolError::InvalidFactory { .. }));
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        let zero = Pool::new("shells", shell_factory(), PoolSettings::new(0, 0));
        assert!(matches!(zero, Err(PoolError::InvalidCapacity { .. })));

        let over = Pool::new("shells", shell_factory(), PoolSettings::new(5, 4));
        assert!(matches!(over, Err(PoolError::InvalidCapacity { initial: 5, max: 4 })));
    }

    #[test]
    fn test_stats_estimate_active_bytes() {
        let mut pool = Pool::new("shells", shell_factory(), PoolSettings::new(2, 4)).unwrap();
        let held = pool.acquire().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.current, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.peak, 2);
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.active_estimate_bytes, std::mem::size_of::<Shell>() as u64);

        pool.release(held);
    }
}
