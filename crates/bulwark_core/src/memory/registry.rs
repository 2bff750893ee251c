//! # Pool Registry
//!
//! One pool per resource type, created explicitly at subsystem start-up and
//! cleared wholesale by the memory pressure controller.
//!
//! ## Ownership
//!
//! ```text
//! PoolRegistry
//!  ├─ TypeId(Bullet) ──> Rc<RefCell<Pool<Bullet>>> ──┬─> spawner (typed handle)
//!  │                                                 └─> clear_all (dyn Clearable)
//!  └─ TypeId(Spark)  ──> Rc<RefCell<Pool<Spark>>>  ──> ...
//! ```
//!
//! The map only grows during start-up. Everything runs on the host tick, so
//! shared handles are `Rc<RefCell<_>>` rather than locks.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pool::{Pool, PoolSettings, PoolStats};
use super::resource::{MemoryProbe, PooledResource};
use crate::error::{PoolError, PoolResult};

/// Shared handle to a registered pool.
pub type SharedPool<T> = Rc<RefCell<Pool<T>>>;

/// Type-erased view of a pool used for bulk reclamation and statistics.
///
/// Implemented by every [`Pool<T>`]; the registry keeps one of these per
/// registered type so it never has to know the concrete resource type.
pub trait Clearable {
    /// Pool name.
    fn name(&self) -> &str;

    /// Drops parked instances. Returns how many were dropped.
    fn clear(&mut self) -> usize;

    /// Current statistics.
    fn stats(&self) -> PoolStats;

    /// Bytes attributed to the pool.
    fn memory_estimate(&self) -> u64;
}

impl<T: PooledResource> Clearable for Pool<T> {
    fn name(&self) -> &str {
        Pool::name(self)
    }

    fn clear(&mut self) -> usize {
        Pool::clear(self)
    }

    fn stats(&self) -> PoolStats {
        Pool::stats(self)
    }

    fn memory_estimate(&self) -> u64 {
        Pool::memory_estimate(self)
    }
}

/// Registry configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Minimum time between two statistics refreshes, in seconds.
    pub stats_interval_secs: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: 1.0,
        }
    }
}

impl RegistryConfig {
    /// Statistics cadence as a [`Duration`]. Invalid values fall back to 1s.
    #[must_use]
    pub fn stats_interval(&self) -> Duration {
        if self.stats_interval_secs.is_finite() && self.stats_interval_secs >= 0.0 {
            Duration::from_secs_f64(self.stats_interval_secs)
        } else {
            Duration::from_secs(1)
        }
    }
}

/// One row of the aggregated statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStatsEntry {
    /// Instances parked in the free list.
    pub current: usize,
    /// High-water mark of active + free.
    pub peak: usize,
    /// Bytes attributed to the pool.
    pub memory_estimate: u64,
}

struct RegisteredPool {
    name: String,
    type_name: &'static str,
    /// The `Rc<RefCell<Pool<T>>>`, kept for typed lookups.
    typed: Rc<dyn Any>,
    /// The same pool, viewed through [`Clearable`].
    erased: Rc<RefCell<dyn Clearable>>,
}

/// Process-wide map from resource type to its pool.
///
/// Constructed explicitly and owned by the runtime context; there is no
/// global instance.
pub struct PoolRegistry {
    /// Registered pools keyed by resource type.
    pools: HashMap<TypeId, RegisteredPool>,
    /// Registration order, for deterministic iteration.
    order: Vec<TypeId>,
    /// Cached statistics keyed by pool name.
    stats: BTreeMap<String, PoolStatsEntry>,
    /// Minimum time between refreshes.
    stats_interval: Duration,
    /// Timestamp of the last refresh.
    last_refresh: Option<Duration>,
}

impl PoolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            pools: HashMap::new(),
            order: Vec::new(),
            stats: BTreeMap::new(),
            stats_interval: config.stats_interval(),
            last_refresh: None,
        }
    }

    /// Number of registered pools.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no pool has been registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered pool names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter_map(|id| self.pools.get(id))
            .map(|entry| entry.name.as_str())
    }

    /// Declares the pool for resource type `T`.
    ///
    /// On first call the pool is built and `settings.initial_size` instances
    /// are pre-warmed. A second call for the same type logs a warning and
    /// returns the existing pool; the new factory and settings are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidCapacity`] for bad settings on first
    /// creation, and [`PoolError::DuplicateName`] if another resource type
    /// already registered `name`.
    pub fn create_pool<T, F>(
        &mut self,
        name: &str,
        factory: F,
        settings: PoolSettings,
    ) -> PoolResult<SharedPool<T>>
    where
        T: PooledResource + 'static,
        F: FnMut() -> T + 'static,
    {
        let key = TypeId::of::<T>();

        if let Some(entry) = self.pools.get(&key) {
            tracing::warn!(
                pool = %entry.name,
                requested = name,
                "duplicate pool registration, returning existing pool"
            );
            return Self::downcast::<T>(entry);
        }

        if let Some(owner) = self.pools.values().find(|entry| entry.name == name) {
            tracing::error!(
                pool = name,
                owner = owner.type_name,
                requested = type_name::<T>(),
                "pool name already taken by another resource type"
            );
            return Err(PoolError::DuplicateName {
                pool: Arc::from(name),
                owner: owner.type_name,
            });
        }

        let pool: SharedPool<T> = Rc::new(RefCell::new(Pool::new(name, factory, settings)?));
        let erased: Rc<RefCell<dyn Clearable>> = pool.clone();
        let typed: Rc<dyn Any> = pool.clone();

        self.pools.insert(
            key,
            RegisteredPool {
                name: name.to_owned(),
                type_name: type_name::<T>(),
                typed,
                erased,
            },
        );
        self.order.push(key);

        tracing::info!(
            pool = name,
            initial = settings.initial_size,
            max = settings.max_size,
            "pool registered"
        );
        Ok(pool)
    }

    /// Looks up the pool for resource type `T`.
    ///
    /// Never creates a pool on demand.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotFound`] when `T` was never declared.
    pub fn get_pool<T>(&self) -> PoolResult<SharedPool<T>>
    where
        T: PooledResource + 'static,
    {
        match self.pools.get(&TypeId::of::<T>()) {
            Some(entry) => Self::downcast::<T>(entry),
            None => {
                tracing::warn!(type_name = type_name::<T>(), "pool lookup for undeclared type");
                Err(PoolError::NotFound {
                    type_name: type_name::<T>(),
                })
            }
        }
    }

    /// Attaches an external memory probe to the pool for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotFound`] for an undeclared type and
    /// [`PoolError::PoolBusy`] if the pool is borrowed right now.
    pub fn attach_probe<T>(&self, probe: Box<dyn MemoryProbe>) -> PoolResult<()>
    where
        T: PooledResource + 'static,
    {
        let pool = self.get_pool::<T>()?;
        let mut pool = pool.try_borrow_mut().map_err(|_| PoolError::PoolBusy {
            pool: self.name_of::<T>().into(),
        })?;
        pool.attach_probe(probe);
        Ok(())
    }

    /// Clears every registered pool.
    ///
    /// A pool that is borrowed at this moment is skipped and picked up by the
    /// next call. Returns the number of pools actually cleared.
    pub fn clear_all(&self) -> usize {
        let mut cleared = 0;
        let mut dropped = 0;

        for entry in self.order.iter().filter_map(|id| self.pools.get(id)) {
            if let Ok(mut pool) = entry.erased.try_borrow_mut() {
                dropped += pool.clear();
                cleared += 1;
            } else {
                tracing::warn!(pool = %entry.name, "pool busy during clear, skipped");
            }
        }

        tracing::info!(pools = cleared, instances = dropped, "cleared registered pools");
        cleared
    }

    /// Recomputes the cached statistics if the cadence allows it.
    ///
    /// Returns `true` when a refresh happened.
    pub fn refresh_stats(&mut self, now: Duration) -> bool {
        if let Some(last) = self.last_refresh {
            if now.saturating_sub(last) < self.stats_interval {
                return false;
            }
        }
        self.force_refresh_stats(now);
        true
    }

    /// Recomputes the cached statistics unconditionally.
    pub fn force_refresh_stats(&mut self, now: Duration) {
        for entry in self.order.iter().filter_map(|id| self.pools.get(id)) {
            // A busy pool keeps its previous row.
            let Ok(pool) = entry.erased.try_borrow() else {
                continue;
            };
            let stats = pool.stats();
            self.stats.insert(
                entry.name.clone(),
                PoolStatsEntry {
                    current: stats.current,
                    peak: stats.peak,
                    memory_estimate: pool.memory_estimate(),
                },
            );
        }
        self.last_refresh = Some(now);
    }

    /// Cached statistics keyed by pool name.
    #[inline]
    #[must_use]
    pub fn all_stats(&self) -> &BTreeMap<String, PoolStatsEntry> {
        &self.stats
    }

    /// Sum over the cached statistics.
    #[must_use]
    pub fn totals(&self) -> PoolStatsEntry {
        self.stats
            .values()
            .fold(PoolStatsEntry::default(), |acc, row| PoolStatsEntry {
                current: acc.current + row.current,
                peak: acc.peak + row.peak,
                memory_estimate: acc.memory_estimate + row.memory_estimate,
            })
    }

    /// Clears and drops every pool. The registry is empty afterwards.
    ///
    /// Handles still held elsewhere keep their pool alive until dropped.
    pub fn teardown(&mut self) {
        let count = self.len();
        self.clear_all();
        self.pools.clear();
        self.order.clear();
        self.stats.clear();
        self.last_refresh = None;
        tracing::info!(pools = count, "pool registry torn down");
    }

    fn name_of<T: 'static>(&self) -> String {
        self.pools
            .get(&TypeId::of::<T>())
            .map_or_else(|| type_name::<T>().to_owned(), |entry| entry.name.clone())
    }

    fn downcast<T>(entry: &RegisteredPool) -> PoolResult<SharedPool<T>>
    where
        T: PooledResource + 'static,
    {
        Rc::clone(&entry.typed)
            .downcast::<RefCell<Pool<T>>>()
            .map_err(|_| PoolError::NotFound {
                type_name: type_name::<T>(),
            })
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl Drop for PoolRegistry {
    fn drop(&mut self) {
        if !self.is_empty() {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::resource::{ResourceId, ResourceState};

    struct Ember {
        id: ResourceId,
        state: ResourceState,
    }

    impl PooledResource for Ember {
        fn activate(&mut self) {
            self.state = ResourceState::Active;
        }
        fn deactivate(&mut self) {
            self.state = ResourceState::Inactive;
        }
        fn resource_id(&self) -> ResourceId {
            self.id
        }
    }

    struct Shard(ResourceId);

    impl PooledResource for Shard {
        fn activate(&mut self) {}
        fn deactivate(&mut self) {}
        fn resource_id(&self) -> ResourceId {
            self.0
        }
    }

    fn ember() -> Ember {
        Ember {
            id: ResourceId::new(0),
            state: ResourceState::Inactive,
        }
    }

    #[test]
    fn test_create_prewarms() {
        let mut registry = PoolRegistry::default();
        let pool = registry
            .create_pool("embers", ember, PoolSettings::new(5, 10))
            .unwrap();

        assert_eq!(pool.borrow().free_count(), 5);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["embers"]);

        let lit = pool.borrow_mut().acquire().unwrap();
        assert_eq!(lit.state, ResourceState::Active);
    }

    #[test]
    fn test_duplicate_create_returns_same_pool() {
        let mut registry = PoolRegistry::default();
        let first = registry
            .create_pool("embers", ember, PoolSettings::new(2, 4))
            .unwrap();
        let second = registry
            .create_pool("embers-again", ember, PoolSettings::new(8, 8))
            .unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.borrow().max_size(), 4);
        assert_eq!(registry.len(), 1);

        let looked_up = registry.get_pool::<Ember>().unwrap();
        assert_eq!(looked_up.borrow().stats(), first.borrow().stats());
    }

    #[test]
    fn test_name_taken_by_other_type_is_rejected() {
        let mut registry = PoolRegistry::default();
        registry
            .create_pool("fx", ember, PoolSettings::new(3, 4))
            .unwrap();
        let err = registry
            .create_pool("fx", || Shard(ResourceId::new(1)), PoolSettings::new(5, 8))
            .unwrap_err();

        assert!(matches!(err, PoolError::DuplicateName { ref pool, .. } if &**pool == "fx"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get_pool::<Shard>().is_err());

        // Distinct names keep one stats row per pool.
        registry
            .create_pool("shards", || Shard(ResourceId::new(1)), PoolSettings::new(5, 8))
            .unwrap();
        registry.force_refresh_stats(Duration::ZERO);
        assert_eq!(registry.all_stats().len(), 2);
        assert_eq!(registry.totals().current, 8);
    }

    #[test]
    fn test_get_pool_never_fabricates() {
        let registry = PoolRegistry::default();
        let err = registry.get_pool::<Ember>().unwrap_err();

        assert!(matches!(err, PoolError::NotFound { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear_all_skips_busy_pool() {
        let mut registry = PoolRegistry::default();
        let embers = registry
            .create_pool("embers", ember, PoolSettings::new(3, 3))
            .unwrap();
        let shards = registry
            .create_pool("shards", || Shard(ResourceId::new(1)), PoolSettings::new(2, 2))
            .unwrap();

        let guard = shards.borrow_mut();
        assert_eq!(registry.clear_all(), 1);
        drop(guard);

        assert_eq!(embers.borrow().free_count(), 0);
        assert_eq!(shards.borrow().free_count(), 2);

        assert_eq!(registry.clear_all(), 2);
        assert_eq!(shards.borrow().free_count(), 0);
    }

    #[test]
    fn test_stats_refresh_on_cadence() {
        let mut registry = PoolRegistry::new(&RegistryConfig {
            stats_interval_secs: 1.0,
        });
        let pool = registry
            .create_pool("embers", ember, PoolSettings::new(2, 4))
            .unwrap();

        assert!(registry.refresh_stats(Duration::ZERO));
        assert_eq!(registry.all_stats()["embers"].current, 2);

        let held = pool.borrow_mut().acquire().unwrap();
        assert!(!registry.refresh_stats(Duration::from_millis(500)));
        assert_eq!(registry.all_stats()["embers"].current, 2);

        assert!(registry.refresh_stats(Duration::from_secs(1)));
        assert_eq!(registry.all_stats()["embers"].current, 1);
        assert_eq!(registry.all_stats()["embers"].peak, 2);

        pool.borrow_mut().release(held);
    }

    #[test]
    fn test_totals_sum_rows() {
        let mut registry = PoolRegistry::default();
        registry
            .create_pool("embers", ember, PoolSettings::new(2, 4))
            .unwrap();
        registry
            .create_pool("shards", || Shard(ResourceId::new(1)), PoolSettings::new(3, 4))
            .unwrap();
        registry.force_refresh_stats(Duration::ZERO);

        let totals = registry.totals();
        assert_eq!(totals.current, 5);
        assert_eq!(totals.peak, 5);
        assert_eq!(
            totals.memory_estimate,
            (2 * std::mem::size_of::<Ember>() + 3 * std::mem::size_of::<Shard>()) as u64
        );
    }

    #[test]
    fn test_teardown_empties_registry() {
        let mut registry = PoolRegistry::default();
        let pool = registry
            .create_pool("embers", ember, PoolSettings::new(2, 4))
            .unwrap();
        registry.force_refresh_stats(Duration::ZERO);

        registry.teardown();

        assert!(registry.is_empty());
        assert!(registry.all_stats().is_empty());
        assert_eq!(pool.borrow().free_count(), 0);
        assert!(registry.get_pool::<Ember>().is_err());
    }
}
