//! # Projectile Spawner
//!
//! The reference consumer of the pool layer. Projectiles are acquired on
//! spawn, simulated until their lifetime runs out, and released back.
//!
//! Exhaustion policy: **skip**. A spawn that finds the pool full is dropped
//! and counted; the storm goes on with fewer projectiles.

use bulwark_core::{
    PoolError, PoolRegistry, PoolResult, PoolSettings, PooledResource, ResourceId, ResourceState,
    SharedPool,
};

/// A pooled projectile.
#[derive(Debug, Clone)]
pub struct Projectile {
    id: ResourceId,
    state: ResourceState,
    /// World position.
    pub position: [f32; 3],
    /// Velocity in units per second.
    pub velocity: [f32; 3],
    /// Seconds left before despawn.
    pub ttl: f32,
}

impl Projectile {
    /// Builds an inactive projectile.
    #[must_use]
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            state: ResourceState::Inactive,
            position: [0.0; 3],
            velocity: [0.0; 3],
            ttl: 0.0,
        }
    }

    /// Lifecycle state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ResourceState {
        self.state
    }
}

impl PooledResource for Projectile {
    fn activate(&mut self) {
        self.state = ResourceState::Active;
    }

    fn deactivate(&mut self) {
        self.state = ResourceState::Inactive;
        self.position = [0.0; 3];
        self.velocity = [0.0; 3];
        self.ttl = 0.0;
    }

    fn resource_id(&self) -> ResourceId {
        self.id
    }
}

/// Counters for one spawner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnStats {
    /// Projectiles spawned.
    pub spawned: u64,
    /// Spawns skipped because the pool was exhausted.
    pub skipped: u64,
    /// Projectiles that expired and went back to the pool.
    pub expired: u64,
}

/// Spawns, simulates and despawns projectiles.
#[derive(Debug)]
pub struct ProjectileSpawner {
    pool: SharedPool<Projectile>,
    live: Vec<Projectile>,
    stats: SpawnStats,
}

impl ProjectileSpawner {
    /// Name the projectile pool is registered under.
    pub const POOL_NAME: &'static str = "projectiles";

    /// Declares the projectile pool in `registry` and returns a spawner for it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidCapacity`] for bad settings.
    pub fn new(registry: &mut PoolRegistry, settings: PoolSettings) -> PoolResult<Self> {
        let mut next_id = 0;
        let pool = registry.create_pool(
            Self::POOL_NAME,
            move || {
                next_id += 1;
                Projectile::new(ResourceId::new(next_id))
            },
            settings,
        )?;

        Ok(Self {
            pool,
            live: Vec::with_capacity(settings.max_size),
            stats: SpawnStats::default(),
        })
    }

    /// Spawns one projectile.
    ///
    /// Returns `Ok(None)` when the pool is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolBusy`] if the pool is borrowed elsewhere.
    pub fn spawn(
        &mut self,
        position: [f32; 3],
        velocity: [f32; 3],
        ttl: f32,
    ) -> PoolResult<Option<ResourceId>> {
        let acquired = {
            let mut pool = self.pool.try_borrow_mut().map_err(|_| PoolError::PoolBusy {
                pool: Self::POOL_NAME.into(),
            })?;
            pool.acquire()
        };

        match acquired {
            Ok(mut projectile) => {
                projectile.position = position;
                projectile.velocity = velocity;
                projectile.ttl = ttl;
                let id = projectile.resource_id();
                self.live.push(projectile);
                self.stats.spawned += 1;
                Ok(Some(id))
            }
            Err(PoolError::Exhausted { .. }) => {
                self.stats.skipped += 1;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Moves every live projectile and releases the expired ones.
    ///
    /// Returns the number released.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolBusy`] if the pool is borrowed elsewhere.
    pub fn update(&mut self, dt: f32) -> PoolResult<usize> {
        let mut pool = self.pool.try_borrow_mut().map_err(|_| PoolError::PoolBusy {
            pool: Self::POOL_NAME.into(),
        })?;

        let mut released = 0;
        let mut i = 0;
        while i < self.live.len() {
            let projectile = &mut self.live[i];
            projectile.ttl -= dt;
            if projectile.ttl <= 0.0 {
                pool.release(self.live.swap_remove(i));
                released += 1;
                continue;
            }
            for (p, v) in projectile.position.iter_mut().zip(projectile.velocity) {
                *p += v * dt;
            }
            i += 1;
        }

        self.stats.expired += released as u64;
        Ok(released)
    }

    /// Releases every live projectile.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolBusy`] if the pool is borrowed elsewhere.
    pub fn despawn_all(&mut self) -> PoolResult<usize> {
        let mut pool = self.pool.try_borrow_mut().map_err(|_| PoolError::PoolBusy {
            pool: Self::POOL_NAME.into(),
        })?;

        let count = self.live.len();
        for projectile in self.live.drain(..) {
            pool.release(projectile);
        }
        Ok(count)
    }

    /// Projectiles in flight.
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Live projectiles.
    #[inline]
    #[must_use]
    pub fn live(&self) -> &[Projectile] {
        &self.live
    }

    /// Lifetime counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> SpawnStats {
        self.stats
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SharedPool<Projectile> {
        &self.pool
    }
}
