//! Integration tests for pool capacity and conservation.

use bulwark_core::{
    Pool, PoolError, PoolRegistry, PoolSettings, PooledResource, ResourceId, ResourceState,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Drone {
    id: ResourceId,
    state: ResourceState,
}

impl PooledResource for Drone {
    fn activate(&mut self) {
        assert_eq!(self.state, ResourceState::Inactive, "activated twice");
        self.state = ResourceState::Active;
    }

    fn deactivate(&mut self) {
        self.state = ResourceState::Inactive;
    }

    fn resource_id(&self) -> ResourceId {
        self.id
    }
}

fn drone_factory() -> impl FnMut() -> Drone {
    let mut next = 0;
    move || {
        next += 1;
        Drone {
            id: ResourceId::new(next),
            state: ResourceState::Inactive,
        }
    }
}

#[test]
fn test_capacity_and_conservation_under_random_traffic() {
    for seed in 0..32_u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let max = rng.gen_range(1..=12);
        let initial = rng.gen_range(0..=max);
        let mut pool = Pool::new("drones", drone_factory(), PoolSettings::new(initial, max)).unwrap();

        let mut held: Vec<Drone> = Vec::new();
        let mut acquired = 0_usize;
        let mut released = 0_usize;

        for _ in 0..500 {
            if rng.gen_bool(0.55) {
                match pool.acquire() {
                    Ok(drone) => {
                        assert_eq!(drone.state, ResourceState::Active);
                        acquired += 1;
                        held.push(drone);
                    }
                    Err(PoolError::Exhausted { capacity, .. }) => {
                        assert_eq!(capacity, max);
                        assert_eq!(held.len(), max);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            } else if !held.is_empty() {
                let index = rng.gen_range(0..held.len());
                pool.release(held.swap_remove(index));
                released += 1;
            }

            assert!(pool.total_count() <= max, "seed {seed}: ceiling breached");
            assert_eq!(pool.active_count(), acquired - released, "seed {seed}");
            assert_eq!(pool.active_count(), held.len());
            assert!(pool.peak_count() <= max);
        }

        for drone in held.drain(..) {
            pool.release(drone);
        }
        assert_eq!(pool.active_count(), 0);
    }
}

#[test]
fn test_fourth_acquire_exhausts_pool_of_three() {
    let mut pool = Pool::new("drones", drone_factory(), PoolSettings::new(0, 3)).unwrap();

    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    let c = pool.acquire().unwrap();

    assert!(matches!(pool.acquire(), Err(PoolError::Exhausted { capacity: 3, .. })));
    assert_eq!(pool.total_count(), 3);

    for drone in [a, b, c] {
        pool.release(drone);
    }
}

#[test]
fn test_growth_sequence_up_to_ceiling() {
    let mut registry = PoolRegistry::default();
    let pool = registry
        .create_pool("drones", drone_factory(), PoolSettings::new(2, 4))
        .unwrap();
    let mut pool = pool.borrow_mut();

    let first = pool.acquire().unwrap();
    assert!(!pool.expanded_last_acquire());
    let second = pool.acquire().unwrap();
    assert!(!pool.expanded_last_acquire());
    assert_eq!(pool.peak_count(), 2);

    let third = pool.acquire().unwrap();
    assert!(pool.expanded_last_acquire());
    assert_eq!(pool.peak_count(), 3);

    let fourth = pool.acquire().unwrap();
    assert!(pool.expanded_last_acquire());
    assert_eq!(pool.peak_count(), 4);

    assert!(matches!(pool.acquire(), Err(PoolError::Exhausted { .. })));
    assert!(!pool.expanded_last_acquire());
    assert_eq!(pool.expansion_count(), 2);

    for drone in [first, second, third, fourth] {
        pool.release(drone);
    }
    assert_eq!(pool.free_count(), 4);
}

#[test]
fn test_ids_are_never_shared_between_holders() {
    let mut pool = Pool::new("drones", drone_factory(), PoolSettings::new(4, 4)).unwrap();

    let held: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
    let mut ids: Vec<_> = held.iter().map(PooledResource::resource_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    for drone in held {
        pool.release(drone);
    }
}
