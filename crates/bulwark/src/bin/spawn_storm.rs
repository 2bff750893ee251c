//! # Spawn Storm
//!
//! Headless projectile storm against a synthetic heap. Shows the pressure
//! controller walking the escalation ladder while spawners keep running.
//!
//! ## Usage
//!
//! ```bash
//! # 90 simulated seconds with the built-in storm profile
//! ./spawn_storm
//!
//! # Custom duration and config
//! ./spawn_storm 120 bulwark.toml
//! ```
//!
//! The heap model:
//! - every spawn leaves short-lived garbage that collections reclaim
//! - the asset cache grows steadily and is trimmed by asset unloads
//! - during the storm a slow leak accumulates that only a restart clears

use std::cell::RefCell;
use std::f32::consts::TAU;
use std::rc::Rc;
use std::task::Poll;
use std::time::Duration;

use bulwark::core::{MemoryProbe, PoolSettings};
use bulwark::pressure::{
    AssetReclaimer, GarbageCollectorControl, MemorySampler, PendingUnload, PressureEvent,
    PressureTier, ProcessRestart, Reclaimers, Thresholds,
};
use bulwark::{
    BulwarkError, BulwarkResult, HostClock, Projectile, ProjectileSpawner, Runtime, RuntimeConfig,
    SessionError,
};

/// Simulation rate.
const TICK_RATE: u32 = 60;

/// Storm window, in simulated seconds.
const STORM: (f32, f32) = (10.0, 55.0);

/// Spawns per tick inside and outside the storm.
const STORM_SPAWNS: usize = 24;
const CALM_SPAWNS: usize = 2;

/// Garbage left behind by one spawn, in MB.
const CHURN_MB: f64 = 0.012;
/// Asset cache growth per tick, in MB.
const ASSET_GROWTH_MB: f64 = 0.02;
/// Leak per storm tick, in MB.
const LEAK_MB: f64 = 0.045;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// =============================================================================
// Synthetic heap
// =============================================================================

#[derive(Debug, Default)]
struct Heap {
    base_mb: f64,
    assets_mb: f64,
    garbage_mb: f64,
    leaked_mb: f64,
    projectile_mb: f64,
    restart_requested: bool,
    collections: u32,
    unloads: u32,
}

impl Heap {
    fn usage_mb(&self) -> f64 {
        self.base_mb + self.assets_mb + self.garbage_mb + self.leaked_mb + self.projectile_mb
    }
}

type SharedHeap = Rc<RefCell<Heap>>;

struct HeapSampler(SharedHeap);

impl MemorySampler for HeapSampler {
    fn name(&self) -> &str {
        "synthetic-heap"
    }

    fn current_usage_mb(&mut self) -> Option<f64> {
        Some(self.0.borrow().usage_mb())
    }

    fn is_valid(&self) -> bool {
        true
    }
}

/// Asset unload that streams out over a few ticks.
struct StreamedUnload {
    heap: SharedHeap,
    polls_left: u32,
}

impl PendingUnload for StreamedUnload {
    fn poll_unload(&mut self) -> Poll<usize> {
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return Poll::Pending;
        }
        let mut heap = self.heap.borrow_mut();
        let released_mb = heap.assets_mb * 0.75;
        heap.assets_mb -= released_mb;
        heap.unloads += 1;
        // Roughly one asset per 4 MB.
        Poll::Ready((released_mb / 4.0).round() as usize)
    }
}

struct AssetCache(SharedHeap);

impl AssetReclaimer for AssetCache {
    fn unload_unused_assets(&mut self) -> Box<dyn PendingUnload> {
        Box::new(StreamedUnload {
            heap: Rc::clone(&self.0),
            polls_left: 2,
        })
    }
}

struct Collector(SharedHeap);

impl GarbageCollectorControl for Collector {
    fn collect(&mut self, generation: u8, aggressive: bool) {
        let reclaimed = match (generation, aggressive) {
            (_, true) => 0.95,
            (0, false) => 0.3,
            (1, false) => 0.5,
            _ => 0.7,
        };
        let mut heap = self.0.borrow_mut();
        heap.garbage_mb *= 1.0 - reclaimed;
        heap.collections += 1;
    }

    fn wait_for_finalizers(&mut self) {}
}

struct SceneReload(SharedHeap);

impl ProcessRestart for SceneReload {
    fn restart_current_state(&mut self) {
        let mut heap = self.0.borrow_mut();
        heap.assets_mb = 0.0;
        heap.garbage_mb = 0.0;
        heap.leaked_mb = 0.0;
        heap.restart_requested = true;
    }
}

/// Reports the projectile pool's footprint from the heap model.
struct ProjectileFootprint(SharedHeap);

impl MemoryProbe for ProjectileFootprint {
    fn sampled_bytes(&self) -> Option<u64> {
        Some((self.0.borrow().projectile_mb * BYTES_PER_MB) as u64)
    }
}

// =============================================================================
// Storm
// =============================================================================

fn storm_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.pressure.settle_delay_secs = 2.0;
    config.pressure.cooldown_secs = 3.0;
    config.pressure.thresholds = Thresholds::new(400.0, 480.0, 560.0, 640.0);
    config.projectiles = PoolSettings::new(256, 2048);
    config
}

fn parse_args() -> BulwarkResult<(u64, RuntimeConfig)> {
    let mut args = std::env::args().skip(1);

    let seconds = match args.next() {
        Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
            eprintln!("   ✗ Invalid duration '{raw}', expected whole seconds");
            std::process::exit(2);
        }),
        None => 90,
    };

    let config = match args.next() {
        Some(path) => {
            println!("📄 Loading config from {path}");
            RuntimeConfig::from_toml_file(path)?
        }
        None => storm_config(),
    };

    Ok((seconds, config))
}

fn spawn_rate(t: f32) -> usize {
    if (STORM.0..STORM.1).contains(&t) {
        STORM_SPAWNS
    } else {
        CALM_SPAWNS
    }
}

fn describe(event: &PressureEvent) -> String {
    match event {
        PressureEvent::TierChanged { from, to, usage_mb } => {
            let arrow = if to > from { "▲" } else { "▼" };
            format!("{arrow} {from} → {to} ({usage_mb:.1} MB)")
        }
        PressureEvent::CleanupStarted { kind, usage_mb } => {
            format!("  ⟳ {kind} cleanup started ({usage_mb:.1} MB)")
        }
        PressureEvent::CleanupFinished {
            kind,
            report,
            usage_mb,
        } => {
            let after = usage_mb.map_or_else(|| "n/a".to_owned(), |mb| format!("{mb:.1} MB"));
            format!(
                "  ✓ {kind} cleanup finished in {} ticks: {} pools, {} assets, {} passes → {after}",
                report.ticks, report.pools_cleared, report.assets_released, report.collections
            )
        }
        PressureEvent::HardReset { usage_mb } => {
            format!("  ✗ HARD RESET: cleanup did not converge ({usage_mb:.1} MB)")
        }
        PressureEvent::MonitorDisabled { reason } => format!("  ■ monitor disabled: {reason}"),
    }
}

fn run() -> BulwarkResult<()> {
    let (seconds, config) = parse_args()?;

    let heap: SharedHeap = Rc::new(RefCell::new(Heap {
        base_mb: 380.0,
        ..Heap::default()
    }));
    let reclaimers = Reclaimers::new(
        Box::new(AssetCache(Rc::clone(&heap))),
        Box::new(Collector(Rc::clone(&heap))),
        Box::new(SceneReload(Rc::clone(&heap))),
    );

    let mut runtime = Runtime::new(
        &config,
        vec![Box::new(HeapSampler(Rc::clone(&heap)))],
        reclaimers,
    )?;
    let events = runtime.subscribe();
    let mut spawner = ProjectileSpawner::new(runtime.registry_mut(), config.projectiles)?;
    runtime
        .registry()
        .attach_probe::<Projectile>(Box::new(ProjectileFootprint(Rc::clone(&heap))))?;

    let thresholds = config.pressure.thresholds;
    println!(
        "  Thresholds: warning {:.0} / critical {:.0} / emergency {:.0} MB",
        thresholds.warning, thresholds.critical, thresholds.emergency
    );
    println!(
        "  Pool:       {} warm, {} max",
        config.projectiles.initial_size, config.projectiles.max_size
    );
    println!("  Duration:   {seconds} s @ {TICK_RATE} Hz");
    println!();

    let mut clock = HostClock::fixed_step(TICK_RATE);
    let dt = clock.tick_duration().as_secs_f32();
    let end = Duration::from_secs(seconds);
    let projectile_mb = std::mem::size_of::<Projectile>() as f64 / BYTES_PER_MB;

    let mut restarts = 0_u32;
    let mut peak_tier = PressureTier::Nominal;
    let mut peak_usage = 0.0_f64;
    runtime.begin_session()?;

    while clock.now() < end {
        let now = clock.advance();
        let t = now.as_secs_f32();

        // Spawn in a ring; direction from the spawn index.
        if runtime.active_session().is_some() {
            let rate = spawn_rate(t);
            for k in 0..rate {
                let angle = TAU * k as f32 / rate as f32 + t;
                let velocity = [angle.cos() * 40.0, 0.0, angle.sin() * 40.0];
                if spawner.spawn([0.0; 3], velocity, 1.5)?.is_some() {
                    heap.borrow_mut().garbage_mb += CHURN_MB;
                }
            }
        }
        spawner.update(dt)?;

        {
            let mut heap = heap.borrow_mut();
            heap.assets_mb += ASSET_GROWTH_MB;
            if (STORM.0..STORM.1).contains(&t) {
                heap.leaked_mb += LEAK_MB;
            }
            let pooled = spawner.pool().borrow().total_count();
            heap.projectile_mb = pooled as f64 * projectile_mb;
            peak_usage = peak_usage.max(heap.usage_mb());
        }

        runtime.tick(now);

        for event in events.drain() {
            println!("[t={t:>6.2}s] {}", describe(&event));
        }
        peak_tier = peak_tier.max(runtime.monitor().tier());

        let restart = std::mem::take(&mut heap.borrow_mut().restart_requested);
        if restart {
            restarts += 1;
            let despawned = spawner.despawn_all()?;
            runtime.end_session();
            println!("[t={t:>6.2}s]   ↺ state restarted, {despawned} projectiles despawned");
        }

        if runtime.active_session().is_none() {
            match runtime.begin_session() {
                Ok(id) => println!("[t={t:>6.2}s]   ▶ {id} started"),
                Err(SessionError::EmergencyMode) => {}
                Err(err) => return Err(BulwarkError::from(err)),
            }
        }
    }

    spawner.despawn_all()?;
    runtime.registry_mut().force_refresh_stats(clock.now());
    let pool_stats: Vec<_> = runtime
        .registry()
        .all_stats()
        .iter()
        .map(|(name, entry)| (name.clone(), *entry))
        .collect();
    let monitor_stats = runtime.monitor().stats();
    let spawn_stats = spawner.stats();
    let (collections, unloads) = {
        let heap = heap.borrow();
        (heap.collections, heap.unloads)
    };

    runtime.shutdown();
    while !runtime.is_shut_down() {
        runtime.tick(clock.advance());
    }

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║                       SPAWN STORM SUMMARY                        ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();
    println!("┌─ SPAWNER ────────────────────────────────────────────────────────┐");
    println!("│ Spawned:            {}", spawn_stats.spawned);
    println!("│ Skipped (full):     {}", spawn_stats.skipped);
    println!("│ Expired:            {}", spawn_stats.expired);
    for (name, entry) in &pool_stats {
        println!(
            "│ Pool '{name}':  {} free, peak {}, {:.1} KB",
            entry.current,
            entry.peak,
            entry.memory_estimate as f64 / 1024.0
        );
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ PRESSURE ───────────────────────────────────────────────────────┐");
    println!("│ Peak usage:         {peak_usage:.1} MB");
    println!("│ Peak tier:          {peak_tier}");
    println!("│ Samples:            {} ({} settling)", monitor_stats.samples, monitor_stats.ignored_samples);
    println!("│ Preemptive:         {}", monitor_stats.preemptive_runs);
    println!("│ Aggressive:         {}", monitor_stats.aggressive_runs);
    println!("│ Emergency:          {}", monitor_stats.emergency_runs);
    println!("│ Dropped triggers:   {}", monitor_stats.dropped_triggers);
    println!("│ Hard resets:        {} ({restarts} restarts)", monitor_stats.hard_resets);
    println!("│ Sessions refused:   {}", runtime.sessions_refused());
    println!("│ Heap passes:        {collections} collections, {unloads} unloads");
    println!("└──────────────────────────────────────────────────────────────────┘");

    Ok(())
}

fn main() {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    BULWARK SPAWN STORM v0.1.0");
    println!("                         HEADLESS MODE");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();

    if let Err(err) = run() {
        eprintln!("   ✗ FATAL: {err}");
        std::process::exit(1);
    }
}
