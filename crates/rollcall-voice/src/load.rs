//! Load-driven playback queue sizing.
//!
//! The playback worker asks [`LoadBalancer::get_optimal_queue_size`] for a
//! fresh capacity every time it dequeues a task. Busy CPUs shrink the queue,
//! free memory grows it:
//!
//! ```text
//!   dynamic_base = 3 + floor(available_gb * 5)
//!   combined     = sqrt(cpu_factor * memory_factor)
//!   size         = clamp(round(dynamic_base * combined), 3, 100)
//! ```
//!
//! Both factors are piecewise-linear lookups. The formula itself lives in the
//! pure [`optimal_queue_size`] so it can be checked without touching the host.

use std::sync::{Arc, Mutex, PoisonError};

use sysinfo::{MemoryRefreshKind, System};

/// Smallest queue capacity ever returned; also the fallback when sampling fails.
pub const MIN_QUEUE_SIZE: usize = 3;

/// Largest queue capacity ever returned.
pub const MAX_QUEUE_SIZE: usize = 100;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CPU utilisation (%) → factor. Decreasing.
const CPU_FACTORS: [(f64, f64); 10] = [
    (0.0, 1.0),
    (10.0, 0.9),
    (20.0, 0.8),
    (30.0, 0.7),
    (40.0, 0.6),
    (50.0, 0.5),
    (60.0, 0.4),
    (70.0, 0.3),
    (80.0, 0.2),
    (90.0, 0.1),
];

/// Available memory (GB) → factor. Increasing.
const MEMORY_FACTORS: [(f64, f64); 9] = [
    (0.0, 0.2),
    (0.5, 0.3),
    (1.0, 0.4),
    (2.0, 0.5),
    (4.0, 0.6),
    (8.0, 0.7),
    (16.0, 0.8),
    (32.0, 0.9),
    (64.0, 1.0),
];

/// One reading of host pressure. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    /// Global CPU utilisation, 0–100.
    pub cpu_percent: f64,

    /// Memory available to new allocations, in GB.
    pub available_memory_gb: f64,
}

/// Source of [`LoadSample`]s.
#[cfg_attr(test, mockall::automock)]
pub trait LoadProbe: Send + Sync {
    /// Take a reading, or `None` if the host cannot be queried.
    fn sample(&self) -> Option<LoadSample>;
}

/// [`LoadProbe`] backed by `sysinfo`.
///
/// CPU usage is the delta between consecutive refreshes. Construction takes
/// the first refresh, so the first sample covers the time since `new`; a
/// sample taken sooner than [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`] after
/// the previous one repeats the last value or reads as 0.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProbe for SysinfoProbe {
    fn sample(&self) -> Option<LoadSample> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();
        system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());

        if system.total_memory() == 0 {
            return None;
        }

        let cpu_percent = f64::from(system.global_cpu_usage());
        if !cpu_percent.is_finite() {
            return None;
        }

        Some(LoadSample {
            cpu_percent,
            available_memory_gb: system.available_memory() as f64 / BYTES_PER_GIB,
        })
    }
}

/// A probe that always reports the same reading.
///
/// Useful for hosts that want a fixed queue size, and for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub Option<LoadSample>);

impl LoadProbe for FixedProbe {
    fn sample(&self) -> Option<LoadSample> {
        self.0
    }
}

/// Maps host pressure to a safe playback queue capacity.
#[derive(Clone)]
pub struct LoadBalancer {
    probe: Arc<dyn LoadProbe>,
}

impl LoadBalancer {
    pub fn new(probe: Arc<dyn LoadProbe>) -> Self {
        Self { probe }
    }

    /// Balancer backed by [`SysinfoProbe`].
    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(SysinfoProbe::new()))
    }

    /// Sample the host and compute a capacity. Not memoised.
    pub fn get_optimal_queue_size(&self) -> usize {
        let sample = self.probe.sample();
        let size = optimal_queue_size(sample);
        tracing::trace!(?sample, size, "Computed playback queue size");
        size
    }
}

/// Queue capacity for a reading; [`MIN_QUEUE_SIZE`] when there is none.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn optimal_queue_size(sample: Option<LoadSample>) -> usize {
    let Some(sample) = sample else {
        return MIN_QUEUE_SIZE;
    };

    let memory_gb = sample.available_memory_gb.max(0.0);
    let dynamic_base = 3.0 + (memory_gb * 5.0).floor();
    let combined = (cpu_factor(sample.cpu_percent) * memory_factor(memory_gb)).sqrt();
    let size = (dynamic_base * combined).round();

    if size.is_finite() {
        (size as usize).clamp(MIN_QUEUE_SIZE, MAX_QUEUE_SIZE)
    } else {
        MIN_QUEUE_SIZE
    }
}

/// CPU utilisation factor, 1.0 when idle down to 0.1 at 90 % and above.
pub fn cpu_factor(cpu_percent: f64) -> f64 {
    interpolate(&CPU_FACTORS, cpu_percent)
}

/// Memory factor, 0.2 with nothing free up to 1.0 at 64 GB and above.
pub fn memory_factor(available_gb: f64) -> f64 {
    interpolate(&MEMORY_FACTORS, available_gb)
}

/// Piecewise-linear lookup, clamped to the first/last breakpoint.
fn interpolate(table: &[(f64, f64)], x: f64) -> f64 {
    let (first_x, first_y) = table[0];
    if x.is_nan() || x <= first_x {
        return first_y;
    }

    for pair in table.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x <= x1 {
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }

    table[table.len() - 1].1
}
