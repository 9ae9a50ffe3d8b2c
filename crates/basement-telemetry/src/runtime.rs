//! Process runtime sampler.
//!
//! Registers observable gauges for process memory, thread count and uptime.
//! The underlying process reading is cached and refreshed at most once per
//! `min_interval`, however often the meter collects.
//!
//! Memory and thread readings come from `/proc/self/status`, so they are
//! only reported on Linux. Elsewhere those gauges stay empty and a debug
//! event is logged once; uptime is reported on every platform.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::metrics::{Meter, ObservableGauge};
use parking_lot::Mutex;

/// Default minimum interval between process readings.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// A single reading of process statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessStats {
    /// Resident set size in bytes.
    pub resident_bytes: u64,
    /// Virtual memory size in bytes.
    pub virtual_bytes: u64,
    /// Number of OS threads.
    pub threads: u64,
}

/// Parses the text of `/proc/self/status`.
///
/// Returns `None` unless `VmRSS`, `VmSize` and `Threads` are all present.
#[must_use]
pub fn parse_proc_status(text: &str) -> Option<ProcessStats> {
    let mut resident = None;
    let mut virt = None;
    let mut threads = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "VmRSS" => resident = parse_kib(value),
            "VmSize" => virt = parse_kib(value),
            "Threads" => threads = value.parse().ok(),
            _ => {}
        }
    }

    Some(ProcessStats {
        resident_bytes: resident?,
        virtual_bytes: virt?,
        threads: threads?,
    })
}

fn parse_kib(value: &str) -> Option<u64> {
    let number = value.strip_suffix("kB").unwrap_or(value).trim();
    number.parse::<u64>().ok().map(|kib| kib * 1024)
}

type Source = Box<dyn Fn() -> Option<String> + Send + Sync>;

struct Cache {
    read_at: Option<Instant>,
    stats: Option<ProcessStats>,
    unavailable_logged: bool,
}

/// Rate-limited reader of process statistics.
pub struct Sampler {
    min_interval: Duration,
    source: Source,
    cache: Mutex<Cache>,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("min_interval", &self.min_interval)
            .finish_non_exhaustive()
    }
}

impl Sampler {
    /// Samples `/proc/self/status`.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self::with_source(min_interval, || {
            std::fs::read_to_string("/proc/self/status").ok()
        })
    }

    /// Samples from a custom status source.
    pub fn with_source<F>(min_interval: Duration, source: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Self {
            min_interval,
            source: Box::new(source),
            cache: Mutex::new(Cache {
                read_at: None,
                stats: None,
                unavailable_logged: false,
            }),
        }
    }

    /// Returns the cached reading, refreshing it if older than the interval.
    pub fn sample(&self) -> Option<ProcessStats> {
        let mut cache = self.cache.lock();
        let fresh = cache
            .read_at
            .is_some_and(|at| at.elapsed() < self.min_interval);

        if !fresh {
            cache.stats = (self.source)().as_deref().and_then(parse_proc_status);
            cache.read_at = Some(Instant::now());
            if cache.stats.is_none() && !cache.unavailable_logged {
                tracing::debug!("process statistics unavailable, memory and thread gauges disabled");
                cache.unavailable_logged = true;
            }
        }

        cache.stats
    }
}

/// Keeps the runtime gauges registered.
pub struct RuntimeMetrics {
    _memory_usage: ObservableGauge<u64>,
    _memory_virtual: ObservableGauge<u64>,
    _thread_count: ObservableGauge<u64>,
    _uptime: ObservableGauge<f64>,
}

impl std::fmt::Debug for RuntimeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeMetrics").finish_non_exhaustive()
    }
}

impl RuntimeMetrics {
    /// Registers the runtime gauges on `meter`.
    #[must_use]
    pub fn register(meter: &Meter, sampler: Sampler) -> Self {
        let sampler = Arc::new(sampler);
        let started = Instant::now();

        let memory_usage = {
            let sampler = Arc::clone(&sampler);
            meter
                .u64_observable_gauge("process.memory.usage")
                .with_description("Resident memory of the process")
                .with_unit("By")
                .with_callback(move |observer| {
                    if let Some(stats) = sampler.sample() {
                        observer.observe(stats.resident_bytes, &[]);
                    }
                })
                .build()
        };

        let memory_virtual = {
            let sampler = Arc::clone(&sampler);
            meter
                .u64_observable_gauge("process.memory.virtual")
                .with_description("Virtual memory of the process")
                .with_unit("By")
                .with_callback(move |observer| {
                    if let Some(stats) = sampler.sample() {
                        observer.observe(stats.virtual_bytes, &[]);
                    }
                })
                .build()
        };

        let thread_count = {
            let sampler = Arc::clone(&sampler);
            meter
                .u64_observable_gauge("process.thread.count")
                .with_description("OS threads in the process")
                .with_unit("{thread}")
                .with_callback(move |observer| {
                    if let Some(stats) = sampler.sample() {
                        observer.observe(stats.threads, &[]);
                    }
                })
                .build()
        };

        let uptime = meter
            .f64_observable_gauge("process.uptime")
            .with_description("Seconds since telemetry started")
            .with_unit("s")
            .with_callback(move |observer| observer.observe(started.elapsed().as_secs_f64(), &[]))
            .build();

        Self {
            _memory_usage: memory_usage,
            _memory_virtual: memory_virtual,
            _thread_count: thread_count,
            _uptime: uptime,
        }
    }
}
