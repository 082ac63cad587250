//! Structured logging and lightweight performance counters.
//!
//! The engine counts; it does not export. Prometheus scraping is the
//! explicitly out-of-scope HTTP wrapper's job (spec §1) — this module only
//! gives `SystemFacade::get_system_stats()` something to report.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize logging with the default verbosity (warnings and errors for
/// this crate, errors only for dependencies).
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with_level(false, false)
}

pub fn init_logging_with_level(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("ltm_engine=debug,info")
    } else {
        EnvFilter::new("ltm_engine=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    Ok(())
}

pub fn record_operation() {
    OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);
}

pub fn record_error() {
    ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
}

pub fn operation_count() -> u64 {
    OPERATION_COUNTER.load(Ordering::Relaxed)
}

pub fn error_count() -> u64 {
    ERROR_COUNTER.load(Ordering::Relaxed)
}

/// A rolling per-operation latency histogram, gated behind
/// `performance.enableMonitoring` (spec §6).
#[derive(Default)]
pub struct PerformanceMonitor {
    samples: Mutex<HashMap<&'static str, Vec<f64>>>,
}

pub struct Timing<'a> {
    monitor: &'a PerformanceMonitor,
    operation: &'static str,
    start: Instant,
}

impl Drop for Timing<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.monitor.record(self.operation, elapsed_ms);
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `operation`; the sample is recorded when the returned
    /// guard drops.
    pub fn time(&self, operation: &'static str) -> Timing<'_> {
        Timing {
            monitor: self,
            operation,
            start: Instant::now(),
        }
    }

    fn record(&self, operation: &'static str, elapsed_ms: f64) {
        let mut samples = self.samples.lock().unwrap();
        samples.entry(operation).or_default().push(elapsed_ms);
    }

    /// Mean latency in milliseconds for `operation`, or `None` if no
    /// samples have been recorded yet.
    pub fn mean_ms(&self, operation: &str) -> Option<f64> {
        let samples = self.samples.lock().unwrap();
        let values = samples.get(operation)?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn sample_count(&self, operation: &str) -> usize {
        self.samples
            .lock()
            .unwrap()
            .get(operation)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.samples.lock().unwrap().keys().copied().collect()
    }
}
