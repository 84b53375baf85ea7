//! Run metrics, printable or saved as JSON.
//!
//! - [`Metric`] is the interface of a single named value
//! - [`MetricsCollector`] gathers counters and custom metrics
//! - [`RunSummary::to_metrics`] turns a finished run into a collector
//!
//! # Example
//!
//! ```no_run
//! use xcut::metrics::GaugeMetric;
//! use xcut::pipeline::Pipeline;
//! use xcut::sink::VecEmitter;
//! use xcut::source::IterReader;
//! use xcut::transform::Identity;
//!
//! # fn main() -> anyhow::Result<()> {
//! let summary = Pipeline::default().run(IterReader::new(["a", "b"]), Identity, VecEmitter::new())?;
//!
//! let mut metrics = summary.to_metrics();
//! metrics.register(Box::new(GaugeMetric::new("load_factor", 0.5)));
//! metrics.print();
//! metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use crate::pipeline::RunSummary;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A named metric value.
pub trait Metric: Send + Sync {
    /// The name of this metric (e.g., `records_in`).
    fn name(&self) -> &str;

    /// The current value as JSON.
    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }
}

/// Thread-safe set of metrics. Clones share the same set.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    counters: BTreeMap<String, CounterMetric>,
    metrics: BTreeMap<String, Box<dyn Metric>>,
    elapsed: Option<Duration>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom metric, replacing any metric of the same name.
    pub fn register(&mut self, metric: Box<dyn Metric>) {
        let mut inner = self.inner.lock();
        inner.counters.remove(metric.name());
        inner.metrics.insert(metric.name().to_string(), metric);
    }

    /// Add `value` to a counter, creating it at zero first if needed.
    /// A custom metric of the same name is replaced.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut inner = self.inner.lock();
        inner.metrics.remove(name);
        inner
            .counters
            .entry(name.to_string())
            .or_insert_with(|| CounterMetric::new(name))
            .count += value;
    }

    /// Set a counter to `value`, replacing any metric of the same name.
    pub fn set_counter(&self, name: &str, value: u64) {
        let mut inner = self.inner.lock();
        inner.metrics.remove(name);
        inner.counters.insert(name.to_string(), CounterMetric::with_value(name, value));
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        self.inner.lock().counters.get(name).map(|c| c.count)
    }

    pub fn set_elapsed(&self, elapsed: Duration) {
        self.inner.lock().elapsed = Some(elapsed);
    }

    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.inner.lock().elapsed
    }

    /// All metrics as one JSON object keyed by name.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.inner.lock();
        let mut out = Map::new();

        let all: Vec<&dyn Metric> = inner
            .counters
            .values()
            .map(|c| c as &dyn Metric)
            .chain(inner.metrics.values().map(|m| &**m as &dyn Metric))
            .collect();
        for metric in all {
            let mut obj = Map::new();
            obj.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                obj.insert("description".to_string(), json!(desc));
            }
            out.insert(metric.name().to_string(), Value::Object(obj));
        }

        if let Some(elapsed) = inner.elapsed {
            out.insert(
                "execution_time_ms".to_string(),
                json!({
                    "value": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "description": "Total run time in milliseconds",
                }),
            );
        }
        Value::Object(out)
    }

    /// Every metric name with its current value.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let Value::Object(metrics) = self.to_json() else {
            return BTreeMap::new();
        };
        metrics.into_iter().map(|(name, mut obj)| (name, obj["value"].take())).collect()
    }

    /// Write a human-readable report, one metric per line, sorted by name.
    ///
    /// # Errors
    ///
    /// Any error writing to `w`.
    pub fn write_report(&self, w: &mut impl Write) -> io::Result<()> {
        let Value::Object(metrics) = self.to_json() else {
            return Ok(());
        };
        writeln!(w, "========== Run Metrics ==========")?;
        let mut sorted: Vec<_> = metrics.iter().collect();
        sorted.sort_by_key(|(name, _)| *name);
        for (name, obj) in sorted {
            let value = &obj["value"];
            match obj.get("description").and_then(Value::as_str) {
                Some(desc) => writeln!(w, "{name}: {value} ({desc})")?,
                None => writeln!(w, "{name}: {value}")?,
            }
        }
        writeln!(w, "=================================")
    }

    /// Print the report to stderr, keeping stdout for records.
    pub fn print(&self) {
        // Nothing useful to do if stderr is gone.
        let _ = self.write_report(&mut io::stderr().lock());
    }

    /// Save all metrics as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file =
            File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

/// A monotonically increasing count.
pub struct CounterMetric {
    name: String,
    count: u64,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_value(name, 0)
    }

    pub fn with_value(name: impl Into<String>, count: u64) -> Self {
        Self { name: name.into(), count }
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.count)
    }
}

/// A single numeric reading.
pub struct GaugeMetric {
    name: String,
    value: f64,
    description: Option<String>,
}

impl GaugeMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self { name: name.into(), value, description: None }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Metric for GaugeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl RunSummary {
    /// Counters and gauges describing this run.
    pub fn to_metrics(&self) -> MetricsCollector {
        let mut m = MetricsCollector::new();
        m.set_counter("records_in", self.produced);
        m.set_counter("records_out", self.emitted);
        m.set_counter("transform_failures", self.transform_failures);
        m.register(Box::new(
            GaugeMetric::new("workers", self.workers as f64).with_description("Transformer threads"),
        ));
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            m.register(Box::new(
                GaugeMetric::new("records_per_sec", self.produced as f64 / secs)
                    .with_description("Input throughput"),
            ));
        }
        m.set_elapsed(self.elapsed);
        m
    }
}
