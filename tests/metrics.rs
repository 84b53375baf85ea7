//! Tests for the metrics module.
#![cfg(feature = "metrics")]

use serde_json::json;
use tempfile::TempDir;
use xcut::metrics::{CounterMetric, GaugeMetric, MetricsCollector};
use xcut::pipeline::Pipeline;
use xcut::sink::VecEmitter;
use xcut::source::IterReader;
use xcut::transform::try_from_fn;

#[test]
fn test_counter_metric() {
    let mut collector = MetricsCollector::new();
    collector.register(Box::new(CounterMetric::with_value("test_counter", 5)));
    assert_eq!(collector.snapshot().get("test_counter"), Some(&json!(5)));
}

#[test]
fn test_increment_counter() {
    let collector = MetricsCollector::new();
    collector.increment_counter("hits", 2);
    collector.increment_counter("hits", 3);
    assert_eq!(collector.counter("hits"), Some(5));
    collector.set_counter("hits", 1);
    assert_eq!(collector.snapshot()["hits"], json!(1));
}

#[test]
fn test_same_name_keeps_only_the_latest_metric() {
    let mut collector = MetricsCollector::new();
    collector.register(Box::new(GaugeMetric::new("load", 0.5)));
    collector.set_counter("load", 7);
    assert_eq!(collector.to_json()["load"]["value"], json!(7));
    assert_eq!(collector.snapshot().len(), 1);

    collector.register(Box::new(GaugeMetric::new("load", 0.25)));
    assert_eq!(collector.counter("load"), None);
    assert_eq!(collector.to_json()["load"]["value"], json!(0.25));

    collector.increment_counter("load", 2);
    assert_eq!(collector.counter("load"), Some(2));
    assert_eq!(collector.to_json()["load"]["value"], json!(2));
}

#[test]
fn test_gauge_metric_with_description() {
    let mut collector = MetricsCollector::new();
    collector.register(Box::new(GaugeMetric::new("load", 42.5).with_description("Test gauge")));

    let json = collector.to_json();
    assert_eq!(json["load"]["value"], json!(42.5));
    assert_eq!(json["load"]["description"], json!("Test gauge"));
}

#[test]
fn test_report_is_sorted() -> anyhow::Result<()> {
    let collector = MetricsCollector::new();
    collector.set_counter("b", 2);
    collector.set_counter("a", 1);
    let mut buf = Vec::new();
    collector.write_report(&mut buf)?;
    let text = String::from_utf8(buf)?;
    let a = text.find("a: 1").expect("a reported");
    let b = text.find("b: 2").expect("b reported");
    assert!(a < b);
    Ok(())
}

#[test]
fn test_run_summary_metrics() -> anyhow::Result<()> {
    let parse = try_from_fn(|s: &str| s.parse::<i64>().map(|n| (-n).to_string()));
    let summary = Pipeline::default()
        .with_workers(2)
        .run(IterReader::new(["1", "x", "3", "y"]), parse, VecEmitter::new())?;

    let metrics = summary.to_metrics();
    assert_eq!(metrics.counter("records_in"), Some(4));
    assert_eq!(metrics.counter("records_out"), Some(4));
    assert_eq!(metrics.counter("transform_failures"), Some(2));
    assert_eq!(metrics.snapshot()["workers"], json!(2.0));
    assert_eq!(metrics.elapsed(), Some(summary.elapsed));

    let dir = TempDir::new()?;
    let path = dir.path().join("metrics.json");
    metrics.save_to_file(&path)?;
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(saved["records_in"]["value"], json!(4));
    assert!(saved.get("execution_time_ms").is_some());
    Ok(())
}
