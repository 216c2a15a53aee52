use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::Serialize;

/// Named numeric samples recorded by `measure` steps.
#[derive(Debug, Default)]
pub struct MetricsStore {
    samples: DashMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub total: f64,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, value: f64) {
        self.samples.entry(name.to_string()).or_default().push(value);
    }

    pub fn samples(&self, name: &str) -> Vec<f64> {
        self.samples.get(name).map(|s| s.clone()).unwrap_or_default()
    }

    pub fn summary(&self, name: &str) -> Option<MetricSummary> {
        self.samples.get(name).and_then(|s| summarize(&s))
    }

    pub fn summaries(&self) -> BTreeMap<String, MetricSummary> {
        self.samples
            .iter()
            .filter_map(|entry| summarize(entry.value()).map(|s| (entry.key().clone(), s)))
            .collect()
    }
}

fn summarize(samples: &[f64]) -> Option<MetricSummary> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().sum();
    Some(MetricSummary {
        count: samples.len(),
        min: samples.iter().copied().fold(f64::INFINITY, f64::min),
        max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean: total / samples.len() as f64,
        total,
    })
}
