//! Result rows.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::ExperimentConfig;
use crate::stats::DerivedMetrics;

/// Outcome of one experiment: configuration identity plus derived metrics.
///
/// Created once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentResult {
    /// Configuration name.
    pub name: String,
    /// Every configuration parameter as `(column, value)`.
    pub parameters: Vec<(String, String)>,
    /// Derived metrics.
    pub metrics: DerivedMetrics,
    /// False when metrics were downgraded (no dump, power errors).
    pub complete: bool,
    /// Construction and derivation warnings.
    pub warnings: Vec<String>,
}

impl ExperimentResult {
    /// Assembles a row.
    ///
    /// `topology_warnings` are prepended to the metric warnings.
    pub fn new(config: &ExperimentConfig, metrics: DerivedMetrics, topology_warnings: &[String]) -> Self {
        let mut warnings = topology_warnings.to_vec();
        warnings.extend(metrics.warnings.iter().cloned());
        Self {
            name: config.name.clone(),
            parameters: config.parameters(),
            complete: metrics.stats_available && metrics.warnings.is_empty(),
            metrics,
            warnings,
        }
    }

    /// Flattened scalar columns: `config`, parameters, metrics, `complete`.
    pub fn columns(&self) -> Vec<(String, Value)> {
        let mut cols = Vec::with_capacity(self.parameters.len() + 32);
        cols.push(("config".to_string(), Value::String(self.name.clone())));
        cols.extend(
            self.parameters
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
        );
        cols.extend(self.metrics.columns());
        cols.push(("complete".to_string(), Value::Bool(self.complete)));
        cols
    }

    /// Columns as a JSON object.
    pub fn row(&self) -> Map<String, Value> {
        self.columns().into_iter().collect()
    }
}
