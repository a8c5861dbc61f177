//! Metrics derived from a counter snapshot.
//!
//! This module turns raw counters into the values reported per experiment:
//! 1. **Hit rates:** Per cache and TLB level, as a percentage (0 when there was no traffic).
//! 2. **Core:** Simulated seconds, ticks, instructions, and IPC.
//! 3. **Power:** Per-model dynamic and static watts plus the aggregate.
//!
//! Derivation never fails: missing counters read as zero, power errors become zero watts, and
//! every downgrade is recorded in [`DerivedMetrics::warnings`].

use serde::Serialize;
use serde_json::{Value, json};

use crate::power::{ComponentClass, PowerContext, PowerState};
use crate::topology::{ComponentRole, InstrumentedComponent};

use super::snapshot::StatsSnapshot;

/// Hit rate in percent; `0.0` when `hits + misses == 0`.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits.saturating_add(misses);
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

fn count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Hit/miss summary of one cache or TLB.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelMetrics {
    /// Column prefix (`icache`, `dcache`, `l2`, `itlb`, `dtlb`).
    pub label: String,
    /// Component path.
    pub path: String,
    /// Hits.
    pub hits: u64,
    /// Misses.
    pub misses: u64,
    /// Hits as a percentage of accesses.
    pub hit_rate: f64,
}

/// Whole-run core counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CoreMetrics {
    /// Simulated seconds.
    pub sim_seconds: f64,
    /// Simulated ticks.
    pub sim_ticks: u64,
    /// Committed instructions.
    pub sim_insts: u64,
    /// Instructions per cycle.
    pub ipc: f64,
}

/// Power drawn by one modeled component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentPower {
    /// Component path.
    pub path: String,
    /// Column prefix.
    pub label: String,
    /// State the model was evaluated in.
    pub state: PowerState,
    /// Dynamic watts.
    pub dynamic_watts: f64,
    /// Static watts.
    pub static_watts: f64,
}

/// Everything reported about one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DerivedMetrics {
    /// Per-level hit/miss summaries, in hierarchy order.
    pub levels: Vec<LevelMetrics>,
    /// Core counters.
    pub core: CoreMetrics,
    /// Per-component power (empty when power modeling is off).
    pub power: Vec<ComponentPower>,
    /// Sum of dynamic watts.
    pub total_dynamic_watts: f64,
    /// Sum of static watts.
    pub total_static_watts: f64,
    /// Whether power columns are reported.
    pub power_enabled: bool,
    /// Whether a counter dump was available.
    pub stats_available: bool,
    /// Downgraded errors and missing data.
    pub warnings: Vec<String>,
}

impl DerivedMetrics {
    /// Derives metrics for one run.
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Parsed counter dump, or `None` when the kernel produced none.
    /// * `components` - Instrumented graph components, in hierarchy order.
    /// * `power` - Attached power models and environment, when power modeling is on.
    pub fn derive(
        snapshot: Option<&StatsSnapshot>,
        components: &[InstrumentedComponent],
        power: Option<&PowerContext>,
    ) -> Self {
        let mut metrics = Self {
            power_enabled: power.is_some(),
            stats_available: snapshot.is_some(),
            ..Self::default()
        };
        let empty = StatsSnapshot::default();
        let stats = snapshot.unwrap_or_else(|| {
            metrics
                .warnings
                .push("statistics unavailable; reporting zeros".to_string());
            &empty
        });

        let cpu_path = components
            .iter()
            .find(|c| c.role == ComponentRole::Cpu)
            .map_or("system.cpu", |c| c.path.as_str());
        metrics.core = core_metrics(stats, cpu_path);

        for component in components {
            let (hits, misses) = match component.role {
                ComponentRole::Cpu => continue,
                ComponentRole::Cache(_) => cache_counts(stats, &component.path),
                ComponentRole::InstructionTlb => {
                    tlb_counts(stats, &component.path, &["exAccesses"], &["exMisses"])
                }
                ComponentRole::DataTlb => tlb_counts(
                    stats,
                    &component.path,
                    &["rdAccesses", "wrAccesses"],
                    &["rdMisses", "wrMisses"],
                ),
            };
            metrics.levels.push(LevelMetrics {
                label: component.label().to_string(),
                path: component.path.clone(),
                hits,
                misses,
                hit_rate: hit_rate(hits, misses),
            });
        }

        if let Some(ctx) = power {
            metrics.derive_power(snapshot, components, ctx);
        }
        metrics
    }

    fn derive_power(
        &mut self,
        snapshot: Option<&StatsSnapshot>,
        components: &[InstrumentedComponent],
        ctx: &PowerContext,
    ) {
        let env = ctx.environment(self.core.sim_seconds);
        let caches_modeled = ctx
            .models
            .iter()
            .any(|m| m.class() == ComponentClass::Cache);

        for component in components {
            let Some(class) = ComponentClass::for_role(component.role) else {
                continue;
            };
            let label = component.label().to_string();
            let Some(model) = ctx.models.get(&component.path) else {
                if class == ComponentClass::Cpu || caches_modeled {
                    self.warnings
                        .push(format!("no power model attached to '{}'", component.path));
                    self.power.push(ComponentPower {
                        path: component.path.clone(),
                        label,
                        state: PowerState::On,
                        dynamic_watts: 0.0,
                        static_watts: 0.0,
                    });
                }
                continue;
            };

            let estimate = match snapshot {
                None => None,
                Some(stats) => match model.evaluate(stats, &env) {
                    Ok(estimate) => Some(estimate),
                    Err(e) => {
                        tracing::warn!(component = %component.path, error = %e, "power evaluation failed");
                        self.warnings.push(e.to_string());
                        None
                    }
                },
            };
            let estimate = estimate.unwrap_or_default();
            self.total_dynamic_watts += estimate.dynamic_watts;
            self.total_static_watts += estimate.static_watts;
            self.power.push(ComponentPower {
                path: component.path.clone(),
                label,
                state: model.state(),
                dynamic_watts: estimate.dynamic_watts,
                static_watts: estimate.static_watts,
            });
        }
    }

    /// Level summary by column prefix.
    pub fn level(&self, label: &str) -> Option<&LevelMetrics> {
        self.levels.iter().find(|l| l.label == label)
    }

    /// Flattened `(column, value)` pairs in report order.
    pub fn columns(&self) -> Vec<(String, Value)> {
        let mut cols = vec![
            ("stats_available".to_string(), json!(self.stats_available)),
            ("sim_seconds".to_string(), json!(self.core.sim_seconds)),
            ("sim_ticks".to_string(), json!(self.core.sim_ticks)),
            ("sim_insts".to_string(), json!(self.core.sim_insts)),
            ("ipc".to_string(), json!(self.core.ipc)),
        ];
        for level in &self.levels {
            cols.push((format!("{}_hits", level.label), json!(level.hits)));
            cols.push((format!("{}_misses", level.label), json!(level.misses)));
            cols.push((format!("{}_hit_rate", level.label), json!(level.hit_rate)));
        }
        if self.power_enabled {
            for p in &self.power {
                cols.push((format!("{}_dynamic_power", p.label), json!(p.dynamic_watts)));
                cols.push((format!("{}_static_power", p.label), json!(p.static_watts)));
            }
            cols.push((
                "total_dynamic_power".to_string(),
                json!(self.total_dynamic_watts),
            ));
            cols.push((
                "total_static_power".to_string(),
                json!(self.total_static_watts),
            ));
        }
        cols
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self, name: &str) {
        println!("\n==========================================================");
        println!("EXPERIMENT {name}");
        println!("==========================================================");
        if !self.stats_available {
            println!("statistics unavailable");
        }
        println!("sim_seconds              {:.6}", self.core.sim_seconds);
        println!("sim_ticks                {}", self.core.sim_ticks);
        println!("sim_insts                {}", self.core.sim_insts);
        println!("sim_ipc                  {:.4}", self.core.ipc);
        if !self.levels.is_empty() {
            println!("----------------------------------------------------------");
            println!("MEMORY HIERARCHY");
            for l in &self.levels {
                println!(
                    "  {:<8} hits: {:<10} misses: {:<10} hit_rate: {:>6.2}%",
                    l.label, l.hits, l.misses, l.hit_rate
                );
            }
        }
        if self.power_enabled {
            println!("----------------------------------------------------------");
            println!("POWER");
            for p in &self.power {
                println!(
                    "  {:<8} {:<15} dynamic: {:.6} W  static: {:.6} W",
                    p.label, p.state, p.dynamic_watts, p.static_watts
                );
            }
            println!(
                "  total    dynamic: {:.6} W  static: {:.6} W",
                self.total_dynamic_watts, self.total_static_watts
            );
        }
        for w in &self.warnings {
            println!("warning: {w}");
        }
        println!("==========================================================");
    }
}

fn core_metrics(stats: &StatsSnapshot, cpu_path: &str) -> CoreMetrics {
    let sim_insts = stats.get_total("simInsts").unwrap_or(0.0);
    let ipc = stats
        .get_total(&format!("{cpu_path}.ipc"))
        .or_else(|| {
            let cycles = stats.get_total(&format!("{cpu_path}.numCycles"))?;
            (cycles > 0.0).then(|| sim_insts / cycles)
        })
        .unwrap_or(0.0);
    CoreMetrics {
        sim_seconds: stats.get("simSeconds").unwrap_or(0.0),
        sim_ticks: count(stats.get("simTicks").unwrap_or(0.0)),
        sim_insts: count(sim_insts),
        ipc,
    }
}

/// First present counter among `<path>.<name>` for each name (with `::total` fallback).
fn first_of(stats: &StatsSnapshot, path: &str, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|name| stats.get_total(&format!("{path}.{name}")))
}

fn cache_counts(stats: &StatsSnapshot, path: &str) -> (u64, u64) {
    let hits = first_of(stats, path, &["hits", "overallHits"]).unwrap_or(0.0);
    let misses = first_of(stats, path, &["misses", "overallMisses"]).unwrap_or(0.0);
    (count(hits), count(misses))
}

fn tlb_counts(
    stats: &StatsSnapshot,
    path: &str,
    access_keys: &[&str],
    miss_keys: &[&str],
) -> (u64, u64) {
    let sum = |keys: &[&str]| -> Option<f64> {
        let values: Vec<f64> = keys
            .iter()
            .filter_map(|k| stats.get_total(&format!("{path}.{k}")))
            .collect();
        (!values.is_empty()).then(|| values.iter().sum())
    };
    match (sum(access_keys), sum(miss_keys)) {
        (Some(accesses), misses) => {
            let misses = count(misses.unwrap_or(0.0));
            (count(accesses).saturating_sub(misses), misses)
        }
        (None, _) => cache_counts(stats, path),
    }
}
