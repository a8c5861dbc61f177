//! Per-component power models.
//!
//! A [`PowerModel`] is attached to one instrumented component. It owns one [`PowerFormula`] per
//! [`PowerState`] and evaluates the formula of its current state against a counter snapshot.
//! Default formulas come from the [`ComponentClass`] tables; configuration may replace any
//! (class, state) pair.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::PowerError;
use crate::config::PowerConfig;
use crate::stats::StatsSnapshot;
use crate::topology::{ComponentRole, Node, TopologyGraph};

use super::expr::{Expr, PowerEnvironment};

/// Discrete power state, ordered by decreasing activity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    /// Fully active.
    #[default]
    On,
    /// Clock stopped, state held.
    #[serde(alias = "clk_gated")]
    ClockGated,
    /// SRAM retention / drowsy.
    #[serde(alias = "sram_retention", alias = "drowsy")]
    Retention,
    /// Power gated.
    Off,
}

impl PowerState {
    /// Every state, most active first.
    pub const ALL: [Self; 4] = [Self::On, Self::ClockGated, Self::Retention, Self::Off];

    const fn index(self) -> usize {
        match self {
            Self::On => 0,
            Self::ClockGated => 1,
            Self::Retention => 2,
            Self::Off => 3,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "ON",
            Self::ClockGated => "CLK_GATED",
            Self::Retention => "SRAM_RETENTION",
            Self::Off => "OFF",
        })
    }
}

/// Dynamic and static power expressions for one state.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerFormula {
    /// Activity-dependent power in watts.
    pub dynamic: Expr,
    /// Leakage power in watts.
    pub static_power: Expr,
}

impl PowerFormula {
    /// Creates a formula pair.
    pub const fn new(dynamic: Expr, static_power: Expr) -> Self {
        Self {
            dynamic,
            static_power,
        }
    }

    /// Zero dynamic and static power.
    pub const fn zero() -> Self {
        Self::new(Expr::Const(0.0), Expr::Const(0.0))
    }

    /// Parses both halves from text.
    ///
    /// # Errors
    ///
    /// Returns [`PowerError::Parse`] for either half.
    pub fn parse(dynamic: &str, static_power: &str) -> Result<Self, PowerError> {
        Ok(Self::new(Expr::parse(dynamic)?, Expr::parse(static_power)?))
    }
}

/// Family of default formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentClass {
    /// Processor core.
    Cpu,
    /// Cache array.
    Cache,
}

/// Default formula constants.
mod coefficients {
    /// CPU dynamic watts per unit IPC.
    pub const CPU_IPC: f64 = 2.0;
    /// CPU dynamic watts per D-cache miss per second.
    pub const CPU_MISS_RATE: f64 = 0.003;
    /// Clock-gated share of the CPU's active dynamic power.
    pub const CPU_GATED_SHARE: f64 = 0.2;
    /// CPU retention dynamic power cap.
    pub const CPU_RETENTION_DYN: f64 = 0.005;
    /// CPU static power at 0 °C and per °C.
    pub const CPU_STATIC: (f64, f64) = (0.1, 0.004);
    /// CPU retention static power at 0 °C and per °C.
    pub const CPU_RETENTION_STATIC: (f64, f64) = (0.01, 0.0004);
    /// Cache dynamic watts per access per second.
    pub const CACHE_ACCESS_RATE: f64 = 0.000_05;
    /// Cache drowsy dynamic power cap.
    pub const CACHE_DROWSY_DYN: f64 = 0.001;
    /// Cache static power at 0 °C and per °C.
    pub const CACHE_STATIC: (f64, f64) = (0.05, 0.002);
    /// Cache drowsy static power at 0 °C and per °C.
    pub const CACHE_DROWSY_STATIC: (f64, f64) = (0.005, 0.0002);
}

fn linear_in_temp((base, slope): (f64, f64)) -> Expr {
    Expr::c(base) + Expr::c(slope) * Expr::Temperature
}

fn cpu_dynamic(share: f64) -> Expr {
    use coefficients::{CPU_IPC, CPU_MISS_RATE};
    Expr::voltage_squared()
        * (Expr::c(CPU_IPC * share) * Expr::counter("ipc")
            + Expr::c(CPU_MISS_RATE * share) * Expr::counter("dcache.overallMisses")
                / Expr::Elapsed)
}

fn cache_dynamic() -> Expr {
    Expr::voltage_squared()
        * Expr::c(coefficients::CACHE_ACCESS_RATE)
        * Expr::counter("overallAccesses")
        / Expr::Elapsed
}

impl ComponentClass {
    /// Default formula for a state.
    ///
    /// Lower-activity states cap their dynamic power at the next more active state's value, so
    /// dynamic power never increases as activity drops.
    pub fn default_formula(self, state: PowerState) -> PowerFormula {
        use coefficients as k;
        match (self, state) {
            (_, PowerState::Off) => PowerFormula::zero(),
            (Self::Cpu, PowerState::On) => {
                PowerFormula::new(cpu_dynamic(1.0), linear_in_temp(k::CPU_STATIC))
            }
            (Self::Cpu, PowerState::ClockGated) => PowerFormula::new(
                cpu_dynamic(k::CPU_GATED_SHARE),
                linear_in_temp(k::CPU_STATIC),
            ),
            (Self::Cpu, PowerState::Retention) => PowerFormula::new(
                Expr::c(k::CPU_RETENTION_DYN).min(cpu_dynamic(k::CPU_GATED_SHARE)),
                linear_in_temp(k::CPU_RETENTION_STATIC),
            ),
            (Self::Cache, PowerState::On) => {
                PowerFormula::new(cache_dynamic(), linear_in_temp(k::CACHE_STATIC))
            }
            (Self::Cache, PowerState::ClockGated | PowerState::Retention) => PowerFormula::new(
                Expr::c(k::CACHE_DROWSY_DYN).min(cache_dynamic()),
                linear_in_temp(k::CACHE_DROWSY_STATIC),
            ),
        }
    }

    /// Class used for a graph component, if it gets a power model at all.
    pub const fn for_role(role: ComponentRole) -> Option<Self> {
        match role {
            ComponentRole::Cpu => Some(Self::Cpu),
            ComponentRole::Cache(_) => Some(Self::Cache),
            ComponentRole::InstructionTlb | ComponentRole::DataTlb => None,
        }
    }
}

impl fmt::Display for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Cache => "cache",
        })
    }
}

/// Watts drawn by one component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PowerEstimate {
    /// Dynamic power in watts.
    pub dynamic_watts: f64,
    /// Static power in watts.
    pub static_watts: f64,
}

impl PowerEstimate {
    /// Dynamic plus static.
    pub fn total(&self) -> f64 {
        self.dynamic_watts + self.static_watts
    }
}

/// Power model attached to one component.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerModel {
    path: String,
    class: ComponentClass,
    state: PowerState,
    formulas: [PowerFormula; 4],
}

impl PowerModel {
    /// Attaches the class defaults to a graph node, starting in [`PowerState::On`].
    pub fn attach(node: &Node, class: ComponentClass) -> Self {
        Self::new(node.path.as_str(), class)
    }

    /// Same as [`attach`](Self::attach) for a bare component path.
    pub fn new(path: impl Into<String>, class: ComponentClass) -> Self {
        Self {
            path: path.into(),
            class,
            state: PowerState::On,
            formulas: PowerState::ALL.map(|s| class.default_formula(s)),
        }
    }

    /// Component path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Formula family.
    pub const fn class(&self) -> ComponentClass {
        self.class
    }

    /// Current state.
    pub const fn state(&self) -> PowerState {
        self.state
    }

    /// Moves to any state; there are no transition restrictions.
    pub fn set_state(&mut self, state: PowerState) {
        tracing::debug!(component = %self.path, from = %self.state, to = %state, "power state change");
        self.state = state;
    }

    /// Formula used in `state`.
    pub fn formula(&self, state: PowerState) -> &PowerFormula {
        &self.formulas[state.index()]
    }

    /// Replaces the formula used in `state`.
    pub fn set_formula(&mut self, state: PowerState, formula: PowerFormula) {
        self.formulas[state.index()] = formula;
    }

    /// Evaluates the current state's formula.
    ///
    /// # Errors
    ///
    /// See [`evaluate_in`](Self::evaluate_in).
    pub fn evaluate(
        &self,
        snapshot: &StatsSnapshot,
        env: &PowerEnvironment,
    ) -> Result<PowerEstimate, PowerError> {
        self.evaluate_in(self.state, snapshot, env)
    }

    /// Evaluates the formula of an explicit state.
    ///
    /// Every referenced counter is resolved before any arithmetic runs.
    ///
    /// # Errors
    ///
    /// * [`PowerError::InvalidEnvironment`] for a non-positive elapsed time or non-finite inputs.
    /// * [`PowerError::MissingCounter`] naming the first counter absent from `snapshot`.
    /// * [`PowerError::NonFinite`] when the result is NaN or infinite.
    pub fn evaluate_in(
        &self,
        state: PowerState,
        snapshot: &StatsSnapshot,
        env: &PowerEnvironment,
    ) -> Result<PowerEstimate, PowerError> {
        env.check()?;
        let formula = self.formula(state);

        for expr in [&formula.dynamic, &formula.static_power] {
            for suffix in expr.counters() {
                if self.resolve(snapshot, suffix).is_none() {
                    return Err(PowerError::MissingCounter {
                        component: self.path.clone(),
                        counter: self.counter_key(suffix),
                    });
                }
            }
        }

        let lookup = |suffix: &str| self.resolve(snapshot, suffix);
        let estimate = PowerEstimate {
            dynamic_watts: formula.dynamic.eval(env, &lookup),
            static_watts: formula.static_power.eval(env, &lookup),
        };
        if !estimate.dynamic_watts.is_finite() || !estimate.static_watts.is_finite() {
            return Err(PowerError::NonFinite {
                component: self.path.clone(),
            });
        }
        Ok(estimate)
    }

    fn counter_key(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.path)
    }

    fn resolve(&self, snapshot: &StatsSnapshot, suffix: &str) -> Option<f64> {
        snapshot.get_total(&self.counter_key(suffix))
    }
}

/// Power models of one experiment, in graph order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerModelSet {
    models: Vec<PowerModel>,
}

impl PowerModelSet {
    /// Instruments a built graph.
    ///
    /// Returns an empty set when power modeling is disabled. Otherwise the CPU always gets a
    /// model, caches only with `instrument_caches`, and configured overrides replace defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PowerError::Parse`] for a malformed override.
    pub fn attach_all(graph: &TopologyGraph, config: &PowerConfig) -> Result<Self, PowerError> {
        let mut set = Self::default();
        if !config.enabled {
            return Ok(set);
        }
        for component in graph.instrumented_components() {
            let Some(class) = ComponentClass::for_role(component.role) else {
                continue;
            };
            if class == ComponentClass::Cache && !config.instrument_caches {
                continue;
            }
            let mut model = PowerModel::new(component.path, class);
            for o in config.overrides.iter().filter(|o| o.class == class) {
                model.set_formula(o.state, PowerFormula::parse(&o.dynamic, &o.static_power)?);
            }
            set.models.push(model);
        }
        tracing::debug!(models = set.models.len(), "power models attached");
        Ok(set)
    }

    /// Adds a model.
    pub fn push(&mut self, model: PowerModel) {
        self.models.push(model);
    }

    /// Model attached at `path`.
    pub fn get(&self, path: &str) -> Option<&PowerModel> {
        self.models.iter().find(|m| m.path == path)
    }

    /// Mutable model attached at `path`.
    pub fn get_mut(&mut self, path: &str) -> Option<&mut PowerModel> {
        self.models.iter_mut().find(|m| m.path == path)
    }

    /// Models in attach order.
    pub fn iter(&self) -> std::slice::Iter<'_, PowerModel> {
        self.models.iter()
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no model is attached.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl<'a> IntoIterator for &'a PowerModelSet {
    type Item = &'a PowerModel;
    type IntoIter = std::slice::Iter<'a, PowerModel>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Everything the metrics deriver needs to report power.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerContext {
    /// Attached models.
    pub models: PowerModelSet,
    /// Supply voltage in volts.
    pub voltage: f64,
    /// Die temperature in degrees Celsius.
    pub temperature: f64,
}

impl PowerContext {
    /// Bundles models with the configured environment.
    pub const fn new(models: PowerModelSet, config: &PowerConfig) -> Self {
        Self {
            models,
            voltage: config.voltage,
            temperature: config.temperature,
        }
    }

    /// Environment for a run that lasted `elapsed_seconds`.
    pub const fn environment(&self, elapsed_seconds: f64) -> PowerEnvironment {
        PowerEnvironment {
            voltage: self.voltage,
            temperature: self.temperature,
            elapsed_seconds,
        }
    }
}
