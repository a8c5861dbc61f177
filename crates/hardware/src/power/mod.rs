//! Discrete power-state modeling.
//!
//! This module provides:
//! 1. **Formulas:** [`Expr`] trees over voltage, temperature, elapsed time, and counters.
//! 2. **States:** [`PowerState`] with one [`PowerFormula`] per state and per [`ComponentClass`].
//! 3. **Models:** [`PowerModel`] attached per component and [`PowerModelSet`] per experiment.

/// Expression trees and their textual grammar.
pub mod expr;

/// States, default formula tables, and per-component models.
pub mod model;

pub use expr::{Expr, PowerEnvironment};
pub use model::{
    ComponentClass, PowerContext, PowerEstimate, PowerFormula, PowerModel, PowerModelSet,
    PowerState,
};
