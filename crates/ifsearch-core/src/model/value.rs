//! The value capability trait.

use std::fmt::Debug;

use super::VariableId;

/// An assignable value tied to exactly one variable.
///
/// Values are immutable and compared structurally. Each value knows the
/// variable it belongs to, and contributes [`to_double`](SolverValue::to_double)
/// to the minimized objective when assigned.
///
/// # Example
///
/// ```
/// use ifsearch_core::{SolverValue, VariableId};
///
/// #[derive(Clone, PartialEq, Debug)]
/// struct Slot {
///     variable: VariableId,
///     period: usize,
///     preference: f64,
/// }
///
/// impl SolverValue for Slot {
///     fn variable(&self) -> VariableId {
///         self.variable
///     }
///     fn to_double(&self) -> f64 {
///         self.preference
///     }
/// }
/// ```
pub trait SolverValue: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Returns the owning variable.
    fn variable(&self) -> VariableId;

    /// Objective contribution of this value when assigned; lower is better.
    fn to_double(&self) -> f64;
}
