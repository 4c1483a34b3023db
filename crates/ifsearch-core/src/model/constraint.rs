//! Constraint traits.

use crate::assignment::Assignment;

use super::{SolverValue, VariableId};

/// A constraint over a set of variables.
///
/// For a proposed value the constraint enumerates the currently assigned
/// values that would have to go away before the proposal can be assigned
/// ([`compute_conflicts`](Constraint::compute_conflicts)), or answers
/// [`in_conflict`](Constraint::in_conflict) cheaply.
///
/// Hard constraints block assignments; their conflicts are unassigned by
/// [`Neighbour::assign`](crate::Neighbour::assign). Soft constraints return
/// `false` from [`is_hard`](Constraint::is_hard) and contribute to the
/// objective through [`penalty`](Constraint::penalty) instead.
pub trait Constraint<V: SolverValue>: Send + Sync {
    /// Display name used in logs.
    fn name(&self) -> &str {
        "constraint"
    }

    /// The variables this constraint relates. A global constraint registered
    /// with [`Model::add_global_constraint`](super::Model::add_global_constraint)
    /// may return an empty slice; it participates in every check regardless.
    fn variables(&self) -> &[VariableId];

    /// Appends every currently assigned value that conflicts with `value`
    /// to `conflicts`. Appending `value` itself marks the proposal as
    /// unassignable under this constraint.
    fn compute_conflicts(&self, assignment: &Assignment<V>, value: &V, conflicts: &mut Vec<V>);

    /// True if assigning `value` would violate this constraint right now.
    fn in_conflict(&self, assignment: &Assignment<V>, value: &V) -> bool {
        let mut conflicts = Vec::new();
        self.compute_conflicts(assignment, value, &mut conflicts);
        !conflicts.is_empty()
    }

    /// Hard constraints must hold in every feasible assignment.
    fn is_hard(&self) -> bool {
        true
    }

    /// Objective contribution of a soft constraint; ignored for hard ones.
    fn penalty(&self, _assignment: &Assignment<V>) -> f64 {
        0.0
    }
}
