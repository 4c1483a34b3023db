//! Pending moves.

use tracing::warn;

use crate::assignment::Assignment;
use crate::model::{Model, SolverValue, VariableId};

/// A pending change to an assignment.
///
/// A neighbour either places a single value (unassigning whatever conflicts
/// with it) or rewrites a whole group of variables at once, as the
/// branch-and-bound selection does for one entity's schedule. It carries the
/// objective delta its application is expected to produce; lower is better.
#[derive(Debug, Clone)]
pub enum Neighbour<V: SolverValue> {
    /// Assign one value, evicting its current conflicts.
    Simple { value: V, delta: f64 },
    /// Reassign several variables together; `None` unassigns.
    Composite {
        changes: Vec<(VariableId, Option<V>)>,
        delta: f64,
    },
}

impl<V: SolverValue> Neighbour<V> {
    /// Single-value move with the given objective delta.
    pub fn simple(value: V, delta: f64) -> Self {
        Neighbour::Simple { value, delta }
    }

    /// Multi-variable move with the given objective delta.
    pub fn composite(changes: Vec<(VariableId, Option<V>)>, delta: f64) -> Self {
        Neighbour::Composite { changes, delta }
    }

    /// Expected objective delta; lower is better.
    pub fn value(&self) -> f64 {
        match self {
            Neighbour::Simple { delta, .. } => *delta,
            Neighbour::Composite { delta, .. } => *delta,
        }
    }

    /// Applies the change at the given iteration.
    ///
    /// Conflicts are recomputed at apply time, so a neighbour selected
    /// against an older state still leaves the assignment free of hard
    /// conflicts. A value whose conflict set contains the value itself
    /// cannot be placed; it is skipped with a warning and the rest of the
    /// neighbour still applies.
    pub fn assign(&self, model: &Model<V>, assignment: &mut Assignment<V>, iteration: u64) {
        match self {
            Neighbour::Simple { value, .. } => {
                place(model, assignment, iteration, value);
            }
            Neighbour::Composite { changes, .. } => {
                for (variable, _) in changes {
                    assignment.unassign(iteration, *variable);
                }
                for (_, value) in changes {
                    if let Some(value) = value {
                        place(model, assignment, iteration, value);
                    }
                }
            }
        }
    }

    /// The variables this neighbour touches.
    pub fn variables(&self) -> Vec<VariableId> {
        match self {
            Neighbour::Simple { value, .. } => vec![value.variable()],
            Neighbour::Composite { changes, .. } => changes.iter().map(|(v, _)| *v).collect(),
        }
    }
}

fn place<V: SolverValue>(
    model: &Model<V>,
    assignment: &mut Assignment<V>,
    iteration: u64,
    value: &V,
) {
    let conflicts = model.conflict_values(assignment, value);
    if conflicts.contains(value) {
        warn!(
            variable = ?value.variable(),
            "skipping unassignable value, conflicts with itself"
        );
        return;
    }
    for conflict in &conflicts {
        assignment.unassign(iteration, conflict.variable());
    }
    assignment.assign(iteration, value.clone());
}
