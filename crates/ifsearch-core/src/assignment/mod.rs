//! Mutable variable → value assignments.

mod context;

pub use context::ContextStore;

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::warn;

use crate::model::{Model, SolverValue, VariableId};

static NEXT_ASSIGNMENT_ID: AtomicU32 = AtomicU32::new(0);

/// Identity of one [`Assignment`], used to key per-assignment component
/// contexts in a [`ContextStore`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AssignmentId(u32);

impl AssignmentId {
    /// Returns the side-table index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The authoritative variable → value mapping of one search state.
///
/// Every mutation is tagged with the iteration it happened at; iteration
/// tags are used by listeners and for tie-breaks. Each solver owns exactly
/// one assignment; parallel restarts run one assignment per solver against
/// a shared read-only [`Model`].
///
/// Committed variables are assigned their fixed value at creation and
/// refuse search-time mutation.
pub struct Assignment<V: SolverValue> {
    id: AssignmentId,
    values: Vec<Option<V>>,
    /// Iteration of the last change per variable.
    iterations: Vec<u64>,
    committed: Vec<bool>,
    assigned: usize,
}

impl<V: SolverValue> Assignment<V> {
    /// Creates an empty assignment for the model, seeding committed values.
    pub fn new(model: &Model<V>) -> Self {
        let n = model.variable_count();
        let mut assignment = Self {
            id: AssignmentId(NEXT_ASSIGNMENT_ID.fetch_add(1, Ordering::Relaxed)),
            values: vec![None; n],
            iterations: vec![0; n],
            committed: vec![false; n],
            assigned: 0,
        };
        for variable in model.variables() {
            if let Some(value) = variable.committed_value() {
                let idx = variable.id().index();
                assignment.values[idx] = Some(value.clone());
                assignment.committed[idx] = true;
                assignment.assigned += 1;
            }
        }
        assignment
    }

    /// Identity of this assignment.
    pub fn id(&self) -> AssignmentId {
        self.id
    }

    /// Current value of a variable.
    pub fn value(&self, variable: VariableId) -> Option<&V> {
        self.values[variable.index()].as_ref()
    }

    /// Iteration at which the variable last changed.
    pub fn iteration_of(&self, variable: VariableId) -> u64 {
        self.iterations[variable.index()]
    }

    /// Assigns a value to its variable, returning the value it replaced.
    ///
    /// A committed variable is left untouched.
    pub fn assign(&mut self, iteration: u64, value: V) -> Option<V> {
        let variable = value.variable();
        let idx = variable.index();
        if self.committed[idx] {
            warn!(?variable, "refusing to assign committed variable");
            return None;
        }
        let old = self.values[idx].replace(value);
        self.iterations[idx] = iteration;
        if old.is_none() {
            self.assigned += 1;
        }
        old
    }

    /// Removes the variable's value, returning it.
    ///
    /// A committed variable is left untouched.
    pub fn unassign(&mut self, iteration: u64, variable: VariableId) -> Option<V> {
        let idx = variable.index();
        if self.committed[idx] {
            warn!(?variable, "refusing to unassign committed variable");
            return None;
        }
        let old = self.values[idx].take();
        if old.is_some() {
            self.iterations[idx] = iteration;
            self.assigned -= 1;
        }
        old
    }

    /// Number of assigned variables (committed ones included).
    pub fn assigned_count(&self) -> usize {
        self.assigned
    }

    /// Number of unassigned variables.
    pub fn unassigned_count(&self) -> usize {
        self.values.len() - self.assigned
    }

    /// True once every variable holds a value.
    pub fn is_complete(&self) -> bool {
        self.assigned == self.values.len()
    }

    /// Ids of unassigned variables, in arena order.
    pub fn unassigned_variables(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_none())
            .map(|(i, _)| VariableId(i as u32))
    }

    /// Ids of assigned variables, in arena order.
    pub fn assigned_variables(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some())
            .map(|(i, _)| VariableId(i as u32))
    }

    /// All assigned values, in arena order.
    pub fn assigned_values(&self) -> impl Iterator<Item = &V> {
        self.values.iter().filter_map(|v| v.as_ref())
    }

    /// Snapshot of the value slots, for best-solution bookkeeping.
    pub(crate) fn snapshot(&self) -> Vec<Option<V>> {
        self.values.clone()
    }

    /// Restores a snapshot taken by [`snapshot`](Self::snapshot), tagging
    /// every changed variable with `iteration`.
    pub(crate) fn restore(&mut self, iteration: u64, snapshot: &[Option<V>]) {
        for (idx, value) in snapshot.iter().enumerate() {
            if self.committed[idx] || self.values[idx] == *value {
                continue;
            }
            match value {
                Some(v) => {
                    if self.values[idx].replace(v.clone()).is_none() {
                        self.assigned += 1;
                    }
                }
                None => {
                    if self.values[idx].take().is_some() {
                        self.assigned -= 1;
                    }
                }
            }
            self.iterations[idx] = iteration;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;

    #[derive(Clone, PartialEq, Debug)]
    struct Val(VariableId, u32);

    impl SolverValue for Val {
        fn variable(&self) -> VariableId {
            self.0
        }
        fn to_double(&self) -> f64 {
            self.1 as f64
        }
    }

    fn model(vars: usize) -> Model<Val> {
        let mut model = Model::new();
        for i in 0..vars {
            model.add_variable_with(format!("v{i}"), |id| vec![Val(id, 0), Val(id, 1)]);
        }
        model
    }

    #[test]
    fn assign_and_unassign_track_counts_and_iterations() {
        let model = model(3);
        let mut assignment = Assignment::new(&model);
        let v0 = VariableId(0);

        assert_eq!(assignment.assigned_count(), 0);
        assert!(assignment.assign(5, Val(v0, 1)).is_none());
        assert_eq!(assignment.assigned_count(), 1);
        assert_eq!(assignment.iteration_of(v0), 5);
        assert_eq!(assignment.value(v0), Some(&Val(v0, 1)));

        let old = assignment.assign(7, Val(v0, 0));
        assert_eq!(old, Some(Val(v0, 1)));
        assert_eq!(assignment.assigned_count(), 1);
        assert_eq!(assignment.iteration_of(v0), 7);

        let removed = assignment.unassign(9, v0);
        assert_eq!(removed, Some(Val(v0, 0)));
        assert_eq!(assignment.assigned_count(), 0);
        assert_eq!(assignment.iteration_of(v0), 9);
    }

    #[test]
    fn committed_variables_are_seeded_and_immutable() {
        let mut model = model(2);
        let v0 = VariableId(0);
        model.commit_variable(v0, Val(v0, 1)).unwrap();

        let mut assignment = Assignment::new(&model);
        assert_eq!(assignment.assigned_count(), 1);
        assert_eq!(assignment.value(v0), Some(&Val(v0, 1)));

        assert!(assignment.assign(1, Val(v0, 0)).is_none());
        assert!(assignment.unassign(2, v0).is_none());
        assert_eq!(assignment.value(v0), Some(&Val(v0, 1)));
    }

    #[test]
    fn unassigned_and_assigned_variable_iterators() {
        let model = model(3);
        let mut assignment = Assignment::new(&model);
        assignment.assign(1, Val(VariableId(1), 0));

        let unassigned: Vec<_> = assignment.unassigned_variables().collect();
        assert_eq!(unassigned, vec![VariableId(0), VariableId(2)]);
        let assigned: Vec<_> = assignment.assigned_variables().collect();
        assert_eq!(assigned, vec![VariableId(1)]);
        assert!(!assignment.is_complete());
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let model = model(2);
        let mut assignment = Assignment::new(&model);
        assignment.assign(1, Val(VariableId(0), 1));
        let snapshot = assignment.snapshot();

        assignment.unassign(2, VariableId(0));
        assignment.assign(3, Val(VariableId(1), 0));
        assignment.restore(4, &snapshot);

        assert_eq!(assignment.value(VariableId(0)), Some(&Val(VariableId(0), 1)));
        assert_eq!(assignment.value(VariableId(1)), None);
        assert_eq!(assignment.assigned_count(), 1);
    }

    #[test]
    fn assignments_get_distinct_ids() {
        let model = model(1);
        let a = Assignment::new(&model);
        let b = Assignment::new(&model);
        assert_ne!(a.id(), b.id());
    }
}
