//! The model: variable arena, constraints and criteria.

mod constraint;
mod criterion;
mod value;
mod variable;

pub use constraint::Constraint;
pub use criterion::Criterion;
pub use value::SolverValue;
pub use variable::{Variable, VariableId};

use smallvec::SmallVec;

use crate::assignment::Assignment;
use crate::error::{CoreError, Result};

/// The problem model: an arena of variables plus the constraints and
/// criteria that relate them.
///
/// The model is read-only during search; all mutable search state lives in
/// [`Assignment`]s. Constraints are indexed per variable so that conflict
/// checks only visit the constraints that can be affected.
pub struct Model<V: SolverValue> {
    variables: Vec<Variable<V>>,
    constraints: Vec<Box<dyn Constraint<V>>>,
    global_constraints: Vec<Box<dyn Constraint<V>>>,
    criteria: Vec<Box<dyn Criterion<V>>>,
    /// Hard-constraint indices per variable.
    constraints_of: Vec<SmallVec<[usize; 4]>>,
}

impl<V: SolverValue> Default for Model<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: SolverValue> Model<V> {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
            constraints: Vec::new(),
            global_constraints: Vec::new(),
            criteria: Vec::new(),
            constraints_of: Vec::new(),
        }
    }

    /// Adds a variable with the given ordered domain, returning its id.
    pub fn add_variable(&mut self, name: impl Into<String>, domain: Vec<V>) -> VariableId {
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(Variable::new(id, name.into(), domain));
        self.constraints_of.push(SmallVec::new());
        id
    }

    /// Adds a variable whose domain is built from the freshly allocated id.
    ///
    /// Values name their owning variable, so domains usually cannot be built
    /// before the id exists.
    pub fn add_variable_with(
        &mut self,
        name: impl Into<String>,
        domain: impl FnOnce(VariableId) -> Vec<V>,
    ) -> VariableId {
        let id = VariableId(self.variables.len() as u32);
        self.variables
            .push(Variable::new(id, name.into(), domain(id)));
        self.constraints_of.push(SmallVec::new());
        id
    }

    /// Commits a variable to a fixed value, excluding it from search.
    pub fn commit_variable(&mut self, id: VariableId, value: V) -> Result<()> {
        if value.variable() != id {
            return Err(CoreError::ForeignValue {
                expected: id,
                actual: value.variable(),
            });
        }
        self.variable_mut(id)?.set_committed(value);
        Ok(())
    }

    /// Records an initial assignment for a variable.
    pub fn set_initial(&mut self, id: VariableId, value: V) -> Result<()> {
        if value.variable() != id {
            return Err(CoreError::ForeignValue {
                expected: id,
                actual: value.variable(),
            });
        }
        self.variable_mut(id)?.set_initial(value);
        Ok(())
    }

    /// Registers a constraint and indexes it under its variables.
    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint<V>>) -> Result<()> {
        let index = self.constraints.len();
        for &var in constraint.variables() {
            let slot = self
                .constraints_of
                .get_mut(var.index())
                .ok_or(CoreError::UnknownVariable(var))?;
            slot.push(index);
        }
        self.constraints.push(constraint);
        Ok(())
    }

    /// Registers a constraint that participates in every assignment check.
    pub fn add_global_constraint(&mut self, constraint: Box<dyn Constraint<V>>) {
        self.global_constraints.push(constraint);
    }

    /// Registers an objective criterion.
    pub fn add_criterion(&mut self, criterion: Box<dyn Criterion<V>>) {
        self.criteria.push(criterion);
    }

    /// All variables in arena order.
    pub fn variables(&self) -> &[Variable<V>] {
        &self.variables
    }

    /// Looks up one variable.
    pub fn variable(&self, id: VariableId) -> &Variable<V> {
        &self.variables[id.index()]
    }

    fn variable_mut(&mut self, id: VariableId) -> Result<&mut Variable<V>> {
        self.variables
            .get_mut(id.index())
            .ok_or(CoreError::UnknownVariable(id))
    }

    /// Number of variables.
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Constraints registered under the given variable.
    pub fn constraints_of(&self, id: VariableId) -> impl Iterator<Item = &dyn Constraint<V>> {
        self.constraints_of[id.index()]
            .iter()
            .map(|&i| self.constraints[i].as_ref())
    }

    /// Constraints that relate to all variables.
    pub fn global_constraints(&self) -> impl Iterator<Item = &dyn Constraint<V>> {
        self.global_constraints.iter().map(|c| c.as_ref())
    }

    /// Currently assigned values that conflict with assigning `value`.
    ///
    /// Unions the conflicts of every hard constraint of the value's variable
    /// and of every global constraint. If the returned set contains `value`
    /// itself, the proposal cannot be assigned at all.
    pub fn conflict_values(&self, assignment: &Assignment<V>, value: &V) -> Vec<V> {
        let mut conflicts: Vec<V> = Vec::new();
        let mut scratch = Vec::new();
        let hard_checks = self
            .constraints_of[value.variable().index()]
            .iter()
            .map(|&i| self.constraints[i].as_ref())
            .chain(self.global_constraints.iter().map(|c| c.as_ref()))
            .filter(|c| c.is_hard());
        for constraint in hard_checks {
            scratch.clear();
            constraint.compute_conflicts(assignment, value, &mut scratch);
            for conflict in scratch.drain(..) {
                if !conflicts.contains(&conflict) {
                    conflicts.push(conflict);
                }
            }
        }
        conflicts
    }

    /// True if assigning `value` would violate any hard constraint.
    pub fn in_conflict(&self, assignment: &Assignment<V>, value: &V) -> bool {
        self.constraints_of(value.variable())
            .chain(self.global_constraints())
            .any(|c| c.is_hard() && c.in_conflict(assignment, value))
    }

    /// Total objective value of an assignment; lower is better.
    ///
    /// Sums the intrinsic value of every assigned value, the weighted
    /// criteria, and the penalties of soft constraints.
    pub fn total_value(&self, assignment: &Assignment<V>) -> f64 {
        let mut total = 0.0;
        for value in assignment.assigned_values() {
            total += value.to_double();
        }
        for criterion in &self.criteria {
            total += criterion.weight() * criterion.value(assignment);
        }
        for constraint in self.constraints.iter().chain(&self.global_constraints) {
            if !constraint.is_hard() {
                total += constraint.penalty(assignment);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::Assignment;

    #[derive(Clone, PartialEq, Debug)]
    struct Val {
        var: VariableId,
        tag: char,
        cost: f64,
    }

    impl SolverValue for Val {
        fn variable(&self) -> VariableId {
            self.var
        }
        fn to_double(&self) -> f64 {
            self.cost
        }
    }

    fn val(var: VariableId, tag: char, cost: f64) -> Val {
        Val { var, tag, cost }
    }

    /// Two variables may not carry the same tag.
    struct DistinctTags {
        variables: Vec<VariableId>,
    }

    impl Constraint<Val> for DistinctTags {
        fn name(&self) -> &str {
            "distinct-tags"
        }
        fn variables(&self) -> &[VariableId] {
            &self.variables
        }
        fn compute_conflicts(
            &self,
            assignment: &Assignment<Val>,
            value: &Val,
            conflicts: &mut Vec<Val>,
        ) {
            for &other in &self.variables {
                if other == value.variable() {
                    continue;
                }
                if let Some(assigned) = assignment.value(other) {
                    if assigned.tag == value.tag {
                        conflicts.push(assigned.clone());
                    }
                }
            }
        }
    }

    struct UnassignedPenalty;

    impl Constraint<Val> for UnassignedPenalty {
        fn variables(&self) -> &[VariableId] {
            &[]
        }
        fn compute_conflicts(&self, _: &Assignment<Val>, _: &Val, _: &mut Vec<Val>) {}
        fn is_hard(&self) -> bool {
            false
        }
        fn penalty(&self, assignment: &Assignment<Val>) -> f64 {
            assignment.unassigned_count() as f64 * 100.0
        }
    }

    fn two_variable_model() -> (Model<Val>, VariableId, VariableId) {
        let mut model = Model::new();
        let v0 = model.add_variable_with("v0", |id| vec![val(id, 'x', 1.0), val(id, 'y', 2.0)]);
        let v1 = model.add_variable_with("v1", |id| vec![val(id, 'x', 1.0), val(id, 'y', 2.0)]);
        model
            .add_constraint(Box::new(DistinctTags {
                variables: vec![v0, v1],
            }))
            .unwrap();
        (model, v0, v1)
    }

    #[test]
    fn conflict_values_reports_clashing_assignment() {
        let (model, v0, v1) = two_variable_model();
        let mut assignment = Assignment::new(&model);
        assignment.assign(1, val(v0, 'x', 1.0));

        let conflicts = model.conflict_values(&assignment, &val(v1, 'x', 1.0));
        assert_eq!(conflicts, vec![val(v0, 'x', 1.0)]);
        assert!(model.in_conflict(&assignment, &val(v1, 'x', 1.0)));
        assert!(!model.in_conflict(&assignment, &val(v1, 'y', 2.0)));
    }

    #[test]
    fn total_value_sums_values_and_soft_penalties() {
        let (mut model, v0, v1) = two_variable_model();
        model.add_global_constraint(Box::new(UnassignedPenalty));
        let mut assignment = Assignment::new(&model);

        // both unassigned
        assert_eq!(model.total_value(&assignment), 200.0);

        assignment.assign(1, val(v0, 'x', 1.0));
        assignment.assign(2, val(v1, 'y', 2.0));
        assert_eq!(model.total_value(&assignment), 3.0);
    }

    #[test]
    fn assign_unassign_round_trip_restores_total_value() {
        let (mut model, v0, _) = two_variable_model();
        model.add_global_constraint(Box::new(UnassignedPenalty));
        let mut assignment = Assignment::new(&model);
        let before = model.total_value(&assignment);

        assignment.assign(1, val(v0, 'x', 1.0));
        assignment.unassign(2, v0);
        assert!((model.total_value(&assignment) - before).abs() < 1e-9);
    }

    #[test]
    fn committed_value_must_belong_to_variable() {
        let (mut model, v0, v1) = two_variable_model();
        let err = model.commit_variable(v0, val(v1, 'x', 1.0)).unwrap_err();
        assert!(matches!(err, CoreError::ForeignValue { .. }));
    }
}
