//! Solution bookkeeping: current state, best snapshot, listeners.

use std::sync::Arc;

use tracing::debug;

use crate::assignment::Assignment;
use crate::model::{Model, SolverValue};
use crate::neighbour::Neighbour;

/// Snapshot of the solution counters handed to listeners.
#[derive(Debug, Clone, Copy)]
pub struct SolutionEvent {
    pub iteration: u64,
    pub total_value: f64,
    pub best_value: f64,
}

/// Observer of solution lifecycle events.
///
/// Listeners fire synchronously, in registration order, after the mutation
/// they describe.
pub trait SolutionListener: Send {
    /// The assignment changed and the running value was recomputed.
    fn solution_updated(&mut self, _event: &SolutionEvent) {}

    /// The current solution strictly improved on the best and was saved.
    fn best_saved(&mut self, _event: &SolutionEvent) {}

    /// The best snapshot was restored into the assignment.
    fn best_restored(&mut self, _event: &SolutionEvent) {}
}

/// A model paired with one assignment, tracking the best state seen.
///
/// The solution owns the iteration counter; every applied [`Neighbour`]
/// advances it, as does an idle tick of the solver loop. The best snapshot
/// is a shallow copy of the variable → value slots.
///
/// Invariant: the saved best value never increases over the lifetime of the
/// solution (minimization).
pub struct Solution<V: SolverValue> {
    model: Arc<Model<V>>,
    assignment: Assignment<V>,
    iteration: u64,
    total_value: f64,
    best_value: f64,
    best_unassigned: usize,
    best_iteration: Option<u64>,
    best_values: Option<Vec<Option<V>>>,
    first_complete: Option<u64>,
    listeners: Vec<Box<dyn SolutionListener>>,
}

impl<V: SolverValue> Solution<V> {
    /// Creates a solution with a fresh assignment for the model.
    pub fn new(model: Arc<Model<V>>) -> Self {
        let assignment = Assignment::new(&model);
        let total_value = model.total_value(&assignment);
        let first_complete = assignment.is_complete().then_some(0);
        Self {
            model,
            assignment,
            iteration: 0,
            total_value,
            best_value: f64::INFINITY,
            best_unassigned: usize::MAX,
            best_iteration: None,
            best_values: None,
            first_complete,
            listeners: Vec::new(),
        }
    }

    /// The shared, read-only model.
    pub fn model(&self) -> &Model<V> {
        &self.model
    }

    /// The current assignment.
    pub fn assignment(&self) -> &Assignment<V> {
        &self.assignment
    }

    /// Mutable access to the assignment, for callers that manage their own
    /// bookkeeping. Prefer [`apply`](Self::apply).
    pub fn assignment_mut(&mut self) -> &mut Assignment<V> {
        &mut self.assignment
    }

    /// Current iteration counter.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Cached total value of the current assignment.
    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    /// Best total value ever saved; infinite until the first save.
    pub fn best_value(&self) -> f64 {
        self.best_value
    }

    /// Iteration of the last best save.
    pub fn best_iteration(&self) -> Option<u64> {
        self.best_iteration
    }

    /// Iteration at which the assignment first became complete.
    pub fn first_complete_iteration(&self) -> Option<u64> {
        self.first_complete
    }

    /// True once every variable holds a value.
    pub fn is_complete(&self) -> bool {
        self.assignment.is_complete()
    }

    /// Registers a lifecycle listener.
    pub fn add_listener(&mut self, listener: Box<dyn SolutionListener>) {
        self.listeners.push(listener);
    }

    /// Applies a neighbour at the next iteration, recomputes the running
    /// value, and saves the best snapshot on strict improvement.
    pub fn apply(&mut self, neighbour: &Neighbour<V>) {
        self.iteration += 1;
        let model = Arc::clone(&self.model);
        neighbour.assign(&model, &mut self.assignment, self.iteration);
        self.update();
        self.save_best();
    }

    /// Advances the iteration counter without changing the assignment.
    pub fn idle_tick(&mut self) {
        self.iteration += 1;
    }

    /// Recomputes the running value and fires `solution_updated`.
    ///
    /// Called by [`apply`](Self::apply); callers that mutate the assignment
    /// directly must
    /// call it themselves.
    pub fn update(&mut self) {
        self.total_value = self.model.total_value(&self.assignment);
        if self.first_complete.is_none() && self.assignment.is_complete() {
            self.first_complete = Some(self.iteration);
            debug!(iteration = self.iteration, "assignment complete for the first time");
        }
        self.notify(|l, e| l.solution_updated(e));
    }

    /// Saves the current state as best iff it strictly improves.
    ///
    /// A state improves when it leaves fewer variables unassigned, or the
    /// same number with a strictly lower total value. Saving twice without
    /// an intervening improvement is a no-op.
    pub fn save_best(&mut self) {
        let unassigned = self.assignment.unassigned_count();
        if self.best_values.is_some()
            && (unassigned > self.best_unassigned
                || (unassigned == self.best_unassigned && self.total_value >= self.best_value))
        {
            return;
        }
        self.best_values = Some(self.assignment.snapshot());
        self.best_value = self.total_value;
        self.best_unassigned = unassigned;
        self.best_iteration = Some(self.iteration);
        self.notify(|l, e| l.best_saved(e));
    }

    /// Number of unassigned variables in the best snapshot.
    pub fn best_unassigned(&self) -> usize {
        self.best_unassigned
    }

    /// Restores the best snapshot into the assignment, if one was saved.
    pub fn restore_best(&mut self) {
        let Some(snapshot) = self.best_values.take() else {
            return;
        };
        self.assignment.restore(self.iteration, &snapshot);
        self.best_values = Some(snapshot);
        self.total_value = self.model.total_value(&self.assignment);
        self.notify(|l, e| l.best_restored(e));
    }

    /// The best snapshot's value slots, in arena order.
    pub fn best_values(&self) -> Option<&[Option<V>]> {
        self.best_values.as_deref()
    }

    fn notify(&mut self, f: impl Fn(&mut dyn SolutionListener, &SolutionEvent)) {
        let event = SolutionEvent {
            iteration: self.iteration,
            total_value: self.total_value,
            best_value: self.best_value,
        };
        for listener in &mut self.listeners {
            f(listener.as_mut(), &event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, PartialEq, Debug)]
    struct Val(VariableId, f64);

    impl SolverValue for Val {
        fn variable(&self) -> VariableId {
            self.0
        }
        fn to_double(&self) -> f64 {
            self.1
        }
    }

    fn solution(vars: usize) -> Solution<Val> {
        let mut model = Model::new();
        for i in 0..vars {
            model.add_variable_with(format!("v{i}"), |id| vec![Val(id, 1.0), Val(id, 2.0)]);
        }
        Solution::new(Arc::new(model))
    }

    #[test]
    fn apply_advances_iteration_and_updates_value() {
        let mut solution = solution(2);
        assert_eq!(solution.iteration(), 0);

        solution.apply(&Neighbour::simple(Val(VariableId(0), 2.0), 2.0));
        assert_eq!(solution.iteration(), 1);
        assert_eq!(solution.total_value(), 2.0);
        assert_eq!(solution.best_value(), 2.0);

        solution.idle_tick();
        assert_eq!(solution.iteration(), 2);
    }

    #[test]
    fn best_value_is_monotonically_non_increasing() {
        let mut solution = solution(1);
        let mut best_seen = Vec::new();

        for cost in [5.0, 3.0, 4.0, 1.0, 2.0] {
            solution.apply(&Neighbour::simple(Val(VariableId(0), cost), 0.0));
            best_seen.push(solution.best_value());
        }
        assert!(best_seen.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(solution.best_value(), 1.0);
    }

    #[test]
    fn save_best_is_idempotent() {
        let mut solution = solution(1);
        solution.apply(&Neighbour::simple(Val(VariableId(0), 1.0), 0.0));
        let best_iteration = solution.best_iteration();

        solution.save_best();
        solution.save_best();
        assert_eq!(solution.best_iteration(), best_iteration);
    }

    #[test]
    fn restore_best_reinstates_snapshot() {
        let mut solution = solution(1);
        solution.apply(&Neighbour::simple(Val(VariableId(0), 1.0), 0.0));
        solution.apply(&Neighbour::simple(Val(VariableId(0), 2.0), 1.0));
        assert_eq!(solution.total_value(), 2.0);

        solution.restore_best();
        assert_eq!(solution.total_value(), 1.0);
        assert_eq!(
            solution.assignment().value(VariableId(0)),
            Some(&Val(VariableId(0), 1.0))
        );
    }

    #[test]
    fn first_complete_is_recorded_once() {
        let mut solution = solution(2);
        solution.apply(&Neighbour::simple(Val(VariableId(0), 1.0), 0.0));
        assert_eq!(solution.first_complete_iteration(), None);

        solution.apply(&Neighbour::simple(Val(VariableId(1), 1.0), 0.0));
        assert_eq!(solution.first_complete_iteration(), Some(2));

        solution.apply(&Neighbour::composite(vec![(VariableId(0), None)], 0.0));
        solution.apply(&Neighbour::simple(Val(VariableId(0), 1.0), 0.0));
        assert_eq!(solution.first_complete_iteration(), Some(2));
    }

    #[test]
    fn listeners_fire_on_improvement() {
        static SAVES: AtomicUsize = AtomicUsize::new(0);

        struct Counter;
        impl SolutionListener for Counter {
            fn best_saved(&mut self, _event: &SolutionEvent) {
                SAVES.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut solution = solution(1);
        solution.add_listener(Box::new(Counter));
        solution.apply(&Neighbour::simple(Val(VariableId(0), 2.0), 0.0));
        solution.apply(&Neighbour::simple(Val(VariableId(0), 1.0), 0.0));
        // second apply improves, first apply seeds the best
        assert_eq!(SAVES.load(Ordering::SeqCst), 2);
    }
}
