//! The composite simple search.

use tracing::{error, info};

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{AssignmentId, ContextStore, Neighbour, Solution, SolverValue};

use crate::progress::ProgressHandle;
use crate::registry::SelectionRegistry;

use super::{
    GreatDeluge, HillClimber, NeighbourSelection, SimulatedAnnealing,
    StandardNeighbourSelection, StepCountingHillClimber,
};

/// Either hill climbing flavour, picked by `Search.CountSteps`.
enum Climber<V: SolverValue> {
    Plain(HillClimber<V>),
    Counting(StepCountingHillClimber<V>),
}

impl<V: SolverValue> Climber<V> {
    fn select(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        match self {
            Climber::Plain(c) => c.select_neighbour(solution),
            Climber::Counting(c) => c.select_neighbour(solution),
        }
    }

    fn reset_idle(&mut self, id: AssignmentId) {
        match self {
            Climber::Plain(c) => c.reset_idle(id),
            Climber::Counting(c) => c.reset_idle(id),
        }
    }
}

struct SearchContext {
    phase: i32,
}

/// Phase-sequenced search: construction → IFS → hill climbing →
/// great deluge or simulated annealing.
///
/// The phase counter lives in a per-assignment context. Phases advance
/// within a single call when their condition is already satisfied, the way
/// the classical controller falls through its switch: a call entered at
/// phase −1 with a complete assignment walks straight into hill climbing.
///
/// | phase | delegate | advances when |
/// |-------|----------|---------------|
/// | −1 | — | immediately |
/// | 0 | configured construction | it returns `None` (unless `Construction.UntilComplete`) |
/// | 1 | standard IFS selection | all variables assigned |
/// | 2 | hill climber | idle limit reached |
/// | 3 | deluge or annealing | never; the solver's termination ends it |
/// | 4+ | — | returns `None` forever |
///
/// If the assignment becomes incomplete during phases 2–3 (a composite move
/// evicted something it could not put back), control routes to the
/// construction selection when one is configured, else to the standard
/// selection, until the assignment is complete again. The hill climber's
/// idle counter is reset when that happens.
pub struct SimpleSearch<V: SolverValue> {
    construction: Option<Box<dyn NeighbourSelection<V>>>,
    construction_until_complete: bool,
    standard: StandardNeighbourSelection<V>,
    climber: Climber<V>,
    annealing: SimulatedAnnealing<V>,
    deluge: GreatDeluge<V>,
    use_deluge: bool,
    progress: ProgressHandle,
    contexts: ContextStore<SearchContext>,
}

impl<V: SolverValue> SimpleSearch<V> {
    /// Builds the controller from configuration.
    ///
    /// `Construction.Class` names a selection in the registry; an unknown
    /// name or a failing factory is reported at error level and the
    /// construction phase is skipped.
    pub fn from_properties(
        properties: &DataProperties,
        registry: &SelectionRegistry<V>,
    ) -> Result<Self, ConfigError> {
        let construction = match properties.get("Construction.Class") {
            None => None,
            Some(name) => match registry.create(name, properties) {
                Some(Ok(selection)) => Some(selection),
                Some(Err(e)) => {
                    error!(construction = name, "unable to use construction: {e}");
                    None
                }
                None => {
                    error!(construction = name, "unable to use construction: not registered");
                    None
                }
            },
        };
        let climber = if properties.get_bool("Search.CountSteps", false)? {
            Climber::Counting(StepCountingHillClimber::from_properties(properties)?)
        } else {
            Climber::Plain(HillClimber::from_properties(properties)?)
        };
        Ok(Self {
            construction,
            construction_until_complete: properties
                .get_bool("Construction.UntilComplete", false)?,
            standard: StandardNeighbourSelection::from_properties(properties)?,
            climber,
            annealing: SimulatedAnnealing::from_properties(properties)?,
            deluge: GreatDeluge::from_properties(properties)?,
            use_deluge: properties.get_bool("Search.GreatDeluge", true)?,
            progress: ProgressHandle::null(),
            contexts: ContextStore::new(),
        })
    }

    /// Current phase for an assignment, mainly for inspection in tests.
    pub fn phase(&self, id: AssignmentId) -> i32 {
        self.contexts.get(id).map(|c| c.phase).unwrap_or(-1)
    }

    fn set_phase(&mut self, id: AssignmentId, phase: i32) {
        self.contexts
            .get_or_create(id, || SearchContext { phase: -1 })
            .phase = phase;
    }

    /// Routes to whichever of construction or IFS can refill an incomplete
    /// assignment.
    fn refill(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        match &mut self.construction {
            Some(construction) => construction.select_neighbour(solution),
            None => self.standard.select_neighbour(solution),
        }
    }
}

impl<V: SolverValue> NeighbourSelection<V> for SimpleSearch<V> {
    fn init(&mut self, solution: &Solution<V>, progress: ProgressHandle) {
        self.progress = progress.clone();
        if let Some(construction) = &mut self.construction {
            construction.init(solution, progress);
        }
    }

    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        let id = solution.assignment().id();
        loop {
            let phase = self
                .contexts
                .get_or_create(id, || SearchContext { phase: -1 })
                .phase;
            match phase {
                -1 => {
                    self.set_phase(id, 0);
                    info!("construction phase");
                    if solution.assignment().unassigned_count() > 0 {
                        self.progress.set_phase(
                            "Searching for initial solution...",
                            solution.model().variable_count(),
                        );
                    }
                }
                0 => {
                    if self.construction.is_some()
                        && solution.assignment().unassigned_count() > 0
                    {
                        self.progress
                            .set_progress(solution.assignment().assigned_count());
                        let neighbour = self
                            .construction
                            .as_mut()
                            .and_then(|c| c.select_neighbour(solution));
                        if neighbour.is_some() || self.construction_until_complete {
                            return neighbour;
                        }
                    }
                    self.set_phase(id, 1);
                    info!("ifs phase");
                }
                1 => {
                    if solution.assignment().unassigned_count() > 0 {
                        self.progress
                            .set_progress(solution.assignment().assigned_count());
                        return self.standard.select_neighbour(solution);
                    }
                    self.set_phase(id, 2);
                    info!("hill climbing phase");
                }
                2 => {
                    if solution.assignment().unassigned_count() > 0 {
                        self.climber.reset_idle(id);
                        return self.refill(solution);
                    }
                    let neighbour = self.climber.select(solution);
                    if neighbour.is_some() {
                        return neighbour;
                    }
                    self.set_phase(id, 3);
                    info!(
                        "{} phase",
                        if self.use_deluge {
                            "great deluge"
                        } else {
                            "simulated annealing"
                        }
                    );
                }
                3 => {
                    if solution.assignment().unassigned_count() > 0 {
                        return self.refill(solution);
                    }
                    return if self.use_deluge {
                        self.deluge.select_neighbour(solution)
                    } else {
                        self.annealing.select_neighbour(solution)
                    };
                }
                _ => return None,
            }
        }
    }

    /// Final sweep: restore the best solution and polish it with one round
    /// of hill climbing.
    fn finish(&mut self, solution: &mut Solution<V>) {
        info!("final hill climbing sweep");
        solution.restore_best();
        let id = solution.assignment().id();
        self.climber.reset_idle(id);
        while let Some(neighbour) = self.climber.select(solution) {
            solution.apply(&neighbour);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Solver;
    use crate::termination::IterationLimit;
    use ifsearch_core::{Assignment, Constraint, Model, VariableId};
    use std::sync::Arc;

    #[derive(Clone, PartialEq, Debug)]
    struct Val {
        var: VariableId,
        tag: u32,
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

    fn val(var: VariableId, tag: u32, cost: f64) -> Val {
        Val { var, tag, cost }
    }

    fn free_model(vars: usize) -> Arc<Model<Val>> {
        let mut model = Model::new();
        for i in 0..vars {
            model.add_variable_with(format!("v{i}"), |id| {
                vec![val(id, 0, 0.5), val(id, 1, 1.0)]
            });
        }
        Arc::new(model)
    }

    fn properties() -> DataProperties {
        DataProperties::from_pairs([
            ("General.Seed", "13".to_string()),
            ("HillClimber.MaxIdleIters", "4".to_string()),
        ])
    }

    #[test]
    fn tiny_model_is_constructed_within_three_iterations() {
        let model = free_model(3);
        let search = SimpleSearch::from_properties(&properties(), &SelectionRegistry::new())
            .unwrap();
        let mut solver = Solver::new(
            DataProperties::new(),
            Arc::clone(&model),
            Box::new(search),
            Box::new(IterationLimit::new(30)),
        );
        let solution = solver.solve();

        assert!(solution.is_complete());
        assert!(solution.first_complete_iteration().unwrap() <= 3);
        // the best snapshot carries the total of the assignment it saved
        assert_eq!(solution.best_value(), 1.5);
    }

    #[test]
    fn phases_advance_in_a_single_call_when_possible() {
        let model = free_model(5);
        let mut solution = Solution::new(Arc::clone(&model));
        let mut search =
            SimpleSearch::from_properties(&properties(), &SelectionRegistry::new()).unwrap();
        let id = solution.assignment().id();

        // construction is disabled, so the first call walks -1 -> 1
        let neighbour = search.select_neighbour(&mut solution).unwrap();
        solution.apply(&neighbour);
        assert_eq!(search.phase(id), 1);

        while !solution.is_complete() {
            let neighbour = search.select_neighbour(&mut solution).unwrap();
            solution.apply(&neighbour);
        }

        // next call falls through into hill climbing
        search.select_neighbour(&mut solution);
        assert!(search.phase(id) >= 2);
    }

    #[test]
    fn unknown_construction_class_is_skipped_with_an_error() {
        let mut properties = properties();
        properties.set("Construction.Class", "no.such.Selection");
        let model = free_model(2);
        let mut solution = Solution::new(Arc::clone(&model));
        let mut search =
            SimpleSearch::from_properties(&properties, &SelectionRegistry::new()).unwrap();

        // search still works, construction simply does not exist
        assert!(search.select_neighbour(&mut solution).is_some());
    }

    #[test]
    fn registered_construction_runs_first() {
        struct CheapestFirst;
        impl NeighbourSelection<Val> for CheapestFirst {
            fn select_neighbour(
                &mut self,
                solution: &mut Solution<Val>,
            ) -> Option<Neighbour<Val>> {
                let variable = solution.assignment().unassigned_variables().next()?;
                let value = solution.model().variable(variable).values().first()?.clone();
                let delta = value.to_double();
                Some(Neighbour::simple(value, delta))
            }
        }

        let mut registry = SelectionRegistry::new();
        registry.register("cheapest", |_| Ok(Box::new(CheapestFirst)));
        let mut properties = properties();
        properties.set("Construction.Class", "cheapest");

        let model = free_model(3);
        let mut solution = Solution::new(Arc::clone(&model));
        let mut search = SimpleSearch::from_properties(&properties, &registry).unwrap();

        let id = solution.assignment().id();
        while !solution.is_complete() {
            let neighbour = search.select_neighbour(&mut solution).unwrap();
            solution.apply(&neighbour);
        }
        // the construction phase satisfied the whole model
        assert_eq!(search.phase(id), 0);
        assert_eq!(solution.total_value(), 1.5);
    }

    /// A constraint that can force an incomplete assignment during
    /// improvement: two variables must not share a tag.
    struct MutualExclusion {
        variables: Vec<VariableId>,
    }

    impl Constraint<Val> for MutualExclusion {
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

    #[test]
    fn incomplete_assignment_in_later_phases_routes_back_to_refill() {
        let mut model = Model::new();
        let mut ids = Vec::new();
        for i in 0..2 {
            ids.push(model.add_variable_with(format!("v{i}"), |id| {
                vec![val(id, 0, 0.5), val(id, 1, 1.0)]
            }));
        }
        model
            .add_constraint(Box::new(MutualExclusion {
                variables: ids.clone(),
            }))
            .unwrap();
        let model = Arc::new(model);

        let mut solution = Solution::new(Arc::clone(&model));
        let mut search =
            SimpleSearch::from_properties(&properties(), &SelectionRegistry::new()).unwrap();
        let id = solution.assignment().id();

        // drive to completion, then into hill climbing
        for _ in 0..20 {
            if let Some(neighbour) = search.select_neighbour(&mut solution) {
                solution.apply(&neighbour);
            }
            if search.phase(id) >= 2 {
                break;
            }
        }
        assert!(search.phase(id) >= 2);

        // knock one variable out from under the controller
        solution.apply(&Neighbour::composite(vec![(ids[0], None)], 0.0));
        assert!(!solution.is_complete());

        for _ in 0..10 {
            if solution.is_complete() {
                break;
            }
            if let Some(neighbour) = search.select_neighbour(&mut solution) {
                solution.apply(&neighbour);
            }
        }
        assert!(solution.is_complete());
    }
}
