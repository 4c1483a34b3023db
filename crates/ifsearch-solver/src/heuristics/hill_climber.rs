//! Hill climbing.

use rand::rngs::StdRng;
use rand::Rng;

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{AssignmentId, ContextStore, Neighbour, Solution, SolverValue};

use tracing::debug;

use super::moves::default_pool;
use super::{rng_from_properties, NeighbourSelection};

#[derive(Default)]
struct ClimberContext {
    /// Iterations since the last accepted improving move.
    idle: u64,
}

/// Accepts non-worsening moves from a pool of neighbourhoods until idle.
///
/// Each call picks a neighbourhood uniformly at random and accepts its move
/// iff `value() ≤ 0`. The idle counter resets on accepted improving moves
/// and on every rejection or zero-value accept counts one iteration; once it
/// reaches `HillClimber.MaxIdleIters` the climber returns `None` to hand
/// control to the next phase.
///
/// Registered neighbourhoods are told they run under a hill climber
/// ([`set_hc_mode`](NeighbourSelection::set_hc_mode)), so they may skip
/// expensive worsening-move work. A neighbourhood returning `None` is simply
/// retried, with a bounded budget (`HillClimber.MaxRetries`) per outer call.
pub struct HillClimber<V: SolverValue> {
    neighbourhoods: Vec<Box<dyn NeighbourSelection<V>>>,
    max_idle: u64,
    max_retries: usize,
    rng: StdRng,
    contexts: ContextStore<ClimberContext>,
}

impl<V: SolverValue> HillClimber<V> {
    /// Builds the climber with the default move pool.
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Self::with_neighbourhoods(properties, default_pool(properties)?)
    }

    /// Builds the climber over a custom neighbourhood pool.
    pub fn with_neighbourhoods(
        properties: &DataProperties,
        neighbourhoods: Vec<Box<dyn NeighbourSelection<V>>>,
    ) -> Result<Self, ConfigError> {
        let mut climber = Self {
            neighbourhoods: Vec::new(),
            max_idle: properties.get_int("HillClimber.MaxIdleIters", 10_000)?.max(0) as u64,
            max_retries: properties.get_int("HillClimber.MaxRetries", 32)?.max(1) as usize,
            rng: rng_from_properties(properties)?,
            contexts: ContextStore::new(),
        };
        for neighbourhood in neighbourhoods {
            climber.register(neighbourhood);
        }
        Ok(climber)
    }

    /// Adds a neighbourhood, flagging it as hill-climber employed.
    pub fn register(&mut self, mut neighbourhood: Box<dyn NeighbourSelection<V>>) {
        neighbourhood.set_hc_mode(true);
        self.neighbourhoods.push(neighbourhood);
    }

    /// Clears the idle counter for an assignment, e.g. after the composite
    /// controller routed away to refill an incomplete assignment.
    pub fn reset_idle(&mut self, id: AssignmentId) {
        self.contexts.remove(id);
    }
}

impl<V: SolverValue> NeighbourSelection<V> for HillClimber<V> {
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        let context = self
            .contexts
            .get_or_create(solution.assignment().id(), ClimberContext::default);
        loop {
            if context.idle >= self.max_idle {
                debug!(idle = context.idle, "hill climber idle limit reached");
                context.idle = 0;
                return None;
            }

            let mut produced = None;
            for _ in 0..self.max_retries {
                let k = self.rng.random_range(0..self.neighbourhoods.len());
                if let Some(neighbour) = self.neighbourhoods[k].select_neighbour(solution) {
                    produced = Some(neighbour);
                    break;
                }
            }
            let Some(neighbour) = produced else {
                return None;
            };

            if neighbour.value() <= 0.0 {
                if neighbour.value() < 0.0 {
                    context.idle = 0;
                } else {
                    context.idle += 1;
                }
                return Some(neighbour);
            }
            context.idle += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifsearch_core::{Model, VariableId};
    use std::sync::Arc;

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

    fn solution(costs: &[f64]) -> Solution<Val> {
        let mut model = Model::new();
        let id = model.add_variable_with("v0", |id| {
            costs.iter().map(|&c| Val(id, c)).collect()
        });
        let mut solution = Solution::new(Arc::new(model));
        let start = Val(id, costs[0]);
        solution.apply(&Neighbour::simple(start.clone(), start.to_double()));
        solution
    }

    /// Always proposes a move of the given fixed value.
    struct FixedValueMove(f64);

    impl NeighbourSelection<Val> for FixedValueMove {
        fn select_neighbour(&mut self, solution: &mut Solution<Val>) -> Option<Neighbour<Val>> {
            let value = solution.assignment().value(VariableId(0)).unwrap().clone();
            Some(Neighbour::simple(value, self.0))
        }
    }

    fn properties(max_idle: u64) -> DataProperties {
        DataProperties::from_pairs([
            ("General.Seed", "3".to_string()),
            ("HillClimber.MaxIdleIters", max_idle.to_string()),
        ])
    }

    #[test]
    fn plateau_returns_none_after_exactly_max_idle_applies() {
        let mut solution = solution(&[1.0]);
        let mut climber =
            HillClimber::with_neighbourhoods(&properties(5), vec![Box::new(FixedValueMove(0.0))])
                .unwrap();

        let mut applies = 0;
        while let Some(neighbour) = climber.select_neighbour(&mut solution) {
            solution.apply(&neighbour);
            applies += 1;
            assert!(applies <= 5, "climber ran past its idle budget");
        }
        assert_eq!(applies, 5);
    }

    #[test]
    fn worsening_moves_are_never_returned() {
        let mut solution = solution(&[1.0]);
        let mut climber =
            HillClimber::with_neighbourhoods(&properties(10), vec![Box::new(FixedValueMove(0.5))])
                .unwrap();
        // every proposal worsens, so the climber must go idle without
        // returning a single move
        assert!(climber.select_neighbour(&mut solution).is_none());
    }

    #[test]
    fn improving_moves_reset_the_idle_counter() {
        struct ImproveEvery3 {
            calls: u64,
        }
        impl NeighbourSelection<Val> for ImproveEvery3 {
            fn select_neighbour(
                &mut self,
                solution: &mut Solution<Val>,
            ) -> Option<Neighbour<Val>> {
                self.calls += 1;
                let value = solution.assignment().value(VariableId(0)).unwrap().clone();
                let delta = if self.calls % 3 == 0 { -1.0 } else { 0.0 };
                Some(Neighbour::simple(value, delta))
            }
        }

        let mut solution = solution(&[1.0]);
        let mut climber = HillClimber::with_neighbourhoods(
            &properties(4),
            vec![Box::new(ImproveEvery3 { calls: 0 })],
        )
        .unwrap();

        // far more accepted moves than the idle budget alone would allow
        for _ in 0..20 {
            let neighbour = climber.select_neighbour(&mut solution).unwrap();
            solution.apply(&neighbour);
        }
    }

    #[test]
    fn exhausted_neighbourhoods_hand_control_back() {
        struct Never;
        impl NeighbourSelection<Val> for Never {
            fn select_neighbour(&mut self, _: &mut Solution<Val>) -> Option<Neighbour<Val>> {
                None
            }
        }

        let mut solution = solution(&[1.0]);
        let mut climber =
            HillClimber::with_neighbourhoods(&properties(100), vec![Box::new(Never)]).unwrap();
        assert!(climber.select_neighbour(&mut solution).is_none());
    }

    #[test]
    fn reset_idle_gives_a_fresh_budget() {
        let mut solution = solution(&[1.0]);
        let mut climber =
            HillClimber::with_neighbourhoods(&properties(2), vec![Box::new(FixedValueMove(0.0))])
                .unwrap();

        while let Some(neighbour) = climber.select_neighbour(&mut solution) {
            solution.apply(&neighbour);
        }
        climber.reset_idle(solution.assignment().id());
        assert!(climber.select_neighbour(&mut solution).is_some());
    }
}
