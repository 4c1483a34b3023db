//! Step counting hill climbing.

use rand::rngs::StdRng;
use rand::Rng;

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{AssignmentId, ContextStore, Neighbour, Solution, SolverValue};

use super::moves::default_pool;
use super::{rng_from_properties, NeighbourSelection};

struct CountingContext {
    idle: u64,
    /// Acceptance bound on the solution value; refreshed periodically.
    bound: f64,
    /// Accepted steps since the last bound refresh.
    steps: u64,
}

/// Hill climbing with a periodically refreshed acceptance bound.
///
/// A move is accepted when it does not worsen, or when the solution value
/// after it stays at or under the bound. The bound starts at the solution
/// value on phase entry and is reset to the then-current value after every
/// `HillClimber.CountingLimit` accepted steps, regardless of improvement.
/// Small worsening moves can therefore escape plateaux while total drift
/// stays bounded.
///
/// Idle accounting and the neighbourhood pool behave like the plain
/// [`HillClimber`](super::HillClimber).
pub struct StepCountingHillClimber<V: SolverValue> {
    neighbourhoods: Vec<Box<dyn NeighbourSelection<V>>>,
    max_idle: u64,
    max_retries: usize,
    counting_limit: u64,
    rng: StdRng,
    contexts: ContextStore<CountingContext>,
}

impl<V: SolverValue> StepCountingHillClimber<V> {
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
            counting_limit: properties.get_int("HillClimber.CountingLimit", 1000)?.max(1) as u64,
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

    /// Clears the per-assignment state, giving a fresh idle budget and bound.
    pub fn reset_idle(&mut self, id: AssignmentId) {
        self.contexts.remove(id);
    }
}

impl<V: SolverValue> NeighbourSelection<V> for StepCountingHillClimber<V> {
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        let total = solution.total_value();
        let context = self
            .contexts
            .get_or_create(solution.assignment().id(), || CountingContext {
                idle: 0,
                bound: total,
                steps: 0,
            });
        loop {
            if context.idle >= self.max_idle {
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

            let after = total + neighbour.value();
            if neighbour.value() <= 0.0 || after <= context.bound {
                if neighbour.value() < 0.0 {
                    context.idle = 0;
                } else {
                    context.idle += 1;
                }
                context.steps += 1;
                if context.steps % self.counting_limit == 0 {
                    context.bound = after;
                }
                return Some(neighbour);
            }
            context.idle += 1;
        }
    }
}
