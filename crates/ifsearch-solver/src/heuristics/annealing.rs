//! Simulated annealing.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;

use tracing::{info, warn};

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{ContextStore, Neighbour, Solution, SolverValue};

use super::moves::default_pool;
use super::{rng_from_properties, NeighbourSelection};

/// Generation attempts per call before giving up on a degenerate pool.
const MAX_GENERATION_ATTEMPTS: u32 = 1000;

#[derive(Debug)]
struct SaContext {
    iter: u64,
    temperature: f64,
    last_improving_iter: u64,
    last_reheat_iter: u64,
    last_restore_iter: u64,
    last_best: f64,
    moves: u64,
    accepted: u64,
    t0: Instant,
}

/// Simulated annealing over a pool of random neighbourhoods.
///
/// Improving moves are always accepted; a worsening move of delta `d` is
/// accepted with probability `exp(-d / T)`. The temperature cools by
/// `SimulatedAnnealing.CoolingRate` every
/// `SimulatedAnnealing.TemperatureLength` iterations. When no improvement
/// of the best value happens for `ReheatLengthCoef` temperature lengths the
/// temperature is multiplied by `ReheatRate`, and when a reheat itself goes
/// unrewarded for `RestoreBestLengthCoef` temperature lengths the best
/// assignment is restored and the search continues from there.
///
/// During its active phase the annealer keeps generating candidates until
/// one is accepted; the surrounding termination condition bounds the run.
pub struct SimulatedAnnealing<V: SolverValue> {
    neighbourhoods: Vec<Box<dyn NeighbourSelection<V>>>,
    initial_temperature: f64,
    cooling_rate: f64,
    temperature_length: u64,
    reheat_length: f64,
    reheat_rate: f64,
    restore_best_length: f64,
    log_interval: u64,
    rng: StdRng,
    contexts: ContextStore<SaContext>,
}

impl<V: SolverValue> std::fmt::Debug for SimulatedAnnealing<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedAnnealing")
            .field("neighbourhoods", &self.neighbourhoods.len())
            .field("initial_temperature", &self.initial_temperature)
            .field("cooling_rate", &self.cooling_rate)
            .field("temperature_length", &self.temperature_length)
            .field("reheat_length", &self.reheat_length)
            .field("reheat_rate", &self.reheat_rate)
            .field("restore_best_length", &self.restore_best_length)
            .field("log_interval", &self.log_interval)
            .field("rng", &self.rng)
            .field("contexts", &self.contexts)
            .finish()
    }
}

impl<V: SolverValue> SimulatedAnnealing<V> {
    /// Builds the annealer with the default move pool.
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Self::with_neighbourhoods(properties, default_pool(properties)?)
    }

    /// Builds the annealer over a custom neighbourhood pool.
    pub fn with_neighbourhoods(
        properties: &DataProperties,
        neighbourhoods: Vec<Box<dyn NeighbourSelection<V>>>,
    ) -> Result<Self, ConfigError> {
        let temperature_length = properties
            .get_int("SimulatedAnnealing.TemperatureLength", 2500)?
            .max(1) as u64;
        let reheat_length_coef =
            properties.get_positive_double("SimulatedAnnealing.ReheatLengthCoef", 5.0)?;
        let restore_best_length_coef =
            properties.get_positive_double("SimulatedAnnealing.RestoreBestLengthCoef", 5.0)?;
        Ok(Self {
            neighbourhoods,
            initial_temperature: properties
                .get_positive_double("SimulatedAnnealing.InitialTemperature", 1.5)?,
            cooling_rate: properties.get_double_in(
                "SimulatedAnnealing.CoolingRate",
                0.95,
                0.0,
                1.0,
            )?,
            temperature_length,
            reheat_length: reheat_length_coef * temperature_length as f64,
            reheat_rate: properties.get_positive_double("SimulatedAnnealing.ReheatRate", 1.35)?,
            restore_best_length: restore_best_length_coef * temperature_length as f64,
            log_interval: properties
                .get_int("SimulatedAnnealing.LogInterval", 100_000)?
                .max(1) as u64,
            rng: rng_from_properties(properties)?,
            contexts: ContextStore::new(),
        })
    }
}

impl<V: SolverValue> NeighbourSelection<V> for SimulatedAnnealing<V> {
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        let initial_temperature = self.initial_temperature;
        let context = self
            .contexts
            .get_or_create(solution.assignment().id(), || SaContext {
                iter: 0,
                temperature: initial_temperature,
                last_improving_iter: 0,
                last_reheat_iter: 0,
                last_restore_iter: 0,
                last_best: f64::INFINITY,
                moves: 0,
                accepted: 0,
                t0: Instant::now(),
            });

        // track best-value improvements the way a solution listener would
        let best = solution.best_value();
        if (context.last_best - best).abs() >= 1.0 || context.last_best.is_infinite() {
            if best < context.last_best {
                context.last_improving_iter = context.iter;
            }
            context.last_best = best;
        }

        let mut restore_requested = false;
        let mut attempts = 0;
        let neighbour = loop {
            if attempts >= MAX_GENERATION_ATTEMPTS {
                warn!("no acceptable neighbour generated, giving up this iteration");
                return None;
            }
            attempts += 1;

            context.iter += 1;
            if context.iter % self.temperature_length == 0 {
                context.temperature *= self.cooling_rate;
            }
            let idle_floor = context.last_improving_iter.max(context.last_reheat_iter);
            if context.iter as f64 > idle_floor as f64 + self.reheat_length {
                context.temperature *= self.reheat_rate;
                context.last_reheat_iter = context.iter;
                info!(
                    temperature = context.temperature,
                    iter = context.iter,
                    "reheating"
                );
            }
            let restore_floor = context.last_reheat_iter.max(context.last_restore_iter);
            if context.last_reheat_iter > context.last_improving_iter
                && context.iter as f64 > restore_floor as f64 + self.restore_best_length
            {
                context.last_restore_iter = context.iter;
                restore_requested = true;
            }
            if context.iter % self.log_interval == 0 {
                let elapsed = context.t0.elapsed().as_secs_f64();
                info!(
                    iter = context.iter,
                    temperature = context.temperature,
                    speed = context.iter as f64 / elapsed.max(1e-9),
                    acceptance = context.accepted as f64 / context.moves.max(1) as f64,
                    "annealing"
                );
            }
            if restore_requested {
                break None;
            }

            let k = self.rng.random_range(0..self.neighbourhoods.len());
            let Some(candidate) = self.neighbourhoods[k].select_neighbour(solution) else {
                continue;
            };
            context.moves += 1;
            let delta = candidate.value();
            let accepted = delta <= 0.0 || {
                context.temperature > 0.0
                    && self.rng.random::<f64>() < (-delta / context.temperature).exp()
            };
            if accepted {
                context.accepted += 1;
                break Some(candidate);
            }
        };

        if restore_requested {
            info!("restoring best solution after unrewarded reheat");
            solution.restore_best();
            return None;
        }
        neighbour
    }
}
