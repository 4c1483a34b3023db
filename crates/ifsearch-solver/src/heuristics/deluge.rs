//! Great deluge.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;

use tracing::{info, warn};

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{ContextStore, Neighbour, Solution, SolverValue};

use super::moves::default_pool;
use super::{rng_from_properties, NeighbourSelection};

const MAX_GENERATION_ATTEMPTS: u32 = 1000;

#[derive(Debug)]
struct GdContext {
    started: bool,
    iter: u64,
    bound: f64,
    idle: i32,
    last_improving_iter: u64,
    last_best: f64,
    moves: u64,
    accepted: u64,
    t0: Instant,
}

impl GdContext {
    fn new() -> Self {
        Self {
            started: false,
            iter: 0,
            bound: 0.0,
            idle: 0,
            last_improving_iter: 0,
            last_best: f64::INFINITY,
            moves: 0,
            accepted: 0,
            t0: Instant::now(),
        }
    }

    /// Records best-value movement; an improvement of at least 1.0 resets
    /// the idle counter.
    fn observe_best(&mut self, best: f64) {
        if (self.last_best - best).abs() >= 1.0 {
            self.last_improving_iter = self.iter;
            self.idle = 0;
            self.last_best = best;
        } else if self.last_best.is_infinite() {
            self.last_best = best;
        }
    }

    /// Advances one iteration: decay the bound, and rebound it when it
    /// sinks under the lower-bound threshold of the current idle round.
    fn inc_iter(&mut self, cool_rate: f64, upper: f64, lower: f64, best: f64) {
        if !self.started {
            self.started = true;
            self.iter = 0;
            self.last_improving_iter = 0;
            self.t0 = Instant::now();
            self.bound = upper * best;
        } else {
            self.iter += 1;
            self.bound *= cool_rate;
        }
        if self.bound < lower.powi(1 + self.idle) * best {
            self.idle += 1;
            info!(idle = self.idle, "deluge bound exhausted, rebounding");
            self.bound = (best + 2.0).max(upper.powi(self.idle) * best);
        }
    }

    /// A move is acceptable while it does not worsen, or while the value it
    /// leads to stays at or under the bound.
    fn accept(&self, total: f64, value: f64) -> bool {
        value <= 0.0 || total + value <= self.bound
    }
}

/// Great deluge over a pool of random neighbourhoods.
///
/// The acceptance bound starts at `GreatDeluge.UpperBoundRate` times the
/// best value ever found and decays by `GreatDeluge.CoolRate` each
/// iteration. Once it sinks under
/// `GreatDeluge.LowerBoundRate^(1+idle)` times the best value, the idle
/// counter goes up and the bound springs back to
/// `UpperBoundRate^idle` times the best value (at least best + 2.0), so
/// every idle round searches a progressively wider band. An improvement of
/// the best value by at least 1.0 resets the idle counter.
pub struct GreatDeluge<V: SolverValue> {
    neighbourhoods: Vec<Box<dyn NeighbourSelection<V>>>,
    cool_rate: f64,
    upper_bound_rate: f64,
    lower_bound_rate: f64,
    log_interval: u64,
    rng: StdRng,
    contexts: ContextStore<GdContext>,
}

impl<V: SolverValue> std::fmt::Debug for GreatDeluge<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreatDeluge")
            .field("neighbourhoods", &self.neighbourhoods.len())
            .field("cool_rate", &self.cool_rate)
            .field("upper_bound_rate", &self.upper_bound_rate)
            .field("lower_bound_rate", &self.lower_bound_rate)
            .field("log_interval", &self.log_interval)
            .field("rng", &self.rng)
            .field("contexts", &self.contexts)
            .finish()
    }
}

impl<V: SolverValue> GreatDeluge<V> {
    /// Builds the deluge with the default move pool.
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Self::with_neighbourhoods(properties, default_pool(properties)?)
    }

    /// Builds the deluge over a custom neighbourhood pool.
    pub fn with_neighbourhoods(
        properties: &DataProperties,
        neighbourhoods: Vec<Box<dyn NeighbourSelection<V>>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            neighbourhoods,
            cool_rate: properties.get_double_in("GreatDeluge.CoolRate", 0.999_999_95, 0.0, 1.0)?,
            upper_bound_rate: properties.get_positive_double("GreatDeluge.UpperBoundRate", 1.05)?,
            lower_bound_rate: properties.get_double_in(
                "GreatDeluge.LowerBoundRate",
                0.95,
                0.0,
                1.0,
            )?,
            log_interval: properties.get_int("GreatDeluge.LogInterval", 100_000)?.max(1) as u64,
            rng: rng_from_properties(properties)?,
            contexts: ContextStore::new(),
        })
    }
}

impl<V: SolverValue> NeighbourSelection<V> for GreatDeluge<V> {
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        let cool_rate = self.cool_rate;
        let upper = self.upper_bound_rate;
        let lower = self.lower_bound_rate;
        let best = solution.best_value();
        let total = solution.total_value();

        let context = self
            .contexts
            .get_or_create(solution.assignment().id(), GdContext::new);
        context.observe_best(best);

        let mut attempts = 0;
        loop {
            if attempts >= MAX_GENERATION_ATTEMPTS {
                warn!("no acceptable neighbour generated, giving up this iteration");
                return None;
            }
            attempts += 1;

            context.inc_iter(cool_rate, upper, lower, best);
            if context.iter > 0 && context.iter % self.log_interval == 0 {
                let elapsed = context.t0.elapsed().as_secs_f64();
                info!(
                    iter = context.iter,
                    bound = context.bound,
                    best,
                    current = total,
                    idle = context.idle,
                    speed = context.iter as f64 / elapsed.max(1e-9),
                    acceptance = context.accepted as f64 / context.moves.max(1) as f64,
                    "deluge"
                );
            }

            let k = self.rng.random_range(0..self.neighbourhoods.len());
            let Some(candidate) = self.neighbourhoods[k].select_neighbour(solution) else {
                continue;
            };
            context.moves += 1;
            if context.accept(total, candidate.value()) {
                context.accepted += 1;
                return Some(candidate);
            }
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

    #[test]
    fn bound_decays_geometrically_without_acceptance() {
        let mut context = GdContext::new();
        // keep the lower-bound rebound out of the way
        let lower = 1e-9;

        context.inc_iter(0.5, 1.05, lower, 100.0);
        assert_eq!(context.bound, 105.0);
        for _ in 0..3 {
            context.inc_iter(0.5, 1.05, lower, 100.0);
        }
        assert_eq!(context.bound, 13.125);
    }

    #[test]
    fn exhausted_bound_rebounds_one_band_wider() {
        let mut context = GdContext::new();
        context.inc_iter(0.5, 1.05, 0.95, 100.0);
        assert_eq!(context.bound, 105.0);

        // 52.5 < 0.95^1 * 100, first idle round
        context.inc_iter(0.5, 1.05, 0.95, 100.0);
        assert_eq!(context.idle, 1);
        assert_eq!(context.bound, 105.0);

        // decays to 52.5 again, now under 0.95^2 * 100
        context.inc_iter(0.5, 1.05, 0.95, 100.0);
        assert_eq!(context.idle, 2);
        assert_eq!(context.bound, 1.05f64.powi(2) * 100.0);
    }

    #[test]
    fn rebound_never_sinks_under_best_plus_two() {
        let mut context = GdContext::new();
        context.inc_iter(0.5, 1.05, 0.95, 1.0);
        // 1.05 * 1.0 would be a uselessly tight band
        context.inc_iter(0.5, 1.05, 0.95, 1.0);
        assert!(context.bound >= 3.0);
    }

    #[test]
    fn improvement_resets_the_idle_counter() {
        let mut context = GdContext::new();
        context.observe_best(100.0);
        context.idle = 3;
        context.observe_best(98.5);
        assert_eq!(context.idle, 0);

        // sub-epsilon wiggle does not count as improvement
        context.idle = 2;
        context.observe_best(98.0);
        assert_eq!(context.idle, 2);
    }

    #[test]
    fn accepted_moves_respect_the_bound_discipline() {
        struct FixedDelta(f64);
        impl NeighbourSelection<Val> for FixedDelta {
            fn select_neighbour(
                &mut self,
                solution: &mut Solution<Val>,
            ) -> Option<Neighbour<Val>> {
                let value = solution.assignment().value(VariableId(0)).unwrap().clone();
                Some(Neighbour::simple(value, self.0))
            }
        }

        let mut model = Model::new();
        let id = model.add_variable_with("v0", |id| vec![Val(id, 100.0)]);
        let mut solution = Solution::new(Arc::new(model));
        solution.apply(&Neighbour::simple(Val(id, 100.0), 100.0));

        let properties = DataProperties::from_pairs([
            ("General.Seed", "23".to_string()),
            ("GreatDeluge.CoolRate", "0.99".to_string()),
        ]);
        let mut deluge =
            GreatDeluge::with_neighbourhoods(&properties, vec![Box::new(FixedDelta(2.0))])
                .unwrap();

        for _ in 0..20 {
            if let Some(neighbour) = deluge.select_neighbour(&mut solution) {
                let context = deluge.contexts.get(solution.assignment().id()).unwrap();
                assert!(
                    neighbour.value() <= 0.0
                        || solution.total_value() + neighbour.value() <= context.bound
                );
            }
        }
    }

    #[test]
    fn cool_rate_outside_the_unit_interval_is_rejected() {
        let properties = DataProperties::from_pairs([("GreatDeluge.CoolRate", "1.0")]);
        let err = GreatDeluge::<Val>::from_properties(&properties).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }
}
