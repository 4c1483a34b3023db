//! Neighbourhood selections.
//!
//! A neighbourhood selection proposes one pending move per solver iteration.
//! Selections handle their own acceptance internally; the solver loop applies
//! whatever they return. Returning `None` is a signal: plain neighbourhoods
//! use it for "no feasible move this time", the composite
//! [`SimpleSearch`] uses it to advance phases, and the solver idles one
//! iteration on it.

mod annealing;
mod deluge;
mod hill_climber;
mod moves;
mod simple_search;
mod standard;
mod step_counting;

pub use annealing::SimulatedAnnealing;
pub use deluge::GreatDeluge;
pub use hill_climber::HillClimber;
pub use moves::{GreedyMoveSelection, RandomMoveSelection, RandomSwapSelection};
pub use simple_search::SimpleSearch;
pub use standard::{
    MostConstrainedVariable, StandardNeighbourSelection, ValueSelection, VariableSelection,
    WeightedValueSelection,
};
pub use step_counting::StepCountingHillClimber;

use rand::rngs::StdRng;
use rand::SeedableRng;

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{Neighbour, Solution, SolverValue};

use crate::progress::ProgressHandle;

/// Proposes pending moves for the solver loop.
pub trait NeighbourSelection<V: SolverValue>: Send {
    /// Called once before the search starts.
    fn init(&mut self, _solution: &Solution<V>, _progress: ProgressHandle) {}

    /// Proposes the next move, or `None` if this selection has nothing to
    /// offer this iteration.
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>>;

    /// Tells the selection it is employed by a hill climber, so it may skip
    /// expensive worsening-move work.
    fn set_hc_mode(&mut self, _hc_mode: bool) {}

    /// Called once after the termination condition ends the search.
    fn finish(&mut self, _solution: &mut Solution<V>) {}
}

/// RNG seeded from `General.Seed` when present, from the OS otherwise.
///
/// Each component owns its generator; nothing is shared between workers.
pub(crate) fn rng_from_properties(properties: &DataProperties) -> Result<StdRng, ConfigError> {
    let seed = properties.get_int("General.Seed", -1)?;
    Ok(if seed >= 0 {
        StdRng::seed_from_u64(seed as u64)
    } else {
        StdRng::from_os_rng()
    })
}
