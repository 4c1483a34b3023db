//! Generic move neighbourhoods for the improvement heuristics.
//!
//! Each neighbourhood proposes one random local change per call, in the
//! pattern of the timetabling moves: pick a variable at random, walk its
//! domain from a random offset, return the first workable candidate. All of
//! them honor hill-climbing mode by skipping candidates that would evict
//! other assignments.

use rand::rngs::StdRng;
use rand::Rng;

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{Neighbour, Solution, SolverValue, VariableId};

use super::{rng_from_properties, NeighbourSelection};

/// Sum of the conflict values that are not the variable's own current value.
fn eviction_cost<V: SolverValue>(variable: VariableId, conflicts: &[V]) -> f64 {
    conflicts
        .iter()
        .filter(|c| c.variable() != variable)
        .map(SolverValue::to_double)
        .sum()
}

fn random_variable<V: SolverValue>(
    rng: &mut StdRng,
    solution: &Solution<V>,
) -> Option<VariableId> {
    let count = solution.model().variable_count();
    if count == 0 {
        return None;
    }
    let offset = rng.random_range(0..count);
    for i in 0..count {
        let id = VariableId(((offset + i) % count) as u32);
        let variable = solution.model().variable(id);
        if !variable.is_committed() && !variable.values().is_empty() {
            return Some(id);
        }
    }
    None
}

/// A new value for a randomly selected variable.
pub struct RandomMoveSelection {
    rng: StdRng,
    hc_mode: bool,
}

impl RandomMoveSelection {
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Ok(Self {
            rng: rng_from_properties(properties)?,
            hc_mode: false,
        })
    }
}

impl<V: SolverValue> NeighbourSelection<V> for RandomMoveSelection {
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        let variable = random_variable(&mut self.rng, solution)?;
        let model = solution.model();
        let assignment = solution.assignment();
        let domain = model.variable(variable).values();
        let current = assignment.value(variable);

        let offset = self.rng.random_range(0..domain.len());
        for i in 0..domain.len() {
            let candidate = &domain[(offset + i) % domain.len()];
            if current == Some(candidate) {
                continue;
            }
            let conflicts = model.conflict_values(assignment, candidate);
            if conflicts.contains(candidate) {
                continue;
            }
            let evicted = eviction_cost(variable, &conflicts);
            if self.hc_mode && evicted != 0.0 {
                // worsening-eviction work is skipped under a hill climber
                continue;
            }
            let delta = candidate.to_double()
                - current.map(SolverValue::to_double).unwrap_or(0.0)
                - evicted;
            return Some(Neighbour::simple(candidate.clone(), delta));
        }
        None
    }

    fn set_hc_mode(&mut self, hc_mode: bool) {
        self.hc_mode = hc_mode;
    }
}

/// Reassigns two randomly selected variables in one composite move.
///
/// Candidates are only proposed when neither evicts a third variable's
/// assignment; the two swapped variables may take over each other's slots.
pub struct RandomSwapSelection {
    rng: StdRng,
    hc_mode: bool,
}

impl RandomSwapSelection {
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Ok(Self {
            rng: rng_from_properties(properties)?,
            hc_mode: false,
        })
    }

    fn candidate<'a, V: SolverValue>(
        &mut self,
        solution: &'a Solution<V>,
        variable: VariableId,
        partner: VariableId,
    ) -> Option<(&'a V, f64)> {
        let model = solution.model();
        let assignment = solution.assignment();
        let domain = model.variable(variable).values();
        let current = assignment.value(variable);
        let offset = self.rng.random_range(0..domain.len());
        for i in 0..domain.len() {
            let candidate = &domain[(offset + i) % domain.len()];
            if current == Some(candidate) {
                continue;
            }
            let conflicts = model.conflict_values(assignment, candidate);
            if conflicts.contains(candidate) {
                continue;
            }
            // only the two swapped variables may lose their values
            if conflicts
                .iter()
                .any(|c| c.variable() != variable && c.variable() != partner)
            {
                continue;
            }
            let delta =
                candidate.to_double() - current.map(SolverValue::to_double).unwrap_or(0.0);
            return Some((candidate, delta));
        }
        None
    }
}

impl<V: SolverValue> NeighbourSelection<V> for RandomSwapSelection {
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        let first = random_variable(&mut self.rng, solution)?;
        let second = random_variable(&mut self.rng, solution)?;
        if first == second {
            return None;
        }
        let (value1, delta1) = self.candidate(solution, first, second)?;
        let (value2, delta2) = self.candidate(solution, second, first)?;
        let delta = delta1 + delta2;
        if self.hc_mode && delta > 0.0 {
            return None;
        }
        Some(Neighbour::composite(
            vec![
                (first, Some(value1.clone())),
                (second, Some(value2.clone())),
            ],
            delta,
        ))
    }

    fn set_hc_mode(&mut self, hc_mode: bool) {
        self.hc_mode = hc_mode;
    }
}

/// Assigns a randomly selected variable its best-scoring value, where the
/// score is the value's objective contribution plus the cost of what it
/// would evict.
pub struct GreedyMoveSelection {
    rng: StdRng,
    hc_mode: bool,
}

impl GreedyMoveSelection {
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Ok(Self {
            rng: rng_from_properties(properties)?,
            hc_mode: false,
        })
    }
}

impl<V: SolverValue> NeighbourSelection<V> for GreedyMoveSelection {
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        let variable = random_variable(&mut self.rng, solution)?;
        let model = solution.model();
        let assignment = solution.assignment();
        let current = assignment.value(variable);

        let mut best: Option<(&V, f64)> = None;
        for candidate in model.variable(variable).values() {
            if current == Some(candidate) {
                continue;
            }
            let conflicts = model.conflict_values(assignment, candidate);
            if conflicts.contains(candidate) {
                continue;
            }
            let evicted = eviction_cost(variable, &conflicts);
            if self.hc_mode && evicted != 0.0 {
                continue;
            }
            let delta = candidate.to_double()
                - current.map(SolverValue::to_double).unwrap_or(0.0)
                - evicted;
            if best.as_ref().is_none_or(|(_, d)| delta < *d) {
                best = Some((candidate, delta));
            }
        }
        best.map(|(value, delta)| Neighbour::simple(value.clone(), delta))
    }

    fn set_hc_mode(&mut self, hc_mode: bool) {
        self.hc_mode = hc_mode;
    }
}

/// The default improvement pool: random move, random swap, greedy move.
pub(crate) fn default_pool<V: SolverValue>(
    properties: &DataProperties,
) -> Result<Vec<Box<dyn NeighbourSelection<V>>>, ConfigError> {
    Ok(vec![
        Box::new(RandomMoveSelection::from_properties(properties)?),
        Box::new(RandomSwapSelection::from_properties(properties)?),
        Box::new(GreedyMoveSelection::from_properties(properties)?),
    ])
}
