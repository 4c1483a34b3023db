//! Standard iterative forward search selection.

use rand::rngs::StdRng;
use rand::Rng;

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{Neighbour, Solution, SolverValue, VariableId};

use super::{rng_from_properties, NeighbourSelection};

/// Picks the next variable to assign.
pub trait VariableSelection<V: SolverValue>: Send {
    /// The next unassigned variable to work on, or `None` when every
    /// non-committed variable is assigned.
    fn select_variable(&mut self, solution: &Solution<V>) -> Option<VariableId>;
}

/// Picks a candidate value for a variable.
pub trait ValueSelection<V: SolverValue>: Send {
    /// A candidate from the variable's domain, or `None` if nothing is
    /// worth proposing.
    fn select_value(&mut self, solution: &Solution<V>, variable: VariableId) -> Option<V>;
}

/// Default variable selection: a random choice among the unassigned
/// variables of maximum hardness, where hardness is the number of hard
/// constraints the variable participates in. Committed variables are never
/// selected.
pub struct MostConstrainedVariable {
    rng: StdRng,
}

impl MostConstrainedVariable {
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Ok(Self {
            rng: rng_from_properties(properties)?,
        })
    }
}

impl<V: SolverValue> VariableSelection<V> for MostConstrainedVariable {
    fn select_variable(&mut self, solution: &Solution<V>) -> Option<VariableId> {
        let model = solution.model();
        let mut best_hardness = 0usize;
        let mut ties = 0usize;
        let mut picked = None;
        for variable in solution.assignment().unassigned_variables() {
            if model.variable(variable).is_committed() {
                continue;
            }
            let hardness = model
                .constraints_of(variable)
                .filter(|c| c.is_hard())
                .count();
            if picked.is_none() || hardness > best_hardness {
                best_hardness = hardness;
                ties = 1;
                picked = Some(variable);
            } else if hardness == best_hardness {
                // reservoir sample to break ties uniformly
                ties += 1;
                if self.rng.random_range(0..ties) == 0 {
                    picked = Some(variable);
                }
            }
        }
        picked
    }
}

/// Default value selection: the lowest weighted score over the domain (or
/// a bounded random sample of it), where the score of a candidate is its
/// objective contribution plus `Value.ConflictWeight` per conflict it would
/// cause. Ties break randomly; unassignable candidates are skipped.
pub struct WeightedValueSelection {
    rng: StdRng,
    conflict_weight: f64,
    sample_size: usize,
}

impl WeightedValueSelection {
    /// Reads `Value.ConflictWeight` (default 1.0) and `Value.SampleSize`
    /// (default 0 = the whole domain).
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Ok(Self {
            rng: rng_from_properties(properties)?,
            conflict_weight: properties.get_double("Value.ConflictWeight", 1.0)?,
            sample_size: properties.get_int("Value.SampleSize", 0)?.max(0) as usize,
        })
    }
}

impl<V: SolverValue> ValueSelection<V> for WeightedValueSelection {
    fn select_value(&mut self, solution: &Solution<V>, variable: VariableId) -> Option<V> {
        let model = solution.model();
        let assignment = solution.assignment();
        let domain = model.variable(variable).values();
        if domain.is_empty() {
            return None;
        }

        let sampled: Vec<&V> = if self.sample_size > 0 && domain.len() > self.sample_size {
            (0..self.sample_size)
                .map(|_| &domain[self.rng.random_range(0..domain.len())])
                .collect()
        } else {
            domain.iter().collect()
        };

        let mut best_score = f64::INFINITY;
        let mut ties = 0usize;
        let mut picked: Option<&V> = None;
        for candidate in sampled {
            let conflicts = model.conflict_values(assignment, candidate);
            if conflicts.contains(candidate) {
                continue;
            }
            let score = candidate.to_double() + self.conflict_weight * conflicts.len() as f64;
            if picked.is_none() || score < best_score {
                best_score = score;
                ties = 1;
                picked = Some(candidate);
            } else if score == best_score {
                ties += 1;
                if self.rng.random_range(0..ties) == 0 {
                    picked = Some(candidate);
                }
            }
        }
        picked.cloned()
    }
}

/// Classical iterative forward search: pick an unassigned variable, pick a
/// candidate value, and propose assigning it after unassigning whatever
/// conflicts with it.
///
/// Returns `None` once every variable is assigned (the composite controller
/// advances phase on that), or after `Variable.RandomAttempts` fruitless
/// tries in one call.
pub struct StandardNeighbourSelection<V: SolverValue> {
    variable_selection: Box<dyn VariableSelection<V>>,
    value_selection: Box<dyn ValueSelection<V>>,
    attempts: usize,
}

impl<V: SolverValue> StandardNeighbourSelection<V> {
    /// Builds the default policies from configuration.
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        Ok(Self {
            variable_selection: Box::new(MostConstrainedVariable::from_properties(properties)?),
            value_selection: Box::new(WeightedValueSelection::from_properties(properties)?),
            attempts: properties.get_int("Variable.RandomAttempts", 3)?.max(1) as usize,
        })
    }

    /// Uses custom selection policies.
    pub fn with_selections(
        variable_selection: Box<dyn VariableSelection<V>>,
        value_selection: Box<dyn ValueSelection<V>>,
    ) -> Self {
        Self {
            variable_selection,
            value_selection,
            attempts: 3,
        }
    }
}

impl<V: SolverValue> NeighbourSelection<V> for StandardNeighbourSelection<V> {
    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        for _ in 0..self.attempts {
            let variable = self.variable_selection.select_variable(solution)?;
            let Some(value) = self.value_selection.select_value(solution, variable) else {
                continue;
            };
            let conflicts = solution
                .model()
                .conflict_values(solution.assignment(), &value);
            if conflicts.contains(&value) {
                continue;
            }
            let delta =
                value.to_double() - conflicts.iter().map(SolverValue::to_double).sum::<f64>();
            return Some(Neighbour::simple(value, delta));
        }
        None
    }
}
