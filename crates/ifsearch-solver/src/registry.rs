//! Named selection registry.
//!
//! Configuration refers to construction heuristics and ordering strategies
//! by name (`Construction.Class`). Instead of loading classes at runtime,
//! names map to constructor closures registered at program start.

use std::collections::HashMap;

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::SolverValue;

use crate::heuristics::NeighbourSelection;

/// Constructor closure for a named neighbourhood selection.
pub type SelectionFactory<V> =
    Box<dyn Fn(&DataProperties) -> Result<Box<dyn NeighbourSelection<V>>, ConfigError> + Send + Sync>;

/// Registry mapping selection names to constructor closures.
///
/// # Example
///
/// ```
/// use ifsearch_config::DataProperties;
/// use ifsearch_core::{SolverValue, VariableId};
/// use ifsearch_solver::{RandomMoveSelection, SelectionRegistry};
///
/// # #[derive(Clone, PartialEq, Debug)]
/// # struct Val(VariableId);
/// # impl SolverValue for Val {
/// #     fn variable(&self) -> VariableId { self.0 }
/// #     fn to_double(&self) -> f64 { 0.0 }
/// # }
/// let mut registry: SelectionRegistry<Val> = SelectionRegistry::new();
/// registry.register("random", |properties| {
///     Ok(Box::new(RandomMoveSelection::from_properties(properties)?))
/// });
///
/// let selection = registry
///     .create("random", &DataProperties::new())
///     .unwrap();
/// assert!(selection.is_ok());
/// ```
pub struct SelectionRegistry<V: SolverValue> {
    factories: HashMap<String, SelectionFactory<V>>,
}

impl<V: SolverValue> Default for SelectionRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: SolverValue> SelectionRegistry<V> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory under a name, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&DataProperties) -> Result<Box<dyn NeighbourSelection<V>>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Instantiates a named selection, or `None` for an unknown name.
    pub fn create(
        &self,
        name: &str,
        properties: &DataProperties,
    ) -> Option<Result<Box<dyn NeighbourSelection<V>>, ConfigError>> {
        self.factories.get(name).map(|f| f(properties))
    }

    /// True if a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}
