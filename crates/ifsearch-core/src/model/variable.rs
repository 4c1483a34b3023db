//! Variables and their arena ids.

use std::fmt;

use super::SolverValue;

/// Arena index of a variable within its [`Model`](super::Model).
///
/// Variables, values and constraints form a cyclic object graph; all
/// cross-references go through these stable ids instead of owning pointers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

impl VariableId {
    /// Returns the arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A variable with an ordered domain of candidate values.
///
/// A variable may be committed (fixed to one value and excluded from search)
/// and may carry an initial assignment used by deep-search value ordering.
/// An empty domain is legal; such a variable simply stays unassigned.
pub struct Variable<V: SolverValue> {
    id: VariableId,
    name: String,
    domain: Vec<V>,
    committed: Option<V>,
    initial: Option<V>,
}

impl<V: SolverValue> Variable<V> {
    pub(crate) fn new(id: VariableId, name: String, domain: Vec<V>) -> Self {
        Self {
            id,
            name,
            domain,
            committed: None,
            initial: None,
        }
    }

    /// Returns the variable's id.
    pub fn id(&self) -> VariableId {
        self.id
    }

    /// Returns the variable's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered sequence of candidate values.
    pub fn values(&self) -> &[V] {
        &self.domain
    }

    /// True if the variable is fixed and excluded from search.
    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// The committed value, if any.
    pub fn committed_value(&self) -> Option<&V> {
        self.committed.as_ref()
    }

    /// The initial assignment, if any.
    pub fn initial(&self) -> Option<&V> {
        self.initial.as_ref()
    }

    pub(crate) fn set_committed(&mut self, value: V) {
        self.committed = Some(value);
    }

    pub(crate) fn set_initial(&mut self, value: V) {
        self.initial = Some(value);
    }
}

impl<V: SolverValue> fmt::Debug for Variable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("domain", &self.domain.len())
            .field("committed", &self.is_committed())
            .finish()
    }
}
