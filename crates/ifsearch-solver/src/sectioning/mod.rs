//! Per-entity sectioning: entities owning bundles of jointly scheduled
//! requests, and the branch-and-bound selection that reschedules one entity
//! at a time.
//!
//! The motivating instance is student sectioning: a student (entity) holds
//! an ordered list of course and free-time requests (variables), each with
//! enumerable enrollments (values). The traits here are the narrow surface
//! the deep search needs; the concrete problem model implements them.

mod bnb;

pub use bnb::{BnbStats, BranchBoundSelection, EntityResult, EntitySelection};

use std::fmt;

use rand::seq::SliceRandom;

use ifsearch_core::{Assignment, SolverValue, VariableId};

/// Index of an entity within its [`EntityModel`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl EntityId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// What a request stands for; course requests weigh ten times a free-time
/// request in assigned-count objectives, and waitlisted course requests
/// count as non-alternative when alternative slots are tallied.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RequestKind {
    Course { waitlisted: bool },
    FreeTime,
}

impl RequestKind {
    /// Weight of this request in assigned-count comparisons.
    pub fn assigned_weight(self) -> u32 {
        match self {
            RequestKind::Course { .. } => 10,
            RequestKind::FreeTime => 1,
        }
    }

    pub fn is_course(self) -> bool {
        matches!(self, RequestKind::Course { .. })
    }

    pub fn is_waitlisted(self) -> bool {
        matches!(self, RequestKind::Course { waitlisted: true })
    }
}

/// The entity/request structure of a problem model.
///
/// Requests are variables of the core model; their order within an entity
/// is its priority order (earlier requests have higher priority).
pub trait EntityModel<V: SolverValue>: Send + Sync {
    /// Number of entities.
    fn entity_count(&self) -> usize;

    /// The entity's requests, in priority order.
    fn requests(&self, entity: EntityId) -> &[VariableId];

    /// What kind of request a variable is.
    fn kind(&self, request: VariableId) -> RequestKind;

    /// Alternatives only count against the assigned total when promoted
    /// from the alternate pool.
    fn is_alternative(&self, request: VariableId) -> bool {
        false
    }

    /// Multiplier on the request's weighted value.
    fn request_weight(&self, request: VariableId) -> f64 {
        1.0
    }

    /// Optimistic lower bound on the weighted value of any of the request's
    /// candidates; used for pruning.
    fn bound(&self, request: VariableId) -> f64 {
        0.0
    }

    /// Lowest penalty of any of the request's candidates.
    fn min_penalty(&self, request: VariableId) -> f64 {
        0.0
    }

    /// User-preferred candidates, tried before the full enumeration.
    fn selected(&self, _assignment: &Assignment<V>, _request: VariableId) -> Vec<V> {
        Vec::new()
    }

    /// Full enumeration of the request's currently available candidates.
    fn values(&self, assignment: &Assignment<V>, request: VariableId) -> Vec<V>;

    /// Penalty of one candidate.
    fn penalty(&self, _value: &V) -> f64 {
        0.0
    }

    /// True if the two candidates cannot be held at the same time.
    fn overlaps(&self, _a: &V, _b: &V) -> bool {
        false
    }

    /// True if choosing `candidate` at position `idx` violates a linked
    /// sections constraint against the rest of the entity's tentative stack.
    fn linked_conflict(
        &self,
        _entity: EntityId,
        _stack: &[Option<V>],
        _idx: usize,
        _candidate: &V,
    ) -> bool {
        false
    }

    /// True if the request may stay unassigned; alternatives always may.
    fn can_leave_unassigned(&self, _request: VariableId) -> bool {
        true
    }
}

/// Weighted valuation of a candidate for one entity; higher is better.
pub trait EntityWeights<V: SolverValue>: Send + Sync {
    /// Base goodness of assigning `value`.
    fn weight(&self, assignment: &Assignment<V>, value: &V) -> f64;

    /// Cost charged for a distance conflict between two held candidates.
    fn distance_conflict_weight(&self, assignment: &Assignment<V>, a: &V, b: &V) -> f64;

    /// Cost charged for a time overlap between `value` and `other`.
    fn time_overlap_conflict_weight(&self, assignment: &Assignment<V>, value: &V, other: &V)
        -> f64;
}

/// Detects distance conflicts; conflicts are pairs of held candidates.
pub trait DistanceConflicts<V: SolverValue>: Send + Sync {
    /// Conflicts within a single candidate (e.g. between its own sections).
    fn conflicts(&self, value: &V) -> Vec<(V, V)>;

    /// Conflicts between two held candidates.
    fn conflicts_between(&self, a: &V, b: &V) -> Vec<(V, V)>;
}

/// Counts time overlaps between held candidates.
pub trait TimeOverlaps<V: SolverValue>: Send + Sync {
    /// Overlap pairs between two held candidates.
    fn conflicts_between(&self, a: &V, b: &V) -> Vec<(V, V)>;
}

/// Strategy ordering entities into the branch-and-bound queue.
pub trait EntityOrder: Send {
    fn order(&mut self, entities: Vec<EntityId>) -> Vec<EntityId>;
}

/// Keeps entities in model order.
#[derive(Debug, Default)]
pub struct ModelOrder;

impl EntityOrder for ModelOrder {
    fn order(&mut self, entities: Vec<EntityId>) -> Vec<EntityId> {
        entities
    }
}

/// Shuffles entities uniformly.
pub struct ShuffleOrder {
    rng: rand::rngs::StdRng,
}

impl ShuffleOrder {
    pub fn new(rng: rand::rngs::StdRng) -> Self {
        Self { rng }
    }
}

impl EntityOrder for ShuffleOrder {
    fn order(&mut self, mut entities: Vec<EntityId>) -> Vec<EntityId> {
        entities.shuffle(&mut self.rng);
        entities
    }
}
