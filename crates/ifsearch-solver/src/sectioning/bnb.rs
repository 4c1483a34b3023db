//! Branch-and-bound rescheduling of one entity at a time.

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{
    Assignment, AssignmentId, ContextStore, Model, Neighbour, Solution, SolverValue, VariableId,
};

use crate::heuristics::{rng_from_properties, NeighbourSelection};
use crate::progress::ProgressHandle;

use super::{
    DistanceConflicts, EntityId, EntityModel, EntityOrder, EntityWeights, ModelOrder,
    ShuffleOrder, TimeOverlaps,
};

/// Per-assignment accounting of the branch-and-bound queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct BnbStats {
    /// Entities taken off the queue.
    pub processed: u64,
    /// Per-entity searches that hit their time budget.
    pub timeouts: u64,
}

/// Outcome of one per-entity search.
pub struct EntityResult<V: SolverValue> {
    /// Reassigns the whole request bundle to the best combination found.
    pub neighbour: Option<Neighbour<V>>,
    /// The search was cut short by its time budget; the neighbour is the
    /// best found so far.
    pub timeout_reached: bool,
    /// Objective of the best combination (penalty in minimize-penalty mode).
    pub best_value: f64,
}

/// Reschedules entities one at a time with a depth-first branch-and-bound
/// over each entity's request list, without disturbing other entities.
///
/// Entities wait in a queue (ordered by `Neighbour.BranchAndBoundOrder`);
/// each `select_neighbour` call takes the next one and searches its best
/// schedule on top of everything else currently assigned. The search honors
/// a wall-clock budget (`Neighbour.BranchAndBoundTimeout`, milliseconds)
/// and returns its best-so-far on timeout.
///
/// With `Neighbour.BranchAndBoundMinimizePenalty` the objective turns
/// lexicographic: first maximize the weighted number of assigned requests
/// (course requests count 10, free times 1), then minimize accumulated
/// penalty.
pub struct BranchBoundSelection<V, M, W>
where
    V: SolverValue,
    M: EntityModel<V>,
    W: EntityWeights<V>,
{
    entity_model: Arc<M>,
    weights: Arc<W>,
    distance: Option<Arc<dyn DistanceConflicts<V>>>,
    overlaps: Option<Arc<dyn TimeOverlaps<V>>>,
    timeout: Duration,
    minimize_penalty: bool,
    prune: bool,
    distance_conflict_weight: f64,
    leave_unassigned: bool,
    order: Box<dyn EntityOrder>,
    queue: Mutex<VecDeque<EntityId>>,
    stats: ContextStore<BnbStats>,
    stop: Option<Arc<AtomicBool>>,
    progress: ProgressHandle,
    _marker: PhantomData<fn() -> V>,
}

impl<V, M, W> BranchBoundSelection<V, M, W>
where
    V: SolverValue,
    M: EntityModel<V>,
    W: EntityWeights<V>,
{
    /// Builds the selection from configuration.
    pub fn from_properties(
        properties: &DataProperties,
        entity_model: Arc<M>,
        weights: Arc<W>,
    ) -> Result<Self, ConfigError> {
        let timeout_ms = properties.get_int("Neighbour.BranchAndBoundTimeout", 10_000)?;
        let order: Box<dyn EntityOrder> =
            match properties.get_string("Neighbour.BranchAndBoundOrder", "default").as_str() {
                "default" => Box::new(ModelOrder),
                "shuffle" => Box::new(ShuffleOrder::new(rng_from_properties(properties)?)),
                unknown => {
                    error!(order = unknown, "unknown entity order, using model order");
                    Box::new(ModelOrder)
                }
            };
        Ok(Self {
            entity_model,
            weights,
            distance: None,
            overlaps: None,
            timeout: if timeout_ms > 0 {
                Duration::from_millis(timeout_ms as u64)
            } else {
                Duration::ZERO
            },
            minimize_penalty: properties
                .get_bool("Neighbour.BranchAndBoundMinimizePenalty", false)?,
            prune: true,
            distance_conflict_weight: properties.get_double("DistanceConflict.Weight", 1.0)?,
            leave_unassigned: properties
                .get_bool("Neighbour.BranchAndBoundLeaveUnassigned", true)?,
            order,
            queue: Mutex::new(VecDeque::new()),
            stats: ContextStore::new(),
            stop: None,
            progress: ProgressHandle::null(),
            _marker: PhantomData,
        })
    }

    /// Attaches a distance-conflict detector.
    pub fn with_distance_conflicts(mut self, detector: Arc<dyn DistanceConflicts<V>>) -> Self {
        self.distance = Some(detector);
        self
    }

    /// Attaches a time-overlap counter.
    pub fn with_time_overlaps(mut self, counter: Arc<dyn TimeOverlaps<V>>) -> Self {
        self.overlaps = Some(counter);
        self
    }

    /// Shares a cancellation flag that is polled in the deepest search loop.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Enables or disables bound pruning. Pruning never changes the result,
    /// only the amount of work.
    pub fn set_pruning(&mut self, prune: bool) {
        self.prune = prune;
    }

    /// Takes the next entity off the queue.
    fn next_entity(&self) -> Option<EntityId> {
        self.queue.lock().ok()?.pop_front()
    }

    /// Puts an entity (back) on the queue, e.g. after its schedule was
    /// disturbed elsewhere.
    pub fn add_entity(&self, entity: EntityId) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(entity);
        }
    }

    /// Queue accounting for an assignment.
    pub fn stats(&self, id: AssignmentId) -> Option<BnbStats> {
        self.stats.get(id).copied()
    }

    /// The per-entity search, usable directly for one entity.
    pub fn selection<'a>(
        &'a self,
        model: &'a Model<V>,
        assignment: &'a Assignment<V>,
        entity: EntityId,
    ) -> EntitySelection<'a, V, M, W> {
        let requests = self.entity_model.requests(entity);
        EntitySelection {
            entity,
            requests,
            entity_model: &self.entity_model,
            weights: &self.weights,
            distance: self.distance.as_deref(),
            overlaps: self.overlaps.as_deref(),
            core_model: model,
            assignment,
            timeout: self.timeout,
            minimize_penalty: self.minimize_penalty,
            prune: self.prune,
            distance_conflict_weight: self.distance_conflict_weight,
            leave_unassigned: self.leave_unassigned,
            stop: self.stop.as_deref(),
            t0: Instant::now(),
            timeout_reached: false,
            current: vec![None; requests.len()],
            best: None,
            best_value: 0.0,
            best_assigned: 0,
            values_cache: HashMap::new(),
        }
    }
}

impl<V, M, W> NeighbourSelection<V> for BranchBoundSelection<V, M, W>
where
    V: SolverValue,
    M: EntityModel<V>,
    W: EntityWeights<V>,
{
    fn init(&mut self, _solution: &Solution<V>, progress: ProgressHandle) {
        let entities = (0..self.entity_model.entity_count() as u32)
            .map(EntityId)
            .collect();
        let ordered = self.order.order(entities);
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
            queue.extend(ordered);
        }
        progress.set_phase("Branch&bound...", self.entity_model.entity_count());
        self.progress = progress;
    }

    fn select_neighbour(&mut self, solution: &mut Solution<V>) -> Option<Neighbour<V>> {
        loop {
            let entity = self.next_entity()?;
            self.progress.inc_progress();
            let result = self
                .selection(solution.model(), solution.assignment(), entity)
                .select();
            let stats = self
                .stats
                .get_or_create(solution.assignment().id(), BnbStats::default);
            stats.processed += 1;
            if result.timeout_reached {
                stats.timeouts += 1;
                debug!(?entity, "branch and bound timeout reached");
            }
            if result.neighbour.is_some() {
                return result.neighbour;
            }
        }
    }
}

/// One visited position of the alternative-slot walk.
enum SlotVisit {
    /// A position under the branch point; its tentative candidate counts
    /// exactly.
    Held(usize, VariableId),
    /// A later position that contributes its optimistic bound.
    Counted(VariableId),
}

/// Depth-first search over one entity's requests.
///
/// The search stack holds one tentative candidate per request. Feasibility
/// at each node checks the global constraints of the core model, the
/// entity's linked-sections constraint, and time overlaps against earlier
/// stack entries; other entities' assignments are only seen through the
/// global constraints.
pub struct EntitySelection<'a, V, M, W>
where
    V: SolverValue,
    M: EntityModel<V>,
    W: EntityWeights<V>,
{
    entity: EntityId,
    requests: &'a [VariableId],
    entity_model: &'a M,
    weights: &'a W,
    distance: Option<&'a dyn DistanceConflicts<V>>,
    overlaps: Option<&'a dyn TimeOverlaps<V>>,
    core_model: &'a Model<V>,
    assignment: &'a Assignment<V>,
    timeout: Duration,
    minimize_penalty: bool,
    prune: bool,
    distance_conflict_weight: f64,
    leave_unassigned: bool,
    stop: Option<&'a AtomicBool>,
    t0: Instant,
    timeout_reached: bool,
    current: Vec<Option<V>>,
    best: Option<Vec<Option<V>>>,
    best_value: f64,
    best_assigned: u32,
    values_cache: HashMap<VariableId, Arc<Vec<V>>>,
}

impl<'a, V, M, W> EntitySelection<'a, V, M, W>
where
    V: SolverValue,
    M: EntityModel<V>,
    W: EntityWeights<V>,
{
    /// Runs the search and returns the best combination found, as a
    /// composite neighbour relative to the pre-call assignment.
    pub fn select(mut self) -> EntityResult<V> {
        self.t0 = Instant::now();
        for (i, &request) in self.requests.iter().enumerate() {
            self.current[i] = self.assignment.value(request).cloned();
        }
        self.save_best();
        let baseline = self.best_value;
        for slot in &mut self.current {
            *slot = None;
        }
        self.backtrack(0);

        let neighbour = self.best.as_ref().map(|best| {
            let changes = self
                .requests
                .iter()
                .zip(best.iter())
                .map(|(&request, value)| (request, value.clone()))
                .collect();
            Neighbour::composite(changes, self.best_value - baseline)
        });
        EntityResult {
            neighbour,
            timeout_reached: self.timeout_reached,
            best_value: self.best_value,
        }
    }

    fn position_of(&self, value: &V) -> Option<usize> {
        self.requests.iter().position(|&r| r == value.variable())
    }

    /// Weight of holding `value` at stack position `idx`; only this side of
    /// distance conflicts and time overlaps against earlier entries counts.
    fn weight_of(&self, idx: usize, value: &V) -> f64 {
        let mut weight = -self.weights.weight(self.assignment, value);
        if let Some(detector) = self.distance {
            let mut pairs = detector.conflicts(value);
            for x in 0..idx {
                if let Some(other) = &self.current[x] {
                    pairs.extend(detector.conflicts_between(other, value));
                }
            }
            for (a, b) in &pairs {
                let other = if a == value { b } else { a };
                if self.position_of(other).unwrap_or(usize::MAX) <= idx {
                    weight += self
                        .weights
                        .distance_conflict_weight(self.assignment, a, b);
                }
            }
        }
        if let Some(counter) = self.overlaps {
            for x in 0..idx {
                if let Some(other) = &self.current[x] {
                    for (a, b) in counter.conflicts_between(other, value) {
                        let opposite = if a == *value { &b } else { &a };
                        weight += self.weights.time_overlap_conflict_weight(
                            self.assignment,
                            value,
                            opposite,
                        );
                    }
                }
            }
        }
        self.entity_model.request_weight(value.variable()) * weight
    }

    /// Objective of the current stack.
    fn value_total(&self) -> f64 {
        self.current
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| self.weight_of(i, v)))
            .sum()
    }

    /// Weighted assigned count of the current stack.
    fn assigned_weighted(&self) -> u32 {
        self.requests
            .iter()
            .zip(&self.current)
            .filter(|(_, slot)| slot.is_some())
            .map(|(&request, _)| self.entity_model.kind(request).assigned_weight())
            .sum()
    }

    /// Walks the request list once with the shared alternative-slot
    /// accounting, visiting every position that contributes to a bound:
    /// positions under `idx` as [`SlotVisit::Held`], later positions as
    /// [`SlotVisit::Counted`] when they are non-alternative or an
    /// alternative slot is free for them.
    fn walk_alt_slots(&self, idx: usize, mut visit: impl FnMut(SlotVisit)) {
        let mut alt = 0i32;
        for (i, &request) in self.requests.iter().enumerate() {
            let kind = self.entity_model.kind(request);
            if i < idx {
                visit(SlotVisit::Held(i, request));
                if self.entity_model.is_alternative(request) {
                    if self.current[i].is_some() || kind.is_waitlisted() {
                        alt -= 1;
                    }
                } else if kind.is_course()
                    && !kind.is_waitlisted()
                    && self.current[i].is_none()
                {
                    alt += 1;
                }
            } else if !self.entity_model.is_alternative(request) {
                visit(SlotVisit::Counted(request));
            } else if alt > 0 {
                visit(SlotVisit::Counted(request));
                alt -= 1;
            }
        }
    }

    /// Upper bound on the weighted assigned count from position `idx` on.
    fn assigned_bound(&self, idx: usize) -> u32 {
        let mut bound = 0u32;
        self.walk_alt_slots(idx, |visit| match visit {
            SlotVisit::Held(i, request) => {
                if self.current[i].is_some() {
                    bound += self.entity_model.kind(request).assigned_weight();
                }
            }
            SlotVisit::Counted(request) => {
                bound += self.entity_model.kind(request).assigned_weight();
            }
        });
        bound
    }

    /// Lower bound on the objective from position `idx` on.
    fn bound_value(&self, idx: usize) -> f64 {
        let mut bound = 0.0;
        self.walk_alt_slots(idx, |visit| match visit {
            SlotVisit::Held(i, _) => {
                if let Some(value) = &self.current[i] {
                    bound += self.weight_of(i, value);
                }
            }
            SlotVisit::Counted(request) => {
                bound += self.entity_model.bound(request);
            }
        });
        bound
    }

    /// Penalty of the stack entry at `idx`, including its share of distance
    /// conflicts.
    fn penalty_of(&self, idx: usize) -> f64 {
        let Some(value) = &self.current[idx] else {
            return 0.0;
        };
        let mut conflicts = 0usize;
        if let Some(detector) = self.distance {
            conflicts += detector.conflicts(value).len();
            for x in 0..idx {
                if let Some(other) = &self.current[x] {
                    conflicts += detector.conflicts_between(other, value).len();
                }
            }
        }
        self.entity_model.penalty(value) + self.distance_conflict_weight * conflicts as f64
    }

    /// Penalty of the current stack.
    fn penalty_total(&self) -> f64 {
        (0..self.current.len()).map(|i| self.penalty_of(i)).sum()
    }

    /// Lower bound on the penalty from position `idx` on.
    fn penalty_bound(&self, idx: usize) -> f64 {
        let mut bound = 0.0;
        self.walk_alt_slots(idx, |visit| match visit {
            SlotVisit::Held(i, _) => {
                bound += self.penalty_of(i);
            }
            SlotVisit::Counted(request) => {
                if self.entity_model.kind(request).is_course() {
                    bound += self.entity_model.min_penalty(request);
                }
            }
        });
        bound
    }

    /// An alternative may only enter when an earlier non-alternative course
    /// request remained open to free a slot for it.
    fn can_assign(&self, request: VariableId, idx: usize) -> bool {
        if !self.entity_model.is_alternative(request) || self.current[idx].is_some() {
            return true;
        }
        let mut alt = 0i32;
        for (i, &other) in self.requests.iter().enumerate() {
            if other == request {
                continue;
            }
            let kind = self.entity_model.kind(other);
            if self.entity_model.is_alternative(other) {
                if self.current[i].is_some() || kind.is_waitlisted() {
                    alt -= 1;
                }
            } else if kind.is_course() && !kind.is_waitlisted() && self.current[i].is_none() {
                alt += 1;
            }
        }
        alt > 0
    }

    /// Feasibility of `candidate` at stack position `idx`.
    fn in_conflict(&self, idx: usize, candidate: &V) -> bool {
        if self
            .core_model
            .global_constraints()
            .any(|c| c.is_hard() && c.in_conflict(self.assignment, candidate))
        {
            return true;
        }
        if self
            .entity_model
            .linked_conflict(self.entity, &self.current, idx, candidate)
        {
            return true;
        }
        self.current.iter().enumerate().any(|(i, slot)| {
            i != idx
                && slot
                    .as_ref()
                    .is_some_and(|held| self.entity_model.overlaps(held, candidate))
        })
    }

    fn can_leave(&self, request: VariableId) -> bool {
        self.entity_model.is_alternative(request)
            || (self.leave_unassigned && self.entity_model.can_leave_unassigned(request))
    }

    /// Candidates of a course request, current assignment first, then by
    /// descending entity weight.
    fn sorted_values(&self, request: VariableId) -> Vec<V> {
        let current = self.assignment.value(request);
        let mut weighted: Vec<(V, f64)> = self
            .entity_model
            .values(self.assignment, request)
            .into_iter()
            .map(|v| {
                let w = self.weights.weight(self.assignment, &v);
                (v, w)
            })
            .collect();
        weighted.sort_by(|(a, wa), (b, wb)| {
            let a_current = current == Some(a);
            let b_current = current == Some(b);
            b_current
                .cmp(&a_current)
                .then(wb.partial_cmp(wa).unwrap_or(std::cmp::Ordering::Equal))
        });
        weighted.into_iter().map(|(v, _)| v).collect()
    }

    fn save_best(&mut self) {
        self.best = Some(self.current.clone());
        self.best_assigned = self.assigned_weighted();
        self.best_value = if self.minimize_penalty {
            self.penalty_total()
        } else {
            self.value_total()
        };
    }

    fn backtrack(&mut self, idx: usize) {
        if self.timeout_reached {
            return;
        }
        if self.stop.is_some_and(|stop| stop.load(Ordering::Relaxed)) {
            self.timeout_reached = true;
            return;
        }
        if !self.timeout.is_zero() && self.t0.elapsed() > self.timeout {
            self.timeout_reached = true;
            return;
        }

        if self.minimize_penalty {
            if self.prune && self.best.is_some() {
                let assigned_bound = self.assigned_bound(idx);
                if assigned_bound < self.best_assigned
                    || (assigned_bound == self.best_assigned
                        && self.penalty_bound(idx) >= self.best_value)
                {
                    return;
                }
            }
            if idx == self.current.len() {
                let assigned = self.assigned_weighted();
                if self.best.is_none()
                    || assigned > self.best_assigned
                    || (assigned == self.best_assigned && self.penalty_total() < self.best_value)
                {
                    self.save_best();
                }
                return;
            }
        } else {
            if self.prune && self.best.is_some() && self.bound_value(idx) >= self.best_value {
                return;
            }
            if idx == self.current.len() {
                if self.best.is_none() || self.value_total() < self.best_value {
                    self.save_best();
                }
                return;
            }
        }

        let request = self.requests[idx];
        if !self.can_assign(request, idx) {
            self.backtrack(idx + 1);
            return;
        }

        // the initial assignment short-circuits the whole enumeration
        if let Some(initial) = self.core_model.variable(request).initial() {
            if !self.in_conflict(idx, initial) {
                self.current[idx] = Some(initial.clone());
                self.backtrack(idx + 1);
                self.current[idx] = None;
                return;
            }
        }

        // user-selected candidates next
        let selected = self.entity_model.selected(self.assignment, request);
        if !selected.is_empty() {
            let mut has_no_conflict_value = false;
            for candidate in &selected {
                if self.in_conflict(idx, candidate) {
                    continue;
                }
                has_no_conflict_value = true;
                self.current[idx] = Some(candidate.clone());
                self.backtrack(idx + 1);
                self.current[idx] = None;
            }
            if has_no_conflict_value {
                return;
            }
        }

        let kind = self.entity_model.kind(request);
        let values: Arc<Vec<V>> = if kind.is_course() {
            if let Some(cached) = self.values_cache.get(&request) {
                Arc::clone(cached)
            } else {
                let sorted = Arc::new(self.sorted_values(request));
                self.values_cache.insert(request, Arc::clone(&sorted));
                sorted
            }
        } else {
            Arc::new(self.entity_model.values(self.assignment, request))
        };

        let mut has_no_conflict_value = false;
        for candidate in values.iter() {
            if self.in_conflict(idx, candidate) {
                continue;
            }
            has_no_conflict_value = true;
            self.current[idx] = Some(candidate.clone());
            self.backtrack(idx + 1);
            self.current[idx] = None;
        }

        if self.can_leave(request) && (!has_no_conflict_value || kind.is_course()) {
            self.backtrack(idx + 1);
        }
    }
}
