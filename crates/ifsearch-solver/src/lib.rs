//! ifsearch solver engine
//!
//! This crate drives the iterative forward search:
//! - The solver loop with termination and best-solution tracking ([`Solver`])
//! - The standard IFS neighbourhood selection ([`StandardNeighbourSelection`])
//! - Improvement heuristics: hill climbing (plain and step-counting),
//!   simulated annealing, great deluge
//! - The composite simple search that sequences construction → IFS →
//!   hill climbing → annealing/deluge ([`SimpleSearch`])
//! - A branch-and-bound per-entity selection for jointly scheduled request
//!   bundles ([`sectioning`])
//! - Progress reporting and a registry for named construction selections

pub mod heuristics;
pub mod progress;
pub mod registry;
pub mod sectioning;
pub mod solver;
pub mod termination;

pub use heuristics::{
    GreatDeluge, GreedyMoveSelection, HillClimber, NeighbourSelection, RandomMoveSelection,
    RandomSwapSelection, SimpleSearch, SimulatedAnnealing, StandardNeighbourSelection,
    StepCountingHillClimber, ValueSelection, VariableSelection,
};
pub use progress::{LogProgress, NullProgress, Progress, ProgressHandle};
pub use registry::SelectionRegistry;
pub use sectioning::{
    BranchBoundSelection, EntityId, EntityModel, EntityWeights, RequestKind,
};
pub use solver::Solver;
pub use termination::{
    AllConditions, GlobalTermination, IterationLimit, StopFlag, TerminationCondition, TimeLimit,
};
