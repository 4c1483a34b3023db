//! ifsearch core data model
//!
//! This crate provides the building blocks of the iterative forward search
//! framework:
//! - Variable/value/constraint model ([`Model`], [`SolverValue`], [`Constraint`])
//! - Assignment machinery with iteration-tagged mutations ([`Assignment`])
//! - Per-assignment component state ([`ContextStore`])
//! - Pending moves ([`Neighbour`])
//! - Solution bookkeeping with best-snapshot tracking ([`Solution`])
//!
//! Concrete problem models (timetabling criteria, placement semantics,
//! parsers, persistence) live outside this crate and plug in through the
//! [`Constraint`], [`Criterion`] and [`SolverValue`] traits.

pub mod assignment;
pub mod error;
pub mod model;
pub mod neighbour;
pub mod solution;

pub use assignment::{Assignment, AssignmentId, ContextStore};
pub use error::CoreError;
pub use model::{Constraint, Criterion, Model, SolverValue, Variable, VariableId};
pub use neighbour::Neighbour;
pub use solution::{Solution, SolutionEvent, SolutionListener};
