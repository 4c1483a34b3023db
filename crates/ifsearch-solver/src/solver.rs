//! The solver loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use ifsearch_config::DataProperties;
use ifsearch_core::{Model, Solution, SolverValue};

use crate::heuristics::NeighbourSelection;
use crate::progress::ProgressHandle;
use crate::termination::TerminationCondition;

/// Drives iterations until the termination condition refuses to continue.
///
/// Each iteration asks the neighbourhood selection for a move. A returned
/// move is applied at the next iteration counter; the solution recomputes
/// its value, saves the best snapshot on improvement, and notifies
/// listeners. A `None` still advances the iteration (an idle tick) so that
/// composite selections can exhaust their phases while a time or iteration
/// limit keeps the loop bounded.
///
/// One solver owns one assignment. Parallel restarts run several solvers,
/// each with its own [`Solution`], against a shared read-only [`Model`].
pub struct Solver<V: SolverValue> {
    properties: DataProperties,
    selection: Box<dyn NeighbourSelection<V>>,
    termination: Box<dyn TerminationCondition<V>>,
    progress: ProgressHandle,
    solution: Solution<V>,
    stop: Arc<AtomicBool>,
}

impl<V: SolverValue> Solver<V> {
    /// Creates a solver over a fresh solution for the model.
    pub fn new(
        properties: DataProperties,
        model: Arc<Model<V>>,
        selection: Box<dyn NeighbourSelection<V>>,
        termination: Box<dyn TerminationCondition<V>>,
    ) -> Self {
        Self {
            properties,
            selection,
            termination,
            progress: ProgressHandle::null(),
            solution: Solution::new(model),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the progress sink.
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    /// The configuration this solver was built with.
    pub fn properties(&self) -> &DataProperties {
        &self.properties
    }

    /// The current solution.
    pub fn current_solution(&self) -> &Solution<V> {
        &self.solution
    }

    /// Requests early termination; the loop exits cleanly after the current
    /// iteration.
    pub fn terminate_early(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Shared early-termination flag, for cancellation from another thread.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Runs the search and returns the solution with its best snapshot.
    pub fn solve(&mut self) -> &Solution<V> {
        info!(
            variables = self.solution.model().variable_count(),
            "starting search"
        );
        self.selection.init(&self.solution, self.progress.clone());
        self.solution.save_best();

        let mut applied: u64 = 0;
        let mut idle: u64 = 0;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                debug!("early termination requested");
                break;
            }
            if !self.termination.can_continue(&self.solution) {
                break;
            }
            match self.selection.select_neighbour(&mut self.solution) {
                Some(neighbour) => {
                    self.solution.apply(&neighbour);
                    applied += 1;
                }
                None => {
                    self.solution.idle_tick();
                    idle += 1;
                }
            }
        }

        self.selection.finish(&mut self.solution);
        // make sure a best snapshot exists even on an immediate stop
        self.solution.save_best();
        info!(
            iterations = self.solution.iteration(),
            applied,
            idle,
            best = self.solution.best_value(),
            unassigned = self.solution.best_unassigned(),
            "search finished"
        );
        &self.solution
    }

    /// Consumes the solver, handing out the solution.
    pub fn into_solution(self) -> Solution<V> {
        self.solution
    }
}
