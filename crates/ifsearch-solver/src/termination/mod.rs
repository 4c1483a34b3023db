//! Termination conditions for the solver loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ifsearch_config::{ConfigError, DataProperties};
use ifsearch_core::{Solution, SolverValue};

/// Gate polled at the top of every solver iteration.
pub trait TerminationCondition<V: SolverValue>: Send {
    /// True while the search may continue.
    fn can_continue(&self, solution: &Solution<V>) -> bool;
}

/// Stops after a wall-clock limit, measured from construction.
#[derive(Debug, Clone)]
pub struct TimeLimit {
    limit: Duration,
    started: Instant,
}

impl TimeLimit {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            started: Instant::now(),
        }
    }

    pub fn seconds(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl<V: SolverValue> TerminationCondition<V> for TimeLimit {
    fn can_continue(&self, _solution: &Solution<V>) -> bool {
        self.started.elapsed() < self.limit
    }
}

/// Stops once the solution iteration counter reaches a limit.
#[derive(Debug, Clone)]
pub struct IterationLimit {
    max_iters: u64,
}

impl IterationLimit {
    pub fn new(max_iters: u64) -> Self {
        Self { max_iters }
    }
}

impl<V: SolverValue> TerminationCondition<V> for IterationLimit {
    fn can_continue(&self, solution: &Solution<V>) -> bool {
        solution.iteration() < self.max_iters
    }
}

/// External cancellation; the solver exits cleanly after the current
/// iteration once the flag is raised.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared flag; store `true` to request termination.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Requests termination.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl<V: SolverValue> TerminationCondition<V> for StopFlag {
    fn can_continue(&self, _solution: &Solution<V>) -> bool {
        !self.flag.load(Ordering::SeqCst)
    }
}

/// Conjunction: continues only while every condition allows it.
pub struct AllConditions<V: SolverValue> {
    conditions: Vec<Box<dyn TerminationCondition<V>>>,
}

impl<V: SolverValue> AllConditions<V> {
    pub fn new(conditions: Vec<Box<dyn TerminationCondition<V>>>) -> Self {
        Self { conditions }
    }
}

impl<V: SolverValue> TerminationCondition<V> for AllConditions<V> {
    fn can_continue(&self, solution: &Solution<V>) -> bool {
        self.conditions.iter().all(|c| c.can_continue(solution))
    }
}

/// Default termination built from configuration.
///
/// Honors `Termination.TimeOut` (seconds) and `Termination.MaxIters` when
/// present, and always carries a [`StopFlag`] for external cancellation.
pub struct GlobalTermination<V: SolverValue> {
    all: AllConditions<V>,
    stop: StopFlag,
}

impl<V: SolverValue> GlobalTermination<V> {
    pub fn from_properties(properties: &DataProperties) -> Result<Self, ConfigError> {
        let mut conditions: Vec<Box<dyn TerminationCondition<V>>> = Vec::new();
        let timeout = properties.get_int("Termination.TimeOut", 0)?;
        if timeout > 0 {
            conditions.push(Box::new(TimeLimit::seconds(timeout as u64)));
        }
        let max_iters = properties.get_int("Termination.MaxIters", 0)?;
        if max_iters > 0 {
            conditions.push(Box::new(IterationLimit::new(max_iters as u64)));
        }
        let stop = StopFlag::new();
        conditions.push(Box::new(stop.clone()));
        Ok(Self {
            all: AllConditions::new(conditions),
            stop,
        })
    }

    /// Flag for external cancellation.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }
}

impl<V: SolverValue> TerminationCondition<V> for GlobalTermination<V> {
    fn can_continue(&self, solution: &Solution<V>) -> bool {
        self.all.can_continue(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifsearch_core::{Model, VariableId};

    #[derive(Clone, PartialEq, Debug)]
    struct Val(VariableId);

    impl SolverValue for Val {
        fn variable(&self) -> VariableId {
            self.0
        }
        fn to_double(&self) -> f64 {
            0.0
        }
    }

    fn empty_solution() -> Solution<Val> {
        Solution::new(Arc::new(Model::new()))
    }

    #[test]
    fn iteration_limit_counts_solution_iterations() {
        let mut solution = empty_solution();
        let limit = IterationLimit::new(2);
        assert!(limit.can_continue(&solution));
        solution.idle_tick();
        assert!(limit.can_continue(&solution));
        solution.idle_tick();
        assert!(!limit.can_continue(&solution));
    }

    #[test]
    fn stop_flag_requests_cancellation() {
        let solution = empty_solution();
        let stop = StopFlag::new();
        assert!(stop.can_continue(&solution));
        stop.stop();
        assert!(!stop.can_continue(&solution));
    }

    #[test]
    fn elapsed_time_limit_stops() {
        let solution = empty_solution();
        let limit = TimeLimit::new(Duration::ZERO);
        assert!(!<TimeLimit as TerminationCondition<Val>>::can_continue(
            &limit, &solution
        ));
    }

    #[test]
    fn all_conditions_is_a_conjunction() {
        let mut solution = empty_solution();
        let all: AllConditions<Val> = AllConditions::new(vec![
            Box::new(IterationLimit::new(1)),
            Box::new(TimeLimit::seconds(3600)),
        ]);
        assert!(all.can_continue(&solution));
        solution.idle_tick();
        assert!(!all.can_continue(&solution));
    }

    #[test]
    fn global_termination_reads_configuration() {
        let properties = DataProperties::from_pairs([("Termination.MaxIters", "1")]);
        let termination: GlobalTermination<Val> =
            GlobalTermination::from_properties(&properties).unwrap();
        let mut solution = empty_solution();
        assert!(termination.can_continue(&solution));
        solution.idle_tick();
        assert!(!termination.can_continue(&solution));

        let stoppable: GlobalTermination<Val> =
            GlobalTermination::from_properties(&DataProperties::new()).unwrap();
        stoppable.stop_flag().stop();
        assert!(!stoppable.can_continue(&empty_solution()));
    }
}
