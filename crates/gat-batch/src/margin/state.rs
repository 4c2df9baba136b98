//! Bookkeeping of a margin calculation.
//!
//! [`MarginState`] is owned by the coordinator. Heuristics only read it
//! through the query methods below; [`MarginState::assign`] and
//! [`MarginState::update`] are the only mutations.

use crate::task::{TaskId, TaskOutcome};
use gat_core::DiscreteLevels;
use gat_scenarios::MarginCalculationType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    NotStarted,
    /// In flight on the given worker rank
    Running(usize),
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unknown,
    Success,
    Failure,
}

/// Candidate levels of one column, as the open interval `(low, high)`.
///
/// `low` is the highest known success (`-1` for none), `high` the lowest
/// level known not to hold (`levels.len()` for none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub low: isize,
    pub high: isize,
}

impl Window {
    pub fn is_empty(&self) -> bool {
        self.low + 1 >= self.high
    }

    pub fn contains(&self, var_id: usize) -> bool {
        let v = var_id as isize;
        self.low < v && v < self.high
    }

    pub fn levels(&self) -> impl DoubleEndedIterator<Item = usize> {
        ((self.low + 1).max(0) as usize)..(self.high.max(0) as usize)
    }

    /// Midpoint biased upward: `(low + high + 1) / 2`.
    pub fn mid(&self) -> usize {
        ((self.low + self.high + 1) / 2).max(0) as usize
    }
}

#[derive(Debug, Clone)]
pub struct MarginState {
    levels: DiscreteLevels,
    mode: MarginCalculationType,
    nb_scenarios: usize,
    work: Vec<Vec<WorkStatus>>,
    outcomes: Vec<Vec<Outcome>>,
    margins: Vec<Option<usize>>,
    global_margin: usize,
    initial_lis: Vec<usize>,
}

/// Levels probed first by the load increase, one per worker: 100%, then 0%,
/// then breadth-first midpoints.
pub fn seed_levels(nb_levels: usize, workers: usize) -> Vec<usize> {
    let wanted = workers.max(1).min(nb_levels);
    let top = nb_levels - 1;
    let mut seeds = vec![top];
    if wanted > 1 && top > 0 {
        seeds.push(0);
    }
    let mut intervals = std::collections::VecDeque::from([(0usize, top)]);
    while seeds.len() < wanted {
        let Some((a, b)) = intervals.pop_front() else {
            break;
        };
        if b - a < 2 {
            continue;
        }
        let m = (a + b + 1) / 2;
        seeds.push(m);
        intervals.push_back((a, m));
        intervals.push_back((m, b));
    }
    seeds
}

impl MarginState {
    pub fn new(
        levels: DiscreteLevels,
        mode: MarginCalculationType,
        nb_scenarios: usize,
        workers: usize,
    ) -> Self {
        let nb_levels = levels.len();
        let global_margin = levels.var_id_100();
        MarginState {
            initial_lis: seed_levels(nb_levels, workers),
            work: vec![vec![WorkStatus::NotStarted; nb_scenarios + 1]; nb_levels],
            outcomes: vec![vec![Outcome::Unknown; nb_scenarios + 1]; nb_levels],
            margins: vec![None; nb_scenarios],
            levels,
            mode,
            nb_scenarios,
            global_margin,
        }
    }

    pub fn levels(&self) -> &DiscreteLevels {
        &self.levels
    }

    pub fn nb_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn nb_scenarios(&self) -> usize {
        self.nb_scenarios
    }

    pub fn mode(&self) -> MarginCalculationType {
        self.mode
    }

    pub fn is_global(&self) -> bool {
        self.mode == MarginCalculationType::GlobalMargin
    }

    pub fn initial_lis(&self) -> &[usize] {
        &self.initial_lis
    }

    pub fn work(&self, task: TaskId) -> WorkStatus {
        self.work[task.var_id][task.slot()]
    }

    pub fn outcome(&self, task: TaskId) -> Outcome {
        self.outcomes[task.var_id][task.slot()]
    }

    /// Current global margin estimate; never increases.
    pub fn global_margin_var_id(&self) -> usize {
        self.global_margin
    }

    pub fn scenario_margin(&self, scenario: usize) -> Option<usize> {
        self.margins[scenario]
    }

    pub fn is_resolved(&self, scenario: usize) -> bool {
        self.margins[scenario].is_some()
    }

    /// Tasks currently in flight with their worker.
    pub fn running(&self) -> Vec<(TaskId, usize)> {
        let mut running = Vec::new();
        for (var_id, row) in self.work.iter().enumerate() {
            for (slot, status) in row.iter().enumerate() {
                if let WorkStatus::Running(worker) = *status {
                    let task = match slot {
                        0 => TaskId::load_increase(var_id),
                        s => TaskId::scenario(var_id, s - 1),
                    };
                    running.push((task, worker));
                }
            }
        }
        running
    }

    /// Lowest failing level of a column, `nb_levels` when none failed.
    fn failure_min(&self, slot: usize) -> usize {
        (0..self.nb_levels())
            .find(|&v| self.outcomes[v][slot] == Outcome::Failure)
            .unwrap_or(self.nb_levels())
    }

    /// Highest success strictly below the lowest failure of a column.
    fn success_max(&self, slot: usize) -> isize {
        let limit = self.failure_min(slot);
        (0..limit)
            .rev()
            .find(|&v| self.outcomes[v][slot] == Outcome::Success)
            .map_or(-1, |v| v as isize)
    }

    pub fn load_increase_window(&self) -> Window {
        Window {
            low: self.success_max(0),
            high: self.failure_min(0) as isize,
        }
    }

    /// The load increase boundary is known: its best success and first failure are adjacent.
    pub fn load_increase_converged(&self) -> bool {
        self.load_increase_window().is_empty()
    }

    pub fn load_increase_failed_at_zero(&self) -> bool {
        self.outcomes[0][0] == Outcome::Failure
    }

    /// Highest consistent load-increase success.
    pub fn load_increase_success_max(&self) -> Option<usize> {
        let low = self.success_max(0);
        (low >= 0).then_some(low as usize)
    }

    /// Upper bound every scenario window shares: the first load-increase
    /// failure and, in global mode, one past the global margin.
    fn shared_high(&self) -> isize {
        let mut high = self.failure_min(0) as isize;
        if self.is_global() {
            high = high.min(self.global_margin as isize + 1);
        }
        high
    }

    pub fn scenario_window(&self, scenario: usize) -> Window {
        let slot = scenario + 1;
        Window {
            low: self.success_max(slot),
            high: (self.failure_min(slot) as isize).min(self.shared_high()),
        }
    }

    /// Load-increase levels still worth probing on behalf of the load increase itself.
    pub fn load_increase_search_window(&self) -> Window {
        let window = self.load_increase_window();
        Window {
            low: window.low,
            high: window.high.min(self.shared_high()),
        }
    }

    pub fn work_to_do(&self) -> bool {
        if self.load_increase_failed_at_zero() {
            return false;
        }
        if self.nb_scenarios == 0 {
            return !self.load_increase_converged();
        }
        self.margins.iter().any(Option::is_none)
    }

    /// Marks a task as in flight. The cell must be idle.
    pub fn assign(&mut self, task: TaskId, worker: usize) {
        debug_assert_eq!(self.work(task), WorkStatus::NotStarted, "{task} assigned twice");
        self.work[task.var_id][task.slot()] = WorkStatus::Running(worker);
    }

    pub fn update(&mut self, task: TaskId, outcome: TaskOutcome) {
        let cell = &mut self.work[task.var_id][task.slot()];
        match outcome {
            TaskOutcome::Aborted => {
                *cell = WorkStatus::NotStarted;
                return;
            }
            TaskOutcome::Finished { success, .. } => {
                *cell = WorkStatus::Finished;
                self.outcomes[task.var_id][task.slot()] = if success {
                    Outcome::Success
                } else {
                    Outcome::Failure
                };
                if !success && (self.is_global() || task.is_load_increase()) {
                    self.global_margin = self.global_margin.min(task.var_id.saturating_sub(1));
                }
            }
        }
        self.resolve_margins();
    }

    fn resolve_margins(&mut self) {
        for scenario in 0..self.nb_scenarios {
            if self.margins[scenario].is_some() {
                continue;
            }
            let window = self.scenario_window(scenario);
            if window.is_empty() {
                let margin = window.low.min(window.high - 1).max(0) as usize;
                self.margins[scenario] = Some(margin);
            }
        }
    }

    /// Load-increase margin, once the load increase boundary is known.
    pub fn load_increase_margin(&self) -> Option<usize> {
        if self.load_increase_converged() {
            self.load_increase_success_max()
        } else {
            None
        }
    }

    /// Final global margin: the estimate capped by every resolved scenario.
    pub fn global_margin(&self) -> usize {
        self.margins
            .iter()
            .flatten()
            .copied()
            .chain(std::iter::once(self.global_margin))
            .chain(self.load_increase_success_max().filter(|_| self.nb_scenarios == 0))
            .min()
            .unwrap_or(self.global_margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gat_core::SimulationStatus;

    fn finished(success: bool) -> TaskOutcome {
        TaskOutcome::Finished {
            success,
            status: if success {
                SimulationStatus::Convergence
            } else {
                SimulationStatus::Divergence
            },
        }
    }

    fn state(accuracy: u32, mode: MarginCalculationType, scenarios: usize) -> MarginState {
        MarginState::new(DiscreteLevels::new(accuracy).unwrap(), mode, scenarios, 1)
    }

    #[test]
    fn seeds_spread_over_the_levels() {
        assert_eq!(seed_levels(21, 1), vec![20]);
        assert_eq!(seed_levels(21, 2), vec![20, 0]);
        assert_eq!(seed_levels(21, 4), vec![20, 0, 10, 5]);
        assert_eq!(seed_levels(3, 8), vec![2, 0, 1]);
        assert_eq!(seed_levels(2, 8), vec![1, 0]);
    }

    #[test]
    fn window_midpoint_rounds_up() {
        let w = Window { low: 0, high: 3 };
        assert_eq!(w.mid(), 2);
        let w = Window { low: -1, high: 3 };
        assert_eq!(w.mid(), 1);
        assert_eq!(w.levels().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(Window { low: 1, high: 2 }.is_empty());
    }

    #[test]
    fn aborted_tasks_become_idle_again() {
        let mut s = state(50, MarginCalculationType::LocalMargin, 1);
        let task = TaskId::load_increase(2);
        s.assign(task, 3);
        assert_eq!(s.work(task), WorkStatus::Running(3));
        assert_eq!(s.running(), vec![(task, 3)]);
        s.update(task, TaskOutcome::Aborted);
        assert_eq!(s.work(task), WorkStatus::NotStarted);
        assert_eq!(s.outcome(task), Outcome::Unknown);
    }

    #[test]
    fn global_failures_clamp_the_margin() {
        let mut s = state(25, MarginCalculationType::GlobalMargin, 2);
        assert_eq!(s.global_margin_var_id(), 4);
        s.update(TaskId::scenario(3, 1), finished(false));
        assert_eq!(s.global_margin_var_id(), 2);
        s.update(TaskId::scenario(4, 0), finished(false));
        assert_eq!(s.global_margin_var_id(), 2);
        s.update(TaskId::scenario(0, 0), finished(false));
        assert_eq!(s.global_margin_var_id(), 0);
    }

    #[test]
    fn local_mode_only_clamps_on_load_increase_failures() {
        let mut s = state(25, MarginCalculationType::LocalMargin, 1);
        s.update(TaskId::scenario(2, 0), finished(false));
        assert_eq!(s.global_margin_var_id(), 4);
        s.update(TaskId::load_increase(3), finished(false));
        assert_eq!(s.global_margin_var_id(), 2);
    }

    #[test]
    fn scenarios_resolve_when_their_window_closes() {
        let mut s = state(25, MarginCalculationType::LocalMargin, 2);
        s.update(TaskId::load_increase(4), finished(true));
        s.update(TaskId::scenario(4, 0), finished(true));
        assert_eq!(s.scenario_margin(0), Some(4));

        s.update(TaskId::scenario(4, 1), finished(false));
        assert!(!s.is_resolved(1));
        s.update(TaskId::load_increase(2), finished(true));
        s.update(TaskId::scenario(2, 1), finished(true));
        s.update(TaskId::load_increase(3), finished(true));
        s.update(TaskId::scenario(3, 1), finished(false));
        assert_eq!(s.scenario_margin(1), Some(2));
        assert!(!s.work_to_do());
    }

    #[test]
    fn load_increase_failure_bounds_every_scenario() {
        let mut s = state(25, MarginCalculationType::LocalMargin, 1);
        s.update(TaskId::load_increase(2), finished(false));
        assert_eq!(s.scenario_window(0), Window { low: -1, high: 2 });
        s.update(TaskId::load_increase(1), finished(true));
        assert!(s.load_increase_converged());
        assert_eq!(s.load_increase_margin(), Some(1));
        s.update(TaskId::scenario(1, 0), finished(true));
        assert_eq!(s.scenario_margin(0), Some(1));
    }

    #[test]
    fn failure_at_zero_stops_everything() {
        let mut s = state(10, MarginCalculationType::GlobalMargin, 3);
        assert!(s.work_to_do());
        s.update(TaskId::load_increase(0), finished(false));
        assert!(!s.work_to_do());
    }

    #[test]
    fn zero_scenarios_wait_for_the_load_increase() {
        let mut s = state(50, MarginCalculationType::GlobalMargin, 0);
        assert!(s.work_to_do());
        s.update(TaskId::load_increase(2), finished(false));
        assert!(s.work_to_do());
        s.update(TaskId::load_increase(1), finished(true));
        assert!(!s.work_to_do());
        assert_eq!(s.global_margin(), 1);
    }

    #[test]
    fn successes_above_a_failure_are_ignored() {
        let mut s = state(25, MarginCalculationType::LocalMargin, 1);
        s.update(TaskId::load_increase(1), finished(false));
        s.update(TaskId::load_increase(3), finished(true));
        assert_eq!(s.load_increase_success_max(), None);
        assert_eq!(s.load_increase_window(), Window { low: -1, high: 1 });
    }
}
