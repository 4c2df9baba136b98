//! Task selection and obsolescence rules of the margin scheduler.
//!
//! Everything here is a pure function of a [`MarginState`] snapshot, so the
//! scheduling order can be tested without any worker.

use super::state::{MarginState, Outcome, Window, WorkStatus};
use crate::task::TaskId;

/// Priority of a scenario that has nothing to propose.
pub const PRIORITY_INVALID: usize = 1_000_000;
/// Added to the priority of speculative load-increase probes.
pub const ANTICIPATION_OFFSET: usize = 1000;

fn task(scenario: Option<usize>, var_id: usize) -> TaskId {
    TaskId { var_id, scenario }
}

fn idle(state: &MarginState, task: TaskId) -> bool {
    state.work(task) == WorkStatus::NotStarted
}

fn load_increase_succeeded(state: &MarginState, var_id: usize) -> bool {
    state.outcome(TaskId::load_increase(var_id)) == Outcome::Success
}

/// Size of the idle neighbourhood around `var_id` in one column.
///
/// Expands symmetrically while both sides are idle and inside `window`;
/// `k` steps score `2k + 1`, plus one if a single side could go further.
pub fn gap_score(
    state: &MarginState,
    scenario: Option<usize>,
    var_id: usize,
    window: Window,
) -> usize {
    let open = |v: Option<usize>| {
        v.is_some_and(|v| window.contains(v) && idle(state, task(scenario, v)))
    };
    let mut k = 0;
    while open(var_id.checked_sub(k + 1)) && open(Some(var_id + k + 1)) {
        k += 1;
    }
    let one_more = open(var_id.checked_sub(k + 1)) || open(Some(var_id + k + 1));
    2 * k + 1 + usize::from(one_more)
}

/// Idle level of a column with the best gap score, ties going to the higher level.
fn best_gap_level(state: &MarginState, scenario: Option<usize>, window: Window) -> Option<usize> {
    window
        .levels()
        .filter(|&v| idle(state, task(scenario, v)))
        .max_by_key(|&v| (gap_score(state, scenario, v, window), v))
}

/// In global mode a scenario probe below the global margin is pointless
/// while the same scenario is already running at the global margin.
pub fn superseded(state: &MarginState, scenario: usize, var_id: usize) -> bool {
    if !state.is_global() {
        return false;
    }
    let global = state.global_margin_var_id();
    var_id < global
        && state.scenario_window(scenario).contains(global)
        && matches!(
            state.work(TaskId::scenario(global, scenario)),
            WorkStatus::Running(_)
        )
}

/// Urgency of a scenario, lower first.
///
/// Global mode favours scenarios with low bounds, they constrain the shared
/// margin. Local mode favours wide open windows.
pub fn scenario_priority(state: &MarginState, window: Window) -> usize {
    if window.is_empty() {
        return PRIORITY_INVALID;
    }
    let priority = if state.is_global() {
        (window.low + 1) + window.high
    } else {
        (window.low + 1) - window.high + state.nb_levels() as isize + 1
    };
    priority.max(0) as usize
}

/// Next probe serving `scenario`, with its priority.
pub fn next_task_for_scenario(state: &MarginState, scenario: usize) -> Option<(usize, TaskId)> {
    if state.is_resolved(scenario) {
        return None;
    }
    let window = state.scenario_window(scenario);
    if window.is_empty() {
        return None;
    }
    let priority = scenario_priority(state, window);
    let runnable = |v: usize| {
        window.contains(v)
            && load_increase_succeeded(state, v)
            && idle(state, TaskId::scenario(v, scenario))
            && !superseded(state, scenario, v)
    };

    if state.is_global() {
        let top = (window.high - 1) as usize;
        if runnable(top) {
            return Some((priority, TaskId::scenario(top, scenario)));
        }
    }

    let mid = window.mid();
    if runnable(mid) {
        return Some((priority, TaskId::scenario(mid, scenario)));
    }

    if let Some(v) = window.levels().rev().find(|&v| runnable(v)) {
        return Some((priority, TaskId::scenario(v, scenario)));
    }

    let li_mid = TaskId::load_increase(mid);
    if state.outcome(li_mid) == Outcome::Unknown && idle(state, li_mid) {
        return Some((priority, li_mid));
    }
    let li = state.load_increase_window();
    let li_bounded = Window {
        low: li.low,
        high: li.high.min(window.high),
    };
    if !li_bounded.is_empty() {
        let candidate = TaskId::load_increase(li_bounded.mid());
        if idle(state, candidate) {
            return Some((priority, candidate));
        }
    }

    let li_search = state.load_increase_search_window();
    window
        .levels()
        .filter(|&v| {
            let li_task = TaskId::load_increase(v);
            state.outcome(li_task) == Outcome::Unknown && idle(state, li_task)
        })
        .max_by_key(|&v| {
            let score = gap_score(state, Some(scenario), v, window)
                + gap_score(state, None, v, li_search);
            (score, v)
        })
        .map(|v| (priority + ANTICIPATION_OFFSET, TaskId::load_increase(v)))
}

/// Next task to hand to an idle worker, `None` when nothing useful is left.
pub fn next_task(state: &MarginState) -> Option<TaskId> {
    if state.load_increase_failed_at_zero() {
        return None;
    }
    let li = state.load_increase_search_window();
    let li_converged = state.load_increase_converged();

    if !li_converged {
        let seeds = state.initial_lis().iter().copied().chain(std::iter::once(0));
        for v in seeds {
            let candidate = TaskId::load_increase(v);
            if li.contains(v) && idle(state, candidate) {
                return Some(candidate);
            }
        }
    }

    if state.load_increase_success_max().is_some() {
        let best = (0..state.nb_scenarios())
            .filter_map(|s| next_task_for_scenario(state, s).map(|(priority, t)| (priority, s, t)))
            .min_by_key(|&(priority, s, _)| (priority, s));
        if let Some((_, _, task)) = best {
            return Some(task);
        }
    }

    if !li_converged {
        return best_gap_level(state, None, li).map(TaskId::load_increase);
    }
    None
}

fn load_increase_obsolete(state: &MarginState, var_id: usize) -> bool {
    if state.initial_lis().contains(&var_id) {
        return false;
    }
    if !state.load_increase_converged() && state.load_increase_window().contains(var_id) {
        return false;
    }
    !(0..state.nb_scenarios())
        .any(|s| !state.is_resolved(s) && state.scenario_window(s).contains(var_id))
}

fn scenario_obsolete(state: &MarginState, scenario: usize, var_id: usize) -> bool {
    state.is_resolved(scenario)
        || !state.scenario_window(scenario).contains(var_id)
        || superseded(state, scenario, var_id)
}

/// Running tasks whose result can no longer change the outcome, with their worker.
pub fn obsolete_tasks(state: &MarginState) -> Vec<(TaskId, usize)> {
    state
        .running()
        .into_iter()
        .filter(|(task, _)| match task.scenario {
            None => load_increase_obsolete(state, task.var_id),
            Some(s) => scenario_obsolete(state, s, task.var_id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskOutcome;
    use gat_core::{DiscreteLevels, SimulationStatus};
    use gat_scenarios::MarginCalculationType::{GlobalMargin, LocalMargin};
    use gat_scenarios::MarginCalculationType;

    fn state(
        accuracy: u32,
        mode: MarginCalculationType,
        scenarios: usize,
        workers: usize,
    ) -> MarginState {
        MarginState::new(DiscreteLevels::new(accuracy).unwrap(), mode, scenarios, workers)
    }

    fn finish(state: &mut MarginState, task: TaskId, success: bool) {
        state.assign(task, 1);
        state.update(
            task,
            TaskOutcome::Finished {
                success,
                status: if success {
                    SimulationStatus::Convergence
                } else {
                    SimulationStatus::CriteriaNonRespected
                },
            },
        );
    }

    #[test]
    fn load_increase_seeds_come_first() {
        let mut s = state(25, LocalMargin, 2, 3);
        let first = next_task(&s).unwrap();
        assert_eq!(first, TaskId::load_increase(4));
        s.assign(first, 1);
        let second = next_task(&s).unwrap();
        assert_eq!(second, TaskId::load_increase(0));
        s.assign(second, 2);
        assert_eq!(next_task(&s), Some(TaskId::load_increase(2)));
    }

    #[test]
    fn scenarios_start_once_a_load_level_holds() {
        let mut s = state(25, LocalMargin, 2, 1);
        finish(&mut s, TaskId::load_increase(4), true);
        assert!(s.load_increase_converged());
        assert_eq!(next_task(&s), Some(TaskId::scenario(4, 0)));
    }

    #[test]
    fn global_mode_probes_the_top_of_the_window() {
        let mut s = state(25, GlobalMargin, 2, 1);
        finish(&mut s, TaskId::load_increase(4), true);
        finish(&mut s, TaskId::scenario(4, 0), false);
        assert_eq!(s.global_margin_var_id(), 3);
        // Both windows now end at level 3; load increase must run there first.
        let next = next_task(&s).unwrap();
        assert_eq!(next, TaskId::load_increase(2));
    }

    #[test]
    fn dichotomy_waits_for_the_load_increase() {
        let mut s = state(25, LocalMargin, 1, 1);
        finish(&mut s, TaskId::load_increase(4), true);
        finish(&mut s, TaskId::scenario(4, 0), false);
        // Scenario window is (-1, 4): mid 2 has no load increase yet.
        assert_eq!(next_task(&s), Some(TaskId::load_increase(2)));
        finish(&mut s, TaskId::load_increase(2), true);
        assert_eq!(next_task(&s), Some(TaskId::scenario(2, 0)));
    }

    #[test]
    fn gap_scores_prefer_isolated_levels() {
        let s = state(10, LocalMargin, 0, 1);
        let window = Window { low: -1, high: 11 };
        assert_eq!(gap_score(&s, None, 5, window), 11);
        assert_eq!(gap_score(&s, None, 0, window), 2);
        assert_eq!(gap_score(&s, None, 10, window), 2);
        assert_eq!(best_gap_level(&s, None, window), Some(5));
    }

    #[test]
    fn local_priorities_favour_open_windows() {
        let s = state(25, LocalMargin, 1, 1);
        let wide = scenario_priority(&s, Window { low: -1, high: 5 });
        let narrow = scenario_priority(&s, Window { low: 2, high: 4 });
        assert!(wide < narrow);
        assert_eq!(
            scenario_priority(&s, Window { low: 2, high: 3 }),
            PRIORITY_INVALID
        );
    }

    #[test]
    fn global_priorities_favour_low_bounds() {
        let s = state(25, GlobalMargin, 1, 1);
        let low = scenario_priority(&s, Window { low: -1, high: 2 });
        let high = scenario_priority(&s, Window { low: 2, high: 5 });
        assert!(low < high);
    }

    #[test]
    fn resolved_scenarios_lose_their_running_tasks() {
        let mut s = state(25, LocalMargin, 2, 3);
        finish(&mut s, TaskId::load_increase(4), true);
        finish(&mut s, TaskId::load_increase(2), true);
        s.assign(TaskId::scenario(2, 0), 2);
        s.assign(TaskId::scenario(2, 1), 3);
        finish(&mut s, TaskId::scenario(4, 0), true);
        assert!(s.is_resolved(0));
        assert_eq!(obsolete_tasks(&s), vec![(TaskId::scenario(2, 0), 2)]);
    }

    #[test]
    fn scenario_tasks_outside_the_window_are_obsolete() {
        let mut s = state(25, LocalMargin, 1, 2);
        finish(&mut s, TaskId::load_increase(4), true);
        finish(&mut s, TaskId::load_increase(3), true);
        finish(&mut s, TaskId::load_increase(1), true);
        s.assign(TaskId::scenario(3, 0), 2);
        s.assign(TaskId::scenario(1, 0), 3);
        finish(&mut s, TaskId::scenario(2, 0), false);
        assert_eq!(obsolete_tasks(&s), vec![(TaskId::scenario(3, 0), 2)]);
    }

    #[test]
    fn load_increase_tasks_stay_while_informative() {
        let mut s = state(25, LocalMargin, 1, 1);
        finish(&mut s, TaskId::load_increase(4), true);
        s.assign(TaskId::load_increase(2), 2);
        assert!(obsolete_tasks(&s).is_empty());
        finish(&mut s, TaskId::scenario(1, 0), false);
        assert_eq!(obsolete_tasks(&s), vec![(TaskId::load_increase(2), 2)]);
    }

    #[test]
    fn global_mode_cancels_probes_superseded_by_the_global_level() {
        let mut s = state(25, GlobalMargin, 1, 3);
        for v in [4, 3, 2, 1, 0] {
            finish(&mut s, TaskId::load_increase(v), true);
        }
        s.assign(TaskId::scenario(1, 0), 2);
        s.assign(TaskId::scenario(4, 0), 3);
        assert!(obsolete_tasks(&s).contains(&(TaskId::scenario(1, 0), 2)));
        assert!(next_task(&s)
            .map(|t| t.scenario.is_none() || t.var_id == 4)
            .unwrap_or(true));
    }

    #[test]
    fn nothing_left_after_a_failure_at_zero() {
        let mut s = state(25, GlobalMargin, 2, 1);
        finish(&mut s, TaskId::load_increase(0), false);
        assert_eq!(next_task(&s), None);
    }
}
