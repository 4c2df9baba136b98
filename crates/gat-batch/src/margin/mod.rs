//! Margin calculation: the highest load level that the load increase and
//! the scenarios withstand, globally or per scenario.
//!
//! With one process the launcher picks and runs tasks in a loop. With more,
//! rank 0 only schedules: it hands tasks to idle workers, folds their
//! reports into the [`MarginState`], cancels work made useless by newer
//! results, and imports every persisted result once nothing is left to do.

pub mod heuristics;
pub mod state;

pub use heuristics::{next_task, next_task_for_scenario, obsolete_tasks};
pub use state::{seed_levels, MarginState, Outcome, Window, WorkStatus};

use crate::context::WorkDistributionContext;
use crate::probe::{execute_probe, ProbeKind, ProbeRequest, ProbeRun, SimulationProbe};
use crate::store::{import_result, load_increase_final_state, margin_task_dir, save_result};
use crate::task::{TaskId, TaskMessage, TaskOutcome};
use gat_core::{DiscreteLevels, GatResult, LoadIncreaseResult, SimulationResult};
use gat_scenarios::{MarginCalculation, MarginCalculationType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMargin {
    pub id: String,
    /// Load level in percent, `None` while undetermined
    pub margin: Option<f64>,
}

/// What a margin calculation found, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginReport {
    pub calculation_type: MarginCalculationType,
    pub load_increase_id: String,
    pub load_increase_margin: Option<f64>,
    /// Only set in global mode
    pub global_margin: Option<f64>,
    /// Only filled in local mode
    pub local_margins: Vec<ScenarioMargin>,
    /// Load levels whose load increase ran, in increasing order
    pub load_increase_results: Vec<LoadIncreaseResult>,
}

pub struct MarginCalculationLauncher {
    calculation: MarginCalculation,
    probe: Arc<dyn SimulationProbe>,
    working_dir: PathBuf,
    state: MarginState,
    results: Vec<LoadIncreaseResult>,
}

impl MarginCalculationLauncher {
    pub fn new(
        calculation: MarginCalculation,
        probe: Arc<dyn SimulationProbe>,
        working_dir: impl Into<PathBuf>,
    ) -> GatResult<Self> {
        let levels = DiscreteLevels::new(calculation.accuracy)?;
        let ids = calculation.scenarios.ids();
        let results = levels
            .values()
            .iter()
            .map(|&level| LoadIncreaseResult::new(level, &calculation.load_increase.id, &ids))
            .collect();
        let state = MarginState::new(levels, calculation.calculation_type, ids.len(), 1);
        Ok(MarginCalculationLauncher {
            calculation,
            probe,
            working_dir: working_dir.into(),
            state,
            results,
        })
    }

    pub fn state(&self) -> &MarginState {
        &self.state
    }

    fn level(&self, task: TaskId) -> f64 {
        self.state.levels().value(task.var_id)
    }

    fn task_name(&self, task: TaskId) -> &str {
        match task.scenario {
            None => &self.calculation.load_increase.id,
            Some(s) => &self.calculation.scenarios.scenarios[s].id,
        }
    }

    fn task_dir(&self, task: TaskId) -> PathBuf {
        margin_task_dir(&self.working_dir, self.level(task), self.task_name(task))
    }

    fn request(&self, task: TaskId) -> ProbeRequest {
        let level = self.level(task);
        let final_state = load_increase_final_state(&self.working_dir, level);
        match task.scenario {
            None => {
                let li = &self.calculation.load_increase;
                ProbeRequest::new(
                    ProbeKind::LoadIncrease,
                    li.id.as_str(),
                    &li.jobs_file,
                    self.task_dir(task),
                )
                .with_variation(level)
                .with_final_state_dump(final_state)
            }
            Some(s) => {
                let scenarios = &self.calculation.scenarios;
                ProbeRequest::for_scenario(
                    ProbeKind::Scenario,
                    &scenarios.jobs_file,
                    &scenarios.scenarios[s],
                    self.task_dir(task),
                )
                .with_variation(level)
                .with_initial_state(final_state)
            }
        }
    }

    fn result_mut(&mut self, task: TaskId) -> &mut SimulationResult {
        let level = &mut self.results[task.var_id];
        match task.scenario {
            None => &mut level.load_increase,
            Some(s) => &mut level.scenarios[s],
        }
    }

    fn record(&mut self, task: TaskId, outcome: TaskOutcome) {
        if let TaskOutcome::Finished { status, .. } = outcome {
            self.result_mut(task).set_outcome(status);
            info!(
                task = %self.task_name(task),
                level = self.level(task),
                status = %status,
                "margin task finished"
            );
        }
        self.state.update(task, outcome);
    }

    /// Runs the calculation on this rank. Only the coordinator ends up
    /// holding results; workers return once terminated.
    pub fn launch(&mut self, ctx: &dyn WorkDistributionContext) -> GatResult<()> {
        let workers = ctx.process_count().saturating_sub(1).max(1);
        self.state = MarginState::new(
            self.state.levels().clone(),
            self.calculation.calculation_type,
            self.calculation.scenarios.len(),
            workers,
        );
        if ctx.is_coordinator() {
            info!(
                calculation_type = self.calculation.calculation_type.as_str(),
                accuracy = self.calculation.accuracy,
                scenarios = self.calculation.scenarios.len(),
                processes = ctx.process_count(),
                "launching margin calculation"
            );
        }

        if ctx.process_count() <= 1 {
            self.run_single(ctx)?;
        } else if ctx.is_coordinator() {
            self.run_coordinator(ctx)?;
        } else {
            return self.run_worker(ctx);
        }
        self.log_margins();
        Ok(())
    }

    fn run_single(&mut self, ctx: &dyn WorkDistributionContext) -> GatResult<()> {
        let token = ctx.cancellation_token();
        while self.state.work_to_do() {
            let Some(task) = next_task(&self.state) else {
                warn!("no task left to schedule while margins are still undetermined");
                break;
            };
            self.state.assign(task, 0);
            let request = self.request(task);
            match execute_probe(self.probe.as_ref(), &request, &token) {
                ProbeRun::Completed(result) => {
                    let outcome = TaskOutcome::Finished {
                        success: result.success,
                        status: result.status,
                    };
                    *self.result_mut(task) = result;
                    self.record(task, outcome);
                }
                ProbeRun::Interrupted => {
                    self.record(task, TaskOutcome::Aborted);
                    if token.is_cancelled() {
                        warn!("margin calculation interrupted");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn run_coordinator(&mut self, ctx: &dyn WorkDistributionContext) -> GatResult<()> {
        let workers: Vec<usize> = (1..ctx.process_count()).collect();
        let mut busy: BTreeMap<usize, TaskId> = BTreeMap::new();
        let mut cancelled: BTreeSet<TaskId> = BTreeSet::new();

        while self.state.work_to_do() {
            for &worker in &workers {
                if busy.contains_key(&worker) {
                    continue;
                }
                let Some(task) = next_task(&self.state) else {
                    break;
                };
                self.state.assign(task, worker);
                debug!(worker, task = %task, "dispatching");
                ctx.send_task(worker, task)?;
                busy.insert(worker, task);
            }
            if busy.is_empty() {
                warn!("no task left to schedule while margins are still undetermined");
                break;
            }

            let report = ctx.receive_report()?;
            busy.remove(&report.worker);
            cancelled.remove(&report.task);
            self.record(report.task, report.outcome);

            for (task, worker) in obsolete_tasks(&self.state) {
                if cancelled.insert(task) {
                    debug!(worker, task = %task, "cancelling obsolete task");
                    ctx.cancel(worker);
                }
            }
        }

        for &worker in busy.keys() {
            ctx.cancel(worker);
        }
        while !busy.is_empty() {
            let report = ctx.receive_report()?;
            busy.remove(&report.worker);
            self.record(report.task, report.outcome);
        }
        for &worker in &workers {
            ctx.send_terminate(worker)?;
        }
        self.import_results()
    }

    fn run_worker(&mut self, ctx: &dyn WorkDistributionContext) -> GatResult<()> {
        loop {
            let task = match ctx.receive_task()? {
                TaskMessage::Terminate => return Ok(()),
                TaskMessage::Run(task) => task,
            };
            let request = self.request(task);
            let token = ctx.cancellation_token();
            match execute_probe(self.probe.as_ref(), &request, &token) {
                ProbeRun::Completed(result) => {
                    let saved = save_result(&self.task_dir(task), &result);
                    ctx.report_result(
                        task,
                        TaskOutcome::Finished {
                            success: result.success,
                            status: result.status,
                        },
                    )?;
                    saved?;
                }
                ProbeRun::Interrupted => ctx.report_result(task, TaskOutcome::Aborted)?,
            }
        }
    }

    fn import_results(&mut self) -> GatResult<()> {
        for var_id in 0..self.state.nb_levels() {
            for slot in 0..=self.state.nb_scenarios() {
                let task = TaskId {
                    var_id,
                    scenario: slot.checked_sub(1),
                };
                if self.state.work(task) == WorkStatus::Finished {
                    let result = import_result(&self.task_dir(task))?;
                    *self.result_mut(task) = result;
                }
            }
        }
        Ok(())
    }

    fn log_margins(&self) {
        let report = self.report();
        if let Some(margin) = report.load_increase_margin {
            info!(margin, "load increase margin");
        }
        if let Some(margin) = report.global_margin {
            info!(margin, "global margin");
        }
        for scenario in &report.local_margins {
            info!(scenario = %scenario.id, margin = ?scenario.margin, "local margin");
        }
    }

    /// Snapshot of the results so far; valid at any point, including after an error.
    pub fn report(&self) -> MarginReport {
        let levels = self.state.levels();
        let value = |var_id: usize| levels.value(var_id);
        let global = self.state.is_global();

        let global_margin = (global && !self.state.load_increase_failed_at_zero())
            .then(|| value(self.state.global_margin()));
        let local_margins = if global {
            Vec::new()
        } else {
            self.calculation
                .scenarios
                .scenarios
                .iter()
                .enumerate()
                .map(|(s, scenario)| ScenarioMargin {
                    id: scenario.id.clone(),
                    margin: self.state.scenario_margin(s).map(value),
                })
                .collect()
        };

        let load_increase_results = self
            .results
            .iter()
            .enumerate()
            .filter(|(var_id, _)| {
                self.state.work(TaskId::load_increase(*var_id)) == WorkStatus::Finished
            })
            .map(|(var_id, level)| {
                let mut level = level.clone();
                if level.success() {
                    let mut kept = Vec::new();
                    for (s, scenario) in level.scenarios.into_iter().enumerate() {
                        if self.state.work(TaskId::scenario(var_id, s)) == WorkStatus::Finished {
                            kept.push(scenario);
                        }
                    }
                    level.scenarios = kept;
                } else {
                    level.scenarios.clear();
                }
                level
            })
            .collect();

        MarginReport {
            calculation_type: self.calculation.calculation_type,
            load_increase_id: self.calculation.load_increase.id.clone(),
            load_increase_margin: self.state.load_increase_margin().map(value),
            global_margin,
            local_margins,
            load_increase_results,
        }
    }
}
