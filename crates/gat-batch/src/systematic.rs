//! Systematic analysis: every scenario once, at nominal load.

use crate::context::{for_each, WorkDistributionContext};
use crate::probe::{execute_probe, ProbeKind, ProbeRequest, ProbeRun, SimulationProbe};
use crate::store::{clear_result, import_result, save_result};
use gat_core::{GatResult, SimulationResult, SimulationStatus};
use gat_scenarios::ScenarioSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct SystematicAnalysis {
    /// Worst status over all scenarios
    pub status: SimulationStatus,
    pub results: Vec<SimulationResult>,
}

impl SystematicAnalysis {
    pub fn new(results: Vec<SimulationResult>) -> Self {
        let status = SimulationStatus::worst(results.iter().map(|r| r.status));
        SystematicAnalysis { status, results }
    }
}

pub struct SystematicAnalysisLauncher {
    scenarios: ScenarioSet,
    probe: Arc<dyn SimulationProbe>,
    working_dir: PathBuf,
}

impl SystematicAnalysisLauncher {
    pub fn new(
        scenarios: ScenarioSet,
        probe: Arc<dyn SimulationProbe>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        SystematicAnalysisLauncher {
            scenarios,
            probe,
            working_dir: working_dir.into(),
        }
    }

    fn scenario_dir(&self, index: usize) -> PathBuf {
        self.working_dir.join(&self.scenarios.scenarios[index].id)
    }

    fn run_scenario(&self, index: usize, ctx: &dyn WorkDistributionContext) -> SimulationResult {
        let request = ProbeRequest::for_scenario(
            ProbeKind::Scenario,
            &self.scenarios.jobs_file,
            &self.scenarios.scenarios[index],
            self.scenario_dir(index),
        );
        match execute_probe(self.probe.as_ref(), &request, &ctx.cancellation_token()) {
            ProbeRun::Completed(result) => result,
            ProbeRun::Interrupted => SimulationResult::new(request.scenario_id.as_str()),
        }
    }

    /// Workers return `None`; the coordinator gets every scenario in input order.
    pub fn launch(&self, ctx: &dyn WorkDistributionContext) -> GatResult<Option<SystematicAnalysis>> {
        if ctx.is_coordinator() {
            info!(
                scenarios = self.scenarios.len(),
                processes = ctx.process_count(),
                "launching systematic analysis"
            );
        }
        let count = self.scenarios.len();
        let local = for_each(ctx, 0, count, |index| clear_result(&self.scenario_dir(index)))
            .and_then(|()| {
                for_each(ctx, 0, count, |index| {
                    let result = self.run_scenario(index, ctx);
                    info!(scenario = %result.scenario_id, status = %result.status, "scenario done");
                    save_result(&self.scenario_dir(index), &result)
                })
            });
        ctx.barrier();
        local?;

        if !ctx.is_coordinator() {
            return Ok(None);
        }
        let results = (0..count)
            .map(|index| import_result(&self.scenario_dir(index)))
            .collect::<GatResult<Vec<_>>>()?;
        let analysis = SystematicAnalysis::new(results);
        info!(status = %analysis.status, "systematic analysis done");
        Ok(Some(analysis))
    }

    /// Results persisted by the latest launch, skipping scenarios that have none yet.
    pub fn collect_available(&self) -> SystematicAnalysis {
        SystematicAnalysis::new(
            (0..self.scenarios.len())
                .filter_map(|index| import_result(&self.scenario_dir(index)).ok())
                .collect(),
        )
    }
}
