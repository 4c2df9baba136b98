//! The seam between the schedulers and the simulation engine.
//!
//! A [`SimulationProbe`] runs one simulation for a [`ProbeRequest`]. Every
//! failure it can report is an outcome, not an error: [`execute_probe`]
//! folds it into a [`SimulationResult`] right at the call site so nothing
//! past the scheduler loop ever sees a [`ProbeError`].

use gat_core::{FailingCriterion, GatResult, SimulationResult, SimulationStatus};
use gat_scenarios::ResolvedScenario;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeKind {
    /// Plain run of a jobs file
    Simulation,
    LoadIncrease,
    Scenario,
    CriticalTime,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Simulation => "simulation",
            ProbeKind::LoadIncrease => "load-increase",
            ProbeKind::Scenario => "scenario",
            ProbeKind::CriticalTime => "critical-time",
        }
    }
}

/// Model parameter forced to a value for one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterOverride {
    pub model_id: String,
    pub parameter: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub kind: ProbeKind,
    pub scenario_id: String,
    pub jobs_file: PathBuf,
    pub dyd_file: Option<PathBuf>,
    pub criteria_file: Option<PathBuf>,
    /// Directory the probe writes its outputs to
    pub working_dir: PathBuf,
    /// Knob value: load level in percent for margin probes, event time for critical time
    pub variation: Option<f64>,
    /// State to start from instead of the jobs file initial state
    pub initial_state: Option<PathBuf>,
    /// Where to dump the final state, when a later probe starts from it
    pub dump_final_state: Option<PathBuf>,
    #[serde(default)]
    pub overrides: Vec<ParameterOverride>,
}

impl ProbeRequest {
    pub fn new(
        kind: ProbeKind,
        scenario_id: impl Into<String>,
        jobs_file: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        ProbeRequest {
            kind,
            scenario_id: scenario_id.into(),
            jobs_file: jobs_file.into(),
            dyd_file: None,
            criteria_file: None,
            working_dir: working_dir.into(),
            variation: None,
            initial_state: None,
            dump_final_state: None,
            overrides: Vec::new(),
        }
    }

    /// Request for one scenario of a scenario list.
    pub fn for_scenario(
        kind: ProbeKind,
        jobs_file: &Path,
        scenario: &ResolvedScenario,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        let mut request = ProbeRequest::new(kind, scenario.id.as_str(), jobs_file, working_dir);
        request.dyd_file = scenario.dyd_file.clone();
        request.criteria_file = scenario.criteria_file.clone();
        request
    }

    pub fn with_variation(mut self, variation: f64) -> Self {
        self.variation = Some(variation);
        self
    }

    pub fn with_initial_state(mut self, path: impl Into<PathBuf>) -> Self {
        self.initial_state = Some(path.into());
        self
    }

    pub fn with_final_state_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_final_state = Some(path.into());
        self
    }

    pub fn with_override(mut self, model_id: &str, parameter: &str, value: f64) -> Self {
        self.overrides.push(ParameterOverride {
            model_id: model_id.to_string(),
            parameter: parameter.to_string(),
            value,
        });
        self
    }

    /// File that describes the dynamic models of this request.
    pub fn model_file(&self) -> &Path {
        self.dyd_file.as_deref().unwrap_or(&self.jobs_file)
    }
}

/// What a completed probe reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutput {
    pub status: SimulationStatus,
    pub failing_criteria: Vec<FailingCriterion>,
    pub timeline: String,
    pub constraints: String,
    pub final_state: String,
}

impl ProbeOutput {
    pub fn new(status: SimulationStatus) -> Self {
        ProbeOutput {
            status,
            failing_criteria: Vec::new(),
            timeline: String::new(),
            constraints: String::new(),
            final_state: String::new(),
        }
    }

    pub fn converged() -> Self {
        Self::new(SimulationStatus::Convergence)
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Numerical failure inside the solver
    #[error("solver failure: {0}")]
    Solver(String),

    #[error("execution problem: {0}")]
    Execution(String),

    /// The cancellation token fired before the probe completed
    #[error("probe interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Status a failed probe is recorded with.
    pub fn status(&self) -> SimulationStatus {
        match self {
            ProbeError::Solver(_) => SimulationStatus::Divergence,
            _ => SimulationStatus::ExecutionProblem,
        }
    }
}

/// Cooperative cancellation flag shared between a coordinator and one worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub trait SimulationProbe: Send + Sync {
    /// Runs one simulation. Implementations check `cancel` at safe points and
    /// return [`ProbeError::Interrupted`] once it fired.
    fn run(&self, request: &ProbeRequest, cancel: &CancellationToken)
        -> Result<ProbeOutput, ProbeError>;

    /// Whether the model description of `request` declares `model_id`.
    /// Probes that cannot inspect their models accept every id.
    fn has_model(&self, _request: &ProbeRequest, _model_id: &str) -> GatResult<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeRun {
    Completed(SimulationResult),
    Interrupted,
}

pub fn execute_probe(
    probe: &dyn SimulationProbe,
    request: &ProbeRequest,
    cancel: &CancellationToken,
) -> ProbeRun {
    let mut result = SimulationResult::new(request.scenario_id.as_str());
    result.variation = request.variation;
    debug!(
        kind = request.kind.as_str(),
        scenario = %request.scenario_id,
        variation = ?request.variation,
        "launching probe"
    );
    match probe.run(request, cancel) {
        Ok(output) => {
            result.set_outcome(output.status);
            result.failing_criteria = output.failing_criteria;
            result.timeline = output.timeline;
            result.constraints = output.constraints;
            result.final_state = output.final_state;
        }
        Err(ProbeError::Interrupted) => {
            debug!(scenario = %request.scenario_id, "probe interrupted");
            return ProbeRun::Interrupted;
        }
        Err(err) => {
            warn!(scenario = %request.scenario_id, error = %err, "probe failed");
            result.set_outcome(err.status());
        }
    }
    debug!(
        scenario = %result.unique_scenario_id(),
        status = %result.status,
        "probe finished"
    );
    ProbeRun::Completed(result)
}
