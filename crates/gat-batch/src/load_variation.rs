//! One-off runs: the load increase at a single level, or a bare simulation.

use crate::probe::{
    execute_probe, CancellationToken, ProbeKind, ProbeRequest, ProbeRun, SimulationProbe,
};
use crate::store::load_increase_final_state;
use gat_core::{GatError, GatResult, LoadIncreaseResult, SimulationResult};
use gat_scenarios::LoadIncrease;
use std::path::Path;
use tracing::info;

fn completed(run: ProbeRun, what: &str) -> GatResult<SimulationResult> {
    match run {
        ProbeRun::Completed(result) => Ok(result),
        ProbeRun::Interrupted => Err(GatError::Other(format!("{what} interrupted"))),
    }
}

/// Runs the load increase at `variation` percent in `working_dir/<id>`.
pub fn run_load_variation(
    load_increase: &LoadIncrease,
    variation: f64,
    probe: &dyn SimulationProbe,
    working_dir: &Path,
    cancel: &CancellationToken,
) -> GatResult<LoadIncreaseResult> {
    if !(0.0..=100.0).contains(&variation) {
        return Err(GatError::Config(format!(
            "load variation must lie in [0, 100], got {variation}"
        )));
    }
    let request = ProbeRequest::new(
        ProbeKind::LoadIncrease,
        load_increase.id.as_str(),
        &load_increase.jobs_file,
        working_dir.join(&load_increase.id),
    )
    .with_variation(variation)
    .with_final_state_dump(load_increase_final_state(working_dir, variation));

    let result = completed(execute_probe(probe, &request, cancel), "load variation")?;
    info!(variation, status = %result.status, "load variation done");
    Ok(LoadIncreaseResult {
        load_level: variation,
        load_increase: result,
        scenarios: Vec::new(),
    })
}

/// Runs `jobs_file` once, as is.
pub fn run_simulation(
    jobs_file: &Path,
    probe: &dyn SimulationProbe,
    working_dir: &Path,
    cancel: &CancellationToken,
) -> GatResult<SimulationResult> {
    let id = jobs_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "simulation".to_string());
    let request = ProbeRequest::new(ProbeKind::Simulation, id.as_str(), jobs_file, working_dir);
    let result = completed(execute_probe(probe, &request, cancel), "simulation")?;
    info!(status = %result.status, "simulation done");
    Ok(result)
}
