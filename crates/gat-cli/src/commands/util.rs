use anyhow::{anyhow, Context, Result};
use gat_batch::{
    CommandProbe, SimulationProbe, SingleProcess, ThreadCluster, WorkDistributionContext,
};
use gat_cli::SimulatorArgs;
use gat_core::GatResult;
use std::path::Path;
use std::sync::Arc;

/// Number of ranks: `auto` is the CPU count, anything else a positive integer.
pub fn resolve_processes(spec: &str) -> Result<usize> {
    if spec.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get());
    }
    match spec.parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(anyhow!(
            "invalid process count '{}'; use a positive integer or 'auto'",
            spec
        )),
    }
}

pub fn build_probe(args: &SimulatorArgs) -> Result<Arc<dyn SimulationProbe>> {
    let program = CommandProbe::find_binary(&args.simulator)
        .with_context(|| format!("locating simulator '{}'", args.simulator))?;
    Ok(Arc::new(
        CommandProbe::new(program).with_args(args.simulator_args.iter()),
    ))
}

/// Runs `body` on one rank, or on `processes` thread ranks, and returns the coordinator's value.
pub fn distribute<T, F>(processes: usize, body: F) -> GatResult<T>
where
    T: Send,
    F: Fn(&dyn WorkDistributionContext) -> GatResult<T> + Sync,
{
    if processes <= 1 {
        body(&SingleProcess::new())
    } else {
        ThreadCluster::run(processes, |endpoint| body(endpoint))
    }
}

pub fn display(path: &Path) -> String {
    path.display().to_string()
}
