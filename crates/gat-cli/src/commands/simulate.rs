use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use gat_batch::{
    run_simulation, write_export, write_outputs, CancellationToken, SystematicAnalysis,
    SystematicExport,
};
use gat_cli::SimulatorArgs;
use gat_scenarios::working_directory;

use crate::commands::telemetry::record_run_timed;
use crate::commands::util::{build_probe, display};

pub fn handle(
    jobs_file: &Path,
    directory: &Path,
    output: Option<&Path>,
    simulator: &SimulatorArgs,
) -> Result<()> {
    let start = Instant::now();
    let res = (|| -> Result<()> {
        let working_dir = working_directory(directory)?;
        let jobs_file = if jobs_file.is_absolute() {
            jobs_file.to_path_buf()
        } else {
            working_dir.join(jobs_file)
        };
        if !jobs_file.is_file() {
            return Err(gat_core::GatError::FileDoesNotExist(jobs_file).into());
        }
        let probe = build_probe(simulator)?;
        let cancel = CancellationToken::new();
        let result = run_simulation(&jobs_file, probe.as_ref(), &working_dir, &cancel)
            .with_context(|| format!("simulating '{}'", jobs_file.display()))?;

        write_outputs(&working_dir, [&result])?;
        if let Some(output) = output {
            let analysis = SystematicAnalysis::new(vec![result.clone()]);
            write_export(output, &SystematicExport::new("simulation", &analysis))?;
        }
        println!("Simulation {}: {}", result.scenario_id, result.status);
        Ok(())
    })();

    if let Some(output) = output {
        let params = vec![
            ("jobs_file".to_string(), display(jobs_file)),
            ("directory".to_string(), display(directory)),
            ("simulator".to_string(), simulator.simulator.clone()),
        ];
        record_run_timed(output, "simulate", &params, start, &res);
    }
    res
}
