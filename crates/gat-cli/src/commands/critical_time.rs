use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use gat_batch::{write_export, CriticalTimeExport, CriticalTimeLauncher};
use gat_cli::RunArgs;
use gat_core::{CriticalTimeResult, GatError};
use gat_scenarios::{critical_time_calculation, load_descriptor_from_path, working_directory};
use tracing::info;

use crate::commands::telemetry::record_run_timed;
use crate::commands::util::{build_probe, display, distribute, resolve_processes};

fn print_critical_times(results: &[CriticalTimeResult]) {
    println!("Critical times");
    for result in results {
        let time = result
            .critical_time
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        println!("  {:<24} {:>12}  {}", result.id, time, result.status);
        if !result.message().is_empty() {
            println!("    {}", result.message());
        }
    }
}

pub fn handle(run: &RunArgs) -> Result<()> {
    let start = Instant::now();
    let mut found = None;
    let res = (|| -> Result<()> {
        let working_dir = working_directory(&run.directory)?;
        let descriptor = load_descriptor_from_path(&run.input)?;
        let calculation = critical_time_calculation(&descriptor, &working_dir)?;
        let probe = build_probe(&run.simulator)?;
        let processes = resolve_processes(&run.processes)?;
        info!(
            version = env!("CARGO_PKG_VERSION"),
            processes,
            mode = calculation.mode.as_str(),
            "critical time calculation"
        );

        let launcher = CriticalTimeLauncher::new(calculation, Arc::clone(&probe), &working_dir);
        let results = distribute(processes, |ctx| {
            let launched = launcher.launch(ctx);
            if !ctx.is_coordinator() {
                return launched.map(|_| Vec::new());
            }
            let results = match &launched {
                Ok(results) => results.clone(),
                Err(_) => launcher.collect_available(),
            };
            write_export(&run.output, &CriticalTimeExport::new(&results))
                .map_err(GatError::from)?;
            launched
        })?;

        print_critical_times(&results);
        found = Some(results.len());
        Ok(())
    })();

    let mut params = vec![
        ("input".to_string(), display(&run.input)),
        ("directory".to_string(), display(&run.directory)),
        ("processes".to_string(), run.processes.clone()),
        ("simulator".to_string(), run.simulator.simulator.clone()),
    ];
    if let Some(count) = found {
        params.push(("scenarios".to_string(), count.to_string()));
    }
    record_run_timed(&run.output, "critical-time", &params, start, &res);
    res
}
