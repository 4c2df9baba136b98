use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use gat_batch::{
    write_export, write_outputs, SystematicAnalysis, SystematicAnalysisLauncher, SystematicExport,
};
use gat_cli::RunArgs;
use gat_core::GatError;
use gat_scenarios::{load_descriptor_from_path, systematic_analysis, working_directory};
use tracing::info;

use crate::commands::telemetry::record_run_timed;
use crate::commands::util::{build_probe, display, distribute, resolve_processes};

fn print_analysis(analysis: &SystematicAnalysis) {
    println!("Systematic analysis: {}", analysis.status);
    for result in &analysis.results {
        println!("  {:<24} {}", result.scenario_id, result.status);
        for criterion in &result.failing_criteria {
            println!("    {} at {}", criterion.id, criterion.time);
        }
    }
}

pub fn handle(run: &RunArgs) -> Result<()> {
    let start = Instant::now();
    let mut status = None;
    let res = (|| -> Result<()> {
        let working_dir = working_directory(&run.directory)?;
        let descriptor = load_descriptor_from_path(&run.input)?;
        let scenarios = systematic_analysis(&descriptor, &working_dir)?;
        let probe = build_probe(&run.simulator)?;
        let processes = resolve_processes(&run.processes)?;
        info!(
            version = env!("CARGO_PKG_VERSION"),
            processes,
            "systematic analysis"
        );

        let launcher = SystematicAnalysisLauncher::new(scenarios, Arc::clone(&probe), &working_dir);
        let analysis = distribute(processes, |ctx| {
            let launched = launcher.launch(ctx);
            if !ctx.is_coordinator() {
                return launched;
            }
            let analysis = match &launched {
                Ok(Some(analysis)) => analysis.clone(),
                _ => launcher.collect_available(),
            };
            write_export(&run.output, &SystematicExport::new("systematic", &analysis))
                .map_err(GatError::from)?;
            write_outputs(&working_dir, &analysis.results).map_err(GatError::from)?;
            launched
        })?;

        if let Some(analysis) = analysis {
            print_analysis(&analysis);
            status = Some(analysis.status);
        }
        Ok(())
    })();

    let mut params = vec![
        ("input".to_string(), display(&run.input)),
        ("directory".to_string(), display(&run.directory)),
        ("processes".to_string(), run.processes.clone()),
        ("simulator".to_string(), run.simulator.simulator.clone()),
    ];
    if let Some(status) = status {
        params.push(("status".to_string(), status.to_string()));
    }
    record_run_timed(&run.output, "systematic", &params, start, &res);
    res
}
