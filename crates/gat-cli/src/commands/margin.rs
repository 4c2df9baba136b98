use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use gat_batch::export::margin_outputs;
use gat_batch::{
    write_export, write_outputs, MarginCalculationLauncher, MarginExport, MarginReport,
};
use gat_cli::RunArgs;
use gat_core::GatError;
use gat_scenarios::{load_descriptor_from_path, margin_calculation, working_directory};
use tracing::info;

use crate::commands::telemetry::record_run_timed;
use crate::commands::util::{build_probe, display, distribute, resolve_processes};

fn format_margin(margin: Option<f64>) -> String {
    margin.map_or_else(|| "undetermined".to_string(), |m| format!("{m}%"))
}

fn print_margin_summary(report: &MarginReport) {
    println!("Margin calculation ({})", report.calculation_type.as_str());
    println!(
        "  {:<24} {}",
        report.load_increase_id,
        format_margin(report.load_increase_margin)
    );
    if let Some(global) = report.global_margin {
        println!("  {:<24} {}%", "global", global);
    }
    for scenario in &report.local_margins {
        println!("  {:<24} {}", scenario.id, format_margin(scenario.margin));
    }
}

pub fn handle(run: &RunArgs) -> Result<()> {
    let start = Instant::now();
    let mut summary = None;
    let res = (|| -> Result<()> {
        let working_dir = working_directory(&run.directory)?;
        let descriptor = load_descriptor_from_path(&run.input)?;
        let calculation = margin_calculation(&descriptor, &working_dir)?;
        let probe = build_probe(&run.simulator)?;
        let processes = resolve_processes(&run.processes)?;
        info!(
            version = env!("CARGO_PKG_VERSION"),
            processes,
            "margin calculation"
        );

        let report = distribute(processes, |ctx| {
            let mut launcher = MarginCalculationLauncher::new(
                calculation.clone(),
                Arc::clone(&probe),
                &working_dir,
            )?;
            let launched = launcher.launch(ctx);
            if !ctx.is_coordinator() {
                return launched.map(|_| None);
            }
            let report = launcher.report();
            write_export(&run.output, &MarginExport::new(&report)).map_err(GatError::from)?;
            write_outputs(&working_dir, margin_outputs(&report)).map_err(GatError::from)?;
            launched?;
            Ok(Some(report))
        })?;

        if let Some(report) = report {
            print_margin_summary(&report);
            summary = Some(report);
        }
        Ok(())
    })();

    let mut params = vec![
        ("input".to_string(), display(&run.input)),
        ("directory".to_string(), display(&run.directory)),
        ("processes".to_string(), run.processes.clone()),
        ("simulator".to_string(), run.simulator.simulator.clone()),
    ];
    if let Some(report) = summary.as_ref() {
        params.push((
            "calculation_type".to_string(),
            report.calculation_type.as_str().to_string(),
        ));
        if let Some(global) = report.global_margin {
            params.push(("global_margin".to_string(), global.to_string()));
        }
    }
    record_run_timed(&run.output, "margin", &params, start, &res);
    res
}
