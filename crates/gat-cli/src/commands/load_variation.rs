use std::time::Instant;

use anyhow::Result;
use gat_batch::{run_load_variation, write_export, write_outputs, CancellationToken, MarginExport};
use gat_cli::RunArgs;
use gat_scenarios::{load_descriptor_from_path, margin_calculation, working_directory};

use crate::commands::telemetry::record_run_timed;
use crate::commands::util::{build_probe, display};

pub fn handle(run: &RunArgs, variation: f64) -> Result<()> {
    let start = Instant::now();
    let res = (|| -> Result<()> {
        let working_dir = working_directory(&run.directory)?;
        let descriptor = load_descriptor_from_path(&run.input)?;
        let calculation = margin_calculation(&descriptor, &working_dir)?;
        let probe = build_probe(&run.simulator)?;

        let result = run_load_variation(
            &calculation.load_increase,
            variation,
            probe.as_ref(),
            &working_dir,
            &CancellationToken::new(),
        )?;
        write_export(&run.output, &MarginExport::load_variation(&result))?;
        write_outputs(&working_dir, [&result.load_increase])?;
        println!(
            "Load variation {}% of {}: {}",
            variation, calculation.load_increase.id, result.load_increase.status
        );
        Ok(())
    })();

    let params = vec![
        ("input".to_string(), display(&run.input)),
        ("directory".to_string(), display(&run.directory)),
        ("variation".to_string(), variation.to_string()),
        ("simulator".to_string(), run.simulator.simulator.clone()),
    ];
    record_run_timed(&run.output, "load-variation", &params, start, &res);
    res
}
