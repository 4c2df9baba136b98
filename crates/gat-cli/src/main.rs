use clap::Parser;
use gat_cli::cli::{Cli, Commands};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

use crate::commands::{critical_time, load_variation, margin, simulate, systematic};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }

    let result = match &cli.command {
        Commands::Margin { run } => margin::handle(run),
        Commands::CriticalTime { run } => critical_time::handle(run),
        Commands::Systematic { run } => systematic::handle(run),
        Commands::LoadVariation { run, variation } => load_variation::handle(run, *variation),
        Commands::Simulate {
            jobs_file,
            directory,
            output,
            simulator,
        } => simulate::handle(jobs_file, directory, output.as_deref(), simulator),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{} failed: {:?}", command_name(&cli.command), e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Margin { .. } => "margin calculation",
        Commands::CriticalTime { .. } => "critical time calculation",
        Commands::Systematic { .. } => "systematic analysis",
        Commands::LoadVariation { .. } => "load variation",
        Commands::Simulate { .. } => "simulation",
    }
}
