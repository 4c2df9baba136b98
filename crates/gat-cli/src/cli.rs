use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

/// External simulator used for every probe.
#[derive(Args, Debug, Clone)]
pub struct SimulatorArgs {
    /// Simulator executable (a path, a name under ~/.gat/simulators, or a name on PATH)
    #[arg(long, default_value = "dynawo", value_hint = ValueHint::CommandName)]
    pub simulator: String,
    /// Argument passed to the simulator before the probe arguments (repeatable)
    #[arg(long = "simulator-arg", allow_hyphen_values = true)]
    pub simulator_args: Vec<String>,
}

/// Options shared by the calculations driven by a descriptor file.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Calculation descriptor (YAML or JSON)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub input: PathBuf,
    /// Aggregated results (JSON)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: PathBuf,
    /// Working directory; relative descriptor paths are resolved against it
    #[arg(short, long, default_value = ".", value_hint = ValueHint::DirPath)]
    pub directory: PathBuf,
    /// Number of ranks ("auto" = CPU count)
    #[arg(short, long, default_value = "1")]
    pub processes: String,
    #[command(flatten)]
    pub simulator: SimulatorArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Highest load level the load increase and the scenarios withstand
    Margin {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Latest event time each scenario still withstands
    CriticalTime {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run every scenario once at nominal load
    Systematic {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run the margin calculation's load increase at a single level
    LoadVariation {
        #[command(flatten)]
        run: RunArgs,
        /// Load level in percent, in [0, 100]
        #[arg(long)]
        variation: f64,
    },
    /// Run one jobs file as is
    Simulate {
        /// Jobs file to simulate
        #[arg(long, value_hint = ValueHint::FilePath)]
        jobs_file: PathBuf,
        /// Working directory
        #[arg(short, long, default_value = ".", value_hint = ValueHint::DirPath)]
        directory: PathBuf,
        /// Optional results file (JSON)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
        #[command(flatten)]
        simulator: SimulatorArgs,
    },
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli_command().debug_assert();
    }

    #[test]
    fn simulator_args_keep_their_order() {
        let cli = Cli::try_parse_from([
            "gat-cli",
            "margin",
            "--input",
            "calc.yaml",
            "--output",
            "out.json",
            "--simulator",
            "/bin/sh",
            "--simulator-arg",
            "fake.sh",
            "--simulator-arg",
            "-x",
        ])
        .unwrap();
        let Commands::Margin { run } = cli.command else {
            panic!("expected the margin command");
        };
        assert_eq!(run.simulator.simulator_args, vec!["fake.sh", "-x"]);
        assert_eq!(run.processes, "1");
        assert_eq!(run.directory, PathBuf::from("."));
    }
}
