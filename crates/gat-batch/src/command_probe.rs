//! [`SimulationProbe`] backed by an external simulator executable.
//!
//! The simulator is invoked once per probe as
//!
//! ```text
//! <program> [args...] <jobs_file> --working-dir <dir> --kind <kind>
//!     [--scenario <id>] [--variation <v>] [--dyd <file>] [--criteria <file>]
//!     [--initial-state <file>] [--dump-final-state <file>] [--set <model>.<param>=<value>]...
//! ```
//!
//! and reports through its exit code and a few files in the working directory.

use crate::probe::{CancellationToken, ProbeError, ProbeOutput, ProbeRequest, SimulationProbe};
use gat_core::{FailingCriterion, GatError, GatResult, SimulationStatus};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Simulator stdout, kept as the probe timeline
pub const TIMELINE_FILE: &str = "simulator.log";
pub const STDERR_FILE: &str = "simulator.err";
pub const CONSTRAINTS_FILE: &str = "constraints.txt";
pub const FINAL_STATE_FILE: &str = "final_state.txt";
/// One `<time>,<criterion id>` line per violated criterion
pub const FAILING_CRITERIA_FILE: &str = "failing_criteria.txt";

/// Exit codes understood from the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorExit {
    Converged,
    CriteriaNonRespected,
    Diverged,
    /// Any other code, or killed by a signal
    Failed(Option<i32>),
}

impl SimulatorExit {
    pub fn from_raw(code: Option<i32>) -> Self {
        match code {
            Some(0) => SimulatorExit::Converged,
            Some(1) => SimulatorExit::CriteriaNonRespected,
            Some(2) => SimulatorExit::Diverged,
            other => SimulatorExit::Failed(other),
        }
    }

    pub fn status(&self) -> SimulationStatus {
        match self {
            SimulatorExit::Converged => SimulationStatus::Convergence,
            SimulatorExit::CriteriaNonRespected => SimulationStatus::CriteriaNonRespected,
            SimulatorExit::Diverged => SimulationStatus::Divergence,
            SimulatorExit::Failed(_) => SimulationStatus::ExecutionProblem,
        }
    }
}

pub struct CommandProbe {
    program: PathBuf,
    args: Vec<OsString>,
    poll_interval: Duration,
}

impl CommandProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandProbe {
            program: program.into(),
            args: Vec::new(),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Arguments passed before the probe arguments, e.g. a script for an interpreter.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Find the simulator executable.
    ///
    /// Search order:
    /// 1. `name` itself when it is an existing path
    /// 2. ~/.gat/simulators/<name>
    /// 3. System PATH
    pub fn find_binary(name: &str) -> GatResult<PathBuf> {
        let direct = PathBuf::from(name);
        if direct.components().count() > 1 && direct.is_file() {
            return Ok(direct);
        }

        if let Some(home) = dirs::home_dir() {
            let gat_path = home.join(".gat").join("simulators").join(name);
            if gat_path.is_file() {
                return Ok(gat_path);
            }
        }

        if let Ok(path) = which::which(name) {
            return Ok(path);
        }

        Err(GatError::FileDoesNotExist(direct))
    }

    fn arguments(&self, request: &ProbeRequest) -> Vec<OsString> {
        let mut args = self.args.clone();
        args.push(request.jobs_file.clone().into_os_string());
        args.push("--working-dir".into());
        args.push(request.working_dir.clone().into_os_string());
        args.push("--kind".into());
        args.push(request.kind.as_str().into());
        args.push("--scenario".into());
        args.push(request.scenario_id.clone().into());
        if let Some(variation) = request.variation {
            args.push("--variation".into());
            args.push(variation.to_string().into());
        }
        let files = [
            ("--dyd", &request.dyd_file),
            ("--criteria", &request.criteria_file),
            ("--initial-state", &request.initial_state),
            ("--dump-final-state", &request.dump_final_state),
        ];
        for (flag, file) in files {
            if let Some(file) = file {
                args.push(flag.into());
                args.push(file.clone().into_os_string());
            }
        }
        for o in &request.overrides {
            args.push("--set".into());
            args.push(format!("{}.{}={}", o.model_id, o.parameter, o.value).into());
        }
        args
    }
}

fn read_optional(path: &Path) -> Result<String, ProbeError> {
    if path.is_file() {
        Ok(fs::read_to_string(path)?)
    } else {
        Ok(String::new())
    }
}

fn remove_stale(path: &Path) -> Result<(), ProbeError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_failing_criteria(text: &str) -> Vec<FailingCriterion> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let parsed = line.split_once(',').and_then(|(time, id)| {
                time.trim().parse::<f64>().ok().map(|time| FailingCriterion {
                    time,
                    id: id.trim().to_string(),
                })
            });
            if parsed.is_none() {
                warn!(line, "ignoring malformed failing criterion");
            }
            parsed
        })
        .collect()
}

impl SimulationProbe for CommandProbe {
    fn run(
        &self,
        request: &ProbeRequest,
        cancel: &CancellationToken,
    ) -> Result<ProbeOutput, ProbeError> {
        let dir = &request.working_dir;
        fs::create_dir_all(dir)?;
        // Side files are only ever produced by the run about to start.
        for name in [CONSTRAINTS_FILE, FINAL_STATE_FILE, FAILING_CRITERIA_FILE] {
            remove_stale(&dir.join(name))?;
        }
        let stdout = File::create(dir.join(TIMELINE_FILE))?;
        let stderr = File::create(dir.join(STDERR_FILE))?;

        let mut child = Command::new(&self.program)
            .args(self.arguments(request))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|err| {
                ProbeError::Execution(format!("spawning {}: {err}", self.program.display()))
            })?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                debug!(pid = child.id(), "killing interrupted simulator");
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProbeError::Interrupted);
            }
            thread::sleep(self.poll_interval);
        };

        let exit = SimulatorExit::from_raw(status.code());
        if let SimulatorExit::Failed(code) = exit {
            let stderr = read_optional(&dir.join(STDERR_FILE))?;
            warn!(
                scenario = %request.scenario_id,
                code = ?code,
                stderr = %stderr.trim(),
                "simulator failed"
            );
        }

        let mut output = ProbeOutput::new(exit.status());
        output.timeline = read_optional(&dir.join(TIMELINE_FILE))?;
        output.constraints = read_optional(&dir.join(CONSTRAINTS_FILE))?;
        output.final_state = read_optional(&dir.join(FINAL_STATE_FILE))?;
        output.failing_criteria =
            parse_failing_criteria(&read_optional(&dir.join(FAILING_CRITERIA_FILE))?);
        Ok(output)
    }

    fn has_model(&self, request: &ProbeRequest, model_id: &str) -> GatResult<bool> {
        let path = request.model_file();
        if !path.is_file() {
            return Err(GatError::FileDoesNotExist(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Ok(text.contains(&format!("id=\"{model_id}\"")))
    }
}
