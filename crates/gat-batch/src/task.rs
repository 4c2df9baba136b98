use gat_core::SimulationStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Atomic unit of schedulable work in a margin calculation.
///
/// `scenario == None` is the load-increase probe at `var_id`; `Some(s)` is
/// scenario `s` run from the load-increase state at the same level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub var_id: usize,
    pub scenario: Option<usize>,
}

impl TaskId {
    pub fn load_increase(var_id: usize) -> Self {
        TaskId {
            var_id,
            scenario: None,
        }
    }

    pub fn scenario(var_id: usize, scenario: usize) -> Self {
        TaskId {
            var_id,
            scenario: Some(scenario),
        }
    }

    pub fn is_load_increase(&self) -> bool {
        self.scenario.is_none()
    }

    /// Column of the work table: 0 for the load increase, `s + 1` for scenario `s`.
    pub fn slot(&self) -> usize {
        self.scenario.map_or(0, |s| s + 1)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scenario {
            None => write!(f, "load-increase@{}", self.var_id),
            Some(s) => write!(f, "scenario-{}@{}", s, self.var_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Finished {
        success: bool,
        status: SimulationStatus,
    },
    /// Cancelled before completion; the task may be issued again
    Aborted,
}

/// Message a worker sends back to the coordinator after each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub worker: usize,
    pub task: TaskId,
    pub outcome: TaskOutcome,
}

/// Message the coordinator sends to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMessage {
    Run(TaskId),
    Terminate,
}
