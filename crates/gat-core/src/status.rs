//! Simulation and calculation status codes.
//!
//! The integer codes are the ones written to result exchange files and must
//! stay stable across releases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{GatError, GatResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationStatus {
    Convergence,
    Divergence,
    ExecutionProblem,
    CriteriaNonRespected,
    /// Critical-time search converged inside its bounds
    ResultFound,
    /// Every critical-time probe failed, including at the lower bound
    CtBelowMinBound,
    /// The first critical-time probe, at the upper bound, already succeeded
    CtAboveMaxBound,
}

impl SimulationStatus {
    pub const ALL: [SimulationStatus; 7] = [
        SimulationStatus::Convergence,
        SimulationStatus::Divergence,
        SimulationStatus::ExecutionProblem,
        SimulationStatus::CriteriaNonRespected,
        SimulationStatus::ResultFound,
        SimulationStatus::CtBelowMinBound,
        SimulationStatus::CtAboveMaxBound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationStatus::Convergence => "CONVERGENCE",
            SimulationStatus::Divergence => "DIVERGENCE",
            SimulationStatus::ExecutionProblem => "EXECUTION_PROBLEM",
            SimulationStatus::CriteriaNonRespected => "CRITERIA_NON_RESPECTED",
            SimulationStatus::ResultFound => "RESULT_FOUND",
            SimulationStatus::CtBelowMinBound => "CT_BELOW_MIN_BOUND",
            SimulationStatus::CtAboveMaxBound => "CT_ABOVE_MAX_BOUND",
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            SimulationStatus::Convergence => 0,
            SimulationStatus::Divergence => 1,
            SimulationStatus::ExecutionProblem => 2,
            SimulationStatus::CriteriaNonRespected => 3,
            SimulationStatus::ResultFound => 4,
            SimulationStatus::CtBelowMinBound => 5,
            SimulationStatus::CtAboveMaxBound => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| status.code() == code)
    }

    /// Rank used to aggregate a set of statuses into the worst one.
    pub fn severity(&self) -> u8 {
        match self {
            SimulationStatus::Convergence | SimulationStatus::ResultFound => 0,
            SimulationStatus::CtAboveMaxBound | SimulationStatus::CtBelowMinBound => 1,
            SimulationStatus::CriteriaNonRespected => 2,
            SimulationStatus::Divergence => 3,
            SimulationStatus::ExecutionProblem => 4,
        }
    }

    /// Worst status of a collection, `Convergence` when empty.
    pub fn worst<I>(statuses: I) -> SimulationStatus
    where
        I: IntoIterator<Item = SimulationStatus>,
    {
        statuses
            .into_iter()
            .max_by_key(SimulationStatus::severity)
            .unwrap_or(SimulationStatus::Convergence)
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimulationStatus {
    type Err = GatError;

    fn from_str(value: &str) -> GatResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| GatError::Parse(format!("unknown simulation status '{value}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(SimulationStatus::Convergence.code(), 0);
        assert_eq!(SimulationStatus::CriteriaNonRespected.code(), 3);
        assert_eq!(SimulationStatus::CtAboveMaxBound.code(), 6);
        for status in SimulationStatus::ALL {
            assert_eq!(SimulationStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(SimulationStatus::from_code(42), None);
    }

    #[test]
    fn parses_names_case_insensitively() {
        let status: SimulationStatus = "divergence".parse().unwrap();
        assert_eq!(status, SimulationStatus::Divergence);
        assert!("MELTDOWN".parse::<SimulationStatus>().is_err());
    }

    #[test]
    fn worst_prefers_execution_problems() {
        let worst = SimulationStatus::worst([
            SimulationStatus::Convergence,
            SimulationStatus::ExecutionProblem,
            SimulationStatus::Divergence,
        ]);
        assert_eq!(worst, SimulationStatus::ExecutionProblem);
        assert_eq!(
            SimulationStatus::worst(Vec::new()),
            SimulationStatus::Convergence
        );
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&SimulationStatus::CtBelowMinBound).unwrap();
        assert_eq!(json, "\"CT_BELOW_MIN_BOUND\"");
    }
}
