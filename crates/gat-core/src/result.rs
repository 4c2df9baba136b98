use serde::{Deserialize, Serialize};

use crate::SimulationStatus;

/// A criterion that was violated during a simulation, with the time it first failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingCriterion {
    pub time: f64,
    pub id: String,
}

/// Outcome of one probe.
///
/// A fresh result is a failure with [`SimulationStatus::ExecutionProblem`]
/// so that a probe that never reports back is never mistaken for a success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub scenario_id: String,
    /// Load level (percent) or knob value the probe ran at, if any
    pub variation: Option<f64>,
    pub success: bool,
    pub status: SimulationStatus,
    #[serde(default)]
    pub failing_criteria: Vec<FailingCriterion>,
    #[serde(skip)]
    pub timeline: String,
    #[serde(skip)]
    pub constraints: String,
    #[serde(skip)]
    pub final_state: String,
}

impl Default for SimulationResult {
    fn default() -> Self {
        SimulationResult {
            scenario_id: String::new(),
            variation: None,
            success: false,
            status: SimulationStatus::ExecutionProblem,
            failing_criteria: Vec::new(),
            timeline: String::new(),
            constraints: String::new(),
            final_state: String::new(),
        }
    }
}

impl SimulationResult {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        SimulationResult {
            scenario_id: scenario_id.into(),
            ..Self::default()
        }
    }

    pub fn with_variation(mut self, variation: f64) -> Self {
        self.variation = Some(variation);
        self
    }

    /// Scenario id suffixed with the variation, used to name per-probe output files.
    pub fn unique_scenario_id(&self) -> String {
        match self.variation {
            Some(variation) if variation >= 0.0 => format!("{}-{}", self.scenario_id, variation),
            _ => self.scenario_id.clone(),
        }
    }

    /// Records a probe outcome; success is derived from the status.
    pub fn set_outcome(&mut self, status: SimulationStatus) {
        self.status = status;
        self.success = status == SimulationStatus::Convergence;
    }
}

/// One load-increase probe together with the scenarios run at the same level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadIncreaseResult {
    pub load_level: f64,
    pub load_increase: SimulationResult,
    pub scenarios: Vec<SimulationResult>,
}

impl LoadIncreaseResult {
    pub fn new(load_level: f64, load_increase_id: &str, scenario_ids: &[String]) -> Self {
        LoadIncreaseResult {
            load_level,
            load_increase: SimulationResult::new(load_increase_id).with_variation(load_level),
            scenarios: scenario_ids
                .iter()
                .map(|id| SimulationResult::new(id.as_str()).with_variation(load_level))
                .collect(),
        }
    }

    pub fn status(&self) -> SimulationStatus {
        self.load_increase.status
    }

    pub fn success(&self) -> bool {
        self.load_increase.success
    }
}

/// Outcome of a critical-time search on one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalTimeResult {
    pub id: String,
    pub status: SimulationStatus,
    pub critical_time: Option<f64>,
}

impl CriticalTimeResult {
    pub fn new(id: impl Into<String>) -> Self {
        CriticalTimeResult {
            id: id.into(),
            status: SimulationStatus::ExecutionProblem,
            critical_time: None,
        }
    }

    /// Human readable explanation for bound statuses, empty otherwise.
    pub fn message(&self) -> &'static str {
        match self.status {
            SimulationStatus::CtBelowMinBound => {
                "every probe failed: the critical time is below the minimum bound"
            }
            SimulationStatus::CtAboveMaxBound => {
                "the maximum bound succeeded: the critical time is above the maximum bound"
            }
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_result_is_an_execution_problem() {
        let result = SimulationResult::new("s1");
        assert!(!result.success);
        assert_eq!(result.status, SimulationStatus::ExecutionProblem);
        assert_eq!(result.unique_scenario_id(), "s1");
    }

    #[test]
    fn unique_id_carries_the_variation() {
        let result = SimulationResult::new("s1").with_variation(50.0);
        assert_eq!(result.unique_scenario_id(), "s1-50");
        let result = SimulationResult::new("s1").with_variation(12.5);
        assert_eq!(result.unique_scenario_id(), "s1-12.5");
    }

    #[test]
    fn outcome_drives_success() {
        let mut result = SimulationResult::new("s1");
        result.set_outcome(SimulationStatus::Convergence);
        assert!(result.success);
        result.set_outcome(SimulationStatus::CriteriaNonRespected);
        assert!(!result.success);
    }

    #[test]
    fn load_increase_result_tracks_every_scenario() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let li = LoadIncreaseResult::new(20.0, "loadIncrease", &ids);
        assert_eq!(li.scenarios.len(), 2);
        assert_eq!(li.scenarios[1].unique_scenario_id(), "b-20");
        assert!(!li.success());
    }
}
