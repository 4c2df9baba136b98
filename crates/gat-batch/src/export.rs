//! JSON documents summarising a finished (or interrupted) calculation.

use crate::margin::{MarginReport, ScenarioMargin};
use crate::systematic::SystematicAnalysis;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gat_core::{
    CriticalTimeResult, FailingCriterion, LoadIncreaseResult, SimulationResult, SimulationStatus,
};
use gat_scenarios::MarginCalculationType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const TIMELINE_DIR: &str = "timeLine";
pub const CONSTRAINTS_DIR: &str = "constraints";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioExport {
    pub id: String,
    pub status: SimulationStatus,
    pub failing_criteria: Vec<FailingCriterion>,
}

impl From<&SimulationResult> for ScenarioExport {
    fn from(result: &SimulationResult) -> Self {
        ScenarioExport {
            id: result.scenario_id.clone(),
            status: result.status,
            failing_criteria: result.failing_criteria.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadLevelExport {
    pub load_level: f64,
    pub status: SimulationStatus,
    pub scenarios: Vec<ScenarioExport>,
}

impl From<&LoadIncreaseResult> for LoadLevelExport {
    fn from(result: &LoadIncreaseResult) -> Self {
        LoadLevelExport {
            load_level: result.load_level,
            status: result.status(),
            scenarios: result.scenarios.iter().map(ScenarioExport::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystematicExport {
    pub created_at: DateTime<Utc>,
    pub calculation: String,
    pub status: SimulationStatus,
    pub scenarios: Vec<ScenarioExport>,
}

impl SystematicExport {
    pub fn new(calculation: &str, analysis: &SystematicAnalysis) -> Self {
        SystematicExport {
            created_at: Utc::now(),
            calculation: calculation.to_string(),
            status: analysis.status,
            scenarios: analysis.results.iter().map(ScenarioExport::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarginExport {
    pub created_at: DateTime<Utc>,
    pub calculation: String,
    pub calculation_type: MarginCalculationType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub global_margin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub load_increase_margin: Option<f64>,
    pub local_margins: Vec<ScenarioMargin>,
    pub load_increase_results: Vec<LoadLevelExport>,
}

impl MarginExport {
    pub fn new(report: &MarginReport) -> Self {
        MarginExport {
            created_at: Utc::now(),
            calculation: "margin".to_string(),
            calculation_type: report.calculation_type,
            global_margin: report.global_margin,
            load_increase_margin: report.load_increase_margin,
            local_margins: report.local_margins.clone(),
            load_increase_results: report
                .load_increase_results
                .iter()
                .map(LoadLevelExport::from)
                .collect(),
        }
    }

    /// A single load-increase run outside any margin search.
    pub fn load_variation(result: &LoadIncreaseResult) -> Self {
        MarginExport {
            created_at: Utc::now(),
            calculation: "load_variation".to_string(),
            calculation_type: MarginCalculationType::GlobalMargin,
            global_margin: None,
            load_increase_margin: result.success().then_some(result.load_level),
            local_margins: Vec::new(),
            load_increase_results: vec![LoadLevelExport::from(result)],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CriticalTimeExport {
    pub created_at: DateTime<Utc>,
    pub calculation: String,
    pub results: Vec<CriticalTimeResult>,
}

impl CriticalTimeExport {
    pub fn new(results: &[CriticalTimeResult]) -> Self {
        CriticalTimeExport {
            created_at: Utc::now(),
            calculation: "critical_time".to_string(),
            results: results.to_vec(),
        }
    }
}

/// Writes any serializable export as pretty JSON, creating parent directories.
pub fn write_export<T: Serialize>(path: &Path, export: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating export directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(export).context("serializing results to JSON")?;
    fs::write(path, json).with_context(|| format!("writing results '{}'", path.display()))?;
    Ok(())
}

/// Copies the non-empty timeline and constraint streams of `results` into
/// `timeLine/` and `constraints/` under `working_dir`.
pub fn write_outputs<'a>(
    working_dir: &Path,
    results: impl IntoIterator<Item = &'a SimulationResult>,
) -> Result<()> {
    for result in results {
        let unique_id = result.unique_scenario_id();
        let streams = [
            (TIMELINE_DIR, "timeline", &result.timeline),
            (CONSTRAINTS_DIR, "constraints", &result.constraints),
        ];
        for (dir, prefix, content) in streams {
            if content.is_empty() {
                continue;
            }
            let dir = working_dir.join(dir);
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating output directory '{}'", dir.display()))?;
            let path = dir.join(format!("{prefix}_{unique_id}.log"));
            fs::write(&path, content)
                .with_context(|| format!("writing '{}'", path.display()))?;
        }
    }
    Ok(())
}

/// Every probe result held by a margin report: load increases first, then scenarios.
pub fn margin_outputs(report: &MarginReport) -> impl Iterator<Item = &SimulationResult> {
    report
        .load_increase_results
        .iter()
        .flat_map(|level| std::iter::once(&level.load_increase).chain(level.scenarios.iter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn failed(id: &str) -> SimulationResult {
        let mut result = SimulationResult::new(id);
        result.set_outcome(SimulationStatus::CriteriaNonRespected);
        result.failing_criteria.push(FailingCriterion {
            time: 12.5,
            id: "voltage".into(),
        });
        result
    }

    #[test]
    fn systematic_export_carries_the_worst_status() {
        let mut ok = SimulationResult::new("ok");
        ok.set_outcome(SimulationStatus::Convergence);
        let analysis = SystematicAnalysis::new(vec![ok, failed("bad")]);

        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out/results.json");
        write_export(&path, &SystematicExport::new("systematic", &analysis)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["calculation"], "systematic");
        assert_eq!(json["status"], "CRITERIA_NON_RESPECTED");
        assert_eq!(json["scenarios"][1]["failing_criteria"][0]["id"], "voltage");
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn local_margin_export_omits_the_global_margin() {
        let report = MarginReport {
            calculation_type: MarginCalculationType::LocalMargin,
            load_increase_id: "li".into(),
            load_increase_margin: Some(100.0),
            global_margin: None,
            local_margins: vec![ScenarioMargin {
                id: "A".into(),
                margin: Some(50.0),
            }],
            load_increase_results: vec![LoadIncreaseResult::new(100.0, "li", &[])],
        };
        let json = serde_json::to_value(MarginExport::new(&report)).unwrap();
        assert!(json.get("global_margin").is_none());
        assert_eq!(json["load_increase_margin"], 100.0);
        assert_eq!(json["calculation_type"], "LOCAL_MARGIN");
        assert_eq!(json["local_margins"][0]["margin"], 50.0);
        assert_eq!(json["load_increase_results"][0]["load_level"], 100.0);
    }

    #[test]
    fn streams_land_in_their_directories() {
        let mut result = failed("s1").with_variation(40.0);
        result.timeline = "0 | start\n".into();
        let quiet = SimulationResult::new("s2");

        let tmp = tempdir().unwrap();
        write_outputs(tmp.path(), [&result, &quiet]).unwrap();

        let timeline = tmp.path().join("timeLine/timeline_s1-40.log");
        assert_eq!(fs::read_to_string(timeline).unwrap(), "0 | start\n");
        assert!(!tmp.path().join("constraints").exists());
        assert!(!tmp.path().join("timeLine/timeline_s2.log").exists());
    }
}
