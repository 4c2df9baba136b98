//! Turns a raw [`CalculationDescriptor`] into validated calculation inputs.
//!
//! Relative paths are resolved against the working directory and every
//! structural check that must fail before the first probe lives here.

use anyhow::{anyhow, Context, Result};
use gat_core::GatError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::descriptor::{
    CalculationDescriptor, CriticalTimeMode, MarginCalculationType, ScenarioList,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedScenario {
    pub id: String,
    pub dyd_file: Option<PathBuf>,
    pub criteria_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub jobs_file: PathBuf,
    pub scenarios: Vec<ResolvedScenario>,
}

impl ScenarioSet {
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadIncrease {
    pub id: String,
    pub jobs_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginCalculation {
    pub calculation_type: MarginCalculationType,
    pub accuracy: u32,
    pub load_increase: LoadIncrease,
    pub scenarios: ScenarioSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalTimeCalculation {
    pub accuracy: f64,
    pub mode: CriticalTimeMode,
    pub dyd_id: String,
    pub end_par: String,
    pub min_value: f64,
    pub max_value: f64,
    pub scenarios: ScenarioSet,
}

/// Checks that the working directory exists and returns it.
pub fn working_directory(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(GatError::DirectoryDoesNotExist(dir.to_path_buf()).into());
    }
    Ok(dir.to_path_buf())
}

fn resolve_path(working_dir: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

fn existing_file(working_dir: &Path, value: &str) -> Result<PathBuf> {
    let path = resolve_path(working_dir, value);
    if !path.is_file() {
        return Err(GatError::FileDoesNotExist(path).into());
    }
    Ok(path)
}

pub fn resolve_scenarios(list: &ScenarioList, working_dir: &Path) -> Result<ScenarioSet> {
    let jobs_file = existing_file(working_dir, &list.jobs_file)
        .with_context(|| format!("resolving jobs file '{}'", list.jobs_file))?;
    let mut seen = HashSet::new();
    let mut scenarios = Vec::with_capacity(list.scenarios.len());
    for entry in &list.scenarios {
        if entry.id.trim().is_empty() {
            return Err(anyhow!("scenario id cannot be empty"));
        }
        if !seen.insert(entry.id.clone()) {
            return Err(anyhow!("duplicate scenario id '{}' in descriptor", entry.id));
        }
        let dyd_file = entry
            .dyd_file
            .as_deref()
            .map(|f| existing_file(working_dir, f))
            .transpose()
            .with_context(|| format!("resolving dyd file of scenario '{}'", entry.id))?;
        let criteria_file = entry
            .criteria_file
            .as_deref()
            .map(|f| existing_file(working_dir, f))
            .transpose()
            .with_context(|| format!("resolving criteria file of scenario '{}'", entry.id))?;
        scenarios.push(ResolvedScenario {
            id: entry.id.clone(),
            dyd_file,
            criteria_file,
        });
    }
    Ok(ScenarioSet {
        jobs_file,
        scenarios,
    })
}

/// Scenario list of a systematic analysis; it must declare at least one scenario.
pub fn systematic_analysis(
    descriptor: &CalculationDescriptor,
    working_dir: &Path,
) -> Result<ScenarioSet> {
    let list = descriptor
        .scenarios
        .as_ref()
        .ok_or(GatError::ScenariosNotDefined)?;
    let set = resolve_scenarios(list, working_dir)?;
    if set.is_empty() {
        return Err(GatError::ScenariosNotDefined.into());
    }
    Ok(set)
}

/// Margin calculation block. An empty scenario list is accepted: the
/// calculation then only searches the load increase margin.
pub fn margin_calculation(
    descriptor: &CalculationDescriptor,
    working_dir: &Path,
) -> Result<MarginCalculation> {
    let spec = descriptor
        .margin_calculation
        .as_ref()
        .ok_or(GatError::MarginCalculationTaskNotFound)?;
    if spec.accuracy == 0 || spec.accuracy > 100 {
        return Err(GatError::IncoherentAccuracy(spec.accuracy).into());
    }
    let list = spec
        .scenarios
        .as_ref()
        .ok_or(GatError::ScenariosNotDefined)?;
    let scenarios = resolve_scenarios(list, working_dir)?;
    if scenarios.ids().contains(&spec.load_increase.id) {
        return Err(anyhow!(
            "load increase id '{}' collides with a scenario id",
            spec.load_increase.id
        ));
    }
    let jobs_file = existing_file(working_dir, &spec.load_increase.jobs_file)
        .context("resolving load increase jobs file")?;
    Ok(MarginCalculation {
        calculation_type: spec.calculation_type,
        accuracy: spec.accuracy,
        load_increase: LoadIncrease {
            id: spec.load_increase.id.clone(),
            jobs_file,
        },
        scenarios,
    })
}

pub fn critical_time_calculation(
    descriptor: &CalculationDescriptor,
    working_dir: &Path,
) -> Result<CriticalTimeCalculation> {
    let spec = descriptor
        .critical_time_calculation
        .as_ref()
        .ok_or(GatError::CriticalTimeCalculationTaskNotFound)?;
    if !(spec.accuracy > 0.0 && spec.accuracy <= 1.0) {
        return Err(GatError::IncoherentCriticalTimeAccuracy(spec.accuracy).into());
    }
    if spec.max_value - spec.min_value <= 2.0 * spec.accuracy {
        return Err(GatError::IncoherentMinMax {
            min: spec.min_value,
            max: spec.max_value,
            accuracy: spec.accuracy,
        }
        .into());
    }
    let list = spec
        .scenarios
        .as_ref()
        .ok_or(GatError::ScenariosNotDefined)?;
    let scenarios = resolve_scenarios(list, working_dir)?;
    if scenarios.is_empty() {
        return Err(GatError::ScenariosNotDefined.into());
    }
    Ok(CriticalTimeCalculation {
        accuracy: spec.accuracy,
        mode: spec.mode,
        dyd_id: spec.dyd_id.clone(),
        end_par: spec.end_par.clone(),
        min_value: spec.min_value,
        max_value: spec.max_value,
        scenarios,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        CriticalTimeSpec, LoadIncreaseSpec, MarginCalculationSpec, ScenarioEntry,
    };
    use std::fs;
    use tempfile::tempdir;

    fn entry(id: &str, dyd: Option<&str>) -> ScenarioEntry {
        ScenarioEntry {
            id: id.to_string(),
            dyd_file: dyd.map(String::from),
            criteria_file: None,
        }
    }

    fn list(entries: Vec<ScenarioEntry>) -> ScenarioList {
        ScenarioList {
            jobs_file: "base.jobs".to_string(),
            scenarios: entries,
        }
    }

    fn critical_time(accuracy: f64, min: f64, max: f64) -> CalculationDescriptor {
        CalculationDescriptor {
            critical_time_calculation: Some(CriticalTimeSpec {
                accuracy,
                mode: CriticalTimeMode::Simple,
                dyd_id: "FAULT".into(),
                end_par: "tEnd".into(),
                min_value: min,
                max_value: max,
                scenarios: Some(list(vec![entry("s1", None)])),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_paths_against_the_working_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("base.jobs"), "jobs").unwrap();
        fs::write(dir.path().join("s1.dyd"), "<dyd/>").unwrap();
        let set = resolve_scenarios(&list(vec![entry("s1", Some("s1.dyd"))]), dir.path()).unwrap();
        assert_eq!(set.jobs_file, dir.path().join("base.jobs"));
        assert_eq!(set.scenarios[0].dyd_file, Some(dir.path().join("s1.dyd")));
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("base.jobs"), "jobs").unwrap();
        let err = resolve_scenarios(&list(vec![entry("s1", Some("nope.dyd"))]), dir.path())
            .unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<GatError>(),
            Some(GatError::FileDoesNotExist(_))
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("base.jobs"), "jobs").unwrap();
        let err = resolve_scenarios(&list(vec![entry("a", None), entry("a", None)]), dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn margin_requires_its_block_and_scenarios() {
        let dir = tempdir().unwrap();
        let empty = CalculationDescriptor::default();
        let err = margin_calculation(&empty, dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatError>(),
            Some(GatError::MarginCalculationTaskNotFound)
        ));

        let no_scenarios = CalculationDescriptor {
            margin_calculation: Some(MarginCalculationSpec {
                calculation_type: MarginCalculationType::GlobalMargin,
                accuracy: 10,
                load_increase: LoadIncreaseSpec {
                    id: "li".into(),
                    jobs_file: "li.jobs".into(),
                },
                scenarios: None,
            }),
            ..Default::default()
        };
        let err = margin_calculation(&no_scenarios, dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatError>(),
            Some(GatError::ScenariosNotDefined)
        ));
    }

    #[test]
    fn margin_accuracy_is_checked_first() {
        let dir = tempdir().unwrap();
        let descriptor = CalculationDescriptor {
            margin_calculation: Some(MarginCalculationSpec {
                calculation_type: MarginCalculationType::LocalMargin,
                accuracy: 150,
                load_increase: LoadIncreaseSpec {
                    id: "li".into(),
                    jobs_file: "li.jobs".into(),
                },
                scenarios: Some(list(vec![])),
            }),
            ..Default::default()
        };
        let err = margin_calculation(&descriptor, dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatError>(),
            Some(GatError::IncoherentAccuracy(150))
        ));
    }

    #[test]
    fn critical_time_bounds_are_validated() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("base.jobs"), "jobs").unwrap();

        let err = critical_time_calculation(&critical_time(0.0, 0.0, 10.0), dir.path())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatError>(),
            Some(GatError::IncoherentCriticalTimeAccuracy(_))
        ));

        let err = critical_time_calculation(&critical_time(0.5, 1.0, 2.0), dir.path())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GatError>(),
            Some(GatError::IncoherentMinMax { .. })
        ));

        let ok = critical_time_calculation(&critical_time(0.1, 1.0, 2.0), dir.path()).unwrap();
        assert_eq!(ok.scenarios.len(), 1);
    }

    #[test]
    fn working_directory_must_exist() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(working_directory(&missing).is_err());
        assert!(working_directory(dir.path()).is_ok());
    }
}
