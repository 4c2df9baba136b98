use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Declarative description of one calculation run.
///
/// A descriptor may declare any combination of the three blocks; each
/// calculation kind only reads the block it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculationDescriptor {
    /// Scenario list for a systematic analysis
    #[serde(default)]
    pub scenarios: Option<ScenarioList>,
    #[serde(default)]
    pub margin_calculation: Option<MarginCalculationSpec>,
    #[serde(default)]
    pub critical_time_calculation: Option<CriticalTimeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioList {
    /// Base jobs file every scenario of the list runs against
    pub jobs_file: String,
    #[serde(default)]
    pub scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioEntry {
    pub id: String,
    /// Dynamic models describing the contingency
    pub dyd_file: Option<String>,
    pub criteria_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginCalculationType {
    /// One margin shared by the load increase and every scenario
    #[default]
    GlobalMargin,
    /// One margin per scenario
    LocalMargin,
}

impl MarginCalculationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginCalculationType::GlobalMargin => "GLOBAL_MARGIN",
            MarginCalculationType::LocalMargin => "LOCAL_MARGIN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadIncreaseSpec {
    pub id: String,
    pub jobs_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginCalculationSpec {
    #[serde(default)]
    pub calculation_type: MarginCalculationType,
    /// Step between two load levels, in percent
    #[serde(default = "default_margin_accuracy")]
    pub accuracy: u32,
    pub load_increase: LoadIncreaseSpec,
    pub scenarios: Option<ScenarioList>,
}

fn default_margin_accuracy() -> u32 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriticalTimeMode {
    /// Every failure bisects
    #[default]
    Simple,
    /// A divergence skips the unstable region by one accuracy step
    Complex,
}

impl CriticalTimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriticalTimeMode::Simple => "SIMPLE",
            CriticalTimeMode::Complex => "COMPLEX",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalTimeSpec {
    #[serde(default = "default_critical_time_accuracy")]
    pub accuracy: f64,
    #[serde(default)]
    pub mode: CriticalTimeMode,
    /// Dynamic model carrying the event time parameter
    pub dyd_id: String,
    /// Name of the event time parameter on that model
    pub end_par: String,
    pub min_value: f64,
    pub max_value: f64,
    pub scenarios: Option<ScenarioList>,
}

fn default_critical_time_accuracy() -> f64 {
    0.001
}

pub fn load_descriptor_from_path(path: &Path) -> Result<CalculationDescriptor> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading calculation descriptor '{}'", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing calculation descriptor yaml")
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing calculation descriptor json")
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .context("parsing calculation descriptor"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    const MARGIN_YAML: &str = r#"
margin_calculation:
  calculation_type: LOCAL_MARGIN
  load_increase:
    id: loadIncrease
    jobs_file: li.jobs
  scenarios:
    jobs_file: base.jobs
    scenarios:
      - id: s1
        dyd_file: s1.dyd
      - id: s2
"#;

    #[test]
    fn yaml_descriptor_applies_defaults() {
        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(MARGIN_YAML.as_bytes()).unwrap();
        let descriptor = load_descriptor_from_path(file.path()).unwrap();
        let margin = descriptor.margin_calculation.unwrap();
        assert_eq!(margin.calculation_type, MarginCalculationType::LocalMargin);
        assert_eq!(margin.accuracy, 5);
        let scenarios = margin.scenarios.unwrap();
        assert_eq!(scenarios.scenarios.len(), 2);
        assert!(scenarios.scenarios[1].dyd_file.is_none());
        assert!(descriptor.critical_time_calculation.is_none());
    }

    #[test]
    fn json_descriptor_is_detected_by_extension() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"critical_time_calculation": {{"accuracy": 0.01, "mode": "COMPLEX",
                "dyd_id": "FAULT", "end_par": "tEnd", "min_value": 1.0, "max_value": 2.0}}}}"#
        )
        .unwrap();
        let descriptor = load_descriptor_from_path(file.path()).unwrap();
        let ct = descriptor.critical_time_calculation.unwrap();
        assert_eq!(ct.mode, CriticalTimeMode::Complex);
        assert_eq!(ct.end_par, "tEnd");
        assert!(ct.scenarios.is_none());
    }

    #[test]
    fn unknown_extension_falls_back() {
        let mut file = Builder::new().suffix(".desc").tempfile().unwrap();
        file.write_all(MARGIN_YAML.as_bytes()).unwrap();
        assert!(load_descriptor_from_path(file.path())
            .unwrap()
            .margin_calculation
            .is_some());
    }
}
