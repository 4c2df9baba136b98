use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub command: String,
    pub version: String,
    pub timestamp: String,
    pub outputs: Vec<String>,
    pub params: Vec<Param>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_ms: Option<u128>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<Param>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

/// How a run ended, recorded alongside its parameters.
#[derive(Debug, Clone)]
pub struct ManifestTelemetry {
    pub status: String,
    pub duration_ms: Option<u128>,
    pub env: Vec<Param>,
    pub correlation_id: Option<String>,
}

/// Writes `run-<uuid>.json` next to `output` and returns its path.
pub fn record_manifest(
    output: &Path,
    command: &str,
    params: &[(&str, &str)],
    telemetry: ManifestTelemetry,
) -> Result<std::path::PathBuf> {
    let run_id = Uuid::new_v4().to_string();
    let dir = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating manifest directory '{}'", dir.display()))?;
    let manifest = ManifestEntry {
        run_id: run_id.clone(),
        command: command.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        outputs: vec![output.display().to_string()],
        params: params
            .iter()
            .map(|(k, v)| Param {
                name: k.to_string(),
                value: v.to_string(),
            })
            .collect(),
        status: telemetry.status,
        duration_ms: telemetry.duration_ms,
        env: telemetry.env,
        correlation_id: telemetry.correlation_id,
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    let path = dir.join(format!("run-{}.json", run_id));
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<ManifestEntry> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading manifest '{}'", path.display()))?;
    let manifest = serde_json::from_str(&json)
        .with_context(|| format!("parsing manifest '{}'", path.display()))?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_lands_next_to_the_output() {
        let tmp = tempdir().unwrap();
        let output = tmp.path().join("results/margin.json");
        let telemetry = ManifestTelemetry {
            status: "failure".into(),
            duration_ms: Some(12),
            env: Vec::new(),
            correlation_id: None,
        };
        let path = record_manifest(&output, "margin", &[("processes", "2")], telemetry).unwrap();

        assert_eq!(path.parent(), output.parent());
        let manifest = read_manifest(&path).unwrap();
        assert_eq!(manifest.command, "margin");
        assert_eq!(manifest.status, "failure");
        assert_eq!(manifest.duration_ms, Some(12));
        assert_eq!(manifest.params[0].name, "processes");
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&format!("run-{}", manifest.run_id)));
    }
}
