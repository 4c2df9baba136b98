use gat_cli::manifest::{record_manifest, ManifestTelemetry, Param};
use std::{env, path::Path, time::Instant};
use tracing::{info, warn};

const TELEMETRY_ENV_KEYS: &[&str] = &["GAT_VARIANT", "GAT_ENV", "GAT_RELEASE_VERSION"];

fn collect_telemetry_env() -> Vec<Param> {
    TELEMETRY_ENV_KEYS
        .iter()
        .filter_map(|key| {
            env::var(key).ok().map(|value| Param {
                name: key.to_string(),
                value,
            })
        })
        .collect()
}

fn correlation_id() -> Option<String> {
    env::var("GAT_CORRELATION_ID").ok()
}

/// Records the run manifest of a command. A manifest that cannot be written
/// only warns: it never changes the outcome of the run.
pub fn record_run_timed(
    out: &Path,
    command: &str,
    params: &[(String, String)],
    start: Instant,
    result: &anyhow::Result<()>,
) {
    let telemetry = ManifestTelemetry {
        status: if result.is_ok() { "success" } else { "failure" }.to_string(),
        duration_ms: Some(start.elapsed().as_millis()),
        env: collect_telemetry_env(),
        correlation_id: correlation_id(),
    };
    let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    match record_manifest(out, command, &params, telemetry) {
        Ok(path) => info!("Recorded run manifest {}", path.display()),
        Err(err) => warn!("Failed to record run manifest: {err:#}"),
    }
}
