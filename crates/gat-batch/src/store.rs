//! Probe deduplication and the on-disk result exchange between ranks.
//!
//! Each finished probe is written to its own directory as a `result.txt`
//! file of `key:value` lines, plus its diagnostic streams as sibling files.
//! Writers never share a directory, so a whole-file atomic rename is all
//! the synchronization needed.

use gat_core::{
    ApproxKey, CriticalTimeResult, FailingCriterion, GatError, GatResult, SimulationResult,
    SimulationStatus,
};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const RESULT_FILE: &str = "result.txt";
pub const TIMELINE_LOG: &str = "timeline.log";
pub const CONSTRAINTS_LOG: &str = "constraints.log";
pub const FINAL_STATE_LOG: &str = "final_state.log";

/// In-memory cache of probe outcomes keyed by knob value.
#[derive(Debug, Clone)]
pub struct ProbeCache<V> {
    entries: BTreeMap<ApproxKey, V>,
}

impl<V> Default for ProbeCache<V> {
    fn default() -> Self {
        ProbeCache {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> ProbeCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, value: f64) -> Option<&V> {
        self.entries.get(&ApproxKey(value))
    }

    pub fn insert(&mut self, value: f64, outcome: V) {
        self.entries.insert(ApproxKey(value), outcome);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &V)> {
        self.entries.iter().map(|(key, value)| (key.0, value))
    }
}

/// Directory of one margin task: `<root>/step-<variation>/<id>`.
pub fn margin_task_dir(root: &Path, variation: f64, id: &str) -> PathBuf {
    root.join(format!("step-{variation}")).join(id)
}

/// Final state of the load increase at `variation`, the starting point of scenarios at that level.
pub fn load_increase_final_state(root: &Path, variation: f64) -> PathBuf {
    root.join(format!("loadIncreaseFinalState-{variation}.dmp"))
}

fn write_atomic(path: &Path, contents: &str) -> GatResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> GatResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn write_stream(dir: &Path, name: &str, contents: &str) -> GatResult<()> {
    let path = dir.join(name);
    if contents.is_empty() {
        return remove_if_present(&path);
    }
    write_atomic(&path, contents)
}

/// Removes whatever an earlier run persisted in `dir`.
pub fn clear_result(dir: &Path) -> GatResult<()> {
    for name in [RESULT_FILE, TIMELINE_LOG, CONSTRAINTS_LOG, FINAL_STATE_LOG] {
        remove_if_present(&dir.join(name))?;
    }
    Ok(())
}

fn read_stream(dir: &Path, name: &str) -> GatResult<String> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(fs::read_to_string(path)?)
    } else {
        Ok(String::new())
    }
}

fn parse_status(value: &str) -> GatResult<SimulationStatus> {
    let code: u32 = value
        .trim()
        .parse()
        .map_err(|_| GatError::Parse(format!("invalid status code '{value}'")))?;
    SimulationStatus::from_code(code)
        .ok_or_else(|| GatError::Parse(format!("unknown status code {code}")))
}

fn parse_f64(key: &str, value: &str) -> GatResult<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| GatError::Parse(format!("invalid {key} '{value}'")))
}

fn read_lines(dir: &Path) -> GatResult<Vec<(String, String)>> {
    let path = dir.join(RESULT_FILE);
    if !path.is_file() {
        return Err(GatError::FileDoesNotExist(path));
    }
    let text = fs::read_to_string(&path)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_once(':')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| {
                    GatError::Parse(format!("malformed line '{line}' in {}", path.display()))
                })
        })
        .collect()
}

/// Persists a finished probe in `dir`.
pub fn save_result(dir: &Path, result: &SimulationResult) -> GatResult<()> {
    fs::create_dir_all(dir)?;
    let mut text = format!("scenarioId:{}\n", result.scenario_id);
    if let Some(variation) = result.variation {
        text.push_str(&format!("variation:{variation}\n"));
    }
    text.push_str(&format!("success:{}\n", result.success));
    text.push_str(&format!("status:{}\n", result.status.code()));
    for criterion in &result.failing_criteria {
        text.push_str(&format!(
            "failingCriterion:{}:{}\n",
            criterion.time, criterion.id
        ));
    }
    write_stream(dir, TIMELINE_LOG, &result.timeline)?;
    write_stream(dir, CONSTRAINTS_LOG, &result.constraints)?;
    write_stream(dir, FINAL_STATE_LOG, &result.final_state)?;
    write_atomic(&dir.join(RESULT_FILE), &text)
}

/// Rebuilds a [`SimulationResult`] written by [`save_result`].
pub fn import_result(dir: &Path) -> GatResult<SimulationResult> {
    let mut result = SimulationResult::default();
    for (key, value) in read_lines(dir)? {
        match key.as_str() {
            "scenarioId" => result.scenario_id = value,
            "variation" => result.variation = Some(parse_f64("variation", &value)?),
            "success" => result.success = value.trim() == "true",
            "status" => result.status = parse_status(&value)?,
            "failingCriterion" => {
                let (time, id) = value.split_once(':').ok_or_else(|| {
                    GatError::Parse(format!("malformed failing criterion '{value}'"))
                })?;
                result.failing_criteria.push(FailingCriterion {
                    time: parse_f64("failing criterion time", time)?,
                    id: id.to_string(),
                });
            }
            _ => {}
        }
    }
    result.timeline = read_stream(dir, TIMELINE_LOG)?;
    result.constraints = read_stream(dir, CONSTRAINTS_LOG)?;
    result.final_state = read_stream(dir, FINAL_STATE_LOG)?;
    Ok(result)
}

pub fn save_critical_time_result(dir: &Path, result: &CriticalTimeResult) -> GatResult<()> {
    fs::create_dir_all(dir)?;
    let mut text = format!("scenarioId:{}\n", result.id);
    if let Some(time) = result.critical_time {
        text.push_str(&format!("criticalTime:{time}\n"));
    }
    text.push_str(&format!("calculationStatus:{}\n", result.status.code()));
    write_atomic(&dir.join(RESULT_FILE), &text)
}

pub fn import_critical_time_result(dir: &Path) -> GatResult<CriticalTimeResult> {
    let mut result = CriticalTimeResult::new("");
    for (key, value) in read_lines(dir)? {
        match key.as_str() {
            "scenarioId" => result.id = value,
            "criticalTime" => result.critical_time = Some(parse_f64("critical time", &value)?),
            "calculationStatus" => result.status = parse_status(&value)?,
            _ => {}
        }
    }
    Ok(result)
}
