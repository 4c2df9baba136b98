//! Critical-time calculation: per scenario, the latest event time at which
//! the simulation still succeeds, found by bisection over `[min, max]`.

use crate::context::{for_each, WorkDistributionContext};
use crate::probe::{execute_probe, ProbeKind, ProbeRequest, ProbeRun, SimulationProbe};
use crate::store::{
    clear_result, import_critical_time_result, save_critical_time_result, ProbeCache,
};
use gat_core::{
    round_to_accuracy, CriticalTimeResult, GatError, GatResult, SimulationStatus, DOUBLE_EPSILON,
};
use gat_scenarios::{CriticalTimeCalculation, CriticalTimeMode};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeVerdict {
    pub success: bool,
    pub status: SimulationStatus,
}

impl ProbeVerdict {
    pub fn success() -> Self {
        ProbeVerdict {
            success: true,
            status: SimulationStatus::Convergence,
        }
    }

    pub fn failure(status: SimulationStatus) -> Self {
        ProbeVerdict {
            success: false,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BisectionOutcome {
    pub status: SimulationStatus,
    pub critical_time: Option<f64>,
    /// Number of distinct probes actually run
    pub probes: usize,
}

/// Binary search of the success/failure threshold of a monotonic probe.
#[derive(Debug)]
pub struct BisectionSearch {
    max_value: f64,
    accuracy: f64,
    mode: CriticalTimeMode,
    lowest_failed: f64,
    highest_success: f64,
    cache: ProbeCache<ProbeVerdict>,
    nb_success: usize,
    nb_failures: usize,
}

impl BisectionSearch {
    pub fn new(
        min_value: f64,
        max_value: f64,
        accuracy: f64,
        mode: CriticalTimeMode,
    ) -> GatResult<Self> {
        if !(accuracy > 0.0 && accuracy <= 1.0) {
            return Err(GatError::IncoherentCriticalTimeAccuracy(accuracy));
        }
        if max_value - min_value <= 2.0 * accuracy {
            return Err(GatError::IncoherentMinMax {
                min: min_value,
                max: max_value,
                accuracy,
            });
        }
        Ok(BisectionSearch {
            max_value,
            accuracy,
            mode,
            lowest_failed: max_value,
            highest_success: min_value,
            cache: ProbeCache::new(),
            nb_success: 0,
            nb_failures: 0,
        })
    }

    fn round(&self, value: f64) -> f64 {
        round_to_accuracy(value, self.accuracy)
    }

    fn gap(&self) -> f64 {
        self.round(self.lowest_failed) - self.round(self.highest_success)
    }

    fn midpoint(&self) -> f64 {
        self.highest_success + (self.lowest_failed - self.highest_success) / 2.0
    }

    /// Runs the search. `probe` is called at most once per rounded time.
    pub fn run<F>(&mut self, mut probe: F) -> GatResult<BisectionOutcome>
    where
        F: FnMut(f64) -> GatResult<ProbeVerdict>,
    {
        let mut next = self.max_value;
        let mut first = true;

        while self.gap() - self.accuracy > DOUBLE_EPSILON {
            let t = self.round(next);
            let verdict = match self.cache.get(t) {
                Some(verdict) => {
                    debug!(t, "reusing cached probe");
                    *verdict
                }
                None => {
                    let verdict = probe(t)?;
                    self.cache.insert(t, verdict);
                    if verdict.success {
                        self.nb_success += 1;
                    } else {
                        self.nb_failures += 1;
                    }
                    verdict
                }
            };
            let previous = (self.highest_success, self.lowest_failed);

            if verdict.success {
                self.highest_success = t;
                if first {
                    break;
                }
                next = self.midpoint();
            } else {
                self.lowest_failed = t;
                if self.mode == CriticalTimeMode::Complex
                    && verdict.status == SimulationStatus::Divergence
                {
                    next = self.lowest_failed - self.accuracy;
                    if next < self.highest_success {
                        break;
                    }
                } else {
                    next = self.midpoint();
                }
            }
            first = false;

            if previous == (self.highest_success, self.lowest_failed)
                && self.cache.get(self.round(next)).is_some()
            {
                debug!(t, "bisection stalled on cached bounds");
                break;
            }
        }

        Ok(self.outcome())
    }

    fn outcome(&self) -> BisectionOutcome {
        let probes = self.nb_success + self.nb_failures;
        let (status, critical_time) = if self.nb_success == 0 {
            (SimulationStatus::CtBelowMinBound, None)
        } else if probes == 1 {
            (
                SimulationStatus::CtAboveMaxBound,
                Some(self.round(self.max_value)),
            )
        } else {
            (
                SimulationStatus::ResultFound,
                Some(self.round(self.highest_success)),
            )
        };
        BisectionOutcome {
            status,
            critical_time,
            probes,
        }
    }
}

/// Runs one [`BisectionSearch`] per scenario, spread over the ranks.
pub struct CriticalTimeLauncher {
    calculation: CriticalTimeCalculation,
    probe: Arc<dyn SimulationProbe>,
    working_dir: PathBuf,
}

impl CriticalTimeLauncher {
    pub fn new(
        calculation: CriticalTimeCalculation,
        probe: Arc<dyn SimulationProbe>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        CriticalTimeLauncher {
            calculation,
            probe,
            working_dir: working_dir.into(),
        }
    }

    fn scenario_dir(&self, index: usize) -> PathBuf {
        self.working_dir
            .join(&self.calculation.scenarios.scenarios[index].id)
    }

    fn compute(&self, index: usize, ctx: &dyn WorkDistributionContext) -> GatResult<CriticalTimeResult> {
        let calc = &self.calculation;
        let scenario = &calc.scenarios.scenarios[index];
        let base = ProbeRequest::for_scenario(
            ProbeKind::CriticalTime,
            &calc.scenarios.jobs_file,
            scenario,
            self.scenario_dir(index),
        );
        if !self.probe.has_model(&base, &calc.dyd_id)? {
            return Err(GatError::DydIdNotFound {
                id: calc.dyd_id.clone(),
                file: base.model_file().to_path_buf(),
            });
        }

        let token = ctx.cancellation_token();
        let mut search =
            BisectionSearch::new(calc.min_value, calc.max_value, calc.accuracy, calc.mode)?;
        let outcome = search.run(|t| {
            let request = base
                .clone()
                .with_variation(t)
                .with_override(&calc.dyd_id, &calc.end_par, t);
            let verdict = match execute_probe(self.probe.as_ref(), &request, &token) {
                ProbeRun::Completed(result) if result.success => ProbeVerdict::success(),
                ProbeRun::Completed(result) => ProbeVerdict::failure(result.status),
                ProbeRun::Interrupted => ProbeVerdict::failure(SimulationStatus::ExecutionProblem),
            };
            info!(scenario = %scenario.id, t, status = %verdict.status, "critical time probe");
            Ok(verdict)
        })?;

        info!(
            scenario = %scenario.id,
            status = %outcome.status,
            critical_time = ?outcome.critical_time,
            probes = outcome.probes,
            "critical time search done"
        );
        Ok(CriticalTimeResult {
            id: scenario.id.clone(),
            status: outcome.status,
            critical_time: outcome.critical_time,
        })
    }

    /// Every rank searches its share of scenarios and persists the results;
    /// the coordinator then imports all of them. Workers return an empty list.
    pub fn launch(&self, ctx: &dyn WorkDistributionContext) -> GatResult<Vec<CriticalTimeResult>> {
        let count = self.calculation.scenarios.len();
        let local = for_each(ctx, 0, count, |index| clear_result(&self.scenario_dir(index)))
            .and_then(|()| {
                for_each(ctx, 0, count, |index| {
                    let result = self.compute(index, ctx)?;
                    save_critical_time_result(&self.scenario_dir(index), &result)
                })
            });
        ctx.barrier();
        local?;

        if !ctx.is_coordinator() {
            return Ok(Vec::new());
        }
        (0..count)
            .map(|index| import_critical_time_result(&self.scenario_dir(index)))
            .collect()
    }

    /// Results persisted by the latest launch, skipping scenarios that have none yet.
    pub fn collect_available(&self) -> Vec<CriticalTimeResult> {
        (0..self.calculation.scenarios.len())
            .filter_map(|index| import_critical_time_result(&self.scenario_dir(index)).ok())
            .collect()
    }
}
