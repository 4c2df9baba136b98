//! How many ranks take part in a calculation, which one is running, and how
//! they exchange tasks.
//!
//! Rank 0 is the coordinator. A context is built once by the entry point and
//! handed to the launchers by reference; there is no process-wide instance.

use crate::probe::CancellationToken;
use crate::task::{TaskId, TaskMessage, TaskOutcome, TaskReport};
use crossbeam_channel::{unbounded, Receiver, Sender};
use gat_core::{GatError, GatResult};
use std::sync::{Arc, Barrier};
use std::thread;
use tracing::debug;

pub trait WorkDistributionContext {
    fn process_count(&self) -> usize;

    fn rank(&self) -> usize;

    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    /// Coordinator only. Resets the worker's cancellation token, then hands it the task.
    fn send_task(&self, worker: usize, task: TaskId) -> GatResult<()>;

    /// Coordinator only.
    fn send_terminate(&self, worker: usize) -> GatResult<()>;

    /// Worker only. Blocks until the coordinator sends something.
    fn receive_task(&self) -> GatResult<TaskMessage>;

    /// Worker only.
    fn report_result(&self, task: TaskId, outcome: TaskOutcome) -> GatResult<()>;

    /// Coordinator only. Blocks until any worker reports.
    fn receive_report(&self) -> GatResult<TaskReport>;

    /// Asks a worker to interrupt its current task. Best effort, no acknowledgment.
    fn cancel(&self, worker: usize);

    /// Token the probes of this rank must watch.
    fn cancellation_token(&self) -> CancellationToken;

    fn barrier(&self);
}

/// Runs `f` for every index of `start..end` owned by this rank (round robin).
pub fn for_each<F>(ctx: &dyn WorkDistributionContext, start: usize, end: usize, mut f: F) -> GatResult<()>
where
    F: FnMut(usize) -> GatResult<()>,
{
    let count = ctx.process_count().max(1);
    for index in start..end {
        if index % count == ctx.rank() {
            f(index)?;
        }
    }
    Ok(())
}

/// Coordinator and only worker in one thread.
#[derive(Debug, Default)]
pub struct SingleProcess {
    token: CancellationToken,
}

impl SingleProcess {
    pub fn new() -> Self {
        Self::default()
    }
}

fn no_workers() -> GatError {
    GatError::Distribution("a single process context has no workers".to_string())
}

impl WorkDistributionContext for SingleProcess {
    fn process_count(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn send_task(&self, _worker: usize, _task: TaskId) -> GatResult<()> {
        Err(no_workers())
    }

    fn send_terminate(&self, _worker: usize) -> GatResult<()> {
        Err(no_workers())
    }

    fn receive_task(&self) -> GatResult<TaskMessage> {
        Err(no_workers())
    }

    fn report_result(&self, _task: TaskId, _outcome: TaskOutcome) -> GatResult<()> {
        Err(no_workers())
    }

    fn receive_report(&self) -> GatResult<TaskReport> {
        Err(no_workers())
    }

    fn cancel(&self, _worker: usize) {
        self.token.cancel();
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn barrier(&self) {}
}

/// One rank of a [`ThreadCluster`].
pub struct ThreadEndpoint {
    rank: usize,
    process_count: usize,
    /// Coordinator: one sender per worker, indexed by `rank - 1`
    task_senders: Vec<Sender<TaskMessage>>,
    task_receiver: Option<Receiver<TaskMessage>>,
    report_sender: Option<Sender<TaskReport>>,
    report_receiver: Option<Receiver<TaskReport>>,
    tokens: Arc<Vec<CancellationToken>>,
    barrier: Arc<Barrier>,
}

impl ThreadEndpoint {
    fn task_sender(&self, worker: usize) -> GatResult<&Sender<TaskMessage>> {
        worker
            .checked_sub(1)
            .and_then(|index| self.task_senders.get(index))
            .ok_or_else(|| {
                GatError::Distribution(format!(
                    "rank {} cannot send to rank {worker}",
                    self.rank
                ))
            })
    }
}

fn disconnected(what: &str) -> GatError {
    GatError::Distribution(format!("{what}: channel disconnected"))
}

impl WorkDistributionContext for ThreadEndpoint {
    fn process_count(&self) -> usize {
        self.process_count
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn send_task(&self, worker: usize, task: TaskId) -> GatResult<()> {
        let sender = self.task_sender(worker)?;
        self.tokens[worker].reset();
        sender
            .send(TaskMessage::Run(task))
            .map_err(|_| disconnected("sending task"))
    }

    fn send_terminate(&self, worker: usize) -> GatResult<()> {
        self.task_sender(worker)?
            .send(TaskMessage::Terminate)
            .map_err(|_| disconnected("sending termination"))
    }

    fn receive_task(&self) -> GatResult<TaskMessage> {
        self.task_receiver
            .as_ref()
            .ok_or_else(|| GatError::Distribution("the coordinator receives no tasks".into()))?
            .recv()
            .map_err(|_| disconnected("receiving task"))
    }

    fn report_result(&self, task: TaskId, outcome: TaskOutcome) -> GatResult<()> {
        self.report_sender
            .as_ref()
            .ok_or_else(|| GatError::Distribution("the coordinator reports to nobody".into()))?
            .send(TaskReport {
                worker: self.rank,
                task,
                outcome,
            })
            .map_err(|_| disconnected("reporting result"))
    }

    fn receive_report(&self) -> GatResult<TaskReport> {
        self.report_receiver
            .as_ref()
            .ok_or_else(|| GatError::Distribution("workers receive no reports".into()))?
            .recv()
            .map_err(|_| disconnected("receiving report"))
    }

    fn cancel(&self, worker: usize) {
        if let Some(token) = self.tokens.get(worker) {
            token.cancel();
        }
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.tokens[self.rank].clone()
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}

/// Ranks backed by threads of the current process, linked by channels.
pub struct ThreadCluster;

impl ThreadCluster {
    /// Builds the `process_count` connected endpoints, coordinator first.
    pub fn endpoints(process_count: usize) -> Vec<ThreadEndpoint> {
        let process_count = process_count.max(1);
        let tokens: Arc<Vec<CancellationToken>> =
            Arc::new((0..process_count).map(|_| CancellationToken::new()).collect());
        let barrier = Arc::new(Barrier::new(process_count));
        let (report_sender, report_receiver) = unbounded();

        let mut task_senders = Vec::with_capacity(process_count - 1);
        let mut workers = Vec::with_capacity(process_count - 1);
        for rank in 1..process_count {
            let (sender, receiver) = unbounded();
            task_senders.push(sender);
            workers.push(ThreadEndpoint {
                rank,
                process_count,
                task_senders: Vec::new(),
                task_receiver: Some(receiver),
                report_sender: Some(report_sender.clone()),
                report_receiver: None,
                tokens: Arc::clone(&tokens),
                barrier: Arc::clone(&barrier),
            });
        }

        let coordinator = ThreadEndpoint {
            rank: 0,
            process_count,
            task_senders,
            task_receiver: None,
            report_sender: None,
            report_receiver: Some(report_receiver),
            tokens,
            barrier,
        };
        std::iter::once(coordinator).chain(workers).collect()
    }

    /// Runs `body` on every rank and returns the coordinator's value.
    ///
    /// The coordinator runs on the calling thread. Its endpoint is dropped as
    /// soon as `body` returns, which disconnects idle workers if it bailed out
    /// early. The first error wins, coordinator first.
    pub fn run<T, F>(process_count: usize, body: F) -> GatResult<T>
    where
        T: Send,
        F: Fn(&ThreadEndpoint) -> GatResult<T> + Sync,
    {
        let mut endpoints = Self::endpoints(process_count).into_iter();
        let coordinator = endpoints
            .next()
            .ok_or_else(|| GatError::Distribution("no coordinator endpoint".into()))?;
        let body = &body;

        thread::scope(|scope| {
            let handles: Vec<_> = endpoints
                .map(|endpoint| {
                    scope.spawn(move || {
                        let rank = endpoint.rank;
                        let result = body(&endpoint);
                        debug!(rank, ok = result.is_ok(), "worker rank finished");
                        result
                    })
                })
                .collect();

            let result = {
                let coordinator = coordinator;
                body(&coordinator)
            };

            let mut first_error = None;
            for (index, handle) in handles.into_iter().enumerate() {
                let outcome = handle.join().unwrap_or_else(|_| {
                    Err(GatError::Distribution(format!("rank {} panicked", index + 1)))
                });
                if let Err(err) = outcome {
                    first_error.get_or_insert(err);
                }
            }

            match (result, first_error) {
                (Err(err), _) => Err(err),
                (Ok(_), Some(err)) => Err(err),
                (Ok(value), None) => Ok(value),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gat_core::SimulationStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn single_process_owns_every_index() {
        let ctx = SingleProcess::new();
        let mut seen = Vec::new();
        for_each(&ctx, 0, 4, |i| {
            seen.push(i);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(ctx.is_coordinator());
        assert!(ctx.receive_task().is_err());
    }

    #[test]
    fn for_each_splits_round_robin() {
        let owned = ThreadCluster::run(3, |ctx| {
            let mut mine = Vec::new();
            for_each(ctx, 0, 7, |i| {
                mine.push(i);
                Ok(())
            })?;
            ctx.barrier();
            Ok(mine)
        })
        .unwrap();
        assert_eq!(owned, vec![0, 3, 6]);
    }

    #[test]
    fn coordinator_dispatches_and_collects() {
        let executed = AtomicUsize::new(0);
        let reports = ThreadCluster::run(3, |ctx| {
            if ctx.is_coordinator() {
                let mut reports = Vec::new();
                for (worker, var_id) in [(1, 0), (2, 1)] {
                    ctx.send_task(worker, TaskId::load_increase(var_id))?;
                }
                for _ in 0..2 {
                    reports.push(ctx.receive_report()?);
                }
                for worker in 1..ctx.process_count() {
                    ctx.send_terminate(worker)?;
                }
                reports.sort_by_key(|r| r.worker);
                Ok(reports)
            } else {
                while let TaskMessage::Run(task) = ctx.receive_task()? {
                    executed.fetch_add(1, Ordering::SeqCst);
                    ctx.report_result(
                        task,
                        TaskOutcome::Finished {
                            success: true,
                            status: SimulationStatus::Convergence,
                        },
                    )?;
                }
                Ok(Vec::new())
            }
        })
        .unwrap();
        assert_eq!(executed.load(Ordering::SeqCst), 2);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].worker, 1);
        assert_eq!(reports[1].task, TaskId::load_increase(1));
    }

    #[test]
    fn send_task_resets_the_worker_token() {
        let endpoints = ThreadCluster::endpoints(2);
        let coordinator = &endpoints[0];
        let worker = &endpoints[1];
        coordinator.cancel(1);
        assert!(worker.cancellation_token().is_cancelled());
        coordinator.send_task(1, TaskId::scenario(2, 0)).unwrap();
        assert!(!worker.cancellation_token().is_cancelled());
        assert_eq!(
            worker.receive_task().unwrap(),
            TaskMessage::Run(TaskId::scenario(2, 0))
        );
    }

    #[test]
    fn coordinator_failure_releases_idle_workers() {
        let result: GatResult<()> = ThreadCluster::run(3, |ctx| {
            if ctx.is_coordinator() {
                Err(GatError::ScenariosNotDefined)
            } else {
                match ctx.receive_task() {
                    Err(_) => Ok(()),
                    Ok(message) => panic!("unexpected message {message:?}"),
                }
            }
        });
        assert!(matches!(result, Err(GatError::ScenariosNotDefined)));
    }

    #[test]
    fn worker_errors_surface() {
        let result: GatResult<()> = ThreadCluster::run(2, |ctx| {
            if ctx.is_coordinator() {
                Ok(())
            } else {
                Err(GatError::Distribution("worker failed".into()))
            }
        });
        assert!(matches!(result, Err(GatError::Distribution(_))));
    }
}
