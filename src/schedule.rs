//! Level-by-level execution of an action plan.
//!
//! A fixed pool of worker threads pulls tasks from a shared queue and
//! reports (target, success) replies; the controller submits one level at a
//! time and blocks until every submitted target has reported. Targets
//! flagged serial (installs, test runs) execute synchronously in the
//! controller thread after the parallel subset of their level. Shutdown is
//! cooperative: the controller drains both queues and injects one sentinel
//! per worker, so workers exit their loop cleanly without a kill.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};

use crate::model::{Registry, TargetId};
use crate::output;
use crate::plan::ActionPlan;
use crate::recipe::Dispatch;

/// How long a worker blocks on the task queue before re-checking for
/// shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

enum Task {
    Run(TargetId),
    Shutdown,
}

pub struct ExecuteOptions {
    /// Run everything in the controller thread, one target at a time.
    pub serial: bool,
    /// Worker pool size; 0 means one worker per available processor.
    pub jobs: usize,
    /// Record failures but keep executing the rest of the plan.
    pub ignore_errors: bool,
    /// Report the owning build script alongside failures.
    pub verbose: bool,
    /// Print per-level progress.
    pub statistics: bool,
    /// Cooperative cancellation: checked during the collection wait.
    pub cancel: Arc<AtomicBool>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            serial: false,
            jobs: 0,
            ignore_errors: false,
            verbose: false,
            statistics: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ExecuteOptions {
    fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Execute the plan level by level.
///
/// Returns an error on a fatal abort (first failure in strict mode, or
/// cancellation) and on a run that completed with recorded failures under
/// ignore-errors; `Ok(())` means every level completed cleanly, including
/// the "nothing to do" case.
pub fn execute(
    registry: &Registry,
    plan: &ActionPlan,
    dispatcher: &dyn Dispatch,
    options: &ExecuteOptions,
) -> Result<()> {
    if plan.is_empty() {
        return Ok(());
    }

    let progress = options
        .statistics
        .then(|| output::progress(plan.total_actions() as u64));

    let any_failure = if options.serial {
        execute_serial(registry, plan, dispatcher, options, progress.as_ref())?
    } else {
        execute_pooled(registry, plan, dispatcher, options, progress.as_ref())?
    };

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    if any_failure {
        bail!("build finished with errors");
    }
    Ok(())
}

/// Global serial override: the whole plan runs in the calling thread, in
/// deterministic order.
fn execute_serial(
    registry: &Registry,
    plan: &ActionPlan,
    dispatcher: &dyn Dispatch,
    options: &ExecuteOptions,
    progress: Option<&indicatif::ProgressBar>,
) -> Result<bool> {
    let mut any_failure = false;
    for level in plan.levels() {
        let ordered = sorted(registry, level);
        for id in ordered {
            if options.cancel.load(Ordering::Relaxed) {
                bail!("aborted");
            }
            if !run_one(registry, dispatcher, options, id) {
                any_failure = true;
                if !options.ignore_errors {
                    bail!("error building {}", registry.target(id).name());
                }
            }
            if let Some(bar) = progress {
                bar.inc(1);
            }
        }
    }
    Ok(any_failure)
}

fn execute_pooled(
    registry: &Registry,
    plan: &ActionPlan,
    dispatcher: &dyn Dispatch,
    options: &ExecuteOptions,
    progress: Option<&indicatif::ProgressBar>,
) -> Result<bool> {
    let workers = options.worker_count();
    let (task_tx, task_rx) = mpsc::channel::<Task>();
    let (reply_tx, reply_rx) = mpsc::channel::<(TargetId, bool)>();
    let task_rx = Mutex::new(task_rx);
    let task_rx = &task_rx;

    thread::scope(|scope| {
        for _ in 0..workers {
            let reply_tx = reply_tx.clone();
            scope.spawn(move || worker(registry, dispatcher, options, task_rx, reply_tx));
        }
        // replies only come from workers; lets us observe a dead pool
        drop(reply_tx);

        let mut any_failure = false;
        for level in plan.levels() {
            let ordered = sorted(registry, level);
            let (parallel, serial): (Vec<TargetId>, Vec<TargetId>) = ordered
                .into_iter()
                .partition(|&id| !registry.target(id).serial());

            // parallel subset first, then the serial subset of the level
            let mut pending: HashSet<TargetId> = parallel.iter().copied().collect();
            for &id in &parallel {
                let _ = task_tx.send(Task::Run(id));
            }

            while !pending.is_empty() {
                if options.cancel.load(Ordering::Relaxed) {
                    shutdown(&task_tx, task_rx, &reply_rx, workers);
                    bail!("aborted");
                }
                match reply_rx.recv_timeout(POLL_INTERVAL) {
                    Ok((id, ok)) => {
                        pending.remove(&id);
                        if let Some(bar) = progress {
                            bar.inc(1);
                        }
                        if !ok {
                            any_failure = true;
                            if !options.ignore_errors {
                                shutdown(&task_tx, task_rx, &reply_rx, workers);
                                bail!("error building {}", registry.target(id).name());
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        bail!("worker pool terminated unexpectedly");
                    }
                }
            }

            for id in serial {
                if options.cancel.load(Ordering::Relaxed) {
                    shutdown(&task_tx, task_rx, &reply_rx, workers);
                    bail!("aborted");
                }
                if !run_one(registry, dispatcher, options, id) {
                    any_failure = true;
                    if !options.ignore_errors {
                        shutdown(&task_tx, task_rx, &reply_rx, workers);
                        bail!("error building {}", registry.target(id).name());
                    }
                }
                if let Some(bar) = progress {
                    bar.inc(1);
                }
            }
        }

        for _ in 0..workers {
            let _ = task_tx.send(Task::Shutdown);
        }
        Ok(any_failure)
    })
}

fn worker(
    registry: &Registry,
    dispatcher: &dyn Dispatch,
    options: &ExecuteOptions,
    task_rx: &Mutex<Receiver<Task>>,
    reply_tx: Sender<(TargetId, bool)>,
) {
    loop {
        let task = {
            let receiver = match task_rx.lock() {
                Ok(receiver) => receiver,
                Err(_) => return,
            };
            receiver.recv_timeout(POLL_INTERVAL)
        };
        match task {
            Ok(Task::Run(id)) => {
                let ok = run_one(registry, dispatcher, options, id);
                if reply_tx.send((id, ok)).is_err() {
                    return;
                }
            }
            Ok(Task::Shutdown) => return,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Dispatch one target, containing any error at this boundary.
fn run_one(
    registry: &Registry,
    dispatcher: &dyn Dispatch,
    options: &ExecuteOptions,
    id: TargetId,
) -> bool {
    let target = registry.target(id);
    match dispatcher.dispatch(registry, target) {
        Ok(()) => true,
        Err(error) => {
            if options.verbose {
                if let Some(script) = target.script() {
                    output::error(&format!("processed script: {}", script.display()));
                }
                if let Some(filename) = target.filename() {
                    output::error(&format!("processed filename: {}", filename.display()));
                }
            }
            let permission = error
                .downcast_ref::<std::io::Error>()
                .is_some_and(|io| io.kind() == std::io::ErrorKind::PermissionDenied);
            if permission {
                output::error(target.name());
                output::error(&format!("{error:#}"));
            } else if !options.ignore_errors {
                output::error(&format!("{error:#}"));
            }
            false
        }
    }
}

/// Drain both queues and let every worker observe a sentinel.
fn shutdown(
    task_tx: &Sender<Task>,
    task_rx: &Mutex<Receiver<Task>>,
    reply_rx: &Receiver<(TargetId, bool)>,
    workers: usize,
) {
    if let Ok(receiver) = task_rx.lock() {
        while receiver.try_recv().is_ok() {}
    }
    while reply_rx.try_recv().is_ok() {}
    for _ in 0..workers {
        let _ = task_tx.send(Task::Shutdown);
    }
}

fn sorted(registry: &Registry, level: &[TargetId]) -> Vec<TargetId> {
    let mut ordered = level.to_vec();
    ordered.sort_by_key(|&id| registry.target(id).sort_key());
    ordered
}
