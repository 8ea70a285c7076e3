use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread;

use log::debug;
use seir_core::{
    worker_seed, ErrorInfo, ModelComponents, ParameterLayout, RequestKind, RngHandle, SeirError,
    SimulationKernel, SimulationOutput, SimulationRequest,
};

/// Capacity of each worker's job queue.
pub const QUEUE_DEPTH: usize = 64;

enum Job<'b> {
    Simulate { index: usize, params: &'b [f64] },
    Shutdown,
}

enum Reply {
    Done {
        index: usize,
        output: Result<SimulationOutput, SeirError>,
    },
    Panicked {
        worker: usize,
        index: usize,
        message: String,
    },
}

struct WorkerContext<'a, K: ?Sized> {
    kernel: &'a K,
    model: &'a ModelComponents,
    layout: &'a ParameterLayout,
    simulation_width: usize,
    kind: RequestKind,
    aborted: &'a AtomicBool,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn run_worker<K: SimulationKernel + ?Sized>(
    worker: usize,
    seed: u64,
    jobs: Receiver<Job<'_>>,
    replies: Sender<Reply>,
    ctx: &WorkerContext<'_, K>,
) {
    let mut rng = RngHandle::from_seed(seed);
    while let Ok(job) = jobs.recv() {
        let (index, params) = match job {
            Job::Simulate { index, params } => (index, params),
            Job::Shutdown => break,
        };
        if ctx.aborted.load(Ordering::Relaxed) {
            continue;
        }
        let request = SimulationRequest {
            kind: ctx.kind,
            index,
            params,
            layout: ctx.layout,
            model: ctx.model,
            simulation_width: ctx.simulation_width,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.kernel.simulate(&request, &mut rng)
        }));
        let reply = match outcome {
            Ok(output) => Reply::Done {
                index,
                output: output.and_then(|out| out.check(ctx.kind, index)),
            },
            Err(payload) => {
                let _ = replies.send(Reply::Panicked {
                    worker,
                    index,
                    message: panic_message(payload.as_ref()),
                });
                return;
            }
        };
        if replies.send(reply).is_err() {
            return;
        }
    }
}

fn dispatch_error(code: &str, message: impl Into<String>) -> SeirError {
    SeirError::Dispatch(ErrorInfo::new(code, message))
}

/// Scatter-gather pool of simulation workers scoped to a single dispatch.
///
/// Every call spawns `cores` threads, hands row `i` to worker `i % cores`,
/// gathers one outcome per row and shuts the workers down before returning.
/// Each worker owns a private RNG seeded from the base seed, its index and
/// the call counter.
pub struct WorkerPool<'a, K: ?Sized> {
    kernel: &'a K,
    model: &'a ModelComponents,
    layout: &'a ParameterLayout,
}

impl<'a, K: SimulationKernel + ?Sized> WorkerPool<'a, K> {
    /// Binds the pool to a kernel and the shared read-only model.
    pub fn new(kernel: &'a K, model: &'a ModelComponents, layout: &'a ParameterLayout) -> Self {
        Self {
            kernel,
            model,
            layout,
        }
    }

    /// Simulates every row of `batch` and returns the outputs in row order.
    ///
    /// A kernel error, a contract violation or a worker panic fails the
    /// whole dispatch.
    pub fn dispatch(
        &self,
        batch: &[Vec<f64>],
        kind: RequestKind,
        call_counter: u64,
    ) -> Result<Vec<SimulationOutput>, SeirError> {
        let control = &self.model.control;
        let cores = control.cpu_cores.max(1);
        let rows = batch.len();
        let aborted = AtomicBool::new(false);
        let ctx = WorkerContext {
            kernel: self.kernel,
            model: self.model,
            layout: self.layout,
            simulation_width: control.simulation_width,
            kind,
            aborted: &aborted,
        };

        debug!(
            "dispatching {rows} {} jobs to {cores} workers (call {call_counter})",
            kind.as_str()
        );

        thread::scope(|scope| {
            let (reply_tx, reply_rx) = mpsc::channel::<Reply>();
            let mut queues: Vec<SyncSender<Job<'_>>> = Vec::with_capacity(cores);
            for worker in 0..cores {
                let (job_tx, job_rx) = mpsc::sync_channel(QUEUE_DEPTH);
                let replies = reply_tx.clone();
                let seed = worker_seed(control.random_seed, worker, call_counter);
                let ctx = &ctx;
                scope.spawn(move || run_worker(worker, seed, job_rx, replies, ctx));
                queues.push(job_tx);
            }
            drop(reply_tx);

            for (index, params) in batch.iter().enumerate() {
                let job = Job::Simulate {
                    index,
                    params: params.as_slice(),
                };
                if queues[index % cores].send(job).is_err() {
                    // The worker is gone; its panic report is already queued.
                    break;
                }
            }

            let collected = collect(&reply_rx, rows);
            if collected.is_err() {
                aborted.store(true, Ordering::Relaxed);
            }
            for queue in &queues {
                let _ = queue.send(Job::Shutdown);
            }
            collected
        })
    }
}

fn collect(replies: &Receiver<Reply>, rows: usize) -> Result<Vec<SimulationOutput>, SeirError> {
    let mut slots: Vec<Option<SimulationOutput>> = (0..rows).map(|_| None).collect();
    for _ in 0..rows {
        let reply = replies.recv().map_err(|_| {
            dispatch_error("pool-disconnected", "all workers exited before answering")
        })?;
        match reply {
            Reply::Done { index, output } => {
                let output = output.map_err(|err| match err {
                    SeirError::Kernel(info) => SeirError::Kernel(info.with_context("row", index)),
                    other => other,
                })?;
                let slot = slots.get_mut(index).ok_or_else(|| {
                    SeirError::Dispatch(
                        ErrorInfo::new("index-out-of-range", "worker answered an unknown row")
                            .with_context("row", index)
                            .with_context("rows", rows),
                    )
                })?;
                if slot.replace(output).is_some() {
                    return Err(SeirError::Dispatch(
                        ErrorInfo::new("duplicate-index", "row answered more than once")
                            .with_context("row", index),
                    ));
                }
            }
            Reply::Panicked {
                worker,
                index,
                message,
            } => {
                return Err(SeirError::Dispatch(
                    ErrorInfo::new("worker-panicked", message)
                        .with_context("worker", worker)
                        .with_context("row", index),
                ));
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                SeirError::Dispatch(
                    ErrorInfo::new("missing-index", "row was never answered")
                        .with_context("row", index),
                )
            })
        })
        .collect()
}

/// Unwraps distance outputs; any other variant is a kernel contract violation.
pub fn distances(outputs: Vec<SimulationOutput>) -> Result<Vec<f64>, SeirError> {
    outputs
        .into_iter()
        .enumerate()
        .map(|(index, output)| match output {
            SimulationOutput::Distance(distance) => Ok(distance),
            SimulationOutput::Trajectory(_) => Err(SeirError::Kernel(
                ErrorInfo::new("kernel-contract", "expected a distance")
                    .with_context("row", index),
            )),
        })
        .collect()
}
