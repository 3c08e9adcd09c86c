//! Fixed pool of parked workers running pair passes over a shared world.
//!
//! Each worker owns a command channel and an outcome channel. A pass sends
//! `Run` to every worker in order, then receives every outcome in the same
//! order, so the coordinator always waits for the whole pool before it looks
//! at any result.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::core::world::World;
use crate::error::{Error, Result};
use crate::parallel::accumulator::{AggregateResult, PassAccumulator};
use crate::parallel::slice::{PartitionStrategy, SliceDomain, ThreadSlice};
use crate::parallel::task::{PassContext, PassTask};

struct Job<const D: usize> {
    world: Arc<RwLock<World<D>>>,
    task: Arc<dyn PassTask<D>>,
    domain: SliceDomain,
}

enum Command<const D: usize> {
    Run(Job<D>),
    Shutdown,
}

type Outcome<const D: usize> = std::result::Result<PassAccumulator<D>, String>;

struct Worker<const D: usize> {
    commands: Sender<Command<D>>,
    outcomes: Receiver<Outcome<D>>,
    handle: Option<JoinHandle<()>>,
}

pub struct ParallelDispatcher<const D: usize> {
    workers: Vec<Worker<D>>,
    strategy: PartitionStrategy,
    slices: Vec<SliceDomain>,
    sliced_for: Option<usize>,
}

impl<const D: usize> std::fmt::Debug for ParallelDispatcher<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelDispatcher")
            .field("threads", &self.workers.len())
            .field("strategy", &self.strategy)
            .field("slices", &self.slices)
            .finish()
    }
}

impl<const D: usize> ParallelDispatcher<D> {
    /// Start `threads` workers.
    ///
    /// Errors:
    /// - `Error::Configuration` if `threads` is zero.
    /// - `Error::Io` if a thread cannot be spawned.
    pub fn new(threads: usize, strategy: PartitionStrategy) -> Result<Self> {
        let mut dispatcher = Self {
            workers: Vec::new(),
            strategy,
            slices: Vec::new(),
            sliced_for: None,
        };
        dispatcher.set_thread_count(threads)?;
        Ok(dispatcher)
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: PartitionStrategy) {
        if strategy != self.strategy {
            self.strategy = strategy;
            self.sliced_for = None;
        }
    }

    /// Slices used by the last pass, one per worker.
    pub fn slices(&self) -> &[SliceDomain] {
        &self.slices
    }

    /// Replace the pool with `threads` fresh workers. A no-op if the count
    /// is unchanged.
    pub fn set_thread_count(&mut self, threads: usize) -> Result<()> {
        if threads == 0 {
            return Err(Error::Configuration("thread count must be > 0".into()));
        }
        if threads == self.workers.len() {
            return Ok(());
        }
        self.shutdown();
        for k in 0..threads {
            self.workers.push(spawn_worker(k)?);
        }
        self.sliced_for = None;
        info!(threads, "worker pool started");
        Ok(())
    }

    /// Run `task` over every worker's slice and merge the results.
    ///
    /// Errors:
    /// - `Error::Configuration` if the pool has been shut down.
    /// - `Error::WorkerFailure` for the first worker (in worker order) whose
    ///   task failed or panicked. The other workers are drained first.
    #[instrument(level = "debug", skip_all, fields(task = task.name(), threads = self.workers.len()))]
    pub fn run(
        &mut self,
        world: &Arc<RwLock<World<D>>>,
        task: Arc<dyn PassTask<D>>,
    ) -> Result<AggregateResult<D>> {
        if self.workers.is_empty() {
            return Err(Error::Configuration("dispatcher has no workers".into()));
        }
        let particles = {
            let guard = world.read();
            self.reslice(&guard);
            guard.particles().len()
        };

        let mut sent = Vec::with_capacity(self.workers.len());
        for (worker, domain) in self.workers.iter().zip(&self.slices) {
            let job = Job {
                world: Arc::clone(world),
                task: Arc::clone(&task),
                domain: domain.clone(),
            };
            sent.push(worker.commands.send(Command::Run(job)).is_ok());
        }

        let mut parts = Vec::with_capacity(self.workers.len());
        let mut failure = None;
        for (k, (worker, was_sent)) in self.workers.iter().zip(sent).enumerate() {
            let outcome = if was_sent {
                worker
                    .outcomes
                    .recv()
                    .unwrap_or_else(|_| Err("worker exited".to_string()))
            } else {
                Err("worker is not accepting jobs".to_string())
            };
            match outcome {
                Ok(acc) => parts.push(acc),
                Err(message) => {
                    warn!(worker = k, %message, "worker failed");
                    failure.get_or_insert(Error::WorkerFailure { worker: k, message });
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let result = AggregateResult::merge(particles, parts);
        if result.has_anomalies() {
            warn!(
                count = result.anomalies.len(),
                first = ?result.anomalies.first(),
                "pass recorded numeric anomalies"
            );
        }
        Ok(result)
    }

    /// Stop and join every worker. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        for worker in &self.workers {
            let _ = worker.commands.send(Command::Shutdown);
        }
        for (k, worker) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!(worker = k, "worker thread panicked during shutdown");
                }
            }
        }
        info!(threads = self.workers.len(), "worker pool stopped");
        self.workers.clear();
        self.slices.clear();
        self.sliced_for = None;
    }

    fn reslice(&mut self, world: &World<D>) {
        let len = match self.strategy {
            PartitionStrategy::Particles => world.particles().len(),
            PartitionStrategy::Cells => world.neighbors().domain_len(),
        };
        if self.sliced_for == Some(len) {
            return;
        }
        self.slices = SliceDomain::split(world, self.strategy, self.workers.len());
        self.sliced_for = Some(len);
        debug!(len, strategy = ?self.strategy, slices = ?self.slices, "resliced");
    }
}

impl<const D: usize> Drop for ParallelDispatcher<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker<const D: usize>(index: usize) -> Result<Worker<D>> {
    let (command_tx, command_rx) = unbounded();
    let (outcome_tx, outcome_rx) = unbounded();
    let handle = thread::Builder::new()
        .name(format!("gascell-worker-{index}"))
        .spawn(move || worker_loop(index, command_rx, outcome_tx))?;
    Ok(Worker {
        commands: command_tx,
        outcomes: outcome_rx,
        handle: Some(handle),
    })
}

fn worker_loop<const D: usize>(
    index: usize,
    commands: Receiver<Command<D>>,
    outcomes: Sender<Outcome<D>>,
) {
    let mut slice = ThreadSlice::new(index, SliceDomain::Particles(0..0));
    while let Ok(command) = commands.recv() {
        let job = match command {
            Command::Run(job) => job,
            Command::Shutdown => break,
        };
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| run_slice(&mut slice, &job))) {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}

fn run_slice<const D: usize>(slice: &mut ThreadSlice, job: &Job<D>) -> Result<PassAccumulator<D>> {
    slice.set_domain(job.domain.clone());
    let world = job.world.read();
    let ctx = PassContext {
        particles: world.particles(),
        boundary: world.boundary(),
    };
    let mut acc = PassAccumulator::new(world.particles().len());
    let list = slice.neighbors(&world, job.task.direction());
    for (i, partners) in list.iter() {
        for &j in partners {
            job.task.visit(&ctx, i, j, &mut acc)?;
        }
    }
    Ok(acc)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
