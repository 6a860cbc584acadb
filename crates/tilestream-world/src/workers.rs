//! Off-main-loop execution of chunk jobs.
//!
//! A worker only ever touches the chunk moved into its [`WorkOrder`] and
//! the shared read-only storage/generator. Results travel back over a
//! channel and are applied by the single owner of the chunk store.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tilestream_core::{ChunkCoord, ChunkData, TileLayer};
use tilestream_persist::WorldStorage;

use crate::state_machine::{ChunkJob, JobId};
use crate::terrain::ChunkGenerator;

/// Where a load job gets its content, carrying the chunk it fills.
pub enum LoadSource {
    /// A blank chunk to fill from the saved record if present, with
    /// procedural fill for anything missing.
    Storage(Box<ChunkData>),
    /// A chunk already decoded elsewhere (replicated from the authority).
    Adopt(Box<ChunkData>),
}

/// One unit of blocking work.
pub enum WorkOrder {
    Load {
        id: JobId,
        source: LoadSource,
    },
    /// Persist `chunk`. For unloads this is the evicted chunk itself; for
    /// saves it is a snapshot copy.
    Store {
        id: JobId,
        job: ChunkJob,
        chunk: Box<ChunkData>,
    },
}

impl WorkOrder {
    pub fn id(&self) -> JobId {
        match self {
            WorkOrder::Load { id, .. } | WorkOrder::Store { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Chunk content is ready. `from_disk` is false when fully generated.
    Loaded { from_disk: bool },
    /// `written` is false when there was nothing to persist.
    Stored { written: bool },
    /// Storage failed; the chunk is returned unchanged.
    Failed(String),
}

/// Completed work handed back to the main loop.
pub struct WorkResult {
    pub id: JobId,
    pub coord: ChunkCoord,
    pub chunk: Box<ChunkData>,
    pub outcome: WorkOutcome,
    pub elapsed_ms: f64,
}

/// Read-only collaborators shared by all workers.
#[derive(Clone)]
pub struct WorkerContext {
    /// None on replicas and in-memory worlds.
    pub storage: Option<Arc<WorldStorage>>,
    pub generator: Arc<dyn ChunkGenerator>,
}

/// Perform one work order on the current thread.
pub fn run_work(ctx: &WorkerContext, order: WorkOrder) -> WorkResult {
    let t_start = Instant::now();
    let id = order.id();
    let (chunk, outcome) = match order {
        WorkOrder::Load {
            source: LoadSource::Adopt(adopted),
            ..
        } => (adopted, WorkOutcome::Loaded { from_disk: false }),
        WorkOrder::Load {
            source: LoadSource::Storage(mut chunk),
            ..
        } => {
            let outcome = load_or_generate(ctx, &mut chunk);
            (chunk, outcome)
        }
        WorkOrder::Store { chunk, job, .. } => {
            let outcome = match &ctx.storage {
                Some(storage) => match storage.write_chunk(&chunk) {
                    Ok(written) => WorkOutcome::Stored { written },
                    Err(e) => {
                        log::error!("{:?} of chunk {} failed: {}", job, chunk.coord(), e);
                        WorkOutcome::Failed(e.to_string())
                    }
                },
                None => WorkOutcome::Stored { written: false },
            };
            (chunk, outcome)
        }
    };

    WorkResult {
        id,
        coord: chunk.coord(),
        chunk,
        outcome,
        elapsed_ms: t_start.elapsed().as_secs_f64() * 1000.0,
    }
}

fn load_or_generate(ctx: &WorkerContext, chunk: &mut ChunkData) -> WorkOutcome {
    let coord = chunk.coord();
    let report = match &ctx.storage {
        Some(storage) => match storage.read_chunk(coord, chunk) {
            Ok(report) => report,
            Err(e) => {
                log::error!("reading chunk {} failed, generating instead: {}", coord, e);
                chunk.reset(coord);
                None
            }
        },
        None => None,
    };

    match report {
        Some(report) => {
            let missing: Vec<TileLayer> = TileLayer::ALL
                .into_iter()
                .filter(|l| !report.layers.contains(l))
                .collect();
            if !missing.is_empty() {
                ctx.generator.generate(chunk, &missing);
            }
            WorkOutcome::Loaded { from_disk: true }
        }
        None => {
            ctx.generator.generate(chunk, &TileLayer::ALL);
            WorkOutcome::Loaded { from_disk: false }
        }
    }
}

/// Something that runs work orders and reports on the result channel.
pub trait JobExecutor {
    fn submit(&self, order: WorkOrder);
}

/// Runs work synchronously on the submitting thread.
pub struct InlineExecutor {
    ctx: WorkerContext,
    tx_done: Sender<WorkResult>,
}

impl InlineExecutor {
    pub fn new(ctx: WorkerContext, tx_done: Sender<WorkResult>) -> Self {
        Self { ctx, tx_done }
    }
}

impl JobExecutor for InlineExecutor {
    fn submit(&self, order: WorkOrder) {
        let result = run_work(&self.ctx, order);
        let _ = self.tx_done.send(result);
    }
}

/// Fixed pool of worker threads fed through a job channel.
pub struct WorkerPool {
    tx_job: Option<Sender<WorkOrder>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(threads: usize, ctx: WorkerContext, tx_done: Sender<WorkResult>) -> Self {
        let (tx_job, rx_job) = unbounded::<WorkOrder>();
        let handles = (0..threads.max(1))
            .map(|i| {
                let ctx = ctx.clone();
                let rx_job: Receiver<WorkOrder> = rx_job.clone();
                let tx_done = tx_done.clone();
                std::thread::Builder::new()
                    .name(format!("chunk-worker-{i}"))
                    .spawn(move || {
                        while let Ok(order) = rx_job.recv() {
                            let result = run_work(&ctx, order);
                            if tx_done.send(result).is_err() {
                                break;
                            }
                        }
                    })
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("failed to spawn chunk worker: {}", e);
                    None
                }
            })
            .collect();
        Self {
            tx_job: Some(tx_job),
            handles,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }
}

impl JobExecutor for WorkerPool {
    fn submit(&self, order: WorkOrder) {
        if let Some(tx) = &self.tx_job {
            if let Err(e) = tx.send(order) {
                log::error!("worker pool closed, dropping job {:?}", e.0.id());
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the job channel ends each worker loop.
        self.tx_job.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Executor selected from configuration.
pub enum Executor {
    Inline(InlineExecutor),
    Pool(WorkerPool),
}

impl Executor {
    /// `threads == 0` runs every job inline.
    pub fn new(threads: usize, ctx: WorkerContext, tx_done: Sender<WorkResult>) -> Self {
        if threads == 0 {
            Executor::Inline(InlineExecutor::new(ctx, tx_done))
        } else {
            let pool = WorkerPool::spawn(threads, ctx.clone(), tx_done.clone());
            if pool.thread_count() == 0 {
                log::warn!("no chunk workers could be spawned, running jobs inline");
                Executor::Inline(InlineExecutor::new(ctx, tx_done))
            } else {
                Executor::Pool(pool)
            }
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Executor::Inline(_))
    }
}

impl JobExecutor for Executor {
    fn submit(&self, order: WorkOrder) {
        match self {
            Executor::Inline(inline) => inline.submit(order),
            Executor::Pool(pool) => pool.submit(order),
        }
    }
}
