//! Per-coordinate chunk job scheduling.
//!
//! States per chunk: `Unloaded -> (Load) -> Loaded -> (Unload) -> Unloaded`.
//! A `Save` job may run while loaded without changing state. Jobs for one
//! coordinate run strictly one at a time in submission order; jobs for
//! different coordinates are independent. A per-tick cap bounds how many
//! jobs start across all coordinates.

use std::collections::{HashMap, VecDeque};

use tilestream_core::{ChunkCoord, ChunkKey};

/// Intended state of a chunk once its queued work finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkTarget {
    Loaded,
    Unloaded,
    /// Persist while staying loaded.
    Saving,
}

/// Work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkJob {
    /// Read from storage (or generate) and make resident.
    Load,
    /// Evict, optionally persisting first.
    Unload { save: bool },
    /// Persist a snapshot; the chunk stays resident.
    Save,
}

impl ChunkJob {
    pub fn target(self) -> ChunkTarget {
        match self {
            ChunkJob::Load => ChunkTarget::Loaded,
            ChunkJob::Unload { .. } => ChunkTarget::Unloaded,
            ChunkJob::Save => ChunkTarget::Saving,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

/// A job that has left the queue and must now be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartedJob {
    pub id: JobId,
    pub coord: ChunkCoord,
    pub job: ChunkJob,
}

/// Outcome of submitting a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStart {
    /// The coordinate was idle and budget remained: execute now.
    Immediate(StartedJob),
    /// Waiting behind earlier jobs or the per-tick cap.
    Queued(JobId),
}

impl JobStart {
    pub fn id(&self) -> JobId {
        match self {
            JobStart::Immediate(started) => started.id,
            JobStart::Queued(id) => *id,
        }
    }
}

/// Terminal notification for one job. Every job yields exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Completed {
        id: JobId,
        coord: ChunkCoord,
        job: ChunkJob,
    },
    Cancelled {
        id: JobId,
        coord: ChunkCoord,
        job: ChunkJob,
    },
}

impl JobEvent {
    pub fn id(&self) -> JobId {
        match self {
            JobEvent::Completed { id, .. } | JobEvent::Cancelled { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct QueuedJob {
    id: JobId,
    job: ChunkJob,
}

#[derive(Debug, Default)]
struct JobLane {
    running: Option<QueuedJob>,
    queued: VecDeque<QueuedJob>,
    /// Last Load/Unload intent submitted for this coordinate.
    target: Option<ChunkTarget>,
    /// Whether the lane sits in the ready queue.
    ready: bool,
}

impl JobLane {
    fn is_idle(&self) -> bool {
        self.running.is_none() && self.queued.is_empty()
    }
}

/// Serializes chunk jobs per coordinate under a per-tick start budget.
///
/// The manager only schedules; the owner executes each [`StartedJob`] and
/// reports back through [`ChunkJobManager::complete`].
pub struct ChunkJobManager {
    lanes: HashMap<ChunkKey, JobLane>,
    /// Lanes with a queued head job waiting for budget, in arrival order.
    ready: VecDeque<ChunkKey>,
    max_per_tick: usize,
    started_this_tick: usize,
    next_id: u64,
}

impl ChunkJobManager {
    pub fn new(max_per_tick: usize) -> Self {
        Self {
            lanes: HashMap::new(),
            ready: VecDeque::new(),
            max_per_tick: max_per_tick.max(1),
            started_this_tick: 0,
            next_id: 1,
        }
    }

    /// Reset the per-tick budget.
    pub fn begin_tick(&mut self) {
        self.started_this_tick = 0;
    }

    fn has_budget(&self) -> bool {
        self.started_this_tick < self.max_per_tick
    }

    /// Submit a job for `coord`. Load and Unload jobs record their target as
    /// the coordinate's current intent; Save leaves the intent unchanged.
    pub fn start_new_job(&mut self, coord: ChunkCoord, job: ChunkJob) -> JobStart {
        let id = JobId(self.next_id);
        self.next_id += 1;

        let key = ChunkKey::from_coord(coord);
        let has_budget = self.has_budget();
        let lane = self.lanes.entry(key).or_default();
        if job != ChunkJob::Save {
            lane.target = Some(job.target());
        }

        if lane.is_idle() && has_budget {
            lane.running = Some(QueuedJob { id, job });
            self.started_this_tick += 1;
            return JobStart::Immediate(StartedJob { id, coord, job });
        }

        lane.queued.push_back(QueuedJob { id, job });
        if lane.running.is_none() && !lane.ready {
            lane.ready = true;
            self.ready.push_back(key);
        }
        JobStart::Queued(id)
    }

    /// Start queued jobs while budget remains.
    pub fn pump(&mut self) -> Vec<StartedJob> {
        let mut started = Vec::new();
        while self.has_budget() {
            let Some(key) = self.ready.pop_front() else {
                break;
            };
            let Some(lane) = self.lanes.get_mut(&key) else {
                continue;
            };
            lane.ready = false;
            if lane.running.is_some() {
                continue;
            }
            let Some(next) = lane.queued.pop_front() else {
                continue;
            };
            lane.running = Some(next);
            self.started_this_tick += 1;
            started.push(StartedJob {
                id: next.id,
                coord: key.coord(),
                job: next.job,
            });
        }
        started
    }

    /// Mark the running job for `coord` finished. Returns false if `id`
    /// is not the running job (stale or duplicate report).
    pub fn complete(&mut self, coord: ChunkCoord, id: JobId) -> bool {
        let key = ChunkKey::from_coord(coord);
        let Some(lane) = self.lanes.get_mut(&key) else {
            return false;
        };
        match lane.running {
            Some(running) if running.id == id => {
                lane.running = None;
                if !lane.queued.is_empty() && !lane.ready {
                    lane.ready = true;
                    self.ready.push_back(key);
                }
                self.prune(key);
                true
            }
            _ => false,
        }
    }

    /// Cancel every queued (not yet started) job for `coord`.
    pub fn cancel_queued(&mut self, coord: ChunkCoord) -> Vec<JobEvent> {
        let key = ChunkKey::from_coord(coord);
        let Some(lane) = self.lanes.get_mut(&key) else {
            return Vec::new();
        };
        let cancelled: Vec<JobEvent> = lane
            .queued
            .drain(..)
            .map(|q| JobEvent::Cancelled {
                id: q.id,
                coord,
                job: q.job,
            })
            .collect();
        for event in &cancelled {
            log::debug!("cancelled queued job {:?} for chunk {}", event, coord);
        }
        self.prune(key);
        cancelled
    }

    /// Override the recorded intent (forced unload bypasses the queue).
    pub fn set_target(&mut self, coord: ChunkCoord, target: ChunkTarget) {
        let key = ChunkKey::from_coord(coord);
        self.lanes.entry(key).or_default().target = Some(target);
        self.prune(key);
    }

    /// Drop idle lanes whose intent is Unloaded; absence means Unloaded.
    fn prune(&mut self, key: ChunkKey) {
        let removable = self.lanes.get(&key).is_some_and(|lane| {
            lane.is_idle() && matches!(lane.target, None | Some(ChunkTarget::Unloaded))
        });
        if removable {
            self.lanes.remove(&key);
        }
    }

    /// Last known intent for a coordinate. Unknown coordinates are Unloaded.
    pub fn target(&self, coord: ChunkCoord) -> ChunkTarget {
        self.lanes
            .get(&ChunkKey::from_coord(coord))
            .and_then(|l| l.target)
            .unwrap_or(ChunkTarget::Unloaded)
    }

    /// The job currently executing for a coordinate.
    pub fn running(&self, coord: ChunkCoord) -> Option<StartedJob> {
        self.lanes
            .get(&ChunkKey::from_coord(coord))
            .and_then(|l| l.running)
            .map(|q| StartedJob {
                id: q.id,
                coord,
                job: q.job,
            })
    }

    /// Jobs waiting for a coordinate, in execution order.
    pub fn queued(&self, coord: ChunkCoord) -> Vec<ChunkJob> {
        self.lanes
            .get(&ChunkKey::from_coord(coord))
            .map(|l| l.queued.iter().map(|q| q.job).collect())
            .unwrap_or_default()
    }

    pub fn is_busy(&self, coord: ChunkCoord) -> bool {
        self.lanes
            .get(&ChunkKey::from_coord(coord))
            .is_some_and(|l| !l.is_idle())
    }

    /// Whether any job is running or queued anywhere.
    pub fn has_pending(&self) -> bool {
        self.lanes.values().any(|l| !l.is_idle())
    }

    /// Coordinates with a running or queued job, sorted.
    pub fn busy_coords(&self) -> Vec<ChunkCoord> {
        let mut keys: Vec<ChunkKey> = self
            .lanes
            .iter()
            .filter(|(_, lane)| !lane.is_idle())
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys.into_iter().map(ChunkKey::coord).collect()
    }

    pub fn running_count(&self) -> usize {
        self.lanes.values().filter(|l| l.running.is_some()).count()
    }
}
