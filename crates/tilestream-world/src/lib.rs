pub mod chunk_map;
pub mod notify;
pub mod objects;
pub mod refcount;
pub mod region;
pub mod replication;
pub mod state_machine;
pub mod streaming;
pub mod terrain;
pub mod workers;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver};
use glam::Vec2;
use tilestream_core::types::{chunk_of_tile, local_of_tile, ChunkKey, RegionCoord, TileCoord};
use tilestream_core::{
    ChunkCoord, ChunkData, EntityRecord, LoaderId, MobileChunk, ObjectId, PaletteError,
    StreamingConfig, Tile, TileLayer, TileTable,
};
use tilestream_persist::{PersistError, SaveLayout, WorldStorage};

use chunk_map::ChunkStore;
use notify::{ChunkChange, VisualQueue};
use objects::ObjectRegistry;
use refcount::{LoadReferenceCounter, LoadRequest, UnloadRequest};
use region::{RegionError, RegionIndex};
use replication::{Authority, ChunkMessage, Outbound};
use state_machine::{ChunkJob, ChunkJobManager, ChunkTarget, JobEvent, JobStart, StartedJob};
use streaming::{StreamDelta, StreamingPolicy};
use terrain::ChunkGenerator;
use workers::{Executor, JobExecutor, LoadSource, WorkOrder, WorkOutcome, WorkResult, WorkerContext};

/// Everything needed to construct a [`World`].
pub struct WorldParams {
    pub config: StreamingConfig,
    pub tiles: Arc<TileTable>,
    /// Save location. `None` keeps the world in memory only.
    pub layout: Option<SaveLayout>,
    pub generator: Arc<dyn ChunkGenerator>,
    pub authority: Authority,
}

/// Why a tile edit was refused. The chunk is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("tile {0} is not in the tile table")]
    UnregisteredTile(u32),
    #[error(transparent)]
    Palette(#[from] PaletteError),
}

/// Running counters, mostly for the soak runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub jobs_completed: u64,
    pub jobs_cancelled: u64,
    pub chunks_from_disk: u64,
    pub chunks_generated: u64,
    pub chunks_written: u64,
    pub invariant_corrections: u64,
}

/// The streaming world: owns every chunk, counter, job lane, and region.
///
/// All state is mutated on the thread that owns the `World`. Blocking
/// work runs on the executor and comes back through the result channel,
/// drained in [`World::tick`].
pub struct World {
    config: StreamingConfig,
    tiles: Arc<TileTable>,
    storage: Option<Arc<WorldStorage>>,
    authority: Authority,

    store: ChunkStore,
    refs: LoadReferenceCounter,
    jobs: ChunkJobManager,
    executor: Executor,
    rx_done: Receiver<WorkResult>,
    /// Results received while waiting on a specific coordinate.
    buffered: VecDeque<WorkResult>,

    regions: RegionIndex,
    objects: ObjectRegistry,
    /// Failed cross-region moves and how many retries they have used.
    pending_moves: HashMap<ObjectId, u32>,

    streaming: StreamingPolicy,
    /// Chunks received from an authority, waiting for their load job.
    staged: HashMap<ChunkKey, Box<ChunkData>>,

    visual: VisualQueue,
    outbound: Vec<Outbound>,
    events: Vec<JobEvent>,
    stats: WorldStats,
    /// Simulation time in seconds.
    clock: f64,
}

impl World {
    pub fn new(params: WorldParams) -> Self {
        let WorldParams {
            config,
            tiles,
            layout,
            generator,
            authority,
        } = params;

        let storage = match (authority, layout) {
            (Authority::Authority, Some(layout)) => {
                log::info!("World storage at {}", layout.base().display());
                Some(Arc::new(WorldStorage::new(layout, tiles.clone())))
            }
            (Authority::Replica, Some(_)) => {
                log::warn!("Replica worlds never touch storage; ignoring save layout");
                None
            }
            (_, None) => None,
        };

        let (tx_done, rx_done) = unbounded();
        let ctx = WorkerContext {
            storage: storage.clone(),
            generator,
        };
        let executor = Executor::new(config.worker_threads, ctx, tx_done);
        log::info!(
            "World created ({:?}, {} worker threads, region side {})",
            authority,
            if executor.is_inline() { 0 } else { config.worker_threads },
            config.chunks_per_region_side
        );

        Self {
            tiles,
            storage,
            authority,
            store: ChunkStore::new(),
            refs: LoadReferenceCounter::new(config.eviction_delay_secs),
            jobs: ChunkJobManager::new(config.max_jobs_per_tick),
            executor,
            rx_done,
            buffered: VecDeque::new(),
            regions: RegionIndex::new(config.chunks_per_region_side),
            objects: ObjectRegistry::new(),
            pending_moves: HashMap::new(),
            streaming: StreamingPolicy::new(config.loader_radius),
            staged: HashMap::new(),
            visual: VisualQueue::new(),
            outbound: Vec::new(),
            events: Vec::new(),
            stats: WorldStats::default(),
            clock: 0.0,
            config,
        }
    }

    // --- Loader requests ---

    /// Ask for a chunk to be resident on behalf of `loader`.
    pub fn request_load(&mut self, loader: LoaderId, coord: ChunkCoord) -> LoadRequest {
        let outcome = self.refs.request_load(loader, coord);
        match outcome {
            LoadRequest::NeedsLoad => {
                if self.jobs.target(coord) == ChunkTarget::Loaded {
                    log::debug!("Chunk {} already headed to Loaded", coord);
                } else {
                    self.submit(coord, ChunkJob::Load);
                }
            }
            LoadRequest::EvictionCancelled => {
                if self.jobs.target(coord) != ChunkTarget::Loaded {
                    log::warn!(
                        "Chunk {} had a pending eviction but target {:?}; issuing Load",
                        coord,
                        self.jobs.target(coord)
                    );
                    self.stats.invariant_corrections += 1;
                    self.submit(coord, ChunkJob::Load);
                }
            }
            LoadRequest::Added | LoadRequest::AlreadyHeld => {}
        }

        if loader.is_remote() && outcome != LoadRequest::AlreadyHeld && self.is_settled(coord) {
            self.replicate_to(loader, coord);
        }
        outcome
    }

    /// Resident with no load still to come, so its content is final.
    fn is_settled(&self, coord: ChunkCoord) -> bool {
        let load_running = self
            .jobs
            .running(coord)
            .is_some_and(|r| r.job == ChunkJob::Load);
        self.store.contains(coord)
            && self.jobs.target(coord) == ChunkTarget::Loaded
            && !load_running
            && !self.jobs.queued(coord).contains(&ChunkJob::Load)
    }

    /// Drop `loader`'s interest in a chunk. The last release schedules an
    /// eviction after the configured delay.
    pub fn request_unload(&mut self, loader: LoaderId, coord: ChunkCoord) -> UnloadRequest {
        self.refs.request_unload(loader, coord, self.clock)
    }

    /// Move a loader and stream its view box in and out.
    pub fn update_loader(&mut self, loader: LoaderId, position: Vec2) -> StreamDelta {
        let delta = self.streaming.update(loader, position);
        for &coord in &delta.exited {
            self.request_unload(loader, coord);
        }
        for &coord in &delta.entered {
            self.request_load(loader, coord);
        }
        delta
    }

    /// Forget a loader, releasing every chunk it holds.
    pub fn remove_loader(&mut self, loader: LoaderId) {
        self.streaming.remove(loader);
        for coord in self.refs.held_by(loader) {
            self.request_unload(loader, coord);
        }
    }

    // --- Tick ---

    /// Advance simulation time and run one scheduling pass.
    pub fn tick(&mut self, dt: f64) {
        if dt.is_finite() && dt > 0.0 {
            self.clock += dt;
        }
        self.jobs.begin_tick();
        self.drain_results();

        for coord in self.refs.expire(self.clock) {
            log::debug!("Eviction timer fired for chunk {}", coord);
            self.submit(coord, ChunkJob::Unload { save: true });
        }

        loop {
            self.drain_results();
            let started = self.jobs.pump();
            if started.is_empty() {
                break;
            }
            for job in started {
                self.dispatch(job);
            }
        }

        self.retry_moves();
        self.check_invariants();
    }

    fn submit(&mut self, coord: ChunkCoord, job: ChunkJob) {
        if let JobStart::Immediate(started) = self.jobs.start_new_job(coord, job) {
            self.dispatch(started);
        }
    }

    /// Hand a started job to the executor, or finish it on the spot when
    /// there is nothing to do off-thread.
    fn dispatch(&mut self, started: StartedJob) {
        let StartedJob { id, coord, job } = started;
        match job {
            ChunkJob::Load => {
                if self.store.contains(coord) {
                    log::debug!("Chunk {} already resident, load is a no-op", coord);
                    self.finish_inline(started);
                    return;
                }
                let source = match self.staged.remove(&ChunkKey::from_coord(coord)) {
                    Some(staged) => LoadSource::Adopt(staged),
                    None => LoadSource::Storage(self.store.take_blank(coord)),
                };
                self.executor.submit(WorkOrder::Load { id, source });
            }
            ChunkJob::Unload { save } => {
                let Some(chunk) = self.store.remove(coord) else {
                    log::debug!("Chunk {} not resident, unload is a no-op", coord);
                    self.finish_inline(started);
                    return;
                };
                if save && self.storage.is_some() {
                    self.executor.submit(WorkOrder::Store { id, job, chunk });
                } else {
                    self.evicted(chunk);
                    self.finish_inline(started);
                }
            }
            ChunkJob::Save => {
                let snapshot = match self.store.get(coord) {
                    Some(chunk) if self.storage.is_some() && chunk.has_edits() => {
                        Some(Box::new(chunk.clone()))
                    }
                    _ => None,
                };
                let Some(snapshot) = snapshot else {
                    self.finish_inline(started);
                    return;
                };
                self.executor.submit(WorkOrder::Store {
                    id,
                    job,
                    chunk: snapshot,
                });
            }
        }
    }

    fn finish_inline(&mut self, started: StartedJob) {
        self.jobs.complete(started.coord, started.id);
        self.stats.jobs_completed += 1;
        self.events.push(JobEvent::Completed {
            id: started.id,
            coord: started.coord,
            job: started.job,
        });
    }

    fn drain_results(&mut self) {
        while let Some(result) = self.buffered.pop_front() {
            self.apply_result(result);
        }
        while let Ok(result) = self.rx_done.try_recv() {
            self.apply_result(result);
        }
    }

    fn apply_result(&mut self, result: WorkResult) {
        let WorkResult {
            id,
            coord,
            chunk,
            outcome,
            elapsed_ms,
        } = result;

        let Some(running) = self.jobs.running(coord).filter(|r| r.id == id) else {
            log::warn!("Discarding stale result {:?} for chunk {}", id, coord);
            self.store.recycle(chunk);
            return;
        };
        self.jobs.complete(coord, id);

        match (running.job, outcome) {
            (ChunkJob::Load, WorkOutcome::Failed(e)) => {
                log::error!("Load of chunk {} failed: {}", coord, e);
                self.store.recycle(chunk);
            }
            (ChunkJob::Load, outcome) => {
                if outcome == (WorkOutcome::Loaded { from_disk: true }) {
                    self.stats.chunks_from_disk += 1;
                } else {
                    self.stats.chunks_generated += 1;
                }
                self.store.add(chunk);
                self.visual.push(ChunkChange::Loaded(coord));
                log::debug!("Chunk {} loaded in {:.2}ms ({:?})", coord, elapsed_ms, outcome);
                self.activate_region(coord);
                self.replicate_loaded(coord);
            }
            (ChunkJob::Unload { .. }, outcome) => {
                match outcome {
                    WorkOutcome::Failed(e) => log::error!(
                        "Saving chunk {} before eviction failed, evicting anyway: {}",
                        coord,
                        e
                    ),
                    WorkOutcome::Stored { written: true } => self.stats.chunks_written += 1,
                    _ => {}
                }
                self.evicted(chunk);
                log::debug!("Chunk {} unloaded in {:.2}ms", coord, elapsed_ms);
            }
            (ChunkJob::Save, outcome) => {
                if outcome == (WorkOutcome::Stored { written: true }) {
                    self.stats.chunks_written += 1;
                }
                self.store.recycle(chunk);
            }
        }

        self.stats.jobs_completed += 1;
        self.events.push(JobEvent::Completed {
            id,
            coord,
            job: running.job,
        });
    }

    /// Bookkeeping for a chunk that just left residency.
    fn evicted(&mut self, chunk: Box<ChunkData>) {
        let coord = chunk.coord();
        self.store.recycle(chunk);
        self.visual.push(ChunkChange::Unloaded(coord));
        let region = self.regions.region_of(coord);
        self.release_region_if_idle(region);
    }

    /// Self-heal disagreements between reference counts and job intents.
    fn check_invariants(&mut self) {
        let mut corrections = Vec::new();
        for (coord, held) in self.refs.tracked() {
            if held && self.jobs.target(coord) != ChunkTarget::Loaded {
                log::warn!("Chunk {} is referenced but not headed to Loaded; issuing Load", coord);
                corrections.push((coord, ChunkJob::Load));
            }
        }
        for coord in self.store.coords() {
            if !self.refs.is_tracked(coord)
                && self.jobs.target(coord) == ChunkTarget::Loaded
                && !self.jobs.is_busy(coord)
            {
                log::warn!("Chunk {} is resident without references; issuing Unload", coord);
                corrections.push((coord, ChunkJob::Unload { save: true }));
            }
        }
        corrections.sort_by_key(|(c, _)| (c.x, c.y));
        for (coord, job) in corrections {
            self.stats.invariant_corrections += 1;
            self.submit(coord, job);
        }
    }

    // --- Forced unload / teardown ---

    /// Unload a chunk synchronously, bypassing its queue.
    ///
    /// Queued jobs are cancelled, a running job is waited for, then the
    /// chunk is saved and evicted on this thread. All loaders lose it.
    /// Returns whether a resident chunk was evicted.
    pub fn force_unload(&mut self, coord: ChunkCoord) -> bool {
        let cancelled = self.jobs.cancel_queued(coord);
        self.stats.jobs_cancelled += cancelled.len() as u64;
        self.events.extend(cancelled);
        self.wait_for_running(coord);

        self.refs.forget(coord);
        self.jobs.set_target(coord, ChunkTarget::Unloaded);
        if let Some(staged) = self.staged.remove(&ChunkKey::from_coord(coord)) {
            self.store.recycle(staged);
        }

        let Some(chunk) = self.store.remove(coord) else {
            return false;
        };
        if let Some(storage) = &self.storage {
            match storage.write_chunk(&chunk) {
                Ok(true) => self.stats.chunks_written += 1,
                Ok(false) => {}
                Err(e) => log::error!("Saving chunk {} during forced unload failed: {}", coord, e),
            }
        }
        self.evicted(chunk);
        log::debug!("Chunk {} force-unloaded", coord);
        true
    }

    /// Block until the running job for `coord`, if any, has been applied.
    fn wait_for_running(&mut self, coord: ChunkCoord) {
        while let Some(running) = self.jobs.running(coord) {
            if let Some(pos) = self.buffered.iter().position(|r| r.id == running.id) {
                if let Some(result) = self.buffered.remove(pos) {
                    self.apply_result(result);
                }
                continue;
            }
            match self.rx_done.recv() {
                Ok(result) if result.id == running.id => self.apply_result(result),
                Ok(result) => self.buffered.push_back(result),
                Err(_) => {
                    log::error!("Worker channel closed while waiting on chunk {}", coord);
                    return;
                }
            }
        }
    }

    /// Persist everything and unload every chunk, region, and object.
    pub fn shutdown(&mut self) {
        let mut coords = self.store.coords();
        coords.extend(self.jobs.busy_coords());
        coords.extend(self.refs.tracked().into_iter().map(|(c, _)| c));
        coords.sort_by_key(|c| (c.x, c.y));
        coords.dedup();

        let mut unloaded = 0;
        for coord in coords {
            if self.force_unload(coord) {
                unloaded += 1;
            }
        }
        for region in self.regions.active_regions() {
            self.release_region(region);
        }
        self.pending_moves.clear();
        log::info!("World shut down ({} chunks unloaded)", unloaded);
    }

    // --- Autosave ---

    /// Queue a Save job for every resident chunk with edits, and persist
    /// resident objects and active regions. Returns the jobs queued.
    pub fn save_all(&mut self) -> usize {
        let Some(storage) = self.storage.clone() else {
            return 0;
        };

        let mut coords: Vec<ChunkCoord> = self
            .store
            .iter()
            .filter(|c| c.has_edits())
            .map(|c| c.coord())
            .collect();
        coords.sort_by_key(|c| (c.x, c.y));
        for &coord in &coords {
            self.submit(coord, ChunkJob::Save);
        }

        for id in self.objects.ids() {
            if let Err(e) = self.objects.save(id, &storage) {
                log::error!("Saving {:?} failed: {}", id, e);
            }
        }
        for region in self.regions.active_regions() {
            if let Err(e) = self.regions.save_region(region, &storage) {
                log::error!("Saving region {} failed: {}", region, e);
            }
        }
        log::info!("Autosave queued {} chunk saves", coords.len());
        coords.len()
    }

    // --- Tile editing ---

    /// Edit a tile at a world tile position. Returns `Ok(false)` when the
    /// owning chunk is not resident.
    ///
    /// Only tiles the tile table can name are accepted, so every edit can
    /// be persisted.
    pub fn set_tile(
        &mut self,
        pos: TileCoord,
        layer: TileLayer,
        tile: Tile,
    ) -> Result<bool, EditError> {
        let coord = chunk_of_tile(pos);
        if !tile.is_empty() && self.tiles.name_of(tile.global_id).is_none() {
            log::warn!("Rejected edit at {}: tile {} is unregistered", pos, tile.global_id);
            return Err(EditError::UnregisteredTile(tile.global_id));
        }
        let Some(chunk) = self.store.get_mut(coord) else {
            return Ok(false);
        };
        let (x, y) = local_of_tile(pos);
        match chunk.set_tile(layer, x, y, tile) {
            Ok(()) => Ok(true),
            Err(e) => {
                log::warn!("Rejected edit at {} in chunk {}: {}", pos, coord, e);
                Err(e.into())
            }
        }
    }

    pub fn tile(&self, pos: TileCoord, layer: TileLayer) -> Option<Tile> {
        let (x, y) = local_of_tile(pos);
        self.store.get(chunk_of_tile(pos)).map(|c| c.tile(layer, x, y))
    }

    // --- Regions and dynamic objects ---

    fn activate_region(&mut self, coord: ChunkCoord) {
        let objects = &self.objects;
        let activated = self
            .regions
            .load_region_at_chunk(coord, self.storage.as_deref(), |id| objects.is_resident(id));
        let pending = match activated {
            Ok(pending) => pending,
            Err(e) => {
                log::error!(
                    "Reading region of chunk {} failed, leaving it inactive until the next load: {}",
                    coord,
                    e
                );
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        let Some(storage) = self.storage.clone() else {
            return;
        };

        for p in pending {
            match self.objects.load(p.id, &storage) {
                Ok(Some(location)) => {
                    if let Err(e) = self.regions.insert(p.id, p.chunk) {
                        log::warn!("Could not re-list {:?}: {}", p.id, e);
                        self.objects.remove(p.id);
                        continue;
                    }
                    if location != p.chunk {
                        self.pending_moves.entry(p.id).or_insert(0);
                    }
                }
                Ok(None) => {
                    log::warn!("{:?} listed in chunk {} has no record; dropping", p.id, p.chunk);
                }
                Err(e) => {
                    log::error!("Loading {:?} failed, keeping it listed: {}", p.id, e);
                    let _ = self.regions.insert(p.id, p.chunk);
                }
            }
        }
    }

    fn release_region_if_idle(&mut self, region: RegionCoord) {
        let store = &self.store;
        let jobs = &self.jobs;
        let idle = self.regions.can_release(region, |c| {
            store.contains(c) || jobs.target(c) == ChunkTarget::Loaded
        });
        if idle {
            self.release_region(region);
        }
    }

    /// Save and unload a region's objects, then write and free the region.
    fn release_region(&mut self, region: RegionCoord) {
        for id in self.regions.objects_in_region(region) {
            if let Some(storage) = &self.storage {
                if let Err(e) = self.objects.save(id, storage) {
                    log::error!("Saving {:?} failed: {}", id, e);
                }
            }
            self.objects.remove(id);
            self.pending_moves.remove(&id);
        }
        match self.regions.release_region(region, self.storage.as_deref()) {
            Ok(true) => log::debug!("Region {} released", region),
            Ok(false) => {}
            Err(e) => log::error!("Writing region {} failed: {}", region, e),
        }
    }

    /// Add a new movable chunk at its body position.
    pub fn spawn_mobile_chunk(&mut self, mobile: MobileChunk) -> Result<(), RegionError> {
        let id = ObjectId::Mobile(mobile.uid);
        if self.objects.is_resident(id) {
            return Err(RegionError::AlreadyTracked(id));
        }
        self.regions.insert(id, mobile.location())?;
        self.objects.insert_mobile(mobile);
        Ok(())
    }

    /// Add a new entity at its position.
    pub fn spawn_entity(&mut self, entity: EntityRecord) -> Result<(), RegionError> {
        let id = ObjectId::Entity(entity.uid);
        if self.objects.is_resident(id) {
            return Err(RegionError::AlreadyTracked(id));
        }
        self.regions.insert(id, entity.location())?;
        self.objects.insert_entity(entity);
        Ok(())
    }

    /// Move an object and re-index it under its new chunk.
    ///
    /// If the destination region is inactive the object stays indexed
    /// where it was and the move is retried on the following ticks.
    pub fn move_object(&mut self, id: ObjectId, position: Vec2) -> Result<(), RegionError> {
        if self.regions.location(id).is_none() || !self.objects.set_position(id, position) {
            return Err(RegionError::UnknownObject(id));
        }
        let Some(to) = self.objects.location(id) else {
            return Err(RegionError::UnknownObject(id));
        };
        match self.regions.move_object(id, to) {
            Ok(()) => {
                self.pending_moves.remove(&id);
                Ok(())
            }
            Err(e @ RegionError::DestinationInactive { .. }) => {
                log::warn!("{}; will retry", e);
                self.pending_moves.entry(id).or_insert(0);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn retry_moves(&mut self) {
        if self.pending_moves.is_empty() {
            return;
        }
        let mut ids: Vec<ObjectId> = self.pending_moves.keys().copied().collect();
        ids.sort();
        for id in ids {
            let Some(to) = self.objects.location(id) else {
                self.pending_moves.remove(&id);
                continue;
            };
            match self.regions.move_object(id, to) {
                Ok(()) => {
                    log::debug!("Deferred move of {:?} to chunk {} succeeded", id, to);
                    self.pending_moves.remove(&id);
                }
                Err(RegionError::DestinationInactive { .. }) => {
                    let attempts = self.pending_moves.entry(id).or_insert(0);
                    *attempts += 1;
                    if *attempts >= self.config.move_retry_limit {
                        log::warn!(
                            "Giving up moving {:?} to chunk {} after {} retries; it stays in chunk {:?}",
                            id,
                            to,
                            attempts,
                            self.regions.location(id)
                        );
                        self.pending_moves.remove(&id);
                    }
                }
                Err(e) => {
                    log::warn!("Dropping deferred move: {}", e);
                    self.pending_moves.remove(&id);
                }
            }
        }
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn regions(&self) -> &RegionIndex {
        &self.regions
    }

    /// Chunk an object is indexed under.
    pub fn object_location(&self, id: ObjectId) -> Option<ChunkCoord> {
        self.regions.location(id)
    }

    pub fn has_pending_move(&self, id: ObjectId) -> bool {
        self.pending_moves.contains_key(&id)
    }

    // --- Replication ---

    fn replicate_loaded(&mut self, coord: ChunkCoord) {
        let remotes: Vec<LoaderId> = self
            .refs
            .loaders(coord)
            .into_iter()
            .filter(LoaderId::is_remote)
            .collect();
        for loader in remotes {
            self.replicate_to(loader, coord);
        }
    }

    fn replicate_to(&mut self, loader: LoaderId, coord: ChunkCoord) {
        if self.authority != Authority::Authority {
            return;
        }
        let Some(chunk) = self.store.get(coord) else {
            return;
        };
        match ChunkMessage::encode(chunk, &self.tiles) {
            Ok(message) => self.outbound.push(Outbound { to: loader, message }),
            Err(e) => log::error!("Encoding chunk {} for {:?} failed: {}", coord, loader, e),
        }
    }

    /// Accept a chunk from the authority and request it for `loader`
    /// exactly as a local loader would.
    pub fn receive_chunk_message(
        &mut self,
        loader: LoaderId,
        message: &ChunkMessage,
    ) -> Result<LoadRequest, PersistError> {
        let coord = message.coord;
        let mut chunk = self.store.take_blank(coord);
        match message.decode_into(&self.tiles, &mut chunk) {
            Ok(report) if !report.is_clean() => {
                log::warn!("Chunk {} arrived with inconsistencies: {:?}", coord, report)
            }
            Ok(_) => {}
            Err(e) => {
                self.store.recycle(chunk);
                return Err(e);
            }
        }

        if self.is_settled(coord) {
            if let Some(old) = self.store.remove(coord) {
                self.store.recycle(old);
            }
            self.store.add(chunk);
            self.visual.push(ChunkChange::Loaded(coord));
        } else if let Some(old) = self.staged.insert(ChunkKey::from_coord(coord), chunk) {
            self.store.recycle(old);
        }
        Ok(self.request_load(loader, coord))
    }

    // --- Consumers ---

    pub fn drain_visual_updates(&mut self) -> Vec<ChunkChange> {
        self.visual.drain()
    }

    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    /// Terminal events of every job since the last drain.
    pub fn drain_job_events(&mut self) -> Vec<JobEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Queries ---

    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.store.contains(coord)
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&ChunkData> {
        self.store.get(coord)
    }

    /// Last known intent for a coordinate.
    pub fn target(&self, coord: ChunkCoord) -> ChunkTarget {
        self.jobs.target(coord)
    }

    pub fn loaders(&self, coord: ChunkCoord) -> Vec<LoaderId> {
        self.refs.loaders(coord)
    }

    pub fn eviction_pending(&self, coord: ChunkCoord) -> bool {
        self.refs.eviction_pending(coord)
    }

    pub fn loaded_count(&self) -> usize {
        self.store.loaded_count()
    }

    pub fn has_pending_jobs(&self) -> bool {
        self.jobs.has_pending()
    }

    pub fn stats(&self) -> WorldStats {
        self.stats
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn storage(&self) -> Option<&WorldStorage> {
        self.storage.as_deref()
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }
}
