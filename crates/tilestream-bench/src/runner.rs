use std::io;
use std::sync::Arc;
use std::time::Instant;

use glam::IVec2;
use tilestream_core::{LoaderId, StreamingConfig, Tile, TileLayer, TileTable};
use tilestream_persist::{SaveLayout, WorldMode};
use tilestream_world::replication::Authority;
use tilestream_world::terrain::{TerrainGenerator, TerrainTiles};
use tilestream_world::{World, WorldParams};

use crate::scenes::{self, SceneConfig};

/// Simulated seconds per tick.
const TICK_DT: f64 = 1.0 / 60.0;

/// Tile ids edits cycle through.
const EDIT_TILES: [u32; 4] = [5, 6, 7, 8];

/// Timing data for a single soak run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimingSeries {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Result of a single scene.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BenchmarkResult {
    pub scene_name: String,
    pub loaders: u32,
    pub tick_count: u32,
    pub peak_loaded_chunks: usize,
    pub final_loaded_chunks: usize,
    pub jobs_completed: u64,
    pub chunks_written: u64,
    pub messages_sent: u64,
    pub shutdown_ms: f64,
    pub timings: TimingSeries,
}

/// Drives a fresh `World` per scene in a throwaway save directory.
pub struct SoakRunner {
    tick_count: u32,
    loaders: u32,
    config: StreamingConfig,
    tiles: Arc<TileTable>,
}

impl SoakRunner {
    pub fn new(
        tick_count: u32,
        loaders: u32,
        config: StreamingConfig,
        tiles: Arc<TileTable>,
    ) -> Self {
        Self {
            tick_count,
            loaders: loaders.max(1),
            config,
            tiles,
        }
    }

    fn terrain_tiles(&self) -> TerrainTiles {
        let id = |name: &str| self.tiles.id_of(name).unwrap_or(0);
        TerrainTiles {
            stone: id("core:stone"),
            dirt: id("core:dirt"),
            water: id("core:water"),
            wall: id("core:stone_wall"),
        }
    }

    fn loader_id(&self, scene: &SceneConfig, index: u32) -> LoaderId {
        if scene.remote_loaders && index % 2 == 1 {
            LoaderId::Remote(index)
        } else {
            LoaderId::Local(index)
        }
    }

    /// Run a single scene and return timing results.
    pub fn run_scene(&self, scene: &SceneConfig) -> io::Result<BenchmarkResult> {
        log::info!("Running scene '{}' with {} loaders...", scene.name, self.loaders);

        let save_dir = tempfile::tempdir()?;
        let mut world = World::new(WorldParams {
            config: self.config.clone(),
            tiles: self.tiles.clone(),
            layout: Some(SaveLayout::new(save_dir.path(), "soak", WorldMode::Play, scene.name)),
            generator: Arc::new(TerrainGenerator::new(0x5eed, self.terrain_tiles())),
            authority: Authority::Authority,
        });

        let mut tick_times = Vec::with_capacity(self.tick_count as usize);
        let mut peak_loaded = 0;
        let mut messages_sent = 0u64;

        for tick in 0..self.tick_count {
            let tick_start = Instant::now();

            for index in 0..self.loaders {
                let loader = self.loader_id(scene, index);
                let pos = scenes::loader_position(scene, index, self.loaders, tick);
                world.update_loader(loader, pos);

                for edit in 0..scene.edits_per_tick {
                    let (dx, dy) = scenes::edit_offset(index, tick, edit);
                    let tile_pos = IVec2::new(pos.x.floor() as i32 + dx, pos.y.floor() as i32 + dy);
                    let id = EDIT_TILES[((tick + edit) as usize) % EDIT_TILES.len()];
                    // Rejected edits are logged by the world.
                    let _ = world.set_tile(tile_pos, TileLayer::Foreground, Tile::new(id, 0));
                }
            }

            if scene.autosave_every > 0 && tick > 0 && tick % scene.autosave_every == 0 {
                world.save_all();
            }

            world.tick(TICK_DT);
            messages_sent += world.drain_outbound().len() as u64;
            world.drain_visual_updates();
            world.drain_job_events();

            tick_times.push(tick_start.elapsed().as_secs_f64() * 1000.0);
            peak_loaded = peak_loaded.max(world.loaded_count());
        }

        let final_loaded = world.loaded_count();
        let shutdown_start = Instant::now();
        world.shutdown();
        let shutdown_ms = shutdown_start.elapsed().as_secs_f64() * 1000.0;
        let stats = world.stats();

        let timings = compute_timings(&tick_times);
        log::info!(
            "  Done: mean={:.3}ms, p95={:.3}ms, peak chunks={}, shutdown={:.1}ms",
            timings.mean_ms,
            timings.p95_ms,
            peak_loaded,
            shutdown_ms
        );

        Ok(BenchmarkResult {
            scene_name: scene.name.to_string(),
            loaders: self.loaders,
            tick_count: self.tick_count,
            peak_loaded_chunks: peak_loaded,
            final_loaded_chunks: final_loaded,
            jobs_completed: stats.jobs_completed,
            chunks_written: stats.chunks_written,
            messages_sent,
            shutdown_ms,
            timings,
        })
    }
}

/// Compute timing statistics from a list of tick times in milliseconds.
pub fn compute_timings(times: &[f64]) -> TimingSeries {
    if times.is_empty() {
        return TimingSeries {
            mean_ms: 0.0,
            median_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
        };
    }

    let mut sorted = times.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };
    let p95_idx = ((n as f64) * 0.95).ceil() as usize;
    let p99_idx = ((n as f64) * 0.99).ceil() as usize;

    TimingSeries {
        mean_ms: mean,
        median_ms: median,
        p95_ms: sorted[p95_idx.min(n - 1)],
        p99_ms: sorted[p99_idx.min(n - 1)],
        min_ms: sorted[0],
        max_ms: sorted[n - 1],
    }
}
