use glam::Vec2;
use tilestream_core::constants::CHUNK_SIZE;

/// How loaders move during a soak scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    /// Loaders never move; measures steady-state tick cost.
    Stationary,
    /// Loaders walk outward in evenly spaced directions.
    Walking,
    /// Loaders orbit the origin, constantly crossing chunk borders.
    Orbiting,
}

/// Configuration for a single soak scene.
pub struct SceneConfig {
    pub name: &'static str,
    pub motion: Motion,
    /// Tiles travelled per tick.
    pub speed: f32,
    /// Edits per loader per tick.
    pub edits_per_tick: u32,
    /// Ticks between autosaves. 0 disables autosave.
    pub autosave_every: u32,
    /// Half of the loaders connect as remote peers.
    pub remote_loaders: bool,
}

/// Return the standard suite of soak scenes.
pub fn standard_scenes() -> Vec<SceneConfig> {
    vec![
        SceneConfig {
            name: "stationary",
            motion: Motion::Stationary,
            speed: 0.0,
            edits_per_tick: 0,
            autosave_every: 0,
            remote_loaders: false,
        },
        SceneConfig {
            name: "walking",
            motion: Motion::Walking,
            speed: 2.0,
            edits_per_tick: 0,
            autosave_every: 0,
            remote_loaders: false,
        },
        SceneConfig {
            name: "walking-edits",
            motion: Motion::Walking,
            speed: 2.0,
            edits_per_tick: 4,
            autosave_every: 60,
            remote_loaders: false,
        },
        SceneConfig {
            name: "orbit-remote",
            motion: Motion::Orbiting,
            speed: 3.0,
            edits_per_tick: 1,
            autosave_every: 120,
            remote_loaders: true,
        },
    ]
}

/// World position of loader `index` (of `count`) at `tick`.
pub fn loader_position(config: &SceneConfig, index: u32, count: u32, tick: u32) -> Vec2 {
    let angle = std::f32::consts::TAU * index as f32 / count.max(1) as f32;
    let dir = Vec2::new(angle.cos(), angle.sin());
    let travelled = config.speed * tick as f32;
    match config.motion {
        Motion::Stationary => dir * (index as f32 * CHUNK_SIZE as f32 * 0.5),
        Motion::Walking => dir * travelled,
        Motion::Orbiting => {
            let radius = CHUNK_SIZE as f32 * 4.0;
            let theta = angle + travelled / radius;
            Vec2::new(theta.cos(), theta.sin()) * radius
        }
    }
}

/// Deterministic edit offset near a loader, in tiles.
pub fn edit_offset(index: u32, tick: u32, edit: u32) -> (i32, i32) {
    let h = (index.wrapping_mul(73_856_093) ^ tick.wrapping_mul(19_349_663) ^ edit.wrapping_mul(83_492_791))
        % 1024;
    ((h % 32) as i32 - 16, (h / 32) as i32 - 16)
}
