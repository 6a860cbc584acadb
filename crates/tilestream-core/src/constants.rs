//! Single source of truth for shared constants.
//! Both the codec and the world crate size their buffers from these.

/// Side length of a chunk in tiles.
pub const CHUNK_SIZE: usize = 32;

/// Tiles per layer of one chunk (CHUNK_SIZE^2).
pub const TILES_PER_LAYER: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Number of tile layers stored per chunk.
pub const LAYER_COUNT: usize = 3;

/// Maximum palette entries per chunk. Palette indices are written as
/// `index + 1` in a single byte, with 0 reserved for the empty tile.
pub const MAX_PALETTE_ENTRIES: usize = 255;

/// Global tile ID of the empty tile.
pub const EMPTY_TILE_ID: u32 = 0;

/// Default number of chunks along one side of a region.
pub const DEFAULT_CHUNKS_PER_REGION_SIDE: u32 = 4;

/// Default delay before an unreferenced chunk is evicted (seconds of sim time).
pub const DEFAULT_EVICTION_DELAY_SECS: f64 = 5.0;

/// Default cap on chunk jobs started per tick.
pub const DEFAULT_MAX_JOBS_PER_TICK: usize = 8;

/// Default number of background worker threads.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default loader view radius in chunks (square, Chebyshev distance).
pub const DEFAULT_LOADER_RADIUS: i32 = 2;

/// Default number of ticks a failed cross-region move is retried.
pub const DEFAULT_MOVE_RETRY_LIMIT: u32 = 3;
