use tilestream_core::constants::CHUNK_SIZE;
use tilestream_core::{ChunkCoord, ChunkData, Tile, TileLayer};

/// Procedural fill invoked when a chunk has no saved record, or when a
/// saved record lacks some layers.
///
/// Implementations run on worker threads and must only touch the chunk
/// they are given.
pub trait ChunkGenerator: Send + Sync {
    /// Populate `layers` of `chunk` (already reset to its coordinate).
    fn generate(&self, chunk: &mut ChunkData, layers: &[TileLayer]);
}

/// Generator that leaves every layer empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyGenerator;

impl ChunkGenerator for EmptyGenerator {
    fn generate(&self, _chunk: &mut ChunkData, _layers: &[TileLayer]) {}
}

/// Global tile IDs the terrain generator places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainTiles {
    pub stone: u32,
    pub dirt: u32,
    pub water: u32,
    /// Background wall behind solid ground.
    pub wall: u32,
}

/// Surface level in world-space tile Y (y grows upward).
const SEA_LEVEL: i32 = 0;

/// Side-view terrain: a noise heightmap over x, stone under a dirt crust,
/// water filling dips below sea level, and a wall layer behind the ground.
pub struct TerrainGenerator {
    /// Permutation table for simplex noise (doubled for wrapping).
    perm: [u8; 512],
    tiles: TerrainTiles,
}

impl TerrainGenerator {
    pub fn new(seed: u64, tiles: TerrainTiles) -> Self {
        let perm = Self::build_permutation(seed);
        Self { perm, tiles }
    }

    /// Tile for one world-space cell of one layer.
    pub fn tile_at(&self, layer: TileLayer, wx: i32, wy: i32) -> Tile {
        let height = self.surface_height(wx);
        let id = match layer {
            TileLayer::Main => {
                if wy < height - 3 {
                    self.tiles.stone
                } else if wy <= height {
                    self.tiles.dirt
                } else if wy <= SEA_LEVEL {
                    self.tiles.water
                } else {
                    0
                }
            }
            TileLayer::Background => {
                if wy <= height {
                    self.tiles.wall
                } else {
                    0
                }
            }
            TileLayer::Foreground => 0,
        };
        Tile::new(id, 0)
    }

    /// Whether a chunk lies entirely above ground and water.
    pub fn is_sky(&self, coord: ChunkCoord) -> bool {
        let cs = CHUNK_SIZE as i32;
        let base_y = coord.y * cs;
        if base_y <= SEA_LEVEL {
            return false;
        }
        let base_x = coord.x * cs;
        (0..cs).all(|lx| self.surface_height(base_x + lx) < base_y)
    }

    /// Surface height at a world-space x using 3-octave simplex noise.
    fn surface_height(&self, wx: i32) -> i32 {
        let x = wx as f64;

        let scale = 0.02;
        let mut h = 0.0f64;
        h += self.simplex2d(x * scale, 0.0) * 16.0;
        h += self.simplex2d(x * scale * 2.0 + 100.0, 100.0) * 8.0;
        h += self.simplex2d(x * scale * 4.0 + 200.0, 200.0) * 4.0;

        (SEA_LEVEL as f64 + 4.0 + h).round() as i32
    }

    /// 2D simplex noise. Returns value in [-1, 1].
    fn simplex2d(&self, x: f64, z: f64) -> f64 {
        const F2: f64 = 0.5 * (1.7320508075688772 - 1.0); // (sqrt(3)-1)/2
        const G2: f64 = (3.0 - 1.7320508075688772) / 6.0; // (3-sqrt(3))/6

        let s = (x + z) * F2;
        let i = (x + s).floor();
        let j = (z + s).floor();

        let t = (i + j) * G2;
        let x0 = x - (i - t);
        let y0 = z - (j - t);

        let (i1, j1) = if x0 > y0 { (1.0, 0.0) } else { (0.0, 1.0) };

        let x1 = x0 - i1 + G2;
        let y1 = y0 - j1 + G2;
        let x2 = x0 - 1.0 + 2.0 * G2;
        let y2 = y0 - 1.0 + 2.0 * G2;

        let ii = (i as i32 & 255) as usize;
        let jj = (j as i32 & 255) as usize;

        let gi0 = self.perm[ii + self.perm[jj] as usize] as usize % 12;
        let gi1 = self.perm[ii + i1 as usize + self.perm[jj + j1 as usize] as usize] as usize % 12;
        let gi2 = self.perm[ii + 1 + self.perm[jj + 1] as usize] as usize % 12;

        let n0 = Self::corner_contribution(gi0, x0, y0);
        let n1 = Self::corner_contribution(gi1, x1, y1);
        let n2 = Self::corner_contribution(gi2, x2, y2);

        // Scale to [-1, 1]
        70.0 * (n0 + n1 + n2)
    }

    fn corner_contribution(gi: usize, x: f64, y: f64) -> f64 {
        let t = 0.5 - x * x - y * y;
        if t < 0.0 {
            0.0
        } else {
            let t = t * t;
            t * t * Self::grad2d(gi, x, y)
        }
    }

    fn grad2d(hash: usize, x: f64, y: f64) -> f64 {
        // 12 gradient directions for 2D simplex
        const GRAD: [[f64; 2]; 12] = [
            [1.0, 1.0],
            [-1.0, 1.0],
            [1.0, -1.0],
            [-1.0, -1.0],
            [1.0, 0.0],
            [-1.0, 0.0],
            [0.0, 1.0],
            [0.0, -1.0],
            [1.0, 1.0],
            [-1.0, 1.0],
            [1.0, -1.0],
            [-1.0, -1.0],
        ];
        let g = &GRAD[hash % 12];
        g[0] * x + g[1] * y
    }

    fn build_permutation(seed: u64) -> [u8; 512] {
        let mut p: [u8; 256] = [0; 256];
        for (i, val) in p.iter_mut().enumerate() {
            *val = i as u8;
        }

        // Fisher-Yates shuffle with seed
        let mut rng = seed;
        for i in (1..256).rev() {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let j = (rng >> 33) as usize % (i + 1);
            p.swap(i, j);
        }

        let mut perm = [0u8; 512];
        for (i, val) in perm.iter_mut().enumerate() {
            *val = p[i & 255];
        }
        perm
    }
}

impl ChunkGenerator for TerrainGenerator {
    fn generate(&self, chunk: &mut ChunkData, layers: &[TileLayer]) {
        let coord = chunk.coord();
        if self.is_sky(coord) {
            return;
        }
        let cs = CHUNK_SIZE as i32;
        let base_x = coord.x * cs;
        let base_y = coord.y * cs;

        for &layer in layers {
            for lx in 0..CHUNK_SIZE {
                for ly in 0..CHUNK_SIZE {
                    let tile = self.tile_at(layer, base_x + lx as i32, base_y + ly as i32);
                    if tile.is_empty() {
                        continue;
                    }
                    // Four tile types can never fill a palette.
                    if let Err(e) = chunk.place_tile(layer, lx, ly, tile) {
                        log::warn!("terrain fill of chunk {} stopped: {}", coord, e);
                        return;
                    }
                }
            }
        }
    }
}
