use glam::IVec2;

use crate::constants::{CHUNK_SIZE, EMPTY_TILE_ID};

/// Chunk coordinate in chunk-space (each unit = CHUNK_SIZE tiles).
pub type ChunkCoord = IVec2;

/// World coordinate in tile-space.
pub type TileCoord = IVec2;

/// Region coordinate in region-space (each unit = chunks_per_region_side chunks).
pub type RegionCoord = IVec2;

/// A chunk coordinate packed into a single 64-bit map key.
///
/// x occupies the high 32 bits and y the low 32 bits, both as raw
/// two's-complement, so the mapping is a bijection over all i32 pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey(pub u64);

impl ChunkKey {
    pub fn from_coord(coord: ChunkCoord) -> Self {
        Self(((coord.x as u32 as u64) << 32) | (coord.y as u32 as u64))
    }

    pub fn coord(self) -> ChunkCoord {
        IVec2::new((self.0 >> 32) as u32 as i32, self.0 as u32 as i32)
    }
}

impl From<ChunkCoord> for ChunkKey {
    fn from(coord: ChunkCoord) -> Self {
        Self::from_coord(coord)
    }
}

/// One tile cell. `global_id == 0` means empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tile {
    pub global_id: u32,
    pub bitmask: u16,
}

impl Tile {
    pub const EMPTY: Tile = Tile {
        global_id: EMPTY_TILE_ID,
        bitmask: 0,
    };

    pub fn new(global_id: u32, bitmask: u16) -> Self {
        Self { global_id, bitmask }
    }

    pub fn is_empty(&self) -> bool {
        self.global_id == EMPTY_TILE_ID
    }
}

/// Tile layers stored per chunk, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TileLayer {
    Background = 0,
    Main = 1,
    Foreground = 2,
}

impl TileLayer {
    pub const ALL: [TileLayer; 3] = [TileLayer::Background, TileLayer::Main, TileLayer::Foreground];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Symbolic name written into chunk records.
    pub fn name(self) -> &'static str {
        match self {
            TileLayer::Background => "background",
            TileLayer::Main => "main",
            TileLayer::Foreground => "foreground",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.name() == name)
    }
}

/// Identity of a consumer that can require a chunk to be resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoaderId {
    /// A loader on this machine (local player, autosave pin, tooling).
    Local(u32),
    /// A networked peer; resident chunks are replicated to it.
    Remote(u32),
}

impl LoaderId {
    pub fn is_remote(&self) -> bool {
        matches!(self, LoaderId::Remote(_))
    }
}

/// Identity of a dynamic object tracked by the region index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectId {
    /// A movable chunk (`mobile_chunk_data/{uid}.mdat`).
    Mobile(u32),
    /// An entity (`entity_data/{uid}.edat`).
    Entity(u32),
}

impl ObjectId {
    pub fn uid(&self) -> u32 {
        match *self {
            ObjectId::Mobile(uid) | ObjectId::Entity(uid) => uid,
        }
    }
}

/// Chunk containing a tile coordinate (floor division, so negatives round down).
pub fn chunk_of_tile(tile: TileCoord) -> ChunkCoord {
    let cs = CHUNK_SIZE as i32;
    IVec2::new(tile.x.div_euclid(cs), tile.y.div_euclid(cs))
}

/// Local offset of a tile coordinate inside its chunk, in 0..CHUNK_SIZE.
pub fn local_of_tile(tile: TileCoord) -> (usize, usize) {
    let cs = CHUNK_SIZE as i32;
    (tile.x.rem_euclid(cs) as usize, tile.y.rem_euclid(cs) as usize)
}

/// Chunk containing a continuous world position measured in tiles.
pub fn chunk_of_position(x: f32, y: f32) -> ChunkCoord {
    chunk_of_tile(IVec2::new(x.floor() as i32, y.floor() as i32))
}

/// Region containing a chunk coordinate.
pub fn region_of_chunk(chunk: ChunkCoord, chunks_per_side: u32) -> RegionCoord {
    let side = chunks_per_side.max(1) as i32;
    IVec2::new(chunk.x.div_euclid(side), chunk.y.div_euclid(side))
}
