use glam::{Vec2, Vec3};

use crate::chunk::ChunkData;
use crate::types::{chunk_of_position, ChunkCoord};

/// Physical state carried alongside a movable chunk's tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MobileBody {
    /// World position in tile units; z orders overlapping bodies.
    pub position: Vec3,
    pub collider_offset: Vec2,
    pub collider_size: Vec2,
    pub velocity: Vec2,
}

/// A chunk that moves through the world independently of the static grid.
#[derive(Debug, Clone)]
pub struct MobileChunk {
    pub uid: u32,
    pub data: ChunkData,
    pub body: MobileBody,
}

impl MobileChunk {
    /// Static chunk the body currently sits in.
    pub fn location(&self) -> ChunkCoord {
        chunk_of_position(self.body.position.x, self.body.position.y)
    }
}

/// Persisted state of an entity. Gameplay fields are opaque to streaming.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityRecord {
    pub uid: u32,
    /// World position in tile units.
    pub position: Vec2,
    pub payload: Vec<u8>,
}

impl EntityRecord {
    pub fn location(&self) -> ChunkCoord {
        chunk_of_position(self.position.x, self.position.y)
    }
}
