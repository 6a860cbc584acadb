use std::collections::HashMap;

use tilestream_core::{ChunkCoord, ChunkData, ChunkKey};

/// In-memory map of resident chunks plus a free list of recycled chunk
/// allocations.
///
/// Evicted chunks go back to the free list instead of being dropped, so
/// steady-state streaming does not reallocate tile grids.
pub struct ChunkStore {
    chunks: HashMap<ChunkKey, Box<ChunkData>>,
    /// Blank chunks ready for reuse.
    free: Vec<Box<ChunkData>>,
    /// Upper bound on retained free chunks.
    free_capacity: usize,
}

impl Default for ChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::with_free_capacity(256)
    }

    pub fn with_free_capacity(free_capacity: usize) -> Self {
        Self {
            chunks: HashMap::new(),
            free: Vec::new(),
            free_capacity,
        }
    }

    /// A blank chunk bound to `coord`, reused from the free list if possible.
    pub fn take_blank(&mut self, coord: ChunkCoord) -> Box<ChunkData> {
        match self.free.pop() {
            Some(mut chunk) => {
                chunk.reset(coord);
                chunk
            }
            None => Box::new(ChunkData::new(coord)),
        }
    }

    /// Make a chunk resident. A chunk already at the same coordinate is
    /// recycled and reported.
    pub fn add(&mut self, chunk: Box<ChunkData>) -> bool {
        let key = ChunkKey::from_coord(chunk.coord());
        match self.chunks.insert(key, chunk) {
            Some(previous) => {
                log::warn!(
                    "chunk {} added while already resident; previous copy recycled",
                    previous.coord()
                );
                self.recycle(previous);
                true
            }
            None => false,
        }
    }

    /// Take a resident chunk out of the store.
    pub fn remove(&mut self, coord: ChunkCoord) -> Option<Box<ChunkData>> {
        self.chunks.remove(&ChunkKey::from_coord(coord))
    }

    /// Return a chunk allocation to the free list.
    pub fn recycle(&mut self, mut chunk: Box<ChunkData>) {
        if self.free.len() < self.free_capacity {
            let coord = chunk.coord();
            chunk.reset(coord);
            self.free.push(chunk);
        }
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<&ChunkData> {
        self.chunks.get(&ChunkKey::from_coord(coord)).map(|c| &**c)
    }

    pub fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut ChunkData> {
        self.chunks
            .get_mut(&ChunkKey::from_coord(coord))
            .map(|c| &mut **c)
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&ChunkKey::from_coord(coord))
    }

    /// Iterator over all resident chunks.
    pub fn iter(&self) -> impl Iterator<Item = &ChunkData> {
        self.chunks.values().map(|c| &**c)
    }

    /// Coordinates of all resident chunks.
    pub fn coords(&self) -> Vec<ChunkCoord> {
        self.chunks.keys().map(|k| k.coord()).collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
