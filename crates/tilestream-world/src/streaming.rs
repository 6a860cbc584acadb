use std::collections::{HashMap, HashSet};

use glam::Vec2;
use tilestream_core::types::{chunk_of_position, ChunkCoord, LoaderId};

/// Chunk-space delta produced by moving a loader.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamDelta {
    /// Coordinates that entered the loader's box, in row order.
    pub entered: Vec<ChunkCoord>,
    /// Coordinates that left the loader's box, in row order.
    pub exited: Vec<ChunkCoord>,
}

impl StreamDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// Policy for which chunks each loader keeps resident.
/// A loader holds the square of chunks within `radius` of the chunk it
/// stands in.
pub struct StreamingPolicy {
    radius: i32,
    centers: HashMap<LoaderId, ChunkCoord>,
}

impl StreamingPolicy {
    pub fn new(radius: i32) -> Self {
        Self {
            radius: radius.max(0),
            centers: HashMap::new(),
        }
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    /// Current center chunk for a loader, if it is tracked.
    pub fn center(&self, loader: LoaderId) -> Option<ChunkCoord> {
        self.centers.get(&loader).copied()
    }

    pub fn loaders(&self) -> impl Iterator<Item = LoaderId> + '_ {
        self.centers.keys().copied()
    }

    /// All chunk coordinates in the box around `center`.
    pub fn bbox(&self, center: ChunkCoord) -> Vec<ChunkCoord> {
        let r = self.radius;
        let mut coords = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for y in (center.y - r)..=(center.y + r) {
            for x in (center.x - r)..=(center.x + r) {
                coords.push(ChunkCoord::new(x, y));
            }
        }
        coords
    }

    /// Move a loader to a world position. A new loader enters its whole box.
    pub fn update(&mut self, loader: LoaderId, position: Vec2) -> StreamDelta {
        let center = chunk_of_position(position.x, position.y);
        let previous = self.centers.insert(loader, center);
        match previous {
            Some(prev) if prev == center => StreamDelta::default(),
            Some(prev) => {
                let old: HashSet<ChunkCoord> = self.bbox(prev).into_iter().collect();
                let new_box = self.bbox(center);
                let new: HashSet<ChunkCoord> = new_box.iter().copied().collect();
                StreamDelta {
                    entered: new_box.into_iter().filter(|c| !old.contains(c)).collect(),
                    exited: self
                        .bbox(prev)
                        .into_iter()
                        .filter(|c| !new.contains(c))
                        .collect(),
                }
            }
            None => StreamDelta {
                entered: self.bbox(center),
                exited: Vec::new(),
            },
        }
    }

    /// Stop tracking a loader; its whole box exits.
    pub fn remove(&mut self, loader: LoaderId) -> StreamDelta {
        match self.centers.remove(&loader) {
            Some(center) => StreamDelta {
                entered: Vec::new(),
                exited: self.bbox(center),
            },
            None => StreamDelta::default(),
        }
    }
}
