use tilestream_core::ChunkCoord;

/// Residency change reported to the visual consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkChange {
    Loaded(ChunkCoord),
    Unloaded(ChunkCoord),
}

impl ChunkChange {
    pub fn coord(&self) -> ChunkCoord {
        match *self {
            ChunkChange::Loaded(c) | ChunkChange::Unloaded(c) => c,
        }
    }
}

/// Chunk changes queued for the renderer, drained once per frame.
#[derive(Debug, Default)]
pub struct VisualQueue {
    changes: Vec<ChunkChange>,
}

impl VisualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: ChunkChange) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn drain(&mut self) -> Vec<ChunkChange> {
        std::mem::take(&mut self.changes)
    }
}
