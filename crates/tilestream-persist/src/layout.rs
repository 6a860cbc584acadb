use std::path::{Path, PathBuf};

use tilestream_core::{ChunkCoord, RegionCoord};

use crate::format::*;

/// Which copy of a save slot is being streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorldMode {
    Edit,
    Play,
}

impl WorldMode {
    pub fn dir_name(self) -> &'static str {
        match self {
            WorldMode::Edit => "edit",
            WorldMode::Play => "play",
        }
    }
}

/// Directory layout of one dimension of one save slot:
///
/// ```text
/// {root}/{slot}/{edit|play}/{dimension}/
///     chunk_data/{x}_{y}.cdat
///     mobile_chunk_data/{uid}.mdat
///     entity_regions/{x}_{y}.erg
///     entity_data/{uid}.edat
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveLayout {
    base: PathBuf,
}

impl SaveLayout {
    pub fn new(root: impl AsRef<Path>, slot: &str, mode: WorldMode, dimension: &str) -> Self {
        let base = root
            .as_ref()
            .join(slot)
            .join(mode.dir_name())
            .join(dimension);
        Self { base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn chunk_dir(&self) -> PathBuf {
        self.base.join("chunk_data")
    }

    pub fn mobile_dir(&self) -> PathBuf {
        self.base.join("mobile_chunk_data")
    }

    pub fn region_dir(&self) -> PathBuf {
        self.base.join("entity_regions")
    }

    pub fn entity_dir(&self) -> PathBuf {
        self.base.join("entity_data")
    }

    pub fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.chunk_dir()
            .join(format!("{}_{}.{}", coord.x, coord.y, CHUNK_EXT))
    }

    pub fn mobile_path(&self, uid: u32) -> PathBuf {
        self.mobile_dir().join(format!("{uid}.{MOBILE_EXT}"))
    }

    pub fn region_path(&self, coord: RegionCoord) -> PathBuf {
        self.region_dir()
            .join(format!("{}_{}.{}", coord.x, coord.y, REGION_EXT))
    }

    pub fn entity_path(&self, uid: u32) -> PathBuf {
        self.entity_dir().join(format!("{uid}.{ENTITY_EXT}"))
    }
}
