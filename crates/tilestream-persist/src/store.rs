use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tilestream_core::{ChunkCoord, ChunkData, EntityRecord, MobileChunk, RegionCoord, TileTable};

use crate::compress;
use crate::error::PersistError;
use crate::layout::SaveLayout;
use crate::load::{self, DecodeReport};
use crate::region::{self, SubRegionRecord};
use crate::save;

/// File-backed storage for one dimension of a save slot.
///
/// Every record is deflate-compressed. A record that fails to inflate or
/// decode is deleted and reported as absent, so callers fall back to
/// generation instead of retrying a broken file forever. Shared between
/// worker threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct WorldStorage {
    layout: SaveLayout,
    tiles: Arc<TileTable>,
}

impl WorldStorage {
    pub fn new(layout: SaveLayout, tiles: Arc<TileTable>) -> Self {
        Self { layout, tiles }
    }

    pub fn layout(&self) -> &SaveLayout {
        &self.layout
    }

    pub fn tiles(&self) -> &TileTable {
        &self.tiles
    }

    /// Load a chunk record into `chunk` (which must be reset to `coord`).
    ///
    /// Returns `Ok(None)` when no usable record exists; `chunk` is then
    /// blank again.
    pub fn read_chunk(
        &self,
        coord: ChunkCoord,
        chunk: &mut ChunkData,
    ) -> Result<Option<DecodeReport>, PersistError> {
        let path = self.layout.chunk_path(coord);
        let tiles = &self.tiles;
        let result = read_record(&path, |bytes| load::decode_chunk(bytes, tiles, chunk))?;
        match result {
            Some(report) => {
                log_inconsistencies(&path, &report);
                Ok(Some(report))
            }
            None => {
                chunk.reset(coord);
                Ok(None)
            }
        }
    }

    /// Persist a chunk. Chunks without edited layers have nothing worth
    /// keeping; their stale record, if any, is left as is.
    pub fn write_chunk(&self, chunk: &ChunkData) -> Result<bool, PersistError> {
        if !chunk.has_edits() {
            return Ok(false);
        }
        let bytes = save::encode_chunk(chunk, &self.tiles)?;
        write_record(&self.layout.chunk_path(chunk.coord()), &bytes)?;
        Ok(true)
    }

    pub fn read_region(
        &self,
        coord: RegionCoord,
        sub_region_count: usize,
    ) -> Result<Option<Vec<SubRegionRecord>>, PersistError> {
        let path = self.layout.region_path(coord);
        read_record(&path, |bytes| region::decode_region(bytes, sub_region_count))
    }

    pub fn write_region(
        &self,
        coord: RegionCoord,
        sub_regions: &[SubRegionRecord],
    ) -> Result<(), PersistError> {
        let bytes = region::encode_region(sub_regions)?;
        write_record(&self.layout.region_path(coord), &bytes)
    }

    pub fn read_mobile(&self, uid: u32) -> Result<Option<MobileChunk>, PersistError> {
        let path = self.layout.mobile_path(uid);
        let tiles = &self.tiles;
        let result = read_record(&path, |bytes| load::decode_mobile_chunk(uid, bytes, tiles))?;
        Ok(result.map(|(mobile, report)| {
            log_inconsistencies(&path, &report);
            mobile
        }))
    }

    pub fn write_mobile(&self, mobile: &MobileChunk) -> Result<(), PersistError> {
        let bytes = save::encode_mobile_chunk(mobile, &self.tiles)?;
        write_record(&self.layout.mobile_path(mobile.uid), &bytes)
    }

    pub fn read_entity(&self, uid: u32) -> Result<Option<EntityRecord>, PersistError> {
        let path = self.layout.entity_path(uid);
        read_record(&path, |bytes| load::decode_entity(uid, bytes))
    }

    pub fn write_entity(&self, entity: &EntityRecord) -> Result<(), PersistError> {
        let bytes = save::encode_entity(entity);
        write_record(&self.layout.entity_path(entity.uid), &bytes)
    }
}

/// Read, inflate, and decode one record.
///
/// Missing files yield `Ok(None)`. Corrupt files are deleted and also
/// yield `Ok(None)`. Only I/O failures other than not-found propagate.
fn read_record<T>(
    path: &Path,
    decode: impl FnOnce(&[u8]) -> Result<T, PersistError>,
) -> Result<Option<T>, PersistError> {
    let compressed = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let decoded = compress::decompress(&compressed).and_then(|raw| decode(&raw));
    match decoded {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            log::warn!("Corrupt record {} ({}), deleting", path.display(), e);
            if let Err(remove_err) = fs::remove_file(path) {
                log::error!("Failed to delete {}: {}", path.display(), remove_err);
            }
            Ok(None)
        }
    }
}

/// Compress and write a record, replacing any previous file only once
/// the new contents are fully on disk.
fn write_record(path: &Path, raw: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let compressed = compress::compress(raw)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, compressed)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn log_inconsistencies(path: &Path, report: &DecodeReport) {
    if !report.unknown_tiles.is_empty() {
        log::warn!(
            "{}: unknown tile types {:?} cleared to empty",
            path.display(),
            report.unknown_tiles
        );
    }
    if report.bad_indices > 0 {
        log::warn!(
            "{}: {} cells referenced palette entries out of range",
            path.display(),
            report.bad_indices
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::WorldMode;
    use glam::{IVec2, Vec2};
    use tilestream_core::{Tile, TileDef, TileLayer};

    fn storage(root: &Path) -> WorldStorage {
        let tiles = TileTable::from_defs(vec![
            TileDef {
                id: 1,
                name: "core:stone".into(),
            },
            TileDef {
                id: 2,
                name: "core:dirt".into(),
            },
        ])
        .expect("valid table");
        WorldStorage::new(
            SaveLayout::new(root, "slot", WorldMode::Play, "overworld"),
            Arc::new(tiles),
        )
    }

    #[test]
    fn test_chunk_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());
        let coord = IVec2::new(-1, 4);

        let mut chunk = ChunkData::new(coord);
        chunk.set_tile(TileLayer::Main, 3, 3, Tile::new(2, 9)).expect("set");
        assert!(storage.write_chunk(&chunk).expect("write"));
        assert!(storage.layout().chunk_path(coord).exists());

        let mut loaded = ChunkData::new(coord);
        let report = storage.read_chunk(coord, &mut loaded).expect("read");
        assert!(report.is_some());
        assert!(loaded.same_content(&chunk));
    }

    #[test]
    fn test_missing_chunk_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());
        let mut chunk = ChunkData::new(IVec2::ZERO);
        assert!(storage.read_chunk(IVec2::ZERO, &mut chunk).expect("read").is_none());
    }

    #[test]
    fn test_unedited_chunk_not_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());
        let mut chunk = ChunkData::new(IVec2::ZERO);
        chunk.place_tile(TileLayer::Main, 0, 0, Tile::new(1, 0)).expect("place");
        assert!(!storage.write_chunk(&chunk).expect("write"));
        assert!(!storage.layout().chunk_path(IVec2::ZERO).exists());
    }

    #[test]
    fn test_corrupt_chunk_deleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());
        let coord = IVec2::new(2, 2);
        let path = storage.layout().chunk_path(coord);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");

        // Valid deflate stream holding a palette entry with a bad symbol.
        let bogus = compress::compress(&[1, 1, 250]).expect("deflate");
        fs::write(&path, bogus).expect("write");

        let mut chunk = ChunkData::new(coord);
        chunk.set_tile(TileLayer::Main, 0, 0, Tile::new(1, 0)).expect("set");
        let result = storage.read_chunk(coord, &mut chunk).expect("read");

        assert!(result.is_none());
        assert!(!path.exists(), "corrupt file should be deleted");
        assert!(!chunk.has_edits());
        assert_eq!(chunk.tile(TileLayer::Main, 0, 0), Tile::EMPTY);
    }

    #[test]
    fn test_undeflatable_region_deleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());
        let coord = IVec2::new(0, 0);
        let path = storage.layout().region_path(coord);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, [0xFFu8, 0x00, 0x13]).expect("write");

        assert!(storage.read_region(coord, 16).expect("read").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_region_and_entity_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = storage(dir.path());
        let subs = vec![
            SubRegionRecord {
                mobile_chunks: vec![3],
                entities: vec![8, 9],
            },
            SubRegionRecord::default(),
        ];
        storage.write_region(IVec2::new(1, 1), &subs).expect("write region");
        assert_eq!(
            storage.read_region(IVec2::new(1, 1), 2).expect("read"),
            Some(subs)
        );

        let entity = EntityRecord {
            uid: 8,
            position: Vec2::new(5.0, 6.0),
            payload: b"hp=10".to_vec(),
        };
        storage.write_entity(&entity).expect("write entity");
        assert_eq!(storage.read_entity(8).expect("read"), Some(entity));
        assert_eq!(storage.read_entity(9).expect("read"), None);
    }
}
