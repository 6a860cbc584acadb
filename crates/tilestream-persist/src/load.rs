use glam::{IVec2, Vec2, Vec3};
use tilestream_core::constants::TILES_PER_LAYER;
use tilestream_core::{
    ChunkData, EntityRecord, MobileBody, MobileChunk, Palette, Tile, TileLayer, TileTable,
};

use crate::error::PersistError;
use crate::format::*;

/// Recoverable inconsistencies found while decoding a tile section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Layers present in the record, in record order.
    pub layers: Vec<TileLayer>,
    /// Palette names that no longer resolve to a registered tile.
    /// Cells referencing them were cleared.
    pub unknown_tiles: Vec<String>,
    /// Cells whose palette index was out of range and were cleared.
    pub bad_indices: usize,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.unknown_tiles.is_empty() && self.bad_indices == 0
    }
}

/// Decode a chunk record into `chunk`.
///
/// `chunk` must be freshly reset to its coordinate. Layers found in the
/// record are flagged as edited so they are written back on the next
/// save; layers absent from the record are left empty for the caller to
/// regenerate. On error the chunk contents are unspecified and the
/// caller should reset it.
pub fn decode_chunk(
    record: &[u8],
    table: &TileTable,
    chunk: &mut ChunkData,
) -> Result<DecodeReport, PersistError> {
    let mut r = RecordReader::new(record);
    read_tile_section(&mut r, table, chunk)
}

/// Decode a movable chunk record.
pub fn decode_mobile_chunk(
    uid: u32,
    record: &[u8],
    table: &TileTable,
) -> Result<(MobileChunk, DecodeReport), PersistError> {
    let mut r = RecordReader::new(record);

    let position = Vec3::new(r.f32()?, r.f32()?, r.f32()?);
    let collider_offset = Vec2::new(r.f32()?, r.f32()?);
    let collider_size = Vec2::new(r.f32()?, r.f32()?);
    let restricted = IVec2::new(r.i32()?, r.i32()?);
    let velocity = Vec2::new(r.f32()?, r.f32()?);

    let body = MobileBody {
        position,
        collider_offset,
        collider_size,
        velocity,
    };
    let mut data = ChunkData::new(tilestream_core::chunk_of_position(position.x, position.y));
    data.set_restricted_size(restricted);
    let report = read_tile_section(&mut r, table, &mut data)?;

    Ok((MobileChunk { uid, data, body }, report))
}

/// Decode an entity record.
pub fn decode_entity(uid: u32, record: &[u8]) -> Result<EntityRecord, PersistError> {
    let mut r = RecordReader::new(record);
    let position = Vec2::new(r.f32()?, r.f32()?);
    let len = r.u32()? as usize;
    let payload = r.take(len)?.to_vec();
    r.finish()?;
    Ok(EntityRecord {
        uid,
        position,
        payload,
    })
}

fn read_tile_section(
    r: &mut RecordReader<'_>,
    table: &TileTable,
    chunk: &mut ChunkData,
) -> Result<DecodeReport, PersistError> {
    let mut report = DecodeReport::default();

    // File palette index -> resolved palette index. None marks a name
    // that no longer resolves; its cells decode as empty.
    let count = r.u8()? as usize;
    let mut remap: Vec<Option<u8>> = Vec::with_capacity(count);
    let mut palette = Palette::new();
    for _ in 0..count {
        let namespace = r.name()?;
        let id = r.name()?;
        let full = format!("{namespace}:{id}");
        match table.id_of(&full) {
            // At most 255 names fit the count byte, so insert cannot overflow.
            Some(global_id) => remap.push(palette.insert(global_id).ok()),
            None => {
                report.unknown_tiles.push(full);
                remap.push(None);
            }
        }
    }

    let mut indices = vec![0u8; TILES_PER_LAYER];
    while !r.is_at_end() {
        let layer_name = r.name()?;
        let layer = TileLayer::from_name(&layer_name)
            .ok_or_else(|| PersistError::UnknownLayer(layer_name.clone()))?;
        if report.layers.contains(&layer) {
            return Err(PersistError::DuplicateLayer(layer_name));
        }

        indices.copy_from_slice(r.take(TILES_PER_LAYER)?);
        let mut tiles = Vec::with_capacity(TILES_PER_LAYER);
        for &byte in &indices {
            let bitmask = r.u16()?;
            if byte == 0 {
                tiles.push(Tile::EMPTY);
                continue;
            }
            let resolved = match remap.get(byte as usize - 1) {
                Some(entry) => *entry,
                None => {
                    report.bad_indices += 1;
                    None
                }
            };
            let tile = resolved
                .and_then(|idx| palette.get(idx))
                .map(|global_id| Tile::new(global_id, bitmask))
                .unwrap_or(Tile::EMPTY);
            tiles.push(tile);
        }

        chunk.layer_tiles_mut(layer).copy_from_slice(&tiles);
        chunk.set_layer_edited(layer, true);
        report.layers.push(layer);
    }

    chunk.replace_palette(palette);
    Ok(report)
}
