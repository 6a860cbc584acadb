use std::collections::HashSet;

use tilestream_core::constants::TILES_PER_LAYER;
use tilestream_core::symbols;
use tilestream_core::{ChunkData, EntityRecord, MobileChunk, TileLayer, TileTable};

use crate::error::PersistError;
use crate::format::*;

/// Serialize a chunk's palette and every edited layer.
///
/// Layout: palette count (u8), palette names as (namespace, id) pairs,
/// then per edited layer: layer name, TILES_PER_LAYER index bytes
/// (0 = empty, n = palette[n - 1]), TILES_PER_LAYER u16 bitmasks.
pub fn encode_chunk(chunk: &ChunkData, table: &TileTable) -> Result<Vec<u8>, PersistError> {
    let layers: Vec<TileLayer> = chunk.edited_layers().collect();
    encode_chunk_layers(chunk, table, &layers)
}

/// Serialize a chunk with an explicit layer selection. Replication uses
/// this to ship every layer, generated or edited.
pub fn encode_chunk_layers(
    chunk: &ChunkData,
    table: &TileTable,
    layers: &[TileLayer],
) -> Result<Vec<u8>, PersistError> {
    let mut w = RecordWriter::with_capacity(1 + layers.len() * TILES_PER_LAYER * 3);
    write_tile_section(&mut w, chunk, table, layers)?;
    Ok(w.into_bytes())
}

/// Serialize a movable chunk: physical prefix followed by the tile section.
pub fn encode_mobile_chunk(
    mobile: &MobileChunk,
    table: &TileTable,
) -> Result<Vec<u8>, PersistError> {
    let layers: Vec<TileLayer> = mobile.data.edited_layers().collect();
    let mut w = RecordWriter::with_capacity(MOBILE_PREFIX_SIZE + 1 + layers.len() * TILES_PER_LAYER * 3);

    let body = &mobile.body;
    w.f32(body.position.x);
    w.f32(body.position.y);
    w.f32(body.position.z);
    w.f32(body.collider_offset.x);
    w.f32(body.collider_offset.y);
    w.f32(body.collider_size.x);
    w.f32(body.collider_size.y);
    let restricted = mobile.data.restricted_size();
    w.i32(restricted.x);
    w.i32(restricted.y);
    w.f32(body.velocity.x);
    w.f32(body.velocity.y);

    write_tile_section(&mut w, &mobile.data, table, &layers)?;
    Ok(w.into_bytes())
}

/// Serialize an entity: position then a length-prefixed opaque payload.
pub fn encode_entity(entity: &EntityRecord) -> Vec<u8> {
    let mut w = RecordWriter::with_capacity(12 + entity.payload.len());
    w.f32(entity.position.x);
    w.f32(entity.position.y);
    w.u32(entity.payload.len() as u32);
    w.bytes(&entity.payload);
    w.into_bytes()
}

/// Palette entries are written only when a written layer uses them and
/// the tile table can name them. Cells whose tile cannot be named are
/// written as empty and logged; the rest of the record is unaffected.
fn write_tile_section(
    w: &mut RecordWriter,
    chunk: &ChunkData,
    table: &TileTable,
    layers: &[TileLayer],
) -> Result<(), PersistError> {
    let used: HashSet<u32> = layers
        .iter()
        .flat_map(|&layer| chunk.layer_tiles(layer))
        .filter(|t| !t.is_empty())
        .map(|t| t.global_id)
        .collect();

    // In-memory palette index -> on-disk palette index.
    let palette = chunk.palette();
    let mut remap: Vec<Option<u8>> = Vec::with_capacity(palette.len());
    let mut names = Vec::new();
    let mut unregistered = Vec::new();
    for &global_id in palette.entries() {
        if !used.contains(&global_id) {
            remap.push(None);
            continue;
        }
        match table.name_of(global_id).and_then(symbols::split_name) {
            Some(name) => {
                remap.push(Some(names.len() as u8));
                names.push(name);
            }
            None => {
                unregistered.push(global_id);
                remap.push(None);
            }
        }
    }

    let count =
        u8::try_from(names.len()).map_err(|_| PersistError::PaletteTooLarge(names.len()))?;
    w.u8(count);
    for (namespace, id) in names {
        w.name(namespace)?;
        w.name(id)?;
    }
    if !unregistered.is_empty() {
        log::warn!(
            "chunk {}: tiles {:?} have no registered name and are written as empty",
            chunk.coord(),
            unregistered
        );
    }

    for &layer in layers {
        w.name(layer.name())?;
        let tiles = chunk.layer_tiles(layer);

        let mut dropped = 0usize;
        for tile in tiles {
            let byte = if tile.is_empty() {
                0
            } else {
                let written = palette
                    .index_of(tile.global_id)
                    .and_then(|idx| remap.get(idx as usize).copied().flatten());
                match written {
                    Some(idx) => idx + 1,
                    None => {
                        dropped += 1;
                        0
                    }
                }
            };
            w.u8(byte);
        }
        if dropped > 0 {
            log::warn!(
                "chunk {} layer {}: {} tiles could not be encoded and were written as empty",
                chunk.coord(),
                layer.name(),
                dropped
            );
        }

        for tile in tiles {
            w.u16(tile.bitmask);
        }
    }

    Ok(())
}
