use std::collections::HashSet;

use glam::IVec2;

use crate::constants::*;
use crate::palette::{Palette, PaletteError};
use crate::types::{ChunkCoord, Tile, TileLayer};

/// Tile payload of one chunk: a `[layer][x][y]` grid, its palette, and
/// per-layer edit flags.
///
/// Chunks are recycled rather than dropped, so [`ChunkData::reset`]
/// returns one to a blank state without releasing the grid allocation.
#[derive(Debug, Clone)]
pub struct ChunkData {
    coord: ChunkCoord,
    /// Footprint in tiles. Equal to CHUNK_SIZE for static chunks; movable
    /// chunks may be smaller.
    restricted_size: IVec2,
    tiles: Vec<Tile>,
    palette: Palette,
    edited: [bool; LAYER_COUNT],
}

impl Default for ChunkData {
    fn default() -> Self {
        Self::new(IVec2::ZERO)
    }
}

impl ChunkData {
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            restricted_size: IVec2::splat(CHUNK_SIZE as i32),
            tiles: vec![Tile::EMPTY; LAYER_COUNT * TILES_PER_LAYER],
            palette: Palette::new(),
            edited: [false; LAYER_COUNT],
        }
    }

    /// Clear all content and rebind to `coord`.
    pub fn reset(&mut self, coord: ChunkCoord) {
        self.coord = coord;
        self.restricted_size = IVec2::splat(CHUNK_SIZE as i32);
        self.tiles.fill(Tile::EMPTY);
        self.palette.clear();
        self.edited = [false; LAYER_COUNT];
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn restricted_size(&self) -> IVec2 {
        self.restricted_size
    }

    /// Set the movable footprint, clamped to 1..=CHUNK_SIZE per axis.
    pub fn set_restricted_size(&mut self, size: IVec2) {
        self.restricted_size = size.clamp(IVec2::ONE, IVec2::splat(CHUNK_SIZE as i32));
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    fn index(layer: TileLayer, x: usize, y: usize) -> usize {
        layer.index() * TILES_PER_LAYER + x * CHUNK_SIZE + y
    }

    /// Tile at a local position. Out-of-range positions read as empty.
    pub fn tile(&self, layer: TileLayer, x: usize, y: usize) -> Tile {
        if x >= CHUNK_SIZE || y >= CHUNK_SIZE {
            return Tile::EMPTY;
        }
        self.tiles[Self::index(layer, x, y)]
    }

    /// Edit a tile and flag its layer for saving.
    ///
    /// A new global ID is added to the palette first; if the palette is
    /// full the cell is left untouched and the error is returned.
    pub fn set_tile(
        &mut self,
        layer: TileLayer,
        x: usize,
        y: usize,
        tile: Tile,
    ) -> Result<(), PaletteError> {
        self.place_tile(layer, x, y, tile)?;
        self.edited[layer.index()] = true;
        Ok(())
    }

    /// Write a tile without flagging the layer as edited. Used by
    /// procedural fill, whose output can be regenerated on demand.
    ///
    /// A full palette is compacted before a new ID is rejected, so
    /// entries no longer referenced by any cell free their slot.
    pub fn place_tile(
        &mut self,
        layer: TileLayer,
        x: usize,
        y: usize,
        tile: Tile,
    ) -> Result<(), PaletteError> {
        if x >= CHUNK_SIZE || y >= CHUNK_SIZE {
            return Ok(());
        }
        let cell = Self::index(layer, x, y);
        if !tile.is_empty() && !self.palette.contains(tile.global_id) {
            if self.palette.is_full() {
                self.compact_palette(Some(cell));
            }
            self.palette.insert(tile.global_id)?;
        }
        self.tiles[cell] = tile;
        Ok(())
    }

    /// Drop palette entries no cell uses. `overwritten` names a cell about
    /// to be replaced, whose current tile does not count as a use.
    pub fn compact_palette(&mut self, overwritten: Option<usize>) -> usize {
        let used: HashSet<u32> = self
            .tiles
            .iter()
            .enumerate()
            .filter(|&(i, t)| Some(i) != overwritten && !t.is_empty())
            .map(|(_, t)| t.global_id)
            .collect();
        let removed = self.palette.retain(|id| used.contains(&id));
        if removed > 0 {
            log::debug!("chunk {}: dropped {} unused palette entries", self.coord, removed);
        }
        removed
    }

    /// Raw row of one layer in `[x][y]` order.
    pub fn layer_tiles(&self, layer: TileLayer) -> &[Tile] {
        let start = layer.index() * TILES_PER_LAYER;
        &self.tiles[start..start + TILES_PER_LAYER]
    }

    /// Replace the palette wholesale. Only the decoder uses this; it
    /// writes cells through [`ChunkData::layer_tiles_mut`] afterwards.
    pub fn replace_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    /// Mutable raw row of one layer. Callers must keep every non-empty
    /// global ID present in the palette.
    pub fn layer_tiles_mut(&mut self, layer: TileLayer) -> &mut [Tile] {
        let start = layer.index() * TILES_PER_LAYER;
        &mut self.tiles[start..start + TILES_PER_LAYER]
    }

    pub fn is_layer_edited(&self, layer: TileLayer) -> bool {
        self.edited[layer.index()]
    }

    pub fn set_layer_edited(&mut self, layer: TileLayer, edited: bool) {
        self.edited[layer.index()] = edited;
    }

    /// Layers with unsaved or persisted edits.
    pub fn edited_layers(&self) -> impl Iterator<Item = TileLayer> + '_ {
        TileLayer::ALL.into_iter().filter(|l| self.is_layer_edited(*l))
    }

    pub fn has_edits(&self) -> bool {
        self.edited.iter().any(|&e| e)
    }

    /// Grid and palette equality, ignoring edit flags.
    pub fn same_content(&self, other: &ChunkData) -> bool {
        self.tiles == other.tiles && self.palette.entries() == other.palette.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_tile_updates_palette_and_flag() {
        let mut chunk = ChunkData::new(IVec2::new(2, -3));
        chunk
            .set_tile(TileLayer::Main, 4, 5, Tile::new(17, 0b1010))
            .expect("set");
        assert_eq!(chunk.tile(TileLayer::Main, 4, 5), Tile::new(17, 0b1010));
        assert!(chunk.palette().contains(17));
        assert!(chunk.is_layer_edited(TileLayer::Main));
        assert!(!chunk.is_layer_edited(TileLayer::Background));
    }

    #[test]
    fn test_place_tile_does_not_flag() {
        let mut chunk = ChunkData::new(IVec2::ZERO);
        chunk
            .place_tile(TileLayer::Background, 0, 0, Tile::new(3, 0))
            .expect("place");
        assert!(!chunk.has_edits());
        assert!(chunk.palette().contains(3));
    }

    #[test]
    fn test_palette_overflow_keeps_existing_content() {
        let mut chunk = ChunkData::new(IVec2::ZERO);
        for id in 1..=MAX_PALETTE_ENTRIES as u32 {
            let i = id as usize;
            chunk
                .set_tile(TileLayer::Main, i % CHUNK_SIZE, i / CHUNK_SIZE, Tile::new(id, 0))
                .expect("within capacity");
        }
        let result = chunk.set_tile(TileLayer::Main, 0, 0, Tile::new(5000, 1));
        assert_eq!(result, Err(PaletteError::Full(5000)));
        assert_eq!(chunk.tile(TileLayer::Main, 0, 0), Tile::EMPTY);
        assert_eq!(chunk.palette().len(), MAX_PALETTE_ENTRIES);
        assert_eq!(chunk.tile(TileLayer::Main, 1, 0), Tile::new(1, 0));
    }

    #[test]
    fn test_full_palette_reclaims_unused_entries() {
        let mut chunk = ChunkData::new(IVec2::ZERO);
        for id in 1..=MAX_PALETTE_ENTRIES as u32 {
            let i = id as usize;
            chunk
                .set_tile(TileLayer::Main, i % CHUNK_SIZE, i / CHUNK_SIZE, Tile::new(id, 0))
                .expect("within capacity");
        }
        // Tile 1 sits alone at (1, 0); replacing it frees its entry.
        chunk
            .set_tile(TileLayer::Main, 1, 0, Tile::new(600, 0))
            .expect("overwritten entry reclaimed");
        assert!(!chunk.palette().contains(1));
        assert!(chunk.palette().contains(600));

        // Tile 2 is overwritten by an existing ID, leaving a stale entry.
        chunk.set_tile(TileLayer::Main, 2, 0, Tile::new(3, 0)).expect("set");
        assert!(chunk.palette().contains(2));
        chunk
            .set_tile(TileLayer::Background, 0, 0, Tile::new(700, 0))
            .expect("stale entry reclaimed");
        assert!(!chunk.palette().contains(2));
        assert_eq!(chunk.palette().len(), MAX_PALETTE_ENTRIES);
        assert_eq!(chunk.tile(TileLayer::Main, 3, 0), Tile::new(3, 0));
        assert_eq!(chunk.tile(TileLayer::Background, 0, 0), Tile::new(700, 0));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut chunk = ChunkData::new(IVec2::ZERO);
        chunk.set_tile(TileLayer::Foreground, 1, 1, Tile::new(9, 0)).expect("set");
        chunk.set_restricted_size(IVec2::new(4, 6));
        chunk.reset(IVec2::new(7, 7));
        assert_eq!(chunk.coord(), IVec2::new(7, 7));
        assert!(chunk.palette().is_empty());
        assert!(!chunk.has_edits());
        assert_eq!(chunk.tile(TileLayer::Foreground, 1, 1), Tile::EMPTY);
        assert_eq!(chunk.restricted_size(), IVec2::splat(CHUNK_SIZE as i32));
    }

    #[test]
    fn test_restricted_size_clamped() {
        let mut chunk = ChunkData::new(IVec2::ZERO);
        chunk.set_restricted_size(IVec2::new(0, 1000));
        assert_eq!(chunk.restricted_size(), IVec2::new(1, CHUNK_SIZE as i32));
    }
}
