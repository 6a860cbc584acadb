use std::collections::HashMap;

use thiserror::Error;

use crate::constants::{EMPTY_TILE_ID, MAX_PALETTE_ENTRIES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaletteError {
    #[error("palette full ({MAX_PALETTE_ENTRIES} entries), cannot add tile {0}")]
    Full(u32),

    #[error("the empty tile is implicit and never enters the palette")]
    EmptyTile,
}

/// Per-chunk lookup table from a small index to a global tile ID.
///
/// Entries keep insertion order (the order they are persisted in) and
/// are unique. Capacity is fixed at [`MAX_PALETTE_ENTRIES`] so every
/// index fits a byte after the `+1` shift used on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<u32>,
    index: HashMap<u32, u8>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `global_id`, inserting it if absent.
    pub fn insert(&mut self, global_id: u32) -> Result<u8, PaletteError> {
        if global_id == EMPTY_TILE_ID {
            return Err(PaletteError::EmptyTile);
        }
        if let Some(&idx) = self.index.get(&global_id) {
            return Ok(idx);
        }
        if self.entries.len() >= MAX_PALETTE_ENTRIES {
            return Err(PaletteError::Full(global_id));
        }
        let idx = self.entries.len() as u8;
        self.entries.push(global_id);
        self.index.insert(global_id, idx);
        Ok(idx)
    }

    pub fn index_of(&self, global_id: u32) -> Option<u8> {
        self.index.get(&global_id).copied()
    }

    pub fn contains(&self, global_id: u32) -> bool {
        self.index.contains_key(&global_id)
    }

    pub fn get(&self, idx: u8) -> Option<u32> {
        self.entries.get(idx as usize).copied()
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_PALETTE_ENTRIES
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Keep only the entries `keep` accepts, preserving their order.
    /// Indices of the survivors shift down. Returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(u32) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|&id| keep(id));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, &id)| (id, idx as u8))
            .collect();
        before - self.entries.len()
    }
}
