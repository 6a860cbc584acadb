use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::symbols;

/// A single tile type definition loaded from RON data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileDef {
    /// Stable global tile ID. 0 = empty and may not be registered.
    pub id: u32,
    /// `namespace:id` name. Persisted chunks reference tiles by this name,
    /// so IDs may be renumbered between sessions without breaking saves.
    pub name: String,
}

/// Registry of tile types, indexed both ways.
#[derive(Debug, Clone, Default)]
pub struct TileTable {
    tiles: Vec<TileDef>,
    by_id: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
}

impl TileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from definitions, validating every entry.
    pub fn from_defs(defs: Vec<TileDef>) -> Result<Self, CoreError> {
        let mut table = Self::new();
        for def in defs {
            table.register(def)?;
        }
        Ok(table)
    }

    /// Parse a RON list of `TileDef` into a table.
    pub fn from_ron_str(ron_str: &str) -> Result<Self, CoreError> {
        let options = ron::Options::default();
        let defs: Vec<TileDef> = options
            .from_str(ron_str)
            .map_err(|e| CoreError::TileTableParse(e.to_string()))?;
        Self::from_defs(defs)
    }

    /// Add one tile type.
    pub fn register(&mut self, def: TileDef) -> Result<(), CoreError> {
        if def.id == 0 {
            return Err(CoreError::ReservedTileId);
        }
        if symbols::split_name(&def.name).is_none() {
            return Err(CoreError::InvalidTileName(def.name));
        }
        if self.by_id.contains_key(&def.id) {
            return Err(CoreError::DuplicateTileId(def.id));
        }
        if self.by_name.contains_key(&def.name) {
            return Err(CoreError::DuplicateTileName(def.name));
        }
        let idx = self.tiles.len();
        self.by_id.insert(def.id, idx);
        self.by_name.insert(def.name.clone(), idx);
        self.tiles.push(def);
        Ok(())
    }

    /// Look up a tile by global ID.
    pub fn get(&self, id: u32) -> Option<&TileDef> {
        self.by_id.get(&id).map(|&i| &self.tiles[i])
    }

    /// Name for a global ID.
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.get(id).map(|t| t.name.as_str())
    }

    /// Global ID for a `namespace:id` name.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|&i| self.tiles[i].id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileDef> {
        self.tiles.iter()
    }
}
