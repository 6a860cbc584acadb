use thiserror::Error;

/// Errors raised while building the registry or parsing configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to parse streaming config RON: {0}")]
    ConfigParse(String),

    #[error("Failed to parse tile table RON: {0}")]
    TileTableParse(String),

    #[error("invalid tile name {0:?} (expected namespace:id over the symbol alphabet)")]
    InvalidTileName(String),

    #[error("tile id {0} is registered twice")]
    DuplicateTileId(u32),

    #[error("tile name {0:?} is registered twice")]
    DuplicateTileName(String),

    #[error("tile id 0 is reserved for the empty tile")]
    ReservedTileId,
}
