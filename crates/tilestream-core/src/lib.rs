pub mod chunk;
pub mod config;
pub mod constants;
pub mod dynamic;
pub mod error;
pub mod palette;
pub mod symbols;
pub mod tile;
pub mod types;

pub use chunk::ChunkData;
pub use config::StreamingConfig;
pub use dynamic::{EntityRecord, MobileBody, MobileChunk};
pub use error::CoreError;
pub use palette::{Palette, PaletteError};
pub use tile::{TileDef, TileTable};
pub use types::*;
