pub mod compress;
pub mod error;
pub mod format;
pub mod layout;
pub mod load;
pub mod region;
pub mod save;
pub mod store;

pub use error::PersistError;
pub use layout::{SaveLayout, WorldMode};
pub use load::{decode_chunk, DecodeReport};
pub use region::SubRegionRecord;
pub use save::{encode_chunk, encode_chunk_layers};
pub use store::WorldStorage;
