use tilestream_core::{ChunkCoord, ChunkData, LoaderId, TileLayer, TileTable};
use tilestream_persist::{decode_chunk, encode_chunk_layers, DecodeReport, PersistError};

/// Which side of a connection a world runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authority {
    /// Owns persistence and generation.
    #[default]
    Authority,
    /// Receives chunk content from an authority; never reads or writes disk.
    Replica,
}

/// A fully decoded chunk serialized for a remote peer.
///
/// `payload` is the uncompressed tile-codec record with every layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMessage {
    pub coord: ChunkCoord,
    pub payload: Vec<u8>,
}

impl ChunkMessage {
    pub fn encode(chunk: &ChunkData, tiles: &TileTable) -> Result<Self, PersistError> {
        Ok(Self {
            coord: chunk.coord(),
            payload: encode_chunk_layers(chunk, tiles, &TileLayer::ALL)?,
        })
    }

    /// Decode into `chunk`, which is reset to the message coordinate first.
    ///
    /// Layers arrive flagged as edited by the codec; a replica owns no
    /// saves, so the flags are cleared.
    pub fn decode_into(
        &self,
        tiles: &TileTable,
        chunk: &mut ChunkData,
    ) -> Result<DecodeReport, PersistError> {
        chunk.reset(self.coord);
        let report = decode_chunk(&self.payload, tiles, chunk)?;
        for layer in TileLayer::ALL {
            chunk.set_layer_edited(layer, false);
        }
        Ok(report)
    }
}

/// A message addressed to one remote loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: LoaderId,
    pub message: ChunkMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilestream_core::{Tile, TileDef};

    fn tiles() -> TileTable {
        TileTable::from_defs(vec![
            TileDef {
                id: 1,
                name: "core:stone".into(),
            },
            TileDef {
                id: 2,
                name: "core:sand".into(),
            },
        ])
        .expect("valid table")
    }

    #[test]
    fn test_message_carries_generated_layers() {
        let tiles = tiles();
        let mut chunk = ChunkData::new(ChunkCoord::new(-3, 8));
        chunk
            .place_tile(TileLayer::Background, 1, 2, Tile::new(1, 0))
            .expect("place");
        chunk
            .set_tile(TileLayer::Foreground, 31, 31, Tile::new(2, 0xBEEF))
            .expect("set");

        let msg = ChunkMessage::encode(&chunk, &tiles).expect("encode");
        assert_eq!(msg.coord, ChunkCoord::new(-3, 8));

        let mut received = ChunkData::new(ChunkCoord::ZERO);
        let report = msg.decode_into(&tiles, &mut received).expect("decode");
        assert!(report.is_clean());
        assert_eq!(report.layers, TileLayer::ALL.to_vec());
        assert!(received.same_content(&chunk));
        assert!(!received.has_edits());
        assert_eq!(received.coord(), ChunkCoord::new(-3, 8));
    }
}
