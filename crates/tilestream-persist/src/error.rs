/// Errors that can occur while encoding, decoding, or storing records.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("deflate stream invalid: {0}")]
    DecompressError(String),

    #[error("truncated record: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("byte {0} is outside the symbol alphabet")]
    InvalidSymbol(u8),

    #[error("name {0:?} cannot be encoded with the symbol alphabet")]
    UnencodableName(String),

    #[error("unknown layer name {0:?}")]
    UnknownLayer(String),

    #[error("layer {0:?} appears twice in one record")]
    DuplicateLayer(String),

    #[error("palette has {0} entries, maximum is 255")]
    PaletteTooLarge(usize),

    #[error("sub-region holds {0} objects of one kind, maximum is 65535")]
    TooManyObjects(usize),

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}
