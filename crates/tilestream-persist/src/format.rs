//! Byte-level building blocks shared by every record type.
//!
//! All multi-byte values are little-endian. Names are a one-byte length
//! followed by one byte per symbol (see `tilestream_core::symbols`).

use tilestream_core::symbols;

use crate::error::PersistError;

/// Extension of static chunk records.
pub const CHUNK_EXT: &str = "cdat";
/// Extension of movable chunk records.
pub const MOBILE_EXT: &str = "mdat";
/// Extension of region index records.
pub const REGION_EXT: &str = "erg";
/// Extension of entity records.
pub const ENTITY_EXT: &str = "edat";

/// Bytes of the movable-chunk prefix: 7 f32 + 2 i32 + 2 f32.
pub const MOBILE_PREFIX_SIZE: usize = 11 * 4;

/// Maximum name length in symbols (length is stored in one byte).
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Append-only record buffer.
#[derive(Debug, Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Write a name as length + alphabet symbols.
    pub fn name(&mut self, name: &str) -> Result<(), PersistError> {
        if name.len() > MAX_NAME_LEN {
            return Err(PersistError::UnencodableName(name.to_string()));
        }
        let mut encoded = Vec::with_capacity(name.len());
        for c in name.chars() {
            let sym = symbols::encode_symbol(c)
                .ok_or_else(|| PersistError::UnencodableName(name.to_string()))?;
            encoded.push(sym);
        }
        self.u8(encoded.len() as u8);
        self.buf.extend_from_slice(&encoded);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a record with bounds-checked reads.
#[derive(Debug)]
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], PersistError> {
        if self.remaining() < n {
            return Err(PersistError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PersistError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, PersistError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, PersistError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, PersistError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, PersistError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, PersistError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Read a length-prefixed alphabet name.
    pub fn name(&mut self) -> Result<String, PersistError> {
        let len = self.u8()? as usize;
        let raw = self.take(len)?;
        raw.iter()
            .map(|&b| symbols::decode_symbol(b).ok_or(PersistError::InvalidSymbol(b)))
            .collect()
    }

    /// Fail if unread bytes remain.
    pub fn finish(&self) -> Result<(), PersistError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(PersistError::TrailingBytes(n)),
        }
    }
}
