//! Fixed 64-symbol alphabet used for names in persisted records.
//!
//! Each character is stored as a single byte holding its index in
//! [`ALPHABET`], which keeps palette names compact and makes any byte
//! >= 64 detectably corrupt.

/// The symbol table. Index = encoded byte value.
pub const ALPHABET: &[u8; 64] = b"abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_.";

/// Encoded byte for one character, or None if the character is not in the alphabet.
pub fn encode_symbol(c: char) -> Option<u8> {
    if !c.is_ascii() {
        return None;
    }
    let b = c as u8;
    let idx = match b {
        b'a'..=b'z' => b - b'a',
        b'0'..=b'9' => 26 + (b - b'0'),
        b'A'..=b'Z' => 36 + (b - b'A'),
        b'_' => 62,
        b'.' => 63,
        _ => return None,
    };
    Some(idx)
}

/// Character for an encoded byte, or None if the byte is outside the alphabet.
pub fn decode_symbol(b: u8) -> Option<char> {
    ALPHABET.get(b as usize).map(|&c| c as char)
}

/// Whether every character of `s` can be encoded.
pub fn is_encodable(s: &str) -> bool {
    s.chars().all(|c| encode_symbol(c).is_some())
}

/// Split a `namespace:id` name into its two halves.
/// Both halves must be non-empty and encodable.
pub fn split_name(name: &str) -> Option<(&str, &str)> {
    let (namespace, id) = name.split_once(':')?;
    if namespace.is_empty() || id.is_empty() {
        return None;
    }
    if !is_encodable(namespace) || !is_encodable(id) {
        return None;
    }
    Some((namespace, id))
}
