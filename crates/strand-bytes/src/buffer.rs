use base64::Engine as _;
use rand::RngCore;

use crate::error::Error;

/// The way in which two [`OctetBuffer`]s match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// The local buffer does not match the other buffer.
    Mismatch,
    /// The local buffer is a prefix of the other buffer, which has more data.
    Contained,
    /// The local buffer contains the other buffer as a prefix, and has more data.
    Contains,
    /// Local and other are equal in content and size.
    Full,
}

/// Owned, growable octet container.
///
/// Capacity always grows in [`OctetBuffer::ALLOC_BLOCK`]-sized chunks, so
/// repeated single-octet appends don't trigger a `realloc` on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OctetBuffer {
    data: Vec<u8>,
}

impl OctetBuffer {
    /// Always allocate capacity in chunks of this size.
    pub const ALLOC_BLOCK: usize = 32;

    /// Construct an empty buffer.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Take ownership of an existing byte vector. Preserves the "owning
    /// pointer + length" semantics of a raw owning buffer without the
    /// pointer arithmetic.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Grow capacity so at least `size` octets fit without reallocating,
    /// rounded up to a multiple of [`Self::ALLOC_BLOCK`].
    pub fn reserve(&mut self, size: usize) {
        if self.data.capacity() >= size {
            return;
        }
        let chunks = size.div_ceil(Self::ALLOC_BLOCK).max(1);
        let target_capacity = chunks * Self::ALLOC_BLOCK;
        let additional = target_capacity.saturating_sub(self.data.len());
        self.data.reserve_exact(additional);
    }

    /// Free all data and de-allocate.
    pub fn free(&mut self) {
        self.data = Vec::new();
    }

    /// Append a single octet.
    pub fn append_octet(&mut self, octet: u8) {
        self.reserve(self.data.len() + 1);
        self.data.push(octet);
    }

    /// Append from an arbitrary memory area.
    pub fn append_slice(&mut self, src: &[u8]) {
        self.reserve(self.data.len() + src.len());
        self.data.extend_from_slice(src);
    }

    /// Append the first `n` octets of `src` (clamped to `src`'s length).
    pub fn append_slice_n(&mut self, src: &[u8], n: usize) {
        let n = n.min(src.len());
        self.append_slice(&src[..n]);
    }

    /// Append another buffer in full.
    pub fn append(&mut self, src: &OctetBuffer) {
        self.append_slice(&src.data);
    }

    /// Append the first `n` octets of another buffer.
    pub fn append_n(&mut self, src: &OctetBuffer, n: usize) {
        self.append_slice_n(&src.data, n);
    }

    /// Match `self[index..]` against `other[..]`, scanning at most
    /// `min(|self| - index, |other|)` octets.
    pub fn match_with(&self, other: &OctetBuffer, index: usize) -> (MatchType, usize) {
        let self_tail = self.data.len().saturating_sub(index);
        let other_len = other.data.len();
        let common = self_tail.min(other_len);

        let matched = self.data[index..index + common]
            .iter()
            .zip(&other.data[..common])
            .take_while(|(a, b)| a == b)
            .count();

        if matched < common {
            return (MatchType::Mismatch, matched);
        }
        let kind = match self_tail.cmp(&other_len) {
            std::cmp::Ordering::Equal => MatchType::Full,
            std::cmp::Ordering::Less => MatchType::Contained,
            std::cmp::Ordering::Greater => MatchType::Contains,
        };
        (kind, matched)
    }

    /// Encode the buffer's content as base64 (no line separators).
    pub fn encode_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Replace the buffer's content by decoding `src` as base64.
    pub fn decode_base64(&mut self, src: &str) -> Result<(), Error> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(src)
            .map_err(|_| Error::InvalidBase64)?;
        self.data = decoded;
        Ok(())
    }

    /// Render the buffer as a string. Fails if the buffer holds an embedded
    /// zero octet anywhere but as its last octet.
    pub fn as_string(&self) -> Result<String, Error> {
        if let Some(zero_at) = self.data.iter().position(|&b| b == 0) {
            if zero_at != self.data.len() - 1 {
                return Err(Error::InvalidContent);
            }
            return Ok(String::from_utf8_lossy(&self.data[..zero_at]).into_owned());
        }
        Ok(String::from_utf8_lossy(&self.data).into_owned())
    }

    /// Replace the content with `octets` cryptographically-insecure random
    /// bytes. Intended for test fixtures and nonce-style filler, not secrets.
    pub fn random(&mut self, octets: usize) {
        self.data = vec![0u8; octets];
        rand::rng().fill_bytes(&mut self.data);
    }

    /// Hex-dump the first `n` octets (clamped to the buffer's length).
    pub fn hex_dump(&self, n: usize) -> String {
        let n = n.min(self.data.len());
        self.data[..n].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Borrow the underlying octets.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The number of octets stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The octet at `index`.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }
}

impl From<&str> for OctetBuffer {
    fn from(s: &str) -> Self {
        Self::from_vec(s.as_bytes().to_vec())
    }
}

impl From<String> for OctetBuffer {
    fn from(s: String) -> Self {
        Self::from_vec(s.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_rounds_up_to_chunk() {
        let mut buf = OctetBuffer::new();
        buf.reserve(1);
        assert_eq!(buf.data.capacity(), OctetBuffer::ALLOC_BLOCK);
        buf.reserve(OctetBuffer::ALLOC_BLOCK + 1);
        assert_eq!(buf.data.capacity(), 2 * OctetBuffer::ALLOC_BLOCK);
    }

    #[test]
    fn append_then_base64_roundtrip() {
        let mut buf = OctetBuffer::new();
        buf.append_octet(b'h');
        buf.append_slice(b"ello, world");
        buf.append_octet(0xff);
        let encoded = buf.encode_base64();
        let mut decoded = OctetBuffer::new();
        decoded.decode_base64(&encoded).unwrap();
        assert_eq!(buf, decoded);
    }

    #[test]
    fn match_full() {
        let a = OctetBuffer::from("abc");
        let b = OctetBuffer::from("abc");
        assert_eq!(a.match_with(&b, 0), (MatchType::Full, 3));
    }

    #[test]
    fn match_contains_and_contained() {
        let long = OctetBuffer::from("abcdef");
        let short = OctetBuffer::from("abc");
        assert_eq!(long.match_with(&short, 0), (MatchType::Contains, 3));
        assert_eq!(short.match_with(&long, 0), (MatchType::Contained, 3));
    }

    #[test]
    fn match_mismatch() {
        let a = OctetBuffer::from("abc");
        let b = OctetBuffer::from("axc");
        assert_eq!(a.match_with(&b, 0), (MatchType::Mismatch, 1));
    }

    #[test]
    fn as_string_rejects_embedded_zero() {
        let mut buf = OctetBuffer::new();
        buf.append_slice(b"ab\0cd");
        assert_eq!(buf.as_string(), Err(Error::InvalidContent));

        let mut trailing_zero = OctetBuffer::new();
        trailing_zero.append_slice(b"ab\0");
        assert_eq!(trailing_zero.as_string().unwrap(), "ab");
    }

    #[test]
    fn free_empties_buffer() {
        let mut buf = OctetBuffer::from("abc");
        buf.free();
        assert!(buf.is_empty());
        assert_eq!(buf.data.capacity(), 0);
    }

    #[test]
    fn hex_dump_first_n() {
        let buf = OctetBuffer::from_vec(vec![0x00, 0xab, 0xff]);
        assert_eq!(buf.hex_dump(2), "00ab");
    }
}
