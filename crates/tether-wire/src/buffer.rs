//! Opaque byte blobs carried inside RPC calls.

use std::ops::Deref;

/// Width of the length prefix written before a [`ByteBuffer`].
pub const BYTE_BUFFER_LEN_BITS: u32 = 10;

/// Largest [`ByteBuffer`] that fits the length prefix.
pub const MAX_BYTE_BUFFER_LEN: usize = (1 << BYTE_BUFFER_LEN_BITS) - 1;

/// An opaque payload such as connection parameters or a nonce blob.
///
/// Written as a 10-bit length followed by the raw bytes, so at most
/// [`MAX_BYTE_BUFFER_LEN`] bytes travel; anything past that is cut.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ByteBuffer(Vec<u8>);

impl ByteBuffer {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// The part of the buffer that survives encoding.
    pub fn wire_bytes(&self) -> &[u8] {
        &self.0[..self.0.len().min(MAX_BYTE_BUFFER_LEN)]
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for ByteBuffer {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}
