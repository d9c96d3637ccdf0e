//! 128-bit random handshake identifiers.

use std::fmt;

use rand::Rng;

use crate::WireError;

/// Size of a [`Nonce`] in bytes.
pub const NONCE_SIZE: usize = 16;

/// A random identifier for one handshake instance.
///
/// The initiator and the responder each contribute one. Together they name
/// a logical session, so two transport connections carrying the same pair
/// are the same session arriving by different routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Draws a fresh nonce from the thread-local RNG.
    pub fn random() -> Self {
        Self(rand::rng().random::<[u8; NONCE_SIZE]>())
    }

    pub fn from_array(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a nonce from exactly [`NONCE_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WireError> {
        let array: [u8; NONCE_SIZE] = bytes
            .try_into()
            .map_err(|_| WireError::InvalidNonce(bytes.len()))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; NONCE_SIZE]> for Nonce {
    fn from(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Nonce {
    type Error = WireError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_nonces_differ() {
        let a = Nonce::random();
        let b = Nonce::random();
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_slice_wrong_length_fails() {
        assert!(matches!(
            Nonce::from_slice(&[0u8; 8]),
            Err(WireError::InvalidNonce(8))
        ));
    }

    #[test]
    fn test_display_is_lowercase_hex() {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[0] = 0xAB;
        bytes[15] = 0x01;
        let n = Nonce::from_array(bytes);
        let text = n.to_string();
        assert_eq!(text.len(), 32);
        assert!(text.starts_with("ab"));
        assert!(text.ends_with("01"));
    }
}
