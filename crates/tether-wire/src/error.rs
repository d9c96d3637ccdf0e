//! Error types for the wire layer.
//!
//! Reading from a [`BitStream`](crate::BitStream) never returns an error
//! directly: an overrun flips a sticky flag and every later read yields a
//! zero value. `WireError` is what callers produce once they *check* that
//! flag (via [`BitStream::check`](crate::BitStream::check)), plus the few
//! conversions that can fail outside a stream (parsing addresses, building
//! nonces from byte slices).

use std::net::SocketAddr;

/// Errors that can occur in the wire layer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A read ran past the end of the written data.
    ///
    /// `position` is the read cursor (in bits) at the moment the stream
    /// was checked, `len` the number of valid bits in the stream.
    #[error("stream overrun at bit {position} of {len}")]
    Overrun { position: usize, len: usize },

    /// A textual address could not be parsed as `a.b.c.d:port`.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The wire format only carries IPv4 addresses.
    #[error("unsupported address family: {0}")]
    UnsupportedAddress(SocketAddr),

    /// A nonce must be exactly [`NONCE_SIZE`](crate::NONCE_SIZE) bytes.
    #[error("invalid nonce length: expected 16 bytes, got {0}")]
    InvalidNonce(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrun_display_includes_positions() {
        let err = WireError::Overrun {
            position: 40,
            len: 32,
        };
        assert_eq!(err.to_string(), "stream overrun at bit 40 of 32");
    }

    #[test]
    fn test_invalid_nonce_display() {
        let err = WireError::InvalidNonce(3);
        assert!(err.to_string().contains("got 3"));
    }
}
