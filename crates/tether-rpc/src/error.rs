//! Error types for the RPC layer.

use tether_wire::WireError;

/// Errors that can occur while decoding calls or validating a handshake.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The stream ran out before the call was fully decoded.
    #[error("truncated call: {0}")]
    Truncated(#[from] WireError),

    /// The message tag does not name a known call.
    #[error("unknown message id {0}")]
    UnknownMessage(u32),

    /// The peer speaks a master protocol version outside the accepted range.
    #[error("master protocol version {got} not in {min}..={max}")]
    VersionMismatch { got: u32, min: u32, max: u32 },

    /// The broker refused the handshake.
    #[error("handshake rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_display() {
        let err = RpcError::VersionMismatch {
            got: 2,
            min: 4,
            max: 6,
        };
        assert_eq!(
            err.to_string(),
            "master protocol version 2 not in 4..=6"
        );
    }

    #[test]
    fn test_from_wire_error() {
        let err: RpcError = WireError::Overrun {
            position: 9,
            len: 8,
        }
        .into();
        assert!(matches!(err, RpcError::Truncated(_)));
    }
}
