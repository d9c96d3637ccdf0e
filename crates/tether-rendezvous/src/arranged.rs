//! The outcome of a successful rendezvous: where to try, and the keys to
//! prove it is us when we get there.
//!
//! The host packs its nonces and secret into the accept blob:
//!
//! ```text
//! [nonce: 16][server_nonce: 16][shared_secret: 32]
//! ```
//!
//! The broker relays the blob untouched, so both ends end up holding the
//! same triple.

use std::collections::HashSet;

use rand::Rng;
use tether_wire::{ByteBuffer, IpAddress, NONCE_SIZE, Nonce};

use crate::RendezvousError;

/// Bytes in the shared secret.
pub const SHARED_SECRET_SIZE: usize = 32;

/// Bytes in an accept blob: two nonces and the secret.
pub const BLOB_SIZE: usize = 2 * NONCE_SIZE + SHARED_SECRET_SIZE;

/// A direct connection attempt agreed through the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrangedConnection {
    /// Candidate addresses of the other side, most likely first.
    pub possible_addresses: Vec<IpAddress>,
    pub nonce: Nonce,
    pub server_nonce: Nonce,
    pub shared_secret: [u8; SHARED_SECRET_SIZE],
    /// `true` on the side that asked for the connection.
    pub is_initiator: bool,
}

impl ArrangedConnection {
    /// Fresh nonces and secret, for the accepting host.
    pub fn generate(possible_addresses: Vec<IpAddress>) -> Self {
        Self {
            possible_addresses,
            nonce: Nonce::random(),
            server_nonce: Nonce::random(),
            shared_secret: rand::rng().random(),
            is_initiator: false,
        }
    }

    /// Unpacks an accept blob received through the broker. Bytes past
    /// [`BLOB_SIZE`] are ignored.
    ///
    /// # Errors
    /// [`RendezvousError::ShortBlob`] if fewer than [`BLOB_SIZE`] bytes.
    pub fn from_blob(
        possible_addresses: Vec<IpAddress>,
        blob: &[u8],
    ) -> Result<Self, RendezvousError> {
        if blob.len() < BLOB_SIZE {
            return Err(RendezvousError::ShortBlob(blob.len()));
        }
        let mut nonce = [0u8; NONCE_SIZE];
        let mut server_nonce = [0u8; NONCE_SIZE];
        let mut shared_secret = [0u8; SHARED_SECRET_SIZE];
        nonce.copy_from_slice(&blob[..NONCE_SIZE]);
        server_nonce.copy_from_slice(&blob[NONCE_SIZE..2 * NONCE_SIZE]);
        shared_secret.copy_from_slice(&blob[2 * NONCE_SIZE..BLOB_SIZE]);
        Ok(Self {
            possible_addresses,
            nonce: Nonce::from_array(nonce),
            server_nonce: Nonce::from_array(server_nonce),
            shared_secret,
            is_initiator: true,
        })
    }

    pub fn to_blob(&self) -> ByteBuffer {
        let mut blob = Vec::with_capacity(BLOB_SIZE);
        blob.extend_from_slice(self.nonce.as_bytes());
        blob.extend_from_slice(self.server_nonce.as_bytes());
        blob.extend_from_slice(&self.shared_secret);
        ByteBuffer::new(blob)
    }

    /// Identifies the attempt on both ends.
    pub fn key(&self) -> (Nonce, Nonce) {
        (self.nonce, self.server_nonce)
    }
}

/// How [`ArrangedRegistry::record`] classified an established attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Fresh,
    Duplicate,
}

/// Remembers which arranged attempts already succeeded.
///
/// An attempt may get through on several candidate addresses at once;
/// only the first success for a `(nonce, server_nonce)` pair counts.
#[derive(Debug, Default)]
pub struct ArrangedRegistry {
    established: HashSet<(Nonce, Nonce)>,
}

impl ArrangedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, connection: &ArrangedConnection) -> Arrival {
        if self.established.insert(connection.key()) {
            tracing::debug!(nonce = %connection.nonce, "arranged connection established");
            Arrival::Fresh
        } else {
            tracing::trace!(nonce = %connection.nonce, "duplicate arranged connection");
            Arrival::Duplicate
        }
    }

    /// Drops a finished attempt so its key may be reused.
    pub fn forget(&mut self, connection: &ArrangedConnection) -> bool {
        self.established.remove(&connection.key())
    }

    pub fn len(&self) -> usize {
        self.established.len()
    }

    pub fn is_empty(&self) -> bool {
        self.established.is_empty()
    }
}
