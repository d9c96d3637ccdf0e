//! Brokered requests waiting for a host's answer.
//!
//! Each request is keyed by the id the broker handed the host. Both peers
//! are held by [`PeerKey`], so a request outlives either side going away:
//! it is answered, or it expires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::PeerKey;

/// One forwarded `c2m_request_arranged_connection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrangedRequest {
    pub initiator: PeerKey,
    pub host: PeerKey,
    /// Id the initiator used; replies are sent back under it.
    pub initiator_query_id: u32,
    /// Id the broker gave the host.
    pub host_query_id: u32,
    pub created: Instant,
}

/// Pending requests, by host query id.
#[derive(Debug, Default)]
pub struct RequestTracker {
    requests: HashMap<u32, ArrangedRequest>,
    last_id: u32,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request and returns the id to send to the host.
    pub fn open(
        &mut self,
        initiator: PeerKey,
        host: PeerKey,
        initiator_query_id: u32,
        now: Instant,
    ) -> u32 {
        self.last_id = self.last_id.wrapping_add(1);
        let host_query_id = self.last_id;
        self.requests.insert(
            host_query_id,
            ArrangedRequest {
                initiator,
                host,
                initiator_query_id,
                host_query_id,
                created: now,
            },
        );
        host_query_id
    }

    /// Removes the request `host` was asked about under `host_query_id`.
    ///
    /// A host can only answer its own requests; an id belonging to another
    /// host is left alone.
    pub fn take(&mut self, host_query_id: u32, host: PeerKey) -> Option<ArrangedRequest> {
        match self.requests.get(&host_query_id) {
            Some(req) if req.host == host => self.requests.remove(&host_query_id),
            _ => None,
        }
    }

    /// Removes and returns every request older than `timeout`, oldest id
    /// first.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<ArrangedRequest> {
        let mut expired: Vec<u32> = self
            .requests
            .values()
            .filter(|req| now.saturating_duration_since(req.created) >= timeout)
            .map(|req| req.host_query_id)
            .collect();
        expired.sort_unstable();
        expired
            .into_iter()
            .filter_map(|id| self.requests.remove(&id))
            .collect()
    }

    /// Requests where `peer` is the initiator or the host.
    pub fn pending_for(&self, peer: PeerKey) -> usize {
        self.requests
            .values()
            .filter(|req| req.initiator == peer || req.host == peer)
            .count()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
