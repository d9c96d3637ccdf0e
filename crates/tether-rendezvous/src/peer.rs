//! The broker's view of connected peers.
//!
//! Peers live in a generational arena. A [`PeerKey`] is an index plus the
//! generation the slot had when the peer registered; removing the peer
//! bumps the generation, so every key still held elsewhere (pending
//! requests, mostly) stops resolving without anyone having to find and
//! clear it.

use std::fmt;

use tether_rpc::ServerInfo;
use tether_strings::StringTableEntry;
use tether_wire::IpAddress;

/// Weak handle to a registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerKey {
    index: u32,
    generation: u32,
}

impl PeerKey {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}v{}", self.index, self.generation)
    }
}

/// What a game host has told the broker about itself.
#[derive(Debug, Clone)]
pub(crate) struct ServerRecord {
    pub description: StringTableEntry,
    pub level_name: StringTableEntry,
    pub level_type: StringTableEntry,
    pub bot_count: u32,
    pub player_count: u32,
    pub max_players: u32,
    pub info_flags: u32,
    pub hidden: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum PeerKind {
    Client,
    Server(ServerRecord),
}

#[derive(Debug, Clone)]
pub(crate) struct PeerRecord {
    /// Address the broker saw the connection come from.
    pub address: IpAddress,
    pub cs_version: u32,
    pub build: u32,
    /// Player nick or server name.
    pub name: StringTableEntry,
    pub kind: PeerKind,
    pub in_global_chat: bool,
}

impl PeerRecord {
    pub fn is_server(&self) -> bool {
        matches!(self.kind, PeerKind::Server(_))
    }

    pub fn server(&self) -> Option<&ServerRecord> {
        match &self.kind {
            PeerKind::Server(record) => Some(record),
            PeerKind::Client => None,
        }
    }

    pub fn server_mut(&mut self) -> Option<&mut ServerRecord> {
        match &mut self.kind {
            PeerKind::Server(record) => Some(record),
            PeerKind::Client => None,
        }
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server().map(|s| ServerInfo {
            bot_count: s.bot_count,
            player_count: s.player_count,
            max_players: s.max_players,
            info_flags: s.info_flags,
            level_name: s.level_name.as_string(),
            level_type: s.level_type.as_string(),
            name: self.name.as_string(),
            description: s.description.as_string(),
        })
    }
}

struct Slot {
    generation: u32,
    peer: Option<PeerRecord>,
}

/// Generational storage for [`PeerRecord`]s.
#[derive(Default)]
pub(crate) struct PeerArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl PeerArena {
    pub fn insert(&mut self, peer: PeerRecord) -> PeerKey {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.peer = Some(peer);
            return PeerKey::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            peer: Some(peer),
        });
        PeerKey::new(index, 0)
    }

    pub fn remove(&mut self, key: PeerKey) -> Option<PeerRecord> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let peer = slot.peer.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.live -= 1;
        Some(peer)
    }

    pub fn get(&self, key: PeerKey) -> Option<&PeerRecord> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.peer.as_ref()
    }

    pub fn get_mut(&mut self, key: PeerKey) -> Option<&mut PeerRecord> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.peer.as_mut()
    }

    pub fn contains(&self, key: PeerKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Live peers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PeerKey, &PeerRecord)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.peer
                .as_ref()
                .map(|peer| (PeerKey::new(i as u32, slot.generation), peer))
        })
    }
}
