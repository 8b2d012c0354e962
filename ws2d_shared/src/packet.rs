//! Packet codec.
//!
//! Every frame on the wire is laid out as:
//!
//! ```text
//! byte 0      packet type tag
//! byte 1      identity (client -> server: own uid; server -> client: target/assigned uid)
//! byte 2..    payload, fixed length per packet type
//! ```
//!
//! The codec is a pure transform. Which tags exist (and how long their
//! payloads are) is decided by a [`PacketRegistry`], so new packet types can
//! be added without touching the codec.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the fixed header (type tag + identity).
pub const HEADER_LEN: usize = 2;

/// Identity byte stamped on outbound packets before the server assigned one.
pub const UNASSIGNED_UID: u8 = 0xFF;

/// Server-assigned per-session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u8);

impl Uid {
    /// Wire representation of an optional identity.
    pub fn to_wire(uid: Option<Uid>) -> u8 {
        uid.map_or(UNASSIGNED_UID, |u| u.0)
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Packet type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Liveness probe; the client echoes every heartbeat it receives.
    Heartbeat,
    /// Server assigns the client its identity.
    UidAssign,
    /// Any other tag added to a registry at runtime.
    Custom(u8),
}

impl PacketType {
    pub const HEARTBEAT_TAG: u8 = 0;
    pub const UID_ASSIGN_TAG: u8 = 1;

    pub fn tag(self) -> u8 {
        match self {
            PacketType::Heartbeat => Self::HEARTBEAT_TAG,
            PacketType::UidAssign => Self::UID_ASSIGN_TAG,
            PacketType::Custom(tag) => tag,
        }
    }

    pub fn from_tag(tag: u8) -> Self {
        match tag {
            Self::HEARTBEAT_TAG => PacketType::Heartbeat,
            Self::UID_ASSIGN_TAG => PacketType::UidAssign,
            other => PacketType::Custom(other),
        }
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub identity: u8,
    pub payload: Bytes,
}

impl Packet {
    /// The identity carried by a `UidAssign`.
    ///
    /// Prefers the payload byte; falls back to the header identity byte for
    /// servers that send the bare two-byte form `[1, uid]`.
    pub fn assigned_uid(&self) -> Option<Uid> {
        match self.kind {
            PacketType::UidAssign => Some(Uid(self.payload.first().copied().unwrap_or(self.identity))),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("packet type {0:?} is not registered")]
    Unregistered(PacketType),
    #[error("packet `{name}` expects a {expected}-byte payload, got {actual}")]
    PayloadLength {
        name: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodingError {
    #[error("empty frame")]
    Empty,
    #[error("frame too short for header ({0} byte)")]
    Truncated(usize),
    #[error("unknown packet tag {0}")]
    UnknownTag(u8),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("packet name `{0}` already registered")]
    DuplicateName(String),
    #[error("packet tag {tag} already registered as `{existing}`")]
    DuplicateTag { tag: u8, existing: String },
}

/// Contract for one packet type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketSpec {
    pub name: String,
    pub tag: u8,
    pub payload_len: usize,
}

/// Name <-> tag mapping with per-type payload contracts.
#[derive(Debug, Clone)]
pub struct PacketRegistry {
    by_tag: BTreeMap<u8, PacketSpec>,
}

impl Default for PacketRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.insert("heartbeat", PacketType::HEARTBEAT_TAG, 0);
        registry.insert("uid_assign", PacketType::UID_ASSIGN_TAG, 1);
        registry
    }
}

impl PacketRegistry {
    pub fn empty() -> Self {
        Self {
            by_tag: BTreeMap::new(),
        }
    }

    fn insert(&mut self, name: &str, tag: u8, payload_len: usize) {
        self.by_tag.insert(
            tag,
            PacketSpec {
                name: name.to_string(),
                tag,
                payload_len,
            },
        );
    }

    /// Registers a new packet type.
    pub fn register(
        &mut self,
        name: &str,
        tag: u8,
        payload_len: usize,
    ) -> Result<PacketType, RegistryError> {
        if let Some(existing) = self.by_tag.get(&tag) {
            return Err(RegistryError::DuplicateTag {
                tag,
                existing: existing.name.clone(),
            });
        }
        if self.tag_of(name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        self.insert(name, tag, payload_len);
        Ok(PacketType::from_tag(tag))
    }

    /// Contract for `kind`. `Custom` values that alias a built-in tag have none.
    pub fn get(&self, kind: PacketType) -> Option<&PacketSpec> {
        if PacketType::from_tag(kind.tag()) != kind {
            return None;
        }
        self.by_tag.get(&kind.tag())
    }

    /// Looks up a packet type by its registered name.
    pub fn tag_of(&self, name: &str) -> Option<PacketType> {
        self.by_tag
            .values()
            .find(|spec| spec.name == name)
            .map(|spec| PacketType::from_tag(spec.tag))
    }

    pub fn is_registered(&self, tag: u8) -> bool {
        self.by_tag.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

/// Registry-aware encoder/decoder.
#[derive(Debug, Clone, Default)]
pub struct PacketCodec {
    registry: PacketRegistry,
}

impl PacketCodec {
    pub fn new(registry: PacketRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PacketRegistry {
        &self.registry
    }

    pub fn encode(
        &self,
        kind: PacketType,
        identity: u8,
        payload: &[u8],
    ) -> Result<Bytes, EncodingError> {
        let spec = self
            .registry
            .get(kind)
            .ok_or(EncodingError::Unregistered(kind))?;
        if payload.len() != spec.payload_len {
            return Err(EncodingError::PayloadLength {
                name: spec.name.clone(),
                expected: spec.payload_len,
                actual: payload.len(),
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u8(kind.tag());
        buf.put_u8(identity);
        buf.extend_from_slice(payload);
        Ok(buf.freeze())
    }

    /// Decodes a frame. Payload length is not checked here.
    pub fn decode(&self, frame: &[u8]) -> Result<Packet, DecodingError> {
        let (&tag, rest) = frame.split_first().ok_or(DecodingError::Empty)?;
        if !self.registry.is_registered(tag) {
            return Err(DecodingError::UnknownTag(tag));
        }
        let (&identity, payload) = rest
            .split_first()
            .ok_or(DecodingError::Truncated(frame.len()))?;
        Ok(Packet {
            kind: PacketType::from_tag(tag),
            identity,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// Encodes with the default registry.
pub fn encode(kind: PacketType, identity: u8, payload: &[u8]) -> Result<Bytes, EncodingError> {
    PacketCodec::default().encode(kind, identity, payload)
}

/// Decodes with the default registry.
pub fn decode(frame: &[u8]) -> Result<Packet, DecodingError> {
    PacketCodec::default().decode(frame)
}
