//! Packet model: kinds, flags, headers, and the typed message record.
//!
//! A [`Packet`] is the unit the application sends and receives. Its payload
//! is always the plaintext, uncompressed bytes; transport transforms
//! (compression, encryption) are applied by the pipeline and recorded in the
//! flags while the packet is on the wire.

use crate::error::{constants, Result, WireError};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{btree_map, BTreeMap};
use std::fmt;

/// Reserved header keys.
pub mod keys {
    pub const OBJECT_TYPE: &str = "object-type";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const PART_ID: &str = "part-id";
    pub const PART_INDEX: &str = "part-index";
    pub const PART_TOTAL: &str = "part-total";
    pub const FILENAME: &str = "filename";
    pub const PRESHARED_HASH: &str = "preshared-hash";
    pub const CLIENT_ID: &str = "client-id";
}

/// Wire tag discriminating packet semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Auth = 0,
    Message = 1,
    Bytes = 2,
    Object = 3,
    File = 4,
    Directory = 5,
    Request = 6,
    Response = 7,
}

impl PacketKind {
    /// Decode a wire tag.
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PacketKind::Auth),
            1 => Some(PacketKind::Message),
            2 => Some(PacketKind::Bytes),
            3 => Some(PacketKind::Object),
            4 => Some(PacketKind::File),
            5 => Some(PacketKind::Directory),
            6 => Some(PacketKind::Request),
            7 => Some(PacketKind::Response),
            _ => None,
        }
    }

    /// The tag byte written to the wire.
    pub fn wire(self) -> u8 {
        self as u8
    }
}

/// Per-packet flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// Payload bytes are compressed
    pub const COMPRESSED: PacketFlags = PacketFlags(0b0000_0001);
    /// Payload bytes are encrypted
    pub const ENCRYPTED: PacketFlags = PacketFlags(0b0000_0010);
    /// Packet is one part of a larger message
    pub const PARTIAL: PacketFlags = PacketFlags(0b0000_0100);
    /// Packet carries metadata headers
    pub const HAS_METADATA: PacketFlags = PacketFlags(0b0000_1000);
    /// Packet carries a preshared-key digest header
    pub const HAS_PRESHARED: PacketFlags = PacketFlags(0b0001_0000);

    pub fn empty() -> Self {
        PacketFlags(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        PacketFlags(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PacketFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: PacketFlags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Header map with unique keys and a restricted character set.
///
/// `=` and newlines are forbidden in keys and values because the wire form
/// is `key=value` entries joined by LF. Iteration order is sorted, which
/// keeps encoding deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header entry, replacing any previous value for the key.
    ///
    /// # Errors
    /// Returns `WireError::InvalidPacket` if the key or value contains `=`
    /// or a newline, or the key is empty
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        if key.is_empty() {
            return Err(WireError::InvalidPacket("empty header key"));
        }
        if Self::has_forbidden_char(key) || Self::has_forbidden_char(&value) {
            return Err(WireError::InvalidPacket(
                constants::ERR_HEADER_FORBIDDEN_CHAR,
            ));
        }
        self.0.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    fn has_forbidden_char(s: &str) -> bool {
        s.contains('=') || s.contains('\n') || s.contains('\r')
    }

    /// Encode to the wire form: `key=value` entries joined by LF.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out.into_bytes()
    }

    /// Parse the wire form. An empty block is an empty map.
    ///
    /// # Errors
    /// Returns `WireError::InvalidHeader` on invalid UTF-8, entries without
    /// `=`, or duplicate keys
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|_| WireError::InvalidHeader("header block is not UTF-8"))?;

        let mut map = BTreeMap::new();
        for entry in text.split('\n') {
            let (key, value) = entry
                .split_once('=')
                .ok_or(WireError::InvalidHeader(constants::ERR_HEADER_SYNTAX))?;
            if key.is_empty() || value.contains('=') {
                return Err(WireError::InvalidHeader(constants::ERR_HEADER_SYNTAX));
            }
            if map.insert(key.to_string(), value.to_string()).is_some() {
                return Err(WireError::InvalidHeader("duplicate header key"));
            }
        }
        Ok(Self(map))
    }
}

/// A logical message: kind, flags, headers, and plaintext payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketKind,
    pub flags: PacketFlags,
    pub headers: Headers,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet with no headers and no flags.
    pub fn new(kind: PacketKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            flags: PacketFlags::empty(),
            headers: Headers::new(),
            payload,
        }
    }

    /// Authentication packet opening a session. Carries the preshared-key
    /// digest (hex) and an optional client identity.
    pub fn auth(preshared_hash_hex: &str, client_id: Option<&str>) -> Result<Self> {
        let mut packet = Self::new(PacketKind::Auth, Vec::new());
        packet
            .headers
            .insert(keys::PRESHARED_HASH, preshared_hash_hex)?;
        packet.flags.insert(PacketFlags::HAS_PRESHARED);
        packet.flags.insert(PacketFlags::HAS_METADATA);
        if let Some(id) = client_id {
            packet.headers.insert(keys::CLIENT_ID, id)?;
        }
        Ok(packet)
    }

    /// UTF-8 text message.
    pub fn text(message: &str) -> Self {
        let payload = message.as_bytes().to_vec();
        let mut packet = Self::new(PacketKind::Message, payload);
        packet.set_content_length();
        packet
    }

    /// Opaque byte payload.
    pub fn bytes(data: Vec<u8>) -> Self {
        let mut packet = Self::new(PacketKind::Bytes, data);
        packet.set_content_length();
        packet
    }

    /// Named object serialised with bincode. `object_type` names a
    /// caller-defined schema.
    pub fn object<T: Serialize>(object_type: &str, value: &T) -> Result<Self> {
        let payload = bincode::serialize(value)?;
        let mut packet = Self::new(PacketKind::Object, payload);
        packet.headers.insert(keys::OBJECT_TYPE, object_type)?;
        packet.set_content_length();
        Ok(packet)
    }

    /// File transfer: raw file bytes plus the name to store them under.
    pub fn file(filename: &str, contents: Vec<u8>) -> Result<Self> {
        let mut packet = Self::new(PacketKind::File, contents);
        packet.headers.insert(keys::FILENAME, filename)?;
        packet.set_content_length();
        Ok(packet)
    }

    /// Directory transfer. The payload is the archive produced by
    /// [`crate::utils::archive::pack_tree`]; the archive carries its own
    /// compression, so the flag is set here and the pipeline leaves the
    /// payload alone.
    pub fn directory(archive_name: &str, archive: Vec<u8>) -> Result<Self> {
        let mut packet = Self::new(PacketKind::Directory, archive);
        packet.headers.insert(keys::FILENAME, archive_name)?;
        packet.flags.insert(PacketFlags::COMPRESSED);
        packet.set_content_length();
        Ok(packet)
    }

    /// Request expecting a correlated response.
    pub fn request(payload: Vec<u8>) -> Self {
        let mut packet = Self::new(PacketKind::Request, payload);
        packet.set_content_length();
        packet
    }

    /// Response to a request.
    pub fn response(payload: Vec<u8>) -> Self {
        let mut packet = Self::new(PacketKind::Response, payload);
        packet.set_content_length();
        packet
    }

    /// Mark this packet as one part of a multi-part message. Reassembly is
    /// the receiver's contract, keyed by `part_id`.
    pub fn with_part(mut self, part_id: &str, index: u32, total: u32) -> Result<Self> {
        if index >= total {
            return Err(WireError::InvalidPacket(constants::ERR_PART_RANGE));
        }
        self.headers.insert(keys::PART_ID, part_id)?;
        self.headers.insert(keys::PART_INDEX, index.to_string())?;
        self.headers.insert(keys::PART_TOTAL, total.to_string())?;
        self.flags.insert(PacketFlags::PARTIAL);
        self.flags.insert(PacketFlags::HAS_METADATA);
        Ok(self)
    }

    fn set_content_length(&mut self) {
        // Numeric value over a reserved key cannot fail validation
        let _ = self
            .headers
            .insert(keys::CONTENT_LENGTH, self.payload.len().to_string());
        self.flags.insert(PacketFlags::HAS_METADATA);
    }

    /// Payload as UTF-8 text.
    pub fn text_payload(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|_| WireError::InvalidPacket("payload is not UTF-8"))
    }

    /// Deserialise an `Object` payload.
    pub fn decode_object<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// Declared content length, when present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get(keys::CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
    }

    /// Preshared-key digest bytes, when carried.
    pub fn preshared_hash(&self) -> Option<Vec<u8>> {
        self.headers
            .get(keys::PRESHARED_HASH)
            .and_then(|v| hex::decode(v).ok())
    }

    pub fn filename(&self) -> Option<&str> {
        self.headers.get(keys::FILENAME)
    }

    pub fn object_type(&self) -> Option<&str> {
        self.headers.get(keys::OBJECT_TYPE)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.headers.get(keys::CLIENT_ID)
    }

    /// Part position, when PARTIAL is set: `(part_id, index, total)`.
    pub fn part(&self) -> Option<(&str, u32, u32)> {
        let id = self.headers.get(keys::PART_ID)?;
        let index = self.headers.get(keys::PART_INDEX)?.parse().ok()?;
        let total = self.headers.get(keys::PART_TOTAL)?.parse().ok()?;
        Some((id, index, total))
    }

    /// Check the field-combination invariants.
    ///
    /// # Errors
    /// Returns `WireError::InvalidPacket` naming the violated invariant
    pub fn validate(&self) -> Result<()> {
        if self.flags.contains(PacketFlags::ENCRYPTED)
            && !self.headers.contains_key(keys::PRESHARED_HASH)
        {
            return Err(WireError::InvalidPacket(constants::ERR_MISSING_PRESHARED));
        }

        if let Some(declared) = self.headers.get(keys::CONTENT_LENGTH) {
            let declared: usize = declared
                .parse()
                .map_err(|_| WireError::InvalidPacket("content-length is not a number"))?;
            // Only comparable once the payload is back to plaintext
            if !self.flags.contains(PacketFlags::ENCRYPTED)
                && !self.flags.contains(PacketFlags::COMPRESSED)
                && declared != self.payload.len()
            {
                return Err(WireError::InvalidPacket(constants::ERR_CONTENT_LENGTH));
            }
        }

        if self.flags.contains(PacketFlags::PARTIAL) {
            let (index, total) = match (
                self.headers.get(keys::PART_INDEX),
                self.headers.get(keys::PART_TOTAL),
            ) {
                (Some(i), Some(t)) => (
                    i.parse::<u32>()
                        .map_err(|_| WireError::InvalidPacket("part-index is not a number"))?,
                    t.parse::<u32>()
                        .map_err(|_| WireError::InvalidPacket("part-total is not a number"))?,
                ),
                _ => {
                    return Err(WireError::InvalidPacket(
                        "partial packet missing part headers",
                    ))
                }
            };
            if index >= total {
                return Err(WireError::InvalidPacket(constants::ERR_PART_RANGE));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} packet, {} header(s), {} byte payload",
            self.kind,
            self.headers.len(),
            self.payload.len()
        )
    }
}
