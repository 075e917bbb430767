//! Binary wire protocol for Coordinator <-> Node communication.
//!
//! # Protocol Specification
//!
//! Header Format: 12 bytes, Little Endian
//! ```text
//! [MAGIC:4][VER:1][TYPE:1][RES:2][LEN:4]
//! ```
//!
//! - MAGIC (u32): 0x4B525241 ("KRRA" on the wire)
//! - VER (u8): Protocol version (0x01)
//! - TYPE (u8): MsgType
//! - RES (u16): Reserved for future use
//! - LEN (u32): Payload length in bytes
//!
//! Payloads are JSON-encoded structs from [`types`]. A frame with a
//! mismatched magic or an unsupported version is dropped and the failure
//! is surfaced to the caller as a [`ProtocolError`].

pub mod defaults;
pub mod error;
pub mod http_types;
pub mod types;
pub mod version;

// Re-export the shared identifier wrappers so downstream crates only need
// one protocol import for wire-facing code.
pub use corral_ids::{AgentId, ComponentId, JobId, NodeId, ProofId, SnapshotId};

pub use error::{ProtocolError, Result};
pub use types::{
    agent_capability_key, Agent, AgentKind, AgentStatus, ErrorPayload, HeartbeatPayload, Job,
    JobOutcome, JobResultPayload, JobStatus, JobSubmitPayload, Node, NodeInfoPayload, NodeStatus,
    Proof, StateSyncEvent, StateSyncPayload,
};
pub use version::{Version, VersionError};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Frame magic, "KRRA" read as a little-endian u32.
pub const MAGIC: u32 = 0x4B52_5241;

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Header size in bytes
pub const HEADER_SIZE: usize = 12;

/// Maximum payload size accepted on a single frame (64 MiB).
///
/// The length field is u32 but nothing legitimate on the control plane
/// approaches 4 GiB; the cap bounds allocation on a hostile frame.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Wire message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Node -> Coordinator keep-alive
    Heartbeat = 0,
    /// Register an agent in the catalog
    AgentRegister = 1,
    /// Overwrite an existing agent record
    AgentUpdate = 2,
    /// Submit a job for placement
    JobSubmit = 3,
    /// Node -> Coordinator completion/failure report
    JobResult = 4,
    /// Coordinator -> Node membership event broadcast
    StateSync = 5,
    /// Node self-description (registration / refresh)
    NodeInfo = 6,
    /// Bidirectional failure report
    Error = 255,
}

impl MsgType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MsgType::Heartbeat),
            1 => Ok(MsgType::AgentRegister),
            2 => Ok(MsgType::AgentUpdate),
            3 => Ok(MsgType::JobSubmit),
            4 => Ok(MsgType::JobResult),
            5 => Ok(MsgType::StateSync),
            6 => Ok(MsgType::NodeInfo),
            255 => Ok(MsgType::Error),
            _ => Err(ProtocolError::InvalidMsgType(value)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub version: u8,
    pub msg_type: MsgType,
    pub reserved: u16,
    pub payload_len: u32,
}

impl Header {
    pub fn new(msg_type: MsgType, payload_len: u32) -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            msg_type,
            reserved: 0,
            payload_len,
        }
    }

    /// Pack header into a 12-byte buffer (little endian).
    pub fn pack(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        let mut cursor = Cursor::new(&mut buf[..]);

        cursor.write_u32::<LittleEndian>(self.magic)?;
        cursor.write_u8(self.version)?;
        cursor.write_u8(self.msg_type.as_u8())?;
        cursor.write_u16::<LittleEndian>(self.reserved)?;
        cursor.write_u32::<LittleEndian>(self.payload_len)?;

        Ok(buf)
    }

    /// Unpack header from a 12-byte buffer.
    ///
    /// Magic is checked before the version so a stray connection speaking a
    /// different protocol is rejected without interpreting the rest.
    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::HeaderTooShort {
                expected: HEADER_SIZE,
                got: data.len(),
            });
        }

        let mut cursor = Cursor::new(&data[..HEADER_SIZE]);

        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic {
                expected: MAGIC,
                got: magic,
            });
        }

        let version = cursor.read_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }

        let msg_type = MsgType::from_u8(cursor.read_u8()?)?;
        let reserved = cursor.read_u16::<LittleEndian>()?;
        let payload_len = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            magic,
            version,
            msg_type,
            reserved,
            payload_len,
        })
    }
}

/// Wire message (header + payload)
#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message. Fails if the payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn new(msg_type: MsgType, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let header = Header::new(msg_type, payload.len() as u32);
        Ok(Self { header, payload })
    }

    /// Serialize a payload struct to JSON and wrap it in a frame.
    pub fn encode<T: serde::Serialize>(msg_type: MsgType, payload: &T) -> Result<Self> {
        Self::new(msg_type, serde_json::to_vec(payload)?)
    }

    /// Decode the JSON payload into a struct.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Pack into a single contiguous byte buffer (header then payload).
    pub fn pack(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header.pack()?);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Unpack from a contiguous byte buffer.
    pub fn unpack(data: &[u8]) -> Result<Self> {
        let header = Header::unpack(data)?;
        let body = &data[HEADER_SIZE..];
        if body.len() != header.payload_len as usize {
            return Err(ProtocolError::PayloadLengthMismatch {
                expected: header.payload_len as usize,
                got: body.len(),
            });
        }
        Ok(Self {
            header,
            payload: body.to_vec(),
        })
    }
}
