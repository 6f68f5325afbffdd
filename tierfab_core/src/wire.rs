//! Fixed-layout wire records.
//!
//! Both records are sent whole, with no length prefix and no framing beyond their
//! byte count. Integers are little-endian.
//!
//! IdentityReport (12 bytes):
//!   [u32 role tag][i32 index][i32 pid]
//!
//! Request (8 bytes):
//!   [i32 client_id][f32 value bits]

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::role::Role;

pub const IDENTITY_FRAME_LEN: usize = 12;
pub const REQUEST_FRAME_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown role tag {0}")]
    UnknownRole(u32),

    #[error("negative index {0}")]
    NegativeIndex(i32),

    #[error("non-positive pid {0}")]
    InvalidPid(i32),
}

#[inline]
fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
fn le_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Self-announcement a process sends exactly once, right after startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityReport {
    pub role: Role,
    pub index: i32,
    pub pid: i32,
}

impl IdentityReport {
    pub fn new(role: Role, index: i32, pid: i32) -> Self {
        Self { role, index, pid }
    }

    pub fn encode(&self) -> IdentityFrame {
        let mut buf = [0u8; IDENTITY_FRAME_LEN];
        buf[0..4].copy_from_slice(&self.role.tag().to_le_bytes());
        buf[4..8].copy_from_slice(&self.index.to_le_bytes());
        buf[8..12].copy_from_slice(&self.pid.to_le_bytes());
        IdentityFrame(buf)
    }
}

/// An identity report as raw bytes.
///
/// Intermediate tiers relay this verbatim and never decode it; only the root does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityFrame(pub [u8; IDENTITY_FRAME_LEN]);

impl IdentityFrame {
    #[inline]
    pub fn as_bytes(&self) -> &[u8; IDENTITY_FRAME_LEN] {
        &self.0
    }

    pub fn decode(&self) -> Result<IdentityReport, WireError> {
        let b = &self.0;
        let tag = le_u32(&b[0..4]);
        let role = Role::from_tag(tag).ok_or(WireError::UnknownRole(tag))?;
        let index = le_i32(&b[4..8]);
        if index < 0 {
            return Err(WireError::NegativeIndex(index));
        }
        let pid = le_i32(&b[8..12]);
        if pid <= 0 {
            return Err(WireError::InvalidPid(pid));
        }
        Ok(IdentityReport { role, index, pid })
    }
}

impl From<[u8; IDENTITY_FRAME_LEN]> for IdentityFrame {
    fn from(bytes: [u8; IDENTITY_FRAME_LEN]) -> Self {
        IdentityFrame(bytes)
    }
}

/// One unit of client work. Never acknowledged.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub client_id: i32,
    pub value: f32,
}

impl Request {
    pub fn new(client_id: i32, value: f32) -> Self {
        Self { client_id, value }
    }

    pub fn encode(&self) -> [u8; REQUEST_FRAME_LEN] {
        let mut buf = [0u8; REQUEST_FRAME_LEN];
        buf[0..4].copy_from_slice(&self.client_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.value.to_bits().to_le_bytes());
        buf
    }

    /// Every 8-byte pattern is a valid request (NaN payloads included).
    pub fn decode(buf: &[u8; REQUEST_FRAME_LEN]) -> Self {
        Self {
            client_id: le_i32(&buf[0..4]),
            value: f32::from_bits(le_u32(&buf[4..8])),
        }
    }
}
