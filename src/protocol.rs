//! Wire format of the unreliable channel.
//!
//! Every datagram starts with an 8-byte header: the message kind and the
//! total datagram size, both `u32`. Two payloads follow it:
//!
//! - a vehicle update (kind [`MessageKind::VehicleUpdate`]): one 32-byte
//!   record describing the sender's agent;
//! - a world update (kind [`MessageKind::WorldUpdate`]): a `u32` record
//!   count followed by that many records.
//!
//! A record is `id: i32, x: f32, y: f32, theta: f32, translational_force:
//! f32, rotational_force: f32, timestamp: u64`. All multi-byte fields are
//! big-endian so heterogeneous clients agree on the layout.

use thiserror::Error;

use crate::agent::ParticipantId;
use crate::constants::DATAGRAM_CAPACITY;
use crate::numeric::{count_from_u32, count_to_u32};

/// Length of the common header.
pub const HEADER_LEN: usize = 8;
/// Length of one agent record.
pub const RECORD_LEN: usize = 32;
/// Length of an encoded vehicle update.
pub const UPDATE_LEN: usize = HEADER_LEN + RECORD_LEN;
/// Length of a world update carrying no records.
pub const SNAPSHOT_PREFIX_LEN: usize = HEADER_LEN + 4;
/// Most records a world update can carry within [`DATAGRAM_CAPACITY`].
pub const MAX_SNAPSHOT_RECORDS: usize = (DATAGRAM_CAPACITY - SNAPSHOT_PREFIX_LEN) / RECORD_LEN;

/// Discriminant carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Server broadcast of every known agent.
    WorldUpdate,
    /// One client's own agent state.
    VehicleUpdate,
}

impl MessageKind {
    /// Wire value of the kind.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::WorldUpdate => 6,
            Self::VehicleUpdate => 7,
        }
    }

    /// Parses a wire value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnknownKind`] for unassigned values.
    pub const fn from_code(code: u32) -> Result<Self, ProtocolError> {
        match code {
            6 => Ok(Self::WorldUpdate),
            7 => Ok(Self::VehicleUpdate),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// Reasons a datagram cannot be decoded or encoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The datagram ended before a field could be read.
    #[error("datagram truncated: needed {needed} more bytes, {available} left")]
    Truncated {
        /// Bytes the next field requires.
        needed: usize,
        /// Bytes remaining in the datagram.
        available: usize,
    },
    /// The header names a kind this client does not know.
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    /// The header names a valid kind, but not the one the caller accepts.
    #[error("expected {expected:?} message, got {found:?}")]
    UnexpectedKind {
        /// Kind the caller accepts.
        expected: MessageKind,
        /// Kind found in the header.
        found: MessageKind,
    },
    /// The header's size field disagrees with the datagram length.
    #[error("header declares {declared} bytes but datagram has {actual}")]
    SizeMismatch {
        /// Size carried in the header.
        declared: u32,
        /// Length of the datagram.
        actual: usize,
    },
    /// The payload length is not what the record count implies.
    #[error("{count} records do not fit a {payload}-byte payload")]
    RecordCount {
        /// Count carried in the payload.
        count: u32,
        /// Bytes left for records.
        payload: usize,
    },
    /// The message is too large to describe on the wire.
    #[error("message of {0} records is too large to encode")]
    TooLarge(usize),
    /// A record carries a NaN or infinite coordinate or force.
    #[error("record field `{field}` is not finite")]
    NonFinite {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// State of one agent as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentUpdate {
    /// Participant the record describes.
    pub id: ParticipantId,
    /// Ground x coordinate.
    pub x: f32,
    /// Ground y coordinate.
    pub y: f32,
    /// Heading in radians.
    pub theta: f32,
    /// Pending translational force.
    pub translational_force: f32,
    /// Pending rotational force.
    pub rotational_force: f32,
    /// Send time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Server broadcast of all known agents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// One record per agent.
    pub records: Vec<AgentUpdate>,
}

/// Any decodable datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A single agent's state.
    Update(AgentUpdate),
    /// A world snapshot.
    Snapshot(Snapshot),
}

struct Writer {
    buf: Vec<u8>,
}

#[expect(
    clippy::big_endian_bytes,
    reason = "The wire format is defined in network byte order."
)]
impl Writer {
    fn with_header(kind: MessageKind, size: u32) -> Self {
        let mut writer = Self {
            buf: Vec::with_capacity(usize::try_from(size).unwrap_or_default()),
        };
        writer.u32(kind.code());
        writer.u32(size);
        writer
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn record(&mut self, update: &AgentUpdate) {
        self.i32(update.id);
        self.f32(update.x);
        self.f32(update.y);
        self.f32(update.theta);
        self.f32(update.translational_force);
        self.f32(update.rotational_force);
        self.u64(update.timestamp);
    }
}

struct Reader<'a> {
    rest: &'a [u8],
}

#[expect(
    clippy::big_endian_bytes,
    reason = "The wire format is defined in network byte order."
)]
impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let Some((head, tail)) = self.rest.split_first_chunk::<N>() else {
            return Err(ProtocolError::Truncated {
                needed: N,
                available: self.rest.len(),
            });
        };
        self.rest = tail;
        Ok(*head)
    }

    const fn remaining(&self) -> usize {
        self.rest.len()
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.take().map(u32::from_be_bytes)
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.take().map(i32::from_be_bytes)
    }

    fn u64(&mut self) -> Result<u64, ProtocolError> {
        self.take().map(u64::from_be_bytes)
    }

    fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.take().map(f32::from_be_bytes)
    }

    fn finite(&mut self, field: &'static str) -> Result<f32, ProtocolError> {
        let value = self.f32()?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ProtocolError::NonFinite { field })
        }
    }

    fn record(&mut self) -> Result<AgentUpdate, ProtocolError> {
        Ok(AgentUpdate {
            id: self.i32()?,
            x: self.finite("x")?,
            y: self.finite("y")?,
            theta: self.finite("theta")?,
            translational_force: self.finite("translational_force")?,
            rotational_force: self.finite("rotational_force")?,
            timestamp: self.u64()?,
        })
    }
}

/// Encodes one agent's state as a vehicle update.
///
/// # Examples
/// ```
/// use trundle::protocol::{decode_update, encode_update, AgentUpdate, UPDATE_LEN};
/// let update = AgentUpdate {
///     id: 4,
///     x: 1.0,
///     y: 2.0,
///     theta: 0.5,
///     translational_force: 3.0,
///     rotational_force: -0.1,
///     timestamp: 1_700_000_000_000,
/// };
/// let datagram = encode_update(&update);
/// assert_eq!(datagram.len(), UPDATE_LEN);
/// assert_eq!(decode_update(&datagram), Ok(update));
/// ```
#[must_use]
pub fn encode_update(update: &AgentUpdate) -> Vec<u8> {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "UPDATE_LEN is a small compile-time constant."
    )]
    let mut writer = Writer::with_header(MessageKind::VehicleUpdate, UPDATE_LEN as u32);
    writer.record(update);
    writer.buf
}

/// Encodes a world snapshot.
///
/// # Errors
/// Returns [`ProtocolError::TooLarge`] when the record count or total size
/// does not fit the `u32` wire fields.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, ProtocolError> {
    let count = snapshot.records.len();
    let too_large = || ProtocolError::TooLarge(count);
    let wire_count = count_to_u32(count).ok_or_else(too_large)?;
    let size = count
        .checked_mul(RECORD_LEN)
        .and_then(|payload| payload.checked_add(SNAPSHOT_PREFIX_LEN))
        .and_then(count_to_u32)
        .ok_or_else(too_large)?;
    let mut writer = Writer::with_header(MessageKind::WorldUpdate, size);
    writer.u32(wire_count);
    for record in &snapshot.records {
        writer.record(record);
    }
    Ok(writer.buf)
}

fn read_header(datagram: &[u8]) -> Result<(MessageKind, Reader<'_>), ProtocolError> {
    let mut reader = Reader::new(datagram);
    let code = reader.u32()?;
    let declared = reader.u32()?;
    let kind = MessageKind::from_code(code)?;
    if count_from_u32(declared) != Some(datagram.len()) {
        return Err(ProtocolError::SizeMismatch {
            declared,
            actual: datagram.len(),
        });
    }
    Ok((kind, reader))
}

fn read_update(mut reader: Reader<'_>) -> Result<AgentUpdate, ProtocolError> {
    let update = reader.record()?;
    if reader.remaining() != 0 {
        return Err(ProtocolError::RecordCount {
            count: 1,
            payload: RECORD_LEN + reader.remaining(),
        });
    }
    Ok(update)
}

fn read_snapshot(mut reader: Reader<'_>) -> Result<Snapshot, ProtocolError> {
    let count = reader.u32()?;
    let payload = reader.remaining();
    let expected = count_from_u32(count).and_then(|records| records.checked_mul(RECORD_LEN));
    if expected != Some(payload) {
        return Err(ProtocolError::RecordCount { count, payload });
    }
    let records = (0..count)
        .map(|_| reader.record())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Snapshot { records })
}

/// Decodes a datagram of either kind.
///
/// # Errors
/// Returns a [`ProtocolError`] when the header is invalid, the payload
/// does not match it, or a record carries a non-finite float.
pub fn decode(datagram: &[u8]) -> Result<Message, ProtocolError> {
    let (kind, reader) = read_header(datagram)?;
    match kind {
        MessageKind::VehicleUpdate => read_update(reader).map(Message::Update),
        MessageKind::WorldUpdate => read_snapshot(reader).map(Message::Snapshot),
    }
}

fn expect_kind(
    datagram: &[u8],
    expected: MessageKind,
) -> Result<Reader<'_>, ProtocolError> {
    let (found, reader) = read_header(datagram)?;
    if found == expected {
        Ok(reader)
    } else {
        Err(ProtocolError::UnexpectedKind { expected, found })
    }
}

/// Decodes a vehicle update, rejecting any other kind.
///
/// # Errors
/// Returns [`ProtocolError::UnexpectedKind`] for world updates and the
/// usual framing errors otherwise.
pub fn decode_update(datagram: &[u8]) -> Result<AgentUpdate, ProtocolError> {
    read_update(expect_kind(datagram, MessageKind::VehicleUpdate)?)
}

/// Decodes a world snapshot, rejecting any other kind.
///
/// # Errors
/// Returns [`ProtocolError::UnexpectedKind`] for vehicle updates and the
/// usual framing errors otherwise.
pub fn decode_snapshot(datagram: &[u8]) -> Result<Snapshot, ProtocolError> {
    read_snapshot(expect_kind(datagram, MessageKind::WorldUpdate)?)
}
