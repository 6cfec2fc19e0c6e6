//! HA multicast wire format (§4.9.1). Unlike the command-dispatch protocol,
//! every multi-byte field here is **network byte order** (big-endian).

use byteorder::{BigEndian, ByteOrder};

use crate::error::ProtocolError;

pub const MAGIC: u16 = 0xBEA7;
pub const NODE_ID_LEN: usize = 32;
/// magic(2) + msgType(1) + role(1) + priority(4) + sequence(4) + timestamp(8) + nodeId(32).
pub const FRAME_LEN: usize = 2 + 1 + 1 + 4 + 4 + 8 + NODE_ID_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    ElectionAnnounce = 1,
    Heartbeat = 2,
    RoleDeclare = 3,
}

impl MessageType {
    fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        match v {
            1 => Ok(Self::ElectionAnnounce),
            2 => Ok(Self::Heartbeat),
            3 => Ok(Self::RoleDeclare),
            _ => Err(ProtocolError::BadMsgType {
                expected: 1,
                actual: v as u16,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unknown = 0,
    Primary = 1,
    Standby = 2,
}

impl Role {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Primary,
            2 => Self::Standby,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaMessage {
    pub msg_type: MessageType,
    pub role: Role,
    pub priority: i32,
    pub sequence: u32,
    pub timestamp: u64,
    /// First non-loopback IPv4 of the sending node, as a NUL-padded ASCII
    /// string (e.g. `"192.168.6.10"`).
    pub node_id: String,
}

pub fn encode(msg: &HaMessage) -> [u8; FRAME_LEN] {
    let mut buf = [0u8; FRAME_LEN];
    BigEndian::write_u16(&mut buf[0..2], MAGIC);
    buf[2] = msg.msg_type as u8;
    buf[3] = msg.role as u8;
    BigEndian::write_i32(&mut buf[4..8], msg.priority);
    BigEndian::write_u32(&mut buf[8..12], msg.sequence);
    BigEndian::write_u64(&mut buf[12..20], msg.timestamp);
    let node_bytes = msg.node_id.as_bytes();
    let n = node_bytes.len().min(NODE_ID_LEN);
    buf[20..20 + n].copy_from_slice(&node_bytes[..n]);
    buf
}

pub fn decode(data: &[u8]) -> Result<HaMessage, ProtocolError> {
    if data.len() < FRAME_LEN {
        return Err(ProtocolError::TooShort {
            expected: FRAME_LEN,
            actual: data.len(),
        });
    }
    let magic = BigEndian::read_u16(&data[0..2]);
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic {
            expected: MAGIC,
            actual: magic,
        });
    }
    let msg_type = MessageType::from_u8(data[2])?;
    let role = Role::from_u8(data[3]);
    let priority = BigEndian::read_i32(&data[4..8]);
    let sequence = BigEndian::read_u32(&data[8..12]);
    let timestamp = BigEndian::read_u64(&data[12..20]);
    let node_id_raw = &data[20..20 + NODE_ID_LEN];
    let end = node_id_raw.iter().position(|&b| b == 0).unwrap_or(NODE_ID_LEN);
    let node_id = String::from_utf8_lossy(&node_id_raw[..end]).into_owned();
    Ok(HaMessage {
        msg_type,
        role,
        priority,
        sequence,
        timestamp,
        node_id,
    })
}

/// Yield-on-tie comparison for split-brain resolution: the peer outranks us
/// if its priority is strictly higher, or priorities are equal and its
/// node-id (as an IPv4-derived u32) is strictly smaller.
pub fn peer_outranks(my_priority: i32, my_node_id: u32, their_priority: i32, their_node_id: u32) -> bool {
    their_priority > my_priority || (their_priority == my_priority && their_node_id < my_node_id)
}
