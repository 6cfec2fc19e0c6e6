//! BMC UDP multicast receiver (C6, §4.6).
//!
//! Frames are ~1.6 KB fixed-layout records: header magic `0x5AA5`, type
//! `0x0002`, trailer `0xA55A`, with a declared length equal to the struct
//! size. Anything that fails a check is dropped with a warning; only the
//! presence-derived status (`Offline` iff not-present) is written back.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::BmcConfig;
use crate::error::ProtocolError;
use crate::repository::ChassisRepository;

const HEADER_MAGIC: u16 = 0x5AA5;
const MSG_TYPE: u16 = 0x0002;
const TRAILER_MAGIC: u16 = 0xA55A;

/// Load-slot order carried in the frame: slots 1-4, 6-7, 9-12 (slots 5, 8,
/// 13, 14 are power/switch modules reported separately or not at all).
const LOAD_SLOT_ORDER: [u32; 10] = [1, 2, 3, 4, 6, 7, 9, 10, 11, 12];

/// Fixed sizes from the original wire layout, used only to validate the
/// declared `msglenth` against the frame we actually received.
const FAN_ENTRY_SIZE: usize = 6;
const SENSOR_ENTRY_SIZE: usize = 12;
const POWER_BOARD_SIZE: usize = 1 + 2 + 2 + 8 + 8 + 8 + 1 + 1 + SENSOR_ENTRY_SIZE * 8 + 1;
const LOAD_BOARD_SIZE: usize = 1 + 2 + 1 + 2 + 8 + 8 + 8 + 1 + 1 + SENSOR_ENTRY_SIZE * 8 + 2;
const FRAME_SIZE: usize = 2 + 2 + 2 + 2 + 4 + 2 + 2 + 1 + 1
    + FAN_ENTRY_SIZE * 6
    + POWER_BOARD_SIZE * 2
    + LOAD_BOARD_SIZE * 10
    + 2;

/// Header is `head(2)+msglenth(2)+seqnum(2)+msgtype(2)+timestamp(4)+moduletype(2)+recv(2)+boxname(1)+boxid(1)` = 18 bytes.
const BOXID_OFFSET: usize = 17;
const SLOTS_OFFSET: usize = 18 + 6 * FAN_ENTRY_SIZE + 2 * POWER_BOARD_SIZE;
const SLOT_PRST_OFFSET: usize = 3;

/// Parses one frame into `(boxid, slot -> present)`.
pub fn parse_frame(data: &[u8]) -> Result<(u32, HashMap<u32, bool>), ProtocolError> {
    if data.len() < FRAME_SIZE {
        return Err(ProtocolError::TooShort {
            expected: FRAME_SIZE,
            actual: data.len(),
        });
    }
    let head = LittleEndian::read_u16(&data[0..2]);
    if head != HEADER_MAGIC {
        return Err(ProtocolError::BadMagic {
            expected: HEADER_MAGIC,
            actual: head,
        });
    }
    let msglenth = LittleEndian::read_u16(&data[2..4]) as usize;
    if msglenth != FRAME_SIZE {
        return Err(ProtocolError::LengthMismatch {
            declared: msglenth,
            expected: FRAME_SIZE,
        });
    }
    let msgtype = LittleEndian::read_u16(&data[6..8]);
    if msgtype != MSG_TYPE {
        return Err(ProtocolError::BadMsgType {
            expected: MSG_TYPE,
            actual: msgtype,
        });
    }
    let tail = LittleEndian::read_u16(&data[FRAME_SIZE - 2..FRAME_SIZE]);
    if tail != TRAILER_MAGIC {
        return Err(ProtocolError::BadTrailer {
            expected: TRAILER_MAGIC,
            actual: tail,
        });
    }

    let boxid = data[BOXID_OFFSET] as u32;

    let mut presence = HashMap::with_capacity(LOAD_SLOT_ORDER.len());
    for (i, &slot) in LOAD_SLOT_ORDER.iter().enumerate() {
        let board_offset = SLOTS_OFFSET + i * LOAD_BOARD_SIZE;
        let prst = data[board_offset + SLOT_PRST_OFFSET];
        presence.insert(slot, prst == 1);
    }
    Ok((boxid, presence))
}

pub struct BmcReceiver {
    config: BmcConfig,
    chassis_repo: Arc<ChassisRepository>,
}

impl BmcReceiver {
    pub fn new(config: BmcConfig, chassis_repo: Arc<ChassisRepository>) -> Self {
        Self {
            config,
            chassis_repo,
        }
    }

    fn bind_socket(&self) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr: SocketAddr =
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.port).into();
        socket.bind(&bind_addr.into())?;
        let group: Ipv4Addr = self.config.multicast_group.parse().unwrap_or(Ipv4Addr::UNSPECIFIED);
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let socket = match self.bind_socket() {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "BMC receiver failed to bind/join multicast group, running in degraded no-op mode");
                return;
            }
        };
        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                res = socket.recv(&mut buf) => {
                    match res {
                        Ok(n) => self.handle_packet(&buf[..n]),
                        Err(err) => warn!(%err, "BMC receive error"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    fn handle_packet(&self, data: &[u8]) {
        match parse_frame(data) {
            Ok((boxid, presence)) => {
                debug!(boxid, slots = presence.len(), "BMC frame accepted");
                if let Err(err) = self.chassis_repo.update_all_boards_status(boxid, &presence) {
                    warn!(%err, boxid, "BMC frame referenced unknown chassis");
                }
            }
            Err(err) => warn!(%err, "dropping malformed BMC frame"),
        }
    }
}
