//! TCP chassis-switch client (C7, §4.7): fixed 52-byte request/response
//! frames for RESET/POWOFF/POWON, plus a ping-based self-check.

use std::io;
use std::net::ToSocketAddrs;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use crate::error::ChassisControlError;

const FLAG: &[u8; 8] = b"ETHSWB\0\0";
const FRAME_SIZE: usize = 8 + 16 + 8 + 16 + 4;
const SLOT_COUNT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChassisCommand {
    Reset,
    PowerOff,
    PowerOn,
}

impl ChassisCommand {
    fn wire_name(self) -> &'static [u8; 8] {
        match self {
            ChassisCommand::Reset => b"RESET\0\0\0",
            ChassisCommand::PowerOff => b"POWOFF\0\0",
            ChassisCommand::PowerOn => b"POWON\0\0\0",
        }
    }
}

/// Outcome of one chassis request, per slot 1..12.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChassisResult {
    Success,
    PartialSuccess { slot_failed: [bool; SLOT_COUNT] },
    InvalidResponse,
    NetworkError,
    TimeoutError,
}

fn encode_request(ip: &str, command: ChassisCommand, slots: &[bool; SLOT_COUNT], req_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_SIZE);
    buf.extend_from_slice(FLAG);
    let mut ip_field = [0u8; 16];
    let ip_bytes = ip.as_bytes();
    let n = ip_bytes.len().min(16);
    ip_field[..n].copy_from_slice(&ip_bytes[..n]);
    buf.extend_from_slice(&ip_field);
    buf.extend_from_slice(command.wire_name());
    let mut slot_field = [0u8; 16];
    for (i, &act) in slots.iter().enumerate() {
        slot_field[i] = if act { 1 } else { 0 };
    }
    buf.extend_from_slice(&slot_field);
    buf.extend_from_slice(&req_id.to_le_bytes());
    buf
}

/// Parses a response frame into a per-slot success/fail outcome, classifying
/// only the slots named in `requested_slots` — matching `parseResponse` in
/// the original, which never reports on slots the caller didn't ask about.
///
/// A response shorter than `FRAME_SIZE` yields `InvalidResponse` — the
/// mandated behavior per the spec; the original implementation's
/// short-response path incorrectly fell through to SUCCESS.
fn parse_response(data: &[u8], requested_slots: &[bool; SLOT_COUNT]) -> ChassisResult {
    if data.len() < FRAME_SIZE {
        return ChassisResult::InvalidResponse;
    }
    let slot_offset = 8 + 16 + 8;
    let slot_bytes = &data[slot_offset..slot_offset + 16];
    let mut slot_failed = [false; SLOT_COUNT];
    let mut any_success = false;
    let mut any_failure = false;
    for i in 0..SLOT_COUNT {
        if !requested_slots[i] {
            continue;
        }
        let failed = slot_bytes[i] != 0;
        slot_failed[i] = failed;
        if failed {
            any_failure = true;
        } else {
            any_success = true;
        }
    }
    if any_success && !any_failure {
        ChassisResult::Success
    } else if any_success && any_failure {
        ChassisResult::PartialSuccess { slot_failed }
    } else {
        ChassisResult::InvalidResponse
    }
}

pub struct ChassisController {
    port: u16,
    timeout: Duration,
}

impl ChassisController {
    pub fn new(port: u16, timeout_seconds: u64) -> Self {
        Self {
            port,
            timeout: Duration::from_secs(timeout_seconds.max(1)),
        }
    }

    async fn exchange(
        &self,
        chassis_ip: &str,
        command: ChassisCommand,
        slots: &[bool; SLOT_COUNT],
        req_id: u32,
    ) -> ChassisResult {
        let request = encode_request(chassis_ip, command, slots, req_id);
        match timeout(self.timeout, self.connect_and_exchange(chassis_ip, &request)).await {
            Ok(Ok(response)) => parse_response(&response, slots),
            Ok(Err(err)) => {
                warn!(%err, chassis_ip, "chassis controller network error");
                ChassisResult::NetworkError
            }
            Err(_) => {
                warn!(chassis_ip, "chassis controller request timed out");
                ChassisResult::TimeoutError
            }
        }
    }

    async fn connect_and_exchange(&self, chassis_ip: &str, request: &[u8]) -> io::Result<Vec<u8>> {
        let addr = (chassis_ip, self.port);
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(request).await?;
        let mut buf = vec![0u8; FRAME_SIZE];
        let n = stream.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }

    pub async fn reset_board(
        &self,
        chassis_ip: &str,
        slots: &[bool; SLOT_COUNT],
        req_id: u32,
    ) -> ChassisResult {
        self.exchange(chassis_ip, ChassisCommand::Reset, slots, req_id).await
    }

    pub async fn power_off_board(
        &self,
        chassis_ip: &str,
        slots: &[bool; SLOT_COUNT],
        req_id: u32,
    ) -> ChassisResult {
        self.exchange(chassis_ip, ChassisCommand::PowerOff, slots, req_id).await
    }

    pub async fn power_on_board(
        &self,
        chassis_ip: &str,
        slots: &[bool; SLOT_COUNT],
        req_id: u32,
    ) -> ChassisResult {
        self.exchange(chassis_ip, ChassisCommand::PowerOn, slots, req_id).await
    }

    /// Pings `ip` once with a 1s timeout; true iff the process exits 0.
    pub async fn selfcheck_board(&self, ip: &str) -> bool {
        if ip.is_empty() || ip.to_socket_addrs().is_err() && ip.parse::<std::net::IpAddr>().is_err() {
            return false;
        }
        let status = Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg("1")
            .arg(ip)
            .status()
            .await;
        matches!(status, Ok(s) if s.success())
    }
}

impl From<io::Error> for ChassisControlError {
    fn from(err: io::Error) -> Self {
        ChassisControlError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response() -> Vec<u8> {
        let mut data = vec![0u8; FRAME_SIZE];
        data[..8].copy_from_slice(FLAG);
        data
    }

    #[test]
    fn short_response_is_invalid_not_success() {
        let data = vec![0u8; FRAME_SIZE - 1];
        let all = [true; SLOT_COUNT];
        assert_eq!(parse_response(&data, &all), ChassisResult::InvalidResponse);
    }

    #[test]
    fn all_zero_slots_is_success() {
        let data = ok_response();
        let all = [true; SLOT_COUNT];
        assert_eq!(parse_response(&data, &all), ChassisResult::Success);
    }

    #[test]
    fn mixed_slots_is_partial_success() {
        let mut data = ok_response();
        let slot_offset = 8 + 16 + 8;
        data[slot_offset] = 1;
        let all = [true; SLOT_COUNT];
        match parse_response(&data, &all) {
            ChassisResult::PartialSuccess { slot_failed } => {
                assert!(slot_failed[0]);
                assert!(!slot_failed[1]);
            }
            other => panic!("expected PartialSuccess, got {other:?}"),
        }
    }

    #[test]
    fn all_failed_slots_is_invalid_response() {
        let mut data = ok_response();
        let slot_offset = 8 + 16 + 8;
        for i in 0..SLOT_COUNT {
            data[slot_offset + i] = 1;
        }
        let all = [true; SLOT_COUNT];
        assert_eq!(parse_response(&data, &all), ChassisResult::InvalidResponse);
    }

    #[test]
    fn unrequested_slots_are_not_classified() {
        // Only slots 0..4 requested; fail every slot in the response,
        // including ones outside the request.
        let mut data = ok_response();
        let slot_offset = 8 + 16 + 8;
        for i in 0..SLOT_COUNT {
            data[slot_offset + i] = 1;
        }
        let mut requested = [false; SLOT_COUNT];
        requested[0] = true;
        requested[1] = true;
        match parse_response(&data, &requested) {
            ChassisResult::InvalidResponse => {}
            other => panic!("expected InvalidResponse (all requested slots failed), got {other:?}"),
        }

        // Now make one of the requested slots succeed so the requested set
        // is mixed, and confirm slots outside the request stay unclassified
        // (default `false`) even though their response bytes say "failed".
        let mut data = ok_response();
        data[slot_offset + 1] = 1;
        for i in 2..SLOT_COUNT {
            data[slot_offset + i] = 1;
        }
        match parse_response(&data, &requested) {
            ChassisResult::PartialSuccess { slot_failed } => {
                assert!(!slot_failed[0]);
                assert!(slot_failed[1]);
                assert!(!slot_failed[2], "slot 2 was never requested and must not be reported as failed");
            }
            other => panic!("expected PartialSuccess, got {other:?}"),
        }
    }

    #[test]
    fn encode_request_places_command_and_req_id() {
        let slots = [true; SLOT_COUNT];
        let buf = encode_request("192.168.2.180", ChassisCommand::Reset, &slots, 0x1234_5678);
        assert_eq!(buf.len(), FRAME_SIZE);
        assert_eq!(&buf[..8], FLAG);
        assert_eq!(&buf[24..32], b"RESET\0\0\0");
        assert_eq!(&buf[48..52], &0x1234_5678u32.to_le_bytes());
    }
}
