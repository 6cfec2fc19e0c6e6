//! Binary framing for the command-dispatch multicast protocol (§4.8).
//!
//! Requests carry a 22-byte transport header we don't parse, followed by a
//! little-endian opcode and an opcode-specific body. Responses are built
//! fresh: `build_response_header` followed by the response opcode and its
//! own body. All multi-byte fields on this wire are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use chrono::Timelike;

use crate::error::ProtocolError;

pub const REQUEST_HEADER_LEN: usize = 22;
pub const OPCODE_LEN: usize = 2;
pub const RESPONSE_HEADER_LEN: usize = 22;

pub const CHASSIS_COUNT: usize = 9;
pub const SLOTS_PER_CHASSIS: usize = 12;
pub const TASKS_PER_BOARD: usize = 8;

/// Splits a raw datagram into `(opcode, body)`. The first 22 bytes are an
/// opaque transport header; bytes 22-23 are the opcode.
pub fn parse_opcode(datagram: &[u8]) -> Result<(u16, &[u8]), ProtocolError> {
    if datagram.len() < REQUEST_HEADER_LEN + OPCODE_LEN {
        return Err(ProtocolError::TooShort {
            expected: REQUEST_HEADER_LEN + OPCODE_LEN,
            actual: datagram.len(),
        });
    }
    let opcode = LittleEndian::read_u16(&datagram[REQUEST_HEADER_LEN..REQUEST_HEADER_LEN + 2]);
    Ok((opcode, &datagram[REQUEST_HEADER_LEN + OPCODE_LEN..]))
}

/// Builds the 22-byte response header per §4.8.2.
///
/// `total_length` is the length of the entire outgoing frame (header +
/// opcode + body). `local_ip`/`target_ip` are host-byte-order u32 forms of
/// the sending/multicast-target IPv4 addresses.
pub fn build_response_header(total_length: u16, local_ip: u32, target_ip: u32) -> [u8; RESPONSE_HEADER_LEN] {
    let mut h = [0u8; RESPONSE_HEADER_LEN];
    LittleEndian::write_u16(&mut h[0..2], total_length);
    // bytes 2..4 are reserved, left zero.
    LittleEndian::write_u32(&mut h[4..8], local_ip);
    LittleEndian::write_u32(&mut h[8..12], target_ip);
    LittleEndian::write_u32(&mut h[12..16], millis_since_local_midnight());
    h[16] = 0x01;
    h[17] = 0xB2;
    LittleEndian::write_u16(&mut h[18..20], total_length - 16);
    LittleEndian::write_u16(&mut h[20..22], 0xFFFF);
    h
}

fn millis_since_local_midnight() -> u32 {
    let now = chrono::Local::now();
    let midnight_secs = now.num_seconds_from_midnight();
    midnight_secs * 1000 + now.timestamp_subsec_millis()
}

/// Assembles a full response frame: header + opcode + body.
pub fn assemble_response(resp_opcode: u16, body: &[u8], local_ip: u32, target_ip: u32) -> Vec<u8> {
    let total_length = (RESPONSE_HEADER_LEN + OPCODE_LEN + body.len()) as u16;
    let header = build_response_header(total_length, local_ip, target_ip);
    let mut frame = Vec::with_capacity(total_length as usize);
    frame.extend_from_slice(&header);
    let mut opcode_bytes = [0u8; 2];
    LittleEndian::write_u16(&mut opcode_bytes, resp_opcode);
    frame.extend_from_slice(&opcode_bytes);
    frame.extend_from_slice(body);
    frame
}

/// Parses a dotted-quad IPv4 string into a host-byte-order u32 (big end
/// first octet in the high byte), matching the source's direct-memory
/// layout. Returns 0 on parse failure.
pub fn ip_to_u32(addr: &str) -> u32 {
    addr.parse::<std::net::Ipv4Addr>()
        .map(|ip| u32::from_be_bytes(ip.octets()))
        .unwrap_or(0)
}

const LABEL_PREFIX: &str = "工作模式";

pub fn work_mode_to_label(mode: u32) -> String {
    format!("{LABEL_PREFIX}{mode}")
}

/// Returns 0 for empty/unprefixed/unparseable labels — this collides with
/// "no task running" by design; see the dispatcher's TaskQuery handler.
pub fn label_to_work_mode(label: &str) -> u32 {
    if label.is_empty() || !label.starts_with(LABEL_PREFIX) {
        return 0;
    }
    label[LABEL_PREFIX.len()..].parse().unwrap_or(0)
}

// ---- Request bodies ----

#[derive(Debug, Clone, Copy)]
pub struct ResourceMonitorRequest {
    pub req_id: u32,
}

pub fn parse_resource_monitor(body: &[u8]) -> Result<ResourceMonitorRequest, ProtocolError> {
    require_len(body, 4)?;
    Ok(ResourceMonitorRequest {
        req_id: LittleEndian::read_u32(&body[0..4]),
    })
}

#[derive(Debug, Clone)]
pub struct ChassisResetRequest {
    pub req_id: u32,
    /// `reset_flags[chassis_idx * 12 + slot_idx] == 1` means "act".
    pub reset_flags: [u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS],
}

pub fn parse_chassis_reset(body: &[u8]) -> Result<ChassisResetRequest, ProtocolError> {
    require_len(body, 4 + CHASSIS_COUNT * SLOTS_PER_CHASSIS)?;
    let mut reset_flags = [0u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS];
    reset_flags.copy_from_slice(&body[4..4 + CHASSIS_COUNT * SLOTS_PER_CHASSIS]);
    Ok(ChassisResetRequest {
        req_id: LittleEndian::read_u32(&body[0..4]),
        reset_flags,
    })
}

#[derive(Debug, Clone)]
pub struct ChassisSelfCheckRequest {
    pub req_id: u32,
    pub chassis_number: u16,
    pub check_flags: [u8; SLOTS_PER_CHASSIS],
}

pub fn parse_chassis_self_check(body: &[u8]) -> Result<ChassisSelfCheckRequest, ProtocolError> {
    require_len(body, 4 + 2 + SLOTS_PER_CHASSIS)?;
    let mut check_flags = [0u8; SLOTS_PER_CHASSIS];
    check_flags.copy_from_slice(&body[6..6 + SLOTS_PER_CHASSIS]);
    Ok(ChassisSelfCheckRequest {
        req_id: LittleEndian::read_u32(&body[0..4]),
        chassis_number: LittleEndian::read_u16(&body[4..6]),
        check_flags,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct TaskStartRequest {
    pub req_id: u32,
    pub work_mode: u16,
    pub start_strategy: u16,
}

pub fn parse_task_start(body: &[u8]) -> Result<TaskStartRequest, ProtocolError> {
    require_len(body, 8)?;
    Ok(TaskStartRequest {
        req_id: LittleEndian::read_u32(&body[0..4]),
        work_mode: LittleEndian::read_u16(&body[4..6]),
        start_strategy: LittleEndian::read_u16(&body[6..8]),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct TaskStopRequest {
    pub req_id: u32,
}

pub fn parse_task_stop(body: &[u8]) -> Result<TaskStopRequest, ProtocolError> {
    require_len(body, 4)?;
    Ok(TaskStopRequest {
        req_id: LittleEndian::read_u32(&body[0..4]),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct TaskQueryRequest {
    pub req_id: u32,
    pub chassis_number: u16,
    pub board_number: u16,
    pub task_index: u16,
}

pub fn parse_task_query(body: &[u8]) -> Result<TaskQueryRequest, ProtocolError> {
    require_len(body, 10)?;
    Ok(TaskQueryRequest {
        req_id: LittleEndian::read_u32(&body[0..4]),
        chassis_number: LittleEndian::read_u16(&body[4..6]),
        board_number: LittleEndian::read_u16(&body[6..8]),
        task_index: LittleEndian::read_u16(&body[8..10]),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct BmcQueryRequest {
    pub req_id: u32,
}

pub fn parse_bmc_query(body: &[u8]) -> Result<BmcQueryRequest, ProtocolError> {
    require_len(body, 4)?;
    Ok(BmcQueryRequest {
        req_id: LittleEndian::read_u32(&body[0..4]),
    })
}

fn require_len(body: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if body.len() < expected {
        return Err(ProtocolError::TooShort {
            expected,
            actual: body.len(),
        });
    }
    Ok(())
}

// ---- Response body encoders ----

pub fn encode_resource_monitor_response(
    req_id: u32,
    board_status: &[u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS],
    task_status: &[u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS * TASKS_PER_BOARD],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + board_status.len() + task_status.len());
    body.extend_from_slice(&req_id.to_le_bytes());
    body.extend_from_slice(board_status);
    body.extend_from_slice(task_status);
    body
}

pub fn encode_chassis_reset_response(
    req_id: u32,
    reset_results: &[u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + reset_results.len());
    body.extend_from_slice(&req_id.to_le_bytes());
    body.extend_from_slice(reset_results);
    body
}

pub fn encode_chassis_self_check_response(
    req_id: u32,
    chassis_number: u16,
    check_results: &[u8; SLOTS_PER_CHASSIS],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + 2 + check_results.len());
    body.extend_from_slice(&req_id.to_le_bytes());
    body.extend_from_slice(&chassis_number.to_le_bytes());
    body.extend_from_slice(check_results);
    body
}

pub fn encode_task_start_response(req_id: u32, start_result: u16, description: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + 2 + 256);
    body.extend_from_slice(&req_id.to_le_bytes());
    body.extend_from_slice(&start_result.to_le_bytes());
    body.extend_from_slice(&encode_fixed_string(description, 256));
    body
}

pub fn encode_task_stop_response(req_id: u32, stop_result: u16, description: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + 2 + 256);
    body.extend_from_slice(&req_id.to_le_bytes());
    body.extend_from_slice(&stop_result.to_le_bytes());
    body.extend_from_slice(&encode_fixed_string(description, 256));
    body
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskQueryResult {
    pub task_status: u16,
    pub task_id: u32,
    pub work_mode: u16,
    pub board_ip: u32,
    pub cpu_usage: u32,
    pub memory_usage: f32,
}

pub fn encode_task_query_response(req_id: u32, result: TaskQueryResult) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + 2 + 4 + 2 + 4 + 4 + 4);
    body.extend_from_slice(&req_id.to_le_bytes());
    body.extend_from_slice(&result.task_status.to_le_bytes());
    body.extend_from_slice(&result.task_id.to_le_bytes());
    body.extend_from_slice(&result.work_mode.to_le_bytes());
    body.extend_from_slice(&result.board_ip.to_le_bytes());
    body.extend_from_slice(&result.cpu_usage.to_le_bytes());
    body.extend_from_slice(&result.memory_usage.to_le_bytes());
    body
}

pub fn encode_bmc_query_response(
    req_id: u32,
    temperature: &[f32; CHASSIS_COUNT * SLOTS_PER_CHASSIS],
    voltage: &[f32; CHASSIS_COUNT * SLOTS_PER_CHASSIS],
    current: &[f32; CHASSIS_COUNT * SLOTS_PER_CHASSIS],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + (temperature.len() + voltage.len() + current.len()) * 4);
    body.extend_from_slice(&req_id.to_le_bytes());
    for v in temperature {
        body.extend_from_slice(&v.to_le_bytes());
    }
    for v in voltage {
        body.extend_from_slice(&v.to_le_bytes());
    }
    for v in current {
        body.extend_from_slice(&v.to_le_bytes());
    }
    body
}

pub fn encode_fault_report_body(problem_code: u16, description: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + 256);
    body.extend_from_slice(&problem_code.to_le_bytes());
    body.extend_from_slice(&encode_fixed_string(description, 256));
    body
}

/// Encodes a NUL-terminated, NUL-padded fixed-width string field,
/// truncating (with a warning at the call site) if too long.
fn encode_fixed_string(s: &str, width: usize) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    if bytes.len() >= width {
        bytes.truncate(width - 1);
    }
    bytes.resize(width, 0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_mode_label_round_trip() {
        for n in [0u32, 1, 3, 42] {
            assert_eq!(label_to_work_mode(&work_mode_to_label(n)), n);
        }
    }

    #[test]
    fn label_to_work_mode_handles_empty_and_garbage() {
        assert_eq!(label_to_work_mode(""), 0);
        assert_eq!(label_to_work_mode("garbage"), 0);
    }

    #[test]
    fn response_header_fields_match_spec() {
        let header = build_response_header(100, 0x0A000001, 0x0A000002);
        assert_eq!(LittleEndian::read_u16(&header[0..2]), 100);
        assert_eq!(header[16], 0x01);
        assert_eq!(header[17], 0xB2);
        assert_eq!(LittleEndian::read_u16(&header[18..20]), 100 - 16);
        assert_eq!(LittleEndian::read_u16(&header[20..22]), 0xFFFF);
    }

    #[test]
    fn parse_opcode_reads_little_endian_opcode_at_offset_22() {
        let mut datagram = vec![0u8; 24];
        LittleEndian::write_u16(&mut datagram[22..24], 0xF000);
        let (opcode, body) = parse_opcode(&datagram).unwrap();
        assert_eq!(opcode, 0xF000);
        assert!(body.is_empty());
    }

    #[test]
    fn parse_opcode_rejects_too_short_datagram() {
        assert!(parse_opcode(&[0u8; 10]).is_err());
    }

    #[test]
    fn ip_to_u32_parses_dotted_quad() {
        assert_eq!(ip_to_u32("10.0.0.1"), 0x0A000001);
        assert_eq!(ip_to_u32("not-an-ip"), 0);
    }

    #[test]
    fn chassis_reset_body_round_trips() {
        let mut body = vec![0u8; 4 + CHASSIS_COUNT * SLOTS_PER_CHASSIS];
        LittleEndian::write_u32(&mut body[0..4], 7);
        body[4] = 1;
        let parsed = parse_chassis_reset(&body).unwrap();
        assert_eq!(parsed.req_id, 7);
        assert_eq!(parsed.reset_flags[0], 1);
        assert_eq!(parsed.reset_flags[1], 0);
    }
}
