//! Per-opcode behavior (§4.8.3), implemented as methods on
//! [`super::CommandDispatcher`] plus the pure array-building helpers that
//! back them (kept free-standing so they're testable without a socket).

use tokio::net::UdpSocket;
use tracing::warn;

use crate::domain::{BoardOperationalStatus, BoardType, Chassis};

use super::protocol::{
    self, encode_bmc_query_response, encode_chassis_reset_response, encode_chassis_self_check_response,
    encode_resource_monitor_response, encode_task_query_response, encode_task_start_response,
    encode_task_stop_response, label_to_work_mode, work_mode_to_label, TaskQueryResult, CHASSIS_COUNT,
    SLOTS_PER_CHASSIS, TASKS_PER_BOARD,
};
use super::{CommandDispatcher, Opcode};

const MAX_DESCRIPTION_LEN: usize = 256;

fn truncate_description(desc: String) -> String {
    if desc.chars().count() > MAX_DESCRIPTION_LEN {
        warn!(len = desc.len(), "fault/result description truncated to 256 chars");
        desc.chars().take(MAX_DESCRIPTION_LEN).collect()
    } else {
        desc
    }
}

/// Builds the 108-entry (9 chassis x 12 monitored slots) board-status array.
pub fn build_board_status(chassis: &[Chassis]) -> [u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS] {
    let mut out = [2u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS];
    for idx in 0..CHASSIS_COUNT {
        let chassis_number = (idx + 1) as u32;
        let Some(c) = chassis.iter().find(|c| c.number == chassis_number) else {
            continue;
        };
        for slot_idx in 0..SLOTS_PER_CHASSIS {
            let slot = (slot_idx + 1) as u32;
            let Some(board) = c.board_by_slot(slot) else {
                continue;
            };
            out[idx * SLOTS_PER_CHASSIS + slot_idx] = match board.status {
                BoardOperationalStatus::Normal => 0,
                BoardOperationalStatus::Abnormal => 1,
                BoardOperationalStatus::Offline | BoardOperationalStatus::Unknown => 2,
            };
        }
    }
    out
}

/// Builds the 864-entry (9 x 12 x 8) task-status array.
pub fn build_task_status(
    chassis: &[Chassis],
) -> [u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS * TASKS_PER_BOARD] {
    let mut out = [2u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS * TASKS_PER_BOARD];
    for idx in 0..CHASSIS_COUNT {
        let chassis_number = (idx + 1) as u32;
        let Some(c) = chassis.iter().find(|c| c.number == chassis_number) else {
            continue;
        };
        for slot_idx in 0..SLOTS_PER_CHASSIS {
            let slot = (slot_idx + 1) as u32;
            let Some(board) = c.board_by_slot(slot) else {
                continue;
            };
            for task_idx in 0..TASKS_PER_BOARD {
                let base = (idx * SLOTS_PER_CHASSIS + slot_idx) * TASKS_PER_BOARD + task_idx;
                out[base] = match board.tasks.get(task_idx) {
                    Some(task) if task.task_status == 1 => 0,
                    Some(_) => 1,
                    None => 2,
                };
            }
        }
    }
    out
}

/// The chassis switch IP: address of the first `EthernetSwitch` board, or
/// the deterministic fallback `192.168.(chassisNumber*2).180`.
pub fn resolve_chassis_switch_ip(chassis: Option<&Chassis>, chassis_number: u32) -> String {
    if let Some(c) = chassis {
        if let Some(board) = c.boards().iter().find(|b| b.board_type == BoardType::EthernetSwitch) {
            if !board.address.is_empty() {
                return board.address.clone();
            }
        }
    }
    format!("192.168.{}.180", chassis_number * 2)
}

fn simple_hash_u32(s: &str) -> u32 {
    let mut h: u32 = 2166136261;
    for b in s.bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(16777619);
    }
    h
}

fn task_id_to_numeric(task_id: &str) -> u32 {
    task_id.parse::<u32>().unwrap_or_else(|_| simple_hash_u32(task_id))
}

impl CommandDispatcher {
    pub(super) async fn handle_resource_monitor(&self, send_socket: &UdpSocket, body: &[u8]) {
        let req = match protocol::parse_resource_monitor(body) {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "malformed ResourceMonitor request");
                return;
            }
        };
        let chassis = self.chassis_repo.get_all();
        let board_status = build_board_status(&chassis);
        let task_status = build_task_status(&chassis);
        let response = encode_resource_monitor_response(req.req_id, &board_status, &task_status);
        self.send_response(send_socket, Opcode::ResourceMonitor, &response).await;
    }

    pub(super) async fn handle_chassis_reset(&self, send_socket: &UdpSocket, body: &[u8]) {
        let req = match protocol::parse_chassis_reset(body) {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "malformed ChassisReset request");
                return;
            }
        };
        let mut results = [1u8; CHASSIS_COUNT * SLOTS_PER_CHASSIS];
        for idx in 0..CHASSIS_COUNT {
            let chassis_number = (idx + 1) as u32;
            let base = idx * SLOTS_PER_CHASSIS;
            let mut slots = [false; SLOTS_PER_CHASSIS];
            let mut any_requested = false;
            for slot_idx in 0..SLOTS_PER_CHASSIS {
                if req.reset_flags[base + slot_idx] == 1 {
                    slots[slot_idx] = true;
                    any_requested = true;
                }
            }
            if !any_requested {
                continue;
            }
            let chassis = self.chassis_repo.find_by_number(chassis_number);
            let ip = resolve_chassis_switch_ip(chassis.as_ref(), chassis_number);
            match self.chassis_controller.reset_board(&ip, &slots, req.req_id).await {
                crate::chassis_controller::ChassisResult::Success => {
                    for slot_idx in 0..SLOTS_PER_CHASSIS {
                        if slots[slot_idx] {
                            results[base + slot_idx] = 0;
                        }
                    }
                }
                crate::chassis_controller::ChassisResult::PartialSuccess { slot_failed } => {
                    for slot_idx in 0..SLOTS_PER_CHASSIS {
                        if slots[slot_idx] {
                            results[base + slot_idx] = if slot_failed[slot_idx] { 1 } else { 0 };
                        }
                    }
                }
                _ => {
                    // NetworkError / TimeoutError / InvalidResponse: every requested slot fails.
                }
            }
        }
        let response = encode_chassis_reset_response(req.req_id, &results);
        self.send_response(send_socket, Opcode::ChassisReset, &response).await;
    }

    pub(super) async fn handle_chassis_self_check(&self, send_socket: &UdpSocket, body: &[u8]) {
        let req = match protocol::parse_chassis_self_check(body) {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "malformed ChassisSelfCheck request");
                return;
            }
        };
        let chassis = self.chassis_repo.find_by_number(req.chassis_number as u32);
        let mut results = [1u8; SLOTS_PER_CHASSIS];
        for slot_idx in 0..SLOTS_PER_CHASSIS {
            if req.check_flags[slot_idx] != 0 {
                continue;
            }
            let slot = (slot_idx + 1) as u32;
            let address = chassis.as_ref().and_then(|c| c.board_by_slot(slot)).map(|b| b.address.clone());
            match address {
                Some(addr) if !addr.is_empty() => {
                    let ok = self.chassis_controller.selfcheck_board(&addr).await;
                    results[slot_idx] = if ok { 0 } else { 1 };
                }
                _ => {}
            }
        }
        let response = encode_chassis_self_check_response(req.req_id, req.chassis_number, &results);
        self.send_response(send_socket, Opcode::ChassisSelfCheck, &response).await;
    }

    pub(super) async fn handle_task_start(&self, send_socket: &UdpSocket, body: &[u8]) {
        let req = match protocol::parse_task_start(body) {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "malformed TaskStart request");
                return;
            }
        };
        if req.start_strategy != 0 {
            // Strategy gate: drop silently, no response at all (§4.8.3).
            return;
        }
        let label = work_mode_to_label(req.work_mode as u32);
        let result = self
            .api
            .deploy_stacks(std::slice::from_ref(&label), &self.account, &self.password, true)
            .await;
        let (start_result, description) = if result.is_success() {
            *self.current_running_label.lock() = label;
            (0u16, "任务启动成功".to_string())
        } else {
            let messages: Vec<_> = result.failure.iter().map(|f| f.message.clone()).collect();
            (1u16, truncate_description(format!("任务启动失败: {}", messages.join("; "))))
        };
        let response = encode_task_start_response(req.req_id, start_result, &description);
        self.send_response(send_socket, Opcode::TaskStart, &response).await;
    }

    pub(super) async fn handle_task_stop(&self, send_socket: &UdpSocket, body: &[u8]) {
        let req = match protocol::parse_task_stop(body) {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "malformed TaskStop request");
                return;
            }
        };
        let current_label = self.current_running_label.lock().clone();
        let (stop_result, description) = if current_label.is_empty() {
            if self.api.reset_stacks().await {
                (0u16, "无运行中标签，已执行重置".to_string())
            } else {
                (1u16, "重置失败".to_string())
            }
        } else {
            let result = self.api.undeploy_stacks(std::slice::from_ref(&current_label)).await;
            if result.is_success() {
                *self.current_running_label.lock() = String::new();
                (0u16, "任务停止成功".to_string())
            } else {
                let messages: Vec<_> = result.failure.iter().map(|f| f.message.clone()).collect();
                (1u16, truncate_description(format!("任务停止失败: {}", messages.join("; "))))
            }
        };
        let response = encode_task_stop_response(req.req_id, stop_result, &description);
        self.send_response(send_socket, Opcode::TaskStop, &response).await;
    }

    pub(super) async fn handle_task_query(&self, send_socket: &UdpSocket, body: &[u8]) {
        let req = match protocol::parse_task_query(body) {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "malformed TaskQuery request");
                return;
            }
        };
        let result = self.resolve_task_query(req);
        let response = encode_task_query_response(req.req_id, result);
        self.send_response(send_socket, Opcode::TaskQuery, &response).await;
    }

    fn resolve_task_query(&self, req: protocol::TaskQueryRequest) -> TaskQueryResult {
        if req.task_index == 0 {
            return TaskQueryResult {
                task_status: 1,
                ..Default::default()
            };
        }
        let Some(chassis) = self.chassis_repo.find_by_number(req.chassis_number as u32) else {
            return TaskQueryResult { task_status: 1, ..Default::default() };
        };
        let Some(board) = chassis.board_by_slot(req.board_number as u32) else {
            return TaskQueryResult { task_status: 1, ..Default::default() };
        };
        let Some(task) = board.tasks.get((req.task_index - 1) as usize) else {
            return TaskQueryResult { task_status: 1, ..Default::default() };
        };
        let Some(resources) = self.stack_repo.get_task_resources(&task.task_id) else {
            return TaskQueryResult { task_status: 1, ..Default::default() };
        };

        let current_label = self.current_running_label.lock().clone();
        let cpu_usage = if resources.cpu_usage > 1.0 {
            1000u32
        } else {
            (resources.cpu_usage * 1000.0) as u32
        };
        TaskQueryResult {
            task_status: if task.task_status == 1 { 0 } else { 1 },
            task_id: task_id_to_numeric(&task.task_id),
            work_mode: label_to_work_mode(&current_label) as u16,
            board_ip: protocol::ip_to_u32(&board.address),
            cpu_usage,
            memory_usage: resources.memory_usage.min(1.0),
        }
    }

    pub(super) async fn handle_bmc_query(&self, send_socket: &UdpSocket, body: &[u8]) {
        let req = match protocol::parse_bmc_query(body) {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "malformed BmcQuery request");
                return;
            }
        };
        let chassis = self.chassis_repo.get_all();
        let mut temperature = [0f32; CHASSIS_COUNT * SLOTS_PER_CHASSIS];
        let mut voltage = [0f32; CHASSIS_COUNT * SLOTS_PER_CHASSIS];
        let mut current = [0f32; CHASSIS_COUNT * SLOTS_PER_CHASSIS];
        for idx in 0..CHASSIS_COUNT {
            let chassis_number = (idx + 1) as u32;
            let Some(c) = chassis.iter().find(|c| c.number == chassis_number) else {
                continue;
            };
            for slot_idx in 0..SLOTS_PER_CHASSIS {
                let slot = (slot_idx + 1) as u32;
                if let Some(board) = c.board_by_slot(slot) {
                    let i = idx * SLOTS_PER_CHASSIS + slot_idx;
                    temperature[i] = board.temperature;
                    voltage[i] = board.voltage_12v;
                    current[i] = board.current_12a;
                }
            }
        }
        let response = encode_bmc_query_response(req.req_id, &temperature, &voltage, &current);
        self.send_response(send_socket, Opcode::BmcQuery, &response).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Board, TaskRef};

    fn chassis_with_board(number: u32, slot: u32, status: BoardOperationalStatus) -> Chassis {
        let mut c = Chassis::new(number, format!("c{number}"));
        let mut b = Board::new(slot, format!("10.0.0.{slot}"), BoardType::Computing);
        b.status = status;
        c.update_board_by_slot(slot, b);
        c
    }

    #[test]
    fn board_status_maps_normal_abnormal_offline_and_missing() {
        let chassis = vec![chassis_with_board(1, 1, BoardOperationalStatus::Normal)];
        let status = build_board_status(&chassis);
        assert_eq!(status[0], 0);
        // chassis 2 missing entirely -> default 2 (Offline/missing).
        assert_eq!(status[SLOTS_PER_CHASSIS], 2);
    }

    #[test]
    fn task_status_marks_ok_bad_and_absent() {
        let mut c = chassis_with_board(1, 1, BoardOperationalStatus::Normal);
        let mut board = c.board_by_slot(1).unwrap().clone();
        board.tasks = vec![
            TaskRef { task_status: 1, ..Default::default() },
            TaskRef { task_status: 3, ..Default::default() },
        ];
        c.update_board_by_slot(1, board);
        let status = build_task_status(&[c]);
        assert_eq!(status[0], 0);
        assert_eq!(status[1], 1);
        assert_eq!(status[2], 2);
    }

    #[test]
    fn chassis_switch_ip_prefers_ethernet_switch_board() {
        let mut c = Chassis::new(1, "c1".into());
        c.update_board_by_slot(6, Board::new(6, "192.168.2.170".into(), BoardType::EthernetSwitch));
        assert_eq!(resolve_chassis_switch_ip(Some(&c), 1), "192.168.2.170");
    }

    #[test]
    fn chassis_switch_ip_falls_back_without_ethernet_switch() {
        let c = Chassis::new(1, "c1".into());
        assert_eq!(resolve_chassis_switch_ip(Some(&c), 1), "192.168.2.180");
        assert_eq!(resolve_chassis_switch_ip(None, 1), "192.168.2.180");
    }

    #[test]
    fn task_id_numeric_parses_or_hashes() {
        assert_eq!(task_id_to_numeric("42"), 42);
        assert_ne!(task_id_to_numeric("abc"), 0);
    }
}
