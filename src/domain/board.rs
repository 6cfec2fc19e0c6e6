use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Board type, ordinals fixed by the upstream platform API and by
/// `chassis_config.json` — do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum BoardType {
    Computing = 0,
    Switch = 1,
    Power = 2,
    CpuGeneralA = 3,
    CpuGeneralB = 4,
    GpuHpcI = 5,
    GpuHpcII = 6,
    Storage = 7,
    Cache = 8,
    Srio = 9,
    EthernetSwitch = 10,
}

impl BoardType {
    pub fn from_ordinal(v: i32) -> Self {
        match v {
            0 => Self::Computing,
            1 => Self::Switch,
            2 => Self::Power,
            3 => Self::CpuGeneralA,
            4 => Self::CpuGeneralB,
            5 => Self::GpuHpcI,
            6 => Self::GpuHpcII,
            7 => Self::Storage,
            8 => Self::Cache,
            9 => Self::Srio,
            _ => Self::Computing,
        }
    }
}

impl Default for BoardType {
    fn default() -> Self {
        Self::Computing
    }
}

/// Board lifecycle status. `Offline` is reserved for BMC-reported
/// not-present; `Abnormal` covers both API-reported faults and
/// timeout-demotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoardOperationalStatus {
    #[default]
    Unknown,
    Normal,
    Abnormal,
    Offline,
}

impl BoardOperationalStatus {
    /// Maps the platform API's `statusCode`: 0->Normal, 1->Abnormal,
    /// 2->Offline, anything else defaults to Abnormal.
    pub fn from_api_code(code: i32) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::Abnormal,
            2 => Self::Offline,
            _ => Self::Abnormal,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FanSpeed {
    pub fan_name: String,
    pub speed: f32,
}

/// Denormalized view of a workload occupying this board slot, refreshed by
/// the board-info collector tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRef {
    pub task_id: String,
    /// 1=Running, 2=Finished, 3=Abnormal, 0=Other
    pub task_status: i32,
    pub service_name: String,
    pub service_uuid: String,
    pub stack_name: String,
    pub stack_uuid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Board {
    pub slot: u32,
    pub address: String,
    pub name: String,
    pub board_type: BoardType,
    pub status: BoardOperationalStatus,
    pub voltage_12v: f32,
    pub voltage_3_3v: f32,
    pub current_12a: f32,
    pub current_3_3a: f32,
    pub temperature: f32,
    pub fan_speeds: Vec<FanSpeed>,
    pub tasks: Vec<TaskRef>,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl Board {
    pub fn new(slot: u32, address: String, board_type: BoardType) -> Self {
        Self {
            slot,
            address,
            board_type,
            status: BoardOperationalStatus::Unknown,
            ..Default::default()
        }
    }

    /// Overwrites identity, telemetry and task list from a platform-API
    /// board-info entry and stamps `last_update_time = now`. `slot` is never
    /// touched here — it is the board's identity within its chassis.
    #[allow(clippy::too_many_arguments)]
    pub fn update_from_api_data(
        &mut self,
        name: String,
        address: String,
        board_type: BoardType,
        status_code: i32,
        voltage_12v: f32,
        voltage_3_3v: f32,
        current_12a: f32,
        current_3_3a: f32,
        temperature: f32,
        fan_speeds: Vec<FanSpeed>,
        tasks: Vec<TaskRef>,
    ) {
        self.name = name;
        self.address = address;
        self.board_type = board_type;
        self.status = BoardOperationalStatus::from_api_code(status_code);
        self.voltage_12v = voltage_12v;
        self.voltage_3_3v = voltage_3_3v;
        self.current_12a = current_12a;
        self.current_3_3a = current_3_3a;
        self.temperature = temperature;
        self.fan_speeds = fan_speeds;
        self.tasks = tasks;
        self.last_update_time = Some(Utc::now());
    }

    /// Applies a BMC presence reading. `present == false` forces `Offline`;
    /// `present == true` leaves the existing status untouched (the BMC
    /// channel carries presence only, not health).
    pub fn apply_presence(&mut self, present: bool) {
        if !present {
            self.status = BoardOperationalStatus::Offline;
        }
    }

    /// True if this board should be demoted to `Abnormal` on this tick:
    /// currently `Normal`, has a timestamp, and that timestamp is older
    /// than `timeout`. Slot exemption (6, 7) is the caller's concern.
    pub fn is_timeout_due(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        self.status == BoardOperationalStatus::Normal
            && self
                .last_update_time
                .is_some_and(|t| now - t > timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_code_maps_to_status() {
        assert_eq!(
            BoardOperationalStatus::from_api_code(0),
            BoardOperationalStatus::Normal
        );
        assert_eq!(
            BoardOperationalStatus::from_api_code(1),
            BoardOperationalStatus::Abnormal
        );
        assert_eq!(
            BoardOperationalStatus::from_api_code(2),
            BoardOperationalStatus::Offline
        );
        assert_eq!(
            BoardOperationalStatus::from_api_code(99),
            BoardOperationalStatus::Abnormal
        );
    }

    #[test]
    fn presence_false_forces_offline_true_leaves_status() {
        let mut b = Board::new(1, "10.0.0.1".into(), BoardType::Computing);
        b.status = BoardOperationalStatus::Normal;
        b.apply_presence(true);
        assert_eq!(b.status, BoardOperationalStatus::Normal);
        b.apply_presence(false);
        assert_eq!(b.status, BoardOperationalStatus::Offline);
    }

    #[test]
    fn timeout_due_only_when_normal_and_stale() {
        let mut b = Board::new(1, "10.0.0.1".into(), BoardType::Computing);
        let now = Utc::now();
        assert!(!b.is_timeout_due(now, chrono::Duration::seconds(60)));

        b.status = BoardOperationalStatus::Normal;
        b.last_update_time = Some(now - chrono::Duration::seconds(120));
        assert!(b.is_timeout_due(now, chrono::Duration::seconds(60)));

        b.status = BoardOperationalStatus::Abnormal;
        assert!(!b.is_timeout_due(now, chrono::Duration::seconds(60)));
    }
}
