//! JSON configuration (§6.7). Every leaf has a default matching the spec's
//! defaults table, so a missing file or missing key degrades to a working
//! configuration rather than failing (`ConfigError` is only ever logged).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiEndpoints {
    pub board_info: String,
    pub stack_info: String,
    pub deploy: String,
    pub undeploy: String,
    pub heartbeat: String,
    pub reset: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            board_info: "/api/v1/external/qyw/boardinfo".into(),
            stack_info: "/api/v1/external/qyw/stackinfo".into(),
            deploy: "/api/v1/stacks/labels/deploy".into(),
            undeploy: "/api/v1/stacks/labels/undeploy".into(),
            heartbeat: "/api/v1/sys-config/client/up".into(),
            reset: "/api/v1/stacks/labels/reset".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub port: u16,
    pub account: String,
    pub password: String,
    pub endpoints: ApiEndpoints,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "localhost".into(),
            port: 8080,
            account: "admin".into(),
            password: "12q12w12ee".into(),
            endpoints: ApiEndpoints::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpCommandCodes {
    pub resource_monitor: u16,
    pub resource_monitor_resp: u16,
    pub chassis_reset: u16,
    pub chassis_reset_resp: u16,
    pub chassis_self_check: u16,
    pub chassis_self_check_resp: u16,
    pub task_start: u16,
    pub task_start_resp: u16,
    pub task_stop: u16,
    pub task_stop_resp: u16,
    pub task_query: u16,
    pub task_query_resp: u16,
    pub bmc_query: u16,
    pub bmc_query_resp: u16,
    pub fault_report: u16,
}

impl Default for UdpCommandCodes {
    fn default() -> Self {
        Self {
            resource_monitor: 0xF000,
            resource_monitor_resp: 0xF100,
            chassis_reset: 0xF001,
            chassis_reset_resp: 0xF101,
            chassis_self_check: 0xF002,
            chassis_self_check_resp: 0xF102,
            task_start: 0xF003,
            task_start_resp: 0xF103,
            task_stop: 0xF004,
            task_stop_resp: 0xF104,
            task_query: 0xF005,
            task_query_resp: 0xF105,
            bmc_query: 0xF006,
            bmc_query_resp: 0xF106,
            fault_report: 0xF107,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpConfig {
    pub listener_multicast_group: String,
    pub broadcaster_multicast_group: String,
    pub port: u16,
    pub commands: UdpCommandCodes,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            listener_multicast_group: "234.186.1.98".into(),
            broadcaster_multicast_group: "234.186.1.99".into(),
            port: 0x100A,
            commands: UdpCommandCodes::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BmcConfig {
    pub multicast_group: String,
    pub port: u16,
}

impl Default for BmcConfig {
    fn default() -> Self {
        Self {
            multicast_group: "224.100.200.15".into(),
            port: 5715,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for AlertServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8888,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub interval_seconds: u64,
    pub board_timeout_seconds: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            board_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub client_ip: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            client_ip: "192.168.6.222".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HaConfig {
    pub multicast_group: String,
    pub port: u16,
    pub priority: i32,
    pub heartbeat_interval_seconds: u64,
    pub timeout_threshold_seconds: u64,
}

impl Default for HaConfig {
    fn default() -> Self {
        Self {
            multicast_group: "234.186.1.100".into(),
            port: 0x100B,
            priority: 0,
            heartbeat_interval_seconds: 3,
            timeout_threshold_seconds: 9,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChassisControllerConfig {
    pub port: u16,
    pub timeout_seconds: u64,
}

impl Default for ChassisControllerConfig {
    fn default() -> Self {
        Self {
            port: 33000,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_to_file: bool,
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            log_to_file: false,
            file_path: "control-plane.log".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BoardConfig {
    pub board_number: u32,
    pub board_address: String,
    pub board_type: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub chassis_number: u32,
    pub chassis_name: String,
    pub boards: Vec<BoardConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub chassis: Vec<ChassisConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub udp: UdpConfig,
    pub bmc: BmcConfig,
    pub alert_server: AlertServerConfig,
    pub collector: CollectorConfig,
    pub heartbeat: HeartbeatConfig,
    pub ha: HaConfig,
    pub chassis_controller: ChassisControllerConfig,
    pub logging: LoggingConfig,
    pub topology: TopologyConfig,
}

impl Config {
    /// Loads from `path` if given and readable; any failure (missing file,
    /// bad JSON) degrades to an all-defaults config with a warn log, per
    /// the `ConfigFailure` entry in the error taxonomy — this never returns
    /// `Err` to the caller.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(source) => {
                    let err = ConfigError::Parse {
                        path: path.display().to_string(),
                        source,
                    };
                    tracing::warn!(%err, "falling back to default config");
                    Self::default()
                }
            },
            Err(source) => {
                let err = ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                };
                tracing::warn!(%err, "falling back to default config");
                Self::default()
            }
        }
    }
}
