//! Wire DTOs for the upstream platform API (§6.1). These mirror the JSON
//! shapes exactly; conversion into domain types happens in `stack_info_to_domain`
//! and in the collector's board-tick.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FanSpeedDto {
    #[serde(default)]
    pub fan_name: String,
    #[serde(default)]
    pub speed: f32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfoDto {
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(default)]
    pub task_status: i32,
    #[serde(default)]
    pub service_name: String,
    #[serde(default, rename = "serviceUUID")]
    pub service_uuid: String,
    #[serde(default)]
    pub stack_name: String,
    #[serde(default, rename = "stackUUID")]
    pub stack_uuid: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    #[serde(default)]
    pub chassis_name: String,
    pub chassis_number: u32,
    #[serde(default)]
    pub board_name: String,
    pub board_number: u32,
    #[serde(default)]
    pub board_type: i32,
    #[serde(default)]
    pub board_address: String,
    #[serde(default)]
    pub board_status: i32,
    #[serde(default, rename = "voltage12v")]
    pub voltage12v: f32,
    #[serde(default, rename = "voltage3_3v")]
    pub voltage3_3v: f32,
    #[serde(default, rename = "current12a")]
    pub current12a: f32,
    #[serde(default, rename = "current3_3a")]
    pub current3_3a: f32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub fan_speeds: Vec<FanSpeedDto>,
    #[serde(default)]
    pub task_infos: Vec<TaskInfoDto>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelInfo {
    pub stack_label_name: String,
    #[serde(default, rename = "stackLabelUUID")]
    pub stack_label_uuid: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTaskInfo {
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(default)]
    pub task_status: i32,
    #[serde(default)]
    pub cpu_cores: f32,
    #[serde(default)]
    pub cpu_used: f32,
    #[serde(default)]
    pub cpu_usage: f32,
    #[serde(default)]
    pub memory_size: f32,
    #[serde(default)]
    pub memory_used: f32,
    #[serde(default)]
    pub memory_usage: f32,
    #[serde(default)]
    pub net_receive: f32,
    #[serde(default)]
    pub net_sent: f32,
    #[serde(default)]
    pub gpu_mem_used: f32,
    #[serde(default)]
    pub board_address: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub service_name: String,
    #[serde(rename = "serviceUUID")]
    pub service_uuid: String,
    #[serde(default)]
    pub service_status: i32,
    #[serde(default)]
    pub service_type: i32,
    #[serde(default)]
    pub task_infos: Vec<ServiceTaskInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackInfo {
    pub stack_name: String,
    #[serde(rename = "stackUUID")]
    pub stack_uuid: String,
    #[serde(default)]
    pub stack_label_infos: Vec<LabelInfo>,
    #[serde(default)]
    pub stack_deploy_status: i32,
    #[serde(default)]
    pub stack_running_status: i32,
    #[serde(default)]
    pub service_infos: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOperationInfo {
    #[serde(default)]
    pub stack_name: String,
    #[serde(default, rename = "stackUUID")]
    pub stack_uuid: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponseData {
    #[serde(default)]
    pub success_stack_infos: Vec<StackOperationInfo>,
    #[serde(default)]
    pub failure_stack_infos: Vec<StackOperationInfo>,
}

/// Already-unwrapped deploy/undeploy result handed to callers.
#[derive(Debug, Clone, Default)]
pub struct DeployResult {
    pub success: Vec<StackOperationInfo>,
    pub failure: Vec<StackOperationInfo>,
}

impl DeployResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_empty() && !self.success.is_empty()
    }
}
