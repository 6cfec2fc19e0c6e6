use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_cores: f32,
    pub cpu_used: f32,
    /// Fraction 0..1.
    pub cpu_usage: f32,
    pub memory_size: f32,
    pub memory_used: f32,
    /// Fraction 0..1.
    pub memory_usage: f32,
    pub net_receive: f32,
    pub net_sent: f32,
    pub gpu_mem_used: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    /// 1=Running, 2=Finished, 3=Abnormal, 0=Other
    pub task_status: i32,
    pub board_address: String,
    pub resources: ResourceUsage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    pub uuid: String,
    pub name: String,
    pub status: i32,
    /// 0=normal, 1=shared-ref, 2=public-own
    pub service_type: i32,
    pub tasks: HashMap<String, Task>,
}

/// A deployable bundle of services, wholesale-replaced on each successful
/// collector stack-tick (see [`crate::repository::StackRepository`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    pub uuid: Uuid,
    pub name: String,
    /// 0=undeployed, 1=deployed
    pub deploy_status: i32,
    /// 0=idle, 1=normal, 2=abnormal, 3=starting
    pub running_status: i32,
    pub labels: Vec<String>,
    pub services: HashMap<String, Service>,
}

impl Stack {
    /// Linear scan over this stack's services for `task_id`.
    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.services.values().find_map(|s| s.tasks.get(task_id))
    }
}
