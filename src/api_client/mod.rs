//! HTTP client for the upstream platform API (§4.2, §6.1).
//!
//! Every method degrades on failure instead of propagating: parsing errors
//! and non-2xx responses are logged and turned into an empty/false result,
//! per the `UpstreamFailure` entry in the error taxonomy.

mod types;

use std::time::Duration;

use reqwest::Client;
use tracing::warn;

pub use types::*;

use crate::config::ApiConfig;
use crate::domain::{Stack};
use crate::error::ApiError;

/// `{ code, message, data }` — `code == 0` is success.
#[derive(Debug, serde::Deserialize)]
struct Envelope<T> {
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default = "Option::default")]
    data: Option<T>,
}

pub struct PlatformApiClient {
    client: Client,
    config: ApiConfig,
}

impl PlatformApiClient {
    pub fn new(config: ApiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builder never fails with only a timeout set");
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.config.base_url, self.config.port, path)
    }

    async fn get_envelope<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Envelope<T>, ApiError> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: url.clone(),
                source,
            })?;
        resp.json::<Envelope<T>>()
            .await
            .map_err(|source| ApiError::Decode {
                endpoint: url,
                source,
            })
    }

    async fn post_envelope<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ApiError> {
        let url = self.url(path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: url.clone(),
                source,
            })?;
        resp.json::<Envelope<T>>()
            .await
            .map_err(|source| ApiError::Decode {
                endpoint: url,
                source,
            })
    }

    /// `GET` board info. Parsing/transport errors degrade to an empty Vec
    /// (logged); the collector treats "empty" the same whether it's a
    /// genuinely empty fleet or a degraded failure — board entries are
    /// skipped either way.
    pub async fn get_board_info(&self) -> Vec<BoardInfo> {
        match self
            .get_envelope::<Vec<BoardInfo>>(&self.config.endpoints.board_info)
            .await
        {
            Ok(env) if env.code == 0 => env.data.unwrap_or_default(),
            Ok(env) => {
                warn!(code = env.code, message = %env.message, "board info upstream returned non-zero code");
                Vec::new()
            }
            Err(err) => {
                warn!(%err, "board info request failed");
                Vec::new()
            }
        }
    }

    /// `POST` stack info with an empty body. The bool distinguishes
    /// "HTTP OK with empty list" (true, empty Vec) from "HTTP/parse failed"
    /// (false) — callers must not conflate the two (§3.3).
    pub async fn get_stack_info(&self) -> (Vec<StackInfo>, bool) {
        match self
            .post_envelope::<serde_json::Value, Vec<StackInfo>>(
                &self.config.endpoints.stack_info,
                &serde_json::json!({}),
            )
            .await
        {
            Ok(env) if env.code == 0 => (env.data.unwrap_or_default(), true),
            Ok(env) => {
                warn!(code = env.code, message = %env.message, "stack info upstream returned non-zero code");
                (Vec::new(), true)
            }
            Err(err) => {
                warn!(%err, "stack info request failed");
                (Vec::new(), false)
            }
        }
    }

    pub async fn deploy_stacks(
        &self,
        labels: &[String],
        account: &str,
        password: &str,
        stop: bool,
    ) -> DeployResult {
        let body = serde_json::json!({
            "stackLabels": labels,
            "account": account,
            "password": password,
            "stop": if stop { 1 } else { 0 },
        });
        self.run_deploy_like(&self.config.endpoints.deploy, &body)
            .await
    }

    pub async fn undeploy_stacks(&self, labels: &[String]) -> DeployResult {
        let body = serde_json::json!({ "stackLabels": labels });
        self.run_deploy_like(&self.config.endpoints.undeploy, &body)
            .await
    }

    async fn run_deploy_like(&self, path: &str, body: &serde_json::Value) -> DeployResult {
        match self
            .post_envelope::<serde_json::Value, Vec<DeployResponseData>>(path, body)
            .await
        {
            Ok(env) if env.code == 0 => env
                .data
                .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) })
                .map(|d| DeployResult {
                    success: d.success_stack_infos,
                    failure: d.failure_stack_infos,
                })
                .unwrap_or_default(),
            Ok(env) => {
                warn!(code = env.code, message = %env.message, "deploy/undeploy upstream returned non-zero code");
                DeployResult::default()
            }
            Err(err) => {
                warn!(%err, "deploy/undeploy request failed");
                DeployResult::default()
            }
        }
    }

    pub async fn send_heartbeat(&self, client_ip: &str) -> bool {
        let path = format!(
            "{}?clientIp={}",
            self.config.endpoints.heartbeat, client_ip
        );
        match self.get_envelope::<serde_json::Value>(&path).await {
            Ok(env) => env.code == 0,
            Err(err) => {
                warn!(%err, "heartbeat request failed");
                false
            }
        }
    }

    pub async fn reset_stacks(&self) -> bool {
        match self
            .get_envelope::<serde_json::Value>(&self.config.endpoints.reset)
            .await
        {
            Ok(env) => env.code == 0,
            Err(err) => {
                warn!(%err, "reset request failed");
                false
            }
        }
    }
}

/// Transforms a `StackInfo` DTO into the domain `Stack` the repository
/// stores, for the collector's wholesale replace.
pub fn stack_info_to_domain(info: StackInfo) -> Option<Stack> {
    let uuid = uuid::Uuid::parse_str(&info.stack_uuid).ok()?;
    let labels = info
        .stack_label_infos
        .into_iter()
        .map(|l| l.stack_label_name)
        .collect();
    let services = info
        .service_infos
        .into_iter()
        .map(|s| {
            let tasks = s
                .task_infos
                .into_iter()
                .map(|t| {
                    (
                        t.task_id.clone(),
                        crate::domain::Task {
                            task_id: t.task_id,
                            task_status: t.task_status,
                            board_address: t.board_address,
                            resources: crate::domain::ResourceUsage {
                                cpu_cores: t.cpu_cores,
                                cpu_used: t.cpu_used,
                                cpu_usage: t.cpu_usage,
                                memory_size: t.memory_size,
                                memory_used: t.memory_used,
                                memory_usage: t.memory_usage,
                                net_receive: t.net_receive,
                                net_sent: t.net_sent,
                                gpu_mem_used: t.gpu_mem_used,
                            },
                        },
                    )
                })
                .collect();
            (
                s.service_uuid.clone(),
                crate::domain::Service {
                    uuid: s.service_uuid,
                    name: s.service_name,
                    status: s.service_status,
                    service_type: s.service_type,
                    tasks,
                },
            )
        })
        .collect();
    Some(Stack {
        uuid,
        name: info.stack_name,
        deploy_status: info.stack_deploy_status,
        running_status: info.stack_running_status,
        labels,
        services,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_info_with_bad_uuid_is_dropped() {
        let info = StackInfo {
            stack_name: "x".into(),
            stack_uuid: "not-a-uuid".into(),
            stack_label_infos: vec![],
            stack_deploy_status: 0,
            stack_running_status: 0,
            service_infos: vec![],
        };
        assert!(stack_info_to_domain(info).is_none());
    }

    #[test]
    fn stack_info_converts_labels_and_tasks() {
        let uuid = uuid::Uuid::new_v4();
        let info = StackInfo {
            stack_name: "demo".into(),
            stack_uuid: uuid.to_string(),
            stack_label_infos: vec![LabelInfo {
                stack_label_name: "工作模式1".into(),
                stack_label_uuid: "l1".into(),
            }],
            stack_deploy_status: 1,
            stack_running_status: 1,
            service_infos: vec![ServiceInfo {
                service_name: "svc".into(),
                service_uuid: "s1".into(),
                service_status: 2,
                service_type: 0,
                task_infos: vec![ServiceTaskInfo {
                    task_id: "t1".into(),
                    task_status: 1,
                    cpu_usage: 0.5,
                    ..Default::default()
                }],
            }],
        };
        let stack = stack_info_to_domain(info).unwrap();
        assert_eq!(stack.uuid, uuid);
        assert_eq!(stack.labels, vec!["工作模式1".to_string()]);
        let svc = stack.services.get("s1").unwrap();
        assert_eq!(svc.tasks.get("t1").unwrap().resources.cpu_usage, 0.5);
    }
}
