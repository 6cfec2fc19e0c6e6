//! HTTP alert ingestor (C5, §4.4). Two POST endpoints; both return a
//! `{code, message, data}` envelope and never let a malformed body become a
//! non-200 response.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::domain::BoardOperationalStatus;
use crate::fault_sink::FaultSink;
use crate::repository::ChassisRepository;

#[derive(Clone)]
pub struct AlertServerState {
    pub chassis_repo: Arc<ChassisRepository>,
    pub fault_sink: Arc<dyn FaultSink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardAlertRequest {
    #[serde(default)]
    chassis_name: String,
    chassis_number: u32,
    #[serde(default)]
    board_name: String,
    board_number: u32,
    #[serde(default)]
    board_type: i32,
    #[serde(default)]
    board_address: String,
    board_status: i32,
    #[serde(default)]
    alert_messages: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskAlertInfo {
    #[serde(default, rename = "taskID")]
    task_id: String,
    #[serde(default)]
    task_status: i32,
    #[serde(default)]
    chassis_number: u32,
    #[serde(default)]
    board_number: u32,
    #[serde(default)]
    board_address: String,
    #[serde(default)]
    board_status: i32,
    #[serde(default)]
    alert_messages: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceAlertRequest {
    #[serde(default)]
    stack_name: String,
    #[serde(default, rename = "stackUUID")]
    stack_uuid: String,
    #[serde(default)]
    service_name: String,
    #[serde(default, rename = "serviceUUID")]
    service_uuid: String,
    #[serde(default)]
    task_alert_infos: Vec<TaskAlertInfo>,
}

fn success_envelope() -> Value {
    json!({ "code": 0, "message": "success", "data": "success" })
}

fn invalid_json_envelope(err: &axum::extract::rejection::JsonRejection) -> Value {
    json!({ "code": -1, "message": format!("无效的JSON格式: {err}"), "data": "" })
}

async fn handle_board_alert(
    State(state): State<AlertServerState>,
    body: Result<Json<BoardAlertRequest>, axum::extract::rejection::JsonRejection>,
) -> Json<Value> {
    let Json(req) = match body {
        Ok(req) => req,
        Err(err) => return Json(invalid_json_envelope(&err)),
    };

    let located = state
        .chassis_repo
        .find_by_number(req.chassis_number)
        .and_then(|chassis| {
            chassis
                .board_by_address(&req.board_address)
                .cloned()
                .or_else(|| chassis.board_by_slot(req.board_number).cloned())
                .map(|b| (chassis.number, b))
        });

    match located {
        Some((chassis_number, mut board)) => {
            board.status = status_from_api(req.board_status);
            if let Err(err) = state
                .chassis_repo
                .update_board(chassis_number, board.slot, board)
            {
                error!(%err, "failed to persist board alert status");
            }
            let description = format!(
                "机箱{}({}) 板卡{}({}, type={}) 状态变更为{:?}，地址={}；{}",
                req.chassis_number,
                req.chassis_name,
                req.board_number,
                req.board_name,
                req.board_type,
                req.board_status,
                req.board_address,
                req.alert_messages.join("; ")
            );
            let sink = state.fault_sink.clone();
            tokio::spawn(async move {
                sink.report_fault(&description, 0).await;
            });
        }
        None => {
            info!(
                chassis_number = req.chassis_number,
                board_number = req.board_number,
                "board alert references unknown chassis/board"
            );
        }
    }
    Json(success_envelope())
}

fn status_from_api(code: i32) -> BoardOperationalStatus {
    BoardOperationalStatus::from_api_code(code)
}

async fn handle_service_alert(
    State(state): State<AlertServerState>,
    body: Result<Json<ServiceAlertRequest>, axum::extract::rejection::JsonRejection>,
) -> Json<Value> {
    let Json(req) = match body {
        Ok(req) => req,
        Err(err) => return Json(invalid_json_envelope(&err)),
    };

    let mut lines = vec![format!(
        "业务链路{}({}) 组件{}({})",
        req.stack_name, req.stack_uuid, req.service_name, req.service_uuid
    )];
    for task in &req.task_alert_infos {
        lines.push(format!(
            "任务{} 状态={} 机箱{} 板卡{}({}) 板卡状态={} {}",
            task.task_id,
            task.task_status,
            task.chassis_number,
            task.board_number,
            task.board_address,
            task.board_status,
            task.alert_messages.join("; ")
        ));
    }
    let description = lines.join("\n");
    let sink = state.fault_sink.clone();
    tokio::spawn(async move {
        sink.report_fault(&description, 1).await;
    });

    Json(success_envelope())
}

pub fn router(state: AlertServerState) -> Router {
    Router::new()
        .route("/api/v1/alert/board", post(handle_board_alert))
        .route("/api/v1/alert/service", post(handle_service_alert))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Board, BoardType, Chassis};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct RecordingSink {
        reports: parking_lot::Mutex<Vec<(String, u16)>>,
    }

    #[async_trait::async_trait]
    impl FaultSink for RecordingSink {
        async fn report_fault(&self, description: &str, problem_code: u16) {
            self.reports
                .lock()
                .push((description.to_string(), problem_code));
        }
    }

    fn state_with_board() -> (AlertServerState, Arc<RecordingSink>) {
        let chassis_repo = Arc::new(ChassisRepository::new());
        let mut chassis = Chassis::new(1, "rack-1".into());
        chassis.update_board_by_slot(
            1,
            Board::new(1, "192.168.0.101".into(), BoardType::Computing),
        );
        chassis_repo.save(chassis);
        let sink = Arc::new(RecordingSink {
            reports: parking_lot::Mutex::new(Vec::new()),
        });
        (
            AlertServerState {
                chassis_repo,
                fault_sink: sink.clone(),
            },
            sink,
        )
    }

    #[tokio::test]
    async fn board_alert_updates_status_and_returns_success_envelope() {
        let (state, _sink) = state_with_board();
        let chassis_repo = state.chassis_repo.clone();
        let app = router(state);

        let body = json!({
            "chassisName": "rack-1",
            "chassisNumber": 1,
            "boardName": "b1",
            "boardNumber": 1,
            "boardType": 0,
            "boardAddress": "192.168.0.101",
            "boardStatus": 1,
            "alertMessages": ["overheat"],
        });
        let resp = app
            .oneshot(
                Request::post("/api/v1/alert/board")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Give the best-effort fault-report spawn a chance to run.
        tokio::task::yield_now().await;

        let chassis = chassis_repo.find_by_number(1).unwrap();
        assert_eq!(
            chassis.board_by_address("192.168.0.101").unwrap().status,
            BoardOperationalStatus::Abnormal
        );
    }

    #[tokio::test]
    async fn malformed_json_returns_http_200_with_error_envelope() {
        let (state, _sink) = state_with_board();
        let app = router(state);

        let resp = app
            .oneshot(
                Request::post("/api/v1/alert/board")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["code"], -1);
    }

    #[tokio::test]
    async fn service_alert_does_not_mutate_world_model() {
        let (state, sink) = state_with_board();
        let chassis_repo = state.chassis_repo.clone();
        let app = router(state);

        let body = json!({
            "stackName": "stack-a",
            "stackUUID": "uuid-a",
            "serviceName": "svc-a",
            "serviceUUID": "svc-uuid",
            "taskAlertInfos": [{
                "taskId": "t1", "taskStatus": 3, "chassisNumber": 1,
                "boardNumber": 1, "boardAddress": "192.168.0.101",
                "boardStatus": 1, "alertMessages": ["oom"],
            }]
        });
        let resp = app
            .oneshot(
                Request::post("/api/v1/alert/service")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        tokio::task::yield_now().await;

        // Board status untouched by a service alert.
        let chassis = chassis_repo.find_by_number(1).unwrap();
        assert_eq!(
            chassis.board_by_address("192.168.0.101").unwrap().status,
            BoardOperationalStatus::Unknown
        );
        assert_eq!(sink.reports.lock().len(), 1);
        assert_eq!(sink.reports.lock()[0].1, 1);
    }
}
