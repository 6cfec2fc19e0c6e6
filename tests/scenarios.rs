//! End-to-end scenarios spanning topology, repositories, the BMC receiver,
//! and the alert ingestor together (§8.3).

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use chassis_control_plane::alert_server::{router, AlertServerState};
use chassis_control_plane::config::TopologyConfig;
use chassis_control_plane::domain::BoardOperationalStatus;
use chassis_control_plane::fault_sink::FaultSink;
use chassis_control_plane::repository::ChassisRepository;
use chassis_control_plane::topology::build_topology;

struct RecordingSink {
    reports: parking_lot::Mutex<Vec<(String, u16)>>,
}

#[async_trait::async_trait]
impl FaultSink for RecordingSink {
    async fn report_fault(&self, description: &str, problem_code: u16) {
        self.reports.lock().push((description.to_string(), problem_code));
    }
}

fn seeded_repo() -> Arc<ChassisRepository> {
    let repo = Arc::new(ChassisRepository::new());
    for chassis in build_topology(&TopologyConfig::default()) {
        repo.save(chassis);
    }
    repo
}

#[tokio::test]
async fn board_alert_updates_status_and_emits_fault_report() {
    let chassis_repo = seeded_repo();
    let address = chassis_repo.find_by_number(1).unwrap().board_by_slot(1).unwrap().address.clone();
    let sink = Arc::new(RecordingSink {
        reports: parking_lot::Mutex::new(Vec::new()),
    });
    let app = router(AlertServerState {
        chassis_repo: chassis_repo.clone(),
        fault_sink: sink.clone(),
    });

    let body = json!({
        "chassisName": "chassis-1",
        "chassisNumber": 1,
        "boardName": "b1",
        "boardNumber": 1,
        "boardType": 0,
        "boardAddress": address,
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
    tokio::task::yield_now().await;

    let chassis = chassis_repo.find_by_number(1).unwrap();
    assert_eq!(
        chassis.board_by_slot(1).unwrap().status,
        BoardOperationalStatus::Abnormal
    );
    assert_eq!(sink.reports.lock().len(), 1);
}

#[tokio::test]
async fn board_alert_for_unknown_chassis_is_ignored_but_still_acknowledged() {
    let chassis_repo = seeded_repo();
    let sink = Arc::new(RecordingSink {
        reports: parking_lot::Mutex::new(Vec::new()),
    });
    let app = router(AlertServerState {
        chassis_repo: chassis_repo.clone(),
        fault_sink: sink.clone(),
    });

    let body = json!({
        "chassisName": "ghost",
        "chassisNumber": 99,
        "boardName": "b1",
        "boardNumber": 1,
        "boardType": 0,
        "boardAddress": "10.0.0.1",
        "boardStatus": 1,
        "alertMessages": [],
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
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["code"], 0, "unknown chassis still returns a success envelope");
    // No fault report for a chassis/board we can't locate.
    assert!(sink.reports.lock().is_empty());
}

#[tokio::test]
async fn bmc_presence_then_board_alert_compose_without_clobbering_each_other() {
    let chassis_repo = seeded_repo();
    let address = chassis_repo.find_by_number(1).unwrap().board_by_slot(2).unwrap().address.clone();

    let mut presence = HashMap::new();
    presence.insert(2u32, false);
    chassis_repo.update_all_boards_status(1, &presence).unwrap();
    assert_eq!(
        chassis_repo.find_by_number(1).unwrap().board_by_slot(2).unwrap().status,
        BoardOperationalStatus::Offline
    );

    let sink = Arc::new(RecordingSink {
        reports: parking_lot::Mutex::new(Vec::new()),
    });
    let app = router(AlertServerState {
        chassis_repo: chassis_repo.clone(),
        fault_sink: sink.clone(),
    });
    let body = json!({
        "chassisName": "chassis-1",
        "chassisNumber": 1,
        "boardName": "b2",
        "boardNumber": 2,
        "boardType": 0,
        "boardAddress": address,
        "boardStatus": 0,
        "alertMessages": [],
    });
    app.oneshot(
        Request::post("/api/v1/alert/board")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap();
    tokio::task::yield_now().await;

    assert_eq!(
        chassis_repo.find_by_number(1).unwrap().board_by_slot(2).unwrap().status,
        BoardOperationalStatus::Normal
    );
}
