//! The periodic reconcile loop (C4, §4.3): board tick, then stack tick,
//! then timeout demotion, every `interval_seconds`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api_client::{stack_info_to_domain, PlatformApiClient};
use crate::config::CollectorConfig;
use crate::domain::{BoardOperationalStatus, BoardType, FanSpeed, TaskRef, TIMEOUT_EXEMPT_SLOTS};
use crate::repository::{ChassisRepository, StackRepository};

pub struct Collector {
    api: Arc<PlatformApiClient>,
    chassis_repo: Arc<ChassisRepository>,
    stack_repo: Arc<StackRepository>,
    interval: Duration,
    board_timeout: chrono::Duration,
}

impl Collector {
    pub fn new(
        api: Arc<PlatformApiClient>,
        chassis_repo: Arc<ChassisRepository>,
        stack_repo: Arc<StackRepository>,
        config: &CollectorConfig,
    ) -> Self {
        Self {
            api,
            chassis_repo,
            stack_repo,
            interval: Duration::from_secs(config.interval_seconds.max(1)),
            board_timeout: chrono::Duration::seconds(config.board_timeout_seconds as i64),
        }
    }

    /// Runs until `shutdown` resolves. A stop signal aborts the sleep
    /// promptly (§4.3 "Cancellation").
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("collector shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// One full tick: board stage, then stack stage, then timeout
    /// demotion — in that order (§5 "Ordering guarantees").
    pub async fn tick(&self) {
        self.tick_board().await;
        self.tick_stack().await;
        self.tick_timeout_demotion();
    }

    async fn tick_board(&self) {
        let entries = self.api.get_board_info().await;
        for entry in entries {
            let Some(chassis) = self.chassis_repo.find_by_number(entry.chassis_number) else {
                warn!(chassis_number = entry.chassis_number, "board-info entry references unknown chassis, skipping");
                continue;
            };
            let Some(mut board) = chassis.board_by_slot(entry.board_number).cloned() else {
                warn!(
                    chassis_number = entry.chassis_number,
                    board_number = entry.board_number,
                    "board-info entry references unknown slot, skipping"
                );
                continue;
            };
            let fans = entry
                .fan_speeds
                .into_iter()
                .map(|f| FanSpeed {
                    fan_name: f.fan_name,
                    speed: f.speed,
                })
                .collect();
            let tasks = entry
                .task_infos
                .into_iter()
                .map(|t| TaskRef {
                    task_id: t.task_id,
                    task_status: t.task_status,
                    service_name: t.service_name,
                    service_uuid: t.service_uuid,
                    stack_name: t.stack_name,
                    stack_uuid: t.stack_uuid,
                })
                .collect();
            board.update_from_api_data(
                entry.board_name,
                entry.board_address,
                BoardType::from_ordinal(entry.board_type),
                entry.board_status,
                entry.voltage12v,
                entry.voltage3_3v,
                entry.current12a,
                entry.current3_3a,
                entry.temperature,
                fans,
                tasks,
            );
            if let Err(err) =
                self.chassis_repo
                    .update_board(entry.chassis_number, entry.board_number, board)
            {
                warn!(%err, "failed to persist board-info update");
            }
        }
    }

    async fn tick_stack(&self) {
        let (data, api_succeeded) = self.api.get_stack_info().await;
        if !api_succeeded {
            warn!("stack-info API call failed, keeping existing stack store");
            return;
        }
        let stacks: Vec<_> = data.into_iter().filter_map(stack_info_to_domain).collect();
        self.stack_repo.replace_all(stacks);
    }

    fn tick_timeout_demotion(&self) {
        let now = Utc::now();
        for chassis in self.chassis_repo.get_all() {
            for board in chassis.boards() {
                if matches!(
                    board.status,
                    BoardOperationalStatus::Abnormal | BoardOperationalStatus::Offline
                ) {
                    debug!(
                        chassis_number = chassis.number,
                        slot = board.slot,
                        status = ?board.status,
                        "board unhealthy"
                    );
                }
                if TIMEOUT_EXEMPT_SLOTS.contains(&board.slot) {
                    continue;
                }
                if board.is_timeout_due(now, self.board_timeout) {
                    let mut demoted = board.clone();
                    demoted.status = BoardOperationalStatus::Abnormal;
                    if let Err(err) =
                        self.chassis_repo
                            .update_board(chassis.number, board.slot, demoted)
                    {
                        warn!(%err, "failed to persist timeout demotion");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::domain::Chassis;

    fn collector_with_repos() -> (Collector, Arc<ChassisRepository>, Arc<StackRepository>) {
        let chassis_repo = Arc::new(ChassisRepository::new());
        let stack_repo = Arc::new(StackRepository::new());
        let api = Arc::new(PlatformApiClient::new(ApiConfig::default()));
        let collector = Collector::new(
            api,
            chassis_repo.clone(),
            stack_repo.clone(),
            &CollectorConfig::default(),
        );
        (collector, chassis_repo, stack_repo)
    }

    #[test]
    fn slot_6_and_7_are_exempt_from_demotion() {
        let (collector, chassis_repo, _) = collector_with_repos();
        let mut chassis = Chassis::new(1, "rack-1".into());
        for slot in [6u32, 7] {
            let mut b = chassis.board_by_slot(slot).unwrap().clone();
            b.status = BoardOperationalStatus::Normal;
            b.last_update_time = Some(Utc::now() - chrono::Duration::seconds(99_999));
            chassis.update_board_by_slot(slot, b);
        }
        chassis_repo.save(chassis);

        collector.tick_timeout_demotion();

        let after = chassis_repo.find_by_number(1).unwrap();
        assert_eq!(
            after.board_by_slot(6).unwrap().status,
            BoardOperationalStatus::Normal
        );
        assert_eq!(
            after.board_by_slot(7).unwrap().status,
            BoardOperationalStatus::Normal
        );
    }

    #[test]
    fn stale_normal_board_is_demoted() {
        let (collector, chassis_repo, _) = collector_with_repos();
        let mut chassis = Chassis::new(1, "rack-1".into());
        let mut b = chassis.board_by_slot(1).unwrap().clone();
        b.status = BoardOperationalStatus::Normal;
        b.last_update_time = Some(Utc::now() - chrono::Duration::seconds(99_999));
        chassis.update_board_by_slot(1, b);
        chassis_repo.save(chassis);

        collector.tick_timeout_demotion();

        let after = chassis_repo.find_by_number(1).unwrap();
        assert_eq!(
            after.board_by_slot(1).unwrap().status,
            BoardOperationalStatus::Abnormal
        );
    }
}
