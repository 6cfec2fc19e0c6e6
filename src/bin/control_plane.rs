//! Process entry point (C10): wiring, not logic. Every worker loop is
//! spawned as its own task and driven by one shared shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use chassis_control_plane::api_client::PlatformApiClient;
use chassis_control_plane::chassis_controller::ChassisController;
use chassis_control_plane::collector::Collector;
use chassis_control_plane::config::Config;
use chassis_control_plane::dispatcher::{protocol as dispatch_protocol, CommandDispatcher};
use chassis_control_plane::fault_sink::FaultSink;
use chassis_control_plane::ha::HaArbiter;
use chassis_control_plane::repository::{ChassisRepository, StackRepository};
use chassis_control_plane::topology;
use chassis_control_plane::{alert_server, bmc};

/// How often the heartbeat task pings the upstream platform API. Not
/// presently configurable — revisit if an operator asks for it.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref());
    init_tracing(&config.logging.level);

    tracing::info!("starting control plane");

    let chassis_repo = Arc::new(ChassisRepository::new());
    let stack_repo = Arc::new(StackRepository::new());
    for chassis in topology::build_topology(&config.topology) {
        chassis_repo.save(chassis);
    }

    let api = Arc::new(PlatformApiClient::new(config.api.clone()));
    let chassis_controller = Arc::new(ChassisController::new(
        config.chassis_controller.port,
        config.chassis_controller.timeout_seconds,
    ));
    let ha = Arc::new(HaArbiter::new(config.ha.clone(), config.heartbeat.client_ip.clone()));
    let local_ip = dispatch_protocol::ip_to_u32(&config.heartbeat.client_ip);
    let dispatcher = Arc::new(CommandDispatcher::new(
        config.udp.clone(),
        chassis_repo.clone(),
        stack_repo.clone(),
        api.clone(),
        chassis_controller.clone(),
        ha.clone(),
        config.api.account.clone(),
        config.api.password.clone(),
        local_ip,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let collector = Collector::new(api.clone(), chassis_repo.clone(), stack_repo.clone(), &config.collector);
    let collector_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        collector.run(collector_shutdown).await;
    });

    let alert_state = alert_server::AlertServerState {
        chassis_repo: chassis_repo.clone(),
        fault_sink: dispatcher.clone() as Arc<dyn FaultSink>,
    };
    let alert_addr = format!("{}:{}", config.alert_server.host, config.alert_server.port);
    let mut alert_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&alert_addr).await {
            Ok(l) => l,
            Err(err) => {
                tracing::warn!(%err, addr = alert_addr, "alert server failed to bind, running in degraded no-op mode");
                return;
            }
        };
        let app = alert_server::router(alert_state);
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = alert_shutdown.changed().await;
        });
        if let Err(err) = serve.await {
            tracing::warn!(%err, "alert server exited with error");
        }
    });

    let bmc_receiver = bmc::BmcReceiver::new(config.bmc.clone(), chassis_repo.clone());
    let bmc_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        bmc_receiver.run(bmc_shutdown).await;
    });

    let dispatcher_for_run = dispatcher.clone();
    let dispatcher_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        dispatcher_for_run.run(dispatcher_shutdown).await;
    });

    let ha_for_run = ha.clone();
    let ha_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        ha_for_run.run(ha_shutdown).await;
    });

    let heartbeat_api = api.clone();
    let heartbeat_client_ip = config.heartbeat.client_ip.clone();
    let mut heartbeat_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !heartbeat_api.send_heartbeat(&heartbeat_client_ip).await {
                        tracing::warn!("heartbeat to upstream platform API failed");
                    }
                }
                _ = heartbeat_shutdown.changed() => {
                    if *heartbeat_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping workers");
    let _ = shutdown_tx.send(true);

    // Give spawned tasks a moment to observe the signal and unwind cleanly.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            tracing::warn!(%err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
