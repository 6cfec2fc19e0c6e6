//! UDP multicast command dispatcher (C8, §4.8) — the hardest subsystem.
//!
//! One receive loop reads datagrams off the listen group; each request is
//! routed through an opcode table (redesign item 4) to a handler in
//! [`handlers`]. Role gating happens once, up front, in [`Self::handle_datagram`]:
//! everything past that point assumes Primary.

pub mod handlers;
pub mod protocol;

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use parking_lot::Mutex;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::api_client::PlatformApiClient;
use crate::chassis_controller::ChassisController;
use crate::config::UdpConfig;
use crate::fault_sink::FaultSink;
use crate::ha::HaArbiter;
use crate::repository::{ChassisRepository, StackRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    ResourceMonitor,
    ChassisReset,
    ChassisSelfCheck,
    TaskStart,
    TaskStop,
    TaskQuery,
    BmcQuery,
}

pub struct CommandDispatcher {
    config: UdpConfig,
    chassis_repo: Arc<ChassisRepository>,
    stack_repo: Arc<StackRepository>,
    api: Arc<PlatformApiClient>,
    chassis_controller: Arc<ChassisController>,
    ha: Arc<HaArbiter>,
    /// Serializes reads/writes of the single-flight start/stop label,
    /// per §5 "Ordering guarantees" (happens-before across the same mutex).
    current_running_label: Mutex<String>,
    account: String,
    password: String,
    local_ip: u32,
}

impl CommandDispatcher {
    pub fn new(
        config: UdpConfig,
        chassis_repo: Arc<ChassisRepository>,
        stack_repo: Arc<StackRepository>,
        api: Arc<PlatformApiClient>,
        chassis_controller: Arc<ChassisController>,
        ha: Arc<HaArbiter>,
        account: String,
        password: String,
        local_ip: u32,
    ) -> Self {
        Self {
            config,
            chassis_repo,
            stack_repo,
            api,
            chassis_controller,
            ha,
            current_running_label: Mutex::new(String::new()),
            account,
            password,
            local_ip,
        }
    }

    fn request_table(&self) -> HashMap<u16, Opcode> {
        let c = &self.config.commands;
        HashMap::from([
            (c.resource_monitor, Opcode::ResourceMonitor),
            (c.chassis_reset, Opcode::ChassisReset),
            (c.chassis_self_check, Opcode::ChassisSelfCheck),
            (c.task_start, Opcode::TaskStart),
            (c.task_stop, Opcode::TaskStop),
            (c.task_query, Opcode::TaskQuery),
            (c.bmc_query, Opcode::BmcQuery),
        ])
    }

    fn response_opcode(&self, opcode: Opcode) -> u16 {
        let c = &self.config.commands;
        match opcode {
            Opcode::ResourceMonitor => c.resource_monitor_resp,
            Opcode::ChassisReset => c.chassis_reset_resp,
            Opcode::ChassisSelfCheck => c.chassis_self_check_resp,
            Opcode::TaskStart => c.task_start_resp,
            Opcode::TaskStop => c.task_stop_resp,
            Opcode::TaskQuery => c.task_query_resp,
            Opcode::BmcQuery => c.bmc_query_resp,
        }
    }

    fn bind_listen_socket(&self) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(SockProtocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.port).into();
        socket.bind(&bind_addr.into())?;
        let group: Ipv4Addr = self
            .config
            .listener_multicast_group
            .parse()
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }

    fn bind_send_socket(&self) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(SockProtocol::UDP))?;
        socket.set_nonblocking(true)?;
        let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into();
        socket.bind(&bind_addr.into())?;
        UdpSocket::from_std(socket.into())
    }

    fn target_addr(&self) -> SocketAddr {
        format!("{}:{}", self.config.broadcaster_multicast_group, self.config.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    fn target_ip(&self) -> u32 {
        protocol::ip_to_u32(&self.config.broadcaster_multicast_group)
    }

    async fn send_response(&self, send_socket: &UdpSocket, opcode: Opcode, body: &[u8]) {
        let resp_opcode = self.response_opcode(opcode);
        let frame = protocol::assemble_response(resp_opcode, body, self.local_ip, self.target_ip());
        if let Err(err) = send_socket.send_to(&frame, self.target_addr()).await {
            warn!(%err, "failed to send command-dispatch response");
        }
    }

    /// Runs the listener until `shutdown` resolves.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let listen_socket = match self.bind_listen_socket() {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "command dispatcher failed to bind/join multicast group, running in degraded no-op mode");
                return;
            }
        };
        let send_socket = match self.bind_send_socket() {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "command dispatcher failed to open response socket, running in degraded no-op mode");
                return;
            }
        };
        let table = self.request_table();
        let mut buf = vec![0u8; 4096];

        loop {
            tokio::select! {
                res = listen_socket.recv_from(&mut buf) => {
                    if let Ok((n, _peer)) = res {
                        self.handle_datagram(&send_socket, &table, &buf[..n]).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, send_socket: &UdpSocket, table: &HashMap<u16, Opcode>, datagram: &[u8]) {
        if !self.ha.is_primary() {
            debug!("dropping command request, not Primary");
            return;
        }
        let (raw_opcode, body) = match protocol::parse_opcode(datagram) {
            Ok(v) => v,
            Err(err) => {
                debug!(%err, "dropping undersized command datagram");
                return;
            }
        };
        let Some(&opcode) = table.get(&raw_opcode) else {
            debug!(opcode = format!("{raw_opcode:#06x}"), "unknown opcode, ignoring");
            return;
        };
        self.dispatch(send_socket, opcode, body).await;
    }

    async fn dispatch(&self, send_socket: &UdpSocket, opcode: Opcode, body: &[u8]) {
        match opcode {
            Opcode::ResourceMonitor => self.handle_resource_monitor(send_socket, body).await,
            Opcode::ChassisReset => self.handle_chassis_reset(send_socket, body).await,
            Opcode::ChassisSelfCheck => self.handle_chassis_self_check(send_socket, body).await,
            Opcode::TaskStart => self.handle_task_start(send_socket, body).await,
            Opcode::TaskStop => self.handle_task_stop(send_socket, body).await,
            Opcode::TaskQuery => self.handle_task_query(send_socket, body).await,
            Opcode::BmcQuery => self.handle_bmc_query(send_socket, body).await,
        }
    }
}

#[async_trait::async_trait]
impl FaultSink for CommandDispatcher {
    /// Unsolicited fault reports go out regardless of HA role (§4.8.5) — we
    /// bind and drop a one-shot send socket rather than keep one alive for
    /// the lifetime of this rarely-used path.
    async fn report_fault(&self, description: &str, problem_code: u16) {
        let socket = match self.bind_send_socket() {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "failed to open socket for fault report");
                return;
            }
        };
        let body = protocol::encode_fault_report_body(problem_code, description);
        let resp_opcode = self.config.commands.fault_report;
        let frame = protocol::assemble_response(resp_opcode, &body, self.local_ip, self.target_ip());
        if let Err(err) = socket.send_to(&frame, self.target_addr()).await {
            warn!(%err, "failed to send fault report");
        }
    }
}
