//! 2-node primary/standby role arbiter (C9, §4.9).
//!
//! Runs on its own multicast group/port, distinct from the command
//! dispatcher's. A single receive loop drives state transitions; heartbeats
//! are emitted on the same loop's ticker, gated by current role.

pub mod protocol;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::config::HaConfig;
use protocol::{decode, encode, peer_outranks, HaMessage, MessageType, Role};

pub type RoleChangeCallback = Box<dyn Fn(Role, Role) + Send + Sync>;

pub struct HaArbiter {
    config: HaConfig,
    node_id: String,
    node_id_u32: u32,
    role: AtomicU8,
    sequence: AtomicU32,
    /// Monotonic millis (since arbiter start) of the last Primary heartbeat
    /// seen from any peer; `i64::MIN` sentinel means "never".
    last_primary_heartbeat_millis: AtomicI64,
    start: Instant,
    on_role_change: Mutex<Option<RoleChangeCallback>>,
}

fn role_to_u8(role: Role) -> u8 {
    match role {
        Role::Unknown => 0,
        Role::Primary => 1,
        Role::Standby => 2,
    }
}

fn u8_to_role(v: u8) -> Role {
    match v {
        1 => Role::Primary,
        2 => Role::Standby,
        _ => Role::Unknown,
    }
}

impl HaArbiter {
    pub fn new(config: HaConfig, node_id: String) -> Self {
        let node_id_u32 = crate::dispatcher::protocol::ip_to_u32(&node_id);
        Self {
            config,
            node_id,
            node_id_u32,
            role: AtomicU8::new(role_to_u8(Role::Unknown)),
            sequence: AtomicU32::new(0),
            last_primary_heartbeat_millis: AtomicI64::new(i64::MIN),
            start: Instant::now(),
            on_role_change: Mutex::new(None),
        }
    }

    pub fn set_role_change_callback(&self, callback: RoleChangeCallback) {
        *self.on_role_change.lock() = Some(callback);
    }

    pub fn role(&self) -> Role {
        u8_to_role(self.role.load(Ordering::SeqCst))
    }

    pub fn is_primary(&self) -> bool {
        self.role() == Role::Primary
    }

    fn elapsed_millis(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    fn set_role(&self, new_role: Role) {
        let old = u8_to_role(self.role.swap(role_to_u8(new_role), Ordering::SeqCst));
        if old != new_role {
            info!(?old, ?new_role, "HA role transition");
            if let Some(cb) = self.on_role_change.lock().as_ref() {
                cb(old, new_role);
            }
        }
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn build_message(&self, msg_type: MessageType) -> HaMessage {
        HaMessage {
            msg_type,
            role: self.role(),
            priority: self.config.priority,
            sequence: self.next_sequence(),
            timestamp: self.elapsed_millis() as u64,
            node_id: self.node_id.clone(),
        }
    }

    fn bind_socket(&self) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.port).into();
        socket.bind(&bind_addr.into())?;
        let group: Ipv4Addr = self
            .config
            .multicast_group
            .parse()
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }

    async fn send(&self, socket: &UdpSocket, msg: &HaMessage) {
        let target: SocketAddr = match format!("{}:{}", self.config.multicast_group, self.config.port).parse() {
            Ok(addr) => addr,
            Err(err) => {
                warn!(%err, "bad HA multicast target address");
                return;
            }
        };
        let frame = encode(msg);
        if let Err(err) = socket.send_to(&frame, target).await {
            warn!(%err, "HA send failed");
        }
    }

    /// Runs the election bootstrap, then the steady-state receive/heartbeat
    /// loop until `shutdown` resolves.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let socket = match self.bind_socket() {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "HA arbiter failed to bind/join multicast group, running in degraded no-op mode");
                return;
            }
        };

        self.bootstrap(&socket).await;

        let mut tick = tokio::time::interval(Duration::from_secs(1));
        let mut last_heartbeat_sent = Instant::now() - Duration::from_secs(3600);
        let mut buf = vec![0u8; 256];

        loop {
            tokio::select! {
                res = socket.recv_from(&mut buf) => {
                    if let Ok((n, _peer)) = res {
                        self.handle_datagram(&socket, &buf[..n]).await;
                    }
                }
                _ = tick.tick() => {
                    self.check_standby_timeout();
                    if self.is_primary()
                        && last_heartbeat_sent.elapsed() >= Duration::from_secs(self.config.heartbeat_interval_seconds.max(1))
                    {
                        let msg = self.build_message(MessageType::Heartbeat);
                        self.send(&socket, &msg).await;
                        last_heartbeat_sent = Instant::now();
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("HA arbiter shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// §4.9.2 startup sequence: announce, wait ~2s for heartbeats, then
    /// decide Primary/Standby based on whether a Primary was heard from
    /// recently.
    async fn bootstrap(&self, socket: &UdpSocket) {
        let announce = self.build_message(MessageType::ElectionAnnounce);
        self.send(socket, &announce).await;

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut buf = vec![0u8; 256];
        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, _peer))) => self.observe_datagram(&buf[..n]),
                _ => break,
            }
        }

        let heard_primary_recently = self.elapsed_millis() - self.last_primary_heartbeat_millis.load(Ordering::SeqCst) < 5_000;
        if heard_primary_recently {
            self.set_role(Role::Standby);
        } else {
            self.set_role(Role::Primary);
        }
    }

    /// Records bookkeeping (e.g. last-primary-heartbeat) without acting on
    /// role transitions; used during the bootstrap window.
    fn observe_datagram(&self, data: &[u8]) {
        if let Ok(msg) = decode(data) {
            if msg.node_id != self.node_id && msg.role == Role::Primary {
                self.last_primary_heartbeat_millis.store(self.elapsed_millis(), Ordering::SeqCst);
            }
        }
    }

    async fn handle_datagram(&self, socket: &UdpSocket, data: &[u8]) {
        let msg = match decode(data) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%err, "dropping malformed HA frame");
                return;
            }
        };
        if msg.node_id == self.node_id {
            return;
        }

        match msg.msg_type {
            MessageType::Heartbeat if msg.role == Role::Primary => {
                self.last_primary_heartbeat_millis.store(self.elapsed_millis(), Ordering::SeqCst);
                if self.is_primary() {
                    let their_id = crate::dispatcher::protocol::ip_to_u32(&msg.node_id);
                    if peer_outranks(self.config.priority, self.node_id_u32, msg.priority, their_id) {
                        self.set_role(Role::Standby);
                    }
                }
            }
            MessageType::ElectionAnnounce => {
                if self.is_primary() {
                    let declare = self.build_message(MessageType::RoleDeclare);
                    self.send(socket, &declare).await;
                }
            }
            MessageType::RoleDeclare if msg.role == Role::Primary => {
                self.last_primary_heartbeat_millis.store(self.elapsed_millis(), Ordering::SeqCst);
            }
            _ => {}
        }
    }

    fn check_standby_timeout(&self) {
        if self.role() != Role::Standby {
            return;
        }
        let last = self.last_primary_heartbeat_millis.load(Ordering::SeqCst);
        let since = if last == i64::MIN {
            i64::MAX
        } else {
            self.elapsed_millis() - last
        };
        if since > (self.config.timeout_threshold_seconds as i64) * 1000 {
            self.set_role(Role::Primary);
        }
    }
}
