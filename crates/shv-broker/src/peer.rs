//! Peer identity and per-peer state the router keeps (spec §3 "Peer").

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::time::Instant;

use shv_rpc::RpcMessage;

use crate::access::Role;
use crate::ri::RiPattern;

pub type ClientId = u64;

/// Outgoing queue capacity per peer (spec §5/§8 property 8: "no message
/// loss on slow consumer up to queue capacity").
pub const OUTGOING_QUEUE_CAPACITY: usize = 256;

/// Used when a peer's login `options.idleWatchDogTimeOut` is absent
/// (spec §4.5 login options).
pub const DEFAULT_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(180);

/// Counters backing `.broker/clients` inspection, scoped down from a
/// full telemetry ring (spec §1's no-metrics non-goal) to the minimal
/// per-peer counts the broker itself needs to report — grounded on the
/// teacher's `observe.rs` `ChannelMetrics` idiom.
#[derive(Debug, Default)]
pub struct PeerStats {
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
    pub messages_in: AtomicU64,
    pub messages_out: AtomicU64,
    pub frame_errors: AtomicU64,
}

impl PeerStats {
    pub fn record_in(&self, bytes: usize) {
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_out(&self, bytes: usize) {
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// The router's handle onto a peer's writer task: a bounded outgoing
/// queue plus the bookkeeping the router needs without touching the
/// peer's I/O directly.
pub struct PeerHandle {
    pub client_id: ClientId,
    pub user: String,
    pub mount_point: Option<String>,
    pub roles: Vec<Role>,
    pub role_names: Vec<String>,
    pub subscriptions: Vec<RiPattern>,
    pub outgoing: mpsc::Sender<RpcMessage>,
    pub stats: Arc<PeerStats>,
    pub idle_deadline: Instant,
    pub idle_timeout: std::time::Duration,
    /// Set once the router has sent the watchdog ping and is waiting for
    /// any traffic back; cleared by `touch_idle`. Past this deadline with
    /// no traffic, the router disconnects the peer (spec §4.5 "Idle and
    /// watchdog").
    pub ping_deadline: Option<Instant>,
    /// Device id supplied at login (`options.device.deviceId`), used to
    /// re-resolve auto-setup on outbound reconnects and for
    /// `.broker/clients` inspection.
    pub device_id: Option<String>,
    /// Lets the router tell this peer's I/O tasks to tear down the
    /// transport without owning it directly.
    pub shutdown: Arc<tokio::sync::Notify>,
}

impl PeerHandle {
    pub fn new(
        client_id: ClientId,
        user: String,
        mount_point: Option<String>,
        roles: Vec<Role>,
        role_names: Vec<String>,
        device_id: Option<String>,
        idle_timeout: std::time::Duration,
        outgoing: mpsc::Sender<RpcMessage>,
    ) -> Self {
        Self {
            client_id,
            user,
            mount_point,
            roles,
            role_names,
            subscriptions: Vec::new(),
            outgoing,
            stats: Arc::new(PeerStats::default()),
            idle_deadline: Instant::now() + idle_timeout,
            idle_timeout,
            ping_deadline: None,
            device_id,
            shutdown: Arc::new(tokio::sync::Notify::new()),
        }
    }

    pub fn touch_idle(&mut self) {
        self.idle_deadline = Instant::now() + self.idle_timeout;
        self.ping_deadline = None;
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub fn grant_for(&self, path: &str, method: &str, signal: &str) -> Option<crate::access::AccessLevel> {
        crate::access::grant_for_roles(self.roles.iter(), path, method, signal)
    }

    /// Externally visible mount prefix for a path this peer exposes,
    /// used by signal fan-out (spec §4.5 "P_ext = M_S ++ P").
    pub fn external_path(&self, local_path: &str) -> String {
        match &self.mount_point {
            Some(mp) if !mp.is_empty() => {
                if local_path.is_empty() {
                    mp.clone()
                } else {
                    format!("{mp}/{local_path}")
                }
            }
            _ => local_path.to_string(),
        }
    }
}
