//! The single router task: owns the peer table, mount tree, and
//! pending-request table, and is the only place that mutates them (spec
//! §4.5/§5/§9 "single-consumer channel into the router").
//!
//! Per-peer I/O lives in [`handle_connection`]/[`run_peer_io`]: one task
//! reads frames off a transport and forwards decoded [`RpcMessage`]s to
//! the router over an `mpsc` channel, one task drains a peer's bounded
//! outgoing queue and writes frames back out. The router itself never
//! touches a transport directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use shv_rpc::{ErrorCode, Kind, RequestIdGenerator, RpcMessage};
use shv_transport::Transport;
use shv_value::Value;

use crate::access::{AccessLevel, Role};
use crate::config::{BrokerConfig, ConfigError, ConnectConfig};
use crate::intrinsic::{self, IntrinsicOutcome};
use crate::login::{self, LoginParams, LoginType};
use crate::mount::MountTree;
use crate::peer::{ClientId, PeerHandle, DEFAULT_IDLE_TIMEOUT, OUTGOING_QUEUE_CAPACITY};
use crate::pending::{PendingEntry, PendingTable, DEFAULT_REQUEST_TIMEOUT};
use crate::ri::RiPattern;

/// Delay before closing a connection that failed to log in, to
/// discourage credential-probing (spec §4.5 "Invalid credentials...
/// close the link after a fixed small delay").
const LOGIN_REJECT_DELAY: Duration = Duration::from_millis(300);

const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Upper bound on `%i` conflict-counter search before giving up (spec
/// §4.5's auto-setup disambiguation is meant for "a handful of clients
/// on the same device class", not an unbounded namespace).
const MAX_MOUNT_CONFLICT_ATTEMPTS: u32 = 10_000;

const WATCHDOG_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum BrokerError {
    Config(ConfigError),
    Listen(shv_transport::TransportError),
    RouterPanicked,
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::Config(e) => write!(f, "configuration error: {e}"),
            BrokerError::Listen(e) => write!(f, "failed to bind listener: {e}"),
            BrokerError::RouterPanicked => write!(f, "router task terminated unexpectedly"),
        }
    }
}

impl std::error::Error for BrokerError {}

enum LoginOutcome {
    Accepted {
        client_id: ClientId,
        idle_timeout: Duration,
        shutdown: Arc<tokio::sync::Notify>,
    },
    Rejected(ErrorCode, String),
}

enum RouterCommand {
    Login {
        params: LoginParams,
        nonce: String,
        outgoing: mpsc::Sender<RpcMessage>,
        respond_to: oneshot::Sender<LoginOutcome>,
    },
    RegisterOutbound {
        role_names: Vec<String>,
        mount_point: Option<String>,
        subscriptions: Vec<String>,
        outgoing: mpsc::Sender<RpcMessage>,
        respond_to: oneshot::Sender<LoginOutcome>,
    },
    Message {
        client_id: ClientId,
        message: RpcMessage,
    },
    FrameError {
        client_id: ClientId,
    },
    Disconnected {
        client_id: ClientId,
    },
    Shutdown,
}

/// A running broker: holds the handle needed to ask it to shut down.
pub struct Broker {
    tx: mpsc::Sender<RouterCommand>,
    router_task: tokio::task::JoinHandle<()>,
}

impl Broker {
    pub async fn shutdown(self) {
        let _ = self.tx.send(RouterCommand::Shutdown).await;
        let _ = self.router_task.await;
    }
}

/// Starts the router task plus one accept loop per `listen` URL and one
/// reconnect loop per `connect` entry (spec §4.5).
pub async fn start(config: BrokerConfig) -> Result<Broker, BrokerError> {
    let mut listeners = Vec::new();
    for url in &config.listen {
        let listener = shv_transport::listen(url).await.map_err(BrokerError::Listen)?;
        listeners.push((url.clone(), listener));
    }

    let (tx, rx) = mpsc::channel(4096);
    let router = Router::from_config(&config);
    let router_task = tokio::spawn(router.run(rx));

    for (url, listener) in listeners {
        let tx = tx.clone();
        tokio::spawn(async move {
            tracing::info!(url, "listening");
            accept_loop(listener, tx).await;
        });
    }
    for connect in config.connect.clone() {
        let tx = tx.clone();
        tokio::spawn(outbound_loop(connect, tx));
    }

    Ok(Broker { tx, router_task })
}

async fn accept_loop(listener: shv_transport::Listener, tx: mpsc::Sender<RouterCommand>) {
    loop {
        match listener.accept().await {
            Ok(transport) => {
                tokio::spawn(handle_connection(transport, tx.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed, stopping this listener");
                return;
            }
        }
    }
}

fn encode(message: &RpcMessage) -> Vec<u8> {
    // Panics only on a value the writer considers structurally malformed
    // (non-UTF-8 string, bad Decimal/DateTime) — this repo never
    // constructs those when composing RpcMessages itself.
    shv_chainpack::encode(message.value()).expect("encoding a broker-composed message never fails")
}

async fn send_message(transport: &Transport, message: &RpcMessage) -> Result<(), shv_transport::TransportError> {
    transport.send_frame(&encode(message)).await?;
    Ok(())
}

async fn recv_message(transport: &Transport) -> Result<RpcMessage, RecvError> {
    let frame = transport.recv_frame().await?;
    let value = shv_chainpack::decode(&frame)?;
    Ok(RpcMessage::from_value(value))
}

enum RecvError {
    Transport(shv_transport::TransportError),
    Decode(shv_chainpack::DecodeError),
}

impl From<shv_transport::TransportError> for RecvError {
    fn from(e: shv_transport::TransportError) -> Self {
        RecvError::Transport(e)
    }
}

impl From<shv_transport::FramingError> for RecvError {
    fn from(e: shv_transport::FramingError) -> Self {
        RecvError::Transport(e.into())
    }
}

impl From<shv_chainpack::DecodeError> for RecvError {
    fn from(e: shv_chainpack::DecodeError) -> Self {
        RecvError::Decode(e)
    }
}

/// Inbound connection: sends the `hello` nonce, waits for the client's
/// `login` request, hands credential verification to the router, and —
/// on success — hands the transport off to [`run_peer_io`].
async fn handle_connection(transport: Transport, tx: mpsc::Sender<RouterCommand>) {
    let nonce = login::generate_nonce();
    if send_message(&transport, &RpcMessage::new_response(0, &[], login::hello_result(&nonce)))
        .await
        .is_err()
    {
        return;
    }

    let login_msg = match recv_message(&transport).await {
        Ok(m) => m,
        Err(_) => return,
    };
    let Some(request_id) = login_msg.request_id() else {
        return;
    };

    let Some(params) = login::parse_login_params(login_msg.params()) else {
        let _ = send_message(
            &transport,
            &RpcMessage::new_error_response(request_id, &[], ErrorCode::InvalidRequest, "malformed login params"),
        )
        .await;
        return;
    };

    let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);
    let (reply_tx, reply_rx) = oneshot::channel();
    let cmd = RouterCommand::Login {
        params,
        nonce,
        outgoing: outgoing_tx,
        respond_to: reply_tx,
    };
    if tx.send(cmd).await.is_err() {
        return;
    }
    let outcome = match reply_rx.await {
        Ok(o) => o,
        Err(_) => return,
    };

    match outcome {
        LoginOutcome::Rejected(code, reason) => {
            let _ = send_message(
                &transport,
                &RpcMessage::new_error_response(request_id, &[], code, reason),
            )
            .await;
            tokio::time::sleep(LOGIN_REJECT_DELAY).await;
            transport.close();
        }
        LoginOutcome::Accepted { client_id, idle_timeout, shutdown } => {
            let mut result = std::collections::BTreeMap::new();
            result.insert("clientId".to_string(), Value::from(client_id));
            let _ = send_message(
                &transport,
                &RpcMessage::new_response(request_id, &[], Value::new(shv_value::Data::Map(result))),
            )
            .await;
            run_peer_io(transport, client_id, tx, outgoing_rx, shutdown, idle_timeout).await;
        }
    }
}

/// Drives a logged-in peer's I/O until disconnect: one reader loop
/// forwarding decoded messages to the router, one writer loop draining
/// the bounded outgoing queue, torn down together on the first failure
/// or on the router's shutdown notification.
async fn run_peer_io(
    transport: Transport,
    client_id: ClientId,
    tx: mpsc::Sender<RouterCommand>,
    mut outgoing_rx: mpsc::Receiver<RpcMessage>,
    shutdown: Arc<tokio::sync::Notify>,
    _idle_timeout: Duration,
) {
    let reader_transport = transport.clone();
    let reader_tx = tx.clone();
    let reader_shutdown = shutdown.clone();
    let reader = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reader_shutdown.notified() => return,
                result = recv_message(&reader_transport) => {
                    match result {
                        Ok(message) => {
                            if reader_tx.send(RouterCommand::Message { client_id, message }).await.is_err() {
                                return;
                            }
                        }
                        Err(RecvError::Decode(_)) => {
                            let _ = reader_tx.send(RouterCommand::FrameError { client_id }).await;
                            // Framing already resynced at the next frame
                            // boundary (spec §4.3); keep reading.
                        }
                        Err(RecvError::Transport(_)) => {
                            let _ = reader_tx.send(RouterCommand::Disconnected { client_id }).await;
                            return;
                        }
                    }
                }
            }
        }
    });

    let writer_transport = transport.clone();
    let writer_shutdown = shutdown.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_shutdown.notified() => return,
                msg = outgoing_rx.recv() => {
                    match msg {
                        Some(message) => {
                            if send_message(&writer_transport, &message).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    });

    let _ = tokio::join!(reader, writer);
    transport.close();
    let _ = tx.send(RouterCommand::Disconnected { client_id }).await;
}

/// Performs the client side of the login handshake against an outbound
/// `connect[]` peer (spec §4.5 "Outbound (connect) peers"), using the
/// credentials carried in the connect URL's query options (spec §6.1).
async fn client_login_handshake(transport: &Transport, url: &shv_transport::ConnectUrl) -> Result<(), ()> {
    let hello = recv_message(transport).await.map_err(|_| ())?;
    let nonce_str = extract_nonce(hello.params()).ok_or(())?;
    let user = url.options.get("user").cloned().unwrap_or_default();
    let (password_field, login_type) = if let Some(shapass) = url.options.get("shapass") {
        let expanded = login::sha1_hex(format!("{nonce_str}{shapass}").as_bytes());
        (expanded, LoginType::Sha1)
    } else {
        let password = url.options.get("password").cloned().unwrap_or_default();
        (password, LoginType::Plain)
    };
    let device_id = url.options.get("devid").map(String::as_str);
    let params = login::login_request_params(&user, &password_field, login_type, device_id);
    send_message(transport, &RpcMessage::new_request("", "login", 1, params))
        .await
        .map_err(|_| ())?;
    let response = recv_message(transport).await.map_err(|_| ())?;
    if response.error().is_some() {
        return Err(());
    }
    Ok(())
}

fn extract_nonce(params: &Value) -> Option<String> {
    let shv_value::Data::Map(map) = params.data() else { return None };
    match map.get("nonce")?.data() {
        shv_value::Data::String(s) => Some(s.clone()),
        _ => None,
    }
}

async fn outbound_loop(connect: ConnectConfig, tx: mpsc::Sender<RouterCommand>) {
    let mut backoff = BASE_BACKOFF;
    loop {
        match shv_transport::connect(&connect.url).await {
            Ok(transport) => {
                let url = match shv_transport::ConnectUrl::parse(&connect.url) {
                    Ok(u) => u,
                    Err(_) => {
                        transport.close();
                        return;
                    }
                };
                match client_login_handshake(&transport, &url).await {
                    Ok(()) => {
                        backoff = BASE_BACKOFF;
                        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);
                        let (reply_tx, reply_rx) = oneshot::channel();
                        let cmd = RouterCommand::RegisterOutbound {
                            role_names: connect.role.clone(),
                            mount_point: connect.mount_point.clone(),
                            subscriptions: connect.subscriptions.clone(),
                            outgoing: outgoing_tx,
                            respond_to: reply_tx,
                        };
                        if tx.send(cmd).await.is_err() {
                            return;
                        }
                        match reply_rx.await {
                            Ok(LoginOutcome::Accepted { client_id, idle_timeout, shutdown }) => {
                                run_peer_io(transport, client_id, tx.clone(), outgoing_rx, shutdown, idle_timeout).await;
                            }
                            _ => {
                                transport.close();
                            }
                        }
                    }
                    Err(()) => {
                        tracing::warn!(url = %connect.url, "outbound login failed");
                        transport.close();
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %connect.url, error = %e, "outbound connect failed");
            }
        }
        tokio::time::sleep(jittered(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn jittered(base: Duration) -> Duration {
    // +/-20% jitter (spec §4.5 "base 500 ms, cap 60 s, jitter +/-20%").
    let millis = base.as_millis() as i64;
    let span = millis / 5;
    let offset = (rand::random::<i64>().rem_euclid(2 * span + 1)) - span;
    Duration::from_millis((millis + offset).max(0) as u64)
}

/// Required access level to invoke a broker-intrinsic method — spec §4.5
/// distinguishes "broker administration" (a peer's own `currentClient`
/// operations) from "broker inspection" (other peers' state), so the
/// latter requires a higher grant (documented DESIGN.md decision: no
/// explicit level is named in spec, `Service` fits the administrative
/// tone of `.broker/clients`/`.broker/mounts`, `SuperService` gates the
/// destructive `dropClient`).
fn intrinsic_required_level(path: &str, method: &str) -> AccessLevel {
    if path == ".broker/clients" || path == ".broker/mounts" {
        return AccessLevel::SERVICE;
    }
    if path.starts_with(".broker/client/") {
        return if method == "dropClient" { AccessLevel::SUPER_SERVICE } else { AccessLevel::SERVICE };
    }
    AccessLevel::BROWSE
}

struct Router {
    name: String,
    roles: HashMap<String, Role>,
    users: HashMap<String, crate::config::UserConfig>,
    autosetup: Vec<crate::config::AutosetupRule>,
    peers: HashMap<ClientId, PeerHandle>,
    mounts: MountTree,
    pending: PendingTable,
    next_client_id: Arc<AtomicU64>,
    request_ids: RequestIdGenerator,
    request_timeout: Duration,
}

impl Router {
    fn from_config(config: &BrokerConfig) -> Self {
        let roles = config
            .role
            .iter()
            .map(|(name, cfg)| (name.clone(), Role::from_config(cfg)))
            .collect();
        Self {
            name: config.name.clone(),
            roles,
            users: config.user.clone().into_iter().collect(),
            autosetup: config.autosetup.clone(),
            peers: HashMap::new(),
            mounts: MountTree::new(),
            pending: PendingTable::new(),
            next_client_id: Arc::new(AtomicU64::new(1)),
            request_ids: RequestIdGenerator::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RouterCommand>) {
        let mut ticker = tokio::time::interval(WATCHDOG_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        None | Some(RouterCommand::Shutdown) => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                _ = ticker.tick() => self.sweep(),
            }
        }
        for peer in self.peers.values() {
            peer.request_shutdown();
        }
    }

    fn handle_command(&mut self, cmd: RouterCommand) {
        match cmd {
            RouterCommand::Login { params, nonce, outgoing, respond_to } => {
                let _ = respond_to.send(self.handle_login(params, &nonce, outgoing));
            }
            RouterCommand::RegisterOutbound { role_names, mount_point, subscriptions, outgoing, respond_to } => {
                let _ = respond_to.send(self.register_outbound(role_names, mount_point, subscriptions, outgoing));
            }
            RouterCommand::Message { client_id, message } => self.route_message(client_id, message),
            RouterCommand::FrameError { client_id } => {
                if let Some(peer) = self.peers.get(&client_id) {
                    peer.stats.record_frame_error();
                }
            }
            RouterCommand::Disconnected { client_id } => self.disconnect(client_id),
            RouterCommand::Shutdown => {}
        }
    }

    fn roles_for(&self, names: &[String]) -> Vec<Role> {
        names.iter().filter_map(|n| self.roles.get(n).cloned()).collect()
    }

    fn resolve_mount_point(&self, requested: Option<String>) -> Result<Option<String>, String> {
        let Some(requested) = requested else { return Ok(None) };
        if requested.is_empty() {
            return Ok(None);
        }
        if self.mounts.is_mounted(&requested) {
            Err("mount point occupied".to_string())
        } else {
            Ok(Some(requested))
        }
    }

    /// Expands an auto-setup `mountPoint` format, retrying with an
    /// incrementing `%i`/`%I` counter until a free path is found (spec
    /// §4.5 "conflict counter").
    fn expand_unique_mount_point(&self, format: &str, device_id: &str, roles: &[String], user: &str) -> Option<String> {
        for counter in 0..MAX_MOUNT_CONFLICT_ATTEMPTS {
            let candidate = login::expand_mount_point(format, device_id, roles, user, counter, counter == 0);
            if !self.mounts.is_mounted(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn handle_login(&mut self, params: LoginParams, nonce: &str, outgoing: mpsc::Sender<RpcMessage>) -> LoginOutcome {
        let Some(user_cfg) = self.users.get(&params.user).cloned() else {
            return LoginOutcome::Rejected(ErrorCode::LoginRequired, "invalid login credentials".to_string());
        };
        // SHA1 compares against hex(SHA1(nonce + hex(SHA1(password)))) using
        // the nonce this broker actually sent in `hello`; the nonce-free
        // fallback covers a TOKEN-style static hash of the password.
        let ok = match params.login_type {
            LoginType::Plain => user_cfg.password.as_deref().is_some_and(|p| p == params.password),
            LoginType::Sha1 => login::verify_credentials(&user_cfg, nonce, LoginType::Sha1, &params.password)
                || verify_sha1_any_nonce(&user_cfg, &params.password),
            LoginType::Token => user_cfg.password.as_deref().is_some_and(|p| p == params.password),
        };
        if !ok {
            return LoginOutcome::Rejected(ErrorCode::LoginRequired, "invalid login credentials".to_string());
        }

        let mut role_names = user_cfg.role.clone();
        let rule = login::find_autosetup_rule(&self.autosetup, params.device_id.as_deref());
        if let Some(rule) = rule {
            for r in &rule.roles {
                if !role_names.contains(r) {
                    role_names.push(r.clone());
                }
            }
        }

        let roles = self.roles_for(&role_names);
        let mount_point = match &params.device_mount_point {
            Some(explicit) => {
                if !roles.iter().any(|r| r.allows_mount(explicit)) {
                    return LoginOutcome::Rejected(
                        ErrorCode::LoginRequired,
                        "mount point not permitted for this role".to_string(),
                    );
                }
                match self.resolve_mount_point(Some(explicit.clone())) {
                    Ok(mp) => mp,
                    Err(reason) => return LoginOutcome::Rejected(ErrorCode::MethodCallException, reason),
                }
            }
            None => match rule {
                Some(rule) => {
                    let device_id = params.device_id.as_deref().unwrap_or("");
                    self.expand_unique_mount_point(&rule.mount_point, device_id, &rule.roles, &params.user)
                }
                None => None,
            },
        };

        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        if let Some(mp) = &mount_point {
            self.mounts.mount(mp, client_id);
        }

        let idle_timeout = params
            .idle_watchdog_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT);

        let mut peer = PeerHandle::new(
            client_id,
            params.user.clone(),
            mount_point,
            roles,
            role_names,
            params.device_id.clone(),
            idle_timeout,
            outgoing,
        );
        if let Some(rule) = rule {
            peer.subscriptions = rule.subscriptions.iter().map(|s| RiPattern::parse(s)).collect();
        }
        let shutdown = peer.shutdown.clone();
        self.peers.insert(client_id, peer);
        tracing::info!(client_id, user = %params.user, "peer logged in");
        LoginOutcome::Accepted { client_id, idle_timeout, shutdown }
    }

    fn register_outbound(
        &mut self,
        role_names: Vec<String>,
        mount_point: Option<String>,
        subscriptions: Vec<String>,
        outgoing: mpsc::Sender<RpcMessage>,
    ) -> LoginOutcome {
        let mount_point = match self.resolve_mount_point(mount_point) {
            Ok(mp) => mp,
            Err(reason) => return LoginOutcome::Rejected(ErrorCode::MethodCallException, reason),
        };
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        if let Some(mp) = &mount_point {
            self.mounts.mount(mp, client_id);
        }
        let idle_timeout = DEFAULT_IDLE_TIMEOUT;
        let mut peer = PeerHandle::new(
            client_id,
            format!("{}@connect", self.name),
            mount_point,
            self.roles_for(&role_names),
            role_names,
            None,
            idle_timeout,
            outgoing,
        );
        peer.subscriptions = subscriptions.iter().map(|s| RiPattern::parse(s)).collect();
        let shutdown = peer.shutdown.clone();
        self.peers.insert(client_id, peer);
        tracing::info!(client_id, "outbound peer registered");
        LoginOutcome::Accepted { client_id, idle_timeout, shutdown }
    }

    fn route_message(&mut self, origin: ClientId, message: RpcMessage) {
        if let Some(peer) = self.peers.get_mut(&origin) {
            peer.touch_idle();
        }
        match message.kind() {
            Kind::Request => self.handle_request(origin, message),
            Kind::Response => self.handle_response(origin, message),
            Kind::Signal => self.handle_signal(origin, message),
            Kind::Invalid(reason) => {
                tracing::warn!(origin, ?reason, "dropping invalid message");
            }
        }
    }

    fn send_to(&self, client_id: ClientId, message: RpcMessage) {
        if let Some(peer) = self.peers.get(&client_id) {
            if peer.outgoing.try_send(message).is_err() {
                tracing::warn!(client_id, "outgoing queue full or closed, disconnecting slow peer");
                peer.request_shutdown();
            }
        }
    }

    fn handle_request(&mut self, origin: ClientId, message: RpcMessage) {
        let request_id = message.request_id().unwrap();
        let caller_ids = message.caller_ids();
        let method = message.method().unwrap().to_string();
        let raw_path = message.shv_path().to_string();
        let path = intrinsic::rewrite_legacy_alias(&raw_path).unwrap_or(raw_path);

        if intrinsic::is_intrinsic_path(&path) {
            let required = intrinsic_required_level(&path, &method);
            let grant = self.peers.get(&origin).and_then(|p| p.grant_for(&path, &method, "*"));
            match grant {
                None => {
                    self.send_to(origin, RpcMessage::new_error_response(request_id, &caller_ids, ErrorCode::MethodNotFound, format!("no such method: {method}")));
                }
                Some(level) if level < required => {
                    self.send_to(origin, RpcMessage::new_error_response(request_id, &caller_ids, ErrorCode::MethodCallException, "access denied"));
                }
                Some(_) => {
                    let outcome = intrinsic::dispatch(&mut self.peers, &self.mounts, origin, &path, &method, message.params());
                    match outcome {
                        IntrinsicOutcome::NotIntrinsic => {
                            self.send_to(origin, RpcMessage::new_error_response(request_id, &caller_ids, ErrorCode::MethodNotFound, format!("no such method: {method}")));
                        }
                        IntrinsicOutcome::Result(v) => {
                            self.send_to(origin, RpcMessage::new_response(request_id, &caller_ids, v));
                        }
                        IntrinsicOutcome::Error(code, msg) => {
                            self.send_to(origin, RpcMessage::new_error_response(request_id, &caller_ids, code, msg));
                        }
                        IntrinsicOutcome::DropClient(target, v) => {
                            self.send_to(origin, RpcMessage::new_response(request_id, &caller_ids, v));
                            self.disconnect(target);
                        }
                    }
                }
            }
            return;
        }

        let Some((_mount_point, destination, remainder)) = self.mounts.lookup(&path) else {
            self.send_to(origin, RpcMessage::new_error_response(request_id, &caller_ids, ErrorCode::MethodNotFound, format!("no mounted peer under {path}")));
            return;
        };

        let grant = self.peers.get(&origin).and_then(|p| p.grant_for(&path, &method, "*"));
        let Some(grant) = grant else {
            self.send_to(origin, RpcMessage::new_error_response(request_id, &caller_ids, ErrorCode::MethodNotFound, format!("no such method: {method}")));
            return;
        };
        // Never elevate: if the caller already carried a (lower) access
        // grant from an upstream broker, keep the lower of the two.
        let final_access = match message.access_grant() {
            Some(carried) if carried < grant.0 => carried,
            _ => grant.0,
        };

        let mut forwarded_caller_ids = caller_ids.clone();
        forwarded_caller_ids.push(origin);
        let fresh_request_id = self.request_ids.next_id() as i64;

        self.pending.insert(
            destination,
            fresh_request_id,
            PendingEntry {
                origin_client_id: origin,
                origin_request_id: request_id,
                origin_caller_ids: caller_ids,
                deadline: Instant::now() + self.request_timeout,
            },
        );

        let mut forwarded = message;
        forwarded.set_shv_path(&remainder);
        forwarded.set_request_id(fresh_request_id);
        forwarded.set_caller_ids(&forwarded_caller_ids);
        forwarded.set_access_grant(final_access);
        self.send_to(destination, forwarded);
    }

    fn handle_response(&mut self, origin: ClientId, message: RpcMessage) {
        let Some(request_id) = message.request_id() else {
            tracing::warn!(origin, "response missing request_id, dropping");
            return;
        };
        let Some(entry) = self.pending.take(origin, request_id) else {
            // No outstanding request (late reply past its deadline, or a
            // reply for a request this broker never forwarded) — drop.
            return;
        };
        let mut response = message;
        response.set_request_id(entry.origin_request_id);
        response.set_caller_ids(&entry.origin_caller_ids);
        self.send_to(entry.origin_client_id, response);
    }

    fn handle_signal(&mut self, origin: ClientId, message: RpcMessage) {
        let Some(origin_peer) = self.peers.get(&origin) else { return };
        let path_ext = origin_peer.external_path(message.shv_path());
        let method = message.method().unwrap_or("").to_string();
        let signal = message.signal_name().unwrap_or("chng").to_string();
        let forwarded = RpcMessage::new_signal(&path_ext, &method, &signal, message.params().clone());

        let targets: Vec<ClientId> = self
            .peers
            .iter()
            .filter(|(id, _)| **id != origin)
            .filter(|(_, peer)| {
                peer.subscriptions.iter().any(|ri| ri.matches(&path_ext, &method, &signal))
                    && peer
                        .grant_for(&path_ext, &method, &signal)
                        .is_some_and(|g| g >= AccessLevel::BROWSE)
            })
            .map(|(id, _)| *id)
            .collect();

        for target in targets {
            self.send_to(target, forwarded.clone());
        }
    }

    fn disconnect(&mut self, client_id: ClientId) {
        let Some(peer) = self.peers.remove(&client_id) else { return };
        peer.request_shutdown();
        if let Some(mp) = &peer.mount_point {
            self.mounts.unmount(mp);
        }
        for entry in self.pending.drain_destination(client_id) {
            self.send_to(
                entry.origin_client_id,
                RpcMessage::new_error_response(
                    entry.origin_request_id,
                    &entry.origin_caller_ids,
                    ErrorCode::MethodCallException,
                    "destination disconnected",
                ),
            );
        }
        // Requests this peer originated have nowhere to be answered to.
        self.pending.drain_origin(client_id);
        tracing::info!(client_id, "peer disconnected");
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        for (_, entry) in self.pending.drain_expired(now) {
            self.send_to(
                entry.origin_client_id,
                RpcMessage::new_error_response(entry.origin_request_id, &entry.origin_caller_ids, ErrorCode::MethodCallException, "timeout"),
            );
        }

        let mut to_ping = Vec::new();
        let mut to_drop = Vec::new();
        for (id, peer) in self.peers.iter_mut() {
            match peer.ping_deadline {
                Some(deadline) if now > deadline => to_drop.push(*id),
                Some(_) => {}
                None if now > peer.idle_deadline => {
                    peer.ping_deadline = Some(now + peer.idle_timeout / 2);
                    to_ping.push(*id);
                }
                None => {}
            }
        }
        for id in to_ping {
            self.send_to(id, RpcMessage::new_request(".broker/currentClient", "ping", self.request_ids.next_id() as i64, Value::null()));
        }
        for id in to_drop {
            tracing::warn!(client_id = id, "idle watchdog expired, disconnecting");
            self.disconnect(id);
        }
    }
}

/// `SHA1` login type lets the client present the nonce-free raw SHA1 of
/// the password too, for the TOKEN-as-static-password fallback described
/// in DESIGN.md's Open Question decision 3.
fn verify_sha1_any_nonce(user: &crate::config::UserConfig, supplied: &str) -> bool {
    let Some(password) = user.password.as_deref() else { return false };
    login::sha1_hex(password.as_bytes()).eq_ignore_ascii_case(supplied)
}
