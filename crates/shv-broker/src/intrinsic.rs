//! Broker-intrinsic method surface: `ls`, `dir`, `.app`, `.broker/*`
//! (spec §4.5 "Request routing" step 2, SPEC_FULL.md §5.4).

use std::collections::HashMap;

use shv_rpc::ErrorCode;
use shv_value::{Data, Value};

use crate::mount::MountTree;
use crate::peer::{ClientId, PeerHandle};
use crate::ri::RiPattern;

pub enum IntrinsicOutcome {
    /// `path` isn't a broker-intrinsic path at all — fall through to the
    /// mount lookup / `MethodNotFound`.
    NotIntrinsic,
    Result(Value),
    Error(ErrorCode, String),
    /// `.broker/client/<id>:dropClient` — answer the caller, then the
    /// router disconnects the named client.
    DropClient(ClientId, Value),
}

fn list_value(items: Vec<&str>) -> Value {
    Value::new(Data::List(items.into_iter().map(Value::from).collect()))
}

/// `true` if `path` falls under the reserved `.app`/`.broker` namespace
/// (it never gets a real mount, so the router checks this before
/// attempting mount-tree lookup).
pub fn is_intrinsic_path(path: &str) -> bool {
    path.is_empty()
        || path == ".app"
        || path.starts_with(".app/")
        || path == ".broker"
        || path.starts_with(".broker/")
}

/// Rewrites the deprecated `.app/broker/*` alias to `.broker/*` (spec §9
/// open question (i)). Returns `Some(rewritten)` and logs at `warn!`
/// when the alias was used.
pub fn rewrite_legacy_alias(path: &str) -> Option<String> {
    path.strip_prefix(".app/broker").map(|rest| {
        tracing::warn!(path, "request under deprecated .app/broker alias");
        format!(".broker{rest}")
    })
}

pub fn dispatch(
    peers: &mut HashMap<ClientId, PeerHandle>,
    mounts: &MountTree,
    caller: ClientId,
    path: &str,
    method: &str,
    params: &Value,
) -> IntrinsicOutcome {
    if path.is_empty() {
        return dispatch_root(mounts, method);
    }
    if path == ".app" {
        return dispatch_app(method);
    }
    if path == ".broker" {
        return dispatch_broker_root(method);
    }
    if path == ".broker/currentClient" {
        return dispatch_current_client(peers, caller, method, params);
    }
    if path == ".broker/clients" {
        return dispatch_clients(peers, method);
    }
    if path == ".broker/mounts" {
        return dispatch_mounts(mounts, method);
    }
    if let Some(id_str) = path.strip_prefix(".broker/client/") {
        if let Ok(id) = id_str.parse::<ClientId>() {
            return dispatch_client_by_id(peers, id, method);
        }
        return IntrinsicOutcome::Error(ErrorCode::InvalidParam, format!("not a client id: {id_str}"));
    }
    IntrinsicOutcome::NotIntrinsic
}

fn dispatch_root(mounts: &MountTree, method: &str) -> IntrinsicOutcome {
    match method {
        "ls" => {
            let mut children = mounts.children("");
            children.push(".app".to_string());
            children.push(".broker".to_string());
            children.sort();
            children.dedup();
            IntrinsicOutcome::Result(list_value(children.iter().map(|s| s.as_str()).collect()))
        }
        "dir" => IntrinsicOutcome::Result(list_value(vec!["ls", "dir"])),
        other => IntrinsicOutcome::Error(ErrorCode::MethodNotFound, format!("no such method: {other}")),
    }
}

fn dispatch_app(method: &str) -> IntrinsicOutcome {
    match method {
        "ls" => IntrinsicOutcome::Result(list_value(vec![])),
        "dir" => IntrinsicOutcome::Result(list_value(vec!["ls", "dir", "shvVersion", "name", "ping"])),
        "shvVersion" => IntrinsicOutcome::Result(Value::from("3.0")),
        "name" => IntrinsicOutcome::Result(Value::from("shvbroker")),
        "ping" => IntrinsicOutcome::Result(Value::null()),
        other => IntrinsicOutcome::Error(ErrorCode::MethodNotFound, format!("no such method: {other}")),
    }
}

fn dispatch_broker_root(method: &str) -> IntrinsicOutcome {
    match method {
        "ls" => IntrinsicOutcome::Result(list_value(vec!["currentClient", "clients", "mounts", "client"])),
        "dir" => IntrinsicOutcome::Result(list_value(vec!["ls", "dir"])),
        other => IntrinsicOutcome::Error(ErrorCode::MethodNotFound, format!("no such method: {other}")),
    }
}

fn dispatch_current_client(
    peers: &mut HashMap<ClientId, PeerHandle>,
    caller: ClientId,
    method: &str,
    params: &Value,
) -> IntrinsicOutcome {
    match method {
        "ls" => IntrinsicOutcome::Result(list_value(vec![])),
        "dir" => IntrinsicOutcome::Result(list_value(vec![
            "ls",
            "dir",
            "subscribe",
            "unsubscribe",
            "subscriptions",
            "mountPoint",
            "userId",
            "ping",
        ])),
        "ping" => IntrinsicOutcome::Result(Value::null()),
        "subscribe" => {
            let ri = subscription_ri_from_params(params);
            if let Some(peer) = peers.get_mut(&caller) {
                if !peer.subscriptions.contains(&ri) {
                    peer.subscriptions.push(ri);
                }
            }
            IntrinsicOutcome::Result(Value::null())
        }
        "unsubscribe" => {
            let ri = subscription_ri_from_params(params);
            let existed = peers
                .get_mut(&caller)
                .map(|peer| {
                    let before = peer.subscriptions.len();
                    peer.subscriptions.retain(|existing| existing != &ri);
                    peer.subscriptions.len() != before
                })
                .unwrap_or(false);
            IntrinsicOutcome::Result(Value::from(existed))
        }
        "subscriptions" => {
            let list = peers
                .get(&caller)
                .map(|peer| peer.subscriptions.iter().map(|ri| ri.to_ri_string()).collect())
                .unwrap_or_default();
            IntrinsicOutcome::Result(Value::new(Data::List(
                list.into_iter().map(|s: String| Value::from(s)).collect(),
            )))
        }
        "mountPoint" => {
            let mp = peers.get(&caller).and_then(|p| p.mount_point.clone());
            IntrinsicOutcome::Result(mp.map(|s| Value::from(s)).unwrap_or_else(Value::null))
        }
        "userId" => {
            let user = peers.get(&caller).map(|p| p.user.clone()).unwrap_or_default();
            IntrinsicOutcome::Result(Value::from(user))
        }
        other => IntrinsicOutcome::Error(ErrorCode::MethodNotFound, format!("no such method: {other}")),
    }
}

/// `{path, method, signal}` params, defaulting per spec §4.5:
/// "missing fields default to `*`/`*`/`*`, except that if only signal is
/// omitted it defaults to `chng`".
fn subscription_ri_from_params(params: &Value) -> RiPattern {
    let Data::Map(map) = params.data() else {
        return RiPattern::new("**", "*", shv_rpc::DEFAULT_SIGNAL_NAME);
    };
    let get_str = |key: &str| -> Option<String> {
        map.get(key).and_then(|v| match v.data() {
            Data::String(s) => Some(s.clone()),
            _ => None,
        })
    };
    let path = get_str("path").unwrap_or_else(|| "**".to_string());
    let method = get_str("method").unwrap_or_else(|| "*".to_string());
    let signal = get_str("signal")
        .unwrap_or_else(|| shv_rpc::DEFAULT_SIGNAL_NAME.to_string());
    RiPattern::new(path, method, signal)
}

fn dispatch_clients(peers: &HashMap<ClientId, PeerHandle>, method: &str) -> IntrinsicOutcome {
    match method {
        "ls" => {
            let mut ids: Vec<String> = peers.keys().map(|id| id.to_string()).collect();
            ids.sort();
            IntrinsicOutcome::Result(list_value(ids.iter().map(|s| s.as_str()).collect()))
        }
        "dir" => IntrinsicOutcome::Result(list_value(vec!["ls", "dir"])),
        other => IntrinsicOutcome::Error(ErrorCode::MethodNotFound, format!("no such method: {other}")),
    }
}

fn dispatch_mounts(mounts: &MountTree, method: &str) -> IntrinsicOutcome {
    match method {
        "ls" => {
            let mut paths: Vec<String> = mounts.all_mounts().into_iter().map(|(p, _)| p).collect();
            paths.sort();
            IntrinsicOutcome::Result(list_value(paths.iter().map(|s| s.as_str()).collect()))
        }
        "dir" => IntrinsicOutcome::Result(list_value(vec!["ls", "dir"])),
        other => IntrinsicOutcome::Error(ErrorCode::MethodNotFound, format!("no such method: {other}")),
    }
}

fn dispatch_client_by_id(
    peers: &mut HashMap<ClientId, PeerHandle>,
    id: ClientId,
    method: &str,
) -> IntrinsicOutcome {
    match method {
        "ls" => IntrinsicOutcome::Result(list_value(vec![])),
        "dir" => {
            IntrinsicOutcome::Result(list_value(vec!["ls", "dir", "mountPoint", "subscriptions", "dropClient"]))
        }
        "mountPoint" => {
            let Some(peer) = peers.get(&id) else {
                return IntrinsicOutcome::Error(ErrorCode::MethodCallException, "no such client".to_string());
            };
            IntrinsicOutcome::Result(peer.mount_point.clone().map(Value::from).unwrap_or_else(Value::null))
        }
        "subscriptions" => {
            let Some(peer) = peers.get(&id) else {
                return IntrinsicOutcome::Error(ErrorCode::MethodCallException, "no such client".to_string());
            };
            IntrinsicOutcome::Result(Value::new(Data::List(
                peer.subscriptions.iter().map(|ri| Value::from(ri.to_ri_string())).collect(),
            )))
        }
        "dropClient" => {
            if !peers.contains_key(&id) {
                return IntrinsicOutcome::Error(ErrorCode::MethodCallException, "no such client".to_string());
            }
            IntrinsicOutcome::DropClient(id, Value::null())
        }
        other => IntrinsicOutcome::Error(ErrorCode::MethodNotFound, format!("no such method: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers_with(id: ClientId) -> HashMap<ClientId, PeerHandle> {
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let mut peers = HashMap::new();
        peers.insert(
            id,
            PeerHandle::new(
                id,
                "alice".to_string(),
                Some("test/device".to_string()),
                vec![],
                vec![],
                None,
                std::time::Duration::from_secs(60),
                tx,
            ),
        );
        peers
    }

    #[test]
    fn root_ls_lists_app_and_broker() {
        let mounts = MountTree::new();
        match dispatch_root(&mounts, "ls") {
            IntrinsicOutcome::Result(v) => {
                let Data::List(items) = v.data() else { panic!("expected list") };
                let names: Vec<_> = items
                    .iter()
                    .map(|v| match v.data() {
                        Data::String(s) => s.clone(),
                        _ => panic!("expected string"),
                    })
                    .collect();
                assert_eq!(names, vec![".app".to_string(), ".broker".to_string()]);
            }
            _ => panic!("expected result"),
        }
    }

    #[test]
    fn root_dir_contains_ls_and_dir() {
        match dispatch_root(&MountTree::new(), "dir") {
            IntrinsicOutcome::Result(v) => {
                let Data::List(items) = v.data() else { panic!() };
                assert_eq!(items.len(), 2);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn current_client_subscribe_then_list() {
        let mut peers = peers_with(1);
        let mut params = std::collections::BTreeMap::new();
        params.insert("path".to_string(), Value::from("test/**"));
        let params = Value::new(Data::Map(params));
        let outcome = dispatch_current_client(&mut peers, 1, "subscribe", &params);
        assert!(matches!(outcome, IntrinsicOutcome::Result(_)));
        assert_eq!(peers[&1].subscriptions.len(), 1);
        assert_eq!(peers[&1].subscriptions[0].signal(), shv_rpc::DEFAULT_SIGNAL_NAME);
    }

    #[test]
    fn current_client_mount_point_reads_peer_state() {
        let mut peers = peers_with(1);
        let outcome = dispatch_current_client(&mut peers, 1, "mountPoint", &Value::null());
        match outcome {
            IntrinsicOutcome::Result(v) => assert_eq!(v, Value::from("test/device")),
            _ => panic!(),
        }
    }

    #[test]
    fn legacy_alias_rewrites_and_is_detected() {
        assert_eq!(
            rewrite_legacy_alias(".app/broker/clients"),
            Some(".broker/clients".to_string())
        );
        assert_eq!(rewrite_legacy_alias(".broker/clients"), None);
    }
}
