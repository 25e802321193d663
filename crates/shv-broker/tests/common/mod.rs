//! Shared plumbing for the multi-peer broker scenarios (spec §8 S1-S6):
//! a bare TCP client that speaks just enough of the wire protocol to
//! log in and exchange a handful of requests/signals.

use std::collections::BTreeMap;
use std::time::Duration;

use sha1::{Digest, Sha1};
use shv_rpc::RpcMessage;
use shv_value::{Data, Value};

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

pub fn free_tcp_url() -> (String, std::net::SocketAddr) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    (format!("tcp://{addr}"), addr)
}

pub struct Client {
    transport: shv_transport::Transport,
}

fn encode(message: &RpcMessage) -> Vec<u8> {
    shv_chainpack::encode(message.value()).unwrap()
}

fn decode(bytes: &[u8]) -> RpcMessage {
    RpcMessage::from_value(shv_chainpack::decode(bytes).unwrap())
}

fn login_params(user: &str, password: &str, login_type: &str, device_id: Option<&str>, mount_point: Option<&str>) -> Value {
    let mut login = BTreeMap::new();
    login.insert("user".to_string(), Value::from(user));
    login.insert("password".to_string(), Value::from(password));
    login.insert("type".to_string(), Value::from(login_type));

    let mut params = BTreeMap::new();
    params.insert("login".to_string(), Value::new(Data::Map(login)));

    if device_id.is_some() || mount_point.is_some() {
        let mut device = BTreeMap::new();
        if let Some(id) = device_id {
            device.insert("deviceId".to_string(), Value::from(id));
        }
        if let Some(mp) = mount_point {
            device.insert("mountPoint".to_string(), Value::from(mp));
        }
        let mut options = BTreeMap::new();
        options.insert("device".to_string(), Value::new(Data::Map(device)));
        params.insert("options".to_string(), Value::new(Data::Map(options)));
    }
    Value::new(Data::Map(params))
}

impl Client {
    /// Connects, completes the hello/login handshake with PLAIN
    /// credentials, and returns the ready-to-use client.
    pub async fn connect_and_login(
        addr: std::net::SocketAddr,
        user: &str,
        password: &str,
        device_id: Option<&str>,
        mount_point: Option<&str>,
    ) -> Self {
        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let transport = shv_transport::Transport::tcp(stream);
        let client = Client { transport };

        let hello = client.recv().await;
        assert_eq!(hello.request_id(), Some(0));

        client
            .send(&RpcMessage::new_request(
                "",
                "login",
                1,
                login_params(user, password, "PLAIN", device_id, mount_point),
            ))
            .await;
        let reply = client.recv().await;
        assert!(reply.error().is_none(), "login should succeed: {:?}", reply.error());
        client
    }

    /// Connects and completes the handshake with SHA1 credentials per
    /// spec §4.5: `hex(SHA1(nonce + hex(SHA1(password))))`.
    pub async fn connect_and_login_sha1(addr: std::net::SocketAddr, user: &str, password: &str) -> Self {
        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let transport = shv_transport::Transport::tcp(stream);
        let client = Client { transport };

        let hello = client.recv().await;
        let Data::Map(params) = hello.params().data() else {
            panic!("expected a map hello body")
        };
        let Some(nonce) = params.get("nonce").and_then(|v| match v.data() {
            Data::String(s) => Some(s.clone()),
            _ => None,
        }) else {
            panic!("hello missing nonce")
        };

        let shapass = sha1_hex(password.as_bytes());
        let supplied = sha1_hex(format!("{nonce}{shapass}").as_bytes());

        client
            .send(&RpcMessage::new_request("", "login", 1, login_params(user, &supplied, "SHA1", None, None)))
            .await;
        let reply = client.recv().await;
        assert!(reply.error().is_none(), "SHA1 login should succeed: {:?}", reply.error());
        client
    }

    pub async fn send(&self, message: &RpcMessage) {
        self.transport.send_frame(&encode(message)).await.unwrap();
    }

    pub async fn recv(&self) -> RpcMessage {
        let frame = self.transport.recv_frame().await.unwrap();
        decode(&frame)
    }

    pub async fn recv_timeout(&self, dur: Duration) -> Option<RpcMessage> {
        tokio::time::timeout(dur, self.recv()).await.ok()
    }

    pub fn close(&self) {
        self.transport.close();
    }
}

pub fn call_params(path: &str, method: &str, request_id: i64, params: Value) -> RpcMessage {
    RpcMessage::new_request(path, method, request_id, params)
}

pub fn subscribe_params(path: &str, signal: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert("path".to_string(), Value::from(path));
    map.insert("signal".to_string(), Value::from(signal));
    Value::new(Data::Map(map))
}
