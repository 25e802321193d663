//! The SHV RPC broker core: peer lifecycle, login handshake, request
//! routing, subscriptions, access control, and the outbound "connect"
//! peer role (spec §5).
//!
//! [`start`] is the entry point: it binds every `listen` URL, spawns the
//! single router task that owns all shared mutable state, and kicks off
//! a reconnect loop for every `connect` entry. Everything else in this
//! crate is a supporting module the router wires together.

mod access;
mod config;
mod intrinsic;
mod login;
mod mount;
mod peer;
mod pending;
mod ri;
mod router;

pub use access::{grant_for_roles, AccessLevel, Role};
pub use config::{AutosetupRule, BrokerConfig, ConfigError, ConnectConfig, RoleConfig, UserConfig};
pub use peer::ClientId;
pub use ri::RiPattern;
pub use router::{start, Broker, BrokerError};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn admin_config(listen: &str) -> BrokerConfig {
        let text = format!(
            r#"
            name = "test-broker"
            listen = ["{listen}"]

            [user.admin]
            password = "admin!123"
            role = "admin"

            [role.admin]
            mountPoints = []
            [role.admin.access]
            su = ["**:*:*"]
            "#
        );
        BrokerConfig::from_str(&text).unwrap()
    }

    async fn send(transport: &shv_transport::Transport, message: &shv_rpc::RpcMessage) {
        let bytes = shv_chainpack::encode(message.value()).unwrap();
        transport.send_frame(&bytes).await.unwrap();
    }

    async fn recv(transport: &shv_transport::Transport) -> shv_rpc::RpcMessage {
        let frame = transport.recv_frame().await.unwrap();
        let value = shv_chainpack::decode(&frame).unwrap();
        shv_rpc::RpcMessage::from_value(value)
    }

    /// Exercises the broker end to end over a real TCP socket: admin
    /// logs in, lists the root namespace (spec §8 scenario S1).
    #[tokio::test]
    async fn admin_login_and_root_ls() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("tcp://{addr}");

        let broker = start(admin_config(&url)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let transport = shv_transport::Transport::tcp(stream);

        let hello = recv(&transport).await;
        assert_eq!(hello.request_id(), Some(0));

        let login_params = login::login_request_params("admin", "admin!123", login::LoginType::Plain, None);
        send(&transport, &shv_rpc::RpcMessage::new_request("", "login", 1, login_params)).await;
        let login_reply = recv(&transport).await;
        assert!(login_reply.error().is_none(), "login should succeed");

        send(
            &transport,
            &shv_rpc::RpcMessage::new_request("", "ls", 2, shv_value::Value::null()),
        )
        .await;
        let ls_reply = recv(&transport).await;
        assert!(ls_reply.error().is_none());

        broker.shutdown().await;
    }
}
