//! Silicon Heaven RPC: the dynamic [`Value`] model, the ChainPack and
//! CPON codecs, message framing and transports, the RPC message layer,
//! and (with the `broker` feature, on by default) the broker itself.
//!
//! This crate is a thin facade over the workspace's component crates —
//! everything here is a re-export. Most applications only need this one
//! dependency; the component crates (`shv-value`, `shv-chainpack`,
//! `shv-cpon`, `shv-rpc`, `shv-transport`, `shv-broker`) stay independently
//! usable for anyone who wants a narrower slice of the stack.

pub use shv_value::{Data, DateTime, Decimal, Meta, Value};

pub use shv_chainpack::{self as chainpack};
pub use shv_cpon::{self as cpon};

pub use shv_rpc::{ErrorCode, Kind, RequestIdGenerator, RpcMessage};

pub use shv_transport::{
    ConnectUrl, FramingError, Listener, Transport, TransportError, UrlError, connect, listen,
};

#[cfg(feature = "broker")]
pub use shv_broker as broker;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use shv::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{ErrorCode, RpcMessage, Transport, Value};

    #[cfg(feature = "broker")]
    pub use crate::broker::{BrokerConfig, start};
}
