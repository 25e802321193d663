//! The RPC message layer: interprets a decoded [`shv_value::Value`] as a
//! request, response, or signal (spec §3/§4.4).
//!
//! Pure with respect to its inputs — this crate never logs and never
//! panics; a malformed message classifies as [`Kind::Invalid`] rather than
//! raising, and it's `shv-broker`'s job to decide what to do about that
//! (spec §7: "pure components never log and never catch").

mod error_code;
mod keys;
mod message;
mod request_id;

pub use error_code::ErrorCode;
pub use keys::{
    ACCESS_GRANT, ACCESS_LEVEL_LEGACY, CALLER_IDS, CHAIN_PACK_MAJOR_VERSION, DEFAULT_SIGNAL_NAME,
    ERROR_CODE, ERROR_MESSAGE, META_KEY_TYPE, METHOD, REQUEST_ID, SHV_PATH, SIGNAL_NAME, USER_ID,
};
pub use message::{InvalidReason, Kind, RpcMessage};
pub use request_id::RequestIdGenerator;
