//! Meta-key contract for an RPC message's envelope (spec §3).
//!
//! These are the well-known integer keys the broker and its peers stamp
//! into a [`Value`](shv_value::Value)'s [`Meta`](shv_value::Meta) to turn
//! a plain dynamic value into a request, response, or signal.

/// Major type tag. The only value this repo ever writes is
/// [`CHAIN_PACK_MAJOR_VERSION`]; the key exists so a future wire-format
/// revision has somewhere to signal itself.
pub const META_KEY_TYPE: i64 = 1;
pub const REQUEST_ID: i64 = 8;
pub const SHV_PATH: i64 = 9;
pub const METHOD: i64 = 10;
pub const SIGNAL_NAME: i64 = 11;
pub const CALLER_IDS: i64 = 14;
pub const ACCESS_GRANT: i64 = 17;
pub const USER_ID: i64 = 18;
/// Older compatibility tag for the access level; superseded by
/// [`ACCESS_GRANT`] but still read (never written) for interop with
/// peers running an earlier protocol revision.
pub const ACCESS_LEVEL_LEGACY: i64 = 19;

pub const CHAIN_PACK_MAJOR_VERSION: i64 = 1;

/// Default signal name when a caller omits it (§4.5 "subscribe" default).
pub const DEFAULT_SIGNAL_NAME: &str = "chng";

/// Body keys of an error-response IMap (§3: "an IMap with integer keys
/// `code` and `message`" — the SHV wire convention numbers them 1 and 2).
pub const ERROR_CODE: i64 = 1;
pub const ERROR_MESSAGE: i64 = 2;
