//! Login handshake: nonce challenge, credential verification, auto-setup
//! substitution (spec §4.5 "Login handshake").

use rand::Rng;
use sha1::{Digest, Sha1};

use shv_value::{Data, Value};

use crate::config::{AutosetupRule, UserConfig};
use crate::ri::path_glob_matches;

/// A 32-hex-char nonce, the challenge the broker sends right after
/// accept — ambient choice of `rand` grounded on the `navicore-cem3`
/// example's use of the same crate for token generation.
pub fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginType {
    Plain,
    Sha1,
    Token,
}

impl LoginType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PLAIN" => Some(LoginType::Plain),
            "SHA1" => Some(LoginType::Sha1),
            "TOKEN" => Some(LoginType::Token),
            _ => None,
        }
    }
}

pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Verifies `login.password` against a configured user, per spec §4.5:
/// PLAIN compares plaintext directly; SHA1 compares against
/// `hex(SHA1(nonce + hex(SHA1(password))))`. TOKEN has no persisted
/// store in this core (spec §6.5, DESIGN.md open-question decision 3) —
/// it's accepted only when it matches the user's configured password
/// acting as a static token.
pub fn verify_credentials(
    user: &UserConfig,
    nonce: &str,
    login_type: LoginType,
    supplied_password: &str,
) -> bool {
    match login_type {
        LoginType::Plain => user
            .password
            .as_deref()
            .is_some_and(|p| p == supplied_password),
        LoginType::Sha1 => {
            let Some(expected_shapass) = user_sha1pass(user) else {
                return false;
            };
            let expected = sha1_hex(format!("{nonce}{expected_shapass}").as_bytes());
            expected.eq_ignore_ascii_case(supplied_password)
        }
        LoginType::Token => user
            .password
            .as_deref()
            .is_some_and(|p| p == supplied_password),
    }
}

fn user_sha1pass(user: &UserConfig) -> Option<String> {
    if let Some(sha1pass) = &user.sha1pass {
        return Some(sha1pass.clone());
    }
    user.password.as_deref().map(|p| sha1_hex(p.as_bytes()))
}

/// Picks the first auto-setup rule whose `deviceId` globs match, per
/// spec §4.5 ("first matching rule by device_id glob and role set").
pub fn find_autosetup_rule<'a>(
    rules: &'a [AutosetupRule],
    device_id: Option<&str>,
) -> Option<&'a AutosetupRule> {
    rules.iter().find(|rule| {
        rule.device_id.is_empty()
            || device_id.is_some_and(|id| rule.device_id.iter().any(|glob| path_glob_matches(glob, id)))
    })
}

/// Expands the `mountPoint` format string's substitutions (spec §4.5):
/// `%d` device id, `%r` role (first role, joined with `+` if several),
/// `%u` user, `%i` conflict counter (`""` when `is_unique`, else the
/// counter starting at 1), `%I` always-numeric counter from 0, `%%`
/// literal percent.
pub fn expand_mount_point(
    format: &str,
    device_id: &str,
    roles: &[String],
    user: &str,
    conflict_counter: u32,
    is_unique: bool,
) -> String {
    let role_str = roles.join("+");
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('d') => out.push_str(device_id),
            Some('r') => out.push_str(&role_str),
            Some('u') => out.push_str(user),
            Some('i') => {
                if !is_unique {
                    out.push_str(&conflict_counter.to_string());
                }
            }
            Some('I') => out.push_str(&conflict_counter.to_string()),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

/// The decoded `{"login": {...}, "options": {...}}` params of a login
/// request (spec §4.5 "Login handshake").
#[derive(Debug, Clone)]
pub struct LoginParams {
    pub user: String,
    pub password: String,
    pub login_type: LoginType,
    pub device_mount_point: Option<String>,
    pub device_id: Option<String>,
    pub idle_watchdog_timeout_secs: Option<u64>,
}

fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value.data() {
        Data::Map(map) => map.get(key),
        _ => None,
    }
}

fn as_str(value: &Value) -> Option<&str> {
    match value.data() {
        Data::String(s) => Some(s.as_str()),
        _ => None,
    }
}

fn as_uint(value: &Value) -> Option<u64> {
    match value.data() {
        Data::UInt(u) => Some(*u),
        Data::Int(i) => u64::try_from(*i).ok(),
        _ => None,
    }
}

/// Parses a login request's params `Value` into [`LoginParams`]. Returns
/// `None` if `login.user`/`login.password`/`login.type` is missing or the
/// `login.type` string isn't one of PLAIN/SHA1/TOKEN.
pub fn parse_login_params(params: &Value) -> Option<LoginParams> {
    let login = map_get(params, "login")?;
    let user = as_str(map_get(login, "user")?)?.to_string();
    let password = as_str(map_get(login, "password")?)?.to_string();
    let login_type = map_get(login, "type")
        .and_then(as_str)
        .and_then(LoginType::parse)
        .unwrap_or(LoginType::Sha1);

    let options = map_get(params, "options");
    let device = options.and_then(|o| map_get(o, "device"));
    let device_mount_point = device
        .and_then(|d| map_get(d, "mountPoint"))
        .and_then(as_str)
        .map(str::to_string);
    let device_id = device
        .and_then(|d| map_get(d, "deviceId"))
        .and_then(as_str)
        .map(str::to_string);
    let idle_watchdog_timeout_secs = options
        .and_then(|o| map_get(o, "idleWatchDogTimeOut"))
        .and_then(as_uint);

    Some(LoginParams {
        user,
        password,
        login_type,
        device_mount_point,
        device_id,
        idle_watchdog_timeout_secs,
    })
}

/// Builds the `hello` challenge body: `{"nonce": "..."}` (spec §4.5).
pub fn hello_result(nonce: &str) -> Value {
    let mut map = std::collections::BTreeMap::new();
    map.insert("nonce".to_string(), Value::from(nonce));
    Value::new(Data::Map(map))
}

/// Builds a client-side login request's params, for the broker's own
/// outbound "connect" role (spec §4.5 "Outbound (connect) peers").
pub fn login_request_params(
    user: &str,
    password_field: &str,
    login_type: LoginType,
    device_id: Option<&str>,
) -> Value {
    let mut login = std::collections::BTreeMap::new();
    login.insert("user".to_string(), Value::from(user));
    login.insert("password".to_string(), Value::from(password_field));
    let type_str = match login_type {
        LoginType::Plain => "PLAIN",
        LoginType::Sha1 => "SHA1",
        LoginType::Token => "TOKEN",
    };
    login.insert("type".to_string(), Value::from(type_str));

    let mut params = std::collections::BTreeMap::new();
    params.insert("login".to_string(), Value::new(Data::Map(login)));
    if let Some(device_id) = device_id {
        let mut device = std::collections::BTreeMap::new();
        device.insert("deviceId".to_string(), Value::from(device_id));
        let mut options = std::collections::BTreeMap::new();
        options.insert("device".to_string(), Value::new(Data::Map(device)));
        params.insert("options".to_string(), Value::new(Data::Map(options)));
    }
    Value::new(Data::Map(params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_login_params() {
        let mut login = std::collections::BTreeMap::new();
        login.insert("user".to_string(), Value::from("alice"));
        login.insert("password".to_string(), Value::from("secret"));
        login.insert("type".to_string(), Value::from("PLAIN"));
        let mut device = std::collections::BTreeMap::new();
        device.insert("mountPoint".to_string(), Value::from("test/device"));
        device.insert("deviceId".to_string(), Value::from("dev-1"));
        let mut options = std::collections::BTreeMap::new();
        options.insert("device".to_string(), Value::new(Data::Map(device)));
        options.insert("idleWatchDogTimeOut".to_string(), Value::from(60u64));
        let mut params = std::collections::BTreeMap::new();
        params.insert("login".to_string(), Value::new(Data::Map(login)));
        params.insert("options".to_string(), Value::new(Data::Map(options)));
        let params = Value::new(Data::Map(params));

        let parsed = parse_login_params(&params).unwrap();
        assert_eq!(parsed.user, "alice");
        assert_eq!(parsed.password, "secret");
        assert_eq!(parsed.login_type, LoginType::Plain);
        assert_eq!(parsed.device_mount_point.as_deref(), Some("test/device"));
        assert_eq!(parsed.device_id.as_deref(), Some("dev-1"));
        assert_eq!(parsed.idle_watchdog_timeout_secs, Some(60));
    }

    #[test]
    fn missing_login_map_fails_to_parse() {
        assert!(parse_login_params(&Value::null()).is_none());
    }

    #[test]
    fn plain_login_compares_plaintext() {
        let user = UserConfig {
            password: Some("admin!123".to_string()),
            sha1pass: None,
            role: vec!["admin".to_string()],
        };
        assert!(verify_credentials(&user, "anything", LoginType::Plain, "admin!123"));
        assert!(!verify_credentials(&user, "anything", LoginType::Plain, "wrong"));
    }

    #[test]
    fn sha1_login_matches_the_documented_formula() {
        let user = UserConfig {
            password: Some("admin!123".to_string()),
            sha1pass: None,
            role: vec!["admin".to_string()],
        };
        let nonce = "deadbeef";
        let shapass = sha1_hex(b"admin!123");
        let expected = sha1_hex(format!("{nonce}{shapass}").as_bytes());
        assert!(verify_credentials(&user, nonce, LoginType::Sha1, &expected));
    }

    #[test]
    fn autosetup_picks_first_matching_device_glob() {
        let rules = vec![
            AutosetupRule {
                device_id: vec!["sensor-*".to_string()],
                roles: vec!["device".to_string()],
                mount_point: "sensors/%d".to_string(),
                subscriptions: vec![],
            },
            AutosetupRule {
                device_id: vec![],
                roles: vec!["default".to_string()],
                mount_point: "clients/%u".to_string(),
                subscriptions: vec![],
            },
        ];
        let found = find_autosetup_rule(&rules, Some("sensor-42")).unwrap();
        assert_eq!(found.mount_point, "sensors/%d");
        let fallback = find_autosetup_rule(&rules, None).unwrap();
        assert_eq!(fallback.mount_point, "clients/%u");
    }

    #[test]
    fn mount_point_expansion_handles_all_substitutions() {
        let s = expand_mount_point("%d-%r-%u-%i-%I-%%", "dev1", &["admin".to_string()], "alice", 2, false);
        assert_eq!(s, "dev1-admin-alice-2-2-%");
        let unique = expand_mount_point("%d-%i", "dev1", &[], "alice", 0, true);
        assert_eq!(unique, "dev1-");
    }
}
