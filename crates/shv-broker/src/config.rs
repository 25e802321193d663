//! Broker configuration: the TOML schema in spec §6.3.
//!
//! Loaded with `toml::from_str`, then validated in a second pass — role
//! names referenced by `user.*.role`/`connect[].role`/`autosetup[].roles`
//! must exist. A config error is the one fatal-at-startup kind in spec
//! §7, surfaced here as [`ConfigError`] in the teacher's hand-rolled-enum
//! idiom (no `thiserror`).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub listen: Vec<String>,
    #[serde(default)]
    pub connect: Vec<ConnectConfig>,
    #[serde(default)]
    pub user: BTreeMap<String, UserConfig>,
    #[serde(default)]
    pub role: BTreeMap<String, RoleConfig>,
    #[serde(default)]
    pub autosetup: Vec<AutosetupRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub password: Option<String>,
    pub sha1pass: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub role: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RoleConfig {
    pub access: BTreeMap<String, Vec<String>>,
    #[serde(rename = "mountPoints")]
    pub mount_points: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectConfig {
    pub url: String,
    #[serde(default = "default_role_list", deserialize_with = "one_or_many")]
    pub role: Vec<String>,
    #[serde(rename = "mountPoint")]
    pub mount_point: Option<String>,
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutosetupRule {
    #[serde(rename = "deviceId", default, deserialize_with = "one_or_many")]
    pub device_id: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub roles: Vec<String>,
    #[serde(rename = "mountPoint")]
    pub mount_point: String,
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

fn default_role_list() -> Vec<String> {
    vec!["default".to_string()]
}

/// Accepts either a bare string or an array of strings — spec §6.3 says
/// `role` ("string or array") and `connect[].role` share this shape.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    UnknownRole { referenced_by: String, role: String },
    UnknownAccessLevel { role: String, level: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "reading config file: {e}"),
            ConfigError::Parse(e) => write!(f, "parsing config: {e}"),
            ConfigError::UnknownRole { referenced_by, role } => {
                write!(f, "{referenced_by} references undefined role {role:?}")
            }
            ConfigError::UnknownAccessLevel { role, level } => {
                write!(f, "role {role:?} uses unknown access level {level:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl BrokerConfig {
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let config: BrokerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (role_name, role) in &self.role {
            for level in role.access.keys() {
                if crate::access::AccessLevel::parse(level).is_none() {
                    return Err(ConfigError::UnknownAccessLevel {
                        role: role_name.clone(),
                        level: level.clone(),
                    });
                }
            }
        }
        for (user_name, user) in &self.user {
            for role in &user.role {
                self.require_role(&format!("user.{user_name}"), role)?;
            }
        }
        for (i, connect) in self.connect.iter().enumerate() {
            for role in &connect.role {
                self.require_role(&format!("connect[{i}]"), role)?;
            }
        }
        for (i, rule) in self.autosetup.iter().enumerate() {
            for role in &rule.roles {
                self.require_role(&format!("autosetup[{i}]"), role)?;
            }
        }
        Ok(())
    }

    fn require_role(&self, referenced_by: &str, role: &str) -> Result<(), ConfigError> {
        if self.role.contains_key(role) {
            Ok(())
        } else {
            Err(ConfigError::UnknownRole {
                referenced_by: referenced_by.to_string(),
                role: role.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let text = r#"
            listen = ["tcp://[::]:3755"]

            [user.admin]
            password = "admin!123"
            role = "admin"

            [role.admin]
            mountPoints = []
            [role.admin.access]
            su = ["**:*:*"]
        "#;
        let config = BrokerConfig::from_str(text).unwrap();
        assert_eq!(config.listen, vec!["tcp://[::]:3755".to_string()]);
        assert_eq!(config.user["admin"].role, vec!["admin".to_string()]);
    }

    #[test]
    fn rejects_reference_to_undefined_role() {
        let text = r#"
            [user.admin]
            password = "x"
            role = "nope"
        "#;
        assert!(matches!(
            BrokerConfig::from_str(text),
            Err(ConfigError::UnknownRole { .. })
        ));
    }

    #[test]
    fn accepts_role_as_array() {
        let text = r#"
            [user.admin]
            password = "x"
            role = ["a", "b"]

            [role.a]
            [role.b]
        "#;
        let config = BrokerConfig::from_str(text).unwrap();
        assert_eq!(config.user["admin"].role, vec!["a".to_string(), "b".to_string()]);
    }
}
