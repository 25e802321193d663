//! Access levels and roles (spec §3 "Role / Access rule", §6.3).

use std::collections::BTreeMap;

use crate::config::RoleConfig;
use crate::ri::RiPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccessLevel(pub i64);

impl AccessLevel {
    pub const BROWSE: AccessLevel = AccessLevel(1);
    pub const READ: AccessLevel = AccessLevel(8);
    pub const WRITE: AccessLevel = AccessLevel(16);
    pub const COMMAND: AccessLevel = AccessLevel(24);
    pub const CONFIG: AccessLevel = AccessLevel(32);
    pub const SERVICE: AccessLevel = AccessLevel(40);
    pub const SUPER_SERVICE: AccessLevel = AccessLevel(48);
    pub const DEVICE: AccessLevel = AccessLevel(56);
    pub const SUPERUSER: AccessLevel = AccessLevel(63);

    /// Parses the short TOML names from spec §6.3's table.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "bws" => Self::BROWSE,
            "rd" => Self::READ,
            "wr" => Self::WRITE,
            "cmd" => Self::COMMAND,
            "cfg" => Self::CONFIG,
            "srv" => Self::SERVICE,
            "ssrv" => Self::SUPER_SERVICE,
            "dev" => Self::DEVICE,
            "su" => Self::SUPERUSER,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self.0 {
            1 => "bws",
            8 => "rd",
            16 => "wr",
            24 => "cmd",
            32 => "cfg",
            40 => "srv",
            48 => "ssrv",
            56 => "dev",
            63 => "su",
            _ => "unknown",
        }
    }
}

/// A named bundle of access rules and mount-point restrictions. A peer
/// can carry several roles (spec §3: "assigned roles"); the effective
/// grant for a request is the maximum level any of them awards.
#[derive(Debug, Clone, Default)]
pub struct Role {
    pub access: BTreeMap<AccessLevel, Vec<RiPattern>>,
    pub mount_points: Vec<String>,
}

impl Role {
    /// Highest access level this role alone grants for (path, method,
    /// signal), or `None` if nothing matches.
    pub fn grant_for(&self, path: &str, method: &str, signal: &str) -> Option<AccessLevel> {
        self.access
            .iter()
            .rev()
            .find(|(_, rules)| rules.iter().any(|ri| ri.matches(path, method, signal)))
            .map(|(level, _)| *level)
    }

    pub fn allows_mount(&self, mount_point: &str) -> bool {
        self.mount_points.is_empty()
            || self
                .mount_points
                .iter()
                .any(|glob| crate::ri::path_glob_matches(glob, mount_point))
    }

    /// Builds the runtime [`Role`] from its TOML shape (spec §6.3's
    /// `role.<NAME>.access.<LEVEL> = [RI,…]` table). Access-level keys
    /// that don't parse are skipped rather than panicking — config
    /// validation already rejected those at load time, so this is a
    /// defensive fallback, not the primary check.
    pub fn from_config(cfg: &RoleConfig) -> Self {
        let mut access = BTreeMap::new();
        for (level, ris) in &cfg.access {
            if let Some(level) = AccessLevel::parse(level) {
                access.insert(level, ris.iter().map(|ri| RiPattern::parse(ri)).collect());
            }
        }
        Role {
            access,
            mount_points: cfg.mount_points.clone(),
        }
    }
}

/// Highest level across every role in `roles` for (path, method, signal)
/// — spec §3: "the assigned level ... is the maximum level across all
/// matching rules across the peer's roles".
pub fn grant_for_roles<'a>(
    roles: impl IntoIterator<Item = &'a Role>,
    path: &str,
    method: &str,
    signal: &str,
) -> Option<AccessLevel> {
    roles
        .into_iter()
        .filter_map(|r| r.grant_for(path, method, signal))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_with(level: AccessLevel, ri: &str) -> Role {
        let mut access = BTreeMap::new();
        access.insert(level, vec![RiPattern::parse(ri)]);
        Role { access, mount_points: Vec::new() }
    }

    #[test]
    fn ordering_matches_spec_table() {
        assert!(AccessLevel::BROWSE < AccessLevel::READ);
        assert!(AccessLevel::READ < AccessLevel::WRITE);
        assert!(AccessLevel::SUPER_SERVICE < AccessLevel::DEVICE);
        assert!(AccessLevel::DEVICE < AccessLevel::SUPERUSER);
    }

    #[test]
    fn grant_is_max_across_roles() {
        let a = role_with(AccessLevel::READ, "test/**:*:*");
        let b = role_with(AccessLevel::WRITE, "test/device:*:*");
        let grant = grant_for_roles([&a, &b], "test/device", "set", "chng");
        assert_eq!(grant, Some(AccessLevel::WRITE));
    }

    #[test]
    fn no_matching_rule_grants_nothing() {
        let a = role_with(AccessLevel::READ, "other/**:*:*");
        assert_eq!(grant_for_roles([&a], "test/device", "get", "chng"), None);
    }

    #[test]
    fn parses_short_names() {
        assert_eq!(AccessLevel::parse("wr"), Some(AccessLevel::WRITE));
        assert_eq!(AccessLevel::parse("bogus"), None);
    }
}
