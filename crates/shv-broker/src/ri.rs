//! RPC Resource Identifier patterns: `path:method:signal` globs used by
//! both access rules and subscriptions (spec §3 "Subscription").
//!
//! The path component follows POSIX glob semantics (`*`, `?`) segment by
//! segment, plus `**` meaning "zero or more path segments" — the same
//! double-star convention used by `.gitignore` and most RPC broker
//! implementations in this family. The method/signal components are
//! plain single-segment globs (`*`/`?`, no `**`: there's nothing to
//! recurse into).

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RiPattern {
    path: String,
    method: String,
    signal: String,
}

impl RiPattern {
    /// Parses `path[:method[:signal]]`; omitted trailing parts default to
    /// `*` (match anything).
    pub fn parse(s: &str) -> Self {
        let mut parts = s.splitn(3, ':');
        let path = parts.next().unwrap_or("**").to_string();
        let method = parts.next().unwrap_or("*").to_string();
        let signal = parts.next().unwrap_or("*").to_string();
        Self {
            path: if path.is_empty() { "**".to_string() } else { path },
            method: if method.is_empty() { "*".to_string() } else { method },
            signal: if signal.is_empty() { "*".to_string() } else { signal },
        }
    }

    pub fn new(path: impl Into<String>, method: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            signal: signal.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn signal(&self) -> &str {
        &self.signal
    }

    pub fn matches(&self, path: &str, method: &str, signal: &str) -> bool {
        path_glob_matches(&self.path, path)
            && segment_glob_matches(&self.method, method)
            && segment_glob_matches(&self.signal, signal)
    }

    pub fn to_ri_string(&self) -> String {
        format!("{}:{}:{}", self.path, self.method, self.signal)
    }
}

/// A plain glob pattern over `/`-separated path segments, for
/// `role.*.mountPoints` and `autosetup[].deviceId` (spec §6.3) — no
/// method/signal component.
pub fn path_glob_matches(pattern: &str, path: &str) -> bool {
    let pat_segs: Vec<&str> = if pattern.is_empty() {
        Vec::new()
    } else {
        pattern.split('/').collect()
    };
    let text_segs: Vec<&str> = if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    };
    match_segments(&pat_segs, &text_segs)
}

fn match_segments(pat: &[&str], text: &[&str]) -> bool {
    match pat.first() {
        None => text.is_empty(),
        Some(&"**") => {
            if pat.len() == 1 {
                return true;
            }
            for i in 0..=text.len() {
                if match_segments(&pat[1..], &text[i..]) {
                    return true;
                }
            }
            false
        }
        Some(p) => match text.first() {
            Some(t) => segment_glob_matches(p, t) && match_segments(&pat[1..], &text[1..]),
            None => false,
        },
    }
}

/// Single-segment glob: `*` matches any run of characters, `?` matches
/// exactly one. No `/`-awareness here — callers split on `/` first.
fn segment_glob_matches(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    glob_match(&pat, &txt)
}

fn glob_match(pat: &[char], txt: &[char]) -> bool {
    match pat.first() {
        None => txt.is_empty(),
        Some('*') => {
            if pat.len() == 1 {
                return true;
            }
            for i in 0..=txt.len() {
                if glob_match(&pat[1..], &txt[i..]) {
                    return true;
                }
            }
            false
        }
        Some('?') => !txt.is_empty() && glob_match(&pat[1..], &txt[1..]),
        Some(c) => txt.first() == Some(c) && glob_match(&pat[1..], &txt[1..]),
    }
}
