//! The mount namespace: a `/`-segment trie mapping SHV path prefixes to
//! peers (spec §3 "Mount namespace"). Longest-prefix lookup and child
//! enumeration (for `ls`/`dir`) both want efficient traversal, which is
//! why this is a trie rather than a flat `Vec` scan over mount strings.

use std::collections::BTreeMap;

pub type ClientId = u64;

#[derive(Default)]
struct Node {
    children: BTreeMap<String, Node>,
    client: Option<ClientId>,
}

impl Node {
    fn is_dead(&self) -> bool {
        self.client.is_none() && self.children.is_empty()
    }
}

#[derive(Default)]
pub struct MountTree {
    root: Node,
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl MountTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grafts `client_id` at `path`. Returns `false` (no mutation) if the
    /// path is already occupied — spec §3: "Collisions at login time
    /// demount-reject the new peer".
    pub fn mount(&mut self, path: &str, client_id: ClientId) -> bool {
        let segs = segments(path);
        let mut node = &mut self.root;
        for seg in &segs {
            node = node.children.entry((*seg).to_string()).or_default();
        }
        if node.client.is_some() {
            return false;
        }
        node.client = Some(client_id);
        true
    }

    pub fn unmount(&mut self, path: &str) {
        let segs = segments(path);
        Self::unmount_rec(&mut self.root, &segs);
    }

    fn unmount_rec(node: &mut Node, segs: &[&str]) {
        match segs.split_first() {
            None => node.client = None,
            Some((head, rest)) => {
                if let Some(child) = node.children.get_mut(*head) {
                    Self::unmount_rec(child, rest);
                    if child.is_dead() {
                        node.children.remove(*head);
                    }
                }
            }
        }
    }

    /// Longest-prefix lookup. Returns `(mount_point, client_id, remainder)`
    /// where `remainder` is `path` with the mount point stripped (spec
    /// §4.5 request routing step 1: "rewrite path to P' = P with M
    /// stripped").
    pub fn lookup(&self, path: &str) -> Option<(String, ClientId, String)> {
        let segs = segments(path);
        let mut node = &self.root;
        let mut best: Option<(usize, ClientId)> = None;
        for (i, seg) in segs.iter().enumerate() {
            match node.children.get(*seg) {
                Some(child) => {
                    node = child;
                    if let Some(cid) = node.client {
                        best = Some((i + 1, cid));
                    }
                }
                None => break,
            }
        }
        best.map(|(n, cid)| {
            let mount_point = segs[..n].join("/");
            let remainder = segs[n..].join("/");
            (mount_point, cid, remainder)
        })
    }

    pub fn is_mounted(&self, path: &str) -> bool {
        let segs = segments(path);
        let mut node = &self.root;
        for seg in &segs {
            match node.children.get(*seg) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.client.is_some()
    }

    /// Immediate child segment names under `path`, for `ls`.
    pub fn children(&self, path: &str) -> Vec<String> {
        let segs = segments(path);
        let mut node = &self.root;
        for seg in &segs {
            match node.children.get(*seg) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        node.children.keys().cloned().collect()
    }

    /// All mount points currently grafted, as `(path, client_id)` pairs —
    /// backs `.broker/mounts` (spec §4.5 "broker inspection").
    pub fn all_mounts(&self) -> Vec<(String, ClientId)> {
        let mut out = Vec::new();
        Self::collect(&self.root, &mut Vec::new(), &mut out);
        out
    }

    fn collect(node: &Node, prefix: &mut Vec<String>, out: &mut Vec<(String, ClientId)>) {
        if let Some(cid) = node.client {
            out.push((prefix.join("/"), cid));
        }
        for (seg, child) in &node.children {
            prefix.push(seg.clone());
            Self::collect(child, prefix, out);
            prefix.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mounts_and_looks_up_by_longest_prefix() {
        let mut t = MountTree::new();
        assert!(t.mount("test/device", 1));
        let (mp, cid, rest) = t.lookup("test/device/track/1").unwrap();
        assert_eq!(mp, "test/device");
        assert_eq!(cid, 1);
        assert_eq!(rest, "track/1");
    }

    #[test]
    fn rejects_colliding_mount() {
        let mut t = MountTree::new();
        assert!(t.mount("test/device", 1));
        assert!(!t.mount("test/device", 2));
    }

    #[test]
    fn unmount_prunes_dead_branches() {
        let mut t = MountTree::new();
        t.mount("a/b", 1);
        t.unmount("a/b");
        assert!(t.children("a").is_empty());
        assert!(t.lookup("a/b/c").is_none());
    }

    #[test]
    fn children_lists_immediate_segments_only() {
        let mut t = MountTree::new();
        t.mount("test/device", 1);
        t.mount("other/thing", 2);
        let mut children = t.children("");
        children.sort();
        assert_eq!(children, vec!["other".to_string(), "test".to_string()]);
    }

    #[test]
    fn no_mount_above_returns_none() {
        let t = MountTree::new();
        assert!(t.lookup("nothing/here").is_none());
    }
}
