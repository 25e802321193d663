//! The pending-request table: tracks in-flight requests so a response
//! (or a destination disconnect, or a timeout) can be routed back to the
//! peer that originated it (spec §4.5 "Request routing").

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::peer::ClientId;

/// Soft deadline for a pending request before the broker answers
/// `MethodCallException "timeout"` on its own (spec §5 "Cancellation and
/// timeout").
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub origin_client_id: ClientId,
    pub origin_request_id: i64,
    pub origin_caller_ids: Vec<u64>,
    pub deadline: Instant,
}

/// Keyed by `(destination_client_id, request_id_on_destination)` — the
/// request id the broker minted for the forwarded request, not the
/// origin's own id.
#[derive(Default)]
pub struct PendingTable {
    entries: HashMap<(ClientId, i64), PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        destination: ClientId,
        request_id_on_destination: i64,
        entry: PendingEntry,
    ) {
        self.entries.insert((destination, request_id_on_destination), entry);
    }

    pub fn take(&mut self, destination: ClientId, request_id_on_destination: i64) -> Option<PendingEntry> {
        self.entries.remove(&(destination, request_id_on_destination))
    }

    /// Removes and returns every entry addressed to `destination` —
    /// used when that peer disconnects with requests still outstanding
    /// (spec §4.5 "If D disconnects ... deliver MethodCallException").
    pub fn drain_destination(&mut self, destination: ClientId) -> Vec<PendingEntry> {
        let keys: Vec<_> = self
            .entries
            .keys()
            .filter(|(dest, _)| *dest == destination)
            .cloned()
            .collect();
        keys.into_iter().filter_map(|k| self.entries.remove(&k)).collect()
    }

    /// Removes and returns every entry that originated from `origin` —
    /// used when the *source* peer disconnects (spec §7 "source
    /// disconnected").
    pub fn drain_origin(&mut self, origin: ClientId) -> Vec<(ClientId, i64)> {
        let keys: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.origin_client_id == origin)
            .map(|(k, _)| *k)
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        keys
    }

    /// Removes and returns every entry past its deadline, for the
    /// router's periodic timeout sweep.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<((ClientId, i64), PendingEntry)> {
        let expired: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(k, _)| *k)
            .collect();
        expired
            .into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|e| (k, e)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(origin: ClientId) -> PendingEntry {
        PendingEntry {
            origin_client_id: origin,
            origin_request_id: 1,
            origin_caller_ids: vec![],
            deadline: Instant::now() + Duration::from_secs(30),
        }
    }

    #[test]
    fn insert_and_take_round_trips() {
        let mut table = PendingTable::new();
        table.insert(5, 10, entry(1));
        let taken = table.take(5, 10).unwrap();
        assert_eq!(taken.origin_client_id, 1);
        assert!(table.take(5, 10).is_none());
    }

    #[test]
    fn drain_destination_collects_all_matching_entries() {
        let mut table = PendingTable::new();
        table.insert(5, 1, entry(1));
        table.insert(5, 2, entry(2));
        table.insert(6, 1, entry(3));
        let drained = table.drain_destination(5);
        assert_eq!(drained.len(), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn drain_origin_collects_requests_from_that_source() {
        let mut table = PendingTable::new();
        table.insert(5, 1, entry(9));
        table.insert(6, 1, entry(9));
        table.insert(7, 1, entry(10));
        let drained = table.drain_origin(9);
        assert_eq!(drained.len(), 2);
        assert_eq!(table.len(), 1);
    }
}
