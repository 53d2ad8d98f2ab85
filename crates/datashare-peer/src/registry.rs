use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use tracing::{debug, trace};

use crate::request::{OperationKind, ProviderRef};

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Mint a process-wide request id.
///
/// Ids increase monotonically and wrap past `i32::MAX` back to 1.
pub fn new_request_id() -> i32 {
    loop {
        let id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        if id > 0 {
            return id;
        }
        let _ = NEXT_REQUEST_ID.compare_exchange(
            id.wrapping_add(1),
            1,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }
}

/// A request awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub kind: OperationKind,
    /// Key of the channel the request was sent on.
    pub channel_key: String,
    pub provider: ProviderRef,
}

/// Pending requests by id.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    pending: HashMap<i32, PendingRequest>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a sent request. Returns false if `request_id` is already pending.
    pub fn register(&mut self, request_id: i32, request: PendingRequest) -> bool {
        if self.pending.contains_key(&request_id) {
            return false;
        }
        trace!(request_id, kind = %request.kind, peer = %request.channel_key, "registered request");
        self.pending.insert(request_id, request);
        true
    }

    /// Look up a pending request without removing it.
    pub fn resolve(&self, request_id: i32) -> Option<&PendingRequest> {
        self.pending.get(&request_id)
    }

    pub fn remove(&mut self, request_id: i32) -> Option<PendingRequest> {
        self.pending.remove(&request_id)
    }

    /// Remove and return every request sent on `channel_key`, in id order.
    pub fn drain_all(&mut self, channel_key: &str) -> Vec<(i32, PendingRequest)> {
        let ids: Vec<i32> = self
            .pending
            .iter()
            .filter(|(_, request)| request.channel_key == channel_key)
            .map(|(id, _)| *id)
            .collect();
        let mut drained: Vec<(i32, PendingRequest)> = ids
            .into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|request| (id, request)))
            .collect();
        drained.sort_by_key(|(id, _)| *id);
        if !drained.is_empty() {
            debug!(peer = channel_key, count = drained.len(), "drained pending requests");
        }
        drained
    }

    pub fn contains(&self, request_id: i32) -> bool {
        self.pending.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    fn pending(kind: OperationKind, channel_key: &str) -> PendingRequest {
        PendingRequest {
            kind,
            channel_key: channel_key.to_string(),
            provider: ProviderRef::new(channel_key, "data").unwrap(),
        }
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| thread::spawn(|| (0..1000).map(|_| new_request_id()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("thread should finish") {
                assert!(id > 0);
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
    }

    #[test]
    fn ids_increase() {
        let first = new_request_id();
        let second = new_request_id();
        assert!(second > first);
    }

    #[test]
    fn resolve_does_not_remove() {
        let mut registry = RequestRegistry::new();
        assert!(registry.register(1, pending(OperationKind::Select, "p")));
        assert_eq!(registry.resolve(1).map(|r| r.kind), Some(OperationKind::Select));
        assert!(registry.contains(1));
        assert!(registry.remove(1).is_some());
        assert!(registry.resolve(1).is_none());
        assert!(registry.remove(1).is_none());
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let mut registry = RequestRegistry::new();
        assert!(registry.register(4, pending(OperationKind::Insert, "p")));
        assert!(!registry.register(4, pending(OperationKind::Delete, "p")));
        assert_eq!(registry.resolve(4).map(|r| r.kind), Some(OperationKind::Insert));
    }

    #[test]
    fn drain_takes_only_the_failed_channel() {
        let mut registry = RequestRegistry::new();
        registry.register(3, pending(OperationKind::Select, "a"));
        registry.register(1, pending(OperationKind::MapGet, "a"));
        registry.register(2, pending(OperationKind::Insert, "b"));
        registry.register(5, pending(OperationKind::Delete, "a"));

        let drained = registry.drain_all("a");
        let ids: Vec<i32> = drained.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(2));
        assert!(registry.drain_all("a").is_empty());
    }
}
