//! In-memory ticket storage.
//!
//! The store keeps an insertion-ordered index behind a single `RwLock` and
//! one lock per ticket. Index writes happen only on inserts; every other
//! mutation holds the index read lock just long enough to clone the slot
//! handle, so updates to distinct tickets never contend. Lock order is
//! index before slot; no path takes the index while holding a slot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{Ticket, TicketFilter, TicketId, TicketUpdate};
use crate::error::{ResolverError, Result};

/// Cached embedding for one ticket description.
#[derive(Debug, Clone)]
struct CachedEmbedding {
    /// Description revision the vector was computed from.
    revision: u64,
    /// Store-wide embedding epoch at computation time.
    epoch: u64,
    vector: Arc<[f32]>,
}

#[derive(Debug)]
struct SlotState {
    ticket: Ticket,
    revision: u64,
    embedding: Option<CachedEmbedding>,
}

#[derive(Debug)]
struct TicketSlot {
    state: RwLock<SlotState>,
}

#[derive(Debug, Default)]
struct StoreIndex {
    order: Vec<Arc<TicketSlot>>,
    by_id: HashMap<TicketId, Arc<TicketSlot>>,
}

#[derive(Debug, Default)]
struct TicketStoreInner {
    index: RwLock<StoreIndex>,
    embedding_epoch: AtomicU64,
}

/// Snapshot of a historical ticket for similarity ranking.
///
/// `embedding` is `None` when the cached vector is missing or stale.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub ticket: Ticket,
    pub revision: u64,
    pub embedding: Option<Arc<[f32]>>,
}

/// Thread-safe ticket store.
///
/// Cloning is cheap; clones share the same underlying storage.
#[derive(Debug, Clone, Default)]
pub struct TicketStore {
    inner: Arc<TicketStoreInner>,
}

impl TicketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a ticket at the end of the insertion order.
    pub fn add(&self, ticket: Ticket) -> TicketId {
        let id = ticket.id;
        let slot = Arc::new(TicketSlot {
            state: RwLock::new(SlotState {
                ticket,
                revision: 0,
                embedding: None,
            }),
        });

        let mut index = self.inner.index.write();
        if let Some(previous) = index.by_id.insert(id, Arc::clone(&slot)) {
            index.order.retain(|s| !Arc::ptr_eq(s, &previous));
        }
        index.order.push(slot);
        id
    }

    pub fn get(&self, id: TicketId) -> Result<Ticket> {
        let slot = self.slot(id)?;
        let state = slot.state.read();
        Ok(state.ticket.clone())
    }

    /// List tickets in insertion order.
    pub fn list(&self, filter: &TicketFilter) -> Vec<Ticket> {
        self.slots()
            .iter()
            .filter_map(|slot| {
                let state = slot.state.read();
                filter
                    .matches(&state.ticket)
                    .then(|| state.ticket.clone())
            })
            .collect()
    }

    /// Apply `update` to a single ticket and return the new snapshot.
    ///
    /// A description change bumps the ticket's revision and drops its
    /// cached embedding.
    pub fn update(&self, id: TicketId, update: TicketUpdate) -> Result<Ticket> {
        let slot = self.slot(id)?;
        let mut state = slot.state.write();
        if update.apply(&mut state.ticket) {
            state.revision += 1;
            state.embedding = None;
        }
        Ok(state.ticket.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.index.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current embedding epoch. Vectors cached under an older epoch are stale.
    pub fn embedding_epoch(&self) -> u64 {
        self.inner.embedding_epoch.load(Ordering::Acquire)
    }

    /// Drop every cached embedding (e.g. after the embedding model changed).
    pub fn invalidate_embeddings(&self) {
        self.inner.embedding_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Historical tickets in insertion order, with vectors cached under
    /// `epoch`.
    pub fn corpus(&self, epoch: u64) -> Vec<CorpusEntry> {
        self.slots()
            .iter()
            .filter_map(|slot| {
                let state = slot.state.read();
                if !state.ticket.is_historical() {
                    return None;
                }
                let embedding = state
                    .embedding
                    .as_ref()
                    .filter(|e| e.revision == state.revision && e.epoch == epoch)
                    .map(|e| Arc::clone(&e.vector));
                Some(CorpusEntry {
                    ticket: state.ticket.clone(),
                    revision: state.revision,
                    embedding,
                })
            })
            .collect()
    }

    /// Cache a vector computed for `revision` under `epoch`.
    ///
    /// Returns `false` (and caches nothing) when the description or the
    /// embedding epoch moved on while the vector was being computed.
    pub fn commit_embedding(
        &self,
        id: TicketId,
        revision: u64,
        epoch: u64,
        vector: Arc<[f32]>,
    ) -> bool {
        let Ok(slot) = self.slot(id) else {
            return false;
        };
        let mut state = slot.state.write();
        if state.revision != revision || self.embedding_epoch() != epoch {
            return false;
        }
        state.embedding = Some(CachedEmbedding {
            revision,
            epoch,
            vector,
        });
        true
    }

    /// Insert historical tickets whose trimmed description is not already
    /// in the corpus or earlier in `tickets`.
    ///
    /// The check and the inserts happen under one index write lock, so
    /// concurrent imports never add the same description twice. Returns
    /// `(added, duplicates)`.
    pub fn add_historical_batch(&self, tickets: Vec<Ticket>) -> (usize, usize) {
        let mut index = self.inner.index.write();
        let mut seen: HashSet<String> = index
            .order
            .iter()
            .filter_map(|slot| {
                let state = slot.state.read();
                state
                    .ticket
                    .is_historical()
                    .then(|| state.ticket.description.trim().to_string())
            })
            .collect();

        let (mut added, mut duplicates) = (0, 0);
        for ticket in tickets {
            if !seen.insert(ticket.description.trim().to_string()) {
                duplicates += 1;
                continue;
            }
            let id = ticket.id;
            let slot = Arc::new(TicketSlot {
                state: RwLock::new(SlotState {
                    ticket,
                    revision: 0,
                    embedding: None,
                }),
            });
            index.by_id.insert(id, Arc::clone(&slot));
            index.order.push(slot);
            added += 1;
        }
        (added, duplicates)
    }

    fn slot(&self, id: TicketId) -> Result<Arc<TicketSlot>> {
        self.inner
            .index
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(ResolverError::NotFound(id))
    }

    fn slots(&self) -> Vec<Arc<TicketSlot>> {
        self.inner.index.read().order.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::{Priority, TicketStatus};
    use uuid::Uuid;

    #[test]
    fn test_add_get_list_in_insertion_order() {
        let store = TicketStore::new();
        let a = store.add(Ticket::imported("A", "fix a", Priority::Low));
        let b = store.add(Ticket::submitted("B", Priority::High));
        let c = store.add(Ticket::imported("C", "fix c", Priority::High));

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(b).unwrap().description, "B");

        let ids: Vec<_> = store
            .list(&TicketFilter::default())
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![a, b, c]);

        let high: Vec<_> = store
            .list(&TicketFilter {
                status: None,
                priority: Some(Priority::High),
            })
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(high, vec![b, c]);
    }

    #[test]
    fn test_get_and_update_unknown_id() {
        let store = TicketStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id), Err(ResolverError::NotFound(x)) if x == id));
        assert!(matches!(
            store.update(id, TicketUpdate::status(TicketStatus::Pending)),
            Err(ResolverError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_returns_new_snapshot() {
        let store = TicketStore::new();
        let id = store.add(Ticket::submitted("Laptop will not boot", Priority::Medium));
        let updated = store
            .update(id, TicketUpdate::resolved_with("Replaced the battery"))
            .unwrap();
        assert_eq!(updated.status, TicketStatus::Resolved);
        assert_eq!(updated.resolution.as_deref(), Some("Replaced the battery"));
        assert_eq!(store.get(id).unwrap(), updated);
    }

    #[test]
    fn test_corpus_only_contains_historical_tickets() {
        let store = TicketStore::new();
        store.add(Ticket::submitted("new one", Priority::Medium));
        let hist = store.add(Ticket::imported("old one", "answer", Priority::Medium));

        let corpus = store.corpus(store.embedding_epoch());
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].ticket.id, hist);
        assert!(corpus[0].embedding.is_none());
    }

    #[test]
    fn test_description_change_invalidates_embedding() {
        let store = TicketStore::new();
        let id = store.add(Ticket::imported("VPN fails", "Reset router", Priority::Low));
        let epoch = store.embedding_epoch();

        assert!(store.commit_embedding(id, 0, epoch, Arc::from(vec![1.0, 0.0])));
        assert!(store.corpus(store.embedding_epoch())[0].embedding.is_some());

        // Same description: cache survives.
        store
            .update(
                id,
                TicketUpdate {
                    description: Some("VPN fails".to_string()),
                    ..TicketUpdate::default()
                },
            )
            .unwrap();
        assert!(store.corpus(store.embedding_epoch())[0].embedding.is_some());

        store
            .update(
                id,
                TicketUpdate {
                    description: Some("VPN fails on hotel wifi".to_string()),
                    ..TicketUpdate::default()
                },
            )
            .unwrap();
        let entry = &store.corpus(store.embedding_epoch())[0];
        assert!(entry.embedding.is_none());
        assert_eq!(entry.revision, 1);

        // A vector computed for the old revision is rejected.
        assert!(!store.commit_embedding(id, 0, epoch, Arc::from(vec![1.0, 0.0])));
        assert!(store.corpus(store.embedding_epoch())[0].embedding.is_none());
    }

    #[test]
    fn test_epoch_bump_drops_all_embeddings() {
        let store = TicketStore::new();
        let id = store.add(Ticket::imported("Disk full", "Clean temp", Priority::Low));
        let epoch = store.embedding_epoch();
        assert!(store.commit_embedding(id, 0, epoch, Arc::from(vec![0.5, 0.5])));

        store.invalidate_embeddings();
        assert!(store.corpus(store.embedding_epoch())[0].embedding.is_none());
        assert!(!store.commit_embedding(id, 0, epoch, Arc::from(vec![0.5, 0.5])));
    }

    #[test]
    fn test_historical_batch_skips_known_descriptions() {
        let store = TicketStore::new();
        store.add(Ticket::imported("Blue screen", "Reseat RAM", Priority::High));
        // A submitted ticket with the same text does not count.
        store.add(Ticket::submitted("Monitor flickers", Priority::Low));

        let (added, duplicates) = store.add_historical_batch(vec![
            Ticket::imported(" Blue screen ", "Replace RAM", Priority::High),
            Ticket::imported("Monitor flickers", "Update driver", Priority::Low),
            Ticket::imported("Monitor flickers", "Swap cable", Priority::Low),
        ]);
        assert_eq!((added, duplicates), (1, 2));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_concurrent_historical_batches_never_duplicate() {
        let store = TicketStore::new();
        let barrier = Arc::new(std::sync::Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let batch = (0..50)
                        .map(|i| Ticket::imported(format!("issue {i}"), "fix", Priority::Medium))
                        .collect();
                    barrier.wait();
                    store.add_historical_batch(batch)
                })
            })
            .collect();

        let (added, duplicates) = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .fold((0, 0), |acc, (a, d)| (acc.0 + a, acc.1 + d));
        assert_eq!(added, 50);
        assert_eq!(duplicates, 150);
        assert_eq!(store.corpus(store.embedding_epoch()).len(), 50);
    }

    #[test]
    fn test_concurrent_updates_on_distinct_ids_complete() {
        let store = TicketStore::new();
        let a = store.add(Ticket::submitted("first", Priority::Low));
        let b = store.add(Ticket::submitted("second", Priority::Low));

        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|id| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let status = if i % 2 == 0 {
                            TicketStatus::InProgress
                        } else {
                            TicketStatus::Pending
                        };
                        store.update(id, TicketUpdate::status(status)).unwrap();
                    }
                    store
                        .update(id, TicketUpdate::resolved_with(format!("done {id}")))
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            let ticket = handle.join().unwrap();
            assert_eq!(ticket.status, TicketStatus::Resolved);
        }
        assert_eq!(store.get(a).unwrap().resolution, Some(format!("done {a}")));
        assert_eq!(store.get(b).unwrap().resolution, Some(format!("done {b}")));
    }
}
