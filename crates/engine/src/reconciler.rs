//! Reconciler - the converged notification set of one session
//!
//! Consumes duplicated, reordered change events, snapshot pages and local
//! read marks, and always ends in the same state for the same set of facts:
//!
//! - upserts are field-wise last-write-wins, except `is_read` which is OR-ed
//! - deletes are final for the rest of the session (tombstoned)
//! - an id observed read stays read, even after it leaves the working set
//!
//! Every write path funnels through [`Reconciler::merge`].

use inbox_core::{ChangeEvent, Notification, NotificationId, UserId};
use log::{debug, warn};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Result of applying one write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// First sighting of the id
    Inserted,
    /// Known id whose stored record changed
    Updated,
    /// Known id, nothing changed (duplicate delivery)
    Unchanged,
    /// Entry removed
    Removed,
    /// Dropped: tombstoned id or foreign owner
    Ignored,
}

impl Applied {
    /// Returns true if observers need a fresh view
    pub fn changed(&self) -> bool {
        matches!(self, Applied::Inserted | Applied::Updated | Applied::Removed)
    }
}

/// Marks the reconciler revision at the moment a snapshot query was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotTicket {
    revision: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    notification: Notification,
    /// Revision of the last stream or local write; snapshot rows carry their ticket's
    revision: u64,
}

/// Deduplicated notification set for a single user
#[derive(Debug)]
pub struct Reconciler {
    user_id: UserId,
    entries: HashMap<NotificationId, Entry>,
    /// Every id seen read this session
    read: HashSet<NotificationId>,
    /// Every id deleted this session
    deleted: HashSet<NotificationId>,
    revision: u64,
    /// Presentation order, rebuilt on first read after a write
    ordered: OnceLock<Vec<Notification>>,
}

impl Reconciler {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            entries: HashMap::new(),
            read: HashSet::new(),
            deleted: HashSet::new(),
            revision: 0,
            ordered: OnceLock::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Apply a change-stream delivery
    pub fn apply(&mut self, event: &ChangeEvent) -> Applied {
        match event {
            ChangeEvent::Insert(n) | ChangeEvent::Update(n) => self.merge(n.clone()),
            ChangeEvent::Delete(id) => self.delete(*id),
        }
    }

    /// Upsert a record: last-write-wins on content, logical OR on `is_read`
    pub fn merge(&mut self, mut incoming: Notification) -> Applied {
        if incoming.user_id != self.user_id {
            warn!(
                "Ignoring notification {} owned by {} in session of {}",
                incoming.id, incoming.user_id, self.user_id
            );
            return Applied::Ignored;
        }
        if self.deleted.contains(&incoming.id) {
            debug!("Ignoring write to deleted notification {}", incoming.id);
            return Applied::Ignored;
        }

        self.settle_read(&mut incoming);
        self.revision += 1;
        let revision = self.revision;

        let applied = match self.entries.entry(incoming.id) {
            MapEntry::Vacant(slot) => {
                slot.insert(Entry {
                    notification: incoming,
                    revision,
                });
                Applied::Inserted
            }
            MapEntry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                incoming.is_read |= existing.notification.is_read;
                existing.revision = revision;
                if existing.notification == incoming {
                    Applied::Unchanged
                } else {
                    existing.notification = incoming;
                    Applied::Updated
                }
            }
        };

        if applied.changed() {
            self.invalidate();
        }
        applied
    }

    /// Remove an id for the rest of the session
    pub fn delete(&mut self, id: NotificationId) -> Applied {
        self.deleted.insert(id);
        self.revision += 1;
        if self.entries.remove(&id).is_some() {
            self.invalidate();
            Applied::Removed
        } else {
            Applied::Unchanged
        }
    }

    /// Optimistically mark one id read
    pub fn mark_read(&mut self, id: NotificationId) -> Applied {
        match self.entries.get(&id) {
            Some(entry) => {
                let mut read = entry.notification.clone();
                read.is_read = true;
                self.merge(read)
            }
            None => {
                // Not loaded yet; remembered so a later delivery arrives read
                self.read.insert(id);
                Applied::Unchanged
            }
        }
    }

    /// Optimistically mark every currently known unread entry read,
    /// returning the ids that changed
    pub fn mark_all_read(&mut self) -> Vec<NotificationId> {
        let unread: Vec<Notification> = self
            .entries
            .values()
            .filter(|e| !e.notification.is_read)
            .map(|e| e.notification.clone())
            .collect();

        let mut marked = Vec::with_capacity(unread.len());
        for mut notification in unread {
            notification.is_read = true;
            let id = notification.id;
            if self.merge(notification).changed() {
                marked.push(id);
            }
        }
        marked
    }

    /// Capture the current revision before issuing a snapshot query
    pub fn begin_snapshot(&self) -> SnapshotTicket {
        SnapshotTicket {
            revision: self.revision,
        }
    }

    /// Replace the working set with a snapshot page
    ///
    /// Rows keep `is_read = true` if the id was ever seen read locally.
    /// Entries written after `ticket` was taken but missing from the page
    /// are newer than the query, so they survive the replacement.
    pub fn apply_snapshot(&mut self, ticket: SnapshotTicket, rows: Vec<Notification>) -> usize {
        let mut next = HashMap::with_capacity(rows.len());
        for mut row in rows {
            if row.user_id != self.user_id {
                warn!(
                    "Dropping snapshot row {} owned by {} in session of {}",
                    row.id, row.user_id, self.user_id
                );
                continue;
            }
            if self.deleted.contains(&row.id) {
                continue;
            }
            self.settle_read(&mut row);
            next.insert(
                row.id,
                Entry {
                    notification: row,
                    revision: ticket.revision,
                },
            );
        }

        let mut retained = 0;
        for (id, mut entry) in self.entries.drain() {
            if entry.revision > ticket.revision {
                entry.notification.is_read |= self.read.contains(&id);
                next.insert(id, entry);
                retained += 1;
            }
        }
        if retained > 0 {
            debug!("Kept {} entries written after the snapshot query", retained);
        }

        self.entries = next;
        self.invalidate();
        self.entries.len()
    }

    // === Queries ===

    /// Entries in presentation order: `created_at` desc, then id desc
    pub fn ordered(&self) -> &[Notification] {
        self.ordered.get_or_init(|| {
            let mut rows: Vec<Notification> = self
                .entries
                .values()
                .map(|e| e.notification.clone())
                .collect();
            rows.sort_by(Notification::display_order);
            rows
        })
    }

    /// Number of unread entries, derived from the working set on every call
    pub fn unread_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| !e.notification.is_read)
            .count()
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.entries.get(&id).map(|e| &e.notification)
    }

    pub fn contains(&self, id: NotificationId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn is_deleted(&self, id: NotificationId) -> bool {
        self.deleted.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn settle_read(&mut self, notification: &mut Notification) {
        if notification.is_read {
            self.read.insert(notification.id);
        } else if self.read.contains(&notification.id) {
            notification.is_read = true;
        }
    }

    fn invalidate(&mut self) {
        self.ordered.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use inbox_core::{Metadata, Priority};
    use uuid::Uuid;

    const USER: u128 = 7;

    fn notification(id: u128, secs: i64) -> Notification {
        Notification {
            id: Uuid::from_u128(id),
            user_id: Uuid::from_u128(USER),
            kind: "event".to_string(),
            title: format!("n{}", id),
            message: "body".to_string(),
            priority: Priority::Low,
            metadata: Metadata::new(),
            is_read: false,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    fn read(mut n: Notification) -> Notification {
        n.is_read = true;
        n
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Uuid::from_u128(USER))
    }

    fn ids(r: &Reconciler) -> Vec<u128> {
        r.ordered().iter().map(|n| n.id.as_u128()).collect()
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        let mut once = reconciler();
        once.apply(&ChangeEvent::Insert(notification(1, 0)));

        let mut many = reconciler();
        assert_eq!(
            many.apply(&ChangeEvent::Insert(notification(1, 0))),
            Applied::Inserted
        );
        for _ in 0..4 {
            assert_eq!(
                many.apply(&ChangeEvent::Insert(notification(1, 0))),
                Applied::Unchanged
            );
        }

        assert_eq!(once.ordered(), many.ordered());
        assert_eq!(many.len(), 1);
        assert_eq!(many.unread_count(), 1);
    }

    #[test]
    fn test_final_state_is_order_independent() {
        let events = [
            ChangeEvent::Insert(notification(1, 0)),
            ChangeEvent::Update(read(notification(1, 0))),
            ChangeEvent::Delete(Uuid::from_u128(2)),
            ChangeEvent::Insert(notification(2, 5)),
        ];

        let mut results = Vec::new();
        for order in permutations(events.len()) {
            let mut r = reconciler();
            for i in order {
                r.apply(&events[i]);
            }
            results.push((r.ordered().to_vec(), r.unread_count()));
        }

        let (expected_rows, expected_unread) = &results[0];
        assert_eq!(expected_rows.len(), 1);
        assert!(expected_rows[0].is_read);
        assert_eq!(*expected_unread, 0);
        for (rows, unread) in &results {
            assert_eq!(rows, expected_rows);
            assert_eq!(unread, expected_unread);
        }
    }

    #[test]
    fn test_read_never_regresses() {
        let mut r = reconciler();
        r.apply(&ChangeEvent::Update(read(notification(1, 0))));
        r.apply(&ChangeEvent::Insert(notification(1, 0)));
        r.apply(&ChangeEvent::Update(notification(1, 0)));
        assert!(r.get(Uuid::from_u128(1)).unwrap().is_read);

        let ticket = r.begin_snapshot();
        r.apply_snapshot(ticket, vec![notification(1, 0)]);
        assert!(r.get(Uuid::from_u128(1)).unwrap().is_read);
        assert_eq!(r.unread_count(), 0);
    }

    #[test]
    fn test_read_survives_leaving_the_working_set() {
        let mut r = reconciler();
        r.apply(&ChangeEvent::Insert(notification(1, 0)));
        r.mark_read(Uuid::from_u128(1));

        // A page that no longer includes id 1
        let ticket = r.begin_snapshot();
        r.apply_snapshot(ticket, vec![notification(2, 5)]);
        assert!(!r.contains(Uuid::from_u128(1)));

        r.apply(&ChangeEvent::Update(notification(1, 0)));
        assert!(r.get(Uuid::from_u128(1)).unwrap().is_read);
    }

    #[test]
    fn test_mark_read_before_delivery() {
        let mut r = reconciler();
        assert_eq!(r.mark_read(Uuid::from_u128(3)), Applied::Unchanged);
        r.apply(&ChangeEvent::Insert(notification(3, 0)));
        assert_eq!(r.unread_count(), 0);
    }

    #[test]
    fn test_content_is_last_write_wins() {
        let mut r = reconciler();
        r.apply(&ChangeEvent::Insert(read(notification(1, 0))));
        let mut edited = notification(1, 0);
        edited.title = "edited".to_string();
        edited.priority = Priority::High;

        assert_eq!(r.apply(&ChangeEvent::Update(edited)), Applied::Updated);
        let stored = r.get(Uuid::from_u128(1)).unwrap();
        assert_eq!(stored.title, "edited");
        assert_eq!(stored.priority, Priority::High);
        assert!(stored.is_read);
    }

    #[test]
    fn test_delete_is_final() {
        let mut r = reconciler();
        r.apply(&ChangeEvent::Insert(notification(1, 0)));
        assert_eq!(r.apply(&ChangeEvent::Delete(Uuid::from_u128(1))), Applied::Removed);
        assert_eq!(
            r.apply(&ChangeEvent::Insert(notification(1, 0))),
            Applied::Ignored
        );

        let ticket = r.begin_snapshot();
        r.apply_snapshot(ticket, vec![notification(1, 0)]);
        assert!(r.is_empty());
        assert!(r.is_deleted(Uuid::from_u128(1)));
    }

    #[test]
    fn test_foreign_owner_is_ignored() {
        let mut r = reconciler();
        let mut foreign = notification(1, 0);
        foreign.user_id = Uuid::from_u128(99);
        assert_eq!(r.apply(&ChangeEvent::Insert(foreign.clone())), Applied::Ignored);

        let ticket = r.begin_snapshot();
        assert_eq!(r.apply_snapshot(ticket, vec![foreign]), 0);
    }

    #[test]
    fn test_snapshot_replaces_older_entries() {
        let mut r = reconciler();
        r.apply(&ChangeEvent::Insert(notification(1, 0)));
        r.apply(&ChangeEvent::Insert(notification(2, 1)));

        let ticket = r.begin_snapshot();
        let count = r.apply_snapshot(ticket, vec![notification(3, 2), notification(2, 1)]);
        assert_eq!(count, 2);
        assert_eq!(ids(&r), vec![3, 2]);
    }

    #[test]
    fn test_snapshot_keeps_writes_newer_than_query() {
        let mut r = reconciler();
        r.apply(&ChangeEvent::Insert(notification(1, 0)));

        let ticket = r.begin_snapshot();
        // Delivered while the query was in flight
        r.apply(&ChangeEvent::Insert(notification(2, 10)));
        r.apply_snapshot(ticket, vec![notification(1, 0)]);

        assert_eq!(ids(&r), vec![2, 1]);
    }

    #[test]
    fn test_ordering_ties_break_on_id_desc() {
        let mut r = reconciler();
        r.apply(&ChangeEvent::Insert(notification(1, 0)));
        r.apply(&ChangeEvent::Insert(notification(4, 3)));
        r.apply(&ChangeEvent::Insert(notification(2, 3)));
        assert_eq!(ids(&r), vec![4, 2, 1]);

        // Cached view is rebuilt after a write
        r.apply(&ChangeEvent::Insert(notification(9, 1)));
        assert_eq!(ids(&r), vec![4, 2, 9, 1]);
    }

    #[test]
    fn test_mark_all_read_returns_changed_ids() {
        let mut r = reconciler();
        r.apply(&ChangeEvent::Insert(notification(1, 0)));
        r.apply(&ChangeEvent::Insert(read(notification(2, 1))));
        r.apply(&ChangeEvent::Insert(notification(3, 2)));

        let mut marked: Vec<u128> = r.mark_all_read().iter().map(|id| id.as_u128()).collect();
        marked.sort();
        assert_eq!(marked, vec![1, 3]);
        assert_eq!(r.unread_count(), 0);
    }

    /// All orderings of `0..n` (Heap's algorithm)
    fn permutations(n: usize) -> Vec<Vec<usize>> {
        fn heap(k: usize, items: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            if k <= 1 {
                out.push(items.clone());
                return;
            }
            heap(k - 1, items, out);
            for i in 0..k - 1 {
                let swap = if k % 2 == 0 { i } else { 0 };
                items.swap(swap, k - 1);
                heap(k - 1, items, out);
            }
        }
        let mut items: Vec<usize> = (0..n).collect();
        let mut out = Vec::new();
        heap(n, &mut items, &mut out);
        out
    }
}
