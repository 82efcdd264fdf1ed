//! Shared message history.
//!
//! An append-only log of [`Message`]s shared by every connection task. Ids are
//! assigned by the store itself: the counter increment and the append happen
//! under one write guard, so two concurrent appends never share an id and id
//! order is append order.
//!
//! Readers take a snapshot of `Arc` handles under the read guard and release
//! it before encoding or writing anything, so a slow peer never holds the
//! store.

use std::sync::{Arc, PoisonError, RwLock};

use sixchan_proto::{Message, MessageId};

/// Outcome of a resume-from-cursor scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncBatch {
    /// Messages newer than the cursor, in id order (possibly none)
    Messages(Vec<Arc<Message>>),
    /// Cursor names an id the store has not issued yet
    CursorAhead {
        /// Newest issued id (0 when empty)
        newest: MessageId,
    },
}

/// Append-only message log.
#[derive(Debug)]
pub struct HistoryStore {
    inner: RwLock<HistoryInner>,
}

#[derive(Debug)]
struct HistoryInner {
    /// Stored in id order
    messages: Vec<Arc<Message>>,
    /// Last issued id; ids start at 1
    last_id: MessageId,
}

impl HistoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self { inner: RwLock::new(HistoryInner { messages: Vec::new(), last_id: 0 }) }
    }

    /// Append `message`, assigning the next id. Returns the stored message.
    pub fn append(&self, message: Message) -> Arc<Message> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        inner.last_id += 1;
        let stored = Arc::new(message.with_id(inner.last_id));
        inner.messages.push(Arc::clone(&stored));

        debug_assert!(
            inner.messages.windows(2).next_back().is_none_or(|w| w[0].id() < w[1].id()),
            "history ids must be strictly increasing"
        );
        stored
    }

    /// Every message with an id greater than `cursor`.
    ///
    /// `None` means the client has seen nothing and gets the whole log.
    pub fn since(&self, cursor: Option<MessageId>) -> SyncBatch {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        let Some(cursor) = cursor else {
            return SyncBatch::Messages(inner.messages.clone());
        };
        if cursor > inner.last_id {
            return SyncBatch::CursorAhead { newest: inner.last_id };
        }

        let start = inner.messages.partition_point(|m| m.id() <= cursor);
        SyncBatch::Messages(inner.messages[start..].to_vec())
    }

    /// Message with exactly `id`.
    pub fn get(&self, id: MessageId) -> Option<Arc<Message>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        inner
            .messages
            .binary_search_by_key(&id, |m| m.id())
            .ok()
            .map(|index| Arc::clone(&inner.messages[index]))
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).messages.len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(8, 30, 0)).unwrap()
    }

    fn ids(batch: &SyncBatch) -> Vec<MessageId> {
        match batch {
            SyncBatch::Messages(messages) => messages.iter().map(|m| m.id()).collect(),
            SyncBatch::CursorAhead { .. } => panic!("unexpected {batch:?}"),
        }
    }

    fn filled(n: usize) -> HistoryStore {
        let store = HistoryStore::new();
        for i in 0..n {
            store.append(Message::text(1, Bytes::from(format!("m{i}")), ts()));
        }
        store
    }

    #[test]
    fn ids_start_at_one() {
        let store = HistoryStore::new();
        assert_eq!(store.append(Message::text(1, "a", ts())).id(), 1);
        assert_eq!(store.append(Message::text(2, "b", ts())).id(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn since_none_returns_everything() {
        assert_eq!(ids(&filled(3).since(None)), vec![1, 2, 3]);
        assert_eq!(ids(&HistoryStore::new().since(None)), Vec::<MessageId>::new());
    }

    #[test]
    fn since_resumes_after_cursor() {
        let store = filled(4);
        assert_eq!(ids(&store.since(Some(0))), vec![1, 2, 3, 4]);
        assert_eq!(ids(&store.since(Some(2))), vec![3, 4]);
        assert_eq!(ids(&store.since(Some(4))), Vec::<MessageId>::new());
    }

    #[test]
    fn cursor_ahead_is_detected() {
        assert_eq!(filled(2).since(Some(9)), SyncBatch::CursorAhead { newest: 2 });
        assert_eq!(HistoryStore::new().since(Some(1)), SyncBatch::CursorAhead { newest: 0 });
    }

    #[test]
    fn get_by_id() {
        let store = filled(3);
        assert_eq!(store.get(2).map(|m| m.payload().clone()), Some(Bytes::from_static(b"m1")));
        assert!(store.get(0).is_none());
        assert!(store.get(4).is_none());
    }

    #[test]
    fn snapshot_is_stable_under_later_appends() {
        let store = filled(2);
        let before = store.since(None);
        store.append(Message::text(1, "late", ts()));
        assert_eq!(ids(&before), vec![1, 2]);
        assert_eq!(store.len(), 3);
    }
}
