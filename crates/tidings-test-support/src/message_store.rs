//! Test message stores — in-memory `MessageRepository` and
//! `ReadCursorRepository` implementations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tidings_core::error::FeedError;
use tidings_core::message::{
    BroadType, ContentType, DISPLAY_CAP, Message, parse_payload, payload_actor,
};
use tidings_core::repository::{MessageRepository, NewMessage, ReadCursorRepository, StoredMessage};
use uuid::Uuid;

#[derive(Debug)]
struct State {
    rows: Vec<StoredMessage>,
    cursors: HashMap<Uuid, i64>,
    next_id: i64,
}

/// An in-memory message log with the same bucketing rules as the Postgres
/// store. Every call yields once so concurrent callers interleave like they
/// would against a database. `set_failing(true)` turns every call into an
/// infrastructure error.
#[derive(Debug)]
pub struct InMemoryMessageStore {
    state: Mutex<State>,
    failing: AtomicBool,
    inserts: AtomicUsize,
    page_queries: AtomicUsize,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageStore {
    /// Creates an empty store whose first row gets id 1.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an empty store whose first row gets `first_id`.
    #[must_use]
    pub fn starting_at(first_id: i64) -> Self {
        Self {
            state: Mutex::new(State {
                rows: Vec::new(),
                cursors: HashMap::new(),
                next_id: first_id,
            }),
            failing: AtomicBool::new(false),
            inserts: AtomicUsize::new(0),
            page_queries: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Moves the id sequence forward so the next row gets `next_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn skip_to(&self, next_id: i64) {
        self.state.lock().unwrap().next_id = next_id;
    }

    /// Sets a watermark directly.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_cursor(&self, user_id: Uuid, last_read: i64) {
        self.state.lock().unwrap().cursors.insert(user_id, last_read);
    }

    /// Returns the watermark without creating one.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn cursor(&self, user_id: Uuid) -> Option<i64> {
        self.state.lock().unwrap().cursors.get(&user_id).copied()
    }

    /// Returns a snapshot of every stored row, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn rows(&self) -> Vec<StoredMessage> {
        self.state.lock().unwrap().rows.clone()
    }

    /// Number of successful inserts.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of page queries issued.
    pub fn page_query_count(&self) -> usize {
        self.page_queries.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), FeedError> {
        tokio::task::yield_now().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedError::Infrastructure("connection refused".into()));
        }
        Ok(())
    }

    fn visible_to(row: &StoredMessage, user_id: Uuid) -> bool {
        row.user_id == user_id || row.broad_type == BroadType::Broadcast
    }
}

/// Rolls raw rows up into visible notifications, newest first.
fn bucket(rows: &[&StoredMessage]) -> Vec<Message> {
    let mut groups: BTreeMap<i64, Vec<&StoredMessage>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(row.aggregate_id.unwrap_or(row.id))
            .or_default()
            .push(row);
    }

    let mut messages: Vec<Message> = groups
        .into_values()
        .map(|mut group| {
            group.sort_by(|a, b| b.id.cmp(&a.id));
            let newest = group[0];
            let top: Vec<&StoredMessage> = group.iter().take(DISPLAY_CAP).copied().collect();
            Message {
                sort_id: newest.id,
                user_id: newest.user_id,
                host_content_id: newest.host_content_id,
                content_type: newest.content_type,
                aggregate_id: newest.aggregate_id,
                top_message_ids: top.iter().map(|r| r.id).collect(),
                top_content_ids: top.iter().map(|r| r.content_id).collect(),
                other_count: i64::try_from(group.len() - top.len()).unwrap_or(i64::MAX),
                is_aggregate: newest.is_aggregate,
                payloads: top.iter().map(|r| r.payload.clone()).collect(),
                broad_type: newest.broad_type,
            }
        })
        .collect();
    messages.sort_by(|a, b| b.sort_id.cmp(&a.sort_id));
    messages
}

#[async_trait]
impl MessageRepository for InMemoryMessageStore {
    async fn insert_message(&self, message: NewMessage) -> Result<i64, FeedError> {
        self.enter().await?;
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let aggregate_id = match message.aggregate_id {
            Some(existing) => Some(existing),
            None if message.is_aggregate => Some(id),
            None => None,
        };
        state.rows.push(StoredMessage {
            id,
            user_id: message.user_id,
            content_id: message.content_id,
            host_content_id: message.host_content_id,
            content_type: message.content_type,
            aggregate_id,
            is_aggregate: message.is_aggregate,
            payload: message.payload,
            broad_type: message.broad_type,
            created_at: message.created_at,
        });
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn has_actor_message(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        actor: Uuid,
        host_content_id: Option<i64>,
    ) -> Result<bool, FeedError> {
        self.enter().await?;
        let state = self.state.lock().unwrap();
        Ok(state.rows.iter().any(|row| {
            row.user_id == user_id
                && row.content_type == content_type
                && host_content_id.is_none_or(|host| row.host_content_id == host)
                && row
                    .payload
                    .as_ref()
                    .and_then(parse_payload)
                    .and_then(|payload| payload_actor(&payload))
                    == Some(actor)
        }))
    }

    async fn latest_open_aggregate_id(
        &self,
        user_id: Uuid,
        host_content_id: i64,
        content_type: ContentType,
        after: i64,
    ) -> Result<Option<i64>, FeedError> {
        self.enter().await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .filter(|row| {
                row.user_id == user_id
                    && row.host_content_id == host_content_id
                    && row.content_type == content_type
                    && row.is_aggregate
                    && row.id > after
            })
            .max_by_key(|row| row.id)
            .and_then(|row| row.aggregate_id))
    }

    async fn count_visible_after(&self, user_id: Uuid, after: i64) -> Result<i64, FeedError> {
        self.enter().await?;
        let state = self.state.lock().unwrap();
        let count = state
            .rows
            .iter()
            .filter(|row| Self::visible_to(row, user_id) && row.id > after)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn latest_visible_id(&self, user_id: Uuid) -> Result<Option<i64>, FeedError> {
        self.enter().await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .filter(|row| Self::visible_to(row, user_id))
            .map(|row| row.id)
            .max())
    }

    async fn messages_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Message>, FeedError> {
        self.enter().await?;
        self.page_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let visible: Vec<&StoredMessage> = state
            .rows
            .iter()
            .filter(|row| Self::visible_to(row, user_id))
            .collect();
        Ok(bucket(&visible)
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn delete_by_content(
        &self,
        content_id: i64,
        content_type: ContentType,
    ) -> Result<u64, FeedError> {
        self.enter().await?;
        let mut state = self.state.lock().unwrap();
        let before = state.rows.len();
        state
            .rows
            .retain(|row| !(row.content_id == content_id && row.content_type == content_type));
        Ok((before - state.rows.len()) as u64)
    }
}

#[async_trait]
impl ReadCursorRepository for InMemoryMessageStore {
    async fn last_read(&self, user_id: Uuid) -> Result<Option<i64>, FeedError> {
        self.enter().await?;
        Ok(self.state.lock().unwrap().cursors.get(&user_id).copied())
    }

    async fn last_read_or_create(&self, user_id: Uuid) -> Result<i64, FeedError> {
        self.enter().await?;
        let mut state = self.state.lock().unwrap();
        Ok(*state.cursors.entry(user_id).or_insert(0))
    }

    async fn set_last_read(&self, user_id: Uuid, message_id: i64) -> Result<(), FeedError> {
        self.enter().await?;
        self.state
            .lock()
            .unwrap()
            .cursors
            .insert(user_id, message_id);
        Ok(())
    }
}

/// A message store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingMessageStore;

fn refused<T>() -> Result<T, FeedError> {
    Err(FeedError::Infrastructure("connection refused".into()))
}

#[async_trait]
impl MessageRepository for FailingMessageStore {
    async fn insert_message(&self, _message: NewMessage) -> Result<i64, FeedError> {
        refused()
    }

    async fn has_actor_message(
        &self,
        _user_id: Uuid,
        _content_type: ContentType,
        _actor: Uuid,
        _host_content_id: Option<i64>,
    ) -> Result<bool, FeedError> {
        refused()
    }

    async fn latest_open_aggregate_id(
        &self,
        _user_id: Uuid,
        _host_content_id: i64,
        _content_type: ContentType,
        _after: i64,
    ) -> Result<Option<i64>, FeedError> {
        refused()
    }

    async fn count_visible_after(&self, _user_id: Uuid, _after: i64) -> Result<i64, FeedError> {
        refused()
    }

    async fn latest_visible_id(&self, _user_id: Uuid) -> Result<Option<i64>, FeedError> {
        refused()
    }

    async fn messages_for_user(
        &self,
        _user_id: Uuid,
        _offset: i64,
        _limit: i64,
    ) -> Result<Vec<Message>, FeedError> {
        refused()
    }

    async fn delete_by_content(
        &self,
        _content_id: i64,
        _content_type: ContentType,
    ) -> Result<u64, FeedError> {
        refused()
    }
}

#[async_trait]
impl ReadCursorRepository for FailingMessageStore {
    async fn last_read(&self, _user_id: Uuid) -> Result<Option<i64>, FeedError> {
        refused()
    }

    async fn last_read_or_create(&self, _user_id: Uuid) -> Result<i64, FeedError> {
        refused()
    }

    async fn set_last_read(&self, _user_id: Uuid, _message_id: i64) -> Result<(), FeedError> {
        refused()
    }
}
