//! Message log and read-cursor store abstractions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::FeedError;
use crate::message::{BroadType, ContentType, Message};

/// A row about to be appended to the message log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    /// Recipient.
    pub user_id: Uuid,
    /// Source record that produced the event (vote, comment, follow, ...).
    pub content_id: i64,
    /// Target entity the event is about.
    pub host_content_id: i64,
    /// Kind of activity.
    pub content_type: ContentType,
    /// Existing bucket to join. `None` makes an aggregating row the anchor of
    /// a new bucket.
    pub aggregate_id: Option<i64>,
    /// Whether this row participates in rollup.
    pub is_aggregate: bool,
    /// Versioned payload, `{version, actor, ...}` when actor-tagged.
    pub payload: Option<serde_json::Value>,
    /// Audience.
    pub broad_type: BroadType,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A persisted raw row of the message log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    /// Surrogate order key.
    pub id: i64,
    /// Recipient.
    pub user_id: Uuid,
    /// Source record id.
    pub content_id: i64,
    /// Target entity id.
    pub host_content_id: i64,
    /// Kind of activity.
    pub content_type: ContentType,
    /// Bucket identifier; the anchor's own id for aggregating rows.
    pub aggregate_id: Option<i64>,
    /// Whether this row participates in rollup.
    pub is_aggregate: bool,
    /// Versioned payload.
    pub payload: Option<serde_json::Value>,
    /// Audience.
    pub broad_type: BroadType,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The append-only message log.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Appends one row and returns its id. Aggregating rows without an
    /// `aggregate_id` become the anchor of a new bucket.
    async fn insert_message(&self, message: NewMessage) -> Result<i64, FeedError>;

    /// Whether a row already exists for the recipient, type and payload actor.
    /// `host_content_id` narrows the match when given.
    async fn has_actor_message(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        actor: Uuid,
        host_content_id: Option<i64>,
    ) -> Result<bool, FeedError>;

    /// The `aggregate_id` of the newest aggregating row for the recipient,
    /// target and type whose id is strictly greater than `after`.
    async fn latest_open_aggregate_id(
        &self,
        user_id: Uuid,
        host_content_id: i64,
        content_type: ContentType,
        after: i64,
    ) -> Result<Option<i64>, FeedError>;

    /// Counts rows addressed to the user or broadcast, with id above `after`.
    async fn count_visible_after(&self, user_id: Uuid, after: i64) -> Result<i64, FeedError>;

    /// The newest id among rows addressed to the user or broadcast.
    async fn latest_visible_id(&self, user_id: Uuid) -> Result<Option<i64>, FeedError>;

    /// One page of visible notifications, newest first, with aggregate
    /// buckets rolled up.
    async fn messages_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Message>, FeedError>;

    /// Removes every row produced by one source record. Returns the number
    /// of rows removed.
    async fn delete_by_content(
        &self,
        content_id: i64,
        content_type: ContentType,
    ) -> Result<u64, FeedError>;
}

/// Per-user unread watermark.
#[async_trait]
pub trait ReadCursorRepository: Send + Sync {
    /// Current watermark, `None` if the user never read anything.
    async fn last_read(&self, user_id: Uuid) -> Result<Option<i64>, FeedError>;

    /// Current watermark, creating a zero cursor for a first-time reader.
    async fn last_read_or_create(&self, user_id: Uuid) -> Result<i64, FeedError>;

    /// Upserts the watermark.
    async fn set_last_read(&self, user_id: Uuid, message_id: i64) -> Result<(), FeedError>;
}
