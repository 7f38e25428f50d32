//! `PostgreSQL` implementation of the message log and read-cursor store.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use tidings_core::error::FeedError;
use tidings_core::message::{BroadType, ContentType, DISPLAY_CAP, Message};
use tidings_core::repository::{MessageRepository, NewMessage, ReadCursorRepository};

/// Inserts a row. An aggregating row without a bucket becomes the anchor of
/// a new one by taking its own id as `aggregate_id`, in the same statement.
const INSERT_MESSAGE: &str = r"
WITH next AS (
    SELECT nextval(pg_get_serial_sequence('messages', 'id')) AS id
)
INSERT INTO messages (
    id, user_id, content_id, host_content_id, content_type,
    aggregate_id, is_aggregate, payload, broad_type, created_at
)
SELECT
    next.id, $1, $2, $3, $4,
    CASE WHEN $5::BIGINT IS NULL AND $6 THEN next.id ELSE $5::BIGINT END,
    $6, $7, $8, $9
FROM next
RETURNING id
";

const HAS_ACTOR_MESSAGE: &str = r"
SELECT EXISTS (
    SELECT 1
    FROM messages
    WHERE user_id = $1
      AND content_type = $2
      AND payload->>'actor' = $3
      AND ($4::BIGINT IS NULL OR host_content_id = $4)
)
";

const LATEST_OPEN_AGGREGATE: &str = r"
SELECT aggregate_id
FROM messages
WHERE user_id = $1
  AND host_content_id = $2
  AND content_type = $3
  AND is_aggregate
  AND id > $4
ORDER BY id DESC
LIMIT 1
";

const COUNT_VISIBLE_AFTER: &str = r"
SELECT COUNT(*)
FROM messages
WHERE (user_id = $1 OR broad_type = 2)
  AND id > $2
";

const LATEST_VISIBLE_ID: &str = r"
SELECT MAX(id)
FROM messages
WHERE user_id = $1 OR broad_type = 2
";

/// One page of visible notifications. Rows sharing `COALESCE(aggregate_id,
/// id)` form one bucket; each bucket reports its newest row plus the newest
/// `$4` raw ids, content ids and payloads.
const MESSAGES_FOR_USER: &str = r"
WITH visible AS (
    SELECT
        id, user_id, content_id, host_content_id, content_type, aggregate_id,
        is_aggregate, COALESCE(payload, 'null'::jsonb) AS payload, broad_type,
        COALESCE(aggregate_id, id) AS bucket
    FROM messages
    WHERE user_id = $1 OR broad_type = 2
),
ranked AS (
    SELECT
        visible.*,
        ROW_NUMBER() OVER (PARTITION BY bucket ORDER BY id DESC) AS rn,
        COUNT(*) OVER (PARTITION BY bucket) AS total
    FROM visible
)
SELECT
    MAX(id) AS sort_id,
    (ARRAY_AGG(user_id ORDER BY id DESC))[1] AS user_id,
    (ARRAY_AGG(host_content_id ORDER BY id DESC))[1] AS host_content_id,
    (ARRAY_AGG(content_type ORDER BY id DESC))[1] AS content_type,
    (ARRAY_AGG(aggregate_id ORDER BY id DESC))[1] AS aggregate_id,
    BOOL_OR(is_aggregate) AS is_aggregate,
    (ARRAY_AGG(broad_type ORDER BY id DESC))[1] AS broad_type,
    ARRAY_AGG(id ORDER BY id DESC) FILTER (WHERE rn <= $4) AS top_message_ids,
    ARRAY_AGG(content_id ORDER BY id DESC) FILTER (WHERE rn <= $4) AS top_content_ids,
    ARRAY_AGG(payload ORDER BY id DESC) FILTER (WHERE rn <= $4) AS payloads,
    MAX(total) - LEAST(MAX(total), $4) AS other_count
FROM ranked
GROUP BY bucket
ORDER BY sort_id DESC
OFFSET $2
LIMIT $3
";

const DELETE_BY_CONTENT: &str = r"
DELETE FROM messages
WHERE content_id = $1
  AND content_type = $2
";

const SELECT_CURSOR: &str = r"
SELECT last_read_message_id
FROM messages_read_status
WHERE user_id = $1
";

const CREATE_CURSOR: &str = r"
INSERT INTO messages_read_status (user_id, last_read_message_id)
VALUES ($1, 0)
ON CONFLICT (user_id) DO NOTHING
";

const UPSERT_CURSOR: &str = r"
INSERT INTO messages_read_status (user_id, last_read_message_id, updated_at)
VALUES ($1, $2, NOW())
ON CONFLICT (user_id)
DO UPDATE SET last_read_message_id = EXCLUDED.last_read_message_id,
              updated_at = EXCLUDED.updated_at
";

#[derive(Debug, sqlx::FromRow)]
struct BucketRow {
    sort_id: i64,
    user_id: Uuid,
    host_content_id: i64,
    content_type: i16,
    aggregate_id: Option<i64>,
    is_aggregate: bool,
    broad_type: i16,
    top_message_ids: Vec<i64>,
    top_content_ids: Vec<i64>,
    payloads: Vec<serde_json::Value>,
    other_count: i64,
}

impl TryFrom<BucketRow> for Message {
    type Error = FeedError;

    fn try_from(row: BucketRow) -> Result<Self, Self::Error> {
        Ok(Self {
            sort_id: row.sort_id,
            user_id: row.user_id,
            host_content_id: row.host_content_id,
            content_type: ContentType::from(row.content_type),
            aggregate_id: row.aggregate_id,
            top_message_ids: row.top_message_ids,
            top_content_ids: row.top_content_ids,
            other_count: row.other_count,
            is_aggregate: row.is_aggregate,
            payloads: row
                .payloads
                .into_iter()
                .map(|payload| (!payload.is_null()).then_some(payload))
                .collect(),
            broad_type: BroadType::try_from(row.broad_type).map_err(FeedError::Infrastructure)?,
        })
    }
}

pub(crate) fn infrastructure(err: sqlx::Error) -> FeedError {
    FeedError::Infrastructure(err.to_string())
}

/// PostgreSQL-backed message log and read-cursor store.
#[derive(Debug, Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    /// Creates a new `PgMessageStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageStore {
    async fn insert_message(&self, message: NewMessage) -> Result<i64, FeedError> {
        let id: i64 = sqlx::query_scalar(INSERT_MESSAGE)
            .bind(message.user_id)
            .bind(message.content_id)
            .bind(message.host_content_id)
            .bind(message.content_type.code())
            .bind(message.aggregate_id)
            .bind(message.is_aggregate)
            .bind(message.payload)
            .bind(message.broad_type.code())
            .bind(message.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)?;
        debug!(message_id = id, "message row inserted");
        Ok(id)
    }

    async fn has_actor_message(
        &self,
        user_id: Uuid,
        content_type: ContentType,
        actor: Uuid,
        host_content_id: Option<i64>,
    ) -> Result<bool, FeedError> {
        sqlx::query_scalar(HAS_ACTOR_MESSAGE)
            .bind(user_id)
            .bind(content_type.code())
            .bind(actor.to_string())
            .bind(host_content_id)
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)
    }

    async fn latest_open_aggregate_id(
        &self,
        user_id: Uuid,
        host_content_id: i64,
        content_type: ContentType,
        after: i64,
    ) -> Result<Option<i64>, FeedError> {
        let row: Option<Option<i64>> = sqlx::query_scalar(LATEST_OPEN_AGGREGATE)
            .bind(user_id)
            .bind(host_content_id)
            .bind(content_type.code())
            .bind(after)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(row.flatten())
    }

    async fn count_visible_after(&self, user_id: Uuid, after: i64) -> Result<i64, FeedError> {
        sqlx::query_scalar(COUNT_VISIBLE_AFTER)
            .bind(user_id)
            .bind(after)
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)
    }

    async fn latest_visible_id(&self, user_id: Uuid) -> Result<Option<i64>, FeedError> {
        sqlx::query_scalar(LATEST_VISIBLE_ID)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)
    }

    async fn messages_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Message>, FeedError> {
        #[allow(clippy::cast_possible_wrap)]
        let cap = DISPLAY_CAP as i64;
        let rows: Vec<BucketRow> = sqlx::query_as(MESSAGES_FOR_USER)
            .bind(user_id)
            .bind(offset)
            .bind(limit)
            .bind(cap)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn delete_by_content(
        &self,
        content_id: i64,
        content_type: ContentType,
    ) -> Result<u64, FeedError> {
        let result = sqlx::query(DELETE_BY_CONTENT)
            .bind(content_id)
            .bind(content_type.code())
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ReadCursorRepository for PgMessageStore {
    async fn last_read(&self, user_id: Uuid) -> Result<Option<i64>, FeedError> {
        sqlx::query_scalar(SELECT_CURSOR)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)
    }

    async fn last_read_or_create(&self, user_id: Uuid) -> Result<i64, FeedError> {
        sqlx::query(CREATE_CURSOR)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        sqlx::query_scalar(SELECT_CURSOR)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)
    }

    async fn set_last_read(&self, user_id: Uuid, message_id: i64) -> Result<(), FeedError> {
        sqlx::query(UPSERT_CURSOR)
            .bind(user_id)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}
