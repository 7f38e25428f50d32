//! Commands for the ingestion gateway.

use serde_json::Value;
use tidings_core::command::Command;
use tidings_core::message::{BroadType, ContentType};
use uuid::Uuid;

/// Command to record one activity event for its recipient.
#[derive(Debug, Clone)]
pub struct PushMessage {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Kind of activity.
    pub content_type: ContentType,
    /// Source record that produced the event.
    pub content_id: i64,
    /// Target entity the event is about. `0` when there is none.
    pub host_content_id: i64,
    /// Explicit recipient. When absent it is derived from the target's owner.
    pub user_id: Option<Uuid>,
    /// Audience.
    pub broad_type: BroadType,
    /// Type-specific payload.
    pub payload: Option<Value>,
    /// Author of the comment being replied to.
    pub reply_to_user_id: Option<Uuid>,
    /// Whether a `COMMENT` targets another comment rather than a post.
    pub is_comment: bool,
    /// Pre-resolved bucket; skips the open-bucket lookup.
    pub aggregate_id: Option<i64>,
}

impl PushMessage {
    /// A direct message of `content_type` with every optional field unset.
    #[must_use]
    pub fn new(content_type: ContentType, content_id: i64, host_content_id: i64) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            content_type,
            content_id,
            host_content_id,
            user_id: None,
            broad_type: BroadType::Message,
            payload: None,
            reply_to_user_id: None,
            is_comment: false,
            aggregate_id: None,
        }
    }
}

impl Command for PushMessage {
    fn command_type(&self) -> &'static str {
        "ingest.push_message"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to retract the messages a source record produced, e.g. after an
/// un-like or an un-follow.
#[derive(Debug, Clone)]
pub struct DeleteMessage {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Source record id.
    pub content_id: i64,
    /// Kind of activity the record produced.
    pub content_type: ContentType,
}

impl Command for DeleteMessage {
    fn command_type(&self) -> &'static str {
        "ingest.delete_message"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
