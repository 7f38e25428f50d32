//! The notification message model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// Maximum number of raw events listed individually on one visible
/// notification. Everything beyond it is folded into `other_count`.
pub const DISPLAY_CAP: usize = 3;

/// Payload schema version written by the ingestion gateway.
pub const PAYLOAD_VERSION: i64 = 1;

/// Kind of activity a message reports. Persisted and serialized as its
/// numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum ContentType {
    /// Someone liked a post.
    Likes,
    /// Someone commented on a post or comment.
    Comment,
    /// Someone followed the recipient.
    Follow,
    /// Someone collected one of the recipient's characters.
    OcCollected,
    /// Someone used one of the recipient's characters in a post.
    OcUsed,
    /// A post was featured.
    Featured,
    /// Ranking notice, superseded by badge grants.
    InRanking,
    /// Announcement from the official account.
    Official,
    /// Someone liked a comment.
    CommentLikes,
    /// A badge was granted.
    BadgeEarned,
    /// A creator programme was activated.
    CppActived,
    /// The account needs to top up.
    ShouldCharge,
    /// A tag request needs attention.
    TagRequest,
    /// Someone replied to a comment.
    ReplyComment,
    /// A code this build does not know about.
    Other(i16),
}

impl ContentType {
    /// Returns the persisted numeric code.
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            Self::Likes => 1,
            Self::Comment => 2,
            Self::Follow => 3,
            Self::OcCollected => 4,
            Self::OcUsed => 5,
            Self::Featured => 6,
            Self::InRanking => 7,
            Self::Official => 8,
            Self::CommentLikes => 9,
            Self::BadgeEarned => 10,
            Self::CppActived => 11,
            Self::ShouldCharge => 12,
            Self::TagRequest => 13,
            Self::ReplyComment => 14,
            Self::Other(code) => code,
        }
    }

    /// Whether events of this type roll up into a shared bucket.
    #[must_use]
    pub fn is_aggregating(self) -> bool {
        matches!(
            self,
            Self::Likes | Self::CommentLikes | Self::Follow | Self::OcCollected
        )
    }

    /// Whether a repeated `(recipient, type, actor[, host])` event is
    /// suppressed as a duplicate.
    #[must_use]
    pub fn is_deduplicated(self) -> bool {
        matches!(self, Self::Likes | Self::CommentLikes | Self::Follow)
    }
}

impl From<i16> for ContentType {
    fn from(code: i16) -> Self {
        match code {
            1 => Self::Likes,
            2 => Self::Comment,
            3 => Self::Follow,
            4 => Self::OcCollected,
            5 => Self::OcUsed,
            6 => Self::Featured,
            7 => Self::InRanking,
            8 => Self::Official,
            9 => Self::CommentLikes,
            10 => Self::BadgeEarned,
            11 => Self::CppActived,
            12 => Self::ShouldCharge,
            13 => Self::TagRequest,
            14 => Self::ReplyComment,
            other => Self::Other(other),
        }
    }
}

impl From<ContentType> for i16 {
    fn from(content_type: ContentType) -> Self {
        content_type.code()
    }
}

/// Audience of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum BroadType {
    /// Addressed to a single recipient.
    Message,
    /// Visible to every user.
    Broadcast,
}

impl BroadType {
    /// Returns the persisted numeric code.
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            Self::Message => 1,
            Self::Broadcast => 2,
        }
    }
}

impl TryFrom<i16> for BroadType {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Message),
            2 => Ok(Self::Broadcast),
            other => Err(format!("unknown broad_type {other}")),
        }
    }
}

impl From<BroadType> for i16 {
    fn from(broad_type: BroadType) -> Self {
        broad_type.code()
    }
}

/// One visible notification as returned by the page query: a single row for
/// non-aggregating types, or the newest row of an aggregate bucket with the
/// bucket's folded ids attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Order key; the newest raw id in the bucket.
    pub sort_id: i64,
    /// Recipient.
    pub user_id: Uuid,
    /// Target entity the event is about.
    pub host_content_id: i64,
    /// Kind of activity.
    pub content_type: ContentType,
    /// Bucket identifier, `None` for non-aggregating rows.
    pub aggregate_id: Option<i64>,
    /// Newest raw message ids in the bucket, most recent first.
    pub top_message_ids: Vec<i64>,
    /// Source record ids aligned with `top_message_ids`.
    pub top_content_ids: Vec<i64>,
    /// Folded events beyond the ones listed individually.
    pub other_count: i64,
    /// Whether this type participates in rollup.
    pub is_aggregate: bool,
    /// Payloads aligned with `top_message_ids`.
    pub payloads: Vec<Option<Value>>,
    /// Audience.
    pub broad_type: BroadType,
}

impl Message {
    /// Actors recorded inline in the payloads, in payload order. Rows written
    /// before actor tagging existed yield an empty list.
    #[must_use]
    pub fn payload_actors(&self) -> Vec<Uuid> {
        self.payloads
            .iter()
            .filter_map(|raw| raw.as_ref().and_then(parse_payload))
            .filter_map(|payload| payload_actor(&payload))
            .collect()
    }

    /// The newest payload, parsed into an object.
    #[must_use]
    pub fn first_payload(&self) -> Option<Map<String, Value>> {
        self.payloads
            .first()
            .and_then(Option::as_ref)
            .and_then(parse_payload)
    }
}

/// Parses a stored payload. Objects are used as-is; strings holding JSON
/// objects are decoded; anything else is ignored.
#[must_use]
pub fn parse_payload(raw: &Value) -> Option<Map<String, Value>> {
    match raw {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "failed to parse message payload");
                None
            }
        },
        _ => None,
    }
}

/// Reads the `actor` field of a parsed payload.
#[must_use]
pub fn payload_actor(payload: &Map<String, Value>) -> Option<Uuid> {
    payload
        .get("actor")
        .and_then(Value::as_str)
        .and_then(|actor| Uuid::parse_str(actor).ok())
}

/// Merges the actor tag into a payload, keeping every other field. A
/// non-object payload is replaced.
#[must_use]
pub fn tag_actor(payload: Option<Value>, actor: Uuid) -> Value {
    let mut map = match payload {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.insert("version".to_owned(), Value::from(PAYLOAD_VERSION));
    map.insert("actor".to_owned(), Value::String(actor.to_string()));
    Value::Object(map)
}
