//! Recipient, self-suppression, dedup and bucketing rules.
//!
//! Everything here is pure; the command handler performs the lookups these
//! rules ask for.

use tidings_core::message::ContentType;
use uuid::Uuid;

use crate::domain::commands::PushMessage;

/// Where the recipient of an event without an explicit `user_id` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerLookup {
    /// Author of the post with this id.
    PostAuthor(i64),
    /// Author of the comment with this id.
    CommentAuthor(i64),
    /// Original owner of the character behind this collection.
    CollectionOwner(i64),
}

impl OwnerLookup {
    /// The lookup that resolves the recipient of `command`, or `None` when
    /// its type has no owner rule.
    #[must_use]
    pub fn for_message(command: &PushMessage) -> Option<Self> {
        let host = command.host_content_id;
        match command.content_type {
            ContentType::Likes | ContentType::Featured => Some(Self::PostAuthor(host)),
            ContentType::Comment if command.is_comment => Some(Self::CommentAuthor(host)),
            ContentType::Comment => Some(Self::PostAuthor(host)),
            ContentType::CommentLikes | ContentType::ReplyComment => {
                Some(Self::CommentAuthor(host))
            }
            ContentType::OcCollected => Some(Self::CollectionOwner(command.content_id)),
            _ => None,
        }
    }
}

/// Whether the event would notify its own author.
///
/// True when the actor is the recipient, when nobody could be resolved and
/// the actor matches the supplied `user_id`, or when the event replies to
/// the recipient's own comment.
#[must_use]
pub fn is_self_notification(
    actor: Option<Uuid>,
    recipient: Option<Uuid>,
    requested_user: Option<Uuid>,
    reply_to_user: Option<Uuid>,
) -> bool {
    let actor_is_recipient = matches!((actor, recipient), (Some(a), Some(r)) if a == r);
    let unresolved_self = recipient.is_none() && actor == requested_user;
    let replying_to_self = reply_to_user.is_some() && reply_to_user == recipient;
    actor_is_recipient || unresolved_self || replying_to_self
}

/// How a duplicate check is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupScope {
    /// No duplicate check.
    Skip,
    /// Match on recipient, type and actor.
    AnyHost,
    /// Match on recipient, type, actor and target.
    Host(i64),
}

/// The duplicate check an event needs. Only actor-tagged events of a
/// deduplicated type are checked; `FOLLOW` ignores the target, the other
/// types need a non-zero one.
#[must_use]
pub fn dedup_scope(content_type: ContentType, host_content_id: i64, has_actor: bool) -> DedupScope {
    if !has_actor || !content_type.is_deduplicated() {
        return DedupScope::Skip;
    }
    match content_type {
        ContentType::Follow => DedupScope::AnyHost,
        _ if host_content_id != 0 => DedupScope::Host(host_content_id),
        _ => DedupScope::Skip,
    }
}

/// Whether the open-bucket lookup runs: aggregating types only, and only
/// when the producer did not pick a bucket itself.
#[must_use]
pub fn needs_bucket_lookup(content_type: ContentType, aggregate_id: Option<i64>) -> bool {
    content_type.is_aggregating() && aggregate_id.is_none()
}
