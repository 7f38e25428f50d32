//! Command handlers for the ingestion gateway.
//!
//! `handle_push_message` walks one event through recipient resolution,
//! self-suppression, actor tagging, dedup and bucket resolution, then appends
//! the row. Nothing here returns an error to the producer: every failure is
//! logged and reported as a `PushOutcome`.

use tidings_core::clock::Clock;
use tidings_core::command::Command;
use tidings_core::directory::Directories;
use tidings_core::error::FeedError;
use tidings_core::message::tag_actor;
use tidings_core::repository::{MessageRepository, NewMessage, ReadCursorRepository};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregation::{
    DedupScope, OwnerLookup, dedup_scope, is_self_notification, needs_bucket_lookup,
};
use crate::domain::commands::{DeleteMessage, PushMessage};

/// What happened to one pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// A row was appended with this id.
    Inserted(i64),
    /// The actor already has a message of this kind for the recipient.
    Duplicate,
    /// The event would have notified its own author.
    SelfNotification,
    /// No recipient could be determined.
    Unresolved,
    /// Recipient resolution or the insert failed.
    Failed,
}

async fn resolve_recipient(
    command: &PushMessage,
    directories: &Directories,
) -> Result<Option<Uuid>, FeedError> {
    if let Some(user_id) = command.user_id {
        return Ok(Some(user_id));
    }
    let Some(lookup) = OwnerLookup::for_message(command) else {
        return Ok(None);
    };
    let owner = match lookup {
        OwnerLookup::PostAuthor(post_id) => directories
            .posts
            .post_author(post_id)
            .await?
            .ok_or_else(|| FeedError::not_found("post", post_id)),
        OwnerLookup::CommentAuthor(comment_id) => directories
            .comments
            .comment_author(comment_id)
            .await?
            .ok_or_else(|| FeedError::not_found("comment", comment_id)),
        OwnerLookup::CollectionOwner(collection_id) => directories
            .collections
            .collection_owner(collection_id)
            .await?
            .ok_or_else(|| FeedError::not_found("collection", collection_id)),
    }?;
    Ok(Some(owner))
}

async fn is_duplicate(
    messages: &dyn MessageRepository,
    recipient: Uuid,
    command: &PushMessage,
    actor: Option<Uuid>,
) -> bool {
    let host = match dedup_scope(command.content_type, command.host_content_id, actor.is_some()) {
        DedupScope::Skip => return false,
        DedupScope::AnyHost => None,
        DedupScope::Host(host) => Some(host),
    };
    let Some(actor) = actor else {
        return false;
    };
    match messages
        .has_actor_message(recipient, command.content_type, actor, host)
        .await
    {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "duplicate check failed, assuming no duplicate");
            false
        }
    }
}

async fn open_bucket(
    messages: &dyn MessageRepository,
    cursors: &dyn ReadCursorRepository,
    recipient: Uuid,
    command: &PushMessage,
) -> Option<i64> {
    let watermark = match cursors.last_read(recipient).await {
        Ok(watermark) => watermark.unwrap_or(0),
        Err(e) => {
            warn!(error = %e, "failed to read watermark, considering every row unread");
            0
        }
    };
    match messages
        .latest_open_aggregate_id(
            recipient,
            command.host_content_id,
            command.content_type,
            watermark,
        )
        .await
    {
        Ok(bucket) => bucket,
        Err(e) => {
            warn!(error = %e, "open bucket lookup failed, starting a new bucket");
            None
        }
    }
}

/// Handles the `PushMessage` command on behalf of `actor`.
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id(),
        content_type = command.content_type.code(),
        content_id = command.content_id,
    )
)]
pub async fn handle_push_message(
    command: &PushMessage,
    actor: Option<Uuid>,
    clock: &dyn Clock,
    messages: &dyn MessageRepository,
    cursors: &dyn ReadCursorRepository,
    directories: &Directories,
) -> PushOutcome {
    let recipient = match resolve_recipient(command, directories).await {
        Ok(recipient) => recipient,
        Err(e) => {
            error!(error = %e, "failed to resolve message recipient");
            return PushOutcome::Failed;
        }
    };

    if is_self_notification(actor, recipient, command.user_id, command.reply_to_user_id) {
        debug!("dropping self-notification");
        return PushOutcome::SelfNotification;
    }

    let payload = match actor {
        Some(actor) => Some(tag_actor(command.payload.clone(), actor)),
        None => command.payload.clone(),
    };

    let Some(recipient) = recipient else {
        error!("message has no recipient");
        return PushOutcome::Unresolved;
    };

    if is_duplicate(messages, recipient, command, actor).await {
        debug!(%recipient, "dropping duplicate message");
        return PushOutcome::Duplicate;
    }

    let aggregate_id = if needs_bucket_lookup(command.content_type, command.aggregate_id) {
        open_bucket(messages, cursors, recipient, command).await
    } else {
        command.aggregate_id
    };

    let row = NewMessage {
        user_id: recipient,
        content_id: command.content_id,
        host_content_id: command.host_content_id,
        content_type: command.content_type,
        aggregate_id,
        is_aggregate: command.content_type.is_aggregating(),
        payload,
        broad_type: command.broad_type,
        created_at: clock.now(),
    };
    match messages.insert_message(row).await {
        Ok(id) => {
            info!(message_id = id, %recipient, "message pushed");
            PushOutcome::Inserted(id)
        }
        Err(e) => {
            error!(error = %e, "failed to insert message");
            PushOutcome::Failed
        }
    }
}

/// Handles the `DeleteMessage` command. Returns whether the delete went
/// through.
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id(),
        content_type = command.content_type.code(),
        content_id = command.content_id,
    )
)]
pub async fn handle_delete_message(
    command: &DeleteMessage,
    messages: &dyn MessageRepository,
) -> bool {
    match messages
        .delete_by_content(command.content_id, command.content_type)
        .await
    {
        Ok(removed) => {
            info!(removed, "messages retracted");
            true
        }
        Err(e) => {
            error!(error = %e, "failed to delete messages");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tidings_core::directory::{CollectionRecord, CommentInfo, Directories, PostInfo};
    use tidings_core::message::{ContentType, payload_actor};
    use tidings_test_support::{FixedClock, InMemoryDirectory, InMemoryMessageStore};
    use uuid::Uuid;

    use super::*;

    struct Fixture {
        store: InMemoryMessageStore,
        directory: Arc<InMemoryDirectory>,
        directories: Directories,
        clock: FixedClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_store(InMemoryMessageStore::new())
        }

        fn with_store(store: InMemoryMessageStore) -> Self {
            let directory = Arc::new(InMemoryDirectory::new());
            Self {
                store,
                directories: Directories::from_shared(directory.clone()),
                directory,
                clock: FixedClock::default(),
            }
        }

        fn post_by(&self, post_id: i64, author: Uuid) {
            self.directory.add_post(
                PostInfo {
                    id: post_id,
                    title: "sunset".to_owned(),
                    media: vec![],
                    uniqid: format!("p{post_id}"),
                },
                author,
            );
        }

        async fn push(&self, command: &PushMessage, actor: Option<Uuid>) -> PushOutcome {
            handle_push_message(
                command,
                actor,
                &self.clock,
                &self.store,
                &self.store,
                &self.directories,
            )
            .await
        }
    }

    fn like(vote_id: i64, post_id: i64) -> PushMessage {
        PushMessage::new(ContentType::Likes, vote_id, post_id)
    }

    #[tokio::test]
    async fn test_push_with_explicit_recipient_tags_actor_and_anchors_bucket() {
        // Arrange
        let fixture = Fixture::new();
        let recipient = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let command = PushMessage {
            user_id: Some(recipient),
            payload: Some(json!({ "note": "hi" })),
            ..like(1, 10)
        };

        // Act
        let outcome = fixture.push(&command, Some(actor)).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Inserted(1));
        let rows = fixture.store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, recipient);
        assert_eq!(rows[0].aggregate_id, Some(1));
        assert!(rows[0].is_aggregate);
        assert_eq!(rows[0].created_at, fixture.clock.0);
        let payload = rows[0].payload.as_ref().and_then(|p| p.as_object().cloned()).unwrap();
        assert_eq!(payload_actor(&payload), Some(actor));
        assert_eq!(payload["note"], "hi");
        assert_eq!(payload["version"], 1);
    }

    #[tokio::test]
    async fn test_push_without_actor_keeps_payload_untouched() {
        // Arrange
        let fixture = Fixture::new();
        let command = PushMessage {
            user_id: Some(Uuid::new_v4()),
            payload: Some(json!({ "badgeName": "early bird" })),
            ..PushMessage::new(ContentType::BadgeEarned, 3, 0)
        };

        // Act
        let outcome = fixture.push(&command, None).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Inserted(1));
        let rows = fixture.store.rows();
        assert_eq!(rows[0].payload, Some(json!({ "badgeName": "early bird" })));
        assert_eq!(rows[0].aggregate_id, None);
        assert!(!rows[0].is_aggregate);
    }

    #[tokio::test]
    async fn test_like_recipient_is_post_author() {
        // Arrange
        let fixture = Fixture::new();
        let author = Uuid::new_v4();
        fixture.post_by(10, author);

        // Act
        let outcome = fixture.push(&like(1, 10), Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Inserted(1));
        assert_eq!(fixture.store.rows()[0].user_id, author);
        assert_eq!(fixture.directory.query_count("post_author"), 1);
    }

    #[tokio::test]
    async fn test_nested_comment_recipient_is_comment_author() {
        // Arrange
        let fixture = Fixture::new();
        let comment_author = Uuid::new_v4();
        fixture.directory.add_comment(CommentInfo {
            id: 20,
            post_id: 10,
            author_id: comment_author,
            content: "first".to_owned(),
            parent_comment_id: None,
            post: None,
        });
        let command = PushMessage {
            is_comment: true,
            ..PushMessage::new(ContentType::Comment, 21, 20)
        };

        // Act
        let outcome = fixture.push(&command, Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Inserted(1));
        assert_eq!(fixture.store.rows()[0].user_id, comment_author);
        assert_eq!(fixture.directory.query_count("post_author"), 0);
    }

    #[tokio::test]
    async fn test_collection_recipient_is_original_owner() {
        // Arrange
        let fixture = Fixture::new();
        let owner = Uuid::new_v4();
        let collector = Uuid::new_v4();
        fixture.directory.add_collection(CollectionRecord {
            id: 4,
            user_id: collector,
            original_owner_id: owner,
            character_uniqid: None,
            character: None,
        });

        // Act
        let outcome = fixture
            .push(&PushMessage::new(ContentType::OcCollected, 4, 7), Some(collector))
            .await;

        // Assert
        assert_eq!(outcome, PushOutcome::Inserted(1));
        assert_eq!(fixture.store.rows()[0].user_id, owner);
    }

    #[tokio::test]
    async fn test_liking_own_post_is_suppressed() {
        // Arrange
        let fixture = Fixture::new();
        let author = Uuid::new_v4();
        fixture.post_by(10, author);

        // Act
        let outcome = fixture.push(&like(1, 10), Some(author)).await;

        // Assert
        assert_eq!(outcome, PushOutcome::SelfNotification);
        assert_eq!(fixture.store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_to_recipient_is_suppressed() {
        // Arrange
        let fixture = Fixture::new();
        let recipient = Uuid::new_v4();
        let command = PushMessage {
            user_id: Some(recipient),
            reply_to_user_id: Some(recipient),
            ..PushMessage::new(ContentType::ReplyComment, 5, 20)
        };

        // Act
        let outcome = fixture.push(&command, Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(outcome, PushOutcome::SelfNotification);
        assert_eq!(fixture.store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_type_without_owner_rule_and_recipient_is_unresolved() {
        // Arrange
        let fixture = Fixture::new();

        // Act
        let outcome = fixture
            .push(&PushMessage::new(ContentType::Official, 1, 0), Some(Uuid::new_v4()))
            .await;

        // Assert
        assert_eq!(outcome, PushOutcome::Unresolved);
        assert_eq!(fixture.store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_owner_lookup_failure_fails_closed() {
        // Arrange
        let fixture = Fixture::new();
        fixture.post_by(10, Uuid::new_v4());
        fixture.directory.fail("post_author");

        // Act
        let outcome = fixture.push(&like(1, 10), Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Failed);
        assert_eq!(fixture.store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_owner_fails_closed() {
        // Arrange
        let fixture = Fixture::new();

        // Act
        let outcome = fixture.push(&like(1, 404), Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Failed);
        assert_eq!(fixture.store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_like_by_same_actor_is_duplicate() {
        // Arrange
        let fixture = Fixture::new();
        fixture.post_by(10, Uuid::new_v4());
        let actor = Uuid::new_v4();
        fixture.push(&like(1, 10), Some(actor)).await;

        // Act
        let outcome = fixture.push(&like(2, 10), Some(actor)).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Duplicate);
        assert_eq!(fixture.store.insert_count(), 1);
    }

    #[tokio::test]
    async fn test_like_by_same_actor_on_other_post_is_not_duplicate() {
        // Arrange
        let fixture = Fixture::new();
        let author = Uuid::new_v4();
        fixture.post_by(10, author);
        fixture.post_by(11, author);
        let actor = Uuid::new_v4();
        fixture.push(&like(1, 10), Some(actor)).await;

        // Act
        let outcome = fixture.push(&like(2, 11), Some(actor)).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Inserted(2));
    }

    #[tokio::test]
    async fn test_follow_dedup_ignores_target() {
        // Arrange
        let fixture = Fixture::new();
        let recipient = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let first = PushMessage {
            user_id: Some(recipient),
            ..PushMessage::new(ContentType::Follow, 1, 0)
        };
        let second = PushMessage {
            user_id: Some(recipient),
            ..PushMessage::new(ContentType::Follow, 2, 99)
        };
        fixture.push(&first, Some(actor)).await;

        // Act
        let outcome = fixture.push(&second, Some(actor)).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_aggregation_restarts_after_watermark() {
        // Arrange
        let fixture = Fixture::with_store(InMemoryMessageStore::starting_at(11));
        let author = Uuid::new_v4();
        fixture.post_by(10, author);
        fixture.store.set_cursor(author, 10);

        // Act
        let mut outcomes = Vec::new();
        for vote_id in 1..=3 {
            outcomes.push(fixture.push(&like(vote_id, 10), Some(Uuid::new_v4())).await);
        }
        fixture.store.set_cursor(author, 13);
        let after_read = fixture.push(&like(4, 10), Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(
            outcomes,
            vec![
                PushOutcome::Inserted(11),
                PushOutcome::Inserted(12),
                PushOutcome::Inserted(13)
            ]
        );
        assert_eq!(after_read, PushOutcome::Inserted(14));
        let buckets: Vec<Option<i64>> = fixture
            .store
            .rows()
            .iter()
            .map(|row| row.aggregate_id)
            .collect();
        assert_eq!(buckets, vec![Some(11), Some(11), Some(11), Some(14)]);
    }

    #[tokio::test]
    async fn test_pre_supplied_bucket_is_kept() {
        // Arrange
        let fixture = Fixture::new();
        let command = PushMessage {
            user_id: Some(Uuid::new_v4()),
            aggregate_id: Some(77),
            ..PushMessage::new(ContentType::Follow, 1, 0)
        };

        // Act
        let outcome = fixture.push(&command, None).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Inserted(1));
        assert_eq!(fixture.store.rows()[0].aggregate_id, Some(77));
    }

    #[tokio::test]
    async fn test_store_failures_are_swallowed() {
        // Arrange
        let fixture = Fixture::new();
        fixture.store.set_failing(true);
        let command = PushMessage {
            user_id: Some(Uuid::new_v4()),
            ..like(1, 10)
        };

        // Act
        let outcome = fixture.push(&command, Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(outcome, PushOutcome::Failed);
        assert!(fixture.store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_rows_of_the_source_record() {
        // Arrange
        let fixture = Fixture::new();
        let recipient = Uuid::new_v4();
        for content_id in [1, 2] {
            let command = PushMessage {
                user_id: Some(recipient),
                ..PushMessage::new(ContentType::Comment, content_id, 10)
            };
            fixture.push(&command, None).await;
        }
        let command = DeleteMessage {
            correlation_id: Uuid::new_v4(),
            content_id: 1,
            content_type: ContentType::Comment,
        };

        // Act
        let deleted = handle_delete_message(&command, &fixture.store).await;

        // Assert
        assert!(deleted);
        let remaining: Vec<i64> = fixture.store.rows().iter().map(|r| r.content_id).collect();
        assert_eq!(remaining, vec![2]);
    }

    #[tokio::test]
    async fn test_delete_failure_returns_false() {
        // Arrange
        let store = tidings_test_support::FailingMessageStore;
        let command = DeleteMessage {
            correlation_id: Uuid::new_v4(),
            content_id: 1,
            content_type: ContentType::Likes,
        };

        // Act
        let deleted = handle_delete_message(&command, &store).await;

        // Assert
        assert!(!deleted);
    }
}
