//! The producer-facing ingestion gateway.

use std::sync::Arc;

use tidings_core::clock::Clock;
use tidings_core::directory::Directories;
use tidings_core::message::ContentType;
use tidings_core::repository::{MessageRepository, ReadCursorRepository};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::application::command_handlers::{
    PushOutcome, handle_delete_message, handle_push_message,
};
use crate::domain::commands::{DeleteMessage, PushMessage};

/// Entry point for producers. `push` runs the whole ingestion pipeline on a
/// detached task so the producer's own request never waits on it.
#[derive(Clone)]
pub struct IngestionGateway {
    messages: Arc<dyn MessageRepository>,
    cursors: Arc<dyn ReadCursorRepository>,
    directories: Directories,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for IngestionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionGateway")
            .field("directories", &self.directories)
            .finish_non_exhaustive()
    }
}

impl IngestionGateway {
    /// Creates a new gateway.
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        cursors: Arc<dyn ReadCursorRepository>,
        directories: Directories,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            messages,
            cursors,
            directories,
            clock,
        }
    }

    /// Records one event on behalf of `actor` in the background.
    ///
    /// Producers normally drop the returned handle; the outcome is only
    /// reported through logs.
    pub fn push(&self, command: PushMessage, actor: Option<Uuid>) -> JoinHandle<PushOutcome> {
        let gateway = self.clone();
        tokio::spawn(async move {
            handle_push_message(
                &command,
                actor,
                gateway.clock.as_ref(),
                gateway.messages.as_ref(),
                gateway.cursors.as_ref(),
                &gateway.directories,
            )
            .await
        })
    }

    /// Removes the messages produced by one source record.
    pub async fn retract(&self, content_id: i64, content_type: ContentType) -> bool {
        let command = DeleteMessage {
            correlation_id: Uuid::new_v4(),
            content_id,
            content_type,
        };
        handle_delete_message(&command, self.messages.as_ref()).await
    }
}
