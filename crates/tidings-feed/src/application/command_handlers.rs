//! Command handlers for the feed.

use tidings_core::command::Command;
use tidings_core::error::FeedError;
use tidings_core::repository::{MessageRepository, ReadCursorRepository};
use tracing::{info, instrument};

use crate::domain::commands::MarkAllRead;

/// Moves the reader's watermark to their newest visible message.
///
/// Succeeds without writing when the user has nothing to read. Running it
/// twice leaves the same watermark.
///
/// # Errors
///
/// Returns `FeedError::Infrastructure` if either store call fails.
#[instrument(
    skip_all,
    fields(
        command = command.command_type(),
        user_id = %command.user_id,
        correlation_id = %command.correlation_id
    )
)]
pub async fn handle_mark_all_read(
    command: &MarkAllRead,
    messages: &dyn MessageRepository,
    cursors: &dyn ReadCursorRepository,
) -> Result<(), FeedError> {
    let Some(latest) = messages.latest_visible_id(command.user_id).await? else {
        info!("no visible messages, watermark unchanged");
        return Ok(());
    };
    cursors.set_last_read(command.user_id, latest).await?;
    info!(last_read = latest, "marked all messages read");
    Ok(())
}
