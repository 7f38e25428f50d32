//! Commands for the feed.

use tidings_core::command::Command;
use uuid::Uuid;

/// Command to move a user's watermark to their newest visible message.
#[derive(Debug, Clone)]
pub struct MarkAllRead {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The reader.
    pub user_id: Uuid,
}

impl Command for MarkAllRead {
    fn command_type(&self) -> &'static str {
        "feed.mark_all_read"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
