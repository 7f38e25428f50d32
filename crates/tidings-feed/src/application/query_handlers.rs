//! Query handlers for the feed.
//!
//! The unread count reads the watermark (creating it on first use) and counts
//! newer visible rows. The page detail fetches one page of buckets and renders
//! every row against a single `PageContext`.

use futures_util::future::join_all;
use tidings_core::directory::Directories;
use tidings_core::error::FeedError;
use tidings_core::repository::{MessageRepository, ReadCursorRepository};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::context::{FeedSettings, PageContext};
use crate::render::{self, MessageContent};

/// Page number used when the caller gives none.
pub const DEFAULT_PAGE_NO: i64 = 1;

/// Page size used when the caller gives none.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: i64 = 100;

/// One page of a user's notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetMessageDetail {
    /// The reader.
    pub user_id: Uuid,
    /// 1-based page number.
    pub page_no: Option<i64>,
    /// Rows per page.
    pub page_size: Option<i64>,
}

impl GetMessageDetail {
    /// Resolves defaults and checks bounds, returning `(offset, limit)`.
    ///
    /// # Errors
    ///
    /// Returns `FeedError::Validation` for a page number below 1 or a page
    /// size outside `1..=100`.
    pub fn window(&self) -> Result<(i64, i64), FeedError> {
        let page_no = self.page_no.unwrap_or(DEFAULT_PAGE_NO);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_no < 1 {
            return Err(FeedError::Validation(format!(
                "pageNo must be at least 1, got {page_no}"
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(FeedError::Validation(format!(
                "pageSize must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        Ok(((page_no - 1).saturating_mul(page_size), page_size))
    }
}

/// Counts the user's unread notifications: rows addressed to them or
/// broadcast, newer than their watermark.
///
/// # Errors
///
/// Returns `FeedError::Infrastructure` if a store call fails.
#[instrument(skip(messages, cursors))]
pub async fn get_unread_message_count(
    user_id: Uuid,
    messages: &dyn MessageRepository,
    cursors: &dyn ReadCursorRepository,
) -> Result<i64, FeedError> {
    let last_read = cursors.last_read_or_create(user_id).await?;
    let count = messages.count_visible_after(user_id, last_read).await?;
    debug!(last_read, count, "counted unread messages");
    Ok(count)
}

/// Renders one page of the user's notifications, newest first.
///
/// Rows whose renderer failed come back as `None` in their position.
///
/// # Errors
///
/// Returns `FeedError::Validation` for out-of-range paging and
/// `FeedError::Infrastructure` if the page query fails.
#[instrument(skip(messages, directories, settings), fields(user_id = %query.user_id))]
pub async fn get_message_detail(
    query: &GetMessageDetail,
    messages: &dyn MessageRepository,
    directories: &Directories,
    settings: &FeedSettings,
) -> Result<Vec<Option<MessageContent>>, FeedError> {
    let (offset, limit) = query.window()?;
    let page = messages
        .messages_for_user(query.user_id, offset, limit)
        .await?;
    let ctx = PageContext::new(query.user_id, directories.clone(), settings.clone());
    let renders: Vec<_> = page.iter().map(|message| render::prepare(&ctx, message)).collect();
    let rendered = join_all(renders).await;
    debug!(
        rows = page.len(),
        rendered = rendered.iter().filter(|c| c.is_some()).count(),
        "rendered message page"
    );
    Ok(rendered)
}
