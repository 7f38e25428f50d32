//! Per-render state shared by every renderer of one page.

use std::sync::Arc;

use tidings_core::directory::{CommentInfo, Directories, PostInfo, UserInfo};
use tidings_core::error::FeedError;
use tracing::warn;
use uuid::Uuid;

use crate::batch::BatchCoordinator;
use crate::resolvers::SingleFlight;

/// Tag id marking featured posts.
pub const DEFAULT_FEATURED_TAG_ID: i64 = 57349;

/// Deployment settings the renderers need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Account shown as the sender of system notifications.
    pub official_account_id: Option<Uuid>,
    /// Tag id marking featured posts.
    pub featured_tag_id: i64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            official_account_id: None,
            featured_tag_id: DEFAULT_FEATURED_TAG_ID,
        }
    }
}

/// The barrier and entity resolvers of one page render. Created per page and
/// dropped once the page is rendered; nothing is cached across pages.
#[derive(Debug)]
pub struct PageContext {
    viewer: Uuid,
    coordinator: BatchCoordinator,
    directories: Directories,
    settings: FeedSettings,
    users: SingleFlight<Uuid, UserInfo>,
    posts: SingleFlight<i64, PostInfo>,
    comments: SingleFlight<i64, CommentInfo>,
}

impl PageContext {
    /// Creates the context for one page rendered for `viewer`.
    #[must_use]
    pub fn new(viewer: Uuid, directories: Directories, settings: FeedSettings) -> Self {
        Self {
            viewer,
            coordinator: BatchCoordinator::new(),
            directories,
            settings,
            users: SingleFlight::new(),
            posts: SingleFlight::new(),
            comments: SingleFlight::new(),
        }
    }

    /// The user the page is rendered for.
    #[must_use]
    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    /// The page's barrier.
    #[must_use]
    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.coordinator
    }

    /// Collaborator directories for local queries.
    #[must_use]
    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    /// Deployment settings.
    #[must_use]
    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    /// Resolves user profiles through the page's shared user batch.
    ///
    /// # Errors
    ///
    /// Returns the batch error if the user query failed.
    pub async fn users(&self, ids: &[Uuid]) -> Result<Vec<UserInfo>, FeedError> {
        let directory = Arc::clone(&self.directories.users);
        self.users
            .load(&self.coordinator, ids, |user| user.id, |ids| async move {
                directory.users_by_ids(&ids).await
            })
            .await
    }

    /// Resolves posts through the page's shared post batch.
    ///
    /// # Errors
    ///
    /// Returns the batch error if the post query failed.
    pub async fn posts(&self, ids: &[i64]) -> Result<Vec<PostInfo>, FeedError> {
        let directory = Arc::clone(&self.directories.posts);
        self.posts
            .load(&self.coordinator, ids, |post| post.id, |ids| async move {
                directory.posts_by_ids(&ids).await
            })
            .await
    }

    /// Resolves comments, joined with their posts, through the page's shared
    /// comment batch. The post join is one direct query per batch; if it
    /// fails the comments come back without posts.
    ///
    /// # Errors
    ///
    /// Returns the batch error if the comment query failed.
    pub async fn comments(&self, ids: &[i64]) -> Result<Vec<CommentInfo>, FeedError> {
        let comments = Arc::clone(&self.directories.comments);
        let posts = Arc::clone(&self.directories.posts);
        self.comments
            .load(&self.coordinator, ids, |comment| comment.id, |ids| async move {
                let mut rows = comments.comments_by_ids(&ids).await?;
                let mut post_ids: Vec<i64> = rows.iter().map(|c| c.post_id).collect();
                post_ids.sort_unstable();
                post_ids.dedup();
                if post_ids.is_empty() {
                    return Ok(rows);
                }
                match posts.posts_by_ids(&post_ids).await {
                    Ok(found) => {
                        for comment in &mut rows {
                            comment.post = found.iter().find(|p| p.id == comment.post_id).cloned();
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to join posts onto comments"),
                }
                Ok(rows)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::future::join_all;
    use tidings_core::directory::{CommentInfo, Directories, PostInfo};
    use tidings_test_support::InMemoryDirectory;

    use super::*;

    fn context(directory: &Arc<InMemoryDirectory>) -> PageContext {
        PageContext::new(
            Uuid::new_v4(),
            Directories::from_shared(directory.clone()),
            FeedSettings::default(),
        )
    }

    fn seed_comment(directory: &InMemoryDirectory, id: i64, post_id: i64) {
        directory.add_comment(CommentInfo {
            id,
            post_id,
            author_id: Uuid::new_v4(),
            content: format!("comment {id}"),
            parent_comment_id: None,
            post: None,
        });
    }

    #[tokio::test]
    async fn test_users_for_many_callers_use_one_query() {
        for callers in [1_usize, 5, 50] {
            // Arrange
            let directory = Arc::new(InMemoryDirectory::new());
            let users: Vec<_> = (0..callers)
                .map(|i| directory.add_user(&format!("user{i}")))
                .collect();
            let ctx = context(&directory);

            // Act
            let results =
                join_all(users.iter().map(|user| ctx.users(std::slice::from_ref(&user.id)))).await;

            // Assert
            assert_eq!(directory.query_count("users_by_ids"), 1, "callers = {callers}");
            for (user, result) in users.iter().zip(results) {
                assert_eq!(result.unwrap(), vec![user.clone()]);
            }
        }
    }

    #[tokio::test]
    async fn test_comments_are_joined_with_posts() {
        // Arrange
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_post(
            PostInfo {
                id: 10,
                title: "sunset".to_owned(),
                media: vec!["https://cdn.test/sunset.png".to_owned()],
                uniqid: "p10".to_owned(),
            },
            Uuid::new_v4(),
        );
        seed_comment(&directory, 1, 10);
        seed_comment(&directory, 2, 10);
        let ctx = context(&directory);

        // Act
        let comments = ctx.comments(&[2, 1]).await.unwrap();

        // Assert
        assert_eq!(comments.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 1]);
        assert!(comments.iter().all(|c| c.post.as_ref().is_some_and(|p| p.id == 10)));
        assert_eq!(directory.query_count("posts_by_ids"), 1);
    }

    #[tokio::test]
    async fn test_failed_post_join_keeps_comments() {
        // Arrange
        let directory = Arc::new(InMemoryDirectory::new());
        seed_comment(&directory, 1, 10);
        directory.fail("posts_by_ids");
        let ctx = context(&directory);

        // Act
        let comments = ctx.comments(&[1]).await.unwrap();

        // Assert
        assert_eq!(comments.len(), 1);
        assert!(comments[0].post.is_none());
    }

    #[tokio::test]
    async fn test_failed_user_batch_fails_every_caller() {
        // Arrange
        let directory = Arc::new(InMemoryDirectory::new());
        let alice = directory.add_user("alice");
        let bob = directory.add_user("bob");
        directory.fail("users_by_ids");
        let ctx = context(&directory);
        let (alice_ids, bob_ids) = ([alice.id], [bob.id]);

        // Act
        let (a, b) = tokio::join!(ctx.users(&alice_ids), ctx.users(&bob_ids));

        // Assert
        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(directory.query_count("users_by_ids"), 1);
    }
}
