//! Read-only collaborator directories.
//!
//! The feed never owns users, posts, comments, votes, follows, collections or
//! tags. It reads them through these traits, each exposing "fetch by id set"
//! plus the point lookups the gateway and renderers need.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FeedError;

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User identifier.
    pub id: Uuid,
    /// Display name.
    pub user_name: String,
    /// Avatar URL.
    pub image: Option<String>,
    /// Public handle.
    pub user_uniqid: String,
}

/// Display data of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostInfo {
    /// Post identifier.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Media URLs, thumbnail first.
    pub media: Vec<String>,
    /// Public handle.
    pub uniqid: String,
}

/// A comment, optionally joined with the post it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentInfo {
    /// Comment identifier.
    pub id: i64,
    /// Post the comment was left on.
    pub post_id: i64,
    /// Comment author.
    pub author_id: Uuid,
    /// Comment text.
    pub content: String,
    /// Parent comment for nested replies.
    pub parent_comment_id: Option<i64>,
    /// The joined post, filled by the comment resolver.
    pub post: Option<PostInfo>,
}

/// A like on a post or a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
    /// Vote identifier.
    pub id: i64,
    /// Who voted.
    pub author_id: Uuid,
    /// Liked post, if any.
    pub post_id: Option<i64>,
    /// Liked comment, if any.
    pub comment_id: Option<i64>,
}

/// One follow edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRecord {
    /// Follow identifier.
    pub id: i64,
    /// Who follows.
    pub follower: Uuid,
    /// Who is followed.
    pub following: Uuid,
}

/// Display data of a character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterInfo {
    /// Character identifier.
    pub id: i64,
    /// Name.
    pub character_name: String,
    /// Avatar URL.
    pub character_pfp: Option<String>,
    /// Public handle.
    pub character_uniqid: String,
}

/// A character collected by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    /// Collection identifier.
    pub id: i64,
    /// The collector.
    pub user_id: Uuid,
    /// Owner of the collected character.
    pub original_owner_id: Uuid,
    /// Handle of the collected character as recorded on the collection.
    pub character_uniqid: Option<String>,
    /// The joined character.
    pub character: Option<CharacterInfo>,
}

/// A tag attached to a post, joined with the post and its author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTagRecord {
    /// Post-tag identifier.
    pub id: i64,
    /// Tagged post.
    pub post_id: i64,
    /// Tag.
    pub tag_id: i64,
    /// The joined post.
    pub post: Option<PostInfo>,
    /// The joined post author.
    pub author: Option<UserInfo>,
}

/// User profiles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetches the users with the given ids. Unknown ids are skipped.
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserInfo>, FeedError>;
}

/// Posts.
#[async_trait]
pub trait PostDirectory: Send + Sync {
    /// Fetches the posts with the given ids.
    async fn posts_by_ids(&self, ids: &[i64]) -> Result<Vec<PostInfo>, FeedError>;

    /// Author of one post, `None` if the post does not exist.
    async fn post_author(&self, post_id: i64) -> Result<Option<Uuid>, FeedError>;
}

/// Comments.
#[async_trait]
pub trait CommentDirectory: Send + Sync {
    /// Fetches the comments with the given ids, without their posts.
    async fn comments_by_ids(&self, ids: &[i64]) -> Result<Vec<CommentInfo>, FeedError>;

    /// Author of one comment, `None` if the comment does not exist.
    async fn comment_author(&self, comment_id: i64) -> Result<Option<Uuid>, FeedError>;
}

/// Likes on posts and comments.
#[async_trait]
pub trait VoteDirectory: Send + Sync {
    /// Fetches the votes with the given ids.
    async fn votes_by_ids(&self, ids: &[i64]) -> Result<Vec<VoteRecord>, FeedError>;
}

/// The follow graph.
#[async_trait]
pub trait FollowDirectory: Send + Sync {
    /// Fetches the follow edges with the given ids.
    async fn follows_by_ids(&self, ids: &[i64]) -> Result<Vec<FollowRecord>, FeedError>;

    /// Whether `follower` follows `following`.
    async fn is_following(&self, follower: Uuid, following: Uuid) -> Result<bool, FeedError>;
}

/// Character collections.
#[async_trait]
pub trait CollectionDirectory: Send + Sync {
    /// Fetches the collections with the given ids, joined with characters.
    async fn collections_by_ids(&self, ids: &[i64]) -> Result<Vec<CollectionRecord>, FeedError>;

    /// Original owner of the character behind one collection.
    async fn collection_owner(&self, collection_id: i64) -> Result<Option<Uuid>, FeedError>;
}

/// Post tags and the characters they reference.
#[async_trait]
pub trait TagDirectory: Send + Sync {
    /// Fetches post-tags by id, optionally restricted to one tag.
    async fn post_tags_by_ids(
        &self,
        ids: &[i64],
        tag_id: Option<i64>,
    ) -> Result<Vec<PostTagRecord>, FeedError>;

    /// Fetches one character.
    async fn character_by_id(&self, character_id: i64) -> Result<Option<CharacterInfo>, FeedError>;
}

/// Every collaborator directory the feed reads from.
#[derive(Clone)]
pub struct Directories {
    /// User profiles.
    pub users: Arc<dyn UserDirectory>,
    /// Posts.
    pub posts: Arc<dyn PostDirectory>,
    /// Comments.
    pub comments: Arc<dyn CommentDirectory>,
    /// Votes.
    pub votes: Arc<dyn VoteDirectory>,
    /// Follow graph.
    pub follows: Arc<dyn FollowDirectory>,
    /// Collections.
    pub collections: Arc<dyn CollectionDirectory>,
    /// Tags and characters.
    pub tags: Arc<dyn TagDirectory>,
}

impl Directories {
    /// Builds the bundle from one value implementing every directory.
    pub fn from_shared<D>(directory: Arc<D>) -> Self
    where
        D: UserDirectory
            + PostDirectory
            + CommentDirectory
            + VoteDirectory
            + FollowDirectory
            + CollectionDirectory
            + TagDirectory
            + 'static,
    {
        Self {
            users: directory.clone(),
            posts: directory.clone(),
            comments: directory.clone(),
            votes: directory.clone(),
            follows: directory.clone(),
            collections: directory.clone(),
            tags: directory,
        }
    }
}

impl std::fmt::Debug for Directories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directories").finish_non_exhaustive()
    }
}
