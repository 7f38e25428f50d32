//! Test directory — an in-memory implementation of every collaborator
//! directory, with per-directory query counters and failure switches.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tidings_core::directory::{
    CharacterInfo, CollectionDirectory, CollectionRecord, CommentDirectory, CommentInfo,
    FollowDirectory, FollowRecord, PostDirectory, PostInfo, PostTagRecord, TagDirectory,
    UserDirectory, UserInfo, VoteDirectory, VoteRecord,
};
use tidings_core::error::FeedError;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserInfo>,
    posts: Vec<(PostInfo, Uuid)>,
    comments: Vec<CommentInfo>,
    votes: Vec<VoteRecord>,
    follows: Vec<FollowRecord>,
    collections: Vec<CollectionRecord>,
    post_tags: Vec<PostTagRecord>,
    characters: Vec<CharacterInfo>,
}

/// An in-memory collaborator directory.
///
/// Query counters are keyed by directory method name (`"users_by_ids"`,
/// `"posts_by_ids"`, `"comments_by_ids"`, `"votes_by_ids"`, ...). `fail`
/// makes one method return an infrastructure error.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tables: Mutex<Tables>,
    calls: Mutex<HashMap<&'static str, Vec<String>>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user profile and returns it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_user(&self, name: &str) -> UserInfo {
        let user = UserInfo {
            id: Uuid::new_v4(),
            user_name: name.to_owned(),
            image: Some(format!("https://cdn.test/{name}.png")),
            user_uniqid: format!("@{name}"),
        };
        self.tables.lock().unwrap().users.push(user.clone());
        user
    }

    /// Adds a post authored by `author`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_post(&self, post: PostInfo, author: Uuid) {
        self.tables.lock().unwrap().posts.push((post, author));
    }

    /// Adds a comment.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_comment(&self, comment: CommentInfo) {
        self.tables.lock().unwrap().comments.push(comment);
    }

    /// Adds a vote.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_vote(&self, vote: VoteRecord) {
        self.tables.lock().unwrap().votes.push(vote);
    }

    /// Adds a follow edge.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_follow(&self, follow: FollowRecord) {
        self.tables.lock().unwrap().follows.push(follow);
    }

    /// Adds a collection.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_collection(&self, collection: CollectionRecord) {
        self.tables.lock().unwrap().collections.push(collection);
    }

    /// Adds a post-tag.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_post_tag(&self, post_tag: PostTagRecord) {
        self.tables.lock().unwrap().post_tags.push(post_tag);
    }

    /// Adds a character.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_character(&self, character: CharacterInfo) {
        self.tables.lock().unwrap().characters.push(character);
    }

    /// Makes `method` fail from now on.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    /// How many times `method` was called.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn query_count(&self, method: &'static str) -> usize {
        self.calls.lock().unwrap().get(method).map_or(0, Vec::len)
    }

    /// The arguments of every call to `method`, rendered with `Debug`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn query_args(&self, method: &'static str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or_default()
    }

    async fn enter(&self, method: &'static str, args: String) -> Result<(), FeedError> {
        self.calls
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push(args);
        tokio::task::yield_now().await;
        if self.failing.lock().unwrap().contains(method) {
            return Err(FeedError::Infrastructure(format!("{method} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserInfo>, FeedError> {
        self.enter("users_by_ids", format!("{ids:?}")).await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PostDirectory for InMemoryDirectory {
    async fn posts_by_ids(&self, ids: &[i64]) -> Result<Vec<PostInfo>, FeedError> {
        self.enter("posts_by_ids", format!("{ids:?}")).await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .posts
            .iter()
            .filter(|(p, _)| ids.contains(&p.id))
            .map(|(p, _)| p.clone())
            .collect())
    }

    async fn post_author(&self, post_id: i64) -> Result<Option<Uuid>, FeedError> {
        self.enter("post_author", post_id.to_string()).await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .posts
            .iter()
            .find(|(p, _)| p.id == post_id)
            .map(|(_, author)| *author))
    }
}

#[async_trait]
impl CommentDirectory for InMemoryDirectory {
    async fn comments_by_ids(&self, ids: &[i64]) -> Result<Vec<CommentInfo>, FeedError> {
        self.enter("comments_by_ids", format!("{ids:?}")).await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .comments
            .iter()
            .filter(|c| ids.contains(&c.id))
            .map(|c| CommentInfo {
                post: None,
                ..c.clone()
            })
            .collect())
    }

    async fn comment_author(&self, comment_id: i64) -> Result<Option<Uuid>, FeedError> {
        self.enter("comment_author", comment_id.to_string()).await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .map(|c| c.author_id))
    }
}

#[async_trait]
impl VoteDirectory for InMemoryDirectory {
    async fn votes_by_ids(&self, ids: &[i64]) -> Result<Vec<VoteRecord>, FeedError> {
        self.enter("votes_by_ids", format!("{ids:?}")).await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .votes
            .iter()
            .filter(|v| ids.contains(&v.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FollowDirectory for InMemoryDirectory {
    async fn follows_by_ids(&self, ids: &[i64]) -> Result<Vec<FollowRecord>, FeedError> {
        self.enter("follows_by_ids", format!("{ids:?}")).await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .follows
            .iter()
            .filter(|f| ids.contains(&f.id))
            .cloned()
            .collect())
    }

    async fn is_following(&self, follower: Uuid, following: Uuid) -> Result<bool, FeedError> {
        self.enter("is_following", format!("{follower}->{following}"))
            .await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .follows
            .iter()
            .any(|f| f.follower == follower && f.following == following))
    }
}

#[async_trait]
impl CollectionDirectory for InMemoryDirectory {
    async fn collections_by_ids(&self, ids: &[i64]) -> Result<Vec<CollectionRecord>, FeedError> {
        self.enter("collections_by_ids", format!("{ids:?}")).await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .collections
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn collection_owner(&self, collection_id: i64) -> Result<Option<Uuid>, FeedError> {
        self.enter("collection_owner", collection_id.to_string())
            .await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .collections
            .iter()
            .find(|c| c.id == collection_id)
            .map(|c| c.original_owner_id))
    }
}

#[async_trait]
impl TagDirectory for InMemoryDirectory {
    async fn post_tags_by_ids(
        &self,
        ids: &[i64],
        tag_id: Option<i64>,
    ) -> Result<Vec<PostTagRecord>, FeedError> {
        self.enter("post_tags_by_ids", format!("{ids:?} tag={tag_id:?}"))
            .await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .post_tags
            .iter()
            .filter(|t| ids.contains(&t.id) && tag_id.is_none_or(|tag| t.tag_id == tag))
            .cloned()
            .collect())
    }

    async fn character_by_id(&self, character_id: i64) -> Result<Option<CharacterInfo>, FeedError> {
        self.enter("character_by_id", character_id.to_string())
            .await?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .characters
            .iter()
            .find(|c| c.id == character_id)
            .cloned())
    }
}
