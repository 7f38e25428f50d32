//! `PostgreSQL` implementation of the collaborator directories.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use tidings_core::directory::{
    CharacterInfo, CollectionDirectory, CollectionRecord, CommentDirectory, CommentInfo,
    FollowDirectory, FollowRecord, PostDirectory, PostInfo, PostTagRecord, TagDirectory,
    UserDirectory, UserInfo, VoteDirectory, VoteRecord,
};
use tidings_core::error::FeedError;

use crate::pg_message_store::infrastructure;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    user_name: String,
    image: Option<String>,
    user_uniqid: String,
}

impl From<UserRow> for UserInfo {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            user_name: row.user_name,
            image: row.image,
            user_uniqid: row.user_uniqid,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: i64,
    title: String,
    media: Vec<String>,
    uniqid: String,
}

impl From<PostRow> for PostInfo {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            media: row.media,
            uniqid: row.uniqid,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    author_id: Uuid,
    content: String,
    parent_comment_id: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct CollectionRow {
    id: i64,
    user_id: Uuid,
    original_owner_id: Uuid,
    character_uniqid: Option<String>,
    character_id: Option<i64>,
    character_name: Option<String>,
    character_pfp: Option<String>,
    joined_character_uniqid: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct PostTagRow {
    id: i64,
    post_id: i64,
    tag_id: i64,
    title: Option<String>,
    media: Option<Vec<String>>,
    uniqid: Option<String>,
    author_id: Option<Uuid>,
    user_name: Option<String>,
    image: Option<String>,
    user_uniqid: Option<String>,
}

impl From<PostTagRow> for PostTagRecord {
    fn from(row: PostTagRow) -> Self {
        let post = row.uniqid.map(|uniqid| PostInfo {
            id: row.post_id,
            title: row.title.unwrap_or_default(),
            media: row.media.unwrap_or_default(),
            uniqid,
        });
        let author = match (row.author_id, row.user_name, row.user_uniqid) {
            (Some(id), Some(user_name), Some(user_uniqid)) => Some(UserInfo {
                id,
                user_name,
                image: row.image,
                user_uniqid,
            }),
            _ => None,
        };
        Self {
            id: row.id,
            post_id: row.post_id,
            tag_id: row.tag_id,
            post,
            author,
        }
    }
}

/// PostgreSQL-backed reader over the collaborator tables.
#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    /// Creates a new `PgDirectory`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserInfo>, FeedError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, user_name, image, user_uniqid FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows.into_iter().map(UserInfo::from).collect())
    }
}

#[async_trait]
impl PostDirectory for PgDirectory {
    async fn posts_by_ids(&self, ids: &[i64]) -> Result<Vec<PostInfo>, FeedError> {
        let rows: Vec<PostRow> =
            sqlx::query_as("SELECT id, title, media, uniqid FROM posts WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(infrastructure)?;
        Ok(rows.into_iter().map(PostInfo::from).collect())
    }

    async fn post_author(&self, post_id: i64) -> Result<Option<Uuid>, FeedError> {
        sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)
    }
}

#[async_trait]
impl CommentDirectory for PgDirectory {
    async fn comments_by_ids(&self, ids: &[i64]) -> Result<Vec<CommentInfo>, FeedError> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            r"
            SELECT id, post_id, author_id, content, parent_comment_id
            FROM comments
            WHERE id = ANY($1)
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows
            .into_iter()
            .map(|row| CommentInfo {
                id: row.id,
                post_id: row.post_id,
                author_id: row.author_id,
                content: row.content,
                parent_comment_id: row.parent_comment_id,
                post: None,
            })
            .collect())
    }

    async fn comment_author(&self, comment_id: i64) -> Result<Option<Uuid>, FeedError> {
        sqlx::query_scalar("SELECT author_id FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)
    }
}

#[async_trait]
impl VoteDirectory for PgDirectory {
    async fn votes_by_ids(&self, ids: &[i64]) -> Result<Vec<VoteRecord>, FeedError> {
        let rows: Vec<(i64, Uuid, Option<i64>, Option<i64>)> = sqlx::query_as(
            "SELECT id, author_id, post_id, comment_id FROM votes WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows
            .into_iter()
            .map(|(id, author_id, post_id, comment_id)| VoteRecord {
                id,
                author_id,
                post_id,
                comment_id,
            })
            .collect())
    }
}

#[async_trait]
impl FollowDirectory for PgDirectory {
    async fn follows_by_ids(&self, ids: &[i64]) -> Result<Vec<FollowRecord>, FeedError> {
        let rows: Vec<(i64, Uuid, Uuid)> =
            sqlx::query_as("SELECT id, follower, following FROM follows WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(infrastructure)?;
        Ok(rows
            .into_iter()
            .map(|(id, follower, following)| FollowRecord {
                id,
                follower,
                following,
            })
            .collect())
    }

    async fn is_following(&self, follower: Uuid, following: Uuid) -> Result<bool, FeedError> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower = $1 AND following = $2)",
        )
        .bind(follower)
        .bind(following)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)
    }
}

#[async_trait]
impl CollectionDirectory for PgDirectory {
    async fn collections_by_ids(&self, ids: &[i64]) -> Result<Vec<CollectionRecord>, FeedError> {
        let rows: Vec<CollectionRow> = sqlx::query_as(
            r"
            SELECT
                cc.id, cc.user_id, cc.original_owner_id, cc.character_uniqid,
                c.id AS character_id, c.character_name, c.character_pfp,
                c.character_uniqid AS joined_character_uniqid
            FROM collected_characters cc
            LEFT JOIN characters c ON c.id = cc.character_id
            WHERE cc.id = ANY($1)
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows
            .into_iter()
            .map(|row| CollectionRecord {
                id: row.id,
                user_id: row.user_id,
                original_owner_id: row.original_owner_id,
                character_uniqid: row.character_uniqid,
                character: match (
                    row.character_id,
                    row.character_name,
                    row.joined_character_uniqid,
                ) {
                    (Some(id), Some(character_name), Some(character_uniqid)) => Some(CharacterInfo {
                        id,
                        character_name,
                        character_pfp: row.character_pfp,
                        character_uniqid,
                    }),
                    _ => None,
                },
            })
            .collect())
    }

    async fn collection_owner(&self, collection_id: i64) -> Result<Option<Uuid>, FeedError> {
        sqlx::query_scalar("SELECT original_owner_id FROM collected_characters WHERE id = $1")
            .bind(collection_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)
    }
}

#[async_trait]
impl TagDirectory for PgDirectory {
    async fn post_tags_by_ids(
        &self,
        ids: &[i64],
        tag_id: Option<i64>,
    ) -> Result<Vec<PostTagRecord>, FeedError> {
        let rows: Vec<PostTagRow> = sqlx::query_as(
            r"
            SELECT
                pt.id, pt.post_id, pt.tag_id,
                p.title, p.media, p.uniqid,
                u.id AS author_id, u.user_name, u.image, u.user_uniqid
            FROM post_tags pt
            LEFT JOIN posts p ON p.id = pt.post_id
            LEFT JOIN users u ON u.id = p.author_id
            WHERE pt.id = ANY($1)
              AND ($2::BIGINT IS NULL OR pt.tag_id = $2)
            ORDER BY pt.id
            ",
        )
        .bind(ids)
        .bind(tag_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(rows.into_iter().map(PostTagRecord::from).collect())
    }

    async fn character_by_id(&self, character_id: i64) -> Result<Option<CharacterInfo>, FeedError> {
        let row: Option<(i64, String, Option<String>, String)> = sqlx::query_as(
            r"
            SELECT id, character_name, character_pfp, character_uniqid
            FROM characters
            WHERE id = $1
            ",
        )
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(row.map(
            |(id, character_name, character_pfp, character_uniqid)| CharacterInfo {
                id,
                character_name,
                character_pfp,
                character_uniqid,
            },
        ))
    }
}
