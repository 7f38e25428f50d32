//! Content renderers.
//!
//! One renderer per content type turns a bucketed `Message` into the
//! `MessageContent` the client displays. `prepare` does the synchronous part
//! of every renderer (payload parsing, barrier registration) so that all
//! renderers of a page are registered before any resolver batch can fire.

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join};
use serde::Serialize;
use serde_json::Value;
use tidings_core::directory::{PostInfo, UserInfo, VoteRecord};
use tidings_core::error::FeedError;
use tidings_core::message::{ContentType, Message};
use tracing::{error, warn};
use uuid::Uuid;

use crate::batch::Ticket;
use crate::context::PageContext;

/// One user shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageUser {
    /// User identifier.
    pub user_id: Uuid,
    /// Display name.
    pub user_name: String,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Public handle.
    pub user_uniqid: String,
}

impl From<&UserInfo> for MessageUser {
    fn from(user: &UserInfo) -> Self {
        Self {
            user_id: user.id,
            user_name: user.user_name.clone(),
            avatar_url: user.image.clone(),
            user_uniqid: user.user_uniqid.clone(),
        }
    }
}

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageContent {
    /// The notification's sort id.
    pub id: i64,
    /// Content type the notification is displayed as.
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// Comment text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Thumbnail of the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_thumbnail: Option<String>,
    /// Folded events beyond the users shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_count: Option<i64>,
    /// Title of the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_content_title: Option<String>,
    /// Public handle of the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_content_uniqid: Option<String>,
    /// Whether a comment notification is about a nested reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_comment: Option<bool>,
    /// Raw payload of system notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Whether the viewer already follows the first follower.
    #[serde(rename = "isFollowedByMe", skip_serializing_if = "Option::is_none")]
    pub is_followed_by_me: Option<bool>,
    /// Users shown on the notification.
    pub users: Vec<MessageUser>,
}

impl MessageContent {
    fn new(message: &Message, content_type: ContentType, users: &[UserInfo]) -> Self {
        Self {
            id: message.sort_id,
            content_type,
            content: None,
            host_thumbnail: None,
            other_count: Some(message.other_count),
            host_content_title: None,
            host_content_uniqid: None,
            is_comment: None,
            payload: None,
            is_followed_by_me: None,
            users: users.iter().map(MessageUser::from).collect(),
        }
    }

    fn with_post(mut self, post: Option<&PostInfo>) -> Self {
        if let Some(post) = post {
            self.host_content_title = Some(post.title.clone());
            self.host_thumbnail = post.media.first().cloned();
            self.host_content_uniqid = Some(post.uniqid.clone());
        }
        self
    }
}

/// The renderer chosen for a content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    /// Post likes, with the comment-likes fallback for legacy rows.
    Likes,
    /// Comment likes.
    CommentLikes,
    /// Comments.
    Comment,
    /// Replies to comments.
    ReplyComment,
    /// New followers.
    Follow,
    /// Collected characters.
    OcCollected,
    /// Featured posts.
    Featured,
    /// Characters used in posts. Also renders every type without its own
    /// renderer.
    OcUsed,
    /// Badge grants.
    BadgeEarned,
    /// Creator programme activation.
    CppActived,
    /// Top-up reminders.
    ShouldCharge,
    /// Tag requests.
    TagRequest,
    /// Official announcements.
    Official,
}

/// What the likes renderer decided.
#[derive(Debug)]
pub enum RenderStep {
    /// Rendering finished.
    Rendered(Option<MessageContent>),
    /// The row only references comment votes; render it as comment likes
    /// using the votes already fetched.
    AsCommentLikes(Vec<VoteRecord>),
}

impl Renderer {
    /// Selects the renderer for `content_type`.
    #[must_use]
    pub fn for_content_type(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Likes => Self::Likes,
            ContentType::CommentLikes => Self::CommentLikes,
            ContentType::Comment => Self::Comment,
            ContentType::ReplyComment => Self::ReplyComment,
            ContentType::Follow => Self::Follow,
            ContentType::OcCollected => Self::OcCollected,
            ContentType::Featured => Self::Featured,
            ContentType::BadgeEarned => Self::BadgeEarned,
            ContentType::CppActived => Self::CppActived,
            ContentType::ShouldCharge => Self::ShouldCharge,
            ContentType::TagRequest => Self::TagRequest,
            ContentType::Official => Self::Official,
            ContentType::OcUsed | ContentType::InRanking | ContentType::Other(_) => Self::OcUsed,
        }
    }

    /// Whether the renderer runs a local query before it can name the
    /// entities it needs.
    #[must_use]
    pub fn needs_local_query(self, has_payload_actors: bool) -> bool {
        match self {
            Self::Likes | Self::CommentLikes | Self::Follow => !has_payload_actors,
            Self::Comment
            | Self::ReplyComment
            | Self::OcCollected
            | Self::Featured
            | Self::OcUsed => true,
            Self::BadgeEarned
            | Self::CppActived
            | Self::ShouldCharge
            | Self::TagRequest
            | Self::Official => false,
        }
    }

    async fn render(
        self,
        ctx: &PageContext,
        message: &Message,
        actors: Vec<Uuid>,
        ticket: Option<Ticket>,
    ) -> Result<Option<MessageContent>, FeedError> {
        match self {
            Self::Likes => match likes(ctx, message, actors, ticket).await? {
                RenderStep::Rendered(content) => Ok(content),
                RenderStep::AsCommentLikes(votes) => {
                    comment_likes_by(ctx, message, comment_like_authors(&votes)).await
                }
            },
            Self::CommentLikes => comment_likes(ctx, message, actors, ticket).await,
            Self::Comment => comment(ctx, message, ticket, ContentType::Comment).await,
            Self::ReplyComment => comment(ctx, message, ticket, ContentType::ReplyComment).await,
            Self::Follow => follow(ctx, message, actors, ticket).await,
            Self::OcCollected => oc_collected(ctx, message, ticket).await,
            Self::Featured => featured(ctx, message, ticket).await,
            Self::OcUsed => oc_used(ctx, message, ticket).await,
            Self::BadgeEarned => Ok(Some(system(ctx, message, ContentType::BadgeEarned).await)),
            Self::CppActived => Ok(Some(system(ctx, message, ContentType::CppActived).await)),
            Self::ShouldCharge => Ok(Some(system(ctx, message, ContentType::ShouldCharge).await)),
            Self::TagRequest => Ok(Some(system(ctx, message, ContentType::TagRequest).await)),
            Self::Official => Ok(Some(system(ctx, message, ContentType::Official).await)),
        }
    }
}

/// Prepares the renderer for `message`: parses payload actors and takes a
/// barrier ticket when a local query is needed, then returns the render
/// future. Failures resolve to `None`.
pub fn prepare<'a>(
    ctx: &'a PageContext,
    message: &'a Message,
) -> BoxFuture<'a, Option<MessageContent>> {
    let renderer = Renderer::for_content_type(message.content_type);
    let actors = message.payload_actors();
    let ticket = renderer
        .needs_local_query(!actors.is_empty())
        .then(|| ctx.coordinator().wait());
    async move {
        match renderer.render(ctx, message, actors, ticket).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    sort_id = message.sort_id,
                    content_type = message.content_type.code(),
                    error = %e,
                    "failed to render message"
                );
                None
            }
        }
    }
    .boxed()
}

fn release(ctx: &PageContext, ticket: Option<Ticket>) {
    if let Some(ticket) = ticket {
        ctx.coordinator().ready(ticket);
    }
}

fn comment_like_authors(votes: &[VoteRecord]) -> Vec<Uuid> {
    votes
        .iter()
        .filter(|vote| vote.comment_id.is_some())
        .map(|vote| vote.author_id)
        .collect()
}

async fn likes(
    ctx: &PageContext,
    message: &Message,
    actors: Vec<Uuid>,
    ticket: Option<Ticket>,
) -> Result<RenderStep, FeedError> {
    let actors = match ticket {
        Some(ticket) => {
            let votes = ctx
                .directories()
                .votes
                .votes_by_ids(&message.top_content_ids)
                .await?;
            ctx.coordinator().ready(ticket);
            let post_likes: Vec<Uuid> = votes
                .iter()
                .filter(|vote| vote.post_id.is_some() && vote.comment_id.is_none())
                .map(|vote| vote.author_id)
                .collect();
            if post_likes.is_empty() {
                return Ok(RenderStep::AsCommentLikes(votes));
            }
            post_likes
        }
        None => actors,
    };
    let (users, posts) = join(ctx.users(&actors), ctx.posts(&[message.host_content_id])).await;
    let (users, posts) = (users?, posts?);
    let content = MessageContent::new(message, ContentType::Likes, &users).with_post(posts.first());
    Ok(RenderStep::Rendered(Some(content)))
}

async fn comment_likes(
    ctx: &PageContext,
    message: &Message,
    actors: Vec<Uuid>,
    ticket: Option<Ticket>,
) -> Result<Option<MessageContent>, FeedError> {
    let actors = match ticket {
        Some(ticket) => {
            let votes = ctx
                .directories()
                .votes
                .votes_by_ids(&message.top_content_ids)
                .await?;
            ctx.coordinator().ready(ticket);
            comment_like_authors(&votes)
        }
        None => actors,
    };
    comment_likes_by(ctx, message, actors).await
}

async fn comment_likes_by(
    ctx: &PageContext,
    message: &Message,
    actors: Vec<Uuid>,
) -> Result<Option<MessageContent>, FeedError> {
    if actors.is_empty() {
        return Ok(None);
    }
    let (users, comments) = join(
        ctx.users(&actors),
        ctx.comments(&[message.host_content_id]),
    )
    .await;
    let (users, comments) = (users?, comments?);
    let Some(comment) = comments.into_iter().next() else {
        return Err(FeedError::not_found("comment", message.host_content_id));
    };
    let mut content = MessageContent::new(message, ContentType::CommentLikes, &users);
    content.host_content_title = Some(comment.content);
    content.host_thumbnail = comment.post.as_ref().and_then(|p| p.media.first().cloned());
    content.host_content_uniqid = comment.post.map(|p| p.uniqid);
    Ok(Some(content))
}

async fn comment(
    ctx: &PageContext,
    message: &Message,
    ticket: Option<Ticket>,
    content_type: ContentType,
) -> Result<Option<MessageContent>, FeedError> {
    let rows = match message.top_content_ids.first() {
        Some(&comment_id) => {
            ctx.directories()
                .comments
                .comments_by_ids(&[comment_id])
                .await?
        }
        None => Vec::new(),
    };
    release(ctx, ticket);
    let Some(comment) = rows.into_iter().next() else {
        return Err(FeedError::not_found("comment", format!("{:?}", message.top_content_ids)));
    };
    let (users, posts) = join(
        ctx.users(&[comment.author_id]),
        ctx.posts(&[comment.post_id]),
    )
    .await;
    let (users, posts) = (users?, posts?);
    let mut content = MessageContent::new(message, content_type, &users).with_post(posts.first());
    content.is_comment = Some(
        content_type == ContentType::ReplyComment || comment.parent_comment_id.is_some(),
    );
    content.content = Some(comment.content);
    Ok(Some(content))
}

async fn follow(
    ctx: &PageContext,
    message: &Message,
    actors: Vec<Uuid>,
    ticket: Option<Ticket>,
) -> Result<Option<MessageContent>, FeedError> {
    let followers = match ticket {
        Some(ticket) => {
            let rows = ctx
                .directories()
                .follows
                .follows_by_ids(&message.top_content_ids)
                .await?;
            ctx.coordinator().ready(ticket);
            rows.into_iter().map(|row| row.follower).collect()
        }
        None => actors,
    };
    let users = ctx.users(&followers).await?;
    let is_followed_by_me = match followers.first() {
        Some(&first) => ctx
            .directories()
            .follows
            .is_following(ctx.viewer(), first)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to check follow-back status");
                false
            }),
        None => false,
    };
    let mut content = MessageContent::new(message, ContentType::Follow, &users);
    content.is_followed_by_me = Some(is_followed_by_me);
    Ok(Some(content))
}

async fn oc_collected(
    ctx: &PageContext,
    message: &Message,
    ticket: Option<Ticket>,
) -> Result<Option<MessageContent>, FeedError> {
    let collections = ctx
        .directories()
        .collections
        .collections_by_ids(&message.top_content_ids)
        .await?;
    release(ctx, ticket);
    let Some(first) = collections.first() else {
        return Err(FeedError::not_found("collection", format!("{:?}", message.top_content_ids)));
    };
    let collectors: Vec<Uuid> = collections.iter().map(|c| c.user_id).collect();
    let users = ctx.users(&collectors).await?;
    let mut content = MessageContent::new(message, ContentType::OcCollected, &users);
    content.host_thumbnail = first.character.as_ref().and_then(|c| c.character_pfp.clone());
    content.host_content_title = first.character.as_ref().map(|c| c.character_name.clone());
    content.host_content_uniqid = first
        .character_uniqid
        .clone()
        .filter(|uniqid| !uniqid.is_empty())
        .or_else(|| first.character.as_ref().map(|c| c.character_uniqid.clone()));
    Ok(Some(content))
}

async fn official_users(ctx: &PageContext, strict: bool) -> Result<Vec<UserInfo>, FeedError> {
    let Some(official) = ctx.settings().official_account_id else {
        error!("official account is not configured");
        return Ok(Vec::new());
    };
    match ctx.users(&[official]).await {
        Ok(users) => Ok(users),
        Err(e) if !strict => {
            warn!(error = %e, "failed to load official account");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

async fn featured(
    ctx: &PageContext,
    message: &Message,
    ticket: Option<Ticket>,
) -> Result<Option<MessageContent>, FeedError> {
    let tags = ctx
        .directories()
        .tags
        .post_tags_by_ids(&message.top_content_ids, Some(ctx.settings().featured_tag_id))
        .await?;
    release(ctx, ticket);
    let Some(post) = tags.into_iter().next().and_then(|tag| tag.post) else {
        return Err(FeedError::not_found("featured post", format!("{:?}", message.top_content_ids)));
    };
    let users = official_users(ctx, true).await?;
    Ok(Some(
        MessageContent::new(message, ContentType::Featured, &users).with_post(Some(&post)),
    ))
}

async fn oc_used(
    ctx: &PageContext,
    message: &Message,
    ticket: Option<Ticket>,
) -> Result<Option<MessageContent>, FeedError> {
    let tags = &ctx.directories().tags;
    let (post_tags, character) = join(
        tags.post_tags_by_ids(&message.top_content_ids, None),
        tags.character_by_id(message.host_content_id),
    )
    .await;
    release(ctx, ticket);
    let (post_tags, character) = (post_tags?, character?);
    let Some(character) = character else {
        return Err(FeedError::not_found("character", message.host_content_id));
    };
    let Some((post, author)) = post_tags
        .first()
        .and_then(|tag| tag.post.as_ref().zip(tag.author.as_ref()))
    else {
        return Err(FeedError::not_found("post tag", format!("{:?}", message.top_content_ids)));
    };
    let mut content =
        MessageContent::new(message, ContentType::OcUsed, std::slice::from_ref(author));
    content.host_content_title = Some(character.character_name);
    content.host_thumbnail = character.character_pfp;
    content.host_content_uniqid = Some(post.uniqid.clone());
    Ok(Some(content))
}

async fn system(ctx: &PageContext, message: &Message, content_type: ContentType) -> MessageContent {
    let users = official_users(ctx, false).await.unwrap_or_default();
    let payload = message.first_payload();
    let mut content = MessageContent::new(message, content_type, &users);
    match content_type {
        ContentType::BadgeEarned => {
            content.other_count = None;
            if let Some(payload) = &payload {
                let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_owned);
                content.host_thumbnail = text("iconUrl");
                content.host_content_title = text("badgeName").or_else(|| text("badgeTitle"));
            }
        }
        ContentType::Official => content.other_count = None,
        _ => {}
    }
    content.payload = payload.map(Value::Object);
    content
}
