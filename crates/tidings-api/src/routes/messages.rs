//! Routes for the notification feed.
//!
//! `GET /?action=count|all_read|detail` answers with the `{code, message,
//! data}` envelope the web client reads. The caller is identified by the
//! `x-user-id` header set by the authenticating proxy.

use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use tidings_core::error::FeedError;
use tidings_feed::application::{command_handlers, query_handlers};
use tidings_feed::domain::commands::MarkAllRead;
use tidings_feed::render::MessageContent;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(Self)
            .ok_or(ApiError(FeedError::Unauthorized))
    }
}

/// Query string of `GET /`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    /// `count`, `all_read` or `detail`.
    pub action: Option<String>,
    /// 1-based page number for `detail`.
    pub page_no: Option<i64>,
    /// Page size for `detail`.
    pub page_size: Option<i64>,
    /// `1` marks everything read before fetching the page.
    pub with_read: Option<String>,
}

/// Successful envelope.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    /// Always `1`.
    pub code: u8,
    /// Always `"success"`.
    pub message: &'static str,
    /// Action result.
    pub data: T,
}

impl<T: Serialize> Success<T> {
    fn new(data: T) -> Self {
        Self {
            code: 1,
            message: "success",
            data,
        }
    }
}

/// Failure envelope. Sent with HTTP 200.
#[derive(Debug, Serialize)]
pub struct Failure {
    /// Always `0`.
    pub code: u8,
    /// Failure label.
    pub message: &'static str,
    /// Same as `message`.
    pub error: &'static str,
}

impl Failure {
    fn new(label: &'static str) -> Self {
        Self {
            code: 0,
            message: label,
            error: label,
        }
    }
}

/// Data of `action=count`.
#[derive(Debug, Serialize)]
pub struct CountData {
    /// Unread notifications.
    pub count: i64,
}

/// Data of `action=detail`.
#[derive(Debug, Serialize)]
pub struct DetailData {
    /// Rendered notifications, newest first. Rows that failed to render are
    /// left out.
    pub messages: Vec<MessageContent>,
}

/// Data returned for an unknown action.
#[derive(Debug, Serialize)]
pub struct NoticeData {
    /// Explanation.
    pub message: &'static str,
}

/// GET /
#[instrument(skip_all, fields(user_id = %user_id, action = query.action.as_deref().unwrap_or("")))]
async fn messages(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<MessagesQuery>,
) -> Result<Response, ApiError> {
    match query.action.as_deref() {
        Some("count") => {
            let count = query_handlers::get_unread_message_count(
                user_id,
                &*state.messages,
                &*state.cursors,
            )
            .await?;
            Ok(Json(Success::new(CountData { count })).into_response())
        }
        Some("all_read") => match mark_all_read(&state, user_id).await {
            Ok(()) => Ok(Json(Success::new(())).into_response()),
            Err(e) => {
                warn!(error = %e, "failed to mark messages read");
                Ok(Json(Failure::new("ALL_READ_FAILED")).into_response())
            }
        },
        Some("detail") => {
            if query.with_read.as_deref() == Some("1")
                && let Err(e) = mark_all_read(&state, user_id).await
            {
                warn!(error = %e, "failed to mark messages read before detail");
            }
            let detail = query_handlers::GetMessageDetail {
                user_id,
                page_no: query.page_no,
                page_size: query.page_size,
            };
            let page = query_handlers::get_message_detail(
                &detail,
                &*state.messages,
                &state.directories,
                &state.settings,
            )
            .await?;
            let messages: Vec<MessageContent> = page.into_iter().flatten().collect();
            info!(count = messages.len(), "returning message page");
            Ok(Json(Success::new(DetailData { messages })).into_response())
        }
        _ => Ok(Json(Success::new(NoticeData {
            message: "Invalid action",
        }))
        .into_response()),
    }
}

async fn mark_all_read(state: &AppState, user_id: Uuid) -> Result<(), FeedError> {
    let command = MarkAllRead {
        correlation_id: Uuid::new_v4(),
        user_id,
    };
    command_handlers::handle_mark_all_read(&command, &*state.messages, &*state.cursors).await
}

/// Returns the router for the notification feed.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tidings_core::directory::Directories;
    use tidings_core::message::ContentType;
    use tidings_feed::context::FeedSettings;
    use tidings_ingest::application::command_handlers::PushOutcome;
    use tidings_ingest::domain::commands::PushMessage;
    use tidings_test_support::{
        FailingMessageStore, FixedClock, InMemoryDirectory, InMemoryMessageStore,
    };
    use tower::ServiceExt;

    struct Harness {
        state: AppState,
        store: Arc<InMemoryMessageStore>,
        directory: Arc<InMemoryDirectory>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryMessageStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let state = AppState::new(
            store.clone(),
            store.clone(),
            Directories::from_shared(directory.clone()),
            FeedSettings::default(),
            Arc::new(FixedClock::default()),
        );
        Harness {
            state,
            store,
            directory,
        }
    }

    fn failing_state() -> AppState {
        let store = Arc::new(FailingMessageStore);
        AppState::new(
            store.clone(),
            store,
            Directories::from_shared(Arc::new(InMemoryDirectory::new())),
            FeedSettings::default(),
            Arc::new(FixedClock::default()),
        )
    }

    async fn get(state: AppState, uri: &str, user: Option<Uuid>) -> (StatusCode, Value) {
        let mut request = Request::builder().method("GET").uri(uri);
        if let Some(user) = user {
            request = request.header(USER_ID_HEADER, user.to_string());
        }
        let response = router()
            .with_state(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body_bytes).unwrap())
    }

    async fn push_follow(harness: &Harness, recipient: Uuid, follow_id: i64) -> Uuid {
        let follower = harness.directory.add_user(&format!("follower{follow_id}"));
        let command = PushMessage {
            user_id: Some(recipient),
            ..PushMessage::new(ContentType::Follow, follow_id, 0)
        };
        let outcome = harness
            .state
            .gateway
            .push(command, Some(follower.id))
            .await
            .unwrap();
        assert!(matches!(outcome, PushOutcome::Inserted(_)));
        follower.id
    }

    #[tokio::test]
    async fn test_missing_user_header_returns_401() {
        // Arrange
        let harness = harness();

        // Act
        let (status, json) = get(harness.state, "/?action=count", None).await;

        // Assert
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_malformed_user_header_returns_401() {
        let harness = harness();
        let request = Request::builder()
            .uri("/?action=count")
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = router()
            .with_state(harness.state)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_count_reports_pushed_messages() {
        // Arrange
        let harness = harness();
        let user = Uuid::new_v4();
        push_follow(&harness, user, 1).await;
        push_follow(&harness, user, 2).await;

        // Act
        let (status, json) = get(harness.state, "/?action=count", Some(user)).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "code": 1, "message": "success", "data": { "count": 2 } }));
    }

    #[tokio::test]
    async fn test_all_read_clears_unread_count() {
        // Arrange
        let harness = harness();
        let user = Uuid::new_v4();
        push_follow(&harness, user, 1).await;

        // Act
        let (status, json) = get(harness.state.clone(), "/?action=all_read", Some(user)).await;
        let (_, count) = get(harness.state, "/?action=count", Some(user)).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "code": 1, "message": "success", "data": null }));
        assert_eq!(count["data"]["count"], 0);
        assert_eq!(harness.store.cursor(user), Some(1));
    }

    #[tokio::test]
    async fn test_all_read_failure_uses_failure_envelope() {
        let (status, json) = get(failing_state(), "/?action=all_read", Some(Uuid::new_v4())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({ "code": 0, "message": "ALL_READ_FAILED", "error": "ALL_READ_FAILED" })
        );
    }

    #[tokio::test]
    async fn test_detail_renders_aggregated_follows() {
        // Arrange
        let harness = harness();
        let user = Uuid::new_v4();
        let first = push_follow(&harness, user, 1).await;
        let second = push_follow(&harness, user, 2).await;

        // Act
        let (status, json) = get(
            harness.state,
            "/?action=detail&pageNo=1&pageSize=10&withRead=1",
            Some(user),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let messages = json["data"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["type"], 3);
        assert_eq!(messages[0]["isFollowedByMe"], false);
        let users: Vec<&str> = messages[0]["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["user_id"].as_str().unwrap())
            .collect();
        assert_eq!(users, vec![second.to_string(), first.to_string()]);
        assert_eq!(harness.store.cursor(user), Some(2));
    }

    #[tokio::test]
    async fn test_detail_leaves_out_rows_that_fail_to_render() {
        // Arrange
        let harness = harness();
        let user = Uuid::new_v4();
        push_follow(&harness, user, 1).await;
        harness.directory.fail("users_by_ids");

        // Act
        let (status, json) = get(harness.state, "/?action=detail", Some(user)).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["messages"], json!([]));
    }

    #[tokio::test]
    async fn test_detail_rejects_oversized_page() {
        let harness = harness();

        let (status, _) = get(
            harness.state,
            "/?action=detail&pageSize=500",
            Some(Uuid::new_v4()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_failure_returns_500() {
        // Act
        let (status, json) = get(failing_state(), "/?action=count", Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_unknown_action_returns_notice() {
        // Act
        let (status, json) = get(harness().state, "/?action=purge", Some(Uuid::new_v4())).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({ "code": 1, "message": "success", "data": { "message": "Invalid action" } })
        );
    }
}
