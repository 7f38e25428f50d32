//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tidings_feed::context::FeedSettings;
use tower::ServiceExt;
use uuid::Uuid;

use tidings_api::routes::messages::USER_ID_HEADER;
use tidings_api::state::AppState;

/// Build the state backed by the test database.
pub fn test_state(pool: PgPool, settings: FeedSettings) -> AppState {
    AppState::from_pool(pool, settings)
}

/// Build the full app router. Uses the same route structure as `main.rs`.
pub fn build_test_app(pool: PgPool) -> Router {
    tidings_api::app(test_state(pool, FeedSettings::default()))
}

/// Send a GET request, optionally as `user`, and return the response.
pub async fn get_json(
    app: Router,
    uri: &str,
    user: Option<Uuid>,
) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        request = request.header(USER_ID_HEADER, user.to_string());
    }

    let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Insert a user profile and return its id.
pub async fn seed_user(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, user_name, image, user_uniqid) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(name)
        .bind(format!("https://cdn.test/{name}.png"))
        .bind(format!("@{name}"))
        .execute(pool)
        .await
        .unwrap();
    id
}

/// Insert a post and return its id.
pub async fn seed_post(pool: &PgPool, author: Uuid, title: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO posts (author_id, title, media, uniqid) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(author)
    .bind(title)
    .bind(vec![format!("https://cdn.test/{title}.png")])
    .bind(format!("p-{title}"))
    .fetch_one(pool)
    .await
    .unwrap()
}
