//! Integration tests for `PgMessageStore`.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tidings_core::message::{BroadType, ContentType, tag_actor};
use tidings_core::repository::{MessageRepository, NewMessage, ReadCursorRepository};
use tidings_store::PgMessageStore;
use uuid::Uuid;

/// Helper to build a `NewMessage` with sensible defaults.
fn like(user_id: Uuid, content_id: i64, host_content_id: i64, actor: Uuid) -> NewMessage {
    NewMessage {
        user_id,
        content_id,
        host_content_id,
        content_type: ContentType::Likes,
        aggregate_id: None,
        is_aggregate: true,
        payload: Some(tag_actor(None, actor)),
        broad_type: BroadType::Message,
        created_at: Utc::now(),
    }
}

fn comment(user_id: Uuid, content_id: i64) -> NewMessage {
    NewMessage {
        content_type: ContentType::Comment,
        is_aggregate: false,
        payload: None,
        ..like(user_id, content_id, 10, Uuid::new_v4())
    }
}

// --- insert_message ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_aggregating_insert_without_bucket_anchors_on_own_id(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();

    let id = store
        .insert_message(like(user, 1, 10, Uuid::new_v4()))
        .await
        .unwrap();

    let page = store.messages_for_user(user, 0, 10).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].aggregate_id, Some(id));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_non_aggregating_insert_has_no_bucket(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();

    store.insert_message(comment(user, 5)).await.unwrap();

    let page = store.messages_for_user(user, 0, 10).await.unwrap();
    assert_eq!(page[0].aggregate_id, None);
    assert_eq!(page[0].payloads, vec![None]);
}

// --- messages_for_user ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_bucket_folds_events_beyond_display_cap(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();
    let anchor = store
        .insert_message(like(user, 1, 10, Uuid::new_v4()))
        .await
        .unwrap();
    let mut ids = vec![anchor];
    for content_id in 2..=5 {
        let id = store
            .insert_message(NewMessage {
                aggregate_id: Some(anchor),
                ..like(user, content_id, 10, Uuid::new_v4())
            })
            .await
            .unwrap();
        ids.push(id);
    }

    let page = store.messages_for_user(user, 0, 10).await.unwrap();

    assert_eq!(page.len(), 1);
    let bucket = &page[0];
    assert_eq!(bucket.sort_id, ids[4]);
    assert_eq!(bucket.top_message_ids, vec![ids[4], ids[3], ids[2]]);
    assert_eq!(bucket.top_content_ids, vec![5, 4, 3]);
    assert_eq!(bucket.other_count, 2);
    assert_eq!(bucket.payloads.len(), 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_page_includes_broadcasts_and_orders_newest_first(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();
    let first = store.insert_message(comment(user, 1)).await.unwrap();
    let broadcast = store
        .insert_message(NewMessage {
            user_id: Uuid::new_v4(),
            content_type: ContentType::Official,
            broad_type: BroadType::Broadcast,
            payload: Some(json!({ "title": "maintenance" })),
            ..comment(user, 2)
        })
        .await
        .unwrap();
    store.insert_message(comment(Uuid::new_v4(), 3)).await.unwrap();

    let page = store.messages_for_user(user, 0, 10).await.unwrap();

    let sort_ids: Vec<i64> = page.iter().map(|m| m.sort_id).collect();
    assert_eq!(sort_ids, vec![broadcast, first]);
    assert_eq!(page[0].broad_type, BroadType::Broadcast);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_page_offset_and_limit_apply_to_buckets(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();
    let mut ids = Vec::new();
    for content_id in 1..=4 {
        ids.push(store.insert_message(comment(user, content_id)).await.unwrap());
    }

    let page = store.messages_for_user(user, 1, 2).await.unwrap();

    let sort_ids: Vec<i64> = page.iter().map(|m| m.sort_id).collect();
    assert_eq!(sort_ids, vec![ids[2], ids[1]]);
}

// --- dedup / aggregation lookups ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_has_actor_message_matches_actor_and_host(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();
    let actor = Uuid::new_v4();
    store.insert_message(like(user, 1, 10, actor)).await.unwrap();

    let same_host = store
        .has_actor_message(user, ContentType::Likes, actor, Some(10))
        .await
        .unwrap();
    let other_host = store
        .has_actor_message(user, ContentType::Likes, actor, Some(11))
        .await
        .unwrap();
    let any_host = store
        .has_actor_message(user, ContentType::Likes, actor, None)
        .await
        .unwrap();

    assert!(same_host);
    assert!(!other_host);
    assert!(any_host);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_latest_open_aggregate_respects_watermark(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();
    let anchor = store
        .insert_message(like(user, 1, 10, Uuid::new_v4()))
        .await
        .unwrap();

    let open = store
        .latest_open_aggregate_id(user, 10, ContentType::Likes, anchor - 1)
        .await
        .unwrap();
    let closed = store
        .latest_open_aggregate_id(user, 10, ContentType::Likes, anchor)
        .await
        .unwrap();

    assert_eq!(open, Some(anchor));
    assert_eq!(closed, None);
}

// --- unread ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_count_visible_after_and_latest_visible_id(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();
    let first = store.insert_message(comment(user, 1)).await.unwrap();
    let second = store.insert_message(comment(user, 2)).await.unwrap();

    assert_eq!(store.count_visible_after(user, 0).await.unwrap(), 2);
    assert_eq!(store.count_visible_after(user, first).await.unwrap(), 1);
    assert_eq!(store.latest_visible_id(user).await.unwrap(), Some(second));
    assert_eq!(
        store.latest_visible_id(Uuid::new_v4()).await.unwrap(),
        None
    );
}

// --- delete_by_content ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_delete_by_content_removes_matching_rows_only(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();
    store.insert_message(comment(user, 7)).await.unwrap();
    store
        .insert_message(like(user, 7, 10, Uuid::new_v4()))
        .await
        .unwrap();

    let removed = store
        .delete_by_content(7, ContentType::Comment)
        .await
        .unwrap();

    assert_eq!(removed, 1);
    let page = store.messages_for_user(user, 0, 10).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].content_type, ContentType::Likes);
}

// --- read cursor ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_read_cursor_is_created_lazily_and_upserted(pool: PgPool) {
    let store = PgMessageStore::new(pool);
    let user = Uuid::new_v4();

    assert_eq!(store.last_read(user).await.unwrap(), None);
    assert_eq!(store.last_read_or_create(user).await.unwrap(), 0);
    assert_eq!(store.last_read(user).await.unwrap(), Some(0));

    store.set_last_read(user, 42).await.unwrap();
    store.set_last_read(user, 42).await.unwrap();

    assert_eq!(store.last_read_or_create(user).await.unwrap(), 42);
}
