//! Integration tests for `/api/v1/tasks`.

mod common;

use axum::http::{Method, StatusCode};
use common::{as_owner, body_json, get, OWNER};
use sparkit_db::models::status::TaskStatus;
use sparkit_db::repositories::GenerationTaskRepo;
use sqlx::PgPool;

async fn seed(pool: &PgPool, owner: &str, kind: &str, count: usize) -> Vec<i64> {
    let descriptions: Vec<Option<String>> = vec![None; count];
    GenerationTaskRepo::create_batch(pool, owner, kind, &descriptions)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect()
}

// ---------------------------------------------------------------------------
// Test: the owner header is required
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_owner_header_returns_401(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = get(app, "/api/v1/tasks").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn oversized_owner_header_returns_401(pool: PgPool) {
    let app = common::build_test_app(pool);
    let owner = "o".repeat(129);
    let response = as_owner(app, Method::GET, "/api/v1/tasks", &owner).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Test: listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_returns_open_and_failed_entries_of_the_owner(pool: PgPool) {
    let ids = seed(&pool, OWNER, "pose", 3).await;
    seed(&pool, "someone-else", "pose", 2).await;

    GenerationTaskRepo::complete(&pool, ids[0], "https://assets.test/pose-1.png", None)
        .await
        .unwrap();
    GenerationTaskRepo::fail(&pool, ids[1], "render failed")
        .await
        .unwrap();

    let app = common::build_test_app(pool);
    let response = as_owner(app, Method::GET, "/api/v1/tasks", OWNER).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);

    // Newest first.
    assert_eq!(data[0]["id"], ids[2]);
    assert_eq!(data[0]["status_id"], TaskStatus::Pending.id());
    assert_eq!(data[1]["id"], ids[1]);
    assert_eq!(data[1]["status_id"], TaskStatus::Failed.id());
    assert_eq!(data[1]["error_message"], "render failed");
    assert!(data.iter().all(|t| t["owner_key"] == OWNER));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_filters_by_kind(pool: PgPool) {
    seed(&pool, OWNER, "pose", 2).await;
    seed(&pool, OWNER, "snapshot", 1).await;

    let app = common::build_test_app(pool);
    let response = as_owner(app, Method::GET, "/api/v1/tasks?kind=snapshot", OWNER).await;

    let json = body_json(response).await;
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["task_kind"], "snapshot");
}

// ---------------------------------------------------------------------------
// Test: deletion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_removes_own_entry(pool: PgPool) {
    let ids = seed(&pool, OWNER, "pose", 2).await;
    let app = common::build_test_app(pool.clone());

    let uri = format!("/api/v1/tasks/{}", ids[0]);
    let response = as_owner(app.clone(), Method::DELETE, &uri, OWNER).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = as_owner(app.clone(), Method::DELETE, &uri, OWNER).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let remaining = GenerationTaskRepo::list_active(&pool, OWNER, None)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, ids[1]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_of_another_owners_entry_returns_404(pool: PgPool) {
    let ids = seed(&pool, "someone-else", "pose", 1).await;
    let app = common::build_test_app(pool.clone());

    let uri = format!("/api/v1/tasks/{}", ids[0]);
    let response = as_owner(app, Method::DELETE, &uri, OWNER).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");

    let untouched = GenerationTaskRepo::list_active(&pool, "someone-else", None)
        .await
        .unwrap();
    assert_eq!(untouched.len(), 1);
}
