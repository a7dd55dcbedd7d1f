//! Integration tests for `POST /api/v1/generate/{workflow}`.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_multipart, Part, OWNER, PNG};
use sparkit_db::models::status::TaskStatus;
use sqlx::PgPool;

async fn count_rows(pool: &PgPool, status: Option<TaskStatus>) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM generation_tasks \
         WHERE owner_key = $1 AND ($2::SMALLINT IS NULL OR status_id = $2)",
    )
    .bind(OWNER)
    .bind(status.map(TaskStatus::id))
    .fetch_one(pool)
    .await
    .unwrap()
}

// ---------------------------------------------------------------------------
// Test: a full pose batch
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn pose_batch_returns_urls_and_closes_the_ledger(pool: PgPool) {
    let app = common::build_test_app(pool.clone());

    let response = post_multipart(
        app,
        "/api/v1/generate/pose",
        Some(OWNER),
        &[
            Part::File("image", "image/png", PNG),
            Part::Text("instruction", "relaxed, natural light"),
            Part::Text("variantCount", "2"),
            Part::Text("aspectRatio", "3:4"),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["requestedCount"], 2);
    assert_eq!(json["succeededCount"], 2);
    assert_eq!(json["guidanceRecords"].as_array().unwrap().len(), 2);
    assert_eq!(json["errors"].as_array().unwrap().len(), 0);
    assert!(json.get("derivedAssetUrl").is_none());

    let urls = json["assetUrls"].as_array().unwrap();
    assert_eq!(urls.len(), 2);
    for url in urls {
        assert!(url.as_str().unwrap().starts_with("https://assets.test/pose-"));
    }

    assert_eq!(count_rows(&pool, Some(TaskStatus::Completed)).await, 2);
    assert_eq!(count_rows(&pool, None).await, 2);
}

// ---------------------------------------------------------------------------
// Test: request-fatal errors
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_owner_header_returns_401(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_multipart(
        app,
        "/api/v1/generate/pose",
        None,
        &[Part::File("image", "image/png", PNG)],
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_workflow_returns_400(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_multipart(
        app,
        "/api/v1/generate/portrait",
        Some(OWNER),
        &[Part::File("image", "image/png", PNG)],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_image_returns_400(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let response = post_multipart(
        app,
        "/api/v1/generate/pose",
        Some(OWNER),
        &[Part::Text("variantCount", "2")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Missing required 'image' field");
    assert_eq!(count_rows(&pool, None).await, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn too_many_variants_is_rejected_before_any_ledger_write(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let response = post_multipart(
        app,
        "/api/v1/generate/pose",
        Some(OWNER),
        &[
            Part::File("image", "image/png", PNG),
            Part::Text("variantCount", "11"),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(count_rows(&pool, None).await, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn non_image_upload_returns_validation_error(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_multipart(
        app,
        "/api/v1/generate/pose",
        Some(OWNER),
        &[Part::File("image", "text/plain", b"hello")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn fast_backend_without_client_returns_validation_error(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_multipart(
        app,
        "/api/v1/generate/pose",
        Some(OWNER),
        &[
            Part::File("image", "image/png", PNG),
            Part::Text("backend", "fast"),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_backend_returns_validation_error(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_multipart(
        app,
        "/api/v1/generate/pose",
        Some(OWNER),
        &[
            Part::File("image", "image/png", PNG),
            Part::Text("backend", "turbo"),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}
