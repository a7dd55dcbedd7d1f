//! Handler for `POST /api/v1/generate/{workflow}`.
//!
//! Accepts a multipart form:
//!
//! | Field          | Required | Notes                                  |
//! |----------------|----------|----------------------------------------|
//! | `image`        | yes      | primary reference image                |
//! | `reference`    | no*      | repeatable; the character for `mimic`  |
//! | `instruction`  | no       | free-text direction                    |
//! | `variantCount` | no       | 1..=10, default 4                      |
//! | `aspectRatio`  | no       | e.g. `3:4`                             |
//! | `backend`      | no       | `quality` (default) or `fast`          |
//!
//! \* `mimic` requires at least one `reference`.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use sparkit_core::request::{Asset, GenerationRequest, RenderBackend};

use crate::error::{AppError, AppResult};
use crate::middleware::owner::OwnerKey;
use crate::state::AppState;

/// Variant count when the form does not name one.
const DEFAULT_VARIANT_COUNT: usize = 4;

/// POST /api/v1/generate/{workflow}
///
/// Runs the whole pipeline and returns the batch response. Per-variant
/// failures are reported inside the body; only request-fatal errors become
/// error statuses.
pub async fn generate_batch(
    State(state): State<AppState>,
    OwnerKey(owner): OwnerKey,
    Path(workflow): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    if state.orchestrator.workflow(&workflow).is_none() {
        return Err(AppError::BadRequest(format!("Unknown workflow '{workflow}'")));
    }

    let request = read_request(multipart).await?;
    let response = state.orchestrator.run(&owner, &workflow, request).await?;

    // Falls back to the minimal `{error, requestedCount, succeededCount}` payload.
    Ok(Json(response.to_json()))
}

/// Collect the multipart form into a [`GenerationRequest`].
async fn read_request(mut multipart: Multipart) -> AppResult<GenerationRequest> {
    let mut primary: Option<Asset> = None;
    let mut auxiliary = Vec::new();
    let mut instruction = String::new();
    let mut variant_count = DEFAULT_VARIANT_COUNT;
    let mut aspect_ratio: Option<String> = None;
    let mut backend = RenderBackend::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" | "reference" => {
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let asset = Asset::new(data.to_vec(), media_type);
                if name == "image" {
                    primary = Some(asset);
                } else {
                    auxiliary.push(asset);
                }
            }
            "instruction" => instruction = read_text(field).await?,
            "variantCount" => {
                let raw = read_text(field).await?;
                variant_count = raw.trim().parse().map_err(|_| {
                    AppError::BadRequest(format!("variantCount must be a number, got '{raw}'"))
                })?;
            }
            "aspectRatio" => {
                let raw = read_text(field).await?;
                let raw = raw.trim();
                aspect_ratio = (!raw.is_empty()).then(|| raw.to_string());
            }
            "backend" => backend = read_text(field).await?.parse()?,
            _ => {} // ignore unknown fields
        }
    }

    let primary =
        primary.ok_or_else(|| AppError::BadRequest("Missing required 'image' field".into()))?;

    Ok(GenerationRequest {
        primary,
        auxiliary,
        instruction,
        variant_count,
        aspect_ratio,
        backend,
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))
}
