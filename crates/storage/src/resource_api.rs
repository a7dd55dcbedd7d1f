//! Primary store: the resource API.
//!
//! Uploads are multipart `POST /v1/resource/upload` with the raw access token
//! in `Authorization`. Tokens come from `POST /v1/user/verifyvcode` with the
//! configured email and verification code. Both endpoints answer with a
//! `{ code, msg, data }` envelope where `code == 0` means success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::ResourceStoreConfig;
use crate::error::{PrimaryUploadError, StorageError};
use crate::store::PrimaryStore;

/// Envelope `code` the API uses for an expired or invalid token.
const UNAUTHORIZED_CODE: i64 = 401;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    access_token: Option<String>,
}

/// HTTP client for the resource API.
pub struct ResourceApiStore {
    client: reqwest::Client,
    config: ResourceStoreConfig,
}

impl ResourceApiStore {
    pub fn new(config: ResourceStoreConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StorageError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PrimaryStore for ResourceApiStore {
    async fn upload(
        &self,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
        token: &str,
    ) -> Result<String, PrimaryUploadError> {
        let file = Part::bytes(bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str(media_type)
            .map_err(StorageError::from)?;
        let form = Form::new()
            .part("file", file)
            .text("biz", self.config.biz.clone())
            .text("template_id", self.config.template_id.clone());

        let response = self
            .client
            .post(format!("{}/v1/resource/upload", self.config.api_url))
            .header(reqwest::header::AUTHORIZATION, token)
            .multipart(form)
            .send()
            .await
            .map_err(StorageError::from)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PrimaryUploadError::Unauthorized);
        }
        let response = Self::ensure_success(response).await?;
        let envelope: Envelope<UploadData> = response.json().await.map_err(StorageError::from)?;
        upload_url(envelope)
    }

    async fn refresh_credential(&self) -> Result<String, StorageError> {
        let response = self
            .client
            .post(format!("{}/v1/user/verifyvcode", self.config.api_url))
            .json(&serde_json::json!({
                "email": self.config.email,
                "vcode": self.config.code,
            }))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let envelope: Envelope<TokenData> = response.json().await?;
        access_token(envelope)
    }
}

fn upload_url(envelope: Envelope<UploadData>) -> Result<String, PrimaryUploadError> {
    if envelope.code == UNAUTHORIZED_CODE {
        return Err(PrimaryUploadError::Unauthorized);
    }
    if envelope.code != 0 {
        return Err(StorageError::Rejected(format!(
            "code {}: {}",
            envelope.code,
            envelope.msg.unwrap_or_default()
        ))
        .into());
    }
    envelope
        .data
        .and_then(|d| d.url)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| StorageError::Rejected("response carried no url".into()).into())
}

fn access_token(envelope: Envelope<TokenData>) -> Result<String, StorageError> {
    if envelope.code != 0 {
        return Err(StorageError::Credential(format!(
            "code {}: {}",
            envelope.code,
            envelope.msg.unwrap_or_default()
        )));
    }
    envelope
        .data
        .and_then(|d| d.access_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| StorageError::Credential("response carried no access_token".into()))
}
