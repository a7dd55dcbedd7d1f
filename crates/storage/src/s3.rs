//! Fallback store: an S3-compatible bucket with public object URLs.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_smithy_types::byte_stream::ByteStream;

use crate::config::S3FallbackConfig;
use crate::error::StorageError;
use crate::store::FallbackStore;

/// Uploads objects with `PutObject` and returns `{public_url}/{key}`.
pub struct S3FallbackStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_url: String,
    key_prefix: String,
}

impl S3FallbackStore {
    /// Build an S3 client from the shared AWS config plus overrides.
    pub async fn from_config(config: S3FallbackConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "sparkit-env",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket,
            public_url: config.public_url,
            key_prefix: config.key_prefix,
        }
    }

    fn object_key(&self, filename: &str) -> String {
        object_key(&self.key_prefix, filename)
    }
}

#[async_trait]
impl FallbackStore for S3FallbackStore {
    async fn upload(
        &self,
        bytes: &[u8],
        media_type: &str,
        filename: &str,
    ) -> Result<String, StorageError> {
        let key = self.object_key(filename);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(media_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::S3(aws_sdk_s3::error::DisplayErrorContext(&e).to_string()))?;

        Ok(public_object_url(&self.public_url, &key))
    }
}

fn object_key(prefix: &str, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{prefix}/{filename}")
    }
}

fn public_object_url(base: &str, key: &str) -> String {
    format!("{}/{key}", base.trim_end_matches('/'))
}
