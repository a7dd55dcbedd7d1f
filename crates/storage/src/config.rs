//! Storage configuration loaded from environment variables.

/// Default timeout for resource API calls in seconds.
const DEFAULT_RESOURCE_TIMEOUT_SECS: u64 = 60;

/// Default key prefix inside the fallback bucket.
const DEFAULT_FALLBACK_PREFIX: &str = "generated-images";

/// Primary resource API settings.
#[derive(Debug, Clone)]
pub struct ResourceStoreConfig {
    pub api_url: String,
    pub email: String,
    pub code: String,
    /// Business tag sent with every upload.
    pub biz: String,
    pub template_id: String,
    pub timeout_secs: u64,
}

impl ResourceStoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` unless URL, email and code are all set.
    ///
    /// | Env Var                     | Default          |
    /// |-----------------------------|------------------|
    /// | `RESOURCE_API_URL`          | (required)       |
    /// | `RESOURCE_API_EMAIL`        | (required)       |
    /// | `RESOURCE_API_CODE`         | (required)       |
    /// | `RESOURCE_API_BIZ`          | `external_tool`  |
    /// | `RESOURCE_API_TEMPLATE_ID`  | `1`              |
    /// | `RESOURCE_API_TIMEOUT_SECS` | `60`             |
    pub fn from_env() -> Option<Self> {
        let api_url = non_empty_env("RESOURCE_API_URL")?;
        let email = non_empty_env("RESOURCE_API_EMAIL")?;
        let code = non_empty_env("RESOURCE_API_CODE")?;

        let timeout_secs: u64 = std::env::var("RESOURCE_API_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_RESOURCE_TIMEOUT_SECS.to_string())
            .parse()
            .expect("RESOURCE_API_TIMEOUT_SECS must be a valid u64");

        Some(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            email,
            code,
            biz: std::env::var("RESOURCE_API_BIZ").unwrap_or_else(|_| "external_tool".into()),
            template_id: std::env::var("RESOURCE_API_TEMPLATE_ID").unwrap_or_else(|_| "1".into()),
            timeout_secs,
        })
    }
}

/// S3-compatible fallback bucket settings.
#[derive(Debug, Clone)]
pub struct S3FallbackConfig {
    pub bucket: String,
    /// Public base URL objects are served from; the object key is appended.
    pub public_url: String,
    /// Custom endpoint for S3-compatible services; enables path-style addressing.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub key_prefix: String,
}

impl S3FallbackConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` unless bucket and public URL are set. Credentials fall
    /// back to the default AWS provider chain when the key pair is unset.
    ///
    /// | Env Var                          | Default             |
    /// |----------------------------------|---------------------|
    /// | `FALLBACK_S3_BUCKET`             | (required)          |
    /// | `FALLBACK_S3_PUBLIC_URL`         | (required)          |
    /// | `FALLBACK_S3_ENDPOINT`           | (AWS)               |
    /// | `FALLBACK_S3_REGION`             | (provider chain)    |
    /// | `FALLBACK_S3_ACCESS_KEY_ID`      | (provider chain)    |
    /// | `FALLBACK_S3_SECRET_ACCESS_KEY`  | (provider chain)    |
    /// | `FALLBACK_S3_PREFIX`             | `generated-images`  |
    pub fn from_env() -> Option<Self> {
        Some(Self {
            bucket: non_empty_env("FALLBACK_S3_BUCKET")?,
            public_url: non_empty_env("FALLBACK_S3_PUBLIC_URL")?,
            endpoint: non_empty_env("FALLBACK_S3_ENDPOINT"),
            region: non_empty_env("FALLBACK_S3_REGION"),
            access_key_id: non_empty_env("FALLBACK_S3_ACCESS_KEY_ID"),
            secret_access_key: non_empty_env("FALLBACK_S3_SECRET_ACCESS_KEY"),
            key_prefix: std::env::var("FALLBACK_S3_PREFIX")
                .unwrap_or_else(|_| DEFAULT_FALLBACK_PREFIX.into()),
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
