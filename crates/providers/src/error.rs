/// Errors from generation collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider refused the request on safety or policy grounds.
    #[error("Content blocked by provider: {reason}")]
    ContentBlocked { reason: String },

    /// A successful response carried nothing usable.
    #[error("Provider returned no {expected}")]
    EmptyResponse { expected: &'static str },

    /// The response body could not be decoded.
    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Safety/policy rejections are reported to users differently.
    pub fn is_content_blocked(&self) -> bool {
        matches!(self, Self::ContentBlocked { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}
