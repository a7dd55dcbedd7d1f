use async_trait::async_trait;
use sparkit_core::request::Asset;

use crate::error::ProviderError;

/// Tuning for a single text generation call.
#[derive(Debug, Clone, Default)]
pub struct TextOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Tuning for a single image generation call.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    /// Aspect ratio hint such as `3:4`.
    pub aspect_ratio: Option<String>,
    /// Resolution hint such as `1K` or `2K`.
    pub resolution: Option<String>,
}

/// Single-turn text generation, optionally grounded on one image.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(
        &self,
        prompt: &str,
        image: Option<&Asset>,
        options: &TextOptions,
    ) -> Result<String, ProviderError>;
}

/// Produces one image from a prompt and zero or more reference images.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(
        &self,
        prompt: &str,
        images: &[Asset],
        options: &ImageOptions,
    ) -> Result<Asset, ProviderError>;
}

/// Lower-latency image backend. Callers assume a single concurrency slot.
#[async_trait]
pub trait FastImageGenerator: Send + Sync {
    async fn generate_fast(
        &self,
        image: &Asset,
        prompt: &str,
        seed: u64,
    ) -> Result<Asset, ProviderError>;
}
