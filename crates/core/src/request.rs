//! Generation request model and validation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fewest variants a request may ask for.
pub const MIN_VARIANTS: usize = 1;

/// Most variants a request may ask for.
pub const MAX_VARIANTS: usize = 10;

/// Largest accepted reference image, in bytes.
pub const MAX_ASSET_BYTES: usize = 20 * 1024 * 1024;

/// Aspect ratios the image backends accept.
pub const VALID_ASPECT_RATIOS: &[&str] = &[
    "1:1", "2:3", "3:2", "3:4", "4:3", "4:5", "5:4", "9:16", "16:9", "21:9",
];

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Binary image payload plus its declared media type. Cloning shares the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
    pub bytes: Arc<[u8]>,
    pub media_type: String,
}

impl Asset {
    pub fn new(bytes: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension for the media type, `bin` when unknown.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.media_type)
    }

    fn validate(&self, what: &str) -> Result<(), CoreError> {
        if self.is_empty() {
            return Err(CoreError::Validation(format!("{what} image is empty")));
        }
        if self.len() > MAX_ASSET_BYTES {
            return Err(CoreError::Validation(format!(
                "{what} image exceeds {MAX_ASSET_BYTES} bytes"
            )));
        }
        if !self.media_type.starts_with("image/") {
            return Err(CoreError::Validation(format!(
                "{what} image has unsupported media type '{}'",
                self.media_type
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .finish()
    }
}

/// Map an image media type to a file extension.
pub fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Which render backend draws the variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackend {
    /// High-quality image model, all variants concurrently.
    #[default]
    Quality,
    /// Low-latency backend with a single concurrency slot.
    Fast,
}

impl RenderBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Fast => "fast",
        }
    }
}

impl FromStr for RenderBackend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" | "" => Ok(Self::Quality),
            "fast" => Ok(Self::Fast),
            other => Err(CoreError::Validation(format!(
                "unknown render backend '{other}'"
            ))),
        }
    }
}

/// Input to one pipeline run. Immutable once validated.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub primary: Asset,
    pub auxiliary: Vec<Asset>,
    pub instruction: String,
    pub variant_count: usize,
    pub aspect_ratio: Option<String>,
    pub backend: RenderBackend,
}

impl GenerationRequest {
    /// Check assets, variant count and aspect ratio.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.primary.validate("primary")?;
        for asset in &self.auxiliary {
            asset.validate("reference")?;
        }

        if !(MIN_VARIANTS..=MAX_VARIANTS).contains(&self.variant_count) {
            return Err(CoreError::Validation(format!(
                "variant count must be between {MIN_VARIANTS} and {MAX_VARIANTS}, got {}",
                self.variant_count
            )));
        }

        if let Some(ratio) = &self.aspect_ratio {
            if !VALID_ASPECT_RATIOS.contains(&ratio.as_str()) {
                return Err(CoreError::Validation(format!(
                    "unsupported aspect ratio '{ratio}'"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Describing,
    Deriving,
    Rendering,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Describing => "describing",
            Self::Deriving => "deriving",
            Self::Rendering => "rendering",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// What a single-call stage produced.
#[derive(Debug, Clone)]
pub enum StageOutput {
    Text(String),
    Asset(Asset),
}

/// Output of one stage, fed into the next.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub output: StageOutput,
}

impl StageResult {
    pub fn text(stage: Stage, text: String) -> Self {
        Self {
            stage,
            output: StageOutput::Text(text),
        }
    }

    pub fn asset(stage: Stage, asset: Asset) -> Self {
        Self {
            stage,
            output: StageOutput::Asset(asset),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.output {
            StageOutput::Text(text) => Some(text),
            StageOutput::Asset(_) => None,
        }
    }

    pub fn as_asset(&self) -> Option<&Asset> {
        match &self.output {
            StageOutput::Asset(asset) => Some(asset),
            StageOutput::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn png() -> Asset {
        Asset::new(vec![0x89, b'P', b'N', b'G'], "image/png")
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            primary: png(),
            auxiliary: vec![],
            instruction: "make it sunny".into(),
            variant_count: 4,
            aspect_ratio: Some("3:4".into()),
            backend: RenderBackend::Quality,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn variant_count_out_of_range() {
        let mut req = request();
        req.variant_count = 0;
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));

        req.variant_count = MAX_VARIANTS + 1;
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_empty_or_non_image_assets() {
        let mut req = request();
        req.primary = Asset::new(Vec::new(), "image/png");
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));

        let mut req = request();
        req.auxiliary = vec![Asset::new(vec![1, 2, 3], "application/pdf")];
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_unknown_aspect_ratio() {
        let mut req = request();
        req.aspect_ratio = Some("7:3".into());
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("FAST".parse::<RenderBackend>().unwrap(), RenderBackend::Fast);
        assert_eq!("".parse::<RenderBackend>().unwrap(), RenderBackend::Quality);
        assert!("turbo".parse::<RenderBackend>().is_err());
    }

    #[test]
    fn extension_from_media_type() {
        assert_eq!(png().extension(), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("video/mp4"), "bin");
    }
}
