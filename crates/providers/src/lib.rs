//! Generation collaborators: text description, image rendering and the
//! low-latency render backend.
//!
//! The pipeline only sees the traits in [`generate`]; the concrete HTTP
//! clients live in [`gemini`] and [`fast`].

pub mod error;
pub mod fast;
pub mod gemini;
pub mod generate;

pub use error::ProviderError;
pub use generate::{FastImageGenerator, ImageGenerator, ImageOptions, TextGenerator, TextOptions};
