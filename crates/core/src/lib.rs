//! Pure domain logic shared by every Sparkit crate.
//!
//! Nothing in here performs I/O: the extractor, the output sanitizer and the
//! request model are plain functions and types so the pipeline and the HTTP
//! layer can share one implementation of each.

pub mod error;
pub mod extract;
pub mod request;
pub mod sanitize;
pub mod types;
