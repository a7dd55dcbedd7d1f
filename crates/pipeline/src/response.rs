//! Aggregated batch response, sanitized at construction.

use serde::Serialize;
use serde_json::{json, Value};
use sparkit_core::extract::GuidanceRecord;
use sparkit_core::sanitize::OutputSanitizer;

/// Result of one pipeline run.
///
/// `asset_urls[i]` is `None` where variant `i` failed; the reason is in
/// `errors` as `variant {i+1}: {reason}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_asset_url: Option<String>,
    pub guidance_records: Vec<GuidanceRecord>,
    pub asset_urls: Vec<Option<String>>,
    pub requested_count: usize,
    pub succeeded_count: usize,
    pub errors: Vec<String>,
}

impl BatchResponse {
    /// Assemble a response, passing every string through `sanitizer`.
    ///
    /// URLs that fail validation become `None` with an error entry.
    pub fn assemble(
        sanitizer: &OutputSanitizer,
        derived_asset_url: Option<String>,
        records: &[GuidanceRecord],
        variant_urls: Vec<Result<String, String>>,
        mut errors: Vec<String>,
    ) -> Self {
        let requested_count = variant_urls.len();
        let mut asset_urls = Vec::with_capacity(requested_count);

        for (index, outcome) in variant_urls.into_iter().enumerate() {
            match outcome.and_then(|url| sanitizer.url(&url).map_err(|e| e.to_string())) {
                Ok(url) => asset_urls.push(Some(url)),
                Err(reason) => {
                    asset_urls.push(None);
                    errors.push(format!("variant {}: {reason}", index + 1));
                }
            }
        }

        let derived_asset_url = derived_asset_url.and_then(|url| match sanitizer.url(&url) {
            Ok(url) => Some(url),
            Err(e) => {
                errors.push(format!("derived asset: {e}"));
                None
            }
        });

        let guidance_records: Vec<GuidanceRecord> = records
            .iter()
            .map(|record| {
                record
                    .fields()
                    .map(|(key, value)| (key.to_string(), sanitizer.text(value)))
                    .collect::<GuidanceRecord>()
            })
            .collect();

        Self {
            derived_asset_url,
            guidance_records,
            succeeded_count: asset_urls.iter().filter(|u| u.is_some()).count(),
            asset_urls,
            requested_count,
            errors: errors.iter().map(|e| sanitizer.text(e)).collect(),
        }
    }

    /// JSON body, or the minimal safe payload if serialization fails.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize batch response");
            minimal_payload("Failed to assemble response", self.requested_count)
        })
    }
}

/// `{error, requestedCount, succeededCount: 0}`.
pub fn minimal_payload(error: &str, requested_count: usize) -> Value {
    json!({
        "error": OutputSanitizer::default().text(error),
        "requestedCount": requested_count,
        "succeededCount": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pose: &str) -> GuidanceRecord {
        [("pose", pose), ("composition", "centered")]
            .into_iter()
            .collect()
    }

    #[test]
    fn failed_variants_are_null_with_numbered_errors() {
        let response = BatchResponse::assemble(
            &OutputSanitizer::default(),
            None,
            &[record("standing tall by the door")],
            vec![
                Ok("https://cdn.test/a.png".into()),
                Err("render failed".into()),
                Ok("data:image/png;base64,AAAA".into()),
            ],
            Vec::new(),
        );

        assert_eq!(response.requested_count, 3);
        assert_eq!(response.succeeded_count, 1);
        assert_eq!(
            response.asset_urls,
            vec![Some("https://cdn.test/a.png".to_string()), None, None]
        );
        assert_eq!(response.errors[0], "variant 2: render failed");
        assert!(response.errors[1].starts_with("variant 3: "));
    }

    #[test]
    fn serializes_camel_case_and_sanitizes_records() {
        let response = BatchResponse::assemble(
            &OutputSanitizer::default(),
            Some("https://cdn.test/bg.png".into()),
            &[record("arms\ncrossed\u{200B} casually")],
            vec![Ok("https://cdn.test/a.png".into())],
            Vec::new(),
        );
        let json = response.to_json();

        assert_eq!(json["derivedAssetUrl"], "https://cdn.test/bg.png");
        assert_eq!(json["guidanceRecords"][0]["pose"], "arms crossed casually");
        assert_eq!(json["requestedCount"], 1);
        assert_eq!(json["succeededCount"], 1);
    }

    #[test]
    fn derived_url_omitted_when_absent() {
        let response = BatchResponse::assemble(
            &OutputSanitizer::default(),
            None,
            &[],
            vec![Ok("https://cdn.test/a.png".into())],
            Vec::new(),
        );
        assert!(response.to_json().get("derivedAssetUrl").is_none());
    }

    #[test]
    fn minimal_payload_shape() {
        let json = minimal_payload("boom\nagain", 4);
        assert_eq!(json["error"], "boom again");
        assert_eq!(json["requestedCount"], 4);
        assert_eq!(json["succeededCount"], 0);
    }
}
