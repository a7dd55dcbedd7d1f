//! Structured extraction of guidance records from generated text.
//!
//! The describe stage asks a text model for N numbered variants laid out as
//! `Label N: value` lines. Models drift from that layout constantly (bold
//! headings, per-variant blocks, full-width colons, prose), so extraction is
//! an ordered list of strategies from strictest to loosest. The first
//! strategy that produces at least one complete record wins and later ones
//! never run. Nothing parsing is an empty result, never an error.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Highest variant index tried by the per-index direct lookup.
pub const MAX_DIRECT_INDEX: usize = 10;

/// Minimum length for pose-role fields (the subject's action).
pub const POSE_FIELD_MIN_LEN: usize = 10;

/// Minimum length for every other field.
pub const DEFAULT_FIELD_MIN_LEN: usize = 5;

/// Optional list punctuation or markdown heading in front of a marker.
const LIST_PREFIX: &str = r"(?:(?:#{1,6}|[-*•+]|\d+[.)])[ \t]*)?";

/// Optional opening markup around a label, captured to tell wrapped markers apart.
const OPEN_WRAP: &str = r"(?P<open>\*\*|__|\{\{)?";

/// Optional opening markup, uncaptured.
const PLAIN_OPEN_WRAP: &str = r"(?:\*\*|__|\{\{)?";

/// Optional closing markup around a label.
const CLOSE_WRAP: &str = r"(?:\*\*|__|\}\})?";

/// ASCII or full-width colon.
const SEPARATOR: &str = r"[:：]";

/// Closing bold that follows the colon in `**Pose:**`.
const TRAILING_WRAP: &str = r"(?:[ \t]*(?:\*\*|__))?";

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// One named field of a guidance record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Key used in the serialized record (`cameraPosition`).
    pub key: &'static str,
    /// Label the model writes in front of the value (`Camera Position`).
    pub label: &'static str,
    /// Alternative labels accepted for the same field.
    pub aliases: &'static [&'static str],
    /// Minimum value length in characters after normalization.
    pub min_len: usize,
}

impl FieldSpec {
    fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.label).chain(self.aliases.iter().copied())
    }
}

/// Field layout and variant-block spellings for one workflow's guidance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidanceSchema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
    /// "Start of variant" spellings, tried in order (`Pose 1`, `Variant 1`, ...).
    pub block_markers: Vec<&'static str>,
}

impl GuidanceSchema {
    /// Pose / camera position / composition guidance for pose variants.
    pub fn pose() -> Self {
        Self {
            name: "pose",
            fields: vec![
                FieldSpec {
                    key: "pose",
                    label: "Pose",
                    aliases: &["Action"],
                    min_len: POSE_FIELD_MIN_LEN,
                },
                FieldSpec {
                    key: "cameraPosition",
                    label: "Camera Position",
                    aliases: &["Camera Angle"],
                    min_len: DEFAULT_FIELD_MIN_LEN,
                },
                FieldSpec {
                    key: "composition",
                    label: "Composition",
                    aliases: &["Framing"],
                    min_len: DEFAULT_FIELD_MIN_LEN,
                },
            ],
            block_markers: vec!["Pose", "Variant", "Option"],
        }
    }

    /// Scene guidance for snapshot variants.
    pub fn snapshot() -> Self {
        Self {
            name: "snapshot",
            fields: vec![
                FieldSpec {
                    key: "background",
                    label: "Background",
                    aliases: &[],
                    min_len: DEFAULT_FIELD_MIN_LEN,
                },
                FieldSpec {
                    key: "scene",
                    label: "Scene",
                    aliases: &[],
                    min_len: DEFAULT_FIELD_MIN_LEN,
                },
                FieldSpec {
                    key: "lightingAndVibe",
                    label: "Lighting and vibe",
                    aliases: &["Lighting"],
                    min_len: DEFAULT_FIELD_MIN_LEN,
                },
                FieldSpec {
                    key: "poseAndExpression",
                    label: "Pose and expression",
                    aliases: &[],
                    min_len: POSE_FIELD_MIN_LEN,
                },
                FieldSpec {
                    key: "composition",
                    label: "Composition",
                    aliases: &[],
                    min_len: DEFAULT_FIELD_MIN_LEN,
                },
                FieldSpec {
                    key: "cameraPosition",
                    label: "Camera position",
                    aliases: &["Camera Angle"],
                    min_len: DEFAULT_FIELD_MIN_LEN,
                },
            ],
            block_markers: vec!["Variant", "Option", "Set"],
        }
    }

    /// Render a record back into `Label: value` lines for a render prompt.
    pub fn render(&self, record: &GuidanceRecord) -> String {
        self.fields
            .iter()
            .filter_map(|field| record.get(field.key).map(|v| format!("{}: {v}", field.label)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Index of the field whose label or alias equals `spelling`.
    fn field_for_label(&self, spelling: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.labels().any(|l| l.eq_ignore_ascii_case(spelling)))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One extracted record. Serializes as a flat JSON object in schema field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuidanceRecord(IndexMap<String, String>);

impl GuidanceRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All values joined with ` | `, used as a task description.
    pub fn summary(&self) -> String {
        self.0.values().cloned().collect::<Vec<_>>().join(" | ")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GuidanceRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Records plus the name of the strategy that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub records: Vec<GuidanceRecord>,
    pub strategy: Option<&'static str>,
}

/// Strip markup wrappers, collapse whitespace and trim.
pub fn normalize(raw: &str) -> String {
    let stripped = raw
        .replace("**", "")
        .replace("__", "")
        .replace("{{", "")
        .replace("}}", "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Marker scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Field(usize),
    Block(usize),
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    kind: MarkerKind,
    index: Option<usize>,
    wrapped: bool,
    start: usize,
    end: usize,
}

/// A text plus every field and block marker found in it, ordered by position.
struct Scan<'t> {
    text: &'t str,
    markers: Vec<Marker>,
}

impl Scan<'_> {
    fn fields(&self, field: usize) -> impl Iterator<Item = &Marker> {
        self.markers
            .iter()
            .filter(move |m| m.kind == MarkerKind::Field(field))
    }

    /// Normalized text from the end of `marker` to the next marker or `limit`.
    fn value_of(&self, marker: &Marker, limit: usize) -> String {
        let stop = self
            .markers
            .iter()
            .map(|m| m.start)
            .filter(|&start| start >= marker.end)
            .min()
            .unwrap_or(self.text.len())
            .min(limit);
        if stop <= marker.end {
            return String::new();
        }
        normalize(&self.text[marker.end..stop])
    }
}

/// Partial records keyed by variant index; one slot per schema field.
type Partials = BTreeMap<usize, Vec<Option<String>>>;

type Strategy = fn(&Extractor, &Scan<'_>) -> Partials;

/// Strategies from strictest to loosest.
const STRATEGIES: [(&str, Strategy); 4] = [
    ("direct", direct_lookup),
    ("blocks", block_segmentation),
    ("scan", whole_text_scan),
    ("lines", line_heuristic),
];

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Compiled extractor for one [`GuidanceSchema`]. Cheap to share behind `Arc`.
#[derive(Debug, Clone)]
pub struct Extractor {
    schema: GuidanceSchema,
    field_patterns: Vec<Regex>,
    block_patterns: Vec<Regex>,
    line_patterns: Vec<Regex>,
}

impl Extractor {
    pub fn new(schema: GuidanceSchema) -> Result<Self, CoreError> {
        let field_patterns = schema
            .fields
            .iter()
            .map(|field| {
                compile(&format!(
                    r"(?mi)^[ \t]*{LIST_PREFIX}{OPEN_WRAP}[ \t]*(?:{labels})[ \t]*(?P<idx>\d+)?[ \t]*{CLOSE_WRAP}[ \t]*{SEPARATOR}{TRAILING_WRAP}",
                    labels = alternation(field.labels()),
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let block_patterns = schema
            .block_markers
            .iter()
            .map(|spelling| {
                compile(&format!(
                    r"(?mi)^[ \t]*{LIST_PREFIX}{PLAIN_OPEN_WRAP}[ \t]*{label}[ \t]*(?P<idx>\d+)[ \t]*{CLOSE_WRAP}[ \t]*(?:[:：.)]|-)?{TRAILING_WRAP}",
                    label = label_pattern(spelling),
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let line_patterns = schema
            .fields
            .iter()
            .map(|field| {
                compile(&format!(
                    r"(?i){PLAIN_OPEN_WRAP}\b(?:{labels})[ \t]*\d*[ \t]*{CLOSE_WRAP}[ \t]*{SEPARATOR}{TRAILING_WRAP}",
                    labels = alternation(field.labels()),
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            schema,
            field_patterns,
            block_patterns,
            line_patterns,
        })
    }

    pub fn schema(&self) -> &GuidanceSchema {
        &self.schema
    }

    /// Extract up to `expected_count` complete records in index order.
    pub fn extract(&self, text: &str, expected_count: usize) -> Vec<GuidanceRecord> {
        self.extract_detailed(text, expected_count).records
    }

    /// Like [`extract`](Self::extract), also naming the strategy that matched.
    pub fn extract_detailed(&self, text: &str, expected_count: usize) -> Extraction {
        if expected_count == 0 || text.trim().is_empty() {
            return Extraction {
                records: Vec::new(),
                strategy: None,
            };
        }

        let scan = self.scan(text);
        for (name, strategy) in STRATEGIES {
            let mut records = self.finalize(strategy(self, &scan));
            if !records.is_empty() {
                records.truncate(expected_count);
                return Extraction {
                    records,
                    strategy: Some(name),
                };
            }
        }

        Extraction {
            records: Vec::new(),
            strategy: None,
        }
    }

    fn width(&self) -> usize {
        self.schema.fields.len()
    }

    fn scan<'t>(&self, text: &'t str) -> Scan<'t> {
        let mut markers = Vec::new();

        for (field, re) in self.field_patterns.iter().enumerate() {
            for caps in re.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                markers.push(Marker {
                    kind: MarkerKind::Field(field),
                    index: caps.name("idx").and_then(|m| m.as_str().parse().ok()),
                    wrapped: caps.name("open").is_some(),
                    start: whole.start(),
                    end: whole.end(),
                });
            }
        }

        for (block, re) in self.block_patterns.iter().enumerate() {
            for caps in re.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                markers.push(Marker {
                    kind: MarkerKind::Block(block),
                    index: caps.name("idx").and_then(|m| m.as_str().parse().ok()),
                    wrapped: false,
                    start: whole.start(),
                    end: whole.end(),
                });
            }
        }

        markers.sort_by_key(|m| (m.start, m.end));
        Scan { text, markers }
    }

    /// Normalize every slot and keep only records whose fields all meet
    /// their minimum length.
    fn finalize(&self, partials: Partials) -> Vec<GuidanceRecord> {
        partials
            .into_values()
            .filter_map(|slots| {
                let mut fields = IndexMap::with_capacity(self.width());
                for (spec, slot) in self.schema.fields.iter().zip(slots) {
                    let value = normalize(&slot?);
                    if value.chars().count() < spec.min_len {
                        return None;
                    }
                    fields.insert(spec.key.to_string(), value);
                }
                Some(GuidanceRecord(fields))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// `Label N:` for N = 1.. until the first index missing any field.
fn direct_lookup(extractor: &Extractor, scan: &Scan<'_>) -> Partials {
    let mut partials = Partials::new();
    for index in 1..=MAX_DIRECT_INDEX {
        let slots: Vec<Option<String>> = (0..extractor.width())
            .map(|field| {
                scan.fields(field)
                    .filter(|m| m.index == Some(index))
                    .map(|m| scan.value_of(m, scan.text.len()))
                    .find(|v| !v.is_empty())
            })
            .collect();
        if slots.iter().any(Option::is_none) {
            break;
        }
        partials.insert(index, slots);
    }
    partials
}

/// Split on the first block spelling present, then read fields per block.
fn block_segmentation(extractor: &Extractor, scan: &Scan<'_>) -> Partials {
    let mut partials = Partials::new();
    let width = extractor.width();

    let Some(spelling) = (0..extractor.block_patterns.len()).find(|&b| {
        scan.markers
            .iter()
            .any(|m| m.kind == MarkerKind::Block(b))
    }) else {
        return partials;
    };

    let blocks: Vec<&Marker> = scan
        .markers
        .iter()
        .filter(|m| m.kind == MarkerKind::Block(spelling))
        .collect();
    let leading_field = extractor
        .schema
        .field_for_label(extractor.schema.block_markers[spelling]);

    for (pos, block) in blocks.iter().enumerate() {
        let Some(index) = block.index else { continue };
        let block_end = blocks.get(pos + 1).map_or(scan.text.len(), |next| next.start);
        let slots = partials.entry(index).or_insert_with(|| vec![None; width]);

        for (field, slot) in slots.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }

            let mut candidates: Vec<&Marker> = scan
                .fields(field)
                .filter(|m| m.start >= block.start && m.start < block_end)
                .filter(|m| m.index.map_or(true, |i| i == index))
                .collect();
            candidates.sort_by_key(|m| (!m.wrapped, m.index.is_none()));

            *slot = candidates
                .into_iter()
                .map(|m| scan.value_of(m, block_end))
                .find(|v| !v.is_empty());

            if slot.is_none() && leading_field == Some(field) {
                let leading = scan.value_of(block, block_end);
                if !leading.is_empty() {
                    *slot = Some(leading);
                }
            }
        }
    }

    partials
}

/// Block results topped up with any index-suffixed field found anywhere.
fn whole_text_scan(extractor: &Extractor, scan: &Scan<'_>) -> Partials {
    let mut partials = block_segmentation(extractor, scan);
    let width = extractor.width();

    for marker in &scan.markers {
        let (MarkerKind::Field(field), Some(index)) = (marker.kind, marker.index) else {
            continue;
        };
        let slots = partials.entry(index).or_insert_with(|| vec![None; width]);
        if slots[field].is_some() {
            continue;
        }
        let value = scan.value_of(marker, scan.text.len());
        if value.chars().count() >= extractor.schema.fields[field].min_len {
            slots[field] = Some(value);
        }
    }

    partials
}

/// `label: value` anywhere in a line; a repeated field starts the next record.
fn line_heuristic(extractor: &Extractor, scan: &Scan<'_>) -> Partials {
    let width = extractor.width();
    let mut partials = Partials::new();
    let mut current: Vec<Option<String>> = vec![None; width];
    let mut next_index = 1;

    for line in scan.text.lines() {
        let hit = extractor
            .line_patterns
            .iter()
            .enumerate()
            .filter_map(|(field, re)| re.find(line).map(|m| (m.start(), field, m.end())))
            .min();
        let Some((_, field, end)) = hit else { continue };

        let value = normalize(&line[end..]);
        if value.is_empty() {
            continue;
        }
        if current[field].is_some() {
            partials.insert(next_index, std::mem::replace(&mut current, vec![None; width]));
            next_index += 1;
        }
        current[field] = Some(value);
    }

    if current.iter().any(Option::is_some) {
        partials.insert(next_index, current);
    }
    partials
}

// ---------------------------------------------------------------------------
// Pattern helpers
// ---------------------------------------------------------------------------

/// Escaped label with flexible whitespace between its words.
fn label_pattern(label: &str) -> String {
    label
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[ \t]*")
}

fn alternation<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    labels.map(label_pattern).collect::<Vec<_>>().join("|")
}

fn compile(pattern: &str) -> Result<Regex, CoreError> {
    Regex::new(pattern)
        .map_err(|e| CoreError::Internal(format!("invalid extractor pattern: {e}")))
}
