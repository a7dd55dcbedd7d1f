//! Workflow presets: which stages run and which prompts drive them.

use std::sync::Arc;

use sparkit_core::error::CoreError;
use sparkit_core::extract::{normalize, Extraction, Extractor, GuidanceRecord, GuidanceSchema};
use sparkit_core::request::{Asset, GenerationRequest};

/// Shared suffix keeping the subject consistent across variants.
const IDENTITY_CLAUSE: &str = "Take an authentic photo of the character with an \
    Instagram-friendly composition. The character must keep an identical face, \
    features, skin tone, hairstyle, body proportions and vibe.";

const NEGATIVES: &str = "Avoid: beauty-filter or airbrushed skin, poreless look, \
    exaggerated or distorted anatomy, fake portrait-mode blur, CGI or illustration look.";

const POSE_DESCRIBE_PROMPT: &str = "You are a professional photographer shooting an \
    Instagram photo set. Study the model, the environment and the current pose, then \
    propose {count} different poses that could be posted together as one set. Keep each \
    instruction simple, avoid dramatic poses and do not change the lighting. \
    {instruction}\n\
    Answer in English using exactly this format for every pose:\n\
    - Pose1: ...\n\
    - Camera Position1: ...\n\
    - Composition1: ...\n\
    and so on up to Pose{count}. Output text only.";

const SNAPSHOT_DESCRIBE_PROMPT: &str = "Based on your understanding of this model, write \
    {count} prompts for casual, lived-in Instagram snapshots. Do not stay bound to the \
    current background or outfit, and let every photo tell a different story; naming a \
    city in the scene adds realism. {instruction}\n\
    Answer in English using exactly this format for every photo:\n\
    - {{background1}}: ...\n\
    - {{scene1}}: ...\n\
    - {{lighting and vibe1}}: ...\n\
    - {{pose and expression1}}: ...\n\
    - {{Composition1}}: ...\n\
    - {{camera position1}}: ...\n\
    and so on. Output text only.";

const SNAPSHOT_DERIVE_PROMPT: &str = "Remove every person from this photo and reconstruct \
    the empty background behind them. Keep the original framing, lighting and colours.";

const MIMIC_DESCRIBE_PROMPT: &str = "Describe this photo as a single image-generation \
    prompt: the person's pose and expression, their outfit, the camera angle, the \
    framing and the lighting. Do not describe the person's face or identity. \
    {instruction}\n\
    Output the prompt text only, in English, as one paragraph.";

const MIMIC_DERIVE_PROMPT: &str = "Remove the person from this photo entirely and fill \
    the area with the background that would be behind them. Keep everything else, \
    including framing, perspective and lighting, unchanged.";

const MIMIC_RENDER_PREAMBLE: &str = "Place the character from the first image into the \
    scene of the second image, recreating the shot described below. The character must \
    keep an identical face, features, hairstyle and body proportions.";

/// Record key holding a free-text caption.
pub const CAPTION_KEY: &str = "caption";

/// Optional single-call stage producing an auxiliary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeriveStage {
    pub prompt: &'static str,
    /// When set, a failed derive call fails the whole request.
    pub strict: bool,
}

/// How the describe output becomes per-variant guidance.
#[derive(Debug, Clone)]
pub enum Guidance {
    /// Structured records, one per variant.
    Schema(Arc<Extractor>),
    /// The whole description is one caption shared by every variant.
    Caption,
}

/// Which uploaded images the render stage sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderInputs {
    /// Primary, then references, then the derived asset.
    All,
    /// References, then the derived asset. The primary only seeds the
    /// describe and derive stages.
    ReferencesOnly,
}

/// One named pipeline configuration.
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Ledger task kind and route name.
    pub kind: &'static str,
    describe_prompt: &'static str,
    pub derive: Option<DeriveStage>,
    pub guidance: Guidance,
    pub render_inputs: RenderInputs,
}

impl Workflow {
    /// Pose variants of the same scene.
    pub fn pose_variants() -> Result<Self, CoreError> {
        Ok(Self {
            kind: "pose",
            describe_prompt: POSE_DESCRIBE_PROMPT,
            derive: None,
            guidance: Guidance::Schema(Arc::new(Extractor::new(GuidanceSchema::pose())?)),
            render_inputs: RenderInputs::All,
        })
    }

    /// Lifestyle snapshots in new scenes, with a background-only derivative.
    pub fn scene_variants() -> Result<Self, CoreError> {
        Ok(Self {
            kind: "snapshot",
            describe_prompt: SNAPSHOT_DESCRIBE_PROMPT,
            derive: Some(DeriveStage {
                prompt: SNAPSHOT_DERIVE_PROMPT,
                strict: false,
            }),
            guidance: Guidance::Schema(Arc::new(Extractor::new(GuidanceSchema::snapshot())?)),
            render_inputs: RenderInputs::All,
        })
    }

    /// Recreate the primary photo with the character from the first
    /// reference image. The person-free background is required, so a failed
    /// derive fails the request.
    pub fn mimic() -> Self {
        Self {
            kind: "mimic",
            describe_prompt: MIMIC_DESCRIBE_PROMPT,
            derive: Some(DeriveStage {
                prompt: MIMIC_DERIVE_PROMPT,
                strict: true,
            }),
            guidance: Guidance::Caption,
            render_inputs: RenderInputs::ReferencesOnly,
        }
    }

    /// Every built-in workflow.
    pub fn builtin() -> Result<Vec<Self>, CoreError> {
        Ok(vec![Self::pose_variants()?, Self::scene_variants()?, Self::mimic()])
    }

    /// Reject requests this workflow cannot run.
    pub fn check_request(&self, request: &GenerationRequest) -> Result<(), CoreError> {
        if self.render_inputs == RenderInputs::ReferencesOnly && request.auxiliary.is_empty() {
            return Err(CoreError::Validation(format!(
                "the {} workflow needs a character reference image",
                self.kind
            )));
        }
        Ok(())
    }

    /// Turn the describe output into at most `count` guidance records.
    pub fn guidance(&self, text: &str, count: usize) -> Extraction {
        match &self.guidance {
            Guidance::Schema(extractor) => extractor.extract_detailed(text, count),
            Guidance::Caption => {
                let caption = normalize(text);
                if caption.is_empty() {
                    return Extraction {
                        records: Vec::new(),
                        strategy: None,
                    };
                }
                let record: GuidanceRecord = [(CAPTION_KEY, caption)].into_iter().collect();
                Extraction {
                    records: vec![record; count],
                    strategy: Some("caption"),
                }
            }
        }
    }

    /// Images handed to every render call, in order.
    pub fn render_inputs(&self, request: &GenerationRequest, derived: Option<&Asset>) -> Vec<Asset> {
        let mut inputs = Vec::with_capacity(request.auxiliary.len() + 2);
        if self.render_inputs == RenderInputs::All {
            inputs.push(request.primary.clone());
        }
        inputs.extend(request.auxiliary.iter().cloned());
        inputs.extend(derived.cloned());
        inputs
    }

    /// Prompt for the describe stage.
    pub fn describe_prompt(&self, count: usize, instruction: &str) -> String {
        let instruction = instruction.trim();
        let extra = if instruction.is_empty() {
            String::new()
        } else {
            format!("Additional direction from the user: {instruction}.")
        };
        self.describe_prompt
            .replace("{count}", &count.to_string())
            .replace("{instruction}", &extra)
    }

    /// Prompt for rendering one variant from its guidance record.
    pub fn render_prompt(&self, record: &GuidanceRecord, instruction: &str) -> String {
        let mut prompt = match &self.guidance {
            Guidance::Schema(extractor) => {
                format!("{IDENTITY_CLAUSE}\n\n{}", extractor.schema().render(record))
            }
            Guidance::Caption => format!(
                "{MIMIC_RENDER_PREAMBLE}\n\n{}",
                record.get(CAPTION_KEY).unwrap_or_default()
            ),
        };
        let instruction = instruction.trim();
        if !instruction.is_empty() {
            prompt.push_str("\n\nAdditional direction: ");
            prompt.push_str(instruction);
        }
        prompt.push_str("\n\n");
        prompt.push_str(NEGATIVES);
        prompt
    }
}
