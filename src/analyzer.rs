//! The label analysis pipeline. An upload is first checked for relevance
//! ("is this a laundry care label?") and, only if the model says it is, a
//! second request extracts the care advisory. The two calls never overlap.

use crate::config::{ADVISORY_MAX_TOKENS, VALIDATION_MAX_TOKENS};
use crate::inference::{InferenceError, VisionModel, VisionPrompt};
use base64::{engine::general_purpose, Engine as _};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub mod prompts {
    pub const VALIDATOR_SYSTEM: &str = "You are an image validator for laundry care labels. Your task is to determine if the image contains valid laundry care symbols/labels. Respond with only 'valid' or 'invalid'.";

    pub const VALIDATOR_USER: &str = "Is this a valid image of laundry care labels?";

    pub const ADVISOR_SYSTEM: &str = "You are a laundry care advisor. Be extremely concise and clear. For each section, provide only the most important information in a single bullet point.

Format your response using these exact headers, with one bullet point per section:

## Water Temperature
• [Single most appropriate temperature]

## Washing Method
• [One key washing instruction]

## Drying
• [One key drying instruction]

## Ironing
• [One key ironing instruction]

## Special Care
• [One key special instruction, if needed]";

    pub const ADVISOR_USER: &str = "What are the essential care instructions for this garment?";

    /// Section headings the advisor is asked for, in order
    pub const ADVISORY_SECTIONS: [&str; 5] = [
        "Water Temperature",
        "Washing Method",
        "Drying",
        "Ironing",
        "Special Care",
    ];
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("inference service returned no advisory text")]
    MissingAdvisory,
}

/// An uploaded image, held only for the duration of one request
#[derive(Clone)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    mime: String,
}

impl Debug for UploadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadedImage {{ bytes: <{} bytes>, mime: {:?} }}",
            self.bytes.len(),
            self.mime
        )
    }
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The image as a base 64 `data:` URI, the form the inference service
    /// accepts inline images in
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// The relevance check's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
}

impl Verdict {
    /// Only a reply starting with "valid" (any case) counts. Refusals,
    /// empty replies and any other phrasing are `Invalid`
    pub fn from_reply(reply: &str) -> Self {
        match reply.to_lowercase().starts_with("valid") {
            true => Verdict::Valid,
            false => Verdict::Invalid,
        }
    }
}

/// One `## Heading` block of an advisory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisorySection<'a> {
    pub heading: &'a str,
    pub bullets: Vec<&'a str>,
}

/// The advisor's reply. The text is the contract and is returned verbatim;
/// `sections` is a best-effort reading of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CareAdvisory(String);

impl CareAdvisory {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn into_text(self) -> String {
        self.0
    }

    /// Split the text into markdown sections. Lines outside a section and
    /// lines that are neither headings nor bullets are skipped
    pub fn sections(&self) -> Vec<AdvisorySection<'_>> {
        let mut sections: Vec<AdvisorySection<'_>> = Vec::new();

        for line in self.0.lines().map(str::trim) {
            if let Some(heading) = line.strip_prefix("## ") {
                sections.push(AdvisorySection {
                    heading: heading.trim(),
                    bullets: vec![],
                });
            } else if let Some(bullet) = ["•", "-", "*"]
                .iter()
                .find_map(|marker| line.strip_prefix(marker))
            {
                if let Some(section) = sections.last_mut() {
                    section.bullets.push(bullet.trim());
                }
            }
        }

        sections
    }

    /// Whether the text follows the five-section, one-bullet template
    pub fn is_well_formed(&self) -> bool {
        let sections = self.sections();

        sections.len() == prompts::ADVISORY_SECTIONS.len()
            && sections
                .iter()
                .zip(prompts::ADVISORY_SECTIONS)
                .all(|(section, expected)| {
                    section.heading == expected && section.bullets.len() == 1
                })
    }
}

/// Outcome of a successful analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    /// The relevance check did not answer "valid"
    Rejected,

    /// The care advisory for a label image
    Advised(CareAdvisory),
}

/// Runs the two-step prompt pipeline against a shared `VisionModel`
#[derive(Clone)]
pub struct LabelAnalyzer {
    model: Arc<dyn VisionModel>,
}

impl LabelAnalyzer {
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        Self { model }
    }

    /// Analyze one upload. The advisory is only requested after the
    /// relevance check answered "valid"
    #[tracing::instrument(skip(self, image), fields(mime = image.mime(), bytes = image.len()))]
    pub async fn analyze(&self, image: &UploadedImage) -> Result<Analysis, AnalysisError> {
        let image_url = image.data_uri();

        let verdict = self.validate(&image_url).await?;
        if verdict == Verdict::Invalid {
            info!("image rejected by the relevance check");
            return Ok(Analysis::Rejected);
        }

        let advisory = self.advise(&image_url).await?;
        if !advisory.is_well_formed() {
            warn!("advisory does not follow the five-section template");
        }

        info!("finished serving analysis request");
        Ok(Analysis::Advised(advisory))
    }

    /// Ask whether the image shows laundry care symbols
    pub async fn validate(&self, image_url: &str) -> Result<Verdict, InferenceError> {
        let prompt = VisionPrompt {
            system: prompts::VALIDATOR_SYSTEM,
            text: prompts::VALIDATOR_USER,
            image_url,
            max_tokens: VALIDATION_MAX_TOKENS,
        };

        let reply = self.model.complete(&prompt).await?.unwrap_or_default();
        let verdict = Verdict::from_reply(&reply);
        info!("relevance check answered {reply:?} ({verdict:?})");

        Ok(verdict)
    }

    /// Ask for the five-section care advisory
    pub async fn advise(&self, image_url: &str) -> Result<CareAdvisory, AnalysisError> {
        let prompt = VisionPrompt {
            system: prompts::ADVISOR_SYSTEM,
            text: prompts::ADVISOR_USER,
            image_url,
            max_tokens: ADVISORY_MAX_TOKENS,
        };

        match self.model.complete(&prompt).await? {
            Some(text) => Ok(CareAdvisory::new(text)),
            None => Err(AnalysisError::MissingAdvisory),
        }
    }
}
