use crate::analyzer::Analysis;
use crate::config::INVALID_IMAGE_MESSAGE;
use serde::Serialize;

/// Body of a successful `/analyze-label` request. Exactly one of `message`
/// and `analysis` is present
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AnalysisResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

impl From<Analysis> for AnalysisResponse {
    fn from(analysis: Analysis) -> Self {
        match analysis {
            Analysis::Rejected => AnalysisResponse {
                valid: false,
                message: Some(INVALID_IMAGE_MESSAGE.to_string()),
                analysis: None,
            },
            Analysis::Advised(advisory) => AnalysisResponse {
                valid: true,
                message: None,
                analysis: Some(advisory.into_text()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}
