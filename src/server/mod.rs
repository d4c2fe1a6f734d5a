//! The user-facing JSON web server. Uploads are read here, handed to the
//! `LabelAnalyzer`, and every failure is rendered as a `{"detail": ...}` body.

use crate::analyzer::{AnalysisError, LabelAnalyzer};
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use std::collections::HashMap;
use thiserror::Error;

pub mod protocol;
pub mod routes;
mod upload;

/// Shared, read-only state of every worker
#[derive(Clone)]
pub struct AppState {
    pub analyzer: LabelAnalyzer,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, unreadable, empty or non-image upload
    #[error("{0}")]
    BadRequest(String),

    #[error("File too large: limit is {0} bytes")]
    PayloadTooLarge(usize),

    /// The inference service failed on either step
    #[error("Inference service error: {0}")]
    Upstream(String),

    #[error("Unexpected error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl actix_web::error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let err = HashMap::from([("detail", self.to_string())]);

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(err)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> ApiError {
        match err {
            AnalysisError::Inference(err) => ApiError::Upstream(err.to_string()),
            err => ApiError::Internal(err.into()),
        }
    }
}

/// Register the routes on an actix `App`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(routes::analyze_label)
        .service(routes::health)
        .service(routes::index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InferenceError;
    use actix_web::body::to_bytes;
    use actix_web::ResponseError;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::BadRequest("Empty file uploaded".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::PayloadTooLarge(10).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::Upstream("timeout".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn analysis_errors_are_classified() {
        let upstream: ApiError = AnalysisError::Inference(InferenceError::Api {
            status: 500,
            message: "The server had an error".into(),
        })
        .into();
        assert_eq!(
            upstream.to_string(),
            "Inference service error: status 500: The server had an error"
        );

        let internal: ApiError = AnalysisError::MissingAdvisory.into();
        assert!(matches!(internal, ApiError::Internal(_)));
        assert_eq!(
            internal.to_string(),
            "Unexpected error: inference service returned no advisory text"
        );
    }

    #[actix_web::test]
    async fn error_body_carries_detail() {
        let res = ApiError::BadRequest("No file uploaded".into()).error_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(res.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "detail": "No file uploaded" }));
    }
}
