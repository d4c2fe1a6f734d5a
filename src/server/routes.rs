//! HTTP handlers. `/analyze-label` runs the label pipeline on an uploaded
//! image; `/health` and `/` describe the running service.

use super::protocol::{AnalysisResponse, EndpointInfo, HealthResponse, IndexResponse};
use super::{upload, ApiError, AppState};
use actix_multipart::Multipart;
use actix_web::{get, post, web, Responder};
use tracing::info;

type Result<T> = std::result::Result<T, ApiError>;

#[post("/analyze-label")]
pub async fn analyze_label(payload: Multipart, state: web::Data<AppState>) -> Result<impl Responder> {
    let image = upload::read_image(payload, state.max_upload_bytes).await?;
    info!("got analysis request: {image:?}");

    let analysis = state.analyzer.analyze(&image).await?;

    Ok(web::Json(AnalysisResponse::from(analysis)))
}

/// Liveness, independent of the inference service
#[get("/health")]
pub async fn health() -> impl Responder {
    web::Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[get("/")]
pub async fn index() -> impl Responder {
    web::Json(IndexResponse {
        status: "running",
        message: "Laundry care label analysis API",
        endpoints: vec![
            EndpointInfo {
                method: "POST",
                path: "/analyze-label",
                description: "Analyze an uploaded care label image",
            },
            EndpointInfo {
                method: "GET",
                path: "/health",
                description: "Service health",
            },
        ],
    })
}
