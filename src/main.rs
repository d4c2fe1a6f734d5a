use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use carelabel::analyzer::LabelAnalyzer;
use carelabel::config::Settings;
use carelabel::inference::OpenAiClient;
use carelabel::server::{self, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,actix_web=info";

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let settings = Settings::load().context("failed to load settings")?;
    info!("loaded settings: {settings:?}");

    let client = OpenAiClient::new(&settings.inference)?;
    info!("using model {} for label analysis", client.model());

    let state = web::Data::new(AppState {
        analyzer: LabelAnalyzer::new(Arc::new(client)),
        max_upload_bytes: settings.server.max_upload_bytes,
    });

    let addr = settings.server.bind_addr();
    info!("listening on {addr}");

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .configure(server::configure)
    })
    .bind(&addr)?
    .run()
    .await?;

    Ok(())
}
