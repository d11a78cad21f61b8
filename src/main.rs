// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use anyhow::Context;
use log::info;
use std::sync::Arc;

mod config;
mod editor;
mod errors;
mod handlers;
mod models;
mod services;

use crate::config::AppConfig;
use crate::editor::Workflow;
use crate::services::{FfmpegFrameExtractor, GeminiService, ImageProcessor, SessionStore};

#[derive(Clone)]
pub struct AppState {
    session_store: Arc<SessionStore>,
    workflow: Arc<Workflow>,
    image_processor: Arc<ImageProcessor>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Pixshop service...");

    let config = AppConfig::from_env().context("failed to load configuration")?;

    let backend = Arc::new(GeminiService::new(&config));
    let frames = Arc::new(FfmpegFrameExtractor::new(
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
    ));

    let app_state = AppState {
        session_store: Arc::new(SessionStore::new()),
        workflow: Arc::new(Workflow::new(backend, frames, &config)),
        image_processor: Arc::new(ImageProcessor::new(config.max_dimension)),
    };

    info!(
        "Using image model {} and video model {}, {} variations per request",
        config.image_model, config.video_model, config.variation_count
    );
    info!("Starting HTTP server on {}", config.bind_addr);

    let static_dir = config.static_dir.clone();
    HttpServer::new(move || {
        let app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
            .route("/health", web::get().to(health_check));

        match &static_dir {
            Some(dir) => app.service(actix_files::Files::new("/", dir).index_file("index.html")),
            None => app,
        }
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("failed to bind {}", config.bind_addr))?
    .run()
    .await
    .context("server terminated unexpectedly")?;

    Ok(())
}

async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "pixshop",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": data.session_store.len().await
    }))
}
