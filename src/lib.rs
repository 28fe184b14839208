pub mod browser_pool;
pub mod cnfg;
pub mod error;
pub mod html2pdf;
pub mod pdf_options;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use browser_pool::PdfRenderer;
use cnfg::AppConfig;
use html2pdf::{convert, convert_batch, convert_raw, health};

#[derive(Clone)]
pub struct AppState {
    pub renderer: Arc<dyn PdfRenderer>,
    pub config: Arc<AppConfig>,
}

pub fn app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let body_limit = app_state.config.max_body_size;

    let conversion_routes = Router::new()
        .route("/convert", post(convert))
        .route("/convert-raw", post(convert_raw))
        .route("/convert/batch", post(convert_batch))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state);

    Router::new()
        .merge(conversion_routes)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
