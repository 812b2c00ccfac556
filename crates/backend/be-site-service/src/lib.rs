//! Gift site lifecycle: creation with payment, public and edit views,
//! authenticated edits and image upload.

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod service;
pub mod template;
pub mod types;
pub mod validation;

/// Room for multipart framing on top of the image itself, so the size check
/// in the upload handler reports the error rather than the body limit.
const UPLOAD_BODY_LIMIT: usize = config::MAX_UPLOAD_BYTES + 3 * 1024 * 1024;
const JSON_BODY_LIMIT: usize = 256 * 1024;

pub fn create_router(service: Arc<SiteService>) -> Router {
    let create_governor = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("valid governor config");

    let upload_governor = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(20)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("valid governor config");

    // Reads of a lapsed site can reach the payment processor.
    let read_governor = GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(30)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("valid governor config");

    let create_route = Router::new()
        .route("/api/sites", post(handlers::create_site))
        .layer(GovernorLayer::new(Arc::new(create_governor)))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT));

    let upload_route = Router::new()
        .route("/api/upload", post(handlers::upload_image))
        .layer(GovernorLayer::new(Arc::new(upload_governor)))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT));

    let site_routes = Router::new()
        .route("/api/sites/edit", put(handlers::edit_site))
        .route("/api/sites/{slug}", get(handlers::get_public_site))
        .route("/api/sites/{slug}/edit", get(handlers::get_editable_site))
        .layer(GovernorLayer::new(Arc::new(read_governor)))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT));

    create_route
        .merge(upload_route)
        .merge(site_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

pub use config::SiteConfig;
pub use error::{SiteError, SiteResult};
pub use service::SiteService;
pub use types::{CreateSiteRequest, EditSiteRequest, EditableSite, PublicSite, SiteIdentifier};
