//! HTTP surface: JSON views, form posts with 303 redirects, cookie sessions
//! and problem+json errors.

pub mod handlers;
pub mod problem;
pub mod session;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::auth::{AuthManager, SessionStore};
use crate::import::{PHOTO_URL_PREFIX, PhotoStore};
use crate::lifecycle::LifecycleEngine;

pub use problem::{ApiProblem, ApiResult};
pub use session::{AdminSession, CurrentSession};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub auth: Arc<AuthManager>,
    pub sessions: Arc<SessionStore>,
    pub photos: Arc<PhotoStore>,
}

impl AppState {
    pub fn new(
        engine: Arc<LifecycleEngine>,
        auth: Arc<AuthManager>,
        sessions: Arc<SessionStore>,
        photos: Arc<PhotoStore>,
    ) -> Self {
        Self {
            engine,
            auth,
            sessions,
            photos,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let photos = ServeDir::new(state.photos.dir());

    Router::new()
        .route("/health", get(handlers::health))
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/", get(handlers::overview))
        .route("/update/:id", get(handlers::details).post(handlers::update))
        .route("/release/:id", post(handlers::release))
        .route("/clear/:id", post(handlers::clear))
        .route("/photo/:id", post(handlers::upload_photo))
        .nest_service(PHOTO_URL_PREFIX, photos)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
