use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, AppState};

pub fn create_router(app_state: AppState) -> Router {
    let admin = Router::new()
        .route("/status", get(handlers::sync_status))
        .route("/logs", get(handlers::sync_logs))
        .route("/sync", post(handlers::trigger_sync))
        .route("/toggle", post(handlers::toggle_sync));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/posts", get(handlers::list_posts))
        .nest("/admin/wordpress", admin)
        .with_state(app_state);

    Router::new().nest("/api", api)
}
