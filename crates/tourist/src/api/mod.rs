mod pin_routes;
mod settings_routes;

use axum::Router;

use crate::common::AppState;

pub use pin_routes::{AlbumView, PhotoView, pin_routes};
pub use settings_routes::settings_routes;

/// All API routes bound to `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(pin_routes())
        .merge(settings_routes())
        .with_state(state)
}
