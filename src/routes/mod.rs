pub mod auth;
pub mod events;
pub mod rsvp;

use axum::Router;

use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(events::router())
        .merge(rsvp::router())
}
