use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use uuid::Uuid;

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::event::EventResponse;
use crate::models::rsvp::AdmitResponse;
use crate::routes::events::to_response;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/rsvp/user", get(attending_events))
        .route("/api/rsvp/user/created", get(created_events))
        .route("/api/rsvp/{event_id}", post(rsvp).delete(cancel_rsvp))
}

async fn rsvp(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(event_id): Path<Uuid>,
) -> Result<Json<AdmitResponse>, AppError> {
    let admitted = state
        .admission
        .admit(event_id, auth.user_id, Utc::now())
        .await?;

    Ok(Json(AdmitResponse {
        rsvp: admitted.rsvp,
        attendees_count: admitted.attendees_count,
    }))
}

async fn cancel_rsvp(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(event_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.admission.withdraw(event_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn attending_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let events = state
        .admission
        .list_attending(auth.user_id, Utc::now())
        .await?;

    let mut responses = Vec::with_capacity(events.len());
    for event in events {
        responses.push(to_response(&state, event).await?);
    }

    Ok(Json(responses))
}

async fn created_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let events = state.admission.list_created_by(auth.user_id).await?;

    let mut responses = Vec::with_capacity(events.len());
    for event in events {
        responses.push(to_response(&state, event).await?);
    }

    Ok(Json(responses))
}
