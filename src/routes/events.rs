use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::models::event::{Event, EventResponse, EventUpdate, NewEvent};
use crate::models::user::UserSummary;
use crate::storage::LocalStorage;

const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024; // 5 MB

fn extension_from_mime(mime: &str) -> &str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events).post(create_event))
        .route(
            "/api/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route_layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
}

/// Assemble the full response shape: creator summary plus current attendees.
pub(super) async fn to_response(
    state: &AppState,
    event: Event,
) -> Result<EventResponse, AppError> {
    let creator = state
        .store
        .find_user(event.creator_id)
        .await?
        .as_ref()
        .map(UserSummary::from)
        .ok_or_else(|| AppError::Internal("Event creator missing".into()))?;

    let attendees = state.store.attendees(event.id).await?;
    Ok(event.into_response(creator, attendees, &state.storage))
}

// --- multipart form ---

/// Raw multipart fields of the create/update form. All text fields are
/// required; the image file is optional.
#[derive(Default)]
struct EventForm {
    title: Option<String>,
    description: Option<String>,
    date: Option<String>,
    location: Option<String>,
    capacity: Option<String>,
    image: Option<(String, Vec<u8>)>,
}

struct ValidatedEvent {
    title: String,
    description: String,
    date: DateTime<Utc>,
    location: String,
    capacity: i32,
    image: Option<(String, Vec<u8>)>,
}

async fn parse_event_form(mut multipart: Multipart) -> Result<EventForm, AppError> {
    let mut form = EventForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "image" => {
                let mime = field
                    .content_type()
                    .ok_or_else(|| AppError::BadRequest("Image missing content type".into()))?
                    .to_string();

                if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
                    return Err(AppError::BadRequest(format!(
                        "Unsupported image type: {mime}"
                    )));
                }

                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read image: {e}")))?;

                form.image = Some((mime, bytes.to_vec()));
            }
            "title" | "description" | "date" | "location" | "capacity" => {
                let value = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read {field_name}: {e}"))
                })?;
                match field_name.as_str() {
                    "title" => form.title = Some(value),
                    "description" => form.description = Some(value),
                    "date" => form.date = Some(value),
                    "location" => form.location = Some(value),
                    "capacity" => form.capacity = Some(value),
                    _ => unreachable!(),
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn validate_event_form(form: EventForm) -> Result<ValidatedEvent, AppError> {
    let title = form
        .title
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Title is required".into()))?;
    let description = form
        .description
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Description is required".into()))?;
    let location = form
        .location
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Location is required".into()))?;

    let date = form
        .date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Date is required".into()))?
        .parse::<DateTime<Utc>>()
        .map_err(|_| AppError::BadRequest("Date must be an RFC 3339 timestamp".into()))?;

    let capacity: i32 = form
        .capacity
        .as_deref()
        .map(str::trim)
        .and_then(|s| s.parse().ok())
        .filter(|c| *c >= 1)
        .ok_or_else(|| AppError::BadRequest("Capacity must be at least 1".into()))?;

    Ok(ValidatedEvent {
        title,
        description,
        date,
        location,
        capacity,
        image: form.image,
    })
}

// --- authorization and image helpers ---

fn ensure_creator(event: &Event, user_id: Uuid) -> Result<(), AppError> {
    if event.creator_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// Capacity may not drop below the seats already taken.
fn ensure_capacity_fits(capacity: i32, attendee_count: i64) -> Result<(), AppError> {
    if (capacity as i64) < attendee_count {
        return Err(AppError::BadRequest(format!(
            "Capacity cannot be less than current attendees ({attendee_count})"
        )));
    }
    Ok(())
}

async fn store_image(
    storage: &LocalStorage,
    image: Option<(String, Vec<u8>)>,
) -> Result<Option<String>, AppError> {
    match image {
        Some((mime, bytes)) => {
            let key = format!("{}.{}", Uuid::new_v4(), extension_from_mime(&mime));
            storage.put(&key, &bytes).await?;
            Ok(Some(key))
        }
        None => Ok(None),
    }
}

/// Stores the replacement image (if any) and applies the update. A fresh
/// upload is removed again when the update fails; the previous image file is
/// removed once its replacement has landed.
async fn update_with_image(
    state: &AppState,
    existing: &Event,
    form: ValidatedEvent,
) -> Result<Event, AppError> {
    let new_image = store_image(&state.storage, form.image).await?;

    let result = state
        .store
        .update_event(
            existing.id,
            EventUpdate {
                title: form.title,
                description: form.description,
                date: form.date,
                location: form.location,
                capacity: form.capacity,
                image: new_image.clone(),
            },
        )
        .await;

    match result {
        Ok(event) => {
            if new_image.is_some() {
                if let Some(old) = &existing.image {
                    state.storage.delete(old).await;
                }
            }
            Ok(event)
        }
        Err(e) => {
            if let Some(key) = &new_image {
                state.storage.delete(key).await;
            }
            Err(e)
        }
    }
}

// --- handlers ---

#[derive(Debug, Deserialize)]
struct ListEventsParams {
    search: Option<String>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let events = state
        .store
        .list_upcoming(params.search.as_deref(), Utc::now())
        .await?;

    let mut responses = Vec::with_capacity(events.len());
    for event in events {
        responses.push(to_response(&state, event).await?);
    }

    Ok(Json(responses))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventResponse>, AppError> {
    let event = state
        .store
        .find_event(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

    Ok(Json(to_response(&state, event).await?))
}

async fn create_event(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let form = validate_event_form(parse_event_form(multipart).await?)?;

    if form.date <= Utc::now() {
        return Err(AppError::BadRequest("Date must be in the future".into()));
    }

    let image = store_image(&state.storage, form.image).await?;

    let result = state
        .store
        .create_event(NewEvent {
            title: form.title,
            description: form.description,
            date: form.date,
            location: form.location,
            capacity: form.capacity,
            image: image.clone(),
            creator_id: auth.user_id,
        })
        .await;

    let event = match result {
        Ok(event) => event,
        Err(e) => {
            if let Some(key) = &image {
                state.storage.delete(key).await;
            }
            return Err(e);
        }
    };

    let creator = UserSummary {
        id: auth.user_id,
        name: auth.name,
        email: auth.email,
    };
    Ok((
        StatusCode::CREATED,
        Json(event.into_response(creator, vec![], &state.storage)),
    ))
}

async fn update_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<EventResponse>, AppError> {
    let existing = state
        .store
        .find_event(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

    ensure_creator(&existing, auth.user_id)?;

    let form = validate_event_form(parse_event_form(multipart).await?)?;

    let attendee_count = state.store.attendee_count(id).await?;
    ensure_capacity_fits(form.capacity, attendee_count)?;

    let event = update_with_image(&state, &existing, form).await?;

    Ok(Json(to_response(&state, event).await?))
}

async fn delete_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let event = state
        .store
        .find_event(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

    ensure_creator(&event, auth.user_id)?;

    if let Some(image) = &event.image {
        state.storage.delete(image).await;
    }

    state.store.delete_event(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::Duration;

    use crate::admission::AdmissionController;
    use crate::config::Config;
    use crate::store::{EventStore, MemoryStore};

    /// Memory-backed state with a throwaway upload directory.
    fn test_state() -> AppState {
        let store = EventStore::Memory(MemoryStore::new());
        let upload_dir = std::env::temp_dir()
            .join(format!("gather-events-test-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();
        AppState {
            config: Arc::new(Config {
                database_url: None,
                host: "127.0.0.1".to_string(),
                port: 0,
                upload_dir: upload_dir.clone(),
                jwt_secret: "test-secret".to_string(),
                rsvp_grace_seconds: 0,
            }),
            admission: AdmissionController::new(store.clone(), 0),
            storage: LocalStorage::new(&upload_dir),
            store,
        }
    }

    async fn seed_user(state: &AppState, name: &str) -> Uuid {
        state
            .store
            .create_user(name, &format!("{name}@example.com"), "hash")
            .await
            .unwrap()
            .id
    }

    async fn seed_event(
        state: &AppState,
        creator_id: Uuid,
        capacity: i32,
        image: Option<String>,
    ) -> Event {
        state
            .store
            .create_event(NewEvent {
                title: "Test Event".to_string(),
                description: "A test event".to_string(),
                date: Utc::now() + Duration::days(7),
                location: "Test Hall".to_string(),
                capacity,
                image,
                creator_id,
            })
            .await
            .unwrap()
    }

    fn test_form(capacity: i32, image: Option<(String, Vec<u8>)>) -> ValidatedEvent {
        ValidatedEvent {
            title: "Edited Event".to_string(),
            description: "Edited description".to_string(),
            date: Utc::now() + Duration::days(8),
            location: "Other Hall".to_string(),
            capacity,
            image,
        }
    }

    async fn uploaded_files(state: &AppState) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(state.storage.upload_dir()).await {
            while let Some(entry) = entries.next_entry().await.unwrap() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names
    }

    #[tokio::test]
    async fn only_the_creator_may_modify_an_event() {
        let state = test_state();
        let creator_id = seed_user(&state, "creator").await;
        let other_id = seed_user(&state, "other").await;
        let event = seed_event(&state, creator_id, 10, None).await;

        assert_matches!(ensure_creator(&event, other_id), Err(AppError::Forbidden));
        assert_matches!(ensure_creator(&event, creator_id), Ok(()));
    }

    #[tokio::test]
    async fn capacity_cannot_drop_below_current_attendees() {
        let state = test_state();
        let creator_id = seed_user(&state, "creator").await;
        let event = seed_event(&state, creator_id, 10, None).await;

        for name in ["alice", "bob", "carol"] {
            let user_id = seed_user(&state, name).await;
            state.store.admit(event.id, user_id).await.unwrap();
        }

        let count = state.store.attendee_count(event.id).await.unwrap();
        assert_matches!(
            ensure_capacity_fits(2, count),
            Err(AppError::BadRequest(msg)) if msg.contains('3')
        );
        assert_matches!(ensure_capacity_fits(3, count), Ok(()));
    }

    #[tokio::test]
    async fn failed_update_discards_the_fresh_upload() {
        let state = test_state();
        let creator_id = seed_user(&state, "creator").await;
        let event = seed_event(&state, creator_id, 10, None).await;
        state.store.delete_event(event.id).await.unwrap();

        let form = test_form(10, Some(("image/png".to_string(), vec![0u8; 16])));
        let result = update_with_image(&state, &event, form).await;

        assert_matches!(result, Err(AppError::NotFound(_)));
        assert!(uploaded_files(&state).await.is_empty());
    }

    #[tokio::test]
    async fn replacing_the_image_removes_the_old_file() {
        let state = test_state();
        state.storage.put("old.png", b"old").await.unwrap();
        let creator_id = seed_user(&state, "creator").await;
        let event = seed_event(&state, creator_id, 10, Some("old.png".to_string())).await;

        let form = test_form(10, Some(("image/png".to_string(), vec![0u8; 16])));
        let updated = update_with_image(&state, &event, form).await.unwrap();

        let files = uploaded_files(&state).await;
        assert_eq!(files.len(), 1);
        assert_eq!(Some(files[0].as_str()), updated.image.as_deref());
    }
}
