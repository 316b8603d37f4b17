use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::user::UserSummary;
use crate::storage::LocalStorage;

#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Scheduled time of the event itself, not the row timestamps.
    pub date: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    /// Storage key of the uploaded event image, if any.
    pub image: Option<String>,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub image_url: Option<String>,
    pub creator: UserSummary,
    pub attendees: Vec<UserSummary>,
    pub attendees_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn into_response(
        self,
        creator: UserSummary,
        attendees: Vec<UserSummary>,
        storage: &LocalStorage,
    ) -> EventResponse {
        let image_url = self.image.as_deref().map(|key| storage.public_url(key));

        EventResponse {
            id: self.id,
            title: self.title,
            description: self.description,
            date: self.date,
            location: self.location,
            capacity: self.capacity,
            image_url,
            creator,
            attendees_count: attendees.len(),
            attendees,
            created_at: self.created_at,
        }
    }
}

/// Validated input for event creation; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub image: Option<String>,
    pub creator_id: Uuid,
}

/// Full replacement of the editable fields; `image: None` keeps the current one.
#[derive(Debug, Clone)]
pub struct EventUpdate {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub image: Option<String>,
}
