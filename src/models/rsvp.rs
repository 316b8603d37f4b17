use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One attendance record. Created by admission, deleted by withdrawal,
/// never updated in place.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Rsvp {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AdmitResponse {
    pub rsvp: Rsvp,
    pub attendees_count: i64,
}
