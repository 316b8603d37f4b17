pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::{Event, EventUpdate, NewEvent};
use crate::models::rsvp::Rsvp;
use crate::models::user::{User, UserSummary};

/// Result of the atomic admit write. The admission controller maps this to
/// its error taxonomy; callers must not trust any earlier read over this.
#[derive(Debug)]
pub enum AdmitOutcome {
    Admitted { rsvp: Rsvp, attendees_count: i64 },
    AlreadyRsvped,
    AtCapacity,
    /// The event was deleted between the controller's read and the write.
    EventGone,
}

/// Persistence backend, selected once at startup.
#[derive(Clone)]
pub enum EventStore {
    Memory(MemoryStore),
    Postgres(PgStore),
}

impl EventStore {
    pub async fn ping(&self) -> Result<(), AppError> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Postgres(s) => s.ping().await,
        }
    }

    // --- users ---

    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        match self {
            Self::Memory(s) => s.create_user(name, email, password_hash).await,
            Self::Postgres(s) => s.create_user(name, email, password_hash).await,
        }
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        match self {
            Self::Memory(s) => Ok(s.find_user(id).await),
            Self::Postgres(s) => s.find_user(id).await,
        }
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        match self {
            Self::Memory(s) => Ok(s.find_user_by_email(email).await),
            Self::Postgres(s) => s.find_user_by_email(email).await,
        }
    }

    // --- events ---

    pub async fn create_event(&self, new: NewEvent) -> Result<Event, AppError> {
        match self {
            Self::Memory(s) => Ok(s.create_event(new).await),
            Self::Postgres(s) => s.create_event(new).await,
        }
    }

    pub async fn find_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        match self {
            Self::Memory(s) => Ok(s.find_event(id).await),
            Self::Postgres(s) => s.find_event(id).await,
        }
    }

    pub async fn update_event(&self, id: Uuid, update: EventUpdate) -> Result<Event, AppError> {
        match self {
            Self::Memory(s) => s.update_event(id, update).await,
            Self::Postgres(s) => s.update_event(id, update).await,
        }
    }

    /// Removes the event and all of its RSVPs.
    pub async fn delete_event(&self, id: Uuid) -> Result<(), AppError> {
        match self {
            Self::Memory(s) => Ok(s.delete_event(id).await),
            Self::Postgres(s) => s.delete_event(id).await,
        }
    }

    pub async fn list_upcoming(
        &self,
        search: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, AppError> {
        match self {
            Self::Memory(s) => Ok(s.list_upcoming(search, now).await),
            Self::Postgres(s) => s.list_upcoming(search, now).await,
        }
    }

    // --- rsvps ---

    /// The atomic admit write: duplicate and capacity checks plus the insert
    /// are indivisible with respect to concurrent calls for the same event.
    pub async fn admit(&self, event_id: Uuid, user_id: Uuid) -> Result<AdmitOutcome, AppError> {
        match self {
            Self::Memory(s) => Ok(s.admit(event_id, user_id).await),
            Self::Postgres(s) => s.admit(event_id, user_id).await,
        }
    }

    /// Deletes the (event, user) RSVP; returns whether a record was removed.
    pub async fn withdraw(&self, event_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        match self {
            Self::Memory(s) => Ok(s.withdraw(event_id, user_id).await),
            Self::Postgres(s) => s.withdraw(event_id, user_id).await,
        }
    }

    pub async fn attendee_count(&self, event_id: Uuid) -> Result<i64, AppError> {
        match self {
            Self::Memory(s) => Ok(s.attendee_count(event_id).await),
            Self::Postgres(s) => s.attendee_count(event_id).await,
        }
    }

    pub async fn attendees(&self, event_id: Uuid) -> Result<Vec<UserSummary>, AppError> {
        match self {
            Self::Memory(s) => Ok(s.attendees(event_id).await),
            Self::Postgres(s) => s.attendees(event_id).await,
        }
    }

    pub async fn list_attending(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, AppError> {
        match self {
            Self::Memory(s) => Ok(s.list_attending(user_id, now).await),
            Self::Postgres(s) => s.list_attending(user_id, now).await,
        }
    }

    pub async fn list_created_by(&self, user_id: Uuid) -> Result<Vec<Event>, AppError> {
        match self {
            Self::Memory(s) => Ok(s.list_created_by(user_id).await),
            Self::Postgres(s) => s.list_created_by(user_id).await,
        }
    }
}
