use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::{Event, EventUpdate, NewEvent};
use crate::models::rsvp::Rsvp;
use crate::models::user::{User, UserSummary};
use crate::store::AdmitOutcome;

/// In-memory backend for development and tests. All state is owned by the
/// instance; the single mutex makes each operation (in particular the
/// check-and-insert in [`MemoryStore::admit`]) one critical section.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    rsvps: Vec<Rsvp>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- users ---

    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|u| u.email == email) {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub async fn find_user(&self, id: Uuid) -> Option<User> {
        self.inner.lock().await.users.get(&id).cloned()
    }

    pub async fn find_user_by_email(&self, email: &str) -> Option<User> {
        let inner = self.inner.lock().await;
        inner.users.values().find(|u| u.email == email).cloned()
    }

    // --- events ---

    pub async fn create_event(&self, new: NewEvent) -> Event {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            date: new.date,
            location: new.location,
            capacity: new.capacity,
            image: new.image,
            creator_id: new.creator_id,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().await.events.insert(event.id, event.clone());
        event
    }

    pub async fn find_event(&self, id: Uuid) -> Option<Event> {
        self.inner.lock().await.events.get(&id).cloned()
    }

    pub async fn update_event(&self, id: Uuid, update: EventUpdate) -> Result<Event, AppError> {
        let mut inner = self.inner.lock().await;
        let event = inner
            .events
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Event not found".into()))?;
        event.title = update.title;
        event.description = update.description;
        event.date = update.date;
        event.location = update.location;
        event.capacity = update.capacity;
        if let Some(image) = update.image {
            event.image = Some(image);
        }
        event.updated_at = Utc::now();
        Ok(event.clone())
    }

    pub async fn delete_event(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        inner.events.remove(&id);
        inner.rsvps.retain(|r| r.event_id != id);
    }

    pub async fn list_upcoming(&self, search: Option<&str>, now: DateTime<Utc>) -> Vec<Event> {
        let inner = self.inner.lock().await;
        let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|e| e.date >= now)
            .filter(|e| match &needle {
                None => true,
                Some(q) => {
                    e.title.to_lowercase().contains(q)
                        || e.description.to_lowercase().contains(q)
                        || e.location.to_lowercase().contains(q)
                }
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        events
    }

    // --- rsvps ---

    pub async fn admit(&self, event_id: Uuid, user_id: Uuid) -> AdmitOutcome {
        let mut inner = self.inner.lock().await;

        let capacity = match inner.events.get(&event_id) {
            Some(e) => e.capacity as i64,
            None => return AdmitOutcome::EventGone,
        };

        // Duplicate before capacity: the rejection reason must not depend on
        // how full the event happens to be.
        if inner
            .rsvps
            .iter()
            .any(|r| r.event_id == event_id && r.user_id == user_id)
        {
            return AdmitOutcome::AlreadyRsvped;
        }

        let count = inner
            .rsvps
            .iter()
            .filter(|r| r.event_id == event_id)
            .count() as i64;
        if count >= capacity {
            return AdmitOutcome::AtCapacity;
        }

        let rsvp = Rsvp {
            id: Uuid::new_v4(),
            event_id,
            user_id,
            created_at: Utc::now(),
        };
        inner.rsvps.push(rsvp.clone());
        AdmitOutcome::Admitted {
            rsvp,
            attendees_count: count + 1,
        }
    }

    pub async fn withdraw(&self, event_id: Uuid, user_id: Uuid) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.rsvps.len();
        inner
            .rsvps
            .retain(|r| !(r.event_id == event_id && r.user_id == user_id));
        inner.rsvps.len() < before
    }

    pub async fn attendee_count(&self, event_id: Uuid) -> i64 {
        let inner = self.inner.lock().await;
        inner.rsvps.iter().filter(|r| r.event_id == event_id).count() as i64
    }

    pub async fn attendees(&self, event_id: Uuid) -> Vec<UserSummary> {
        let inner = self.inner.lock().await;
        let mut rsvps: Vec<&Rsvp> = inner
            .rsvps
            .iter()
            .filter(|r| r.event_id == event_id)
            .collect();
        rsvps.sort_by_key(|r| r.created_at);
        rsvps
            .iter()
            .filter_map(|r| inner.users.get(&r.user_id).map(UserSummary::from))
            .collect()
    }

    pub async fn list_attending(&self, user_id: Uuid, now: DateTime<Utc>) -> Vec<Event> {
        let inner = self.inner.lock().await;
        let mut events: Vec<Event> = inner
            .rsvps
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter_map(|r| inner.events.get(&r.event_id))
            .filter(|e| e.date >= now)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        events
    }

    pub async fn list_created_by(&self, user_id: Uuid) -> Vec<Event> {
        let inner = self.inner.lock().await;
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|e| e.creator_id == user_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        events
    }
}
