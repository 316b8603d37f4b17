use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::Event;
use crate::models::rsvp::Rsvp;
use crate::store::{AdmitOutcome, EventStore};

/// A successful admission: the created record plus the count it produced.
#[derive(Debug)]
pub struct Admitted {
    pub rsvp: Rsvp,
    pub attendees_count: i64,
}

/// Decides whether an RSVP may be admitted and performs the admission.
///
/// Eligibility rules run in a fixed order (missing event, past event, grace
/// window, duplicate, capacity) so the first failing rule determines the
/// error. The duplicate and capacity rules are re-checked inside the store's
/// atomic write; the outcome of that write is what the caller is told.
#[derive(Clone)]
pub struct AdmissionController {
    store: EventStore,
    grace: Duration,
}

impl AdmissionController {
    pub fn new(store: EventStore, grace_seconds: i64) -> Self {
        Self {
            store,
            grace: Duration::seconds(grace_seconds),
        }
    }

    pub async fn admit(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Admitted, AppError> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

        if event.date < now {
            return Err(AppError::EventInPast);
        }

        let opens_at = event.created_at + self.grace;
        if now < opens_at {
            return Err(AppError::RsvpNotYetOpen {
                wait_seconds: (opens_at - now).num_seconds().max(1),
            });
        }

        match self.store.admit(event_id, user_id).await? {
            AdmitOutcome::Admitted {
                rsvp,
                attendees_count,
            } => Ok(Admitted {
                rsvp,
                attendees_count,
            }),
            AdmitOutcome::AlreadyRsvped => Err(AppError::AlreadyRsvped),
            AdmitOutcome::AtCapacity => Err(AppError::AtCapacity),
            AdmitOutcome::EventGone => Err(AppError::NotFound("Event not found".into())),
        }
    }

    pub async fn withdraw(&self, event_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        self.store
            .find_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".into()))?;

        if self.store.withdraw(event_id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::NotRsvped)
        }
    }

    /// Events the user is attending, future only, soonest first.
    pub async fn list_attending(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, AppError> {
        self.store.list_attending(user_id, now).await
    }

    /// Events the user created, soonest first.
    pub async fn list_created_by(&self, user_id: Uuid) -> Result<Vec<Event>, AppError> {
        self.store.list_created_by(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::models::event::NewEvent;
    use crate::models::user::User;
    use crate::store::MemoryStore;

    fn controller(grace_seconds: i64) -> (AdmissionController, EventStore) {
        let store = EventStore::Memory(MemoryStore::new());
        let controller = AdmissionController::new(store.clone(), grace_seconds);
        (controller, store)
    }

    async fn seed_user(store: &EventStore, name: &str) -> User {
        store
            .create_user(name, &format!("{name}@example.com"), "hash")
            .await
            .unwrap()
    }

    async fn seed_event(
        store: &EventStore,
        creator_id: Uuid,
        capacity: i32,
        date: DateTime<Utc>,
    ) -> Event {
        store
            .create_event(NewEvent {
                title: "Test Event".to_string(),
                description: "A test event".to_string(),
                date,
                location: "Test Hall".to_string(),
                capacity,
                image: None,
                creator_id,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn admit_to_unknown_event_is_not_found() {
        let (controller, store) = controller(0);
        let user = seed_user(&store, "alice").await;

        let result = controller.admit(Uuid::new_v4(), user.id, Utc::now()).await;
        assert_matches!(result, Err(AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn admit_to_past_event_fails_regardless_of_capacity() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let user = seed_user(&store, "alice").await;
        let event = seed_event(&store, creator.id, 100, Utc::now() - Duration::hours(1)).await;

        let result = controller.admit(event.id, user.id, Utc::now()).await;
        assert_matches!(result, Err(AppError::EventInPast));
        assert_eq!(store.attendee_count(event.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn grace_window_blocks_then_admits() {
        let (controller, store) = controller(60);
        let creator = seed_user(&store, "creator").await;
        let user = seed_user(&store, "alice").await;
        let event = seed_event(&store, creator.id, 10, Utc::now() + Duration::days(7)).await;

        let result = controller
            .admit(event.id, user.id, event.created_at + Duration::seconds(30))
            .await;
        assert_matches!(result, Err(AppError::RsvpNotYetOpen { wait_seconds: 30 }));

        let admitted = controller
            .admit(event.id, user.id, event.created_at + Duration::seconds(61))
            .await
            .unwrap();
        assert_eq!(admitted.attendees_count, 1);
        assert_eq!(admitted.rsvp.event_id, event.id);
        assert_eq!(admitted.rsvp.user_id, user.id);
    }

    #[tokio::test]
    async fn second_sequential_admit_is_rejected_without_changing_the_count() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let user = seed_user(&store, "alice").await;
        let event = seed_event(&store, creator.id, 10, Utc::now() + Duration::days(1)).await;
        let now = Utc::now();

        controller.admit(event.id, user.id, now).await.unwrap();
        let result = controller.admit(event.id, user.id, now).await;
        assert_matches!(result, Err(AppError::AlreadyRsvped));
        assert_eq!(store.attendee_count(event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn admit_withdraw_admit_succeeds_both_times() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let user = seed_user(&store, "alice").await;
        let event = seed_event(&store, creator.id, 1, Utc::now() + Duration::days(1)).await;
        let now = Utc::now();

        controller.admit(event.id, user.id, now).await.unwrap();
        controller.withdraw(event.id, user.id).await.unwrap();
        controller.admit(event.id, user.id, now).await.unwrap();
        assert_eq!(store.attendee_count(event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn withdraw_without_rsvp_reports_not_rsvped() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let user = seed_user(&store, "alice").await;
        let event = seed_event(&store, creator.id, 10, Utc::now() + Duration::days(1)).await;

        let result = controller.withdraw(event.id, user.id).await;
        assert_matches!(result, Err(AppError::NotRsvped));
    }

    #[tokio::test]
    async fn second_withdraw_reports_not_rsvped() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let user = seed_user(&store, "alice").await;
        let event = seed_event(&store, creator.id, 10, Utc::now() + Duration::days(1)).await;
        let now = Utc::now();

        controller.admit(event.id, user.id, now).await.unwrap();
        controller.withdraw(event.id, user.id).await.unwrap();
        let result = controller.withdraw(event.id, user.id).await;
        assert_matches!(result, Err(AppError::NotRsvped));
    }

    #[tokio::test]
    async fn capacity_is_never_exceeded_under_concurrent_admits() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let event = seed_event(&store, creator.id, 5, Utc::now() + Duration::days(1)).await;

        let mut users = Vec::new();
        for i in 0..20 {
            users.push(seed_user(&store, &format!("user{i}")).await);
        }

        let now = Utc::now();
        let mut set = tokio::task::JoinSet::new();
        for user in &users {
            let controller = controller.clone();
            let (event_id, user_id) = (event.id, user.id);
            set.spawn(async move { controller.admit(event_id, user_id, now).await });
        }

        let mut admitted = 0;
        let mut at_capacity = 0;
        while let Some(result) = set.join_next().await {
            match result.unwrap() {
                Ok(_) => admitted += 1,
                Err(AppError::AtCapacity) => at_capacity += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(admitted, 5);
        assert_eq!(at_capacity, 15);
        assert_eq!(store.attendee_count(event.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn concurrent_admits_by_the_same_user_admit_once() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let user = seed_user(&store, "alice").await;
        let event = seed_event(&store, creator.id, 10, Utc::now() + Duration::days(1)).await;

        let now = Utc::now();
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let controller = controller.clone();
            let (event_id, user_id) = (event.id, user.id);
            set.spawn(async move { controller.admit(event_id, user_id, now).await });
        }

        let mut admitted = 0;
        while let Some(result) = set.join_next().await {
            match result.unwrap() {
                Ok(_) => admitted += 1,
                Err(AppError::AlreadyRsvped) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(store.attendee_count(event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn last_seat_race_admits_exactly_one() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let a = seed_user(&store, "a").await;
        let b = seed_user(&store, "b").await;
        let event = seed_event(&store, creator.id, 1, Utc::now() + Duration::days(1)).await;

        let now = Utc::now();
        let mut set = tokio::task::JoinSet::new();
        for user_id in [a.id, b.id] {
            let controller = controller.clone();
            let event_id = event.id;
            set.spawn(async move { controller.admit(event_id, user_id, now).await });
        }

        let mut admitted = 0;
        let mut at_capacity = 0;
        while let Some(result) = set.join_next().await {
            match result.unwrap() {
                Ok(a) => {
                    admitted += 1;
                    assert_eq!(a.attendees_count, 1);
                }
                Err(AppError::AtCapacity) => at_capacity += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(at_capacity, 1);
        assert_eq!(store.attendee_count(event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_attending_returns_future_events_soonest_first() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let user = seed_user(&store, "alice").await;
        let now = Utc::now();

        let later = seed_event(&store, creator.id, 10, now + Duration::days(14)).await;
        let sooner = seed_event(&store, creator.id, 10, now + Duration::days(7)).await;
        let past = seed_event(&store, creator.id, 10, now + Duration::hours(1)).await;

        controller.admit(later.id, user.id, now).await.unwrap();
        controller.admit(sooner.id, user.id, now).await.unwrap();
        controller.admit(past.id, user.id, now).await.unwrap();

        // Query from a point after the first event has happened.
        let attending = controller
            .list_attending(user.id, now + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(attending.len(), 2);
        assert_eq!(attending[0].id, sooner.id);
        assert_eq!(attending[1].id, later.id);
    }

    #[tokio::test]
    async fn list_created_by_returns_all_events_soonest_first() {
        let (controller, store) = controller(0);
        let creator = seed_user(&store, "creator").await;
        let other = seed_user(&store, "other").await;
        let now = Utc::now();

        let past = seed_event(&store, creator.id, 10, now - Duration::days(1)).await;
        let future = seed_event(&store, creator.id, 10, now + Duration::days(1)).await;
        seed_event(&store, other.id, 10, now + Duration::days(2)).await;

        let created = controller.list_created_by(creator.id).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].id, past.id);
        assert_eq!(created[1].id, future.id);
    }
}
