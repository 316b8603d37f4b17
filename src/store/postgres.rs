use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::{Event, EventUpdate, NewEvent};
use crate::models::rsvp::Rsvp;
use crate::models::user::{User, UserSummary};
use crate::store::AdmitOutcome;

/// ILIKE treats `%`, `_` and `\` specially; search input is matched
/// literally, the same way the memory store's substring match does.
fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // --- users ---

    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (name, email, password_hash)
             VALUES ($1, $2, $3)
             RETURNING id, name, email, password_hash, created_at, updated_at",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("Email already registered".into())
            }
            _ => AppError::Database(e),
        })
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, created_at, updated_at
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, created_at, updated_at
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    // --- events ---

    pub async fn create_event(&self, new: NewEvent) -> Result<Event, AppError> {
        let event = sqlx::query_as::<_, Event>(
            "INSERT INTO events (title, description, date, location, capacity, image, creator_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.date)
        .bind(&new.location)
        .bind(new.capacity)
        .bind(&new.image)
        .bind(new.creator_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(event)
    }

    pub async fn find_event(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    pub async fn update_event(&self, id: Uuid, update: EventUpdate) -> Result<Event, AppError> {
        sqlx::query_as::<_, Event>(
            "UPDATE events
             SET title = $2, description = $3, date = $4, location = $5, capacity = $6,
                 image = COALESCE($7, image), updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.date)
        .bind(&update.location)
        .bind(update.capacity)
        .bind(&update.image)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".into()))
    }

    pub async fn delete_event(&self, id: Uuid) -> Result<(), AppError> {
        // RSVPs go with it via ON DELETE CASCADE.
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_upcoming(
        &self,
        search: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, AppError> {
        let needle = search.map(str::trim).filter(|s| !s.is_empty());

        let events = match needle {
            Some(q) => {
                sqlx::query_as::<_, Event>(
                    "SELECT * FROM events
                     WHERE date >= $1
                       AND (title ILIKE $2 OR description ILIKE $2 OR location ILIKE $2)
                     ORDER BY date ASC",
                )
                .bind(now)
                .bind(like_pattern(q))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Event>(
                    "SELECT * FROM events WHERE date >= $1 ORDER BY date ASC",
                )
                .bind(now)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(events)
    }

    // --- rsvps ---

    /// Row-locks the event so concurrent admits for it serialize; the unique
    /// constraint on (event_id, user_id) backstops the duplicate check.
    pub async fn admit(&self, event_id: Uuid, user_id: Uuid) -> Result<AdmitOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let capacity: Option<(i32,)> =
            sqlx::query_as("SELECT capacity FROM events WHERE id = $1 FOR UPDATE")
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((capacity,)) = capacity else {
            return Ok(AdmitOutcome::EventGone);
        };

        // Duplicate before capacity, so the rejection reason is deterministic.
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM rsvps WHERE event_id = $1 AND user_id = $2")
                .bind(event_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Ok(AdmitOutcome::AlreadyRsvped);
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rsvps WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&mut *tx)
            .await?;
        if count >= capacity as i64 {
            return Ok(AdmitOutcome::AtCapacity);
        }

        let rsvp: Option<Rsvp> = sqlx::query_as(
            "INSERT INTO rsvps (event_id, user_id)
             VALUES ($1, $2)
             ON CONFLICT (event_id, user_id) DO NOTHING
             RETURNING id, event_id, user_id, created_at",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(rsvp) = rsvp else {
            return Ok(AdmitOutcome::AlreadyRsvped);
        };

        tx.commit().await?;
        Ok(AdmitOutcome::Admitted {
            rsvp,
            attendees_count: count + 1,
        })
    }

    pub async fn withdraw(&self, event_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM rsvps WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn attendee_count(&self, event_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rsvps WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn attendees(&self, event_id: Uuid) -> Result<Vec<UserSummary>, AppError> {
        let attendees = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.name, u.email
             FROM rsvps r
             JOIN users u ON u.id = r.user_id
             WHERE r.event_id = $1
             ORDER BY r.created_at ASC",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attendees)
    }

    pub async fn list_attending(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, AppError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT e.* FROM events e
             JOIN rsvps r ON r.event_id = e.id
             WHERE r.user_id = $1 AND e.date >= $2
             ORDER BY e.date ASC",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    pub async fn list_created_by(&self, user_id: Uuid) -> Result<Vec<Event>, AppError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE creator_id = $1 ORDER BY date ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}
