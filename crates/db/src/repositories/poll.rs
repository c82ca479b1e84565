//! Poll, option and vote repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pollroom_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter,
    QueryOrder, TransactionTrait,
    sea_query::{Expr, OnConflict},
};

use crate::entities::{Poll, PollOption, Vote, poll, poll_option, vote};

/// Repository for poll operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    // ==================== Poll Operations ====================

    /// Find poll by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get poll by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<poll::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Poll not found".to_string()))
    }

    /// Create a poll with its options in one transaction.
    pub async fn create(
        &self,
        poll: poll::ActiveModel,
        options: Vec<poll_option::ActiveModel>,
    ) -> AppResult<poll::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let created = poll
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if !options.is_empty() {
            PollOption::insert_many(options)
                .exec_without_returning(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(created)
    }

    /// Polls of a room, newest first.
    pub async fn find_by_room(&self, room_id: &str) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::RoomId.eq(room_id))
            .order_by(poll::Column::CreatedAt, Order::Desc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Polls of several rooms at once.
    pub async fn find_by_rooms(&self, room_ids: &[String]) -> AppResult<Vec<poll::Model>> {
        if room_ids.is_empty() {
            return Ok(vec![]);
        }

        Poll::find()
            .filter(poll::Column::RoomId.is_in(room_ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Close an open poll.
    ///
    /// The update is guarded on `is_open = true`, so only one caller ever
    /// observes `true` for a given poll.
    pub async fn mark_closed(&self, id: &str, closed_at: DateTime<Utc>) -> AppResult<bool> {
        let result = Poll::update_many()
            .col_expr(poll::Column::IsOpen, Expr::value(false))
            .col_expr(poll::Column::ClosedAt, Expr::value(closed_at))
            .filter(poll::Column::Id.eq(id))
            .filter(poll::Column::IsOpen.eq(true))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Open polls whose deadline is at or before `now`.
    pub async fn find_open_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::IsOpen.eq(true))
            .filter(poll::Column::Deadline.is_not_null())
            .filter(poll::Column::Deadline.lte(now))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Open polls whose deadline falls in `(now, until]`.
    pub async fn find_open_expiring(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::IsOpen.eq(true))
            .filter(poll::Column::Deadline.gt(now))
            .filter(poll::Column::Deadline.lte(until))
            .order_by(poll::Column::Deadline, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a poll. Options and votes cascade.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = Poll::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    // ==================== Option Operations ====================

    /// Options of a poll in display order.
    pub async fn find_options(&self, poll_id: &str) -> AppResult<Vec<poll_option::Model>> {
        PollOption::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .order_by(poll_option::Column::Position, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Options of several polls at once, in display order.
    pub async fn find_options_for_polls(
        &self,
        poll_ids: &[String],
    ) -> AppResult<Vec<poll_option::Model>> {
        if poll_ids.is_empty() {
            return Ok(vec![]);
        }

        PollOption::find()
            .filter(poll_option::Column::PollId.is_in(poll_ids.iter().cloned()))
            .order_by(poll_option::Column::Position, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ==================== Vote Operations ====================

    /// Record a vote, replacing any earlier vote by the same user on the same poll.
    ///
    /// Executes as a single `INSERT .. ON CONFLICT (user_id, poll_id) DO UPDATE`.
    pub async fn upsert_vote(&self, model: vote::ActiveModel) -> AppResult<()> {
        Vote::insert(model)
            .on_conflict(
                OnConflict::columns([vote::Column::UserId, vote::Column::PollId])
                    .update_columns([vote::Column::OptionId, vote::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// All votes on a poll.
    pub async fn find_votes(&self, poll_id: &str) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::PollId.eq(poll_id))
            .order_by(vote::Column::CreatedAt, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All votes on several polls at once.
    pub async fn find_votes_for_polls(&self, poll_ids: &[String]) -> AppResult<Vec<vote::Model>> {
        if poll_ids.is_empty() {
            return Ok(vec![]);
        }

        Vote::find()
            .filter(vote::Column::PollId.is_in(poll_ids.iter().cloned()))
            .order_by(vote::Column::CreatedAt, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
