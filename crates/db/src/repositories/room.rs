//! Room repository.

use std::sync::Arc;

use pollroom_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter,
    QueryOrder, TransactionTrait, sea_query::OnConflict,
};

use crate::entities::{Room, RoomMember, room, room_member};

/// Repository for room and membership operations.
#[derive(Clone)]
pub struct RoomRepository {
    db: Arc<DatabaseConnection>,
}

impl RoomRepository {
    /// Create a new room repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    // ==================== Room Operations ====================

    /// Find room by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<room::Model>> {
        Room::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get room by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<room::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Room not found".to_string()))
    }

    /// Find room by join code.
    pub async fn find_by_code(&self, code: &str) -> AppResult<Option<room::Model>> {
        Room::find()
            .filter(room::Column::Code.eq(code))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get room by join code, returning error if not found.
    pub async fn get_by_code(&self, code: &str) -> AppResult<room::Model> {
        self.find_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Room not found".to_string()))
    }

    /// Find rooms by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<room::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Room::find()
            .filter(room::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All active rooms, newest first.
    pub async fn find_active(&self) -> AppResult<Vec<room::Model>> {
        Room::find()
            .filter(room::Column::IsActive.eq(true))
            .order_by(room::Column::CreatedAt, Order::Desc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Active rooms the user is a member of, newest first.
    pub async fn find_joined_by_user(&self, user_id: &str) -> AppResult<Vec<room::Model>> {
        let memberships = RoomMember::find()
            .filter(room_member::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let room_ids: Vec<String> = memberships.into_iter().map(|m| m.room_id).collect();

        if room_ids.is_empty() {
            return Ok(vec![]);
        }

        Room::find()
            .filter(room::Column::Id.is_in(room_ids))
            .filter(room::Column::IsActive.eq(true))
            .order_by(room::Column::CreatedAt, Order::Desc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a room together with its creator's membership.
    pub async fn create(
        &self,
        room: room::ActiveModel,
        creator_membership: room_member::ActiveModel,
    ) -> AppResult<room::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let created = room
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        creator_membership
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(created)
    }

    /// Update a room.
    pub async fn update(&self, model: room::ActiveModel) -> AppResult<room::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ==================== Member Operations ====================

    /// Add a member. Returns `false` if the user was already a member.
    pub async fn add_member(&self, model: room_member::ActiveModel) -> AppResult<bool> {
        let rows = RoomMember::insert(model)
            .on_conflict(
                OnConflict::columns([room_member::Column::RoomId, room_member::Column::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows > 0)
    }

    /// Remove a member. Returns `false` if there was no such membership.
    pub async fn remove_member(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        let result = RoomMember::delete_many()
            .filter(room_member::Column::RoomId.eq(room_id))
            .filter(room_member::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Check if a user is a member of a room.
    pub async fn is_member(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        let member = RoomMember::find()
            .filter(room_member::Column::RoomId.eq(room_id))
            .filter(room_member::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(member.is_some())
    }

    /// Memberships of a room in join order.
    pub async fn find_members(&self, room_id: &str) -> AppResult<Vec<room_member::Model>> {
        RoomMember::find()
            .filter(room_member::Column::RoomId.eq(room_id))
            .order_by(room_member::Column::JoinedAt, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Memberships of several rooms at once.
    pub async fn find_members_for_rooms(
        &self,
        room_ids: &[String],
    ) -> AppResult<Vec<room_member::Model>> {
        if room_ids.is_empty() {
            return Ok(vec![]);
        }

        RoomMember::find()
            .filter(room_member::Column::RoomId.is_in(room_ids.iter().cloned()))
            .order_by(room_member::Column::JoinedAt, Order::Asc)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
