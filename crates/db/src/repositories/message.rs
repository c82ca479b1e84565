//! Chat message and mention repository.

use std::sync::Arc;

use pollroom_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect,
};

use crate::entities::{Mention, Message, mention, message};

/// Repository for chat messages and mentions.
#[derive(Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Create a new message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new message.
    pub async fn create(&self, model: message::ActiveModel) -> AppResult<message::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Newest messages of a room, or of the public channel when `room_id` is `None`.
    ///
    /// Results are newest first.
    pub async fn find_recent(
        &self,
        room_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<message::Model>> {
        let query = match room_id {
            Some(room_id) => Message::find().filter(message::Column::RoomId.eq(room_id)),
            None => Message::find().filter(message::Column::RoomId.is_null()),
        };

        query
            .order_by(message::Column::CreatedAt, Order::Desc)
            .order_by(message::Column::Id, Order::Desc)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Distinct authors among the last `window` messages of a room.
    pub async fn recent_author_ids(&self, room_id: &str, window: u64) -> AppResult<Vec<String>> {
        let recent = self.find_recent(Some(room_id), window).await?;

        let mut ids: Vec<String> = Vec::new();
        for msg in recent {
            if !ids.contains(&msg.user_id) {
                ids.push(msg.user_id);
            }
        }
        Ok(ids)
    }

    /// Find messages by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<message::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Message::find()
            .filter(message::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ==================== Mention Operations ====================

    /// Insert mention rows.
    pub async fn create_mentions(&self, models: Vec<mention::ActiveModel>) -> AppResult<()> {
        if models.is_empty() {
            return Ok(());
        }

        Mention::insert_many(models)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Mentions attached to the given messages.
    pub async fn find_mentions_for_messages(
        &self,
        message_ids: &[String],
    ) -> AppResult<Vec<mention::Model>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        Mention::find()
            .filter(mention::Column::MessageId.is_in(message_ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Newest mentions of a user.
    pub async fn find_mentions_by_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<mention::Model>> {
        Mention::find()
            .filter(mention::Column::UserId.eq(user_id))
            .order_by(mention::Column::CreatedAt, Order::Desc)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_recent_author_ids_are_distinct() {
        let messages = vec![
            fixtures::message("m3", "bob", Some("r1"), "third"),
            fixtures::message("m2", "alice", Some("r1"), "second"),
            fixtures::message("m1", "bob", Some("r1"), "first"),
        ];

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([messages])
                .into_connection(),
        );

        let repo = MessageRepository::new(db);
        let ids = repo.recent_author_ids("r1", 100).await.unwrap();

        assert_eq!(ids, vec!["bob".to_string(), "alice".to_string()]);
    }

    #[tokio::test]
    async fn test_create_mentions_empty_skips_insert() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = MessageRepository::new(db);
        repo.create_mentions(vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_mentions_by_user() {
        let mention = fixtures::mention("mn1", "m1", "bob-id", "bob");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[mention]])
                .into_connection(),
        );

        let repo = MessageRepository::new(db);
        let result = repo.find_mentions_by_user("bob-id", 10).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].username, "bob");
    }
}
