//! Room service.
//!
//! A room's creator is implicitly its first member and the only user allowed
//! to administer it (kick, update, close, manage polls).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pollroom_common::{AppError, AppResult, IdGenerator};
use pollroom_db::{
    entities::{room, room_member, user},
    repositories::{PollRepository, RoomRepository, UserRepository},
};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::services::auth::Identity;
use crate::services::event_publisher::{EventPublisherService, StreamEvent, emit};
use crate::services::poll::{PollView, load_views};
use crate::services::user::UserSummary;

/// Attempts at drawing an unused join code before giving up.
const CODE_ATTEMPTS: usize = 5;

/// Input for creating a room.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub description: Option<String>,
}

/// Input for updating a room.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomInput {
    #[validate(length(max = 100))]
    #[serde(default)]
    pub name: String,
    #[validate(length(max = 500))]
    #[serde(default)]
    pub description: Option<String>,
}

/// A room as listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub creator: UserSummary,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub members: Vec<UserSummary>,
    pub poll_count: usize,
}

/// A room with everything needed to render it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub creator: UserSummary,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub members: Vec<UserSummary>,
    pub polls: Vec<PollView>,
}

fn summary_for(users: &HashMap<String, user::Model>, id: &str) -> UserSummary {
    users.get(id).map_or_else(
        || UserSummary {
            id: id.to_string(),
            username: String::new(),
        },
        UserSummary::from,
    )
}

/// Room service for business logic.
#[derive(Clone)]
pub struct RoomService {
    room_repo: RoomRepository,
    user_repo: UserRepository,
    poll_repo: PollRepository,
    publisher: EventPublisherService,
    id_gen: IdGenerator,
}

impl RoomService {
    /// Create a new room service.
    #[must_use]
    pub const fn new(
        room_repo: RoomRepository,
        user_repo: UserRepository,
        poll_repo: PollRepository,
        publisher: EventPublisherService,
    ) -> Self {
        Self {
            room_repo,
            user_repo,
            poll_repo,
            publisher,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a room; the creator becomes its first member.
    pub async fn create(&self, creator: &Identity, input: CreateRoomInput) -> AppResult<RoomDetail> {
        input.validate()?;

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Room name is required".to_string()));
        }

        let code = self.unused_code().await?;
        let now = Utc::now();
        let room_id = self.id_gen.generate();

        let created = self
            .room_repo
            .create(
                room::ActiveModel {
                    id: Set(room_id.clone()),
                    code: Set(code),
                    name: Set(name),
                    description: Set(input.description.filter(|d| !d.trim().is_empty())),
                    creator_id: Set(creator.id.clone()),
                    is_active: Set(true),
                    created_at: Set(now.into()),
                    updated_at: Set(None),
                },
                room_member::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    room_id: Set(room_id),
                    user_id: Set(creator.id.clone()),
                    joined_at: Set(now.into()),
                },
            )
            .await?;

        info!(room_id = %created.id, code = %created.code, creator_id = %creator.id, "Room created");

        let creator = UserSummary {
            id: creator.id.clone(),
            username: creator.username.clone(),
        };
        Ok(RoomDetail {
            id: created.id,
            code: created.code,
            name: created.name,
            description: created.description,
            creator: creator.clone(),
            is_active: created.is_active,
            created_at: created.created_at.with_timezone(&Utc),
            updated_at: None,
            members: vec![creator],
            polls: vec![],
        })
    }

    /// Room detail by join code.
    pub async fn get_by_code(&self, code: &str) -> AppResult<RoomDetail> {
        let room = self.room_repo.get_by_code(code).await?;
        self.detail(room).await
    }

    /// All active rooms.
    pub async fn list_active(&self) -> AppResult<Vec<RoomSummary>> {
        let rooms = self.room_repo.find_active().await?;
        self.summaries(rooms).await
    }

    /// Active rooms the user belongs to.
    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<RoomSummary>> {
        let rooms = self.room_repo.find_joined_by_user(user_id).await?;
        self.summaries(rooms).await
    }

    /// Join a room by code. Joining twice is a no-op.
    pub async fn join(&self, user: &Identity, code: &str) -> AppResult<RoomDetail> {
        let room = self.room_repo.get_by_code(code).await?;
        if !room.is_active {
            return Err(AppError::BadRequest(
                "Room is no longer active".to_string(),
            ));
        }

        let added = self
            .room_repo
            .add_member(room_member::ActiveModel {
                id: Set(self.id_gen.generate()),
                room_id: Set(room.id.clone()),
                user_id: Set(user.id.clone()),
                joined_at: Set(Utc::now().into()),
            })
            .await?;

        if added {
            info!(room_id = %room.id, user_id = %user.id, "User joined room");
            emit::to_room(
                &self.publisher,
                &room.code,
                StreamEvent::UserJoined {
                    user_id: user.id.clone(),
                    username: user.username.clone(),
                    room_code: room.code.clone(),
                },
            )
            .await;
        }

        self.detail(room).await
    }

    /// Leave a room. The creator cannot leave.
    pub async fn leave(&self, user: &Identity, code: &str) -> AppResult<()> {
        let room = self.room_repo.get_by_code(code).await?;
        if room.creator_id == user.id {
            return Err(AppError::BadRequest(
                "Room creator cannot leave the room".to_string(),
            ));
        }

        if self.room_repo.remove_member(&room.id, &user.id).await? {
            info!(room_id = %room.id, user_id = %user.id, "User left room");
            emit::to_room(
                &self.publisher,
                &room.code,
                StreamEvent::UserLeft {
                    user_id: user.id.clone(),
                    username: user.username.clone(),
                    room_code: room.code.clone(),
                },
            )
            .await;
        }

        Ok(())
    }

    /// Remove another member. Creator only.
    pub async fn kick(&self, requester: &Identity, code: &str, target_id: &str) -> AppResult<()> {
        let room = self.room_repo.get_by_code(code).await?;

        if room.creator_id != requester.id {
            return Err(AppError::Forbidden(
                "Only the room creator can kick members".to_string(),
            ));
        }
        if target_id == requester.id {
            return Err(AppError::BadRequest("You cannot kick yourself".to_string()));
        }
        if !self.room_repo.is_member(&room.id, target_id).await? {
            return Err(AppError::BadRequest(
                "User is not a member of this room".to_string(),
            ));
        }

        self.room_repo.remove_member(&room.id, target_id).await?;
        info!(room_id = %room.id, kicked_user_id = %target_id, "Member kicked");

        emit::to_room(
            &self.publisher,
            &room.code,
            StreamEvent::MemberKicked {
                kicked_user_id: target_id.to_string(),
                kicked_by: requester.username.clone(),
            },
        )
        .await;
        emit::to_user(
            &self.publisher,
            target_id,
            StreamEvent::Kicked {
                room_code: room.code.clone(),
            },
        )
        .await;

        if let Err(e) = self
            .publisher
            .remove_user_from_room(&room.code, target_id)
            .await
        {
            warn!(error = %e, room_code = %room.code, "Failed to evict kicked member");
        }

        Ok(())
    }

    /// Rename or re-describe a room. Creator only.
    pub async fn update(
        &self,
        requester: &Identity,
        code: &str,
        input: UpdateRoomInput,
    ) -> AppResult<RoomDetail> {
        input.validate()?;

        let room = self.room_repo.get_by_code(code).await?;
        if room.creator_id != requester.id {
            return Err(AppError::Forbidden(
                "Only the room creator can update the room".to_string(),
            ));
        }

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Room name is required".to_string()));
        }

        let mut active: room::ActiveModel = room.into();
        active.name = Set(name);
        active.description = Set(input.description.filter(|d| !d.trim().is_empty()));
        active.updated_at = Set(Some(Utc::now().into()));

        let updated = self.room_repo.update(active).await?;
        info!(room_id = %updated.id, "Room updated");

        self.detail(updated).await
    }

    /// Deactivate a room. Creator only; closing twice is a no-op.
    pub async fn close(&self, requester: &Identity, room_id: &str) -> AppResult<()> {
        let room = self.room_repo.get_by_id(room_id).await?;
        if room.creator_id != requester.id {
            return Err(AppError::Forbidden(
                "Only the room creator can close the room".to_string(),
            ));
        }
        if !room.is_active {
            return Ok(());
        }

        let mut active: room::ActiveModel = room.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now().into()));
        let updated = self.room_repo.update(active).await?;

        info!(room_id = %updated.id, "Room closed");
        Ok(())
    }

    async fn unused_code(&self) -> AppResult<String> {
        for _ in 0..CODE_ATTEMPTS {
            let code = self.id_gen.generate_room_code();
            if self.room_repo.find_by_code(&code).await?.is_none() {
                return Ok(code);
            }
        }

        Err(AppError::Internal(
            "Could not allocate a unique room code".to_string(),
        ))
    }

    async fn detail(&self, room: room::Model) -> AppResult<RoomDetail> {
        let memberships = self.room_repo.find_members(&room.id).await?;

        let mut user_ids: Vec<String> = memberships.iter().map(|m| m.user_id.clone()).collect();
        if !user_ids.contains(&room.creator_id) {
            user_ids.push(room.creator_id.clone());
        }
        let users: HashMap<String, user::Model> = self
            .user_repo
            .find_by_ids(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let polls = self.poll_repo.find_by_room(&room.id).await?;
        let polls = load_views(&self.poll_repo, &polls).await?;

        Ok(RoomDetail {
            creator: summary_for(&users, &room.creator_id),
            members: memberships
                .iter()
                .map(|m| summary_for(&users, &m.user_id))
                .collect(),
            polls,
            id: room.id,
            code: room.code,
            name: room.name,
            description: room.description,
            is_active: room.is_active,
            created_at: room.created_at.with_timezone(&Utc),
            updated_at: room.updated_at.map(|d| d.with_timezone(&Utc)),
        })
    }

    async fn summaries(&self, rooms: Vec<room::Model>) -> AppResult<Vec<RoomSummary>> {
        if rooms.is_empty() {
            return Ok(vec![]);
        }

        let room_ids: Vec<String> = rooms.iter().map(|r| r.id.clone()).collect();
        let memberships = self.room_repo.find_members_for_rooms(&room_ids).await?;

        let mut user_ids: Vec<String> = memberships.iter().map(|m| m.user_id.clone()).collect();
        user_ids.extend(rooms.iter().map(|r| r.creator_id.clone()));
        user_ids.sort();
        user_ids.dedup();
        let users: HashMap<String, user::Model> = self
            .user_repo
            .find_by_ids(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let polls = self.poll_repo.find_by_rooms(&room_ids).await?;

        Ok(rooms
            .into_iter()
            .map(|room| RoomSummary {
                creator: summary_for(&users, &room.creator_id),
                members: memberships
                    .iter()
                    .filter(|m| m.room_id == room.id)
                    .map(|m| summary_for(&users, &m.user_id))
                    .collect(),
                poll_count: polls.iter().filter(|p| p.room_id == room.id).count(),
                id: room.id,
                code: room.code,
                name: room.name,
                description: room.description,
                is_active: room.is_active,
                created_at: room.created_at.with_timezone(&Utc),
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_publisher::testing::{RecordingPublisher, Target};
    use pollroom_db::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    fn who(id: &str, username: &str) -> Identity {
        Identity {
            id: id.to_string(),
            username: username.to_string(),
        }
    }

    fn service(db: MockDatabase) -> (RoomService, Arc<RecordingPublisher>) {
        let conn = Arc::new(db.into_connection());
        let publisher = Arc::new(RecordingPublisher::default());
        let svc = RoomService::new(
            RoomRepository::new(conn.clone()),
            UserRepository::new(conn.clone()),
            PollRepository::new(conn),
            publisher.clone(),
        );
        (svc, publisher)
    }

    fn closed_room() -> room::Model {
        let mut room = fixtures::room("r1", "ABC123", "a");
        room.is_active = false;
        room
    }

    #[tokio::test]
    async fn test_create_room() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<room::Model>::new()])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([[fixtures::room_member("m1", "r1", "a")]]);
        let (svc, publisher) = service(db);

        let detail = svc
            .create(
                &who("a", "alice"),
                CreateRoomInput {
                    name: "Standup".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(detail.code, "ABC123");
        assert_eq!(detail.creator.username, "alice");
        assert_eq!(detail.members.len(), 1);
        assert!(detail.polls.is_empty());
        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_create_room_rejects_blank_name() {
        let (svc, _) = service(MockDatabase::new(DatabaseBackend::Postgres));

        let result = svc
            .create(
                &who("a", "alice"),
                CreateRoomInput {
                    name: "   ".to_string(),
                    description: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_room_gives_up_after_collisions() {
        let taken = fixtures::room("r0", "TAKEN0", "z");
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results(
            (0..CODE_ATTEMPTS).map(|_| vec![taken.clone()]),
        );
        let (svc, _) = service(db);

        let result = svc
            .create(
                &who("a", "alice"),
                CreateRoomInput {
                    name: "Standup".to_string(),
                    description: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_join_announces_new_member() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_results([[
                fixtures::room_member("m1", "r1", "a"),
                fixtures::room_member("m2", "r1", "b"),
            ]])
            .append_query_results([[fixtures::user("a", "alice"), fixtures::user("b", "bob")]])
            .append_query_results([Vec::<pollroom_db::entities::poll::Model>::new()]);
        let (svc, publisher) = service(db);

        let detail = svc.join(&who("b", "bob"), "ABC123").await.unwrap();

        assert_eq!(detail.members.len(), 2);
        assert_eq!(detail.members[1].username, "bob");
        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["userJoined"]
        );
    }

    #[tokio::test]
    async fn test_join_twice_is_silent() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(0)])
            .append_query_results([[
                fixtures::room_member("m1", "r1", "a"),
                fixtures::room_member("m2", "r1", "b"),
            ]])
            .append_query_results([[fixtures::user("a", "alice"), fixtures::user("b", "bob")]])
            .append_query_results([Vec::<pollroom_db::entities::poll::Model>::new()]);
        let (svc, publisher) = service(db);

        svc.join(&who("b", "bob"), "ABC123").await.unwrap();

        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_join_inactive_room() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[closed_room()]]);
        let (svc, _) = service(db);

        let result = svc.join(&who("b", "bob"), "ABC123").await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_join_unknown_code() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<room::Model>::new()]);
        let (svc, _) = service(db);

        let result = svc.join(&who("b", "bob"), "NOPE00").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_creator_cannot_leave() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, _) = service(db);

        let result = svc.leave(&who("a", "alice"), "ABC123").await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_leave_announces_departure() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)]);
        let (svc, publisher) = service(db);

        svc.leave(&who("b", "bob"), "ABC123").await.unwrap();

        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["userLeft"]
        );
    }

    #[tokio::test]
    async fn test_leave_when_not_member_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(0)]);
        let (svc, publisher) = service(db);

        svc.leave(&who("c", "carol"), "ABC123").await.unwrap();

        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_kick_member() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([[fixtures::room_member("m2", "r1", "b")]])
            .append_exec_results([exec(1)]);
        let (svc, publisher) = service(db);

        svc.kick(&who("a", "alice"), "ABC123", "b").await.unwrap();

        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["memberKicked"]
        );
        let kicked_by = publisher.all().into_iter().find_map(|(_, e)| match e {
            StreamEvent::MemberKicked { kicked_by, .. } => Some(kicked_by),
            _ => None,
        });
        assert_eq!(kicked_by.as_deref(), Some("alice"));
        assert_eq!(
            publisher.names_for(&Target::User("b".to_string())),
            vec!["kicked"]
        );
        assert_eq!(
            publisher.removals.lock().unwrap().clone(),
            vec![("ABC123".to_string(), "b".to_string())]
        );
    }

    #[tokio::test]
    async fn test_kick_requires_creator() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, publisher) = service(db);

        let result = svc.kick(&who("b", "bob"), "ABC123", "c").await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_kick_self() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, _) = service(db);

        let result = svc.kick(&who("a", "alice"), "ABC123", "a").await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_kick_non_member() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([Vec::<room_member::Model>::new()]);
        let (svc, publisher) = service(db);

        let result = svc.kick(&who("a", "alice"), "ABC123", "z").await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(publisher.removals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_requires_creator() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, _) = service(db);

        let result = svc
            .update(
                &who("b", "bob"),
                "ABC123",
                UpdateRoomInput {
                    name: "Renamed".to_string(),
                    description: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_update_requires_name() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, _) = service(db);

        let result = svc
            .update(
                &who("a", "alice"),
                "ABC123",
                UpdateRoomInput {
                    name: " ".to_string(),
                    description: Some("still here".to_string()),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_close_room() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([[closed_room()]]);
        let (svc, _) = service(db);

        svc.close(&who("a", "alice"), "r1").await.unwrap();
    }

    #[tokio::test]
    async fn test_close_closed_room_is_noop() {
        // No update result queued: a second write would fail the mock.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[closed_room()]]);
        let (svc, _) = service(db);

        svc.close(&who("a", "alice"), "r1").await.unwrap();
    }

    #[tokio::test]
    async fn test_close_requires_creator() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, _) = service(db);

        let result = svc.close(&who("b", "bob"), "r1").await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_list_active_counts_polls() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[
                fixtures::room("r1", "AAA111", "a"),
                fixtures::room("r2", "BBB222", "b"),
            ]])
            .append_query_results([[
                fixtures::room_member("m1", "r1", "a"),
                fixtures::room_member("m2", "r2", "b"),
                fixtures::room_member("m3", "r2", "a"),
            ]])
            .append_query_results([[fixtures::user("a", "alice"), fixtures::user("b", "bob")]])
            .append_query_results([[
                fixtures::poll("p1", "r2", true, None),
                fixtures::poll("p2", "r2", false, None),
            ]]);
        let (svc, _) = service(db);

        let rooms = svc.list_active().await.unwrap();

        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].poll_count, 0);
        assert_eq!(rooms[0].members.len(), 1);
        assert_eq!(rooms[1].poll_count, 2);
        assert_eq!(rooms[1].creator.username, "bob");
        assert_eq!(rooms[1].members.len(), 2);
    }

    #[tokio::test]
    async fn test_list_for_user_without_rooms() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<room_member::Model>::new()]);
        let (svc, _) = service(db);

        assert!(svc.list_for_user("a").await.unwrap().is_empty());
    }
}
