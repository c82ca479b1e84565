//! Poll service.
//!
//! Lifecycle: a poll is created open and closes exactly once, by its room's
//! creator, by deletion, or when its deadline passes. Deadline expiry is
//! detected in three places (vote, results, scheduler); all of them go
//! through [`PollPhase::of`] and the guarded close in [`PollService::expire`].

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pollroom_common::{AppError, AppResult, IdGenerator};
use pollroom_db::{
    entities::{poll, poll_option, room, room_member, vote},
    repositories::{PollRepository, RoomRepository},
};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use crate::services::auth::Identity;
use crate::services::event_publisher::{EventPublisherService, StreamEvent, emit};

/// Minimum number of non-empty options.
pub const MIN_OPTIONS: usize = 2;
/// Maximum number of options.
pub const MAX_OPTIONS: usize = 10;
/// Maximum option length in characters.
pub const MAX_OPTION_LEN: usize = 100;

/// Where a poll stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Accepting votes.
    Open,
    /// Still flagged open, but the deadline has passed.
    Lapsed,
    /// Closed.
    Closed,
}

impl PollPhase {
    /// Classify a poll. A deadline equal to `now` counts as passed.
    #[must_use]
    pub fn of(is_open: bool, deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match (is_open, deadline) {
            (false, _) => Self::Closed,
            (true, Some(deadline)) if deadline <= now => Self::Lapsed,
            (true, _) => Self::Open,
        }
    }

    /// Classify a stored poll.
    #[must_use]
    pub fn of_model(poll: &poll::Model, now: DateTime<Utc>) -> Self {
        Self::of(poll.is_open, deadline_of(poll), now)
    }
}

fn deadline_of(poll: &poll::Model) -> Option<DateTime<Utc>> {
    poll.deadline.map(|d| d.with_timezone(&Utc))
}

/// Parse a client-supplied deadline.
///
/// Accepts RFC 3339, `YYYY-MM-DD[T| ]HH:MM[:SS[.fff]]` without offset (read
/// as UTC), or a bare `YYYY-MM-DD` meaning midnight UTC.
pub fn parse_deadline(raw: &str) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    Err(AppError::Validation(format!("Invalid deadline: {raw}")))
}

/// Input for creating a poll.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollInput {
    #[validate(length(min = 1))]
    pub room_id: String,
    #[validate(length(min = 1, max = 200))]
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub deadline: Option<String>,
}

/// Input for casting a vote.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VoteInput {
    #[validate(length(min = 1))]
    pub poll_id: String,
    #[validate(length(min = 1))]
    pub option_id: String,
}

/// One option with its tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOptionView {
    pub id: String,
    pub text: String,
    pub count: usize,
    /// IDs of the users who picked this option.
    pub votes: Vec<String>,
}

/// A poll with aggregated results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub id: String,
    pub room_id: String,
    pub question: String,
    pub is_open: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub total_votes: usize,
    pub options: Vec<PollOptionView>,
}

/// Aggregate a poll's votes per option.
///
/// `options` and `votes` may contain rows of other polls; they are filtered.
#[must_use]
pub fn build_view(
    poll: &poll::Model,
    options: &[poll_option::Model],
    votes: &[vote::Model],
) -> PollView {
    let mut own_options: Vec<&poll_option::Model> =
        options.iter().filter(|o| o.poll_id == poll.id).collect();
    own_options.sort_by_key(|o| o.position);

    let options: Vec<PollOptionView> = own_options
        .into_iter()
        .map(|option| {
            let voters: Vec<String> = votes
                .iter()
                .filter(|v| v.poll_id == poll.id && v.option_id == option.id)
                .map(|v| v.user_id.clone())
                .collect();
            PollOptionView {
                id: option.id.clone(),
                text: option.text.clone(),
                count: voters.len(),
                votes: voters,
            }
        })
        .collect();

    PollView {
        id: poll.id.clone(),
        room_id: poll.room_id.clone(),
        question: poll.question.clone(),
        is_open: poll.is_open,
        deadline: deadline_of(poll),
        closed_at: poll.closed_at.map(|d| d.with_timezone(&Utc)),
        created_at: poll.created_at.with_timezone(&Utc),
        total_votes: options.iter().map(|o| o.count).sum(),
        options,
    }
}

/// Views for several polls, loading options and votes in two queries.
pub async fn load_views(
    poll_repo: &PollRepository,
    polls: &[poll::Model],
) -> AppResult<Vec<PollView>> {
    if polls.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<String> = polls.iter().map(|p| p.id.clone()).collect();
    let options = poll_repo.find_options_for_polls(&ids).await?;
    let votes = poll_repo.find_votes_for_polls(&ids).await?;

    Ok(polls
        .iter()
        .map(|p| build_view(p, &options, &votes))
        .collect())
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    poll_repo: PollRepository,
    room_repo: RoomRepository,
    publisher: EventPublisherService,
    id_gen: IdGenerator,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub const fn new(
        poll_repo: PollRepository,
        room_repo: RoomRepository,
        publisher: EventPublisherService,
    ) -> Self {
        Self {
            poll_repo,
            room_repo,
            publisher,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a poll in a room. Only the room's creator may do this.
    pub async fn create_poll(
        &self,
        creator: &Identity,
        input: CreatePollInput,
    ) -> AppResult<PollView> {
        input.validate()?;

        let question = input.question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Validation("Question is required".to_string()));
        }

        let texts: Vec<String> = input
            .options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if texts.len() < MIN_OPTIONS {
            return Err(AppError::Validation(format!(
                "Poll must have at least {MIN_OPTIONS} non-empty options"
            )));
        }
        if texts.len() > MAX_OPTIONS {
            return Err(AppError::Validation(format!(
                "Poll cannot have more than {MAX_OPTIONS} options"
            )));
        }
        if texts.iter().any(|t| t.chars().count() > MAX_OPTION_LEN) {
            return Err(AppError::Validation(format!(
                "Poll option is too long (max {MAX_OPTION_LEN} chars)"
            )));
        }

        let deadline = match input.deadline.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_deadline(raw)?),
            _ => None,
        };

        let room = self.room_repo.get_by_id(&input.room_id).await?;
        if room.creator_id != creator.id {
            return Err(AppError::Forbidden(
                "Only the room creator can create polls".to_string(),
            ));
        }
        if !room.is_active {
            return Err(AppError::BadRequest("Room is closed".to_string()));
        }

        let poll_id = self.id_gen.generate();
        let options: Vec<poll_option::Model> = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| poll_option::Model {
                id: self.id_gen.generate(),
                poll_id: poll_id.clone(),
                text,
                position: i32::try_from(i).unwrap_or(i32::MAX),
            })
            .collect();

        let created = self
            .poll_repo
            .create(
                poll::ActiveModel {
                    id: Set(poll_id),
                    room_id: Set(room.id.clone()),
                    question: Set(question),
                    is_open: Set(true),
                    deadline: Set(deadline.map(Into::into)),
                    closed_at: Set(None),
                    created_at: Set(Utc::now().into()),
                },
                options
                    .iter()
                    .map(|o| poll_option::ActiveModel {
                        id: Set(o.id.clone()),
                        poll_id: Set(o.poll_id.clone()),
                        text: Set(o.text.clone()),
                        position: Set(o.position),
                    })
                    .collect(),
            )
            .await?;

        info!(poll_id = %created.id, room_id = %room.id, options = options.len(), "Poll created");

        let view = build_view(&created, &options, &[]);
        emit::to_room(&self.publisher, &room.code, StreamEvent::NewPoll(view.clone())).await;

        Ok(view)
    }

    /// Cast or change a vote.
    pub async fn vote(&self, voter: &Identity, input: VoteInput) -> AppResult<PollView> {
        input.validate()?;

        let now = Utc::now();
        let poll = self.poll_repo.get_by_id(&input.poll_id).await?;
        let room = self.room_repo.get_by_id(&poll.room_id).await?;

        match PollPhase::of_model(&poll, now) {
            PollPhase::Open => {}
            PollPhase::Lapsed => {
                self.expire(&poll, &room, now).await?;
                return Err(AppError::Forbidden("Poll has expired".to_string()));
            }
            PollPhase::Closed => {
                return Err(AppError::Forbidden("Poll is closed".to_string()));
            }
        }

        let options = self.poll_repo.find_options(&poll.id).await?;
        if !options.iter().any(|o| o.id == input.option_id) {
            return Err(AppError::NotFound("Option not found".to_string()));
        }

        self.poll_repo
            .upsert_vote(vote::ActiveModel {
                id: Set(self.id_gen.generate()),
                user_id: Set(voter.id.clone()),
                poll_id: Set(poll.id.clone()),
                option_id: Set(input.option_id.clone()),
                created_at: Set(now.into()),
                updated_at: Set(Some(now.into())),
            })
            .await?;

        let votes = self.poll_repo.find_votes(&poll.id).await?;
        let view = build_view(&poll, &options, &votes);

        emit::to_room(
            &self.publisher,
            &room.code,
            StreamEvent::PollResults(view.clone()),
        )
        .await;

        if room.creator_id != voter.id {
            emit::to_user(
                &self.publisher,
                &room.creator_id,
                StreamEvent::VoteNotification {
                    poll_id: poll.id.clone(),
                    poll_question: poll.question.clone(),
                    voted_by: voter.username.clone(),
                    room_code: room.code.clone(),
                    room_id: room.id.clone(),
                },
            )
            .await;
        }

        Ok(view)
    }

    /// Current results. Closes the poll first if its deadline has passed.
    pub async fn get_results(&self, poll_id: &str) -> AppResult<PollView> {
        let now = Utc::now();
        let mut poll = self.poll_repo.get_by_id(poll_id).await?;

        if PollPhase::of_model(&poll, now) == PollPhase::Lapsed {
            let room = self.room_repo.get_by_id(&poll.room_id).await?;
            self.expire(&poll, &room, now).await?;
            poll.is_open = false;
            poll.closed_at.get_or_insert_with(|| now.into());
        }

        let options = self.poll_repo.find_options(&poll.id).await?;
        let votes = self.poll_repo.find_votes(&poll.id).await?;

        Ok(build_view(&poll, &options, &votes))
    }

    /// Close a poll by hand. Closing an already-closed poll is a no-op.
    pub async fn close_poll(&self, requester: &Identity, poll_id: &str) -> AppResult<()> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let room = self.room_repo.get_by_id(&poll.room_id).await?;

        if room.creator_id != requester.id {
            return Err(AppError::Forbidden(
                "Only the room creator can close polls".to_string(),
            ));
        }

        if !self.poll_repo.mark_closed(&poll.id, Utc::now()).await? {
            return Ok(());
        }

        info!(poll_id = %poll.id, "Poll closed by creator");

        emit::to_room(
            &self.publisher,
            &room.code,
            StreamEvent::PollClosed {
                poll_id: poll.id.clone(),
                auto_closed: false,
            },
        )
        .await;

        let Some((members, votes)) = self.audience(&room, &poll).await else {
            return Ok(());
        };
        let message = format!("The poll \"{}\" was closed by the moderator.", poll.question);

        for member in members
            .iter()
            .filter(|m| !votes.iter().any(|v| v.user_id == m.user_id))
        {
            emit::to_user(
                &self.publisher,
                &member.user_id,
                StreamEvent::PollExpired {
                    poll_id: poll.id.clone(),
                    room_code: room.code.clone(),
                    message: message.clone(),
                    has_voted: false,
                },
            )
            .await;
        }

        Ok(())
    }

    /// Delete a poll with its options and votes.
    pub async fn delete_poll(&self, requester: &Identity, poll_id: &str) -> AppResult<()> {
        let poll = self.poll_repo.get_by_id(poll_id).await?;
        let room = self.room_repo.get_by_id(&poll.room_id).await?;

        if room.creator_id != requester.id {
            return Err(AppError::Forbidden(
                "Only the room creator can delete polls".to_string(),
            ));
        }

        self.poll_repo.delete(&poll.id).await?;
        info!(poll_id = %poll.id, "Poll deleted");

        emit::to_room(
            &self.publisher,
            &room.code,
            StreamEvent::PollDeleted {
                poll_id: poll.id.clone(),
            },
        )
        .await;

        Ok(())
    }

    /// Close every open poll whose deadline has passed. Returns how many this call closed.
    pub async fn close_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let expired = self.poll_repo.find_open_expired(now).await?;
        let mut closed = 0;

        for poll in expired {
            let room = match self.room_repo.find_by_id(&poll.room_id).await {
                Ok(Some(room)) => room,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, poll_id = %poll.id, "Failed to load room for expired poll");
                    continue;
                }
            };

            match self.expire(&poll, &room, now).await {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(e) => error!(error = %e, poll_id = %poll.id, "Failed to close expired poll"),
            }
        }

        Ok(closed)
    }

    /// Warn every member of rooms with polls ending within `window`.
    ///
    /// No de-duplication state is kept: a poll is re-announced on every call
    /// while it stays inside the window. Returns the number of notices sent.
    pub async fn warn_expiring(&self, now: DateTime<Utc>, window: Duration) -> AppResult<usize> {
        let expiring = self.poll_repo.find_open_expiring(now, now + window).await?;
        let minutes = window.num_minutes().max(1);
        let mut sent = 0;

        for poll in expiring {
            match self.warn_poll(&poll, minutes).await {
                Ok(count) => sent += count,
                Err(e) => {
                    error!(error = %e, poll_id = %poll.id, "Failed to warn about expiring poll");
                }
            }
        }

        Ok(sent)
    }

    async fn warn_poll(&self, poll: &poll::Model, minutes: i64) -> AppResult<usize> {
        let Some(deadline) = deadline_of(poll) else {
            return Ok(0);
        };
        let Some(room) = self.room_repo.find_by_id(&poll.room_id).await? else {
            return Ok(0);
        };

        let members = self.room_repo.find_members(&room.id).await?;
        let votes = self.poll_repo.find_votes(&poll.id).await?;

        for member in &members {
            let has_voted = votes.iter().any(|v| v.user_id == member.user_id);
            let mut message = format!(
                "The poll \"{}\" in room {} expires in less than {minutes} minutes.",
                poll.question, room.name
            );
            if !has_voted {
                message.push_str(" Vote now!");
            }

            emit::to_user(
                &self.publisher,
                &member.user_id,
                StreamEvent::PollExpiringSoon {
                    poll_id: poll.id.clone(),
                    room_code: room.code.clone(),
                    deadline,
                    message,
                    has_voted,
                },
            )
            .await;
        }

        Ok(members.len())
    }

    /// Members of the poll's room and the poll's votes, for closure notices.
    ///
    /// Runs after the poll is already closed, so a failed lookup only drops
    /// the notices.
    async fn audience(
        &self,
        room: &room::Model,
        poll: &poll::Model,
    ) -> Option<(Vec<room_member::Model>, Vec<vote::Model>)> {
        let lookup = async {
            let members = self.room_repo.find_members(&room.id).await?;
            let votes = self.poll_repo.find_votes(&poll.id).await?;
            Ok::<_, AppError>((members, votes))
        };

        match lookup.await {
            Ok(audience) => Some(audience),
            Err(e) => {
                warn!(error = %e, poll_id = %poll.id, "Poll closed but notices were skipped");
                None
            }
        }
    }

    /// Close a lapsed poll and announce it.
    ///
    /// Returns `false` when another caller already closed it; in that case
    /// nothing is announced.
    async fn expire(
        &self,
        poll: &poll::Model,
        room: &room::Model,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        if !self.poll_repo.mark_closed(&poll.id, now).await? {
            return Ok(false);
        }

        info!(poll_id = %poll.id, room_code = %room.code, "Poll closed after deadline");

        emit::to_room(
            &self.publisher,
            &room.code,
            StreamEvent::PollClosed {
                poll_id: poll.id.clone(),
                auto_closed: true,
            },
        )
        .await;

        let Some((members, votes)) = self.audience(room, poll).await else {
            return Ok(true);
        };

        for member in &members {
            let has_voted = votes.iter().any(|v| v.user_id == member.user_id);
            let message = if has_voted {
                format!("The poll \"{}\" has ended. Thanks for voting!", poll.question)
            } else {
                format!("The poll \"{}\" has ended.", poll.question)
            };

            emit::to_user(
                &self.publisher,
                &member.user_id,
                StreamEvent::PollExpired {
                    poll_id: poll.id.clone(),
                    room_code: room.code.clone(),
                    message,
                    has_voted,
                },
            )
            .await;
        }

        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_publisher::testing::{RecordingPublisher, Target};
    use pollroom_db::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, DatabaseConnection, DbErr, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn db_down() -> DbErr {
        DbErr::Custom("connection reset".to_string())
    }

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

    fn service(
        db: MockDatabase,
    ) -> (PollService, Arc<RecordingPublisher>, Arc<DatabaseConnection>) {
        let conn = Arc::new(db.into_connection());
        let publisher = Arc::new(RecordingPublisher::default());
        let svc = PollService::new(
            PollRepository::new(conn.clone()),
            RoomRepository::new(conn.clone()),
            publisher.clone(),
        );
        (svc, publisher, conn)
    }

    fn options() -> Vec<poll_option::Model> {
        vec![
            fixtures::poll_option("ox", "p1", "X", 0),
            fixtures::poll_option("oy", "p1", "Y", 1),
        ]
    }

    fn create_input(options: &[&str], deadline: Option<&str>) -> CreatePollInput {
        CreatePollInput {
            room_id: "r1".to_string(),
            question: "X vs Y".to_string(),
            options: options.iter().map(ToString::to_string).collect(),
            deadline: deadline.map(ToString::to_string),
        }
    }

    // ==================== Pure helpers ====================

    #[test]
    fn test_phase() {
        let now = Utc::now();
        let later = now + Duration::seconds(1);

        assert_eq!(PollPhase::of(true, None, now), PollPhase::Open);
        assert_eq!(PollPhase::of(true, Some(later), now), PollPhase::Open);
        assert_eq!(PollPhase::of(true, Some(now), now), PollPhase::Lapsed);
        assert_eq!(PollPhase::of(false, Some(later), now), PollPhase::Closed);
        assert_eq!(PollPhase::of(false, None, now), PollPhase::Closed);
    }

    #[test]
    fn test_parse_deadline_formats() {
        let rfc = parse_deadline("2030-01-02T03:04:05.000Z").unwrap();
        assert_eq!(rfc.to_rfc3339(), "2030-01-02T03:04:05+00:00");

        let offset = parse_deadline("2030-01-02T05:04:05+02:00").unwrap();
        assert_eq!(offset, rfc);

        let local_minutes = parse_deadline("2030-01-02T03:04").unwrap();
        assert_eq!(local_minutes.to_rfc3339(), "2030-01-02T03:04:00+00:00");

        let local_seconds = parse_deadline("2030-01-02T03:04:05").unwrap();
        assert_eq!(local_seconds, rfc);

        let spaced = parse_deadline("2030-01-02 03:04:05").unwrap();
        assert_eq!(spaced, rfc);

        let spaced_minutes = parse_deadline("2030-01-02 03:04").unwrap();
        assert_eq!(spaced_minutes, local_minutes);

        let date_only = parse_deadline("2030-01-02").unwrap();
        assert_eq!(date_only.to_rfc3339(), "2030-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_parse_deadline_rejects_garbage() {
        assert!(matches!(
            parse_deadline("next tuesday"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_build_view_tallies() {
        let poll = fixtures::poll("p1", "r1", true, None);
        let mut opts = options();
        opts.push(fixtures::poll_option("other", "p2", "Z", 0));
        let votes = vec![
            fixtures::vote("v1", "a", "p1", "ox"),
            fixtures::vote("v2", "b", "p1", "ox"),
            fixtures::vote("v3", "c", "p1", "oy"),
            fixtures::vote("v4", "d", "p2", "other"),
        ];

        let view = build_view(&poll, &opts, &votes);

        assert_eq!(view.options.len(), 2);
        assert_eq!(view.total_votes, 3);
        assert_eq!(view.options[0].text, "X");
        assert_eq!(view.options[0].votes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(view.options[1].count, 1);
    }

    // ==================== create_poll ====================

    #[tokio::test]
    async fn test_create_poll_needs_two_non_empty_options() {
        let (svc, publisher, _) = service(MockDatabase::new(DatabaseBackend::Postgres));

        let result = svc
            .create_poll(&who("a", "alice"), create_input(&["X", "   ", ""], None))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_create_poll_rejects_bad_deadline() {
        let (svc, _, _) = service(MockDatabase::new(DatabaseBackend::Postgres));

        let result = svc
            .create_poll(&who("a", "alice"), create_input(&["X", "Y"], Some("soon")))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_poll_room_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<room::Model>::new()]);
        let (svc, _, _) = service(db);

        let result = svc
            .create_poll(&who("a", "alice"), create_input(&["X", "Y"], None))
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_poll_non_creator_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, publisher, _) = service(db);

        let result = svc
            .create_poll(&who("b", "bob"), create_input(&["X", "Y"], None))
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_create_poll_inserts_options_and_announces() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([[fixtures::poll("p1", "r1", true, None)]])
            .append_exec_results([exec(2)]);
        let (svc, publisher, conn) = service(db);

        let view = svc
            .create_poll(
                &who("a", "alice"),
                create_input(&[" X ", "Y", ""], Some("2030-01-02T03:04")),
            )
            .await
            .unwrap();
        drop(svc);

        assert_eq!(view.question, "X vs Y");
        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["newPoll"]
        );

        let log = format!(
            "{:?}",
            Arc::try_unwrap(conn).unwrap().into_transaction_log()
        );
        assert!(log.contains("poll_option"));
        assert!(log.contains("\"X\""));
        assert!(log.contains("\"Y\""));
    }

    // ==================== vote ====================

    #[tokio::test]
    async fn test_vote_on_closed_poll_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", false, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, publisher, _) = service(db);

        let result = svc
            .vote(
                &who("b", "bob"),
                VoteInput {
                    poll_id: "p1".to_string(),
                    option_id: "ox".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_vote_on_lapsed_poll_closes_it() {
        let past = Utc::now() - Duration::seconds(1);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, Some(past))]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_results([vec![
                fixtures::room_member("m1", "r1", "a"),
                fixtures::room_member("m2", "r1", "b"),
            ]])
            .append_query_results([vec![fixtures::vote("v1", "b", "p1", "ox")]]);
        let (svc, publisher, _) = service(db);

        let result = svc
            .vote(
                &who("b", "bob"),
                VoteInput {
                    poll_id: "p1".to_string(),
                    option_id: "oy".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["pollClosed"]
        );
        assert_eq!(
            publisher.names_for(&Target::User("a".to_string())),
            vec!["pollExpired"]
        );
        assert_eq!(
            publisher.names_for(&Target::User("b".to_string())),
            vec!["pollExpired"]
        );
    }

    #[tokio::test]
    async fn test_vote_on_lapsed_poll_survives_failed_member_lookup() {
        let past = Utc::now() - Duration::seconds(1);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, Some(past))]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_errors([db_down()]);
        let (svc, publisher, _) = service(db);

        let result = svc
            .vote(
                &who("b", "bob"),
                VoteInput {
                    poll_id: "p1".to_string(),
                    option_id: "ox".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["pollClosed"]
        );
        assert!(
            publisher
                .names_for(&Target::User("b".to_string()))
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_vote_unknown_option_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([options()]);
        let (svc, _, _) = service(db);

        let result = svc
            .vote(
                &who("b", "bob"),
                VoteInput {
                    poll_id: "p1".to_string(),
                    option_id: "elsewhere".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_vote_notifies_room_and_creator() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([options()])
            .append_exec_results([exec(1)])
            .append_query_results([vec![fixtures::vote("v1", "b", "p1", "oy")]]);
        let (svc, publisher, _) = service(db);

        let view = svc
            .vote(
                &who("b", "bob"),
                VoteInput {
                    poll_id: "p1".to_string(),
                    option_id: "oy".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(view.total_votes, 1);
        assert_eq!(view.options[1].votes, vec!["b".to_string()]);
        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["pollResults"]
        );

        let to_creator = publisher
            .all()
            .into_iter()
            .find(|(t, _)| *t == Target::User("a".to_string()))
            .map(|(_, e)| e)
            .unwrap();
        match to_creator {
            StreamEvent::VoteNotification {
                voted_by, room_id, ..
            } => {
                assert_eq!(voted_by, "bob");
                assert_eq!(room_id, "r1");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_creator_vote_skips_notification() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([options()])
            .append_exec_results([exec(1)])
            .append_query_results([vec![fixtures::vote("v1", "a", "p1", "ox")]]);
        let (svc, publisher, _) = service(db);

        svc.vote(
            &who("a", "alice"),
            VoteInput {
                poll_id: "p1".to_string(),
                option_id: "ox".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(
            publisher
                .names_for(&Target::User("a".to_string()))
                .is_empty()
        );
    }

    // ==================== results / close / delete ====================

    #[tokio::test]
    async fn test_results_close_lapsed_poll() {
        let past = Utc::now() - Duration::seconds(5);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, Some(past))]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_results([Vec::<pollroom_db::entities::room_member::Model>::new()])
            .append_query_results([Vec::<vote::Model>::new()])
            .append_query_results([options()])
            .append_query_results([Vec::<vote::Model>::new()]);
        let (svc, publisher, _) = service(db);

        let view = svc.get_results("p1").await.unwrap();

        assert!(!view.is_open);
        assert!(view.closed_at.is_some());
        assert_eq!(view.options.len(), 2);
        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["pollClosed"]
        );
    }

    #[tokio::test]
    async fn test_results_of_lapsed_poll_survive_failed_vote_lookup() {
        let past = Utc::now() - Duration::seconds(5);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, Some(past))]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_results([vec![fixtures::room_member("m1", "r1", "a")]])
            .append_query_errors([db_down()])
            .append_query_results([options()])
            .append_query_results([vec![fixtures::vote("v1", "a", "p1", "ox")]]);
        let (svc, _, _) = service(db);

        let view = svc.get_results("p1").await.unwrap();

        assert!(!view.is_open);
        assert_eq!(view.total_votes, 1);
    }

    #[tokio::test]
    async fn test_results_when_already_closed_elsewhere_stay_quiet() {
        let past = Utc::now() - Duration::seconds(5);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, Some(past))]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(0)])
            .append_query_results([options()])
            .append_query_results([Vec::<vote::Model>::new()]);
        let (svc, publisher, _) = service(db);

        let view = svc.get_results("p1").await.unwrap();

        assert!(!view.is_open);
        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_close_poll_non_creator_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]]);
        let (svc, publisher, _) = service(db);

        let result = svc.close_poll(&who("b", "bob"), "p1").await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_close_poll_warns_only_non_voters() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_results([vec![
                fixtures::room_member("m1", "r1", "a"),
                fixtures::room_member("m2", "r1", "b"),
                fixtures::room_member("m3", "r1", "c"),
            ]])
            .append_query_results([vec![fixtures::vote("v1", "b", "p1", "ox")]]);
        let (svc, publisher, _) = service(db);

        svc.close_poll(&who("a", "alice"), "p1").await.unwrap();

        let events = publisher.all();
        assert!(events.iter().any(|(t, e)| {
            *t == Target::Room("ABC123".to_string())
                && matches!(e, StreamEvent::PollClosed { auto_closed: false, .. })
        }));
        assert_eq!(
            publisher.names_for(&Target::User("a".to_string())),
            vec!["pollExpired"]
        );
        assert!(
            publisher
                .names_for(&Target::User("b".to_string()))
                .is_empty()
        );
        assert_eq!(
            publisher.names_for(&Target::User("c".to_string())),
            vec!["pollExpired"]
        );
    }

    #[tokio::test]
    async fn test_close_poll_succeeds_when_member_lookup_fails() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_errors([db_down()]);
        let (svc, publisher, _) = service(db);

        svc.close_poll(&who("a", "alice"), "p1").await.unwrap();

        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["pollClosed"]
        );
    }

    #[tokio::test]
    async fn test_close_poll_twice_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", false, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(0)]);
        let (svc, publisher, _) = service(db);

        svc.close_poll(&who("a", "alice"), "p1").await.unwrap();

        assert!(publisher.all().is_empty());
    }

    #[tokio::test]
    async fn test_delete_poll_announces() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll("p1", "r1", true, None)]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)]);
        let (svc, publisher, _) = service(db);

        svc.delete_poll(&who("a", "alice"), "p1").await.unwrap();

        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["pollDeleted"]
        );
    }

    // ==================== scheduler scans ====================

    #[tokio::test]
    async fn test_close_expired_notifies_every_member() {
        let now = Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll(
                "p1",
                "r1",
                true,
                Some(now - Duration::seconds(1)),
            )]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_results([vec![
                fixtures::room_member("m1", "r1", "a"),
                fixtures::room_member("m2", "r1", "b"),
            ]])
            .append_query_results([vec![fixtures::vote("v1", "b", "p1", "ox")]]);
        let (svc, publisher, _) = service(db);

        let closed = svc.close_expired(now).await.unwrap();

        assert_eq!(closed, 1);
        let expired: Vec<(Target, bool)> = publisher
            .all()
            .into_iter()
            .filter_map(|(t, e)| match e {
                StreamEvent::PollExpired { has_voted, .. } => Some((t, has_voted)),
                _ => None,
            })
            .collect();
        assert_eq!(
            expired,
            vec![
                (Target::User("a".to_string()), false),
                (Target::User("b".to_string()), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_warn_expiring_wording_depends_on_vote() {
        let now = Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll(
                "p1",
                "r1",
                true,
                Some(now + Duration::minutes(2)),
            )]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_results([vec![
                fixtures::room_member("m1", "r1", "a"),
                fixtures::room_member("m2", "r1", "b"),
            ]])
            .append_query_results([vec![fixtures::vote("v1", "b", "p1", "ox")]]);
        let (svc, publisher, _) = service(db);

        let sent = svc.warn_expiring(now, Duration::minutes(5)).await.unwrap();

        assert_eq!(sent, 2);
        let messages: Vec<(Target, String)> = publisher
            .all()
            .into_iter()
            .filter_map(|(t, e)| match e {
                StreamEvent::PollExpiringSoon { message, .. } => Some((t, message)),
                _ => None,
            })
            .collect();
        assert!(messages[0].1.ends_with("Vote now!"));
        assert!(messages[0].1.contains("less than 5 minutes"));
        assert!(!messages[1].1.contains("Vote now!"));
    }

    #[tokio::test]
    async fn test_close_expired_keeps_count_when_notices_fail() {
        let now = Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::poll(
                "p1",
                "r1",
                true,
                Some(now - Duration::seconds(1)),
            )]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_exec_results([exec(1)])
            .append_query_errors([db_down()]);
        let (svc, publisher, _) = service(db);

        let closed = svc.close_expired(now).await.unwrap();

        assert_eq!(closed, 1);
        assert_eq!(
            publisher.names_for(&Target::Room("ABC123".to_string())),
            vec!["pollClosed"]
        );
    }

    #[tokio::test]
    async fn test_warn_expiring_continues_past_failing_poll() {
        let now = Utc::now();
        let deadline = Some(now + Duration::minutes(2));
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                fixtures::poll("p1", "r1", true, deadline),
                fixtures::poll("p2", "r2", true, deadline),
            ]])
            .append_query_results([[fixtures::room("r1", "ABC123", "a")]])
            .append_query_errors([db_down()])
            .append_query_results([[fixtures::room("r2", "XYZ789", "c")]])
            .append_query_results([vec![fixtures::room_member("m3", "r2", "c")]])
            .append_query_results([Vec::<vote::Model>::new()]);
        let (svc, publisher, _) = service(db);

        let sent = svc.warn_expiring(now, Duration::minutes(5)).await.unwrap();

        assert_eq!(sent, 1);
        assert_eq!(
            publisher.names_for(&Target::User("c".to_string())),
            vec!["pollExpiringSoon"]
        );
    }
}
