//! Test utilities for database operations.
//!
//! Provides helpers for setting up and tearing down test databases, plus
//! model fixtures for mock-backed tests.

use pollroom_common::IdGenerator;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use tracing::info;

/// Test database configuration.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database username.
    pub username: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub database: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TEST_DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5433),
            username: std::env::var("TEST_DB_USER")
                .unwrap_or_else(|_| "pollroom_test".to_string()),
            password: std::env::var("TEST_DB_PASSWORD")
                .unwrap_or_else(|_| "pollroom_test".to_string()),
            database: std::env::var("TEST_DB_NAME")
                .unwrap_or_else(|_| "pollroom_test".to_string()),
        }
    }
}

impl TestDbConfig {
    /// Get the database URL.
    #[must_use]
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// Get URL for connecting to postgres database (for creating test DB).
    #[must_use]
    pub fn postgres_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/postgres",
            self.username, self.password, self.host, self.port
        )
    }
}

/// A test database context that manages the lifecycle of a test database.
pub struct TestDatabase {
    /// Database connection.
    pub conn: DatabaseConnection,
    /// Database configuration.
    pub config: TestDbConfig,
}

impl TestDatabase {
    /// Connect to the configured test database.
    pub async fn new() -> Result<Self, DbErr> {
        let config = TestDbConfig::default();
        let conn = Database::connect(&config.database_url()).await?;

        info!(database = %config.database, "Connected to test database");

        Ok(Self { conn, config })
    }

    /// Create a uniquely named database (for parallel tests) and run migrations on it.
    pub async fn create_unique() -> Result<Self, DbErr> {
        let mut config = TestDbConfig::default();
        let suffix = IdGenerator::new().generate();
        config.database = format!("pollroom_test_{}", &suffix[suffix.len() - 8..]);

        let postgres_conn = Database::connect(&config.postgres_url()).await?;
        let create_db = format!("CREATE DATABASE \"{}\"", config.database);
        postgres_conn
            .execute(Statement::from_string(DatabaseBackend::Postgres, create_db))
            .await?;
        postgres_conn.close().await?;

        let conn = Database::connect(&config.database_url()).await?;
        crate::migrate(&conn)
            .await
            .map_err(|e| DbErr::Custom(e.to_string()))?;

        info!(database = %config.database, "Created unique test database");

        Ok(Self { conn, config })
    }

    /// Get the database connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Truncate every application table.
    pub async fn cleanup(&self) -> Result<(), DbErr> {
        let tables = self
            .conn
            .query_all(Statement::from_string(
                DatabaseBackend::Postgres,
                "SELECT tablename FROM pg_tables WHERE schemaname = 'public'".to_string(),
            ))
            .await?;

        for row in tables {
            if let Ok(table_name) = row.try_get::<String>("", "tablename") {
                if table_name == "seaql_migrations" {
                    continue;
                }

                let truncate = format!("TRUNCATE TABLE \"{table_name}\" CASCADE");
                self.conn
                    .execute(Statement::from_string(DatabaseBackend::Postgres, truncate))
                    .await?;
            }
        }

        info!("Cleaned up test database");
        Ok(())
    }

    /// Drop the test database (for unique databases).
    pub async fn drop_database(self) -> Result<(), DbErr> {
        self.conn.close().await?;

        let postgres_conn = Database::connect(&self.config.postgres_url()).await?;

        let terminate = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
            self.config.database
        );
        postgres_conn
            .execute(Statement::from_string(DatabaseBackend::Postgres, terminate))
            .await
            .ok();

        let drop_db = format!("DROP DATABASE IF EXISTS \"{}\"", self.config.database);
        postgres_conn
            .execute(Statement::from_string(DatabaseBackend::Postgres, drop_db))
            .await?;

        postgres_conn.close().await?;

        info!(database = %self.config.database, "Dropped test database");
        Ok(())
    }
}

/// Model builders for mock-backed tests.
pub mod fixtures {
    use chrono::{DateTime, Utc};

    use crate::entities::user::UserRole;
    use crate::entities::{mention, message, poll, poll_option, room, room_member, user, vote};

    /// A regular user with a placeholder password hash.
    #[must_use]
    pub fn user(id: &str, username: &str) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: username.to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$placeholder$placeholder".to_string(),
            role: UserRole::User,
            created_at: Utc::now().into(),
        }
    }

    /// An active room.
    #[must_use]
    pub fn room(id: &str, code: &str, creator_id: &str) -> room::Model {
        room::Model {
            id: id.to_string(),
            code: code.to_string(),
            name: format!("Room {code}"),
            description: None,
            creator_id: creator_id.to_string(),
            is_active: true,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    /// A membership row.
    #[must_use]
    pub fn room_member(id: &str, room_id: &str, user_id: &str) -> room_member::Model {
        room_member::Model {
            id: id.to_string(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            joined_at: Utc::now().into(),
        }
    }

    /// A chat message.
    #[must_use]
    pub fn message(id: &str, user_id: &str, room_id: Option<&str>, content: &str) -> message::Model {
        message::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            room_id: room_id.map(ToString::to_string),
            content: content.to_string(),
            created_at: Utc::now().into(),
        }
    }

    /// A mention row.
    #[must_use]
    pub fn mention(id: &str, message_id: &str, user_id: &str, username: &str) -> mention::Model {
        mention::Model {
            id: id.to_string(),
            message_id: message_id.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            created_at: Utc::now().into(),
        }
    }

    /// A poll.
    #[must_use]
    pub fn poll(
        id: &str,
        room_id: &str,
        is_open: bool,
        deadline: Option<DateTime<Utc>>,
    ) -> poll::Model {
        poll::Model {
            id: id.to_string(),
            room_id: room_id.to_string(),
            question: "X vs Y".to_string(),
            is_open,
            deadline: deadline.map(Into::into),
            closed_at: if is_open { None } else { Some(Utc::now().into()) },
            created_at: Utc::now().into(),
        }
    }

    /// A poll option.
    #[must_use]
    pub fn poll_option(id: &str, poll_id: &str, text: &str, position: i32) -> poll_option::Model {
        poll_option::Model {
            id: id.to_string(),
            poll_id: poll_id.to_string(),
            text: text.to_string(),
            position,
        }
    }

    /// A vote.
    #[must_use]
    pub fn vote(id: &str, user_id: &str, poll_id: &str, option_id: &str) -> vote::Model {
        vote::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            poll_id: poll_id.to_string(),
            option_id: option_id.to_string(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }
}
