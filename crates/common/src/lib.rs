//! Common utilities and shared types for pollroom.
//!
//! This crate provides foundational components used across all pollroom crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based identifiers and room join codes via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use pollroom_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {} on port {}", id, config.server.port);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{AuthConfig, Config, DatabaseConfig, SchedulerConfig, ServerConfig};
pub use error::{AppError, AppResult};
pub use id::{IdGenerator, ROOM_CODE_LEN};
