//! Core business logic for pollroom.

pub mod services;

pub use services::*;
