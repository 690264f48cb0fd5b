//! # duet-store
//!
//! Local persistence for the duet matching core, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for the domain
//! models: profiles (the Directory), likes, matches, calls, and reports
//! (the Relationship Store).

pub mod calls;
pub mod database;
pub mod likes;
pub mod matches;
pub mod migrations;
pub mod models;
pub mod profiles;
pub mod reports;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
