//! Progressive concept banks with confidence-driven spaced repetition.
//!
//! Documents are tokenized and parsed into a [`models::ConceptGraph`], stored
//! in SQLite by [`db::Database`], and scheduled answer by answer with
//! [`scheduler::schedule_review`].

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod scheduler;
