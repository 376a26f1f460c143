//! # Activity Log
//!
//! Append-only record of sync outcomes per user. Every push and webhook
//! terminal outcome writes one entry; entries are mirrored into structured
//! logging and persisted through an [`ActivitySink`].

pub mod entry;
pub mod logger;
pub mod repository;

pub use entry::{events, ActivityEntry, ActivityStatus};
pub use logger::{ActivityLogger, ActivitySink, NullActivitySink};
pub use repository::PgActivityRepository;
