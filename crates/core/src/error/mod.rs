//! # Error Handling Framework
//!
//! Structured error management for the sync engine:
//!
//! - **Categorized codes**: every failure carries an [`ErrorCode`] from the
//!   sync taxonomy (authorization, webhook signature, platform auth,
//!   platform transient, platform input, missing mapping) plus the
//!   infrastructure codes (database, queue, serialization, encryption).
//! - **Retryability**: each code knows whether the queue runtime should
//!   retry it. Workers classify at the job boundary and re-throw only
//!   transient errors.
//! - **HTTP mapping**: each code maps to a status for the API surface.
//!
//! ## Usage
//!
//! ```rust
//! use channelsync_core::error::{Error, ErrorCode, Result};
//!
//! fn ensure_owner(entity_user: uuid::Uuid, caller: uuid::Uuid) -> Result<()> {
//!     if entity_user != caller {
//!         return Err(Error::new(
//!             ErrorCode::AuthorizationFailed,
//!             "entity does not belong to the calling user",
//!         ));
//!     }
//!     Ok(())
//! }
//! ```

pub mod codes;
pub mod framework;

pub use codes::ErrorCode;
pub use framework::{Error, ErrorSeverity, Result};
