//! # Mapping Engine
//!
//! Pure, stateless translation between platform shapes and canonical
//! shapes, plus the match suggester that seeds the mapping layer.
//!
//! Adapters normalize their wire formats into the neutral types in
//! [`types`]; everything in this module is deterministic and free of I/O.

pub mod canonical;
pub mod platform;
pub mod suggest;
pub mod types;

pub use canonical::{CanonicalBatch, LevelDraft, ProductDraft, VariantDraft};
pub use platform::{BuildOutcome, LocationQuantity, PlatformProductInput, PlatformVariantInput, PushMode};
pub use suggest::{MappingSuggestion, MatchRule, SuggestionEngine};
pub use types::{
    PlatformInventoryData, PlatformLocationData, PlatformProductData, PlatformVariantData,
    PlatformVariantSummary,
};
