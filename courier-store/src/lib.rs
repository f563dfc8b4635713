//! Storage boundary for the courier delivery engine.
//!
//! The engine treats its relational store as an external collaborator behind
//! the [`Store`] trait: parameterized reads, inserts, and updates, plus the
//! two uniqueness constraints the delivery core leans on for its at-most-once
//! guarantees (one delivered record per campaign/recipient pair, one record
//! of any outcome per enrollment/step pair). A constraint violation surfaces
//! as [`StoreError::Duplicate`] from the offending insert.

pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;
pub mod types;

pub use backends::MemoryStore;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use r#trait::Store;
pub use types::{
    Campaign, CampaignStatus, Enrollment, EnrollmentStatus, Recipient, SendOrigin, SendRecord,
    Sequence, SequenceStep, SuppressionEntry, SuppressionReason,
};
