//! Shared leaf types for the courier delivery engine.

pub mod address;
pub mod id;
pub mod logging;

pub use address::{AddressError, EmailAddress};
pub use id::{
    CampaignId, EnrollmentId, EventId, ProviderMessageId, RecipientId, SendRecordId, SequenceId,
};

/// Signal broadcast to long-running components on shutdown
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
