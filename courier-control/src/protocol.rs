//! Control protocol types and serialization.

use chrono::{DateTime, Utc};
use courier_common::{CampaignId, EmailAddress, EnrollmentId, RecipientId, SequenceId};
use courier_engine::{
    CampaignSendReport, CampaignStats, DueReport, EngineError, ProviderEvent, StepOutcome,
};
use courier_store::{SuppressionEntry, SuppressionReason};
use serde::{Deserialize, Serialize};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Request sent to the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version
    pub version: u32,
    /// The actual command to execute
    pub command: RequestCommand,
}

impl Request {
    /// Wrap a command in the current protocol version.
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command,
        }
    }
}

/// Request command types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    /// Campaign blast commands
    Campaign(CampaignCommand),
    /// Sequence and enrollment commands
    Sequence(SequenceCommand),
    /// Suppression registry commands
    Suppression(SuppressionCommand),
    /// Provider event ingestion
    Event(EventCommand),
    /// System management commands
    System(SystemCommand),
}

/// Campaign blast commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CampaignCommand {
    /// Send a draft campaign to every eligible recipient
    Send { id: CampaignId },
    /// Aggregate counters derived from the campaign's send records
    Stats { id: CampaignId },
}

/// Sequence and enrollment commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SequenceCommand {
    /// Enroll recipients into a sequence
    Enroll {
        sequence: SequenceId,
        recipients: Vec<RecipientId>,
    },
    /// Manually send a specific step (bypasses the due-time check)
    SendStep {
        enrollment: EnrollmentId,
        step: u32,
    },
    /// Advance due enrollments
    ProcessDue,
    /// Operator stop of an enrollment (terminal)
    Stop { enrollment: EnrollmentId },
}

/// Suppression registry commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SuppressionCommand {
    /// Whether any suppression entry exists for the address
    Check { address: EmailAddress },
    /// The full suppression list
    List,
    /// Add a suppression entry (explicit user unsubscribe or manual block)
    Add {
        address: EmailAddress,
        reason: SuppressionReason,
    },
    /// Administrative removal of every entry for an address
    Remove { address: EmailAddress },
}

/// Provider event ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventCommand {
    /// Apply one provider event
    Ingest(ProviderEvent),
}

/// System management commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemCommand {
    /// Health check / ping
    Ping,
    /// Get system status and statistics
    Status,
}

/// Response from the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version
    pub version: u32,
    /// The response payload
    pub payload: ResponsePayload,
}

impl Response {
    /// Wrap a payload in the current protocol version.
    #[must_use]
    pub const fn new(payload: ResponsePayload) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// An error response derived from an engine error.
    ///
    /// Carries the machine-distinguishable kind plus the short
    /// human-readable string; internal store error text never crosses this
    /// boundary.
    #[must_use]
    pub fn from_engine_error(error: &EngineError) -> Self {
        let (kind, message) = match error {
            EngineError::NotFound { .. } => (ErrorKind::NotFound, error.to_string()),
            EngineError::InvalidState(_) => (ErrorKind::InvalidState, error.to_string()),
            EngineError::NoEligibleRecipients => {
                (ErrorKind::NoEligibleRecipients, error.to_string())
            }
            EngineError::Store(_) => (ErrorKind::Internal, "internal storage error".to_string()),
        };
        Self::new(ResponsePayload::Error { kind, message })
    }
}

/// Response payload types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// The command succeeded with nothing further to report
    Ack,
    /// Ping reply
    Pong,
    /// System status
    Status(StatusInfo),
    /// Campaign blast report
    SendReport(CampaignSendReport),
    /// Campaign aggregate counters
    CampaignStats(CampaignStats),
    /// Enrollment identifiers created by an enroll command
    Enrolled(Vec<EnrollmentId>),
    /// Outcome of a manual step send
    Step(StepOutcome),
    /// Due-processing report
    Due(DueReport),
    /// Suppression check result
    SuppressionCheck {
        address: EmailAddress,
        suppressed: bool,
    },
    /// The full suppression list
    Suppressions(Vec<SuppressionEntry>),
    /// Entries removed by an unsuppression
    Removed { count: usize },
    /// The command failed
    Error { kind: ErrorKind, message: String },
}

/// Machine-distinguishable error kinds surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Campaign/sequence/enrollment/recipient id unknown
    NotFound,
    /// The operation is not legal in the entity's current state
    InvalidState,
    /// The entire candidate set was suppressed or empty
    NoEligibleRecipients,
    /// Malformed or incompatible request framing
    Protocol,
    /// Internal failure; details are in the server log
    Internal,
}

/// System status reported by [`SystemCommand::Status`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Seconds since the server started
    pub uptime_secs: u64,
    /// Active enrollments currently past their due time
    pub due_enrollments: usize,
    /// Addresses with at least one suppression entry
    pub suppressed_addresses: usize,
    /// Server time when the status was taken
    pub taken_at: DateTime<Utc>,
}
