//! Control protocol for managing a running courier instance.
//!
//! This crate provides the admin interface the surrounding CRM tooling
//! calls into: an IPC mechanism over a Unix domain socket carrying
//! bincode-serialized request/response frames. Callers are assumed to be
//! already authorized — identity and session management are enforced
//! upstream of this boundary.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    CampaignCommand, ErrorKind, EventCommand, PROTOCOL_VERSION, Request, RequestCommand, Response,
    ResponsePayload, SequenceCommand, StatusInfo, SuppressionCommand, SystemCommand,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/courier.sock";
