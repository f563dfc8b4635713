//! Engine configuration.

use courier_common::EmailAddress;
use serde::Deserialize;

const fn default_max_due_per_invocation() -> usize {
    1
}

fn default_unsubscribe_base_url() -> String {
    "https://localhost/unsubscribe".to_string()
}

fn default_sequence_from() -> EmailAddress {
    EmailAddress::parse("no-reply@localhost").expect("default sender literal is valid")
}

/// Tunables for the dispatcher and scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How many due enrollments one `process_due` invocation may advance.
    ///
    /// Kept small (default 1) so provider throughput stays controlled and a
    /// failed invocation is cheap to retry.
    #[serde(default = "default_max_due_per_invocation")]
    pub max_due_per_invocation: usize,

    /// Base URL for the per-recipient unsubscribe link injected into every
    /// outbound message. The recipient identifier is appended as a query
    /// parameter.
    #[serde(default = "default_unsubscribe_base_url")]
    pub unsubscribe_base_url: String,

    /// Sender address for sequence step sends (campaigns carry their own).
    #[serde(default = "default_sequence_from")]
    pub sequence_from: EmailAddress,

    /// Reply-to address for sequence step sends.
    #[serde(default)]
    pub sequence_reply_to: Option<EmailAddress>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_due_per_invocation: default_max_due_per_invocation(),
            unsubscribe_base_url: default_unsubscribe_base_url(),
            sequence_from: default_sequence_from(),
            sequence_reply_to: None,
        }
    }
}
