//! Identifier newtypes.
//!
//! Internal identifiers are ULIDs: globally unique, lexicographically
//! sortable by creation time, and collision-resistant. They serialize as
//! their canonical 26-character string form so they survive config files,
//! control-protocol frames, and store backends unchanged.

use std::fmt;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a new unique identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Parse an identifier from its canonical string form.
            ///
            /// # Errors
            ///
            /// Returns an error if the input is not a valid ULID.
            pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
                ulid::Ulid::from_string(s).map(Self)
            }

            /// The creation timestamp (milliseconds since Unix epoch)
            /// encoded in this identifier.
            #[must_use]
            pub const fn timestamp_ms(&self) -> u64 {
                self.0.timestamp_ms()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

identifier!(
    /// Identifies a recipient (a CRM lead).
    RecipientId
);
identifier!(
    /// Identifies a one-shot campaign.
    CampaignId
);
identifier!(
    /// Identifies a drip sequence.
    SequenceId
);
identifier!(
    /// Identifies the binding of one recipient to one sequence.
    EnrollmentId
);
identifier!(
    /// Identifies one send-attempt audit row.
    SendRecordId
);
identifier!(
    /// Identifies one ingested delivery-provider event.
    EventId
);

/// The message identifier minted by the outbound provider.
///
/// Unlike the ULID identifiers above this is opaque: the provider chooses
/// its format and we only ever compare it for equality when correlating
/// delivery events back to send records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProviderMessageId(String);

impl ProviderMessageId {
    /// Wrap a provider-supplied identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProviderMessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
