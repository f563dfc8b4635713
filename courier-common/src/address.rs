//! Normalized e-mail addresses.
//!
//! Suppression matching, send-record auditing, and enrollment all compare
//! addresses; a normalization mismatch between any two of them is a
//! duplicate-send bug. Normalization therefore happens in exactly one place:
//! [`EmailAddress::parse`]. Every other component only ever sees the
//! normalized form.

use std::fmt::{self, Display};

use thiserror::Error;

/// Error returned when an address cannot be parsed into a usable mailbox.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The input was empty (or whitespace only).
    #[error("empty address")]
    Empty,

    /// The input did not parse as a single mailbox.
    #[error("unusable address: {0}")]
    Invalid(String),
}

/// A validated e-mail address in its normalized (trimmed, lower-cased) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse and normalize an address.
    ///
    /// Accepts bare addresses (`A@Example.COM`) as well as display-name forms
    /// (`Ann <a@example.com>`); the stored value is always the bare mailbox,
    /// trimmed and lower-cased.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the input is empty or does not parse as a
    /// single mailbox with a domain part.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let parsed =
            mailparse::addrparse(trimmed).map_err(|e| AddressError::Invalid(e.to_string()))?;

        match parsed.iter().next() {
            Some(mailparse::MailAddr::Single(info)) => {
                let mailbox = info.addr.trim().to_ascii_lowercase();
                // addrparse accepts local-only tokens; a deliverable address
                // needs a non-empty local part and domain.
                match mailbox.split_once('@') {
                    Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                        Ok(Self(mailbox))
                    }
                    _ => Err(AddressError::Invalid(trimmed.to_string())),
                }
            }
            _ => Err(AddressError::Invalid(trimmed.to_string())),
        }
    }

    /// The normalized address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The domain part of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for EmailAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for EmailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let addr = EmailAddress::parse("  Lead@Example.COM \n").expect("valid address");
        assert_eq!(addr.as_str(), "lead@example.com");
        assert_eq!(addr.domain(), "example.com");
    }

    #[test]
    fn display_name_form_yields_bare_mailbox() {
        let addr = EmailAddress::parse("Ann Lead <Ann.Lead@Example.com>").expect("valid address");
        assert_eq!(addr.as_str(), "ann.lead@example.com");
    }

    #[test]
    fn normalized_forms_compare_equal() {
        let a = EmailAddress::parse("LEAD@example.com").expect("valid");
        let b = EmailAddress::parse(" lead@EXAMPLE.com").expect("valid");
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_and_unusable_input() {
        assert_eq!(EmailAddress::parse("   "), Err(AddressError::Empty));
        assert!(matches!(
            EmailAddress::parse("not-an-address"),
            Err(AddressError::Invalid(_))
        ));
        assert!(matches!(
            EmailAddress::parse("@example.com"),
            Err(AddressError::Invalid(_))
        ));
    }

}
