//! Mail address parsing.
//!
//! # Responsibility
//! - Split raw `local-part@domain` input into the parts stored by `vmail`.
//!
//! # Invariants
//! - Parsing is anchored at the start of the input; trailing text after a
//!   word boundary is ignored and not part of `address`.
//! - Matching is case-insensitive but the original casing is preserved.
//! - A failed parse never yields a partial `Address`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\b([A-Z0-9._%+-]+)@([A-Z0-9.-]+\.[A-Z]{2,})\b").expect("valid address regex")
});

/// Parsed mail address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    /// Full matched address, casing as given.
    pub address: String,
    /// Local part.
    pub name: String,
    /// Domain part.
    pub domain: String,
}

/// Address parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input does not look like `local-part@domain`.
    Invalid(String),
}

impl Display for AddressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(value) => write!(f, "Not a valid email address: {value}"),
        }
    }
}

impl Error for AddressError {}

/// Parses one required address.
pub fn parse_address(value: &str) -> Result<Address, AddressError> {
    let caps = ADDRESS_RE
        .captures(value)
        .ok_or_else(|| AddressError::Invalid(value.to_string()))?;

    Ok(Address {
        address: caps[0].to_string(),
        name: caps[1].to_string(),
        domain: caps[2].to_string(),
    })
}

/// Parses an optional address; `None` stays `None`.
pub fn parse_optional_address(value: Option<&str>) -> Result<Option<Address>, AddressError> {
    value.map(parse_address).transpose()
}

#[cfg(test)]
mod tests {
    use super::{parse_address, parse_optional_address, AddressError};

    #[test]
    fn parse_splits_local_part_and_domain() {
        let parsed = parse_address("foo@bar.baz").unwrap();
        assert_eq!(parsed.address, "foo@bar.baz");
        assert_eq!(parsed.name, "foo");
        assert_eq!(parsed.domain, "bar.baz");
    }

    #[test]
    fn parse_is_case_insensitive_and_preserves_casing() {
        let parsed = parse_address("John.Doe+tag@Mail.Example.ORG").unwrap();
        assert_eq!(parsed.address, "John.Doe+tag@Mail.Example.ORG");
        assert_eq!(parsed.name, "John.Doe+tag");
        assert_eq!(parsed.domain, "Mail.Example.ORG");
    }

    #[test]
    fn parse_ignores_trailing_text_after_boundary() {
        let parsed = parse_address("foo@bar.baz trailing").unwrap();
        assert_eq!(parsed.address, "foo@bar.baz");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for value in ["not-an-email", "", "@bar.baz", "foo@bar", " foo@bar.baz", "foo@bar.b"] {
            let err = parse_address(value).unwrap_err();
            assert_eq!(err, AddressError::Invalid(value.to_string()));
        }
    }

    #[test]
    fn error_message_names_input() {
        let err = parse_address("nope").unwrap_err();
        assert_eq!(err.to_string(), "Not a valid email address: nope");
    }

    #[test]
    fn optional_none_stays_none() {
        assert_eq!(parse_optional_address(None).unwrap(), None);
        assert!(parse_optional_address(Some("foo@bar.baz")).unwrap().is_some());
        assert!(parse_optional_address(Some("broken")).is_err());
    }
}
