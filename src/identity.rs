//! Upload identity: the 13-digit ID number that names the artifact.
//!
//! Users type the number with or without the grouping spaces the form shows
//! (`YYMMDD SSSS CA Z`), so parsing drops spaces and dashes before checking
//! the length. Anything else that is not a digit makes the identity invalid.

use crate::error::ScanError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of digits a valid identity has.
pub const IDENTITY_DIGITS: usize = 13;

static RE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]+").unwrap());

static RE_IDENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^[0-9]{{{IDENTITY_DIGITS}}}$")).unwrap());

static RE_GROUPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{6})(\d{4})(\d{2})(\d)$").unwrap());

/// A validated 13-digit identity, stored without separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate user input.
    ///
    /// # Errors
    /// [`ScanError::InvalidIdentity`] unless the input is exactly 13 digits
    /// after removing spaces and dashes.
    pub fn parse(input: &str) -> Result<Self, ScanError> {
        let compact = RE_SEPARATORS.replace_all(input.trim(), "");
        if RE_IDENTITY.is_match(&compact) {
            return Ok(Self(compact.into_owned()));
        }
        Err(ScanError::InvalidIdentity {
            input: input.to_string(),
            digits: compact.chars().filter(char::is_ascii_digit).count(),
        })
    }

    /// The bare digits, as used in file names.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display grouping used by the entry form: `123456 7890 12 3`.
    pub fn grouped(&self) -> String {
        RE_GROUPS.replace(&self.0, "$1 $2 $3 $4").into_owned()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = ScanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

/// Resolve the identity a flush should use.
///
/// A supplied identity is always validated; a missing one is only an error
/// when `required` is set.
pub fn resolve(input: Option<&str>, required: bool) -> Result<Option<Identity>, ScanError> {
    match input.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Identity::parse(raw).map(Some),
        None if required => Err(ScanError::IdentityRequired),
        None => Ok(None),
    }
}
