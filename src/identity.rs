//! Identities policy is resolved for.
//!
//! An identity is a directory account name plus its security identifier.
//! The SID is the stable key: names can be renamed, SIDs cannot, so the
//! resolution cache is keyed on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Security identifier in its textual `S-R-A-S1-S2-...` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sid(String);

impl Sid {
    /// Parses and normalizes a SID (the leading `s` is upper-cased).
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if the text is not a well-formed SID.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            field: "sid",
            reason: format!("'{raw}' {reason}"),
        };

        let trimmed = raw.trim();
        let rest = trimmed
            .strip_prefix("S-")
            .or_else(|| trimmed.strip_prefix("s-"))
            .ok_or_else(|| invalid("must start with 'S-'"))?;

        let parts: Vec<&str> = rest.split('-').collect();
        if parts.len() < 2 {
            return Err(invalid("needs a revision and an authority"));
        }
        if parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(invalid("has a non-numeric component"));
        }

        Ok(Self(format!("S-{rest}")))
    }

    /// Returns the SID text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sid {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Sid {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Sid> for String {
    fn from(sid: Sid) -> Self {
        sid.0
    }
}

/// A directory account: a computer or a human user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Account name as known to the directory.
    pub username: String,
    /// Security identifier of the account.
    pub sid: Sid,
}

impl Identity {
    /// Creates an identity.
    #[must_use]
    pub fn new(username: impl Into<String>, sid: Sid) -> Self {
        Self {
            username: username.into(),
            sid,
        }
    }

    /// Returns true if this identity is the computer account `machine_name`.
    #[must_use]
    pub fn is_machine_account(&self, machine_name: &str) -> bool {
        self.username.eq_ignore_ascii_case(machine_name)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.username, self.sid)
    }
}

/// Computer-account name for a host: short name, upper-cased, `$`-suffixed.
#[must_use]
pub fn machine_account_name(hostname: &str) -> String {
    let short = hostname.trim().split('.').next().unwrap_or_default();
    let short = short.trim_end_matches('$');
    format!("{}$", short.to_ascii_uppercase())
}
