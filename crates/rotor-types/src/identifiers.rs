//! Type-safe principal identifiers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::errors::{RotationError, Result};

/// Longest identifier most account backends accept (PostgreSQL's NAMEDATALEN - 1).
pub const MAX_PRINCIPAL_LEN: usize = 63;

static PRINCIPAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]*$").expect("principal pattern is a valid regex")
});

/// A validated principal name.
///
/// Principal names must:
/// - Start with a lowercase letter or underscore
/// - Contain only lowercase letters, digits, and underscores
/// - Be at most 63 bytes long
///
/// Names are the only way an identifier reaches a credential store, so
/// nothing outside this pattern is ever rendered into a backend command.
///
/// # Example
///
/// ```
/// use rotor_types::PrincipalName;
///
/// let name = PrincipalName::new("svc_orders").unwrap();
/// assert_eq!(name.as_str(), "svc_orders");
///
/// assert!(PrincipalName::new("svc; DROP ROLE admin").is_err());
/// assert!(PrincipalName::new("Svc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PrincipalName(String);

impl PrincipalName {
    /// Create a new validated principal name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name doesn't meet validation requirements.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        if !Self::is_valid(name) {
            return Err(RotationError::Validation(format!(
                "Invalid principal name '{}': must match [a-z_][a-z0-9_]* and be at most {} bytes",
                name, MAX_PRINCIPAL_LEN
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Check if a name is valid without allocating.
    pub fn is_valid(name: &str) -> bool {
        name.len() <= MAX_PRINCIPAL_LEN && PRINCIPAL_PATTERN.is_match(name)
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the shadow principal used during a dual rotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the suffixed name is not itself a valid principal.
    pub fn shadow(&self, suffix: &str) -> Result<PrincipalName> {
        PrincipalName::new(format!("{}{}", self.0, suffix))
    }

    /// If this is a shadow name for `suffix`, the original principal name.
    pub fn shadow_of(&self, suffix: &str) -> Option<PrincipalName> {
        let base = self.0.strip_suffix(suffix)?;
        PrincipalName::new(base).ok()
    }
}

impl fmt::Display for PrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PrincipalName {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for PrincipalName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PrincipalName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        PrincipalName::new(raw).map_err(serde::de::Error::custom)
    }
}
