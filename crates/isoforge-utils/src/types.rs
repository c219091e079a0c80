//! Identifier types shared across the workspace.
//!
//! Phases and work items are named by configuration, not by a closed enum:
//! the pipeline definition is data, and the orchestrator must not need a
//! recompile when a phase is added. Both identifiers are validated on
//! construction so that they are safe to embed in file names and log lines.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// Maximum identifier length; keeps checkpoint keys and log markers readable.
const MAX_ID_LEN: usize = 64;

fn validate_id(kind: &str, raw: &str) -> Result<(), ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::InvalidIdentifier {
            kind: kind.to_string(),
            id: raw.to_string(),
            reason: "identifier is empty".to_string(),
        });
    }
    if raw.len() > MAX_ID_LEN {
        return Err(ConfigError::InvalidIdentifier {
            kind: kind.to_string(),
            id: raw.to_string(),
            reason: format!("identifier exceeds {MAX_ID_LEN} characters"),
        });
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ConfigError::InvalidIdentifier {
            kind: kind.to_string(),
            id: raw.to_string(),
            reason: "only lowercase ascii, digits, '-' and '_' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Identifier of a pipeline phase.
///
/// Ordering is lexicographic and only used for stable map/report output;
/// execution order comes from the plan, never from the identifier.
/// Deserialization validates, so an id in a config or checkpoint file is as
/// trustworthy as one built through [`PhaseId::new`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhaseId(String);

impl PhaseId {
    /// Parse and validate a phase identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        validate_id("phase", &raw)?;
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhaseId {
    type Error = ConfigError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<PhaseId> for String {
    fn from(id: PhaseId) -> Self {
        id.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a work item within a phase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Parse and validate a work item identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        validate_id("item", &raw)?;
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemId {
    type Error = ConfigError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
