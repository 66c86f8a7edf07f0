//! Core propagation type definitions
//!
//! Enums shared across the engine: operations, execution statuses, trace
//! levels and identity object kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation to be performed against an external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceOperation {
    /// Create the object in the target system.
    Create,
    /// Update the object in the target system.
    Update,
    /// Delete the object from the target system.
    Delete,
}

impl ResourceOperation {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceOperation::Create => "create",
            ResourceOperation::Update => "update",
            ResourceOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for ResourceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single propagation attempt.
///
/// `Created` is the initial state; the terminal states are `Success`,
/// `Failure` and `NotAttempted` (no connector call was needed, e.g. a delete
/// of an already-absent object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    /// Attempt record created, not yet finished.
    Created,
    /// A connector call was made and succeeded.
    Success,
    /// The attempt failed.
    Failure,
    /// The attempt finished without any connector call being required.
    NotAttempted,
}

impl ExecStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Created => "created",
            ExecStatus::Success => "success",
            ExecStatus::Failure => "failure",
            ExecStatus::NotAttempted => "not_attempted",
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much execution history an external resource retains, per operation.
///
/// Ordered: `None < Failures < Successes < All`; the registration rule keeps
/// an execution record when the level admits its outcome.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    /// Retain nothing.
    None,
    /// Retain failed executions only.
    #[default]
    Failures,
    /// Retain successful executions (and failures).
    Successes,
    /// Retain every execution.
    All,
}

impl TraceLevel {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLevel::None => "none",
            TraceLevel::Failures => "failures",
            TraceLevel::Successes => "successes",
            TraceLevel::All => "all",
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraceLevel {
    type Err = ParseTraceLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TraceLevel::None),
            "failures" => Ok(TraceLevel::Failures),
            "successes" => Ok(TraceLevel::Successes),
            "all" => Ok(TraceLevel::All),
            _ => Err(ParseTraceLevelError(s.to_string())),
        }
    }
}

/// Error parsing a trace level from string.
#[derive(Debug, Clone)]
pub struct ParseTraceLevelError(String);

impl fmt::Display for ParseTraceLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid trace level '{}', expected one of: none, failures, successes, all",
            self.0
        )
    }
}

impl std::error::Error for ParseTraceLevelError {}

/// Kind of identity object being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnyTypeKind {
    /// A person.
    User,
    /// A group of identities.
    Group,
    /// Any other configured object type (printers, services, ...).
    AnyObject,
}

impl AnyTypeKind {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnyTypeKind::User => "user",
            AnyTypeKind::Group => "group",
            AnyTypeKind::AnyObject => "any_object",
        }
    }
}

impl fmt::Display for AnyTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_level_ordering() {
        assert!(TraceLevel::None < TraceLevel::Failures);
        assert!(TraceLevel::Failures < TraceLevel::Successes);
        assert!(TraceLevel::Successes < TraceLevel::All);
    }

    #[test]
    fn test_trace_level_parse() {
        assert_eq!("failures".parse::<TraceLevel>().unwrap(), TraceLevel::Failures);
        assert_eq!("ALL".parse::<TraceLevel>().unwrap(), TraceLevel::All);
        assert!("everything".parse::<TraceLevel>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ResourceOperation::Create.to_string(), "create");
        assert_eq!(ExecStatus::NotAttempted.to_string(), "not_attempted");
        assert_eq!(AnyTypeKind::AnyObject.to_string(), "any_object");
    }
}
