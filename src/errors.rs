//! Error types for the audit engine.
//!
//! Fatal conditions abort the run; everything recoverable is recorded as a
//! [`Finding`] and the run continues with the next resource or rule.

use serde::Serialize;
use thiserror::Error;

/// Fatal audit errors
#[derive(Error, Debug)]
pub enum AuditError {
    /// The region listing for an account is missing or unreadable
    #[error("Region listing for account '{account}' is missing or malformed: {reason}")]
    RegionListing { account: String, reason: String },

    /// A node kind the projector has no attribute extraction for
    #[error("Cannot export node '{id}' of unknown kind '{kind}'")]
    UnknownKind { id: String, kind: String },

    /// Unusable operator configuration (e.g. a bad filter regex)
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Malformed address-range strings
#[derive(Error, Debug)]
pub enum CidrError {
    #[error("Invalid CIDR '{0}'")]
    Invalid(String),
}

/// Severity of a non-fatal finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FindingSeverity {
    Warning,
    Error,
}

/// A recoverable problem recorded during an audit run.
///
/// Findings never abort the run; they are surfaced in the log output and on
/// the run result so the operator can judge how trustworthy the graph is.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub severity: FindingSeverity,
    pub context: String,
    pub message: String,
}

impl Finding {
    pub fn warning(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: FindingSeverity::Warning,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn error(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: FindingSeverity::Error,
            context: context.into(),
            message: message.into(),
        }
    }
}
