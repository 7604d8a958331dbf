//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Which referenced entity could not be resolved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Environment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Environment => "environment",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reason attached to a conflict.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// The item already occupies the environment it was asked to move into.
    AlreadyInTargetEnvironment,
}

impl ConflictReason {
    /// Stable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            ConflictReason::AlreadyInTargetEnvironment => "already_in_target_environment",
        }
    }

    /// Human-readable message.
    pub fn message(&self) -> &'static str {
        match self {
            ConflictReason::AlreadyInTargetEnvironment => {
                "item is already in the target environment"
            }
        }
    }
}

impl core::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.message())
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found")]
    NotFound { entity: EntityKind },

    /// The request is a no-op or contradicts current state.
    #[error("conflict: {reason}")]
    Conflict { reason: ConflictReason },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity: EntityKind) -> Self {
        Self::NotFound { entity }
    }

    pub fn conflict(reason: ConflictReason) -> Self {
        Self::Conflict { reason }
    }
}
