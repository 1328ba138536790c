// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Knowledge base error types

use crate::entity::EntityKind;
use thiserror::Error;

/// Result type for knowledge base operations
pub type KbResult<T> = Result<T, KbError>;

/// Errors that can occur in the knowledge base
#[derive(Debug, Error)]
pub enum KbError {
    /// Label resolves to zero entities
    #[error("No entity labelled '{0}'")]
    NotFound(String),

    /// Label resolves to more than one entity (store integrity violation)
    #[error("Label '{label}' is shared by {count} entities")]
    Ambiguous { label: String, count: usize },

    /// Create with a label that is already taken
    #[error("Label '{0}' already exists")]
    AlreadyExists(String),

    /// Entity resolved but is not of the expected type
    #[error("'{label}' is not a {expected}")]
    WrongKind { label: String, expected: EntityKind },

    /// Delete blocked by a live dependent
    #[error("'{label}' is still referenced by '{referenced_by}'")]
    StillReferenced { label: String, referenced_by: String },

    /// Unknown similarity method name
    #[error("Unknown similarity method: {0}")]
    InvalidMethod(String),

    /// Reference token whose target cannot be resolved to exactly one KPI
    #[error("Formula of '{kpi}' has an unresolvable reference to '{reference}'")]
    MalformedFormula { kpi: String, reference: String },

    /// Entity lacks a property the schema requires
    #[error("'{label}' has no '{property}' property")]
    MissingProperty { label: String, property: String },

    /// Requested snapshot revision is not on disk
    #[error("Snapshot revision {0} not found")]
    SnapshotNotFound(u64),

    /// Entity id unknown to the graph store
    #[error("Unknown entity id: {0}")]
    UnknownEntity(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KbError {
    /// Errors raised while resolving a root label.
    ///
    /// These are the failures after which a closest-match lookup makes sense.
    /// [`KbError::Ambiguous`] is not one of them: a duplicated label means the
    /// store itself is broken.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, KbError::NotFound(_) | KbError::WrongKind { .. })
    }
}

impl From<serde_json::Error> for KbError {
    fn from(e: serde_json::Error) -> Self {
        KbError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for KbError {
    fn from(e: toml::de::Error) -> Self {
        KbError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_failures() {
        assert!(KbError::NotFound("x".into()).is_resolution_failure());
        assert!(!KbError::Ambiguous {
            label: "x".into(),
            count: 2
        }
        .is_resolution_failure());
        assert!(!KbError::InvalidMethod("cosine".into()).is_resolution_failure());
        assert!(!KbError::MalformedFormula {
            kpi: "a".into(),
            reference: "b".into()
        }
        .is_resolution_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = KbError::StillReferenced {
            label: "time_sum".into(),
            referenced_by: "availability".into(),
        };
        assert_eq!(
            err.to_string(),
            "'time_sum' is still referenced by 'availability'"
        );
    }
}
