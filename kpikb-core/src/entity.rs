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

//! Entity and Property Types
//!
//! Identity, references and property values shared by the graph store and
//! the query layer.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of generated hash codes
pub const HASH_CODE_LEN: usize = 22;

/// Well-known labels and property names of the KPI schema
pub mod vocab {
    /// Root of the KPI taxonomy
    pub const KPI_CLASS: &str = "kpi";
    pub const MACHINE_CLASS: &str = "machine";
    pub const OPERATION_CLASS: &str = "operation";
    pub const PROCESS_CLASS: &str = "process";
    pub const PROCESS_STEP_CLASS: &str = "process_step";

    /// KPI kinds created under the root on bootstrap
    pub const KPI_KINDS: &[&str] = &[
        "energy_kpi",
        "cost_kpi",
        "production_kpi",
        "quality_kpi",
        "utilization_kpi",
        "downtime_kpi",
    ];

    pub const DESCRIPTION: &str = "description";
    pub const UNIT_OF_MEASURE: &str = "unit_of_measure";
    pub const PARSABLE_FORMULA: &str = "parsable_computation_formula";
    pub const HUMAN_READABLE_FORMULA: &str = "human_readable_formula";
    pub const DEPENDS_ON: &str = "depends_on";
    pub const ASSOCIATED_MACHINE: &str = "associated_machine";
    pub const ASSOCIATED_OPERATION: &str = "associated_operation";
    pub const POSITION: &str = "position";
    pub const STEPS: &str = "steps";
}

/// Stable identifier of a class or individual in the graph store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id derived from the hash code of `input`
    pub fn hashed(input: &str) -> Self {
        Self(hash_code(input))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an entity is a class or an individual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Class,
    Individual,
}

/// A resolved entity: id, human label and whether it is a class
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub label: String,
    pub kind: RefKind,
}

impl EntityRef {
    pub fn is_class(&self) -> bool {
        self.kind == RefKind::Class
    }
}

/// Entity kinds the core distinguishes when validating references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Kpi,
    KpiClass,
    Machine,
    Operation,
    Process,
    ProcessStep,
    Class,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Kpi => "KPI",
            EntityKind::KpiClass => "KPI class",
            EntityKind::Machine => "machine",
            EntityKind::Operation => "operation",
            EntityKind::Process => "process",
            EntityKind::ProcessStep => "process step",
            EntityKind::Class => "class",
        };
        f.write_str(name)
    }
}

/// A property value attached to an individual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Integer(i64),
    Entity(EntityId),
    Entities(Vec<EntityId>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityId> {
        match self {
            Value::Entity(id) => Some(id),
            _ => None,
        }
    }

    /// Entity references held by this value (single or list)
    pub fn entities(&self) -> &[EntityId] {
        match self {
            Value::Entity(id) => std::slice::from_ref(id),
            Value::Entities(ids) => ids,
            _ => &[],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Entity(id) => write!(f, "{}", id),
            Value::Entities(ids) => {
                let joined: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
                write!(f, "[{}]", joined.join(", "))
            }
        }
    }
}

/// Compact alphanumeric hash code of `input`.
///
/// SHA-256 digest, URL-safe base64, with `-` and `_` removed and truncated to
/// [`HASH_CODE_LEN`] characters.
pub fn hash_code(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    URL_SAFE
        .encode(digest)
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .take(HASH_CODE_LEN)
        .collect()
}
