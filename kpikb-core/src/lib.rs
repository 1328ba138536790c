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

//! KPI Knowledge Base Core
//!
//! Building blocks shared by the storage and query crates:
//!
//! - **Graph Store**: the [`GraphStore`] contract and the JSON-persisted
//!   [`MemoryGraph`]
//! - **Entities**: ids, references, property values and the schema vocabulary
//! - **Formula tokens**: finder for `R°<label>°...°` references
//! - **Similarity**: edit-distance and weighted structural label scores
//! - **Configuration** and the [`KbError`] type

pub mod config;
pub mod entity;
pub mod error;
pub mod formula;
pub mod graph;
pub mod similarity;

pub use config::{KbConfig, RetentionConfig};
pub use entity::{hash_code, vocab, EntityId, EntityKind, EntityRef, RefKind, Value};
pub use error::{KbError, KbResult};
pub use formula::{references, FormulaReference};
pub use graph::{GraphStore, MemoryGraph};
pub use similarity::{EditDistance, Similarity, SimilarityMethod, WeightedStructural};
