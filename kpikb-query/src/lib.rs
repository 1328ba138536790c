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

//! KPI Knowledge Base Query Layer
//!
//! - [`LabelResolver`]: exact and closest-match label lookup
//! - [`FormulaResolver`]: transitive formula closure of a KPI
//! - [`EntityManager`]: validated create/delete of KPIs, operations and
//!   processes
//! - [`KnowledgeBase`]: the locked, snapshotting handle tying them together
//!
//! # Example
//!
//! ```no_run
//! use kpikb_core::KbConfig;
//! use kpikb_query::{KnowledgeBase, NewKpi};
//!
//! # fn main() -> kpikb_core::KbResult<()> {
//! let kb: KnowledgeBase = KnowledgeBase::open(&KbConfig::with_data_dir("./kb"))?;
//! kb.add_kpi(&NewKpi {
//!     superclass: "energy_kpi".into(),
//!     label: "consumption_sum".into(),
//!     parsable_formula: "A°sum°mo[ D°consumption_sum°t°m°o° ]".into(),
//!     ..NewKpi::default()
//! })?;
//! let closure = kb.formulas("consumption_sum")?;
//! assert_eq!(closure.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod formulas;
pub mod lifecycle;
pub mod resolver;
pub mod schema;

pub use engine::{ClassInstances, EntityDescription, KnowledgeBase};
pub use formulas::{FormulaClosure, FormulaResolver};
pub use lifecycle::{step_label, EntityManager, NewKpi, StepSpec};
pub use resolver::{closest_match, LabelResolver, INEXACT_CEILING};
pub use schema::{LookupScope, Schema};
