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

//! Schema binding
//!
//! The query layer works against five well-known classes. [`Schema`] holds
//! their ids once they have been located (or created) in a graph store and
//! answers "what kind of entity is this" questions.

use kpikb_core::{vocab, EntityId, EntityKind, EntityRef, GraphStore, KbError, KbResult};
use tracing::{debug, info};

/// Where a closest-match lookup draws its candidates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupScope {
    /// Every class and individual
    All,
    /// Entities of one kind
    Kind(EntityKind),
}

/// Ids of the schema classes in a bound graph store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub kpi: EntityId,
    pub machine: EntityId,
    pub operation: EntityId,
    pub process: EntityId,
    pub process_step: EntityId,
}

impl Schema {
    /// Locate the schema classes in an existing store
    pub fn bind<G: GraphStore>(graph: &G) -> KbResult<Self> {
        Ok(Self {
            kpi: schema_class(graph, vocab::KPI_CLASS)?,
            machine: schema_class(graph, vocab::MACHINE_CLASS)?,
            operation: schema_class(graph, vocab::OPERATION_CLASS)?,
            process: schema_class(graph, vocab::PROCESS_CLASS)?,
            process_step: schema_class(graph, vocab::PROCESS_STEP_CLASS)?,
        })
    }

    /// Seed an empty store with the schema classes and the KPI kinds
    pub fn bootstrap<G: GraphStore>(graph: &mut G) -> KbResult<Self> {
        let kpi = graph
            .create_class(EntityId::hashed(vocab::KPI_CLASS), vocab::KPI_CLASS, None)?
            .id;
        for kind in vocab::KPI_KINDS {
            graph.create_class(EntityId::hashed(kind), kind, Some(&kpi))?;
        }

        let mut top_level = |label: &str| -> KbResult<EntityId> {
            Ok(graph.create_class(EntityId::hashed(label), label, None)?.id)
        };
        let schema = Self {
            machine: top_level(vocab::MACHINE_CLASS)?,
            operation: top_level(vocab::OPERATION_CLASS)?,
            process: top_level(vocab::PROCESS_CLASS)?,
            process_step: top_level(vocab::PROCESS_STEP_CLASS)?,
            kpi,
        };

        info!(kpi_kinds = vocab::KPI_KINDS.len(), "Bootstrapped schema");
        Ok(schema)
    }

    /// Class id backing an individual kind
    fn kind_class(&self, kind: EntityKind) -> Option<&EntityId> {
        match kind {
            EntityKind::Kpi => Some(&self.kpi),
            EntityKind::Machine => Some(&self.machine),
            EntityKind::Operation => Some(&self.operation),
            EntityKind::Process => Some(&self.process),
            EntityKind::ProcessStep => Some(&self.process_step),
            EntityKind::KpiClass | EntityKind::Class => None,
        }
    }

    /// Whether `entity` is of `kind`
    pub fn is_kind<G: GraphStore>(&self, graph: &G, entity: &EntityRef, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Class => entity.is_class(),
            EntityKind::KpiClass => entity.is_class() && graph.is_subclass_of(&entity.id, &self.kpi),
            _ => {
                let Some(class) = self.kind_class(kind) else {
                    return false;
                };
                !entity.is_class()
                    && graph
                        .class_of(&entity.id)
                        .map(|c| graph.is_subclass_of(&c, class))
                        .unwrap_or(false)
            }
        }
    }

    /// [`Schema::is_kind`] as a `WrongKind` error
    pub fn expect_kind<G: GraphStore>(
        &self,
        graph: &G,
        entity: &EntityRef,
        kind: EntityKind,
    ) -> KbResult<()> {
        if self.is_kind(graph, entity, kind) {
            Ok(())
        } else {
            Err(KbError::WrongKind {
                label: entity.label.clone(),
                expected: kind,
            })
        }
    }

    /// Candidate entities for a closest-match lookup
    pub fn candidates<G: GraphStore>(&self, graph: &G, scope: LookupScope) -> Vec<EntityRef> {
        match scope {
            LookupScope::All => {
                let mut all = graph.classes();
                all.extend(graph.individuals());
                all
            }
            LookupScope::Kind(EntityKind::Class) => graph.classes(),
            LookupScope::Kind(EntityKind::KpiClass) => {
                let mut classes: Vec<EntityRef> = graph.entity(&self.kpi).into_iter().collect();
                classes.extend(graph.subclasses_of(&self.kpi));
                classes
            }
            LookupScope::Kind(kind) => match self.kind_class(kind) {
                Some(class) => graph.instances_of(class),
                None => Vec::new(),
            },
        }
    }
}

fn schema_class<G: GraphStore>(graph: &G, label: &str) -> KbResult<EntityId> {
    let hits = graph.find_by_label(label);
    match hits.as_slice() {
        [] => Err(KbError::NotFound(label.to_string())),
        [class] if class.is_class() => {
            debug!(label, id = %class.id, "Bound schema class");
            Ok(class.id.clone())
        }
        [_] => Err(KbError::WrongKind {
            label: label.to_string(),
            expected: EntityKind::Class,
        }),
        _ => Err(KbError::Ambiguous {
            label: label.to_string(),
            count: hits.len(),
        }),
    }
}
