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

//! Entity Lifecycle Manager
//!
//! Validated create and delete for KPIs, operations, machines and processes.
//! Every operation checks all of its preconditions before the first write to
//! the graph store, so a failed call leaves the store untouched.

use crate::resolver::LabelResolver;
use crate::schema::{LookupScope, Schema};
use kpikb_core::formula::references_label;
use kpikb_core::{
    hash_code, references, vocab, EntityId, EntityKind, EntityRef, GraphStore, KbError, KbResult,
    Value,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Parameters of a new KPI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewKpi {
    /// KPI class label: the KPI root or one of its subclasses
    pub superclass: String,
    pub label: String,
    pub description: String,
    pub unit_of_measure: String,
    pub parsable_formula: String,
    /// Defaults to the parsable formula
    #[serde(default)]
    pub human_readable_formula: Option<String>,
    #[serde(default)]
    pub depends_on_machine: bool,
    #[serde(default)]
    pub depends_on_operation: bool,
}

/// One (machine, operation) pair of a new process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub machine: String,
    pub operation: String,
}

impl StepSpec {
    pub fn new(machine: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            machine: machine.into(),
            operation: operation.into(),
        }
    }
}

/// A validated process step waiting to be written
struct PlannedStep {
    id: EntityId,
    label: String,
    position: i64,
    machine: EntityId,
    operation: EntityId,
}

/// Label derived for a process step
pub fn step_label(process: &str, position: usize, machine: &str, operation: &str) -> String {
    hash_code(&format!("{}_{}_{}_{}", process, position, machine, operation))
}

/// Validated mutations against a bound graph store
pub struct EntityManager<'a, G: GraphStore> {
    graph: &'a mut G,
    schema: &'a Schema,
}

impl<'a, G: GraphStore> EntityManager<'a, G> {
    pub fn new(graph: &'a mut G, schema: &'a Schema) -> Self {
        Self { graph, schema }
    }

    fn resolver(&self) -> LabelResolver<'_, G> {
        LabelResolver::new(&*self.graph)
    }

    fn resolve_kind(&self, label: &str, kind: EntityKind) -> KbResult<EntityRef> {
        let entity = self.resolver().resolve_exact(label)?;
        self.schema.expect_kind(&*self.graph, &entity, kind)?;
        Ok(entity)
    }

    /// Label must be unused and its derived id unallocated
    fn ensure_free(&self, label: &str, id: &EntityId) -> KbResult<()> {
        if !self.graph.find_by_label(label).is_empty() || self.graph.entity(id).is_some() {
            return Err(KbError::AlreadyExists(label.to_string()));
        }
        Ok(())
    }

    /// Create a KPI under a KPI class
    pub fn add_kpi(&mut self, kpi: &NewKpi) -> KbResult<EntityRef> {
        let id = EntityId::hashed(&kpi.label);
        self.ensure_free(&kpi.label, &id)?;

        let superclass = self.resolver().resolve_exact(&kpi.superclass)?;
        self.schema
            .expect_kind(&*self.graph, &superclass, EntityKind::KpiClass)?;

        for reference in references(&kpi.parsable_formula) {
            let resolves = reference.label != kpi.label
                && self
                    .resolver()
                    .resolve_exact(reference.label)
                    .map(|target| self.schema.is_kind(&*self.graph, &target, EntityKind::Kpi))
                    .unwrap_or(false);
            if !resolves {
                return Err(KbError::MalformedFormula {
                    kpi: kpi.label.clone(),
                    reference: reference.label.to_string(),
                });
            }
        }

        let mut depends_on = Vec::new();
        if kpi.depends_on_machine {
            depends_on.push(self.schema.machine.clone());
        }
        if kpi.depends_on_operation {
            depends_on.push(self.schema.operation.clone());
        }
        let human = kpi
            .human_readable_formula
            .clone()
            .unwrap_or_else(|| kpi.parsable_formula.clone());

        let created = self
            .graph
            .create_individual(&superclass.id, id, &kpi.label)?;
        let properties = [
            (vocab::DESCRIPTION, Value::text(&kpi.description)),
            (vocab::UNIT_OF_MEASURE, Value::text(&kpi.unit_of_measure)),
            (vocab::PARSABLE_FORMULA, Value::text(&kpi.parsable_formula)),
            (vocab::HUMAN_READABLE_FORMULA, Value::text(human)),
            (vocab::DEPENDS_ON, Value::Entities(depends_on)),
        ];
        for (property, value) in properties {
            self.graph.set_property(&created.id, property, value)?;
        }

        info!(label = %kpi.label, superclass = %superclass.label, "Added KPI");
        Ok(created)
    }

    /// Delete a KPI no other KPI formula references
    pub fn delete_kpi(&mut self, label: &str) -> KbResult<()> {
        let kpi = self.resolve_kind(label, EntityKind::Kpi)?;

        let referencing = self
            .schema
            .candidates(&*self.graph, LookupScope::Kind(EntityKind::Kpi))
            .into_iter()
            .filter(|other| other.id != kpi.id)
            .find(|other| {
                self.graph
                    .get_property(&other.id, vocab::PARSABLE_FORMULA)
                    .and_then(|v| v.as_text().map(|f| references_label(f, label)))
                    .unwrap_or(false)
            });
        if let Some(other) = referencing {
            return Err(KbError::StillReferenced {
                label: label.to_string(),
                referenced_by: other.label,
            });
        }

        self.graph.destroy(&kpi.id)?;
        info!(label, "Deleted KPI");
        Ok(())
    }

    fn add_described(&mut self, class: &EntityId, label: &str, description: &str) -> KbResult<EntityRef> {
        let id = EntityId::hashed(label);
        self.ensure_free(label, &id)?;

        let created = self.graph.create_individual(class, id, label)?;
        self.graph
            .set_property(&created.id, vocab::DESCRIPTION, Value::text(description))?;
        Ok(created)
    }

    pub fn add_operation(&mut self, label: &str, description: &str) -> KbResult<EntityRef> {
        let class = self.schema.operation.clone();
        let created = self.add_described(&class, label, description)?;
        info!(label, "Added operation");
        Ok(created)
    }

    /// Register a machine process steps can refer to
    pub fn add_machine(&mut self, label: &str, description: &str) -> KbResult<EntityRef> {
        let class = self.schema.machine.clone();
        let created = self.add_described(&class, label, description)?;
        info!(label, "Added machine");
        Ok(created)
    }

    /// Delete an operation no process step uses
    pub fn delete_operation(&mut self, label: &str) -> KbResult<()> {
        let operation = self.resolve_kind(label, EntityKind::Operation)?;

        let step = self
            .graph
            .instances_of(&self.schema.process_step)
            .into_iter()
            .find(|step| {
                self.graph
                    .get_property(&step.id, vocab::ASSOCIATED_OPERATION)
                    .map(|v| v.as_entity() == Some(&operation.id))
                    .unwrap_or(false)
            });
        if let Some(step) = step {
            let owner = self.owning_process(&step.id).unwrap_or(step);
            return Err(KbError::StillReferenced {
                label: label.to_string(),
                referenced_by: owner.label,
            });
        }

        self.graph.destroy(&operation.id)?;
        info!(label, "Deleted operation");
        Ok(())
    }

    fn owning_process(&self, step: &EntityId) -> Option<EntityRef> {
        self.graph
            .instances_of(&self.schema.process)
            .into_iter()
            .find(|process| {
                self.graph
                    .get_property(&process.id, vocab::STEPS)
                    .map(|v| v.entities().contains(step))
                    .unwrap_or(false)
            })
    }

    /// Create a process and one step per (machine, operation) pair, in
    /// list order starting at position 1
    pub fn add_process(
        &mut self,
        label: &str,
        description: &str,
        steps: &[StepSpec],
    ) -> KbResult<EntityRef> {
        let id = EntityId::hashed(label);
        self.ensure_free(label, &id)?;

        let mut planned = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let position = index + 1;
            let machine = self.resolve_kind(&step.machine, EntityKind::Machine)?;
            let operation = self.resolve_kind(&step.operation, EntityKind::Operation)?;

            let step_label = step_label(label, position, &step.machine, &step.operation);
            let step_id = EntityId::new(step_label.clone());
            self.ensure_free(&step_label, &step_id)?;

            planned.push(PlannedStep {
                id: step_id,
                label: step_label,
                position: position as i64,
                machine: machine.id,
                operation: operation.id,
            });
        }

        let mut step_ids = Vec::with_capacity(planned.len());
        for step in planned {
            let created = self.graph.create_individual(
                &self.schema.process_step,
                step.id,
                &step.label,
            )?;
            self.graph.set_property(
                &created.id,
                vocab::ASSOCIATED_MACHINE,
                Value::Entity(step.machine),
            )?;
            self.graph.set_property(
                &created.id,
                vocab::ASSOCIATED_OPERATION,
                Value::Entity(step.operation),
            )?;
            self.graph
                .set_property(&created.id, vocab::POSITION, Value::Integer(step.position))?;
            debug!(process = label, step = %created.label, position = step.position, "Created process step");
            step_ids.push(created.id);
        }

        let process = self
            .graph
            .create_individual(&self.schema.process, id, label)?;
        self.graph
            .set_property(&process.id, vocab::DESCRIPTION, Value::text(description))?;
        self.graph
            .set_property(&process.id, vocab::STEPS, Value::Entities(step_ids))?;

        info!(label, steps = steps.len(), "Added process");
        Ok(process)
    }

    /// Delete a process together with its steps
    pub fn delete_process(&mut self, label: &str) -> KbResult<()> {
        let process = self.resolve_kind(label, EntityKind::Process)?;

        let steps: Vec<EntityId> = self
            .graph
            .get_property(&process.id, vocab::STEPS)
            .map(|v| v.entities().to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|step| self.graph.entity(step).is_some())
            .collect();

        for step in &steps {
            self.graph.destroy(step)?;
        }
        self.graph.destroy(&process.id)?;

        info!(label, steps = steps.len(), "Deleted process");
        Ok(())
    }
}
