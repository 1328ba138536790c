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

//! Graph Store
//!
//! The ontology-like store the knowledge base runs on: classes with a single
//! parent, individuals typed by a class, and named property values on
//! individuals. [`GraphStore`] is the contract the query layer consumes;
//! [`MemoryGraph`] is the in-process implementation persisted as JSON.
//!
//! The store does not lock internally. Callers own it behind a lock and
//! serialize writers themselves.

use crate::entity::{EntityId, EntityRef, RefKind, Value};
use crate::error::{KbError, KbResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Persistence format version
const FORMAT_VERSION: u32 = 1;

/// Operations the knowledge base needs from a graph store
pub trait GraphStore: Send + Sync {
    /// All entities carrying exactly `label`
    fn find_by_label(&self, label: &str) -> Vec<EntityRef>;

    /// Look up an entity by id
    fn entity(&self, id: &EntityId) -> Option<EntityRef>;

    /// Every class in the store
    fn classes(&self) -> Vec<EntityRef>;

    /// Every individual in the store
    fn individuals(&self) -> Vec<EntityRef>;

    /// Individuals of `class` or of any of its transitive subclasses
    fn instances_of(&self, class: &EntityId) -> Vec<EntityRef>;

    /// Transitive subclasses of `class`, not including `class` itself
    fn subclasses_of(&self, class: &EntityId) -> Vec<EntityRef>;

    /// Direct class of an individual
    fn class_of(&self, individual: &EntityId) -> Option<EntityId>;

    fn get_property(&self, entity: &EntityId, property: &str) -> Option<Value>;

    /// All property values of an entity, keyed by property name
    fn properties(&self, entity: &EntityId) -> BTreeMap<String, Value>;

    fn set_property(&mut self, entity: &EntityId, property: &str, value: Value) -> KbResult<()>;

    fn create_class(
        &mut self,
        id: EntityId,
        label: &str,
        parent: Option<&EntityId>,
    ) -> KbResult<EntityRef>;

    fn create_individual(
        &mut self,
        class: &EntityId,
        id: EntityId,
        label: &str,
    ) -> KbResult<EntityRef>;

    /// Remove an entity and every property value pointing at it
    fn destroy(&mut self, entity: &EntityId) -> KbResult<()>;

    /// Write the full store state to `path`
    fn serialize_to(&self, path: &Path) -> KbResult<()>;

    /// Read a store previously written by [`GraphStore::serialize_to`]
    fn deserialize_from(path: &Path) -> KbResult<Self>
    where
        Self: Sized;

    /// Whether `class` is `ancestor` or one of its transitive subclasses
    fn is_subclass_of(&self, class: &EntityId, ancestor: &EntityId) -> bool {
        class == ancestor
            || self
                .subclasses_of(ancestor)
                .iter()
                .any(|sub| &sub.id == class)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassNode {
    id: EntityId,
    label: String,
    parent: Option<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndividualNode {
    id: EntityId,
    label: String,
    class: EntityId,
    properties: BTreeMap<String, Value>,
}

/// Persistence format
#[derive(Debug, Serialize, Deserialize)]
struct GraphPersistence {
    version: u32,
    classes: Vec<ClassNode>,
    individuals: Vec<IndividualNode>,
}

/// In-memory graph store
#[derive(Debug, Default, Clone)]
pub struct MemoryGraph {
    classes: BTreeMap<EntityId, ClassNode>,
    individuals: BTreeMap<EntityId, IndividualNode>,
    /// Label to ids; more than one id per label is representable on purpose
    label_index: HashMap<String, Vec<EntityId>>,
}

impl MemoryGraph {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of classes and individuals
    pub fn len(&self) -> usize {
        self.classes.len() + self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.individuals.is_empty()
    }

    fn contains(&self, id: &EntityId) -> bool {
        self.classes.contains_key(id) || self.individuals.contains_key(id)
    }

    fn index_label(&mut self, label: &str, id: &EntityId) {
        self.label_index
            .entry(label.to_string())
            .or_default()
            .push(id.clone());
    }

    fn unindex_label(&mut self, label: &str, id: &EntityId) {
        if let Some(ids) = self.label_index.get_mut(label) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                self.label_index.remove(label);
            }
        }
    }

    fn class_ref(node: &ClassNode) -> EntityRef {
        EntityRef {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: RefKind::Class,
        }
    }

    fn individual_ref(node: &IndividualNode) -> EntityRef {
        EntityRef {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: RefKind::Individual,
        }
    }

    /// Ids of `class` and all of its transitive subclasses
    fn class_closure(&self, class: &EntityId) -> HashSet<EntityId> {
        let mut children: HashMap<&EntityId, Vec<&EntityId>> = HashMap::new();
        for node in self.classes.values() {
            if let Some(parent) = &node.parent {
                children.entry(parent).or_default().push(&node.id);
            }
        }

        let mut closure = HashSet::new();
        if !self.classes.contains_key(class) {
            return closure;
        }

        let mut frontier = VecDeque::from([class]);
        while let Some(current) = frontier.pop_front() {
            if closure.insert(current.clone()) {
                if let Some(subs) = children.get(current) {
                    frontier.extend(subs.iter().copied());
                }
            }
        }
        closure
    }
}

impl GraphStore for MemoryGraph {
    fn find_by_label(&self, label: &str) -> Vec<EntityRef> {
        self.label_index
            .get(label)
            .map(|ids| ids.iter().filter_map(|id| self.entity(id)).collect())
            .unwrap_or_default()
    }

    fn entity(&self, id: &EntityId) -> Option<EntityRef> {
        self.classes
            .get(id)
            .map(Self::class_ref)
            .or_else(|| self.individuals.get(id).map(Self::individual_ref))
    }

    fn classes(&self) -> Vec<EntityRef> {
        self.classes.values().map(Self::class_ref).collect()
    }

    fn individuals(&self) -> Vec<EntityRef> {
        self.individuals.values().map(Self::individual_ref).collect()
    }

    fn instances_of(&self, class: &EntityId) -> Vec<EntityRef> {
        let closure = self.class_closure(class);
        self.individuals
            .values()
            .filter(|node| closure.contains(&node.class))
            .map(Self::individual_ref)
            .collect()
    }

    fn subclasses_of(&self, class: &EntityId) -> Vec<EntityRef> {
        let closure = self.class_closure(class);
        self.classes
            .values()
            .filter(|node| &node.id != class && closure.contains(&node.id))
            .map(Self::class_ref)
            .collect()
    }

    fn class_of(&self, individual: &EntityId) -> Option<EntityId> {
        self.individuals.get(individual).map(|node| node.class.clone())
    }

    fn get_property(&self, entity: &EntityId, property: &str) -> Option<Value> {
        self.individuals
            .get(entity)
            .and_then(|node| node.properties.get(property).cloned())
    }

    fn properties(&self, entity: &EntityId) -> BTreeMap<String, Value> {
        self.individuals
            .get(entity)
            .map(|node| node.properties.clone())
            .unwrap_or_default()
    }

    fn set_property(&mut self, entity: &EntityId, property: &str, value: Value) -> KbResult<()> {
        let node = self
            .individuals
            .get_mut(entity)
            .ok_or_else(|| KbError::UnknownEntity(entity.to_string()))?;
        node.properties.insert(property.to_string(), value);
        Ok(())
    }

    fn create_class(
        &mut self,
        id: EntityId,
        label: &str,
        parent: Option<&EntityId>,
    ) -> KbResult<EntityRef> {
        if self.contains(&id) {
            return Err(KbError::AlreadyExists(id.to_string()));
        }
        if let Some(parent) = parent {
            if !self.classes.contains_key(parent) {
                return Err(KbError::UnknownEntity(parent.to_string()));
            }
        }

        let node = ClassNode {
            id: id.clone(),
            label: label.to_string(),
            parent: parent.cloned(),
        };
        let entity = Self::class_ref(&node);
        self.index_label(label, &id);
        self.classes.insert(id, node);
        Ok(entity)
    }

    fn create_individual(
        &mut self,
        class: &EntityId,
        id: EntityId,
        label: &str,
    ) -> KbResult<EntityRef> {
        if self.contains(&id) {
            return Err(KbError::AlreadyExists(id.to_string()));
        }
        if !self.classes.contains_key(class) {
            return Err(KbError::UnknownEntity(class.to_string()));
        }

        let node = IndividualNode {
            id: id.clone(),
            label: label.to_string(),
            class: class.clone(),
            properties: BTreeMap::new(),
        };
        let entity = Self::individual_ref(&node);
        self.index_label(label, &id);
        self.individuals.insert(id, node);
        Ok(entity)
    }

    fn destroy(&mut self, entity: &EntityId) -> KbResult<()> {
        if let Some(node) = self.classes.get(entity) {
            let has_subclasses = self
                .classes
                .values()
                .any(|c| c.parent.as_ref() == Some(entity));
            let has_instances = self.individuals.values().any(|i| &i.class == entity);
            if has_subclasses || has_instances {
                return Err(KbError::StillReferenced {
                    label: node.label.clone(),
                    referenced_by: "its subclasses or instances".to_string(),
                });
            }
            let label = node.label.clone();
            self.classes.remove(entity);
            self.unindex_label(&label, entity);
        } else if let Some(node) = self.individuals.remove(entity) {
            self.unindex_label(&node.label, entity);
        } else {
            return Err(KbError::UnknownEntity(entity.to_string()));
        }

        // Drop dangling values pointing at the removed entity
        for node in self.individuals.values_mut() {
            node.properties.retain(|_, value| match value {
                Value::Entity(id) => id != entity,
                _ => true,
            });
            for value in node.properties.values_mut() {
                if let Value::Entities(ids) = value {
                    ids.retain(|id| id != entity);
                }
            }
        }

        Ok(())
    }

    fn serialize_to(&self, path: &Path) -> KbResult<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }

        let data = GraphPersistence {
            version: FORMAT_VERSION,
            classes: self.classes.values().cloned().collect(),
            individuals: self.individuals.values().cloned().collect(),
        };

        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);

        serde_json::to_writer(&mut writer, &data)?;

        writer.flush()?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    fn deserialize_from(path: &Path) -> KbResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let data: GraphPersistence = serde_json::from_reader(reader)?;
        if data.version != FORMAT_VERSION {
            return Err(KbError::Serialization(format!(
                "unsupported graph format version {}",
                data.version
            )));
        }

        let mut graph = Self::new();
        for node in data.classes {
            graph.index_label(&node.label, &node.id);
            graph.classes.insert(node.id.clone(), node);
        }
        for node in data.individuals {
            graph.index_label(&node.label, &node.id);
            graph.individuals.insert(node.id.clone(), node);
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(s: &str) -> EntityId {
        EntityId::new(s)
    }

    fn sample() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        graph.create_class(id("kpi"), "kpi", None).unwrap();
        graph
            .create_class(id("energy"), "energy_kpi", Some(&id("kpi")))
            .unwrap();
        graph
            .create_class(id("power"), "power_kpi", Some(&id("energy")))
            .unwrap();
        graph.create_class(id("machine"), "machine", None).unwrap();
        graph
            .create_individual(&id("power"), id("k1"), "power_max")
            .unwrap();
        graph
            .create_individual(&id("machine"), id("m1"), "large_laser")
            .unwrap();
        graph
    }

    #[test]
    fn test_subclass_closure() {
        let graph = sample();

        let subs: Vec<String> = graph
            .subclasses_of(&id("kpi"))
            .into_iter()
            .map(|e| e.label)
            .collect();
        assert_eq!(subs.len(), 2);
        assert!(subs.contains(&"energy_kpi".to_string()));
        assert!(subs.contains(&"power_kpi".to_string()));

        assert!(graph.is_subclass_of(&id("power"), &id("kpi")));
        assert!(graph.is_subclass_of(&id("kpi"), &id("kpi")));
        assert!(!graph.is_subclass_of(&id("machine"), &id("kpi")));
    }

    #[test]
    fn test_instances_include_subclasses() {
        let graph = sample();

        let kpis = graph.instances_of(&id("kpi"));
        assert_eq!(kpis.len(), 1);
        assert_eq!(kpis[0].label, "power_max");

        assert!(graph.instances_of(&id("missing")).is_empty());
    }

    #[test]
    fn test_duplicate_labels_are_representable() {
        let mut graph = sample();
        graph
            .create_individual(&id("machine"), id("m2"), "large_laser")
            .unwrap();

        assert_eq!(graph.find_by_label("large_laser").len(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = sample();
        let result = graph.create_individual(&id("machine"), id("m1"), "other");
        assert!(matches!(result, Err(KbError::AlreadyExists(_))));
    }

    #[test]
    fn test_destroy_clears_references() {
        let mut graph = sample();
        graph
            .set_property(&id("k1"), "depends_on", Value::Entities(vec![id("m1")]))
            .unwrap();
        graph
            .set_property(&id("k1"), "machine", Value::Entity(id("m1")))
            .unwrap();

        graph.destroy(&id("m1")).unwrap();

        assert!(graph.find_by_label("large_laser").is_empty());
        assert_eq!(
            graph.get_property(&id("k1"), "depends_on"),
            Some(Value::Entities(vec![]))
        );
        assert_eq!(graph.get_property(&id("k1"), "machine"), None);
    }

    #[test]
    fn test_destroy_class_with_instances_refused() {
        let mut graph = sample();
        assert!(matches!(
            graph.destroy(&id("power")),
            Err(KbError::StillReferenced { .. })
        ));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let mut graph = sample();
        graph
            .set_property(&id("k1"), "unit_of_measure", Value::text("kW"))
            .unwrap();
        graph.serialize_to(&path).unwrap();

        let loaded = MemoryGraph::deserialize_from(&path).unwrap();
        assert_eq!(loaded.len(), graph.len());
        assert_eq!(loaded.find_by_label("power_max").len(), 1);
        assert_eq!(
            loaded.get_property(&id("k1"), "unit_of_measure"),
            Some(Value::text("kW"))
        );
        assert!(!path.with_extension("tmp").exists());
    }
}
