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

//! Knowledge base handle
//!
//! [`KnowledgeBase`] owns the graph store and the snapshot store. Reads share
//! a read lock. A mutation holds the write lock while it edits a staged copy
//! of the graph and writes that copy as a new revision; the copy replaces
//! the live graph only once the snapshot is on disk.

use crate::formulas::{FormulaClosure, FormulaResolver};
use crate::lifecycle::{EntityManager, NewKpi, StepSpec};
use crate::resolver::{closest_match, LabelResolver};
use crate::schema::{LookupScope, Schema};
use kpikb_core::{
    EntityKind, EntityRef, GraphStore, KbConfig, KbResult, MemoryGraph, Similarity,
    SimilarityMethod, Value,
};
use kpikb_storage::{RetentionPolicy, SnapshotStore};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// A class and its (transitive) instances
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassInstances {
    pub class: EntityRef,
    pub instances: Vec<EntityRef>,
}

/// An entity with its class and every property value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDescription {
    pub entity: EntityRef,
    /// Class of an individual; `None` for classes
    pub class: Option<EntityRef>,
    pub properties: BTreeMap<String, Value>,
}

struct State<G> {
    graph: G,
    schema: Schema,
}

/// Handle owning one knowledge base
pub struct KnowledgeBase<G: GraphStore = MemoryGraph> {
    state: RwLock<State<G>>,
    snapshots: Mutex<SnapshotStore>,
    similarity: SimilarityMethod,
}

impl<G: GraphStore + Default> KnowledgeBase<G> {
    /// Open the knowledge base under `config.data_dir`.
    ///
    /// Loads the latest revision, or bootstraps the schema and writes it as
    /// revision 0 when the directory holds none.
    pub fn open(config: &KbConfig) -> KbResult<Self> {
        config.validate()?;

        let mut snapshots = SnapshotStore::open(
            config.backups_dir(),
            config.counter_path(),
            RetentionPolicy::from(config.retention),
        )?;

        let state = match snapshots.latest_revision() {
            Some(revision) => {
                let graph: G = snapshots.load(revision)?;
                let schema = Schema::bind(&graph)?;
                info!(revision, data_dir = ?config.data_dir, "Opened knowledge base");
                State { graph, schema }
            }
            None => {
                let mut graph = G::default();
                let schema = Schema::bootstrap(&mut graph)?;
                let revision = snapshots.save(&graph)?;
                info!(revision, data_dir = ?config.data_dir, "Created knowledge base");
                State { graph, schema }
            }
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshots: Mutex::new(snapshots),
            similarity: config.similarity,
        })
    }
}

impl<G: GraphStore> KnowledgeBase<G> {
    /// Similarity used when a closest-match call names none
    pub fn default_similarity(&self) -> SimilarityMethod {
        self.similarity
    }

    fn read<T>(&self, op: impl FnOnce(&G, &Schema) -> KbResult<T>) -> KbResult<T> {
        let state = self.state.read();
        op(&state.graph, &state.schema)
    }

}

impl<G: GraphStore + Clone> KnowledgeBase<G> {
    /// Run a validated mutation on a staged copy of the graph, snapshot it,
    /// then swap it in. Nothing changes if either step fails.
    fn mutate<T>(&self, op: impl FnOnce(&mut EntityManager<'_, G>) -> KbResult<T>) -> KbResult<T> {
        let mut state = self.state.write();
        let mut staged = state.graph.clone();

        let value = op(&mut EntityManager::new(&mut staged, &state.schema))?;
        self.snapshots.lock().save(&staged)?;
        state.graph = staged;
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn add_kpi(&self, kpi: &NewKpi) -> KbResult<EntityRef> {
        self.mutate(|manager| manager.add_kpi(kpi))
    }

    pub fn delete_kpi(&self, label: &str) -> KbResult<()> {
        self.mutate(|manager| manager.delete_kpi(label))
    }

    pub fn add_operation(&self, label: &str, description: &str) -> KbResult<EntityRef> {
        self.mutate(|manager| manager.add_operation(label, description))
    }

    pub fn delete_operation(&self, label: &str) -> KbResult<()> {
        self.mutate(|manager| manager.delete_operation(label))
    }

    pub fn add_machine(&self, label: &str, description: &str) -> KbResult<EntityRef> {
        self.mutate(|manager| manager.add_machine(label, description))
    }

    pub fn add_process(
        &self,
        label: &str,
        description: &str,
        steps: &[StepSpec],
    ) -> KbResult<EntityRef> {
        self.mutate(|manager| manager.add_process(label, description, steps))
    }

    pub fn delete_process(&self, label: &str) -> KbResult<()> {
        self.mutate(|manager| manager.delete_process(label))
    }
}

impl<G: GraphStore> KnowledgeBase<G> {

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// The single entity labelled `label`
    pub fn resolve(&self, label: &str) -> KbResult<EntityRef> {
        self.read(|graph, _| LabelResolver::new(graph).resolve_exact(label))
    }

    /// Exact match within `scope`, else the most similar candidate in it
    pub fn closest(
        &self,
        label: &str,
        scope: LookupScope,
        method: Option<SimilarityMethod>,
    ) -> KbResult<(EntityRef, f64)> {
        let method = method.unwrap_or(self.similarity);
        self.read(|graph, schema| resolve_or_closest(graph, schema, label, scope, &method))
    }

    /// Every KPI
    pub fn kpis(&self) -> KbResult<Vec<EntityRef>> {
        self.read(|graph, schema| Ok(schema.candidates(graph, LookupScope::Kind(EntityKind::Kpi))))
    }

    pub fn formulas(&self, label: &str) -> KbResult<FormulaClosure> {
        self.read(|graph, schema| FormulaResolver::new(graph, schema).expand(label))
    }

    /// Closure of `label` or of the most similar KPI, with the similarity
    pub fn closest_formulas(
        &self,
        label: &str,
        method: Option<SimilarityMethod>,
    ) -> KbResult<(FormulaClosure, f64)> {
        let method = method.unwrap_or(self.similarity);
        self.read(|graph, schema| {
            FormulaResolver::new(graph, schema).closest_formulas(label, &method)
        })
    }

    pub fn all_formulas(&self) -> KbResult<BTreeMap<String, FormulaClosure>> {
        self.read(|graph, schema| FormulaResolver::new(graph, schema).all_formulas())
    }

    pub fn class_instances(&self, label: &str) -> KbResult<ClassInstances> {
        self.read(|graph, schema| {
            let class = LabelResolver::new(graph).resolve_exact(label)?;
            schema.expect_kind(graph, &class, EntityKind::Class)?;
            Ok(instances(graph, class))
        })
    }

    pub fn closest_class_instances(
        &self,
        label: &str,
        method: Option<SimilarityMethod>,
    ) -> KbResult<(ClassInstances, f64)> {
        let method = method.unwrap_or(self.similarity);
        self.read(|graph, schema| {
            let scope = LookupScope::Kind(EntityKind::Class);
            let (class, score) = resolve_or_closest(graph, schema, label, scope, &method)?;
            Ok((instances(graph, class), score))
        })
    }

    pub fn entity_properties(&self, label: &str) -> KbResult<EntityDescription> {
        self.read(|graph, _| {
            let entity = LabelResolver::new(graph).resolve_exact(label)?;
            Ok(describe(graph, entity))
        })
    }

    pub fn closest_entity_properties(
        &self,
        label: &str,
        method: Option<SimilarityMethod>,
    ) -> KbResult<(EntityDescription, f64)> {
        let method = method.unwrap_or(self.similarity);
        self.read(|graph, schema| {
            let (entity, score) =
                resolve_or_closest(graph, schema, label, LookupScope::All, &method)?;
            Ok((describe(graph, entity), score))
        })
    }

    // ------------------------------------------------------------------
    // Revisions
    // ------------------------------------------------------------------

    /// Most recently written revision
    pub fn current_revision(&self) -> Option<u64> {
        self.snapshots.lock().latest_revision()
    }

    /// Snapshot file of the most recent revision
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.snapshots.lock().latest_path()
    }

    /// Revisions currently retained on disk
    pub fn revisions(&self) -> KbResult<Vec<u64>> {
        self.snapshots.lock().revisions()
    }

    /// Replace the live store with a retained revision.
    ///
    /// The next mutation is written as `revision + 1`.
    pub fn load_revision(&self, revision: u64) -> KbResult<()> {
        let mut state = self.state.write();
        let graph: G = self.snapshots.lock().load_revision(revision)?;
        let schema = Schema::bind(&graph)?;
        *state = State { graph, schema };
        Ok(())
    }
}

fn resolve_or_closest<G: GraphStore, S: Similarity + ?Sized>(
    graph: &G,
    schema: &Schema,
    label: &str,
    scope: LookupScope,
    similarity: &S,
) -> KbResult<(EntityRef, f64)> {
    let exact = LabelResolver::new(graph)
        .resolve_exact(label)
        .and_then(|entity| {
            if let LookupScope::Kind(kind) = scope {
                schema.expect_kind(graph, &entity, kind)?;
            }
            Ok(entity)
        });

    match exact {
        Ok(entity) => Ok((entity, 1.0)),
        Err(e) if e.is_resolution_failure() => {
            let candidates = schema.candidates(graph, scope);
            let (entity, score) = closest_match(label, &candidates, similarity)?;
            warn!(
                requested = label,
                resolved = %entity.label,
                score,
                "Falling back to closest match: {}",
                e
            );
            Ok((entity, score))
        }
        Err(e) => Err(e),
    }
}

fn instances<G: GraphStore>(graph: &G, class: EntityRef) -> ClassInstances {
    let instances = graph.instances_of(&class.id);
    ClassInstances { class, instances }
}

fn describe<G: GraphStore>(graph: &G, entity: EntityRef) -> EntityDescription {
    let class = graph
        .class_of(&entity.id)
        .and_then(|class| graph.entity(&class));
    let properties = graph.properties(&entity.id);
    EntityDescription {
        entity,
        class,
        properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpikb_core::{vocab, KbError};
    use tempfile::tempdir;

    fn open(dir: &std::path::Path) -> KnowledgeBase {
        KnowledgeBase::open(&KbConfig::with_data_dir(dir)).unwrap()
    }

    fn kpi(label: &str, formula: &str) -> NewKpi {
        NewKpi {
            superclass: "energy_kpi".to_string(),
            label: label.to_string(),
            unit_of_measure: "kWh".to_string(),
            parsable_formula: formula.to_string(),
            ..NewKpi::default()
        }
    }

    #[test]
    fn test_open_bootstraps_revision_zero() {
        let dir = tempdir().unwrap();
        let kb = open(dir.path());

        assert_eq!(kb.current_revision(), Some(0));
        assert!(kb.snapshot_path().unwrap().exists());
        assert!(kb.resolve(vocab::KPI_CLASS).unwrap().is_class());
    }

    #[test]
    fn test_mutation_snapshots() {
        let dir = tempdir().unwrap();
        let kb = open(dir.path());

        kb.add_kpi(&kpi("a", "D°a°T°m°o°")).unwrap();
        assert_eq!(kb.current_revision(), Some(1));
        kb.delete_kpi("a").unwrap();
        assert_eq!(kb.current_revision(), Some(2));
    }

    #[test]
    fn test_failed_mutation_does_not_snapshot() {
        let dir = tempdir().unwrap();
        let kb = open(dir.path());

        assert!(matches!(
            kb.add_kpi(&kpi("machine", "1")),
            Err(KbError::AlreadyExists(_))
        ));
        assert!(kb.delete_process("missing").is_err());
        assert_eq!(kb.current_revision(), Some(0));
    }

    #[test]
    fn test_reopen_loads_latest() {
        let dir = tempdir().unwrap();
        {
            let kb = open(dir.path());
            kb.add_operation("milling", "cut").unwrap();
        }

        let kb = open(dir.path());
        assert_eq!(kb.current_revision(), Some(1));
        assert!(kb.resolve("milling").is_ok());
    }

    #[test]
    fn test_load_revision() {
        let dir = tempdir().unwrap();
        let kb = open(dir.path());
        kb.add_operation("milling", "cut").unwrap();
        kb.add_operation("drilling", "bore").unwrap();

        kb.load_revision(1).unwrap();
        assert!(kb.resolve("milling").is_ok());
        assert!(matches!(kb.resolve("drilling"), Err(KbError::NotFound(_))));

        kb.add_operation("welding", "join").unwrap();
        assert_eq!(kb.current_revision(), Some(2));
        assert_eq!(kb.revisions().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsaved_mutation_is_rolled_back() {
        let dir = tempdir().unwrap();
        let config = KbConfig::with_data_dir(dir.path());
        let kb: KnowledgeBase = KnowledgeBase::open(&config).unwrap();

        std::fs::remove_dir_all(config.backups_dir()).unwrap();
        std::fs::write(config.backups_dir(), "not a directory").unwrap();

        assert!(matches!(
            kb.add_operation("milling", "cut"),
            Err(KbError::Io(_))
        ));
        assert!(matches!(kb.resolve("milling"), Err(KbError::NotFound(_))));
        assert_eq!(kb.current_revision(), Some(0));

        std::fs::remove_file(config.backups_dir()).unwrap();
        kb.add_operation("milling", "cut").unwrap();
        assert_eq!(kb.current_revision(), Some(1));
        assert!(kb.resolve("milling").is_ok());
    }

    #[test]
    fn test_class_instances() {
        let dir = tempdir().unwrap();
        let kb = open(dir.path());
        kb.add_kpi(&kpi("a", "D°a°T°m°o°")).unwrap();

        let exact = kb.class_instances(vocab::KPI_CLASS).unwrap();
        assert_eq!(exact.instances.len(), 1);
        assert!(matches!(
            kb.class_instances("a"),
            Err(KbError::WrongKind { .. })
        ));

        let (closest, score) = kb
            .closest_class_instances("energy_kpis", Some(SimilarityMethod::EditDistance))
            .unwrap();
        assert_eq!(closest.class.label, "energy_kpi");
        assert!(score < 1.0);
    }

    #[test]
    fn test_entity_properties() {
        let dir = tempdir().unwrap();
        let kb = open(dir.path());
        kb.add_kpi(&kpi("a", "D°a°T°m°o°")).unwrap();

        let described = kb.entity_properties("a").unwrap();
        assert_eq!(described.class.unwrap().label, "energy_kpi");
        assert_eq!(
            described.properties[vocab::UNIT_OF_MEASURE],
            Value::text("kWh")
        );

        let (_, score) = kb.closest_entity_properties("a", None).unwrap();
        assert_eq!(score, 1.0);
    }
}
