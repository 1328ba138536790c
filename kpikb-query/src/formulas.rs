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

//! Formula Dependency Resolver
//!
//! Expands a KPI into the closure of every formula it transitively depends
//! on through `R°<label>°...°` reference tokens.
//!
//! # Algorithm
//!
//! Breadth-first: the queue is seeded with the root formula and the result
//! map with `{root: formula}`. Each popped formula is scanned for references;
//! a label is resolved and enqueued only the first time it enters the map,
//! which also keeps corrupt cyclic data from looping.

use crate::resolver::{closest_match, LabelResolver};
use crate::schema::{LookupScope, Schema};
use kpikb_core::{
    references, vocab, EntityId, EntityKind, EntityRef, GraphStore, KbError, KbResult, Similarity,
};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

/// Formulas reachable from one root KPI, keyed by KPI label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormulaClosure {
    /// Label of the expanded KPI
    pub root: String,
    /// Parsable formula per KPI label
    pub formulas: BTreeMap<String, String>,
    /// Entity id per KPI label
    pub entity_ids: BTreeMap<String, EntityId>,
}

impl FormulaClosure {
    fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            formulas: BTreeMap::new(),
            entity_ids: BTreeMap::new(),
        }
    }

    fn insert(&mut self, kpi: &EntityRef, formula: String) {
        self.formulas.insert(kpi.label.clone(), formula);
        self.entity_ids.insert(kpi.label.clone(), kpi.id.clone());
    }

    pub fn contains(&self, label: &str) -> bool {
        self.formulas.contains_key(label)
    }

    pub fn formula(&self, label: &str) -> Option<&str> {
        self.formulas.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Labels in the closure, sorted
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.formulas.keys().map(String::as_str)
    }
}

/// Closure expansion over a bound graph store
pub struct FormulaResolver<'a, G: GraphStore> {
    graph: &'a G,
    schema: &'a Schema,
}

impl<'a, G: GraphStore> FormulaResolver<'a, G> {
    pub fn new(graph: &'a G, schema: &'a Schema) -> Self {
        Self { graph, schema }
    }

    /// Parsable formula of a KPI
    pub fn formula_of(&self, kpi: &EntityRef) -> KbResult<String> {
        self.graph
            .get_property(&kpi.id, vocab::PARSABLE_FORMULA)
            .and_then(|v| v.as_text().map(str::to_string))
            .ok_or_else(|| KbError::MissingProperty {
                label: kpi.label.clone(),
                property: vocab::PARSABLE_FORMULA.to_string(),
            })
    }

    /// Resolve `label` to exactly one KPI
    pub fn resolve_kpi(&self, label: &str) -> KbResult<EntityRef> {
        let kpi = LabelResolver::new(self.graph).resolve_exact(label)?;
        self.schema.expect_kind(self.graph, &kpi, EntityKind::Kpi)?;
        Ok(kpi)
    }

    /// Closure of the KPI labelled `label`
    pub fn expand(&self, label: &str) -> KbResult<FormulaClosure> {
        let root = self.resolve_kpi(label)?;
        self.expand_from(&root)
    }

    /// Closure of an already resolved KPI
    pub fn expand_from(&self, root: &EntityRef) -> KbResult<FormulaClosure> {
        let resolver = LabelResolver::new(self.graph);
        let root_formula = self.formula_of(root)?;

        let mut closure = FormulaClosure::new(&root.label);
        closure.insert(root, root_formula.clone());

        let mut queue = VecDeque::from([(root.label.clone(), root_formula)]);
        while let Some((owner, formula)) = queue.pop_front() {
            for reference in references(&formula) {
                if closure.contains(reference.label) {
                    continue;
                }

                let target = match resolver.resolve_exact(reference.label) {
                    Ok(target) => target,
                    Err(KbError::NotFound(_)) => {
                        return Err(KbError::MalformedFormula {
                            kpi: owner,
                            reference: reference.label.to_string(),
                        })
                    }
                    Err(e) => return Err(e),
                };
                self.schema
                    .expect_kind(self.graph, &target, EntityKind::Kpi)?;

                let target_formula = self.formula_of(&target)?;
                closure.insert(&target, target_formula.clone());
                queue.push_back((target.label, target_formula));
            }
        }

        debug!(root = %root.label, size = closure.len(), "Expanded formula closure");
        Ok(closure)
    }

    /// Closure of `label`, falling back to the most similar KPI when the
    /// label does not resolve to a KPI.
    ///
    /// Returns the closure and the similarity of the expanded KPI's label to
    /// `label` (`1.0` on an exact hit).
    pub fn closest_formulas<S: Similarity + ?Sized>(
        &self,
        label: &str,
        similarity: &S,
    ) -> KbResult<(FormulaClosure, f64)> {
        match self.resolve_kpi(label) {
            Ok(root) => Ok((self.expand_from(&root)?, 1.0)),
            Err(e) if e.is_resolution_failure() => {
                let candidates = self
                    .schema
                    .candidates(self.graph, LookupScope::Kind(EntityKind::Kpi));
                let (root, score) = closest_match(label, &candidates, similarity)?;
                warn!(
                    requested = label,
                    resolved = %root.label,
                    score,
                    "Falling back to closest KPI: {}",
                    e
                );
                Ok((self.expand_from(&root)?, score))
            }
            Err(e) => Err(e),
        }
    }

    /// Closure of every KPI, keyed by KPI label
    pub fn all_formulas(&self) -> KbResult<BTreeMap<String, FormulaClosure>> {
        self.schema
            .candidates(self.graph, LookupScope::Kind(EntityKind::Kpi))
            .iter()
            .map(|kpi| Ok((kpi.label.clone(), self.expand_from(kpi)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpikb_core::{EditDistance, MemoryGraph, Value};

    struct Fixture {
        graph: MemoryGraph,
        schema: Schema,
    }

    impl Fixture {
        fn new() -> Self {
            let mut graph = MemoryGraph::new();
            let schema = Schema::bootstrap(&mut graph).unwrap();
            Self { graph, schema }
        }

        fn kpi(&mut self, label: &str, formula: &str) {
            let class = EntityId::hashed("energy_kpi");
            let id = EntityId::hashed(label);
            self.graph
                .create_individual(&class, id.clone(), label)
                .unwrap();
            self.graph
                .set_property(&id, vocab::PARSABLE_FORMULA, Value::text(formula))
                .unwrap();
        }

        fn resolver(&self) -> FormulaResolver<'_, MemoryGraph> {
            FormulaResolver::new(&self.graph, &self.schema)
        }
    }

    #[test]
    fn test_expand_without_references() {
        let mut fx = Fixture::new();
        let formula = "A°sum°mo[ A°sum°t[ D°consumption_sum°t°m°o° ] ]";
        fx.kpi("consumption_sum", formula);

        let closure = fx.resolver().expand("consumption_sum").unwrap();
        assert_eq!(closure.len(), 1);
        assert_eq!(closure.formula("consumption_sum"), Some(formula));
        assert_eq!(
            closure.entity_ids["consumption_sum"],
            EntityId::hashed("consumption_sum")
        );
    }

    #[test]
    fn test_expand_transitive() {
        let mut fx = Fixture::new();
        fx.kpi("time_sum", "D°time_sum°T°m°o°");
        fx.kpi("working_time_sum", "D°working_time_sum°T°m°o°");
        fx.kpi("idle_time", "R°time_sum°T°m°o° - R°working_time_sum°T°m°o°");
        fx.kpi("idle_ratio", "R°idle_time°T°m°o° / R°time_sum°T°m°o°");
        fx.kpi("unrelated", "D°unrelated°T°m°o°");

        let closure = fx.resolver().expand("idle_ratio").unwrap();
        let labels: Vec<&str> = closure.labels().collect();
        assert_eq!(
            labels,
            vec!["idle_ratio", "idle_time", "time_sum", "working_time_sum"]
        );
        assert_eq!(closure.root, "idle_ratio");
    }

    #[test]
    fn test_expand_is_idempotent() {
        let mut fx = Fixture::new();
        fx.kpi("a", "D°a°T°m°o°");
        fx.kpi("b", "R°a°T°m°o° * 2");

        let first = fx.resolver().expand("b").unwrap();
        let second = fx.resolver().expand("b").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_expand_cycle_terminates() {
        let mut fx = Fixture::new();
        fx.kpi("ping", "R°pong°T°m°o°");
        fx.kpi("pong", "R°ping°T°m°o°");

        let closure = fx.resolver().expand("ping").unwrap();
        assert_eq!(closure.len(), 2);
    }

    #[test]
    fn test_expand_dangling_reference() {
        let mut fx = Fixture::new();
        fx.kpi("broken", "R°ghost°T°m°o° + 1");

        let err = fx.resolver().expand("broken").unwrap_err();
        assert!(matches!(
            err,
            KbError::MalformedFormula { kpi, reference } if kpi == "broken" && reference == "ghost"
        ));
    }

    #[test]
    fn test_expand_root_errors() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.resolver().expand("nope"),
            Err(KbError::NotFound(_))
        ));
        assert!(matches!(
            fx.resolver().expand("energy_kpi"),
            Err(KbError::WrongKind {
                expected: EntityKind::Kpi,
                ..
            })
        ));
    }

    #[test]
    fn test_expand_reference_to_non_kpi() {
        let mut fx = Fixture::new();
        fx.kpi("odd", "R°machine°T°m°o°");

        assert!(matches!(
            fx.resolver().expand("odd"),
            Err(KbError::WrongKind { label, .. }) if label == "machine"
        ));
    }

    #[test]
    fn test_closest_formulas_exact() {
        let mut fx = Fixture::new();
        fx.kpi("power_sum", "D°power_sum°T°m°o°");

        let (closure, score) = fx
            .resolver()
            .closest_formulas("power_sum", &EditDistance)
            .unwrap();
        assert_eq!(score, 1.0);
        assert_eq!(closure.root, "power_sum");
    }

    #[test]
    fn test_closest_formulas_fallback() {
        let mut fx = Fixture::new();
        fx.kpi("power_sum", "D°power_sum°T°m°o°");
        fx.kpi("cost_avg", "D°cost_avg°T°m°o°");

        let (closure, score) = fx
            .resolver()
            .closest_formulas("power_summ", &EditDistance)
            .unwrap();
        assert_eq!(closure.root, "power_sum");
        assert!(score > 0.8 && score < 1.0);
    }

    #[test]
    fn test_closest_formulas_on_class_label() {
        let mut fx = Fixture::new();
        fx.kpi("energy_sum", "D°energy_sum°T°m°o°");

        let (closure, score) = fx
            .resolver()
            .closest_formulas("energy_kpi", &EditDistance)
            .unwrap();
        assert_eq!(closure.root, "energy_sum");
        assert!(score < 1.0);
    }

    #[test]
    fn test_closest_formulas_does_not_mask_dangling() {
        let mut fx = Fixture::new();
        fx.kpi("broken", "R°ghost°T°m°o°");

        assert!(matches!(
            fx.resolver().closest_formulas("broken", &EditDistance),
            Err(KbError::MalformedFormula { .. })
        ));
    }

    #[test]
    fn test_all_formulas() {
        let mut fx = Fixture::new();
        fx.kpi("a", "D°a°T°m°o°");
        fx.kpi("b", "R°a°T°m°o° * 2");

        let all = fx.resolver().all_formulas().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"].len(), 1);
        assert_eq!(all["b"].len(), 2);
    }

    #[test]
    fn test_missing_formula_property() {
        let mut fx = Fixture::new();
        let class = EntityId::hashed("cost_kpi");
        fx.graph
            .create_individual(&class, EntityId::new("bare"), "bare")
            .unwrap();

        assert!(matches!(
            fx.resolver().expand("bare"),
            Err(KbError::MissingProperty { .. })
        ));
    }
}
