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

//! Label Resolver
//!
//! Exact label lookup against a graph store, and a best-match ranking over
//! a caller-supplied candidate set for when the exact lookup fails.

use kpikb_core::{EntityRef, GraphStore, KbError, KbResult, Similarity};
use tracing::error;

/// Resolves human labels to entities
pub struct LabelResolver<'a, G: GraphStore> {
    graph: &'a G,
}

impl<'a, G: GraphStore> LabelResolver<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        Self { graph }
    }

    /// The single entity carrying `label`.
    ///
    /// More than one hit means the store is corrupt and is never resolved
    /// to an arbitrary pick.
    pub fn resolve_exact(&self, label: &str) -> KbResult<EntityRef> {
        let mut hits = self.graph.find_by_label(label);
        if hits.len() > 1 {
            error!(
                label,
                count = hits.len(),
                "Label shared by several entities"
            );
            return Err(KbError::Ambiguous {
                label: label.to_string(),
                count: hits.len(),
            });
        }
        hits.pop()
            .ok_or_else(|| KbError::NotFound(label.to_string()))
    }

    /// Best candidate for `label`, see [`closest_match`]
    pub fn resolve_closest<S: Similarity + ?Sized>(
        &self,
        label: &str,
        candidates: &[EntityRef],
        similarity: &S,
    ) -> KbResult<(EntityRef, f64)> {
        closest_match(label, candidates, similarity)
    }
}

/// Highest score a candidate whose label differs from the request can get
pub const INEXACT_CEILING: f64 = 1.0 - f64::EPSILON;

/// Candidate with the highest similarity to `label`, and its score.
///
/// Ties go to the candidate seen first. Only a candidate labelled exactly
/// `label` scores 1.0; any other is capped at [`INEXACT_CEILING`]. An empty
/// candidate set is `NotFound`.
pub fn closest_match<S: Similarity + ?Sized>(
    label: &str,
    candidates: &[EntityRef],
    similarity: &S,
) -> KbResult<(EntityRef, f64)> {
    let mut best: Option<(&EntityRef, f64)> = None;
    for candidate in candidates {
        let mut score = similarity.similarity(label, &candidate.label);
        if candidate.label != label {
            score = score.min(INEXACT_CEILING);
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((candidate, score)),
        }
    }

    best.map(|(entity, score)| (entity.clone(), score))
        .ok_or_else(|| KbError::NotFound(label.to_string()))
}
