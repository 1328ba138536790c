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

//! Label Similarity
//!
//! String similarity strategies used to rank candidates when an exact label
//! lookup fails. Scores are in `[0, 1]`; `1.0` means identical.
//!
//! - [`EditDistance`]: normalized Levenshtein similarity
//! - [`WeightedStructural`]: KPI-aware score where the label root dominates
//!   the trailing aggregation suffix (`energy_sum` is closer to
//!   `energy_avg` than to `power_avg`)

use crate::error::KbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregation suffixes recognised at the end of a KPI label
pub const AGGREGATION_SUFFIXES: &[&str] = &["sum", "min", "max", "avg", "mean", "tot", "count", "var"];

/// Weight of the main part in the structural score
const MAIN_WEIGHT: f64 = 0.85;
/// Weight of the suffix in the structural score
const SUFFIX_WEIGHT: f64 = 0.15;
/// Suffix score when one side is `sum` and the other has no suffix
const IMPLICIT_SUM_SCORE: f64 = 0.05;

/// A string similarity function
pub trait Similarity {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Levenshtein distance over chars
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 − lev(a, b) / max(len(a), len(b))`
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistance;

impl Similarity for EditDistance {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let max_len = a.chars().count().max(b.chars().count());
        if max_len == 0 {
            return 1.0;
        }
        1.0 - levenshtein_distance(a, b) as f64 / max_len as f64
    }
}

/// Root-dominated similarity for KPI labels
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedStructural;

/// A label split into its root and optional aggregation suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelParts<'a> {
    pub main: &'a str,
    pub suffix: Option<&'a str>,
}

impl<'a> LabelParts<'a> {
    pub fn split(label: &'a str) -> Self {
        if let Some((main, suffix)) = label.rsplit_once('_') {
            if AGGREGATION_SUFFIXES.contains(&suffix) {
                return Self {
                    main,
                    suffix: Some(suffix),
                };
            }
        }
        Self {
            main: label,
            suffix: None,
        }
    }

    fn stripped_main(&self) -> String {
        self.main
            .chars()
            .filter(|c| *c != '_' && !c.is_whitespace())
            .collect()
    }
}

impl WeightedStructural {
    fn main_similarity(a: &LabelParts<'_>, b: &LabelParts<'_>) -> f64 {
        let main_a = a.stripped_main();
        let main_b = b.stripped_main();
        if main_a.is_empty() || main_b.is_empty() {
            return 0.0;
        }
        EditDistance.similarity(&main_a, &main_b)
    }

    fn suffix_similarity(a: &LabelParts<'_>, b: &LabelParts<'_>) -> f64 {
        match (a.suffix, b.suffix) {
            (None, None) => 1.0,
            (Some(sa), Some(sb)) => EditDistance.similarity(sa, sb),
            (Some("sum"), None) | (None, Some("sum")) => IMPLICIT_SUM_SCORE,
            _ => 0.0,
        }
    }
}

impl Similarity for WeightedStructural {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let parts_a = LabelParts::split(a);
        let parts_b = LabelParts::split(b);
        MAIN_WEIGHT * Self::main_similarity(&parts_a, &parts_b)
            + SUFFIX_WEIGHT * Self::suffix_similarity(&parts_a, &parts_b)
    }
}

/// Similarity strategy selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    /// Normalized edit distance
    EditDistance,
    /// Main part plus aggregation suffix
    #[default]
    Weighted,
}

impl SimilarityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMethod::EditDistance => "edit_distance",
            SimilarityMethod::Weighted => "weighted",
        }
    }
}

impl Similarity for SimilarityMethod {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        match self {
            SimilarityMethod::EditDistance => EditDistance.similarity(a, b),
            SimilarityMethod::Weighted => WeightedStructural.similarity(a, b),
        }
    }
}

impl FromStr for SimilarityMethod {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "edit_distance" | "levenshtein" => Ok(SimilarityMethod::EditDistance),
            "weighted" | "custom" => Ok(SimilarityMethod::Weighted),
            other => Err(KbError::InvalidMethod(other.to_string())),
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
