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

//! Formula Reference Tokens
//!
//! KPI formulas are token strings separated by `°`. Only one token shape
//! matters to the knowledge base, the reference to another KPI:
//!
//! ```text
//! R°<kpi_label>°<seg>°<seg>°<seg>°
//! ```
//!
//! `<kpi_label>` is one or more ASCII letters or underscores; each `<seg>` is
//! zero or more of the same. Every other token (`A°`, `S°`, `C°`, `D°`, ...)
//! is opaque and left alone.
//!
//! [`references`] scans left to right and yields non-overlapping matches.

use once_cell::sync::Lazy;
use regex::{CaptureMatches, Regex};
use std::ops::Range;

/// Segment separator
pub const SEPARATOR: char = '°';

/// Prefix of a reference token
pub const REFERENCE_PREFIX: &str = "R°";

/// Number of dimension segments after the label
const DIMENSIONS: usize = 3;

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"R°([A-Za-z_]+)°([A-Za-z_]*)°([A-Za-z_]*)°([A-Za-z_]*)°")
        .expect("reference pattern compiles")
});

/// A `R°...°` token found in a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaReference<'a> {
    /// Referenced KPI label
    pub label: &'a str,
    /// Time / machine / operation placeholders, possibly empty
    pub dimensions: [&'a str; DIMENSIONS],
    /// Byte range of the whole token in the formula
    pub span: Range<usize>,
}

/// Iterator over the reference tokens of a formula
pub struct References<'a> {
    captures: CaptureMatches<'static, 'a>,
}

impl<'a> Iterator for References<'a> {
    type Item = FormulaReference<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let caps = self.captures.next()?;
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
        let whole = caps.get(0)?;

        Some(FormulaReference {
            label: group(1),
            dimensions: [group(2), group(3), group(4)],
            span: whole.range(),
        })
    }
}

/// All reference tokens of `formula`, in order of appearance
pub fn references(formula: &str) -> References<'_> {
    References {
        captures: REFERENCE.captures_iter(formula),
    }
}

/// Labels referenced by `formula`, in order of appearance (may repeat)
pub fn referenced_labels(formula: &str) -> Vec<&str> {
    references(formula).map(|r| r.label).collect()
}

/// Whether `formula` references the KPI labelled `label`
pub fn references_label(formula: &str, label: &str) -> bool {
    references(formula).any(|r| r.label == label)
}
