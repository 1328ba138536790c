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

//! Tiered snapshot retention
//!
//! After revision `r` is written at most one older revision is deleted:
//!
//! - on a coarse boundary, `(r − max_fine) mod coarse_grain == 0`, the coarse
//!   checkpoint `r − max_fine − max_coarse·coarse_grain` is dropped;
//! - otherwise the revision leaving the fine window, `r − max_fine`, is
//!   dropped.
//!
//! Revision 0 is never a prune target. The result is a sliding window of the
//! last `max_fine` revisions plus `max_coarse` checkpoints spaced
//! `coarse_grain` apart.

use kpikb_core::RetentionConfig;
use std::collections::BTreeSet;

/// Two-tier retention policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    coarse_grain: u64,
    max_fine: u64,
    max_coarse: u64,
}

impl RetentionPolicy {
    /// A `coarse_grain` of 0 is treated as 1
    pub fn new(coarse_grain: u64, max_fine: u64, max_coarse: u64) -> Self {
        Self {
            coarse_grain: coarse_grain.max(1),
            max_fine,
            max_coarse,
        }
    }

    pub fn coarse_grain(&self) -> u64 {
        self.coarse_grain
    }

    pub fn max_fine(&self) -> u64 {
        self.max_fine
    }

    pub fn max_coarse(&self) -> u64 {
        self.max_coarse
    }

    /// Whether writing `revision` lands on a coarse checkpoint boundary
    pub fn is_coarse_boundary(&self, revision: u64) -> bool {
        let offset = revision as i128 - self.max_fine as i128;
        offset.rem_euclid(self.coarse_grain as i128) == 0
    }

    /// Revision to delete once `revision` has been written, if any
    pub fn prune_target(&self, revision: u64) -> Option<u64> {
        let revision = revision as i128;
        let max_fine = self.max_fine as i128;

        let target = if self.is_coarse_boundary(revision as u64) {
            revision - max_fine - (self.max_coarse as i128) * (self.coarse_grain as i128)
        } else {
            revision - max_fine
        };

        (target > 0).then_some(target as u64)
    }

    /// Revisions left on disk after writing `first..=last` in order,
    /// assuming nothing was on disk before `first`
    pub fn retained(&self, first: u64, last: u64) -> BTreeSet<u64> {
        let mut kept = BTreeSet::new();
        for revision in first..=last {
            kept.insert(revision);
            if let Some(target) = self.prune_target(revision) {
                kept.remove(&target);
            }
        }
        kept
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(RetentionConfig::default())
    }
}

impl From<RetentionConfig> for RetentionPolicy {
    fn from(config: RetentionConfig) -> Self {
        Self::new(config.coarse_grain, config.max_fine, config.max_coarse)
    }
}
