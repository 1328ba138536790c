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

//! KPI Knowledge Base Storage Layer
//!
//! Revisioned snapshots of the graph store:
//!
//! - **Revision counter**: a single integer file holding the next revision
//! - **Snapshot store**: one full serialized copy per retained revision
//! - **Retention**: a fine window of recent revisions plus sparse coarse
//!   checkpoints
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kpikb_core::MemoryGraph;
//! use kpikb_storage::{RetentionPolicy, SnapshotStore};
//!
//! let mut snapshots = SnapshotStore::open("data/backups", "data/revision.cfg", RetentionPolicy::default())?;
//! let revision = snapshots.save(&MemoryGraph::new())?;
//! ```

pub mod retention;
pub mod snapshot;

pub use retention::RetentionPolicy;
pub use snapshot::{RevisionCounter, SnapshotStore};
