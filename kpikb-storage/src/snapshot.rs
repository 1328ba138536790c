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

//! Snapshot Store
//!
//! Every mutation of the knowledge base is persisted as a full copy of the
//! graph store, one file per revision (`<dir>/<revision>.json`). A small
//! counter file always holds the next revision to write.

use crate::retention::RetentionPolicy;
use kpikb_core::{GraphStore, KbError, KbResult};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Snapshot file extension
const SNAPSHOT_EXT: &str = "json";

/// Persistent "next revision to write" counter
#[derive(Debug)]
pub struct RevisionCounter {
    path: PathBuf,
    next: u64,
}

impl RevisionCounter {
    /// Read the counter at `path`; a missing file starts at 0
    pub fn open(path: impl AsRef<Path>) -> KbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let next = match fs::read_to_string(&path) {
            Ok(content) => content.trim().parse::<u64>().map_err(|e| {
                KbError::Config(format!("invalid revision counter in {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, next })
    }

    /// Next revision to write
    pub fn next(&self) -> u64 {
        self.next
    }

    /// Persist a new counter value
    pub fn set(&mut self, next: u64) -> KbResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            write!(file, "{}", next)?;
            file.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;
        self.next = next;
        Ok(())
    }
}

/// Revisioned snapshot files with tiered pruning
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    counter: RevisionCounter,
    policy: RetentionPolicy,
}

impl SnapshotStore {
    /// Open the snapshot directory and its revision counter
    pub fn open(
        dir: impl AsRef<Path>,
        counter_path: impl AsRef<Path>,
        policy: RetentionPolicy,
    ) -> KbResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let counter = RevisionCounter::open(counter_path)?;

        debug!(dir = ?dir, next_revision = counter.next(), "Opened snapshot store");

        Ok(Self {
            dir,
            counter,
            policy,
        })
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Revision the next [`SnapshotStore::save`] will write
    pub fn next_revision(&self) -> u64 {
        self.counter.next()
    }

    /// Most recently written revision, if any
    pub fn latest_revision(&self) -> Option<u64> {
        self.counter.next().checked_sub(1)
    }

    /// File path of a revision
    pub fn snapshot_path(&self, revision: u64) -> PathBuf {
        self.dir.join(format!("{}.{}", revision, SNAPSHOT_EXT))
    }

    /// Path of the latest revision's snapshot, if one was written
    pub fn latest_path(&self) -> Option<PathBuf> {
        self.latest_revision().map(|r| self.snapshot_path(r))
    }

    /// Write `graph` as the next revision, advance the counter and prune.
    ///
    /// Returns the written revision. Prune failures are logged and do not
    /// fail the save.
    pub fn save<G: GraphStore>(&mut self, graph: &G) -> KbResult<u64> {
        let revision = self.counter.next();
        let path = self.snapshot_path(revision);

        graph.serialize_to(&path)?;
        self.counter.set(revision + 1)?;

        info!(revision, path = ?path, "Snapshot written");

        self.prune(revision);
        Ok(revision)
    }

    /// Apply the retention policy after `revision` was written
    fn prune(&self, revision: u64) {
        let Some(target) = self.policy.prune_target(revision) else {
            return;
        };

        let path = self.snapshot_path(target);
        match fs::remove_file(&path) {
            Ok(()) => debug!(revision, pruned = target, "Pruned snapshot"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(revision, pruned = target, "Snapshot already absent")
            }
            Err(e) => warn!(revision, pruned = target, "Failed to prune snapshot: {}", e),
        }
    }

    /// Read a retained revision
    pub fn load<G: GraphStore>(&self, revision: u64) -> KbResult<G> {
        let path = self.snapshot_path(revision);
        if !path.exists() {
            return Err(KbError::SnapshotNotFound(revision));
        }
        G::deserialize_from(&path)
    }

    /// Read a retained revision and make it the base of the next save.
    ///
    /// The counter is rewritten to `revision + 1`, so later saves reuse the
    /// numbers after `revision`. Snapshots above `revision` belong to the
    /// abandoned history and are removed.
    pub fn load_revision<G: GraphStore>(&mut self, revision: u64) -> KbResult<G> {
        let graph = self.load(revision)?;
        self.counter.set(revision + 1)?;
        info!(revision, "Loaded snapshot revision");

        self.discard_after(revision)?;
        Ok(graph)
    }

    /// Remove every snapshot newer than `revision`
    fn discard_after(&self, revision: u64) -> KbResult<()> {
        for later in self.revisions()?.into_iter().filter(|r| *r > revision) {
            let path = self.snapshot_path(later);
            match fs::remove_file(&path) {
                Ok(()) => debug!(revision, discarded = later, "Discarded later snapshot"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(
                    revision,
                    discarded = later,
                    "Failed to discard later snapshot: {}",
                    e
                ),
            }
        }
        Ok(())
    }

    /// Revisions currently on disk, ascending
    pub fn revisions(&self) -> KbResult<Vec<u64>> {
        let mut revisions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == SNAPSHOT_EXT).unwrap_or(false) {
                if let Some(revision) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    revisions.push(revision);
                }
            }
        }
        revisions.sort_unstable();
        Ok(revisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpikb_core::{EntityId, MemoryGraph};
    use tempfile::tempdir;

    fn open(dir: &Path) -> SnapshotStore {
        SnapshotStore::open(
            dir.join("backups"),
            dir.join("revision.cfg"),
            RetentionPolicy::new(8, 3, 2),
        )
        .unwrap()
    }

    #[test]
    fn test_counter_missing_starts_at_zero() {
        let dir = tempdir().unwrap();
        let counter = RevisionCounter::open(dir.path().join("revision.cfg")).unwrap();
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_counter_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("revision.cfg");

        let mut counter = RevisionCounter::open(&path).unwrap();
        counter.set(17).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "17");
        assert_eq!(RevisionCounter::open(&path).unwrap().next(), 17);
    }

    #[test]
    fn test_counter_garbage_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("revision.cfg");
        std::fs::write(&path, "seven").unwrap();

        assert!(matches!(RevisionCounter::open(&path), Err(KbError::Config(_))));
    }

    #[test]
    fn test_save_numbers_revisions() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let graph = MemoryGraph::new();

        assert_eq!(store.latest_revision(), None);
        assert_eq!(store.save(&graph).unwrap(), 0);
        assert_eq!(store.save(&graph).unwrap(), 1);
        assert_eq!(store.next_revision(), 2);
        assert_eq!(store.latest_path(), Some(store.snapshot_path(1)));
    }

    #[test]
    fn test_load_missing_revision() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        assert!(matches!(
            store.load::<MemoryGraph>(5),
            Err(KbError::SnapshotNotFound(5))
        ));
    }

    #[test]
    fn test_load_revision_rewrites_counter() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let mut graph = MemoryGraph::new();

        store.save(&graph).unwrap();
        graph
            .create_class(EntityId::new("kpi"), "kpi", None)
            .unwrap();
        store.save(&graph).unwrap();
        store.save(&graph).unwrap();

        let restored: MemoryGraph = store.load_revision(0).unwrap();
        assert!(restored.is_empty());
        assert_eq!(store.next_revision(), 1);

        let reopened = open(dir.path());
        assert_eq!(reopened.next_revision(), 1);
    }

    #[test]
    fn test_load_revision_discards_later_snapshots() {
        let dir = tempdir().unwrap();
        let mut store = open(dir.path());
        let graph = MemoryGraph::new();

        for _ in 0..4 {
            store.save(&graph).unwrap();
        }
        assert_eq!(store.revisions().unwrap(), vec![0, 1, 2, 3]);

        let _: MemoryGraph = store.load_revision(1).unwrap();
        assert_eq!(store.revisions().unwrap(), vec![0, 1]);
        assert!(!store.snapshot_path(3).exists());

        assert_eq!(store.save(&graph).unwrap(), 2);
        assert_eq!(store.revisions().unwrap(), vec![0, 1, 2]);
    }
}
