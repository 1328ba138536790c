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

//! On-disk retention tests for the snapshot store

use kpikb_core::{EntityId, GraphStore, MemoryGraph};
use kpikb_storage::{RetentionPolicy, RevisionCounter, SnapshotStore};
use std::path::Path;
use tempfile::tempdir;

fn open(dir: &Path, policy: RetentionPolicy) -> SnapshotStore {
    SnapshotStore::open(dir.join("backups"), dir.join("revision.cfg"), policy).unwrap()
}

/// Thirty saves starting at revision 1 leave the fine window plus two
/// coarse checkpoints
#[test]
fn test_thirty_saves_from_revision_one() {
    let dir = tempdir().unwrap();
    RevisionCounter::open(dir.path().join("revision.cfg"))
        .unwrap()
        .set(1)
        .unwrap();

    let policy = RetentionPolicy::new(8, 3, 2);
    let mut store = open(dir.path(), policy);
    let graph = MemoryGraph::new();

    for expected in 1..=30 {
        assert_eq!(store.save(&graph).unwrap(), expected);
    }

    let on_disk = store.revisions().unwrap();
    assert_eq!(on_disk, vec![16, 24, 28, 29, 30]);
    assert_eq!(
        on_disk,
        policy.retained(1, 30).into_iter().collect::<Vec<_>>()
    );
    assert_eq!(store.next_revision(), 31);
}

/// Revision 0 is the permanent base snapshot
#[test]
fn test_base_revision_survives() {
    let dir = tempdir().unwrap();
    let mut store = open(dir.path(), RetentionPolicy::new(8, 3, 2));
    let graph = MemoryGraph::new();

    for _ in 0..=40 {
        store.save(&graph).unwrap();
    }

    let on_disk = store.revisions().unwrap();
    assert_eq!(on_disk.first(), Some(&0));
    assert_eq!(on_disk, vec![0, 24, 32, 38, 39, 40]);
}

/// A snapshot deleted out of band does not make later saves fail
#[test]
fn test_missing_prune_target_is_ignored() {
    let dir = tempdir().unwrap();
    let mut store = open(dir.path(), RetentionPolicy::new(8, 3, 2));
    let graph = MemoryGraph::new();

    for _ in 0..4 {
        store.save(&graph).unwrap();
    }
    std::fs::remove_file(store.snapshot_path(1)).unwrap();

    // Revision 4 would prune revision 1
    assert_eq!(store.save(&graph).unwrap(), 4);
    assert_eq!(store.revisions().unwrap(), vec![0, 2, 3, 4]);
}

/// A prune target that cannot be removed is logged and the save still counts
#[test]
fn test_unremovable_prune_target_keeps_save() {
    let dir = tempdir().unwrap();
    let mut store = open(dir.path(), RetentionPolicy::new(8, 3, 2));
    let graph = MemoryGraph::new();

    for _ in 0..4 {
        store.save(&graph).unwrap();
    }
    std::fs::remove_file(store.snapshot_path(1)).unwrap();
    std::fs::create_dir_all(store.snapshot_path(1)).unwrap();

    // Revision 4 prunes revision 1, which is now a directory
    assert_eq!(store.save(&graph).unwrap(), 4);
    assert_eq!(store.next_revision(), 5);
    assert!(store.snapshot_path(4).is_file());
    assert!(store.snapshot_path(1).is_dir());
    assert_eq!(
        RevisionCounter::open(dir.path().join("revision.cfg"))
            .unwrap()
            .next(),
        5
    );
}

/// Reopening the store continues numbering where it left off
#[test]
fn test_reopen_continues_numbering() {
    let dir = tempdir().unwrap();
    let mut graph = MemoryGraph::new();
    graph
        .create_class(EntityId::new("kpi"), "kpi", None)
        .unwrap();

    {
        let mut store = open(dir.path(), RetentionPolicy::default());
        store.save(&graph).unwrap();
        store.save(&graph).unwrap();
    }

    let mut store = open(dir.path(), RetentionPolicy::default());
    assert_eq!(store.latest_revision(), Some(1));

    let loaded: MemoryGraph = store.load(1).unwrap();
    assert_eq!(loaded.find_by_label("kpi").len(), 1);

    assert_eq!(store.save(&loaded).unwrap(), 2);
}
