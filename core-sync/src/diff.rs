//! Positional row diff against the last committed snapshot.

use crate::fingerprint::{fingerprint_table, SheetFingerprints};
use bridge_traits::table::{RowIndex, Table};

/// Result of comparing a sheet's current rows with its snapshot.
///
/// `added`, `changed` and `removed` are disjoint and sorted ascending.
/// `current` holds the fingerprints that become the new snapshot once the
/// changes are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowDiff {
    pub added: Vec<RowIndex>,
    pub changed: Vec<RowIndex>,
    pub removed: Vec<RowIndex>,
    pub current: SheetFingerprints,
}

impl RowDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Indices whose rows must be upserted, ascending.
    pub fn upsert_indices(&self) -> Vec<RowIndex> {
        let mut indices: Vec<RowIndex> = self.added.iter().chain(&self.changed).copied().collect();
        indices.sort_unstable();
        indices
    }
}

/// Compare two fingerprint maps.
pub fn diff_fingerprints(previous: &SheetFingerprints, current: SheetFingerprints) -> RowDiff {
    let mut added = Vec::new();
    let mut changed = Vec::new();

    for (index, digest) in &current {
        match previous.get(index) {
            None => added.push(*index),
            Some(old) if old != digest => changed.push(*index),
            Some(_) => {}
        }
    }

    let removed = previous
        .keys()
        .filter(|index| !current.contains_key(*index))
        .copied()
        .collect();

    RowDiff {
        added,
        changed,
        removed,
        current,
    }
}

/// Fingerprint `table` and compare it with `previous`.
pub fn diff_table(previous: &SheetFingerprints, table: &Table) -> RowDiff {
    diff_fingerprints(previous, fingerprint_table(table))
}
