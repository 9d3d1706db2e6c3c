use rustc_hash::FxHashMap;

use crate::types::{Address, BlockNumber};

/// How far back an explicit report is allowed to backfill implicit cells.
/// Bounds the cost of a single update regardless of how stale the reporter's
/// previous sighting was; anything older than this is simply left absent
/// from the matrix (it will be evicted once it falls below `best_finalized`
/// anyway).
const MAX_IMPLICIT_BACKFILL: BlockNumber = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Prevote,
    Precommit,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRecord {
    pub kind: VoteKind,
    /// `Some(at)` when this cell is an inference carried forward from a
    /// later explicit report at height `at`, rather than a direct report
    /// for this height.
    pub implicit: Option<BlockNumber>,
}

impl VoteRecord {
    fn explicit(kind: VoteKind) -> Self {
        VoteRecord {
            kind,
            implicit: None,
        }
    }

    fn implicit(kind: VoteKind, at: BlockNumber) -> Self {
        VoteRecord {
            kind,
            implicit: Some(at),
        }
    }
}

/// Sparse voter×voter matrix of GRANDPA observations, keyed by block height.
/// Row = reporting node's own validator address, column = the voter the
/// report concerns (the reporter itself, on the diagonal, for finality).
#[derive(Default)]
pub struct ConsensusMatrix {
    rows: FxHashMap<BlockNumber, FxHashMap<Address, FxHashMap<Address, VoteRecord>>>,
    /// Highest height at which `(reporter, voter)` has an explicit record,
    /// used to backfill implicit cells on the next later report.
    last_explicit: FxHashMap<(Address, Address), BlockNumber>,
}

impl ConsensusMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an explicit prevote/precommit observation by `reporter` about
    /// `voter` at `height`, backfilling implicit cells for any heights
    /// between the reporter's previous sighting of this voter and this one.
    pub fn record_vote(
        &mut self,
        reporter: &Address,
        voter: &Address,
        height: BlockNumber,
        kind: VoteKind,
    ) {
        debug_assert_ne!(kind, VoteKind::Finalized, "use record_finalized instead");

        self.backfill(reporter, voter, height, kind);

        self.rows
            .entry(height)
            .or_default()
            .entry(reporter.clone())
            .or_default()
            .insert(voter.clone(), VoteRecord::explicit(kind));

        self.last_explicit
            .insert((reporter.clone(), voter.clone()), height);
    }

    /// Records that `reporter` finalized `height`; the diagonal cell
    /// `(reporter, reporter)` becomes explicit `Finalized`, and intermediate
    /// heights get implicit-finalized cells.
    pub fn record_finalized(&mut self, reporter: &Address, height: BlockNumber) {
        self.backfill(reporter, reporter, height, VoteKind::Finalized);

        self.rows
            .entry(height)
            .or_default()
            .entry(reporter.clone())
            .or_default()
            .insert(reporter.clone(), VoteRecord::explicit(VoteKind::Finalized));

        self.last_explicit
            .insert((reporter.clone(), reporter.clone()), height);
    }

    fn backfill(
        &mut self,
        reporter: &Address,
        voter: &Address,
        height: BlockNumber,
        kind: VoteKind,
    ) {
        let key = (reporter.clone(), voter.clone());
        let previous = self.last_explicit.get(&key).copied().unwrap_or(0);

        if previous >= height {
            return;
        }

        let start = height.saturating_sub(MAX_IMPLICIT_BACKFILL).max(previous + 1);

        for h in start..height {
            self.rows
                .entry(h)
                .or_default()
                .entry(reporter.clone())
                .or_default()
                .entry(voter.clone())
                .or_insert_with(|| VoteRecord::implicit(kind, height));
        }
    }

    /// Drops every row below `floor`; called whenever `best_finalized`
    /// advances so the matrix doesn't grow unboundedly.
    pub fn evict_below(&mut self, floor: BlockNumber) {
        self.rows.retain(|&height, _| height >= floor);
    }

    #[cfg(test)]
    pub fn get(&self, height: BlockNumber, reporter: &Address, voter: &Address) -> Option<&VoteRecord> {
        self.rows.get(&height)?.get(reporter)?.get(voter)
    }

    #[cfg(test)]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.into()
    }

    #[test]
    fn explicit_vote_is_recorded() {
        let mut matrix = ConsensusMatrix::new();
        matrix.record_vote(&addr("A"), &addr("B"), 10, VoteKind::Prevote);

        let record = matrix.get(10, &addr("A"), &addr("B")).unwrap();
        assert_eq!(record.kind, VoteKind::Prevote);
        assert!(record.implicit.is_none());
    }

    #[test]
    fn later_report_backfills_implicit_cells() {
        let mut matrix = ConsensusMatrix::new();
        matrix.record_vote(&addr("A"), &addr("B"), 10, VoteKind::Precommit);
        matrix.record_vote(&addr("A"), &addr("B"), 13, VoteKind::Precommit);

        for h in 11..13 {
            let record = matrix.get(h, &addr("A"), &addr("B")).unwrap();
            assert_eq!(record.implicit, Some(13));
        }
    }

    #[test]
    fn finalized_sets_diagonal() {
        let mut matrix = ConsensusMatrix::new();
        matrix.record_finalized(&addr("A"), 5);

        let record = matrix.get(5, &addr("A"), &addr("A")).unwrap();
        assert_eq!(record.kind, VoteKind::Finalized);
    }

    #[test]
    fn eviction_drops_old_rows() {
        let mut matrix = ConsensusMatrix::new();
        matrix.record_vote(&addr("A"), &addr("B"), 1, VoteKind::Prevote);
        matrix.record_vote(&addr("A"), &addr("B"), 100, VoteKind::Prevote);

        matrix.evict_below(50);

        assert!(matrix.get(1, &addr("A"), &addr("B")).is_none());
        assert!(matrix.get(100, &addr("A"), &addr("B")).is_some());
    }
}
