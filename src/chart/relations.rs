//! Static pairwise relation tables between chart symbols.
//!
//! The tables are an external dependency: the engine consumes them, it never
//! ships its own. Callers build a [`RelationTables`] from whichever school's
//! entries they use and hand it to the store at load time.
//!
//! Most relation kinds are undirected (a clash between Zi and Wu is the same
//! fact written either way), and the lookup methods probe both orders for
//! those. Punishment is directed: `(Yin, Si)` punishing does not
//! imply `(Si, Yin)` punishing, so directed kinds are probed exactly as
//! written and never mirrored.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::chart::symbols::{Branch, Stem};

/// Pairwise relation kinds between stems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StemRelation {
    /// The five-combine pairing.
    Combine,
    /// Direct elemental clash.
    Clash,
}

impl StemRelation {
    pub fn is_directed(self) -> bool {
        false
    }
}

/// Pairwise relation kinds between branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchRelation {
    /// Six-combine pairing.
    SixCombine,
    /// Half of a three-combine frame.
    HalfCombine,
    Clash,
    Harm,
    /// Punishment; the only directed kind.
    Punishment,
    Destruction,
}

impl BranchRelation {
    pub fn is_directed(self) -> bool {
        matches!(self, BranchRelation::Punishment)
    }
}

type StemKinds = SmallVec<[StemRelation; 2]>;
type BranchKinds = SmallVec<[BranchRelation; 2]>;

/// Lookup tables for pairwise symbol relations, built once by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationTables {
    stems: FxHashMap<(Stem, Stem), StemKinds>,
    branches: FxHashMap<(Branch, Branch), BranchKinds>,
}

impl RelationTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds tables from raw entries. Entries are stored exactly as given;
    /// undirected probing is the reader's concern, not the builder's.
    pub fn from_entries(
        stems: impl IntoIterator<Item = (Stem, Stem, StemRelation)>,
        branches: impl IntoIterator<Item = (Branch, Branch, BranchRelation)>,
    ) -> Self {
        let mut tables = Self::new();
        for (a, b, kind) in stems {
            tables.insert_stem(a, b, kind);
        }
        for (a, b, kind) in branches {
            tables.insert_branch(a, b, kind);
        }
        tables
    }

    pub fn insert_stem(&mut self, a: Stem, b: Stem, kind: StemRelation) {
        let kinds = self.stems.entry((a, b)).or_default();
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    pub fn insert_branch(&mut self, a: Branch, b: Branch, kind: BranchRelation) {
        let kinds = self.branches.entry((a, b)).or_default();
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    /// Whether `a` and `b` stand in the given stem relation. Undirected
    /// kinds are probed in both orders.
    pub fn stems_related(&self, a: Stem, b: Stem, kind: StemRelation) -> bool {
        if self.stems.get(&(a, b)).is_some_and(|k| k.contains(&kind)) {
            return true;
        }
        !kind.is_directed() && self.stems.get(&(b, a)).is_some_and(|k| k.contains(&kind))
    }

    /// Whether `a` and `b` stand in the given branch relation. Directed
    /// kinds (punishment) are only probed as written.
    pub fn branches_related(&self, a: Branch, b: Branch, kind: BranchRelation) -> bool {
        if self.branches.get(&(a, b)).is_some_and(|k| k.contains(&kind)) {
            return true;
        }
        !kind.is_directed() && self.branches.get(&(b, a)).is_some_and(|k| k.contains(&kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undirected_kinds_probe_both_orders() {
        let tables = RelationTables::from_entries(
            [(Stem::Jia, Stem::Ji, StemRelation::Combine)],
            [(Branch::Zi, Branch::Wu, BranchRelation::Clash)],
        );
        assert!(tables.stems_related(Stem::Jia, Stem::Ji, StemRelation::Combine));
        assert!(tables.stems_related(Stem::Ji, Stem::Jia, StemRelation::Combine));
        assert!(tables.branches_related(Branch::Wu, Branch::Zi, BranchRelation::Clash));
    }

    #[test]
    fn punishment_is_not_mirrored() {
        let tables = RelationTables::from_entries(
            [],
            [(Branch::Yin, Branch::Si, BranchRelation::Punishment)],
        );
        assert!(tables.branches_related(Branch::Yin, Branch::Si, BranchRelation::Punishment));
        assert!(!tables.branches_related(Branch::Si, Branch::Yin, BranchRelation::Punishment));
    }

    #[test]
    fn duplicate_inserts_collapse() {
        let mut tables = RelationTables::new();
        tables.insert_branch(Branch::Zi, Branch::Chou, BranchRelation::SixCombine);
        tables.insert_branch(Branch::Zi, Branch::Chou, BranchRelation::SixCombine);
        assert_eq!(tables.branches.get(&(Branch::Zi, Branch::Chou)).unwrap().len(), 1);
    }

    #[test]
    fn unknown_pair_is_unrelated() {
        let tables = RelationTables::new();
        assert!(!tables.branches_related(Branch::Zi, Branch::Hai, BranchRelation::Harm));
    }
}
