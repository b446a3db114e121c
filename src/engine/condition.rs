//! The condition language attached to rules.
//!
//! A condition is a finite tree of three combinators over a closed leaf
//! vocabulary. The leaf set is a single exhaustively-matched sum type: a
//! leaf kind the evaluator does not handle cannot be constructed, so the
//! "no branch matched, silently false" failure mode does not exist here.
//!
//! Conditions arrive pre-parsed from the rule storage collaborator; this
//! crate never deserializes them from any textual rule syntax, but the whole
//! tree derives serde so structured transports can carry it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chart::record::SlotRef;
use crate::chart::relations::{BranchRelation, StemRelation};
use crate::chart::symbols::{Branch, Element, Polarity, Season, Stem};

/// Numeric threshold constraints on a count.
///
/// `eq`, `min` and `max` may all be supplied and are evaluated as a
/// conjunction, except that a present `eq` takes precedence and `min`/`max`
/// are ignored. A bounds with nothing set admits nothing it can decide and
/// is reported as an evaluation fault rather than vacuous truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl Bounds {
    pub fn exactly(n: u32) -> Self {
        Self {
            eq: Some(n),
            ..Self::default()
        }
    }

    pub fn at_least(n: u32) -> Self {
        Self {
            min: Some(n),
            ..Self::default()
        }
    }

    pub fn at_most(n: u32) -> Self {
        Self {
            max: Some(n),
            ..Self::default()
        }
    }

    pub fn between(min: u32, max: u32) -> Self {
        Self {
            eq: None,
            min: Some(min),
            max: Some(max),
        }
    }

    /// True when no constraint is set at all.
    pub fn is_vacant(&self) -> bool {
        self.eq.is_none() && self.min.is_none() && self.max.is_none()
    }

    /// Whether `n` satisfies the constraints. `eq` wins over `min`/`max`.
    pub fn admits(&self, n: u32) -> bool {
        if let Some(eq) = self.eq {
            return n == eq;
        }
        self.min.map_or(true, |m| n >= m) && self.max.map_or(true, |m| n <= m)
    }
}

/// A named group of symbol literals for cross-aggregate counting leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolGroup {
    Stems(Vec<Stem>),
    Branches(Vec<Branch>),
    Stars(Vec<Arc<str>>),
}

impl SymbolGroup {
    pub fn is_empty(&self) -> bool {
        match self {
            SymbolGroup::Stems(v) => v.is_empty(),
            SymbolGroup::Branches(v) => v.is_empty(),
            SymbolGroup::Stars(v) => v.is_empty(),
        }
    }
}

/// One terminal predicate of the condition language.
///
/// Scoped counting leaves take a `scope` list of slots; an empty scope means
/// the four fixed pillars. The two cross-aggregate leaves carry distinct
/// semantics and are never conflated: [`Predicate::GroupTotalAtLeast`] sums
/// occurrences across the whole group, [`Predicate::GroupEachAtLeast`]
/// requires every group member to individually meet the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    // --- equality / membership -------------------------------------------
    StemIs { slot: SlotRef, stem: Stem },
    StemIn { slot: SlotRef, stems: Vec<Stem> },
    BranchIs { slot: SlotRef, branch: Branch },
    BranchIn { slot: SlotRef, branches: Vec<Branch> },
    PillarIs { slot: SlotRef, stem: Stem, branch: Branch },
    DayMasterIs { stem: Stem },
    DayMasterIn { stems: Vec<Stem> },
    StemAnywhere { stem: Stem },
    BranchAnywhere { branch: Branch },
    HasStar { slot: SlotRef, star: Arc<str> },
    StarAnywhere { star: Arc<str> },
    HiddenStemAt { slot: SlotRef, stem: Stem },
    HiddenStemAnywhere { stem: Stem },
    ElementAt { slot: SlotRef, element: Element },
    BranchElementAt { slot: SlotRef, element: Element },
    DayMasterElementIs { element: Element },
    PolarityAt { slot: SlotRef, polarity: Polarity },
    SeasonIs { season: Season },
    HasTag { tag: String },

    // --- counting / threshold --------------------------------------------
    StemCount { stems: Vec<Stem>, scope: Vec<SlotRef>, bounds: Bounds },
    BranchCount { branches: Vec<Branch>, scope: Vec<SlotRef>, bounds: Bounds },
    StarCount { stars: Vec<Arc<str>>, scope: Vec<SlotRef>, bounds: Bounds },
    HiddenStemCount { stems: Vec<Stem>, scope: Vec<SlotRef>, bounds: Bounds },
    /// Stem and branch elements counted together across the fixed pillars.
    ElementCount { element: Element, bounds: Bounds },
    /// Named counter from the record's statistics section.
    CounterBound { name: String, bounds: Bounds },

    // --- pairwise relation ------------------------------------------------
    StemsRelated { a: SlotRef, b: SlotRef, relation: StemRelation },
    BranchesRelated { a: SlotRef, b: SlotRef, relation: BranchRelation },
    BranchRelatesTo { slot: SlotRef, branch: Branch, relation: BranchRelation },
    AnyBranchPairRelated { relation: BranchRelation, scope: Vec<SlotRef> },
    /// Precomputed relation result from the record's relationships section.
    RelationFact { name: String },

    // --- positional / sequence -------------------------------------------
    SlotsAdjacent { a: SlotRef, b: SlotRef },
    SameStem { a: SlotRef, b: SlotRef },
    SameBranch { a: SlotRef, b: SlotRef },
    /// `(index(a.stem) + offset) mod 10 == index(b.stem)`.
    StemOffset { a: SlotRef, b: SlotRef, offset: u8 },
    /// `(index(a.branch) + offset) mod 12 == index(b.branch)`.
    BranchOffset { a: SlotRef, b: SlotRef, offset: u8 },

    // --- cross-aggregate counting ----------------------------------------
    /// Sum of occurrences across the group meets the threshold.
    GroupTotalAtLeast { group: SymbolGroup, min: u32 },
    /// Every value in the group individually meets the threshold.
    GroupEachAtLeast { group: SymbolGroup, min: u32 },
}

/// A rule's condition tree: three combinators over [`Predicate`] leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// True iff all children are true; vacuously true when empty.
    AllOf(Vec<Condition>),
    /// True iff any child is true; false when empty.
    AnyOf(Vec<Condition>),
    Not(Box<Condition>),
    Leaf(Predicate),
}

impl Condition {
    pub fn all(children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::AllOf(children.into_iter().collect())
    }

    pub fn any(children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::AnyOf(children.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Condition) -> Self {
        Condition::Not(Box::new(child))
    }
}

impl From<Predicate> for Condition {
    fn from(p: Predicate) -> Self {
        Condition::Leaf(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_eq_takes_precedence() {
        let b = Bounds {
            eq: Some(2),
            min: Some(5),
            max: Some(0),
        };
        assert!(b.admits(2));
        assert!(!b.admits(5));
    }

    #[test]
    fn bounds_min_max_conjunction() {
        let b = Bounds::between(2, 3);
        assert!(!b.admits(1));
        assert!(b.admits(2));
        assert!(b.admits(3));
        assert!(!b.admits(4));
    }

    #[test]
    fn vacant_bounds_detected() {
        assert!(Bounds::default().is_vacant());
        assert!(!Bounds::at_least(1).is_vacant());
    }

    #[test]
    fn condition_trees_serde_roundtrip() {
        let cond = Condition::all([
            Condition::from(Predicate::DayMasterIs { stem: Stem::Jia }),
            Condition::not(Condition::from(Predicate::SeasonIs {
                season: Season::Winter,
            })),
        ]);
        let json = serde_json::to_string(&cond).unwrap();
        let back: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cond);
    }
}
