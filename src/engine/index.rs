//! Literal index over a rule set.
//!
//! For each indexable leaf family, every literal a rule's top-level
//! condition (or a branch under an `AllOf`) could match is turned into an
//! [`IndexKey`] bucket entry. Rules whose top level is `AnyOf`/`Not`, or
//! that use only non-indexed leaf kinds, land in the always-candidate
//! fallback bucket.
//!
//! Soundness invariant: the union of buckets probed by a record's own facet
//! values, plus the fallback bucket, is a superset of the true positive
//! set. The index may over-approximate, never under-approximate. Build-time
//! accounting verifies every rule is reachable through some bucket or the
//! fallback; if that ever fails the index reports itself degraded and the
//! matcher falls back to scanning every rule instead of silently dropping
//! matches.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::chart::record::{ChartRecord, SlotRef};
use crate::chart::symbols::{Branch, Stem};
use crate::engine::condition::{Condition, Predicate};
use crate::engine::store::Rule;

/// One literal key of one indexable leaf family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum IndexKey {
    Stem(SlotRef, Stem),
    Branch(SlotRef, Branch),
    /// Star buckets are keyed by name only; slot-scoped star leaves
    /// over-approximate through them, which is sound.
    Star(Arc<str>),
    Tag(Arc<str>),
}

type Keys = SmallVec<[IndexKey; 4]>;
type Bucket = SmallVec<[u32; 4]>;

/// Literal keys of a single leaf, or `None` if the leaf kind is not indexed.
fn leaf_keys(p: &Predicate) -> Option<Keys> {
    let keys: Keys = match p {
        Predicate::StemIs { slot, stem } => [IndexKey::Stem(*slot, *stem)].into_iter().collect(),
        Predicate::StemIn { slot, stems } => {
            stems.iter().map(|s| IndexKey::Stem(*slot, *s)).collect()
        }
        Predicate::BranchIs { slot, branch } => {
            [IndexKey::Branch(*slot, *branch)].into_iter().collect()
        }
        Predicate::BranchIn { slot, branches } => {
            branches.iter().map(|b| IndexKey::Branch(*slot, *b)).collect()
        }
        // The stem key alone is enough to reach the rule.
        Predicate::PillarIs { slot, stem, .. } => {
            [IndexKey::Stem(*slot, *stem)].into_iter().collect()
        }
        Predicate::DayMasterIs { stem } => {
            [IndexKey::Stem(SlotRef::Day, *stem)].into_iter().collect()
        }
        Predicate::DayMasterIn { stems } => stems
            .iter()
            .map(|s| IndexKey::Stem(SlotRef::Day, *s))
            .collect(),
        // Anywhere-leaves scan the fixed slots, so one key per fixed slot
        // covers every record that can satisfy them.
        Predicate::StemAnywhere { stem } => SlotRef::FIXED
            .into_iter()
            .map(|slot| IndexKey::Stem(slot, *stem))
            .collect(),
        Predicate::BranchAnywhere { branch } => SlotRef::FIXED
            .into_iter()
            .map(|slot| IndexKey::Branch(slot, *branch))
            .collect(),
        Predicate::HasStar { star, .. } | Predicate::StarAnywhere { star } => {
            [IndexKey::Star(star.clone())].into_iter().collect()
        }
        Predicate::HasTag { tag } => [IndexKey::Tag(Arc::from(tag.as_str()))]
            .into_iter()
            .collect(),
        _ => return None,
    };
    Some(keys)
}

/// Extracts the key set a rule is indexed under, or `None` for the fallback
/// bucket.
///
/// Only a top-level leaf and branches under (possibly nested) `AllOf`
/// combinators are considered: any single `AllOf` branch must hold for the
/// whole condition to hold, so indexing under one branch's literals is
/// sound. Among indexable branches the one with the fewest keys is chosen
/// (most selective). An empty key set (e.g. a membership leaf with an empty
/// literal list) means the rule can never match and is equally sound.
pub(crate) fn index_keys(cond: &Condition) -> Option<Keys> {
    match cond {
        Condition::Leaf(p) => leaf_keys(p),
        Condition::AllOf(children) => children
            .iter()
            .filter_map(index_keys)
            .min_by_key(SmallVec::len),
        Condition::AnyOf(_) | Condition::Not(_) => None,
    }
}

/// Every index key a record's own facet values probe.
pub(crate) fn record_keys(record: &ChartRecord) -> Vec<IndexKey> {
    let mut keys = Vec::with_capacity(16);
    for (slot, pillar) in record.present_slots() {
        keys.push(IndexKey::Stem(slot, pillar.stem));
        keys.push(IndexKey::Branch(slot, pillar.branch));
        for star in &pillar.stars {
            keys.push(IndexKey::Star(star.clone()));
        }
    }
    for tag in record.tags() {
        keys.push(IndexKey::Tag(Arc::from(tag)));
    }
    keys
}

/// The built index over one immutable rule snapshot.
#[derive(Debug, Default)]
pub(crate) struct RuleIndex {
    buckets: FxHashMap<IndexKey, Bucket>,
    fallback: Vec<u32>,
    by_type: FxHashMap<Arc<str>, Vec<u32>>,
    /// Set when build accounting found a rule reachable through neither a
    /// bucket nor the fallback; candidates then degrade to a full scan.
    degraded: bool,
}

impl RuleIndex {
    /// Builds the index for a rule snapshot. Rule slots are positions into
    /// the store's rule vector, which is load order.
    pub(crate) fn build(rules: &[Rule]) -> Self {
        let mut index = RuleIndex::default();
        let mut covered = vec![false; rules.len()];

        for (slot, rule) in rules.iter().enumerate() {
            let slot_u32 = slot as u32;
            index
                .by_type
                .entry(rule.rule_type.clone())
                .or_default()
                .push(slot_u32);

            match index_keys(&rule.condition) {
                Some(keys) => {
                    for key in keys {
                        index.buckets.entry(key).or_default().push(slot_u32);
                    }
                    covered[slot] = true;
                }
                None => {
                    index.fallback.push(slot_u32);
                    covered[slot] = true;
                }
            }
        }

        if let Some(missing) = covered.iter().position(|c| !c) {
            tracing::error!(
                rule_id = %rules[missing].id,
                "index build left a rule unreachable; degrading to full scans"
            );
            index.degraded = true;
        }
        index
    }

    pub(crate) fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Rule slots of the given type, in load order.
    pub(crate) fn of_type(&self, rule_type: &str) -> &[u32] {
        self.by_type
            .get(rule_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Candidate rule slots for a record: union of probed buckets, the
    /// fallback bucket, and, when a type filter is supplied, every rule of
    /// the requested types (so type-scoped queries cannot miss a rule that
    /// lacked an indexable literal). Deduplicated, ascending slot order.
    pub(crate) fn candidates(
        &self,
        record: &ChartRecord,
        type_filter: Option<&[&str]>,
        total_rules: usize,
    ) -> Vec<u32> {
        if self.degraded {
            return (0..total_rules as u32).collect();
        }

        let mut out: Vec<u32> = Vec::with_capacity(self.fallback.len() + 16);
        for key in record_keys(record) {
            if let Some(bucket) = self.buckets.get(&key) {
                out.extend_from_slice(bucket);
            }
        }
        out.extend_from_slice(&self.fallback);
        if let Some(types) = type_filter {
            for ty in types {
                out.extend_from_slice(self.of_type(ty));
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}
