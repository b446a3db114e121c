//! The subject record one matching query is evaluated against.
//!
//! A [`ChartRecord`] is the immutable fact document produced by the external
//! chart-computation collaborator: four fixed pillars, named counters,
//! precomputed relation facts, free-form tags, and optional luck pillars.
//! It is validated and normalized once here, at its single construction
//! point; the evaluator only ever reads it through the accessors below and
//! never re-interprets its representation.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::chart::symbols::{Branch, Stem};

/// A reference to a record slot: one of the four fixed pillars, or one of
/// the optional luck pillars a record may legitimately lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotRef {
    Year,
    Month,
    Day,
    Hour,
    /// Current decade luck pillar; absent for static chart queries.
    Decade,
    /// Current annual luck pillar; absent for static chart queries.
    Annual,
}

impl SlotRef {
    /// Every slot a record can carry, in deterministic probe order.
    pub const ALL: [SlotRef; 6] = [
        SlotRef::Year,
        SlotRef::Month,
        SlotRef::Day,
        SlotRef::Hour,
        SlotRef::Decade,
        SlotRef::Annual,
    ];

    /// The four fixed slots, in chart order.
    pub const FIXED: [SlotRef; 4] = [SlotRef::Year, SlotRef::Month, SlotRef::Day, SlotRef::Hour];

    /// Index within the fixed four-slot sequence, if this is a fixed slot.
    pub fn fixed_index(self) -> Option<usize> {
        match self {
            SlotRef::Year => Some(0),
            SlotRef::Month => Some(1),
            SlotRef::Day => Some(2),
            SlotRef::Hour => Some(3),
            SlotRef::Decade | SlotRef::Annual => None,
        }
    }
}

/// One pillar: a stem/branch pair plus the derived attributes the chart
/// collaborator computed for it (hidden stems of the branch, star markers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pillar {
    pub stem: Stem,
    pub branch: Branch,
    /// Sub-stems hidden in the branch, as provided by the chart computation.
    #[serde(default)]
    pub hidden: SmallVec<[Stem; 3]>,
    /// Star/marker names attached to this pillar.
    #[serde(default)]
    pub stars: SmallVec<[Arc<str>; 4]>,
}

impl Pillar {
    pub fn new(stem: Stem, branch: Branch) -> Self {
        Self {
            stem,
            branch,
            hidden: SmallVec::new(),
            stars: SmallVec::new(),
        }
    }

    pub fn with_hidden(mut self, hidden: impl IntoIterator<Item = Stem>) -> Self {
        self.hidden = hidden.into_iter().collect();
        self
    }

    pub fn with_stars<I, S>(mut self, stars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.stars = stars.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_star(&self, name: &str) -> bool {
        self.stars.iter().any(|s| &**s == name)
    }

    /// Drops duplicate hidden stems and stars, preserving first occurrence.
    fn normalize(&mut self) {
        let mut seen = SmallVec::<[Stem; 3]>::new();
        self.hidden.retain(|s| {
            if seen.contains(s) {
                false
            } else {
                seen.push(*s);
                true
            }
        });
        let mut names = FxHashSet::default();
        self.stars.retain(|s| names.insert(s.clone()));
    }
}

/// Immutable, normalized subject record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRecord {
    pillars: [Pillar; 4],
    #[serde(default)]
    stats: FxHashMap<String, u32>,
    #[serde(default)]
    relation_facts: FxHashSet<String>,
    #[serde(default)]
    tags: FxHashSet<String>,
    #[serde(default)]
    decade: Option<Pillar>,
    #[serde(default)]
    annual: Option<Pillar>,
}

impl ChartRecord {
    /// Builds a record from the four fixed pillars, normalizing each one.
    pub fn new(mut pillars: [Pillar; 4]) -> Self {
        for p in &mut pillars {
            p.normalize();
        }
        Self {
            pillars,
            stats: FxHashMap::default(),
            relation_facts: FxHashSet::default(),
            tags: FxHashSet::default(),
            decade: None,
            annual: None,
        }
    }

    pub fn with_stat(mut self, name: impl Into<String>, value: u32) -> Self {
        self.stats.insert(name.into(), value);
        self
    }

    pub fn with_relation_fact(mut self, name: impl Into<String>) -> Self {
        self.relation_facts.insert(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_decade(mut self, mut pillar: Pillar) -> Self {
        pillar.normalize();
        self.decade = Some(pillar);
        self
    }

    pub fn with_annual(mut self, mut pillar: Pillar) -> Self {
        pillar.normalize();
        self.annual = Some(pillar);
        self
    }

    /// Resolves a slot reference. Optional slots may be absent; conditions
    /// referencing an absent slot evaluate to a non-match, not an error.
    pub fn pillar(&self, slot: SlotRef) -> Option<&Pillar> {
        match slot {
            SlotRef::Year => Some(&self.pillars[0]),
            SlotRef::Month => Some(&self.pillars[1]),
            SlotRef::Day => Some(&self.pillars[2]),
            SlotRef::Hour => Some(&self.pillars[3]),
            SlotRef::Decade => self.decade.as_ref(),
            SlotRef::Annual => self.annual.as_ref(),
        }
    }

    pub fn fixed_pillars(&self) -> &[Pillar; 4] {
        &self.pillars
    }

    /// Day pillar stem, the anchor symbol of the whole chart.
    pub fn day_master(&self) -> Stem {
        self.pillars[2].stem
    }

    pub fn stat(&self, name: &str) -> Option<u32> {
        self.stats.get(name).copied()
    }

    pub fn has_relation_fact(&self, name: &str) -> bool {
        self.relation_facts.contains(name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Every slot present on this record, in deterministic probe order.
    pub fn present_slots(&self) -> impl Iterator<Item = (SlotRef, &Pillar)> {
        SlotRef::ALL
            .into_iter()
            .filter_map(move |slot| self.pillar(slot).map(|p| (slot, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pillar(stem: Stem, branch: Branch) -> Pillar {
        Pillar::new(stem, branch)
    }

    fn record() -> ChartRecord {
        ChartRecord::new([
            pillar(Stem::Jia, Branch::Zi),
            pillar(Stem::Bing, Branch::Yin),
            pillar(Stem::Geng, Branch::Wu),
            pillar(Stem::Gui, Branch::Hai),
        ])
    }

    #[test]
    fn fixed_slots_always_resolve() {
        let r = record();
        for slot in SlotRef::FIXED {
            assert!(r.pillar(slot).is_some());
        }
    }

    #[test]
    fn optional_slots_absent_by_default() {
        let r = record();
        assert!(r.pillar(SlotRef::Decade).is_none());
        assert!(r.pillar(SlotRef::Annual).is_none());

        let r = r.with_decade(pillar(Stem::Yi, Branch::Chou));
        assert_eq!(r.pillar(SlotRef::Decade).unwrap().stem, Stem::Yi);
    }

    #[test]
    fn day_master_is_day_pillar_stem() {
        assert_eq!(record().day_master(), Stem::Geng);
    }

    #[test]
    fn construction_deduplicates_derived_lists() {
        let p = pillar(Stem::Jia, Branch::Zi)
            .with_stars(["nobleman", "nobleman", "academic"])
            .with_hidden([Stem::Gui, Stem::Gui]);
        let r = ChartRecord::new([
            p,
            pillar(Stem::Bing, Branch::Yin),
            pillar(Stem::Geng, Branch::Wu),
            pillar(Stem::Gui, Branch::Hai),
        ]);
        let year = r.pillar(SlotRef::Year).unwrap();
        assert_eq!(year.stars.len(), 2);
        assert_eq!(year.hidden.len(), 1);
    }

    #[test]
    fn present_slots_orders_fixed_before_luck() {
        let r = record().with_annual(pillar(Stem::Ding, Branch::Mao));
        let slots: Vec<SlotRef> = r.present_slots().map(|(s, _)| s).collect();
        assert_eq!(
            slots,
            vec![
                SlotRef::Year,
                SlotRef::Month,
                SlotRef::Day,
                SlotRef::Hour,
                SlotRef::Annual
            ]
        );
    }
}
