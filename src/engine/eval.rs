//! The condition evaluator.
//!
//! A pure, recursive walk of a [`Condition`] tree against one
//! [`ChartRecord`]: no I/O, no shared state, deterministic for a given
//! `(condition, record)` pair. Every leaf kind of the closed [`Predicate`]
//! vocabulary is matched exhaustively, so adding a leaf is a compile-time
//! checked change.
//!
//! ## Missing sections
//!
//! A record may legitimately lack the optional luck slots, a named counter,
//! or any given star. A leaf referencing something absent evaluates to
//! `Ok(false)`, never to an error; [`EvalError`] is reserved for payloads
//! that are wrong in themselves (empty aggregate group, vacant bounds).
//!
//! ## Fact trace
//!
//! Evaluation records the atomic record facets it actually consulted into a
//! caller-supplied trace, which the matcher attaches to each matched rule
//! for downstream explanation.

use std::sync::Arc;

use crate::chart::record::{ChartRecord, Pillar, SlotRef};
use crate::chart::relations::{BranchRelation, RelationTables};
use crate::chart::symbols::{Branch, Element, Stem};
use crate::engine::condition::{Bounds, Condition, Predicate, SymbolGroup};
use crate::engine::errors::EvalError;

use serde::Serialize;

/// One atomic record facet consulted during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Fact {
    Stem { slot: SlotRef, stem: Stem },
    Branch { slot: SlotRef, branch: Branch },
    Hidden { slot: SlotRef, stem: Stem },
    Star { slot: SlotRef, star: Arc<str> },
    Counter { name: String, value: u32 },
    Tag { tag: String },
    Relation { name: String },
    /// A referenced slot was absent from the record.
    SlotAbsent { slot: SlotRef },
}

/// Evaluates conditions against one record with one set of relation tables.
///
/// Borrowed state only; construction is free and an evaluator is typically
/// created per match operation.
pub struct Evaluator<'a> {
    record: &'a ChartRecord,
    tables: &'a RelationTables,
}

impl<'a> Evaluator<'a> {
    pub fn new(record: &'a ChartRecord, tables: &'a RelationTables) -> Self {
        Self { record, tables }
    }

    /// Evaluates a condition tree, appending consulted facts to `trace`.
    pub fn eval(&self, cond: &Condition, trace: &mut Vec<Fact>) -> Result<bool, EvalError> {
        match cond {
            // Empty AllOf is vacuously true.
            Condition::AllOf(children) => {
                for c in children {
                    if !self.eval(c, trace)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            // Empty AnyOf never matches.
            Condition::AnyOf(children) => {
                for c in children {
                    if self.eval(c, trace)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(child) => Ok(!self.eval(child, trace)?),
            Condition::Leaf(p) => self.eval_leaf(p, trace),
        }
    }

    /// Convenience entry point: evaluates without a trace, mapping faults to
    /// a non-match. The matcher uses [`Evaluator::eval`] directly so it can
    /// log the fault with the rule id.
    pub fn matches(&self, cond: &Condition) -> bool {
        let mut trace = Vec::new();
        self.eval(cond, &mut trace).unwrap_or(false)
    }

    fn eval_leaf(&self, p: &Predicate, trace: &mut Vec<Fact>) -> Result<bool, EvalError> {
        match p {
            // --- equality / membership -----------------------------------
            Predicate::StemIs { slot, stem } => {
                Ok(self.stem_at(*slot, trace) == Some(*stem))
            }
            Predicate::StemIn { slot, stems } => Ok(self
                .stem_at(*slot, trace)
                .is_some_and(|s| stems.contains(&s))),
            Predicate::BranchIs { slot, branch } => {
                Ok(self.branch_at(*slot, trace) == Some(*branch))
            }
            Predicate::BranchIn { slot, branches } => Ok(self
                .branch_at(*slot, trace)
                .is_some_and(|b| branches.contains(&b))),
            Predicate::PillarIs { slot, stem, branch } => {
                let Some(p) = self.pillar_at(*slot, trace) else {
                    return Ok(false);
                };
                trace.push(Fact::Stem { slot: *slot, stem: p.stem });
                trace.push(Fact::Branch { slot: *slot, branch: p.branch });
                Ok(p.stem == *stem && p.branch == *branch)
            }
            Predicate::DayMasterIs { stem } => {
                Ok(self.stem_at(SlotRef::Day, trace) == Some(*stem))
            }
            Predicate::DayMasterIn { stems } => Ok(self
                .stem_at(SlotRef::Day, trace)
                .is_some_and(|s| stems.contains(&s))),
            Predicate::StemAnywhere { stem } => Ok(SlotRef::FIXED
                .into_iter()
                .any(|slot| self.stem_at(slot, trace) == Some(*stem))),
            Predicate::BranchAnywhere { branch } => Ok(SlotRef::FIXED
                .into_iter()
                .any(|slot| self.branch_at(slot, trace) == Some(*branch))),
            Predicate::HasStar { slot, star } => {
                let Some(p) = self.pillar_at(*slot, trace) else {
                    return Ok(false);
                };
                let hit = p.has_star(star);
                if hit {
                    trace.push(Fact::Star { slot: *slot, star: star.clone() });
                }
                Ok(hit)
            }
            Predicate::StarAnywhere { star } => {
                for (slot, p) in self.record.present_slots() {
                    if p.has_star(star) {
                        trace.push(Fact::Star { slot, star: star.clone() });
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::HiddenStemAt { slot, stem } => {
                let Some(p) = self.pillar_at(*slot, trace) else {
                    return Ok(false);
                };
                let hit = p.hidden.contains(stem);
                if hit {
                    trace.push(Fact::Hidden { slot: *slot, stem: *stem });
                }
                Ok(hit)
            }
            Predicate::HiddenStemAnywhere { stem } => {
                for slot in SlotRef::FIXED {
                    if let Some(p) = self.record.pillar(slot) {
                        if p.hidden.contains(stem) {
                            trace.push(Fact::Hidden { slot, stem: *stem });
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            Predicate::ElementAt { slot, element } => Ok(self
                .stem_at(*slot, trace)
                .is_some_and(|s| s.element() == *element)),
            Predicate::BranchElementAt { slot, element } => Ok(self
                .branch_at(*slot, trace)
                .is_some_and(|b| b.element() == *element)),
            Predicate::DayMasterElementIs { element } => Ok(self
                .stem_at(SlotRef::Day, trace)
                .is_some_and(|s| s.element() == *element)),
            Predicate::PolarityAt { slot, polarity } => Ok(self
                .stem_at(*slot, trace)
                .is_some_and(|s| s.polarity() == *polarity)),
            Predicate::SeasonIs { season } => Ok(self
                .branch_at(SlotRef::Month, trace)
                .is_some_and(|b| b.season() == *season)),
            Predicate::HasTag { tag } => {
                let hit = self.record.has_tag(tag);
                if hit {
                    trace.push(Fact::Tag { tag: tag.clone() });
                }
                Ok(hit)
            }

            // --- counting / threshold ------------------------------------
            Predicate::StemCount { stems, scope, bounds } => {
                check_bounds(bounds)?;
                let n = self.count_in_scope(scope, trace, |slot, p, trace| {
                    if stems.contains(&p.stem) {
                        trace.push(Fact::Stem { slot, stem: p.stem });
                        1
                    } else {
                        0
                    }
                });
                Ok(bounds.admits(n))
            }
            Predicate::BranchCount { branches, scope, bounds } => {
                check_bounds(bounds)?;
                let n = self.count_in_scope(scope, trace, |slot, p, trace| {
                    if branches.contains(&p.branch) {
                        trace.push(Fact::Branch { slot, branch: p.branch });
                        1
                    } else {
                        0
                    }
                });
                Ok(bounds.admits(n))
            }
            Predicate::StarCount { stars, scope, bounds } => {
                check_bounds(bounds)?;
                let n = self.count_in_scope(scope, trace, |slot, p, trace| {
                    let mut hits = 0;
                    for star in &p.stars {
                        if stars.iter().any(|s| s == star) {
                            trace.push(Fact::Star { slot, star: star.clone() });
                            hits += 1;
                        }
                    }
                    hits
                });
                Ok(bounds.admits(n))
            }
            Predicate::HiddenStemCount { stems, scope, bounds } => {
                check_bounds(bounds)?;
                let n = self.count_in_scope(scope, trace, |slot, p, trace| {
                    let mut hits = 0;
                    for stem in &p.hidden {
                        if stems.contains(stem) {
                            trace.push(Fact::Hidden { slot, stem: *stem });
                            hits += 1;
                        }
                    }
                    hits
                });
                Ok(bounds.admits(n))
            }
            Predicate::ElementCount { element, bounds } => {
                check_bounds(bounds)?;
                let mut n = 0;
                for slot in SlotRef::FIXED {
                    // Fixed slots always resolve.
                    if let Some(p) = self.record.pillar(slot) {
                        if p.stem.element() == *element {
                            trace.push(Fact::Stem { slot, stem: p.stem });
                            n += 1;
                        }
                        if p.branch.element() == *element {
                            trace.push(Fact::Branch { slot, branch: p.branch });
                            n += 1;
                        }
                    }
                }
                Ok(bounds.admits(n))
            }
            Predicate::CounterBound { name, bounds } => {
                check_bounds(bounds)?;
                match self.record.stat(name) {
                    Some(value) => {
                        trace.push(Fact::Counter { name: name.clone(), value });
                        Ok(bounds.admits(value))
                    }
                    // Absent counter section: non-match, not an error.
                    None => Ok(false),
                }
            }

            // --- pairwise relation ---------------------------------------
            Predicate::StemsRelated { a, b, relation } => {
                let (Some(sa), Some(sb)) = (self.stem_at(*a, trace), self.stem_at(*b, trace))
                else {
                    return Ok(false);
                };
                Ok(self.tables.stems_related(sa, sb, *relation))
            }
            Predicate::BranchesRelated { a, b, relation } => {
                let (Some(ba), Some(bb)) =
                    (self.branch_at(*a, trace), self.branch_at(*b, trace))
                else {
                    return Ok(false);
                };
                Ok(self.tables.branches_related(ba, bb, *relation))
            }
            Predicate::BranchRelatesTo { slot, branch, relation } => Ok(self
                .branch_at(*slot, trace)
                .is_some_and(|b| self.tables.branches_related(b, *branch, *relation))),
            Predicate::AnyBranchPairRelated { relation, scope } => {
                Ok(self.any_branch_pair_related(*relation, scope, trace))
            }
            Predicate::RelationFact { name } => {
                let hit = self.record.has_relation_fact(name);
                if hit {
                    trace.push(Fact::Relation { name: name.clone() });
                }
                Ok(hit)
            }

            // --- positional / sequence -----------------------------------
            Predicate::SlotsAdjacent { a, b } => {
                // Adjacency is defined over the fixed four-slot sequence only.
                match (a.fixed_index(), b.fixed_index()) {
                    (Some(i), Some(j)) => Ok(i.abs_diff(j) == 1),
                    _ => Ok(false),
                }
            }
            Predicate::SameStem { a, b } => {
                let (Some(sa), Some(sb)) = (self.stem_at(*a, trace), self.stem_at(*b, trace))
                else {
                    return Ok(false);
                };
                Ok(sa == sb)
            }
            Predicate::SameBranch { a, b } => {
                let (Some(ba), Some(bb)) =
                    (self.branch_at(*a, trace), self.branch_at(*b, trace))
                else {
                    return Ok(false);
                };
                Ok(ba == bb)
            }
            // Offsets wrap modulo the alphabet's own cycle, not the slot count.
            Predicate::StemOffset { a, b, offset } => {
                let (Some(sa), Some(sb)) = (self.stem_at(*a, trace), self.stem_at(*b, trace))
                else {
                    return Ok(false);
                };
                Ok((sa.index() + offset % Stem::CYCLE) % Stem::CYCLE == sb.index())
            }
            Predicate::BranchOffset { a, b, offset } => {
                let (Some(ba), Some(bb)) =
                    (self.branch_at(*a, trace), self.branch_at(*b, trace))
                else {
                    return Ok(false);
                };
                Ok((ba.index() + offset % Branch::CYCLE) % Branch::CYCLE == bb.index())
            }

            // --- cross-aggregate counting --------------------------------
            Predicate::GroupTotalAtLeast { group, min } => {
                if group.is_empty() {
                    return Err(EvalError::EmptyGroup);
                }
                Ok(self.group_total(group, trace) >= *min)
            }
            Predicate::GroupEachAtLeast { group, min } => {
                if group.is_empty() {
                    return Err(EvalError::EmptyGroup);
                }
                Ok(self.group_each_meets(group, *min, trace))
            }
        }
    }

    fn pillar_at(&self, slot: SlotRef, trace: &mut Vec<Fact>) -> Option<&Pillar> {
        let p = self.record.pillar(slot);
        if p.is_none() {
            trace.push(Fact::SlotAbsent { slot });
        }
        p
    }

    fn stem_at(&self, slot: SlotRef, trace: &mut Vec<Fact>) -> Option<Stem> {
        let stem = self.pillar_at(slot, trace)?.stem;
        trace.push(Fact::Stem { slot, stem });
        Some(stem)
    }

    fn branch_at(&self, slot: SlotRef, trace: &mut Vec<Fact>) -> Option<Branch> {
        let branch = self.pillar_at(slot, trace)?.branch;
        trace.push(Fact::Branch { slot, branch });
        Some(branch)
    }

    /// Sums a per-pillar count over a scope. An empty scope means the four
    /// fixed pillars; absent optional slots contribute nothing.
    fn count_in_scope<F>(&self, scope: &[SlotRef], trace: &mut Vec<Fact>, mut f: F) -> u32
    where
        F: FnMut(SlotRef, &Pillar, &mut Vec<Fact>) -> u32,
    {
        let slots: &[SlotRef] = if scope.is_empty() { &SlotRef::FIXED } else { scope };
        let mut total = 0;
        for &slot in slots {
            if let Some(p) = self.record.pillar(slot) {
                total += f(slot, p, trace);
            }
        }
        total
    }

    fn any_branch_pair_related(
        &self,
        relation: BranchRelation,
        scope: &[SlotRef],
        trace: &mut Vec<Fact>,
    ) -> bool {
        let slots: &[SlotRef] = if scope.is_empty() { &SlotRef::FIXED } else { scope };
        // Ordered pairs: directed kinds (punishment) are not symmetric.
        for &sa in slots {
            for &sb in slots {
                if sa == sb {
                    continue;
                }
                let (Some(pa), Some(pb)) = (self.record.pillar(sa), self.record.pillar(sb))
                else {
                    continue;
                };
                if self.tables.branches_related(pa.branch, pb.branch, relation) {
                    trace.push(Fact::Branch { slot: sa, branch: pa.branch });
                    trace.push(Fact::Branch { slot: sb, branch: pb.branch });
                    return true;
                }
            }
        }
        false
    }

    fn occurrences_of_stem(&self, stem: Stem, trace: &mut Vec<Fact>) -> u32 {
        self.count_in_scope(&[], trace, |slot, p, trace| {
            if p.stem == stem {
                trace.push(Fact::Stem { slot, stem });
                1
            } else {
                0
            }
        })
    }

    fn occurrences_of_branch(&self, branch: Branch, trace: &mut Vec<Fact>) -> u32 {
        self.count_in_scope(&[], trace, |slot, p, trace| {
            if p.branch == branch {
                trace.push(Fact::Branch { slot, branch });
                1
            } else {
                0
            }
        })
    }

    fn occurrences_of_star(&self, star: &Arc<str>, trace: &mut Vec<Fact>) -> u32 {
        self.count_in_scope(&[], trace, |slot, p, trace| {
            if p.has_star(star) {
                trace.push(Fact::Star { slot, star: star.clone() });
                1
            } else {
                0
            }
        })
    }

    /// Sum-across-the-group semantic of [`Predicate::GroupTotalAtLeast`].
    fn group_total(&self, group: &SymbolGroup, trace: &mut Vec<Fact>) -> u32 {
        match group {
            SymbolGroup::Stems(stems) => stems
                .iter()
                .map(|s| self.occurrences_of_stem(*s, trace))
                .sum(),
            SymbolGroup::Branches(branches) => branches
                .iter()
                .map(|b| self.occurrences_of_branch(*b, trace))
                .sum(),
            SymbolGroup::Stars(stars) => stars
                .iter()
                .map(|s| self.occurrences_of_star(s, trace))
                .sum(),
        }
    }

    /// Every-member semantic of [`Predicate::GroupEachAtLeast`].
    fn group_each_meets(&self, group: &SymbolGroup, min: u32, trace: &mut Vec<Fact>) -> bool {
        match group {
            SymbolGroup::Stems(stems) => stems
                .iter()
                .all(|s| self.occurrences_of_stem(*s, trace) >= min),
            SymbolGroup::Branches(branches) => branches
                .iter()
                .all(|b| self.occurrences_of_branch(*b, trace) >= min),
            SymbolGroup::Stars(stars) => stars
                .iter()
                .all(|s| self.occurrences_of_star(s, trace) >= min),
        }
    }
}

fn check_bounds(bounds: &Bounds) -> Result<(), EvalError> {
    if bounds.is_vacant() {
        Err(EvalError::UnboundedThreshold)
    } else {
        Ok(())
    }
}
