//! Candidate generation, evaluation, and priority ranking.
//!
//! The matcher shrinks the rule set through the index, evaluates each
//! surviving candidate, and ranks the matches. It is a pure, synchronous,
//! CPU-bound computation over one pinned store snapshot: independent
//! records can be matched fully in parallel with no shared mutable state,
//! and repeated calls with the same store and record yield identical
//! ordered results.
//!
//! A single candidate whose condition faults is logged with its rule id and
//! treated as a non-match; it never aborts the rest of the batch, so every
//! well-formed record yields a result (possibly empty).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::chart::record::ChartRecord;
use crate::engine::eval::{Evaluator, Fact};
use crate::engine::store::RuleStore;

/// One matched rule, annotated with the facts its evaluation consulted.
#[derive(Debug, Clone, Serialize)]
pub struct MatchEntry {
    pub rule_id: Arc<str>,
    pub rule_type: Arc<str>,
    pub priority: i32,
    pub content: Value,
    pub facts: Vec<Fact>,
}

/// Ordered match output: priority descending, ties in load order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchResult {
    pub entries: Vec<MatchEntry>,
}

impl MatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchEntry> {
        self.entries.iter()
    }

    /// Ids in result order, handy for assertions and logs.
    pub fn rule_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| &*e.rule_id).collect()
    }
}

impl RuleStore {
    /// Matches a record against this snapshot.
    ///
    /// 1. Candidate set: union of index buckets probed by the record's
    ///    facet values, the fallback bucket, and the type buckets of any
    ///    requested types.
    /// 2. Deduplicate by rule slot (a rule may sit under several keys).
    /// 3. Drop candidates outside the type filter, if one was given.
    /// 4. Evaluate the rest; faults are isolated per rule.
    /// 5. Stable-sort by priority descending; candidates are visited in
    ///    load order, so ties preserve it.
    pub fn match_record(
        &self,
        record: &ChartRecord,
        type_filter: Option<&[&str]>,
    ) -> MatchResult {
        let candidates = self.index().candidates(record, type_filter, self.len());
        let evaluator = Evaluator::new(record, self.tables());

        let mut entries = Vec::new();
        for slot in &candidates {
            let rule = &self.rules()[*slot as usize];
            if let Some(types) = type_filter {
                if !types.iter().any(|t| *t == &*rule.rule_type) {
                    continue;
                }
            }
            let mut facts = Vec::new();
            match evaluator.eval(&rule.condition, &mut facts) {
                Ok(true) => entries.push(MatchEntry {
                    rule_id: rule.id.clone(),
                    rule_type: rule.rule_type.clone(),
                    priority: rule.priority,
                    content: rule.content.clone(),
                    facts,
                }),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(rule_id = %rule.id, error = %err, "rule evaluation faulted");
                }
            }
        }

        #[cfg(debug_assertions)]
        self.assert_candidates_sound(record, &candidates);

        entries.sort_by_key(|e| std::cmp::Reverse(e.priority));
        MatchResult { entries }
    }

    /// Debug-build realization of the index soundness invariant: no rule
    /// outside the candidate set may evaluate true for this record. In
    /// release builds the equivalent protection is the degraded full-scan
    /// mode the index enters when build accounting fails.
    #[cfg(debug_assertions)]
    fn assert_candidates_sound(&self, record: &ChartRecord, candidates: &[u32]) {
        let evaluator = Evaluator::new(record, self.tables());
        let mut next = candidates.iter().peekable();
        for (slot, rule) in self.rules().iter().enumerate() {
            if next.peek().is_some_and(|&&c| c as usize == slot) {
                next.next();
                continue;
            }
            debug_assert!(
                !evaluator.matches(&rule.condition),
                "index unsoundness: rule {} matches but was not a candidate",
                rule.id
            );
        }
    }
}

/// Matches a batch of independent records in parallel.
///
/// All records are matched against the same pinned snapshot, so a
/// concurrent reload cannot split the batch across rule-set versions.
#[cfg(feature = "parallel")]
pub fn match_batch(
    store: &Arc<RuleStore>,
    records: &[ChartRecord],
    type_filter: Option<&[&str]>,
) -> Vec<MatchResult> {
    use rayon::prelude::*;
    records
        .par_iter()
        .map(|record| store.match_record(record, type_filter))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::record::{Pillar, SlotRef};
    use crate::chart::relations::RelationTables;
    use crate::chart::symbols::{Branch, Stem};
    use crate::engine::condition::{Bounds, Condition, Predicate};
    use crate::engine::store::RawRule;

    fn raw(id: &str, priority: i32, cond: Condition) -> RawRule {
        RawRule {
            id: id.into(),
            rule_type: "general".into(),
            priority,
            condition: Some(cond),
            content: Value::Null,
            enabled: true,
        }
    }

    fn record() -> ChartRecord {
        ChartRecord::new([
            Pillar::new(Stem::Jia, Branch::Zi),
            Pillar::new(Stem::Bing, Branch::Yin),
            Pillar::new(Stem::Geng, Branch::Wu),
            Pillar::new(Stem::Gui, Branch::Hai),
        ])
    }

    fn store(rules: Vec<RawRule>) -> RuleStore {
        RuleStore::load(rules, Arc::new(RelationTables::new()))
    }

    #[test]
    fn priority_orders_and_ties_keep_load_order() {
        let hit: Condition = Predicate::DayMasterIs { stem: Stem::Geng }.into();
        let s = store(vec![
            raw("low", 1, hit.clone()),
            raw("tie_a", 5, hit.clone()),
            raw("tie_b", 5, hit.clone()),
            raw("high", 9, hit),
        ]);
        let result = s.match_record(&record(), None);
        assert_eq!(result.rule_ids(), vec!["high", "tie_a", "tie_b", "low"]);
    }

    #[test]
    fn faulting_rule_does_not_abort_batch() {
        let s = store(vec![
            raw(
                "faulty",
                10,
                Predicate::CounterBound { name: "wood".into(), bounds: Bounds::default() }.into(),
            ),
            raw("fine", 1, Predicate::DayMasterIs { stem: Stem::Geng }.into()),
        ]);
        let result = s.match_record(&record(), None);
        assert_eq!(result.rule_ids(), vec!["fine"]);
    }

    #[test]
    fn type_filter_drops_other_types() {
        let hit: Condition = Predicate::DayMasterIs { stem: Stem::Geng }.into();
        let mut career = raw("career_rule", 5, hit.clone());
        career.rule_type = "career".into();
        let s = store(vec![career, raw("general_rule", 9, hit)]);

        let result = s.match_record(&record(), Some(&["career"]));
        assert_eq!(result.rule_ids(), vec!["career_rule"]);
    }

    #[test]
    fn type_filter_reaches_unindexable_rules() {
        // AnyOf top level: no literal index entry, fallback only. The type
        // union must still surface it under a filter.
        let mut r = raw(
            "love_anyof",
            1,
            Condition::any([Predicate::DayMasterIs { stem: Stem::Geng }.into()]),
        );
        r.rule_type = "love".into();
        let s = store(vec![r]);
        let result = s.match_record(&record(), Some(&["love"]));
        assert_eq!(result.rule_ids(), vec!["love_anyof"]);
    }

    #[test]
    fn match_entries_carry_fact_traces() {
        let s = store(vec![raw(
            "traced",
            1,
            Predicate::BranchIs { slot: SlotRef::Hour, branch: Branch::Hai }.into(),
        )]);
        let result = s.match_record(&record(), None);
        assert_eq!(result.len(), 1);
        assert!(!result.entries[0].facts.is_empty());
    }

    #[test]
    fn idempotent_for_same_store_and_record() {
        let s = store(vec![
            raw("a", 3, Predicate::DayMasterIs { stem: Stem::Geng }.into()),
            raw("b", 3, Predicate::StemIs { slot: SlotRef::Year, stem: Stem::Jia }.into()),
        ]);
        let rec = record();
        let first = s.match_record(&rec, None);
        let second = s.match_record(&rec, None);
        assert_eq!(first.rule_ids(), second.rule_ids());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn batch_matches_each_record_independently() {
        let s = Arc::new(store(vec![raw(
            "year_jia",
            1,
            Predicate::StemIs { slot: SlotRef::Year, stem: Stem::Jia }.into(),
        )]));
        let other = ChartRecord::new([
            Pillar::new(Stem::Yi, Branch::Zi),
            Pillar::new(Stem::Bing, Branch::Yin),
            Pillar::new(Stem::Geng, Branch::Wu),
            Pillar::new(Stem::Gui, Branch::Hai),
        ]);
        let results = match_batch(&s, &[record(), other], None);
        assert_eq!(results[0].len(), 1);
        assert_eq!(results[1].len(), 0);
    }
}
