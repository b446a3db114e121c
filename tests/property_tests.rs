//! Property tests for index soundness, idempotence and priority ordering.
//!
//! The core invariant: for any record and rule set, index-accelerated
//! matching returns exactly the rules a brute-force scan of the whole set
//! returns. The index may over-approximate candidates, never drop a true
//! positive.

use std::sync::Arc;

use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::Value;

use mingpan::{
    Bounds, Branch, ChartRecord, Condition, Evaluator, Pillar, Predicate, RawRule,
    RelationTables, RuleStore, Season, SlotRef, Stem,
};

const STAR_POOL: [&str; 3] = ["nobleman", "academic", "horse"];
const COUNTER_POOL: [&str; 2] = ["wood", "fire"];

fn any_stem() -> impl Strategy<Value = Stem> {
    prop::sample::select(Stem::ALL.to_vec())
}

fn any_branch() -> impl Strategy<Value = Branch> {
    prop::sample::select(Branch::ALL.to_vec())
}

fn any_slot() -> impl Strategy<Value = SlotRef> {
    prop::sample::select(SlotRef::ALL.to_vec())
}

fn any_star() -> impl Strategy<Value = &'static str> {
    prop::sample::select(STAR_POOL.to_vec())
}

fn any_leaf() -> impl Strategy<Value = Condition> {
    prop_oneof![
        (any_slot(), any_stem()).prop_map(|(slot, stem)| Predicate::StemIs { slot, stem }.into()),
        (any_slot(), any_branch())
            .prop_map(|(slot, branch)| Predicate::BranchIs { slot, branch }.into()),
        (any_slot(), vec(any_stem(), 1..3))
            .prop_map(|(slot, stems)| Predicate::StemIn { slot, stems }.into()),
        any_stem().prop_map(|stem| Predicate::DayMasterIs { stem }.into()),
        any_stem().prop_map(|stem| Predicate::StemAnywhere { stem }.into()),
        (any_slot(), any_star())
            .prop_map(|(slot, star)| Predicate::HasStar { slot, star: star.into() }.into()),
        any_star().prop_map(|star| Predicate::StarAnywhere { star: star.into() }.into()),
        (prop::sample::select(COUNTER_POOL.to_vec()), 0u32..3).prop_map(|(name, min)| {
            Predicate::CounterBound { name: name.into(), bounds: Bounds::at_least(min) }.into()
        }),
        (any_slot(), any_slot(), 0u8..13)
            .prop_map(|(a, b, offset)| Predicate::BranchOffset { a, b, offset }.into()),
        prop::sample::select(vec![
            Season::Spring,
            Season::Summer,
            Season::Autumn,
            Season::Winter,
            Season::Transition,
        ])
        .prop_map(|season| Predicate::SeasonIs { season }.into()),
    ]
}

fn any_condition() -> impl Strategy<Value = Condition> {
    any_leaf().prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..3).prop_map(Condition::all),
            vec(inner.clone(), 0..3).prop_map(Condition::any),
            inner.prop_map(Condition::not),
        ]
    })
}

fn any_pillar() -> impl Strategy<Value = Pillar> {
    (any_stem(), any_branch(), prop::sample::subsequence(STAR_POOL.to_vec(), 0..=2)).prop_map(
        |(stem, branch, stars)| Pillar::new(stem, branch).with_stars(stars),
    )
}

fn any_record() -> impl Strategy<Value = ChartRecord> {
    (
        prop::array::uniform4(any_pillar()),
        prop::option::of(any_pillar()),
        vec(0u32..4, 2),
    )
        .prop_map(|(pillars, decade, counts)| {
            let mut record = ChartRecord::new(pillars)
                .with_stat(COUNTER_POOL[0], counts[0])
                .with_stat(COUNTER_POOL[1], counts[1]);
            if let Some(d) = decade {
                record = record.with_decade(d);
            }
            record
        })
}

fn any_rules() -> impl Strategy<Value = Vec<RawRule>> {
    vec((any_condition(), -10i32..10), 0..12).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (condition, priority))| RawRule {
                id: format!("rule_{i}"),
                rule_type: if i % 2 == 0 { "general" } else { "career" }.into(),
                priority,
                condition: Some(condition),
                content: Value::Null,
                enabled: true,
            })
            .collect()
    })
}

/// Brute-force reference: evaluate every rule, no index involved.
fn full_scan_ids(store: &RuleStore, record: &ChartRecord) -> Vec<String> {
    let evaluator = Evaluator::new(record, store.tables());
    store
        .rules()
        .iter()
        .filter(|r| evaluator.matches(&r.condition))
        .map(|r| r.id.to_string())
        .collect()
}

proptest! {
    #[test]
    fn index_matching_equals_full_scan(rules in any_rules(), record in any_record()) {
        let store = RuleStore::load(rules, Arc::new(RelationTables::new()));
        let mut indexed: Vec<String> =
            store.match_record(&record, None).rule_ids().iter().map(|s| s.to_string()).collect();
        let mut scanned = full_scan_ids(&store, &record);
        indexed.sort();
        scanned.sort();
        prop_assert_eq!(indexed, scanned);
    }

    #[test]
    fn matching_is_idempotent(rules in any_rules(), record in any_record()) {
        let store = RuleStore::load(rules, Arc::new(RelationTables::new()));
        let first = store.match_record(&record, None);
        let second = store.match_record(&record, None);
        prop_assert_eq!(first.rule_ids(), second.rule_ids());
    }

    #[test]
    fn results_are_priority_descending(rules in any_rules(), record in any_record()) {
        let store = RuleStore::load(rules, Arc::new(RelationTables::new()));
        let result = store.match_record(&record, None);
        for pair in result.entries.windows(2) {
            prop_assert!(pair[0].priority >= pair[1].priority);
        }
    }

    #[test]
    fn type_filter_is_a_subset_of_unfiltered(rules in any_rules(), record in any_record()) {
        let store = RuleStore::load(rules, Arc::new(RelationTables::new()));
        let all: Vec<String> =
            store.match_record(&record, None).rule_ids().iter().map(|s| s.to_string()).collect();
        let career = store.match_record(&record, Some(&["career"]));
        for entry in &career.entries {
            prop_assert_eq!(&*entry.rule_type, "career");
            prop_assert!(all.iter().any(|id| id == &*entry.rule_id));
        }
    }

    #[test]
    fn double_negation_is_identity(cond in any_condition(), record in any_record()) {
        let tables = RelationTables::new();
        let evaluator = Evaluator::new(&record, &tables);
        let double = Condition::not(Condition::not(cond.clone()));
        prop_assert_eq!(evaluator.matches(&double), evaluator.matches(&cond));
    }

    #[test]
    fn singleton_combinators_are_transparent(cond in any_condition(), record in any_record()) {
        let tables = RelationTables::new();
        let evaluator = Evaluator::new(&record, &tables);
        let direct = evaluator.matches(&cond);
        prop_assert_eq!(evaluator.matches(&Condition::all([cond.clone()])), direct);
        prop_assert_eq!(evaluator.matches(&Condition::any([cond])), direct);
    }
}
