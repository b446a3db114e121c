//! Rule store snapshots and the swappable engine handle.
//!
//! A [`RuleStore`] is an immutable snapshot: validated rules plus the index
//! built over them, created once per load and never mutated. [`RuleEngine`]
//! is the explicit shared handle — reload builds a complete new store and
//! atomically replaces the `Arc`, so a match holding the previous snapshot
//! keeps seeing fully consistent data with no locking on its read path.
//! There is no module-level registry; lifecycle is create at load, swap at
//! reload, drop at shutdown.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chart::record::ChartRecord;
use crate::chart::relations::RelationTables;
use crate::engine::condition::Condition;
use crate::engine::index::RuleIndex;
use crate::engine::matcher::MatchResult;

fn default_enabled() -> bool {
    true
}

/// A rule entry as delivered by the rule-storage collaborator.
///
/// The condition tree arrives pre-parsed; `condition: None` models an entry
/// whose tree was missing or unusable upstream and is what load-time
/// validation rejects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRule {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub condition: Option<Condition>,
    /// Opaque content payload handed through to the renderer.
    #[serde(default)]
    pub content: Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A validated rule held by a store snapshot.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: Arc<str>,
    pub rule_type: Arc<str>,
    pub priority: i32,
    pub condition: Condition,
    pub content: Value,
}

/// One immutable, indexed snapshot of the rule set.
pub struct RuleStore {
    rules: Vec<Rule>,
    index: RuleIndex,
    tables: Arc<RelationTables>,
}

impl RuleStore {
    /// Validates and indexes a bulk rule load.
    ///
    /// Structurally invalid entries (missing condition, empty id or type
    /// tag) are skipped with a diagnostic and loading continues; one bad
    /// rule never aborts a full load. Disabled entries are dropped here —
    /// a snapshot only ever holds matchable rules.
    pub fn load(raw: impl IntoIterator<Item = RawRule>, tables: Arc<RelationTables>) -> Self {
        let mut rules = Vec::new();
        let mut skipped = 0usize;
        for (position, entry) in raw.into_iter().enumerate() {
            if !entry.enabled {
                tracing::debug!(rule_id = %entry.id, "dropping disabled rule");
                continue;
            }
            let Some(condition) = entry.condition else {
                tracing::warn!(rule_id = %entry.id, position, "skipping rule without condition");
                skipped += 1;
                continue;
            };
            if entry.id.is_empty() || entry.rule_type.is_empty() {
                tracing::warn!(position, "skipping rule without id or type tag");
                skipped += 1;
                continue;
            }
            rules.push(Rule {
                id: Arc::from(entry.id.as_str()),
                rule_type: Arc::from(entry.rule_type.as_str()),
                priority: entry.priority,
                condition,
                content: entry.content,
            });
        }
        let index = RuleIndex::build(&rules);
        tracing::debug!(loaded = rules.len(), skipped, "rule store built");
        Self {
            rules,
            index,
            tables,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn tables(&self) -> &Arc<RelationTables> {
        &self.tables
    }

    pub(crate) fn index(&self) -> &RuleIndex {
        &self.index
    }
}

/// Shared, reloadable access to the current rule store snapshot.
///
/// Readers clone the `Arc` and work against that snapshot for their whole
/// operation; `reload` swaps the reference wholesale. Matches in flight
/// across a reload observe exclusively pre-swap or exclusively post-swap
/// data, never a mixture.
pub struct RuleEngine {
    store: RwLock<Arc<RuleStore>>,
}

impl RuleEngine {
    pub fn new(store: RuleStore) -> Self {
        Self {
            store: RwLock::new(Arc::new(store)),
        }
    }

    pub fn load(raw: impl IntoIterator<Item = RawRule>, tables: Arc<RelationTables>) -> Self {
        Self::new(RuleStore::load(raw, tables))
    }

    /// The current snapshot; holding it pins a consistent rule set.
    pub fn snapshot(&self) -> Arc<RuleStore> {
        self.store.read().clone()
    }

    /// Builds a complete new store from `raw` (keeping the current relation
    /// tables) and atomically swaps it in.
    pub fn reload(&self, raw: impl IntoIterator<Item = RawRule>) {
        let tables = self.snapshot().tables().clone();
        self.reload_with_tables(raw, tables);
    }

    /// Reload variant for when the relation tables changed as well.
    pub fn reload_with_tables(
        &self,
        raw: impl IntoIterator<Item = RawRule>,
        tables: Arc<RelationTables>,
    ) {
        let next = Arc::new(RuleStore::load(raw, tables));
        *self.store.write() = next;
    }

    /// Matches against the current snapshot.
    pub fn match_record(
        &self,
        record: &ChartRecord,
        type_filter: Option<&[&str]>,
    ) -> MatchResult {
        self.snapshot().match_record(record, type_filter)
    }
}
