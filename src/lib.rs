//! # Mingpan - Natal-Chart Rule Matching Engine
//!
//! Mingpan determines which entries of a large rule set apply to a given
//! natal-chart record, efficiently and deterministically, ranking matches
//! by priority for downstream content rendering.
//!
//! ## Architecture
//!
//! The crate is organized into two modules:
//!
//! - **chart**: the consumed data model — symbol alphabets, the immutable
//!   [`ChartRecord`] produced per query by an external chart-computation
//!   collaborator, and the static [`RelationTables`] it probes
//! - **engine**: the matching engine — condition language, evaluator,
//!   literal index, immutable store snapshots, and the matcher
//!
//! Chart computation, rule persistence, rule-text parsing, and transport
//! are external collaborators, not part of this crate.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use mingpan::{
//!     Branch, ChartRecord, Pillar, Predicate, RawRule, RelationTables, RuleEngine, Stem,
//! };
//!
//! let rules = vec![RawRule {
//!     id: "day_master_jia".into(),
//!     rule_type: "general".into(),
//!     priority: 10,
//!     condition: Some(Predicate::DayMasterIs { stem: Stem::Jia }.into()),
//!     content: serde_json::json!({ "text": "..." }),
//!     enabled: true,
//! }];
//! let engine = RuleEngine::load(rules, Arc::new(RelationTables::new()));
//!
//! let record = ChartRecord::new([
//!     Pillar::new(Stem::Bing, Branch::Yin),
//!     Pillar::new(Stem::Ding, Branch::Mao),
//!     Pillar::new(Stem::Jia, Branch::Zi),
//!     Pillar::new(Stem::Geng, Branch::Wu),
//! ]);
//! let result = engine.match_record(&record, None);
//! assert_eq!(result.rule_ids(), vec!["day_master_jia"]);
//! ```

#![forbid(unsafe_code)]

pub mod chart;
pub mod engine;

// Re-export commonly used types
pub use chart::record::{ChartRecord, Pillar, SlotRef};
pub use chart::relations::{BranchRelation, RelationTables, StemRelation};
pub use chart::symbols::{Branch, Element, Polarity, Season, Stem};
pub use engine::condition::{Bounds, Condition, Predicate, SymbolGroup};
pub use engine::errors::EvalError;
pub use engine::eval::{Evaluator, Fact};
#[cfg(feature = "parallel")]
pub use engine::matcher::match_batch;
pub use engine::matcher::{MatchEntry, MatchResult};
pub use engine::store::{RawRule, Rule, RuleEngine, RuleStore};
