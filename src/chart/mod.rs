//! Chart-side data model: symbol alphabets, the subject record, and the
//! static relation tables the engine consumes.

pub mod record;
pub mod relations;
pub mod symbols;

pub use record::{ChartRecord, Pillar, SlotRef};
pub use relations::{BranchRelation, RelationTables, StemRelation};
pub use symbols::{Branch, Element, Polarity, Season, Stem};
