//! The two symbol alphabets of a natal chart and their derived attributes.
//!
//! Stems form a cycle of 10, branches a cycle of 12. Cyclic-offset
//! predicates wrap modulo the alphabet's own size, never the slot count,
//! so each alphabet carries its cycle length as an associated constant.

use serde::{Deserialize, Serialize};

/// One of the ten heavenly stems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stem {
    Jia,
    Yi,
    Bing,
    Ding,
    Wu,
    Ji,
    Geng,
    Xin,
    Ren,
    Gui,
}

/// One of the twelve earthly branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Branch {
    Zi,
    Chou,
    Yin,
    Mao,
    Chen,
    Si,
    Wu,
    Wei,
    Shen,
    You,
    Xu,
    Hai,
}

/// The five elements, derived from either alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    Wood,
    Fire,
    Earth,
    Metal,
    Water,
}

/// Yin/yang polarity of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Yang,
    Yin,
}

/// Season implied by the month branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
    /// The four earth months between seasons (Chen, Wei, Xu, Chou).
    Transition,
}

impl Stem {
    /// Number of symbols in the stem cycle.
    pub const CYCLE: u8 = 10;

    pub const ALL: [Stem; 10] = [
        Stem::Jia,
        Stem::Yi,
        Stem::Bing,
        Stem::Ding,
        Stem::Wu,
        Stem::Ji,
        Stem::Geng,
        Stem::Xin,
        Stem::Ren,
        Stem::Gui,
    ];

    /// Position in the cycle, 0..10.
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(idx: u8) -> Option<Stem> {
        Stem::ALL.get(usize::from(idx)).copied()
    }

    pub fn element(self) -> Element {
        match self {
            Stem::Jia | Stem::Yi => Element::Wood,
            Stem::Bing | Stem::Ding => Element::Fire,
            Stem::Wu | Stem::Ji => Element::Earth,
            Stem::Geng | Stem::Xin => Element::Metal,
            Stem::Ren | Stem::Gui => Element::Water,
        }
    }

    pub fn polarity(self) -> Polarity {
        if self.index() % 2 == 0 {
            Polarity::Yang
        } else {
            Polarity::Yin
        }
    }
}

impl Branch {
    /// Number of symbols in the branch cycle.
    pub const CYCLE: u8 = 12;

    pub const ALL: [Branch; 12] = [
        Branch::Zi,
        Branch::Chou,
        Branch::Yin,
        Branch::Mao,
        Branch::Chen,
        Branch::Si,
        Branch::Wu,
        Branch::Wei,
        Branch::Shen,
        Branch::You,
        Branch::Xu,
        Branch::Hai,
    ];

    /// Position in the cycle, 0..12.
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(idx: u8) -> Option<Branch> {
        Branch::ALL.get(usize::from(idx)).copied()
    }

    pub fn element(self) -> Element {
        match self {
            Branch::Yin | Branch::Mao => Element::Wood,
            Branch::Si | Branch::Wu => Element::Fire,
            Branch::Chen | Branch::Wei | Branch::Xu | Branch::Chou => Element::Earth,
            Branch::Shen | Branch::You => Element::Metal,
            Branch::Hai | Branch::Zi => Element::Water,
        }
    }

    pub fn polarity(self) -> Polarity {
        if self.index() % 2 == 0 {
            Polarity::Yang
        } else {
            Polarity::Yin
        }
    }

    /// Season when this branch governs the month.
    pub fn season(self) -> Season {
        match self {
            Branch::Yin | Branch::Mao => Season::Spring,
            Branch::Si | Branch::Wu => Season::Summer,
            Branch::Shen | Branch::You => Season::Autumn,
            Branch::Hai | Branch::Zi => Season::Winter,
            Branch::Chen | Branch::Wei | Branch::Xu | Branch::Chou => Season::Transition,
        }
    }
}
