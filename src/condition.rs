use crate::test::Test;
use crate::wme::{WmeField, WmeId};

/// The three test slots of a positive or negative condition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CondTests {
    pub id: Test,
    pub attr: Test,
    pub value: Test,
}

impl CondTests {
    pub fn new(id: Test, attr: Test, value: Test) -> Self {
        Self { id, attr, value }
    }

    /// The test at the given slot.
    pub fn slot(&self, field: WmeField) -> &Test {
        match field {
            WmeField::Id => &self.id,
            WmeField::Attr => &self.attr,
            WmeField::Value => &self.value,
        }
    }

    /// Mutable access to the test at the given slot.
    pub fn slot_mut(&mut self, field: WmeField) -> &mut Test {
        match field {
            WmeField::Id => &mut self.id,
            WmeField::Attr => &mut self.attr,
            WmeField::Value => &mut self.value,
        }
    }
}

/// Payload shared by positive and negative conditions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CondData {
    pub tests: CondTests,
    /// Matches an acceptable-preference wme.
    pub acceptable: bool,
    /// The wme this condition matched in the instantiation, if any.
    /// Weak handle; stale after the wme leaves working memory.
    pub wme: Option<WmeId>,
}

/// A node in a condition list.
///
/// Lists are plain vectors; the merge and dedup passes rebuild the
/// vector rather than splicing links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Positive(CondData),
    Negative(CondData),
    /// Conjunctive negation: none of the nested conditions may hold
    /// together.
    Ncc(Vec<Condition>),
}

impl Condition {
    pub fn positive(id: Test, attr: Test, value: Test) -> Self {
        Condition::Positive(CondData {
            tests: CondTests::new(id, attr, value),
            acceptable: false,
            wme: None,
        })
    }

    pub fn negative(id: Test, attr: Test, value: Test) -> Self {
        Condition::Negative(CondData {
            tests: CondTests::new(id, attr, value),
            acceptable: false,
            wme: None,
        })
    }

    /// Record the wme this condition matched (builder style).
    pub fn with_wme(mut self, wme: WmeId) -> Self {
        match &mut self {
            Condition::Positive(data) | Condition::Negative(data) => {
                data.wme = Some(wme);
            }
            Condition::Ncc(_) => {}
        }
        self
    }

    /// Mark the condition as matching an acceptable-preference wme
    /// (builder style).
    pub fn acceptable(mut self) -> Self {
        match &mut self {
            Condition::Positive(data) | Condition::Negative(data) => {
                data.acceptable = true;
            }
            Condition::Ncc(_) => {}
        }
        self
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Condition::Positive(_))
    }

    /// The test payload, for positive and negative conditions.
    pub fn data(&self) -> Option<&CondData> {
        match self {
            Condition::Positive(data) | Condition::Negative(data) => Some(data),
            Condition::Ncc(_) => None,
        }
    }

    /// Mutable test payload, for positive and negative conditions.
    pub fn data_mut(&mut self) -> Option<&mut CondData> {
        match self {
            Condition::Positive(data) | Condition::Negative(data) => Some(data),
            Condition::Ncc(_) => None,
        }
    }
}
