//! Fixed mapping from each category to the classifier outputs that feed it,
//! and the post-threshold conflict rules.

use shared::Category;

use crate::inference::ClassifierId;

/// One classifier output: the `label` entry of classifier `classifier`'s head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
    pub classifier: ClassifierId,
    pub label: Category,
}

const fn source(classifier: ClassifierId, label: Category) -> Source {
    Source { classifier, label }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Single(Source),
    Mean(Source, Source),
    Sum(Source, Source),
}

impl Aggregation {
    pub fn sources(&self) -> Vec<Source> {
        match *self {
            Aggregation::Single(a) => vec![a],
            Aggregation::Mean(a, b) | Aggregation::Sum(a, b) => vec![a, b],
        }
    }

    /// Combines the source scores returned by `score`.
    pub fn evaluate<E, F>(&self, mut score: F) -> Result<f32, E>
    where
        F: FnMut(Source) -> Result<f32, E>,
    {
        Ok(match *self {
            Aggregation::Single(a) => score(a)?,
            Aggregation::Mean(a, b) => (score(a)? + score(b)?) / 2.0,
            Aggregation::Sum(a, b) => score(a)? + score(b)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionRule {
    pub category: Category,
    pub aggregation: Aggregation,
}

/// `leveling_staff` sums rather than averages: its threshold is an order of
/// magnitude below the others.
pub const FUSION_TABLE: [FusionRule; 6] = [
    FusionRule {
        category: Category::Road,
        aggregation: Aggregation::Single(source(ClassifierId::A, Category::Road)),
    },
    FusionRule {
        category: Category::TotalStation,
        aggregation: Aggregation::Single(source(ClassifierId::B, Category::TotalStation)),
    },
    FusionRule {
        category: Category::Tripod,
        aggregation: Aggregation::Mean(
            source(ClassifierId::A, Category::Tripod),
            source(ClassifierId::B, Category::Tripod),
        ),
    },
    FusionRule {
        category: Category::Fdd,
        aggregation: Aggregation::Mean(
            source(ClassifierId::B, Category::Fdd),
            source(ClassifierId::C, Category::Fdd),
        ),
    },
    FusionRule {
        category: Category::AutoLevel,
        aggregation: Aggregation::Single(source(ClassifierId::C, Category::AutoLevel)),
    },
    FusionRule {
        category: Category::LevelingStaff,
        aggregation: Aggregation::Sum(
            source(ClassifierId::B, Category::LevelingStaff),
            source(ClassifierId::C, Category::LevelingStaff),
        ),
    },
];

/// When every trigger is labeled, `suppressed` is dropped from the labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRule {
    pub triggers: &'static [Category],
    pub suppressed: Category,
}

/// Evaluated in order, after thresholding.
pub const CONFLICT_RULES: &[ConflictRule] = &[ConflictRule {
    triggers: &[Category::Fdd],
    suppressed: Category::LevelingStaff,
}];
