use std::fmt;

use crate::config::ConstraintLayer;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Why a point set cannot be triangulated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DegenerateInput {
    #[error("need at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error("all {0} points are collinear")]
    Collinear(usize),
    #[error("point {index} duplicates point {first}")]
    DuplicatePoint { index: usize, first: usize },
    #[error("point {0} has a non-finite coordinate")]
    NonFinite(usize),
}

/// Progress stamp carried by a mesh. Ordered: each stage implies the ones before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum MeshStage {
    #[default]
    Unbuilt,
    Built,
    Elevated,
    Rivered,
}

impl fmt::Display for MeshStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MeshStage::Unbuilt => "unbuilt mesh",
            MeshStage::Built => "built mesh",
            MeshStage::Elevated => "elevation",
            MeshStage::Rivered => "river flow",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("degenerate input: {0}")]
    DegenerateInput(#[from] DegenerateInput),

    #[error("constraints overlay has {actual} entries but the {layer} layer has {expected}")]
    ConstraintsSize {
        layer: ConstraintLayer,
        expected: usize,
        actual: usize,
    },

    #[error("{operation} requires {requires}, mesh is at {found:?}")]
    State {
        operation: &'static str,
        requires: MeshStage,
        found: MeshStage,
    },

    #[error("peak {peak} out of range for {triangles} triangles")]
    InvalidPeak { peak: u32, triangles: usize },

    /// A newer request superseded this run. Never published.
    #[error("generation run was superseded")]
    Cancelled,

    #[error("generation worker panicked: {0}")]
    WorkerPanic(String),

    #[error("generation worker is not running")]
    WorkerUnavailable,
}

impl EngineError {
    /// Checks `found` against the stage an operation needs.
    pub(crate) fn require(
        operation: &'static str,
        requires: MeshStage,
        found: MeshStage,
    ) -> Result<()> {
        if found >= requires {
            Ok(())
        } else {
            Err(EngineError::State {
                operation,
                requires,
                found,
            })
        }
    }
}
