use serde::{Deserialize, Serialize};

use crate::Point;

/// Decision states of the autotrack cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorState {
    AwaitingKeyFrame,
    Searching,
    AcceptedGood,
    AcceptedPossible,
    Skipping,
    LookingAhead,
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissReason {
    /// Best score did not exceed the possible-match threshold.
    BelowThreshold,
    /// Search window was empty after clipping to the frame.
    WindowEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Stepped onto an existing key frame and re-anchored on it.
    KeyFrame,
    Good,
    Possible,
    Missed(MissReason),
    /// Look-ahead reacquired the feature past a gap.
    Recovered,
    /// The stepper cannot advance any further.
    EndOfClip,
}

/// Result of one cursor step, handed from the tracking worker to the UI side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub frame: u32,
    pub outcome: StepOutcome,
    pub state: CursorState,
    pub position: Option<Point>,
    pub score: Option<f64>,
    pub runner_up: Option<f64>,
    pub ambiguous: bool,
    /// Consecutive failed frames since the last good match.
    pub misses: u32,
}

impl StepReport {
    pub fn accepted(&self) -> bool {
        matches!(
            self.outcome,
            StepOutcome::Good | StepOutcome::Possible | StepOutcome::Recovered
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StallReason {
    /// Autoskip budget exceeded and look-ahead disabled or already spent.
    AutoskipExhausted,
    /// Every look-ahead probe failed.
    LookAheadExhausted,
}

impl std::fmt::Display for StallReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StallReason::AutoskipExhausted => f.write_str("autoskip budget exhausted"),
            StallReason::LookAheadExhausted => f.write_str("look-ahead found no match"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallReport {
    /// Frame at which the autoskip budget was exceeded.
    pub failed_frame: u32,
    /// Most recent key frame or accepted match.
    pub last_good_frame: u32,
    pub reason: StallReason,
}
