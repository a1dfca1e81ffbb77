use std::time::Duration;

use thiserror::Error;

/// Failures that end a scenario request without a result.
///
/// Infeasibility is not an error: the solver reports it as a verdict and the
/// report carries a probability of zero.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("team name '{0}' not recognized in league")]
    TeamNotRecognized(String),

    #[error("team name '{query}' is ambiguous, matches {candidates:?}")]
    AmbiguousTeam {
        query: String,
        candidates: Vec<String>,
    },

    #[error("solver gave up after exploring {nodes} search nodes")]
    SolverTimeout { nodes: u64 },

    #[error("request cancelled")]
    Cancelled,

    #[error("request exceeded its {0:?} deadline")]
    TimedOut(Duration),
}

impl ScenarioError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// A defect in one fixture's probability triple. Never fatal: the sampler
/// falls back to uniform thirds for that fixture.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ProbabilityError {
    #[error("probability is not a finite number")]
    NonFinite,

    #[error("probability {0} is negative")]
    Negative(f64),

    #[error("probabilities sum to {0}, expected 1")]
    NotNormalized(f64),
}
