use serde::{Deserialize, Serialize};

use crate::error::ProbabilityError;

pub const PROB_SUM_TOLERANCE: f64 = 1e-3;

const WIN_POINTS: i32 = 3;
const DRAW_POINTS: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOutcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl MatchOutcome {
    pub const ALL: [MatchOutcome; 3] = [
        MatchOutcome::HomeWin,
        MatchOutcome::Draw,
        MatchOutcome::AwayWin,
    ];

    /// League points awarded as (home, away).
    pub fn points(self) -> (i32, i32) {
        match self {
            MatchOutcome::HomeWin => (WIN_POINTS, 0),
            MatchOutcome::Draw => (DRAW_POINTS, DRAW_POINTS),
            MatchOutcome::AwayWin => (0, WIN_POINTS),
        }
    }

    pub fn win_for(side: Side) -> Self {
        match side {
            Side::Home => MatchOutcome::HomeWin,
            Side::Away => MatchOutcome::AwayWin,
        }
    }

    /// Label in the style "<team> wins" / "draw".
    pub fn describe(self, home: &str, away: &str) -> String {
        match self {
            MatchOutcome::HomeWin => format!("{home} wins"),
            MatchOutcome::AwayWin => format!("{away} wins"),
            MatchOutcome::Draw => "draw".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

/// A required result expressed from the target team's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelativeResult {
    #[serde(alias = "win", alias = "Win")]
    Win,
    #[serde(alias = "draw", alias = "Draw")]
    Draw,
    #[serde(alias = "loss", alias = "Loss", alias = "LOSE", alias = "lose")]
    Loss,
}

impl RelativeResult {
    /// Translates to a concrete outcome given the side the target team plays on.
    pub fn for_side(self, side: Side) -> MatchOutcome {
        match self {
            RelativeResult::Win => MatchOutcome::win_for(side),
            RelativeResult::Loss => MatchOutcome::win_for(side.opposite()),
            RelativeResult::Draw => MatchOutcome::Draw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    /// Implied probabilities from decimal prices with the bookmaker margin removed.
    pub fn from_decimal_odds(home: f64, draw: f64, away: f64) -> Option<Self> {
        if !(home > 1.0 && draw > 1.0 && away > 1.0) {
            return None;
        }
        let ih = 1.0 / home;
        let id = 1.0 / draw;
        let ia = 1.0 / away;
        let sum = ih + id + ia;
        if !sum.is_finite() || sum <= 0.0 {
            return None;
        }
        Some(Self {
            home: ih / sum,
            draw: id / sum,
            away: ia / sum,
        })
    }

    pub fn validate(&self) -> Result<(), ProbabilityError> {
        for p in [self.home, self.draw, self.away] {
            if !p.is_finite() {
                return Err(ProbabilityError::NonFinite);
            }
            if p < 0.0 {
                return Err(ProbabilityError::Negative(p));
            }
        }
        let sum = self.home + self.draw + self.away;
        if (sum - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(ProbabilityError::NotNormalized(sum));
        }
        Ok(())
    }

    /// Maps a uniform draw in [0, 1) onto an outcome.
    pub fn pick(&self, u: f64) -> MatchOutcome {
        if u < self.home {
            MatchOutcome::HomeWin
        } else if u < self.home + self.draw {
            MatchOutcome::Draw
        } else {
            MatchOutcome::AwayWin
        }
    }
}

impl Default for Prob3 {
    fn default() -> Self {
        Self::uniform()
    }
}
