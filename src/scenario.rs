use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::fixtures::League;
use crate::outcome::{MatchOutcome, RelativeResult, Side};

/// One user constraint as produced by the scenario parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedOutcome {
    #[serde(rename = "match")]
    pub match_desc: String,
    pub result: RelativeResult,
}

/// Structured scenario as produced by the upstream parser. Unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    pub target_team: String,
    pub target_rank: i64,
    #[serde(default)]
    pub fixed_outcomes: Vec<FixedOutcome>,
}

/// "Team finishes at or above rank". Plain data, shared by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankGoal {
    pub team: usize,
    pub rank: usize,
}

/// A fixed outcome translated onto an index into `League::remaining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForcedOutcome {
    pub fixture: usize,
    pub outcome: MatchOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub goal: RankGoal,
    pub target_team: String,
    /// As resolved, possibly with repeats or contradictions; the solver judges those.
    pub forced: Vec<ForcedOutcome>,
    pub fixed_outcomes: Vec<FixedOutcome>,
}

impl ScenarioRequest {
    pub fn validate(&self, league: &League) -> Result<Scenario, ScenarioError> {
        let team_count = league.team_count();
        if self.target_rank < 1 || self.target_rank > team_count as i64 {
            return Err(ScenarioError::invalid(format!(
                "target rank {} outside 1..={team_count}",
                self.target_rank
            )));
        }
        let team = league.standings().resolve_team(&self.target_team)?;

        let mut forced = Vec::with_capacity(self.fixed_outcomes.len());
        for fixed in &self.fixed_outcomes {
            forced.push(resolve_fixed_outcome(league, team, fixed)?);
        }

        Ok(Scenario {
            goal: RankGoal {
                team,
                rank: self.target_rank as usize,
            },
            target_team: league.team_name(team).to_string(),
            forced,
            fixed_outcomes: self.fixed_outcomes.clone(),
        })
    }
}

fn resolve_fixed_outcome(
    league: &League,
    target: usize,
    fixed: &FixedOutcome,
) -> Result<ForcedOutcome, ScenarioError> {
    let (first, second) = split_match_desc(&fixed.match_desc).ok_or_else(|| {
        ScenarioError::invalid(format!(
            "fixed outcome match '{}' is not of the form '<home> vs <away>'",
            fixed.match_desc
        ))
    })?;
    let standings = league.standings();
    let a = standings.resolve_team(first)?;
    let b = standings.resolve_team(second)?;
    if a == b {
        return Err(ScenarioError::invalid(format!(
            "fixed outcome match '{}' names the same team twice",
            fixed.match_desc
        )));
    }

    let candidates: Vec<usize> = league
        .remaining()
        .iter()
        .enumerate()
        .filter(|(_, m)| (m.home == a && m.away == b) || (m.home == b && m.away == a))
        .map(|(idx, _)| idx)
        .collect();
    let fixture = match candidates.as_slice() {
        [] => {
            return Err(ScenarioError::invalid(format!(
                "no scheduled fixture between '{}' and '{}'",
                league.team_name(a),
                league.team_name(b)
            )));
        }
        [idx] => *idx,
        _ => {
            // Both legs remain: the written orientation picks one.
            let oriented: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|idx| league.remaining()[*idx].home == a)
                .collect();
            match oriented.as_slice() {
                [idx] => *idx,
                _ => {
                    return Err(ScenarioError::invalid(format!(
                        "fixed outcome match '{}' matches several scheduled fixtures",
                        fixed.match_desc
                    )));
                }
            }
        }
    };

    let m = &league.remaining()[fixture];
    let outcome = match fixed.result {
        RelativeResult::Draw => MatchOutcome::Draw,
        result if m.home == target => result.for_side(Side::Home),
        result if m.away == target => result.for_side(Side::Away),
        result => {
            return Err(ScenarioError::invalid(format!(
                "{result:?} for '{}' is ambiguous: {} does not play in it",
                m.key,
                league.team_name(target)
            )));
        }
    };
    Ok(ForcedOutcome { fixture, outcome })
}

fn split_match_desc(desc: &str) -> Option<(&str, &str)> {
    let lower = desc.to_ascii_lowercase();
    let at = lower.find(" vs ")?;
    let first = desc[..at].trim();
    let second = desc[at + 4..].trim();
    if first.is_empty() || second.is_empty() {
        return None;
    }
    Some((first, second))
}

pub fn parse_scenario_json(raw: &str) -> Result<ScenarioRequest> {
    serde_json::from_str(raw.trim()).context("invalid scenario json")
}

#[cfg(test)]
mod tests {
    use super::split_match_desc;

    #[test]
    fn split_match_desc_is_case_insensitive() {
        assert_eq!(split_match_desc("Arsenal VS Chelsea"), Some(("Arsenal", "Chelsea")));
        assert_eq!(split_match_desc("Arsenal vs Chelsea"), Some(("Arsenal", "Chelsea")));
        assert_eq!(split_match_desc("Arsenal - Chelsea"), None);
        assert_eq!(split_match_desc(" vs Chelsea"), None);
    }
}
