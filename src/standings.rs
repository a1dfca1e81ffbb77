use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScenarioError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: u32,
    pub team_name: String,
    pub points: i32,
    #[serde(default)]
    pub played: u32,
    #[serde(default)]
    pub won: u32,
    #[serde(default)]
    pub drawn: u32,
    #[serde(default)]
    pub lost: u32,
    #[serde(default)]
    pub goal_difference: i32,
    #[serde(default)]
    pub goals_for: u32,
    #[serde(default)]
    pub goals_against: u32,
    #[serde(default)]
    pub position: u32,
}

/// Current league table. Teams are held in table order, which is also the
/// last-resort tie order when points and goal difference are level.
#[derive(Debug, Clone, PartialEq)]
pub struct StandingsModel {
    teams: Vec<Team>,
}

impl StandingsModel {
    pub fn new(mut teams: Vec<Team>) -> Result<Self, ScenarioError> {
        if teams.len() < 2 {
            return Err(ScenarioError::invalid(format!(
                "standings need at least two teams, got {}",
                teams.len()
            )));
        }
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for team in &teams {
            if team.team_name.trim().is_empty() {
                return Err(ScenarioError::invalid("standings contain a team with no name"));
            }
            if !names.insert(team.team_name.as_str()) {
                return Err(ScenarioError::invalid(format!(
                    "duplicate team '{}' in standings",
                    team.team_name
                )));
            }
            if !ids.insert(team.team_id) {
                return Err(ScenarioError::invalid(format!(
                    "duplicate team id {} in standings",
                    team.team_id
                )));
            }
        }
        // Position 0 means "not provided"; those rows keep feed order after ranked ones.
        teams.sort_by_key(|t| if t.position == 0 { u32::MAX } else { t.position });
        Ok(Self { teams })
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, idx: usize) -> &Team {
        &self.teams[idx]
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.teams.iter().position(|t| t.team_name == name)
    }

    /// Resolves a free-form team name: exact match, then case-insensitive
    /// equality, then case-insensitive substring. Several substring hits are
    /// reported as ambiguous rather than picking one.
    pub fn resolve_team(&self, query: &str) -> Result<usize, ScenarioError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScenarioError::TeamNotRecognized(query.to_string()));
        }
        if let Some(idx) = self.index_of(query) {
            return Ok(idx);
        }
        let folded = query.to_lowercase();
        if let Some(idx) = self
            .teams
            .iter()
            .position(|t| t.team_name.to_lowercase() == folded)
        {
            return Ok(idx);
        }

        let hits: Vec<usize> = self
            .teams
            .iter()
            .enumerate()
            .filter(|(_, t)| t.team_name.to_lowercase().contains(&folded))
            .map(|(idx, _)| idx)
            .collect();
        match hits.as_slice() {
            [] => Err(ScenarioError::TeamNotRecognized(query.to_string())),
            [idx] => Ok(*idx),
            _ => Err(ScenarioError::AmbiguousTeam {
                query: query.to_string(),
                candidates: hits
                    .iter()
                    .map(|idx| self.teams[*idx].team_name.clone())
                    .collect(),
            }),
        }
    }
}

/// Football-data.org table row.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTableRow {
    position: u32,
    team: ApiTeamRef,
    #[serde(default)]
    played_games: u32,
    #[serde(default)]
    won: u32,
    #[serde(default)]
    draw: u32,
    #[serde(default)]
    lost: u32,
    points: i32,
    #[serde(default)]
    goals_for: u32,
    #[serde(default)]
    goals_against: u32,
    #[serde(default)]
    goal_difference: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiTeamRef {
    pub id: u32,
    pub name: String,
}

impl From<ApiTableRow> for Team {
    fn from(row: ApiTableRow) -> Self {
        Team {
            team_id: row.team.id,
            team_name: row.team.name,
            points: row.points,
            played: row.played_games,
            won: row.won,
            drawn: row.draw,
            lost: row.lost,
            goal_difference: row.goal_difference,
            goals_for: row.goals_for,
            goals_against: row.goals_against,
            position: row.position,
        }
    }
}

/// Accepts either the flat standings list or a football-data.org
/// `{"standings":[{"table":[...]}]}` document.
pub fn parse_standings_json(raw: &str) -> Result<StandingsModel> {
    let v: Value = serde_json::from_str(raw.trim()).context("invalid standings json")?;
    let teams: Vec<Team> = if v.is_array() {
        serde_json::from_value(v).context("invalid standings rows")?
    } else {
        let table = v
            .get("standings")
            .and_then(|s| s.as_array())
            .and_then(|groups| groups.first())
            .and_then(|g| g.get("table"))
            .cloned()
            .context("standings document has no standings[0].table")?;
        let rows: Vec<ApiTableRow> =
            serde_json::from_value(table).context("invalid standings table rows")?;
        rows.into_iter().map(Team::from).collect()
    };
    Ok(StandingsModel::new(teams)?)
}
