use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScenarioError;
use crate::standings::{ApiTeamRef, StandingsModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixtureStatus {
    Scheduled,
    Timed,
    InPlay,
    Paused,
    Finished,
    Postponed,
    Suspended,
    Cancelled,
    Awarded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub match_id: u64,
    #[serde(default)]
    pub matchday: Option<u32>,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub utc_date: String,
    pub status: FixtureStatus,
}

impl Fixture {
    pub fn is_unresolved(&self) -> bool {
        self.status == FixtureStatus::Scheduled
    }

    pub fn kickoff(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.utc_date)
    }

    pub fn key(&self) -> String {
        match_key(&self.home_team, &self.away_team)
    }
}

/// Canonical "<home> vs <away>" description shared by scenarios and odds.
pub fn match_key(home: &str, away: &str) -> String {
    format!("{home} vs {away}")
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FixtureSet {
    fixtures: Vec<Fixture>,
}

impl FixtureSet {
    pub fn new(fixtures: Vec<Fixture>) -> Self {
        Self { fixtures }
    }

    pub fn all(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.iter().filter(|f| f.is_unresolved())
    }
}

/// An unresolved fixture bound to team indices in the standings.
#[derive(Debug, Clone, PartialEq)]
pub struct RemainingMatch {
    pub match_id: u64,
    pub matchday: Option<u32>,
    pub home: usize,
    pub away: usize,
    pub key: String,
}

/// Standings plus the remaining fixtures resolved against them: everything
/// the solver and the sampler read.
#[derive(Debug, Clone)]
pub struct League {
    standings: StandingsModel,
    fixtures: FixtureSet,
    remaining: Vec<RemainingMatch>,
}

impl League {
    pub fn new(standings: StandingsModel, fixtures: FixtureSet) -> Result<Self, ScenarioError> {
        let mut unresolved: Vec<&Fixture> = fixtures.unresolved().collect();
        unresolved.sort_by(|a, b| {
            a.matchday
                .cmp(&b.matchday)
                .then_with(|| a.kickoff().cmp(&b.kickoff()))
                .then(a.match_id.cmp(&b.match_id))
        });

        let mut remaining = Vec::with_capacity(unresolved.len());
        for f in unresolved {
            let home = standings.index_of(&f.home_team).ok_or_else(|| {
                ScenarioError::invalid(format!(
                    "fixture {} references unknown team '{}'",
                    f.match_id, f.home_team
                ))
            })?;
            let away = standings.index_of(&f.away_team).ok_or_else(|| {
                ScenarioError::invalid(format!(
                    "fixture {} references unknown team '{}'",
                    f.match_id, f.away_team
                ))
            })?;
            if home == away {
                return Err(ScenarioError::invalid(format!(
                    "fixture {} pits '{}' against itself",
                    f.match_id, f.home_team
                )));
            }
            remaining.push(RemainingMatch {
                match_id: f.match_id,
                matchday: f.matchday,
                home,
                away,
                key: f.key(),
            });
        }

        Ok(Self {
            standings,
            fixtures,
            remaining,
        })
    }

    pub fn standings(&self) -> &StandingsModel {
        &self.standings
    }

    pub fn fixtures(&self) -> &FixtureSet {
        &self.fixtures
    }

    pub fn remaining(&self) -> &[RemainingMatch] {
        &self.remaining
    }

    pub fn team_count(&self) -> usize {
        self.standings.len()
    }

    pub fn team_name(&self, idx: usize) -> &str {
        &self.standings.team(idx).team_name
    }

    pub fn points(&self) -> Vec<i32> {
        self.standings.teams().iter().map(|t| t.points).collect()
    }

    pub fn goal_differences(&self) -> Vec<i32> {
        self.standings
            .teams()
            .iter()
            .map(|t| t.goal_difference)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMatch {
    id: u64,
    #[serde(default)]
    matchday: Option<u32>,
    home_team: ApiTeamRef,
    away_team: ApiTeamRef,
    #[serde(default)]
    utc_date: String,
    status: FixtureStatus,
}

impl From<ApiMatch> for Fixture {
    fn from(m: ApiMatch) -> Self {
        Fixture {
            match_id: m.id,
            matchday: m.matchday,
            home_team: m.home_team.name,
            away_team: m.away_team.name,
            utc_date: m.utc_date,
            status: m.status,
        }
    }
}

/// Accepts either the flat fixture list or a football-data.org
/// `{"matches":[...]}` document.
pub fn parse_fixtures_json(raw: &str) -> Result<FixtureSet> {
    let v: Value = serde_json::from_str(raw.trim()).context("invalid fixtures json")?;
    let fixtures: Vec<Fixture> = if v.is_array() {
        serde_json::from_value(v).context("invalid fixture rows")?
    } else {
        let matches = v
            .get("matches")
            .cloned()
            .context("fixtures document has no matches array")?;
        let rows: Vec<ApiMatch> = serde_json::from_value(matches).context("invalid match rows")?;
        rows.into_iter().map(Fixture::from).collect()
    };
    Ok(FixtureSet::new(fixtures))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{FixtureStatus, parse_fixtures_json, parse_timestamp};

    #[test]
    fn parses_football_data_matches() {
        let raw = r#"{"matches":[
            {"id":1,"matchday":30,"homeTeam":{"id":1,"name":"A"},"awayTeam":{"id":2,"name":"B"},"utcDate":"2025-04-01T19:00:00Z","status":"SCHEDULED"},
            {"id":2,"matchday":29,"homeTeam":{"id":2,"name":"B"},"awayTeam":{"id":1,"name":"A"},"utcDate":"2025-03-20T19:00:00Z","status":"FINISHED"},
            {"id":3,"matchday":31,"homeTeam":{"id":2,"name":"B"},"awayTeam":{"id":3,"name":"C"},"utcDate":"2025-04-08T19:00:00Z","status":"SOMETHING_NEW"}
        ]}"#;
        let set = parse_fixtures_json(raw).expect("parse");
        assert_eq!(set.all().len(), 3);
        assert_eq!(set.unresolved().count(), 1);
        assert_eq!(set.all()[2].status, FixtureStatus::Unknown);
        assert_eq!(set.all()[0].key(), "A vs B");
    }

    #[test]
    fn timestamps_accept_rfc3339_and_naive() {
        assert!(parse_timestamp("2025-04-01T19:00:00Z").is_some());
        assert!(parse_timestamp("2025-04-01 19:00:00").is_some());
        assert!(parse_timestamp("").is_none());
    }
}
