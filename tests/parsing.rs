use std::fs;
use std::path::PathBuf;

use league_feasibility::fixtures::{FixtureStatus, League, parse_fixtures_json};
use league_feasibility::odds::{Lookup, parse_probability_source_json};
use league_feasibility::outcome::RelativeResult;
use league_feasibility::scenario::parse_scenario_json;
use league_feasibility::standings::parse_standings_json;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_standings_fixture() {
    let standings =
        parse_standings_json(&read_fixture("standings.json")).expect("fixture should parse");
    assert_eq!(standings.len(), 6);
    assert_eq!(standings.team(0).team_name, "Arsenal FC");
    assert_eq!(standings.team(3).points, 60);
    assert_eq!(standings.team(5).goal_difference, -20);
}

#[test]
fn parses_fixtures_fixture() {
    let set = parse_fixtures_json(&read_fixture("fixtures.json")).expect("fixture should parse");
    assert_eq!(set.all().len(), 9);
    assert_eq!(set.unresolved().count(), 6);
    assert!(set.all().iter().any(|f| f.status == FixtureStatus::Postponed));
}

#[test]
fn remaining_fixtures_follow_matchday_then_kickoff() {
    let standings = parse_standings_json(&read_fixture("standings.json")).expect("standings");
    let fixtures = parse_fixtures_json(&read_fixture("fixtures.json")).expect("fixtures");
    let league = League::new(standings, fixtures).expect("league");
    let ids: Vec<u64> = league.remaining().iter().map(|m| m.match_id).collect();
    assert_eq!(ids, vec![101, 102, 103, 104, 106, 105]);
    assert_eq!(league.remaining()[0].key, "Arsenal FC vs Chelsea FC");
}

#[test]
fn parses_odds_fixture() {
    let odds =
        parse_probability_source_json(&read_fixture("odds.json")).expect("fixture should parse");
    assert_eq!(odds.len(), 4);
    let Lookup::Market(p) = odds.lookup("Arsenal FC vs Chelsea FC") else {
        panic!("odds-only entry should be normalized");
    };
    assert!((p.home + p.draw + p.away - 1.0).abs() < 1e-9);
    assert!(p.home > p.away);
    let Lookup::Market(p) = odds.lookup("Liverpool FC vs Newcastle United FC") else {
        panic!("explicit probabilities should be kept");
    };
    assert!((p.home - 0.55).abs() < 1e-12);
    assert_eq!(odds.lookup("Newcastle United FC vs Manchester City FC"), Lookup::Missing);
}

#[test]
fn parses_scenario_fixture() {
    let scenario =
        parse_scenario_json(&read_fixture("scenario.json")).expect("fixture should parse");
    assert_eq!(scenario.target_team, "Chelsea");
    assert_eq!(scenario.target_rank, 3);
    assert_eq!(scenario.fixed_outcomes.len(), 1);
    assert_eq!(scenario.fixed_outcomes[0].result, RelativeResult::Win);
}

#[test]
fn scenario_without_fixed_outcomes_defaults_to_none() {
    let scenario =
        parse_scenario_json(r#"{"target_team":"Everton","target_rank":5}"#).expect("parse");
    assert!(scenario.fixed_outcomes.is_empty());
}
