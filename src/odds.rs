use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ProbabilityError;
use crate::fixtures::match_key;
use crate::outcome::Prob3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecimalOdds {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odds: Option<DecimalOdds>,
    pub probabilities: Prob3,
}

/// Per-fixture outcome probabilities keyed by "<home> vs <away>".
///
/// Serializes as the cached-odds map, which is also the snapshot attached to
/// reports and cache entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbabilitySource {
    entries: BTreeMap<String, MarketEntry>,
}

/// What the sampler should use for one fixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    Market(Prob3),
    Missing,
    Malformed(ProbabilityError),
}

impl Lookup {
    pub fn probabilities(&self) -> Prob3 {
        match self {
            Lookup::Market(p) => *p,
            Lookup::Missing | Lookup::Malformed(_) => Prob3::uniform(),
        }
    }
}

impl ProbabilitySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, home: &str, away: &str, probabilities: Prob3) {
        self.entries.insert(
            match_key(home, away),
            MarketEntry {
                odds: None,
                probabilities,
            },
        );
    }

    pub fn insert_odds(&mut self, home: &str, away: &str, odds: DecimalOdds) -> bool {
        let Some(probabilities) = Prob3::from_decimal_odds(odds.home, odds.draw, odds.away) else {
            return false;
        };
        self.entries.insert(
            match_key(home, away),
            MarketEntry {
                odds: Some(odds),
                probabilities,
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy holding only the given fixtures, for attaching to reports.
    pub fn restricted_to<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        let entries = keys
            .into_iter()
            .filter_map(|k| self.entries.get(k).map(|e| (k.to_string(), e.clone())))
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, key: &str) -> Lookup {
        match self.entries.get(key) {
            None => Lookup::Missing,
            Some(entry) => match entry.probabilities.validate() {
                Ok(()) => Lookup::Market(entry.probabilities),
                Err(err) => Lookup::Malformed(err),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct OddsApiEvent {
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<OddsApiBookmaker>,
}

#[derive(Debug, Deserialize)]
struct OddsApiBookmaker {
    #[serde(default)]
    markets: Vec<OddsApiMarket>,
}

#[derive(Debug, Deserialize)]
struct OddsApiMarket {
    #[serde(default)]
    key: String,
    #[serde(default)]
    outcomes: Vec<OddsApiOutcome>,
}

#[derive(Debug, Deserialize)]
struct OddsApiOutcome {
    name: String,
    price: f64,
}

#[derive(Debug, Deserialize)]
struct CachedEntry {
    #[serde(default)]
    odds: Option<DecimalOdds>,
    #[serde(default)]
    probabilities: Option<Prob3>,
}

/// Accepts the cached-odds map (`{"A vs B": {"odds": .., "probabilities": ..}}`),
/// a bare `{"A vs B": {"home": .., "draw": .., "away": ..}}` map, or a
/// the-odds-api event array.
///
/// Only a document that is neither an object nor an array is an error. An
/// entry that does not decode is logged and left out, so its fixture runs on
/// uniform thirds like any other fixture without a market.
pub fn parse_probability_source_json(raw: &str) -> Result<ProbabilitySource> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(ProbabilitySource::new());
    }
    let v: Value = serde_json::from_str(trimmed).context("invalid odds json")?;
    if let Value::Array(items) = v {
        let events: Vec<OddsApiEvent> = items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, item)| match serde_json::from_value(item) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(event = idx, %err, "skipping undecodable odds event");
                    None
                }
            })
            .collect();
        return Ok(from_odds_api_events(&events));
    }

    let map = v.as_object().context("odds json must be an object or array")?;
    let mut out = ProbabilitySource::new();
    for (key, value) in map {
        match decode_entry(value) {
            Ok(Some(entry)) => {
                out.entries.insert(key.clone(), entry);
            }
            // Entries with neither usable field stay absent and fall back to uniform.
            Ok(None) => {}
            Err(err) => warn!(fixture = %key, error = %err, "skipping undecodable odds entry"),
        }
    }
    Ok(out)
}

fn decode_entry(value: &Value) -> Result<Option<MarketEntry>> {
    if value.get("home").is_some() {
        let probabilities: Prob3 =
            serde_json::from_value(value.clone()).context("invalid probabilities")?;
        return Ok(Some(MarketEntry {
            odds: None,
            probabilities,
        }));
    }
    let cached: CachedEntry =
        serde_json::from_value(value.clone()).context("invalid odds entry")?;
    let probabilities = match (cached.probabilities, cached.odds) {
        (Some(p), _) => Some(p),
        (None, Some(odds)) => Prob3::from_decimal_odds(odds.home, odds.draw, odds.away),
        (None, None) => None,
    };
    Ok(probabilities.map(|probabilities| MarketEntry {
        odds: cached.odds,
        probabilities,
    }))
}

fn from_odds_api_events(events: &[OddsApiEvent]) -> ProbabilitySource {
    let mut out = ProbabilitySource::new();
    for event in events {
        let Some(bookmaker) = event.bookmakers.first() else {
            continue;
        };
        let Some(market) = bookmaker
            .markets
            .iter()
            .find(|m| m.key.is_empty() || m.key == "h2h")
        else {
            continue;
        };
        let mut home = None;
        let mut draw = None;
        let mut away = None;
        for outcome in &market.outcomes {
            if outcome.name == event.home_team {
                home = Some(outcome.price);
            } else if outcome.name == event.away_team {
                away = Some(outcome.price);
            } else if outcome.name.eq_ignore_ascii_case("draw") {
                draw = Some(outcome.price);
            }
        }
        let (Some(home), Some(draw), Some(away)) = (home, draw, away) else {
            continue;
        };
        out.insert_odds(
            &event.home_team,
            &event.away_team,
            DecimalOdds { home, draw, away },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{Lookup, parse_probability_source_json};
    use crate::error::ProbabilityError;

    #[test]
    fn cached_map_with_odds_only_is_normalized() {
        let raw = r#"{"A vs B": {"odds": {"home": 2.0, "draw": 3.5, "away": 4.0}}}"#;
        let src = parse_probability_source_json(raw).expect("parse");
        let Lookup::Market(p) = src.lookup("A vs B") else {
            panic!("expected market entry");
        };
        assert!((p.home + p.draw + p.away - 1.0).abs() < 1e-9);
    }

    #[test]
    fn odds_api_events_skip_incomplete_markets() {
        let raw = r#"[
            {"home_team":"A","away_team":"B","bookmakers":[{"markets":[{"key":"h2h","outcomes":[
                {"name":"A","price":1.8},{"name":"Draw","price":3.6},{"name":"B","price":4.5}]}]}]},
            {"home_team":"C","away_team":"D","bookmakers":[{"markets":[{"key":"h2h","outcomes":[
                {"name":"C","price":1.8},{"name":"D","price":4.5}]}]}]},
            {"home_team":"E","away_team":"F","bookmakers":[]}
        ]"#;
        let src = parse_probability_source_json(raw).expect("parse");
        assert_eq!(src.len(), 1);
        assert!(matches!(src.lookup("A vs B"), Lookup::Market(_)));
        assert_eq!(src.lookup("C vs D"), Lookup::Missing);
    }

    #[test]
    fn misshapen_entry_is_skipped_without_losing_the_rest() {
        let raw = r#"{
            "A vs B": {"home": 0.5, "draw": 0.3, "away": 0.2},
            "C vs D": {"home": 0.5, "draw": 0.5},
            "E vs F": {"odds": {"home": "evens", "draw": 3.2, "away": 4.0}},
            "G vs H": {"odds": {"home": 2.0, "draw": 3.5, "away": 4.0}}
        }"#;
        let src = parse_probability_source_json(raw).expect("bad entries never reject the source");
        assert_eq!(src.len(), 2);
        assert!(matches!(src.lookup("A vs B"), Lookup::Market(_)));
        assert!(matches!(src.lookup("G vs H"), Lookup::Market(_)));
        assert_eq!(src.lookup("C vs D"), Lookup::Missing);
        assert_eq!(src.lookup("E vs F"), Lookup::Missing);
        let fallback = src.lookup("C vs D").probabilities();
        assert!((fallback.draw - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn misshapen_odds_api_event_is_skipped() {
        let raw = r#"[
            {"home_team":"A","away_team":"B","bookmakers":[{"markets":[{"key":"h2h","outcomes":[
                {"name":"A","price":1.8},{"name":"Draw","price":3.6},{"name":"B","price":4.5}]}]}]},
            {"home_team":"C","bookmakers":[]}
        ]"#;
        let src = parse_probability_source_json(raw).expect("parse");
        assert_eq!(src.len(), 1);
        assert!(matches!(src.lookup("A vs B"), Lookup::Market(_)));
    }

    #[test]
    fn scalar_document_is_rejected() {
        assert!(parse_probability_source_json("42").is_err());
        assert!(parse_probability_source_json("{not json").is_err());
    }

    #[test]
    fn malformed_triple_is_flagged_not_dropped() {
        let raw = r#"{"A vs B": {"home": 0.9, "draw": 0.9, "away": 0.9}}"#;
        let src = parse_probability_source_json(raw).expect("parse");
        assert!(matches!(
            src.lookup("A vs B"),
            Lookup::Malformed(ProbabilityError::NotNormalized(_))
        ));
        let fallback = src.lookup("A vs B").probabilities();
        assert!((fallback.home - 1.0 / 3.0).abs() < 1e-12);
    }
}
