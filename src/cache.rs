use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::fixtures::League;
use crate::odds::ProbabilitySource;
use crate::outcome::MatchOutcome;
use crate::scenario::Scenario;

const FINGERPRINT_VERSION: u32 = 1;

/// A previously computed estimate plus the probabilities it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProbability {
    pub probability: f64,
    pub trials: u64,
    pub probability_source: ProbabilitySource,
    /// Fixtures that ran on uniform thirds because their market entry was unusable.
    #[serde(default)]
    pub fallback_fixtures: Vec<String>,
    pub computed_at: String,
}

impl CachedProbability {
    pub fn new(probability: f64, trials: u64, probability_source: ProbabilitySource) -> Self {
        Self {
            probability,
            trials,
            probability_source,
            fallback_fixtures: Vec::new(),
            computed_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_fallback_fixtures(mut self, fallback_fixtures: Vec<String>) -> Self {
        self.fallback_fixtures = fallback_fixtures;
        self
    }
}

/// Append-only store of simulated probabilities keyed by scenario fingerprint.
/// Last write wins; nothing expires.
pub trait ScenarioCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CachedProbability>>;
    fn put(&self, key: &str, value: &CachedProbability) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct FingerprintInput<'a> {
    version: u32,
    team: &'a str,
    rank: usize,
    fixed_outcomes: Vec<(&'a str, MatchOutcome)>,
}

/// Order-independent scenario key: forced outcomes are deduplicated and sorted
/// by their fixture's canonical "<home> vs <away>" text before hashing.
pub fn fingerprint(league: &League, scenario: &Scenario) -> String {
    let remaining = league.remaining();
    let mut fixed: Vec<(&str, MatchOutcome)> = scenario
        .forced
        .iter()
        .filter_map(|f| remaining.get(f.fixture).map(|m| (m.key.as_str(), f.outcome)))
        .collect();
    fixed.sort();
    fixed.dedup();

    let input = FingerprintInput {
        version: FINGERPRINT_VERSION,
        team: &scenario.target_team,
        rank: scenario.goal.rank,
        fixed_outcomes: fixed,
    };
    // Serializing a struct of strings, integers and unit enums cannot fail.
    let canonical = serde_json::to_string(&input).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedProbability>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScenarioCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CachedProbability>> {
        let guard = self
            .entries
            .read()
            .map_err(|_| anyhow!("scenario cache lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn put(&self, key: &str, value: &CachedProbability) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| anyhow!("scenario cache lock poisoned"))?;
        guard.insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Embedded sqlite store; the value is the JSON encoding of `CachedProbability`.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS scenario_probabilities (
            fingerprint TEXT PRIMARY KEY,
            probability REAL NOT NULL,
            trials INTEGER NOT NULL,
            payload TEXT NOT NULL,
            computed_at TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

impl ScenarioCache for SqliteCache {
    fn get(&self, key: &str) -> Result<Option<CachedProbability>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("scenario cache lock poisoned"))?;
        let payload = conn
            .query_row(
                "SELECT payload FROM scenario_probabilities WHERE fingerprint = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("query cached probability")?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let value = serde_json::from_str::<CachedProbability>(&payload)
            .context("decode cached probability")?;
        Ok(Some(value))
    }

    fn put(&self, key: &str, value: &CachedProbability) -> Result<()> {
        let payload = serde_json::to_string(value).context("serialize cached probability")?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("scenario cache lock poisoned"))?;
        conn.execute(
            "INSERT OR REPLACE INTO scenario_probabilities (fingerprint, probability, trials, payload, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key,
                value.probability,
                value.trials as i64,
                payload,
                value.computed_at
            ],
        )
        .context("store cached probability")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{CachedProbability, MemoryCache, ScenarioCache, SqliteCache};
    use crate::odds::ProbabilitySource;
    use crate::outcome::Prob3;

    fn sample(probability: f64) -> CachedProbability {
        let mut src = ProbabilitySource::new();
        src.insert(
            "A",
            "B",
            Prob3 {
                home: 0.5,
                draw: 0.25,
                away: 0.25,
            },
        );
        CachedProbability::new(probability, 1000, src)
    }

    #[test]
    fn memory_cache_last_write_wins() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").expect("get").is_none());
        cache.put("k", &sample(0.25)).expect("put");
        cache.put("k", &sample(0.5)).expect("put");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").expect("get").map(|v| v.probability), Some(0.5));
    }

    #[test]
    fn sqlite_cache_round_trips_snapshot() {
        let cache = SqliteCache::open_in_memory().expect("open");
        let value = sample(0.125);
        cache.put("k", &value).expect("put");
        cache.put("k", &sample(0.75)).expect("overwrite");
        let got = cache.get("k").expect("get").expect("hit");
        assert_eq!(got.probability, 0.75);
        assert_eq!(got.probability_source, value.probability_source);
        assert!(cache.get("missing").expect("get").is_none());
    }

    #[test]
    fn sqlite_cache_keeps_fallback_fixtures() {
        let cache = SqliteCache::open_in_memory().expect("open");
        let value = sample(0.5).with_fallback_fixtures(vec!["C vs D".to_string()]);
        cache.put("k", &value).expect("put");
        let got = cache.get("k").expect("get").expect("hit");
        assert_eq!(got.fallback_fixtures, vec!["C vs D".to_string()]);
    }

    #[test]
    fn payload_without_fallback_fixtures_still_decodes() {
        let raw = r#"{"probability":0.5,"trials":10,"probability_source":{},"computed_at":"2025-05-01T00:00:00+00:00"}"#;
        let value: CachedProbability = serde_json::from_str(raw).expect("decode");
        assert!(value.fallback_fixtures.is_empty());
    }

    #[test]
    fn open_reports_the_directory_it_cannot_create() {
        let blocker = std::env::temp_dir().join(format!(
            "league_feasibility_cache_blocker_{}",
            std::process::id()
        ));
        fs::write(&blocker, b"not a directory").expect("write blocker file");
        let dir = blocker.join("nested");
        let err = SqliteCache::open(&dir.join("cache.sqlite"))
            .err()
            .expect("a file cannot hold a directory");
        let _ = fs::remove_file(&blocker);
        assert!(
            format!("{err:#}").contains(&dir.display().to_string()),
            "{err:#}"
        );
    }
}
