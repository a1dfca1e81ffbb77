use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::sampler::{DEFAULT_TRIALS, MAX_WORKERS};
use crate::solver::{DEFAULT_NODE_LIMIT, TieRule};

const CACHE_DIR: &str = "league_feasibility";
const CACHE_FILE: &str = "scenario_cache.sqlite";
const DEFAULT_SEED: u64 = 0x5eed_1eaf_2024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Disabled,
    Memory,
    Sqlite(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub trials: u32,
    pub workers: usize,
    pub base_seed: u64,
    pub node_limit: u64,
    pub tie_rule: TieRule,
    pub timeout: Option<Duration>,
    pub cache: CacheBackend,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            workers: default_workers(),
            base_seed: DEFAULT_SEED,
            node_limit: DEFAULT_NODE_LIMIT,
            tie_rule: TieRule::default(),
            timeout: None,
            cache: CacheBackend::Memory,
        }
    }
}

impl SimConfig {
    pub fn from_env() -> Self {
        let trials = env::var("SIM_TRIALS")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_TRIALS)
            .max(1);
        let workers = env::var("SIM_WORKERS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or_else(default_workers)
            .clamp(1, MAX_WORKERS);
        let base_seed = env::var("SIM_SEED")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_SEED);
        let node_limit = env::var("SOLVER_NODE_LIMIT")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_NODE_LIMIT)
            .max(1);
        let tie_rule = env::var("SOLVER_TIE_RULE")
            .ok()
            .and_then(|v| TieRule::parse(&v))
            .unwrap_or_default();
        let timeout = env::var("SCENARIO_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let cache = if !env_bool("SCENARIO_CACHE", true) {
            CacheBackend::Disabled
        } else {
            match env::var("SCENARIO_CACHE_DB") {
                Ok(raw) if raw.trim().eq_ignore_ascii_case("memory") => CacheBackend::Memory,
                Ok(raw) if !raw.trim().is_empty() => {
                    CacheBackend::Sqlite(PathBuf::from(raw.trim()))
                }
                _ => default_cache_path()
                    .map(CacheBackend::Sqlite)
                    .unwrap_or(CacheBackend::Memory),
            }
        };

        Self {
            trials,
            workers,
            base_seed,
            node_limit,
            tie_rule,
            timeout,
            cache,
        }
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn default_cache_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(CACHE_FILE))
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, MAX_WORKERS)
}

pub fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::{CacheBackend, SimConfig};
    use crate::sampler::DEFAULT_TRIALS;
    use crate::solver::TieRule;

    #[test]
    fn defaults_use_memory_cache_and_table_order() {
        let config = SimConfig::default();
        assert_eq!(config.trials, DEFAULT_TRIALS);
        assert_eq!(config.cache, CacheBackend::Memory);
        assert_eq!(config.tie_rule, TieRule::TableOrder);
        assert!(config.workers >= 1);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn tie_rule_names() {
        assert_eq!(TieRule::parse(" Strict_Points "), Some(TieRule::StrictPoints));
        assert_eq!(TieRule::parse("table"), Some(TieRule::TableOrder));
        assert_eq!(TieRule::parse("coin_toss"), None);
    }
}
