use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use league_feasibility::config::{CacheBackend, SimConfig};
use league_feasibility::fixtures::{League, parse_fixtures_json};
use league_feasibility::odds::{ProbabilitySource, parse_probability_source_json};
use league_feasibility::orchestrator::Orchestrator;
use league_feasibility::scenario::parse_scenario_json;
use league_feasibility::standings::parse_standings_json;

const DEFAULT_STANDINGS: &str = "tests/fixtures/standings.json";
const DEFAULT_FIXTURES: &str = "tests/fixtures/fixtures.json";
const DEFAULT_SCENARIO: &str = "tests/fixtures/scenario.json";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = SimConfig::from_env();
    if let Some(trials) = parse_u64_arg("--trials") {
        config.trials = u32::try_from(trials).unwrap_or(u32::MAX).max(1);
    }
    if let Some(seed) = parse_u64_arg("--seed") {
        config.base_seed = seed;
    }
    if has_flag("--no-cache") {
        config.cache = CacheBackend::Disabled;
    }
    debug!(?config, "resolved config");

    let standings_path =
        parse_path_arg("--standings").unwrap_or_else(|| PathBuf::from(DEFAULT_STANDINGS));
    let fixtures_path =
        parse_path_arg("--fixtures").unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURES));
    let scenario_path =
        parse_path_arg("--scenario").unwrap_or_else(|| PathBuf::from(DEFAULT_SCENARIO));

    let standings = parse_standings_json(&read(&standings_path)?)
        .with_context(|| format!("load standings {}", standings_path.display()))?;
    let fixtures = parse_fixtures_json(&read(&fixtures_path)?)
        .with_context(|| format!("load fixtures {}", fixtures_path.display()))?;
    let scenario = parse_scenario_json(&read(&scenario_path)?)
        .with_context(|| format!("load scenario {}", scenario_path.display()))?;
    let odds = match parse_path_arg("--odds") {
        Some(path) => parse_probability_source_json(&read(&path)?)
            .with_context(|| format!("load odds {}", path.display()))?,
        None => ProbabilitySource::new(),
    };

    let league = League::new(standings, fixtures)?;
    info!(
        teams = league.team_count(),
        fixtures = league.fixtures().all().len(),
        remaining = league.remaining().len(),
        "league loaded"
    );
    let orchestrator = Orchestrator::from_config(config)?;
    let report = orchestrator.evaluate(&league, &scenario, &odds)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize report")?
    );
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(PathBuf::from(raw.trim()));
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<u64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<u64>()
        {
            return Some(v);
        }
    }
    None
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
