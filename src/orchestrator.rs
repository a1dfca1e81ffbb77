use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CachedProbability, MemoryCache, ScenarioCache, SqliteCache, fingerprint};
use crate::cancel::CancelToken;
use crate::config::{CacheBackend, SimConfig};
use crate::error::ScenarioError;
use crate::fixtures::League;
use crate::odds::ProbabilitySource;
use crate::outcome::MatchOutcome;
use crate::sampler::{OutcomeSampler, SimulationRequest, seed_for_run};
use crate::scenario::{FixedOutcome, ScenarioRequest};
use crate::solver::{ConstraintSolver, InfeasibleReason, SolverLimits, Verdict};
use crate::table::{TableRow, final_table};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WitnessOutcome {
    #[serde(rename = "match")]
    pub match_key: String,
    pub outcome: MatchOutcome,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub cache_hit: bool,
    pub trials: u64,
    pub standard_error: f64,
    pub seed: Option<u64>,
    pub fallback_fixtures: Vec<String>,
}

/// Everything handed to the explanation and transport layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub feasible: bool,
    pub infeasibility: Option<InfeasibleReason>,
    pub probability: f64,
    pub target_team: String,
    pub target_rank: usize,
    pub witness_outcomes: Vec<WitnessOutcome>,
    pub witness_table: Vec<TableRow>,
    pub fixed_outcomes: Vec<FixedOutcome>,
    pub probability_source_snapshot: Option<ProbabilitySource>,
    pub simulation: Option<SimulationSummary>,
    pub fingerprint: Option<String>,
}

/// Runs one scenario request: validate, solve, then simulate through the cache.
pub struct Orchestrator {
    config: SimConfig,
    solver: ConstraintSolver,
    sampler: OutcomeSampler,
    cache: Option<Arc<dyn ScenarioCache>>,
}

impl Orchestrator {
    pub fn new(config: SimConfig, cache: Option<Arc<dyn ScenarioCache>>) -> Self {
        let solver = ConstraintSolver::new(SolverLimits {
            node_limit: config.node_limit,
        })
        .with_tie_rule(config.tie_rule);
        let sampler = OutcomeSampler::new(config.workers);
        Self {
            config,
            solver,
            sampler,
            cache,
        }
    }

    pub fn from_config(config: SimConfig) -> Result<Self> {
        let cache: Option<Arc<dyn ScenarioCache>> = match &config.cache {
            CacheBackend::Disabled => None,
            CacheBackend::Memory => Some(Arc::new(MemoryCache::new())),
            CacheBackend::Sqlite(path) => Some(Arc::new(SqliteCache::open(path)?)),
        };
        Ok(Self::new(config, cache))
    }

    pub fn evaluate(
        &self,
        league: &League,
        request: &ScenarioRequest,
        odds: &ProbabilitySource,
    ) -> Result<ScenarioReport, ScenarioError> {
        let cancel = match self.config.timeout {
            Some(timeout) => CancelToken::with_timeout(timeout),
            None => CancelToken::new(),
        };
        self.evaluate_with_cancel(league, request, odds, &cancel)
    }

    pub fn evaluate_with_cancel(
        &self,
        league: &League,
        request: &ScenarioRequest,
        odds: &ProbabilitySource,
        cancel: &CancelToken,
    ) -> Result<ScenarioReport, ScenarioError> {
        let scenario = request.validate(league)?;
        info!(
            team = %scenario.target_team,
            rank = scenario.goal.rank,
            forced = scenario.forced.len(),
            remaining = league.remaining().len(),
            "evaluating scenario"
        );

        let verdict = self
            .solver
            .solve(league, scenario.goal, &scenario.forced, cancel)?;
        let witness = match verdict {
            Verdict::Infeasible(reason) => {
                info!(?reason, "scenario infeasible");
                return Ok(ScenarioReport {
                    feasible: false,
                    infeasibility: Some(reason),
                    probability: 0.0,
                    target_team: scenario.target_team,
                    target_rank: scenario.goal.rank,
                    witness_outcomes: Vec::new(),
                    witness_table: Vec::new(),
                    fixed_outcomes: scenario.fixed_outcomes,
                    probability_source_snapshot: None,
                    simulation: None,
                    fingerprint: None,
                });
            }
            Verdict::Feasible(witness) => witness,
        };

        let witness_outcomes = league
            .remaining()
            .iter()
            .zip(witness.outcomes())
            .map(|(m, outcome)| WitnessOutcome {
                match_key: m.key.clone(),
                outcome: *outcome,
                result: outcome.describe(league.team_name(m.home), league.team_name(m.away)),
            })
            .collect();
        let witness_table = final_table(
            league,
            &witness.final_points(league),
            &league.goal_differences(),
        );

        let key = fingerprint(league, &scenario);
        let cached = self.cache.as_ref().and_then(|cache| match cache.get(&key) {
            Ok(hit) => hit,
            Err(err) => {
                warn!(%key, error = %err, "scenario cache read failed, treating as miss");
                None
            }
        });

        let (probability, snapshot, simulation) = match cached {
            Some(hit) => {
                debug!(%key, probability = hit.probability, "scenario cache hit");
                let summary = SimulationSummary {
                    cache_hit: true,
                    trials: hit.trials,
                    standard_error: standard_error(hit.probability, hit.trials),
                    seed: None,
                    fallback_fixtures: hit.fallback_fixtures,
                };
                (hit.probability, hit.probability_source, summary)
            }
            None => {
                let snapshot =
                    odds.restricted_to(league.remaining().iter().map(|m| m.key.as_str()));
                let seed = seed_for_run(self.config.base_seed, &key);
                let outcome = self.sampler.run(
                    &SimulationRequest {
                        league,
                        probabilities: odds,
                        forced: &scenario.forced,
                        goal: scenario.goal,
                        trials: self.config.trials,
                        seed,
                    },
                    cancel,
                )?;
                if let Some(cache) = self.cache.as_ref() {
                    let value = CachedProbability::new(
                        outcome.probability,
                        outcome.trials,
                        snapshot.clone(),
                    )
                    .with_fallback_fixtures(outcome.fallback_fixtures.clone());
                    if let Err(err) = cache.put(&key, &value) {
                        warn!(%key, error = %err, "scenario cache write failed");
                    }
                }
                let summary = SimulationSummary {
                    cache_hit: false,
                    trials: outcome.trials,
                    standard_error: outcome.standard_error,
                    seed: Some(seed),
                    fallback_fixtures: outcome.fallback_fixtures,
                };
                (outcome.probability, snapshot, summary)
            }
        };

        Ok(ScenarioReport {
            feasible: true,
            infeasibility: None,
            probability,
            target_team: scenario.target_team,
            target_rank: scenario.goal.rank,
            witness_outcomes,
            witness_table,
            fixed_outcomes: scenario.fixed_outcomes,
            probability_source_snapshot: Some(snapshot),
            simulation: Some(simulation),
            fingerprint: Some(key),
        })
    }
}

fn standard_error(p: f64, trials: u64) -> f64 {
    if trials == 0 {
        return 0.0;
    }
    (p * (1.0 - p) / trials as f64).sqrt()
}
