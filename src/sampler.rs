use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::ScenarioError;
use crate::fixtures::League;
use crate::odds::{Lookup, ProbabilitySource};
use crate::outcome::{MatchOutcome, Prob3};
use crate::scenario::{ForcedOutcome, RankGoal};
use crate::table::goal_met;

pub const DEFAULT_TRIALS: u32 = 10_000;
pub const MAX_WORKERS: usize = 64;

const CANCEL_CHECK_INTERVAL: u32 = 256;

#[derive(Debug, Clone, Copy)]
pub struct SimulationRequest<'a> {
    pub league: &'a League,
    pub probabilities: &'a ProbabilitySource,
    pub forced: &'a [ForcedOutcome],
    pub goal: RankGoal,
    pub trials: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub trials: u64,
    pub successes: u64,
    pub probability: f64,
    pub standard_error: f64,
    pub seed: u64,
    /// Fixtures whose market probabilities were unusable and ran on uniform thirds.
    pub fallback_fixtures: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct CompiledMatch {
    home: usize,
    away: usize,
    pinned: Option<MatchOutcome>,
    probs: Prob3,
}

/// Monte Carlo estimate of the chance that the goal is met.
///
/// Trials are split into one chunk per worker. Each chunk owns a ChaCha
/// stream derived from the request seed and its chunk index, so a given
/// (seed, trials, workers) triple always yields the same estimate no matter
/// how rayon schedules the chunks.
pub struct OutcomeSampler {
    workers: usize,
    pool: Option<rayon::ThreadPool>,
}

impl OutcomeSampler {
    pub fn new(workers: usize) -> Self {
        let workers = workers.clamp(1, MAX_WORKERS);
        Self {
            workers,
            pool: build_sim_pool(workers),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run(
        &self,
        req: &SimulationRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<SimulationOutcome, ScenarioError> {
        if req.trials == 0 {
            return Err(ScenarioError::invalid("trial count must be at least 1"));
        }
        if req.goal.team >= req.league.team_count() {
            return Err(ScenarioError::invalid("target team outside standings"));
        }
        let (matches, fallback_fixtures) = compile_matches(req)?;
        let base_points = req.league.points();
        let goal_diff = req.league.goal_differences();

        let chunks = split_trials(req.trials, self.workers);
        let counts: Result<Vec<u64>, ScenarioError> = with_sim_pool(&self.pool, || {
            chunks
                .par_iter()
                .enumerate()
                .map(|(worker, trials)| {
                    let mut rng = ChaCha8Rng::seed_from_u64(req.seed);
                    rng.set_stream(worker as u64);
                    run_chunk(
                        &matches,
                        &base_points,
                        &goal_diff,
                        &req.goal,
                        *trials,
                        &mut rng,
                        cancel,
                    )
                })
                .collect()
        });
        // Any cancelled chunk voids the whole batch.
        let successes: u64 = counts?.into_iter().sum();

        let trials = u64::from(req.trials);
        let probability = successes as f64 / trials as f64;
        let standard_error = (probability * (1.0 - probability) / trials as f64).sqrt();
        info!(
            trials,
            successes,
            probability,
            standard_error,
            workers = self.workers,
            "simulation finished"
        );
        Ok(SimulationOutcome {
            trials,
            successes,
            probability,
            standard_error,
            seed: req.seed,
            fallback_fixtures,
        })
    }
}

fn compile_matches(
    req: &SimulationRequest<'_>,
) -> Result<(Vec<CompiledMatch>, Vec<String>), ScenarioError> {
    let remaining = req.league.remaining();
    let mut pinned: Vec<Option<MatchOutcome>> = vec![None; remaining.len()];
    for f in req.forced {
        let Some(slot) = pinned.get_mut(f.fixture) else {
            return Err(ScenarioError::invalid(format!(
                "forced outcome references fixture {} of {}",
                f.fixture,
                remaining.len()
            )));
        };
        if slot.is_some_and(|existing| existing != f.outcome) {
            return Err(ScenarioError::invalid(format!(
                "contradictory forced outcomes for '{}'",
                remaining[f.fixture].key
            )));
        }
        *slot = Some(f.outcome);
    }

    let mut fallback = Vec::new();
    let mut missing = 0usize;
    let mut compiled = Vec::with_capacity(remaining.len());
    for (m, pinned) in remaining.iter().zip(pinned) {
        let probs = if pinned.is_some() {
            Prob3::uniform()
        } else {
            let lookup = req.probabilities.lookup(&m.key);
            match lookup {
                Lookup::Market(_) => {}
                Lookup::Missing => missing += 1,
                Lookup::Malformed(err) => {
                    warn!(fixture = %m.key, %err, "unusable market probabilities, using uniform");
                    fallback.push(m.key.clone());
                }
            }
            lookup.probabilities()
        };
        compiled.push(CompiledMatch {
            home: m.home,
            away: m.away,
            pinned,
            probs,
        });
    }
    if missing > 0 {
        debug!(missing, "fixtures without market probabilities use uniform thirds");
    }
    Ok((compiled, fallback))
}

fn run_chunk(
    matches: &[CompiledMatch],
    base_points: &[i32],
    goal_diff: &[i32],
    goal: &RankGoal,
    trials: u32,
    rng: &mut ChaCha8Rng,
    cancel: &CancelToken,
) -> Result<u64, ScenarioError> {
    let mut points = base_points.to_vec();
    let mut successes = 0u64;
    for trial in 0..trials {
        if trial % CANCEL_CHECK_INTERVAL == 0 {
            cancel.check()?;
        }
        points.copy_from_slice(base_points);
        for m in matches {
            let outcome = match m.pinned {
                Some(outcome) => outcome,
                None => m.probs.pick(rng.gen_range(0.0..1.0)),
            };
            let (home, away) = outcome.points();
            points[m.home] += home;
            points[m.away] += away;
        }
        if goal_met(&points, goal_diff, goal) {
            successes += 1;
        }
    }
    Ok(successes)
}

fn split_trials(trials: u32, workers: usize) -> Vec<u32> {
    let workers = (workers as u32).clamp(1, trials.max(1));
    let base = trials / workers;
    let extra = trials % workers;
    (0..workers).map(|i| base + u32::from(i < extra)).collect()
}

/// Derives a reproducible seed from a base seed and a run identifier.
pub fn seed_for_run(base_seed: u64, run_id: &str) -> u64 {
    let digest = Sha256::digest(run_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    base_seed ^ u64::from_le_bytes(bytes)
}

fn build_sim_pool(workers: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("sim-worker-{idx}"))
        .build()
        .ok()
}

fn with_sim_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_WORKERS, OutcomeSampler, seed_for_run, split_trials};

    #[test]
    fn split_trials_covers_every_trial() {
        let chunks = split_trials(10_001, 4);
        assert_eq!(chunks, vec![2501, 2500, 2500, 2500]);
        assert_eq!(split_trials(3, 8).len(), 3);
        assert_eq!(split_trials(3, 8).iter().sum::<u32>(), 3);
    }

    #[test]
    fn worker_count_is_clamped() {
        assert_eq!(OutcomeSampler::new(0).workers(), 1);
        assert_eq!(OutcomeSampler::new(500).workers(), MAX_WORKERS);
    }

    #[test]
    fn run_seeds_are_stable_and_distinct() {
        assert_eq!(seed_for_run(7, "abc"), seed_for_run(7, "abc"));
        assert_ne!(seed_for_run(7, "abc"), seed_for_run(7, "abd"));
        assert_ne!(seed_for_run(7, "abc"), seed_for_run(8, "abc"));
    }
}
