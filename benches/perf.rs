use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use league_feasibility::cancel::CancelToken;
use league_feasibility::fixtures::{Fixture, FixtureSet, FixtureStatus, League};
use league_feasibility::odds::ProbabilitySource;
use league_feasibility::outcome::Prob3;
use league_feasibility::sampler::{OutcomeSampler, SimulationRequest};
use league_feasibility::scenario::RankGoal;
use league_feasibility::solver::ConstraintSolver;
use league_feasibility::standings::{StandingsModel, Team};

const TEAMS: u32 = 20;

/// Twenty-team table three rounds from the end, points spread two apart.
fn sample_league() -> League {
    let teams = (0..TEAMS)
        .map(|i| Team {
            team_id: i + 1,
            team_name: format!("Club {:02}", i + 1),
            points: 80 - 2 * i as i32,
            played: 35,
            won: 0,
            drawn: 0,
            lost: 0,
            goal_difference: 30 - 3 * i as i32,
            goals_for: 0,
            goals_against: 0,
            position: i + 1,
        })
        .collect::<Vec<_>>();
    let standings = StandingsModel::new(teams).expect("valid standings");

    let mut fixtures = Vec::new();
    let mut id = 1u64;
    for round in 0..3u32 {
        for slot in 0..TEAMS / 2 {
            let home = (slot + round) % TEAMS;
            let away = (TEAMS - 1 - slot + 2 * round) % TEAMS;
            if home == away {
                continue;
            }
            fixtures.push(Fixture {
                match_id: id,
                matchday: Some(36 + round),
                home_team: format!("Club {:02}", home + 1),
                away_team: format!("Club {:02}", away + 1),
                utc_date: String::new(),
                status: FixtureStatus::Scheduled,
            });
            id += 1;
        }
    }
    League::new(standings, FixtureSet::new(fixtures)).expect("valid league")
}

fn bench_solver(c: &mut Criterion) {
    let league = sample_league();
    let solver = ConstraintSolver::default();
    c.bench_function("solver_mid_table_to_top_six", |b| {
        b.iter(|| {
            let verdict = solver
                .solve(
                    black_box(&league),
                    RankGoal { team: 9, rank: 6 },
                    &[],
                    &CancelToken::new(),
                )
                .unwrap();
            black_box(verdict.is_feasible());
        })
    });
}

fn bench_sampler(c: &mut Criterion) {
    let league = sample_league();
    let mut odds = ProbabilitySource::new();
    for m in league.remaining() {
        odds.insert(
            league.team_name(m.home),
            league.team_name(m.away),
            Prob3 {
                home: 0.45,
                draw: 0.27,
                away: 0.28,
            },
        );
    }
    let sampler = OutcomeSampler::new(4);
    c.bench_function("sampler_10k_trials", |b| {
        b.iter(|| {
            let out = sampler
                .run(
                    &SimulationRequest {
                        league: &league,
                        probabilities: &odds,
                        forced: &[],
                        goal: RankGoal { team: 3, rank: 4 },
                        trials: 10_000,
                        seed: 7,
                    },
                    &CancelToken::new(),
                )
                .unwrap();
            black_box(out.probability);
        })
    });
}

criterion_group!(benches, bench_solver, bench_sampler);
criterion_main!(benches);
