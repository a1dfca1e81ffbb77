use serde::Serialize;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::ScenarioError;
use crate::fixtures::{League, RemainingMatch};
use crate::outcome::{MatchOutcome, Side};
use crate::scenario::{ForcedOutcome, RankGoal};

pub const DEFAULT_NODE_LIMIT: u64 = 5_000_000;

const CANCEL_CHECK_INTERVAL: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverLimits {
    pub node_limit: u64,
}

impl Default for SolverLimits {
    fn default() -> Self {
        Self {
            node_limit: DEFAULT_NODE_LIMIT,
        }
    }
}

/// How a team level with the target on final points is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieRule {
    /// Level teams fall back on goal difference, then current-table order,
    /// exactly as the simulated final table orders them.
    #[default]
    TableOrder,
    /// Only strictly more points beats a team.
    StrictPoints,
}

impl TieRule {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "table_order" | "table" => Some(Self::TableOrder),
            "strict_points" | "strict" => Some(Self::StrictPoints),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibleReason {
    RankUnreachable,
    ContradictoryConstraints {
        #[serde(rename = "match")]
        match_key: String,
    },
}

/// One outcome per remaining fixture, indexed like `League::remaining`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessAssignment {
    outcomes: Vec<MatchOutcome>,
}

impl WitnessAssignment {
    pub fn outcomes(&self) -> &[MatchOutcome] {
        &self.outcomes
    }

    pub fn final_points(&self, league: &League) -> Vec<i32> {
        let mut points = league.points();
        for (m, outcome) in league.remaining().iter().zip(&self.outcomes) {
            apply(&mut points, m, *outcome);
        }
        points
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Feasible(WitnessAssignment),
    Infeasible(InfeasibleReason),
}

impl Verdict {
    pub fn is_feasible(&self) -> bool {
        matches!(self, Verdict::Feasible(_))
    }
}

/// Decides whether the goal is reachable on points alone and, if so, finds
/// one assignment of the remaining fixtures that reaches it.
///
/// The target must finish ahead of at least `team_count - rank` other teams.
/// Goal difference is never changed by the search; under `TieRule::TableOrder`
/// it only settles teams that end level on points.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintSolver {
    limits: SolverLimits,
    tie_rule: TieRule,
}

impl ConstraintSolver {
    pub fn new(limits: SolverLimits) -> Self {
        Self {
            limits,
            tie_rule: TieRule::default(),
        }
    }

    pub fn with_tie_rule(mut self, tie_rule: TieRule) -> Self {
        self.tie_rule = tie_rule;
        self
    }

    pub fn solve(
        &self,
        league: &League,
        goal: RankGoal,
        forced: &[ForcedOutcome],
        cancel: &CancelToken,
    ) -> Result<Verdict, ScenarioError> {
        let team_count = league.team_count();
        if goal.team >= team_count {
            return Err(ScenarioError::invalid(format!(
                "target team index {} outside standings",
                goal.team
            )));
        }
        if goal.rank < 1 || goal.rank > team_count {
            return Err(ScenarioError::invalid(format!(
                "target rank {} outside 1..={team_count}",
                goal.rank
            )));
        }

        cancel.check()?;

        let fixtures = league.remaining();
        let mut assignment: Vec<Option<MatchOutcome>> = vec![None; fixtures.len()];
        for f in forced {
            let Some(slot) = assignment.get_mut(f.fixture) else {
                return Err(ScenarioError::invalid(format!(
                    "forced outcome references fixture {} of {}",
                    f.fixture,
                    fixtures.len()
                )));
            };
            match *slot {
                Some(existing) if existing != f.outcome => {
                    debug!(fixture = %fixtures[f.fixture].key, "contradictory forced outcomes");
                    return Ok(Verdict::Infeasible(
                        InfeasibleReason::ContradictoryConstraints {
                            match_key: fixtures[f.fixture].key.clone(),
                        },
                    ));
                }
                _ => *slot = Some(f.outcome),
            }
        }

        // Winning never hurts the target: it gains three and only that
        // opponent is held back. Unforced target fixtures are settled here.
        for (m, slot) in fixtures.iter().zip(assignment.iter_mut()) {
            if slot.is_none() {
                if m.home == goal.team {
                    *slot = Some(MatchOutcome::win_for(Side::Home));
                } else if m.away == goal.team {
                    *slot = Some(MatchOutcome::win_for(Side::Away));
                }
            }
        }

        let mut points = league.points();
        for (m, slot) in fixtures.iter().zip(&assignment) {
            if let Some(outcome) = slot {
                apply(&mut points, m, *outcome);
            }
        }
        let free: Vec<usize> = (0..fixtures.len())
            .filter(|idx| assignment[*idx].is_none())
            .collect();

        let goal_diff = league.goal_differences();
        let level_margin: Vec<i32> = (0..team_count)
            .map(|idx| {
                let target_ahead_when_level = match self.tie_rule {
                    TieRule::StrictPoints => false,
                    TieRule::TableOrder => {
                        (goal_diff[goal.team], std::cmp::Reverse(goal.team))
                            > (goal_diff[idx], std::cmp::Reverse(idx))
                    }
                };
                if target_ahead_when_level { 0 } else { 1 }
            })
            .collect();

        let mut search = Search {
            fixtures,
            free,
            assignment,
            points,
            level_margin,
            target: goal.team,
            target_final: 0,
            allowed_level_or_above: goal.rank - 1,
            nodes: 0,
            limits: self.limits,
            cancel,
        };
        search.target_final = search.points[goal.team];

        let found = search.descend(0)?;
        debug!(
            nodes = search.nodes,
            feasible = found,
            target_points = search.target_final,
            "solver finished"
        );
        if !found {
            return Ok(Verdict::Infeasible(InfeasibleReason::RankUnreachable));
        }
        let outcomes = search
            .assignment
            .into_iter()
            .map(|slot| slot.unwrap_or(MatchOutcome::Draw))
            .collect();
        Ok(Verdict::Feasible(WitnessAssignment { outcomes }))
    }
}

struct Search<'a> {
    fixtures: &'a [RemainingMatch],
    free: Vec<usize>,
    assignment: Vec<Option<MatchOutcome>>,
    points: Vec<i32>,
    /// 0 where the target wins a points tie against that team, else 1.
    level_margin: Vec<i32>,
    target: usize,
    target_final: i32,
    allowed_level_or_above: usize,
    nodes: u64,
    limits: SolverLimits,
    cancel: &'a CancelToken,
}

impl Search<'_> {
    fn descend(&mut self, depth: usize) -> Result<bool, ScenarioError> {
        self.nodes += 1;
        if self.nodes > self.limits.node_limit {
            return Err(ScenarioError::SolverTimeout { nodes: self.nodes });
        }
        if self.nodes % CANCEL_CHECK_INTERVAL == 0 {
            self.cancel.check()?;
        }

        let caught = self.caught_up();
        if caught > self.allowed_level_or_above {
            return Ok(false);
        }
        if depth == self.free.len() {
            return Ok(true);
        }
        if caught == self.allowed_level_or_above && self.next_catch_forced(depth) {
            return Ok(false);
        }

        let fixtures = self.fixtures;
        let fixture = self.free[depth];
        let m = &fixtures[fixture];
        for outcome in self.branch_order(m) {
            apply(&mut self.points, m, outcome);
            self.assignment[fixture] = Some(outcome);
            if self.descend(depth + 1)? {
                return Ok(true);
            }
            revert(&mut self.points, m, outcome);
            self.assignment[fixture] = None;
        }
        Ok(false)
    }

    /// Teams other than the target that already finish ahead of it.
    fn caught_up(&self) -> usize {
        (0..self.points.len())
            .filter(|idx| *idx != self.target && self.slack(*idx) < 0)
            .count()
    }

    /// Points `team` can still gain while staying behind the target.
    fn slack(&self, team: usize) -> i32 {
        self.target_final - self.level_margin[team] - self.points[team]
    }

    /// Fixtures between two still-beatable teams hand them at least two points
    /// between them. More than their combined slack means someone else catches up.
    fn next_catch_forced(&self, depth: usize) -> bool {
        let internal_points: i32 = self.free[depth..]
            .iter()
            .map(|idx| &self.fixtures[*idx])
            .filter(|m| self.slack(m.home) >= 0 && self.slack(m.away) >= 0)
            .map(|_| 2)
            .sum();
        if internal_points == 0 {
            return false;
        }
        let total_slack: i32 = (0..self.points.len())
            .filter(|idx| *idx != self.target)
            .map(|idx| self.slack(idx))
            .filter(|s| *s >= 0)
            .sum();
        internal_points > total_slack
    }

    fn branch_order(&self, m: &RemainingMatch) -> Vec<MatchOutcome> {
        let home_slack = self.slack(m.home);
        let away_slack = self.slack(m.away);
        // A team already out of reach absorbs the points for free.
        if home_slack < 0 {
            return vec![MatchOutcome::HomeWin];
        }
        if away_slack < 0 {
            return vec![MatchOutcome::AwayWin];
        }
        let (first_win, second_win) = if home_slack >= away_slack {
            (MatchOutcome::HomeWin, MatchOutcome::AwayWin)
        } else {
            (MatchOutcome::AwayWin, MatchOutcome::HomeWin)
        };
        if home_slack >= 1 && away_slack >= 1 {
            vec![MatchOutcome::Draw, first_win, second_win]
        } else {
            vec![first_win, second_win, MatchOutcome::Draw]
        }
    }
}

fn apply(points: &mut [i32], m: &RemainingMatch, outcome: MatchOutcome) {
    let (home, away) = outcome.points();
    points[m.home] += home;
    points[m.away] += away;
}

fn revert(points: &mut [i32], m: &RemainingMatch, outcome: MatchOutcome) {
    let (home, away) = outcome.points();
    points[m.home] -= home;
    points[m.away] -= away;
}
