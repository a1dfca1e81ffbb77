use serde::Serialize;

use crate::fixtures::League;
use crate::scenario::RankGoal;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub position: usize,
    pub team_name: String,
    pub points: i32,
    pub goal_difference: i32,
}

/// Final position of `team` when sorting on points, then goal difference.
/// Level teams keep their current-table order, so the result matches a
/// stable sort without building one.
pub fn rank_of(points: &[i32], goal_diff: &[i32], team: usize) -> usize {
    let key = (points[team], goal_diff[team]);
    let ahead = points
        .iter()
        .zip(goal_diff)
        .enumerate()
        .filter(|(idx, (p, gd))| {
            let other = (**p, **gd);
            other > key || (other == key && *idx < team)
        })
        .count();
    ahead + 1
}

pub fn goal_met(points: &[i32], goal_diff: &[i32], goal: &RankGoal) -> bool {
    rank_of(points, goal_diff, goal.team) <= goal.rank
}

pub fn final_table(league: &League, points: &[i32], goal_diff: &[i32]) -> Vec<TableRow> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|a, b| {
        points[*b]
            .cmp(&points[*a])
            .then(goal_diff[*b].cmp(&goal_diff[*a]))
    });
    order
        .into_iter()
        .enumerate()
        .map(|(pos, idx)| TableRow {
            position: pos + 1,
            team_name: league.team_name(idx).to_string(),
            points: points[idx],
            goal_difference: goal_diff[idx],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::rank_of;

    #[test]
    fn points_then_goal_difference_then_table_order() {
        let points = [10, 12, 10, 10];
        let gd = [3, 0, 5, 3];
        assert_eq!(rank_of(&points, &gd, 1), 1);
        assert_eq!(rank_of(&points, &gd, 2), 2);
        assert_eq!(rank_of(&points, &gd, 0), 3);
        assert_eq!(rank_of(&points, &gd, 3), 4);
    }
}
