use itertools::Itertools;
use std::collections::BTreeMap;

use crate::algorithm::PathCache;
use crate::scenario::MarkedLocation;

/// Every assignment of goals to agents that only permutes goals within a
/// colour. `matching[i]` is the goal of agent `i`.
pub(crate) fn matchings(
    starts: &[MarkedLocation],
    goals: &[MarkedLocation],
) -> Vec<Vec<MarkedLocation>> {
    let mut agents_by_colour: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, start) in starts.iter().enumerate() {
        agents_by_colour.entry(start.colour).or_default().push(index);
    }
    let mut goals_by_colour: BTreeMap<usize, Vec<MarkedLocation>> = BTreeMap::new();
    for goal in goals {
        goals_by_colour.entry(goal.colour).or_default().push(*goal);
    }

    let teams: Vec<(Vec<usize>, Vec<MarkedLocation>)> = agents_by_colour
        .into_iter()
        .map(|(colour, agents)| (agents, goals_by_colour.remove(&colour).unwrap_or_default()))
        .collect();

    teams
        .iter()
        .map(|(_, goals)| {
            goals
                .iter()
                .copied()
                .permutations(goals.len())
                .collect::<Vec<_>>()
        })
        .multi_cartesian_product()
        .map(|choice| {
            // Every slot is overwritten below.
            let mut matching = starts.to_vec();
            for ((agents, _), permutation) in teams.iter().zip(choice) {
                for (&agent, goal) in agents.iter().zip(permutation) {
                    matching[agent] = goal;
                }
            }
            matching
        })
        .collect()
}

/// Sum of individual distances under a fixed matching; no search for that
/// matching can do better. `usize::MAX` if some agent cannot reach its goal.
pub(crate) fn lower_bound(
    path_cache: &PathCache,
    starts: &[MarkedLocation],
    matching: &[MarkedLocation],
) -> usize {
    starts
        .iter()
        .zip(matching)
        .map(|(start, goal)| path_cache.distance(goal.coord(), start.coord()))
        .fold(0, usize::saturating_add)
}
