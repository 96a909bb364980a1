use std::collections::HashMap;
use tracing::debug;

use crate::common::{Agent, Goal};
use crate::map::{Coord, DistanceTable, Map};
use crate::scenario::MarkedLocation;

/// One BFS table per goal cell, built once per problem and shared by every
/// matching.
#[derive(Debug)]
pub(crate) struct PathCache {
    tables: HashMap<Coord, DistanceTable>,
}

impl PathCache {
    pub(crate) fn new(map: &Map, goals: &[MarkedLocation]) -> Self {
        let tables: HashMap<Coord, DistanceTable> = goals
            .iter()
            .map(|goal| (goal.coord(), map.distance_table(goal.coord())))
            .collect();
        debug!("built {} distance tables", tables.len());
        PathCache { tables }
    }

    /// Move cost from `position` to `goal`, `usize::MAX` if unreachable.
    pub(crate) fn distance(&self, goal: Coord, position: Coord) -> usize {
        self.tables
            .get(&goal)
            .map_or(usize::MAX, |table| table.get(position))
    }
}

/// Single-agent optimal policy that ignores every other agent.
pub(crate) struct OptimalPolicy<'a> {
    map: &'a Map,
    path_cache: &'a PathCache,
    goal: &'a Goal,
}

impl<'a> OptimalPolicy<'a> {
    pub(crate) fn new(map: &'a Map, path_cache: &'a PathCache, goal: &'a Goal) -> Self {
        OptimalPolicy {
            map,
            path_cache,
            goal,
        }
    }

    pub(crate) fn goal(&self) -> &'a Goal {
        self.goal
    }

    /// Shortest path length from `position` to the nearest goal `agent` may use.
    pub(crate) fn cost_from(&self, agent: &Agent, position: Coord) -> usize {
        self.goal
            .goal_cells(agent)
            .iter()
            .map(|&goal| self.path_cache.distance(goal, position))
            .min()
            .unwrap_or(usize::MAX)
    }

    pub(crate) fn shortest_path_for_agent(&self, agent: &Agent) -> usize {
        self.cost_from(agent, agent.location)
    }

    /// The first move (waiting included) that minimises the remaining distance.
    pub(crate) fn best_move(&self, agent: &Agent) -> Agent {
        let mut best = agent.location;
        let mut best_cost = usize::MAX;
        for &position in self.map.get_empty_moves(agent.location) {
            let cost = self.cost_from(agent, position);
            if cost < best_cost {
                best = position;
                best_cost = cost;
            }
        }
        self.step(agent, best)
    }

    /// Every legal next position of `agent`, waiting first.
    pub(crate) fn all_moves(&self, agent: &Agent) -> Vec<Agent> {
        self.map
            .get_empty_moves(agent.location)
            .iter()
            .map(|&position| self.step(agent, position))
            .collect()
    }

    fn step(&self, agent: &Agent, position: Coord) -> Agent {
        agent.with_new_position(position, self.goal.is_goal_cell(agent, position))
    }
}
