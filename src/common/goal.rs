use std::collections::{BTreeMap, HashSet};

use super::{Agent, Identifier};
use crate::map::Coord;
use crate::scenario::MarkedLocation;

/// Goal predicate of one search run.
#[derive(Debug, Clone)]
pub enum Goal {
    /// Prematch: every agent index owns exactly one goal cell.
    Assigned(Vec<Coord>),
    /// Inmatch: any goal cell of the agent's own colour will do.
    AnyOfColour {
        cells: HashSet<(usize, Coord)>,
        by_colour: BTreeMap<usize, Vec<Coord>>,
    },
}

impl Goal {
    /// `matching[i]` is the goal of agent `i`.
    pub fn assigned(matching: &[MarkedLocation]) -> Self {
        Goal::Assigned(matching.iter().map(MarkedLocation::coord).collect())
    }

    pub fn any_of_colour(goals: &[MarkedLocation]) -> Self {
        let mut by_colour: BTreeMap<usize, Vec<Coord>> = BTreeMap::new();
        for goal in goals {
            by_colour.entry(goal.colour).or_default().push(goal.coord());
        }
        Goal::AnyOfColour {
            cells: goals
                .iter()
                .map(|goal| (goal.colour, goal.coord()))
                .collect(),
            by_colour,
        }
    }

    pub fn is_goal_cell(&self, agent: &Agent, position: Coord) -> bool {
        match self {
            Goal::Assigned(goals) => goals[agent.index] == position,
            Goal::AnyOfColour { cells, .. } => cells.contains(&(agent.colour, position)),
        }
    }

    pub fn on_goal(&self, agent: &Agent) -> bool {
        debug_assert!(!agent.is_uncalculated());
        self.is_goal_cell(agent, agent.location)
    }

    /// The agent waited in place on one of its goal cells. Such moves are free.
    pub fn stays_on_goal(&self, before: &Agent, after: &Agent) -> bool {
        before.location == after.location && self.on_goal(after)
    }

    /// Only standard configurations with every agent on a goal count.
    pub fn is_goal(&self, identifier: &Identifier) -> bool {
        identifier.is_standard() && identifier.actual.iter().all(|agent| self.on_goal(agent))
    }

    /// Goal cells the agent may end on.
    pub fn goal_cells(&self, agent: &Agent) -> &[Coord] {
        match self {
            Goal::Assigned(goals) => std::slice::from_ref(&goals[agent.index]),
            Goal::AnyOfColour { by_colour, .. } => by_colour
                .get(&agent.colour)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }
}
