mod agent;
mod collision;
mod goal;
mod state;

pub use agent::{Agent, Identifier};
pub use collision::CollisionSet;
pub use goal::Goal;
pub use state::{OpenList, State, StateCache, StateId};

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::map::Coord;
use crate::scenario::Problem;

/// Collision-free joint plan. `paths[i]` belongs to agent `i` and every path
/// has the same length; agents that arrive early wait on their goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub paths: Vec<Vec<Coord>>,
    pub cost: usize,
}

impl Solution {
    /// Transpose a sequence of standard joint configurations into per-agent paths.
    pub fn from_configurations(configurations: &[&[Agent]], cost: usize) -> Self {
        let num_agents = configurations.first().map_or(0, |first| first.len());
        let mut paths = vec![Vec::with_capacity(configurations.len()); num_agents];
        for configuration in configurations {
            for agent in configuration.iter() {
                paths[agent.index].push(agent.location);
            }
        }
        Solution { paths, cost }
    }

    pub fn makespan(&self) -> usize {
        self.paths.first().map_or(0, |path| path.len().saturating_sub(1))
    }

    /// Check the plan against the problem: endpoints, legal moves, no vertex
    /// or swap conflicts, and every agent of a colour on a distinct goal of
    /// that colour.
    pub fn verify(&self, problem: &Problem) -> bool {
        if self.paths.len() != problem.num_agents() {
            warn!(
                "solution has {} paths for {} agents",
                self.paths.len(),
                problem.num_agents()
            );
            return false;
        }
        let length = self.paths[0].len();
        if length == 0 || self.paths.iter().any(|path| path.len() != length) {
            warn!("paths are empty or of unequal length");
            return false;
        }

        for (agent, (path, start)) in self.paths.iter().zip(&problem.starts).enumerate() {
            if path[0] != start.coord() {
                warn!("agent {agent} does not begin at its start {:?}", start.coord());
                return false;
            }
            for step in path.windows(2) {
                if step[0] != step[1]
                    && !problem.map.get_empty_neighbors(step[0]).contains(&step[1])
                {
                    warn!("agent {agent} makes an illegal move {:?} -> {:?}", step[0], step[1]);
                    return false;
                }
            }
        }

        for time in 0..length {
            let mut occupied = HashSet::new();
            for (agent, path) in self.paths.iter().enumerate() {
                if !occupied.insert(path[time]) {
                    warn!("vertex conflict at {:?} at time {time} (agent {agent})", path[time]);
                    return false;
                }
            }
            if time == 0 {
                continue;
            }
            for a in 0..self.paths.len() {
                for b in 0..a {
                    let (pa, pb) = (&self.paths[a], &self.paths[b]);
                    if pa[time - 1] == pb[time] && pa[time] == pb[time - 1] {
                        warn!("agents {a} and {b} swap places at time {time}");
                        return false;
                    }
                }
            }
        }

        let mut goals: BTreeMap<usize, HashSet<Coord>> = BTreeMap::new();
        for goal in &problem.goals {
            goals.entry(goal.colour).or_default().insert(goal.coord());
        }
        for (agent, (path, start)) in self.paths.iter().zip(&problem.starts).enumerate() {
            let last = path[length - 1];
            if !goals.get(&start.colour).is_some_and(|cells| cells.contains(&last)) {
                warn!("agent {agent} ends on {last:?}, not a goal of colour {}", start.colour);
                return false;
            }
        }

        true
    }
}
