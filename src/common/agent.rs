use std::fmt;
use std::hash::{Hash, Hasher};

use crate::map::Coord;
use crate::scenario::MarkedLocation;

/// One agent at one vertex of its path.
///
/// `index` is the position in the problem's start list and never changes.
/// An uncalculated agent is a placeholder inside an operator-decomposition
/// step: its next position has not been decided yet, and `location` still
/// holds where it stood in the last standard configuration.
#[derive(Clone, Copy)]
pub struct Agent {
    pub location: Coord,
    pub colour: usize,
    /// Consecutive timesteps this agent has waited on its own goal.
    pub accumulated_cost: usize,
    pub index: usize,
    uncalculated: bool,
}

impl Agent {
    pub fn new(location: Coord, colour: usize, index: usize) -> Self {
        Agent {
            location,
            colour,
            accumulated_cost: 0,
            index,
            uncalculated: false,
        }
    }

    pub fn from_marked_location(location: &MarkedLocation, index: usize) -> Self {
        Agent::new(location.coord(), location.colour, index)
    }

    pub fn make_uncalculated(&self) -> Agent {
        Agent {
            uncalculated: true,
            ..*self
        }
    }

    pub fn is_uncalculated(&self) -> bool {
        self.uncalculated
    }

    /// The same agent one timestep later at `position`.
    pub fn with_new_position(&self, position: Coord, position_is_goal: bool) -> Agent {
        let accumulated_cost = if position == self.location && position_is_goal {
            self.accumulated_cost + 1
        } else {
            0
        };
        Agent {
            location: position,
            colour: self.colour,
            accumulated_cost,
            index: self.index,
            uncalculated: false,
        }
    }
}

// `accumulated_cost` is bookkeeping only; it must not split otherwise equal
// configurations into distinct search states.
impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.uncalculated == other.uncalculated
            && (self.uncalculated || self.location == other.location)
    }
}

impl Eq for Agent {}

impl Hash for Agent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.uncalculated.hash(state);
        if !self.uncalculated {
            self.location.hash(state);
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uncalculated {
            write!(f, "Uncalculated#{}", self.index)
        } else {
            write!(f, "#{}@{:?}", self.index, self.location)
        }
    }
}

/// Joint configuration key of a search state.
///
/// `actual` is always the last fully resolved joint position. For standard
/// nodes `partial == actual`; intermediate nodes replace some `partial`
/// entries with uncalculated agents while `actual` stays pinned to the
/// standard configuration the decomposition started from.
#[derive(Clone)]
pub struct Identifier {
    pub partial: Vec<Agent>,
    pub actual: Vec<Agent>,
}

impl Identifier {
    pub fn standard(agents: Vec<Agent>) -> Self {
        Identifier {
            partial: agents.clone(),
            actual: agents,
        }
    }

    pub fn intermediate(partial: Vec<Agent>, actual: Vec<Agent>) -> Self {
        debug_assert_eq!(partial.len(), actual.len());
        debug_assert!(partial.iter().any(Agent::is_uncalculated));
        Identifier { partial, actual }
    }

    pub fn from_marked_locations(locations: &[MarkedLocation]) -> Self {
        Identifier::standard(
            locations
                .iter()
                .enumerate()
                .map(|(index, location)| Agent::from_marked_location(location, index))
                .collect(),
        )
    }

    pub fn is_standard(&self) -> bool {
        !self.partial.iter().any(Agent::is_uncalculated)
    }

    pub fn first_uncalculated(&self) -> Option<usize> {
        self.partial.iter().position(Agent::is_uncalculated)
    }

    pub fn len(&self) -> usize {
        self.actual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actual.is_empty()
    }
}

// Standard nodes are keyed by `partial` alone. Intermediate nodes also carry
// their pinned `actual`, since the uncalculated agents expand from it and swap
// detection compares against it.
impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.partial == other.partial && (self.is_standard() || self.actual == other.actual)
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.partial.hash(state);
        if !self.is_standard() {
            self.actual.hash(state);
        }
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_standard() {
            write!(f, "actual: {:?}", self.actual)
        } else {
            write!(f, "partial: {:?}, actual: {:?}", self.partial, self.actual)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn agent(x: usize, y: usize, index: usize) -> Agent {
        Agent::new(Coord::new(x, y), 0, index)
    }

    #[test]
    fn test_accumulated_cost_counts_waits_on_goal() {
        let a = agent(1, 1, 0);
        let waited = a.with_new_position(Coord::new(1, 1), true);
        let waited_again = waited.with_new_position(Coord::new(1, 1), true);
        let moved = waited_again.with_new_position(Coord::new(1, 2), false);

        assert_eq!(waited.accumulated_cost, 1);
        assert_eq!(waited_again.accumulated_cost, 2);
        assert_eq!(moved.accumulated_cost, 0);
        // Bookkeeping does not change identity.
        assert_eq!(a, waited_again);
    }

    #[test]
    fn test_uncalculated_agents_compare_by_index() {
        let a = agent(0, 0, 0).make_uncalculated();
        let b = agent(2, 2, 0).make_uncalculated();
        let c = agent(0, 0, 1).make_uncalculated();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, agent(0, 0, 0));
    }

    #[test]
    fn test_identifier_kinds() {
        let start = Identifier::standard(vec![agent(0, 0, 0), agent(1, 0, 1)]);
        assert!(start.is_standard());
        assert_eq!(start.first_uncalculated(), None);

        let partial = Identifier::intermediate(
            vec![agent(0, 1, 0), start.actual[1].make_uncalculated()],
            start.actual.clone(),
        );
        assert!(!partial.is_standard());
        assert_eq!(partial.first_uncalculated(), Some(1));
    }

    #[test]
    fn test_intermediate_identifiers_keep_their_root() {
        let root_a = vec![agent(0, 0, 0), agent(1, 0, 1)];
        let root_b = vec![agent(0, 0, 0), agent(2, 0, 1)];
        let partial = vec![agent(0, 1, 0), agent(1, 0, 1).make_uncalculated()];

        let from_a = Identifier::intermediate(partial.clone(), root_a.clone());
        let from_a_again = Identifier::intermediate(partial.clone(), root_a);
        let from_b = Identifier::intermediate(partial, root_b);

        let mut set = HashSet::new();
        set.insert(from_a);
        assert!(set.contains(&from_a_again));
        assert!(!set.contains(&from_b));
    }
}
