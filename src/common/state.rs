use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::mem::size_of;
use std::ops::{Index, IndexMut};

use super::{Agent, CollisionSet, Identifier};

/// Handle into a [`StateCache`].
pub type StateId = usize;

/// One node of the joint search graph.
///
/// Links between states are arena handles, so the graph may contain cycles
/// through `back_set` without any shared ownership.
#[derive(Debug, Clone)]
pub struct State {
    pub identifier: Identifier,
    pub collision_set: CollisionSet,
    pub cost: usize, // usize::MAX until reached
    pub heuristic: usize,
    pub parent: Option<StateId>,
    // Next state on a known optimal path to the goal. Set once, never overwritten.
    pub child: Option<StateId>,
    pub cost_to_go: Option<usize>,
    // Standard states that have generated this one as a successor.
    pub back_set: BTreeSet<StateId>,
    open_entry: Option<OpenEntry>,
}

impl State {
    fn new(identifier: Identifier, recursive: bool) -> Self {
        State {
            identifier,
            collision_set: CollisionSet::empty(recursive),
            cost: usize::MAX,
            heuristic: 0,
            parent: None,
            child: None,
            cost_to_go: None,
            back_set: BTreeSet::new(),
            open_entry: None,
        }
    }

    pub fn is_standard(&self) -> bool {
        self.identifier.is_standard()
    }

    pub fn is_reached(&self) -> bool {
        self.cost != usize::MAX
    }

    pub fn is_open(&self) -> bool {
        self.open_entry.is_some()
    }

    pub fn f_cost(&self) -> usize {
        self.cost.saturating_add(self.heuristic)
    }
}

/// Owns every state of one (sub-)search, keyed by identifier.
#[derive(Debug)]
pub struct StateCache {
    states: Vec<State>,
    index: HashMap<Identifier, StateId>,
    recursive: bool,
}

impl StateCache {
    pub fn new(recursive: bool) -> Self {
        StateCache {
            states: Vec::new(),
            index: HashMap::new(),
            recursive,
        }
    }

    /// The state for `identifier`, created on first reference.
    pub fn get(&mut self, identifier: Identifier) -> StateId {
        if let Some(&id) = self.index.get(&identifier) {
            return id;
        }
        let id = self.states.len();
        self.states.push(State::new(identifier.clone(), self.recursive));
        self.index.insert(identifier, id);
        id
    }

    pub fn find(&self, identifier: &Identifier) -> Option<StateId> {
        self.index.get(identifier).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Forget everything learned by earlier searches. Used when the goal
    /// changes, e.g. between two matchings.
    pub fn reset(&mut self) {
        let recursive = self.recursive;
        for state in &mut self.states {
            state.collision_set = CollisionSet::empty(recursive);
            state.cost = usize::MAX;
            state.heuristic = 0;
            state.parent = None;
            state.child = None;
            state.cost_to_go = None;
            state.back_set.clear();
            state.open_entry = None;
        }
    }

    /// Prepare for another search towards the same goal. Collision sets,
    /// back-links and known optimal continuations stay valid.
    pub fn restart(&mut self) {
        for state in &mut self.states {
            state.cost = usize::MAX;
            state.parent = None;
            state.open_entry = None;
        }
    }

    /// Rough resident size of one state with `num_agents` agents.
    pub fn state_bytes(num_agents: usize) -> usize {
        size_of::<State>()
            + size_of::<(Identifier, StateId)>()
            + 4 * num_agents * size_of::<Agent>()
    }
}

impl Index<StateId> for StateCache {
    type Output = State;

    fn index(&self, id: StateId) -> &State {
        &self.states[id]
    }
}

impl IndexMut<StateId> for StateCache {
    fn index_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    f_cost: usize,
    cost: usize,
    sequence: usize,
    id: StateId,
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_cost
            .cmp(&other.f_cost)
            // Higher g cost has higher priority
            .then_with(|| other.cost.cmp(&self.cost))
            // First pushed, first popped
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Priority queue over states of one cache, with decrease-key.
#[derive(Debug, Default)]
pub struct OpenList {
    entries: BTreeSet<OpenEntry>,
    sequence: usize,
}

impl OpenList {
    /// Insert `id` with its current priority, replacing any older entry.
    pub fn push(&mut self, cache: &mut StateCache, id: StateId) {
        let state = &mut cache[id];
        if let Some(old) = state.open_entry.take() {
            self.entries.remove(&old);
        }
        let entry = OpenEntry {
            f_cost: state.f_cost(),
            cost: state.cost,
            sequence: self.sequence,
            id,
        };
        self.sequence += 1;
        state.open_entry = Some(entry);
        self.entries.insert(entry);
    }

    pub fn pop(&mut self, cache: &mut StateCache) -> Option<StateId> {
        let entry = self.entries.pop_first()?;
        cache[entry.id].open_entry = None;
        Some(entry.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and unmark the states still queued.
    pub fn clear(&mut self, cache: &mut StateCache) {
        while self.pop(cache).is_some() {}
    }
}
