use tracing::{debug, instrument, trace};

use super::expand::expand;
use super::SearchContext;
use crate::common::{CollisionSet, Goal, Identifier, OpenList, StateCache, StateId};

/// M* from `start` towards the context's goal.
///
/// Returns the standard states of an optimal path, start and goal included,
/// or `None` if the open list runs dry or a budget is hit. The cache keeps
/// everything learned so a later call for the same goal can reuse it.
#[instrument(skip_all, name = "m_star", level = "debug")]
pub(crate) fn find_path(
    ctx: &mut SearchContext,
    cache: &mut StateCache,
    start: StateId,
) -> Option<Vec<StateId>> {
    let mut open = OpenList::default();
    let path = search(ctx, cache, &mut open, start);
    open.clear(cache);
    path
}

fn search(
    ctx: &mut SearchContext,
    cache: &mut StateCache,
    open: &mut OpenList,
    start: StateId,
) -> Option<Vec<StateId>> {
    cache[start].cost = 0;
    refresh_heuristic(ctx, cache, start);
    open.push(cache, start);

    while let Some(current) = open.pop(cache) {
        if !ctx.within_budget() {
            return None;
        }
        ctx.stats.expanded_states += 1;
        if ctx.config.debug {
            debug!(
                "pop {:?} g={} h={} collisions={:?}",
                cache[current].identifier,
                cache[current].cost,
                cache[current].heuristic,
                cache[current].collision_set
            );
        }

        if ctx.goal().is_goal(&cache[current].identifier) {
            debug!("goal reached with cost {}", cache[current].cost);
            if cache.is_recursive() {
                set_child_pointers(cache, current);
            }
            return Some(backtrack(cache, current));
        }

        // A known optimal continuation from an earlier search of this cache.
        if cache.is_recursive() && cache[current].child.is_some() {
            if cache[current].cost_to_go.is_some() {
                set_child_pointers(cache, current);
                let mut path = backtrack(cache, current);
                path.extend(forward(cache, current));
                return Some(path);
            }
            let remaining = remaining_cost(ctx.goal(), cache, current);
            cache[current].cost_to_go = Some(remaining);
            refresh_heuristic(ctx, cache, current);
            open.push(cache, current);
            continue;
        }

        let expansion = expand(ctx, &cache[current]);
        if ctx.config.report_expansions {
            ctx.stats.expansion_sizes.push(expansion.successors.len());
        }
        if !expansion.blocked.is_empty() {
            let blocked =
                CollisionSet::from_colliding_indices(cache.is_recursive(), &expansion.blocked);
            let root = standard_root(cache, current);
            backprop(ctx, cache, open, root, blocked);
        }

        for identifier in expansion.successors {
            let known = cache.len();
            let successor = cache.get(identifier);
            if cache.len() > known {
                ctx.stats.generated_states += 1;
            }

            if cache[successor].is_standard() {
                let collisions = find_collisions(cache, current, successor);
                let root = standard_root(cache, current);
                cache[successor].back_set.insert(root);
                if !collisions.is_empty() {
                    let merged = cache[successor].collision_set.merge(&collisions);
                    cache[successor].collision_set = merged;
                }
                let collision_set = cache[successor].collision_set.clone();
                backprop(ctx, cache, open, root, collision_set);
                if !collisions.is_empty() {
                    continue;
                }
            }

            let cost = cache[current]
                .cost
                .saturating_add(transition_cost(ctx.goal(), cache, current, successor));
            if cost < cache[successor].cost {
                cache[successor].cost = cost;
                cache[successor].parent = Some(current);
                refresh_heuristic(ctx, cache, successor);
                // States that cannot reach the goal are never worth popping.
                if cache[successor].heuristic != usize::MAX {
                    open.push(cache, successor);
                }
            }
        }
    }

    debug!("open list exhausted");
    None
}

fn refresh_heuristic(ctx: &SearchContext, cache: &mut StateCache, id: StateId) {
    let heuristic = match cache[id].cost_to_go {
        Some(remaining) => remaining,
        None => ctx.heuristic(&cache[id].identifier),
    };
    cache[id].heuristic = heuristic;
}

/// Cost of moving from `from` to its successor `to`.
///
/// Every agent slot resolved by this step costs one, unless the agent waited
/// in place on one of its goal cells.
pub(crate) fn transition_cost(goal: &Goal, cache: &StateCache, from: StateId, to: StateId) -> usize {
    step_cost(goal, &cache[from].identifier, &cache[to].identifier)
}

fn step_cost(goal: &Goal, from: &Identifier, to: &Identifier) -> usize {
    let from_standard = from.is_standard();
    from.partial
        .iter()
        .zip(&from.actual)
        .zip(&to.partial)
        .filter(|((before_partial, before), after)| {
            (from_standard || before_partial.is_uncalculated())
                && !after.is_uncalculated()
                && !goal.stays_on_goal(before, after)
        })
        .count()
}

// Vertex and swap conflicts between the last standard configuration of
// `from` and the standard configuration `to`.
fn find_collisions(cache: &StateCache, from: StateId, to: StateId) -> CollisionSet {
    let before = &cache[from].identifier.actual;
    let after = &cache[to].identifier.actual;

    let mut pairs = Vec::new();
    for i in 0..after.len() {
        for j in 0..i {
            let vertex = after[i].location == after[j].location;
            let swap = before[i].location == after[j].location
                && after[i].location == before[j].location;
            if vertex || swap {
                pairs.push((after[i].index, after[j].index));
            }
        }
    }
    if !pairs.is_empty() {
        trace!("collisions {pairs:?} entering {:?}", cache[to].identifier);
    }
    CollisionSet::from_colliding_indices(cache.is_recursive(), &pairs)
}

// Intermediate states share the standard state their decomposition began at.
fn standard_root(cache: &StateCache, id: StateId) -> StateId {
    let mut node = id;
    while !cache[node].is_standard() {
        match cache[node].parent {
            Some(parent) => node = parent,
            None => break,
        }
    }
    debug_assert!(cache[node].is_standard());
    node
}

// Merge `collisions` into `root` and, transitively, every state that can
// reach it. Reopened states get expanded again with the wider set.
fn backprop(
    ctx: &SearchContext,
    cache: &mut StateCache,
    open: &mut OpenList,
    root: StateId,
    collisions: CollisionSet,
) {
    let mut stack = vec![(root, collisions)];

    while let Some((id, collisions)) = stack.pop() {
        if collisions.subset(&cache[id].collision_set) {
            continue;
        }
        let merged = cache[id].collision_set.merge(&collisions);
        cache[id].collision_set = merged.clone();

        if !cache[id].is_open() && cache[id].is_reached() {
            refresh_heuristic(ctx, cache, id);
            open.push(cache, id);
        }
        stack.extend(
            cache[id]
                .back_set
                .iter()
                .map(|&predecessor| (predecessor, merged.clone())),
        );
    }
}

/// Standard states from the search start to `id`.
fn backtrack(cache: &StateCache, id: StateId) -> Vec<StateId> {
    let mut path = Vec::new();
    let mut node = Some(id);
    while let Some(current) = node {
        if cache[current].is_standard() {
            path.push(current);
        }
        node = cache[current].parent;
    }
    path.reverse();
    path
}

/// Standard states after `id` along its child chain, ending at a goal.
fn forward(cache: &StateCache, id: StateId) -> Vec<StateId> {
    let mut path = Vec::new();
    let mut node = id;
    while let Some(next) = cache[node].child {
        if cache[next].is_standard() {
            path.push(next);
        }
        node = next;
        assert!(path.len() <= cache.len(), "child pointers form a cycle");
    }
    path
}

// Remember the path ending at `id` as the optimal continuation of every
// state on it. An existing child is kept so a policy never changes once set.
fn set_child_pointers(cache: &mut StateCache, id: StateId) {
    let mut node = id;
    while let Some(parent) = cache[node].parent {
        if cache[parent].child.is_none() {
            cache[parent].child = Some(node);
        }
        node = parent;
    }
}

fn remaining_cost(goal: &Goal, cache: &StateCache, id: StateId) -> usize {
    let mut total = 0;
    let mut node = id;
    while let Some(next) = cache[node].child {
        total += transition_cost(goal, cache, node, next);
        if let Some(rest) = cache[next].cost_to_go {
            return total + rest;
        }
        node = next;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::test_support::*;
    use crate::common::Agent;
    use crate::config::Config;
    use crate::map::Coord;

    fn configs() -> Vec<Config> {
        let mut configs = Vec::new();
        for operator_decomposition in [false, true] {
            for recursive in [false, true] {
                configs.push(Config {
                    operator_decomposition,
                    recursive,
                    ..Config::default()
                });
            }
        }
        configs
    }

    fn corridor() -> crate::scenario::Problem {
        problem(&["...", "@.@"], &[(0, 0, 0), (2, 0, 0)], &[(2, 0, 0), (0, 0, 0)])
    }

    fn solve(fixture: &mut Fixture) -> Option<(usize, Vec<Vec<Coord>>)> {
        let mut cache = StateCache::new(fixture.config.recursive);
        let start = cache.get(fixture.start());
        let mut ctx = fixture.context();
        let path = find_path(&mut ctx, &mut cache, start)?;

        let cost = path
            .windows(2)
            .map(|step| transition_cost(ctx.goal(), &cache, step[0], step[1]))
            .sum();
        let positions = path
            .iter()
            .map(|&id| {
                cache[id]
                    .identifier
                    .actual
                    .iter()
                    .map(|agent| agent.location)
                    .collect::<Vec<_>>()
            })
            .collect();
        Some((cost, positions))
    }

    #[test]
    fn test_corridor_swap() {
        init_tracing();
        for config in configs() {
            let mut fixture = Fixture::new(corridor(), config.clone(), false);
            let (cost, positions) = solve(&mut fixture).unwrap();

            assert_eq!(cost, 7, "{config:?}");
            assert_eq!(positions.len(), 5, "{config:?}");
            assert_eq!(positions[4], vec![Coord::new(2, 0), Coord::new(0, 0)]);
        }
    }

    #[test]
    fn test_start_on_goal() {
        for config in configs() {
            // Under inmatch both agents already stand on goals of their colour.
            let mut fixture = Fixture::new(corridor(), config, true);
            let (cost, positions) = solve(&mut fixture).unwrap();
            assert_eq!(cost, 0);
            assert_eq!(positions.len(), 1);
        }
    }

    #[test]
    fn test_unsolvable_swap() {
        for config in configs() {
            let mut fixture = Fixture::new(
                problem(&["..."], &[(0, 0, 0), (2, 0, 1)], &[(2, 0, 0), (0, 0, 1)]),
                config,
                false,
            );
            assert!(solve(&mut fixture).is_none());
            assert!(fixture.stats.expanded_states > 0);
        }
    }

    #[test]
    fn test_resource_exhaustion_stops_search() {
        let config = Config {
            max_memory_usage: 1,
            ..Config::default()
        };
        let mut fixture = Fixture::new(corridor(), config, false);
        let mut cache = StateCache::new(false);
        let start = cache.get(fixture.start());
        let mut ctx = fixture.context();

        assert!(find_path(&mut ctx, &mut cache, start).is_none());
        assert!(ctx.take_interrupted().is_some());
        assert!(!cache[start].is_open());
    }

    #[test]
    fn test_step_cost_waiting_on_goal_is_free() {
        let fixture = Fixture::new(corridor(), Config::default(), false);
        let goal = &fixture.goal;

        let a0 = Agent::new(Coord::new(1, 0), 0, 0);
        let a1 = Agent::new(Coord::new(0, 0), 0, 1); // on its goal
        let from = Identifier::standard(vec![a0, a1]);
        let to = Identifier::standard(vec![
            a0.with_new_position(Coord::new(2, 0), true),
            a1.with_new_position(Coord::new(0, 0), true),
        ]);
        assert_eq!(step_cost(goal, &from, &to), 1);

        // Decomposed, the same step costs the same in total.
        let middle = Identifier::intermediate(
            vec![to.partial[0], a1.make_uncalculated()],
            from.actual.clone(),
        );
        assert_eq!(step_cost(goal, &from, &middle), 1);
        assert_eq!(step_cost(goal, &middle, &to), 0);
    }

    #[test]
    fn test_leaving_a_goal_costs() {
        let fixture = Fixture::new(corridor(), Config::default(), false);
        let a1 = Agent::new(Coord::new(0, 0), 0, 1);
        let from = Identifier::standard(vec![Agent::new(Coord::new(2, 0), 0, 0), a1]);
        let to = Identifier::standard(vec![
            from.actual[0],
            a1.with_new_position(Coord::new(1, 0), false),
        ]);
        // Agent 0 waits on its goal for free, agent 1 steps off its goal.
        assert_eq!(step_cost(&fixture.goal, &from, &to), 1);
    }

    #[test]
    fn test_collisions_are_back_propagated() {
        let mut fixture = Fixture::new(corridor(), Config::default(), false);
        let mut cache = StateCache::new(false);
        let start = cache.get(fixture.start());
        let mut ctx = fixture.context();
        find_path(&mut ctx, &mut cache, start).unwrap();

        // Both agents head straight for each other, so the start has to learn
        // that they collide.
        assert_eq!(
            cache[start].collision_set,
            CollisionSet::from_colliding_indices(false, &[(1, 0)])
        );
    }

    #[test]
    fn test_restart_reuses_child_chain() {
        let config = Config {
            recursive: true,
            ..Config::default()
        };
        let mut fixture = Fixture::new(corridor(), config, false);
        let mut cache = StateCache::new(true);
        let start = cache.get(fixture.start());
        let mut ctx = fixture.context();

        let first = find_path(&mut ctx, &mut cache, start).unwrap();
        let expanded = ctx.stats.expanded_states;
        assert!(cache[start].child.is_some());

        // Starting one step along the optimal path, the known continuation is
        // costed and accepted without a fresh search.
        cache.restart();
        let second = find_path(&mut ctx, &mut cache, first[1]).unwrap();
        assert_eq!(second, first[1..].to_vec());
        assert!(ctx.stats.expanded_states - expanded <= 3);
        assert!(cache[first[1]].cost_to_go.is_some());
    }
}
