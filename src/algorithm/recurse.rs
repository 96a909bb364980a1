use std::collections::BTreeSet;
use tracing::{debug, instrument};

use super::search::find_path;
use super::SearchContext;
use crate::common::{Agent, Identifier, StateCache};

/// Next joint move of the agents in `group` along an optimal collision-free
/// path for that group alone, or `None` if the group cannot reach its goals.
///
/// Every group keeps its own state cache for the rest of the search attempt,
/// so once a group has solved a configuration it answers again for free.
#[instrument(skip_all, name = "sub_search", fields(group = ?group), level = "debug")]
pub(crate) fn optimal_policy(
    ctx: &mut SearchContext,
    group: &BTreeSet<usize>,
    actual: &[Agent],
) -> Option<Vec<Agent>> {
    let agents: Vec<Agent> = actual
        .iter()
        .filter(|agent| group.contains(&agent.index))
        .copied()
        .collect();
    debug_assert_eq!(agents.len(), group.len());

    if let [agent] = agents.as_slice() {
        return Some(vec![ctx.policy.best_move(agent)]);
    }

    let key: Vec<usize> = group.iter().copied().collect();
    let mut cache = ctx
        .sub_caches
        .remove(&key)
        .unwrap_or_else(|| StateCache::new(true));
    let next = next_configuration(ctx, &mut cache, agents);
    ctx.sub_caches.insert(key, cache);
    next
}

fn next_configuration(
    ctx: &mut SearchContext,
    cache: &mut StateCache,
    agents: Vec<Agent>,
) -> Option<Vec<Agent>> {
    let goal = ctx.goal();
    if agents.iter().all(|agent| goal.on_goal(agent)) {
        return Some(
            agents
                .iter()
                .map(|agent| agent.with_new_position(agent.location, true))
                .collect(),
        );
    }

    let start = cache.get(Identifier::standard(agents));
    if cache[start].child.is_none() {
        ctx.stats.sub_searches += 1;
        cache.restart();
        if find_path(ctx, cache, start).is_none() {
            debug!("group has no path to its goals");
            return None;
        }
    }

    let mut node = start;
    while let Some(next) = cache[node].child {
        if cache[next].is_standard() {
            return Some(cache[next].identifier.actual.clone());
        }
        node = next;
    }
    None
}
