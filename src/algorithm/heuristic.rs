use super::policy::OptimalPolicy;
use crate::common::{Agent, Identifier};

/// Sum of individual shortest-path costs, ignoring every other agent.
///
/// Uncalculated slots of an intermediate state contribute from where the
/// agent last stood, resolved slots from where it is going.
pub(crate) fn sum_of_individual_costs(
    policy: &OptimalPolicy,
    identifier: &Identifier,
    precomputed: bool,
) -> usize {
    identifier
        .partial
        .iter()
        .zip(&identifier.actual)
        .map(|(partial, actual)| {
            let agent = if partial.is_uncalculated() { actual } else { partial };
            if precomputed {
                policy.shortest_path_for_agent(agent)
            } else {
                manhattan_distance(policy, agent)
            }
        })
        .fold(0, usize::saturating_add)
}

// Lower bound that ignores walls entirely.
fn manhattan_distance(policy: &OptimalPolicy, agent: &Agent) -> usize {
    policy
        .goal()
        .goal_cells(agent)
        .iter()
        .map(|goal| agent.location.manhattan_distance(*goal))
        .min()
        .unwrap_or(usize::MAX)
}
