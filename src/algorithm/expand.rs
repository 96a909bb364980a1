use itertools::Itertools;
use tracing::trace;

use super::recurse::optimal_policy;
use super::SearchContext;
use crate::common::{Agent, Identifier, State};

/// Result of expanding one state.
#[derive(Debug, Default)]
pub(crate) struct Expansion {
    pub(crate) successors: Vec<Identifier>,
    // Agent pairs whose moves were dropped because they would share a cell.
    pub(crate) blocked: Vec<(usize, usize)>,
}

/// Successors of `state`.
///
/// Agents outside the collision set follow their individual optimal policy.
/// No successors means the state is a dead end.
pub(crate) fn expand(ctx: &mut SearchContext, state: &State) -> Expansion {
    let expansion = if ctx.config.operator_decomposition {
        expand_od(ctx, state)
    } else {
        Expansion {
            successors: expand_joint(ctx, state),
            blocked: Vec::new(),
        }
    };
    trace!(
        "{:?} has {} successors",
        state.identifier,
        expansion.successors.len()
    );
    expansion
}

// Next position of every slot of a standard state. `Some` is a fixed move,
// `None` an agent whose moves have to be enumerated. The outer `None` means a
// colliding group has no way to its goals.
fn planned_moves(ctx: &mut SearchContext, state: &State) -> Option<Vec<Option<Agent>>> {
    let actual = &state.identifier.actual;
    let collision_set = &state.collision_set;

    if !ctx.config.recursive {
        return Some(
            actual
                .iter()
                .map(|agent| {
                    (!collision_set.contains_agent(agent.index))
                        .then(|| ctx.policy.best_move(agent))
                })
                .collect(),
        );
    }

    let mut moves: Vec<Option<Agent>> = vec![None; actual.len()];
    for group in collision_set.groups() {
        if group.len() == actual.len() {
            return Some(moves);
        }
        for next in optimal_policy(ctx, &group, actual)? {
            if let Some(slot) = actual.iter().position(|agent| agent.index == next.index) {
                moves[slot] = Some(next);
            }
        }
    }
    for (planned, agent) in moves.iter_mut().zip(actual) {
        if planned.is_none() {
            *planned = Some(ctx.policy.best_move(agent));
        }
    }
    Some(moves)
}

// Every combination of moves of the colliding agents in one step.
fn expand_joint(ctx: &mut SearchContext, state: &State) -> Vec<Identifier> {
    let Some(moves) = planned_moves(ctx, state) else {
        return Vec::new();
    };
    moves
        .into_iter()
        .zip(&state.identifier.actual)
        .map(|(planned, agent)| match planned {
            Some(next) => vec![next],
            None => ctx.policy.all_moves(agent),
        })
        .multi_cartesian_product()
        .map(Identifier::standard)
        .collect()
}

// Resolve one uncalculated agent per step.
fn expand_od(ctx: &mut SearchContext, state: &State) -> Expansion {
    let identifier = &state.identifier;

    let partial: Vec<Agent> = if identifier.is_standard() {
        let Some(moves) = planned_moves(ctx, state) else {
            return Expansion::default();
        };
        moves
            .into_iter()
            .zip(&identifier.actual)
            .map(|(planned, agent)| planned.unwrap_or_else(|| agent.make_uncalculated()))
            .collect()
    } else {
        identifier.partial.clone()
    };

    let Some(slot) = partial.iter().position(Agent::is_uncalculated) else {
        return Expansion {
            successors: vec![Identifier::standard(partial)],
            blocked: Vec::new(),
        };
    };

    let mut expansion = Expansion::default();
    for next in ctx.policy.all_moves(&identifier.actual[slot]) {
        // Cells already taken by resolved agents in this step.
        let claimed_by: Vec<usize> = partial
            .iter()
            .filter(|agent| !agent.is_uncalculated() && agent.location == next.location)
            .map(|agent| agent.index)
            .collect();
        if !claimed_by.is_empty() {
            expansion
                .blocked
                .extend(claimed_by.into_iter().map(|other| (next.index, other)));
            continue;
        }

        let mut partial = partial.clone();
        partial[slot] = next;
        expansion
            .successors
            .push(if partial.iter().any(Agent::is_uncalculated) {
                Identifier::intermediate(partial, identifier.actual.clone())
            } else {
                Identifier::standard(partial)
            });
    }
    expansion
}
