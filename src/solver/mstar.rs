use super::matching::{lower_bound, matchings};
use super::{SolveError, Solver};
use crate::algorithm::{find_path, transition_cost, Budget, PathCache, SearchContext};
use crate::common::{Agent, Goal, Identifier, Solution, StateCache};
use crate::config::{Config, MatchingStrategy};
use crate::scenario::{MarkedLocation, Problem};
use crate::stat::Stats;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// M* over coloured agents, with the matching of agents to goals either
/// searched implicitly (inmatch) or enumerated up front (prematch).
pub struct MStar {
    problem: Problem,
    stats: Stats,
    cancel: Option<Arc<AtomicBool>>,
}

impl MStar {
    pub fn new(problem: Problem) -> Self {
        MStar {
            problem,
            stats: Stats::default(),
            cancel: None,
        }
    }

    /// Stop the search as soon as `cancel` is set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn solve_prematch(
        &mut self,
        config: &Config,
        path_cache: &PathCache,
        budget: &Budget,
        cache: &mut StateCache,
    ) -> Result<Option<Solution>, SolveError> {
        let mut candidates: Vec<(Vec<MarkedLocation>, usize)> =
            matchings(&self.problem.starts, &self.problem.goals)
                .into_iter()
                .map(|matching| {
                    let bound = lower_bound(path_cache, &self.problem.starts, &matching);
                    (matching, bound)
                })
                .collect();
        self.stats.matchings_total = candidates.len();
        info!("{} candidate matchings", candidates.len());

        if config.matching_strategy == MatchingStrategy::SortedPruningPrematch {
            candidates.sort_by_key(|(_, bound)| *bound);
        }

        let mut best: Option<Solution> = None;
        for (matching, bound) in candidates {
            let dominated = config.pruning_prematch()
                && best.as_ref().is_some_and(|best| bound >= best.cost);
            if bound == usize::MAX || dominated {
                self.stats.matchings_pruned += 1;
                continue;
            }

            debug!("searching matching {matching:?} with lower bound {bound}");
            self.stats.matchings_searched += 1;
            cache.reset();
            let goal = Goal::assigned(&matching);
            let solution = run_search(
                config,
                &self.problem,
                path_cache,
                &goal,
                budget,
                cache,
                &mut self.stats,
            )?;

            if let Some(solution) = solution {
                debug!("matching solved with cost {}", solution.cost);
                if best.as_ref().map_or(true, |best| solution.cost < best.cost) {
                    best = Some(solution);
                }
            }
        }
        Ok(best)
    }
}

impl Solver for MStar {
    #[instrument(skip_all, name = "mstar", fields(agents = self.problem.num_agents(), strategy = ?config.matching_strategy), level = "debug")]
    fn solve(&mut self, config: &Config) -> Result<Solution, SolveError> {
        let total_solve_start_time = Instant::now();
        self.stats = Stats::default();
        self.problem.validate()?;

        let path_cache = PathCache::new(&self.problem.map, &self.problem.goals);
        let budget = Budget::new(config, self.cancel.clone());
        let mut cache = StateCache::new(config.recursive);

        let solution = if config.inmatch() {
            let goal = Goal::any_of_colour(&self.problem.goals);
            run_search(
                config,
                &self.problem,
                &path_cache,
                &goal,
                &budget,
                &mut cache,
                &mut self.stats,
            )?
        } else {
            self.solve_prematch(config, &path_cache, &budget, &mut cache)?
        };

        self.stats.time_us = total_solve_start_time.elapsed().as_micros() as usize;
        let solution = solution.ok_or(SolveError::NoSolution)?;
        self.stats.costs = solution.cost;
        self.stats.print();
        Ok(solution)
    }
}

// One M* run from the problem's start towards `goal`.
fn run_search(
    config: &Config,
    problem: &Problem,
    path_cache: &PathCache,
    goal: &Goal,
    budget: &Budget,
    cache: &mut StateCache,
    stats: &mut Stats,
) -> Result<Option<Solution>, SolveError> {
    let mut ctx = SearchContext::new(
        config,
        &problem.map,
        path_cache,
        goal,
        budget,
        problem.num_agents(),
        stats,
    );
    let start = cache.get(Identifier::from_marked_locations(&problem.starts));
    let path = find_path(&mut ctx, cache, start);
    if let Some(reason) = ctx.take_interrupted() {
        return Err(SolveError::ResourceExceeded(reason));
    }

    Ok(path.map(|path| {
        let cost = path
            .windows(2)
            .map(|step| transition_cost(goal, cache, step[0], step[1]))
            .sum();
        let configurations: Vec<&[Agent]> = path
            .iter()
            .map(|&id| cache[id].identifier.actual.as_slice())
            .collect();
        Solution::from_configurations(&configurations, cost)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::test_support::{init_tracing, Fixture};
    use crate::map::{Coord, Map};
    use crate::scenario::Scenario;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use std::cmp::Reverse;
    use std::collections::{BinaryHeap, HashMap};
    use std::sync::atomic::Ordering;

    const STRATEGIES: [MatchingStrategy; 4] = [
        MatchingStrategy::Inmatch,
        MatchingStrategy::Prematch,
        MatchingStrategy::PruningPrematch,
        MatchingStrategy::SortedPruningPrematch,
    ];

    fn all_configs() -> Vec<Config> {
        let mut configs = Vec::new();
        for matching_strategy in STRATEGIES {
            for operator_decomposition in [false, true] {
                for recursive in [false, true] {
                    configs.push(Config {
                        matching_strategy,
                        operator_decomposition,
                        recursive,
                        ..Config::default()
                    });
                }
            }
        }
        configs
    }

    // Dijkstra over the full joint space with the same cost model: one per
    // agent per step, except waiting in place on a goal cell.
    fn brute_force(problem: &Problem, goal: &Goal) -> Option<usize> {
        let agents: Vec<Agent> = Identifier::from_marked_locations(&problem.starts).actual;
        let start: Vec<Coord> = agents.iter().map(|agent| agent.location).collect();
        let on_goal = |positions: &[Coord]| {
            agents
                .iter()
                .zip(positions)
                .all(|(agent, &position)| goal.is_goal_cell(agent, position))
        };

        let mut best: HashMap<Vec<Coord>, usize> = HashMap::from([(start.clone(), 0)]);
        let mut queue = BinaryHeap::from([Reverse((0, start))]);
        while let Some(Reverse((cost, positions))) = queue.pop() {
            if best.get(&positions).is_some_and(|&known| known < cost) {
                continue;
            }
            if on_goal(&positions) {
                return Some(cost);
            }
            let moves = positions
                .iter()
                .map(|&position| problem.map.get_empty_moves(position).to_vec());
            for next in itertools::Itertools::multi_cartesian_product(moves) {
                let conflict = (0..next.len()).any(|i| {
                    (0..i).any(|j| {
                        next[i] == next[j] || (next[i] == positions[j] && next[j] == positions[i])
                    })
                });
                if conflict {
                    continue;
                }
                let step: usize = agents
                    .iter()
                    .enumerate()
                    .filter(|&(i, agent)| {
                        !(next[i] == positions[i] && goal.is_goal_cell(agent, next[i]))
                    })
                    .count();
                let total = cost + step;
                if best.get(&next).map_or(true, |&known| total < known) {
                    best.insert(next.clone(), total);
                    queue.push(Reverse((total, next)));
                }
            }
        }
        None
    }

    fn optimal_cost(problem: &Problem, inmatch: bool) -> Option<usize> {
        if inmatch {
            brute_force(problem, &Goal::any_of_colour(&problem.goals))
        } else {
            matchings(&problem.starts, &problem.goals)
                .iter()
                .filter_map(|matching| brute_force(problem, &Goal::assigned(matching)))
                .min()
        }
    }

    fn random_problem(rng: &mut StdRng) -> Problem {
        loop {
            let width = rng.gen_range(2..=4);
            let height = rng.gen_range(2..=4);
            let walls: Vec<Vec<bool>> = (0..height)
                .map(|_| (0..width).map(|_| rng.gen_bool(0.2)).collect())
                .collect();
            let map = Map::from_walls(&walls).unwrap();

            let mut cells: Vec<Coord> = (0..height)
                .flat_map(|y| (0..width).map(move |x| Coord::new(x, y)))
                .filter(|&cell| map.is_passable(cell))
                .collect();
            let num_agents = rng.gen_range(2..=3);
            if cells.len() < num_agents + 1 {
                continue;
            }

            let colours: Vec<usize> = (0..num_agents).map(|_| rng.gen_range(0..2)).collect();
            cells.shuffle(rng);
            let starts = cells[..num_agents]
                .iter()
                .zip(&colours)
                .map(|(cell, &colour)| MarkedLocation::new(cell.x, cell.y, colour))
                .collect();
            cells.shuffle(rng);
            let goals = cells[..num_agents]
                .iter()
                .zip(&colours)
                .map(|(cell, &colour)| MarkedLocation::new(cell.x, cell.y, colour))
                .collect();

            return Problem::new(map, starts, goals).unwrap();
        }
    }

    fn load(path: &str) -> Problem {
        Scenario::load_from_file(path).unwrap().to_problem().unwrap()
    }

    #[test]
    fn test_corridor_scenario() {
        init_tracing();
        let problem = load("map_file/test/corridor.yaml");
        for config in all_configs() {
            let mut solver = MStar::new(problem.clone());
            let solution = solver.solve(&config).unwrap();

            assert!(solution.verify(&problem), "{config:?}");
            let expected = if config.inmatch() { 0 } else { 7 };
            assert_eq!(solution.cost, expected, "{config:?}");
        }
    }

    #[test]
    fn test_teams_scenario() {
        let problem = load("map_file/test/teams.yaml");
        let inmatch = optimal_cost(&problem, true).unwrap();
        let prematch = optimal_cost(&problem, false).unwrap();
        assert!(inmatch <= prematch);

        for config in all_configs() {
            let mut solver = MStar::new(problem.clone());
            let solution = solver.solve(&config).unwrap();

            assert!(solution.verify(&problem), "{config:?}");
            let expected = if config.inmatch() { inmatch } else { prematch };
            assert_eq!(solution.cost, expected, "{config:?}");
        }
    }

    #[test]
    fn test_optimal_on_random_instances() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..12 {
            let problem = random_problem(&mut rng);
            let inmatch = optimal_cost(&problem, true);
            let prematch = optimal_cost(&problem, false);

            for config in all_configs() {
                let expected = if config.inmatch() { inmatch } else { prematch };
                let mut solver = MStar::new(problem.clone());
                match solver.solve(&config) {
                    Ok(solution) => {
                        assert!(solution.verify(&problem), "{problem:?} {config:?}");
                        assert_eq!(Some(solution.cost), expected, "{problem:?} {config:?}");
                    }
                    Err(SolveError::NoSolution) => {
                        assert_eq!(expected, None, "{problem:?} {config:?}")
                    }
                    Err(err) => panic!("{err} on {problem:?} {config:?}"),
                }
            }
        }
    }

    #[test]
    fn test_inmatch_ties_stay_optimal() {
        // Both goals are equally near both agents, so the individual policy
        // has to pick between equivalent goals.
        let map = Map::from_rows(&["...", "...", "..."]).unwrap();
        let problem = Problem::new(
            map,
            vec![MarkedLocation::new(1, 0, 0), MarkedLocation::new(1, 2, 0)],
            vec![MarkedLocation::new(0, 1, 0), MarkedLocation::new(2, 1, 0)],
        )
        .unwrap();
        let expected = optimal_cost(&problem, true);

        for config in all_configs().into_iter().filter(Config::inmatch) {
            let solution = MStar::new(problem.clone()).solve(&config).unwrap();
            assert_eq!(Some(solution.cost), expected, "{config:?}");
        }
    }

    #[test]
    fn test_pruning_equivalence() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..8 {
            let problem = random_problem(&mut rng);
            let mut costs = Vec::new();
            let mut searched = Vec::new();
            for matching_strategy in &STRATEGIES[1..] {
                let config = Config {
                    matching_strategy: *matching_strategy,
                    ..Config::default()
                };
                let mut solver = MStar::new(problem.clone());
                costs.push(solver.solve(&config).ok().map(|solution| solution.cost));
                searched.push(solver.stats().matchings_searched);
                assert_eq!(
                    solver.stats().matchings_searched + solver.stats().matchings_pruned,
                    solver.stats().matchings_total
                );
            }
            assert!(costs.iter().all(|cost| *cost == costs[0]), "{problem:?}");
            assert!(searched[1] <= searched[0]);
        }
    }

    #[test]
    fn test_reset_is_idempotent() {
        let problem = load("map_file/test/teams.yaml");
        let config = Config {
            matching_strategy: MatchingStrategy::Prematch,
            recursive: true,
            ..Config::default()
        };
        let path_cache = PathCache::new(&problem.map, &problem.goals);
        let budget = Budget::new(&config, None);
        let goal = Goal::assigned(&problem.goals);
        let mut cache = StateCache::new(true);
        let mut stats = Stats::default();

        let mut run = |cache: &mut StateCache| {
            cache.reset();
            run_search(&config, &problem, &path_cache, &goal, &budget, cache, &mut stats)
                .unwrap()
                .unwrap()
        };
        let first = run(&mut cache);
        let states = cache.len();
        let second = run(&mut cache);

        assert_eq!(first, second);
        assert_eq!(cache.len(), states);
    }

    #[test]
    fn test_heuristic_is_admissible() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..12 {
            let problem = random_problem(&mut rng);
            for precompute_heuristic in [true, false] {
                let config = Config {
                    precompute_heuristic,
                    ..Config::default()
                };
                let mut fixture = Fixture::new(problem.clone(), config, true);
                let start = fixture.start();
                let ctx = fixture.context();
                if let Some(optimal) = brute_force(&problem, ctx.goal()) {
                    assert!(ctx.heuristic(&start) <= optimal, "{problem:?}");
                }
            }
        }
    }

    #[test]
    fn test_invalid_problem_rejected() {
        let mut problem = load("map_file/test/corridor.yaml");
        problem.goals.pop();

        let result = MStar::new(problem).solve(&Config::default());
        assert!(matches!(result, Err(SolveError::InvalidProblem(_))));
    }

    #[test]
    fn test_cancelled_search() {
        let cancel = Arc::new(AtomicBool::new(true));
        let mut solver = MStar::new(load("map_file/test/teams.yaml")).with_cancel_flag(cancel.clone());

        let result = solver.solve(&Config::default());
        assert!(matches!(result, Err(SolveError::ResourceExceeded(_))));

        cancel.store(false, Ordering::Relaxed);
        assert!(solver.solve(&Config::default()).is_ok());
    }
}
