mod expand;
mod heuristic;
mod policy;
mod recurse;
mod search;

pub(crate) use policy::{OptimalPolicy, PathCache};
pub(crate) use search::{find_path, transition_cost};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::common::{Goal, Identifier, StateCache};
use crate::config::Config;
use crate::map::Map;
use crate::stat::Stats;

/// Limits shared by every search of one solve call.
#[derive(Debug, Clone)]
pub(crate) struct Budget {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
    max_memory_usage: usize,
}

impl Budget {
    pub(crate) fn new(config: &Config, cancel: Option<Arc<AtomicBool>>) -> Self {
        Budget {
            deadline: config
                .time_limit_ms
                .map(|limit| Instant::now() + Duration::from_millis(limit)),
            cancel,
            max_memory_usage: config.max_memory_usage,
        }
    }

    fn check(&self, estimated_bytes: usize) -> Result<(), String> {
        if let Some(cancel) = &self.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err("search cancelled".to_string());
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err("time limit reached".to_string());
            }
        }
        if estimated_bytes > self.max_memory_usage {
            return Err(format!(
                "estimated memory {estimated_bytes} bytes exceeds cap of {} bytes",
                self.max_memory_usage
            ));
        }
        Ok(())
    }
}

/// Everything one top-level search run needs besides its own state cache.
pub(crate) struct SearchContext<'a> {
    pub(crate) config: &'a Config,
    pub(crate) policy: OptimalPolicy<'a>,
    pub(crate) stats: &'a mut Stats,
    // Sub-problem caches of recursive M*, keyed by the sorted agent indices.
    pub(crate) sub_caches: HashMap<Vec<usize>, StateCache>,
    budget: &'a Budget,
    bytes_per_state: usize,
    interrupted: Option<String>,
}

impl<'a> SearchContext<'a> {
    pub(crate) fn new(
        config: &'a Config,
        map: &'a Map,
        path_cache: &'a PathCache,
        goal: &'a Goal,
        budget: &'a Budget,
        num_agents: usize,
        stats: &'a mut Stats,
    ) -> Self {
        SearchContext {
            config,
            policy: OptimalPolicy::new(map, path_cache, goal),
            stats,
            sub_caches: HashMap::new(),
            budget,
            bytes_per_state: StateCache::state_bytes(num_agents),
            interrupted: None,
        }
    }

    pub(crate) fn goal(&self) -> &'a Goal {
        self.policy.goal()
    }

    pub(crate) fn heuristic(&self, identifier: &Identifier) -> usize {
        heuristic::sum_of_individual_costs(
            &self.policy,
            identifier,
            self.config.precompute_heuristic,
        )
    }

    /// False once any limit has been hit; every search unwinds from then on.
    pub(crate) fn within_budget(&mut self) -> bool {
        if self.interrupted.is_some() {
            return false;
        }
        let estimated_bytes = self.stats.generated_states.saturating_mul(self.bytes_per_state);
        match self.budget.check(estimated_bytes) {
            Ok(()) => true,
            Err(reason) => {
                warn!("search interrupted: {reason}");
                self.interrupted = Some(reason);
                false
            }
        }
    }

    pub(crate) fn take_interrupted(&mut self) -> Option<String> {
        self.interrupted.take()
    }
}
