use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub costs: usize,
    pub time_us: usize,
    pub expanded_states: usize,
    pub generated_states: usize,
    pub sub_searches: usize,
    pub matchings_total: usize,
    pub matchings_searched: usize,
    pub matchings_pruned: usize,
    // Only filled when `report_expansions` is set.
    pub expansion_sizes: Vec<usize>,
}

impl Stats {
    pub fn print(&self) {
        info!(
            "Cost {:?} Time(microseconds) {:?} Expanded states: {:?} Generated states: {:?} Sub-searches: {:?} Matchings searched/pruned/total: {:?}/{:?}/{:?}",
            self.costs,
            self.time_us,
            self.expanded_states,
            self.generated_states,
            self.sub_searches,
            self.matchings_searched,
            self.matchings_pruned,
            self.matchings_total
        );
        if !self.expansion_sizes.is_empty() {
            let total: usize = self.expansion_sizes.iter().sum();
            info!(
                "Mean branching factor {:.2} over {} expansions",
                total as f64 / self.expansion_sizes.len() as f64,
                self.expansion_sizes.len()
            );
        }
    }
}
