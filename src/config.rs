use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

pub const BYTE: usize = 1;
pub const KILOBYTE: usize = BYTE * 1024;
pub const MEGABYTE: usize = KILOBYTE * 1024;
pub const GIGABYTE: usize = MEGABYTE * 1024;

/// How agents are assigned to goals within their own colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MatchingStrategy {
    /// Search every within-colour goal permutation.
    Prematch,
    /// Skip permutations whose lower bound cannot beat the best cost so far.
    PruningPrematch,
    /// Like pruning, but visit permutations in ascending lower-bound order.
    SortedPruningPrematch,
    /// Never fix the matching; agents head to the nearest goal of their colour.
    Inmatch,
}

#[derive(Parser, Debug)]
#[command(
    name = "Rust MAPFM",
    about = "M* for multi-agent pathfinding with teams, implemented in Rust.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the YAML scenario file")]
    pub scenario_path: Option<String>,

    #[arg(long, help = "Path to write the solution as JSON")]
    pub output_path: Option<String>,

    #[arg(long, help = "Optimization: operator decomposition")]
    pub operator_decomposition: Option<bool>,

    #[arg(long, help = "Use BFS distance tables for the heuristic")]
    pub precompute_heuristic: Option<bool>,

    #[arg(long, help = "Optimization: recursive M*")]
    pub recursive: Option<bool>,

    #[arg(long, value_enum, help = "Goal matching strategy")]
    pub matching_strategy: Option<MatchingStrategy>,

    #[arg(long, help = "Soft memory cap in bytes")]
    pub max_memory_usage: Option<usize>,

    #[arg(long, help = "Wall-clock budget in milliseconds")]
    pub time_limit_ms: Option<u64>,

    #[arg(long, help = "Enable debug logging", default_value_t = false)]
    pub debug: bool,

    #[arg(
        long,
        help = "Record the branching factor of each expansion",
        default_value_t = false
    )]
    pub report_expansions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scenario_path: String,
    pub output_path: Option<String>,
    pub operator_decomposition: bool,
    pub precompute_heuristic: bool,
    pub recursive: bool,
    pub matching_strategy: MatchingStrategy,
    pub max_memory_usage: usize,
    pub time_limit_ms: Option<u64>,
    pub debug: bool,
    pub report_expansions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scenario_path: "map_file/test/corridor.yaml".to_string(),
            output_path: None,
            operator_decomposition: true,
            precompute_heuristic: true,
            recursive: false,
            matching_strategy: MatchingStrategy::Inmatch,
            max_memory_usage: 3 * GIGABYTE,
            time_limit_ms: None,
            debug: false,
            report_expansions: false,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if let Some(scenario_path) = &cli.scenario_path {
            self.scenario_path = scenario_path.clone();
        }
        if let Some(output_path) = &cli.output_path {
            self.output_path = Some(output_path.clone());
        }
        if let Some(operator_decomposition) = cli.operator_decomposition {
            self.operator_decomposition = operator_decomposition;
        }
        if let Some(precompute_heuristic) = cli.precompute_heuristic {
            self.precompute_heuristic = precompute_heuristic;
        }
        if let Some(recursive) = cli.recursive {
            self.recursive = recursive;
        }
        if let Some(matching_strategy) = cli.matching_strategy {
            self.matching_strategy = matching_strategy;
        }
        if let Some(max_memory_usage) = cli.max_memory_usage {
            self.max_memory_usage = max_memory_usage;
        }
        if let Some(time_limit_ms) = cli.time_limit_ms {
            self.time_limit_ms = Some(time_limit_ms);
        }
        self.debug |= cli.debug;
        self.report_expansions |= cli.report_expansions;

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_memory_usage == 0 {
            return Err(anyhow!("Memory cap must be greater than 0"));
        }

        if self.time_limit_ms == Some(0) {
            return Err(anyhow!("Time limit must be greater than 0 milliseconds"));
        }

        Ok(())
    }

    pub fn prematch(&self) -> bool {
        !self.inmatch()
    }

    pub fn pruning_prematch(&self) -> bool {
        matches!(
            self.matching_strategy,
            MatchingStrategy::PruningPrematch | MatchingStrategy::SortedPruningPrematch
        )
    }

    pub fn inmatch(&self) -> bool {
        self.matching_strategy == MatchingStrategy::Inmatch
    }
}
