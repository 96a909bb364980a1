use mapfm_rust::config::{Cli, Config};
use mapfm_rust::scenario::Scenario;
use mapfm_rust::solver::{MStar, SolveError, Solver};

use anyhow::{ensure, Context};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_file) = cli.config.as_ref() {
        let config_str = std::fs::read_to_string(config_file)
            .with_context(|| format!("failed to read config file: {config_file}"))?;
        Config::from_yaml_str(&config_str)
            .with_context(|| format!("error with config file: {config_file}"))?
    } else {
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
    info!("{config:?}");

    let scenario = Scenario::load_from_file(&config.scenario_path)?;
    let problem = scenario.to_problem()?;

    let mut solver = MStar::new(problem.clone());
    match solver.solve(&config) {
        Ok(solution) => {
            ensure!(
                solution.verify(&problem),
                "solution failed verification: {solution:?}"
            );
            info!(
                "solution with cost {} and makespan {}",
                solution.cost,
                solution.makespan()
            );
            if let Some(output_path) = &config.output_path {
                let file = File::create(output_path)
                    .with_context(|| format!("failed to create {output_path}"))?;
                serde_json::to_writer_pretty(BufWriter::new(file), &solution)?;
                info!("solution written to {output_path}");
            }
        }
        Err(SolveError::InvalidProblem(err)) => return Err(err.into()),
        Err(err) => error!("M* solve fails: {err}"),
    }

    Ok(())
}
