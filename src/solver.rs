mod matching;
mod mstar;

pub use mstar::MStar;

use thiserror::Error;

use crate::common::Solution;
use crate::config::Config;
use crate::scenario::ProblemError;

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid problem: {0}")]
    InvalidProblem(#[from] ProblemError),
    #[error("no solution found")]
    NoSolution,
    /// Memory cap, time limit or cancellation. Callers treat this like `NoSolution`.
    #[error("search stopped early: {0}")]
    ResourceExceeded(String),
}

pub trait Solver {
    fn solve(&mut self, config: &Config) -> Result<Solution, SolveError>;
}
