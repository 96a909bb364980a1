use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::map::{Coord, Map};

/// A start or goal cell tagged with the team colour it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkedLocation {
    pub x: usize,
    pub y: usize,
    pub colour: usize,
}

impl MarkedLocation {
    pub fn new(x: usize, y: usize, colour: usize) -> Self {
        MarkedLocation { x, y, colour }
    }

    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProblemError {
    #[error("problem has no agents")]
    NoAgents,
    #[error("colour {colour} has {starts} starts but {goals} goals")]
    ColourMismatch {
        colour: usize,
        starts: usize,
        goals: usize,
    },
    #[error("{kind} {location:?} lies outside the {width}x{height} map")]
    OutOfBounds {
        kind: &'static str,
        location: Coord,
        width: usize,
        height: usize,
    },
    #[error("{kind} {location:?} is on a wall")]
    OnWall { kind: &'static str, location: Coord },
    #[error("{kind} {location:?} is listed more than once")]
    Duplicate { kind: &'static str, location: Coord },
}

/// A validated MAPFM instance: grid, coloured starts and coloured goals.
#[derive(Debug, Clone)]
pub struct Problem {
    pub map: Map,
    pub starts: Vec<MarkedLocation>,
    pub goals: Vec<MarkedLocation>,
}

impl Problem {
    pub fn new(
        map: Map,
        starts: Vec<MarkedLocation>,
        goals: Vec<MarkedLocation>,
    ) -> Result<Self, ProblemError> {
        let problem = Problem { map, starts, goals };
        problem.validate()?;
        Ok(problem)
    }

    pub fn num_agents(&self) -> usize {
        self.starts.len()
    }

    pub fn validate(&self) -> Result<(), ProblemError> {
        if self.starts.is_empty() {
            return Err(ProblemError::NoAgents);
        }

        for (kind, locations) in [("start", &self.starts), ("goal", &self.goals)] {
            let mut seen = HashSet::new();
            for location in locations {
                let coord = location.coord();
                if !self.map.in_bounds(coord) {
                    return Err(ProblemError::OutOfBounds {
                        kind,
                        location: coord,
                        width: self.map.width,
                        height: self.map.height,
                    });
                }
                if !self.map.is_passable(coord) {
                    return Err(ProblemError::OnWall {
                        kind,
                        location: coord,
                    });
                }
                if !seen.insert(coord) {
                    return Err(ProblemError::Duplicate {
                        kind,
                        location: coord,
                    });
                }
            }
        }

        let mut cardinality: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
        for start in &self.starts {
            cardinality.entry(start.colour).or_default().0 += 1;
        }
        for goal in &self.goals {
            cardinality.entry(goal.colour).or_default().1 += 1;
        }
        if let Some((&colour, &(starts, goals))) = cardinality
            .iter()
            .find(|(_, (starts, goals))| starts != goals)
        {
            return Err(ProblemError::ColourMismatch {
                colour,
                starts,
                goals,
            });
        }

        Ok(())
    }
}

/// Problem description as stored on disk. The grid is either inline or a map file.
#[derive(Debug, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub map_path: Option<String>,
    #[serde(default)]
    pub grid: Option<Vec<String>>,
    pub starts: Vec<MarkedLocation>,
    pub goals: Vec<MarkedLocation>,
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open scenario {path}"))?;
        let reader = BufReader::new(file);
        let mut scenario: Scenario = serde_yaml::from_reader(reader)
            .with_context(|| format!("failed to parse scenario {path}"))?;

        // Map paths are relative to the scenario file.
        if let Some(map_path) = scenario.map_path.as_mut() {
            if Path::new(map_path.as_str()).is_relative() {
                if let Some(parent) = Path::new(path).parent() {
                    *map_path = parent.join(&*map_path).to_string_lossy().into_owned();
                }
            }
        }
        Ok(scenario)
    }

    pub fn to_problem(&self) -> anyhow::Result<Problem> {
        let map = match (&self.map_path, &self.grid) {
            (Some(_), Some(_)) => {
                return Err(anyhow!("scenario sets both `map_path` and `grid`"));
            }
            (Some(map_path), None) => Map::from_file(map_path)?,
            (None, Some(rows)) => Map::from_rows(rows)?,
            (None, None) => return Err(anyhow!("scenario needs `map_path` or `grid`")),
        };

        let problem = Problem::new(map, self.starts.clone(), self.goals.clone())?;
        info!(
            "Loaded problem: {}x{} map, {} agents",
            problem.map.width,
            problem.map.height,
            problem.num_agents()
        );
        Ok(problem)
    }
}
