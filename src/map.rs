use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Cell on the grid. `x` is the column and `y` the row.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize) -> Self {
        Coord { x, y }
    }

    pub fn manhattan_distance(&self, other: Coord) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Debug for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    passable: bool,
    pub neighbors: Vec<Coord>, // Accessible 4-connected neighbors
    pub moves: Vec<Coord>,     // Waiting in place first, then the neighbors
}

impl Tile {
    pub fn is_passable(&self) -> bool {
        self.passable
    }
}

/// Static wall map, read-only for the lifetime of a search.
#[derive(Debug, Clone)]
pub struct Map {
    pub height: usize,
    pub width: usize,
    pub grid: Vec<Vec<Tile>>,
}

impl Map {
    /// Load a map in the grid benchmark format (`type`, `height`, `width`, `map`, rows).
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open map {path}"))?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let _type = lines
            .next()
            .ok_or_else(|| anyhow!("map {path} is empty"))??;

        let mut header_value = |key: &str| -> anyhow::Result<usize> {
            let line = lines
                .next()
                .ok_or_else(|| anyhow!("map {path} ends before `{key}`"))??;
            line.split_whitespace()
                .last()
                .ok_or_else(|| anyhow!("missing value for `{key}`"))?
                .parse::<usize>()
                .with_context(|| format!("invalid `{key}` in map {path}"))
        };

        let height = header_value("height")?;
        let width = header_value("width")?;
        let _map = lines.next().ok_or_else(|| anyhow!("missing `map` line"))??;

        let mut rows = Vec::with_capacity(height);
        for line in lines.take(height) {
            rows.push(line?);
        }
        if rows.len() != height {
            return Err(anyhow!(
                "map {path} declares {height} rows but has {}",
                rows.len()
            ));
        }

        let map = Map::from_rows(&rows)?;
        if map.width != width {
            return Err(anyhow!(
                "map {path} declares width {width} but rows have width {}",
                map.width
            ));
        }
        Ok(map)
    }

    /// Build a map from text rows: `.` is passable, anything else is a wall.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> anyhow::Result<Self> {
        let walls: Vec<Vec<bool>> = rows
            .iter()
            .map(|row| row.as_ref().trim_end().chars().map(|ch| ch != '.').collect())
            .collect();
        Map::from_walls(&walls)
    }

    /// Build a map from a wall mask indexed `[y][x]`.
    pub fn from_walls(walls: &[Vec<bool>]) -> anyhow::Result<Self> {
        let height = walls.len();
        let width = walls.first().map_or(0, |row| row.len());
        if let Some(y) = walls.iter().position(|row| row.len() != width) {
            return Err(anyhow!("row {y} has a different width than row 0"));
        }

        let grid = walls
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&wall| Tile {
                        passable: !wall,
                        neighbors: Vec::new(),
                        moves: Vec::new(),
                    })
                    .collect()
            })
            .collect();

        let mut map = Map {
            height,
            width,
            grid,
        };
        map.initialize_neighbors();
        Ok(map)
    }

    fn initialize_neighbors(&mut self) {
        for y in 0..self.height {
            for x in 0..self.width {
                if self.grid[y][x].passable {
                    let neighbors = self.get_neighbors(Coord::new(x, y));
                    let mut moves = Vec::with_capacity(neighbors.len() + 1);
                    moves.push(Coord::new(x, y));
                    moves.extend_from_slice(&neighbors);

                    let tile = &mut self.grid[y][x];
                    tile.neighbors = neighbors;
                    tile.moves = moves;
                }
            }
        }
    }

    fn get_neighbors(&self, position: Coord) -> Vec<Coord> {
        let directions = [(0, -1), (0, 1), (1, 0), (-1, 0)]; // Up, down, right, left
        let mut neighbors = Vec::new();

        for &(dx, dy) in &directions {
            let new_x = position.x as i64 + dx;
            let new_y = position.y as i64 + dy;
            if new_x >= 0
                && new_y >= 0
                && new_x < self.width as i64
                && new_y < self.height as i64
                && self.grid[new_y as usize][new_x as usize].passable
            {
                neighbors.push(Coord::new(new_x as usize, new_y as usize));
            }
        }

        neighbors
    }

    pub fn in_bounds(&self, position: Coord) -> bool {
        position.x < self.width && position.y < self.height
    }

    pub fn is_passable(&self, position: Coord) -> bool {
        self.in_bounds(position) && self.grid[position.y][position.x].is_passable()
    }

    /// `position` itself plus every in-bounds, non-wall 4-neighbor.
    pub fn get_empty_moves(&self, position: Coord) -> &[Coord] {
        &self.grid[position.y][position.x].moves
    }

    pub fn get_empty_neighbors(&self, position: Coord) -> &[Coord] {
        &self.grid[position.y][position.x].neighbors
    }

    /// Breadth-first move costs from every cell to `goal`.
    pub fn distance_table(&self, goal: Coord) -> DistanceTable {
        let mut distances = vec![vec![usize::MAX; self.width]; self.height];
        let mut queue = VecDeque::new();

        distances[goal.y][goal.x] = 0;
        queue.push_back(goal);

        while let Some(current) = queue.pop_front() {
            let next_cost = distances[current.y][current.x] + 1;
            for neighbor in self.get_empty_neighbors(current) {
                if distances[neighbor.y][neighbor.x] == usize::MAX {
                    distances[neighbor.y][neighbor.x] = next_cost;
                    queue.push_back(*neighbor);
                }
            }
        }

        DistanceTable { goal, distances }
    }
}

/// Move cost to reach one goal cell; `usize::MAX` marks unreachable cells.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    pub goal: Coord,
    distances: Vec<Vec<usize>>,
}

impl DistanceTable {
    pub fn get(&self, position: Coord) -> usize {
        self.distances[position.y][position.x]
    }

    pub fn is_reachable(&self, position: Coord) -> bool {
        self.get(position) != usize::MAX
    }
}
