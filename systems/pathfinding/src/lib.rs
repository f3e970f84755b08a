#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tile-level A* search towards box-shaped goals.
//!
//! Routes are lists of [`Direction`] steps stored tail-first: the last
//! element is the first step to take, so callers consume them with `pop`.

use std::{cmp::Ordering, collections::BinaryHeap};

use skirmish_core::{Direction, GridGeometry, TileBox, TilePos};

/// Estimate of the remaining cost from a tile to the goal box.
///
/// Every variant measures towards the goal tile nearest to the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Heuristic {
    /// Straight-line distance.
    Euclidean,
    /// Exact eight-connected distance on an open grid.
    Octile,
    /// No estimate; the search degrades to Dijkstra.
    Zero,
}

impl Heuristic {
    fn estimate(self, from: TilePos, goal: &TileBox) -> f64 {
        let target = goal.clamp(from);
        match self {
            Self::Euclidean => from.distance(target),
            Self::Octile => {
                let dx = f64::from((target.column() - from.column()).abs());
                let dy = f64::from((target.row() - from.row()).abs());
                let (low, high) = if dx < dy { (dx, dy) } else { (dy, dx) };
                high - low + std::f64::consts::SQRT_2 * low
            }
            Self::Zero => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    estimate: f64,
    sequence: u64,
    index: usize,
    cost: f64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    // Reversed so the max-heap pops the lowest estimate, earliest insertion first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Reusable A* search over a fixed grid.
#[derive(Debug)]
pub struct Pathfinder {
    geometry: GridGeometry,
    costs: Vec<f64>,
    incoming: Vec<Option<Direction>>,
    open: BinaryHeap<OpenEntry>,
    sequence: u64,
}

impl Pathfinder {
    /// Creates a pathfinder with scratch buffers sized to the grid.
    #[must_use]
    pub fn new(geometry: GridGeometry) -> Self {
        let count = geometry.tile_count();
        Self {
            geometry,
            costs: vec![f64::INFINITY; count],
            incoming: vec![None; count],
            open: BinaryHeap::new(),
            sequence: 0,
        }
    }

    /// Searches for the cheapest route from `start` into any tile of `goal`.
    ///
    /// Orthogonal steps cost 1 and diagonal steps √2, minus `straight_bonus`
    /// when a step continues in the direction of the step before it. Diagonal
    /// steps require both orthogonally adjacent tiles to be passable. A tile
    /// already settled is expanded again whenever a cheaper cost reaches it.
    ///
    /// Returns an empty route when `start` lies inside `goal` or when no tile
    /// of `goal` is reachable.
    pub fn find_route<F>(
        &mut self,
        start: TilePos,
        goal: TileBox,
        heuristic: Heuristic,
        straight_bonus: f64,
        is_passable: F,
    ) -> Vec<Direction>
    where
        F: Fn(TilePos) -> bool,
    {
        let Some(start_index) = self.geometry.index(start) else {
            return Vec::new();
        };
        if goal.contains(start) {
            return Vec::new();
        }
        self.reset();

        self.costs[start_index] = 0.0;
        self.push(start_index, 0.0, heuristic.estimate(start, &goal));

        while let Some(entry) = self.open.pop() {
            if entry.cost > self.costs[entry.index] {
                continue;
            }
            let Some(tile) = self.geometry.tile_at(entry.index) else {
                continue;
            };
            if goal.contains(tile) {
                return self.trace(start, tile);
            }

            let previous = self.incoming[entry.index];
            for direction in Direction::ALL {
                let next = tile.neighbor(direction);
                let Some(next_index) = self.geometry.index(next) else {
                    continue;
                };
                if !is_passable(next) {
                    continue;
                }
                if let Some((first, second)) = direction.components() {
                    if !is_passable(tile.neighbor(first)) || !is_passable(tile.neighbor(second)) {
                        continue;
                    }
                }

                let mut step = direction.step_cost();
                if previous == Some(direction) {
                    step -= straight_bonus;
                }
                let cost = entry.cost + step;
                if cost < self.costs[next_index] {
                    self.costs[next_index] = cost;
                    self.incoming[next_index] = Some(direction);
                    self.push(next_index, cost, cost + heuristic.estimate(next, &goal));
                }
            }
        }

        Vec::new()
    }

    fn reset(&mut self) {
        self.costs.fill(f64::INFINITY);
        self.incoming.fill(None);
        self.open.clear();
        self.sequence = 0;
    }

    fn push(&mut self, index: usize, cost: f64, estimate: f64) {
        self.open.push(OpenEntry {
            estimate,
            sequence: self.sequence,
            index,
            cost,
        });
        self.sequence = self.sequence.wrapping_add(1);
    }

    fn trace(&self, start: TilePos, reached: TilePos) -> Vec<Direction> {
        let mut route = Vec::new();
        let mut tile = reached;
        while tile != start && route.len() < self.costs.len() {
            let Some(direction) = self
                .geometry
                .index(tile)
                .and_then(|index| self.incoming[index])
            else {
                break;
            };
            route.push(direction);
            tile = tile.neighbor(direction.opposite());
        }
        route
    }
}

/// Total cost of a tail-first route under the straight-path bonus.
#[must_use]
pub fn route_cost(route: &[Direction], straight_bonus: f64) -> f64 {
    let mut previous = None;
    let mut total = 0.0;
    for &direction in route.iter().rev() {
        total += direction.step_cost();
        if previous == Some(direction) {
            total -= straight_bonus;
        }
        previous = Some(direction);
    }
    total
}

/// Tile reached by following a tail-first route from `start`.
#[must_use]
pub fn route_destination(start: TilePos, route: &[Direction]) -> TilePos {
    route
        .iter()
        .rev()
        .fold(start, |tile, &direction| tile.neighbor(direction))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(columns: i32, rows: i32) -> (Pathfinder, GridGeometry) {
        let geometry = GridGeometry::new(columns, rows, 32);
        (Pathfinder::new(geometry), geometry)
    }

    #[test]
    fn orthogonal_route_costs_three() {
        let (mut finder, geometry) = open_grid(6, 6);
        let start = TilePos::new(0, 0);
        let goal = TilePos::new(3, 0);
        let route = finder.find_route(
            start,
            TileBox::single(goal),
            Heuristic::Octile,
            0.0,
            |tile| geometry.contains(tile),
        );
        assert_eq!(route.len(), 3);
        assert!((route_cost(&route, 0.0) - 3.0).abs() < 1e-9);
        assert_eq!(route_destination(start, &route), goal);
    }

    #[test]
    fn diagonal_route_costs_three_root_two() {
        let (mut finder, geometry) = open_grid(6, 6);
        let start = TilePos::new(0, 0);
        let goal = TilePos::new(3, 3);
        let route = finder.find_route(
            start,
            TileBox::single(goal),
            Heuristic::Euclidean,
            0.0,
            |tile| geometry.contains(tile),
        );
        assert!((route_cost(&route, 0.0) - 3.0 * std::f64::consts::SQRT_2).abs() < 1e-9);
        assert_eq!(route_destination(start, &route), goal);
    }

    #[test]
    fn straight_bonus_lowers_cost_of_straight_runs() {
        let (mut finder, geometry) = open_grid(6, 6);
        let bonus = 0.25;
        let route = finder.find_route(
            TilePos::new(0, 0),
            TileBox::single(TilePos::new(3, 0)),
            Heuristic::Zero,
            bonus,
            |tile| geometry.contains(tile),
        );
        let cost = route_cost(&route, bonus);
        assert!(cost <= 3.0);
        assert!(cost >= 3.0 - 2.0 * bonus - 1e-9);
    }

    #[test]
    fn wall_without_gap_yields_empty_route() {
        let (mut finder, geometry) = open_grid(7, 5);
        let route = finder.find_route(
            TilePos::new(0, 2),
            TileBox::single(TilePos::new(6, 2)),
            Heuristic::Octile,
            0.0,
            |tile| geometry.contains(tile) && tile.column() != 3,
        );
        assert!(route.is_empty());
    }

    #[test]
    fn diagonal_steps_do_not_cut_corners() {
        let (mut finder, geometry) = open_grid(3, 3);
        let blocked = TilePos::new(1, 0);
        let start = TilePos::new(0, 0);
        let goal = TilePos::new(1, 1);
        let route = finder.find_route(
            start,
            TileBox::single(goal),
            Heuristic::Octile,
            0.0,
            |tile| geometry.contains(tile) && tile != blocked,
        );
        assert_eq!(route, vec![Direction::East, Direction::South]);
    }

    #[test]
    fn box_goal_stops_at_nearest_edge() {
        let (mut finder, geometry) = open_grid(10, 3);
        let start = TilePos::new(0, 1);
        let goal = TileBox::new(TilePos::new(5, 0), TilePos::new(8, 2));
        let route = finder.find_route(start, goal, Heuristic::Octile, 0.0, |tile| {
            geometry.contains(tile)
        });
        assert_eq!(route.len(), 5);
        assert!(goal.contains(route_destination(start, &route)));
    }

    #[test]
    fn start_inside_goal_needs_no_route() {
        let (mut finder, geometry) = open_grid(4, 4);
        let route = finder.find_route(
            TilePos::new(2, 2),
            TileBox::new(TilePos::new(1, 1), TilePos::new(3, 3)),
            Heuristic::Octile,
            0.0,
            |tile| geometry.contains(tile),
        );
        assert!(route.is_empty());
    }

    #[test]
    fn scratch_buffers_are_reset_between_searches() {
        let (mut finder, geometry) = open_grid(8, 8);
        let wall = |tile: TilePos| geometry.contains(tile) && tile.column() != 4;
        assert!(finder
            .find_route(
                TilePos::new(0, 0),
                TileBox::single(TilePos::new(7, 7)),
                Heuristic::Octile,
                0.0,
                wall
            )
            .is_empty());

        let route = finder.find_route(
            TilePos::new(0, 0),
            TileBox::single(TilePos::new(2, 0)),
            Heuristic::Octile,
            0.0,
            |tile| geometry.contains(tile),
        );
        assert_eq!(route, vec![Direction::East, Direction::East]);
    }
}
