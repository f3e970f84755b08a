//! Grid-bucketed spatial index of agent bounding ellipses.
//!
//! Every query that can hit terrain follows the same three-way convention:
//! `None` means the probe left the map or touched impassable terrain, an
//! empty list means the way is clear, and a non-empty list names the agents
//! in the way.

use std::collections::BTreeMap;

use skirmish_core::{
    geometry::scale_to_length, AgentId, GridGeometry, PixelPos, Radii, TilePos, Vector,
};

use crate::terrain::Terrain;

/// Sampling strategy for [`SpatialIndex::ray_query`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RayMode {
    /// Bresenham walk over every pixel, testing terrain and agents.
    Precise,
    /// Terrain-only samples spaced `spacing` pixels apart.
    Rough {
        /// Distance between consecutive samples in pixels.
        spacing: f64,
    },
}

#[derive(Clone, Debug)]
struct Body {
    pixel: PixelPos,
    radii: Radii,
    cells: Vec<TilePos>,
}

/// Occupancy index mapping tiles to the agents whose footprint overlaps them.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    geometry: GridGeometry,
    passable: Vec<bool>,
    buckets: Vec<Vec<AgentId>>,
    bodies: BTreeMap<AgentId, Body>,
}

impl SpatialIndex {
    /// Creates an empty index over the terrain.
    #[must_use]
    pub fn new(geometry: GridGeometry, terrain: &Terrain) -> Self {
        Self {
            geometry,
            passable: terrain.passability(),
            buckets: vec![Vec::new(); geometry.tile_count()],
            bodies: BTreeMap::new(),
        }
    }

    /// Inserts the agent into every tile its footprint overlaps.
    ///
    /// Returns `false` without registering when the footprint is blocked.
    pub fn register(&mut self, agent: AgentId, pixel: PixelPos, radii: Radii) -> bool {
        let Some(cells) = self.footprint(pixel, radii) else {
            return false;
        };
        for &cell in &cells {
            self.bucket_insert(cell, agent);
        }
        let _ = self.bodies.insert(
            agent,
            Body {
                pixel,
                radii,
                cells,
            },
        );
        true
    }

    /// Erases the agent from every tile it occupies.
    pub fn remove(&mut self, agent: AgentId) {
        let Some(body) = self.bodies.remove(&agent) else {
            return;
        };
        for cell in body.cells {
            self.bucket_remove(cell, agent);
        }
    }

    /// Re-indexes the agent after its pixel position changed.
    ///
    /// The footprint is recomputed for the new pixel and the buckets are only
    /// touched when the covered tile set differs. A blocked footprint is
    /// refused and leaves the body untouched. Returns whether the cell set
    /// changed.
    pub fn update_occupancy(&mut self, agent: AgentId, pixel: PixelPos) -> bool {
        let Some(body) = self.bodies.get(&agent) else {
            return false;
        };
        if body.pixel == pixel {
            return false;
        }
        let radii = body.radii;
        let Some(cells) = self.footprint(pixel, radii) else {
            tracing::debug!(agent = agent.get(), ?pixel, "footprint blocked");
            return false;
        };

        let previous = match self.bodies.get_mut(&agent) {
            Some(body) => {
                body.pixel = pixel;
                if same_cells(&body.cells, &cells) {
                    return false;
                }
                std::mem::replace(&mut body.cells, cells.clone())
            }
            None => return false,
        };
        for cell in previous {
            self.bucket_remove(cell, agent);
        }
        for cell in cells {
            self.bucket_insert(cell, agent);
        }
        true
    }

    /// Tiles currently indexed for the agent.
    #[must_use]
    pub fn occupied_cells(&self, agent: AgentId) -> Option<&[TilePos]> {
        self.bodies.get(&agent).map(|body| body.cells.as_slice())
    }

    /// Agents indexed in the tile.
    #[must_use]
    pub fn occupants(&self, tile: TilePos) -> &[AgentId] {
        self.geometry
            .index(tile)
            .and_then(|index| self.buckets.get(index))
            .map_or(&[], Vec::as_slice)
    }

    /// Tiles overlapped by an ellipse at `center`.
    ///
    /// Only the four boundary directions are sampled against tile edges; a
    /// diagonal neighbour is included when the tile corner nearest the centre
    /// lies inside the ellipse. Returns `None` when the ellipse leaves the map
    /// or any overlapped tile is impassable.
    #[must_use]
    pub fn footprint(&self, center: PixelPos, radii: Radii) -> Option<Vec<TilePos>> {
        if self.out_of_bounds(center, radii) {
            return None;
        }

        let tile = self.geometry.tile_size();
        let rx = i32::from(radii.x());
        let ry = i32::from(radii.y());
        let current = self.geometry.tile_of(center);
        let (cx, cy) = (current.column(), current.row());

        let horizontal = if (center.x() + rx) / tile > cx {
            Some(cx + 1)
        } else if (center.x() - rx) / tile < cx {
            Some(cx - 1)
        } else {
            None
        };
        let vertical = if (center.y() + ry) / tile > cy {
            Some(cy + 1)
        } else if (center.y() - ry) / tile < cy {
            Some(cy - 1)
        } else {
            None
        };

        let mut cells = Vec::with_capacity(4);
        cells.push(current);
        if let Some(column) = horizontal {
            cells.push(TilePos::new(column, cy));
        }
        if let Some(row) = vertical {
            cells.push(TilePos::new(cx, row));
        }
        if let (Some(column), Some(row)) = (horizontal, vertical) {
            let corner_x = if column > cx {
                tile * column
            } else {
                tile * (column + 1) - 1
            };
            let corner_y = if row > cy {
                tile * row
            } else {
                tile * (row + 1) - 1
            };
            if radii.contains(center, PixelPos::new(corner_x, corner_y)) {
                cells.push(TilePos::new(column, row));
            }
        }

        cells
            .iter()
            .all(|&cell| self.is_passable(cell))
            .then_some(cells)
    }

    /// Distinct agents, other than `agent`, whose ellipse overlaps the
    /// agent's ellipse placed at `candidate`.
    ///
    /// A blocked footprint yields an empty list; use [`Self::clip_check`]
    /// when terrain matters.
    #[must_use]
    pub fn query_agent_overlap(&self, agent: AgentId, candidate: PixelPos) -> Vec<AgentId> {
        let Some(radii) = self.bodies.get(&agent).map(|body| body.radii) else {
            return Vec::new();
        };
        self.footprint(candidate, radii)
            .map(|cells| self.overlaps_in(agent, candidate, radii, &cells))
            .unwrap_or_default()
    }

    /// Terrain check at `candidate`, followed by the agent overlap test when
    /// `with_agents` is set.
    #[must_use]
    pub fn clip_check(
        &self,
        agent: AgentId,
        candidate: PixelPos,
        with_agents: bool,
    ) -> Option<Vec<AgentId>> {
        let radii = self.bodies.get(&agent)?.radii;
        let cells = self.footprint(candidate, radii)?;
        if with_agents {
            Some(self.overlaps_in(agent, candidate, radii, &cells))
        } else {
            Some(Vec::new())
        }
    }

    /// Sweeps the agent's ellipse from `start` to `end`.
    ///
    /// The terminal point is tested first. [`RayMode::Precise`] then walks the
    /// pixel line and returns at the first terrain block or the first
    /// non-empty overlap. [`RayMode::Rough`] samples terrain only, every
    /// `spacing` pixels.
    #[must_use]
    pub fn ray_query(
        &self,
        agent: AgentId,
        start: Vector,
        end: Vector,
        mode: RayMode,
    ) -> Option<Vec<AgentId>> {
        match mode {
            RayMode::Precise => self.ray_precise(
                agent,
                self.geometry.pixel_of(start),
                self.geometry.pixel_of(end),
            ),
            RayMode::Rough { spacing } => self.ray_rough(agent, start, end, spacing),
        }
    }

    /// Distinct agents whose pixel lies inside the rectangle grown by their radii.
    #[must_use]
    pub fn agents_in_box(&self, top_left: PixelPos, bottom_right: PixelPos) -> Vec<AgentId> {
        let tile = self.geometry.tile_size();
        let column_min = (top_left.x() / tile).max(0);
        let column_max = (bottom_right.x() / tile).min(self.geometry.columns() - 1);
        let row_min = (top_left.y() / tile).max(0);
        let row_max = (bottom_right.y() / tile).min(self.geometry.rows() - 1);

        let mut selected = Vec::new();
        for row in row_min..=row_max {
            for column in column_min..=column_max {
                for &agent in self.occupants(TilePos::new(column, row)) {
                    let Some(body) = self.bodies.get(&agent) else {
                        continue;
                    };
                    let rx = i32::from(body.radii.x());
                    let ry = i32::from(body.radii.y());
                    let inside = body.pixel.x() >= top_left.x() - rx
                        && body.pixel.x() <= bottom_right.x() + rx
                        && body.pixel.y() >= top_left.y() - ry
                        && body.pixel.y() <= bottom_right.y() + ry;
                    if inside {
                        selected.push(agent);
                    }
                }
            }
        }
        selected.sort_unstable();
        selected.dedup();
        selected
    }

    fn ray_precise(
        &self,
        agent: AgentId,
        start: PixelPos,
        end: PixelPos,
    ) -> Option<Vec<AgentId>> {
        let terminal = self.clip_check(agent, end, true)?;
        if !terminal.is_empty() {
            return Some(terminal);
        }

        let mut dx = (end.x() - start.x()).abs();
        let mut dy = (end.y() - start.y()).abs();
        let mut x = start.x();
        let mut y = start.y();
        let x_inc = if end.x() > start.x() { 1 } else { -1 };
        let y_inc = if end.y() > start.y() { 1 } else { -1 };
        let mut error = dx - dy;
        let steps = dx + dy;
        dx *= 2;
        dy *= 2;

        for _ in 0..steps {
            let collision = self.clip_check(agent, PixelPos::new(x, y), true)?;
            if !collision.is_empty() {
                return Some(collision);
            }
            if error > 0 {
                x += x_inc;
                error -= dy;
            } else {
                y += y_inc;
                error += dx;
            }
        }

        Some(Vec::new())
    }

    fn ray_rough(
        &self,
        agent: AgentId,
        start: Vector,
        end: Vector,
        spacing: f64,
    ) -> Option<Vec<AgentId>> {
        let _ = self.clip_check(agent, self.geometry.pixel_of(end), false)?;

        let difference = end - start;
        let length = difference.length();
        if length <= 0.0 || spacing <= 0.0 {
            return Some(Vec::new());
        }
        let step = scale_to_length(difference, spacing);
        let samples = (length / spacing).ceil() as u32;

        let mut position = start;
        for _ in 0..samples {
            let _ = self.clip_check(agent, self.geometry.pixel_of(position), false)?;
            position += step;
        }
        Some(Vec::new())
    }

    fn overlaps_in(
        &self,
        agent: AgentId,
        candidate: PixelPos,
        radii: Radii,
        cells: &[TilePos],
    ) -> Vec<AgentId> {
        let mut overlapping = Vec::new();
        for &cell in cells {
            for &other in self.occupants(cell) {
                if other == agent || overlapping.contains(&other) {
                    continue;
                }
                let Some(body) = self.bodies.get(&other) else {
                    continue;
                };
                if radii.overlaps(candidate, body.radii, body.pixel) {
                    overlapping.push(other);
                }
            }
        }
        overlapping.sort_unstable();
        overlapping
    }

    fn out_of_bounds(&self, center: PixelPos, radii: Radii) -> bool {
        let rx = i32::from(radii.x());
        let ry = i32::from(radii.y());
        center.x() - rx < 0
            || center.y() - ry < 0
            || center.x() + rx >= self.geometry.pixel_width()
            || center.y() + ry >= self.geometry.pixel_height()
    }

    fn is_passable(&self, tile: TilePos) -> bool {
        self.geometry
            .index(tile)
            .and_then(|index| self.passable.get(index).copied())
            .unwrap_or(false)
    }

    fn bucket_insert(&mut self, tile: TilePos, agent: AgentId) {
        let Some(bucket) = self
            .geometry
            .index(tile)
            .and_then(|index| self.buckets.get_mut(index))
        else {
            return;
        };
        if let Err(position) = bucket.binary_search(&agent) {
            bucket.insert(position, agent);
        }
    }

    fn bucket_remove(&mut self, tile: TilePos, agent: AgentId) {
        let Some(bucket) = self
            .geometry
            .index(tile)
            .and_then(|index| self.buckets.get_mut(index))
        else {
            return;
        };
        if let Ok(position) = bucket.binary_search(&agent) {
            let _ = bucket.remove(position);
        }
    }
}

/// Positions after pushing two overlapping ellipses apart.
///
/// Each agent moves by half the shortfall between the preferred distance
/// `sqrt((rx1+rx2)² + (ry1+ry2)²)` and their actual distance, along the line
/// between their centres. Returns `None` when they are already far enough
/// apart. Overlaps this creates with third agents are not resolved.
#[must_use]
pub fn resolve_overlap(
    first: Vector,
    first_radii: Radii,
    second: Vector,
    second_radii: Radii,
) -> Option<(Vector, Vector)> {
    let sum = first_radii.sum(second_radii);
    let preferred = f64::from(sum.x()).hypot(f64::from(sum.y()));
    let half_shortfall = 0.5 * (preferred - first.distance(second));
    if half_shortfall < 0.0 {
        return None;
    }
    let mover = scale_to_length(first - second, half_shortfall);
    Some((first + mover, second - mover))
}

fn same_cells(current: &[TilePos], next: &[TilePos]) -> bool {
    current.len() == next.len() && current.iter().all(|cell| next.contains(cell))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GNOME: Radii = Radii::new(8, 5);

    fn open_index(columns: u16, rows: u16) -> SpatialIndex {
        let terrain = Terrain::open(columns, rows);
        SpatialIndex::new(terrain.geometry(32), &terrain)
    }

    fn sorted(mut cells: Vec<TilePos>) -> Vec<TilePos> {
        cells.sort_unstable();
        cells
    }

    #[test]
    fn footprint_inside_single_tile() {
        let index = open_index(4, 4);
        let cells = index.footprint(PixelPos::new(48, 48), GNOME);
        assert_eq!(cells, Some(vec![TilePos::new(1, 1)]));
    }

    #[test]
    fn footprint_straddling_corner_includes_diagonal_when_vertex_inside() {
        let index = open_index(4, 4);
        let cells = index
            .footprint(PixelPos::new(63, 63), GNOME)
            .expect("open terrain");
        assert_eq!(
            sorted(cells),
            vec![
                TilePos::new(1, 1),
                TilePos::new(1, 2),
                TilePos::new(2, 1),
                TilePos::new(2, 2)
            ]
        );
    }

    #[test]
    fn footprint_skips_diagonal_when_vertex_outside() {
        let index = open_index(4, 4);
        // Right and bottom edges cross, but the corner pixel (64, 64) lies
        // outside the ellipse centred at (57, 61).
        let cells = index
            .footprint(PixelPos::new(57, 61), GNOME)
            .expect("open terrain");
        assert_eq!(
            sorted(cells),
            vec![TilePos::new(1, 1), TilePos::new(1, 2), TilePos::new(2, 1)]
        );
    }

    #[test]
    fn footprint_rejects_map_edges_and_rock() {
        let terrain = Terrain::from_layout(&["....", "..#.", "....", "...."]).expect("layout");
        let index = SpatialIndex::new(terrain.geometry(32), &terrain);
        assert_eq!(index.footprint(PixelPos::new(7, 40), GNOME), None);
        assert_eq!(index.footprint(PixelPos::new(60, 48), GNOME), None);
        assert!(index.footprint(PixelPos::new(48, 48), GNOME).is_some());
    }

    #[test]
    fn update_occupancy_tracks_footprint_of_committed_moves() {
        let mut index = open_index(6, 6);
        let agent = AgentId::new(0);
        assert!(index.register(agent, PixelPos::new(48, 48), GNOME));

        for pixel in [
            PixelPos::new(52, 48),
            PixelPos::new(58, 50),
            PixelPos::new(63, 63),
            PixelPos::new(70, 70),
            PixelPos::new(100, 90),
            PixelPos::new(40, 60),
        ] {
            let _ = index.update_occupancy(agent, pixel);
            let expected = sorted(index.footprint(pixel, GNOME).expect("open"));
            let actual = sorted(index.occupied_cells(agent).expect("registered").to_vec());
            assert_eq!(actual, expected, "mismatch at {pixel:?}");
            for cell in &actual {
                assert!(index.occupants(*cell).contains(&agent));
            }
        }
    }

    #[test]
    fn blocked_update_leaves_body_untouched() {
        let terrain = Terrain::from_layout(&["....", "..#.", "....", "...."]).expect("layout");
        let mut index = SpatialIndex::new(terrain.geometry(32), &terrain);
        let agent = AgentId::new(0);
        let start = PixelPos::new(48, 48);
        assert!(index.register(agent, start, GNOME));
        let before = index.occupied_cells(agent).expect("registered").to_vec();

        assert!(!index.update_occupancy(agent, PixelPos::new(60, 48)));
        assert_eq!(index.occupied_cells(agent), Some(before.as_slice()));
        assert_eq!(index.footprint(start, GNOME), Some(before));
    }

    #[test]
    fn remove_clears_every_bucket() {
        let mut index = open_index(4, 4);
        let agent = AgentId::new(3);
        assert!(index.register(agent, PixelPos::new(63, 63), GNOME));
        index.remove(agent);
        for row in 0..4 {
            for column in 0..4 {
                assert!(index.occupants(TilePos::new(column, row)).is_empty());
            }
        }
        assert!(index.occupied_cells(agent).is_none());
    }

    #[test]
    fn overlap_excludes_self_and_reports_each_agent_once() {
        let mut index = open_index(6, 6);
        let mover = AgentId::new(0);
        let blocker = AgentId::new(1);
        assert!(index.register(mover, PixelPos::new(40, 48), GNOME));
        assert!(index.register(blocker, PixelPos::new(63, 63), GNOME));

        assert!(index
            .query_agent_overlap(mover, PixelPos::new(40, 48))
            .is_empty());
        assert_eq!(
            index.query_agent_overlap(mover, PixelPos::new(60, 60)),
            vec![blocker]
        );
    }

    #[test]
    fn precise_ray_is_clear_on_open_line() {
        let mut index = open_index(8, 3);
        let agent = AgentId::new(0);
        assert!(index.register(agent, PixelPos::new(16, 48), GNOME));
        let result = index.ray_query(
            agent,
            Vector::new(16.0, 48.0),
            Vector::new(200.0, 48.0),
            RayMode::Precise,
        );
        assert_eq!(result, Some(Vec::new()));
    }

    #[test]
    fn precise_ray_stops_at_first_blocking_agent() {
        // Rock at column 6 lies between the blocker and the terminal point.
        let terrain = Terrain::from_layout(&["........", "......#.", "........"]).expect("layout");
        let mut index = SpatialIndex::new(terrain.geometry(32), &terrain);
        let agent = AgentId::new(0);
        let blocker = AgentId::new(1);
        assert!(index.register(agent, PixelPos::new(16, 48), GNOME));
        assert!(index.register(blocker, PixelPos::new(112, 48), GNOME));

        let result = index.ray_query(
            agent,
            Vector::new(16.0, 48.0),
            Vector::new(240.0, 48.0),
            RayMode::Precise,
        );
        assert_eq!(result, Some(vec![blocker]));
    }

    #[test]
    fn precise_ray_checks_terminal_point_first() {
        let terrain = Terrain::from_layout(&["....#...", "........"]).expect("layout");
        let mut index = SpatialIndex::new(terrain.geometry(32), &terrain);
        let agent = AgentId::new(0);
        let blocker = AgentId::new(1);
        assert!(index.register(agent, PixelPos::new(16, 48), GNOME));
        assert!(index.register(blocker, PixelPos::new(80, 48), GNOME));

        let result = index.ray_query(
            agent,
            Vector::new(16.0, 48.0),
            Vector::new(144.0, 16.0),
            RayMode::Precise,
        );
        assert_eq!(result, None);
    }

    #[test]
    fn rough_ray_ignores_agents_but_not_terrain() {
        let terrain = Terrain::from_layout(&["........", "....#...", "........"]).expect("layout");
        let mut index = SpatialIndex::new(terrain.geometry(32), &terrain);
        let agent = AgentId::new(0);
        assert!(index.register(agent, PixelPos::new(16, 16), GNOME));
        assert!(index.register(AgentId::new(1), PixelPos::new(80, 16), GNOME));

        let clear = index.ray_query(
            agent,
            Vector::new(16.0, 16.0),
            Vector::new(240.0, 16.0),
            RayMode::Rough { spacing: 8.0 },
        );
        assert_eq!(clear, Some(Vec::new()));

        let blocked = index.ray_query(
            agent,
            Vector::new(16.0, 48.0),
            Vector::new(240.0, 48.0),
            RayMode::Rough { spacing: 8.0 },
        );
        assert_eq!(blocked, None);
    }

    #[test]
    fn resolve_overlap_pushes_both_agents_symmetrically() {
        let first = Vector::new(100.0, 100.0);
        let second = Vector::new(90.0, 100.0);
        let (moved_first, moved_second) =
            resolve_overlap(first, GNOME, second, GNOME).expect("overlapping");
        let preferred = 16.0_f64.hypot(10.0);
        assert!((moved_first.distance(moved_second) - preferred).abs() < 1e-9);
        assert!((moved_first.x - 100.0 - (preferred - 10.0) / 2.0).abs() < 1e-9);
        assert!((moved_first.y - 100.0).abs() < 1e-12);
        assert!(resolve_overlap(first, GNOME, Vector::new(0.0, 0.0), GNOME).is_none());
    }

    #[test]
    fn agents_in_box_selects_each_agent_once() {
        let mut index = open_index(8, 8);
        for (raw, pixel) in [
            (0, PixelPos::new(63, 63)),
            (1, PixelPos::new(100, 40)),
            (2, PixelPos::new(200, 200)),
        ] {
            assert!(index.register(AgentId::new(raw), pixel, GNOME));
        }
        let selected = index.agents_in_box(PixelPos::new(40, 30), PixelPos::new(110, 70));
        assert_eq!(selected, vec![AgentId::new(0), AgentId::new(1)]);
    }
}
