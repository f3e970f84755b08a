//! Coordinate spaces, grid directions and ellipse primitives.
//!
//! Positions live in three spaces that never mix implicitly: [`TilePos`]
//! addresses a coarse grid tile, [`PixelPos`] addresses a single pixel and
//! [`Vector`] carries the unconstrained continuous position. Conversions run
//! through [`GridGeometry`] so every subsystem agrees on the same mapping.

use serde::{Deserialize, Serialize};

/// Continuous two-dimensional vector used for agent positions and steps.
pub type Vector = glam::DVec2;

/// Location of a tile expressed as column and row indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    column: i32,
    row: i32,
}

impl TilePos {
    /// Creates a new tile coordinate.
    #[must_use]
    pub const fn new(column: i32, row: i32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the tile.
    #[must_use]
    pub const fn column(&self) -> i32 {
        self.column
    }

    /// Zero-based row index of the tile.
    #[must_use]
    pub const fn row(&self) -> i32 {
        self.row
    }

    /// Tile reached by taking a single step in the provided direction.
    #[must_use]
    pub const fn neighbor(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self::new(self.column + dx, self.row + dy)
    }

    /// Euclidean distance between two tile coordinates measured in tiles.
    #[must_use]
    pub fn distance(self, other: TilePos) -> f64 {
        let dx = f64::from(self.column - other.column);
        let dy = f64::from(self.row - other.row);
        dx.hypot(dy)
    }
}

/// Location of a single pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelPos {
    x: i32,
    y: i32,
}

impl PixelPos {
    /// Creates a new pixel coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Horizontal pixel index.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Vertical pixel index.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.y
    }

    /// Continuous vector pointing at the pixel's origin.
    #[must_use]
    pub fn to_vector(self) -> Vector {
        Vector::new(f64::from(self.x), f64::from(self.y))
    }
}

/// Eight-way grid directions in clockwise order starting at north-east.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Decreasing row, increasing column.
    NorthEast,
    /// Increasing column.
    East,
    /// Increasing row, increasing column.
    SouthEast,
    /// Increasing row.
    South,
    /// Increasing row, decreasing column.
    SouthWest,
    /// Decreasing column.
    West,
    /// Decreasing row, decreasing column.
    NorthWest,
    /// Decreasing row.
    North,
}

impl Direction {
    /// Every direction in clockwise order.
    pub const ALL: [Direction; 8] = [
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
        Direction::North,
    ];

    /// Column and row delta produced by a single step.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
            Self::North => (0, -1),
        }
    }

    /// Reports whether the step changes both column and row.
    #[must_use]
    pub const fn is_diagonal(self) -> bool {
        matches!(
            self,
            Self::NorthEast | Self::SouthEast | Self::SouthWest | Self::NorthWest
        )
    }

    /// Direction pointing the opposite way.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::NorthEast => Self::SouthWest,
            Self::East => Self::West,
            Self::SouthEast => Self::NorthWest,
            Self::South => Self::North,
            Self::SouthWest => Self::NorthEast,
            Self::West => Self::East,
            Self::NorthWest => Self::SouthEast,
            Self::North => Self::South,
        }
    }

    /// Base traversal cost: one for orthogonal steps, √2 for diagonal ones.
    #[must_use]
    pub fn step_cost(self) -> f64 {
        if self.is_diagonal() {
            std::f64::consts::SQRT_2
        } else {
            1.0
        }
    }

    /// The two orthogonal components of a diagonal step.
    ///
    /// Returns `None` for orthogonal directions.
    #[must_use]
    pub const fn components(self) -> Option<(Direction, Direction)> {
        match self {
            Self::NorthEast => Some((Self::North, Self::East)),
            Self::SouthEast => Some((Self::South, Self::East)),
            Self::SouthWest => Some((Self::South, Self::West)),
            Self::NorthWest => Some((Self::North, Self::West)),
            _ => None,
        }
    }
}

/// Inclusive axis-aligned box of tiles used as a search goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileBox {
    top_left: TilePos,
    bottom_right: TilePos,
}

impl TileBox {
    /// Creates a box spanning the two corners, normalising their order.
    #[must_use]
    pub fn new(first: TilePos, second: TilePos) -> Self {
        Self {
            top_left: TilePos::new(
                first.column().min(second.column()),
                first.row().min(second.row()),
            ),
            bottom_right: TilePos::new(
                first.column().max(second.column()),
                first.row().max(second.row()),
            ),
        }
    }

    /// Box covering exactly one tile.
    #[must_use]
    pub const fn single(tile: TilePos) -> Self {
        Self {
            top_left: tile,
            bottom_right: tile,
        }
    }

    /// Upper-left tile of the box.
    #[must_use]
    pub const fn top_left(&self) -> TilePos {
        self.top_left
    }

    /// Lower-right tile of the box.
    #[must_use]
    pub const fn bottom_right(&self) -> TilePos {
        self.bottom_right
    }

    /// Reports whether the tile lies inside the box.
    #[must_use]
    pub const fn contains(&self, tile: TilePos) -> bool {
        tile.column() >= self.top_left.column()
            && tile.column() <= self.bottom_right.column()
            && tile.row() >= self.top_left.row()
            && tile.row() <= self.bottom_right.row()
    }

    /// Tile inside the box closest to the provided tile.
    #[must_use]
    pub fn clamp(&self, tile: TilePos) -> TilePos {
        TilePos::new(
            tile.column()
                .clamp(self.top_left.column(), self.bottom_right.column()),
            tile.row().clamp(self.top_left.row(), self.bottom_right.row()),
        )
    }
}

/// Semi-axes of an agent's bounding ellipse, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Radii {
    x: u16,
    y: u16,
}

impl Radii {
    /// Creates radii from horizontal and vertical semi-axes.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Horizontal semi-axis.
    #[must_use]
    pub const fn x(&self) -> u16 {
        self.x
    }

    /// Vertical semi-axis.
    #[must_use]
    pub const fn y(&self) -> u16 {
        self.y
    }

    /// Reports whether both semi-axes stay within half of `tile_size`.
    #[must_use]
    pub const fn fits_tile(&self, tile_size: u16) -> bool {
        2 * self.x as u32 <= tile_size as u32 && 2 * self.y as u32 <= tile_size as u32
    }

    /// Component-wise sum of two radii.
    #[must_use]
    pub const fn sum(self, other: Radii) -> Radii {
        Radii::new(
            self.x.saturating_add(other.x),
            self.y.saturating_add(other.y),
        )
    }

    /// Reports whether `pixel` lies strictly inside the ellipse centred at `center`.
    ///
    /// Evaluated in integers as `dx²·ry² + dy²·rx² < rx²·ry²`.
    #[must_use]
    pub fn contains(self, center: PixelPos, pixel: PixelPos) -> bool {
        let a_square = i64::from(self.x) * i64::from(self.x);
        let b_square = i64::from(self.y) * i64::from(self.y);
        let dx = i64::from(pixel.x()) - i64::from(center.x());
        let dy = i64::from(pixel.y()) - i64::from(center.y());
        dx * dx * b_square + dy * dy * a_square < a_square * b_square
    }

    /// Approximate ellipse-ellipse overlap test.
    ///
    /// Tests one centre against an ellipse whose radii are the pairwise sums.
    /// Exact for circles, approximate for general ellipses.
    #[must_use]
    pub fn overlaps(self, center: PixelPos, other: Radii, other_center: PixelPos) -> bool {
        other.sum(self).contains(other_center, center)
    }
}

/// Deterministic mapping between the tile, pixel and continuous spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridGeometry {
    columns: i32,
    rows: i32,
    tile_size: i32,
}

impl GridGeometry {
    /// Creates a geometry for a grid of `columns` × `rows` square tiles.
    #[must_use]
    pub const fn new(columns: i32, rows: i32, tile_size: i32) -> Self {
        Self {
            columns,
            rows,
            tile_size,
        }
    }

    /// Number of tile columns.
    #[must_use]
    pub const fn columns(&self) -> i32 {
        self.columns
    }

    /// Number of tile rows.
    #[must_use]
    pub const fn rows(&self) -> i32 {
        self.rows
    }

    /// Edge length of a tile in pixels.
    #[must_use]
    pub const fn tile_size(&self) -> i32 {
        self.tile_size
    }

    /// Width of the map in pixels.
    #[must_use]
    pub const fn pixel_width(&self) -> i32 {
        self.columns * self.tile_size
    }

    /// Height of the map in pixels.
    #[must_use]
    pub const fn pixel_height(&self) -> i32 {
        self.rows * self.tile_size
    }

    /// Pixel containing the continuous position (`floor` on both axes).
    #[must_use]
    pub fn pixel_of(&self, position: Vector) -> PixelPos {
        PixelPos::new(position.x.floor() as i32, position.y.floor() as i32)
    }

    /// Tile containing the pixel.
    #[must_use]
    pub const fn tile_of(&self, pixel: PixelPos) -> TilePos {
        TilePos::new(
            pixel.x().div_euclid(self.tile_size),
            pixel.y().div_euclid(self.tile_size),
        )
    }

    /// Tile containing the continuous position.
    #[must_use]
    pub fn tile_of_vector(&self, position: Vector) -> TilePos {
        self.tile_of(self.pixel_of(position))
    }

    /// Upper-left pixel of the tile.
    #[must_use]
    pub const fn top_left(&self, tile: TilePos) -> PixelPos {
        PixelPos::new(tile.column() * self.tile_size, tile.row() * self.tile_size)
    }

    /// Anchor pixel of the tile: its upper-left pixel offset by half a tile.
    #[must_use]
    pub const fn anchor(&self, tile: TilePos) -> PixelPos {
        let half = self.tile_size / 2;
        PixelPos::new(
            tile.column() * self.tile_size + half,
            tile.row() * self.tile_size + half,
        )
    }

    /// Reports whether the tile lies on the grid.
    #[must_use]
    pub const fn contains(&self, tile: TilePos) -> bool {
        tile.column() >= 0
            && tile.row() >= 0
            && tile.column() < self.columns
            && tile.row() < self.rows
    }

    /// Row-major index of the tile, if it lies on the grid.
    #[must_use]
    pub fn index(&self, tile: TilePos) -> Option<usize> {
        if !self.contains(tile) {
            return None;
        }
        let row = usize::try_from(tile.row()).ok()?;
        let column = usize::try_from(tile.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        row.checked_mul(width)?.checked_add(column)
    }

    /// Tile stored at the row-major index.
    #[must_use]
    pub fn tile_at(&self, index: usize) -> Option<TilePos> {
        let width = usize::try_from(self.columns).ok()?;
        if width == 0 {
            return None;
        }
        let column = i32::try_from(index % width).ok()?;
        let row = i32::try_from(index / width).ok()?;
        let tile = TilePos::new(column, row);
        self.contains(tile).then_some(tile)
    }

    /// Number of tiles on the grid.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        let columns = usize::try_from(self.columns).unwrap_or(0);
        let rows = usize::try_from(self.rows).unwrap_or(0);
        columns.saturating_mul(rows)
    }
}

/// Rotates the vector by `angle` radians using the screen-space convention
/// `(x·cos + y·sin, −x·sin + y·cos)`.
#[must_use]
pub fn rotate(vector: Vector, angle: f64) -> Vector {
    let (sin, cos) = angle.sin_cos();
    Vector::new(
        vector.x * cos + vector.y * sin,
        -vector.x * sin + vector.y * cos,
    )
}

/// Rescales the vector to `length`. Zero vectors are returned unchanged.
#[must_use]
pub fn scale_to_length(vector: Vector, length: f64) -> Vector {
    let current = vector.length();
    if current > 0.0 {
        vector * (length / current)
    } else {
        vector
    }
}

/// Left-hand perpendicular `(−y, x)`.
#[must_use]
pub fn perpendicular_left(vector: Vector) -> Vector {
    Vector::new(-vector.y, vector.x)
}

/// Right-hand perpendicular `(y, −x)`.
#[must_use]
pub fn perpendicular_right(vector: Vector) -> Vector {
    Vector::new(vector.y, -vector.x)
}
