//! Static terrain layer: passability and sight coefficients per tile.

use skirmish_core::{GridGeometry, TilePos};

/// Kinds of ground a tile can be made of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileKind {
    /// Open ground. Passable and fully transparent.
    Floor,
    /// Undergrowth. Passable and half transparent.
    Brush,
    /// Solid rock. Impassable and opaque.
    Rock,
}

impl TileKind {
    /// Reports whether agents may stand on the tile.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        !matches!(self, Self::Rock)
    }

    /// Fraction of sight that passes through the tile.
    #[must_use]
    pub const fn visibility(self) -> f32 {
        match self {
            Self::Floor => 1.0,
            Self::Brush => 0.5,
            Self::Rock => 0.0,
        }
    }

    fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            '.' => Some(Self::Floor),
            '"' => Some(Self::Brush),
            '#' => Some(Self::Rock),
            _ => None,
        }
    }
}

/// Errors raised while parsing a terrain layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TerrainError {
    /// The layout contained no tiles.
    #[error("terrain layout is empty")]
    Empty,
    /// A row's width differs from the first row.
    #[error("row {row} has {found} tiles, expected {expected}")]
    RaggedRow {
        /// Zero-based row index.
        row: usize,
        /// Width of the first row.
        expected: usize,
        /// Width of the offending row.
        found: usize,
    },
    /// A glyph outside `.`, `"` and `#` was found.
    #[error("unknown terrain glyph {glyph:?} at column {column}, row {row}")]
    UnknownGlyph {
        /// The offending character.
        glyph: char,
        /// Zero-based column index.
        column: usize,
        /// Zero-based row index.
        row: usize,
    },
}

/// Dense row-major grid of tile kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Terrain {
    columns: i32,
    rows: i32,
    tiles: Vec<TileKind>,
}

impl Terrain {
    /// Creates a terrain of the given size made entirely of floor.
    #[must_use]
    pub fn open(columns: u16, rows: u16) -> Self {
        let count = usize::from(columns) * usize::from(rows);
        Self {
            columns: i32::from(columns),
            rows: i32::from(rows),
            tiles: vec![TileKind::Floor; count],
        }
    }

    /// Parses an ASCII layout: `.` floor, `"` brush, `#` rock.
    ///
    /// # Errors
    ///
    /// Returns a [`TerrainError`] when the layout is empty, ragged, or
    /// contains unknown glyphs.
    pub fn from_layout<S: AsRef<str>>(rows: &[S]) -> Result<Self, TerrainError> {
        let mut tiles = Vec::new();
        let mut expected = None;

        for (row_index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let mut width = 0;
            for (column, glyph) in row.chars().enumerate() {
                let kind = TileKind::from_glyph(glyph).ok_or(TerrainError::UnknownGlyph {
                    glyph,
                    column,
                    row: row_index,
                })?;
                tiles.push(kind);
                width += 1;
            }
            match expected {
                None => expected = Some(width),
                Some(expected) if expected != width => {
                    return Err(TerrainError::RaggedRow {
                        row: row_index,
                        expected,
                        found: width,
                    });
                }
                Some(_) => {}
            }
        }

        let columns = expected.unwrap_or(0);
        if columns == 0 {
            return Err(TerrainError::Empty);
        }

        Ok(Self {
            columns: i32::try_from(columns).map_err(|_| TerrainError::Empty)?,
            rows: i32::try_from(rows.len()).map_err(|_| TerrainError::Empty)?,
            tiles,
        })
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

    /// Geometry of this terrain for the given tile size.
    #[must_use]
    pub const fn geometry(&self, tile_size: u16) -> GridGeometry {
        GridGeometry::new(self.columns, self.rows, tile_size as i32)
    }

    /// Kind of the tile, or `None` when it lies off the grid.
    #[must_use]
    pub fn kind(&self, tile: TilePos) -> Option<TileKind> {
        self.index(tile)
            .and_then(|index| self.tiles.get(index).copied())
    }

    /// Replaces the kind of an on-grid tile. Off-grid tiles are ignored.
    pub fn set(&mut self, tile: TilePos, kind: TileKind) {
        if let Some(slot) = self.index(tile).and_then(|index| self.tiles.get_mut(index)) {
            *slot = kind;
        }
    }

    /// Reports whether the tile lies on the grid and can be stood on.
    #[must_use]
    pub fn is_passable(&self, tile: TilePos) -> bool {
        self.kind(tile).is_some_and(TileKind::is_passable)
    }

    /// Dense passability flags in row-major order.
    #[must_use]
    pub fn passability(&self) -> Vec<bool> {
        self.tiles.iter().map(|kind| kind.is_passable()).collect()
    }

    /// Dense visibility coefficients in row-major order.
    #[must_use]
    pub fn visibility(&self) -> Vec<f32> {
        self.tiles.iter().map(|kind| kind.visibility()).collect()
    }

    fn index(&self, tile: TilePos) -> Option<usize> {
        if tile.column() < 0
            || tile.row() < 0
            || tile.column() >= self.columns
            || tile.row() >= self.rows
        {
            return None;
        }
        let row = usize::try_from(tile.row()).ok()?;
        let column = usize::try_from(tile.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        Some(row * width + column)
    }
}
