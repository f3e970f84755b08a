//! Per-tile observer and resident indices with push notification.
//!
//! An agent observes another exactly when the other resides in a tile the
//! first has in its field of view. The tracker keeps that relation current
//! incrementally: residency changes notify the tile's observers, visibility
//! changes notify the observer about the tile's residents and items.

use std::collections::BTreeSet;

use skirmish_core::{AgentId, GridGeometry, ItemId, TilePos};

use crate::terrain::Terrain;

/// Receiver of observation changes produced by the tracker.
pub trait ObservationSink {
    /// `observer` started seeing `agent`.
    fn observed_add(&mut self, observer: AgentId, agent: AgentId);

    /// `observer` stopped seeing `agent`.
    fn observed_remove(&mut self, observer: AgentId, agent: AgentId);

    /// `observer` started seeing `item`.
    fn items_add(&mut self, observer: AgentId, item: ItemId);

    /// `observer` stopped seeing `item`.
    fn items_remove(&mut self, observer: AgentId, item: ItemId);
}

/// Bitset over every tile of the map, indexed row-major.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldOfView {
    bits: Vec<u64>,
    len: usize,
}

impl FieldOfView {
    /// Creates an empty field of view for a map with `tile_count` tiles.
    #[must_use]
    pub fn new(tile_count: usize) -> Self {
        Self {
            bits: vec![0; tile_count.div_ceil(64)],
            len: tile_count,
        }
    }

    /// Reports whether the tile with the row-major index is visible.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.len
            && self
                .bits
                .get(index / 64)
                .is_some_and(|word| word & (1 << (index % 64)) != 0)
    }

    /// Sets or clears the bit for the tile index. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, visible: bool) {
        if index >= self.len {
            return;
        }
        if let Some(word) = self.bits.get_mut(index / 64) {
            if visible {
                *word |= 1 << (index % 64);
            } else {
                *word &= !(1 << (index % 64));
            }
        }
    }

    /// Indices of every visible tile in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&index| self.contains(index))
    }

    /// Number of visible tiles.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Number of tiles covered by the bitset.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Reports whether the bitset covers no tiles at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Observer, resident and item indices for every tile.
#[derive(Clone, Debug)]
pub struct VisibilityTracker {
    geometry: GridGeometry,
    visibility: Vec<f32>,
    passable: Vec<bool>,
    threshold: f32,
    observers: Vec<BTreeSet<AgentId>>,
    residents: Vec<BTreeSet<AgentId>>,
    items: Vec<BTreeSet<ItemId>>,
}

impl VisibilityTracker {
    /// Creates empty indices over the terrain.
    ///
    /// Tiles whose visibility coefficient is below `threshold` block sight.
    #[must_use]
    pub fn new(geometry: GridGeometry, terrain: &Terrain, threshold: f32) -> Self {
        let count = geometry.tile_count();
        Self {
            geometry,
            visibility: terrain.visibility(),
            passable: terrain.passability(),
            threshold,
            observers: vec![BTreeSet::new(); count],
            residents: vec![BTreeSet::new(); count],
            items: vec![BTreeSet::new(); count],
        }
    }

    /// Agents currently seeing the tile.
    pub fn observers(&self, tile: TilePos) -> impl Iterator<Item = AgentId> + '_ {
        self.slot(tile)
            .and_then(|index| self.observers.get(index))
            .into_iter()
            .flatten()
            .copied()
    }

    /// Agents currently residing in the tile.
    pub fn residents(&self, tile: TilePos) -> impl Iterator<Item = AgentId> + '_ {
        self.slot(tile)
            .and_then(|index| self.residents.get(index))
            .into_iter()
            .flatten()
            .copied()
    }

    /// Items lying on the tile.
    pub fn items(&self, tile: TilePos) -> impl Iterator<Item = ItemId> + '_ {
        self.slot(tile)
            .and_then(|index| self.items.get(index))
            .into_iter()
            .flatten()
            .copied()
    }

    /// Records `agent` as residing in `tile` and tells the tile's observers.
    pub fn resident_add<S: ObservationSink>(&mut self, tile: TilePos, agent: AgentId, sink: &mut S) {
        let Some(index) = self.slot(tile) else {
            return;
        };
        if !self.residents[index].insert(agent) {
            return;
        }
        for &observer in &self.observers[index] {
            sink.observed_add(observer, agent);
        }
    }

    /// Removes `agent` from the residents of `tile` and tells the tile's observers.
    pub fn resident_remove<S: ObservationSink>(
        &mut self,
        tile: TilePos,
        agent: AgentId,
        sink: &mut S,
    ) {
        let Some(index) = self.slot(tile) else {
            return;
        };
        if !self.residents[index].remove(&agent) {
            return;
        }
        for &observer in &self.observers[index] {
            sink.observed_remove(observer, agent);
        }
    }

    /// Drops an item on a passable tile. Returns whether it was newly placed.
    pub fn item_add<S: ObservationSink>(&mut self, tile: TilePos, item: ItemId, sink: &mut S) -> bool {
        let Some(index) = self.slot(tile) else {
            return false;
        };
        if !self.passable[index] || !self.items[index].insert(item) {
            return false;
        }
        for &observer in &self.observers[index] {
            sink.items_add(observer, item);
        }
        true
    }

    /// Picks an item up from a tile. Returns whether it was there.
    pub fn item_remove<S: ObservationSink>(
        &mut self,
        tile: TilePos,
        item: ItemId,
        sink: &mut S,
    ) -> bool {
        let Some(index) = self.slot(tile) else {
            return false;
        };
        if !self.items[index].remove(&item) {
            return false;
        }
        for &observer in &self.observers[index] {
            sink.items_remove(observer, item);
        }
        true
    }

    /// Adds or removes `agent` as an observer of `tile`.
    ///
    /// Nothing happens when membership does not change. On passable tiles the
    /// agent is told about the residents and items it gained or lost sight of.
    pub fn visibility_update<S: ObservationSink>(
        &mut self,
        tile: TilePos,
        agent: AgentId,
        visible: bool,
        sink: &mut S,
    ) {
        let Some(index) = self.slot(tile) else {
            return;
        };
        let changed = if visible {
            self.observers[index].insert(agent)
        } else {
            self.observers[index].remove(&agent)
        };
        if !changed || !self.passable[index] {
            return;
        }

        if visible {
            for &resident in &self.residents[index] {
                sink.observed_add(agent, resident);
            }
            for &item in &self.items[index] {
                sink.items_add(agent, item);
            }
        } else {
            for &resident in &self.residents[index] {
                sink.observed_remove(agent, resident);
            }
            for &item in &self.items[index] {
                sink.items_remove(agent, item);
            }
        }
    }

    /// Integer line of sight between two tiles.
    ///
    /// Fails as soon as a tile other than `to` has a visibility coefficient
    /// below the threshold. The `from` tile is checked too, so an observer
    /// standing in opaque terrain sees nothing. Without `diagonal_strictness` an exact diagonal
    /// crossing steps both axes at once; with it the ray always passes
    /// through one of the two tiles forming the corner.
    #[must_use]
    pub fn tile_sight_check(&self, from: TilePos, to: TilePos, diagonal_strictness: bool) -> bool {
        let mut dx = (to.column() - from.column()).abs();
        let mut dy = (to.row() - from.row()).abs();
        let mut x = from.column();
        let mut y = from.row();
        let x_inc = if to.column() > from.column() { 1 } else { -1 };
        let y_inc = if to.row() > from.row() { 1 } else { -1 };
        let mut remaining = 1 + dx + dy;
        let mut error = dx - dy;
        dx *= 2;
        dy *= 2;

        while remaining > 0 {
            let tile = TilePos::new(x, y);
            if tile != to && !self.transparent(tile) {
                return false;
            }

            if diagonal_strictness || error != 0 {
                if error > 0 {
                    x += x_inc;
                    error -= dy;
                } else {
                    y += y_inc;
                    error += dx;
                }
            } else {
                x += x_inc;
                y += y_inc;
                error += dx - dy;
                remaining -= 1;
            }
            remaining -= 1;
        }
        true
    }

    /// Tiles within `range` of `origin` that are in sight of it.
    ///
    /// Scans the open square `(-range, range)` around the origin, keeping
    /// on-grid tiles whose Euclidean distance is at most `range`.
    #[must_use]
    pub fn field_of_view(&self, origin: TilePos, range: u16) -> FieldOfView {
        let mut view = FieldOfView::new(self.geometry.tile_count());
        let range = i32::from(range);
        for i in (1 - range)..range {
            for j in (1 - range)..range {
                let tile = TilePos::new(origin.column() + i, origin.row() + j);
                let Some(index) = self.slot(tile) else {
                    continue;
                };
                if origin.distance(tile) <= f64::from(range)
                    && self.tile_sight_check(origin, tile, false)
                {
                    view.set(index, true);
                }
            }
        }
        view
    }

    /// Recomputes the agent's field of view from `origin` and pushes every
    /// changed tile through [`Self::visibility_update`].
    pub fn refresh_field_of_view<S: ObservationSink>(
        &mut self,
        agent: AgentId,
        origin: TilePos,
        range: u16,
        view: &mut FieldOfView,
        sink: &mut S,
    ) {
        let previous = std::mem::replace(view, self.field_of_view(origin, range));
        for index in previous.iter() {
            if !view.contains(index) {
                if let Some(tile) = self.geometry.tile_at(index) {
                    self.visibility_update(tile, agent, false, sink);
                }
            }
        }
        for index in view.iter() {
            if !previous.contains(index) {
                if let Some(tile) = self.geometry.tile_at(index) {
                    self.visibility_update(tile, agent, true, sink);
                }
            }
        }
    }

    /// Removes a departing agent from its resident tile and from every
    /// observer entry implied by its field of view.
    ///
    /// Observers of the tile are told the agent left. The agent itself is not
    /// told about what it stops seeing.
    pub fn deregister<S: ObservationSink>(
        &mut self,
        agent: AgentId,
        tile: TilePos,
        view: &FieldOfView,
        sink: &mut S,
    ) {
        self.resident_remove(tile, agent, sink);
        for index in view.iter() {
            if let Some(observers) = self.observers.get_mut(index) {
                let _ = observers.remove(&agent);
            }
        }
    }

    fn transparent(&self, tile: TilePos) -> bool {
        self.slot(tile)
            .and_then(|index| self.visibility.get(index))
            .is_some_and(|&coefficient| coefficient >= self.threshold)
    }

    fn slot(&self, tile: TilePos) -> Option<usize> {
        self.geometry.index(tile)
    }
}
