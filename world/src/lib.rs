#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the Skirmish agent simulation.
//!
//! The world owns terrain, the agent arena, teams, the spatial index and the
//! visibility tracker. It changes only through [`apply`], and every committed
//! position immediately re-indexes occupancy and visibility so later readers
//! in the same tick see a consistent picture.

pub mod collider;
pub mod terrain;
pub mod visibility;

use std::collections::{BTreeMap, BTreeSet};

use skirmish_core::{
    AgentId, AgentTemplate, Command, Event, GridGeometry, ItemId, PixelPos, Radii,
    SimulationConfig, SpawnError, TeamColor, TeamId, TilePos, Vector,
};

use crate::{
    collider::{resolve_overlap, SpatialIndex},
    terrain::Terrain,
    visibility::{FieldOfView, ObservationSink, VisibilityTracker},
};

/// Represents the authoritative simulation world.
#[derive(Debug)]
pub struct World {
    config: SimulationConfig,
    geometry: GridGeometry,
    terrain: Terrain,
    collider: SpatialIndex,
    tracker: VisibilityTracker,
    agents: BTreeMap<AgentId, Agent>,
    teams: BTreeMap<TeamId, Team>,
    next_agent: u32,
    next_team: u32,
}

impl World {
    /// Creates an empty world over the terrain.
    #[must_use]
    pub fn new(config: &SimulationConfig, terrain: Terrain) -> Self {
        let geometry = terrain.geometry(config.grid.tile_size);
        Self {
            collider: SpatialIndex::new(geometry, &terrain),
            tracker: VisibilityTracker::new(
                geometry,
                &terrain,
                config.perception.visibility_threshold,
            ),
            config: config.clone(),
            geometry,
            terrain,
            agents: BTreeMap::new(),
            teams: BTreeMap::new(),
            next_agent: 0,
            next_team: 0,
        }
    }

    fn create_team(&mut self, name: String, color: TeamColor) -> TeamId {
        let id = TeamId::new(self.next_team);
        self.next_team = self.next_team.saturating_add(1);
        let _ = self.teams.insert(id, Team::new(name, color));
        id
    }

    fn spawn(
        &mut self,
        team: TeamId,
        tile: TilePos,
        template: AgentTemplate,
    ) -> Result<AgentId, SpawnError> {
        if !self.geometry.contains(tile) {
            return Err(SpawnError::OutOfBounds);
        }
        if !self.teams.contains_key(&team) {
            return Err(SpawnError::UnknownTeam);
        }
        if !template.radii.fits_tile(self.config.grid.tile_size) {
            return Err(SpawnError::OversizedBody);
        }
        if self.next_agent >= self.config.population.max_agents {
            return Err(SpawnError::CapacityExhausted);
        }

        let corner = self.geometry.top_left(tile);
        let pixel = PixelPos::new(
            corner.x() + i32::from(template.radii.x()),
            corner.y() + i32::from(template.radii.y()),
        );
        let id = AgentId::new(self.next_agent);
        if !self.collider.register(id, pixel, template.radii) {
            return Err(SpawnError::TerrainBlocked);
        }
        self.next_agent = self.next_agent.saturating_add(1);

        let agent = Agent {
            id,
            team,
            template,
            health: template.max_health,
            dead: false,
            position: pixel.to_vector(),
            pixel,
            tile: self.geometry.tile_of(pixel),
            field_of_view: FieldOfView::new(self.geometry.tile_count()),
            perception: Perception::default(),
            label: None,
        };
        let tile = agent.tile;
        let _ = self.agents.insert(id, agent);
        if let Some(team) = self.teams.get_mut(&team) {
            let _ = team.members.insert(id);
        }

        let mut sink = Observations {
            agents: &mut self.agents,
            teams: &mut self.teams,
        };
        self.tracker.resident_add(tile, id, &mut sink);
        self.refresh_view(id);
        Ok(id)
    }

    fn commit_position(&mut self, id: AgentId, to: Vector, out_events: &mut Vec<Event>) {
        let geometry = self.geometry;
        let Some(agent) = self.agents.get_mut(&id) else {
            return;
        };
        let from_pixel = agent.pixel;
        let from_tile = agent.tile;
        let pixel = geometry.pixel_of(to);
        if pixel != from_pixel && self.collider.clip_check(id, pixel, false).is_none() {
            tracing::debug!(agent = id.get(), ?pixel, "move rejected, footprint blocked");
            return;
        }
        agent.position = to;
        agent.pixel = pixel;
        agent.tile = geometry.tile_of(pixel);
        let tile = agent.tile;

        if pixel == from_pixel {
            return;
        }
        let _ = self.collider.update_occupancy(id, pixel);
        out_events.push(Event::AgentMoved {
            agent: id,
            from: from_pixel,
            to: pixel,
        });

        if tile != from_tile {
            let mut sink = Observations {
                agents: &mut self.agents,
                teams: &mut self.teams,
            };
            self.tracker.resident_remove(from_tile, id, &mut sink);
            self.tracker.resident_add(tile, id, &mut sink);
            self.refresh_view(id);
        }
    }

    fn refresh_view(&mut self, id: AgentId) {
        let Some(agent) = self.agents.get_mut(&id) else {
            return;
        };
        let origin = agent.tile;
        let range = agent.template.sight_range;
        let mut view = std::mem::take(&mut agent.field_of_view);

        let mut sink = Observations {
            agents: &mut self.agents,
            teams: &mut self.teams,
        };
        self.tracker
            .refresh_field_of_view(id, origin, range, &mut view, &mut sink);

        if let Some(agent) = self.agents.get_mut(&id) {
            agent.field_of_view = view;
        }
    }

    fn separate(&mut self, first: AgentId, second: AgentId, out_events: &mut Vec<Event>) {
        let (Some(a), Some(b)) = (self.agents.get(&first), self.agents.get(&second)) else {
            return;
        };
        let Some((moved_first, moved_second)) =
            resolve_overlap(a.position, a.radii(), b.position, b.radii())
        else {
            return;
        };
        for (id, target) in [(first, moved_first), (second, moved_second)] {
            let pixel = self.geometry.pixel_of(target);
            if self.collider.clip_check(id, pixel, false).is_some() {
                self.commit_position(id, target, out_events);
            }
        }
    }

    fn inflict_damage(
        &mut self,
        attacker: AgentId,
        target: AgentId,
        damage: u16,
        out_events: &mut Vec<Event>,
    ) {
        let Some(victim) = self.agents.get_mut(&target) else {
            return;
        };
        if victim.dead {
            return;
        }
        let dealt = damage
            .saturating_sub(victim.template.armor)
            .min(victim.health);
        victim.health -= dealt;
        out_events.push(Event::AttackLanded {
            attacker,
            target,
            dealt,
            remaining: victim.health,
        });
        if victim.health == 0 {
            victim.dead = true;
            tracing::info!(agent = target.get(), attacker = attacker.get(), "agent died");
            out_events.push(Event::AgentDied { agent: target });
        }
    }

    fn despawn(&mut self, id: AgentId, out_events: &mut Vec<Event>) {
        let Some(agent) = self.agents.get(&id) else {
            return;
        };
        let tile = agent.tile;
        let team = agent.team;
        let view = agent.field_of_view.clone();
        let enemies = agent.perception.enemies.clone();

        self.collider.remove(id);
        let mut sink = Observations {
            agents: &mut self.agents,
            teams: &mut self.teams,
        };
        self.tracker.deregister(id, tile, &view, &mut sink);

        if let Some(team) = self.teams.get_mut(&team) {
            let _ = team.members.remove(&id);
            for enemy in enemies {
                team.forget_enemy(enemy);
            }
        }
        let _ = self.agents.remove(&id);
        tracing::debug!(agent = id.get(), "agent despawned");
        out_events.push(Event::AgentDespawned { agent: id });
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::CreateTeam { name, color } => {
            let team = world.create_team(name, color);
            out_events.push(Event::TeamCreated { team });
        }
        Command::SpawnAgent {
            team,
            tile,
            template,
        } => match world.spawn(team, tile, template) {
            Ok(agent) => {
                tracing::info!(agent = agent.get(), team = team.get(), ?tile, "agent spawned");
                out_events.push(Event::AgentSpawned { agent, team, tile });
            }
            Err(reason) => {
                tracing::debug!(team = team.get(), ?tile, %reason, "spawn rejected");
                out_events.push(Event::SpawnRejected { team, tile, reason });
            }
        },
        Command::MoveAgent { agent, to } => world.commit_position(agent, to, out_events),
        Command::SeparateAgents { first, second } => world.separate(first, second, out_events),
        Command::InflictDamage {
            attacker,
            target,
            damage,
        } => world.inflict_damage(attacker, target, damage, out_events),
        Command::SetLabel { agent, label } => {
            if let Some(entry) = world.agents.get_mut(&agent) {
                entry.label.clone_from(&label);
                out_events.push(Event::LabelChanged { agent, label });
            }
        }
        Command::PlaceItem { item, tile } => {
            let mut sink = Observations {
                agents: &mut world.agents,
                teams: &mut world.teams,
            };
            if world.tracker.item_add(tile, item, &mut sink) {
                out_events.push(Event::ItemPlaced { item, tile });
            }
        }
        Command::RemoveItem { item, tile } => {
            let mut sink = Observations {
                agents: &mut world.agents,
                teams: &mut world.teams,
            };
            if world.tracker.item_remove(tile, item, &mut sink) {
                out_events.push(Event::ItemRemoved { item, tile });
            }
        }
        Command::DespawnAgent { agent } => world.despawn(agent, out_events),
    }
}

/// Creatures and items an agent currently sees, kept current by the
/// visibility tracker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Perception {
    friends: BTreeSet<AgentId>,
    enemies: BTreeSet<AgentId>,
    items: BTreeSet<ItemId>,
}

impl Perception {
    /// Observed members of the agent's own team.
    #[must_use]
    pub fn friends(&self) -> &BTreeSet<AgentId> {
        &self.friends
    }

    /// Observed members of other teams.
    #[must_use]
    pub fn enemies(&self) -> &BTreeSet<AgentId> {
        &self.enemies
    }

    /// Observed items.
    #[must_use]
    pub fn items(&self) -> &BTreeSet<ItemId> {
        &self.items
    }
}

/// A single simulated creature.
#[derive(Clone, Debug)]
pub struct Agent {
    id: AgentId,
    team: TeamId,
    template: AgentTemplate,
    health: u16,
    dead: bool,
    position: Vector,
    pixel: PixelPos,
    tile: TilePos,
    field_of_view: FieldOfView,
    perception: Perception,
    label: Option<String>,
}

impl Agent {
    /// Identifier of the agent.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Team the agent belongs to.
    #[must_use]
    pub const fn team(&self) -> TeamId {
        self.team
    }

    /// Statistics the agent was spawned with.
    #[must_use]
    pub const fn template(&self) -> &AgentTemplate {
        &self.template
    }

    /// Remaining health.
    #[must_use]
    pub const fn health(&self) -> u16 {
        self.health
    }

    /// Reports whether the agent's health reached zero.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.dead
    }

    /// Continuous position.
    #[must_use]
    pub const fn position(&self) -> Vector {
        self.position
    }

    /// Pixel containing the position.
    #[must_use]
    pub const fn pixel(&self) -> PixelPos {
        self.pixel
    }

    /// Tile containing the position.
    #[must_use]
    pub const fn tile(&self) -> TilePos {
        self.tile
    }

    /// Bounding ellipse radii.
    #[must_use]
    pub const fn radii(&self) -> Radii {
        self.template.radii
    }

    /// Tiles the agent currently sees.
    #[must_use]
    pub const fn field_of_view(&self) -> &FieldOfView {
        &self.field_of_view
    }

    /// Creatures and items the agent currently sees.
    #[must_use]
    pub const fn perception(&self) -> &Perception {
        &self.perception
    }

    /// Transient text displayed above the agent.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// A group of allied agents.
#[derive(Clone, Debug)]
pub struct Team {
    name: String,
    color: TeamColor,
    members: BTreeSet<AgentId>,
    observed_enemies: BTreeMap<AgentId, u32>,
}

impl Team {
    fn new(name: String, color: TeamColor) -> Self {
        Self {
            name,
            color,
            members: BTreeSet::new(),
            observed_enemies: BTreeMap::new(),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Visual identity.
    #[must_use]
    pub const fn color(&self) -> TeamColor {
        self.color
    }

    /// Agents belonging to the team, living or awaiting despawn.
    #[must_use]
    pub fn members(&self) -> &BTreeSet<AgentId> {
        &self.members
    }

    /// Reports whether at least one member currently sees the agent.
    #[must_use]
    pub fn observes(&self, agent: AgentId) -> bool {
        self.observed_enemies.contains_key(&agent)
    }

    /// Enemies seen by at least one member, in ascending order.
    pub fn observed_enemies(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.observed_enemies.keys().copied()
    }

    fn note_enemy(&mut self, agent: AgentId) {
        *self.observed_enemies.entry(agent).or_insert(0) += 1;
    }

    fn forget_enemy(&mut self, agent: AgentId) {
        if let Some(count) = self.observed_enemies.get_mut(&agent) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                let _ = self.observed_enemies.remove(&agent);
            }
        }
    }
}

/// Routes tracker notifications into agent perception and team back-indices.
struct Observations<'a> {
    agents: &'a mut BTreeMap<AgentId, Agent>,
    teams: &'a mut BTreeMap<TeamId, Team>,
}

impl ObservationSink for Observations<'_> {
    fn observed_add(&mut self, observer: AgentId, agent: AgentId) {
        if observer == agent {
            return;
        }
        let Some(other_team) = self.agents.get(&agent).map(|other| other.team) else {
            return;
        };
        let Some(watcher) = self.agents.get_mut(&observer) else {
            return;
        };
        if watcher.team == other_team {
            let _ = watcher.perception.friends.insert(agent);
        } else if watcher.perception.enemies.insert(agent) {
            if let Some(team) = self.teams.get_mut(&watcher.team) {
                team.note_enemy(agent);
            }
        }
    }

    fn observed_remove(&mut self, observer: AgentId, agent: AgentId) {
        let Some(watcher) = self.agents.get_mut(&observer) else {
            return;
        };
        let _ = watcher.perception.friends.remove(&agent);
        if watcher.perception.enemies.remove(&agent) {
            if let Some(team) = self.teams.get_mut(&watcher.team) {
                team.forget_enemy(agent);
            }
        }
    }

    fn items_add(&mut self, observer: AgentId, item: ItemId) {
        if let Some(watcher) = self.agents.get_mut(&observer) {
            let _ = watcher.perception.items.insert(item);
        }
    }

    fn items_remove(&mut self, observer: AgentId, item: ItemId) {
        if let Some(watcher) = self.agents.get_mut(&observer) {
            let _ = watcher.perception.items.remove(&item);
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use skirmish_core::{
        AgentId, GridGeometry, ItemId, PixelPos, SimulationConfig, TeamId, TilePos, Vector,
    };

    use super::{Agent, Team, World};
    use crate::{collider::SpatialIndex, terrain::Terrain, visibility::VisibilityTracker};

    /// Configuration the world was built with.
    #[must_use]
    pub fn config(world: &World) -> &SimulationConfig {
        &world.config
    }

    /// Mapping between tile, pixel and continuous coordinates.
    #[must_use]
    pub fn geometry(world: &World) -> GridGeometry {
        world.geometry
    }

    /// Static terrain layer.
    #[must_use]
    pub fn terrain(world: &World) -> &Terrain {
        &world.terrain
    }

    /// Occupancy index used for collision and ray queries.
    #[must_use]
    pub fn spatial_index(world: &World) -> &SpatialIndex {
        &world.collider
    }

    /// Observer and resident indices.
    #[must_use]
    pub fn visibility(world: &World) -> &VisibilityTracker {
        &world.tracker
    }

    /// Looks up an agent by identifier.
    #[must_use]
    pub fn agent(world: &World, agent: AgentId) -> Option<&Agent> {
        world.agents.get(&agent)
    }

    /// Identifiers of every agent in ascending order.
    #[must_use]
    pub fn agent_ids(world: &World) -> Vec<AgentId> {
        world.agents.keys().copied().collect()
    }

    /// Looks up a team by identifier.
    #[must_use]
    pub fn team(world: &World, team: TeamId) -> Option<&Team> {
        world.teams.get(&team)
    }

    /// Every team in ascending identifier order.
    pub fn teams(world: &World) -> impl Iterator<Item = (TeamId, &Team)> {
        world.teams.iter().map(|(id, team)| (*id, team))
    }

    /// Reports whether any member of `team` currently sees `agent`.
    #[must_use]
    pub fn enemy_observed(world: &World, team: TeamId, agent: AgentId) -> bool {
        world.teams.get(&team).is_some_and(|team| team.observes(agent))
    }

    /// Agents whose bounds intersect the pixel rectangle, for selection.
    #[must_use]
    pub fn agents_in_box(world: &World, top_left: PixelPos, bottom_right: PixelPos) -> Vec<AgentId> {
        world.collider.agents_in_box(top_left, bottom_right)
    }

    /// Items lying on the tile.
    #[must_use]
    pub fn items_at(world: &World, tile: TilePos) -> Vec<ItemId> {
        world.tracker.items(tile).collect()
    }

    /// Captures a snapshot of every agent in ascending identifier order.
    #[must_use]
    pub fn agent_view(world: &World) -> AgentView {
        let mut snapshots: Vec<AgentSnapshot> = world
            .agents
            .values()
            .map(|agent| AgentSnapshot {
                id: agent.id,
                team: agent.team,
                position: agent.position,
                pixel: agent.pixel,
                tile: agent.tile,
                health: agent.health,
                dead: agent.dead,
                label: agent.label.clone(),
            })
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        AgentView { snapshots }
    }

    /// Read-only snapshot describing all agents.
    #[derive(Clone, Debug, PartialEq)]
    pub struct AgentView {
        snapshots: Vec<AgentSnapshot>,
    }

    impl AgentView {
        /// Iterator over the captured snapshots in deterministic order.
        pub fn iter(&self) -> impl Iterator<Item = &AgentSnapshot> {
            self.snapshots.iter()
        }

        /// Consumes the view, yielding the underlying snapshots.
        pub fn into_vec(self) -> Vec<AgentSnapshot> {
            self.snapshots
        }
    }

    /// Immutable representation of a single agent's state.
    #[derive(Clone, Debug, PartialEq)]
    pub struct AgentSnapshot {
        /// Unique identifier assigned to the agent.
        pub id: AgentId,
        /// Team the agent belongs to.
        pub team: TeamId,
        /// Continuous position.
        pub position: Vector,
        /// Pixel containing the position.
        pub pixel: PixelPos,
        /// Tile containing the position.
        pub tile: TilePos,
        /// Remaining health.
        pub health: u16,
        /// Indicates whether the agent died and awaits despawn.
        pub dead: bool,
        /// Transient text displayed above the agent.
        pub label: Option<String>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: TeamColor = TeamColor::from_rgb(200, 40, 40);
    const BLUE: TeamColor = TeamColor::from_rgb(40, 40, 200);

    fn world(terrain: Terrain) -> World {
        World::new(&SimulationConfig::default(), terrain)
    }

    fn create_team(world: &mut World, name: &str, color: TeamColor) -> TeamId {
        let mut events = Vec::new();
        apply(
            world,
            Command::CreateTeam {
                name: name.to_owned(),
                color,
            },
            &mut events,
        );
        match events.as_slice() {
            [Event::TeamCreated { team }] => *team,
            other => panic!("unexpected events {other:?}"),
        }
    }

    fn spawn(world: &mut World, team: TeamId, tile: TilePos, template: AgentTemplate) -> AgentId {
        let mut events = Vec::new();
        apply(
            world,
            Command::SpawnAgent {
                team,
                tile,
                template,
            },
            &mut events,
        );
        match events.as_slice() {
            [Event::AgentSpawned { agent, .. }] => *agent,
            other => panic!("unexpected events {other:?}"),
        }
    }

    fn tile_centre(tile: TilePos) -> Vector {
        Vector::new(
            f64::from(tile.column() * 32 + 16),
            f64::from(tile.row() * 32 + 16),
        )
    }

    #[test]
    fn spawn_places_agent_at_tile_corner_offset_by_radii() {
        let mut world = world(Terrain::open(6, 6));
        let team = create_team(&mut world, "red", RED);
        let agent = spawn(&mut world, team, TilePos::new(2, 3), AgentTemplate::gnome(32));

        let entry = query::agent(&world, agent).expect("spawned");
        assert_eq!(entry.pixel(), PixelPos::new(72, 101));
        assert_eq!(entry.tile(), TilePos::new(2, 3));
        assert_eq!(entry.health(), 30);
        assert!(query::team(&world, team)
            .expect("team")
            .members()
            .contains(&agent));
        assert!(entry.field_of_view().count() > 0);
    }

    #[test]
    fn spawn_rejections_carry_reason() {
        let terrain = Terrain::from_layout(&["...", ".#.", "..."]).expect("layout");
        let config = SimulationConfig::parse("[population]\nmax_agents = 1\n").expect("config");
        let mut world = World::new(&config, terrain);
        let team = create_team(&mut world, "red", RED);
        let gnome = AgentTemplate::gnome(32);

        let attempts = [
            (team, TilePos::new(5, 0), SpawnError::OutOfBounds),
            (TeamId::new(9), TilePos::new(0, 0), SpawnError::UnknownTeam),
            (team, TilePos::new(1, 1), SpawnError::TerrainBlocked),
        ];
        for (team, tile, expected) in attempts {
            let mut events = Vec::new();
            apply(
                &mut world,
                Command::SpawnAgent {
                    team,
                    tile,
                    template: gnome,
                },
                &mut events,
            );
            assert_eq!(
                events,
                vec![Event::SpawnRejected {
                    team,
                    tile,
                    reason: expected
                }]
            );
        }

        let _ = spawn(&mut world, team, TilePos::new(0, 0), gnome);
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::SpawnAgent {
                team,
                tile: TilePos::new(2, 2),
                template: gnome,
            },
            &mut events,
        );
        assert!(matches!(
            events.as_slice(),
            [Event::SpawnRejected {
                reason: SpawnError::CapacityExhausted,
                ..
            }]
        ));
    }

    #[test]
    fn occupied_cells_follow_committed_moves() {
        let mut world = world(Terrain::open(8, 8));
        let team = create_team(&mut world, "red", RED);
        let agent = spawn(&mut world, team, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let radii = AgentTemplate::gnome(32).radii;

        let mut events = Vec::new();
        for to in [
            Vector::new(50.5, 47.2),
            Vector::new(63.9, 63.1),
            Vector::new(120.0, 70.4),
            Vector::new(95.0, 160.0),
        ] {
            apply(&mut world, Command::MoveAgent { agent, to }, &mut events);
            let entry = query::agent(&world, agent).expect("agent");
            let index = query::spatial_index(&world);
            let mut expected = index.footprint(entry.pixel(), radii).expect("open");
            let mut actual = index.occupied_cells(agent).expect("indexed").to_vec();
            expected.sort_unstable();
            actual.sort_unstable();
            assert_eq!(actual, expected);
            assert_eq!(entry.pixel(), query::geometry(&world).pixel_of(to));
        }
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn sub_pixel_moves_emit_no_event() {
        let mut world = world(Terrain::open(4, 4));
        let team = create_team(&mut world, "red", RED);
        let agent = spawn(&mut world, team, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let start = query::agent(&world, agent).expect("agent").position();

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::MoveAgent {
                agent,
                to: start + Vector::new(0.4, 0.4),
            },
            &mut events,
        );
        assert!(events.is_empty());
        let entry = query::agent(&world, agent).expect("agent");
        assert_eq!(entry.position(), start + Vector::new(0.4, 0.4));
    }

    #[test]
    fn residents_are_pushed_to_observers_without_polling() {
        let mut world = world(Terrain::open(20, 3));
        let red = create_team(&mut world, "red", RED);
        let blue = create_team(&mut world, "blue", BLUE);
        let watcher = spawn(&mut world, red, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let friend = spawn(&mut world, red, TilePos::new(2, 1), AgentTemplate::gnome(32));
        let intruder = spawn(&mut world, blue, TilePos::new(3, 1), AgentTemplate::gnome(32));

        let perception = query::agent(&world, watcher).expect("watcher").perception();
        assert!(perception.enemies().contains(&intruder));
        assert!(perception.friends().contains(&friend));
        assert!(!perception.friends().contains(&watcher));
        assert!(query::enemy_observed(&world, red, intruder));

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::MoveAgent {
                agent: intruder,
                to: tile_centre(TilePos::new(17, 1)),
            },
            &mut events,
        );
        let perception = query::agent(&world, watcher).expect("watcher").perception();
        assert!(perception.enemies().is_empty());
        assert!(!query::enemy_observed(&world, red, intruder));
    }

    #[test]
    fn team_keeps_enemy_while_any_member_sees_it() {
        let mut world = world(Terrain::open(20, 3));
        let red = create_team(&mut world, "red", RED);
        let blue = create_team(&mut world, "blue", BLUE);
        let near = spawn(&mut world, red, TilePos::new(6, 1), AgentTemplate::gnome(32));
        let far = spawn(&mut world, red, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let enemy = spawn(&mut world, blue, TilePos::new(4, 1), AgentTemplate::gnome(32));
        assert!(query::agent(&world, far)
            .expect("far")
            .perception()
            .enemies()
            .contains(&enemy));

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::MoveAgent {
                agent: enemy,
                to: tile_centre(TilePos::new(9, 1)),
            },
            &mut events,
        );
        assert!(query::agent(&world, far)
            .expect("far")
            .perception()
            .enemies()
            .is_empty());
        assert!(query::agent(&world, near)
            .expect("near")
            .perception()
            .enemies()
            .contains(&enemy));
        assert!(query::enemy_observed(&world, red, enemy));
    }

    #[test]
    fn armor_absorbs_damage_and_health_clamps_at_zero() {
        let mut world = world(Terrain::open(6, 3));
        let red = create_team(&mut world, "red", RED);
        let blue = create_team(&mut world, "blue", BLUE);
        let attacker = spawn(&mut world, red, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let target = spawn(
            &mut world,
            blue,
            TilePos::new(2, 1),
            AgentTemplate::gnome(32).with_armor(5),
        );

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::InflictDamage {
                attacker,
                target,
                damage: 12,
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::AttackLanded {
                attacker,
                target,
                dealt: 7,
                remaining: 23
            }]
        );

        events.clear();
        for _ in 0..4 {
            apply(
                &mut world,
                Command::InflictDamage {
                    attacker,
                    target,
                    damage: 12,
                },
                &mut events,
            );
        }
        let entry = query::agent(&world, target).expect("target");
        assert_eq!(entry.health(), 0);
        assert!(entry.is_dead());
        let deaths = events
            .iter()
            .filter(|event| matches!(event, Event::AgentDied { .. }))
            .count();
        assert_eq!(deaths, 1);
        assert!(matches!(
            events.last(),
            Some(Event::AgentDied { agent }) if *agent == target
        ));
    }

    #[test]
    fn attack_weaker_than_armor_deals_nothing() {
        let mut world = world(Terrain::open(6, 3));
        let red = create_team(&mut world, "red", RED);
        let attacker = spawn(&mut world, red, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let target = spawn(
            &mut world,
            red,
            TilePos::new(3, 1),
            AgentTemplate::gnome(32).with_armor(8),
        );
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::InflictDamage {
                attacker,
                target,
                damage: 5,
            },
            &mut events,
        );
        assert_eq!(query::agent(&world, target).expect("target").health(), 30);
    }

    #[test]
    fn despawn_removes_agent_from_every_index() {
        let mut world = world(Terrain::open(10, 3));
        let red = create_team(&mut world, "red", RED);
        let blue = create_team(&mut world, "blue", BLUE);
        let watcher = spawn(&mut world, red, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let victim = spawn(&mut world, blue, TilePos::new(3, 1), AgentTemplate::gnome(32));
        assert!(query::enemy_observed(&world, blue, watcher));

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::DespawnAgent { agent: victim },
            &mut events,
        );
        assert_eq!(events, vec![Event::AgentDespawned { agent: victim }]);
        assert!(query::agent(&world, victim).is_none());
        assert!(query::spatial_index(&world).occupied_cells(victim).is_none());
        assert!(!query::enemy_observed(&world, red, victim));
        assert!(!query::enemy_observed(&world, blue, watcher));
        assert!(query::agent(&world, watcher)
            .expect("watcher")
            .perception()
            .enemies()
            .is_empty());
        assert!(!query::team(&world, blue)
            .expect("blue")
            .members()
            .contains(&victim));
    }

    #[test]
    fn separate_pushes_overlapping_agents_apart() {
        let mut world = world(Terrain::open(8, 4));
        let red = create_team(&mut world, "red", RED);
        let first = spawn(&mut world, red, TilePos::new(2, 1), AgentTemplate::gnome(32));
        let second = spawn(&mut world, red, TilePos::new(4, 1), AgentTemplate::gnome(32));

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::MoveAgent {
                agent: second,
                to: Vector::new(84.0, 45.0),
            },
            &mut events,
        );
        let before = query::agent(&world, first)
            .expect("first")
            .position()
            .distance(Vector::new(84.0, 45.0));
        apply(&mut world, Command::SeparateAgents { first, second }, &mut events);

        let a = query::agent(&world, first).expect("first").position();
        let b = query::agent(&world, second).expect("second").position();
        assert!(a.distance(b) > before);
        assert!((a.distance(b) - 16.0_f64.hypot(10.0)).abs() < 1e-9);
    }

    #[test]
    fn items_are_perceived_through_field_of_view() {
        let mut world = world(Terrain::open(12, 3));
        let red = create_team(&mut world, "red", RED);
        let agent = spawn(&mut world, red, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let near = ItemId::new(1);
        let far = ItemId::new(2);

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::PlaceItem {
                item: near,
                tile: TilePos::new(3, 1),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::PlaceItem {
                item: far,
                tile: TilePos::new(10, 1),
            },
            &mut events,
        );
        let items = query::agent(&world, agent).expect("agent").perception().items();
        assert!(items.contains(&near));
        assert!(!items.contains(&far));
        assert_eq!(query::items_at(&world, TilePos::new(10, 1)), vec![far]);

        apply(
            &mut world,
            Command::RemoveItem {
                item: near,
                tile: TilePos::new(3, 1),
            },
            &mut events,
        );
        assert!(query::agent(&world, agent)
            .expect("agent")
            .perception()
            .items()
            .is_empty());
    }

    #[test]
    fn labels_are_set_and_cleared() {
        let mut world = world(Terrain::open(4, 4));
        let red = create_team(&mut world, "red", RED);
        let agent = spawn(&mut world, red, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::SetLabel {
                agent,
                label: Some("Hey.".to_owned()),
            },
            &mut events,
        );
        assert_eq!(query::agent(&world, agent).expect("agent").label(), Some("Hey."));
        apply(&mut world, Command::SetLabel { agent, label: None }, &mut events);
        assert_eq!(query::agent(&world, agent).expect("agent").label(), None);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn move_into_rock_is_rejected_and_occupancy_kept() {
        let terrain = Terrain::from_layout(&["....", "....", "..#.", "...."]).expect("layout");
        let mut world = world(terrain);
        let team = create_team(&mut world, "red", RED);
        let agent = spawn(&mut world, team, TilePos::new(1, 1), AgentTemplate::gnome(32));
        let start = query::agent(&world, agent).expect("agent").pixel();

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::MoveAgent {
                agent,
                to: Vector::new(80.0, 80.0),
            },
            &mut events,
        );

        assert!(events.is_empty());
        let entry = query::agent(&world, agent).expect("agent");
        assert_eq!(entry.pixel(), start);
        assert_eq!(entry.tile(), TilePos::new(1, 1));
        let index = query::spatial_index(&world);
        let mut expected = index.footprint(start, entry.radii()).expect("legal");
        let mut actual = index.occupied_cells(agent).expect("indexed").to_vec();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected);
    }

    #[test]
    fn oversized_body_is_refused_at_spawn() {
        let mut world = world(Terrain::open(6, 6));
        let team = create_team(&mut world, "red", RED);
        let mut template = AgentTemplate::gnome(32);
        template.radii = Radii::new(40, 40);

        let mut events = Vec::new();
        apply(
            &mut world,
            Command::SpawnAgent {
                team,
                tile: TilePos::new(2, 2),
                template,
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![Event::SpawnRejected {
                team,
                tile: TilePos::new(2, 2),
                reason: SpawnError::OversizedBody,
            }]
        );
        assert!(query::agent(&world, AgentId::new(0)).is_none());

        template.radii = Radii::new(16, 16);
        let _ = spawn(&mut world, team, TilePos::new(2, 2), template);
    }
}
