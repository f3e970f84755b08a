#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Skirmish agent simulation.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and the per-agent systems. Systems submit [`Command`]
//! values describing desired mutations, the world executes those commands via
//! its `apply` entry point and broadcasts [`Event`] values describing what
//! changed. Externally issued [`Order`] values are routed by the scheduler to
//! the decision core of the addressed agent.

pub mod config;
pub mod geometry;

use serde::{Deserialize, Serialize};

pub use config::{
    CombatConfig, ConfigError, GridConfig, NavigationConfig, PerceptionConfig, PopulationConfig,
    SimulationConfig,
};
pub use geometry::{Direction, GridGeometry, PixelPos, Radii, TileBox, TilePos, Vector};

/// Unique identifier assigned to an agent. Issued in ascending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(u32);

impl TeamId {
    /// Creates a new team identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of an item lying on a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(u32);

impl ItemId {
    /// Creates a new item identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Visual identity of a team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamColor {
    red: u8,
    green: u8,
    blue: u8,
}

impl TeamColor {
    /// Creates a new team color from byte RGB components.
    #[must_use]
    pub const fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Red component of the color.
    #[must_use]
    pub const fn red(&self) -> u8 {
        self.red
    }

    /// Green component of the color.
    #[must_use]
    pub const fn green(&self) -> u8 {
        self.green
    }

    /// Blue component of the color.
    #[must_use]
    pub const fn blue(&self) -> u8 {
        self.blue
    }
}

/// Fixed statistics an agent is spawned with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentTemplate {
    /// Health the agent starts with.
    pub max_health: u16,
    /// Damage dealt by a landed attack before armor.
    pub damage: u16,
    /// Damage absorbed from every incoming attack.
    pub armor: u16,
    /// Field-of-view radius in tiles.
    pub sight_range: u16,
    /// Speed cap in pixels per tick.
    pub max_speed: f64,
    /// Speed gained or lost per tick while accelerating or decelerating.
    pub acceleration: f64,
    /// Ticks an attack takes to land.
    pub attack_time: u32,
    /// Centre-to-centre distance, in pixels, below which attacks are possible.
    pub attack_range: f64,
    /// Bounding ellipse radii. Each must stay below half a tile.
    pub radii: Radii,
}

impl AgentTemplate {
    /// The standard gnome warrior scaled to the configured tile size.
    #[must_use]
    pub fn gnome(tile_size: u16) -> Self {
        let max_speed = 4.0;
        Self {
            max_health: 30,
            damage: 5,
            armor: 0,
            sight_range: 5,
            max_speed,
            acceleration: max_speed / 10.0,
            attack_time: 10,
            attack_range: 30.0,
            radii: Radii::new(tile_size / 4, tile_size / 6),
        }
    }

    /// Overrides the armor value.
    #[must_use]
    pub fn with_armor(mut self, armor: u16) -> Self {
        self.armor = armor;
        self
    }

    /// Overrides the damage value.
    #[must_use]
    pub fn with_damage(mut self, damage: u16) -> Self {
        self.damage = damage;
        self
    }

    /// Overrides the sight range.
    #[must_use]
    pub fn with_sight_range(mut self, sight_range: u16) -> Self {
        self.sight_range = sight_range;
        self
    }

    /// Overrides the maximum speed, keeping acceleration at a tenth of it.
    #[must_use]
    pub fn with_max_speed(mut self, max_speed: f64) -> Self {
        self.max_speed = max_speed;
        self.acceleration = max_speed / 10.0;
        self
    }
}

/// Reasons a spawn request may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum SpawnError {
    /// Every agent identifier allowed by the configuration was issued.
    #[error("agent capacity exhausted")]
    CapacityExhausted,
    /// The requested tile lies outside the grid.
    #[error("spawn tile out of bounds")]
    OutOfBounds,
    /// The agent's footprint at the spawn position touches impassable terrain.
    #[error("spawn footprint blocked by terrain")]
    TerrainBlocked,
    /// The requested team does not exist.
    #[error("unknown team")]
    UnknownTeam,
    /// A body radius exceeds half a tile.
    #[error("body radii exceed half a tile")]
    OversizedBody,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Registers a new team.
    CreateTeam {
        /// Display name of the team.
        name: String,
        /// Visual identity of the team.
        color: TeamColor,
    },
    /// Creates an agent in the given tile.
    SpawnAgent {
        /// Team the agent joins.
        team: TeamId,
        /// Tile the agent starts in.
        tile: TilePos,
        /// Statistics the agent starts with.
        template: AgentTemplate,
    },
    /// Commits a new continuous position for an agent.
    MoveAgent {
        /// Agent being moved.
        agent: AgentId,
        /// New continuous position.
        to: Vector,
    },
    /// Pushes two overlapping agents apart along the line between them.
    SeparateAgents {
        /// First agent of the pair.
        first: AgentId,
        /// Second agent of the pair.
        second: AgentId,
    },
    /// Lands an attack on an agent.
    InflictDamage {
        /// Agent delivering the attack.
        attacker: AgentId,
        /// Agent receiving the attack.
        target: AgentId,
        /// Damage before the target's armor is applied.
        damage: u16,
    },
    /// Sets or clears the transient text shown above an agent.
    SetLabel {
        /// Agent whose label changes.
        agent: AgentId,
        /// New label, or `None` to clear it.
        label: Option<String>,
    },
    /// Drops an item on a passable tile.
    PlaceItem {
        /// Item being placed.
        item: ItemId,
        /// Tile receiving the item.
        tile: TilePos,
    },
    /// Picks an item up from a tile.
    RemoveItem {
        /// Item being removed.
        item: ItemId,
        /// Tile holding the item.
        tile: TilePos,
    },
    /// Removes a dead agent from every index and from its team.
    DespawnAgent {
        /// Agent being removed.
        agent: AgentId,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Confirms that a team was registered.
    TeamCreated {
        /// Identifier assigned to the team.
        team: TeamId,
    },
    /// Confirms that an agent entered the world.
    AgentSpawned {
        /// Identifier assigned to the agent.
        agent: AgentId,
        /// Team the agent joined.
        team: TeamId,
        /// Tile the agent occupies.
        tile: TilePos,
    },
    /// Reports that a spawn request was rejected.
    SpawnRejected {
        /// Team named in the request.
        team: TeamId,
        /// Tile named in the request.
        tile: TilePos,
        /// Specific reason the spawn failed.
        reason: SpawnError,
    },
    /// Confirms that an agent's pixel position changed.
    AgentMoved {
        /// Agent that moved.
        agent: AgentId,
        /// Pixel occupied before the move.
        from: PixelPos,
        /// Pixel occupied after the move.
        to: PixelPos,
    },
    /// Confirms that an attack landed.
    AttackLanded {
        /// Agent that delivered the attack.
        attacker: AgentId,
        /// Agent that received the attack.
        target: AgentId,
        /// Health actually removed after armor.
        dealt: u16,
        /// Health remaining afterwards.
        remaining: u16,
    },
    /// Announces that an agent's health reached zero.
    AgentDied {
        /// Agent that died.
        agent: AgentId,
    },
    /// Confirms that a dead agent was removed from the world.
    AgentDespawned {
        /// Agent that was removed.
        agent: AgentId,
    },
    /// Confirms that an agent's label changed.
    LabelChanged {
        /// Agent whose label changed.
        agent: AgentId,
        /// New label, if any.
        label: Option<String>,
    },
    /// Confirms that an item was placed.
    ItemPlaced {
        /// Item that was placed.
        item: ItemId,
        /// Tile now holding the item.
        tile: TilePos,
    },
    /// Confirms that an item was removed.
    ItemRemoved {
        /// Item that was removed.
        item: ItemId,
        /// Tile that held the item.
        tile: TilePos,
    },
}

/// Orders issued from outside the simulation, such as a selection UI.
#[derive(Clone, Debug, PartialEq)]
pub enum Order {
    /// Forced navigation of one agent to a pixel.
    MoveTo {
        /// Agent receiving the order.
        agent: AgentId,
        /// Destination pixel.
        destination: PixelPos,
    },
    /// Forced navigation of a group that keeps its formation.
    GroupMoveTo {
        /// Agents receiving the order.
        agents: Vec<AgentId>,
        /// Destination of the group's centroid.
        destination: PixelPos,
    },
    /// Explicit attack on a target.
    Attack {
        /// Agent receiving the order.
        agent: AgentId,
        /// Agent to attack.
        target: AgentId,
    },
    /// Passive speech shown above the agent.
    Say {
        /// Agent receiving the order.
        agent: AgentId,
        /// Text to display.
        text: String,
        /// Ticks the text stays visible.
        duration: u32,
    },
}

/// Diagnostic counters for navigator outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NavigationStats {
    /// Navigations that reached their goal.
    pub successes: u64,
    /// Navigations abandoned after collision avoidance was exhausted.
    pub failures: u64,
}

impl NavigationStats {
    /// Records a navigation that reached its goal.
    pub fn record_success(&mut self) {
        self.successes = self.successes.saturating_add(1);
    }

    /// Records a navigation that gave up.
    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentTemplate, Radii, SpawnError, TileBox, TilePos};
    use serde::{de::DeserializeOwned, Serialize};

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    #[test]
    fn tile_box_round_trips_through_bincode() {
        assert_round_trip(&TileBox::new(TilePos::new(4, 1), TilePos::new(-2, 7)));
    }

    #[test]
    fn spawn_error_round_trips_through_bincode() {
        assert_round_trip(&SpawnError::TerrainBlocked);
    }

    #[test]
    fn gnome_radii_scale_with_tile_size() {
        let template = AgentTemplate::gnome(32);
        assert_eq!(template.radii, Radii::new(8, 5));
        assert!((template.acceleration - 0.4).abs() < 1e-12);
        assert!(u32::from(template.radii.x()) * 2 < 32);
    }

    #[test]
    fn spawn_error_messages_are_readable() {
        assert_eq!(SpawnError::UnknownTeam.to_string(), "unknown team");
    }
}
