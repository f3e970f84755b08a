#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fixed-tick driver for the skirmish simulation.
//!
//! The scheduler owns the world and one [`Brain`] per agent. Each tick it
//! updates the living agents in ascending identifier order, applying the
//! commands of every brain before the next one runs, and removes the agents
//! that died once the whole pass is over.

use std::collections::BTreeMap;

use skirmish_core::{
    AgentId, AgentTemplate, Command, Event, ItemId, NavigationStats, Order, PixelPos,
    SimulationConfig, SpawnError, TeamColor, TeamId, TilePos, Vector,
};
use skirmish_system_brain::{BehaviorKind, Brain, BrainContext};
use skirmish_system_navigation::StepAsideRequest;
use skirmish_system_pathfinding::Pathfinder;
use skirmish_world::{apply, query, terrain::Terrain, Agent, World};

/// Reasons an order may be refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum OrderError {
    /// The addressed agent has no decision core, usually because it died.
    #[error("agent {0:?} is not controlled by the scheduler")]
    UnknownAgent(AgentId),
}

/// Owns the world and drives every agent's decision core.
#[derive(Debug)]
pub struct Scheduler {
    world: World,
    brains: BTreeMap<AgentId, Brain>,
    pathfinder: Pathfinder,
    stats: NavigationStats,
    seed: u64,
    tick: u64,
}

impl Scheduler {
    /// Creates a scheduler over an empty world built from the terrain.
    #[must_use]
    pub fn new(config: &SimulationConfig, terrain: Terrain) -> Self {
        let world = World::new(config, terrain);
        let pathfinder = Pathfinder::new(query::geometry(&world));
        Self {
            world,
            brains: BTreeMap::new(),
            pathfinder,
            stats: NavigationStats::default(),
            seed: config.population.seed,
            tick: 0,
        }
    }

    /// Read-only access to the world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Decision core of an agent.
    #[must_use]
    pub fn brain(&self, agent: AgentId) -> Option<&Brain> {
        self.brains.get(&agent)
    }

    /// Agents driven by the scheduler, in update order.
    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.brains.keys().copied()
    }

    /// Navigation outcome counters accumulated across every navigator.
    #[must_use]
    pub const fn stats(&self) -> NavigationStats {
        self.stats
    }

    /// Number of ticks run so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Agents inside a selection rectangle.
    #[must_use]
    pub fn select(&self, top_left: PixelPos, bottom_right: PixelPos) -> Vec<AgentId> {
        query::agents_in_box(&self.world, top_left, bottom_right)
    }

    /// Registers a team and returns its identifier.
    pub fn create_team(
        &mut self,
        name: impl Into<String>,
        color: TeamColor,
        out_events: &mut Vec<Event>,
    ) -> Option<TeamId> {
        let first = out_events.len();
        apply(
            &mut self.world,
            Command::CreateTeam {
                name: name.into(),
                color,
            },
            out_events,
        );
        out_events[first..].iter().find_map(|event| match event {
            Event::TeamCreated { team } => Some(*team),
            _ => None,
        })
    }

    /// Spawns an agent and attaches a decision core of the given behaviour.
    ///
    /// # Errors
    ///
    /// Returns the world's [`SpawnError`] when the spawn is rejected.
    pub fn spawn(
        &mut self,
        team: TeamId,
        tile: TilePos,
        template: AgentTemplate,
        behavior: BehaviorKind,
        out_events: &mut Vec<Event>,
    ) -> Result<AgentId, SpawnError> {
        let first = out_events.len();
        apply(
            &mut self.world,
            Command::SpawnAgent {
                team,
                tile,
                template,
            },
            out_events,
        );
        let outcome = out_events[first..]
            .iter()
            .find_map(|event| match event {
                Event::AgentSpawned { agent, .. } => Some(Ok(*agent)),
                Event::SpawnRejected { reason, .. } => Some(Err(*reason)),
                _ => None,
            })
            .unwrap_or(Err(SpawnError::UnknownTeam));

        if let Ok(agent) = outcome {
            let _ = self
                .brains
                .insert(agent, Brain::new(agent, behavior, self.seed));
        }
        outcome
    }

    /// Drops an item on a tile.
    pub fn place_item(&mut self, item: ItemId, tile: TilePos, out_events: &mut Vec<Event>) {
        apply(&mut self.world, Command::PlaceItem { item, tile }, out_events);
    }

    /// Picks an item up from a tile.
    pub fn remove_item(&mut self, item: ItemId, tile: TilePos, out_events: &mut Vec<Event>) {
        apply(&mut self.world, Command::RemoveItem { item, tile }, out_events);
    }

    /// Routes an externally issued order to the addressed decision cores.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::UnknownAgent`] when an addressed agent has no
    /// decision core. Group orders are refused as a whole.
    pub fn issue(&mut self, order: Order, out_events: &mut Vec<Event>) -> Result<(), OrderError> {
        let mut commands = Vec::new();
        match order {
            Order::MoveTo { agent, destination } => {
                let brain = self
                    .brains
                    .get_mut(&agent)
                    .ok_or(OrderError::UnknownAgent(agent))?;
                brain.order_move(destination, &self.world, &mut self.pathfinder);
            }
            Order::GroupMoveTo {
                agents,
                destination,
            } => self.order_group_move(&agents, destination)?,
            Order::Attack { agent, target } => {
                self.brains
                    .get_mut(&agent)
                    .ok_or(OrderError::UnknownAgent(agent))?
                    .order_attack(target, &mut commands);
            }
            Order::Say {
                agent,
                text,
                duration,
            } => {
                self.brains
                    .get_mut(&agent)
                    .ok_or(OrderError::UnknownAgent(agent))?
                    .say(text, duration, &mut commands);
            }
        }

        for command in commands {
            apply(&mut self.world, command, out_events);
        }
        Ok(())
    }

    fn order_group_move(
        &mut self,
        agents: &[AgentId],
        destination: PixelPos,
    ) -> Result<(), OrderError> {
        let mut positions = Vec::with_capacity(agents.len());
        for &agent in agents {
            let entry = query::agent(&self.world, agent)
                .filter(|_| self.brains.contains_key(&agent))
                .ok_or(OrderError::UnknownAgent(agent))?;
            positions.push((agent, entry.position()));
        }
        if positions.is_empty() {
            return Ok(());
        }

        let centroid =
            positions.iter().map(|(_, position)| *position).sum::<Vector>() / positions.len() as f64;
        let geometry = query::geometry(&self.world);
        for (agent, position) in positions {
            let target = geometry.pixel_of(destination.to_vector() + (position - centroid));
            let target = PixelPos::new(
                target.x().clamp(0, geometry.pixel_width() - 1),
                target.y().clamp(0, geometry.pixel_height() - 1),
            );
            if let Some(brain) = self.brains.get_mut(&agent) {
                brain.order_move(target, &self.world, &mut self.pathfinder);
            }
        }
        Ok(())
    }

    /// Runs one tick over every living agent, then removes the dead.
    pub fn tick(&mut self, out_events: &mut Vec<Event>) {
        self.tick = self.tick.wrapping_add(1);

        let order: Vec<AgentId> = self.brains.keys().copied().collect();
        let mut commands = Vec::new();
        let mut step_asides = Vec::new();
        for id in order {
            if query::agent(&self.world, id).map_or(true, Agent::is_dead) {
                continue;
            }
            let Some(brain) = self.brains.get_mut(&id) else {
                continue;
            };
            let mut ctx = BrainContext {
                world: &self.world,
                pathfinder: &mut self.pathfinder,
                stats: &mut self.stats,
                step_asides: &mut step_asides,
                out: &mut commands,
            };
            brain.update(&mut ctx);

            for command in commands.drain(..) {
                apply(&mut self.world, command, out_events);
            }
            for request in step_asides.drain(..) {
                self.forward_step_aside(request);
            }
        }

        let dead: Vec<AgentId> = self
            .brains
            .keys()
            .copied()
            .filter(|id| query::agent(&self.world, *id).map_or(true, Agent::is_dead))
            .collect();
        for id in dead {
            apply(&mut self.world, Command::DespawnAgent { agent: id }, out_events);
            let _ = self.brains.remove(&id);
        }

        tracing::trace!(
            tick = self.tick,
            agents = self.brains.len(),
            successes = self.stats.successes,
            failures = self.stats.failures,
            "tick complete"
        );
    }

    fn forward_step_aside(&mut self, request: StepAsideRequest) {
        let Some(template) = query::agent(&self.world, request.agent)
            .filter(|agent| !agent.is_dead())
            .map(|agent| *agent.template())
        else {
            return;
        };
        if let Some(brain) = self.brains.get_mut(&request.agent) {
            brain.step_aside(request.direction, &template);
        }
    }
}
