#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-agent local navigation with reactive collision avoidance.
//!
//! A [`Navigator`] steers one agent towards a goal pixel. It shortcuts the
//! coarse tile route to the farthest waypoint reachable in a straight line,
//! steps towards it at the agent's current speed and rotates the step away
//! from agents in the way, asking them to step aside.

use skirmish_core::{
    geometry::{perpendicular_left, perpendicular_right, rotate, scale_to_length},
    AgentId, Direction, NavigationStats, PixelPos, Radii, TileBox, TilePos, Vector,
};
use skirmish_system_pathfinding::{Heuristic, Pathfinder};
use skirmish_world::{collider::RayMode, query, Agent, World};

/// Outcome of a single navigation step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NavStep {
    /// The goal pixel lies inside the agent's ellipse.
    Reached,
    /// Navigation was abandoned; the navigator should be discarded.
    Blocked,
    /// Displacement to commit this tick. May be zero while waiting.
    Step(Vector),
}

/// Best-effort request for an agent to yield.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepAsideRequest {
    /// Agent asked to move.
    pub agent: AgentId,
    /// Suggested direction, not normalised to any speed.
    pub direction: Vector,
}

/// Kinematic state of the agent being steered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Traveler {
    /// Agent being steered.
    pub id: AgentId,
    /// Continuous position.
    pub position: Vector,
    /// Pixel containing the position.
    pub pixel: PixelPos,
    /// Tile containing the position.
    pub tile: TilePos,
    /// Bounding ellipse radii.
    pub radii: Radii,
    /// Speed cap in pixels per tick.
    pub max_speed: f64,
    /// Speed this tick in pixels.
    pub current_speed: f64,
}

impl Traveler {
    /// Captures the traveler state of a world agent moving at `current_speed`.
    #[must_use]
    pub fn new(agent: &Agent, current_speed: f64) -> Self {
        Self {
            id: agent.id(),
            position: agent.position(),
            pixel: agent.pixel(),
            tile: agent.tile(),
            radii: agent.radii(),
            max_speed: agent.template().max_speed,
            current_speed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    const fn flipped(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    const fn sign(self) -> f64 {
        match self {
            Self::Left => 1.0,
            Self::Right => -1.0,
        }
    }
}

/// Stateful guide taking one agent from its position to a goal pixel.
#[derive(Clone, Debug)]
pub struct Navigator {
    goal_pixel: PixelPos,
    goal_tile: TilePos,
    route: Option<Vec<Direction>>,
    putative_tile: TilePos,
    subgoal: PixelPos,
    time_traveled: u32,
    time_bound: u32,
    time_waited: u32,
    side: Side,
    forced: bool,
    unreachable: bool,
}

impl Navigator {
    /// Creates a navigator and immediately plans towards `goal`.
    ///
    /// Forced navigators come from explicit move orders and take precedence
    /// over the agent's own actions.
    pub fn new(
        traveler: &Traveler,
        goal: PixelPos,
        forced: bool,
        world: &World,
        pathfinder: &mut Pathfinder,
    ) -> Self {
        let goal_tile = query::geometry(world).tile_of(goal);
        let mut navigator = Self {
            goal_pixel: goal,
            goal_tile,
            route: None,
            putative_tile: traveler.tile,
            subgoal: goal,
            time_traveled: 0,
            time_bound: 0,
            time_waited: 0,
            side: Side::Left,
            forced,
            unreachable: false,
        };
        navigator.acquire_route(traveler, world, pathfinder);
        navigator
    }

    /// Final goal pixel.
    #[must_use]
    pub const fn goal(&self) -> PixelPos {
        self.goal_pixel
    }

    /// Waypoint currently steered towards.
    #[must_use]
    pub const fn subgoal(&self) -> PixelPos {
        self.subgoal
    }

    /// Remaining coarse route, tail-first, if one is in use.
    #[must_use]
    pub fn route(&self) -> Option<&[Direction]> {
        self.route.as_deref()
    }

    /// Reports whether the navigator serves an explicit move order.
    #[must_use]
    pub const fn is_forced(&self) -> bool {
        self.forced
    }

    /// Ticks allowed for reaching the current subgoal before replanning.
    #[must_use]
    pub const fn time_bound(&self) -> u32 {
        self.time_bound
    }

    /// Advances the navigator by one tick.
    ///
    /// Step-aside requests for agents in the way are appended to
    /// `step_asides`, at most once per agent per call.
    pub fn navigate(
        &mut self,
        traveler: &Traveler,
        world: &World,
        pathfinder: &mut Pathfinder,
        stats: &mut NavigationStats,
        step_asides: &mut Vec<StepAsideRequest>,
    ) -> NavStep {
        self.time_traveled = self.time_traveled.saturating_add(1);

        if traveler.radii.contains(traveler.pixel, self.goal_pixel) {
            stats.record_success();
            return NavStep::Reached;
        }

        if self.time_traveled >= self.time_bound
            && (self.route.is_none() || self.putative_tile != traveler.tile)
        {
            self.acquire_route(traveler, world, pathfinder);
        }
        if self.unreachable {
            return NavStep::Blocked;
        }

        if traveler.radii.contains(traveler.pixel, self.subgoal) {
            self.acquire_visible_subgoal(traveler, world);
        }

        self.avoid_collisions(traveler, world, stats, step_asides)
    }

    fn avoid_collisions(
        &mut self,
        traveler: &Traveler,
        world: &World,
        stats: &mut NavigationStats,
        step_asides: &mut Vec<StepAsideRequest>,
    ) -> NavStep {
        let config = query::config(world);
        let index = query::spatial_index(world);
        let rotation = config.navigation.avoidance_rotation;
        let attempts = config.avoidance_attempts();

        let principal = scale_to_length(
            self.subgoal.to_vector() - traveler.position,
            traveler.current_speed,
        );
        let start = traveler.position;
        let mut flipped = false;
        let mut asked: Vec<AgentId> = Vec::new();

        loop {
            for attempt in 0..attempts {
                let offset = self.side.sign() * attempt as f64 * rotation;
                let step = rotate(principal, offset);
                let Some(blockers) =
                    index.ray_query(traveler.id, start, start + step, RayMode::Precise)
                else {
                    continue;
                };
                if blockers.is_empty() {
                    self.time_waited = 0;
                    return NavStep::Step(step);
                }

                for blocker in blockers {
                    if asked.contains(&blocker) {
                        continue;
                    }
                    let Some(other) = query::agent(world, blocker) else {
                        continue;
                    };
                    let away = scale_to_length(other.position() - start, 1.0);
                    let aside = if flipped {
                        perpendicular_right(step)
                    } else {
                        perpendicular_left(step)
                    };
                    step_asides.push(StepAsideRequest {
                        agent: blocker,
                        direction: away + scale_to_length(aside, 1.0),
                    });
                    asked.push(blocker);
                }
            }

            if !flipped {
                self.side = self.side.flipped();
                flipped = true;
                continue;
            }

            self.time_waited = self.time_waited.saturating_add(1);
            if self.time_waited >= config.navigation.avoidance_wait_threshold {
                self.time_waited = 0;
                stats.record_failure();
                tracing::debug!(
                    agent = traveler.id.get(),
                    goal = ?self.goal_pixel,
                    "collision avoidance exhausted, giving up"
                );
                return NavStep::Blocked;
            }
            return NavStep::Step(Vector::ZERO);
        }
    }

    fn acquire_route(&mut self, traveler: &Traveler, world: &World, pathfinder: &mut Pathfinder) {
        if self.rough_clear(traveler, world, self.goal_pixel.to_vector()) {
            self.subgoal = self.goal_pixel;
            self.putative_tile = self.goal_tile;
            self.route = None;
            self.unreachable = false;
            self.estimate_travel_time(traveler, world);
            return;
        }

        let config = query::config(world);
        let terrain = query::terrain(world);
        let route = pathfinder.find_route(
            traveler.tile,
            TileBox::single(self.goal_tile),
            Heuristic::Euclidean,
            config.navigation.straight_path_bonus,
            |tile| terrain.is_passable(tile),
        );
        self.unreachable = route.is_empty() && traveler.tile != self.goal_tile;
        if self.unreachable {
            tracing::debug!(
                agent = traveler.id.get(),
                goal = ?self.goal_pixel,
                "no route to goal"
            );
        }
        self.route = Some(route);
        self.putative_tile = traveler.tile;
        self.acquire_visible_subgoal(traveler, world);
    }

    fn acquire_visible_subgoal(&mut self, traveler: &Traveler, world: &World) {
        let geometry = query::geometry(world);
        let mut current = traveler.tile;
        let mut blocked_after = None;

        if let Some(route) = &self.route {
            for (consumed, &direction) in route.iter().rev().enumerate() {
                let next = current.neighbor(direction);
                if !self.rough_clear(traveler, world, geometry.anchor(next).to_vector()) {
                    blocked_after = Some(consumed);
                    break;
                }
                current = next;
            }
        }

        match blocked_after {
            Some(consumed) => {
                if let Some(route) = self.route.as_mut() {
                    let keep = route.len() - consumed;
                    route.truncate(keep);
                }
                self.subgoal = geometry.anchor(current);
                self.putative_tile = current;
            }
            None => {
                self.subgoal = self.goal_pixel;
                self.putative_tile = self.goal_tile;
                self.route = None;
            }
        }
        self.estimate_travel_time(traveler, world);
    }

    fn estimate_travel_time(&mut self, traveler: &Traveler, world: &World) {
        let tile_size = f64::from(query::geometry(world).tile_size());
        let overestimation = query::config(world).navigation.travel_time_overestimation;
        let distance = traveler
            .position
            .distance(self.subgoal.to_vector())
            .max(2.0 * tile_size);
        self.time_bound = (overestimation * distance / traveler.max_speed) as u32;
        self.time_traveled = 0;
    }

    fn rough_clear(&self, traveler: &Traveler, world: &World, there: Vector) -> bool {
        let spacing = f64::from(traveler.radii.x()).max(1.0);
        query::spatial_index(world)
            .ray_query(
                traveler.id,
                traveler.position,
                there,
                RayMode::Rough { spacing },
            )
            .is_some_and(|blockers| blockers.is_empty())
    }
}
