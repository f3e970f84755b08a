#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-agent decision core.
//!
//! A [`Brain`] is updated once per tick. It reads the world through the
//! `query` module and answers with [`Command`] values: position commits,
//! attacks and label changes. Collision-avoidance yields addressed to other
//! agents are returned through [`BrainContext::step_asides`].

pub mod actions;

use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skirmish_core::{
    geometry::scale_to_length, AgentId, AgentTemplate, Command, NavigationStats, PixelPos, Vector,
};
use skirmish_system_navigation::{NavStep, Navigator, StepAsideRequest, Traveler};
use skirmish_system_pathfinding::Pathfinder;
use skirmish_world::{collider::RayMode, query, Agent, World};

pub use actions::{Action, ActionKind};

const GREETINGS: [&str; 5] = ["Yo, man!", "Hello!", "How's it going.", "Hey.", "*nods*"];
const GREETING_DURATION: u32 = 60;
const MAX_THINKING: i32 = 1000;

/// Behaviour variant selected when an agent is spawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    /// Full decision loop: speech, orders, combat, actions, movement.
    Standard,
    /// Movement only; reacts to orders but never decides on its own.
    Player,
    /// Does nothing.
    Dead,
    /// Standard loop that also wanders to random goals and greets friends.
    RandomWalk,
}

#[derive(Clone, Debug)]
struct Wanderer {
    thinking: i32,
    rng: ChaCha8Rng,
    greeted: BTreeSet<AgentId>,
}

#[derive(Clone, Debug)]
enum Behavior {
    Standard,
    Player,
    Dead,
    RandomWalk(Wanderer),
}

impl Behavior {
    fn new(kind: BehaviorKind, agent: AgentId, seed: u64) -> Self {
        match kind {
            BehaviorKind::Standard => Self::Standard,
            BehaviorKind::Player => Self::Player,
            BehaviorKind::Dead => Self::Dead,
            BehaviorKind::RandomWalk => Self::RandomWalk(Wanderer {
                thinking: 0,
                rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(u64::from(agent.get()))),
                greeted: BTreeSet::new(),
            }),
        }
    }

    const fn kind(&self) -> BehaviorKind {
        match self {
            Self::Standard => BehaviorKind::Standard,
            Self::Player => BehaviorKind::Player,
            Self::Dead => BehaviorKind::Dead,
            Self::RandomWalk(_) => BehaviorKind::RandomWalk,
        }
    }
}

/// Speed and pending displacement of an agent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Motion {
    speed: f64,
    direction: Option<Vector>,
    requested: bool,
    clip_checked: bool,
}

impl Motion {
    /// Current speed in pixels per tick.
    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Displacement applied on the next movement update, if any.
    #[must_use]
    pub const fn direction(&self) -> Option<Vector> {
        self.direction
    }

    fn accelerate(&mut self, template: &AgentTemplate) {
        self.speed = (self.speed + template.acceleration).min(template.max_speed);
    }

    fn decelerate(&mut self, template: &AgentTemplate) {
        self.speed = (self.speed - template.acceleration).max(0.0);
    }

    fn request(
        &mut self,
        direction: Vector,
        clip_checked: bool,
        normalized: bool,
        template: &AgentTemplate,
    ) {
        let direction = if normalized {
            direction
        } else {
            self.accelerate(template);
            scale_to_length(direction, self.speed)
        };
        self.direction = Some(direction);
        self.clip_checked = clip_checked;
        self.requested = true;
    }
}

/// Shared state lent to a brain for the duration of one update.
#[derive(Debug)]
pub struct BrainContext<'a> {
    /// Read-only world snapshot.
    pub world: &'a World,
    /// Pathfinder shared by every navigator.
    pub pathfinder: &'a mut Pathfinder,
    /// Navigation outcome counters.
    pub stats: &'a mut NavigationStats,
    /// Yield requests addressed to other agents.
    pub step_asides: &'a mut Vec<StepAsideRequest>,
    /// Commands to apply once the update returns.
    pub out: &'a mut Vec<Command>,
}

/// Decision core owned by one agent.
#[derive(Clone, Debug)]
pub struct Brain {
    agent: AgentId,
    behavior: Behavior,
    motion: Motion,
    navigator: Option<Navigator>,
    actions: Vec<Action>,
    opinion: Option<Action>,
    forced_target: Option<AgentId>,
    forced_timer: u32,
    target: Option<AgentId>,
}

impl Brain {
    /// Creates an idle brain for `agent`. `seed` feeds the random-walk behaviour.
    #[must_use]
    pub fn new(agent: AgentId, kind: BehaviorKind, seed: u64) -> Self {
        Self {
            agent,
            behavior: Behavior::new(kind, agent, seed),
            motion: Motion::default(),
            navigator: None,
            actions: Vec::new(),
            opinion: None,
            forced_target: None,
            forced_timer: 0,
            target: None,
        }
    }

    /// Agent driven by this brain.
    #[must_use]
    pub const fn agent(&self) -> AgentId {
        self.agent
    }

    /// Behaviour variant of this brain.
    #[must_use]
    pub const fn kind(&self) -> BehaviorKind {
        self.behavior.kind()
    }

    /// Speed and pending displacement.
    #[must_use]
    pub const fn motion(&self) -> &Motion {
        &self.motion
    }

    /// Active navigator, if any.
    #[must_use]
    pub const fn navigator(&self) -> Option<&Navigator> {
        self.navigator.as_ref()
    }

    /// Queued non-speech actions, oldest first.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Speech currently shown, if any.
    #[must_use]
    pub const fn opinion(&self) -> Option<&Action> {
        self.opinion.as_ref()
    }

    /// Target of an explicit attack order.
    #[must_use]
    pub const fn forced_target(&self) -> Option<AgentId> {
        self.forced_target
    }

    /// Enemy chosen by the brain itself.
    #[must_use]
    pub const fn target(&self) -> Option<AgentId> {
        self.target
    }

    /// Runs one tick of the decision core.
    pub fn update(&mut self, ctx: &mut BrainContext<'_>) {
        if query::agent(ctx.world, self.agent).map_or(true, Agent::is_dead) {
            return;
        }

        match self.behavior.kind() {
            BehaviorKind::Dead => {}
            BehaviorKind::Player => {
                self.update_opinion(ctx);
                self.update_movement(ctx);
            }
            BehaviorKind::Standard => self.update_standard(ctx),
            BehaviorKind::RandomWalk => {
                self.greet(ctx);
                self.update_standard(ctx);
                self.wander(ctx);
            }
        }
    }

    /// Starts forced navigation to `destination`, overriding queued actions
    /// until it completes.
    pub fn order_move(&mut self, destination: PixelPos, world: &World, pathfinder: &mut Pathfinder) {
        if self.behavior.kind() == BehaviorKind::Dead {
            return;
        }
        let Some(me) = query::agent(world, self.agent) else {
            return;
        };
        let traveler = Traveler::new(me, self.motion.speed);
        self.navigator = Some(Navigator::new(
            &traveler,
            destination,
            true,
            world,
            pathfinder,
        ));
    }

    /// Sets an explicit attack target. Queued actions are interrupted and a
    /// forced move, if any, is cancelled.
    pub fn order_attack(&mut self, target: AgentId, out: &mut Vec<Command>) {
        self.clear_actions(out);
        if self.navigator.as_ref().is_some_and(Navigator::is_forced) {
            self.navigator = None;
        }
        self.forced_target = Some(target);
        self.forced_timer = 0;
    }

    /// Replaces the current speech, cleaning up the old one.
    pub fn say(&mut self, text: impl Into<String>, duration: u32, out: &mut Vec<Command>) {
        if let Some(mut old) = self.opinion.take() {
            old.interrupt(self.agent, out);
        }
        self.opinion = Some(Action::speak(text, duration));
    }

    /// Appends an action to the queue.
    pub fn force_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Interrupts and discards every queued action.
    pub fn clear_actions(&mut self, out: &mut Vec<Command>) {
        for mut action in self.actions.drain(..) {
            action.interrupt(self.agent, out);
        }
    }

    /// Best-effort yield request from a navigating neighbour. Ignored while
    /// the agent is already moving.
    pub fn step_aside(&mut self, direction: Vector, template: &AgentTemplate) {
        if self.motion.speed > 0.0 {
            return;
        }
        self.motion.request(direction, false, false, template);
    }

    fn update_standard(&mut self, ctx: &mut BrainContext<'_>) {
        self.update_opinion(ctx);

        if self.navigator.as_ref().is_some_and(Navigator::is_forced) {
            self.update_movement(ctx);
            return;
        }

        if self.actions.is_empty() {
            self.obtain_action(ctx);
        }

        if self.actions.is_empty() {
            self.update_movement(ctx);
        } else {
            self.update_actions(ctx);
        }
    }

    fn update_opinion(&mut self, ctx: &mut BrainContext<'_>) {
        let world = ctx.world;
        let Some(me) = query::agent(world, self.agent) else {
            return;
        };
        if let Some(opinion) = self.opinion.as_mut() {
            if opinion.update(me, ctx.out) {
                self.opinion = None;
            }
        }
    }

    fn update_actions(&mut self, ctx: &mut BrainContext<'_>) {
        let world = ctx.world;
        let Some(me) = query::agent(world, self.agent) else {
            return;
        };
        let out = &mut *ctx.out;
        self.actions.retain_mut(|action| !action.update(me, out));
    }

    fn obtain_action(&mut self, ctx: &mut BrainContext<'_>) {
        let world = ctx.world;
        let Some(me) = query::agent(world, self.agent) else {
            return;
        };

        if let Some(forced) = self.forced_target {
            let target = query::agent(world, forced);
            match target {
                Some(target) if !target.is_dead() && in_range(me, target) => {
                    self.actions
                        .push(Action::attack(forced, me.template().attack_time));
                    return;
                }
                Some(target)
                    if !target.is_dead() && query::enemy_observed(world, me.team(), forced) =>
                {
                    let interval = query::config(world).combat.forced_target_recalc_interval.max(1);
                    self.forced_timer = self.forced_timer.wrapping_add(1);
                    if self.forced_timer % interval == 1 % interval {
                        self.navigate_to(me, target.pixel(), ctx);
                        return;
                    }
                }
                _ => {
                    if let Some(target) = target.filter(|target| !target.is_dead()) {
                        self.navigate_to(me, target.pixel(), ctx);
                    }
                    self.forced_target = None;
                    self.forced_timer = 0;
                }
            }
        }

        if !me.perception().enemies().is_empty() {
            if let Some(current) = self.target.and_then(|id| query::agent(world, id)) {
                if !current.is_dead() && in_range(me, current) {
                    self.actions
                        .push(Action::attack(current.id(), me.template().attack_time));
                    return;
                }
            }

            self.target = nearest_enemy(me, world);
            match self.target.and_then(|id| query::agent(world, id)) {
                Some(target) if in_range(me, target) => {
                    self.actions
                        .push(Action::attack(target.id(), me.template().attack_time));
                }
                Some(target) => self.navigate_to(me, target.pixel(), ctx),
                None => {}
            }
            return;
        }

        if let Some(previous) = self.target.take() {
            if let Some(target) = query::agent(world, previous).filter(|target| !target.is_dead()) {
                self.navigate_to(me, target.pixel(), ctx);
            }
        }
    }

    fn navigate_to(&mut self, me: &Agent, goal: PixelPos, ctx: &mut BrainContext<'_>) {
        let traveler = Traveler::new(me, self.motion.speed);
        self.navigator = Some(Navigator::new(
            &traveler,
            goal,
            false,
            ctx.world,
            ctx.pathfinder,
        ));
    }

    fn update_movement(&mut self, ctx: &mut BrainContext<'_>) {
        let world = ctx.world;
        let Some(me) = query::agent(world, self.agent) else {
            return;
        };
        let template = me.template();

        if !self.motion.requested {
            if let Some(navigator) = self.navigator.as_mut() {
                self.motion.accelerate(template);
                let traveler = Traveler::new(me, self.motion.speed);
                match navigator.navigate(
                    &traveler,
                    world,
                    ctx.pathfinder,
                    ctx.stats,
                    ctx.step_asides,
                ) {
                    NavStep::Blocked => {
                        self.navigator = None;
                        self.motion.direction = None;
                        self.motion.speed = 0.0;
                    }
                    NavStep::Reached => self.navigator = None,
                    NavStep::Step(step) => self.motion.request(step, true, true, template),
                }
            }
        }

        if let Some(direction) = self.motion.direction {
            self.commit_move(world, me, direction, ctx.out);

            if !self.motion.requested && self.navigator.is_none() {
                self.motion.decelerate(template);
                self.motion.direction = if self.motion.speed > 0.0 {
                    Some(scale_to_length(direction, self.motion.speed))
                } else {
                    None
                };
            }
        }

        self.motion.requested = false;
        self.motion.clip_checked = false;
    }

    fn commit_move(&mut self, world: &World, me: &Agent, direction: Vector, out: &mut Vec<Command>) {
        let start = me.position();
        let end = start + direction;
        if !self.motion.clip_checked {
            let clear = query::spatial_index(world)
                .ray_query(self.agent, start, end, RayMode::Precise)
                .is_some_and(|blockers| blockers.is_empty());
            if !clear {
                self.motion.speed = 0.0;
                return;
            }
        }
        if direction != Vector::ZERO {
            out.push(Command::MoveAgent {
                agent: self.agent,
                to: end,
            });
        }
    }

    fn greet(&mut self, ctx: &mut BrainContext<'_>) {
        let Behavior::RandomWalk(wanderer) = &mut self.behavior else {
            return;
        };
        let Some(me) = query::agent(ctx.world, self.agent) else {
            return;
        };
        let Some(friend) = me
            .perception()
            .friends()
            .iter()
            .copied()
            .find(|friend| !wanderer.greeted.contains(friend))
        else {
            return;
        };
        let _ = wanderer.greeted.insert(friend);
        let text = GREETINGS[wanderer.rng.gen_range(0..GREETINGS.len())];
        tracing::trace!(agent = self.agent.get(), friend = friend.get(), text, "greeting");
        self.say(text, GREETING_DURATION, ctx.out);
    }

    fn wander(&mut self, ctx: &mut BrainContext<'_>) {
        let world = ctx.world;
        let Behavior::RandomWalk(wanderer) = &mut self.behavior else {
            return;
        };
        wanderer.thinking = wanderer.thinking.saturating_sub(1);
        if wanderer.thinking > 0 {
            return;
        }

        let geometry = query::geometry(world);
        let goal = PixelPos::new(
            wanderer.rng.gen_range(0..geometry.pixel_width()),
            wanderer.rng.gen_range(0..geometry.pixel_height()),
        );
        let clean = query::spatial_index(world)
            .clip_check(self.agent, goal, false)
            .is_some_and(|blockers| blockers.is_empty());
        if !clean {
            return;
        }
        wanderer.thinking = wanderer.rng.gen_range(1..=MAX_THINKING);

        let Some(me) = query::agent(world, self.agent) else {
            return;
        };
        let traveler = Traveler::new(me, self.motion.speed);
        self.navigator = Some(Navigator::new(
            &traveler,
            goal,
            false,
            world,
            ctx.pathfinder,
        ));
    }
}

fn in_range(me: &Agent, target: &Agent) -> bool {
    me.position().distance(target.position()) < me.template().attack_range
}

fn nearest_enemy(me: &Agent, world: &World) -> Option<AgentId> {
    let tile_size = f64::from(query::geometry(world).tile_size());
    let mut best = (f64::from(me.template().sight_range) + 1.0)
        * std::f64::consts::SQRT_2
        * tile_size;
    let mut nearest = None;
    for &enemy in me.perception().enemies() {
        let Some(candidate) = query::agent(world, enemy) else {
            continue;
        };
        if candidate.is_dead() {
            continue;
        }
        let distance = me.position().distance(candidate.position());
        if distance < best {
            best = distance;
            nearest = Some(enemy);
        }
    }
    nearest
}
