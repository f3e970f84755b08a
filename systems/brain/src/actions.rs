//! Timed actions queued by a decision core.

use skirmish_core::{AgentId, Command};
use skirmish_world::Agent;

/// What an action does while it runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// Does nothing until the timer runs out.
    Wait,
    /// Shows text above the actor. Passive: never suppresses movement.
    Speak {
        /// Text shown while the action runs.
        text: String,
    },
    /// Lands a hit on the target once the timer runs out.
    Attack {
        /// Agent receiving the hit.
        target: AgentId,
    },
}

/// Work carried out over a fixed number of ticks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    kind: ActionKind,
    duration: u32,
    elapsed: u32,
}

impl Action {
    /// Pure timer.
    #[must_use]
    pub const fn wait(duration: u32) -> Self {
        Self::new(ActionKind::Wait, duration)
    }

    /// Speech shown for `duration` ticks.
    #[must_use]
    pub fn speak(text: impl Into<String>, duration: u32) -> Self {
        Self::new(ActionKind::Speak { text: text.into() }, duration)
    }

    /// Attack on `target` landing after `duration` ticks.
    #[must_use]
    pub const fn attack(target: AgentId, duration: u32) -> Self {
        Self::new(ActionKind::Attack { target }, duration)
    }

    const fn new(kind: ActionKind, duration: u32) -> Self {
        Self {
            kind,
            duration,
            elapsed: 0,
        }
    }

    /// Kind of the action.
    #[must_use]
    pub const fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Ticks the action has run for.
    #[must_use]
    pub const fn elapsed(&self) -> u32 {
        self.elapsed
    }

    /// Ticks left before the action completes.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.duration.saturating_sub(self.elapsed)
    }

    /// Reports whether the action runs alongside movement and other actions.
    #[must_use]
    pub const fn is_passive(&self) -> bool {
        matches!(self.kind, ActionKind::Speak { .. })
    }

    /// Advances the action by one tick on behalf of `actor`.
    ///
    /// Returns `true` once the action has completed.
    pub fn update(&mut self, actor: &Agent, out: &mut Vec<Command>) -> bool {
        if let ActionKind::Speak { text } = &self.kind {
            if self.elapsed == 0 {
                out.push(Command::SetLabel {
                    agent: actor.id(),
                    label: Some(text.clone()),
                });
            }
        }

        self.elapsed = self.elapsed.saturating_add(1);
        if self.remaining() > 0 {
            return false;
        }

        match self.kind {
            ActionKind::Wait => {}
            ActionKind::Speak { .. } => out.push(Command::SetLabel {
                agent: actor.id(),
                label: None,
            }),
            ActionKind::Attack { target } => out.push(Command::InflictDamage {
                attacker: actor.id(),
                target,
                damage: actor.template().damage,
            }),
        }
        true
    }

    /// Cleans up after an action that is discarded before completion.
    pub fn interrupt(&mut self, actor: AgentId, out: &mut Vec<Command>) {
        if matches!(self.kind, ActionKind::Speak { .. }) && self.elapsed > 0 {
            out.push(Command::SetLabel {
                agent: actor,
                label: None,
            });
        }
    }
}
