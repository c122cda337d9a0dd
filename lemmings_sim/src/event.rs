// Simulation output events.
//
// `SimState::step()` returns every event produced during the tick, in the
// order they happened. Events are fire-and-forget notifications for the
// outside world: the UI/event log reads the narrative kinds, the audio layer
// reads `Sound` cues. Nothing inside the sim consumes them.
//
// Lemmings push `SimEventKind`s into a per-tick buffer while they update;
// the driver stamps them with the tick number.
//
// See also: `sim.rs` for where events are collected, `lemming.rs` for the
// transition points that emit sound cues.

use crate::types::{Ability, LemmingId};
use serde::{Deserialize, Serialize};

/// A discrete notification for the audio collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundCue {
    /// Ability selection and assignment.
    Pop,
    /// A digger, basher or miner stroke.
    Dig,
    /// A builder laid a bridge segment.
    Build,
    Explosion,
    Splat,
    /// A lemming walked into the exit.
    Exit,
    /// Level won.
    Success,
    /// Level lost.
    Fail,
}

/// How a lemming was removed without being saved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathCause {
    Splat,
    Explosion,
    /// Walked or fell off the playfield.
    OutOfBounds,
}

/// Final result of a level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelOutcome {
    pub won: bool,
    pub saved: u32,
    pub required: u32,
    /// True if the level ended because the clock ran out.
    pub timed_out: bool,
}

/// An event emitted by the simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

/// Types of events visible to the player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    /// A lemming dropped out of the entry hatch.
    LemmingReleased { lemming: LemmingId },
    /// The ability selected for click targeting changed.
    AbilitySelected { ability: Option<Ability> },
    /// An ability was granted and a charge taken from the pool.
    AbilityAssigned { lemming: LemmingId, ability: Ability },
    /// A lemming finished its exit animation.
    LemmingSaved { lemming: LemmingId },
    LemmingDied { lemming: LemmingId, cause: DeathCause },
    /// Every active lemming was turned into a bomber.
    Nuked { count: u32 },
    SpeedChanged { speed: f32 },
    PauseChanged { paused: bool },
    LevelEnded { outcome: LevelOutcome },
    Sound { cue: SoundCue },
}
