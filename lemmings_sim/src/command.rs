// Player input to the simulation.
//
// All external changes to a running level go through `SimAction`. The
// driver applies the actions passed to `SimState::step()` before advancing
// the clock, in the order given. Input that cannot apply (a click on empty
// ground, an ability with no charges left, a grant the lemming rejects) is
// ignored without error.
//
// Actions:
// - `SelectAbility` / `ClickAt`: the two-step UI flow. Select an ability
//   from the pool (selecting it again clears the selection), then click a
//   lemming to grant it.
// - `AssignAbility`: grant directly to a lemming by roster id.
//   Neither grant path applies while the level is paused.
// - `Nuke`: turn every active lemming into a bomber with a staggered fuse.
// - `SetPaused` / `TogglePause`, `SetSpeed` / `SpeedUp` / `SlowDown`:
//   playback controls. Speed is clamped to `GameConfig::speed_range`.
//
// See also: `sim.rs` for `apply_action()` which dispatches these,
// `lemming.rs` for the ability-grant rules.

use crate::types::{Ability, LemmingId};
use serde::{Deserialize, Serialize};

/// A single player input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimAction {
    SelectAbility { ability: Ability },
    /// Grant the selected ability to the first active lemming under the
    /// point.
    ClickAt { x: f32, y: f32 },
    AssignAbility { lemming: LemmingId, ability: Ability },
    Nuke,
    SetPaused { paused: bool },
    TogglePause,
    SetSpeed { speed: f32 },
    SpeedUp,
    SlowDown,
}

/// A scripted action, applied once simulated time reaches `at_ms`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedAction {
    pub at_ms: f32,
    pub action: SimAction,
}
