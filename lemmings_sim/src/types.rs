// Core types shared across the simulation.
//
// Defines pixel-space geometry (`PixelPoint`, `Rect`), the lemming roster
// identifier (`LemmingId`), facing (`Direction`), the per-lemming state
// enum (`LemmingState`), player abilities (`Ability`), and terrain piece
// kinds (`PieceKind`). All types derive `Serialize` and `Deserialize` so
// they can appear in config files, level files, command scripts and
// render snapshots.
//
// Coordinate system: X grows to the right, Y grows downward, both in
// playfield pixels. A lemming's `(x, y)` is the top-left of its bounding
// box; its feet sit on row `y + height`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// An integer pixel position, used for the entry and exit anchors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in playfield pixels (top-left + size).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Strict overlap test: rectangles that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && self.x + self.w > other.x
            && self.y < other.y + other.h
            && self.y + self.h > other.y
    }

    /// Inclusive containment test for a point (used for click targeting).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.w && y >= self.y && y <= self.y + self.h
    }
}

/// Round a coordinate to whole pixels, halves rounding toward +infinity.
///
/// `f32::round` rounds halves away from zero, which would shift negative
/// half-pixel coordinates the other way; terrain placement needs the same
/// rule on both sides of the origin.
pub fn round_px(v: f32) -> i32 {
    (v + 0.5).floor() as i32
}

// ---------------------------------------------------------------------------
// Roster identifiers
// ---------------------------------------------------------------------------

/// Slot index of a lemming in the driver's roster. Slots are assigned in
/// release order and never reused within a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LemmingId(pub u32);

impl fmt::Display for LemmingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LemmingId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Simulation enums
// ---------------------------------------------------------------------------

/// Horizontal facing of a lemming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// `-1.0` for left, `+1.0` for right.
    pub fn sign(self) -> f32 {
        match self {
            Direction::Left => -1.0,
            Direction::Right => 1.0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

/// The discrete behavior state of a lemming. See `lemming.rs` for the
/// transition rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LemmingState {
    Falling,
    Walking,
    Climbing,
    Floating,
    Digging,
    Building,
    Blocking,
    Bashing,
    Mining,
    Exploding,
    Splatting,
    Exiting,
}

impl LemmingState {
    pub const ALL: [LemmingState; 12] = [
        LemmingState::Falling,
        LemmingState::Walking,
        LemmingState::Climbing,
        LemmingState::Floating,
        LemmingState::Digging,
        LemmingState::Building,
        LemmingState::Blocking,
        LemmingState::Bashing,
        LemmingState::Mining,
        LemmingState::Exploding,
        LemmingState::Splatting,
        LemmingState::Exiting,
    ];

    /// States that end in removal and ignore the exit sensor and bomber fuse.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LemmingState::Exploding | LemmingState::Splatting | LemmingState::Exiting
        )
    }
}

/// Abilities the player can hand out from the level's pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Climber,
    Floater,
    Bomber,
    Blocker,
    Builder,
    Basher,
    Miner,
    Digger,
}

impl Ability {
    pub const ALL: [Ability; 8] = [
        Ability::Climber,
        Ability::Floater,
        Ability::Bomber,
        Ability::Blocker,
        Ability::Builder,
        Ability::Basher,
        Ability::Miner,
        Ability::Digger,
    ];

    /// The state a walking lemming enters when granted this ability, for
    /// the one-shot abilities. Persistent abilities return `None`.
    pub fn entry_state(self) -> Option<LemmingState> {
        match self {
            Ability::Blocker => Some(LemmingState::Blocking),
            Ability::Builder => Some(LemmingState::Building),
            Ability::Basher => Some(LemmingState::Bashing),
            Ability::Miner => Some(LemmingState::Mining),
            Ability::Digger => Some(LemmingState::Digging),
            Ability::Climber | Ability::Floater | Ability::Bomber => None,
        }
    }
}

/// Visual material of a terrain piece. Collision treats all kinds alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    #[default]
    Dirt,
    Rock,
    Bridge,
}
