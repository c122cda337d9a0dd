// Level definitions: the data a level hands to the simulation at load time.
//
// A `LevelDef` carries the release schedule, win condition, ability pool and
// a list of terrain operations. Levels are plain JSON so new ones need no
// code. Terrain operations replay against a freshly cleared `Terrain` in
// file order; a level with no terrain operations gets the default layout
// (a full-width ground strip with the entry top-left and the exit
// bottom-right).
//
// `LevelParams` is the slice of the definition the driver consumes at
// runtime. The driver decrements its own copy of the ability pool; the
// definition itself is never mutated, so restarting a level restores the
// original counts.
//
// Validation happens here, at the loading boundary. The driver accepts any
// `LevelParams` and treats degenerate values (zero release rate, empty
// pool) as "nothing happens".
//
// See also: `sim.rs` (`SimState::from_level`), `terrain.rs` for the
// operations replayed by `build()`, `error.rs` for `LevelError`.

use crate::error::LevelError;
use crate::terrain::Terrain;
use crate::types::{Ability, PieceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One terrain construction step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TerrainOp {
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        #[serde(default)]
        kind: PieceKind,
    },
    Entry {
        x: f32,
        y: f32,
    },
    Exit {
        x: f32,
        y: f32,
    },
}

/// The runtime parameters the driver reads from a level. Fields missing
/// from a level file take the `Default` values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelParams {
    /// Lemmings released over the course of the level.
    pub lemming_count: u32,
    /// Releases per simulated second.
    pub release_rate: f32,
    pub time_limit_secs: f32,
    pub required_saves: u32,
    /// Charges per ability. Abilities not listed have none.
    pub abilities: BTreeMap<Ability, u32>,
}

impl Default for LevelParams {
    fn default() -> Self {
        Self {
            lemming_count: 10,
            release_rate: 1.0,
            time_limit_secs: 300.0,
            required_saves: 5,
            abilities: BTreeMap::new(),
        }
    }
}

/// A complete level as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelDef {
    #[serde(default)]
    pub id: u32,
    pub name: String,
    #[serde(flatten)]
    pub params: LevelParams,
    #[serde(default)]
    pub terrain: Vec<TerrainOp>,
}

impl LevelDef {
    /// Parse and validate a level.
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        let level: LevelDef = serde_json::from_str(json)?;
        level.validate()?;
        Ok(level)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), LevelError> {
        if self.name.trim().is_empty() {
            return Err(LevelError::EmptyLevelName);
        }
        let p = &self.params;
        if !p.release_rate.is_finite() || p.release_rate <= 0.0 {
            return Err(LevelError::InvalidReleaseRate(p.release_rate));
        }
        if !p.time_limit_secs.is_finite() || p.time_limit_secs <= 0.0 {
            return Err(LevelError::InvalidTimeLimit(p.time_limit_secs));
        }
        if p.required_saves > p.lemming_count {
            return Err(LevelError::UnreachableRequirement {
                required: p.required_saves,
                total: p.lemming_count,
            });
        }
        Ok(())
    }

    /// Replay the terrain operations onto `terrain`, clearing it first.
    pub fn build(&self, terrain: &mut Terrain) {
        terrain.clear();
        if self.terrain.is_empty() {
            build_default(terrain);
            return;
        }
        for op in &self.terrain {
            match *op {
                TerrainOp::Rect { x, y, w, h, kind } => terrain.add_rect(x, y, w, h, kind),
                TerrainOp::Entry { x, y } => terrain.set_entry(x, y),
                TerrainOp::Exit { x, y } => terrain.set_exit(x, y),
            }
        }
    }
}

/// Ground strip along the bottom, entry top-left, exit bottom-right.
fn build_default(terrain: &mut Terrain) {
    let w = terrain.width() as f32;
    let h = terrain.height() as f32;
    terrain.add_rect(0.0, h - 40.0, w, 40.0, PieceKind::Dirt);
    terrain.set_entry(60.0, 60.0);
    terrain.set_exit(w - 100.0, h - 64.0);
}
