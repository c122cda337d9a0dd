// Data-driven game configuration.
//
// All tunable simulation parameters live in `GameConfig`, loadable from
// JSON. The sim never uses magic numbers for physics or ability tuning; it
// reads them from here. `GameConfig::default()` reproduces the classic
// tuning at 2x pixel scale (a 960x540 playfield, 16x20 lemmings).
//
// Parameters are grouped like the lemming code reads them:
// - `MovementParams`: gravity, speeds, floor search distances, fall death.
// - `AbilityParams`: per-ability geometry and timing (dig radius, bridge
//   segment size, bomber fuse, ...).
// - `ExitSensor`: the exit hit-test window relative to the exit anchor.
// - `animations`: per-state frame count, frame duration and action frame,
//   keyed by `LemmingState`. This is the capability table the state machine
//   derives animation frames and action ticks from.
//
// See also: `lemming.rs` which consumes every group, `sim.rs` which owns
// the `GameConfig` and reads the driver-level fields (tick cap, speed range,
// nuke stagger), `terrain.rs` for the `ExitSensor` hit test.

use crate::error::ConfigError;
use crate::types::LemmingState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Walking, falling, climbing and floating physics. Speeds are in pixels per
/// tick at speed scale 1.0; distances are in pixels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MovementParams {
    /// Added to fall speed every tick.
    pub gravity: f32,
    /// Terminal fall speed.
    pub max_fall_speed: f32,
    pub walk_speed: f32,
    pub climb_speed: f32,
    /// Descent speed under an umbrella. A floater whose fall speed exceeds
    /// this opens the umbrella.
    pub float_speed: f32,
    /// A landing after a fall longer than this kills a non-floater.
    pub fatal_fall_distance: f32,
    /// How far below the feet walkers, bashers and diggers look for floor.
    pub floor_search_distance: u32,
    /// How far past the feet fallers and floaters look for a landing.
    pub landing_search_distance: u32,
    /// Tallest wall a walker steps over without turning or climbing.
    pub step_up_height: u32,
    /// Horizontal step a climber takes onto the ledge at the top of a wall.
    pub climb_ledge_step: f32,
}

/// Geometry and timing of the player-granted abilities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AbilityParams {
    /// Bridge segments a builder lays before returning to walking.
    pub builder_steps: u32,
    /// Size of one bridge segment.
    pub bridge_segment: (f32, f32),
    /// Forward and upward movement after each laid segment.
    pub build_advance: (f32, f32),
    /// Seconds from bomber assignment to the forced explosion.
    pub bomber_countdown_secs: f32,
    pub dig_radius: f32,
    /// Downward nudge after each dig.
    pub dig_step: f32,
    /// Width and height of the tunnel a basher punches per swing.
    pub bash_size: (f32, f32),
    /// Forward movement after each swing.
    pub bash_step: f32,
    /// How far beyond the front edge a basher looks for more terrain.
    pub bash_lookahead: f32,
    /// Forward and downward movement after each mining stroke.
    pub mine_step: f32,
    /// How long the splat animation plays before removal.
    pub splat_duration_ms: f32,
    /// Frame of the exit animation on which the lemming counts as saved.
    pub exit_final_frame: u32,
    /// Leading frames of the explosion animation that only show the countdown.
    pub explosion_countdown_frames: u32,
}

/// The exit sensor window, as inclusive offsets from the exit anchor. The
/// window is horizontally centred on the exit sprite and extends slightly
/// above and well below the anchor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExitSensor {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Default for ExitSensor {
    fn default() -> Self {
        Self {
            left: 6.0,
            right: 26.0,
            top: -4.0,
            bottom: 20.0,
        }
    }
}

/// Animation timing for one lemming state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationData {
    pub frame_count: u32,
    pub frame_duration_ms: f32,
    /// The frame on which the state's terrain action fires, if it has one.
    #[serde(default)]
    pub action_frame: Option<u32>,
}

impl AnimationData {
    pub const fn new(frame_count: u32, frame_duration_ms: f32, action_frame: Option<u32>) -> Self {
        Self {
            frame_count,
            frame_duration_ms,
            action_frame,
        }
    }
}

impl Default for AnimationData {
    fn default() -> Self {
        Self::new(2, 100.0, None)
    }
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    /// Playfield size in pixels. Terrain outside it does not exist.
    pub field_width: u32,
    pub field_height: u32,

    /// Upper bound on a single tick's wall-clock delta, before speed scaling.
    pub max_tick_ms: f32,

    /// Allowed speed multipliers (inclusive).
    pub speed_range: (f32, f32),

    /// Step used by the speed-up / slow-down controls.
    pub speed_increment: f32,

    /// Upper bound of the staggered fuse handed out by a nuke, in seconds.
    pub nuke_max_countdown_secs: f32,

    /// Lemming bounding box (width, height).
    pub lemming_size: (f32, f32),

    /// Where a released lemming appears, relative to the entry anchor.
    pub spawn_offset: (f32, f32),

    /// A lemming this far below the bottom edge, or fully past a side edge,
    /// is removed as lost.
    pub out_of_bounds_margin: f32,

    pub movement: MovementParams,

    pub abilities: AbilityParams,

    #[serde(default)]
    pub exit_sensor: ExitSensor,

    /// Per-state animation timing. States missing from the map use
    /// `AnimationData::default()`.
    pub animations: BTreeMap<LemmingState, AnimationData>,
}

impl GameConfig {
    /// Animation timing for `state`, with zero counts and durations clamped
    /// so frame derivation never divides by zero.
    pub fn animation(&self, state: LemmingState) -> AnimationData {
        let data = self.animations.get(&state).copied().unwrap_or_default();
        AnimationData {
            frame_count: data.frame_count.max(1),
            frame_duration_ms: data.frame_duration_ms.max(1.0),
            action_frame: data.action_frame,
        }
    }

    pub fn clamp_speed(&self, speed: f32) -> f32 {
        let (lo, hi) = self.speed_range;
        speed.clamp(lo.min(hi), hi.max(lo))
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut animations = BTreeMap::new();
        animations.insert(LemmingState::Walking, AnimationData::new(4, 100.0, None));
        animations.insert(LemmingState::Falling, AnimationData::new(2, 100.0, None));
        animations.insert(LemmingState::Climbing, AnimationData::new(4, 100.0, None));
        animations.insert(LemmingState::Floating, AnimationData::new(4, 100.0, None));
        animations.insert(LemmingState::Digging, AnimationData::new(4, 100.0, Some(3)));
        animations.insert(LemmingState::Building, AnimationData::new(3, 100.0, Some(2)));
        animations.insert(LemmingState::Blocking, AnimationData::new(2, 100.0, None));
        animations.insert(LemmingState::Bashing, AnimationData::new(4, 100.0, Some(3)));
        animations.insert(LemmingState::Mining, AnimationData::new(6, 100.0, Some(5)));
        // Frames 0-7 show the countdown, the blast happens on frame 12.
        animations.insert(LemmingState::Exploding, AnimationData::new(16, 150.0, Some(12)));
        animations.insert(LemmingState::Splatting, AnimationData::new(2, 100.0, None));
        animations.insert(LemmingState::Exiting, AnimationData::new(10, 100.0, None));

        Self {
            field_width: 960,
            field_height: 540,
            max_tick_ms: 50.0,
            speed_range: (0.5, 3.0),
            speed_increment: 0.5,
            nuke_max_countdown_secs: 2.0,
            lemming_size: (16.0, 20.0),
            spawn_offset: (8.0, 16.0),
            out_of_bounds_margin: 20.0,
            movement: MovementParams {
                gravity: 0.15,
                max_fall_speed: 4.0,
                walk_speed: 0.8,
                climb_speed: 0.8,
                float_speed: 0.8,
                fatal_fall_distance: 100.0,
                floor_search_distance: 6,
                landing_search_distance: 3,
                step_up_height: 6,
                climb_ledge_step: 10.0,
            },
            abilities: AbilityParams {
                builder_steps: 12,
                bridge_segment: (8.0, 2.0),
                build_advance: (3.0, 2.0),
                bomber_countdown_secs: 5.0,
                dig_radius: 6.0,
                dig_step: 2.0,
                bash_size: (6.0, 14.0),
                bash_step: 2.0,
                bash_lookahead: 16.0,
                mine_step: 2.0,
                splat_duration_ms: 600.0,
                exit_final_frame: 9,
                explosion_countdown_frames: 8,
            },
            exit_sensor: ExitSensor::default(),
            animations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_covers_every_state() {
        let config = GameConfig::default();
        for state in LemmingState::ALL {
            assert!(
                config.animations.contains_key(&state),
                "missing animation entry for {state:?}"
            );
        }
    }

    #[test]
    fn action_frames_lie_inside_their_animations() {
        let config = GameConfig::default();
        for (state, anim) in &config.animations {
            if let Some(frame) = anim.action_frame {
                assert!(
                    frame < anim.frame_count,
                    "{state:?} action frame {frame} outside {} frames",
                    anim.frame_count
                );
            }
        }
    }

    #[test]
    fn explosion_fires_after_countdown_frames() {
        let config = GameConfig::default();
        let anim = config.animation(LemmingState::Exploding);
        let action = anim.action_frame.unwrap();
        assert!(action >= config.abilities.explosion_countdown_frames);
    }

    #[test]
    fn missing_animation_falls_back_to_default() {
        let mut config = GameConfig::default();
        config.animations.remove(&LemmingState::Blocking);
        assert_eq!(
            config.animation(LemmingState::Blocking),
            AnimationData::default()
        );
    }

    #[test]
    fn zero_frame_counts_are_clamped() {
        let mut config = GameConfig::default();
        config
            .animations
            .insert(LemmingState::Walking, AnimationData::new(0, 0.0, None));
        let anim = config.animation(LemmingState::Walking);
        assert_eq!(anim.frame_count, 1);
        assert_eq!(anim.frame_duration_ms, 1.0);
    }

    #[test]
    fn clamp_speed_respects_range() {
        let config = GameConfig::default();
        assert_eq!(config.clamp_speed(10.0), 3.0);
        assert_eq!(config.clamp_speed(0.1), 0.5);
        assert_eq!(config.clamp_speed(1.5), 1.5);
    }

    #[test]
    fn config_json_roundtrip() {
        let config = GameConfig::default();
        let json = config.to_json().unwrap();
        let restored = GameConfig::from_json(&json).unwrap();
        assert_eq!(restored.field_width, 960);
        assert_eq!(restored.abilities.builder_steps, 12);
        assert_eq!(
            restored.animation(LemmingState::Mining).action_frame,
            Some(5)
        );
    }

    #[test]
    fn config_parses_hand_written_json() {
        let json = r#"{
            "field_width": 320,
            "field_height": 160,
            "max_tick_ms": 40.0,
            "speed_range": [1.0, 2.0],
            "speed_increment": 0.25,
            "nuke_max_countdown_secs": 1.0,
            "lemming_size": [8.0, 10.0],
            "spawn_offset": [4.0, 8.0],
            "out_of_bounds_margin": 10.0,
            "movement": {
                "gravity": 0.1,
                "max_fall_speed": 3.0,
                "walk_speed": 0.5,
                "climb_speed": 0.5,
                "float_speed": 0.5,
                "fatal_fall_distance": 50.0,
                "floor_search_distance": 3,
                "landing_search_distance": 2,
                "step_up_height": 3,
                "climb_ledge_step": 2.0
            },
            "abilities": {
                "builder_steps": 6,
                "bridge_segment": [4.0, 1.0],
                "build_advance": [2.0, 1.0],
                "bomber_countdown_secs": 3.0,
                "dig_radius": 3.0,
                "dig_step": 1.0,
                "bash_size": [3.0, 7.0],
                "bash_step": 1.0,
                "bash_lookahead": 4.0,
                "mine_step": 1.0,
                "splat_duration_ms": 300.0,
                "exit_final_frame": 4,
                "explosion_countdown_frames": 4
            },
            "animations": {
                "Digging": { "frame_count": 4, "frame_duration_ms": 80.0, "action_frame": 3 },
                "Walking": { "frame_count": 4, "frame_duration_ms": 80.0 }
            }
        }"#;
        let config = GameConfig::from_json(json).unwrap();
        assert_eq!(config.field_width, 320);
        assert_eq!(config.exit_sensor, ExitSensor::default());
        assert_eq!(config.animation(LemmingState::Walking).action_frame, None);
        assert_eq!(config.animation(LemmingState::Digging).action_frame, Some(3));
        // Not listed: falls back.
        assert_eq!(
            config.animation(LemmingState::Exiting),
            AnimationData::default()
        );
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(GameConfig::from_json("{ not json").is_err());
    }
}
