// Per-lemming behavior state machine.
//
// Each released lemming is a `Lemming`: a bounding box, a facing, a
// `LemmingState`, persistent ability flags (climber, floater, bomber) and a
// few state-local counters. `update()` advances one tick: it reads the
// terrain to decide movement and transitions, and on a state's action frame
// writes back into the terrain (dig, bash, mine, build, explode).
//
// Tick order inside `update()`:
// 1. Advance the state clock and derive the animation frame.
// 2. Run the bomber fuse (non-terminal states only); on expiry the lemming
//    is forced into `Exploding` regardless of what it was doing.
// 3. Run the current state's behavior.
// 4. Exit sensor check on the body centre (non-terminal states only).
// 5. Out-of-bounds removal.
//
// Animation frames come from the absolute per-state frame clock
// `floor(elapsed / frame_duration)`; the displayed frame is the clock modulo
// the frame count. Terrain actions are gated by an `ActionLatch`, which
// fires exactly once for each visit to the action frame even when a long
// tick jumps over it and never twice while several ticks show the same
// frame.
//
// Continuous movement amounts are per tick and scale with the playback
// speed; the state clock and the bomber fuse take the already-scaled tick
// delta. Displacements tied to an action frame (dig, build, bash, mine
// steps) are fixed per action, since action frames already arrive faster at
// higher speed.
//
// See also: `terrain.rs` for the queries and mutation operators,
// `config.rs` for `MovementParams`, `AbilityParams` and the animation table,
// `sim.rs` for the driver that releases, updates and deflects lemmings.

use crate::config::GameConfig;
use crate::event::{DeathCause, SimEventKind, SoundCue};
use crate::terrain::Terrain;
use crate::types::{Ability, Direction, LemmingId, LemmingState, Rect};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Action latch
// ---------------------------------------------------------------------------

/// Fires a state's terrain action once per visit to its action frame.
///
/// Tracks the last frame clock it was advanced to and the clock value of the
/// last visit it fired for. A visit is a clock value `c` with
/// `c % frame_count == action_frame`; each one fires at most once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLatch {
    seen: Option<u64>,
    fired_at: Option<u64>,
}

impl ActionLatch {
    /// Advance to frame clock `to`. Returns `true` if a visit to
    /// `action_frame` happened since the previous call (inclusive of `to`)
    /// and has not fired yet. At most one visit fires per call.
    pub fn advance(&mut self, to: u64, frame_count: u32, action_frame: u32) -> bool {
        let start = self.seen.map_or(0, |s| s + 1);
        self.seen = Some(to);
        if to < start {
            return false;
        }
        let count = u64::from(frame_count.max(1));
        let action = u64::from(action_frame) % count;
        let offset = (to % count + count - action) % count;
        if offset > to {
            return false;
        }
        let visit = to - offset;
        if visit < start || self.fired_at == Some(visit) {
            return false;
        }
        self.fired_at = Some(visit);
        true
    }
}

// ---------------------------------------------------------------------------
// Lemming
// ---------------------------------------------------------------------------

/// One simulated lemming.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lemming {
    pub id: LemmingId,
    /// Top-left of the bounding box.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub direction: Direction,
    pub state: LemmingState,
    pub fall_speed: f32,
    /// `y` at the start of the current fall.
    pub fall_start_y: f32,
    pub can_climb: bool,
    pub can_float: bool,
    pub is_bomber: bool,
    /// Seconds until a bomber explodes.
    pub bomber_countdown: f32,
    pub builder_steps: u32,
    pub active: bool,
    pub saved: bool,
    state_elapsed_ms: f32,
    frame_clock: u64,
    action: ActionLatch,
}

/// Snapshot of a lemming for renderers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LemmingView {
    pub id: LemmingId,
    pub state: LemmingState,
    pub anim_frame: u32,
    pub direction: Direction,
    pub x: f32,
    pub y: f32,
    /// Whole seconds left on a bomber's fuse, while it is still ticking.
    pub fuse: Option<u32>,
    /// True during the leading frames of the explosion animation.
    pub oh_no: bool,
}

/// Borrowed world state for one `update()` call.
struct Tick<'a> {
    speed: f32,
    terrain: &'a mut Terrain,
    config: &'a GameConfig,
    events: &'a mut Vec<SimEventKind>,
}

impl Lemming {
    /// A freshly released lemming: falling, facing right.
    pub fn spawn(id: LemmingId, x: f32, y: f32, config: &GameConfig) -> Self {
        let (width, height) = config.lemming_size;
        Self {
            id,
            x,
            y,
            width,
            height,
            direction: Direction::Right,
            state: LemmingState::Falling,
            fall_speed: 0.0,
            fall_start_y: y,
            can_climb: false,
            can_float: false,
            is_bomber: false,
            bomber_countdown: 0.0,
            builder_steps: 0,
            active: true,
            saved: false,
            state_elapsed_ms: 0.0,
            frame_clock: 0,
            action: ActionLatch::default(),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// X of the leading edge in the facing direction.
    fn front_x(&self) -> f32 {
        match self.direction {
            Direction::Right => self.x + self.width,
            Direction::Left => self.x,
        }
    }

    /// The animation frame currently shown.
    pub fn anim_frame(&self, config: &GameConfig) -> u32 {
        let count = u64::from(config.animation(self.state).frame_count);
        (self.frame_clock % count) as u32
    }

    pub fn view(&self, config: &GameConfig) -> LemmingView {
        let anim_frame = self.anim_frame(config);
        let fuse = (self.is_bomber && !self.state.is_terminal())
            .then(|| self.bomber_countdown.max(0.0).ceil() as u32);
        LemmingView {
            id: self.id,
            state: self.state,
            anim_frame,
            direction: self.direction,
            x: self.x,
            y: self.y,
            fuse,
            oh_no: self.state == LemmingState::Exploding
                && self.frame_clock < u64::from(config.abilities.explosion_countdown_frames),
        }
    }

    pub fn set_state(&mut self, state: LemmingState, config: &GameConfig) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.state_elapsed_ms = 0.0;
        self.frame_clock = 0;
        self.action = ActionLatch::default();
        if state == LemmingState::Building {
            self.builder_steps = config.abilities.builder_steps;
        }
    }

    fn start_falling(&mut self, config: &GameConfig) {
        self.fall_start_y = self.y;
        self.fall_speed = 0.0;
        self.set_state(LemmingState::Falling, config);
    }

    /// Try to grant `ability`. Returns whether it was accepted; a rejected
    /// grant changes nothing.
    pub fn grant_ability(&mut self, ability: Ability, config: &GameConfig) -> bool {
        if !self.active {
            return false;
        }
        match ability {
            Ability::Climber => !std::mem::replace(&mut self.can_climb, true),
            Ability::Floater => !std::mem::replace(&mut self.can_float, true),
            Ability::Bomber => {
                if self.is_bomber || self.state.is_terminal() {
                    return false;
                }
                self.is_bomber = true;
                self.bomber_countdown = config.abilities.bomber_countdown_secs;
                true
            }
            Ability::Blocker
            | Ability::Builder
            | Ability::Basher
            | Ability::Miner
            | Ability::Digger => {
                let Some(state) = ability.entry_state() else {
                    return false;
                };
                if self.state != LemmingState::Walking {
                    return false;
                }
                self.set_state(state, config);
                true
            }
        }
    }

    /// Arm the bomber fuse with an explicit countdown, replacing any fuse
    /// already burning. Used by the nuke. Returns `false` if the lemming is
    /// past saving.
    pub fn arm_fuse(&mut self, countdown_secs: f32) -> bool {
        if !self.active || self.state.is_terminal() {
            return false;
        }
        self.is_bomber = true;
        self.bomber_countdown = countdown_secs;
        true
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advance one tick. `dt_ms` is the speed-scaled tick delta, `speed` the
    /// playback multiplier applied to per-tick movement.
    pub fn update(
        &mut self,
        dt_ms: f32,
        speed: f32,
        terrain: &mut Terrain,
        config: &GameConfig,
        events: &mut Vec<SimEventKind>,
    ) {
        if !self.active {
            return;
        }
        let mut t = Tick {
            speed,
            terrain,
            config,
            events,
        };

        self.state_elapsed_ms += dt_ms.max(0.0);
        self.frame_clock =
            (self.state_elapsed_ms / config.animation(self.state).frame_duration_ms) as u64;

        if self.is_bomber && !self.state.is_terminal() {
            self.bomber_countdown -= dt_ms / 1000.0;
            if self.bomber_countdown <= 0.0 {
                self.set_state(LemmingState::Exploding, config);
            }
        }

        match self.state {
            LemmingState::Walking => self.walk(&mut t),
            LemmingState::Falling => self.fall(&mut t),
            LemmingState::Floating => self.float(&mut t),
            LemmingState::Climbing => self.climb(&mut t),
            LemmingState::Digging => self.dig(&mut t),
            LemmingState::Building => self.build(&mut t),
            LemmingState::Blocking => {}
            LemmingState::Bashing => self.bash(&mut t),
            LemmingState::Mining => self.mine(&mut t),
            LemmingState::Exploding => self.explode(&mut t),
            LemmingState::Splatting => self.splat(&mut t),
            LemmingState::Exiting => self.exit(&mut t),
        }

        if self.active
            && !self.state.is_terminal()
            && t.terrain.exit_contains(self.center_x(), self.center_y())
        {
            t.events.push(SimEventKind::Sound {
                cue: SoundCue::Exit,
            });
            self.set_state(LemmingState::Exiting, config);
        }

        if self.active && self.out_of_bounds(t.terrain, config) {
            self.die(DeathCause::OutOfBounds, t.events);
        }
    }

    fn out_of_bounds(&self, terrain: &Terrain, config: &GameConfig) -> bool {
        self.y > terrain.height() as f32 + config.out_of_bounds_margin
            || self.x + self.width < 0.0
            || self.x > terrain.width() as f32
    }

    fn die(&mut self, cause: DeathCause, events: &mut Vec<SimEventKind>) {
        self.active = false;
        events.push(SimEventKind::LemmingDied {
            lemming: self.id,
            cause,
        });
    }

    fn action_due(&mut self, config: &GameConfig) -> bool {
        let anim = config.animation(self.state);
        match anim.action_frame {
            Some(frame) => self
                .action
                .advance(self.frame_clock, anim.frame_count, frame),
            None => false,
        }
    }

    /// Snap onto the floor under the body centre, searching from `lift` rows
    /// above the feet down to `depth` rows below them. Starts a fall if
    /// there is no floor.
    fn settle_or_fall(&mut self, t: &mut Tick<'_>, lift: u32, depth: u32) {
        let from = self.y + self.height - lift as f32;
        match t.terrain.find_floor_below(self.center_x(), from, lift + depth) {
            Some(floor) => self.y = floor as f32 - self.height + 1.0,
            None => self.start_falling(t.config),
        }
    }

    /// Move down by `dy`, stopping on the first floor crossed. Returns
    /// whether the lemming landed.
    fn descend(&mut self, dy: f32, t: &mut Tick<'_>) -> bool {
        let from = self.y + self.height;
        self.y += dy;
        let reach = dy.max(0.0).ceil() as u32 + t.config.movement.landing_search_distance;
        match t.terrain.find_floor_below(self.center_x(), from, reach) {
            Some(floor) => {
                self.y = floor as f32 - self.height + 1.0;
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Movement states
    // -----------------------------------------------------------------------

    fn walk(&mut self, t: &mut Tick<'_>) {
        let config = t.config;
        let m = &config.movement;
        self.x += self.direction.sign() * m.walk_speed * t.speed;

        let front = self.front_x();
        let probe_y = self.y + self.height * 0.4;
        if t.terrain.point_is_solid(front, probe_y) {
            let step = (1..=m.step_up_height)
                .find(|&dy| !t.terrain.point_is_solid(front, probe_y - dy as f32));
            match step {
                Some(dy) => self.y -= dy as f32,
                None => {
                    if self.can_climb {
                        self.set_state(LemmingState::Climbing, t.config);
                    } else {
                        self.direction = self.direction.reversed();
                    }
                    return;
                }
            }
        }

        self.settle_or_fall(t, m.step_up_height, m.floor_search_distance);
    }

    fn fall(&mut self, t: &mut Tick<'_>) {
        let config = t.config;
        let m = &config.movement;
        self.fall_speed = (self.fall_speed + m.gravity * t.speed).min(m.max_fall_speed);

        if self.can_float && self.fall_speed > m.float_speed {
            self.fall_speed = m.float_speed;
            self.set_state(LemmingState::Floating, t.config);
            return;
        }

        if self.descend(self.fall_speed * t.speed, t) {
            let distance = self.y - self.fall_start_y;
            if distance > m.fatal_fall_distance && !self.can_float {
                t.events.push(SimEventKind::Sound {
                    cue: SoundCue::Splat,
                });
                self.set_state(LemmingState::Splatting, t.config);
            } else {
                self.fall_speed = 0.0;
                self.set_state(LemmingState::Walking, t.config);
            }
        }
    }

    fn float(&mut self, t: &mut Tick<'_>) {
        if self.descend(t.config.movement.float_speed * t.speed, t) {
            self.fall_speed = 0.0;
            self.set_state(LemmingState::Walking, t.config);
        }
    }

    fn climb(&mut self, t: &mut Tick<'_>) {
        let config = t.config;
        let m = &config.movement;
        self.y -= m.climb_speed * t.speed;

        let mid = self.y + self.height * 0.5;
        if !t.terrain.point_is_solid(self.front_x(), mid) {
            // Over the top: step onto the ledge.
            self.x += self.direction.sign() * m.climb_ledge_step;
            let depth = (self.height * 0.5).ceil() as u32 + m.floor_search_distance;
            if let Some(floor) = t.terrain.find_floor_below(self.center_x(), mid, depth) {
                self.y = floor as f32 - self.height + 1.0;
            }
            self.set_state(LemmingState::Walking, t.config);
            return;
        }

        if t.terrain.point_is_solid(self.center_x(), self.y) {
            self.direction = self.direction.reversed();
            self.start_falling(t.config);
        }
    }

    // -----------------------------------------------------------------------
    // Terrain-changing states
    // -----------------------------------------------------------------------

    fn dig(&mut self, t: &mut Tick<'_>) {
        let config = t.config;
        let a = &config.abilities;
        if self.action_due(t.config) {
            t.terrain
                .erase_circle(self.center_x(), self.y + self.height, a.dig_radius);
            t.events.push(SimEventKind::Sound { cue: SoundCue::Dig });
            self.y += a.dig_step;
        }

        let feet = self.y + self.height;
        let depth = t.config.movement.floor_search_distance;
        if t
            .terrain
            .find_floor_below(self.center_x(), feet, depth)
            .is_none()
        {
            self.start_falling(t.config);
        }
    }

    fn build(&mut self, t: &mut Tick<'_>) {
        if !self.action_due(t.config) {
            return;
        }
        let config = t.config;
        let a = &config.abilities;
        let (seg_w, seg_h) = a.bridge_segment;
        let step_x = match self.direction {
            Direction::Right => self.x + self.width,
            Direction::Left => self.x - seg_w + 2.0,
        };
        let step_y = self.y + self.height - seg_h;
        t.terrain.add_bridge(step_x, step_y, seg_w, seg_h);
        t.events.push(SimEventKind::Sound {
            cue: SoundCue::Build,
        });

        let (advance_x, advance_y) = a.build_advance;
        self.x += self.direction.sign() * advance_x;
        self.y -= advance_y;
        self.builder_steps = self.builder_steps.saturating_sub(1);

        if self.builder_steps == 0 {
            self.set_state(LemmingState::Walking, t.config);
            return;
        }
        if t
            .terrain
            .point_is_solid(self.front_x(), self.y + self.height / 2.0)
        {
            self.direction = self.direction.reversed();
            self.set_state(LemmingState::Walking, t.config);
        }
    }

    fn bash(&mut self, t: &mut Tick<'_>) {
        let config = t.config;
        let a = &config.abilities;
        let mid = self.y + self.height / 2.0;
        if self.action_due(t.config) {
            let (bash_w, bash_h) = a.bash_size;
            let left = match self.direction {
                Direction::Right => self.x + self.width,
                Direction::Left => self.x - bash_w,
            };
            t.terrain.erase_rect(left, mid, bash_w, bash_h);
            t.events.push(SimEventKind::Sound { cue: SoundCue::Dig });
            self.x += self.direction.sign() * a.bash_step;
        }

        let front = self.front_x();
        let sign = self.direction.sign();
        let lookahead = a.bash_lookahead.max(0.0) as u32;
        let more_ahead =
            (1..=lookahead).any(|d| t.terrain.point_is_solid(front + sign * d as f32, mid));
        if !more_ahead {
            self.set_state(LemmingState::Walking, t.config);
        }

        self.settle_or_fall(t, 0, config.movement.floor_search_distance);
    }

    fn mine(&mut self, t: &mut Tick<'_>) {
        if self.action_due(t.config) {
            // A 45 degree wedge whose hypotenuse passes through the point
            // under the body centre, so the lemming stands on the cut.
            let size = self.width + self.height;
            let near_x = self.center_x() - self.direction.sign() * self.height;
            t.terrain
                .erase_diagonal(near_x, self.y + size / 2.0, size, size, self.direction);
            t.events.push(SimEventKind::Sound { cue: SoundCue::Dig });
            let step = t.config.abilities.mine_step;
            self.x += self.direction.sign() * step;
            self.y += step;
        }

        let probe_x = self.front_x() + self.direction.sign();
        let depth = (self.width + 4.0) as u32;
        if t
            .terrain
            .find_floor_below(probe_x, self.y + self.height, depth)
            .is_none()
        {
            self.start_falling(t.config);
        }
    }

    fn explode(&mut self, t: &mut Tick<'_>) {
        if self.action_due(t.config) {
            t.terrain
                .erase_circle(self.center_x(), self.center_y(), self.width);
            t.events.push(SimEventKind::Sound {
                cue: SoundCue::Explosion,
            });
            self.die(DeathCause::Explosion, t.events);
        }
    }

    fn splat(&mut self, t: &mut Tick<'_>) {
        if self.state_elapsed_ms > t.config.abilities.splat_duration_ms {
            self.die(DeathCause::Splat, t.events);
        }
    }

    fn exit(&mut self, t: &mut Tick<'_>) {
        if self.frame_clock >= u64::from(t.config.abilities.exit_final_frame) {
            self.active = false;
            self.saved = true;
            t.events.push(SimEventKind::LemmingSaved { lemming: self.id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExitSensor;
    use crate::types::PieceKind;

    const DT: f32 = 20.0;

    fn terrain(width: u32, height: u32) -> Terrain {
        Terrain::new(width, height, ExitSensor::default())
    }

    /// A walking lemming standing with its feet on row `floor_row`.
    fn walker(x: f32, floor_row: f32, config: &GameConfig) -> Lemming {
        let mut lem = Lemming::spawn(LemmingId(0), x, 0.0, config);
        lem.y = floor_row - lem.height;
        lem.set_state(LemmingState::Walking, config);
        lem
    }

    fn step(
        lem: &mut Lemming,
        terrain: &mut Terrain,
        config: &GameConfig,
        events: &mut Vec<SimEventKind>,
    ) {
        lem.update(DT, 1.0, terrain, config, events);
    }

    fn count_sounds(events: &[SimEventKind], cue: SoundCue) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SimEventKind::Sound { cue: c } if *c == cue))
            .count()
    }

    // -- Action latch --

    #[test]
    fn latch_fires_once_per_visit() {
        let mut latch = ActionLatch::default();
        let fired: Vec<bool> = (0..8).map(|c| latch.advance(c, 4, 3)).collect();
        assert_eq!(
            fired,
            vec![false, false, false, true, false, false, false, true]
        );
    }

    #[test]
    fn latch_does_not_refire_while_frame_is_held() {
        let mut latch = ActionLatch::default();
        assert!(latch.advance(3, 4, 3));
        assert!(!latch.advance(3, 4, 3));
        assert!(!latch.advance(3, 4, 3));
        assert!(latch.advance(7, 4, 3));
    }

    #[test]
    fn latch_catches_skipped_action_frame() {
        let mut latch = ActionLatch::default();
        assert!(!latch.advance(2, 4, 3));
        assert!(latch.advance(5, 4, 3), "frame 3 was passed over");
        assert!(!latch.advance(6, 4, 3));
    }

    #[test]
    fn latch_fires_on_first_call_if_visit_already_reached() {
        let mut latch = ActionLatch::default();
        assert!(latch.advance(3, 4, 3));
        let mut late = ActionLatch::default();
        assert!(!late.advance(1, 16, 12));
        assert!(late.advance(13, 16, 12));
        assert!(!late.advance(14, 16, 12));
    }

    // -- Falling and landing --

    #[test]
    fn short_fall_lands_walking() {
        let config = GameConfig::default();
        let mut t = terrain(200, 200);
        t.add_rect(0.0, 100.0, 200.0, 20.0, PieceKind::Dirt);
        let mut lem = Lemming::spawn(LemmingId(0), 50.0, 40.0, &config);
        let mut events = Vec::new();
        for _ in 0..200 {
            step(&mut lem, &mut t, &config, &mut events);
            if lem.state != LemmingState::Falling {
                break;
            }
        }
        assert_eq!(lem.state, LemmingState::Walking);
        assert_eq!(lem.y + lem.height, 100.0, "feet rest on the floor");
        assert_eq!(lem.fall_speed, 0.0);
    }

    #[test]
    fn long_fall_splats_and_never_walks() {
        let config = GameConfig::default();
        let mut t = terrain(200, 400);
        t.add_rect(0.0, 300.0, 200.0, 20.0, PieceKind::Dirt);
        let mut lem = Lemming::spawn(LemmingId(0), 50.0, 0.0, &config);
        let mut events = Vec::new();
        let mut saw_walking = false;
        for _ in 0..1000 {
            step(&mut lem, &mut t, &config, &mut events);
            saw_walking |= lem.state == LemmingState::Walking;
            if !lem.active {
                break;
            }
        }
        assert!(!saw_walking, "a fatal fall must not pass through walking");
        assert!(!lem.active);
        assert!(!lem.saved);
        assert_eq!(count_sounds(&events, SoundCue::Splat), 1);
        assert!(events.contains(&SimEventKind::LemmingDied {
            lemming: LemmingId(0),
            cause: DeathCause::Splat,
        }));
    }

    #[test]
    fn floater_survives_the_same_fall() {
        let config = GameConfig::default();
        let mut t = terrain(200, 400);
        t.add_rect(0.0, 300.0, 200.0, 20.0, PieceKind::Dirt);
        let mut lem = Lemming::spawn(LemmingId(0), 50.0, 0.0, &config);
        assert!(lem.grant_ability(Ability::Floater, &config));
        let mut events = Vec::new();
        let mut saw_floating = false;
        for _ in 0..1000 {
            step(&mut lem, &mut t, &config, &mut events);
            saw_floating |= lem.state == LemmingState::Floating;
            if lem.state == LemmingState::Walking {
                break;
            }
            assert_ne!(lem.state, LemmingState::Splatting);
        }
        assert!(saw_floating);
        assert_eq!(lem.state, LemmingState::Walking);
        assert!(lem.active);
        assert_eq!(count_sounds(&events, SoundCue::Splat), 0);
    }

    #[test]
    fn falling_lands_on_thin_bridge_at_full_speed() {
        let config = GameConfig::default();
        let mut t = terrain(200, 400);
        t.add_rect(40.0, 90.0, 40.0, 1.0, PieceKind::Bridge);
        let mut lem = Lemming::spawn(LemmingId(0), 50.0, 0.0, &config);
        lem.fall_speed = config.movement.max_fall_speed;
        let mut events = Vec::new();
        for _ in 0..200 {
            step(&mut lem, &mut t, &config, &mut events);
            if lem.state != LemmingState::Falling {
                break;
            }
        }
        assert_eq!(lem.state, LemmingState::Walking);
        assert_eq!(lem.y + lem.height, 90.0);
    }

    // -- Walking --

    #[test]
    fn walker_turns_at_wall() {
        let config = GameConfig::default();
        let mut t = terrain(200, 200);
        t.add_rect(0.0, 100.0, 200.0, 20.0, PieceKind::Dirt);
        t.add_rect(100.0, 40.0, 10.0, 60.0, PieceKind::Rock);
        let mut lem = walker(70.0, 100.0, &config);
        let mut events = Vec::new();
        for _ in 0..60 {
            step(&mut lem, &mut t, &config, &mut events);
        }
        assert_eq!(lem.direction, Direction::Left);
        assert!(lem.x + lem.width <= 101.0);
        assert_eq!(lem.state, LemmingState::Walking);
    }

    #[test]
    fn walker_climbs_small_step() {
        let config = GameConfig::default();
        let mut t = terrain(200, 200);
        t.add_rect(0.0, 100.0, 200.0, 20.0, PieceKind::Dirt);
        t.add_rect(100.0, 96.0, 100.0, 4.0, PieceKind::Dirt);
        let mut lem = walker(70.0, 100.0, &config);
        let mut events = Vec::new();
        for _ in 0..80 {
            step(&mut lem, &mut t, &config, &mut events);
        }
        assert_eq!(lem.direction, Direction::Right);
        assert_eq!(lem.y + lem.height, 96.0, "walker should be on the step");
    }

    #[test]
    fn walker_falls_off_ledge() {
        let config = GameConfig::default();
        let mut t = terrain(200, 200);
        t.add_rect(0.0, 100.0, 60.0, 20.0, PieceKind::Dirt);
        let mut lem = walker(40.0, 100.0, &config);
        let mut events = Vec::new();
        for _ in 0..60 {
            step(&mut lem, &mut t, &config, &mut events);
            if lem.state == LemmingState::Falling {
                break;
            }
        }
        assert_eq!(lem.state, LemmingState::Falling);
        assert_eq!(lem.fall_start_y, lem.y);
    }

    #[test]
    fn climber_reaches_top_of_wall() {
        let config = GameConfig::default();
        let mut t = terrain(300, 300);
        t.add_rect(0.0, 200.0, 300.0, 20.0, PieceKind::Dirt);
        t.add_rect(100.0, 160.0, 40.0, 40.0, PieceKind::Rock);
        let mut lem = walker(70.0, 200.0, &config);
        assert!(lem.grant_ability(Ability::Climber, &config));
        let mut events = Vec::new();
        let mut saw_climbing = false;
        for _ in 0..300 {
            step(&mut lem, &mut t, &config, &mut events);
            saw_climbing |= lem.state == LemmingState::Climbing;
            if saw_climbing && lem.state == LemmingState::Walking {
                break;
            }
        }
        assert!(saw_climbing);
        assert_eq!(lem.state, LemmingState::Walking);
        assert_eq!(lem.y + lem.height, 160.0, "climber stands on the wall top");
        assert_eq!(lem.direction, Direction::Right);
    }

    #[test]
    fn climber_hitting_ceiling_turns_and_falls() {
        let config = GameConfig::default();
        let mut t = terrain(300, 300);
        t.add_rect(0.0, 200.0, 300.0, 20.0, PieceKind::Dirt);
        t.add_rect(100.0, 100.0, 40.0, 100.0, PieceKind::Rock);
        // Overhang above the climber's head.
        t.add_rect(60.0, 150.0, 40.0, 4.0, PieceKind::Rock);
        let mut lem = walker(80.0, 200.0, &config);
        lem.can_climb = true;
        let mut events = Vec::new();
        let mut saw_climbing = false;
        for _ in 0..300 {
            step(&mut lem, &mut t, &config, &mut events);
            saw_climbing |= lem.state == LemmingState::Climbing;
            if saw_climbing && lem.state == LemmingState::Falling {
                break;
            }
        }
        assert_eq!(lem.state, LemmingState::Falling);
        assert_eq!(lem.direction, Direction::Left);
    }

    // -- Abilities --

    #[test]
    fn grant_rules() {
        let config = GameConfig::default();
        let mut lem = Lemming::spawn(LemmingId(1), 0.0, 0.0, &config);
        // Falling: one-shot abilities are rejected.
        assert!(!lem.grant_ability(Ability::Digger, &config));
        assert_eq!(lem.state, LemmingState::Falling);
        // Persistent flags are granted once.
        assert!(lem.grant_ability(Ability::Climber, &config));
        assert!(!lem.grant_ability(Ability::Climber, &config));
        assert!(lem.grant_ability(Ability::Bomber, &config));
        assert_eq!(lem.bomber_countdown, config.abilities.bomber_countdown_secs);
        assert!(!lem.grant_ability(Ability::Bomber, &config));
        assert_eq!(lem.state, LemmingState::Falling, "flags do not change state");

        lem.set_state(LemmingState::Walking, &config);
        assert!(lem.grant_ability(Ability::Builder, &config));
        assert_eq!(lem.state, LemmingState::Building);
        assert_eq!(lem.builder_steps, config.abilities.builder_steps);
        assert!(!lem.grant_ability(Ability::Basher, &config));

        lem.active = false;
        assert!(!lem.grant_ability(Ability::Floater, &config));
        assert!(!lem.can_float);
    }

    #[test]
    fn every_one_shot_ability_enters_its_state() {
        let config = GameConfig::default();
        for ability in Ability::ALL {
            let Some(expected) = ability.entry_state() else {
                continue;
            };
            let mut lem = walker(0.0, 100.0, &config);
            assert!(lem.grant_ability(ability, &config), "{ability:?} rejected");
            assert_eq!(lem.state, expected);
        }
    }

    #[test]
    fn builder_lays_exactly_its_step_budget() {
        for dt in [DT, 5.0, 70.0] {
            let config = GameConfig::default();
            let mut t = terrain(400, 300);
            t.add_rect(0.0, 200.0, 400.0, 20.0, PieceKind::Dirt);
            let mut lem = walker(50.0, 200.0, &config);
            assert!(lem.grant_ability(Ability::Builder, &config));
            let mut events = Vec::new();
            for _ in 0..10_000 {
                lem.update(dt, 1.0, &mut t, &config, &mut events);
                if lem.state != LemmingState::Building {
                    break;
                }
            }
            let bridges = t
                .pieces()
                .iter()
                .filter(|p| p.kind == PieceKind::Bridge)
                .count();
            assert_eq!(lem.state, LemmingState::Walking, "dt {dt}");
            assert_eq!(bridges, 12, "dt {dt}");
            assert_eq!(count_sounds(&events, SoundCue::Build), 12, "dt {dt}");
            assert_eq!(lem.y + lem.height, 200.0 - 24.0, "dt {dt}");
        }
    }

    #[test]
    fn builder_geometry_ignores_playback_speed() {
        for speed in [1.0, 3.0] {
            let config = GameConfig::default();
            let mut t = terrain(400, 300);
            t.add_rect(0.0, 200.0, 400.0, 20.0, PieceKind::Dirt);
            let mut lem = walker(50.0, 200.0, &config);
            assert!(lem.grant_ability(Ability::Builder, &config));
            for _ in 0..10_000 {
                lem.update(DT * speed, speed, &mut t, &config, &mut Vec::new());
                if lem.state != LemmingState::Building {
                    break;
                }
            }
            assert_eq!(lem.state, LemmingState::Walking, "speed {speed}");
            assert_eq!(lem.y + lem.height, 176.0, "speed {speed}");
            assert_eq!(lem.x, 50.0 + 12.0 * 3.0, "speed {speed}");
        }
    }

    #[test]
    fn builder_turns_back_at_wall() {
        let config = GameConfig::default();
        let mut t = terrain(400, 300);
        t.add_rect(0.0, 200.0, 400.0, 20.0, PieceKind::Dirt);
        t.add_rect(80.0, 100.0, 20.0, 100.0, PieceKind::Rock);
        let mut lem = walker(50.0, 200.0, &config);
        assert!(lem.grant_ability(Ability::Builder, &config));
        let mut events = Vec::new();
        for _ in 0..1000 {
            step(&mut lem, &mut t, &config, &mut events);
            if lem.state != LemmingState::Building {
                break;
            }
        }
        assert_eq!(lem.state, LemmingState::Walking);
        assert_eq!(lem.direction, Direction::Left);
        assert!(count_sounds(&events, SoundCue::Build) < 12);
    }

    #[test]
    fn bomber_explodes_exactly_once() {
        let config = GameConfig::default();
        let mut t = terrain(200, 200);
        t.add_rect(0.0, 100.0, 200.0, 50.0, PieceKind::Dirt);
        let mut lem = walker(50.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Bomber, &config));
        assert!(lem.grant_ability(Ability::Blocker, &config));
        let mut events = Vec::new();
        let mut previous = lem.bomber_countdown;
        for _ in 0..2000 {
            step(&mut lem, &mut t, &config, &mut events);
            if lem.state == LemmingState::Exploding {
                break;
            }
            previous = lem.bomber_countdown;
        }
        assert_eq!(lem.state, LemmingState::Exploding);
        assert!(previous > 0.0);
        assert!(lem.bomber_countdown <= 0.0);

        let (cx, cy) = (lem.center_x(), lem.center_y());
        for _ in 0..500 {
            step(&mut lem, &mut t, &config, &mut events);
        }
        assert!(!lem.active);
        assert_eq!(count_sounds(&events, SoundCue::Explosion), 1);
        let deaths = events
            .iter()
            .filter(|e| matches!(e, SimEventKind::LemmingDied { .. }))
            .count();
        assert_eq!(deaths, 1);
        assert!(!t.point_is_solid(cx, cy + 12.0), "blast crater under the lemming");
    }

    #[test]
    fn bomber_fuse_overrides_any_state() {
        let config = GameConfig::default();
        let mut t = terrain(200, 1000);
        let mut lem = Lemming::spawn(LemmingId(0), 50.0, 0.0, &config);
        assert!(lem.arm_fuse(0.05));
        for _ in 0..5 {
            lem.update(DT, 1.0, &mut t, &config, &mut Vec::new());
        }
        assert_eq!(lem.state, LemmingState::Exploding);
    }

    #[test]
    fn exploding_countdown_leaves_terrain_intact() {
        let config = GameConfig::default();
        let mut t = terrain(200, 200);
        t.add_rect(0.0, 100.0, 200.0, 20.0, PieceKind::Dirt);
        let mut lem = walker(50.0, 100.0, &config);
        lem.set_state(LemmingState::Exploding, &config);
        let mut events = Vec::new();

        let countdown = u64::from(config.abilities.explosion_countdown_frames);
        while lem.frame_clock < countdown {
            assert!(lem.view(&config).oh_no);
            step(&mut lem, &mut t, &config, &mut events);
            assert!(lem.active);
            assert!(
                t.cell_is_solid(58, 100),
                "floor erased during countdown frame {}",
                lem.frame_clock
            );
        }
        assert!(!lem.view(&config).oh_no);
        assert_eq!(count_sounds(&events, SoundCue::Explosion), 0);

        for _ in 0..200 {
            step(&mut lem, &mut t, &config, &mut events);
        }
        assert!(!lem.active);
        assert!(!t.cell_is_solid(58, 100), "blast crater after the countdown");
    }

    #[test]
    fn digger_digs_through_layer_and_lands() {
        let config = GameConfig::default();
        let mut t = terrain(200, 300);
        t.add_rect(0.0, 100.0, 200.0, 30.0, PieceKind::Dirt);
        t.add_rect(0.0, 180.0, 200.0, 20.0, PieceKind::Dirt);
        let mut lem = walker(50.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Digger, &config));
        let mut events = Vec::new();
        let mut saw_falling = false;
        for _ in 0..5000 {
            step(&mut lem, &mut t, &config, &mut events);
            saw_falling |= lem.state == LemmingState::Falling;
            if saw_falling && lem.state == LemmingState::Walking {
                break;
            }
        }
        assert!(saw_falling, "digger should break through the layer");
        assert_eq!(lem.state, LemmingState::Walking);
        assert_eq!(lem.y + lem.height, 180.0);
        assert!(count_sounds(&events, SoundCue::Dig) >= 10);
        assert!(!t.cell_is_solid(58, 110), "shaft through the layer");
    }

    #[test]
    fn basher_tunnels_through_wall() {
        let config = GameConfig::default();
        let mut t = terrain(300, 200);
        t.add_rect(0.0, 100.0, 300.0, 20.0, PieceKind::Dirt);
        t.add_rect(60.0, 70.0, 10.0, 30.0, PieceKind::Rock);
        let mut lem = walker(30.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Basher, &config));
        let mut events = Vec::new();
        for _ in 0..2000 {
            step(&mut lem, &mut t, &config, &mut events);
            if lem.state != LemmingState::Bashing {
                break;
            }
        }
        assert_eq!(lem.state, LemmingState::Walking);
        assert!(count_sounds(&events, SoundCue::Dig) > 0);
        for x in 60..70 {
            assert!(!t.cell_is_solid(x, 90), "tunnel cell ({x}, 90) left solid");
        }
        for _ in 0..200 {
            step(&mut lem, &mut t, &config, &mut events);
        }
        assert!(lem.x > 70.0, "walker should pass through the tunnel");
        assert_eq!(lem.direction, Direction::Right);
    }

    #[test]
    fn basher_without_terrain_ahead_walks_on() {
        let config = GameConfig::default();
        let mut t = terrain(300, 200);
        t.add_rect(0.0, 100.0, 300.0, 20.0, PieceKind::Dirt);
        let mut lem = walker(30.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Basher, &config));
        step(&mut lem, &mut t, &config, &mut Vec::new());
        assert_eq!(lem.state, LemmingState::Walking);
    }

    #[test]
    fn basher_falls_off_ledge() {
        let config = GameConfig::default();
        let mut t = terrain(300, 200);
        t.add_rect(0.0, 100.0, 50.0, 20.0, PieceKind::Dirt);
        t.add_rect(56.0, 70.0, 60.0, 25.0, PieceKind::Rock);
        let mut lem = walker(30.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Basher, &config));
        let mut states = vec![lem.state];
        for _ in 0..2000 {
            step(&mut lem, &mut t, &config, &mut Vec::new());
            if states.last() != Some(&lem.state) {
                states.push(lem.state);
            }
            if lem.state != LemmingState::Bashing {
                break;
            }
        }
        assert_eq!(states, vec![LemmingState::Bashing, LemmingState::Falling]);
        assert!(lem.x < 56.0, "fell before reaching the rock at x {}", lem.x);
    }

    #[test]
    fn miner_cuts_down_and_forward() {
        let config = GameConfig::default();
        let mut t = terrain(300, 300);
        t.add_rect(0.0, 100.0, 300.0, 100.0, PieceKind::Dirt);
        let mut lem = walker(40.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Miner, &config));
        let mut events = Vec::new();
        for _ in 0..300 {
            step(&mut lem, &mut t, &config, &mut events);
        }
        assert_eq!(lem.state, LemmingState::Mining);
        let strokes = count_sounds(&events, SoundCue::Dig);
        assert!(strokes >= 9, "only {strokes} strokes in 6 s");
        assert!(lem.x >= 58.0);
        assert!(lem.y >= 98.0);
        assert!(!t.cell_is_solid(50, 100), "cut below the starting position");
    }

    #[test]
    fn miner_falls_out_of_thin_layer() {
        let config = GameConfig::default();
        let mut t = terrain(300, 300);
        t.add_rect(0.0, 100.0, 300.0, 10.0, PieceKind::Dirt);
        let mut lem = walker(40.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Miner, &config));
        let mut events = Vec::new();
        for _ in 0..2000 {
            step(&mut lem, &mut t, &config, &mut events);
            if lem.state != LemmingState::Mining {
                break;
            }
        }
        assert_eq!(lem.state, LemmingState::Falling);
    }

    // -- Exit and removal --

    #[test]
    fn walker_into_exit_is_saved() {
        let config = GameConfig::default();
        let mut t = terrain(300, 200);
        t.add_rect(0.0, 100.0, 300.0, 20.0, PieceKind::Dirt);
        t.set_exit(80.0, 76.0);
        let mut lem = walker(40.0, 100.0, &config);
        let mut events = Vec::new();
        for _ in 0..300 {
            step(&mut lem, &mut t, &config, &mut events);
            if !lem.active {
                break;
            }
        }
        assert!(!lem.active);
        assert!(lem.saved);
        assert_eq!(count_sounds(&events, SoundCue::Exit), 1);
        assert!(events.contains(&SimEventKind::LemmingSaved {
            lemming: LemmingId(0)
        }));
    }

    #[test]
    fn walking_off_the_field_is_a_death() {
        let config = GameConfig::default();
        let mut t = terrain(200, 100);
        t.add_rect(0.0, 80.0, 200.0, 20.0, PieceKind::Dirt);
        let mut lem = walker(170.0, 80.0, &config);
        let mut events = Vec::new();
        for _ in 0..1000 {
            step(&mut lem, &mut t, &config, &mut events);
            if !lem.active {
                break;
            }
        }
        assert!(!lem.active);
        assert!(!lem.saved);
        assert!(events.contains(&SimEventKind::LemmingDied {
            lemming: LemmingId(0),
            cause: DeathCause::OutOfBounds,
        }));
    }

    #[test]
    fn blocker_stays_put() {
        let config = GameConfig::default();
        let mut t = terrain(200, 200);
        t.add_rect(0.0, 100.0, 200.0, 20.0, PieceKind::Dirt);
        let mut lem = walker(50.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Blocker, &config));
        for _ in 0..100 {
            step(&mut lem, &mut t, &config, &mut Vec::new());
        }
        assert_eq!((lem.x, lem.y), (50.0, 80.0));
        assert_eq!(lem.state, LemmingState::Blocking);
    }

    #[test]
    fn anim_frame_wraps_frame_count() {
        let config = GameConfig::default();
        let mut t = terrain(200, 200);
        t.add_rect(0.0, 100.0, 200.0, 20.0, PieceKind::Dirt);
        let mut lem = walker(50.0, 100.0, &config);
        assert!(lem.grant_ability(Ability::Blocker, &config));
        for _ in 0..15 {
            step(&mut lem, &mut t, &config, &mut Vec::new());
        }
        // 300 ms at 100 ms per frame over 2 frames.
        assert_eq!(lem.anim_frame(&config), 1);
        assert_eq!(lem.view(&config).anim_frame, 1);
    }
}
