// Level driver and tick loop.
//
// `SimState` is the single source of truth for a running level. It owns the
// terrain, the lemming roster, the ability pool, the release schedule, the
// level clock, playback controls and the PRNG. The sim is a function
// `(state, actions, dt) -> (new_state, events)`: nothing outside `step()`
// mutates it.
//
// ## Tick
//
// `step()` first applies the player actions in order, then (unless paused or
// finished) advances one tick:
//
//   1. Scale the wall-clock delta: cap it at `max_tick_ms`, multiply by the
//      playback speed.
//   2. Run down the level clock. On expiry the level ends immediately; the
//      rest of the tick is skipped.
//   3. Accumulate the release timer and release at most one lemming at the
//      entry point when it crosses the release interval.
//   4. Update every lemming in roster order. Each update runs to completion,
//      terrain mutations included, before the next lemming starts.
//   5. Blocker pass: every active non-blocker that overlaps a blocker turns
//      around, once, on the first blocker it overlaps. The pass only reads
//      positions and states; it never touches the terrain.
//   6. If nothing is active and nothing is left to release, end the level.
//
// Ending the level is idempotent (`end_level` is a no-op after the first
// call). The win condition is the same for both end paths: saved count at
// least the required count.
//
// ## Determinism
//
// Lemming rules are deterministic given the sequence of `(actions, dt)`
// inputs. The only random draw, the nuke's staggered fuses, comes from the
// seeded `SimRng` in roster order.
//
// See also: `lemming.rs` for the per-lemming state machine, `terrain.rs`
// for the playfield, `command.rs` for `SimAction`, `event.rs` for the
// output events, `level.rs` for `LevelDef`/`LevelParams`.

use crate::command::SimAction;
use crate::config::GameConfig;
use crate::event::{LevelOutcome, SimEvent, SimEventKind, SoundCue};
use crate::lemming::{Lemming, LemmingView};
use crate::level::{LevelDef, LevelParams};
use crate::prng::SimRng;
use crate::terrain::Terrain;
use crate::types::{Ability, LemmingId, LemmingState, Rect};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Counters for the level HUD and the end-of-level summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub total: u32,
    pub released: u32,
    pub remaining_to_release: u32,
    pub saved: u32,
    /// Died by splat, explosion or leaving the field.
    pub lost: u32,
    pub required: u32,
    pub time_remaining_secs: f32,
}

/// Pause flag and speed multiplier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Playback {
    pub paused: bool,
    pub speed: f32,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            paused: false,
            speed: 1.0,
        }
    }
}

/// The result of one `step()`.
pub struct StepResult {
    /// Events emitted during this step, in order.
    pub events: Vec<SimEvent>,
}

/// A running level.
#[derive(Clone, Debug)]
pub struct SimState {
    /// Ticks advanced so far. Paused steps do not advance it.
    pub tick: u64,
    pub rng: SimRng,
    pub config: GameConfig,
    pub params: LevelParams,
    pub terrain: Terrain,
    /// Every lemming released so far, indexed by `LemmingId`.
    pub lemmings: Vec<Lemming>,
    /// Remaining charges per ability.
    pub pool: BTreeMap<Ability, u32>,
    pub stats: LevelStats,
    pub playback: Playback,
    /// Ability armed for the next click.
    pub selected: Option<Ability>,
    release_timer_secs: f32,
    outcome: Option<LevelOutcome>,
}

impl SimState {
    /// Start a level. `build` receives a cleared terrain and issues the
    /// construction calls for it.
    pub fn new(
        seed: u64,
        config: GameConfig,
        params: LevelParams,
        build: impl FnOnce(&mut Terrain),
    ) -> Self {
        let mut terrain = Terrain::new(config.field_width, config.field_height, config.exit_sensor);
        build(&mut terrain);

        let stats = LevelStats {
            total: params.lemming_count,
            released: 0,
            remaining_to_release: params.lemming_count,
            saved: 0,
            lost: 0,
            required: params.required_saves,
            time_remaining_secs: params.time_limit_secs,
        };
        info!(
            seed,
            lemmings = params.lemming_count,
            required = params.required_saves,
            time_limit = params.time_limit_secs,
            "level started"
        );

        Self {
            tick: 0,
            rng: SimRng::new(seed),
            lemmings: Vec::with_capacity(params.lemming_count as usize),
            pool: params.abilities.clone(),
            params,
            config,
            terrain,
            stats,
            playback: Playback::default(),
            selected: None,
            release_timer_secs: 0.0,
            outcome: None,
        }
    }

    /// Start a level from its definition.
    pub fn from_level(seed: u64, config: GameConfig, level: &LevelDef) -> Self {
        info!(id = level.id, name = %level.name, "loading level");
        Self::new(seed, config, level.params.clone(), |terrain| {
            level.build(terrain)
        })
    }

    pub fn outcome(&self) -> Option<LevelOutcome> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn pool_count(&self, ability: Ability) -> u32 {
        self.pool.get(&ability).copied().unwrap_or(0)
    }

    pub fn active_count(&self) -> usize {
        self.lemmings.iter().filter(|l| l.active).count()
    }

    /// Render snapshot of every active lemming, in roster order.
    pub fn lemming_views(&self) -> Vec<LemmingView> {
        self.lemmings
            .iter()
            .filter(|l| l.active)
            .map(|l| l.view(&self.config))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Step
    // -----------------------------------------------------------------------

    /// Apply `actions`, then advance one tick of `dt_ms` wall-clock
    /// milliseconds. A finished level ignores both.
    pub fn step(&mut self, actions: &[SimAction], dt_ms: f32) -> StepResult {
        let mut events = Vec::new();
        if self.outcome.is_some() {
            return StepResult { events };
        }

        for action in actions {
            self.apply_action(action, &mut events);
        }

        if !self.playback.paused {
            self.tick += 1;
            self.advance(dt_ms, &mut events);
        }
        StepResult { events }
    }

    fn push(&self, events: &mut Vec<SimEvent>, kind: SimEventKind) {
        events.push(SimEvent {
            tick: self.tick,
            kind,
        });
    }

    fn advance(&mut self, dt_ms: f32, events: &mut Vec<SimEvent>) {
        let speed = self.playback.speed;
        let dt_ms = if dt_ms.is_finite() { dt_ms } else { 0.0 };
        let dt = dt_ms.clamp(0.0, self.config.max_tick_ms) * speed;
        let dt_secs = dt / 1000.0;

        self.stats.time_remaining_secs -= dt_secs;
        if self.stats.time_remaining_secs <= 0.0 {
            self.stats.time_remaining_secs = 0.0;
            self.end_level(true, events);
            return;
        }

        self.update_release(dt_secs, events);

        let mut emitted = Vec::new();
        for lemming in &mut self.lemmings {
            if !lemming.active {
                continue;
            }
            lemming.update(dt, speed, &mut self.terrain, &self.config, &mut emitted);
            if !lemming.active {
                if lemming.saved {
                    self.stats.saved += 1;
                } else {
                    self.stats.lost += 1;
                }
                debug!(lemming = %lemming.id, saved = lemming.saved, "lemming removed");
            }
        }
        for kind in emitted {
            self.push(events, kind);
        }

        self.resolve_blockers();

        if self.stats.remaining_to_release == 0 && self.active_count() == 0 {
            self.end_level(false, events);
        }
    }

    fn update_release(&mut self, dt_secs: f32, events: &mut Vec<SimEvent>) {
        let rate = self.params.release_rate;
        if self.stats.remaining_to_release == 0 || !rate.is_finite() || rate <= 0.0 {
            return;
        }
        self.release_timer_secs += dt_secs;
        let interval = 1.0 / rate;
        if self.release_timer_secs >= interval {
            self.release_timer_secs -= interval;
            self.release_lemming(events);
        }
    }

    fn release_lemming(&mut self, events: &mut Vec<SimEvent>) {
        let Some(entry) = self.terrain.entry() else {
            return;
        };
        let id = LemmingId(self.lemmings.len() as u32);
        let (dx, dy) = self.config.spawn_offset;
        let lemming = Lemming::spawn(
            id,
            entry.x as f32 + dx,
            entry.y as f32 + dy,
            &self.config,
        );
        self.lemmings.push(lemming);
        self.stats.released += 1;
        self.stats.remaining_to_release -= 1;
        debug!(lemming = %id, remaining = self.stats.remaining_to_release, "lemming released");
        self.push(events, SimEventKind::LemmingReleased { lemming: id });
    }

    /// Turn every active non-blocker around on the first blocker it
    /// overlaps.
    fn resolve_blockers(&mut self) {
        let blockers: SmallVec<[Rect; 8]> = self
            .lemmings
            .iter()
            .filter(|l| l.active && l.state == LemmingState::Blocking)
            .map(Lemming::bounds)
            .collect();
        if blockers.is_empty() {
            return;
        }
        for lemming in &mut self.lemmings {
            if !lemming.active || lemming.state == LemmingState::Blocking {
                continue;
            }
            let bounds = lemming.bounds();
            if blockers.iter().any(|b| bounds.overlaps(b)) {
                lemming.direction = lemming.direction.reversed();
            }
        }
    }

    /// End the level once. `timed_out` records which path ended it.
    fn end_level(&mut self, timed_out: bool, events: &mut Vec<SimEvent>) {
        if self.outcome.is_some() {
            return;
        }
        let won = self.stats.saved >= self.stats.required;
        let outcome = LevelOutcome {
            won,
            saved: self.stats.saved,
            required: self.stats.required,
            timed_out,
        };
        self.outcome = Some(outcome);
        info!(
            won,
            saved = outcome.saved,
            required = outcome.required,
            timed_out,
            tick = self.tick,
            "level ended"
        );
        let cue = if won { SoundCue::Success } else { SoundCue::Fail };
        self.push(events, SimEventKind::Sound { cue });
        self.push(events, SimEventKind::LevelEnded { outcome });
    }

    // -----------------------------------------------------------------------
    // Player actions
    // -----------------------------------------------------------------------

    fn apply_action(&mut self, action: &SimAction, events: &mut Vec<SimEvent>) {
        match *action {
            SimAction::SelectAbility { ability } => self.select_ability(ability, events),
            SimAction::ClickAt { x, y } => {
                if self.playback.paused {
                    return;
                }
                let Some(ability) = self.selected else {
                    return;
                };
                let target = self
                    .lemmings
                    .iter()
                    .position(|l| l.active && l.bounds().contains(x, y));
                if let Some(index) = target {
                    self.assign(index, ability, events);
                }
            }
            SimAction::AssignAbility { lemming, ability } => {
                let index = lemming.0 as usize;
                if !self.playback.paused && index < self.lemmings.len() {
                    self.assign(index, ability, events);
                }
            }
            SimAction::Nuke => self.nuke(events),
            SimAction::SetPaused { paused } => self.set_paused(paused, events),
            SimAction::TogglePause => self.set_paused(!self.playback.paused, events),
            SimAction::SetSpeed { speed } => self.set_speed(speed, events),
            SimAction::SpeedUp => {
                self.set_speed(self.playback.speed + self.config.speed_increment, events)
            }
            SimAction::SlowDown => {
                self.set_speed(self.playback.speed - self.config.speed_increment, events)
            }
        }
    }

    /// Selecting the selected ability clears the selection. An ability with
    /// no charges cannot be selected.
    fn select_ability(&mut self, ability: Ability, events: &mut Vec<SimEvent>) {
        if self.selected == Some(ability) {
            self.selected = None;
        } else if self.pool_count(ability) > 0 {
            self.selected = Some(ability);
            self.push(events, SimEventKind::Sound { cue: SoundCue::Pop });
        } else {
            return;
        }
        self.push(
            events,
            SimEventKind::AbilitySelected {
                ability: self.selected,
            },
        );
    }

    /// Spend one charge of `ability` on the lemming at `index`, if there is a
    /// charge and the lemming accepts it.
    fn assign(&mut self, index: usize, ability: Ability, events: &mut Vec<SimEvent>) {
        let Some(charges) = self.pool.get_mut(&ability).filter(|c| **c > 0) else {
            return;
        };
        let lemming = &mut self.lemmings[index];
        if !lemming.grant_ability(ability, &self.config) {
            return;
        }
        *charges -= 1;
        let remaining = *charges;
        let id = lemming.id;
        debug!(lemming = %id, ?ability, remaining, "ability assigned");
        self.push(
            events,
            SimEventKind::AbilityAssigned {
                lemming: id,
                ability,
            },
        );
        self.push(events, SimEventKind::Sound { cue: SoundCue::Pop });

        if remaining == 0 && self.selected == Some(ability) {
            self.selected = None;
            self.push(events, SimEventKind::AbilitySelected { ability: None });
        }
    }

    fn nuke(&mut self, events: &mut Vec<SimEvent>) {
        let max = self.config.nuke_max_countdown_secs;
        let mut count = 0;
        for lemming in &mut self.lemmings {
            if !lemming.active || lemming.state.is_terminal() {
                continue;
            }
            let fuse = self.rng.range_f32(0.0, max);
            if lemming.arm_fuse(fuse) {
                count += 1;
            }
        }
        debug!(count, "nuked");
        self.push(events, SimEventKind::Nuked { count });
    }

    fn set_paused(&mut self, paused: bool, events: &mut Vec<SimEvent>) {
        if self.playback.paused == paused {
            return;
        }
        self.playback.paused = paused;
        self.push(events, SimEventKind::PauseChanged { paused });
    }

    fn set_speed(&mut self, speed: f32, events: &mut Vec<SimEvent>) {
        if !speed.is_finite() {
            return;
        }
        let speed = self.config.clamp_speed(speed);
        if speed == self.playback.speed {
            return;
        }
        self.playback.speed = speed;
        self.push(events, SimEventKind::SpeedChanged { speed });
    }
}
