// lemmings_sim: pure Rust simulation library.
//
// This crate contains all simulation logic for the lemmings game: the
// destructible terrain, the per-lemming state machine, the level driver,
// the PRNG, and the action interface. It has no rendering, audio or input
// dependencies and can be tested, benchmarked, and run headless.
//
// Module overview:
// - `sim.rs`:     Top-level SimState, tick loop, action/event processing.
// - `terrain.rs`: Dense 2D solid/empty pixel grid plus the visual piece list.
// - `lemming.rs`: Per-lemming behavior state machine and terrain actions.
// - `level.rs`:   LevelDef / LevelParams: JSON level files and terrain replay.
// - `command.rs`: SimAction / ScriptedAction: all player input.
// - `event.rs`:   SimEvent, sound cues, level outcome.
// - `config.rs`:  GameConfig: all tunable parameters and the animation table.
// - `error.rs`:   Level and config loading errors.
// - `prng.rs`:    xoshiro256++ PRNG with SplitMix64 seeding.
// - `types.rs`:   Pixel geometry, LemmingId, Direction, LemmingState, Ability.
//
// The companion crate `lemmings_headless` drives this library from the
// command line. Renderers and audio backends sit outside this crate: they
// read `LemmingView` snapshots and `SimEvent`s and feed `SimAction`s back.
//
// **Determinism.** The simulation is a pure function:
// `(state, actions, dt) -> (new_state, events)`. All randomness comes from a
// seeded PRNG. No `HashMap`, no system time, no OS entropy. Use `BTreeMap`
// for ordered collections.

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod lemming;
pub mod level;
pub mod prng;
pub mod sim;
pub mod terrain;
pub mod types;
