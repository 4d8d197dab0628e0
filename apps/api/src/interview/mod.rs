//! Discrete-turn interview orchestration: turn budget, instruction payloads,
//! the turn engine, evaluation and the live-interview HTTP surface.

pub mod budget;
pub mod engine;
pub mod evaluator;
pub mod handlers;
pub mod prompts;
pub mod registry;
pub mod transcript_md;
