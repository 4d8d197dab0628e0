//! Rehearse: mock-interview orchestration.
//!
//! The HTTP service lives in `routes` and the handler modules; the capture,
//! playback and realtime pipelines plus the conversation drivers are public
//! so an embedding client can run them against real devices.

pub mod archive;
pub mod config;
pub mod documents;
pub mod driver;
pub mod errors;
pub mod interview;
pub mod llm_client;
pub mod models;
pub mod realtime;
pub mod roles;
pub mod routes;
pub mod speech;
pub mod state;
pub mod store;
