//! Continuous voice modality: peer-connection channel, its event protocol
//! and the HTTP endpoints a browser client needs to run it.

pub mod channel;
pub mod events;
pub mod handlers;
