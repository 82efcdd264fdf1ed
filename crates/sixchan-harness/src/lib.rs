//! Deterministic simulation harness for sixchan.
//!
//! Turmoil-based server and client wrappers that run the production
//! connection code over simulated TCP with a virtual clock, so multi-client
//! scenarios are reproducible.

#![forbid(unsafe_code)]

pub mod sim_client;
pub mod sim_env;
pub mod sim_server;

pub use sim_client::{ScriptedPicker, SimClient, Transcript};
pub use sim_env::SimEnv;
pub use sim_server::SimServer;
