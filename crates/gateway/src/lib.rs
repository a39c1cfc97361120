//! Process wiring for the agent runtime: the platform pump, its
//! transports, the HTTP observation surface, and the CLI.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod pump;
pub mod state;
pub mod transport;
