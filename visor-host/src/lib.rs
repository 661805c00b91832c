//! Visor host service — configuration and backend wiring around
//! [`visor_core`]'s `HostOrchestrator`.

pub mod access;
pub mod config;
pub mod providers;
