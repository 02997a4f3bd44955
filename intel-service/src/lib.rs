// =====================================================================================
// File: intel-service/src/lib.rs
// Description: Wiring and command surface for the AETIM daemon
// =====================================================================================

//! Library half of the intel service: pipeline wiring (`bootstrap`) and the
//! gated operator command surface (`commands`). The binary entry point only
//! loads configuration, builds the state and runs the workers.

pub mod bootstrap;
pub mod commands;

pub use bootstrap::{build, AppState};
