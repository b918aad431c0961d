//! Orchestration: decide what to show and when to refresh.

pub mod controller;

pub use controller::{SyncController, SyncPhase, ViewState};
