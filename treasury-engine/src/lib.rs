//! Epoch Treasury Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes a treasury snapshot and `now` → returns the next state and the
//! external actions to execute.

#![warn(clippy::all)]

pub mod actions;
pub mod engine;
pub mod fees;

pub use actions::{Decision, EngineAction, SwapOrder, SwapSettlement};
pub use engine::{EpochStatus, TreasuryEngine};
pub use fees::FeeAssessment;
