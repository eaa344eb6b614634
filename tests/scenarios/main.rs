//! Scenario-based tests for shipline

mod helpers;

mod failure_handling;
mod gating;
mod release_flow;
mod secrets;
