//! Core domain models for Pipeline
//!
//! This module defines the fundamental data structures that represent
//! pipelines, stages, steps, runs and the conditions that gate them.

pub mod condition;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod run;
pub mod secret;
pub mod stage;
pub mod state;
pub mod template;
pub mod trigger;

pub use context::*;
pub use pipeline::*;
pub use run::*;
pub use stage::*;
pub use state::*;
