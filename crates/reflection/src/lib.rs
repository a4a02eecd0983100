//! Reflection layer - mines execution history for patterns.

#![warn(missing_docs, unused_crate_dependencies)]

mod analyzer;
mod config;
mod engine;

pub use analyzer::{Learner, confidence_for_sample_size};
pub use config::LearnerConfig;
pub use engine::{ReflectionEngine, ReflectionConfig, ReflectionReport};
