//! Execution layer - wraps skill invocations and drives background learning.
//!
//! A [`Performer`] owns one skill. Every [`Performer::run`] applies the
//! stored best practices, invokes the skill, records the outcome, and once
//! enough history has accumulated queues a [`LearningPass`] on the skill's
//! worker. All performers of a process share one [`TuningContext`].

#![warn(missing_docs)]

mod config;
mod context;
mod learning;
mod performer;
mod skill;

pub use config::{EvolutionConfig, EvolutionSettings, LearningSettings, OptimizationSettings};
pub use context::{EvolutionStatus, TuningContext};
pub use learning::{LearningPass, LearningSummary, ManualLearning, MANUAL_LEARNING_MIN_EXECUTIONS};
pub use performer::{Performer, RunResult};
pub use skill::{Skill, SkillOutput};
