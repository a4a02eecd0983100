//! Evolution layer - turns analysis into knowledge and applies it.
//!
//! The [`Evolver`] derives best practices and optimization rules from an
//! [`skilltune_core::AnalysisResult`]; the [`Adapter`] applies approved rules
//! to the skill's configuration document behind a snapshot, so every applied
//! batch can be undone with one rollback.

#![warn(missing_docs, unused_crate_dependencies)]

mod adapter;
mod document;
mod error;
mod evolver;

pub use adapter::{Adapter, ApplyOutcome, ApplyReport, AppliedChange};
pub use document::{ConfigDocument, DocumentFormat};
pub use error::AdapterError;
pub use evolver::Evolver;
