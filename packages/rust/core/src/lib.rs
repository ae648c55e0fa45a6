//! Core translation workflow for Lingoflow.
//!
//! This crate ties together the document store, the completion service and
//! the content model: task discovery ([`scan`]), batch translation
//! ([`translator`]), link localization ([`links`]) and the resumable stage
//! machine that writes translated documents ([`pipeline`]).

pub mod links;
pub mod pipeline;
pub mod properties;
pub mod scan;
pub mod translator;

#[cfg(test)]
mod testing;

pub use links::{CacheState, LinkCache};
pub use pipeline::{
    Orchestrator, PipelineState, ProgressReporter, RunReport, SilentProgress, Stage, TaskFailure,
};
pub use properties::{SourceSnapshot, destination_properties, names, seo_properties};
pub use scan::{TranslationTask, scan_for_missing_translations};
pub use translator::Translator;
