//! # Scrivener Skills
//!
//! Stage workers. Each wraps the [`Invoker`](crate::invoker::Invoker) with
//! its own request construction and response decoding.
//!
//! ```text
//! Coordinator
//!   ├── LocatorSkill    (phase 1, one call, cached)
//!   ├── AnalystSkill    (phase 2, one per company, cached)
//!   └── SynthesisSkill  (phase 3, one call, never cached)
//! ```

pub mod prompts;

pub mod analyst_skill;
pub mod locator_skill;
pub mod synthesis_skill;

pub use analyst_skill::{AnalysisStatus, AnalystSkill, CompanyAnalysis, MAX_DOCUMENT_CHARS};
pub use locator_skill::{DocumentLocation, LocatorSkill};
pub use synthesis_skill::{rank, CompanySummary, SynthesisSkill};

use crate::invoker::InvocationResult;

/// A stage's decoded value plus the tokens spent producing it
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub value: T,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl<T> StageOutput<T> {
    pub(crate) fn from_invocation(value: T, result: &InvocationResult) -> Self {
        Self {
            value,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
        }
    }
}
