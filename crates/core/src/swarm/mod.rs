//! # Swarm Orchestration
//!
//! Coordinates the research pipeline.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Companies → Locator → Analyst × N (sequential or concurrent) → Synthesis → Report
//! ```

pub mod coordinator;
pub mod events;
pub mod pipeline;

pub use coordinator::{Coordinator, RunResult};
pub use events::{SwarmEvent, SwarmEventKind};
pub use pipeline::{Pipeline, PipelineStage};
