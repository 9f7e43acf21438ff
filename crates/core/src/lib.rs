//! # Scrivener Core
//!
//! Multi-agent "Talk vs Walk" research pipeline: how much companies talk
//! about AI in their filings against how much AI CapEx they disclose.
//!
//! ## Architecture
//!
//! - `cache/` - Fingerprinted, TTL-bounded response cache (fs, sqlite, memory)
//! - `invoker/` - One service call with caching and retry/backoff
//! - `llm/` - Text-generation service boundary and HTTP clients
//! - `skills/` - Stage workers (locator, analyst, synthesis)
//! - `swarm/` - Pipeline orchestration and progress events
//! - `usage` - Token ledger and cost estimates
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scrivener_core::config::PipelineConfig;
//! use scrivener_core::llm::create_service;
//! use scrivener_core::swarm::Coordinator;
//!
//! let config = PipelineConfig::from_env()?;
//! let service = create_service(&config.lead.model, config.api_key.as_deref().unwrap_or_default());
//! let mut coordinator = Coordinator::new(config, service, None);
//! let result = coordinator.run(&["Oracle".to_string()]).await?;
//! ```

pub mod cache;
pub mod config;
pub mod decode;
pub mod invoker;
pub mod llm;
pub mod models;
pub mod report;
pub mod skills;
pub mod swarm;
pub mod usage;

#[cfg(test)]
pub(crate) mod testing;
