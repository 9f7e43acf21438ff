//! # Swarm Events
//!
//! Progress events streamed by the coordinator while a run is in flight.

use super::pipeline::PipelineStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of swarm event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwarmEventKind {
    PipelineStarted,
    /// A phase began; data carries `phase` and `title`
    PhaseStarted,
    AgentStarted,
    /// Agent finished; analyst events carry the analysis as data
    AgentCompleted,
    AgentFailed,
    /// A phase finished; data carries its headline count
    PhaseCompleted,
    PipelineCompleted,
    PipelineFailed,
}

/// An event in the swarm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmEvent {
    /// Unique event ID (uuid v4)
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SwarmEventKind,
    /// Agent that produced this event
    pub agent: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Company the event concerns, for per-company agents
    #[serde(default)]
    pub company: Option<String>,
}

impl SwarmEvent {
    pub fn new(kind: SwarmEventKind, agent: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            agent: agent.to_string(),
            data: None,
            company: None,
        }
    }

    /// Phase boundary event for `stage`
    pub fn phase(kind: SwarmEventKind, stage: PipelineStage) -> Self {
        Self::new(kind, "coordinator").with_data(serde_json::json!({
            "phase": stage.phase_number(),
            "title": stage.title(),
        }))
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_company(mut self, company: &str) -> Self {
        self.company = Some(company.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = SwarmEvent::new(SwarmEventKind::AgentStarted, "OracleAnalyst")
            .with_company("Oracle");

        assert_eq!(event.agent, "OracleAnalyst");
        assert_eq!(event.company.as_deref(), Some("Oracle"));
        assert!(uuid::Uuid::parse_str(&event.id).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = SwarmEvent::new(SwarmEventKind::PipelineStarted, "coordinator");
        let b = SwarmEvent::new(SwarmEventKind::PipelineStarted, "coordinator");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_phase_event_data() {
        let event = SwarmEvent::phase(SwarmEventKind::PhaseStarted, PipelineStage::Analyzing);
        let data = event.data.unwrap();
        assert_eq!(data["phase"], 2);
        assert_eq!(data["title"], "Company Analysis");

        let json = serde_json::to_value(SwarmEventKind::PhaseCompleted).unwrap();
        assert_eq!(json, "phase_completed");
    }
}
