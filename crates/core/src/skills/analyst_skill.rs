//! # Analyst Skill
//!
//! Phase 2: one analyst per company counts AI "talk" (mentions) and looks for
//! AI "walk" (disclosed CapEx) in that company's documents.

use super::locator_skill::DocumentLocation;
use super::prompts;
use super::StageOutput;
use crate::config::PipelineConfig;
use crate::decode::{decode_json, Decoded};
use crate::invoker::{AgentHandle, Invoker};
use crate::llm::ServiceError;
use crate::models::AgentRole;
use serde::{Deserialize, Deserializer, Serialize};

/// Longest document excerpt sent to an analyst, in characters
pub const MAX_DOCUMENT_CHARS: usize = 30_000;

const ERROR_TEXT: &str = "Error in analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete,
    Failed,
}

/// Structured outcome of analyzing one company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAnalysis {
    pub company: String,
    pub gen_ai_mentions: u32,
    pub ml_mentions: u32,
    pub capex_ai: String,
    pub cfo_quote: String,
    pub key_insights: String,
    pub documents_analyzed: Vec<String>,
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompanyAnalysis {
    /// Placeholder for a company whose analysis could not be produced
    pub fn failed(company: &str) -> Self {
        Self {
            company: company.to_string(),
            gen_ai_mentions: 0,
            ml_mentions: 0,
            capex_ai: ERROR_TEXT.to_string(),
            cfo_quote: ERROR_TEXT.to_string(),
            key_insights: "Analysis failed".to_string(),
            documents_analyzed: Vec::new(),
            status: AnalysisStatus::Failed,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Total "talk": Gen AI plus ML mentions
    pub fn combined_signal(&self) -> u32 {
        self.gen_ai_mentions.saturating_add(self.ml_mentions)
    }

    pub fn is_failed(&self) -> bool {
        self.status == AnalysisStatus::Failed
    }
}

fn not_disclosed() -> String {
    "Not disclosed".to_string()
}

fn no_quote() -> String {
    "No quote found".to_string()
}

/// Wire shape of an analyst answer
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    #[serde(default, deserialize_with = "lenient_count")]
    gen_ai_mentions: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    ml_mentions: u32,
    #[serde(default = "not_disclosed")]
    capex_ai: String,
    #[serde(default = "no_quote")]
    cfo_quote: String,
    #[serde(default)]
    key_insights: String,
}

/// Accepts `12`, `12.0`, `"12"` or `"~12 mentions"`; anything else counts as 0
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let count = match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        serde_json::Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    };
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Cut `text` to at most `max` characters on a char boundary
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct AnalystSkill {
    company: String,
    agent: AgentHandle,
    invoker: Invoker,
}

impl AnalystSkill {
    pub fn new(company: &str, invoker: Invoker, config: &PipelineConfig) -> Self {
        let role = prompts::render(prompts::ANALYST, &[("company", company)]);
        Self {
            company: company.to_string(),
            agent: AgentHandle::new(Self::agent_name(company), AgentRole::Analyst, role, config),
            invoker,
        }
    }

    /// Caller identity for a company's analyst
    pub fn agent_name(company: &str) -> String {
        format!("{}Analyst", company)
    }

    pub fn agent(&self) -> &AgentHandle {
        &self.agent
    }

    fn build_context(&self, location: &DocumentLocation) -> String {
        let mut lines = vec![format!("Analyzing: {}", self.company)];
        let sources = location.sources();
        if !sources.is_empty() {
            lines.push("Document sources:".to_string());
            lines.extend(
                sources
                    .into_iter()
                    .map(|(key, value)| format!("  - {}: {}", key, value)),
            );
        }
        lines.join("\n")
    }

    fn build_prompt(&self, document_content: Option<&str>) -> String {
        match document_content {
            Some(content) => prompts::render(
                prompts::ANALYST_DOCUMENT_TASK,
                &[
                    ("company", self.company.as_str()),
                    ("content", truncate_chars(content, MAX_DOCUMENT_CHARS)),
                ],
            ),
            None => prompts::render(
                prompts::ANALYST_KNOWLEDGE_TASK,
                &[("company", self.company.as_str())],
            ),
        }
    }

    /// Analyze one company. Without `document_content` the analyst works
    /// from model knowledge. An undecodable answer becomes a failed
    /// placeholder; service errors propagate.
    pub async fn analyze(
        &self,
        location: &DocumentLocation,
        document_content: Option<&str>,
    ) -> Result<StageOutput<CompanyAnalysis>, ServiceError> {
        tracing::info!("Analyzing documents for {}", self.company);

        let context = self.build_context(location);
        let prompt = self.build_prompt(document_content);
        let result = self.invoker.invoke(&self.agent, &prompt, &context, true).await?;

        let analysis = match decode_json::<AnalysisPayload>(&result.text) {
            Decoded::Parsed(payload) => CompanyAnalysis {
                company: self.company.clone(),
                gen_ai_mentions: payload.gen_ai_mentions,
                ml_mentions: payload.ml_mentions,
                capex_ai: payload.capex_ai,
                cfo_quote: payload.cfo_quote,
                key_insights: payload.key_insights,
                documents_analyzed: vec![
                    location.tenk_url.clone(),
                    location.earnings_transcript_url.clone(),
                ],
                status: AnalysisStatus::Complete,
                error: None,
            },
            Decoded::Unparseable => {
                tracing::error!("Failed to parse analysis for {}", self.company);
                CompanyAnalysis::failed(&self.company).with_error("unparseable response")
            }
        };

        tracing::info!(
            "Analysis complete for {}: Gen AI: {}, ML: {}",
            self.company,
            analysis.gen_ai_mentions,
            analysis.ml_mentions
        );
        Ok(StageOutput::from_invocation(analysis, &result))
    }
}
