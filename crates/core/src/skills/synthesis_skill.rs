//! # Synthesis Skill
//!
//! Phase 3: turns the ranked per-company findings into the final markdown
//! report. Synthesis output is final, so it never touches the cache.

use super::analyst_skill::CompanyAnalysis;
use super::prompts;
use super::StageOutput;
use crate::config::PipelineConfig;
use crate::invoker::{AgentHandle, Invoker};
use crate::llm::ServiceError;
use crate::models::AgentRole;
use serde::{Deserialize, Serialize};

pub const SYNTHESIS_NAME: &str = "SynthesisAgent";

/// One row of the comparison table handed to the synthesizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySummary {
    pub company: String,
    pub gen_ai_mentions: u32,
    pub ml_mentions: u32,
    pub total_mentions: u32,
    pub capex_ai: String,
    pub cfo_quote: String,
    pub insights: String,
}

impl From<&CompanyAnalysis> for CompanySummary {
    fn from(analysis: &CompanyAnalysis) -> Self {
        Self {
            company: analysis.company.clone(),
            gen_ai_mentions: analysis.gen_ai_mentions,
            ml_mentions: analysis.ml_mentions,
            total_mentions: analysis.combined_signal(),
            capex_ai: analysis.capex_ai.clone(),
            cfo_quote: analysis.cfo_quote.clone(),
            insights: analysis.key_insights.clone(),
        }
    }
}

/// Summaries ordered by descending combined signal; ties keep input order
pub fn rank(analyses: &[CompanyAnalysis]) -> Vec<CompanySummary> {
    let mut rows: Vec<CompanySummary> = analyses.iter().map(CompanySummary::from).collect();
    rows.sort_by(|a, b| b.total_mentions.cmp(&a.total_mentions));
    rows
}

pub struct SynthesisSkill {
    agent: AgentHandle,
    invoker: Invoker,
}

impl SynthesisSkill {
    pub fn new(invoker: Invoker, config: &PipelineConfig) -> Self {
        Self {
            agent: AgentHandle::new(SYNTHESIS_NAME, AgentRole::Synthesis, prompts::SYNTHESIS, config),
            invoker,
        }
    }

    pub fn agent(&self) -> &AgentHandle {
        &self.agent
    }

    /// Context block: the ranked rows as pretty JSON
    pub fn build_context(ranked: &[CompanySummary]) -> String {
        let data = serde_json::to_string_pretty(ranked).unwrap_or_else(|_| "[]".to_string());
        format!("Company Analysis Data:\n{}", data)
    }

    pub async fn create_report(
        &self,
        analyses: &[CompanyAnalysis],
    ) -> Result<StageOutput<String>, ServiceError> {
        tracing::info!("Creating synthesis report for {} companies", analyses.len());

        let context = Self::build_context(&rank(analyses));
        let prompt = prompts::render(prompts::SYNTHESIS_TASK, &[]);
        let result = self.invoker.invoke(&self.agent, &prompt, &context, false).await?;

        tracing::info!("Synthesis report created successfully");
        Ok(StageOutput {
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            value: result.text,
        })
    }
}
