//! # Locator Skill
//!
//! Phase 1: asks the lead agent where each company's filings live.

use super::prompts;
use super::StageOutput;
use crate::config::PipelineConfig;
use crate::decode::{decode_json, Decoded};
use crate::invoker::{AgentHandle, Invoker};
use crate::llm::ServiceError;
use crate::models::AgentRole;
use serde::{Deserialize, Serialize};

pub const LOCATOR_NAME: &str = "LeadDocumentLocator";

const NOT_AVAILABLE: &str = "N/A";

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// Where one company's documents can be found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLocation {
    pub company: String,
    #[serde(default = "not_available")]
    pub ticker: String,
    #[serde(default = "not_available")]
    pub fiscal_year_end: String,
    #[serde(default = "not_available")]
    pub tenk_url: String,
    #[serde(default = "not_available")]
    pub investor_relations_url: String,
    #[serde(default = "not_available")]
    pub earnings_transcript_url: String,
}

impl DocumentLocation {
    /// Placeholder used when the locator's answer can't be decoded
    pub fn fallback(company: &str) -> Self {
        Self {
            company: company.to_string(),
            ticker: not_available(),
            fiscal_year_end: "2024".to_string(),
            tenk_url: format!(
                "https://www.sec.gov/cgi-bin/browse-edgar?company={}",
                company
            ),
            investor_relations_url: not_available(),
            earnings_transcript_url: not_available(),
        }
    }

    /// Known fields, skipping unavailable ones
    pub fn sources(&self) -> Vec<(&'static str, &str)> {
        [
            ("ticker", self.ticker.as_str()),
            ("fiscal_year_end", self.fiscal_year_end.as_str()),
            ("tenk_url", self.tenk_url.as_str()),
            ("investor_relations_url", self.investor_relations_url.as_str()),
            ("earnings_transcript_url", self.earnings_transcript_url.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty() && *value != NOT_AVAILABLE)
        .collect()
    }
}

pub struct LocatorSkill {
    agent: AgentHandle,
    invoker: Invoker,
}

impl LocatorSkill {
    pub fn new(invoker: Invoker, config: &PipelineConfig) -> Self {
        Self {
            agent: AgentHandle::new(LOCATOR_NAME, AgentRole::Lead, prompts::LOCATOR, config),
            invoker,
        }
    }

    pub fn agent(&self) -> &AgentHandle {
        &self.agent
    }

    /// Locate filings for `companies`. An undecodable answer degrades to
    /// [`DocumentLocation::fallback`] per company; service errors propagate.
    pub async fn locate(
        &self,
        companies: &[String],
    ) -> Result<StageOutput<Vec<DocumentLocation>>, ServiceError> {
        tracing::info!("Locating documents for {} companies", companies.len());

        let list = companies.join(", ");
        let prompt = prompts::render(prompts::LOCATOR_TASK, &[("companies", list.as_str())]);
        let result = self.invoker.invoke(&self.agent, &prompt, "", true).await?;

        let mut locations = match decode_json::<Vec<DocumentLocation>>(&result.text) {
            Decoded::Parsed(locations) if !locations.is_empty() => locations,
            _ => {
                tracing::warn!("Failed to parse document locations, using defaults");
                Vec::new()
            }
        };

        // Every requested company gets a descriptor
        for company in companies {
            let located = locations
                .iter()
                .any(|l| l.company.trim().eq_ignore_ascii_case(company.trim()));
            if !located {
                if !locations.is_empty() {
                    tracing::warn!("No location returned for {}, using defaults", company);
                }
                locations.push(DocumentLocation::fallback(company));
            }
        }

        tracing::info!("Located documents for {} companies", locations.len());
        Ok(StageOutput::from_invocation(locations, &result))
    }
}
