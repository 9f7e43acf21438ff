//! # Usage Ledger
//!
//! Per-caller token accounting and cost estimation for one pipeline run.
//! Callers only ever add to their own record; reads return snapshots.

use crate::models::{price_for, Pricing, DEFAULT_PRICING_MODEL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Token counters for one caller (or the whole run)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageRecord {
    pub fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.total_tokens += input_tokens + output_tokens;
    }
}

/// Per-agent line of a [`UsageSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentUsage {
    pub agent: String,
    pub model: String,
    #[serde(flatten)]
    pub usage: UsageRecord,
    pub estimated_cost: f64,
}

/// Snapshot of the ledger, suitable for printing or writing as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    /// In first-tracked order
    pub agents: Vec<AgentUsage>,
    pub estimated_cost: f64,
}

#[derive(Default)]
struct LedgerState {
    /// Agent names in first-tracked order
    order: Vec<String>,
    records: HashMap<String, UsageRecord>,
    models: HashMap<String, String>,
    total: UsageRecord,
}

/// Thread-safe accumulator shared by every stage of a run
pub struct UsageLedger {
    state: Mutex<LedgerState>,
    /// Model whose rates price agents with an unknown or missing model
    default_model: String,
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::with_default_model(DEFAULT_PRICING_MODEL)
    }
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_model(model: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            default_model: model.into(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // Counters stay consistent even if a holder panicked mid-update
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a call's tokens to `agent`'s record and the run total
    pub fn track(&self, agent: &str, model: &str, input_tokens: u64, output_tokens: u64) {
        let mut state = self.lock();
        if !state.records.contains_key(agent) {
            state.order.push(agent.to_string());
        }
        state
            .records
            .entry(agent.to_string())
            .or_default()
            .add(input_tokens, output_tokens);
        state.models.insert(agent.to_string(), model.to_string());
        state.total.add(input_tokens, output_tokens);
    }

    pub fn usage(&self, agent: &str) -> Option<UsageRecord> {
        self.lock().records.get(agent).copied()
    }

    pub fn total(&self) -> UsageRecord {
        self.lock().total
    }

    /// Model most recently recorded for each agent
    pub fn models_used(&self) -> HashMap<String, String> {
        self.lock().models.clone()
    }

    /// Cost in USD. Unknown models are priced as [`DEFAULT_PRICING_MODEL`].
    pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        cost_of(pricing_or(model, DEFAULT_PRICING_MODEL), input_tokens, output_tokens)
    }

    /// Cost in USD, pricing unknown models as this ledger's default model
    pub fn cost_for(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        cost_of(pricing_or(model, &self.default_model), input_tokens, output_tokens)
    }

    /// Sum of per-agent costs, using `models_used` to price each agent
    pub fn total_cost_estimate(&self, models_used: &HashMap<String, String>) -> f64 {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|agent| state.records.get(agent).map(|usage| (agent, usage)))
            .map(|(agent, usage)| {
                let model = models_used
                    .get(agent)
                    .map(String::as_str)
                    .unwrap_or(&self.default_model);
                self.cost_for(model, usage.input_tokens, usage.output_tokens)
            })
            .sum()
    }

    pub fn summary(&self) -> UsageSummary {
        let state = self.lock();
        let agents: Vec<AgentUsage> = state
            .order
            .iter()
            .filter_map(|agent| {
                let usage = *state.records.get(agent)?;
                let model = state
                    .models
                    .get(agent)
                    .cloned()
                    .unwrap_or_else(|| self.default_model.clone());
                let estimated_cost = self.cost_for(&model, usage.input_tokens, usage.output_tokens);
                Some(AgentUsage {
                    agent: agent.clone(),
                    model,
                    usage,
                    estimated_cost,
                })
            })
            .collect();

        UsageSummary {
            total_input_tokens: state.total.input_tokens,
            total_output_tokens: state.total.output_tokens,
            total_tokens: state.total.total_tokens,
            estimated_cost: agents.iter().map(|a| a.estimated_cost).sum(),
            agents,
        }
    }
}

fn cost_of(pricing: Pricing, input_tokens: u64, output_tokens: u64) -> f64 {
    (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million
        + (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million
}

/// Rates for `model`, else `fallback`, else [`DEFAULT_PRICING_MODEL`]
fn pricing_or(model: &str, fallback: &str) -> Pricing {
    if let Some(pricing) = price_for(model) {
        return pricing;
    }
    tracing::warn!(
        "No pricing for model {}, estimating with {} rates",
        model,
        fallback
    );
    price_for(fallback)
        .or_else(|| price_for(DEFAULT_PRICING_MODEL))
        .unwrap_or(Pricing {
            input_per_million: 3.00,
            output_per_million: 15.00,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SONNET: &str = "claude-sonnet-4-5-20250929";

    #[test]
    fn test_accumulates_per_agent() {
        let ledger = UsageLedger::new();
        ledger.track("A", SONNET, 100, 50);
        ledger.track("A", SONNET, 10, 5);

        assert_eq!(
            ledger.usage("A"),
            Some(UsageRecord {
                input_tokens: 110,
                output_tokens: 55,
                total_tokens: 165
            })
        );
        assert_eq!(ledger.usage("B"), None);
        assert_eq!(ledger.total().total_tokens, 165);
    }

    #[test]
    fn test_cache_hits_create_zero_records() {
        let ledger = UsageLedger::new();
        ledger.track("OracleAnalyst", SONNET, 0, 0);
        assert_eq!(ledger.usage("OracleAnalyst"), Some(UsageRecord::default()));
    }

    #[test]
    fn test_estimate_cost() {
        let cost = UsageLedger::estimate_cost(SONNET, 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);

        let haiku = UsageLedger::estimate_cost("claude-haiku-4-5-20250929", 500_000, 0);
        assert!((haiku - 0.40).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_priced_as_default() {
        let unknown = UsageLedger::estimate_cost("mystery-model", 1_000_000, 0);
        let default = UsageLedger::estimate_cost(DEFAULT_PRICING_MODEL, 1_000_000, 0);
        assert_eq!(unknown, default);
    }

    #[test]
    fn test_total_cost_uses_models_map() {
        let ledger = UsageLedger::new();
        ledger.track("Lead", "claude-opus-4-5-20251101", 1_000_000, 0);
        ledger.track("Sub", SONNET, 1_000_000, 0);

        let total = ledger.total_cost_estimate(&ledger.models_used());
        assert!((total - 18.0).abs() < 1e-9);

        // Agents missing from the map fall back to default pricing
        let fallback = ledger.total_cost_estimate(&HashMap::new());
        assert!((fallback - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_keeps_first_tracked_order() {
        let ledger = UsageLedger::new();
        ledger.track("LeadDocumentLocator", "claude-haiku-4-5-20250929", 10, 10);
        ledger.track("OracleAnalyst", SONNET, 20, 20);
        ledger.track("LeadDocumentLocator", "claude-haiku-4-5-20250929", 1, 1);

        let summary = ledger.summary();
        let names: Vec<_> = summary.agents.iter().map(|a| a.agent.as_str()).collect();
        assert_eq!(names, vec!["LeadDocumentLocator", "OracleAnalyst"]);
        assert_eq!(summary.total_tokens, 62);
        assert_eq!(summary.agents[0].usage.total_tokens, 22);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["agents"][1]["input_tokens"], 20);
    }

    #[test]
    fn test_configured_default_model_prices_unknown_models() {
        let ledger = UsageLedger::with_default_model("claude-opus-4-5-20251101");
        assert_eq!(ledger.default_model(), "claude-opus-4-5-20251101");
        ledger.track("Mystery", "mystery-model", 1_000_000, 0);

        let summary = ledger.summary();
        assert!((summary.estimated_cost - 15.0).abs() < 1e-9);
        let fallback = ledger.total_cost_estimate(&HashMap::new());
        assert!((fallback - 15.0).abs() < 1e-9);

        // An unpriced default still falls back to the built-in rates
        let odd = UsageLedger::with_default_model("also-unknown");
        assert!((odd.cost_for("mystery-model", 1_000_000, 0) - 3.0).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tracking_loses_nothing() {
        let ledger = Arc::new(UsageLedger::new());
        let start = Arc::new(tokio::sync::Barrier::new(16));
        let mut handles = Vec::new();
        for i in 0..16u64 {
            let ledger = ledger.clone();
            let start = start.clone();
            handles.push(tokio::spawn(async move {
                start.wait().await;
                for n in 0..500u64 {
                    ledger.track(&format!("Agent{}", i), SONNET, i, 1);
                    ledger.track("Shared", SONNET, 1, 0);
                    if n % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let expected_input: u64 = (0..16u64).map(|i| i * 500).sum::<u64>() + 16 * 500;
        let total = ledger.total();
        assert_eq!(total.input_tokens, expected_input);
        assert_eq!(total.output_tokens, 16 * 500);
        assert_eq!(ledger.summary().agents.len(), 17);
        assert_eq!(ledger.usage("Agent3").map(|u| u.input_tokens), Some(1_500));
        assert_eq!(ledger.usage("Shared").map(|u| u.input_tokens), Some(16 * 500));
    }

    #[test]
    fn test_tracking_from_os_threads() {
        let ledger = UsageLedger::new();
        std::thread::scope(|scope| {
            for i in 0..8u64 {
                let ledger = &ledger;
                scope.spawn(move || {
                    for _ in 0..1_000 {
                        ledger.track("Shared", SONNET, 1, 1);
                        ledger.track(&format!("Worker{}", i), SONNET, 2, 0);
                    }
                });
            }
        });

        assert_eq!(ledger.usage("Shared").map(|u| u.total_tokens), Some(16_000));
        assert_eq!(ledger.usage("Worker7").map(|u| u.input_tokens), Some(2_000));
        assert_eq!(ledger.total().input_tokens, 8_000 + 16_000);
    }
}
