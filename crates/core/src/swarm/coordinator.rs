//! # Swarm Coordinator
//!
//! Runs the three-phase pipeline: locate documents, analyze each company,
//! synthesize a report. Phase 2 runs one analyst per company, one at a time
//! or concurrently under a semaphore; either way results come back in
//! submission order.
//!
//! Only phase 1 and phase 3 service failures abort a run. A phase 2 failure
//! degrades that company to a placeholder and the run carries on.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::cache::ResponseCache;
use crate::config::PipelineConfig;
use crate::invoker::retry::Sleeper;
use crate::invoker::Invoker;
use crate::llm::TextService;
use crate::skills::{
    rank, AnalystSkill, CompanyAnalysis, CompanySummary, DocumentLocation, LocatorSkill,
    SynthesisSkill,
};
use crate::usage::{UsageLedger, UsageSummary};

use super::events::{SwarmEvent, SwarmEventKind};
use super::pipeline::{Pipeline, PipelineStage};

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub locations: Vec<DocumentLocation>,
    /// In submission order
    pub analyses: Vec<CompanyAnalysis>,
    /// Descending combined signal
    pub ranked: Vec<CompanySummary>,
    pub report: String,
    pub usage: UsageSummary,
    pub stage: PipelineStage,
}

/// What a phase 2 worker needs, cloneable into spawned tasks
#[derive(Clone)]
struct AnalysisContext {
    invoker: Invoker,
    config: Arc<PipelineConfig>,
    ledger: Arc<UsageLedger>,
    event_tx: Option<mpsc::Sender<SwarmEvent>>,
}

async fn send_event(tx: &Option<mpsc::Sender<SwarmEvent>>, event: SwarmEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event).await;
    }
}

/// Analyze one company. Never fails: service errors become placeholders.
async fn analyze_one(
    ctx: AnalysisContext,
    location: DocumentLocation,
    document: Option<String>,
    index: usize,
    total: usize,
) -> CompanyAnalysis {
    let company = location.company.clone();
    let skill = AnalystSkill::new(&company, ctx.invoker.clone(), &ctx.config);
    let agent = skill.agent().clone();

    send_event(
        &ctx.event_tx,
        SwarmEvent::new(SwarmEventKind::AgentStarted, &agent.name)
            .with_company(&company)
            .with_data(serde_json::json!({ "index": index + 1, "total": total })),
    )
    .await;

    match skill.analyze(&location, document.as_deref()).await {
        Ok(output) => {
            ctx.ledger
                .track(&agent.name, &agent.model, output.input_tokens, output.output_tokens);
            send_event(
                &ctx.event_tx,
                SwarmEvent::new(SwarmEventKind::AgentCompleted, &agent.name)
                    .with_company(&company)
                    .with_data(serde_json::to_value(&output.value).unwrap_or_default()),
            )
            .await;
            output.value
        }
        Err(e) => {
            tracing::error!("Analysis failed for {}: {}", company, e);
            let analysis = CompanyAnalysis::failed(&company).with_error(e.to_string());
            send_event(
                &ctx.event_tx,
                SwarmEvent::new(SwarmEventKind::AgentFailed, &agent.name)
                    .with_company(&company)
                    .with_data(serde_json::to_value(&analysis).unwrap_or_default()),
            )
            .await;
            analysis
        }
    }
}

/// The swarm coordinator
pub struct Coordinator {
    config: Arc<PipelineConfig>,
    invoker: Invoker,
    cache: Option<Arc<ResponseCache>>,
    ledger: Arc<UsageLedger>,
    pipeline: Pipeline,
    event_tx: Option<mpsc::Sender<SwarmEvent>>,
    /// Document text per company, for analysts that should read real filings
    documents: HashMap<String, String>,
}

impl Coordinator {
    /// `cache` is ignored when caching is disabled in `config`
    pub fn new(
        config: PipelineConfig,
        service: Arc<dyn TextService>,
        cache: Option<Arc<ResponseCache>>,
    ) -> Self {
        let cache = if config.enable_caching { cache } else { None };
        let invoker = Invoker::from_config(service, cache.clone(), &config);
        let ledger = Arc::new(UsageLedger::with_default_model(config.default_model.clone()));

        tracing::info!(
            "Coordinator initialized (caching: {}, parallel execution: {})",
            if cache.is_some() { "enabled" } else { "disabled" },
            if config.parallel_execution { "enabled" } else { "disabled" }
        );

        Self {
            config: Arc::new(config),
            invoker,
            cache,
            ledger,
            pipeline: Pipeline::new(),
            event_tx: None,
            documents: HashMap::new(),
        }
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<SwarmEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Replace the backoff sleeper (tests observe delays instead of waiting)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.invoker = self.invoker.with_sleeper(sleeper);
        self
    }

    /// Document text keyed by company name
    pub fn with_documents(mut self, documents: HashMap<String, String>) -> Self {
        self.documents = documents;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn stage(&self) -> PipelineStage {
        self.pipeline.stage
    }

    async fn emit(&self, event: SwarmEvent) {
        send_event(&self.event_tx, event).await;
    }

    async fn begin_phase(&self) {
        let stage = self.pipeline.stage;
        tracing::info!(
            "Phase {}: {}",
            stage.phase_number().unwrap_or_default(),
            stage.title()
        );
        self.emit(SwarmEvent::phase(SwarmEventKind::PhaseStarted, stage))
            .await;
    }

    async fn end_phase(&mut self, summary: serde_json::Value) {
        let mut event = SwarmEvent::phase(SwarmEventKind::PhaseCompleted, self.pipeline.stage);
        if let (Some(serde_json::Value::Object(data)), serde_json::Value::Object(extra)) =
            (event.data.as_mut(), summary)
        {
            data.extend(extra);
        }
        self.emit(event).await;
        self.pipeline.advance();
    }

    /// Run the full pipeline over `companies`
    #[tracing::instrument(skip(self, companies), fields(companies = companies.len()))]
    pub async fn run(&mut self, companies: &[String]) -> Result<RunResult> {
        self.pipeline = Pipeline::new();
        self.emit(
            SwarmEvent::new(SwarmEventKind::PipelineStarted, "coordinator")
                .with_data(serde_json::json!({ "companies": companies })),
        )
        .await;

        match self.run_phases(companies).await {
            Ok(result) => {
                self.emit(
                    SwarmEvent::new(SwarmEventKind::PipelineCompleted, "coordinator")
                        .with_data(serde_json::to_value(&result.usage).unwrap_or_default()),
                )
                .await;
                Ok(result)
            }
            Err(e) => {
                self.pipeline.fail();
                tracing::error!("Pipeline failed: {:#}", e);
                self.emit(
                    SwarmEvent::new(SwarmEventKind::PipelineFailed, "coordinator")
                        .with_data(serde_json::json!({ "error": format!("{:#}", e) })),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self, companies: &[String]) -> Result<RunResult> {
        self.begin_phase().await;
        let locations = self.locate(companies).await?;
        self.end_phase(serde_json::json!({ "count": locations.len() }))
            .await;

        self.begin_phase().await;
        let analyses = self.analyze_all(&locations).await?;
        let failed = analyses.iter().filter(|a| a.is_failed()).count();
        self.end_phase(serde_json::json!({ "count": analyses.len(), "failed": failed }))
            .await;

        self.begin_phase().await;
        let report = self.synthesize(&analyses).await?;
        self.end_phase(serde_json::json!({ "chars": report.chars().count() }))
            .await;

        Ok(RunResult {
            ranked: rank(&analyses),
            locations,
            analyses,
            report,
            usage: self.ledger.summary(),
            stage: self.pipeline.stage,
        })
    }

    /// Phase 1: one locator call for every company
    #[tracing::instrument(skip(self, companies))]
    pub async fn locate(&self, companies: &[String]) -> Result<Vec<DocumentLocation>> {
        let skill = LocatorSkill::new(self.invoker.clone(), &self.config);
        let agent = skill.agent().clone();
        self.emit(SwarmEvent::new(SwarmEventKind::AgentStarted, &agent.name))
            .await;

        let output = match skill.locate(companies).await {
            Ok(output) => output,
            Err(e) => {
                self.emit(
                    SwarmEvent::new(SwarmEventKind::AgentFailed, &agent.name)
                        .with_data(serde_json::json!({ "error": e.to_string() })),
                )
                .await;
                let provider = self.config.lead.model.provider.display_name();
                return Err(e).with_context(|| {
                    format!(
                        "Document location failed (provider: {}, model: {})",
                        provider, agent.model
                    )
                });
            }
        };

        self.ledger
            .track(&agent.name, &agent.model, output.input_tokens, output.output_tokens);
        self.emit(
            SwarmEvent::new(SwarmEventKind::AgentCompleted, &agent.name)
                .with_data(serde_json::json!({ "located": output.value.len() })),
        )
        .await;
        Ok(output.value)
    }

    fn analysis_context(&self) -> AnalysisContext {
        AnalysisContext {
            invoker: self.invoker.clone(),
            config: Arc::clone(&self.config),
            ledger: Arc::clone(&self.ledger),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Phase 2: one analyst per location, results in submission order
    #[tracing::instrument(skip(self, locations), fields(count = locations.len()))]
    pub async fn analyze_all(&self, locations: &[DocumentLocation]) -> Result<Vec<CompanyAnalysis>> {
        let total = locations.len();
        let ctx = self.analysis_context();

        if !self.config.parallel_execution {
            let mut analyses = Vec::with_capacity(total);
            for (index, location) in locations.iter().enumerate() {
                let document = self.documents.get(&location.company).cloned();
                analyses.push(analyze_one(ctx.clone(), location.clone(), document, index, total).await);
            }
            return Ok(analyses);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_analyses.max(1)));
        let mut handles = Vec::with_capacity(total);

        for (index, location) in locations.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("Analysis semaphore closed")?;
            let ctx = ctx.clone();
            let location = location.clone();
            let document = self.documents.get(&location.company).cloned();
            let company = location.company.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                analyze_one(ctx, location, document, index, total).await
            });
            handles.push((company, handle));
        }

        let mut analyses = Vec::with_capacity(total);
        for (company, handle) in handles {
            match handle.await {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => {
                    tracing::error!("Analyst task for {} did not finish: {}", company, e);
                    analyses.push(CompanyAnalysis::failed(&company).with_error(e.to_string()));
                }
            }
        }
        Ok(analyses)
    }

    /// Phase 3: the final report, never cached
    #[tracing::instrument(skip(self, analyses), fields(count = analyses.len()))]
    pub async fn synthesize(&self, analyses: &[CompanyAnalysis]) -> Result<String> {
        let skill = SynthesisSkill::new(self.invoker.clone(), &self.config);
        let agent = skill.agent().clone();
        self.emit(SwarmEvent::new(SwarmEventKind::AgentStarted, &agent.name))
            .await;

        let output = match skill.create_report(analyses).await {
            Ok(output) => output,
            Err(e) => {
                self.emit(
                    SwarmEvent::new(SwarmEventKind::AgentFailed, &agent.name)
                        .with_data(serde_json::json!({ "error": e.to_string() })),
                )
                .await;
                let provider = self.config.synthesis.model.provider.display_name();
                return Err(e).with_context(|| {
                    format!(
                        "Report synthesis failed (provider: {}, model: {})",
                        provider, agent.model
                    )
                });
            }
        };

        self.ledger
            .track(&agent.name, &agent.model, output.input_tokens, output.output_tokens);
        self.emit(SwarmEvent::new(SwarmEventKind::AgentCompleted, &agent.name))
            .await;
        Ok(output.value)
    }

    /// Remove every cache entry; 0 when caching is off
    pub fn clear_cache(&self) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let count = cache.clear().context("Failed to clear cache")?;
        tracing::info!("Cleared {} cache entries", count);
        Ok(count)
    }

    /// Remove expired and corrupt cache entries; 0 when caching is off
    pub fn clear_expired_cache(&self) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let count = cache
            .clear_expired()
            .context("Failed to clear expired cache entries")?;
        tracing::info!("Cleared {} expired cache entries", count);
        Ok(count)
    }
}
