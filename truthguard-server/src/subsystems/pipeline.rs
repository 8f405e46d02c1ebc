//! Pipeline orchestrator: feed ingestion, then per claim evidence retrieval
//! and classification, aggregated in feed order.
//!
//! Only feed failure is fatal. Evidence faults travel to the classifier as
//! data and classifier faults become degraded records, so every ingested
//! claim yields exactly one `VerdictRecord`.
//!
//! Claims run through `futures::stream::buffered`, which keeps at most
//! `concurrency` claims in flight and yields results in input order. Outbound
//! calls pass through one shared `RateGate` per upstream service: the first
//! attempt is gated here, client retries are gated inside the clients.
//!
//! A run stops early on cancellation or timeout; records finished so far are
//! discarded and the caller receives only the error.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use truthguard_core::config::PipelineConfig;
use truthguard_core::{
    create_classifier, create_retriever, ClaimFeed, ClaimRecord, EvidenceRetriever, FeedError,
    RateGate, RedditFeedClient, TruthGuardConfig, TruthGuardError, VerdictClassifier,
    VerdictRecord,
};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("feed unavailable: {0}")]
    FeedUnavailable(#[from] FeedError),

    #[error("pipeline run cancelled")]
    Cancelled,

    #[error("pipeline run exceeded {after:?}")]
    TimedOut { after: Duration },
}

/// Progress of one claim through a run. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStage {
    Pending,
    EvidenceFetched,
    Classified,
    Recorded,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub limit: usize,
    pub concurrency: usize,
    pub min_interval: Duration,
    pub run_timeout: Option<Duration>,
}

impl PipelineSettings {
    pub fn new(limit: usize, config: &PipelineConfig) -> Self {
        Self {
            limit,
            concurrency: config.concurrency.max(1),
            min_interval: Duration::from_millis(config.min_interval_ms),
            run_timeout: config.run_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// The orchestrator. Built once at startup and shared behind `Arc`.
pub struct Pipeline {
    feed: Arc<dyn ClaimFeed>,
    retriever: Arc<dyn EvidenceRetriever>,
    classifier: VerdictClassifier,
    search_gate: Arc<RateGate>,
    classify_gate: Arc<RateGate>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        feed: Arc<dyn ClaimFeed>,
        retriever: Arc<dyn EvidenceRetriever>,
        classifier: VerdictClassifier,
        settings: PipelineSettings,
    ) -> Self {
        let search_gate = Arc::new(RateGate::new(settings.min_interval));
        let classify_gate = Arc::new(RateGate::new(settings.min_interval));
        Self::with_gates(feed, retriever, classifier, settings, search_gate, classify_gate)
    }

    /// Build around gates the clients already hold for their retries.
    pub fn with_gates(
        feed: Arc<dyn ClaimFeed>,
        retriever: Arc<dyn EvidenceRetriever>,
        classifier: VerdictClassifier,
        settings: PipelineSettings,
        search_gate: Arc<RateGate>,
        classify_gate: Arc<RateGate>,
    ) -> Self {
        Self {
            feed,
            retriever,
            classifier,
            search_gate,
            classify_gate,
            settings,
        }
    }

    /// Wire the production clients from config and the environment.
    pub fn from_config(config: &TruthGuardConfig) -> Result<Self, TruthGuardError> {
        let settings = PipelineSettings::new(config.feed.limit, &config.pipeline);
        let search_gate = Arc::new(RateGate::new(settings.min_interval));
        let classify_gate = Arc::new(RateGate::new(settings.min_interval));

        let feed = RedditFeedClient::new(&config.feed)?;
        let retriever: Arc<dyn EvidenceRetriever> =
            Arc::from(create_retriever(&config.search, search_gate.clone())?);
        let classifier = create_classifier(&config.classifier, classify_gate.clone())?;

        tracing::info!(
            search = retriever.name(),
            classifier = classifier.backend_name(),
            trusted_domains = config.search.trusted_domains.len(),
            "Pipeline clients ready"
        );

        Ok(Self::with_gates(
            Arc::new(feed),
            retriever,
            classifier,
            settings,
            search_gate,
            classify_gate,
        ))
    }

    pub fn classifier(&self) -> &VerdictClassifier {
        &self.classifier
    }

    pub fn retriever_name(&self) -> &str {
        self.retriever.name()
    }

    pub fn feed_name(&self) -> &str {
        self.feed.name()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self, source: &str) -> Result<Vec<VerdictRecord>, PipelineError> {
        self.run_with_cancel(source, &CancellationToken::new()).await
    }

    /// Run once against `source`, aborting when `cancel` fires or the
    /// configured run timeout elapses.
    pub async fn run_with_cancel(
        &self,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<VerdictRecord>, PipelineError> {
        let run_id = Uuid::new_v4();

        let guarded = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(run_id = %run_id, "Pipeline run cancelled");
                    Err(PipelineError::Cancelled)
                }
                result = self.run_inner(run_id, source) => result,
            }
        };

        match self.settings.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(run_id = %run_id, timeout_ms = limit.as_millis() as u64, "Pipeline run timed out");
                    Err(PipelineError::TimedOut { after: limit })
                }
            },
            None => guarded.await,
        }
    }

    async fn run_inner(&self, run_id: Uuid, source: &str) -> Result<Vec<VerdictRecord>, PipelineError> {
        let claims = match self.feed.fetch_claims(source, self.settings.limit).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::error!(run_id = %run_id, source = %source, error = %e, "Feed ingestion failed");
                return Err(e.into());
            }
        };

        tracing::info!(
            run_id = %run_id,
            source = %source,
            claims = claims.len(),
            concurrency = self.settings.concurrency,
            "Pipeline run started"
        );

        let records: Vec<VerdictRecord> = stream::iter(claims.into_iter().enumerate())
            .map(move |(index, claim)| async move { self.process_claim(run_id, index, &claim).await })
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let degraded = records.iter().filter(|r| r.is_degraded()).count();
        tracing::info!(
            run_id = %run_id,
            records = records.len(),
            degraded,
            "Pipeline run complete"
        );

        Ok(records)
    }

    /// Take one claim from `Pending` to `Recorded`. Never fails.
    pub async fn process_claim(&self, run_id: Uuid, index: usize, claim: &ClaimRecord) -> VerdictRecord {
        tracing::debug!(run_id = %run_id, claim_index = index, stage = ?ClaimStage::Pending, "Claim queued");

        self.search_gate.acquire().await;
        let evidence = self.retriever.retrieve_evidence(&claim.title).await;
        tracing::debug!(
            run_id = %run_id,
            claim_index = index,
            stage = ?ClaimStage::EvidenceFetched,
            evidence = evidence.kind(),
            "Evidence gathered"
        );

        self.classify_gate.acquire().await;
        let record = self.classifier.classify(claim, &evidence).await;
        tracing::debug!(
            run_id = %run_id,
            claim_index = index,
            stage = ?ClaimStage::Classified,
            verdict = ?record.verdict,
            "Claim classified"
        );

        tracing::info!(
            run_id = %run_id,
            claim_index = index,
            stage = ?ClaimStage::Recorded,
            verdict = ?record.verdict,
            truth_score = record.truth_score,
            "Claim recorded"
        );
        record
    }
}

// ============================================================================
// TESTS
// ============================================================================
