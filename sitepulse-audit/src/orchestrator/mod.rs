//! Audit pipeline orchestration
//!
//! Two-level fan-out/fan-in. Level 1 runs the five stage analyzers
//! concurrently; each worker sends its slice over a channel and only the
//! orchestrator loop mutates the bundle (single writer). Level 2 runs
//! once level 1 has drained: the AI stage fans out over the configured
//! providers and merges their narratives.
//!
//! Stage failures degrade their category to an `{error}` placeholder and
//! the audit completes with partial scores. The only fatal failure is
//! the bundle row itself being unpersistable.

pub mod tracker;

pub use tracker::RunTracker;

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sitepulse_common::db::settings::get_i64_setting;
use sitepulse_common::events::{AuditEvent, EventBus};
use sitepulse_common::{AuditTarget, AuditType};

use crate::db::bundles::{mark_failed, save_bundle};
use crate::insight::{InsightMerger, ProviderInsight};
use crate::models::{AiInsight, AnalysisBundle, CategoryOutcome, RunStatus};
use crate::scoring;
use crate::types::{FatalError, InsightProvider, StageAnalyzer, StageOutput};

/// One category result delivered by a level-1 worker
struct StageSlice {
    audit_type: AuditType,
    outcome: Result<StageOutput, String>,
}

/// Coordinates the full audit pipeline for one target at a time
pub struct Orchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    analyzers: Vec<Arc<dyn StageAnalyzer>>,
    providers: Vec<Arc<dyn InsightProvider>>,
    merger: InsightMerger,
}

impl Orchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        analyzers: Vec<Arc<dyn StageAnalyzer>>,
        providers: Vec<Arc<dyn InsightProvider>>,
        merger: InsightMerger,
    ) -> Self {
        Self {
            db,
            event_bus,
            analyzers,
            providers,
            merger,
        }
    }

    /// Build an orchestrator with the production analyzer and provider
    /// sets, resolving API keys through the configuration layer
    pub async fn with_default_stages(
        db: SqlitePool,
        event_bus: EventBus,
    ) -> sitepulse_common::Result<Self> {
        let pagespeed_key = crate::config::resolve_provider_key(&db, "pagespeed").await?;
        let maps_key = crate::config::resolve_provider_key(&db, "maps").await?;
        let openai_key = crate::config::resolve_provider_key(&db, "openai").await?;
        let anthropic_key = crate::config::resolve_provider_key(&db, "anthropic").await?;

        Ok(Self::new(
            db,
            event_bus,
            crate::stages::default_analyzers(pagespeed_key, maps_key),
            crate::providers::configured_providers(openai_key, anthropic_key),
            InsightMerger::default(),
        ))
    }

    /// Run an audit end to end, absorbing the fatal path
    ///
    /// This is the entry point for background task spawns: fatal errors
    /// are logged, the bundle is best-effort marked failed, and an
    /// `AuditFailed` event is emitted.
    pub async fn run(&self, analysis_id: Uuid, target: AuditTarget, cancel: CancellationToken) {
        if let Err(fatal) = self.run_with_id(analysis_id, target, cancel).await {
            tracing::error!(
                analysis_id = %analysis_id,
                error = %fatal,
                "Audit aborted on fatal error"
            );

            if let Err(e) = mark_failed(&self.db, analysis_id, &fatal.to_string()).await {
                tracing::error!(
                    analysis_id = %analysis_id,
                    error = %e,
                    "Failed to mark aborted audit as failed"
                );
            }

            self.event_bus.emit_lossy(AuditEvent::AuditFailed {
                analysis_id,
                error: fatal.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Run an audit end to end against a pre-assigned analysis id
    ///
    /// # Errors
    /// `FatalError` only when the bundle row cannot be created or
    /// finalized; every stage failure is absorbed into its category.
    pub async fn run_with_id(
        &self,
        analysis_id: Uuid,
        target: AuditTarget,
        cancel: CancellationToken,
    ) -> Result<(), FatalError> {
        let started = Instant::now();
        let mut bundle = AnalysisBundle::new(analysis_id, &target);

        // The bundle row is the console of record; without it nothing
        // can be surfaced, so this save is the one fatal write.
        save_bundle(&self.db, &bundle)
            .await
            .map_err(FatalError::Persistence)?;

        self.event_bus.emit_lossy(AuditEvent::AuditStarted {
            analysis_id,
            url: target.url.clone(),
            timestamp: chrono::Utc::now(),
        });

        let deadline_secs = match get_i64_setting(&self.db, "audit_pipeline_deadline_secs", 120).await
        {
            Ok(v) => v.max(1) as u64,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read pipeline deadline, using default");
                120
            }
        };

        let tracker = Arc::new(
            RunTracker::load(self.db.clone(), self.event_bus.clone(), analysis_id)
                .await
                .map_err(FatalError::Persistence)?,
        );

        // Child token: the deadline watchdog cancels only this pipeline,
        // while an external cancel propagates down through it.
        let pipeline_cancel = cancel.child_token();
        let watchdog = {
            let token = pipeline_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(deadline_secs)).await;
                tracing::warn!(
                    analysis_id = %analysis_id,
                    deadline_secs,
                    "Pipeline deadline elapsed, cancelling remaining stages"
                );
                token.cancel();
            })
        };

        self.run_level_one(&mut bundle, &target, &tracker, &pipeline_cancel)
            .await;

        // Persist partial category results before the AI stage
        save_bundle(&self.db, &bundle)
            .await
            .map_err(FatalError::Persistence)?;

        if cancel.is_cancelled() {
            watchdog.abort();
            bundle.fail("Audit cancelled".to_string());
            save_bundle(&self.db, &bundle)
                .await
                .map_err(FatalError::Persistence)?;
            self.event_bus.emit_lossy(AuditEvent::AuditCancelled {
                analysis_id,
                timestamp: chrono::Utc::now(),
            });
            return Ok(());
        }

        // Level 2: AI insight, always attempted so the bundle carries a
        // narrative (or its deterministic fallback) either way
        let insight = self.run_ai_stage(&bundle, &tracker, &pipeline_cancel).await;
        bundle.ai_insight = Some(insight);

        watchdog.abort();

        if cancel.is_cancelled() {
            bundle.fail("Audit cancelled".to_string());
            save_bundle(&self.db, &bundle)
                .await
                .map_err(FatalError::Persistence)?;
            self.event_bus.emit_lossy(AuditEvent::AuditCancelled {
                analysis_id,
                timestamp: chrono::Utc::now(),
            });
            return Ok(());
        }

        let scores = scoring::reduce(
            bundle.performance.as_ref().and_then(|c| c.report()),
            bundle.security.as_ref().and_then(|c| c.report()),
            bundle.metadata.as_ref().and_then(|c| c.report()),
            bundle
                .maps_presence
                .as_ref()
                .and_then(|c| c.report())
                .and_then(|r| r.matched_entity.as_ref()),
        );
        bundle.recommendations =
            scoring::derive_recommendations(&scores, target.business_name.is_some());
        bundle.scores = Some(scores);
        bundle.complete();

        save_bundle(&self.db, &bundle)
            .await
            .map_err(FatalError::Persistence)?;

        let total_seconds = started.elapsed().as_secs_f64();
        tracing::info!(
            analysis_id = %analysis_id,
            composite_score = scores.overall,
            total_seconds,
            "Audit completed"
        );
        self.event_bus.emit_lossy(AuditEvent::AuditCompleted {
            analysis_id,
            composite_score: scores.overall,
            total_seconds,
            timestamp: chrono::Utc::now(),
        });

        Ok(())
    }

    /// Level 1: fan the stage analyzers out, fan their slices in
    ///
    /// Workers never touch the bundle; they send slices over the channel
    /// and this loop is the single writer.
    async fn run_level_one(
        &self,
        bundle: &mut AnalysisBundle,
        target: &AuditTarget,
        tracker: &Arc<RunTracker>,
        cancel: &CancellationToken,
    ) {
        let (tx, mut rx) = mpsc::channel::<StageSlice>(self.analyzers.len().max(1));

        let mut expected = 0usize;
        for analyzer in &self.analyzers {
            let audit_type = analyzer.audit_type();

            // The maps stage needs a business name to query against; a
            // target without one skips the stage entirely (no run row).
            if audit_type == AuditType::Maps && target.business_name.is_none() {
                tracing::info!(
                    analysis_id = %bundle.id,
                    "Skipping maps stage: no business name provided"
                );
                continue;
            }

            expected += 1;
            let analyzer = Arc::clone(analyzer);
            let tracker = Arc::clone(tracker);
            let target = target.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = tracker.run_stage(analyzer.as_ref(), &target, &cancel).await;
                // Receiver only closes once all slices are drained
                let _ = tx
                    .send(StageSlice {
                        audit_type,
                        outcome,
                    })
                    .await;
            });
        }
        drop(tx);

        let mut received = 0usize;
        while let Some(slice) = rx.recv().await {
            received += 1;
            match slice.outcome {
                Ok(StageOutput::Performance(r)) => {
                    bundle.performance = Some(CategoryOutcome::Report(r));
                }
                Ok(StageOutput::Security(r)) => {
                    bundle.security = Some(CategoryOutcome::Report(r));
                }
                Ok(StageOutput::Technology(r)) => {
                    bundle.technology = Some(CategoryOutcome::Report(r));
                }
                Ok(StageOutput::Metadata(r)) => {
                    bundle.metadata = Some(CategoryOutcome::Report(r));
                }
                Ok(StageOutput::Maps(r)) => {
                    bundle.maps_presence = Some(CategoryOutcome::Report(r));
                }
                Err(error) => match slice.audit_type {
                    AuditType::Performance => {
                        bundle.performance = Some(CategoryOutcome::Error { error });
                    }
                    AuditType::Security => {
                        bundle.security = Some(CategoryOutcome::Error { error });
                    }
                    AuditType::Technology => {
                        bundle.technology = Some(CategoryOutcome::Error { error });
                    }
                    AuditType::Metadata => {
                        bundle.metadata = Some(CategoryOutcome::Error { error });
                    }
                    AuditType::Maps => {
                        bundle.maps_presence = Some(CategoryOutcome::Error { error });
                    }
                    AuditType::Ai => {}
                },
            }
        }

        if received != expected {
            // A worker panicking drops its sender without a slice
            tracing::error!(
                analysis_id = %bundle.id,
                expected,
                received,
                "Stage worker exited without delivering its slice"
            );
        }
    }

    /// Level 2: fan out over AI providers, merge their narratives
    ///
    /// One run row covers the whole provider fan-out. Provider failures
    /// are recorded in the run's debug info; the merge only ever sees
    /// successes and falls back deterministically when there are none.
    async fn run_ai_stage(
        &self,
        bundle: &AnalysisBundle,
        tracker: &Arc<RunTracker>,
        cancel: &CancellationToken,
    ) -> AiInsight {
        let mut run = tracker.begin(AuditType::Ai).await;

        if self.providers.is_empty() {
            tracker
                .finish_failure(
                    &mut run,
                    RunStatus::Failed,
                    "not_available",
                    "No AI provider configured".to_string(),
                    None,
                )
                .await;
            return self.merger.merge(Vec::new());
        }

        let prompt = build_prompt(bundle);

        // join_all preserves configuration order, which fixes the merge
        // order and therefore the provider label
        let calls = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            let prompt = prompt.clone();
            async move {
                let started = Instant::now();
                let result = provider.generate(&prompt).await;
                (provider.name(), result, started.elapsed().as_millis() as u64)
            }
        });

        let results = tokio::select! {
            _ = cancel.cancelled() => {
                tracker
                    .finish_failure(
                        &mut run,
                        RunStatus::Timeout,
                        "cancelled",
                        "Audit cancelled".to_string(),
                        None,
                    )
                    .await;
                return self.merger.merge(Vec::new());
            }
            results = futures::future::join_all(calls) => results,
        };

        let mut insights = Vec::new();
        let mut provider_outcomes = Vec::new();
        let mut response_times = Vec::new();
        for (name, result, elapsed_ms) in results {
            response_times.push(elapsed_ms);
            match result {
                Ok(text) => {
                    insights.push(ProviderInsight::from_text(name, text, self.merger.rules()));
                    provider_outcomes.push(serde_json::json!({
                        "provider": name,
                        "outcome": "ok",
                        "elapsed_ms": elapsed_ms,
                    }));
                }
                Err(e) => {
                    tracing::warn!(
                        analysis_id = %bundle.id,
                        provider = name,
                        error = %e,
                        "AI provider failed; excluded from merge"
                    );
                    provider_outcomes.push(serde_json::json!({
                        "provider": name,
                        "outcome": "error",
                        "kind": e.kind(),
                        "error": e.to_string(),
                        "elapsed_ms": elapsed_ms,
                    }));
                }
            }
        }

        let debug_info = serde_json::json!({ "providers": provider_outcomes });
        let insight = self.merger.merge(insights);

        if insight.providers_count == 0 {
            tracker
                .finish_failure(
                    &mut run,
                    RunStatus::Failed,
                    "not_available",
                    "All configured AI providers failed".to_string(),
                    Some(debug_info),
                )
                .await;
        } else {
            let result_data = match serde_json::to_value(&insight) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize merged insight for run row");
                    serde_json::Value::Null
                }
            };
            tracker
                .finish_success(&mut run, result_data, response_times, Some(debug_info))
                .await;
        }

        insight
    }
}

/// Assemble the provider prompt from whatever stage results exist
///
/// Failed categories are named so the narrative can acknowledge the gap
/// instead of inventing findings for it.
fn build_prompt(bundle: &AnalysisBundle) -> String {
    let mut sections = vec![format!("Website audit findings for {}:", bundle.url)];

    if let Some(r) = bundle.performance.as_ref().and_then(|c| c.report()) {
        sections.push(format!(
            "Performance: mobile score {}/100, desktop score {}/100.",
            r.mobile_score, r.desktop_score
        ));
    }

    if let Some(r) = bundle.security.as_ref().and_then(|c| c.report()) {
        let missing: Vec<&str> = r
            .security_headers
            .iter()
            .filter(|(_, score)| **score == 0)
            .map(|(name, _)| name.as_str())
            .collect();
        let missing = if missing.is_empty() {
            "none".to_string()
        } else {
            missing.join(", ")
        };
        sections.push(format!(
            "Security: HTTPS {}, grade {}, missing headers: {}.",
            if r.has_ssl { "enabled" } else { "disabled" },
            r.ssl_grade,
            missing
        ));
    }

    if let Some(r) = bundle.technology.as_ref().and_then(|c| c.report()) {
        let detected: Vec<String> = r
            .detected
            .values()
            .flat_map(|names| names.iter().cloned())
            .collect();
        if !detected.is_empty() {
            sections.push(format!("Technology stack: {}.", detected.join(", ")));
        }
    }

    if let Some(r) = bundle.metadata.as_ref().and_then(|c| c.report()) {
        sections.push(format!(
            "SEO metadata: title {}, meta description {}, {} H1 heading(s), \
             robots.txt {}, sitemap {}.",
            r.title.as_deref().map_or("missing", |_| "present"),
            r.description.as_deref().map_or("missing", |_| "present"),
            r.h1s.len(),
            if r.has_robots_txt { "present" } else { "missing" },
            if r.has_sitemap { "present" } else { "missing" },
        ));
    }

    if let Some(r) = bundle.maps_presence.as_ref().and_then(|c| c.report()) {
        match &r.matched_entity {
            Some(entity) => sections.push(format!(
                "Business directory: listed as '{}', rating {}, {} reviews, {}.",
                entity.name,
                entity
                    .rating
                    .map_or("unrated".to_string(), |v| format!("{:.1}", v)),
                entity.review_count.unwrap_or(0),
                if entity.verified { "verified" } else { "unverified" },
            )),
            None => sections.push("Business directory: no listing found.".to_string()),
        }
    }

    for (label, category_error) in [
        ("performance", bundle.performance.as_ref().and_then(|c| c.error())),
        ("security", bundle.security.as_ref().and_then(|c| c.error())),
        ("technology", bundle.technology.as_ref().and_then(|c| c.error())),
        ("metadata", bundle.metadata.as_ref().and_then(|c| c.error())),
        ("maps", bundle.maps_presence.as_ref().and_then(|c| c.error())),
    ] {
        if let Some(error) = category_error {
            sections.push(format!("The {} check did not complete: {}.", label, error));
        }
    }

    sections.join("\n")
}
