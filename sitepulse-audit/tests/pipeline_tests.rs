//! Integration tests for the audit pipeline
//!
//! Runs the orchestrator end to end against a real temporary database
//! with scripted stage analyzers, covering partial failure, the
//! pipeline deadline, and caller cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sitepulse_common::db::init_database;
use sitepulse_common::db::settings::set_setting;
use sitepulse_common::events::EventBus;
use sitepulse_common::{AuditTarget, AuditType};

use sitepulse_audit::db::bundles::load_bundle;
use sitepulse_audit::db::runs::list_runs;
use sitepulse_audit::insight::InsightMerger;
use sitepulse_audit::models::reports::{MetadataReport, PerformanceReport, TechnologyReport};
use sitepulse_audit::models::{BundleStatus, RunStatus};
use sitepulse_audit::orchestrator::Orchestrator;
use sitepulse_audit::types::{StageAnalyzer, StageError, StageOutput, StageReport};

struct StubAnalyzer {
    audit_type: AuditType,
    result: Result<StageOutput, StageError>,
    delay: Duration,
    timeout: Duration,
}

impl StubAnalyzer {
    fn ok(output: StageOutput) -> Arc<dyn StageAnalyzer> {
        Arc::new(Self {
            audit_type: output.audit_type(),
            result: Ok(output),
            delay: Duration::ZERO,
            timeout: Duration::from_secs(10),
        })
    }

    fn err(audit_type: AuditType, error: StageError) -> Arc<dyn StageAnalyzer> {
        Arc::new(Self {
            audit_type,
            result: Err(error),
            delay: Duration::ZERO,
            timeout: Duration::from_secs(10),
        })
    }

    fn slow(audit_type: AuditType, delay: Duration) -> Arc<dyn StageAnalyzer> {
        Arc::new(Self {
            audit_type,
            result: Ok(StageOutput::Technology(TechnologyReport::default())),
            delay,
            timeout: Duration::from_secs(60),
        })
    }
}

#[async_trait::async_trait]
impl StageAnalyzer for StubAnalyzer {
    fn audit_type(&self) -> AuditType {
        self.audit_type
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn analyze(&self, _target: &AuditTarget) -> Result<StageReport, StageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.result {
            Ok(output) => Ok(StageReport::new(output.clone())),
            Err(e) => Err(e.clone()),
        }
    }
}

async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
    let tmp = tempfile::tempdir().unwrap();
    let pool = init_database(&tmp.path().join("sitepulse.db")).await.unwrap();
    // Keep transient-error retries fast
    set_setting(&pool, "audit_retry_base_delay_ms", "1").await.unwrap();
    (tmp, pool)
}

/// The documented partial-failure scenario: performance {90, 95},
/// security exhausts its network retries, partial metadata, no business
/// name. Scores come out 92/0/65/64/0 with overall 52.
#[tokio::test]
async fn partial_failure_scores_and_run_log() {
    let (_tmp, pool) = test_pool().await;

    let metadata = MetadataReport {
        title: Some("Acme Bakery - Fresh Bread Daily".to_string()),
        description: Some("Family bakery serving fresh bread.".to_string()),
        h1s: vec!["Welcome".to_string()],
        h2s: Vec::new(),
        open_graph: BTreeMap::new(),
        schema_org: Vec::new(),
        has_robots_txt: true,
        has_sitemap: true,
    };

    let analyzers = vec![
        StubAnalyzer::ok(StageOutput::Performance(PerformanceReport {
            mobile_score: 90,
            desktop_score: 95,
            ..Default::default()
        })),
        StubAnalyzer::err(
            AuditType::Security,
            StageError::Network("connection reset".to_string()),
        ),
        StubAnalyzer::ok(StageOutput::Technology(TechnologyReport::default())),
        StubAnalyzer::ok(StageOutput::Metadata(metadata)),
    ];

    let orchestrator = Orchestrator::new(
        pool.clone(),
        EventBus::new(64),
        analyzers,
        Vec::new(),
        InsightMerger::default(),
    );

    let target = AuditTarget::new("https://example.com", None).unwrap();
    let analysis_id = Uuid::new_v4();
    orchestrator
        .run_with_id(analysis_id, target, CancellationToken::new())
        .await
        .unwrap();

    let bundle = load_bundle(&pool, analysis_id).await.unwrap().unwrap();
    assert_eq!(bundle.status, BundleStatus::Completed);

    // The failed stage left an error placeholder, not a report
    let security = bundle.security.as_ref().unwrap();
    assert!(security.error().unwrap().contains("Network error"));
    assert!(bundle.performance.as_ref().unwrap().report().is_some());

    let scores = bundle.scores.unwrap();
    assert_eq!(scores.performance, 92);
    assert_eq!(scores.security, 0);
    assert_eq!(scores.seo, 65);
    assert_eq!(scores.ux, 64);
    assert_eq!(scores.maps_presence, 0);
    assert_eq!(scores.overall, 52);

    // Security reached the attempt ceiling, siblings finished first try
    let runs = list_runs(&pool, analysis_id).await.unwrap();
    let security_run = runs
        .iter()
        .find(|r| r.audit_type == AuditType::Security)
        .unwrap();
    assert_eq!(security_run.status, RunStatus::Failed);
    assert_eq!(security_run.attempts, 3);

    let performance_run = runs
        .iter()
        .find(|r| r.audit_type == AuditType::Performance)
        .unwrap();
    assert_eq!(performance_run.status, RunStatus::Completed);
    assert_eq!(performance_run.attempts, 1);

    // Low scores produce threshold recommendations
    assert!(!bundle.recommendations.is_empty());
}

#[tokio::test]
async fn pipeline_deadline_times_out_slow_stages() {
    let (_tmp, pool) = test_pool().await;
    set_setting(&pool, "audit_pipeline_deadline_secs", "1").await.unwrap();

    let analyzers = vec![
        StubAnalyzer::ok(StageOutput::Performance(PerformanceReport {
            mobile_score: 80,
            desktop_score: 80,
            ..Default::default()
        })),
        StubAnalyzer::slow(AuditType::Technology, Duration::from_secs(600)),
    ];

    let orchestrator = Orchestrator::new(
        pool.clone(),
        EventBus::new(64),
        analyzers,
        Vec::new(),
        InsightMerger::default(),
    );

    let target = AuditTarget::new("https://example.com", None).unwrap();
    let analysis_id = Uuid::new_v4();
    orchestrator
        .run_with_id(analysis_id, target, CancellationToken::new())
        .await
        .unwrap();

    // The deadline degrades the slow stage; the audit still completes
    let bundle = load_bundle(&pool, analysis_id).await.unwrap().unwrap();
    assert_eq!(bundle.status, BundleStatus::Completed);
    assert!(bundle.technology.as_ref().unwrap().error().is_some());
    assert_eq!(bundle.scores.unwrap().performance, 80);

    let runs = list_runs(&pool, analysis_id).await.unwrap();
    let slow_run = runs
        .iter()
        .find(|r| r.audit_type == AuditType::Technology)
        .unwrap();
    assert_eq!(slow_run.status, RunStatus::Timeout);
}

#[tokio::test]
async fn caller_cancellation_fails_the_audit() {
    let (_tmp, pool) = test_pool().await;

    let analyzers = vec![StubAnalyzer::slow(
        AuditType::Technology,
        Duration::from_secs(600),
    )];

    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let orchestrator = Orchestrator::new(
        pool.clone(),
        bus,
        analyzers,
        Vec::new(),
        InsightMerger::default(),
    );

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_clone.cancel();
    });

    let target = AuditTarget::new("https://example.com", None).unwrap();
    let analysis_id = Uuid::new_v4();
    orchestrator
        .run_with_id(analysis_id, target, cancel)
        .await
        .unwrap();

    let bundle = load_bundle(&pool, analysis_id).await.unwrap().unwrap();
    assert_eq!(bundle.status, BundleStatus::Failed);
    assert_eq!(bundle.error_message.as_deref(), Some("Audit cancelled"));
    assert!(bundle.scores.is_none());

    let runs = list_runs(&pool, analysis_id).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Timeout);

    let mut saw_cancelled = false;
    while let Ok(event) = rx.try_recv() {
        if event.event_type() == "AuditCancelled" {
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled);
}

/// A fully successful audit against the database leaves every run
/// completed and the fallback AI insight when no provider is configured.
#[tokio::test]
async fn successful_audit_persists_complete_bundle() {
    let (_tmp, pool) = test_pool().await;

    let analyzers = vec![
        StubAnalyzer::ok(StageOutput::Performance(PerformanceReport {
            mobile_score: 100,
            desktop_score: 100,
            ..Default::default()
        })),
        StubAnalyzer::ok(StageOutput::Technology(TechnologyReport::default())),
    ];

    let orchestrator = Orchestrator::new(
        pool.clone(),
        EventBus::new(64),
        analyzers,
        Vec::new(),
        InsightMerger::default(),
    );

    let target = AuditTarget::new("https://example.com", None).unwrap();
    let analysis_id = Uuid::new_v4();
    orchestrator
        .run_with_id(analysis_id, target, CancellationToken::new())
        .await
        .unwrap();

    let bundle = load_bundle(&pool, analysis_id).await.unwrap().unwrap();
    assert_eq!(bundle.status, BundleStatus::Completed);
    assert!(bundle.total_analysis_time_seconds.is_some());

    let insight = bundle.ai_insight.unwrap();
    assert_eq!(insight.providers_count, 0);
    assert_eq!(insight.provider_label, "none");

    let runs = list_runs(&pool, analysis_id).await.unwrap();
    // Two stage runs plus the AI run
    assert_eq!(runs.len(), 3);
}
