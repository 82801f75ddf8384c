use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::WorkerSettings;
use crate::stores::{CacheError, CacheStore};
use crate::tenants::{TenantDirectory, TenantError};

use super::domain::{
    academic_year_for, enrollment_period_for, EnrollmentKey, NewEnrollment, ProspectionRecord,
    PROSPECTION_KEY_PREFIX, STATUS_INTERESADO, WORKER_ACTOR,
};
use super::mirror::{GraphMirror, MirrorOutcome};
use super::repository::{EnrollmentRepository, RepositoryError};

/// One prospection that could not be promoted. Its cache key is kept so the
/// entry survives until the next cycle or its TTL.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub key: String,
    pub email: String,
    pub reason: String,
}

/// Outcome of a single reconciliation cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Prospection keys found by the scan.
    pub scanned: usize,
    /// Records actually examined after fetch and parse.
    pub processed: u64,
    pub created: u64,
    pub skipped: u64,
    pub errors: u64,
    pub graph_synced: u64,
    pub graph_errors: u64,
    pub deleted: u64,
    pub error_details: Vec<RunError>,
}

#[derive(Debug, Clone, Copy, Default)]
struct WorkerStats {
    total_processed: u64,
    total_created: u64,
    total_skipped: u64,
    total_errors: u64,
    total_graph_synced: u64,
    total_graph_errors: u64,
    last_run_time: Option<DateTime<Utc>>,
    last_run_duration_ms: u64,
}

/// Cumulative worker counters plus the live state, as exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatsView {
    pub total_processed: u64,
    pub total_created: u64,
    pub total_skipped: u64,
    pub total_errors: u64,
    pub total_graph_synced: u64,
    pub total_graph_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_run_duration_ms: u64,
    pub is_running: bool,
    pub interval_seconds: u64,
    pub batch_size: usize,
}

/// Infrastructure failure that invalidates the rest of the current batch.
/// The run logs it and moves on to the next batch.
#[derive(Debug, thiserror::Error)]
enum BatchError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Tenants(#[from] TenantError),
}

enum Promotion {
    Created { graph: MirrorOutcome },
    AlreadyEnrolled,
}

enum PromotionError {
    /// Tenant configuration rejects this record permanently. The key is
    /// retained so the entry stays inspectable until its TTL.
    Configuration(String),
    Batch(BatchError),
}

/// Background worker promoting cached prospections into durable enrollment
/// rows. Runs are serialized through an atomic guard, so the periodic loop
/// and manual triggers can never overlap.
pub struct ReconciliationWorker {
    cache: Arc<dyn CacheStore>,
    repository: Arc<EnrollmentRepository>,
    tenants: Arc<dyn TenantDirectory>,
    mirror: GraphMirror,
    settings: WorkerSettings,
    running: AtomicBool,
    shutdown: Notify,
    stats: Mutex<WorkerStats>,
}

impl ReconciliationWorker {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        repository: Arc<EnrollmentRepository>,
        tenants: Arc<dyn TenantDirectory>,
        mirror: GraphMirror,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            cache,
            repository,
            tenants,
            mirror,
            settings,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            stats: Mutex::new(WorkerStats::default()),
        }
    }

    /// Starts the periodic loop: one immediate cycle, then one every
    /// configured interval until [`stop`](Self::stop) is called. With the
    /// worker disabled by configuration the returned task finishes at once.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        if !self.settings.enabled {
            tracing::info!("reconciliation worker disabled by configuration");
            return tokio::spawn(async {});
        }

        tracing::info!(
            interval_seconds = self.settings.interval_seconds,
            batch_size = self.settings.batch_size,
            "reconciliation worker starting"
        );
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.settings.interval());
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        self.run_once().await;
                    }
                    _ = self.shutdown.notified() => break,
                }
            }
            tracing::info!("reconciliation worker stopped");
        })
    }

    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Spawns a single cycle without waiting for the timer. The handle
    /// resolves to `None` when a cycle was already in flight.
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<Option<RunReport>> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run_once().await })
    }

    /// Executes one cycle unless another one holds the guard. Counters and
    /// run timestamps are folded into the cumulative stats afterwards, also
    /// for runs that found nothing.
    pub async fn run_once(&self) -> Option<RunReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("reconciliation cycle already in flight, skipping");
            return None;
        }

        let started_at = Utc::now();
        let timer = Instant::now();
        let report = self.execute().await;
        let duration_ms = timer.elapsed().as_millis() as u64;

        {
            let mut stats = self.stats.lock().await;
            stats.total_processed += report.processed;
            stats.total_created += report.created;
            stats.total_skipped += report.skipped;
            stats.total_errors += report.errors;
            stats.total_graph_synced += report.graph_synced;
            stats.total_graph_errors += report.graph_errors;
            stats.last_run_time = Some(started_at);
            stats.last_run_duration_ms = duration_ms;
        }
        tracing::info!(
            scanned = report.scanned,
            processed = report.processed,
            created = report.created,
            skipped = report.skipped,
            errors = report.errors,
            graph_synced = report.graph_synced,
            graph_errors = report.graph_errors,
            deleted = report.deleted,
            duration_ms,
            "reconciliation cycle finished"
        );

        self.running.store(false, Ordering::SeqCst);
        Some(report)
    }

    pub async fn stats(&self) -> WorkerStatsView {
        let stats = self.stats.lock().await;
        WorkerStatsView {
            total_processed: stats.total_processed,
            total_created: stats.total_created,
            total_skipped: stats.total_skipped,
            total_errors: stats.total_errors,
            total_graph_synced: stats.total_graph_synced,
            total_graph_errors: stats.total_graph_errors,
            last_run_time: stats.last_run_time,
            last_run_duration_ms: stats.last_run_duration_ms,
            is_running: self.running.load(Ordering::SeqCst),
            interval_seconds: self.settings.interval_seconds,
            batch_size: self.settings.batch_size,
        }
    }

    async fn execute(&self) -> RunReport {
        let mut report = RunReport::default();

        let keys = match self.cache.scan_keys(PROSPECTION_KEY_PREFIX).await {
            Ok(keys) => keys,
            Err(error) => {
                tracing::error!(%error, "prospection scan failed, aborting cycle");
                return report;
            }
        };
        report.scanned = keys.len();
        if keys.is_empty() {
            tracing::debug!("no prospections waiting");
            return report;
        }
        tracing::info!(waiting = keys.len(), "promoting cached prospections");

        for batch in keys.chunks(self.settings.batch_size) {
            if let Err(error) = self.process_batch(batch, &mut report).await {
                tracing::error!(%error, "batch aborted, continuing with the next one");
            }
        }
        report
    }

    /// Processes one batch of cache keys. Each key stays paired with the
    /// record fetched from it, so a retained key always belongs to the
    /// record that failed.
    async fn process_batch(
        &self,
        keys: &[String],
        report: &mut RunReport,
    ) -> Result<(), BatchError> {
        let mut pending: Vec<(String, ProspectionRecord)> = Vec::with_capacity(keys.len());
        for key in keys {
            match self.cache.get(key).await? {
                None => {
                    tracing::debug!(%key, "prospection expired between scan and fetch");
                }
                Some(raw) => match serde_json::from_str::<ProspectionRecord>(&raw) {
                    Ok(record) => pending.push((key.clone(), record)),
                    Err(error) => {
                        tracing::warn!(%key, %error, "unparseable prospection left to its ttl");
                    }
                },
            }
        }

        let mut completed: Vec<&String> = Vec::with_capacity(pending.len());
        for (key, record) in &pending {
            report.processed += 1;
            match self.promote(record).await {
                Ok(Promotion::Created { graph }) => {
                    report.created += 1;
                    match graph {
                        MirrorOutcome::Mirrored => report.graph_synced += 1,
                        MirrorOutcome::Failed => report.graph_errors += 1,
                        MirrorOutcome::Skipped => {}
                    }
                    completed.push(key);
                }
                Ok(Promotion::AlreadyEnrolled) => {
                    tracing::debug!(email = %record.email, "enrollment already exists, skipping");
                    report.skipped += 1;
                    completed.push(key);
                }
                Err(PromotionError::Configuration(reason)) => {
                    tracing::warn!(%key, email = %record.email, %reason, "prospection rejected");
                    report.errors += 1;
                    report.error_details.push(RunError {
                        key: key.clone(),
                        email: record.email.clone(),
                        reason,
                    });
                }
                Err(PromotionError::Batch(error)) => {
                    self.delete_keys(&completed, report).await;
                    return Err(error);
                }
            }
        }

        self.delete_keys(&completed, report).await;
        Ok(())
    }

    /// Removes keys whose records were promoted or found redundant. Failed
    /// records keep their keys; a delete failure is only logged because the
    /// next cycle will skip the row anyway.
    async fn delete_keys(&self, keys: &[&String], report: &mut RunReport) {
        for key in keys {
            match self.cache.delete(key).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%key, %error, "processed prospection could not be deleted");
                }
            }
        }
    }

    async fn promote(&self, record: &ProspectionRecord) -> Result<Promotion, PromotionError> {
        let tenant = self
            .tenants
            .institution(&record.institution_id)
            .await
            .map_err(|error| PromotionError::Batch(error.into()))?
            .ok_or_else(|| {
                PromotionError::Configuration(format!(
                    "institution '{}' is not onboarded",
                    record.institution_id
                ))
            })?;
        let career = tenant.career(&record.career_id).ok_or_else(|| {
            PromotionError::Configuration(format!(
                "career '{}' does not exist at institution '{}'",
                record.career_id, record.institution_id
            ))
        })?;

        let key = EnrollmentKey::new(&record.institution_id, &record.email, &record.career_id);
        if self
            .repository
            .exists(&key)
            .await
            .map_err(|error| PromotionError::Batch(error.into()))?
        {
            return Ok(Promotion::AlreadyEnrolled);
        }

        let initial_status = tenant
            .workflow
            .as_ref()
            .and_then(|workflow| workflow.initial_stage())
            .map(|stage| stage.status_key.clone())
            .unwrap_or_else(|| STATUS_INTERESADO.to_string());
        let now = Utc::now();

        let created = self
            .repository
            .create(
                &key,
                NewEnrollment {
                    full_name: record.full_name.clone(),
                    document_id: record.document_id.clone(),
                    phone: record.phone.clone(),
                    institution_name: Some(tenant.profile.name.clone()),
                    career_name: Some(career.name.clone()),
                    career_code: career.code.clone(),
                    career_faculty: career.faculty.clone(),
                    academic_year: Some(academic_year_for(now)),
                    enrollment_period: Some(enrollment_period_for(now)),
                    enrollment_status: Some(initial_status),
                    prospection_date: Some(record.submitted_at),
                    prospection_source: Some(record.source.clone()),
                    created_by: Some(WORKER_ACTOR.to_string()),
                    ..NewEnrollment::default()
                },
            )
            .await
            .map_err(|error| PromotionError::Batch(error.into()))?;
        tracing::info!(
            email = %created.email,
            institution = %created.institution_id,
            career = %created.career_id,
            status = %created.enrollment_status,
            "prospection promoted to enrollment"
        );

        let graph = self.mirror.mirror_interest(&created, &tenant).await;
        Ok(Promotion::Created { graph })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{InMemoryCacheStore, InMemoryDurableStore, InMemoryGraphStore};
    use crate::tenants::InMemoryTenantDirectory;

    fn worker() -> Arc<ReconciliationWorker> {
        let cache = Arc::new(InMemoryCacheStore::new());
        let tenants = Arc::new(InMemoryTenantDirectory::new());
        let repository = Arc::new(EnrollmentRepository::new(
            Arc::new(InMemoryDurableStore::new()),
            Arc::clone(&tenants) as Arc<dyn TenantDirectory>,
        ));
        Arc::new(ReconciliationWorker::new(
            cache,
            repository,
            tenants,
            GraphMirror::new(Arc::new(InMemoryGraphStore::new())),
            WorkerSettings::default(),
        ))
    }

    #[tokio::test]
    async fn concurrent_cycles_are_refused_by_the_guard() {
        let worker = worker();
        worker.running.store(true, Ordering::SeqCst);
        assert!(worker.run_once().await.is_none());

        worker.running.store(false, Ordering::SeqCst);
        assert!(worker.run_once().await.is_some());
    }

    #[tokio::test]
    async fn empty_cache_still_stamps_the_run() {
        let worker = worker();
        let report = worker.run_once().await.expect("cycle ran");
        assert_eq!(report.scanned, 0);
        assert_eq!(report.processed, 0);

        let stats = worker.stats().await;
        assert!(stats.last_run_time.is_some());
        assert!(!stats.is_running);
        assert_eq!(stats.interval_seconds, 900);
        assert_eq!(stats.batch_size, 100);
    }

    #[tokio::test]
    async fn disabled_worker_spawns_a_finished_task() {
        let cache = Arc::new(InMemoryCacheStore::new());
        let tenants = Arc::new(InMemoryTenantDirectory::new());
        let repository = Arc::new(EnrollmentRepository::new(
            Arc::new(InMemoryDurableStore::new()),
            Arc::clone(&tenants) as Arc<dyn TenantDirectory>,
        ));
        let worker = Arc::new(ReconciliationWorker::new(
            cache,
            repository,
            tenants,
            GraphMirror::new(Arc::new(InMemoryGraphStore::new())),
            WorkerSettings {
                enabled: false,
                ..WorkerSettings::default()
            },
        ));

        worker.spawn().await.expect("task joins cleanly");
    }
}
