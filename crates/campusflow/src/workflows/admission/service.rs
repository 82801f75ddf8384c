use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::stores::{CacheError, CacheStore, StorageError};
use crate::tenants::{TenantConfig, TenantDirectory, TenantError};

use super::domain::{
    institution_counter_key, prospection_key, AdmissionUpdate, EnrollmentKey, EnrollmentRecord,
    NewEnrollment, PaymentUpdate, ProspectionRecord, DOCUMENT_STATUSES, PROSPECTION_COUNTER_KEY,
    PROSPECTION_KEY_PREFIX,
};
use super::mirror::GraphMirror;
use super::repository::{EnrollmentRepository, RepositoryError};
use super::stages::{TransitionDenial, TransitionGrant};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionServiceError {
    #[error("institution '{institution_id}' is not onboarded")]
    InstitutionNotFound { institution_id: String },
    #[error("career '{career_id}' does not exist at institution '{institution_id}'")]
    CareerNotFound {
        institution_id: String,
        career_id: String,
    },
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error("an enrollment already exists for {key}")]
    DuplicateEnrollment { key: EnrollmentKey },
    #[error("a prospection is already registered for '{email}'")]
    DuplicateProspection { email: String },
    #[error(
        "document status '{status}' is not accepted, expected one of: pendiente, incompleto, completo, verificado"
    )]
    UnknownDocumentStatus { status: String },
    #[error(transparent)]
    Transition(#[from] TransitionDenial),
    #[error("prospection payload could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Tenants(#[from] TenantError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<RepositoryError> for AdmissionServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound => AdmissionServiceError::EnrollmentNotFound,
            RepositoryError::Storage(error) => AdmissionServiceError::Storage(error),
            RepositoryError::Tenants(error) => AdmissionServiceError::Tenants(error),
        }
    }
}

/// Result of a granted stage transition, ready for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct StageAdvance {
    pub enrollment: EnrollmentRecord,
    pub transition: TransitionGrant,
    pub updated_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageCount {
    pub stage_id: u32,
    pub status_key: String,
    pub name: String,
    pub count: u64,
}

/// Enrollment counts for one institution, grouped by raw status and, when a
/// workflow is configured, by its stages in definition order.
#[derive(Debug, Clone, Serialize)]
pub struct InstitutionStatistics {
    pub institution_id: String,
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_stage: Option<Vec<StageCount>>,
}

/// Application service for enrollment rows: validates against tenant
/// configuration, writes through the repository and mirrors to the graph on
/// a best-effort basis.
pub struct AdmissionService {
    repository: Arc<EnrollmentRepository>,
    tenants: Arc<dyn TenantDirectory>,
    mirror: GraphMirror,
}

impl AdmissionService {
    pub fn new(
        repository: Arc<EnrollmentRepository>,
        tenants: Arc<dyn TenantDirectory>,
        mirror: GraphMirror,
    ) -> Self {
        Self {
            repository,
            tenants,
            mirror,
        }
    }

    async fn require_tenant(
        &self,
        institution_id: &str,
    ) -> Result<TenantConfig, AdmissionServiceError> {
        self.tenants
            .institution(institution_id)
            .await?
            .ok_or_else(|| AdmissionServiceError::InstitutionNotFound {
                institution_id: institution_id.to_string(),
            })
    }

    /// Creates an enrollment directly, outside the reconciliation path.
    /// Institution and career must exist; duplicates are refused before the
    /// write. Career catalog data is denormalized onto the row unless the
    /// caller already supplied it.
    pub async fn create_enrollment(
        &self,
        key: &EnrollmentKey,
        mut data: NewEnrollment,
    ) -> Result<EnrollmentRecord, AdmissionServiceError> {
        let tenant = self.require_tenant(&key.institution_id).await?;
        let career = tenant.career(&key.career_id).ok_or_else(|| {
            AdmissionServiceError::CareerNotFound {
                institution_id: key.institution_id.clone(),
                career_id: key.career_id.clone(),
            }
        })?;

        if self.repository.exists(key).await? {
            return Err(AdmissionServiceError::DuplicateEnrollment { key: key.clone() });
        }

        if data.institution_name.is_none() {
            data.institution_name = Some(tenant.profile.name.clone());
        }
        if data.career_name.is_none() {
            data.career_name = Some(career.name.clone());
        }
        if data.career_code.is_none() {
            data.career_code = career.code.clone();
        }
        if data.career_faculty.is_none() {
            data.career_faculty = career.faculty.clone();
        }

        let record = self.repository.create(key, data).await?;
        self.mirror.mirror_interest(&record, &tenant).await;
        tracing::info!(
            institution = %record.institution_id,
            email = %record.email,
            career = %record.career_id,
            status = %record.enrollment_status,
            "enrollment created"
        );
        Ok(record)
    }

    pub async fn enrollment(
        &self,
        key: &EnrollmentKey,
    ) -> Result<EnrollmentRecord, AdmissionServiceError> {
        self.repository
            .find_one(key)
            .await?
            .ok_or(AdmissionServiceError::EnrollmentNotFound)
    }

    pub async fn enrollments_by_institution(
        &self,
        institution_id: &str,
    ) -> Result<Vec<EnrollmentRecord>, AdmissionServiceError> {
        Ok(self.repository.find_by_institution(institution_id).await?)
    }

    pub async fn enrollments_by_status(
        &self,
        institution_id: &str,
        status: &str,
    ) -> Result<Vec<EnrollmentRecord>, AdmissionServiceError> {
        Ok(self
            .repository
            .find_by_institution_and_status(institution_id, status)
            .await?)
    }

    pub async fn enrollments_by_year(
        &self,
        institution_id: &str,
        year: i32,
    ) -> Result<Vec<EnrollmentRecord>, AdmissionServiceError> {
        Ok(self
            .repository
            .find_by_institution_and_year(institution_id, year)
            .await?)
    }

    pub async fn enrollments_by_email(
        &self,
        institution_id: &str,
        email: &str,
    ) -> Result<Vec<EnrollmentRecord>, AdmissionServiceError> {
        Ok(self
            .repository
            .find_by_institution_and_email(institution_id, email)
            .await?)
    }

    /// Moves an enrollment along its institution's workflow. The transition
    /// is validated against the workflow definition before anything is
    /// written; optional notes land on the admission columns and the graph
    /// is refreshed best-effort afterwards.
    pub async fn advance_stage(
        &self,
        key: &EnrollmentKey,
        target_stage_id: u32,
        actor_role: &str,
        actor: &str,
        notes: Option<String>,
    ) -> Result<StageAdvance, AdmissionServiceError> {
        let tenant = self.require_tenant(&key.institution_id).await?;
        let workflow = tenant
            .workflow
            .as_ref()
            .ok_or(TransitionDenial::NoWorkflowConfigured)?;

        let record = self.enrollment(key).await?;
        let grant =
            workflow.validate_transition(&record.enrollment_status, target_stage_id, actor_role)?;

        let mut updated = self
            .repository
            .update_status(key, &grant.to.status_key, actor)
            .await?;
        if let Some(notes) = notes {
            updated = self
                .repository
                .update_admission(
                    key,
                    AdmissionUpdate {
                        notes: Some(notes),
                        ..AdmissionUpdate::default()
                    },
                    actor,
                )
                .await?;
        }

        self.mirror.mirror_status(&updated, &grant.to.name).await;
        tracing::info!(
            institution = %key.institution_id,
            email = %key.email,
            from = %grant.from.status_key,
            to = %grant.to.status_key,
            actor = %actor,
            "enrollment advanced"
        );

        Ok(StageAdvance {
            enrollment: updated,
            transition: grant,
            updated_by: actor.to_string(),
        })
    }

    pub async fn update_documents(
        &self,
        key: &EnrollmentKey,
        status: &str,
        actor: &str,
    ) -> Result<EnrollmentRecord, AdmissionServiceError> {
        if !DOCUMENT_STATUSES.contains(&status) {
            return Err(AdmissionServiceError::UnknownDocumentStatus {
                status: status.to_string(),
            });
        }
        Ok(self
            .repository
            .update_document_status(key, status, actor)
            .await?)
    }

    pub async fn update_payment(
        &self,
        key: &EnrollmentKey,
        update: PaymentUpdate,
        actor: &str,
    ) -> Result<EnrollmentRecord, AdmissionServiceError> {
        Ok(self
            .repository
            .update_payment_status(key, update, actor)
            .await?)
    }

    pub async fn update_admission(
        &self,
        key: &EnrollmentKey,
        update: AdmissionUpdate,
        actor: &str,
    ) -> Result<EnrollmentRecord, AdmissionServiceError> {
        Ok(self.repository.update_admission(key, update, actor).await?)
    }

    pub async fn cancel(
        &self,
        key: &EnrollmentKey,
        actor: &str,
    ) -> Result<EnrollmentRecord, AdmissionServiceError> {
        let record = self.repository.cancel(key, actor).await?;
        tracing::info!(
            institution = %key.institution_id,
            email = %key.email,
            "enrollment cancelled"
        );
        Ok(record)
    }

    pub async fn statistics(
        &self,
        institution_id: &str,
    ) -> Result<InstitutionStatistics, AdmissionServiceError> {
        let tenant = self.require_tenant(institution_id).await?;
        let records = self.repository.find_by_institution(institution_id).await?;

        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        for record in &records {
            *by_status.entry(record.enrollment_status.clone()).or_default() += 1;
        }

        let by_stage = tenant.workflow.as_ref().map(|workflow| {
            workflow
                .stages
                .iter()
                .map(|stage| StageCount {
                    stage_id: stage.stage_id,
                    status_key: stage.status_key.clone(),
                    name: stage.name.clone(),
                    count: by_status.get(&stage.status_key).copied().unwrap_or(0),
                })
                .collect()
        });

        Ok(InstitutionStatistics {
            institution_id: institution_id.to_string(),
            total: records.len() as u64,
            by_status,
            by_stage,
        })
    }
}

/// Acknowledgement returned to the caller who registered a prospection.
#[derive(Debug, Clone, Serialize)]
pub struct ProspectionReceipt {
    pub email: String,
    pub institution_id: String,
    pub career_id: String,
    pub ttl_seconds: u64,
    pub total_registered: i64,
    pub institution_registered: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeStatistics {
    /// Entries currently waiting in the cache.
    pub pending: u64,
    /// Monotonic intake counter, unaffected by TTL expiry.
    pub total_registered: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_registered: Option<i64>,
}

/// Front door for new prospections: validates them against tenant
/// configuration, parks them in the cache under a TTL and bumps the intake
/// counters. Promotion to durable rows is the reconciliation worker's job.
pub struct ProspectionIntake {
    cache: Arc<dyn CacheStore>,
    tenants: Arc<dyn TenantDirectory>,
    ttl: Duration,
}

impl ProspectionIntake {
    pub fn new(cache: Arc<dyn CacheStore>, tenants: Arc<dyn TenantDirectory>, ttl: Duration) -> Self {
        Self { cache, tenants, ttl }
    }

    /// An email whose entry is still cached is refused; the address frees up
    /// once the worker promotes it or the TTL reaps it.
    pub async fn register(
        &self,
        record: ProspectionRecord,
    ) -> Result<ProspectionReceipt, AdmissionServiceError> {
        let key = prospection_key(&record.email);
        if self.cache.get(&key).await?.is_some() {
            return Err(AdmissionServiceError::DuplicateProspection {
                email: record.email,
            });
        }

        let tenant = self
            .tenants
            .institution(&record.institution_id)
            .await?
            .ok_or_else(|| AdmissionServiceError::InstitutionNotFound {
                institution_id: record.institution_id.clone(),
            })?;
        tenant.career(&record.career_id).ok_or_else(|| {
            AdmissionServiceError::CareerNotFound {
                institution_id: record.institution_id.clone(),
                career_id: record.career_id.clone(),
            }
        })?;

        let payload = serde_json::to_string(&record)?;
        self.cache.put(&key, payload, Some(self.ttl)).await?;
        let total_registered = self.cache.increment(PROSPECTION_COUNTER_KEY).await?;
        let institution_registered = self
            .cache
            .increment(&institution_counter_key(&record.institution_id))
            .await?;

        tracing::info!(
            email = %record.email,
            institution = %record.institution_id,
            career = %record.career_id,
            "prospection registered"
        );
        Ok(ProspectionReceipt {
            email: record.email,
            institution_id: record.institution_id,
            career_id: record.career_id,
            ttl_seconds: self.ttl.as_secs(),
            total_registered,
            institution_registered,
        })
    }

    /// Unparseable cached entries read as absent; they stay in the cache
    /// until their TTL reaps them.
    pub async fn fetch(
        &self,
        email: &str,
    ) -> Result<Option<ProspectionRecord>, AdmissionServiceError> {
        let Some(raw) = self.cache.get(&prospection_key(email)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                tracing::warn!(%email, %error, "cached prospection is not parseable");
                Ok(None)
            }
        }
    }

    pub async fn statistics(
        &self,
        institution_id: Option<&str>,
    ) -> Result<IntakeStatistics, AdmissionServiceError> {
        let pending = self.cache.scan_keys(PROSPECTION_KEY_PREFIX).await?.len() as u64;
        let total_registered = self.counter_value(PROSPECTION_COUNTER_KEY).await?;
        let institution_registered = match institution_id {
            Some(institution_id) => {
                Some(self.counter_value(&institution_counter_key(institution_id)).await?)
            }
            None => None,
        };
        Ok(IntakeStatistics {
            pending,
            total_registered,
            institution_registered,
        })
    }

    async fn counter_value(&self, key: &str) -> Result<i64, AdmissionServiceError> {
        Ok(self
            .cache
            .get(key)
            .await?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }
}
