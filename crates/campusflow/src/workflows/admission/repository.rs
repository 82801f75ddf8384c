use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::stores::{DurableStore, Row, RowKey, StorageError};
use crate::tenants::{TenantDirectory, TenantError};

use super::domain::{
    academic_year_for, AdmissionUpdate, EnrollmentKey, EnrollmentRecord, NewEnrollment,
    PaymentUpdate, DEFAULT_CURRENCY, DEFAULT_DOCUMENT_KIND, DOCUMENTS_VERIFIED, STATUS_CANCELADO,
    STATUS_PENDIENTE, SYSTEM_ACTOR,
};

pub const TABLE_ENROLLMENTS: &str = "enrollments";
/// Query projection keyed by status; kept in step with the base table by
/// this repository because the store has no secondary indexes.
pub const TABLE_ENROLLMENTS_BY_STATUS: &str = "enrollments_by_status";
pub const TABLE_ENROLLMENTS_BY_YEAR: &str = "enrollments_by_year";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("enrollment not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Tenants(#[from] TenantError),
}

fn base_key(key: &EnrollmentKey) -> RowKey {
    RowKey::new()
        .with("institution_id", key.institution_id.as_str())
        .with("email", key.email.as_str())
        .with("career_id", key.career_id.as_str())
}

fn by_status_key(key: &EnrollmentKey, status: &str) -> RowKey {
    RowKey::new()
        .with("institution_id", key.institution_id.as_str())
        .with("enrollment_status", status)
        .with("email", key.email.as_str())
        .with("career_id", key.career_id.as_str())
}

fn by_year_key(key: &EnrollmentKey, year: i32) -> RowKey {
    RowKey::new()
        .with("institution_id", key.institution_id.as_str())
        .with("academic_year", year)
        .with("email", key.email.as_str())
        .with("career_id", key.career_id.as_str())
}

fn encode_record(record: &EnrollmentRecord) -> Result<Row, StorageError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(columns)) => Ok(columns.into_iter().collect()),
        Ok(_) => Err(StorageError::Corrupt(
            "enrollment did not encode to a row".to_string(),
        )),
        Err(error) => Err(StorageError::Corrupt(error.to_string())),
    }
}

fn decode_record(row: Row) -> Result<EnrollmentRecord, StorageError> {
    let object = Value::Object(row.into_iter().collect());
    serde_json::from_value(object).map_err(|error| StorageError::Corrupt(error.to_string()))
}

/// Durable enrollment rows plus their two query projections. All writes go
/// through here so base table and projections never drift.
pub struct EnrollmentRepository {
    durable: Arc<dyn DurableStore>,
    tenants: Arc<dyn TenantDirectory>,
}

impl EnrollmentRepository {
    pub fn new(durable: Arc<dyn DurableStore>, tenants: Arc<dyn TenantDirectory>) -> Self {
        Self { durable, tenants }
    }

    /// Inserts one enrollment, filling every column the caller left out.
    /// When no status is given the institution's workflow decides the
    /// initial stage, with "pendiente" as the last resort.
    pub async fn create(
        &self,
        key: &EnrollmentKey,
        data: NewEnrollment,
    ) -> Result<EnrollmentRecord, RepositoryError> {
        let now = Utc::now();
        let enrollment_status = match data.enrollment_status {
            Some(status) => status,
            None => self.resolve_initial_status(&key.institution_id).await?,
        };
        let academic_year = data.academic_year.unwrap_or_else(|| academic_year_for(now));
        let record = EnrollmentRecord {
            enrollment_id: Uuid::new_v4(),
            institution_id: key.institution_id.clone(),
            email: key.email.clone(),
            career_id: key.career_id.clone(),
            full_name: data.full_name,
            document_kind: data
                .document_kind
                .or_else(|| Some(DEFAULT_DOCUMENT_KIND.to_string())),
            document_id: data.document_id,
            phone: data.phone,
            birth_date: data.birth_date,
            institution_name: data.institution_name,
            career_name: data.career_name,
            career_code: data.career_code,
            career_faculty: data.career_faculty,
            academic_year,
            enrollment_period: data
                .enrollment_period
                .unwrap_or_else(|| format!("{academic_year}-1")),
            enrollment_status,
            enrollment_date: now,
            document_status: STATUS_PENDIENTE.to_string(),
            payment_status: STATUS_PENDIENTE.to_string(),
            prospection_date: data.prospection_date,
            prospection_source: data.prospection_source,
            admission_status: None,
            admission_date: None,
            admission_score: None,
            admission_notes: None,
            payment_amount: None,
            payment_currency: None,
            payment_date: None,
            payment_method: None,
            documents_verified_at: None,
            created_at: now,
            updated_at: now,
            created_by: data.created_by.unwrap_or_else(|| SYSTEM_ACTOR.to_string()),
            updated_by: None,
        };

        let row = encode_record(&record)?;
        self.durable
            .insert(TABLE_ENROLLMENTS, &base_key(key), row.clone())
            .await?;
        self.durable
            .insert(
                TABLE_ENROLLMENTS_BY_STATUS,
                &by_status_key(key, &record.enrollment_status),
                row.clone(),
            )
            .await?;
        self.durable
            .insert(
                TABLE_ENROLLMENTS_BY_YEAR,
                &by_year_key(key, record.academic_year),
                row,
            )
            .await?;
        Ok(record)
    }

    async fn resolve_initial_status(&self, institution_id: &str) -> Result<String, TenantError> {
        let initial = self
            .tenants
            .institution(institution_id)
            .await?
            .and_then(|tenant| tenant.workflow)
            .as_ref()
            .and_then(|workflow| workflow.initial_stage().map(|stage| stage.status_key.clone()));
        Ok(initial.unwrap_or_else(|| STATUS_PENDIENTE.to_string()))
    }

    pub async fn exists(&self, key: &EnrollmentKey) -> Result<bool, RepositoryError> {
        let row = self.durable.fetch(TABLE_ENROLLMENTS, &base_key(key)).await?;
        Ok(row.is_some())
    }

    pub async fn find_one(
        &self,
        key: &EnrollmentKey,
    ) -> Result<Option<EnrollmentRecord>, RepositoryError> {
        let row = self.durable.fetch(TABLE_ENROLLMENTS, &base_key(key)).await?;
        row.map(decode_record).transpose().map_err(Into::into)
    }

    pub async fn find_by_institution(
        &self,
        institution_id: &str,
    ) -> Result<Vec<EnrollmentRecord>, RepositoryError> {
        let partition = RowKey::new().with("institution_id", institution_id);
        self.collect(TABLE_ENROLLMENTS, &partition).await
    }

    pub async fn find_by_institution_and_status(
        &self,
        institution_id: &str,
        status: &str,
    ) -> Result<Vec<EnrollmentRecord>, RepositoryError> {
        let partition = RowKey::new()
            .with("institution_id", institution_id)
            .with("enrollment_status", status);
        self.collect(TABLE_ENROLLMENTS_BY_STATUS, &partition).await
    }

    pub async fn find_by_institution_and_year(
        &self,
        institution_id: &str,
        year: i32,
    ) -> Result<Vec<EnrollmentRecord>, RepositoryError> {
        let partition = RowKey::new()
            .with("institution_id", institution_id)
            .with("academic_year", year);
        self.collect(TABLE_ENROLLMENTS_BY_YEAR, &partition).await
    }

    pub async fn find_by_institution_and_email(
        &self,
        institution_id: &str,
        email: &str,
    ) -> Result<Vec<EnrollmentRecord>, RepositoryError> {
        let partition = RowKey::new()
            .with("institution_id", institution_id)
            .with("email", email);
        self.collect(TABLE_ENROLLMENTS, &partition).await
    }

    async fn collect(
        &self,
        table: &str,
        partition: &RowKey,
    ) -> Result<Vec<EnrollmentRecord>, RepositoryError> {
        let rows = self.durable.scan(table, partition).await?;
        rows.into_iter()
            .map(|row| decode_record(row).map_err(Into::into))
            .collect()
    }

    pub async fn update_status(
        &self,
        key: &EnrollmentKey,
        status: &str,
        actor: &str,
    ) -> Result<EnrollmentRecord, RepositoryError> {
        let status = status.to_string();
        self.apply(key, actor, move |record, _now| {
            record.enrollment_status = status;
        })
        .await
    }

    /// Admission columns change together; the admission date is stamped on
    /// every call, defaulting to now.
    pub async fn update_admission(
        &self,
        key: &EnrollmentKey,
        update: AdmissionUpdate,
        actor: &str,
    ) -> Result<EnrollmentRecord, RepositoryError> {
        self.apply(key, actor, move |record, now| {
            if let Some(status) = update.status {
                record.admission_status = Some(status);
            }
            record.admission_date = Some(update.date.unwrap_or(now));
            if let Some(score) = update.score {
                record.admission_score = Some(score);
            }
            if let Some(notes) = update.notes {
                record.admission_notes = Some(notes);
            }
        })
        .await
    }

    /// Status validation happens in the service; here a move into
    /// "verificado" stamps the verification date and any other status
    /// clears it.
    pub async fn update_document_status(
        &self,
        key: &EnrollmentKey,
        status: &str,
        actor: &str,
    ) -> Result<EnrollmentRecord, RepositoryError> {
        let status = status.to_string();
        self.apply(key, actor, move |record, now| {
            record.documents_verified_at = if status == DOCUMENTS_VERIFIED {
                Some(now)
            } else {
                None
            };
            record.document_status = status;
        })
        .await
    }

    pub async fn update_payment_status(
        &self,
        key: &EnrollmentKey,
        update: PaymentUpdate,
        actor: &str,
    ) -> Result<EnrollmentRecord, RepositoryError> {
        self.apply(key, actor, move |record, now| {
            record.payment_status = update
                .status
                .unwrap_or_else(|| STATUS_PENDIENTE.to_string());
            if let Some(amount) = update.amount {
                record.payment_amount = Some(amount);
            }
            record.payment_currency = Some(
                update
                    .currency
                    .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            );
            record.payment_date = Some(update.date.unwrap_or(now));
            if let Some(method) = update.method {
                record.payment_method = Some(method);
            }
        })
        .await
    }

    /// Soft delete: the row stays queryable under the terminal status.
    pub async fn cancel(
        &self,
        key: &EnrollmentKey,
        actor: &str,
    ) -> Result<EnrollmentRecord, RepositoryError> {
        self.update_status(key, STATUS_CANCELADO, actor).await
    }

    /// Fetch-mutate-rewrite cycle shared by every update. Rewrites the base
    /// row and both projections, relocating the by-status row when the
    /// status changed.
    async fn apply(
        &self,
        key: &EnrollmentKey,
        actor: &str,
        mutate: impl FnOnce(&mut EnrollmentRecord, DateTime<Utc>),
    ) -> Result<EnrollmentRecord, RepositoryError> {
        let row = self
            .durable
            .fetch(TABLE_ENROLLMENTS, &base_key(key))
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let mut record = decode_record(row)?;
        let previous_status = record.enrollment_status.clone();

        let now = Utc::now();
        mutate(&mut record, now);
        record.updated_at = now;
        record.updated_by = Some(actor.to_string());

        let encoded = encode_record(&record)?;
        if !self
            .durable
            .update(TABLE_ENROLLMENTS, &base_key(key), encoded.clone())
            .await?
        {
            return Err(RepositoryError::NotFound);
        }
        if record.enrollment_status != previous_status {
            self.durable
                .remove(
                    TABLE_ENROLLMENTS_BY_STATUS,
                    &by_status_key(key, &previous_status),
                )
                .await?;
        }
        self.durable
            .insert(
                TABLE_ENROLLMENTS_BY_STATUS,
                &by_status_key(key, &record.enrollment_status),
                encoded.clone(),
            )
            .await?;
        self.durable
            .insert(
                TABLE_ENROLLMENTS_BY_YEAR,
                &by_year_key(key, record.academic_year),
                encoded,
            )
            .await?;
        Ok(record)
    }
}
