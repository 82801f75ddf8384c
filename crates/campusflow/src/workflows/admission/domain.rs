use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cache key prefix reserved for prospection entries. The intake writes under
/// it and the worker scans exactly it; counters live under a disjoint prefix
/// so a scan can never pick them up.
pub const PROSPECTION_KEY_PREFIX: &str = "prospection:";
pub const PROSPECTION_COUNTER_KEY: &str = "counter:prospections";

pub fn prospection_key(email: &str) -> String {
    format!("{PROSPECTION_KEY_PREFIX}{email}")
}

pub fn institution_counter_key(institution_id: &str) -> String {
    format!("counter:institution:{institution_id}")
}

/// Status key the worker assigns when an institution's workflow yields no
/// resolvable initial stage.
pub const STATUS_INTERESADO: &str = "interesado";
/// Status key for fields that start unset and for repository-level fallback.
pub const STATUS_PENDIENTE: &str = "pendiente";
/// Terminal status used by soft cancellation.
pub const STATUS_CANCELADO: &str = "cancelado";
/// Document status that stamps the verification date.
pub const DOCUMENTS_VERIFIED: &str = "verificado";

pub const DOCUMENT_STATUSES: [&str; 4] = ["pendiente", "incompleto", "completo", "verificado"];

pub const DEFAULT_CURRENCY: &str = "ARS";
pub const DEFAULT_DOCUMENT_KIND: &str = "DNI";

pub const SYSTEM_ACTOR: &str = "system";
pub const WORKER_ACTOR: &str = "system_worker";

/// Calendar year used for `academic_year` defaults.
pub fn academic_year_for(at: DateTime<Utc>) -> i32 {
    at.year()
}

/// Enrollment period `{year}-{semester}`: semester 1 covers January through
/// June, semester 2 the rest.
pub fn enrollment_period_for(at: DateTime<Utc>) -> String {
    let semester = if at.month() <= 6 { 1 } else { 2 };
    format!("{}-{}", at.year(), semester)
}

/// Short-lived declaration of interest, stored as JSON in the cache under
/// [`prospection_key`] until the worker promotes or the TTL reaps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectionRecord {
    pub email: String,
    pub full_name: String,
    pub institution_id: String,
    pub career_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "web".to_string()
}

/// Identity triple every enrollment row is keyed by. Uniqueness is
/// approximated by an existence check before insert; the durable store has
/// no native constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentKey {
    pub institution_id: String,
    pub email: String,
    pub career_id: String,
}

impl EnrollmentKey {
    pub fn new(institution_id: &str, email: &str, career_id: &str) -> Self {
        Self {
            institution_id: institution_id.to_string(),
            email: email.to_string(),
            career_id: career_id.to_string(),
        }
    }
}

impl std::fmt::Display for EnrollmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.institution_id, self.email, self.career_id
        )
    }
}

/// One durable enrollment row. Flat on purpose: the column layout of the
/// backing table, optional columns stay absent rather than null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub enrollment_id: Uuid,
    pub institution_id: String,
    pub email: String,
    pub career_id: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub career_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub career_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub career_faculty: Option<String>,
    pub academic_year: i32,
    pub enrollment_period: String,
    pub enrollment_status: String,
    pub enrollment_date: DateTime<Utc>,
    pub document_status: String,
    pub payment_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prospection_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prospection_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl EnrollmentRecord {
    pub fn key(&self) -> EnrollmentKey {
        EnrollmentKey::new(&self.institution_id, &self.email, &self.career_id)
    }

    pub fn status_view(&self) -> EnrollmentStatusView {
        EnrollmentStatusView {
            institution_id: self.institution_id.clone(),
            email: self.email.clone(),
            career_id: self.career_id.clone(),
            career_name: self.career_name.clone(),
            full_name: self.full_name.clone(),
            enrollment_status: self.enrollment_status.clone(),
            document_status: self.document_status.clone(),
            payment_status: self.payment_status.clone(),
            academic_year: self.academic_year,
            enrollment_period: self.enrollment_period.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Trimmed projection of an enrollment for listings and transition
/// responses.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentStatusView {
    pub institution_id: String,
    pub email: String,
    pub career_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub career_name: Option<String>,
    pub full_name: String,
    pub enrollment_status: String,
    pub document_status: String,
    pub payment_status: String,
    pub academic_year: i32,
    pub enrollment_period: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating one enrollment row. Everything optional is defaulted
/// by the repository.
#[derive(Debug, Clone, Default)]
pub struct NewEnrollment {
    pub full_name: String,
    pub document_kind: Option<String>,
    pub document_id: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub institution_name: Option<String>,
    pub career_name: Option<String>,
    pub career_code: Option<String>,
    pub career_faculty: Option<String>,
    pub academic_year: Option<i32>,
    pub enrollment_period: Option<String>,
    pub enrollment_status: Option<String>,
    pub prospection_date: Option<DateTime<Utc>>,
    pub prospection_source: Option<String>,
    pub created_by: Option<String>,
}

/// Partial admission update; absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct AdmissionUpdate {
    pub status: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub notes: Option<String>,
}

/// Payment update; status defaults to "pendiente" and currency to
/// [`DEFAULT_CURRENCY`] when absent.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub status: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub method: Option<String>,
}
