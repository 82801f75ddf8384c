//! The admission workflow: cached prospections are reconciled into durable
//! enrollment rows, which then move through each institution's configured
//! stage graph.

pub mod domain;
pub mod mirror;
pub mod reconciliation;
pub mod repository;
pub mod service;
pub mod stages;

pub use domain::{
    academic_year_for, enrollment_period_for, institution_counter_key, prospection_key,
    AdmissionUpdate, EnrollmentKey, EnrollmentRecord, EnrollmentStatusView, NewEnrollment,
    PaymentUpdate, ProspectionRecord, DOCUMENT_STATUSES, PROSPECTION_COUNTER_KEY,
    PROSPECTION_KEY_PREFIX,
};
pub use mirror::{GraphMirror, MirrorOutcome};
pub use reconciliation::{ReconciliationWorker, RunError, RunReport, WorkerStatsView};
pub use repository::{EnrollmentRepository, RepositoryError};
pub use service::{
    AdmissionService, AdmissionServiceError, InstitutionStatistics, IntakeStatistics,
    ProspectionIntake, ProspectionReceipt, StageAdvance, StageCount,
};
pub use stages::{
    StageDefinition, StageSummary, TransitionDenial, TransitionGrant, WorkflowDefinition,
};
