use std::sync::Arc;

use crate::stores::{GraphStore, GraphUpdate, InterestSnapshot};
use crate::tenants::TenantConfig;

use super::domain::EnrollmentRecord;

/// What happened to one mirroring attempt. The graph is a read model, so
/// `Failed` is reported to the caller for counting but never bubbles up as
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    Mirrored,
    /// The enrollment has no document id, so there is no person key to
    /// anchor the graph on.
    Skipped,
    Failed,
}

/// Pushes enrollment state into the interest graph without ever failing the
/// write path that triggered it.
#[derive(Clone)]
pub struct GraphMirror {
    graph: Arc<dyn GraphStore>,
}

impl GraphMirror {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Mirrors a freshly created enrollment as Person/Institution/Career
    /// nodes plus their interest relationships.
    pub async fn mirror_interest(
        &self,
        record: &EnrollmentRecord,
        tenant: &TenantConfig,
    ) -> MirrorOutcome {
        let Some(snapshot) = interest_snapshot(record, tenant) else {
            tracing::debug!(
                email = %record.email,
                institution = %record.institution_id,
                "graph mirror skipped, enrollment has no document id"
            );
            return MirrorOutcome::Skipped;
        };

        match self.graph.upsert_interest(&snapshot).await {
            Ok(()) => MirrorOutcome::Mirrored,
            Err(error) => {
                tracing::warn!(
                    email = %record.email,
                    institution = %record.institution_id,
                    %error,
                    "graph mirror failed for new enrollment"
                );
                MirrorOutcome::Failed
            }
        }
    }

    /// Refreshes the status and stage recorded on the Person→Institution
    /// relationship after a stage transition.
    pub async fn mirror_status(&self, record: &EnrollmentRecord, stage_name: &str) -> MirrorOutcome {
        let Some(person_key) = record.document_id.as_deref() else {
            tracing::debug!(
                email = %record.email,
                institution = %record.institution_id,
                "graph status mirror skipped, enrollment has no document id"
            );
            return MirrorOutcome::Skipped;
        };

        match self
            .graph
            .update_interest_status(
                person_key,
                &record.institution_id,
                &record.enrollment_status,
                stage_name,
            )
            .await
        {
            Ok(GraphUpdate::Applied) => MirrorOutcome::Mirrored,
            Ok(GraphUpdate::NoMatch) => {
                tracing::info!(
                    email = %record.email,
                    institution = %record.institution_id,
                    "graph has no interest relationship to update"
                );
                MirrorOutcome::Skipped
            }
            Err(error) => {
                tracing::warn!(
                    email = %record.email,
                    institution = %record.institution_id,
                    %error,
                    "graph status mirror failed"
                );
                MirrorOutcome::Failed
            }
        }
    }
}

/// The snapshot prefers column values already denormalized onto the row and
/// falls back to tenant configuration. Returns `None` without a document id.
fn interest_snapshot(record: &EnrollmentRecord, tenant: &TenantConfig) -> Option<InterestSnapshot> {
    let person_key = record.document_id.clone()?;
    let stage = tenant
        .workflow
        .as_ref()
        .and_then(|workflow| workflow.stage_by_status(&record.enrollment_status))
        .map(|stage| stage.name.clone());

    Some(InterestSnapshot {
        person_key,
        full_name: record.full_name.clone(),
        email: record.email.clone(),
        institution_id: record.institution_id.clone(),
        institution_name: record
            .institution_name
            .clone()
            .unwrap_or_else(|| tenant.profile.name.clone()),
        institution_kind: tenant.profile.kind.map(|kind| kind.label().to_string()),
        career_id: record.career_id.clone(),
        career_name: record
            .career_name
            .clone()
            .unwrap_or_else(|| record.career_id.clone()),
        career_code: record.career_code.clone(),
        status: record.enrollment_status.clone(),
        stage,
        registered_at: record.prospection_date.unwrap_or(record.created_at),
        priority: 1,
    })
}
