mod common;

use std::sync::Arc;

use campusflow::stores::GraphStore;
use campusflow::tenants::TenantDirectory;
use campusflow::workflows::admission::{
    AdmissionService, AdmissionServiceError, EnrollmentKey, GraphMirror, NewEnrollment,
    TransitionDenial,
};

use common::{seed_prospection, AdmissionsHarness};

fn service_over(harness: &AdmissionsHarness) -> AdmissionService {
    AdmissionService::new(
        Arc::clone(&harness.repository),
        Arc::clone(&harness.tenants) as Arc<dyn TenantDirectory>,
        GraphMirror::new(Arc::clone(&harness.graph) as Arc<dyn GraphStore>),
    )
}

#[tokio::test]
async fn migrated_enrollment_walks_the_configured_workflow() {
    let harness = AdmissionsHarness::new().await;
    seed_prospection(&harness.cache, "a@x.com", "uni-x", "cs101", Some("30111222")).await;
    let report = harness.worker.run_once().await.expect("cycle runs");
    assert_eq!(report.created, 1);

    let service = service_over(&harness);
    let key = EnrollmentKey::new("uni-x", "a@x.com", "cs101");
    let record = service.enrollment(&key).await.expect("row migrated");
    assert_eq!(record.enrollment_status, "interesado");

    // skipping straight to the final stage is rejected with guidance
    let skip = service.advance_stage(&key, 3, "admin", "admin@unx", None).await;
    match skip {
        Err(AdmissionServiceError::Transition(TransitionDenial::TransitionNotAllowed {
            from,
            allowed,
            ..
        })) => {
            assert_eq!(from, "interesado");
            assert_eq!(allowed.len(), 1);
            assert_eq!(allowed[0].stage_id, 2);
        }
        other => panic!("expected TransitionNotAllowed, got {other:?}"),
    }

    let advance = service
        .advance_stage(&key, 2, "admin", "admin@unx", Some("legajo completo".to_string()))
        .await
        .expect("step to stage 2 is legal");
    assert_eq!(advance.enrollment.enrollment_status, "en_revision");
    assert_eq!(advance.transition.from.status_key, "interesado");
    assert_eq!(advance.transition.to.status_key, "en_revision");
    assert!(advance.transition.requires_documents);
    assert_eq!(
        advance.enrollment.admission_notes.as_deref(),
        Some("legajo completo")
    );
    assert_eq!(
        harness.graph.interest_status("30111222", "uni-x").await,
        Some(("en_revision".to_string(), Some("En Revision".to_string()))),
        "graph mirror follows the transition"
    );

    let finish = service
        .advance_stage(&key, 3, "admin", "admin@unx", None)
        .await
        .expect("final stage is reachable from stage 2");
    assert_eq!(finish.enrollment.enrollment_status, "matriculado");
    assert!(finish.transition.to.is_final);

    let stats = service.statistics("uni-x").await.expect("statistics");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_status.get("matriculado"), Some(&1));
    let by_stage = stats.by_stage.expect("workflow configured");
    assert_eq!(by_stage[2].count, 1);
}

#[tokio::test]
async fn the_final_stage_is_gated_to_admins() {
    let harness = AdmissionsHarness::new().await;
    seed_prospection(&harness.cache, "b@x.com", "uni-x", "cs101", None).await;
    harness.worker.run_once().await.expect("cycle runs");

    let service = service_over(&harness);
    let key = EnrollmentKey::new("uni-x", "b@x.com", "cs101");
    service
        .advance_stage(&key, 2, "alumno", "b@x.com", None)
        .await
        .expect("stage 2 has no role restriction");

    let denied = service.advance_stage(&key, 3, "alumno", "b@x.com", None).await;
    match denied {
        Err(AdmissionServiceError::Transition(TransitionDenial::RoleNotAuthorized {
            actor_role,
            required_roles,
            ..
        })) => {
            assert_eq!(actor_role, "alumno");
            assert_eq!(required_roles, vec!["admin".to_string()]);
        }
        other => panic!("expected RoleNotAuthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_is_a_status_change_not_a_deletion() {
    let harness = AdmissionsHarness::new().await;
    let service = service_over(&harness);
    let key = EnrollmentKey::new("uni-x", "c@x.com", "law200");
    service
        .create_enrollment(
            &key,
            NewEnrollment {
                full_name: "Carla Paz".to_string(),
                ..NewEnrollment::default()
            },
        )
        .await
        .expect("direct creation");

    let cancelled = service.cancel(&key, "admin@unx").await.expect("cancel");
    assert_eq!(cancelled.enrollment_status, "cancelado");

    let still_there = service.enrollment(&key).await.expect("row survives");
    assert_eq!(still_there.enrollment_status, "cancelado");
    assert_eq!(still_there.updated_by.as_deref(), Some("admin@unx"));
    assert_eq!(harness.durable.row_count("enrollments").await, 1);

    let listed = service
        .enrollments_by_status("uni-x", "cancelado")
        .await
        .expect("projection query");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].email, "c@x.com");
}

#[tokio::test]
async fn statuses_outside_the_current_workflow_are_flagged() {
    let harness = AdmissionsHarness::new().await;
    let service = service_over(&harness);
    let key = EnrollmentKey::new("uni-x", "d@x.com", "cs101");
    service
        .create_enrollment(
            &key,
            NewEnrollment {
                full_name: "Diego Sol".to_string(),
                enrollment_status: Some("preinscripto".to_string()),
                ..NewEnrollment::default()
            },
        )
        .await
        .expect("creation with a legacy status");

    let result = service.advance_stage(&key, 2, "admin", "admin@unx", None).await;
    match result {
        Err(AdmissionServiceError::Transition(TransitionDenial::InvalidCurrentStatus {
            current_status,
        })) => assert_eq!(current_status, "preinscripto"),
        other => panic!("expected InvalidCurrentStatus, got {other:?}"),
    }
}
