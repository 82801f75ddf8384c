#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use campusflow::config::WorkerSettings;
use campusflow::stores::{
    CacheStore, DurableStore, GraphStore, InMemoryCacheStore, InMemoryDurableStore,
    InMemoryGraphStore,
};
use campusflow::tenants::{
    Career, InMemoryTenantDirectory, InstitutionKind, InstitutionProfile, TenantConfig,
    TenantDirectory,
};
use campusflow::workflows::admission::{
    prospection_key, EnrollmentRepository, GraphMirror, ProspectionRecord, ReconciliationWorker,
    StageDefinition, WorkflowDefinition,
};
use chrono::Utc;

/// Fully wired admission pipeline over in-memory stores, with the concrete
/// store handles kept around so tests can inspect them directly.
pub struct AdmissionsHarness {
    pub cache: Arc<InMemoryCacheStore>,
    pub durable: Arc<InMemoryDurableStore>,
    pub graph: Arc<InMemoryGraphStore>,
    pub tenants: Arc<InMemoryTenantDirectory>,
    pub repository: Arc<EnrollmentRepository>,
    pub worker: Arc<ReconciliationWorker>,
}

impl AdmissionsHarness {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Same wiring, but the worker mirrors into the supplied graph store
    /// instead of the harness one.
    pub async fn with_graph(graph: Arc<dyn GraphStore>) -> Self {
        Self::build(Some(graph)).await
    }

    async fn build(mirror_target: Option<Arc<dyn GraphStore>>) -> Self {
        let cache = Arc::new(InMemoryCacheStore::new());
        let durable = Arc::new(InMemoryDurableStore::new());
        let graph = Arc::new(InMemoryGraphStore::new());
        let tenants = Arc::new(InMemoryTenantDirectory::new());
        tenants.register(university_x()).await;

        let target =
            mirror_target.unwrap_or_else(|| Arc::clone(&graph) as Arc<dyn GraphStore>);
        let repository = Arc::new(EnrollmentRepository::new(
            Arc::clone(&durable) as Arc<dyn DurableStore>,
            Arc::clone(&tenants) as Arc<dyn TenantDirectory>,
        ));
        let worker = Arc::new(ReconciliationWorker::new(
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            Arc::clone(&repository),
            Arc::clone(&tenants) as Arc<dyn TenantDirectory>,
            GraphMirror::new(target),
            WorkerSettings::default(),
        ));

        Self {
            cache,
            durable,
            graph,
            tenants,
            repository,
            worker,
        }
    }
}

/// The reference institution used across integration tests: two active
/// careers and a three stage workflow whose final stage is admin-only.
pub fn university_x() -> TenantConfig {
    TenantConfig {
        institution_id: "uni-x".to_string(),
        profile: InstitutionProfile {
            name: "Universidad Nacional X".to_string(),
            short_name: Some("UNX".to_string()),
            kind: Some(InstitutionKind::Public),
            city: Some("Cordoba".to_string()),
            province: Some("Cordoba".to_string()),
        },
        careers: vec![
            Career {
                career_id: "cs101".to_string(),
                name: "Computer Science".to_string(),
                code: Some("CS".to_string()),
                faculty: Some("Engineering".to_string()),
                category: Some("grado".to_string()),
                is_active: true,
            },
            Career {
                career_id: "law200".to_string(),
                name: "Law".to_string(),
                code: Some("LAW".to_string()),
                faculty: Some("Legal Studies".to_string()),
                category: Some("grado".to_string()),
                is_active: true,
            },
        ],
        workflow: Some(WorkflowDefinition {
            stages: vec![
                StageDefinition {
                    stage_id: 1,
                    status_key: "interesado".to_string(),
                    name: "Interesado".to_string(),
                    next_stages: vec![2],
                    allowed_roles: Vec::new(),
                    is_initial: true,
                    is_final: false,
                    requires_approval: false,
                    requires_documents: false,
                    requires_payment: false,
                },
                StageDefinition {
                    stage_id: 2,
                    status_key: "en_revision".to_string(),
                    name: "En Revision".to_string(),
                    next_stages: vec![3],
                    allowed_roles: Vec::new(),
                    is_initial: false,
                    is_final: false,
                    requires_approval: false,
                    requires_documents: true,
                    requires_payment: false,
                },
                StageDefinition {
                    stage_id: 3,
                    status_key: "matriculado".to_string(),
                    name: "Matriculado".to_string(),
                    next_stages: Vec::new(),
                    allowed_roles: vec!["admin".to_string()],
                    is_initial: false,
                    is_final: true,
                    requires_approval: true,
                    requires_documents: false,
                    requires_payment: true,
                },
            ],
            default_initial_stage: None,
        }),
    }
}

/// Parks one prospection in the cache exactly as the intake endpoint would.
pub async fn seed_prospection(
    cache: &InMemoryCacheStore,
    email: &str,
    institution_id: &str,
    career_id: &str,
    document_id: Option<&str>,
) {
    let record = ProspectionRecord {
        email: email.to_string(),
        full_name: format!("Student {email}"),
        institution_id: institution_id.to_string(),
        career_id: career_id.to_string(),
        document_id: document_id.map(|id| id.to_string()),
        phone: None,
        submitted_at: Utc::now(),
        source: "web".to_string(),
    };
    cache
        .put(
            &prospection_key(email),
            serde_json::to_string(&record).expect("prospection encodes"),
            Some(Duration::from_secs(7200)),
        )
        .await
        .expect("cache accepts seed");
}
