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
    AdmissionService, EnrollmentRepository, GraphMirror, ProspectionIntake, ReconciliationWorker,
    StageDefinition, WorkflowDefinition,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Everything the HTTP handlers need, cloned into the router state.
#[derive(Clone)]
pub(crate) struct AdmissionPlatform {
    pub(crate) admissions: Arc<AdmissionService>,
    pub(crate) intake: Arc<ProspectionIntake>,
    pub(crate) worker: Arc<ReconciliationWorker>,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) durable: Arc<dyn DurableStore>,
    pub(crate) graph: Arc<dyn GraphStore>,
}

/// Concrete store handles kept alongside the platform so the demo and the
/// reconcile subcommand can introspect row and node counts.
pub(crate) struct InMemoryBackends {
    pub(crate) cache: Arc<InMemoryCacheStore>,
    pub(crate) durable: Arc<InMemoryDurableStore>,
    pub(crate) graph: Arc<InMemoryGraphStore>,
    pub(crate) tenants: Arc<InMemoryTenantDirectory>,
}

/// Wires the whole platform over in-memory backends seeded with the default
/// institutions. Production deployments swap the backends at this seam.
pub(crate) async fn build_platform(
    settings: WorkerSettings,
    prospection_ttl: Duration,
) -> (AdmissionPlatform, InMemoryBackends) {
    let backends = InMemoryBackends {
        cache: Arc::new(InMemoryCacheStore::new()),
        durable: Arc::new(InMemoryDurableStore::new()),
        graph: Arc::new(InMemoryGraphStore::new()),
        tenants: Arc::new(InMemoryTenantDirectory::new()),
    };
    for institution in default_institutions() {
        backends.tenants.register(institution).await;
    }

    let cache: Arc<dyn CacheStore> = backends.cache.clone();
    let durable: Arc<dyn DurableStore> = backends.durable.clone();
    let graph: Arc<dyn GraphStore> = backends.graph.clone();
    let tenants: Arc<dyn TenantDirectory> = backends.tenants.clone();

    let repository = Arc::new(EnrollmentRepository::new(durable.clone(), tenants.clone()));
    let mirror = GraphMirror::new(graph.clone());
    let admissions = Arc::new(AdmissionService::new(
        repository.clone(),
        tenants.clone(),
        mirror.clone(),
    ));
    let intake = Arc::new(ProspectionIntake::new(
        cache.clone(),
        tenants.clone(),
        prospection_ttl,
    ));
    let worker = Arc::new(ReconciliationWorker::new(
        cache.clone(),
        repository,
        tenants,
        mirror,
        settings,
    ));

    let platform = AdmissionPlatform {
        admissions,
        intake,
        worker,
        cache,
        durable,
        graph,
    };
    (platform, backends)
}

pub(crate) fn default_institutions() -> Vec<TenantConfig> {
    vec![public_university(), private_institute()]
}

/// Public university with the full six-stage admission funnel. Stage 1
/// carries the initial flag; late stages are gated to administrative roles.
pub(crate) fn public_university() -> TenantConfig {
    TenantConfig {
        institution_id: "univ-nacional-centro".to_string(),
        profile: InstitutionProfile {
            name: "Universidad Nacional del Centro".to_string(),
            short_name: Some("UNICEN".to_string()),
            kind: Some(InstitutionKind::Public),
            city: Some("Tandil".to_string()),
            province: Some("Buenos Aires".to_string()),
        },
        careers: vec![
            Career {
                career_id: "ing-sistemas".to_string(),
                name: "Ingenieria de Sistemas".to_string(),
                code: Some("IS".to_string()),
                faculty: Some("Ciencias Exactas".to_string()),
                category: Some("grado".to_string()),
                is_active: true,
            },
            Career {
                career_id: "medicina".to_string(),
                name: "Medicina".to_string(),
                code: Some("MED".to_string()),
                faculty: Some("Ciencias de la Salud".to_string()),
                category: Some("grado".to_string()),
                is_active: true,
            },
            Career {
                career_id: "lic-fisica".to_string(),
                name: "Licenciatura en Fisica".to_string(),
                code: Some("LF".to_string()),
                faculty: Some("Ciencias Exactas".to_string()),
                category: Some("grado".to_string()),
                // closed cohort, kept for historical rows
                is_active: false,
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
                    status_key: "documentacion_pendiente".to_string(),
                    name: "Documentacion Pendiente".to_string(),
                    next_stages: vec![3, 6],
                    allowed_roles: Vec::new(),
                    is_initial: false,
                    is_final: false,
                    requires_approval: false,
                    requires_documents: true,
                    requires_payment: false,
                },
                StageDefinition {
                    stage_id: 3,
                    status_key: "en_revision".to_string(),
                    name: "En Revision".to_string(),
                    next_stages: vec![4, 6],
                    allowed_roles: Vec::new(),
                    is_initial: false,
                    is_final: false,
                    requires_approval: true,
                    requires_documents: false,
                    requires_payment: false,
                },
                StageDefinition {
                    stage_id: 4,
                    status_key: "curso_ingreso".to_string(),
                    name: "Curso de Ingreso".to_string(),
                    next_stages: vec![5, 6],
                    allowed_roles: Vec::new(),
                    is_initial: false,
                    is_final: false,
                    requires_approval: false,
                    requires_documents: false,
                    requires_payment: false,
                },
                StageDefinition {
                    stage_id: 5,
                    status_key: "aceptado".to_string(),
                    name: "Aceptado".to_string(),
                    next_stages: Vec::new(),
                    allowed_roles: vec!["admin".to_string(), "super_admin".to_string()],
                    is_initial: false,
                    is_final: true,
                    requires_approval: true,
                    requires_documents: false,
                    requires_payment: true,
                },
                StageDefinition {
                    stage_id: 6,
                    status_key: "rechazado".to_string(),
                    name: "Rechazado".to_string(),
                    next_stages: Vec::new(),
                    allowed_roles: vec!["admin".to_string(), "super_admin".to_string()],
                    is_initial: false,
                    is_final: true,
                    requires_approval: false,
                    requires_documents: false,
                    requires_payment: false,
                },
            ],
            default_initial_stage: None,
        }),
    }
}

/// Private institute whose workflow names no initial stage and relies on the
/// default pointer instead.
pub(crate) fn private_institute() -> TenantConfig {
    TenantConfig {
        institution_id: "inst-del-sur".to_string(),
        profile: InstitutionProfile {
            name: "Instituto Superior del Sur".to_string(),
            short_name: Some("ISS".to_string()),
            kind: Some(InstitutionKind::Private),
            city: Some("Bahia Blanca".to_string()),
            province: Some("Buenos Aires".to_string()),
        },
        careers: vec![
            Career {
                career_id: "analista-datos".to_string(),
                name: "Analista de Datos".to_string(),
                code: Some("AD".to_string()),
                faculty: None,
                category: Some("tecnicatura".to_string()),
                is_active: true,
            },
            Career {
                career_id: "enfermeria".to_string(),
                name: "Enfermeria Universitaria".to_string(),
                code: Some("ENF".to_string()),
                faculty: None,
                category: Some("pregrado".to_string()),
                is_active: true,
            },
        ],
        workflow: Some(WorkflowDefinition {
            stages: vec![
                StageDefinition {
                    stage_id: 10,
                    status_key: "preinscripto".to_string(),
                    name: "Preinscripto".to_string(),
                    next_stages: vec![20],
                    allowed_roles: Vec::new(),
                    is_initial: false,
                    is_final: false,
                    requires_approval: false,
                    requires_documents: false,
                    requires_payment: false,
                },
                StageDefinition {
                    stage_id: 20,
                    status_key: "entrevista".to_string(),
                    name: "Entrevista".to_string(),
                    next_stages: vec![30, 40],
                    allowed_roles: Vec::new(),
                    is_initial: false,
                    is_final: false,
                    requires_approval: false,
                    requires_documents: true,
                    requires_payment: false,
                },
                StageDefinition {
                    stage_id: 30,
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
                StageDefinition {
                    stage_id: 40,
                    status_key: "rechazado".to_string(),
                    name: "Rechazado".to_string(),
                    next_stages: Vec::new(),
                    allowed_roles: vec!["admin".to_string()],
                    is_initial: false,
                    is_final: true,
                    requires_approval: false,
                    requires_documents: false,
                    requires_payment: false,
                },
            ],
            default_initial_stage: Some(10),
        }),
    }
}
