use crate::infra::{AdmissionPlatform, AppState};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Extension, Json};
use campusflow::workflows::admission::domain::SYSTEM_ACTOR;
use campusflow::workflows::admission::{
    AdmissionServiceError, AdmissionUpdate, EnrollmentKey, EnrollmentRecord, NewEnrollment,
    PaymentUpdate, ProspectionRecord, TransitionDenial, DOCUMENT_STATUSES,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

pub(crate) fn with_admission_routes(platform: AdmissionPlatform) -> axum::Router {
    axum::Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/prospections", post(register_prospection))
        .route("/api/v1/prospections/stats", get(prospection_stats))
        .route("/api/v1/prospections/:email", get(fetch_prospection))
        .route("/api/v1/worker/stats", get(worker_stats))
        .route("/api/v1/worker/trigger", post(trigger_worker))
        .route(
            "/api/v1/institutions/:institution_id/enrollments",
            get(list_enrollments).post(create_enrollment),
        )
        .route(
            "/api/v1/institutions/:institution_id/enrollments/stats",
            get(enrollment_stats),
        )
        .route(
            "/api/v1/institutions/:institution_id/enrollments/:email/:career_id",
            get(fetch_enrollment).delete(cancel_enrollment),
        )
        .route(
            "/api/v1/institutions/:institution_id/enrollments/:email/:career_id/advance",
            post(advance_enrollment),
        )
        .route(
            "/api/v1/institutions/:institution_id/enrollments/:email/:career_id/documents",
            patch(update_documents),
        )
        .route(
            "/api/v1/institutions/:institution_id/enrollments/:email/:career_id/payment",
            patch(update_payment),
        )
        .route(
            "/api/v1/institutions/:institution_id/enrollments/:email/:career_id/admission",
            patch(update_admission),
        )
        .with_state(platform)
}

/// Pings every backing store; a degraded store flips the overall status but
/// the payload still names which one went down.
pub(crate) async fn healthcheck(State(platform): State<AdmissionPlatform>) -> impl IntoResponse {
    let cache = platform.cache.ping().await.is_ok();
    let durable = platform.durable.ping().await.is_ok();
    let graph = platform.graph.ping().await.is_ok();
    let healthy = cache && durable && graph;

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let payload = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "stores": { "cache": cache, "durable": durable, "graph": graph },
    });
    (status, Json(payload))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProspectionRequest {
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) institution_id: String,
    pub(crate) career_id: String,
    #[serde(default)]
    pub(crate) document_id: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) source: Option<String>,
}

pub(crate) async fn register_prospection(
    State(platform): State<AdmissionPlatform>,
    Json(request): Json<ProspectionRequest>,
) -> Response {
    let record = ProspectionRecord {
        email: request.email,
        full_name: request.full_name,
        institution_id: request.institution_id,
        career_id: request.career_id,
        document_id: request.document_id,
        phone: request.phone,
        submitted_at: Utc::now(),
        source: request.source.unwrap_or_else(|| "web".to_string()),
    };

    match platform.intake.register(record).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProspectionStatsQuery {
    #[serde(default)]
    pub(crate) institution_id: Option<String>,
}

pub(crate) async fn prospection_stats(
    State(platform): State<AdmissionPlatform>,
    Query(query): Query<ProspectionStatsQuery>,
) -> Response {
    match platform
        .intake
        .statistics(query.institution_id.as_deref())
        .await
    {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

pub(crate) async fn fetch_prospection(
    State(platform): State<AdmissionPlatform>,
    Path(email): Path<String>,
) -> Response {
    match platform.intake.fetch(&email).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no prospection registered for '{email}'") })),
        )
            .into_response(),
        Err(error) => admission_error_response(error),
    }
}

pub(crate) async fn worker_stats(State(platform): State<AdmissionPlatform>) -> Response {
    let stats = platform.worker.stats().await;
    (StatusCode::OK, Json(stats)).into_response()
}

/// Fire-and-forget manual run; the report lands in the worker stats once the
/// cycle finishes.
pub(crate) async fn trigger_worker(State(platform): State<AdmissionPlatform>) -> Response {
    let _detached = platform.worker.trigger();
    (
        StatusCode::ACCEPTED,
        Json(json!({ "message": "reconciliation run scheduled" })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateEnrollmentRequest {
    pub(crate) email: String,
    pub(crate) career_id: String,
    pub(crate) full_name: String,
    #[serde(default)]
    pub(crate) document_kind: Option<String>,
    #[serde(default)]
    pub(crate) document_id: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub(crate) academic_year: Option<i32>,
    #[serde(default)]
    pub(crate) enrollment_period: Option<String>,
    #[serde(default)]
    pub(crate) enrollment_status: Option<String>,
    #[serde(default)]
    pub(crate) created_by: Option<String>,
}

pub(crate) async fn create_enrollment(
    State(platform): State<AdmissionPlatform>,
    Path(institution_id): Path<String>,
    Json(request): Json<CreateEnrollmentRequest>,
) -> Response {
    let key = EnrollmentKey::new(&institution_id, &request.email, &request.career_id);
    let data = NewEnrollment {
        full_name: request.full_name,
        document_kind: request.document_kind,
        document_id: request.document_id,
        phone: request.phone,
        birth_date: request.birth_date,
        academic_year: request.academic_year,
        enrollment_period: request.enrollment_period,
        enrollment_status: request.enrollment_status,
        created_by: request.created_by,
        ..NewEnrollment::default()
    };

    match platform.admissions.create_enrollment(&key, data).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EnrollmentListQuery {
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) year: Option<i32>,
    #[serde(default)]
    pub(crate) email: Option<String>,
}

pub(crate) async fn list_enrollments(
    State(platform): State<AdmissionPlatform>,
    Path(institution_id): Path<String>,
    Query(query): Query<EnrollmentListQuery>,
) -> Response {
    let admissions = &platform.admissions;
    let result = if let Some(status) = query.status.as_deref() {
        admissions.enrollments_by_status(&institution_id, status).await
    } else if let Some(year) = query.year {
        admissions.enrollments_by_year(&institution_id, year).await
    } else if let Some(email) = query.email.as_deref() {
        admissions.enrollments_by_email(&institution_id, email).await
    } else {
        admissions.enrollments_by_institution(&institution_id).await
    };

    match result {
        Ok(records) => enrollment_listing(records),
        Err(error) => admission_error_response(error),
    }
}

fn enrollment_listing(records: Vec<EnrollmentRecord>) -> Response {
    let views: Vec<_> = records.iter().map(EnrollmentRecord::status_view).collect();
    (
        StatusCode::OK,
        Json(json!({ "total": views.len(), "enrollments": views })),
    )
        .into_response()
}

pub(crate) async fn enrollment_stats(
    State(platform): State<AdmissionPlatform>,
    Path(institution_id): Path<String>,
) -> Response {
    match platform.admissions.statistics(&institution_id).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

pub(crate) async fn fetch_enrollment(
    State(platform): State<AdmissionPlatform>,
    Path((institution_id, email, career_id)): Path<(String, String, String)>,
) -> Response {
    let key = EnrollmentKey::new(&institution_id, &email, &career_id);
    match platform.admissions.enrollment(&key).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CancelRequest {
    #[serde(default)]
    pub(crate) updated_by: Option<String>,
}

pub(crate) async fn cancel_enrollment(
    State(platform): State<AdmissionPlatform>,
    Path((institution_id, email, career_id)): Path<(String, String, String)>,
    body: Option<Json<CancelRequest>>,
) -> Response {
    let key = EnrollmentKey::new(&institution_id, &email, &career_id);
    let actor = body
        .and_then(|Json(request)| request.updated_by)
        .unwrap_or_else(|| SYSTEM_ACTOR.to_string());

    match platform.admissions.cancel(&key, &actor).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdvanceRequest {
    pub(crate) target_stage_id: u32,
    #[serde(default)]
    pub(crate) actor_role: Option<String>,
    #[serde(default)]
    pub(crate) actor: Option<String>,
    #[serde(default)]
    pub(crate) notes: Option<String>,
}

pub(crate) async fn advance_enrollment(
    State(platform): State<AdmissionPlatform>,
    Path((institution_id, email, career_id)): Path<(String, String, String)>,
    Json(request): Json<AdvanceRequest>,
) -> Response {
    let key = EnrollmentKey::new(&institution_id, &email, &career_id);
    let actor_role = request.actor_role.as_deref().unwrap_or("admin");
    let actor = request.actor.as_deref().unwrap_or(SYSTEM_ACTOR);

    match platform
        .admissions
        .advance_stage(&key, request.target_stage_id, actor_role, actor, request.notes)
        .await
    {
        Ok(advance) => (StatusCode::OK, Json(advance)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentStatusRequest {
    pub(crate) document_status: String,
    #[serde(default)]
    pub(crate) updated_by: Option<String>,
}

pub(crate) async fn update_documents(
    State(platform): State<AdmissionPlatform>,
    Path((institution_id, email, career_id)): Path<(String, String, String)>,
    Json(request): Json<DocumentStatusRequest>,
) -> Response {
    let key = EnrollmentKey::new(&institution_id, &email, &career_id);
    let actor = request.updated_by.as_deref().unwrap_or(SYSTEM_ACTOR);

    match platform
        .admissions
        .update_documents(&key, &request.document_status, actor)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PaymentRequest {
    #[serde(default)]
    pub(crate) payment_status: Option<String>,
    #[serde(default)]
    pub(crate) amount: Option<f64>,
    #[serde(default)]
    pub(crate) currency: Option<String>,
    #[serde(default)]
    pub(crate) payment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) method: Option<String>,
    #[serde(default)]
    pub(crate) updated_by: Option<String>,
}

pub(crate) async fn update_payment(
    State(platform): State<AdmissionPlatform>,
    Path((institution_id, email, career_id)): Path<(String, String, String)>,
    Json(request): Json<PaymentRequest>,
) -> Response {
    let key = EnrollmentKey::new(&institution_id, &email, &career_id);
    let actor = request.updated_by.as_deref().unwrap_or(SYSTEM_ACTOR);
    let update = PaymentUpdate {
        status: request.payment_status,
        amount: request.amount,
        currency: request.currency,
        date: request.payment_date,
        method: request.method,
    };

    match platform.admissions.update_payment(&key, update, actor).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AdmissionReviewRequest {
    #[serde(default)]
    pub(crate) admission_status: Option<String>,
    #[serde(default)]
    pub(crate) admission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) score: Option<f64>,
    #[serde(default)]
    pub(crate) notes: Option<String>,
    #[serde(default)]
    pub(crate) updated_by: Option<String>,
}

pub(crate) async fn update_admission(
    State(platform): State<AdmissionPlatform>,
    Path((institution_id, email, career_id)): Path<(String, String, String)>,
    Json(request): Json<AdmissionReviewRequest>,
) -> Response {
    let key = EnrollmentKey::new(&institution_id, &email, &career_id);
    let actor = request.updated_by.as_deref().unwrap_or(SYSTEM_ACTOR);
    let update = AdmissionUpdate {
        status: Some(
            request
                .admission_status
                .unwrap_or_else(|| "en_revision".to_string()),
        ),
        date: request.admission_date,
        score: request.score,
        notes: request.notes,
    };

    match platform.admissions.update_admission(&key, update, actor).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => admission_error_response(error),
    }
}

fn admission_error_response(error: AdmissionServiceError) -> Response {
    match error {
        AdmissionServiceError::Transition(denial) => transition_denied_response(denial),
        AdmissionServiceError::InstitutionNotFound { .. }
        | AdmissionServiceError::CareerNotFound { .. }
        | AdmissionServiceError::EnrollmentNotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
        AdmissionServiceError::DuplicateEnrollment { .. }
        | AdmissionServiceError::DuplicateProspection { .. } => (
            StatusCode::CONFLICT,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
        AdmissionServiceError::UnknownDocumentStatus { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": error.to_string(), "accepted": DOCUMENT_STATUSES })),
        )
            .into_response(),
        AdmissionServiceError::Encoding(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
        AdmissionServiceError::Tenants(_)
        | AdmissionServiceError::Cache(_)
        | AdmissionServiceError::Storage(_) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
    }
}

/// Denials carry enough context to tell the operator what would have been
/// accepted instead.
fn transition_denied_response(denial: TransitionDenial) -> Response {
    let mut payload = json!({
        "error": denial.to_string(),
        "reason": denial.reason(),
    });
    match &denial {
        TransitionDenial::TransitionNotAllowed { allowed, .. } => {
            payload["allowed_next_stages"] = serde_json::to_value(allowed).unwrap_or_default();
        }
        TransitionDenial::RoleNotAuthorized { required_roles, .. } => {
            payload["required_roles"] = serde_json::to_value(required_roles).unwrap_or_default();
        }
        _ => {}
    }
    (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use campusflow::config::WorkerSettings;
    use std::time::Duration;
    use tower::util::ServiceExt;

    async fn test_platform() -> AdmissionPlatform {
        let settings = WorkerSettings {
            enabled: false,
            ..WorkerSettings::default()
        };
        let (platform, _backends) =
            crate::infra::build_platform(settings, Duration::from_secs(7200)).await;
        platform
    }

    async fn read_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn prospection_request(email: &str) -> ProspectionRequest {
        ProspectionRequest {
            email: email.to_string(),
            full_name: "Paula Quiroga".to_string(),
            institution_id: "univ-nacional-centro".to_string(),
            career_id: "ing-sistemas".to_string(),
            document_id: Some("31555777".to_string()),
            phone: None,
            source: None,
        }
    }

    #[tokio::test]
    async fn prospection_intake_round_trips_through_the_cache() {
        let platform = test_platform().await;

        let response = register_prospection(
            State(platform.clone()),
            Json(prospection_request("paula@example.com")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let receipt = read_json(response).await;
        assert_eq!(receipt["total_registered"], 1);
        assert_eq!(receipt["ttl_seconds"], 7200);

        let response = register_prospection(
            State(platform.clone()),
            Json(prospection_request("paula@example.com")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response =
            fetch_prospection(State(platform.clone()), Path("paula@example.com".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["email"], "paula@example.com");
        assert_eq!(body["source"], "web");

        let response =
            fetch_prospection(State(platform), Path("nobody@example.com".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_institution_maps_to_not_found() {
        let platform = test_platform().await;
        let mut request = prospection_request("paula@example.com");
        request.institution_id = "univ-fantasma".to_string();

        let response = register_prospection(State(platform), Json(request)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = read_json(response).await;
        assert!(body["error"]
            .as_str()
            .expect("error message")
            .contains("univ-fantasma"));
    }

    fn create_request(email: &str) -> CreateEnrollmentRequest {
        CreateEnrollmentRequest {
            email: email.to_string(),
            career_id: "ing-sistemas".to_string(),
            full_name: "Paula Quiroga".to_string(),
            document_kind: None,
            document_id: Some("31555777".to_string()),
            phone: None,
            birth_date: None,
            academic_year: None,
            enrollment_period: None,
            enrollment_status: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn enrollment_endpoints_enforce_workflow_rules() {
        let platform = test_platform().await;

        let response = create_enrollment(
            State(platform.clone()),
            Path("univ-nacional-centro".to_string()),
            Json(create_request("paula@example.com")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = read_json(response).await;
        assert_eq!(created["enrollment_status"], "interesado");

        let path = Path((
            "univ-nacional-centro".to_string(),
            "paula@example.com".to_string(),
            "ing-sistemas".to_string(),
        ));
        let response = advance_enrollment(
            State(platform.clone()),
            path,
            Json(AdvanceRequest {
                target_stage_id: 5,
                actor_role: Some("admin".to_string()),
                actor: None,
                notes: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let denied = read_json(response).await;
        assert_eq!(denied["reason"], "transition_not_allowed");
        assert_eq!(denied["allowed_next_stages"][0]["stage_id"], 2);

        let path = Path((
            "univ-nacional-centro".to_string(),
            "paula@example.com".to_string(),
            "ing-sistemas".to_string(),
        ));
        let response = advance_enrollment(
            State(platform),
            path,
            Json(AdvanceRequest {
                target_stage_id: 2,
                actor_role: None,
                actor: Some("registrar".to_string()),
                notes: Some("faltan analiticos".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let advance = read_json(response).await;
        assert_eq!(
            advance["transition"]["to"]["status_key"],
            "documentacion_pendiente"
        );
        assert_eq!(advance["transition"]["requires_documents"], true);
        assert_eq!(advance["enrollment"]["admission_notes"], "faltan analiticos");
    }

    #[tokio::test]
    async fn creating_the_same_enrollment_twice_conflicts() {
        let platform = test_platform().await;

        let response = create_enrollment(
            State(platform.clone()),
            Path("univ-nacional-centro".to_string()),
            Json(create_request("dup@example.com")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = create_enrollment(
            State(platform),
            Path("univ-nacional-centro".to_string()),
            Json(create_request("dup@example.com")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn router_serves_health_and_worker_stats() {
        let platform = test_platform().await;
        let app = with_admission_routes(platform);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("health response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["stores"]["graph"], true);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/worker/stats")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("stats response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["is_running"], false);
        assert_eq!(body["batch_size"], 100);
        assert_eq!(body["interval_seconds"], 900);
    }
}
