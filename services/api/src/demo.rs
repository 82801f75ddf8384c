use crate::infra::{build_platform, AdmissionPlatform, InMemoryBackends};
use campusflow::config::WorkerSettings;
use campusflow::error::AppError;
use campusflow::workflows::admission::{
    prospection_key, AdmissionServiceError, EnrollmentKey, PaymentUpdate, ProspectionRecord,
    RunReport,
};
use chrono::Utc;
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the stage transition portion of the demo.
    #[arg(long)]
    pub(crate) skip_transitions: bool,
    /// Print every migrated enrollment row as JSON.
    #[arg(long)]
    pub(crate) include_rows: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ReconcileArgs {
    /// Number of prospections to seed before the cycle runs.
    #[arg(long, default_value_t = 10)]
    pub(crate) prospections: usize,
    /// Plant one prospection pointing at a career that does not exist.
    #[arg(long)]
    pub(crate) include_failure: bool,
}

const DEMO_TTL: Duration = Duration::from_secs(7200);

/// (email, full name, institution, career, document) rows used by both the
/// demo and the reconcile subcommand.
const SAMPLE_APPLICANTS: &[(&str, &str, &str, &str, &str)] = &[
    (
        "paula.quiroga@example.com",
        "Paula Quiroga",
        "univ-nacional-centro",
        "ing-sistemas",
        "30111222",
    ),
    (
        "matias.ferreyra@example.com",
        "Matias Ferreyra",
        "univ-nacional-centro",
        "medicina",
        "31444555",
    ),
    (
        "lucia.benitez@example.com",
        "Lucia Benitez",
        "inst-del-sur",
        "analista-datos",
        "32777888",
    ),
    (
        "tomas.aguirre@example.com",
        "Tomas Aguirre",
        "inst-del-sur",
        "enfermeria",
        "33000111",
    ),
    (
        "carla.moyano@example.com",
        "Carla Moyano",
        "univ-nacional-centro",
        "ing-sistemas",
        "34222333",
    ),
];

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        skip_transitions,
        include_rows,
    } = args;

    println!("CampusFlow admissions demo");

    let (platform, backends) = build_platform(WorkerSettings::default(), DEMO_TTL).await;

    println!("\nSeeding prospection intake");
    seed_sample_prospections(&platform, SAMPLE_APPLICANTS.len()).await?;
    println!(
        "- {} prospections registered across 2 institutions",
        SAMPLE_APPLICANTS.len()
    );
    plant_stray_career_prospection(&platform).await?;
    println!("- 1 prospection whose career is not in the catalog (kept until its TTL)");
    plant_unparseable_entry(&platform).await?;
    println!("- 1 unparseable cache entry planted next to them");

    println!("\nReconciliation cycle 1");
    let Some(report) = platform.worker.run_once().await else {
        println!("  another cycle already holds the guard, nothing to do");
        return Ok(());
    };
    render_run_report(&report);

    println!("\nReconciliation cycle 2 (same cache)");
    match platform.worker.run_once().await {
        Some(report) => render_run_report(&report),
        None => println!("  another cycle already holds the guard, nothing to do"),
    }

    if include_rows {
        render_enrollment_rows(&platform).await;
    }

    if !skip_transitions {
        walk_stages(&platform).await;
    }

    render_statistics(&platform, &backends).await;
    Ok(())
}

pub(crate) async fn run_reconcile(args: ReconcileArgs) -> Result<(), AppError> {
    let ReconcileArgs {
        prospections,
        include_failure,
    } = args;

    let (platform, _backends) = build_platform(WorkerSettings::default(), DEMO_TTL).await;

    seed_sample_prospections(&platform, prospections).await?;
    if include_failure {
        plant_stray_career_prospection(&platform).await?;
    }

    let Some(report) = platform.worker.run_once().await else {
        println!("another cycle already holds the guard, nothing to do");
        return Ok(());
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("report not serializable: {err}"),
    }

    let stats = platform.worker.stats().await;
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("stats not serializable: {err}"),
    }
    Ok(())
}

/// Registers `count` prospections through the intake, cycling over the sample
/// applicants and synthesizing extras past the table.
async fn seed_sample_prospections(
    platform: &AdmissionPlatform,
    count: usize,
) -> Result<(), AppError> {
    for index in 0..count {
        let (email, full_name, institution_id, career_id, document_id) =
            SAMPLE_APPLICANTS[index % SAMPLE_APPLICANTS.len()];
        let record = if index < SAMPLE_APPLICANTS.len() {
            sample_record(email, full_name, institution_id, career_id, document_id)
        } else {
            let synthesized = format!("aspirante{index}@example.com");
            let mut record =
                sample_record(&synthesized, full_name, institution_id, career_id, document_id);
            record.document_id = None;
            record
        };
        platform.intake.register(record).await?;
    }
    Ok(())
}

fn sample_record(
    email: &str,
    full_name: &str,
    institution_id: &str,
    career_id: &str,
    document_id: &str,
) -> ProspectionRecord {
    ProspectionRecord {
        email: email.to_string(),
        full_name: full_name.to_string(),
        institution_id: institution_id.to_string(),
        career_id: career_id.to_string(),
        document_id: Some(document_id.to_string()),
        phone: None,
        submitted_at: Utc::now(),
        source: "demo".to_string(),
    }
}

/// Writes a record for a career missing from the catalog straight into the
/// cache, the shape a deactivated career leaves behind.
async fn plant_stray_career_prospection(platform: &AdmissionPlatform) -> Result<(), AppError> {
    let stray = sample_record(
        "nadia.paz@example.com",
        "Nadia Paz",
        "univ-nacional-centro",
        "robotica",
        "35666777",
    );
    let payload = serde_json::to_string(&stray).map_err(AdmissionServiceError::from)?;
    platform
        .cache
        .put(&prospection_key(&stray.email), payload, Some(DEMO_TTL))
        .await
        .map_err(AdmissionServiceError::from)?;
    Ok(())
}

async fn plant_unparseable_entry(platform: &AdmissionPlatform) -> Result<(), AppError> {
    platform
        .cache
        .put(
            &prospection_key("corrupto@example.com"),
            "{not json".to_string(),
            Some(DEMO_TTL),
        )
        .await
        .map_err(AdmissionServiceError::from)?;
    Ok(())
}

fn render_run_report(report: &RunReport) {
    println!(
        "- scanned {} | processed {} | created {} | skipped {} | errors {}",
        report.scanned, report.processed, report.created, report.skipped, report.errors
    );
    println!(
        "- graph synced {} | graph errors {} | keys deleted {}",
        report.graph_synced, report.graph_errors, report.deleted
    );
    for detail in &report.error_details {
        println!("  error: {} -> {}", detail.key, detail.reason);
    }
}

async fn render_enrollment_rows(platform: &AdmissionPlatform) {
    for institution_id in ["univ-nacional-centro", "inst-del-sur"] {
        println!("\nEnrollment rows ({institution_id})");
        let records = match platform
            .admissions
            .enrollments_by_institution(institution_id)
            .await
        {
            Ok(records) => records,
            Err(err) => {
                println!("  listing unavailable: {err}");
                return;
            }
        };
        for record in records {
            match serde_json::to_string_pretty(&record) {
                Ok(json) => println!("{json}"),
                Err(err) => println!("  row not serializable: {err}"),
            }
        }
    }
}

/// Drives one migrated enrollment through the public university funnel,
/// including the refusals an operator would see.
async fn walk_stages(platform: &AdmissionPlatform) {
    let admissions = &platform.admissions;
    let key = EnrollmentKey::new("univ-nacional-centro", "paula.quiroga@example.com", "ing-sistemas");

    println!("\nStage transitions (Universidad Nacional del Centro)");
    let record = match admissions.enrollment(&key).await {
        Ok(record) => record,
        Err(err) => {
            println!("  enrollment lookup unavailable: {err}");
            return;
        }
    };
    println!("- {}: {}", key.email, record.enrollment_status);

    match admissions
        .advance_stage(&key, 5, "admisiones", "demo", None)
        .await
    {
        Ok(_) => println!("- unexpected: jump straight to stage 5 was granted"),
        Err(err) => println!("- jump straight to stage 5 refused: {err}"),
    }

    let steps: &[(u32, &str, &str)] = &[
        (2, "admisiones", "documentation requested"),
        (3, "admisiones", "file under review"),
        (4, "admisiones", "entrance course"),
    ];
    for (stage, role, label) in steps {
        match admissions.advance_stage(&key, *stage, role, "demo", None).await {
            Ok(advance) => {
                let mut flags = Vec::new();
                if advance.transition.requires_documents {
                    flags.push("documents");
                }
                if advance.transition.requires_approval {
                    flags.push("approval");
                }
                if advance.transition.requires_payment {
                    flags.push("payment");
                }
                let gate = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" (requires {})", flags.join(", "))
                };
                println!(
                    "- {} -> {}{}",
                    label, advance.transition.to.status_key, gate
                );
            }
            Err(err) => {
                println!("  stage advance unavailable: {err}");
                return;
            }
        }
    }

    match admissions.update_documents(&key, "verificado", "demo").await {
        Ok(record) => println!(
            "- documents verified at {}",
            record
                .documents_verified_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        ),
        Err(err) => println!("  document update unavailable: {err}"),
    }

    let payment = PaymentUpdate {
        status: Some("pagado".to_string()),
        amount: Some(150_000.0),
        method: Some("transferencia".to_string()),
        ..PaymentUpdate::default()
    };
    match admissions.update_payment(&key, payment, "demo").await {
        Ok(record) => println!(
            "- enrollment fee registered: {} {}",
            record.payment_amount.unwrap_or_default(),
            record.payment_currency.as_deref().unwrap_or("?")
        ),
        Err(err) => println!("  payment update unavailable: {err}"),
    }

    match admissions
        .advance_stage(&key, 5, "consejero", "demo", None)
        .await
    {
        Ok(_) => println!("- unexpected: 'consejero' was allowed into stage 5"),
        Err(err) => println!("- acceptance as 'consejero' refused: {err}"),
    }

    match admissions
        .advance_stage(&key, 5, "admin", "demo", Some("cupo confirmado".to_string()))
        .await
    {
        Ok(advance) => println!(
            "- accepted by admin -> {} (final: {})",
            advance.transition.to.status_key, advance.transition.to.is_final
        ),
        Err(err) => println!("  final advance unavailable: {err}"),
    }
}

async fn render_statistics(platform: &AdmissionPlatform, backends: &InMemoryBackends) {
    println!("\nInstitution statistics");
    for institution_id in ["univ-nacional-centro", "inst-del-sur"] {
        match platform.admissions.statistics(institution_id).await {
            Ok(stats) => {
                println!("- {}: {} enrollments", stats.institution_id, stats.total);
                for (status, count) in &stats.by_status {
                    println!("    {status}: {count}");
                }
                if let Some(by_stage) = &stats.by_stage {
                    let funnel: Vec<String> = by_stage
                        .iter()
                        .map(|stage| format!("{} {}", stage.status_key, stage.count))
                        .collect();
                    println!("    funnel: {}", funnel.join(" | "));
                }
            }
            Err(err) => println!("- {institution_id}: statistics unavailable: {err}"),
        }
    }

    println!("\nIntake");
    match platform.intake.statistics(Some("univ-nacional-centro")).await {
        Ok(stats) => println!(
            "- pending cache entries {} | registered total {} | registered at UNICEN {}",
            stats.pending,
            stats.total_registered,
            stats
                .institution_registered
                .map(|count| count.to_string())
                .unwrap_or_else(|| "?".to_string())
        ),
        Err(err) => println!("- intake statistics unavailable: {err}"),
    }

    println!("\nGraph mirror");
    println!(
        "- nodes {} | relationships {}",
        backends.graph.node_count().await,
        backends.graph.relationship_count().await
    );

    println!("\nWorker counters");
    let stats = platform.worker.stats().await;
    println!(
        "- processed {} | created {} | skipped {} | errors {} | graph synced {} | graph errors {}",
        stats.total_processed,
        stats.total_created,
        stats.total_skipped,
        stats.total_errors,
        stats.total_graph_synced,
        stats.total_graph_errors
    );
    println!(
        "- last run {} ({} ms)",
        stats
            .last_run_time
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
        stats.last_run_duration_ms
    );
}
