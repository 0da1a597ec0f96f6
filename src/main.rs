use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod db;
mod ingest;
mod models;
mod promotion;
mod report;

use db::{Activity, EvaluationKind};
use ingest::{
    GraduationEvaluationPatch, GraduationEvaluationRow, TeacherEvaluationPatch, TeacherEvaluationRow,
};
use models::{ActionType, Actor, Role};
use promotion::SortKey;

#[derive(Parser)]
#[command(name = "promotion-review")]
#[command(about = "Teacher and graduation evaluations rolled up into promotion decisions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Show row counts for every table
    CheckDb,
    /// Manage teacher evaluations
    Teacher {
        #[command(subcommand)]
        action: TeacherAction,
    },
    /// Manage graduation evaluations
    Graduation {
        #[command(subcommand)]
        action: GraduationAction,
    },
    /// Import evaluations from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: ImportKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute promotion decisions for every evaluated student
    Promote {
        #[arg(long, value_enum, default_value_t = SortArg::Name)]
        sort: SortArg,
        #[arg(long)]
        failed_only: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "promotion-report.md")]
        out: PathBuf,
    },
    /// Export promotion decisions
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long)]
        out: PathBuf,
    },
    /// Show the most recent activity log entries
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum TeacherAction {
    List,
    Add(TeacherFields),
    Update {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        changes: TeacherChanges,
    },
    Delete {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum GraduationAction {
    List,
    Add(GraduationFields),
    Update {
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        changes: GraduationChanges,
    },
    Delete {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(clap::Args)]
struct TeacherFields {
    #[arg(long)]
    student_id: String,
    #[arg(long, default_value = "")]
    student_name: String,
    #[arg(long, default_value = "")]
    teacher_name: String,
    #[arg(long, default_value = "")]
    class_code: String,
    #[arg(long)]
    score: Option<f64>,
    #[arg(long)]
    attitude: Option<f64>,
    #[arg(long)]
    participation: Option<f64>,
    #[arg(long, default_value = "")]
    feedback: String,
    #[arg(long)]
    date: Option<NaiveDate>,
}

impl From<TeacherFields> for TeacherEvaluationRow {
    fn from(fields: TeacherFields) -> Self {
        TeacherEvaluationRow {
            student_id: fields.student_id,
            student_name: fields.student_name,
            teacher_name: fields.teacher_name,
            class_code: fields.class_code,
            score: fields.score,
            attitude: fields.attitude,
            participation: fields.participation,
            feedback: fields.feedback,
            evaluation_date: fields.date,
        }
    }
}

#[derive(clap::Args)]
struct GraduationFields {
    #[arg(long)]
    student_id: String,
    #[arg(long, default_value = "")]
    student_name: String,
    #[arg(long)]
    gpa: Option<f64>,
    #[arg(long)]
    total_credits: Option<i32>,
    #[arg(long)]
    required_credits: Option<i32>,
    #[arg(long)]
    thesis_score: Option<f64>,
    #[arg(long)]
    final_exam_score: Option<f64>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long, default_value = "")]
    notes: String,
}

impl From<GraduationFields> for GraduationEvaluationRow {
    fn from(fields: GraduationFields) -> Self {
        GraduationEvaluationRow {
            student_id: fields.student_id,
            student_name: fields.student_name,
            gpa: fields.gpa,
            total_credits: fields.total_credits,
            required_credits: fields.required_credits,
            thesis_score: fields.thesis_score,
            final_exam_score: fields.final_exam_score,
            status: fields.status,
            evaluation_date: fields.date,
            notes: fields.notes,
        }
    }
}

/// Flags accepted by `update`; anything left out keeps its stored value.
#[derive(clap::Args)]
struct TeacherChanges {
    #[arg(long)]
    student_id: Option<String>,
    #[arg(long)]
    student_name: Option<String>,
    #[arg(long)]
    teacher_name: Option<String>,
    #[arg(long)]
    class_code: Option<String>,
    #[arg(long)]
    score: Option<f64>,
    #[arg(long)]
    attitude: Option<f64>,
    #[arg(long)]
    participation: Option<f64>,
    #[arg(long)]
    feedback: Option<String>,
    #[arg(long)]
    date: Option<NaiveDate>,
}

impl From<TeacherChanges> for TeacherEvaluationPatch {
    fn from(changes: TeacherChanges) -> Self {
        TeacherEvaluationPatch {
            student_id: changes.student_id,
            student_name: changes.student_name,
            teacher_name: changes.teacher_name,
            class_code: changes.class_code,
            score: changes.score,
            attitude: changes.attitude,
            participation: changes.participation,
            feedback: changes.feedback,
            evaluation_date: changes.date,
        }
    }
}

#[derive(clap::Args)]
struct GraduationChanges {
    #[arg(long)]
    student_id: Option<String>,
    #[arg(long)]
    student_name: Option<String>,
    #[arg(long)]
    gpa: Option<f64>,
    #[arg(long)]
    total_credits: Option<i32>,
    #[arg(long)]
    required_credits: Option<i32>,
    #[arg(long)]
    thesis_score: Option<f64>,
    #[arg(long)]
    final_exam_score: Option<f64>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    notes: Option<String>,
}

impl From<GraduationChanges> for GraduationEvaluationPatch {
    fn from(changes: GraduationChanges) -> Self {
        GraduationEvaluationPatch {
            student_id: changes.student_id,
            student_name: changes.student_name,
            gpa: changes.gpa,
            total_credits: changes.total_credits,
            required_credits: changes.required_credits,
            thesis_score: changes.thesis_score,
            final_exam_score: changes.final_exam_score,
            status: changes.status,
            evaluation_date: changes.date,
            notes: changes.notes,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportKind {
    Teacher,
    Graduation,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Id,
    Name,
    Date,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;
    let max_connections = match std::env::var("PROMOTION_REVIEW_MAX_CONNECTIONS") {
        Ok(value) => value
            .parse()
            .context("PROMOTION_REVIEW_MAX_CONNECTIONS must be a positive integer")?,
        Err(_) => 5,
    };
    let actor = actor_from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::CheckDb => {
            for count in db::table_counts(&pool).await? {
                println!("- {}: {} rows", count.table, count.rows);
            }
        }
        Commands::Teacher { action } => teacher_command(&pool, &actor, action).await?,
        Commands::Graduation { action } => graduation_command(&pool, &actor, action).await?,
        Commands::Import { kind, csv } => {
            let kind = match kind {
                ImportKind::Teacher => EvaluationKind::Teacher,
                ImportKind::Graduation => EvaluationKind::Graduation,
            };
            let inserted = db::import_csv(&pool, &actor, kind, &csv).await?;
            println!("Inserted {inserted} evaluations from {}.", csv.display());
        }
        Commands::Promote {
            sort,
            failed_only,
            limit,
        } => {
            let mut results = load_results(&pool).await?;
            let key = match sort {
                SortArg::Id => SortKey::StudentId,
                SortArg::Name => SortKey::Name,
                SortArg::Date => SortKey::Date,
            };
            promotion::sort_results(&mut results, key);

            if results.is_empty() {
                println!("No evaluations recorded yet.");
                return Ok(());
            }

            let summary = promotion::summarize(&results);
            println!(
                "{} passed, {} failed of {} students ({}% pass rate)",
                summary.passed, summary.failed, summary.total, summary.pass_rate_pct
            );
            for result in results
                .iter()
                .filter(|r| !failed_only || r.final_result == models::FinalResult::Fail)
                .take(limit)
            {
                println!(
                    "- {} ({}) {}: {}",
                    result.student_name, result.student_id, result.final_result, result.reason
                );
            }
        }
        Commands::Report { out } => {
            let mut results = load_results(&pool).await?;
            promotion::sort_results(&mut results, SortKey::Name);
            let report = report::build_report(&results, Utc::now().date_naive());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { format, out } => {
            let mut results = load_results(&pool).await?;
            promotion::sort_results(&mut results, SortKey::StudentId);
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            match format {
                ExportFormat::Csv => report::write_csv(&results, file)?,
                ExportFormat::Json => report::write_json(&results, file)?,
            }

            let activity = Activity {
                action: ActionType::Export,
                resource_type: db::PROMOTION_RESOURCE,
                resource_id: None,
                description: format!("exported {} promotion results to {}", results.len(), out.display()),
                actor: &actor,
            };
            db::log_activity(&pool, &activity, None).await?;
            println!("Exported {} results to {}.", results.len(), out.display());
        }
        Commands::Logs { limit } => {
            let entries = db::fetch_activity(&pool, limit).await?;
            if entries.is_empty() {
                println!("No activity recorded yet.");
            }
            for entry in entries {
                let resource = match &entry.resource_id {
                    Some(id) => format!("{}/{id}", entry.resource_type),
                    None => entry.resource_type.clone(),
                };
                println!(
                    "{} {} ({}) {} {} [{}] {}{}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.username,
                    entry.user_role,
                    entry.action,
                    resource,
                    entry.status,
                    entry.description,
                    entry
                        .error_message
                        .map(|message| format!(" ({message})"))
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn actor_from_env() -> anyhow::Result<Actor> {
    let username = std::env::var("PROMOTION_REVIEW_USER").unwrap_or_else(|_| "cli".to_string());
    let role: Role = std::env::var("PROMOTION_REVIEW_ROLE")
        .unwrap_or_else(|_| "admin".to_string())
        .parse()
        .context("PROMOTION_REVIEW_ROLE must be admin, teacher or viewer")?;
    Ok(Actor { username, role })
}

async fn load_results(pool: &PgPool) -> anyhow::Result<Vec<models::PromotionResult>> {
    let teacher = db::fetch_teacher_evaluations(pool).await?;
    let graduation = db::fetch_graduation_evaluations(pool).await?;
    let results = promotion::compute_promotion_results(&teacher, &graduation);
    tracing::debug!(
        teacher = teacher.len(),
        graduation = graduation.len(),
        results = results.len(),
        "computed promotion results"
    );
    Ok(results)
}

async fn teacher_command(pool: &PgPool, actor: &Actor, action: TeacherAction) -> anyhow::Result<()> {
    match action {
        TeacherAction::List => {
            let evaluations = db::fetch_teacher_evaluations(pool).await?;
            if evaluations.is_empty() {
                println!("No teacher evaluations recorded.");
            }
            for e in evaluations {
                println!(
                    "{} {} ({}) score {} attitude {} participation {} on {}",
                    e.id, e.student_name, e.student_id, e.score, e.attitude, e.participation,
                    e.evaluation_date
                );
            }
        }
        TeacherAction::Add(fields) => {
            let record = TeacherEvaluationRow::from(fields).into_record(Uuid::new_v4())?;
            db::insert_teacher_evaluation(pool, actor, &record).await?;
            println!("Added teacher evaluation {}.", record.id);
        }
        TeacherAction::Update { id, changes } => {
            let current = db::fetch_teacher_evaluation(pool, id).await?;
            let record = TeacherEvaluationPatch::from(changes).apply(&current)?;
            db::update_teacher_evaluation(pool, actor, &record).await?;
            println!("Updated teacher evaluation {id}.");
        }
        TeacherAction::Delete { id } => {
            db::delete_teacher_evaluation(pool, actor, id).await?;
            println!("Deleted teacher evaluation {id}.");
        }
    }
    Ok(())
}

async fn graduation_command(
    pool: &PgPool,
    actor: &Actor,
    action: GraduationAction,
) -> anyhow::Result<()> {
    match action {
        GraduationAction::List => {
            let evaluations = db::fetch_graduation_evaluations(pool).await?;
            if evaluations.is_empty() {
                println!("No graduation evaluations recorded.");
            }
            for e in evaluations {
                println!(
                    "{} {} ({}) GPA {:.2} credits {}/{} thesis {} final {} [{}] on {}",
                    e.id,
                    e.student_name,
                    e.student_id,
                    e.gpa,
                    e.total_credits,
                    e.required_credits,
                    e.thesis_score,
                    e.final_exam_score,
                    e.status,
                    e.evaluation_date
                );
            }
        }
        GraduationAction::Add(fields) => {
            let record = GraduationEvaluationRow::from(fields).into_record(Uuid::new_v4())?;
            db::insert_graduation_evaluation(pool, actor, &record).await?;
            println!("Added graduation evaluation {}.", record.id);
        }
        GraduationAction::Update { id, changes } => {
            let current = db::fetch_graduation_evaluation(pool, id).await?;
            let record = GraduationEvaluationPatch::from(changes).apply(&current)?;
            db::update_graduation_evaluation(pool, actor, &record).await?;
            println!("Updated graduation evaluation {id}.");
        }
        GraduationAction::Delete { id } => {
            db::delete_graduation_evaluation(pool, actor, id).await?;
            println!("Deleted graduation evaluation {id}.");
        }
    }
    Ok(())
}
