use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::ingest;
use crate::models::{
    ActionType, ActivityLogEntry, Actor, GraduationEvaluation, GraduationStatus, TableCount,
    TeacherEvaluation,
};

pub const TEACHER_RESOURCE: &str = "teacher_evaluation";
pub const GRADUATION_RESOURCE: &str = "graduation_evaluation";
pub const PROMOTION_RESOURCE: &str = "promotion_result";

const TABLES: [&str; 3] = ["teacher_evaluations", "graduation_evaluations", "activity_logs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationKind {
    Teacher,
    Graduation,
}

/// What a write was about, for the activity log.
pub struct Activity<'a> {
    pub action: ActionType,
    pub resource_type: &'static str,
    pub resource_id: Option<String>,
    pub description: String,
    pub actor: &'a Actor,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let date = |month, day| {
        NaiveDate::from_ymd_opt(2026, month, day).context("invalid seed date")
    };

    let teachers = vec![
        (
            "6a4b3c1e-1f0a-4b59-9d0e-0d7a4c8b2e11",
            "S1001",
            "Avery Lee",
            "Dana Whitfield",
            "CS-301",
            78.5,
            85.0,
            80.0,
            date(5, 12)?,
        ),
        (
            "1f2e3d4c-5b6a-4978-8a9b-0c1d2e3f4a52",
            "S1002",
            "Jules Moreno",
            "Dana Whitfield",
            "CS-301",
            54.0,
            70.0,
            65.0,
            date(5, 12)?,
        ),
        (
            "9b8a7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c63",
            "S1003",
            "Kiara Patel",
            "Omar Haddad",
            "EE-210",
            91.0,
            88.0,
            95.0,
            date(5, 14)?,
        ),
    ];

    for (id, student_id, student_name, teacher_name, class_code, score, attitude, participation, on) in
        teachers
    {
        sqlx::query(
            r#"
            INSERT INTO promotion_review.teacher_evaluations
            (id, student_id, student_name, teacher_name, class_code, score, attitude, participation, evaluation_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(student_id)
        .bind(student_name)
        .bind(teacher_name)
        .bind(class_code)
        .bind(score)
        .bind(attitude)
        .bind(participation)
        .bind(on)
        .execute(pool)
        .await?;
    }

    let graduations = vec![
        (
            "c3d2e1f0-a9b8-4c7d-9e6f-5a4b3c2d1e74",
            "S1001",
            "Avery Lee",
            3.1,
            128,
            72.0,
            68.0,
            "passed",
            date(6, 2)?,
        ),
        (
            "d4e3f2a1-b0c9-4d8e-8f7a-6b5c4d3e2f85",
            "S1002",
            "Jules Moreno",
            2.4,
            104,
            61.0,
            58.0,
            "pending",
            date(6, 2)?,
        ),
        (
            "e5f4a3b2-c1d0-4e9f-9a8b-7c6d5e4f3a96",
            "S1004",
            "Rowan Ibarra",
            3.6,
            132,
            88.0,
            84.0,
            "pending",
            date(6, 3)?,
        ),
    ];

    for (id, student_id, student_name, gpa, total_credits, thesis, final_exam, status, on) in
        graduations
    {
        sqlx::query(
            r#"
            INSERT INTO promotion_review.graduation_evaluations
            (id, student_id, student_name, gpa, total_credits, required_credits,
             thesis_score, final_exam_score, status, evaluation_date)
            VALUES ($1, $2, $3, $4, $5, 120, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(student_id)
        .bind(student_name)
        .bind(gpa)
        .bind(total_credits)
        .bind(thesis)
        .bind(final_exam)
        .bind(status)
        .bind(on)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn table_counts(pool: &PgPool) -> anyhow::Result<Vec<TableCount>> {
    let mut counts = Vec::new();

    for table in TABLES {
        let query = format!("SELECT COUNT(*) AS count FROM promotion_review.{table}");
        let rows: i64 = sqlx::query(&query)
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?
            .get("count");
        counts.push(TableCount { table, rows });
    }

    Ok(counts)
}

// Insertion order, so the newest record per student is the one the aggregator keeps.
pub async fn fetch_teacher_evaluations(pool: &PgPool) -> anyhow::Result<Vec<TeacherEvaluation>> {
    let rows = sqlx::query(
        "SELECT id, student_id, student_name, teacher_name, class_code, score, attitude, \
         participation, feedback, evaluation_date \
         FROM promotion_review.teacher_evaluations \
         ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch teacher evaluations")?;

    Ok(rows.iter().map(teacher_from_row).collect())
}

pub async fn fetch_graduation_evaluations(
    pool: &PgPool,
) -> anyhow::Result<Vec<GraduationEvaluation>> {
    let rows = sqlx::query(
        "SELECT id, student_id, student_name, gpa, total_credits, required_credits, \
         thesis_score, final_exam_score, status, evaluation_date, notes \
         FROM promotion_review.graduation_evaluations \
         ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch graduation evaluations")?;

    rows.iter().map(graduation_from_row).collect()
}

pub async fn fetch_teacher_evaluation(pool: &PgPool, id: Uuid) -> anyhow::Result<TeacherEvaluation> {
    let row = sqlx::query(
        "SELECT id, student_id, student_name, teacher_name, class_code, score, attitude, \
         participation, feedback, evaluation_date \
         FROM promotion_review.teacher_evaluations \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no teacher evaluation with id {id}"))?;

    Ok(teacher_from_row(&row))
}

pub async fn fetch_graduation_evaluation(
    pool: &PgPool,
    id: Uuid,
) -> anyhow::Result<GraduationEvaluation> {
    let row = sqlx::query(
        "SELECT id, student_id, student_name, gpa, total_credits, required_credits, \
         thesis_score, final_exam_score, status, evaluation_date, notes \
         FROM promotion_review.graduation_evaluations \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no graduation evaluation with id {id}"))?;

    graduation_from_row(&row)
}

fn teacher_from_row(row: &PgRow) -> TeacherEvaluation {
    TeacherEvaluation {
        id: row.get("id"),
        student_id: row.get("student_id"),
        student_name: row.get("student_name"),
        teacher_name: row.get("teacher_name"),
        class_code: row.get("class_code"),
        score: row.get("score"),
        attitude: row.get("attitude"),
        participation: row.get("participation"),
        feedback: row.get("feedback"),
        evaluation_date: row.get("evaluation_date"),
    }
}

fn graduation_from_row(row: &PgRow) -> anyhow::Result<GraduationEvaluation> {
    let status: String = row.get("status");
    let status: GraduationStatus = status.parse()?;

    Ok(GraduationEvaluation {
        id: row.get("id"),
        student_id: row.get("student_id"),
        student_name: row.get("student_name"),
        gpa: row.get("gpa"),
        total_credits: row.get("total_credits"),
        required_credits: row.get("required_credits"),
        thesis_score: row.get("thesis_score"),
        final_exam_score: row.get("final_exam_score"),
        status,
        evaluation_date: row.get("evaluation_date"),
        notes: row.get("notes"),
    })
}

pub async fn insert_teacher_evaluation(
    pool: &PgPool,
    actor: &Actor,
    evaluation: &TeacherEvaluation,
) -> anyhow::Result<()> {
    let activity = Activity {
        action: ActionType::Create,
        resource_type: TEACHER_RESOURCE,
        resource_id: Some(evaluation.id.to_string()),
        description: format!("added teacher evaluation for {}", evaluation.student_id),
        actor,
    };
    audited(pool, activity, async {
        let mut conn = pool.acquire().await?;
        write_teacher(&mut conn, evaluation, false).await
    })
    .await
}

pub async fn update_teacher_evaluation(
    pool: &PgPool,
    actor: &Actor,
    evaluation: &TeacherEvaluation,
) -> anyhow::Result<()> {
    let activity = Activity {
        action: ActionType::Update,
        resource_type: TEACHER_RESOURCE,
        resource_id: Some(evaluation.id.to_string()),
        description: format!("updated teacher evaluation for {}", evaluation.student_id),
        actor,
    };
    audited(pool, activity, async {
        let mut conn = pool.acquire().await?;
        write_teacher(&mut conn, evaluation, true).await
    })
    .await
}

pub async fn delete_teacher_evaluation(pool: &PgPool, actor: &Actor, id: Uuid) -> anyhow::Result<()> {
    let activity = Activity {
        action: ActionType::Delete,
        resource_type: TEACHER_RESOURCE,
        resource_id: Some(id.to_string()),
        description: format!("deleted teacher evaluation {id}"),
        actor,
    };
    audited(pool, activity, delete_by_id(pool, "teacher_evaluations", id)).await
}

pub async fn insert_graduation_evaluation(
    pool: &PgPool,
    actor: &Actor,
    evaluation: &GraduationEvaluation,
) -> anyhow::Result<()> {
    let activity = Activity {
        action: ActionType::Create,
        resource_type: GRADUATION_RESOURCE,
        resource_id: Some(evaluation.id.to_string()),
        description: format!("added graduation evaluation for {}", evaluation.student_id),
        actor,
    };
    audited(pool, activity, async {
        let mut conn = pool.acquire().await?;
        write_graduation(&mut conn, evaluation, false).await
    })
    .await
}

pub async fn update_graduation_evaluation(
    pool: &PgPool,
    actor: &Actor,
    evaluation: &GraduationEvaluation,
) -> anyhow::Result<()> {
    let activity = Activity {
        action: ActionType::Update,
        resource_type: GRADUATION_RESOURCE,
        resource_id: Some(evaluation.id.to_string()),
        description: format!("updated graduation evaluation for {}", evaluation.student_id),
        actor,
    };
    audited(pool, activity, async {
        let mut conn = pool.acquire().await?;
        write_graduation(&mut conn, evaluation, true).await
    })
    .await
}

pub async fn delete_graduation_evaluation(
    pool: &PgPool,
    actor: &Actor,
    id: Uuid,
) -> anyhow::Result<()> {
    let activity = Activity {
        action: ActionType::Delete,
        resource_type: GRADUATION_RESOURCE,
        resource_id: Some(id.to_string()),
        description: format!("deleted graduation evaluation {id}"),
        actor,
    };
    audited(pool, activity, delete_by_id(pool, "graduation_evaluations", id)).await
}

async fn write_teacher(
    conn: &mut PgConnection,
    evaluation: &TeacherEvaluation,
    update: bool,
) -> anyhow::Result<()> {
    let statement = if update {
        r#"
        UPDATE promotion_review.teacher_evaluations
        SET student_id = $2, student_name = $3, teacher_name = $4, class_code = $5,
            score = $6, attitude = $7, participation = $8, feedback = $9, evaluation_date = $10
        WHERE id = $1
        "#
    } else {
        r#"
        INSERT INTO promotion_review.teacher_evaluations
        (id, student_id, student_name, teacher_name, class_code, score, attitude,
         participation, feedback, evaluation_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#
    };

    let result = sqlx::query(statement)
        .bind(evaluation.id)
        .bind(&evaluation.student_id)
        .bind(&evaluation.student_name)
        .bind(&evaluation.teacher_name)
        .bind(&evaluation.class_code)
        .bind(evaluation.score)
        .bind(evaluation.attitude)
        .bind(evaluation.participation)
        .bind(&evaluation.feedback)
        .bind(evaluation.evaluation_date)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("no teacher evaluation with id {}", evaluation.id);
    }
    Ok(())
}

async fn write_graduation(
    conn: &mut PgConnection,
    evaluation: &GraduationEvaluation,
    update: bool,
) -> anyhow::Result<()> {
    let statement = if update {
        r#"
        UPDATE promotion_review.graduation_evaluations
        SET student_id = $2, student_name = $3, gpa = $4, total_credits = $5,
            required_credits = $6, thesis_score = $7, final_exam_score = $8,
            status = $9, evaluation_date = $10, notes = $11
        WHERE id = $1
        "#
    } else {
        r#"
        INSERT INTO promotion_review.graduation_evaluations
        (id, student_id, student_name, gpa, total_credits, required_credits,
         thesis_score, final_exam_score, status, evaluation_date, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#
    };

    let result = sqlx::query(statement)
        .bind(evaluation.id)
        .bind(&evaluation.student_id)
        .bind(&evaluation.student_name)
        .bind(evaluation.gpa)
        .bind(evaluation.total_credits)
        .bind(evaluation.required_credits)
        .bind(evaluation.thesis_score)
        .bind(evaluation.final_exam_score)
        .bind(evaluation.status.as_str())
        .bind(evaluation.evaluation_date)
        .bind(&evaluation.notes)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("no graduation evaluation with id {}", evaluation.id);
    }
    Ok(())
}

async fn delete_by_id(pool: &PgPool, table: &str, id: Uuid) -> anyhow::Result<()> {
    let query = format!("DELETE FROM promotion_review.{table} WHERE id = $1");
    let result = sqlx::query(&query).bind(id).execute(pool).await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("no row with id {id} in {table}");
    }
    Ok(())
}

/// Runs `operation` on behalf of `activity.actor` and records the outcome.
/// Actors without write access are refused before the operation is polled.
pub async fn audited<T>(
    pool: &PgPool,
    activity: Activity<'_>,
    operation: impl std::future::Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    let outcome = if activity.actor.role.can_write() {
        operation.await
    } else {
        Err(anyhow::anyhow!(
            "{} ({}) is not allowed to modify records",
            activity.actor.username,
            activity.actor.role.as_str()
        ))
    };

    let error_message = outcome.as_ref().err().map(|err| format!("{err:#}"));
    match &error_message {
        None => tracing::info!(
            action = activity.action.as_str(),
            resource = activity.resource_type,
            user = %activity.actor.username,
            "{}",
            activity.description
        ),
        Some(message) => tracing::warn!(
            action = activity.action.as_str(),
            resource = activity.resource_type,
            user = %activity.actor.username,
            error = %message,
            "{} failed",
            activity.description
        ),
    }

    log_activity(pool, &activity, error_message.as_deref())
        .await
        .context("failed to write activity log")?;

    outcome
}

pub async fn log_activity(
    pool: &PgPool,
    activity: &Activity<'_>,
    error_message: Option<&str>,
) -> anyhow::Result<()> {
    let status = if error_message.is_some() { "failed" } else { "success" };

    sqlx::query(
        r#"
        INSERT INTO promotion_review.activity_logs
        (id, username, user_role, action, resource_type, resource_id, description, status, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&activity.actor.username)
    .bind(activity.actor.role.as_str())
    .bind(activity.action.as_str())
    .bind(activity.resource_type)
    .bind(activity.resource_id.as_deref())
    .bind(&activity.description)
    .bind(status)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_activity(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<ActivityLogEntry>> {
    let rows = sqlx::query(
        "SELECT username, user_role, action, resource_type, resource_id, description, \
         status, error_message, created_at \
         FROM promotion_review.activity_logs \
         ORDER BY created_at DESC \
         LIMIT $1",
    )
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::new();

    for row in rows {
        entries.push(ActivityLogEntry {
            username: row.get("username"),
            user_role: row.get("user_role"),
            action: row.get("action"),
            resource_type: row.get("resource_type"),
            resource_id: row.get("resource_id"),
            description: row.get("description"),
            status: row.get("status"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
        });
    }

    Ok(entries)
}

pub async fn import_csv(
    pool: &PgPool,
    actor: &Actor,
    kind: EvaluationKind,
    csv_path: &Path,
) -> anyhow::Result<usize> {
    let resource_type = match kind {
        EvaluationKind::Teacher => TEACHER_RESOURCE,
        EvaluationKind::Graduation => GRADUATION_RESOURCE,
    };
    let activity = Activity {
        action: ActionType::Import,
        resource_type,
        resource_id: None,
        description: format!("imported evaluations from {}", csv_path.display()),
        actor,
    };

    audited(pool, activity, import_rows(pool, kind, csv_path)).await
}

// Every row is validated before the first insert, and the inserts share one
// transaction: a bad file leaves the tables untouched.
async fn import_rows(pool: &PgPool, kind: EvaluationKind, csv_path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut tx = pool.begin().await?;

    let inserted = match kind {
        EvaluationKind::Teacher => {
            let records = ingest::read_teacher_csv(file)?;
            for record in &records {
                write_teacher(&mut tx, record, false).await?;
            }
            records.len()
        }
        EvaluationKind::Graduation => {
            let records = ingest::read_graduation_csv(file)?;
            for record in &records {
                write_graduation(&mut tx, record, false).await?;
            }
            records.len()
        }
    };

    tx.commit().await?;
    Ok(inserted)
}
