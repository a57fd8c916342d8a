// src/handlers/attempts.rs

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use sqlx::types::Json as SqlJson;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    ai::{generate, grading},
    db,
    error::AppError,
    exam_session::{ExamPhase, ExamSession, TickOutcome},
    models::exam::{ContentSource, PublicQuestion, Subject},
    models::exam_result::ExamResult,
    state::AppState,
    utils::jwt::VerifiedUser,
};

/// Everything the exam screen needs to render an attempt. Questions go out
/// through `PublicQuestion`, so answer keys never leave the server while the
/// attempt is live.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub subject: Subject,
    pub phase: ExamPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ContentSource>,
    pub questions: Vec<PublicQuestion>,
    pub total_points: u32,
    pub duration_minutes: u32,
    pub current_question: usize,
    /// Saved answers keyed by question index (stringified in JSON).
    #[schema(value_type = Object)]
    pub answers: BTreeMap<usize, String>,
    pub remaining_seconds: u32,
    pub time_expired: bool,
    pub grading_progress: u8,
    pub generation_attempts: u32,
    pub blocks_navigation: bool,
}

impl AttemptView {
    fn from_session(session: &ExamSession) -> Self {
        let exam = session.exam.as_ref();
        Self {
            subject: session.subject,
            phase: session.phase,
            title: exam.map(|e| e.title.clone()),
            source: exam.map(|e| e.source),
            questions: exam.map(|e| e.public_questions()).unwrap_or_default(),
            total_points: exam.map(|e| e.total_points).unwrap_or(0),
            duration_minutes: exam.map(|e| e.duration_minutes).unwrap_or(0),
            current_question: session.current_question,
            answers: session.answers.clone(),
            remaining_seconds: session.remaining_seconds,
            time_expired: session.time_expired,
            grading_progress: session.grading_progress,
            generation_attempts: session.generation_attempts,
            blocks_navigation: session.blocks_navigation(),
        }
    }
}

async fn load_attempt(
    pool: &PgPool,
    user_id: i64,
    subject: Subject,
) -> Result<Option<ExamSession>, AppError> {
    let row = db::with_retry("load exam attempt", || {
        let pool = pool.clone();
        async move {
            sqlx::query_scalar::<_, SqlJson<ExamSession>>(
                "SELECT snapshot FROM exam_attempts WHERE user_id = $1 AND subject = $2",
            )
            .bind(user_id)
            .bind(subject.as_str())
            .fetch_optional(&pool)
            .await
        }
    })
    .await?;
    Ok(row.map(|snapshot| snapshot.0))
}

/// Upserts the snapshot. Called after every transition so a reconnecting
/// client resumes exactly where the last request left the attempt.
async fn save_attempt(pool: &PgPool, user_id: i64, session: &ExamSession) -> Result<(), AppError> {
    let subject = session.subject;
    db::with_retry("save exam attempt", || {
        let pool = pool.clone();
        let snapshot = SqlJson(session.clone());
        async move {
            sqlx::query(
                r#"
                INSERT INTO exam_attempts (user_id, subject, snapshot, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (user_id, subject)
                DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(subject.as_str())
            .bind(snapshot)
            .execute(&pool)
            .await
            .map(|_| ())
        }
    })
    .await
}

async fn discard_attempt(pool: &PgPool, user_id: i64, subject: Subject) -> Result<bool, AppError> {
    let result = db::with_retry("discard exam attempt", || {
        let pool = pool.clone();
        async move {
            sqlx::query("DELETE FROM exam_attempts WHERE user_id = $1 AND subject = $2")
                .bind(user_id)
                .bind(subject.as_str())
                .execute(&pool)
                .await
        }
    })
    .await?;
    Ok(result.rows_affected() > 0)
}

fn parse_subject(raw: &str) -> Result<Subject, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

/// Create an attempt for a subject and generate its exam.
///
/// AI generation gets up to three tries across as many requests; the first
/// two failures keep the attempt in `generation_failed` and return 503 so
/// the client can offer a retry. The third failure, or a missing provider,
/// substitutes the deterministic fallback exam instead, so the attempt
/// always ends up ready to start.
#[utoipa::path(
    post,
    path = "/api/exam-attempts/{subject}",
    params(("subject" = String, Path, description = "Subject slug, e.g. math")),
    responses(
        (status = 200, description = "Attempt with its exam installed", body = AttemptView),
        (status = 400, description = "Unknown subject"),
        (status = 409, description = "An attempt for this subject already exists"),
        (status = 503, description = "Generation failed; retry allowed")
    ),
    tag = "exam-attempts"
)]
pub async fn create_attempt(
    State(state): State<AppState>,
    user: VerifiedUser,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let subject = parse_subject(&subject)?;

    let mut session = match load_attempt(&state.pool, user.id, subject).await? {
        Some(existing)
            if existing.phase.blocks_navigation()
                || existing.phase == ExamPhase::ReadyToStart
                || existing.phase == ExamPhase::GradingFailed =>
        {
            return Err(AppError::Conflict(format!(
                "An exam attempt for {} already exists (phase: {})",
                subject, existing.phase
            )));
        }
        // A failed generation keeps its retry accounting.
        Some(existing) if existing.phase == ExamPhase::GenerationFailed => existing,
        _ => ExamSession::new(subject),
    };

    if !state.ai.is_configured() {
        session.exam_ready(generate::fallback_exam(subject))?;
        save_attempt(&state.pool, user.id, &session).await?;
        return Ok(Json(AttemptView::from_session(&session)));
    }

    let attempt_no = session.note_generation_attempt();
    match generate::generate_exam_once(&state.ai, subject, None).await {
        Ok(exam) => {
            session.exam_ready(exam)?;
            save_attempt(&state.pool, user.id, &session).await?;
            Ok(Json(AttemptView::from_session(&session)))
        }
        Err(e) => {
            tracing::warn!(
                "Exam generation for {} failed on attempt {}: {}",
                subject,
                attempt_no,
                e
            );
            if session.generation_exhausted() {
                session.exam_ready(generate::fallback_exam(subject))?;
                save_attempt(&state.pool, user.id, &session).await?;
                Ok(Json(AttemptView::from_session(&session)))
            } else {
                session.generation_failed()?;
                save_attempt(&state.pool, user.id, &session).await?;
                Err(AppError::AiUnavailable(
                    "Exam generation failed, please try again".to_string(),
                ))
            }
        }
    }
}

/// Resume an attempt. The countdown is recomputed from the stored deadline,
/// so an attempt that quietly ran out while the client was away comes back
/// already auto-submitted.
#[utoipa::path(
    get,
    path = "/api/exam-attempts/{subject}",
    params(("subject" = String, Path, description = "Subject slug")),
    responses(
        (status = 200, description = "Current attempt state", body = AttemptView),
        (status = 404, description = "No attempt for this subject")
    ),
    tag = "exam-attempts"
)]
pub async fn get_attempt(
    State(pool): State<PgPool>,
    user: VerifiedUser,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let subject = parse_subject(&subject)?;
    let mut session = load_attempt(&pool, user.id, subject)
        .await?
        .ok_or_else(|| AppError::NotFound("No exam attempt for this subject".to_string()))?;

    if session.sync_clock(Utc::now()) == TickOutcome::Expired {
        save_attempt(&pool, user.id, &session).await?;
    }

    Ok(Json(AttemptView::from_session(&session)))
}

/// Start the countdown.
#[utoipa::path(
    post,
    path = "/api/exam-attempts/{subject}/start",
    params(("subject" = String, Path, description = "Subject slug")),
    responses(
        (status = 200, description = "Attempt now in progress", body = AttemptView),
        (status = 404, description = "No attempt for this subject"),
        (status = 409, description = "Attempt is not ready to start")
    ),
    tag = "exam-attempts"
)]
pub async fn start_attempt(
    State(pool): State<PgPool>,
    user: VerifiedUser,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let subject = parse_subject(&subject)?;
    let mut session = load_attempt(&pool, user.id, subject)
        .await?
        .ok_or_else(|| AppError::NotFound("No exam attempt for this subject".to_string()))?;

    session.start(Utc::now())?;
    save_attempt(&pool, user.id, &session).await?;

    Ok(Json(AttemptView::from_session(&session)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question_index: usize,
    pub answer: String,
}

/// Record an answer and move the bookmark to that question.
///
/// The clock is synced first, so an answer that arrives after the deadline
/// is rejected with a conflict and the auto-submitted snapshot is what gets
/// persisted.
#[utoipa::path(
    put,
    path = "/api/exam-attempts/{subject}/answer",
    params(("subject" = String, Path, description = "Subject slug")),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AttemptView),
        (status = 400, description = "Question index out of range"),
        (status = 404, description = "No attempt for this subject"),
        (status = 409, description = "Answers are locked or the attempt is not in progress")
    ),
    tag = "exam-attempts"
)]
pub async fn put_answer(
    State(pool): State<PgPool>,
    user: VerifiedUser,
    Path(subject): Path<String>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subject = parse_subject(&subject)?;
    let mut session = load_attempt(&pool, user.id, subject)
        .await?
        .ok_or_else(|| AppError::NotFound("No exam attempt for this subject".to_string()))?;

    session.sync_clock(Utc::now());
    let outcome = session
        .set_answer(payload.question_index, payload.answer)
        .and_then(|_| session.select_question(payload.question_index));
    save_attempt(&pool, user.id, &session).await?;
    outcome?;

    Ok(Json(AttemptView::from_session(&session)))
}

/// Submit the attempt: grade it, persist the result, discard the snapshot.
///
/// A submission with unanswered questions is rejected unless the clock ran
/// out, in which case expiry already pushed the attempt into grading and
/// this call just completes it. When storing the result fails the attempt
/// parks in `grading_failed`, and submitting again retries from there.
#[utoipa::path(
    post,
    path = "/api/exam-attempts/{subject}/submit",
    params(("subject" = String, Path, description = "Subject slug")),
    responses(
        (status = 200, description = "Stored result plus the grading report"),
        (status = 400, description = "Unanswered questions remain"),
        (status = 404, description = "No attempt for this subject"),
        (status = 409, description = "Attempt is not in a submittable phase")
    ),
    tag = "exam-attempts"
)]
pub async fn submit_attempt(
    State(state): State<AppState>,
    user: VerifiedUser,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let subject = parse_subject(&subject)?;
    let mut session = load_attempt(&state.pool, user.id, subject)
        .await?
        .ok_or_else(|| AppError::NotFound("No exam attempt for this subject".to_string()))?;

    if session.sync_clock(Utc::now()) == TickOutcome::Expired {
        save_attempt(&state.pool, user.id, &session).await?;
    }

    if session.phase == ExamPhase::GradingFailed {
        session.retry_grading()?;
    } else {
        session.submit()?;
    }
    session.advance_grading_progress(30)?;
    save_attempt(&state.pool, user.id, &session).await?;

    let exam = session
        .exam
        .clone()
        .ok_or_else(|| AppError::InternalServerError("Attempt has no exam".to_string()))?;

    let answers: Vec<Option<String>> = (0..exam.questions.len())
        .map(|i| {
            session
                .answers
                .get(&i)
                .cloned()
                .filter(|a| !a.trim().is_empty())
        })
        .collect();
    let time_spent_secs =
        (exam.duration_minutes * 60).saturating_sub(session.remaining_seconds) as i32;

    let report = grading::grade_exam(&state.ai, &exam, &answers).await;
    session.advance_grading_progress(60)?;

    let score = report.score as i32;
    let max_score = report.max_score as i32;
    let percentage = report.percentage as i32;
    let question_count = report.question_count as i32;
    let details = grading::result_details(&exam, &answers, &report);

    let insert = db::with_retry("save exam result", || {
        let pool = state.pool.clone();
        let details = details.clone();
        async move {
            sqlx::query_as::<_, ExamResult>(
                r#"
                INSERT INTO exam_results
                    (id, user_id, subject, score, max_score, percentage, question_count,
                     time_spent_secs, details)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id, user_id, subject, score, max_score, percentage,
                          question_count, time_spent_secs, details, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user.id)
            .bind(subject.as_str())
            .bind(score)
            .bind(max_score)
            .bind(percentage)
            .bind(question_count)
            .bind(time_spent_secs)
            .bind(details)
            .fetch_one(&pool)
            .await
        }
    })
    .await;

    match insert {
        Ok(result) => {
            session.complete()?;
            if let Err(e) = discard_attempt(&state.pool, user.id, subject).await {
                tracing::warn!("Could not discard completed exam attempt: {}", e);
            }
            Ok(Json(json!({ "result": result, "report": report })))
        }
        Err(e) => {
            tracing::error!("Failed to store graded exam: {}", e);
            session.grading_failed()?;
            save_attempt(&state.pool, user.id, &session).await?;
            Err(e)
        }
    }
}

/// Abandon an attempt. The snapshot is dropped and nothing is graded.
#[utoipa::path(
    delete,
    path = "/api/exam-attempts/{subject}",
    params(("subject" = String, Path, description = "Subject slug")),
    responses(
        (status = 204, description = "Attempt discarded"),
        (status = 404, description = "No attempt for this subject")
    ),
    tag = "exam-attempts"
)]
pub async fn abandon_attempt(
    State(pool): State<PgPool>,
    user: VerifiedUser,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let subject = parse_subject(&subject)?;
    let removed = discard_attempt(&pool, user.id, subject).await?;
    if !removed {
        return Err(AppError::NotFound("No exam attempt for this subject".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
