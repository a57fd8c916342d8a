// src/handlers/exams.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    ai::{AiClient, generate, grading},
    error::AppError,
    models::exam::{Exam, GradingReport, Subject},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateExamRequest {
    pub subject: String,
    pub topic: Option<String>,
}

/// Generate a practice exam for a subject.
///
/// Uses the AI provider when available and silently falls back to the
/// deterministic template otherwise; the response's `source` field says
/// which happened. This endpoint never fails on provider trouble.
#[utoipa::path(
    post,
    path = "/api/generate-exam",
    request_body = GenerateExamRequest,
    responses(
        (status = 200, description = "A ready-to-take exam", body = Exam),
        (status = 400, description = "Unknown subject")
    ),
    tag = "exams"
)]
pub async fn generate_exam(
    State(ai): State<AiClient>,
    Json(payload): Json<GenerateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subject: Subject = payload.subject.parse().map_err(AppError::BadRequest)?;

    let exam = generate::generate_exam(&ai, subject, payload.topic.as_deref()).await;
    Ok(Json(exam))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GradeExamRequest {
    pub exam: Exam,
    /// One entry per question, in order; null for unanswered.
    pub answers: Vec<Option<String>>,
    /// Echoed by some clients; grading reads the exam itself.
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub time_spent_secs: Option<i64>,
}

/// Grade a completed exam.
///
/// AI grading when available, deterministic local grading otherwise; either
/// way the percentage is recomputed server-side so it always matches the
/// returned score and max score.
#[utoipa::path(
    post,
    path = "/api/grade-exam",
    request_body = GradeExamRequest,
    responses(
        (status = 200, description = "Grading report", body = GradingReport),
        (status = 400, description = "Answers do not line up with the exam")
    ),
    tag = "exams"
)]
pub async fn grade_exam(
    State(ai): State<AiClient>,
    Json(payload): Json<GradeExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.exam.questions.is_empty() {
        return Err(AppError::BadRequest("Exam has no questions".to_string()));
    }
    if payload.answers.len() > payload.exam.questions.len() {
        return Err(AppError::BadRequest(format!(
            "Got {} answers for {} questions",
            payload.answers.len(),
            payload.exam.questions.len()
        )));
    }

    let report = grading::grade_exam(&ai, &payload.exam, &payload.answers).await;
    Ok(Json(report))
}
