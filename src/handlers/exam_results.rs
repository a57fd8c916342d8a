// src/handlers/exam_results.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::exam::percentage_of,
    models::exam_result::{CreateExamResultRequest, ExamResult, ExamResultSummary},
    utils::jwt::Claims,
};

#[derive(Debug, Deserialize)]
pub struct ListResultsParams {
    pub subject: Option<String>,
    pub limit: Option<i64>,
}

/// List the current user's exam results, newest first. The `details` blob is
/// omitted; fetch a single result for the full graded exam.
#[utoipa::path(
    get,
    path = "/api/exam-results",
    params(
        ("subject" = Option<String>, Query, description = "Filter by subject"),
        ("limit" = Option<i64>, Query, description = "Max results to return")
    ),
    responses(
        (status = 200, description = "Result summaries", body = [ExamResultSummary]),
        (status = 401, description = "Not signed in")
    ),
    tag = "exam-results"
)]
pub async fn list_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ListResultsParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let results = sqlx::query_as::<_, ExamResultSummary>(
        r#"
        SELECT id, subject, score, max_score, percentage, question_count,
               time_spent_secs, created_at
        FROM exam_results
        WHERE user_id = $1
          AND ($2::TEXT IS NULL OR subject = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(&params.subject)
    .bind(limit)
    .fetch_all(&pool)
    .await?;

    Ok(Json(results))
}

/// Record a finished exam.
///
/// The percentage is always recomputed from score and max score; a client
/// that sends a different value gets the corrected one back.
#[utoipa::path(
    post,
    path = "/api/exam-results",
    request_body = CreateExamResultRequest,
    responses(
        (status = 201, description = "Stored result", body = ExamResult),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Not signed in")
    ),
    tag = "exam-results"
)]
pub async fn create_result(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.score > payload.max_score {
        return Err(AppError::BadRequest(
            "score cannot exceed maxScore".to_string(),
        ));
    }

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let percentage = percentage_of(payload.score as u32, payload.max_score as u32) as i32;
    if let Some(claimed) = payload.percentage {
        if claimed != percentage {
            tracing::warn!(
                claimed,
                computed = percentage,
                "client-sent percentage disagreed with score/maxScore, storing computed value"
            );
        }
    }

    let result = sqlx::query_as::<_, ExamResult>(
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
    .bind(user_id)
    .bind(payload.subject.trim().to_lowercase())
    .bind(payload.score)
    .bind(payload.max_score)
    .bind(percentage)
    .bind(payload.question_count)
    .bind(payload.time_spent_secs)
    .bind(payload.details.unwrap_or_else(|| json!({})))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store exam result: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// Fetch one result with the full graded exam. Results belong to their
/// owner; anything else is a 404.
#[utoipa::path(
    get,
    path = "/api/exam-results/{id}",
    params(("id" = Uuid, Path, description = "Result id")),
    responses(
        (status = 200, description = "Full result", body = ExamResult),
        (status = 404, description = "No such result for this user")
    ),
    tag = "exam-results"
)]
pub async fn get_result(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let result = sqlx::query_as::<_, ExamResult>(
        r#"
        SELECT id, user_id, subject, score, max_score, percentage,
               question_count, time_spent_secs, details, created_at
        FROM exam_results
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Exam result not found".to_string()))?;

    Ok(Json(result))
}
