// src/handlers/profile.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use sqlx::{PgPool, Postgres, QueryBuilder, prelude::FromRow};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam_result::{DashboardStats, SubjectStats},
        user::{ProfileResponse, UpdateProfileRequest},
    },
    utils::jwt::Claims,
};

const PROFILE_COLUMNS: &str =
    "id, email, name, school, phone, avatar_data, created_at";

/// Get the current user's profile.
#[utoipa::path(
    get,
    path = "/api/user/profile",
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Not signed in")
    ),
    tag = "user"
)]
pub async fn get_profile(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let profile = sqlx::query_as::<_, ProfileResponse>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(profile))
}

/// Partially update the current user's profile. Only fields present in the
/// payload change.
#[utoipa::path(
    put,
    path = "/api/user/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Not signed in")
    ),
    tag = "user"
)]
pub async fn update_profile(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    if payload.name.is_none()
        && payload.school.is_none()
        && payload.phone.is_none()
        && payload.avatar_data.is_none()
    {
        return get_profile(State(pool), Extension(claims)).await.map(IntoResponse::into_response);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }
    if let Some(school) = payload.school {
        separated.push("school = ");
        separated.push_bind_unseparated(school);
    }
    if let Some(phone) = payload.phone {
        separated.push("phone = ");
        separated.push_bind_unseparated(phone);
    }
    if let Some(avatar_data) = payload.avatar_data {
        separated.push("avatar_data = ");
        separated.push_bind_unseparated(avatar_data);
    }
    separated.push("updated_at = NOW()");

    builder.push(" WHERE id = ");
    builder.push_bind(user_id);
    builder.push(format!(" RETURNING {}", PROFILE_COLUMNS));

    let profile = builder
        .build_query_as::<ProfileResponse>()
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(profile).into_response())
}

#[derive(Debug, FromRow)]
struct TotalsRow {
    total_sessions: i64,
    total_messages: i64,
    exams_taken: i64,
    average_percentage: f64,
    total_study_secs: i64,
}

/// Dashboard aggregates: tutoring volume plus per-subject exam performance.
#[utoipa::path(
    get,
    path = "/api/user/stats",
    responses(
        (status = 200, description = "Dashboard stats", body = DashboardStats),
        (status = 401, description = "Not signed in")
    ),
    tag = "user"
)]
pub async fn get_stats(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    // Subqueries instead of joins: each aggregate walks its own index.
    let totals = sqlx::query_as::<_, TotalsRow>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM chat_sessions WHERE user_id = $1) AS total_sessions,
            (SELECT COALESCE(SUM(message_count), 0) FROM chat_sessions WHERE user_id = $1)
                AS total_messages,
            (SELECT COUNT(*) FROM exam_results WHERE user_id = $1) AS exams_taken,
            (SELECT ROUND(COALESCE(AVG(percentage), 0), 1)::FLOAT8 FROM exam_results
                WHERE user_id = $1) AS average_percentage,
            (SELECT COALESCE(SUM(time_spent_secs), 0) FROM exam_results WHERE user_id = $1)
                AS total_study_secs
        "#,
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    let subjects = sqlx::query_as::<_, SubjectStats>(
        r#"
        SELECT subject,
               COUNT(*) AS exams_taken,
               ROUND(COALESCE(AVG(percentage), 0), 1)::FLOAT8 AS average_percentage,
               COALESCE(MAX(percentage), 0) AS best_percentage
        FROM exam_results
        WHERE user_id = $1
        GROUP BY subject
        ORDER BY subject
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(DashboardStats {
        total_sessions: totals.total_sessions,
        total_messages: totals.total_messages,
        exams_taken: totals.exams_taken,
        average_percentage: totals.average_percentage,
        total_study_secs: totals.total_study_secs,
        subjects,
    }))
}
