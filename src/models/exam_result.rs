// src/models/exam_result.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Row type for the `exam_results` table.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: Uuid,

    #[serde(skip)]
    pub user_id: i64,

    pub subject: String,
    pub score: i32,
    pub max_score: i32,

    /// Always `round(100 * score / max_score)`; repaired on write if the
    /// client sends something else.
    pub percentage: i32,

    pub question_count: i32,

    /// Seconds the student spent, as reported by the client.
    pub time_spent_secs: i32,

    /// Full graded exam (questions, answers, per-question feedback).
    #[schema(value_type = Object)]
    pub details: serde_json::Value,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Row without `details`, for history lists and dashboard math.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExamResultSummary {
    pub id: Uuid,
    pub subject: String,
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub question_count: i32,
    pub time_spent_secs: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for recording a finished exam.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamResultRequest {
    #[validate(length(min = 1, max = 50))]
    pub subject: String,
    #[validate(range(min = 0, max = 100_000))]
    pub score: i32,
    #[validate(range(min = 1, max = 100_000))]
    pub max_score: i32,
    /// Recomputed server-side; accepted here for older clients.
    #[validate(range(min = 0, max = 100))]
    pub percentage: Option<i32>,
    #[validate(range(min = 1, max = 1000))]
    pub question_count: i32,
    #[validate(range(min = 0, max = 86_400))]
    pub time_spent_secs: i32,
    pub details: Option<serde_json::Value>,
}

/// Per-subject aggregate for the dashboard.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub subject: String,
    pub exams_taken: i64,
    pub average_percentage: f64,
    pub best_percentage: i32,
}

/// Dashboard aggregates for the current user.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub exams_taken: i64,
    pub average_percentage: f64,
    pub total_study_secs: i64,
    pub subjects: Vec<SubjectStats>,
}
