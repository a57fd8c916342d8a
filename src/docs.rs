// src/docs.rs

use axum::{Json, response::IntoResponse};
use utoipa::OpenApi;

use crate::exam_session::ExamPhase;
use crate::handlers::attempts::{AnswerRequest, AttemptView};
use crate::handlers::chat::ChatRequest;
use crate::handlers::exams::{GenerateExamRequest, GradeExamRequest};
use crate::handlers::{attempts, auth, chat, chat_sessions, exam_results, exams, profile};
use crate::models::{
    chat_session::{ChatMessage, ChatSession, ChatSessionSummary, SaveChatSessionRequest},
    exam::{
        ContentSource, Exam, GradingReport, PublicQuestion, Question, QuestionFeedback,
        QuestionKind, Subject,
    },
    exam_result::{
        CreateExamResultRequest, DashboardStats, ExamResult, ExamResultSummary, SubjectStats,
    },
    user::{LoginRequest, ProfileResponse, SignupRequest, UpdateProfileRequest, UserPublic},
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "sage-backend",
        description = "AI tutoring backend: Socratic chat, generated practice exams, and progress tracking."
    ),
    paths(
        auth::signup,
        auth::login,
        auth::me,
        auth::logout,
        profile::get_profile,
        profile::update_profile,
        profile::get_stats,
        chat_sessions::list_sessions,
        chat_sessions::get_session,
        chat_sessions::save_session,
        chat_sessions::delete_sessions,
        exam_results::list_results,
        exam_results::create_result,
        exam_results::get_result,
        chat::chat,
        exams::generate_exam,
        exams::grade_exam,
        attempts::create_attempt,
        attempts::get_attempt,
        attempts::start_attempt,
        attempts::put_answer,
        attempts::submit_attempt,
        attempts::abandon_attempt,
    ),
    components(schemas(
        UserPublic,
        ProfileResponse,
        SignupRequest,
        LoginRequest,
        UpdateProfileRequest,
        ChatMessage,
        ChatSession,
        ChatSessionSummary,
        SaveChatSessionRequest,
        ExamResult,
        ExamResultSummary,
        CreateExamResultRequest,
        SubjectStats,
        DashboardStats,
        Subject,
        QuestionKind,
        Question,
        PublicQuestion,
        ContentSource,
        Exam,
        QuestionFeedback,
        GradingReport,
        ExamPhase,
        AttemptView,
        AnswerRequest,
        ChatRequest,
        GenerateExamRequest,
        GradeExamRequest,
    )),
    tags(
        (name = "auth", description = "Signup, login, session restore"),
        (name = "user", description = "Profile and dashboard statistics"),
        (name = "chat", description = "Streaming Socratic tutor"),
        (name = "chat-sessions", description = "Saved tutoring conversations"),
        (name = "exam-results", description = "Completed exam records"),
        (name = "exams", description = "Exam generation and grading"),
        (name = "exam-attempts", description = "Live per-subject exam attempts"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI document. No UI bundle is shipped; point a Swagger or
/// Redoc viewer at this endpoint instead.
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builds_and_covers_core_paths() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();
        let paths = json["paths"].as_object().unwrap();

        assert!(paths.contains_key("/api/auth/signup"));
        assert!(paths.contains_key("/api/chat-sessions"));
        assert!(paths.contains_key("/api/exam-results/{id}"));
        assert!(paths.contains_key("/api/generate-exam"));
        assert!(paths.contains_key("/api/exam-attempts/{subject}"));
        assert!(paths.contains_key("/api/exam-attempts/{subject}/submit"));
    }
}
