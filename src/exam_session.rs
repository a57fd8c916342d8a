// src/exam_session.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::models::exam::{Exam, Subject};

/// How many times exam generation may hit the AI provider before the
/// attempt is marked failed.
pub const MAX_GENERATION_ATTEMPTS: u32 = 3;

/// Grading progress shown to clients is capped here until the report
/// actually lands; only `complete` may claim 100.
pub const GRADING_PROGRESS_CAP: u8 = 95;

/// Lifecycle of one exam attempt.
///
/// - `NotGenerated` -> `ReadyToStart` -> `InProgress` -> `Grading` -> `Completed`
/// - Generation can dead-end in `GenerationFailed`, grading in `GradingFailed`
///   (retryable).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExamPhase {
    #[default]
    NotGenerated,
    ReadyToStart,
    InProgress,
    Grading,
    Completed,
    GenerationFailed,
    GradingFailed,
}

impl ExamPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamPhase::NotGenerated => "not_generated",
            ExamPhase::ReadyToStart => "ready_to_start",
            ExamPhase::InProgress => "in_progress",
            ExamPhase::Grading => "grading",
            ExamPhase::Completed => "completed",
            ExamPhase::GenerationFailed => "generation_failed",
            ExamPhase::GradingFailed => "grading_failed",
        }
    }

    /// True once the attempt can never advance again.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ExamPhase::Completed)
    }

    /// Phases during which the client must stay on the exam screen.
    pub const fn blocks_navigation(&self) -> bool {
        matches!(self, ExamPhase::InProgress | ExamPhase::Grading)
    }
}

impl std::fmt::Display for ExamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule violations raised by session actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    InvalidTransition { phase: ExamPhase, action: &'static str },
    QuestionOutOfRange { index: usize, count: usize },
    AnswersLocked,
    Incomplete { unanswered: usize },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidTransition { phase, action } => {
                write!(f, "Cannot {} while the attempt is {}", action, phase)
            }
            SessionError::QuestionOutOfRange { index, count } => {
                write!(f, "Question index {} is out of range (exam has {})", index, count)
            }
            SessionError::AnswersLocked => {
                write!(f, "Time is up; answers can no longer be changed")
            }
            SessionError::Incomplete { unanswered } => {
                write!(f, "{} question(s) are still unanswered", unanswered)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidTransition { .. } | SessionError::AnswersLocked => {
                AppError::Conflict(err.to_string())
            }
            SessionError::QuestionOutOfRange { .. } | SessionError::Incomplete { .. } => {
                AppError::BadRequest(err.to_string())
            }
        }
    }
}

/// Outcome of advancing the countdown by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still counting; carries the seconds left.
    Counting(u32),
    /// This tick crossed zero. Fires at most once per attempt.
    Expired,
    /// The clock is not running (wrong phase, or expiry already fired).
    Idle,
}

/// One user's attempt at one subject's exam. The whole struct serializes as
/// the snapshot stored in `exam_attempts`, so a resumed session picks up
/// exactly where the last request left it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSession {
    pub subject: Subject,
    pub phase: ExamPhase,
    pub exam: Option<Exam>,

    /// Answers keyed by question index. Keys are serialized as strings in
    /// JSON, which BTreeMap handles on both ends.
    pub answers: BTreeMap<usize, String>,

    pub current_question: usize,
    pub remaining_seconds: u32,

    /// Wall-clock deadline, set when the attempt starts. Lets a resumed
    /// client recompute the countdown without trusting its own clock.
    pub deadline: Option<DateTime<Utc>>,

    pub time_expired: bool,
    pub generation_attempts: u32,
    pub grading_progress: u8,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExamSession {
    pub fn new(subject: Subject) -> Self {
        let now = Utc::now();
        Self {
            subject,
            phase: ExamPhase::NotGenerated,
            exam: None,
            answers: BTreeMap::new(),
            current_question: 0,
            remaining_seconds: 0,
            deadline: None,
            time_expired: false,
            generation_attempts: 0,
            grading_progress: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn question_count(&self) -> usize {
        self.exam.as_ref().map(|e| e.questions.len()).unwrap_or(0)
    }

    /// Answers that actually contain something; whitespace does not count.
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|a| !a.trim().is_empty()).count()
    }

    pub fn unanswered_count(&self) -> usize {
        self.question_count().saturating_sub(self.answered_count())
    }

    pub fn blocks_navigation(&self) -> bool {
        self.phase.blocks_navigation()
    }

    /// Records one hit against the generation budget. Returns the attempt
    /// number just consumed.
    pub fn note_generation_attempt(&mut self) -> u32 {
        self.generation_attempts += 1;
        self.touch();
        self.generation_attempts
    }

    pub fn generation_exhausted(&self) -> bool {
        self.generation_attempts >= MAX_GENERATION_ATTEMPTS
    }

    /// Installs a generated exam and arms the countdown display.
    pub fn exam_ready(&mut self, exam: Exam) -> Result<(), SessionError> {
        match self.phase {
            ExamPhase::NotGenerated | ExamPhase::GenerationFailed => {
                self.remaining_seconds = exam.duration_minutes * 60;
                self.exam = Some(exam);
                self.phase = ExamPhase::ReadyToStart;
                self.touch();
                Ok(())
            }
            phase => Err(SessionError::InvalidTransition { phase, action: "install an exam" }),
        }
    }

    pub fn generation_failed(&mut self) -> Result<(), SessionError> {
        match self.phase {
            ExamPhase::NotGenerated | ExamPhase::GenerationFailed => {
                self.phase = ExamPhase::GenerationFailed;
                self.touch();
                Ok(())
            }
            phase => Err(SessionError::InvalidTransition { phase, action: "fail generation" }),
        }
    }

    /// Starts the clock: exactly `duration_minutes * 60` ticks from here.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.phase != ExamPhase::ReadyToStart {
            return Err(SessionError::InvalidTransition { phase: self.phase, action: "start" });
        }
        let duration_secs = self
            .exam
            .as_ref()
            .map(|e| e.duration_minutes * 60)
            .unwrap_or(0);
        self.remaining_seconds = duration_secs;
        self.deadline = Some(now + chrono::Duration::seconds(i64::from(duration_secs)));
        self.current_question = 0;
        self.phase = ExamPhase::InProgress;
        self.touch();
        Ok(())
    }

    /// One-shot expiry: auto-submits the attempt, unanswered questions and
    /// all. Fires at most once, since it moves the attempt out of
    /// `InProgress` and the clock only runs there.
    fn expire(&mut self) {
        self.time_expired = true;
        self.remaining_seconds = 0;
        self.phase = ExamPhase::Grading;
        self.grading_progress = 0;
        self.touch();
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != ExamPhase::InProgress || self.time_expired {
            return TickOutcome::Idle;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.expire();
            TickOutcome::Expired
        } else {
            TickOutcome::Counting(self.remaining_seconds)
        }
    }

    /// Recomputes the countdown from the wall-clock deadline. Used when a
    /// client reconnects, so a stale snapshot expires at the same moment a
    /// continuously-ticking one would have.
    pub fn sync_clock(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.phase != ExamPhase::InProgress || self.time_expired {
            return TickOutcome::Idle;
        }
        let Some(deadline) = self.deadline else {
            return TickOutcome::Idle;
        };
        let left = (deadline - now).num_seconds();
        if left <= 0 {
            self.expire();
            TickOutcome::Expired
        } else {
            self.remaining_seconds = left as u32;
            self.touch();
            TickOutcome::Counting(self.remaining_seconds)
        }
    }

    pub fn select_question(&mut self, index: usize) -> Result<(), SessionError> {
        if self.phase != ExamPhase::InProgress {
            return Err(SessionError::InvalidTransition {
                phase: self.phase,
                action: "navigate questions",
            });
        }
        let count = self.question_count();
        if index >= count {
            return Err(SessionError::QuestionOutOfRange { index, count });
        }
        self.current_question = index;
        self.touch();
        Ok(())
    }

    pub fn set_answer(&mut self, index: usize, answer: String) -> Result<(), SessionError> {
        if self.time_expired || self.phase == ExamPhase::Grading {
            return Err(SessionError::AnswersLocked);
        }
        if self.phase != ExamPhase::InProgress {
            return Err(SessionError::InvalidTransition {
                phase: self.phase,
                action: "answer questions",
            });
        }
        let count = self.question_count();
        if index >= count {
            return Err(SessionError::QuestionOutOfRange { index, count });
        }
        self.answers.insert(index, answer);
        self.touch();
        Ok(())
    }

    /// Moves to grading. Expiry auto-submits on its own, so an explicit
    /// submit either requires every question answered or lands as a no-op
    /// on an attempt the clock already pushed into grading.
    pub fn submit(&mut self) -> Result<(), SessionError> {
        if self.time_expired && self.phase == ExamPhase::Grading {
            return Ok(());
        }
        if self.phase != ExamPhase::InProgress {
            return Err(SessionError::InvalidTransition { phase: self.phase, action: "submit" });
        }
        let unanswered = self.unanswered_count();
        if unanswered > 0 {
            return Err(SessionError::Incomplete { unanswered });
        }
        self.phase = ExamPhase::Grading;
        self.grading_progress = 0;
        self.touch();
        Ok(())
    }

    /// Bumps the visible grading progress, clamped to the pre-completion cap.
    pub fn advance_grading_progress(&mut self, increment: u8) -> Result<u8, SessionError> {
        if self.phase != ExamPhase::Grading {
            return Err(SessionError::InvalidTransition {
                phase: self.phase,
                action: "advance grading",
            });
        }
        self.grading_progress = self
            .grading_progress
            .saturating_add(increment)
            .min(GRADING_PROGRESS_CAP);
        self.touch();
        Ok(self.grading_progress)
    }

    pub fn complete(&mut self) -> Result<(), SessionError> {
        if self.phase != ExamPhase::Grading {
            return Err(SessionError::InvalidTransition { phase: self.phase, action: "complete" });
        }
        self.grading_progress = 100;
        self.phase = ExamPhase::Completed;
        self.touch();
        Ok(())
    }

    pub fn grading_failed(&mut self) -> Result<(), SessionError> {
        if self.phase != ExamPhase::Grading {
            return Err(SessionError::InvalidTransition {
                phase: self.phase,
                action: "fail grading",
            });
        }
        self.phase = ExamPhase::GradingFailed;
        self.touch();
        Ok(())
    }

    pub fn retry_grading(&mut self) -> Result<(), SessionError> {
        if self.phase != ExamPhase::GradingFailed {
            return Err(SessionError::InvalidTransition {
                phase: self.phase,
                action: "retry grading",
            });
        }
        self.phase = ExamPhase::Grading;
        self.grading_progress = 0;
        self.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::{ContentSource, Question, QuestionKind};

    fn exam_with(duration_minutes: u32, question_count: usize) -> Exam {
        let questions: Vec<Question> = (0..question_count)
            .map(|i| Question {
                kind: QuestionKind::MultipleChoice,
                prompt: format!("Question {}", i),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: Some("a".into()),
                explanation: None,
                points: 4,
            })
            .collect();
        let total_points = questions.iter().map(|q| q.points).sum();
        Exam {
            title: "Test Exam".into(),
            subject: Subject::Math,
            duration_minutes,
            questions,
            total_points,
            source: ContentSource::Fallback,
        }
    }

    fn started_session(duration_minutes: u32, question_count: usize) -> ExamSession {
        let mut session = ExamSession::new(Subject::Math);
        session.exam_ready(exam_with(duration_minutes, question_count)).unwrap();
        session.start(Utc::now()).unwrap();
        session
    }

    #[test]
    fn test_new_session_is_not_generated() {
        let session = ExamSession::new(Subject::Physics);
        assert_eq!(session.phase, ExamPhase::NotGenerated);
        assert_eq!(session.generation_attempts, 0);
        assert!(!session.blocks_navigation());
    }

    #[test]
    fn test_happy_path_phases() {
        let mut session = ExamSession::new(Subject::Math);
        session.exam_ready(exam_with(25, 2)).unwrap();
        assert_eq!(session.phase, ExamPhase::ReadyToStart);

        session.start(Utc::now()).unwrap();
        assert_eq!(session.phase, ExamPhase::InProgress);
        assert!(session.blocks_navigation());

        session.set_answer(0, "a".into()).unwrap();
        session.set_answer(1, "b".into()).unwrap();
        session.submit().unwrap();
        assert_eq!(session.phase, ExamPhase::Grading);
        assert!(session.blocks_navigation());

        session.complete().unwrap();
        assert_eq!(session.phase, ExamPhase::Completed);
        assert_eq!(session.grading_progress, 100);
        assert!(session.phase.is_terminal());
        assert!(!session.blocks_navigation());
    }

    #[test]
    fn test_cannot_start_before_exam_ready() {
        let mut session = ExamSession::new(Subject::Math);
        let err = session.start(Utc::now()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn test_countdown_runs_duration_times_sixty_ticks() {
        // 1 minute exam: tick 59 times counting, the 60th expires.
        let mut session = started_session(1, 1);
        assert_eq!(session.remaining_seconds, 60);

        for expected in (1..60).rev() {
            assert_eq!(session.tick(), TickOutcome::Counting(expected));
        }
        assert_eq!(session.tick(), TickOutcome::Expired);
        assert!(session.time_expired);
        assert_eq!(session.remaining_seconds, 0);
        // Expiry auto-submits.
        assert_eq!(session.phase, ExamPhase::Grading);
    }

    #[test]
    fn test_expiry_fires_exactly_once() {
        let mut session = started_session(1, 1);
        for _ in 0..59 {
            session.tick();
        }
        assert_eq!(session.tick(), TickOutcome::Expired);
        assert_eq!(session.tick(), TickOutcome::Idle);
        assert_eq!(session.tick(), TickOutcome::Idle);
    }

    #[test]
    fn test_sync_clock_expires_stale_sessions() {
        let mut session = ExamSession::new(Subject::Math);
        session.exam_ready(exam_with(1, 1)).unwrap();
        let started = Utc::now() - chrono::Duration::seconds(120);
        session.start(started).unwrap();

        assert_eq!(session.sync_clock(Utc::now()), TickOutcome::Expired);
        assert_eq!(session.sync_clock(Utc::now()), TickOutcome::Idle);
    }

    #[test]
    fn test_sync_clock_recomputes_remaining() {
        let mut session = ExamSession::new(Subject::Math);
        session.exam_ready(exam_with(25, 1)).unwrap();
        let started = Utc::now() - chrono::Duration::seconds(100);
        session.start(started).unwrap();
        // start() measured from `started`, so roughly 100s have passed.
        match session.sync_clock(Utc::now()) {
            TickOutcome::Counting(left) => {
                assert!(left <= 25 * 60 - 100);
                assert!(left > 25 * 60 - 110);
            }
            other => panic!("expected Counting, got {:?}", other),
        }
    }

    #[test]
    fn test_answers_locked_after_expiry() {
        let mut session = started_session(1, 2);
        session.set_answer(0, "a".into()).unwrap();
        for _ in 0..60 {
            session.tick();
        }
        assert!(session.time_expired);

        let err = session.set_answer(1, "b".into()).unwrap_err();
        assert_eq!(err, SessionError::AnswersLocked);
        // The earlier answer survives.
        assert_eq!(session.answers.get(&0).map(String::as_str), Some("a"));
    }

    #[test]
    fn test_incomplete_submit_rejected_but_expiry_submits_anyway() {
        let mut session = started_session(1, 3);
        session.set_answer(0, "a".into()).unwrap();

        let err = session.submit().unwrap_err();
        assert_eq!(err, SessionError::Incomplete { unanswered: 2 });
        assert_eq!(session.phase, ExamPhase::InProgress);

        for _ in 0..60 {
            session.tick();
        }
        assert_eq!(session.phase, ExamPhase::Grading);
        // A client submit that raced the expiry is accepted as a no-op.
        session.submit().unwrap();
        assert_eq!(session.phase, ExamPhase::Grading);
    }

    #[test]
    fn test_whitespace_answers_count_as_unanswered() {
        let mut session = started_session(1, 2);
        session.set_answer(0, "   ".into()).unwrap();
        session.set_answer(1, "real answer".into()).unwrap();
        assert_eq!(session.unanswered_count(), 1);
    }

    #[test]
    fn test_question_navigation_bounds() {
        let mut session = started_session(1, 3);
        session.select_question(2).unwrap();
        assert_eq!(session.current_question, 2);

        let err = session.select_question(3).unwrap_err();
        assert_eq!(err, SessionError::QuestionOutOfRange { index: 3, count: 3 });
    }

    #[test]
    fn test_answer_out_of_range() {
        let mut session = started_session(1, 2);
        let err = session.set_answer(5, "x".into()).unwrap_err();
        assert_eq!(err, SessionError::QuestionOutOfRange { index: 5, count: 2 });
    }

    #[test]
    fn test_grading_progress_caps_below_completion() {
        let mut session = started_session(1, 1);
        session.set_answer(0, "a".into()).unwrap();
        session.submit().unwrap();

        for _ in 0..30 {
            session.advance_grading_progress(10).unwrap();
        }
        assert_eq!(session.grading_progress, GRADING_PROGRESS_CAP);

        session.complete().unwrap();
        assert_eq!(session.grading_progress, 100);
    }

    #[test]
    fn test_grading_failure_and_retry() {
        let mut session = started_session(1, 1);
        session.set_answer(0, "a".into()).unwrap();
        session.submit().unwrap();
        session.advance_grading_progress(50).unwrap();

        session.grading_failed().unwrap();
        assert_eq!(session.phase, ExamPhase::GradingFailed);

        session.retry_grading().unwrap();
        assert_eq!(session.phase, ExamPhase::Grading);
        assert_eq!(session.grading_progress, 0);
    }

    #[test]
    fn test_generation_budget() {
        let mut session = ExamSession::new(Subject::Chemistry);
        assert!(!session.generation_exhausted());
        session.note_generation_attempt();
        session.note_generation_attempt();
        assert!(!session.generation_exhausted());
        session.note_generation_attempt();
        assert!(session.generation_exhausted());

        session.generation_failed().unwrap();
        assert_eq!(session.phase, ExamPhase::GenerationFailed);
        // A failed attempt can still receive an exam from a later retry.
        session.exam_ready(exam_with(15, 1)).unwrap();
        assert_eq!(session.phase, ExamPhase::ReadyToStart);
    }

    #[test]
    fn test_actions_rejected_in_wrong_phase() {
        let mut session = ExamSession::new(Subject::Math);
        assert!(session.set_answer(0, "a".into()).is_err());
        assert!(session.submit().is_err());
        assert!(session.complete().is_err());
        assert!(session.advance_grading_progress(5).is_err());
        assert!(session.retry_grading().is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut session = started_session(25, 2);
        session.set_answer(0, "my answer".into()).unwrap();
        session.select_question(1).unwrap();
        session.tick();

        let json = serde_json::to_string(&session).unwrap();
        let restored: ExamSession = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.phase, ExamPhase::InProgress);
        assert_eq!(restored.current_question, 1);
        assert_eq!(restored.remaining_seconds, session.remaining_seconds);
        assert_eq!(restored.answers.get(&0).map(String::as_str), Some("my answer"));
        assert_eq!(restored.deadline, session.deadline);
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&ExamPhase::NotGenerated).unwrap(),
            r#""not_generated""#
        );
        assert_eq!(
            serde_json::to_string(&ExamPhase::ReadyToStart).unwrap(),
            r#""ready_to_start""#
        );
        assert_eq!(
            serde_json::to_string(&ExamPhase::InProgress).unwrap(),
            r#""in_progress""#
        );
        assert_eq!(
            serde_json::to_string(&ExamPhase::GradingFailed).unwrap(),
            r#""grading_failed""#
        );
        let phase: ExamPhase = serde_json::from_str(r#""grading""#).unwrap();
        assert_eq!(phase, ExamPhase::Grading);
    }
}
