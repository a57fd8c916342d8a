// src/models/exam.rs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Subjects the tutor supports. Doubles as the key for per-subject exam
/// attempts, so the wire form (lowercase) is also used in URL paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Math,
    Physics,
    Chemistry,
    Biology,
    English,
    History,
}

impl Subject {
    pub const ALL: [Subject; 6] = [
        Subject::Math,
        Subject::Physics,
        Subject::Chemistry,
        Subject::Biology,
        Subject::English,
        Subject::History,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Physics => "physics",
            Subject::Chemistry => "chemistry",
            Subject::Biology => "biology",
            Subject::English => "english",
            Subject::History => "history",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Subject::Math => "Mathematics",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
            Subject::English => "English",
            Subject::History => "History",
        }
    }

    /// Fixed per-subject exam duration in minutes.
    pub fn exam_duration_minutes(&self) -> u32 {
        match self {
            Subject::Math | Subject::Physics => 25,
            _ => 15,
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "math" => Ok(Subject::Math),
            "physics" => Ok(Subject::Physics),
            "chemistry" => Ok(Subject::Chemistry),
            "biology" => Ok(Subject::Biology),
            "english" => Ok(Subject::English),
            "history" => Ok(Subject::History),
            other => Err(format!("unknown subject '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice,
    ShortAnswer,
}

/// A single exam question, including the answer key. Field names follow the
/// client's camelCase JSON contract.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "type")]
    pub kind: QuestionKind,

    /// Question text.
    #[serde(rename = "question")]
    pub prompt: String,

    /// Exactly 4 entries for multiple-choice, empty for short-answer.
    #[serde(default)]
    pub options: Vec<String>,

    /// For multiple-choice this is always one of `options`; for short-answer
    /// it is a model answer used by grading prompts and feedback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    pub points: u32,
}

/// Question view with the answer key withheld, for clients running a live
/// attempt.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: Vec<String>,
    pub points: u32,
}

/// Where an exam or grading report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Ai,
    Fallback,
}

/// A generated exam. Ephemeral: lives inside attempt snapshots and inside
/// `exam_results.details`, never as its own table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub title: String,
    pub subject: Subject,
    pub duration_minutes: u32,
    pub questions: Vec<Question>,
    pub total_points: u32,
    pub source: ContentSource,
}

impl Exam {
    /// Sum of per-question points; kept denormalized in `total_points`.
    pub fn computed_total_points(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    pub fn public_questions(&self) -> Vec<PublicQuestion> {
        self.questions
            .iter()
            .enumerate()
            .map(|(index, q)| PublicQuestion {
                index,
                kind: q.kind,
                prompt: q.prompt.clone(),
                options: q.options.clone(),
                points: q.points,
            })
            .collect()
    }
}

/// Per-question grading outcome.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFeedback {
    pub question_index: usize,
    pub correct: bool,
    pub points_earned: u32,
    pub feedback: String,
}

/// The grading envelope returned by `/api/grade-exam` and embedded in results.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GradingReport {
    pub score: u32,
    pub max_score: u32,
    pub percentage: u32,
    pub question_count: usize,
    pub feedback: Vec<QuestionFeedback>,
    pub graded_by: ContentSource,
}

/// The one percentage formula. Both grading paths and the results endpoint
/// go through here so `percentage == round(100 * score / maxScore)` holds
/// everywhere.
pub fn percentage_of(score: u32, max_score: u32) -> u32 {
    if max_score == 0 {
        return 0;
    }
    ((100.0 * score as f64) / max_score as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_roundtrip() {
        for subject in Subject::ALL {
            let json = serde_json::to_string(&subject).unwrap();
            let back: Subject = serde_json::from_str(&json).unwrap();
            assert_eq!(back, subject);
            assert_eq!(json, format!("\"{}\"", subject.as_str()));
        }
    }

    #[test]
    fn test_subject_durations() {
        assert_eq!(Subject::Math.exam_duration_minutes(), 25);
        assert_eq!(Subject::Physics.exam_duration_minutes(), 25);
        assert_eq!(Subject::Chemistry.exam_duration_minutes(), 15);
        assert_eq!(Subject::History.exam_duration_minutes(), 15);
    }

    #[test]
    fn test_question_wire_format() {
        let q = Question {
            kind: QuestionKind::MultipleChoice,
            prompt: "What is 2 + 2?".to_string(),
            options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
            correct_answer: Some("4".to_string()),
            explanation: None,
            points: 4,
        };

        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["type"], "multiple-choice");
        assert_eq!(json["question"], "What is 2 + 2?");
        assert_eq!(json["correctAnswer"], "4");
        assert!(json.get("explanation").is_none());
    }

    #[test]
    fn test_percentage_of() {
        assert_eq!(percentage_of(40, 80), 50);
        assert_eq!(percentage_of(80, 80), 100);
        assert_eq!(percentage_of(0, 80), 0);
        // Rounds to nearest.
        assert_eq!(percentage_of(1, 3), 33);
        assert_eq!(percentage_of(2, 3), 67);
        // Division by zero guard.
        assert_eq!(percentage_of(10, 0), 0);
    }

    #[test]
    fn test_public_questions_hide_answer_key() {
        let exam = Exam {
            title: "T".into(),
            subject: Subject::Math,
            duration_minutes: 25,
            questions: vec![Question {
                kind: QuestionKind::MultipleChoice,
                prompt: "Q".into(),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: Some("a".into()),
                explanation: Some("because".into()),
                points: 4,
            }],
            total_points: 4,
            source: ContentSource::Fallback,
        };

        let public = exam.public_questions();
        assert_eq!(public.len(), 1);
        let json = serde_json::to_value(&public[0]).unwrap();
        assert!(json.get("correctAnswer").is_none());
        assert!(json.get("explanation").is_none());
        assert_eq!(json["index"], 0);
    }
}
