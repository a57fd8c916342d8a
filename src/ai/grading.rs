// src/ai/grading.rs

use serde::Deserialize;
use serde_json::json;

use crate::ai::client::{AiClient, AiError, ChatTurn, CompletionRequest};
use crate::ai::parse;
use crate::ai::prompts;
use crate::models::exam::{
    ContentSource, Exam, GradingReport, QuestionFeedback, QuestionKind, percentage_of,
};

#[derive(Debug, Deserialize)]
struct DraftReport {
    #[serde(default)]
    feedback: Vec<DraftFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftFeedback {
    question_index: Option<usize>,
    correct: Option<bool>,
    points_earned: Option<f64>,
    feedback: Option<String>,
}

/// Grades a submitted exam. This function cannot fail: when the AI path
/// errors at any step the deterministic local grader takes over, so the
/// student always gets a result.
pub async fn grade_exam(ai: &AiClient, exam: &Exam, answers: &[Option<String>]) -> GradingReport {
    match grade_with_ai(ai, exam, answers).await {
        Ok(report) => report,
        Err(AiError::NotConfigured) => grade_locally(exam, answers),
        Err(e) => {
            tracing::warn!("AI grading failed ({}), using local grader", e);
            grade_locally(exam, answers)
        }
    }
}

async fn grade_with_ai(
    ai: &AiClient,
    exam: &Exam,
    answers: &[Option<String>],
) -> Result<GradingReport, AiError> {
    let request = CompletionRequest::json(vec![
        ChatTurn::system("You are a strict but fair grader. Respond with JSON only."),
        ChatTurn::user(prompts::grading_prompt(exam, answers)),
    ]);
    let raw = ai.complete(request).await?;
    let draft: DraftReport = parse::decode(&raw)?;
    normalize_report(exam, draft)
        .ok_or_else(|| AiError::Malformed("grading report did not cover the exam".to_string()))
}

/// Validates an AI report against the exam it claims to grade. Per-question
/// points are clamped into range and the totals are recomputed locally, so
/// the percentage invariant holds no matter what the provider returned.
fn normalize_report(exam: &Exam, draft: DraftReport) -> Option<GradingReport> {
    if draft.feedback.len() != exam.questions.len() {
        return None;
    }

    let mut feedback = Vec::with_capacity(exam.questions.len());
    let mut covered = vec![false; exam.questions.len()];

    for entry in draft.feedback {
        let index = entry.question_index?;
        let question = exam.questions.get(index)?;
        if covered[index] {
            return None;
        }
        covered[index] = true;

        let points_earned = match entry.points_earned {
            Some(p) if p.is_finite() && p >= 0.0 => (p.round() as u32).min(question.points),
            _ => 0,
        };
        feedback.push(QuestionFeedback {
            question_index: index,
            correct: entry.correct.unwrap_or(points_earned == question.points),
            points_earned,
            feedback: entry
                .feedback
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| "No feedback provided.".to_string()),
        });
    }

    feedback.sort_by_key(|f| f.question_index);

    let score: u32 = feedback.iter().map(|f| f.points_earned).sum();
    let max_score = exam.computed_total_points();
    Some(GradingReport {
        score,
        max_score,
        percentage: percentage_of(score, max_score),
        question_count: exam.questions.len(),
        feedback,
        graded_by: ContentSource::Ai,
    })
}

/// Length tiers for short-answer partial credit, as fractions of the
/// question's points.
fn short_answer_fraction(answer: &str) -> f64 {
    let len = answer.trim().chars().count();
    if len == 0 {
        0.0
    } else if len < 40 {
        0.25
    } else if len < 120 {
        0.5
    } else {
        0.75
    }
}

/// Deterministic grader: exact-match for multiple-choice, length-based
/// partial credit for short answers.
pub fn grade_locally(exam: &Exam, answers: &[Option<String>]) -> GradingReport {
    let mut feedback = Vec::with_capacity(exam.questions.len());

    for (index, question) in exam.questions.iter().enumerate() {
        let answer = answers.get(index).and_then(|a| a.as_deref()).unwrap_or("");

        let (points_earned, correct, note) = match question.kind {
            QuestionKind::MultipleChoice => {
                let expected = question.correct_answer.as_deref().unwrap_or("");
                if !answer.trim().is_empty() && answer.trim() == expected.trim() {
                    (question.points, true, "Correct.".to_string())
                } else if answer.trim().is_empty() {
                    (
                        0,
                        false,
                        format!("No answer. The correct answer is: {}", expected),
                    )
                } else {
                    (0, false, format!("The correct answer is: {}", expected))
                }
            }
            QuestionKind::ShortAnswer => {
                let fraction = short_answer_fraction(answer);
                let earned = (f64::from(question.points) * fraction).round() as u32;
                if fraction == 0.0 {
                    (0, false, "No answer provided.".to_string())
                } else {
                    (
                        earned,
                        earned == question.points,
                        "Partial credit based on answer length; detailed grading was unavailable."
                            .to_string(),
                    )
                }
            }
        };

        feedback.push(QuestionFeedback {
            question_index: index,
            correct,
            points_earned,
            feedback: note,
        });
    }

    let score: u32 = feedback.iter().map(|f| f.points_earned).sum();
    let max_score = exam.computed_total_points();
    GradingReport {
        score,
        max_score,
        percentage: percentage_of(score, max_score),
        question_count: exam.questions.len(),
        feedback,
        graded_by: ContentSource::Fallback,
    }
}

/// Self-contained record of a graded attempt, stored in
/// `exam_results.details`. Embeds the full exam so history can be reviewed
/// after the ephemeral exam is gone.
pub fn result_details(
    exam: &Exam,
    answers: &[Option<String>],
    report: &GradingReport,
) -> serde_json::Value {
    json!({
        "exam": exam,
        "answers": answers,
        "report": report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::generate::fallback_exam;
    use crate::models::exam::Subject;

    fn all_answers(exam: &Exam, short_answer: &str) -> Vec<Option<String>> {
        exam.questions
            .iter()
            .map(|q| match q.kind {
                QuestionKind::MultipleChoice => q.correct_answer.clone(),
                QuestionKind::ShortAnswer => Some(short_answer.to_string()),
            })
            .collect()
    }

    #[test]
    fn test_local_grading_full_mc_empty_short_answers() {
        // 10 correct MC at 4 points, 5 empty short answers: 40 of 80.
        let exam = fallback_exam(Subject::Math);
        let answers = all_answers(&exam, "");

        let report = grade_locally(&exam, &answers);
        assert_eq!(report.score, 40);
        assert_eq!(report.max_score, 80);
        assert_eq!(report.percentage, 50);
        assert_eq!(report.question_count, 15);
        assert_eq!(report.graded_by, ContentSource::Fallback);
    }

    #[test]
    fn test_local_grading_short_answer_tiers() {
        let exam = fallback_exam(Subject::Physics);

        let short = "Because of inertia.";
        let medium = "a".repeat(60);
        let long = "b".repeat(150);

        let report_short = grade_locally(&exam, &all_answers(&exam, short));
        let report_medium = grade_locally(&exam, &all_answers(&exam, &medium));
        let report_long = grade_locally(&exam, &all_answers(&exam, &long));

        // 40 MC points plus 5 * 8 * tier.
        assert_eq!(report_short.score, 40 + 10);
        assert_eq!(report_medium.score, 40 + 20);
        assert_eq!(report_long.score, 40 + 30);
    }

    #[test]
    fn test_local_grading_wrong_mc() {
        let exam = fallback_exam(Subject::English);
        let answers: Vec<Option<String>> = exam
            .questions
            .iter()
            .map(|_| Some("definitely wrong".to_string()))
            .collect();

        let report = grade_locally(&exam, &answers);
        // All MC wrong; short answers land the 25% tier (under 40 chars).
        assert_eq!(report.score, 10);
        assert_eq!(report.percentage, percentage_of(10, 80));
    }

    #[test]
    fn test_percentage_invariant_holds() {
        let exam = fallback_exam(Subject::Chemistry);
        let answers = all_answers(&exam, "The reaction releases energy as heat.");
        let report = grade_locally(&exam, &answers);
        assert_eq!(report.percentage, percentage_of(report.score, report.max_score));
    }

    #[test]
    fn test_normalize_report_clamps_and_recomputes() {
        let exam = fallback_exam(Subject::Biology);
        let draft = DraftReport {
            feedback: exam
                .questions
                .iter()
                .enumerate()
                .map(|(i, _)| DraftFeedback {
                    question_index: Some(i),
                    correct: Some(true),
                    // Far more than any question is worth.
                    points_earned: Some(1000.0),
                    feedback: Some("Great.".to_string()),
                })
                .collect(),
        };

        let report = normalize_report(&exam, draft).unwrap();
        assert_eq!(report.score, 80);
        assert_eq!(report.percentage, 100);
        assert_eq!(report.graded_by, ContentSource::Ai);
    }

    #[test]
    fn test_normalize_report_rejects_wrong_length() {
        let exam = fallback_exam(Subject::History);
        let draft = DraftReport {
            feedback: vec![DraftFeedback {
                question_index: Some(0),
                correct: Some(true),
                points_earned: Some(4.0),
                feedback: None,
            }],
        };
        assert!(normalize_report(&exam, draft).is_none());
    }

    #[test]
    fn test_normalize_report_rejects_duplicate_indices() {
        let exam = fallback_exam(Subject::Math);
        let mut entries: Vec<DraftFeedback> = (0..15)
            .map(|i| DraftFeedback {
                question_index: Some(i),
                correct: Some(false),
                points_earned: Some(0.0),
                feedback: None,
            })
            .collect();
        entries[14].question_index = Some(0);
        let draft = DraftReport { feedback: entries };
        assert!(normalize_report(&exam, draft).is_none());
    }

    #[tokio::test]
    async fn test_grade_exam_without_provider_uses_local() {
        let ai = AiClient::disabled();
        let exam = fallback_exam(Subject::Math);
        let answers = all_answers(&exam, "");
        let report = grade_exam(&ai, &exam, &answers).await;
        assert_eq!(report.graded_by, ContentSource::Fallback);
        assert_eq!(report.score, 40);
    }

    #[test]
    fn test_result_details_embeds_everything() {
        let exam = fallback_exam(Subject::Math);
        let answers = all_answers(&exam, "x");
        let report = grade_locally(&exam, &answers);
        let details = result_details(&exam, &answers, &report);

        assert_eq!(details["exam"]["totalPoints"], 80);
        assert_eq!(details["report"]["maxScore"], 80);
        assert!(details["answers"].is_array());
    }
}
