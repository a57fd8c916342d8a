// src/ai/prompts.rs

use crate::models::exam::{Exam, QuestionKind, Subject};

/// System prompt for the tutoring chat. The tutor guides rather than
/// answers: it asks leading questions and only reveals a full solution when
/// the student is clearly stuck.
pub fn tutor_system_prompt(subject: Subject, topic: Option<&str>) -> String {
    let focus = match topic {
        Some(topic) if !topic.trim().is_empty() => {
            format!(" The student is currently working on: {}.", topic.trim())
        }
        _ => String::new(),
    };

    format!(
        "You are a patient {} tutor for secondary school students.{} \
         Teach using the Socratic method: respond to every question with a hint or a \
         guiding question that moves the student one step forward. Never give away the \
         final answer immediately. If the student has made three or more unsuccessful \
         attempts, walk through the solution step by step. Keep responses under 150 \
         words and use plain language.",
        subject.display_name(),
        focus
    )
}

/// Prompt for generating a complete practice exam as JSON.
pub fn exam_generation_prompt(subject: Subject, topic: Option<&str>) -> String {
    let focus = match topic {
        Some(topic) if !topic.trim().is_empty() => {
            format!(" Focus the questions on: {}.", topic.trim())
        }
        _ => String::new(),
    };

    format!(
        "Generate a {} practice exam for secondary school students.{} Respond with JSON \
         only, no commentary, using exactly this shape:\n\
         {{\n\
           \"title\": string,\n\
           \"questions\": [\n\
             {{\"type\": \"multiple-choice\", \"question\": string, \"options\": [4 strings], \
         \"correctAnswer\": string (one of options), \"explanation\": string, \"points\": 4}},\n\
             {{\"type\": \"short-answer\", \"question\": string, \"correctAnswer\": string \
         (model answer), \"explanation\": string, \"points\": 8}}\n\
           ]\n\
         }}\n\
         Produce exactly 10 multiple-choice questions worth 4 points each followed by 5 \
         short-answer questions worth 8 points each. Cover a spread of difficulty from \
         recall to application.",
        subject.display_name(),
        focus
    )
}

/// Prompt for grading a submitted exam as JSON.
pub fn grading_prompt(exam: &Exam, answers: &[Option<String>]) -> String {
    let mut sheet = String::new();
    for (i, question) in exam.questions.iter().enumerate() {
        let kind = match question.kind {
            QuestionKind::MultipleChoice => "multiple-choice",
            QuestionKind::ShortAnswer => "short-answer",
        };
        let answer = answers
            .get(i)
            .and_then(|a| a.as_deref())
            .filter(|a| !a.trim().is_empty())
            .unwrap_or("(no answer)");
        sheet.push_str(&format!(
            "Q{} [{}] ({} pts): {}\nExpected: {}\nStudent answered: {}\n\n",
            i,
            kind,
            question.points,
            question.prompt,
            question.correct_answer.as_deref().unwrap_or("(none)"),
            answer
        ));
    }

    format!(
        "Grade this {} exam. For multiple-choice award full points for the exact \
         correct option and zero otherwise. For short-answer award partial credit for \
         partially correct reasoning. Respond with JSON only:\n\
         {{\n\
           \"feedback\": [{{\"questionIndex\": number, \"correct\": boolean, \
         \"pointsEarned\": number, \"feedback\": string (one or two sentences)}}]\n\
         }}\n\
         Include one entry per question, in order.\n\n{}",
        exam.subject.display_name(),
        sheet
    )
}

/// Deterministic reply used when no AI provider is configured. Keeps the chat
/// endpoint functional so the client flow can be exercised end to end.
pub fn canned_tutor_reply(subject: Subject) -> String {
    format!(
        "I'm running in offline mode right now, so I can't work through this {} \
         problem with you step by step. Here is how to make progress on your own: \
         write down exactly what the question gives you, what it asks for, and one \
         formula or fact that connects them. Then try the first step and check the \
         units of your result. Come back when I'm online and we'll dig into the \
         details together.",
        subject.display_name()
    )
}
