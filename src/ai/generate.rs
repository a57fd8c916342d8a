// src/ai/generate.rs

use serde::Deserialize;

use crate::ai::client::{AiClient, AiError, ChatTurn, CompletionRequest};
use crate::ai::parse;
use crate::ai::prompts;
use crate::models::exam::{ContentSource, Exam, Question, QuestionKind, Subject};

const MC_POINTS: u32 = 4;
const SA_POINTS: u32 = 8;

/// Lenient mirror of the generation payload. Everything optional; the repair
/// pass decides what survives.
#[derive(Debug, Deserialize)]
struct DraftExam {
    title: Option<String>,
    #[serde(default)]
    questions: Vec<DraftQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftQuestion {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "question")]
    prompt: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    correct_answer: Option<String>,
    explanation: Option<String>,
    points: Option<f64>,
}

/// Runs one AI generation attempt. Strict: any transport, parse, or repair
/// failure is an error so the caller can do its own retry accounting.
pub async fn generate_exam_once(
    ai: &AiClient,
    subject: Subject,
    topic: Option<&str>,
) -> Result<Exam, AiError> {
    let request = CompletionRequest::json(vec![
        ChatTurn::system("You are an exam author. Respond with JSON only."),
        ChatTurn::user(prompts::exam_generation_prompt(subject, topic)),
    ]);
    let raw = ai.complete(request).await?;
    let draft: DraftExam = parse::decode(&raw)?;
    repair_exam(draft, subject)
        .ok_or_else(|| AiError::Malformed("no usable questions after repair".to_string()))
}

/// Generates an exam, falling back to the deterministic template on any
/// failure. This path always produces an exam.
pub async fn generate_exam(ai: &AiClient, subject: Subject, topic: Option<&str>) -> Exam {
    match generate_exam_once(ai, subject, topic).await {
        Ok(exam) => exam,
        Err(AiError::NotConfigured) => fallback_exam(subject),
        Err(e) => {
            tracing::warn!("exam generation failed ({}), using fallback", e);
            fallback_exam(subject)
        }
    }
}

/// Normalizes a draft into a valid exam, repairing violations by
/// substitution. Returns None when nothing usable remains.
fn repair_exam(draft: DraftExam, subject: Subject) -> Option<Exam> {
    let mut questions = Vec::new();

    for dq in draft.questions {
        let Some(prompt) = dq.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            continue;
        };
        let kind = match dq.kind.as_deref().map(str::to_ascii_lowercase) {
            Some(k) if k.contains("choice") => QuestionKind::MultipleChoice,
            Some(k) if k.contains("short") || k.contains("answer") => QuestionKind::ShortAnswer,
            _ => continue,
        };

        let question = match kind {
            QuestionKind::MultipleChoice => {
                let (options, correct) = repair_options(dq.options, dq.correct_answer);
                Question {
                    kind,
                    prompt: prompt.to_string(),
                    options,
                    correct_answer: Some(correct),
                    explanation: dq.explanation.filter(|e| !e.trim().is_empty()),
                    points: repair_points(dq.points, MC_POINTS),
                }
            }
            QuestionKind::ShortAnswer => Question {
                kind,
                prompt: prompt.to_string(),
                options: Vec::new(),
                correct_answer: dq.correct_answer.filter(|a| !a.trim().is_empty()),
                explanation: dq.explanation.filter(|e| !e.trim().is_empty()),
                points: repair_points(dq.points, SA_POINTS),
            },
        };
        questions.push(question);
    }

    if questions.is_empty() {
        return None;
    }

    let total_points = questions.iter().map(|q| q.points).sum();
    Some(Exam {
        title: draft
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{} Practice Exam", subject.display_name())),
        subject,
        duration_minutes: subject.exam_duration_minutes(),
        questions,
        total_points,
        source: ContentSource::Ai,
    })
}

const FILLER_OPTIONS: [&str; 4] = [
    "None of the above",
    "All of the above",
    "Not enough information",
    "Cannot be determined",
];

/// Forces exactly 4 options with the correct answer among them.
fn repair_options(raw: Vec<String>, correct: Option<String>) -> (Vec<String>, String) {
    let mut options: Vec<String> = raw
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    let correct = correct.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

    // Keep the correct answer through truncation.
    if options.len() > 4 {
        if let Some(c) = &correct {
            let keep = options.iter().position(|o| o == c);
            if let Some(pos) = keep {
                if pos >= 4 {
                    let correct_option = options.remove(pos);
                    options.truncate(3);
                    options.push(correct_option);
                }
            }
        }
        options.truncate(4);
    }

    for filler in FILLER_OPTIONS {
        if options.len() >= 4 {
            break;
        }
        if !options.iter().any(|o| o == filler) {
            options.push(filler.to_string());
        }
    }
    // Pathological drafts can exhaust the fillers.
    while options.len() < 4 {
        options.push(format!("Option {}", options.len() + 1));
    }

    let correct = match correct {
        Some(c) if options.contains(&c) => c,
        Some(c) => {
            // Substitute the stray answer key into the last slot.
            options[3] = c.clone();
            c
        }
        None => options[0].clone(),
    };

    (options, correct)
}

fn repair_points(raw: Option<f64>, default: u32) -> u32 {
    match raw {
        Some(p) if p.is_finite() && p >= 1.0 => p.round() as u32,
        _ => default,
    }
}

/// Per-subject bank of (concept, definition) pairs behind the deterministic
/// fallback exam. 10 entries each: all 10 become multiple-choice, the first
/// 5 double as short-answer prompts.
fn concept_bank(subject: Subject) -> [(&'static str, &'static str); 10] {
    match subject {
        Subject::Math => [
            ("the Pythagorean theorem", "In a right triangle the square of the hypotenuse equals the sum of the squares of the other two sides"),
            ("a prime number", "A natural number greater than 1 whose only divisors are 1 and itself"),
            ("the slope of a line", "The ratio of vertical change to horizontal change between two points"),
            ("a linear equation", "An equation whose graph is a straight line, with variables only to the first power"),
            ("the mean of a data set", "The sum of all values divided by the number of values"),
            ("a quadratic equation", "An equation of the form ax^2 + bx + c = 0 with a nonzero"),
            ("the area of a circle", "Pi times the square of the radius"),
            ("a common denominator", "A shared multiple of the denominators of two or more fractions"),
            ("an exponent", "A number indicating how many times a base is multiplied by itself"),
            ("the order of operations", "The convention that parentheses, exponents, multiplication and division, then addition and subtraction are applied in sequence"),
        ],
        Subject::Physics => [
            ("Newton's first law", "An object stays at rest or in uniform motion unless acted on by a net external force"),
            ("velocity", "The rate of change of position, including both speed and direction"),
            ("acceleration", "The rate of change of velocity over time"),
            ("kinetic energy", "The energy an object has because of its motion"),
            ("potential energy", "Stored energy an object has because of its position or configuration"),
            ("Ohm's law", "The current through a conductor is proportional to the voltage across it"),
            ("a wavelength", "The distance between successive crests of a wave"),
            ("gravity", "The attractive force between objects with mass"),
            ("friction", "A force that resists relative motion between surfaces in contact"),
            ("momentum", "The product of an object's mass and its velocity"),
        ],
        Subject::Chemistry => [
            ("an atom", "The smallest unit of an element that keeps its chemical properties"),
            ("an ion", "An atom or molecule that carries a net electric charge"),
            ("a covalent bond", "A chemical bond formed by sharing electron pairs between atoms"),
            ("an acid", "A substance that donates protons or lowers pH in solution"),
            ("a catalyst", "A substance that speeds a reaction without being consumed"),
            ("the periodic table", "An arrangement of elements ordered by atomic number with recurring properties"),
            ("a mole", "An amount of substance containing Avogadro's number of particles"),
            ("oxidation", "The loss of electrons by a substance during a reaction"),
            ("a solution", "A homogeneous mixture of a solute dissolved in a solvent"),
            ("evaporation", "The change of a liquid into vapor at its surface below boiling point"),
        ],
        Subject::Biology => [
            ("photosynthesis", "The process by which plants convert light energy into chemical energy stored in glucose"),
            ("a cell membrane", "The selectively permeable boundary that controls what enters and leaves a cell"),
            ("DNA", "The molecule carrying the genetic instructions of living organisms"),
            ("natural selection", "The process by which organisms better adapted to their environment reproduce more"),
            ("an ecosystem", "A community of living organisms interacting with their physical environment"),
            ("mitosis", "Cell division that produces two genetically identical daughter cells"),
            ("an enzyme", "A protein that catalyzes a specific biochemical reaction"),
            ("cellular respiration", "The process by which cells release energy from glucose"),
            ("a gene", "A segment of DNA that codes for a particular protein or trait"),
            ("homeostasis", "The maintenance of a stable internal environment by an organism"),
        ],
        Subject::English => [
            ("a metaphor", "A figure of speech that describes one thing as another without using like or as"),
            ("a simile", "A comparison between two things using the words like or as"),
            ("alliteration", "The repetition of initial consonant sounds in nearby words"),
            ("personification", "Giving human qualities to non-human things"),
            ("the theme of a text", "The central idea or underlying message a work explores"),
            ("a protagonist", "The main character around whom a story's action centers"),
            ("irony", "A contrast between expectation and reality, or between literal and intended meaning"),
            ("a thesis statement", "A sentence stating the main argument a piece of writing will defend"),
            ("foreshadowing", "Hints an author gives about events that will happen later"),
            ("a synonym", "A word that has the same or nearly the same meaning as another"),
        ],
        Subject::History => [
            ("the Industrial Revolution", "The shift from hand production to machine manufacturing beginning in the late 18th century"),
            ("a primary source", "A document or artifact created during the period being studied"),
            ("the Renaissance", "A period of renewed interest in classical art and learning in Europe"),
            ("democracy", "A system of government in which power rests with the people through voting"),
            ("the Cold War", "The period of geopolitical tension between the United States and the Soviet Union after 1945"),
            ("colonialism", "The policy of acquiring and ruling territories for settlement or exploitation"),
            ("the Enlightenment", "An intellectual movement emphasizing reason, science, and individual rights"),
            ("a revolution", "The overthrow of a government or social order in favor of a new system"),
            ("feudalism", "A medieval system in which land was exchanged for military service and loyalty"),
            ("an empire", "A group of territories or peoples ruled by a single supreme authority"),
        ],
    }
}

/// Deterministic templated exam: 10 multiple-choice at 4 points, then 5
/// short-answer at 8 points, 80 points total. Same input, same exam.
pub fn fallback_exam(subject: Subject) -> Exam {
    let bank = concept_bank(subject);
    let mut questions = Vec::with_capacity(15);

    for (i, (concept, definition)) in bank.iter().enumerate() {
        // Distractors are the next three definitions in the bank; the
        // correct option's slot rotates with the question index.
        let mut options: Vec<String> = (1..=3)
            .map(|offset| bank[(i + offset) % bank.len()].1.to_string())
            .collect();
        options.insert(i % 4, definition.to_string());

        questions.push(Question {
            kind: QuestionKind::MultipleChoice,
            prompt: format!("Which of the following best describes {}?", concept),
            options,
            correct_answer: Some(definition.to_string()),
            explanation: Some(format!("{}.", definition)),
            points: MC_POINTS,
        });
    }

    for (concept, definition) in bank.iter().take(5) {
        questions.push(Question {
            kind: QuestionKind::ShortAnswer,
            prompt: format!(
                "In your own words, explain {}. Give one example or application.",
                concept
            ),
            options: Vec::new(),
            correct_answer: Some(definition.to_string()),
            explanation: None,
            points: SA_POINTS,
        });
    }

    let total_points = questions.iter().map(|q| q.points).sum();
    Exam {
        title: format!("{} Practice Exam", subject.display_name()),
        subject,
        duration_minutes: subject.exam_duration_minutes(),
        questions,
        total_points,
        source: ContentSource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_exam_blueprint() {
        for subject in Subject::ALL {
            let exam = fallback_exam(subject);
            assert_eq!(exam.questions.len(), 15);
            assert_eq!(exam.total_points, 80);
            assert_eq!(exam.duration_minutes, subject.exam_duration_minutes());
            assert_eq!(exam.source, ContentSource::Fallback);

            let mc: Vec<_> = exam
                .questions
                .iter()
                .filter(|q| q.kind == QuestionKind::MultipleChoice)
                .collect();
            assert_eq!(mc.len(), 10);
            for q in &mc {
                assert_eq!(q.options.len(), 4);
                let correct = q.correct_answer.as_ref().unwrap();
                assert!(q.options.contains(correct));
                assert_eq!(q.points, 4);
            }

            let sa: Vec<_> = exam
                .questions
                .iter()
                .filter(|q| q.kind == QuestionKind::ShortAnswer)
                .collect();
            assert_eq!(sa.len(), 5);
            for q in &sa {
                assert!(q.options.is_empty());
                assert_eq!(q.points, 8);
            }
        }
    }

    #[test]
    fn test_fallback_exam_is_deterministic() {
        let a = fallback_exam(Subject::Biology);
        let b = fallback_exam(Subject::Biology);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn test_repair_pads_missing_options() {
        let (options, correct) = repair_options(vec!["Only one".to_string()], None);
        assert_eq!(options.len(), 4);
        assert_eq!(correct, "Only one");
        assert!(options.contains(&"None of the above".to_string()));
    }

    #[test]
    fn test_repair_truncates_extra_options_keeping_correct() {
        let raw = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
            "e".to_string(),
            "f".to_string(),
        ];
        let (options, correct) = repair_options(raw, Some("f".to_string()));
        assert_eq!(options.len(), 4);
        assert_eq!(correct, "f");
        assert!(options.contains(&"f".to_string()));
    }

    #[test]
    fn test_repair_substitutes_stray_answer_key() {
        let raw = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        let (options, correct) = repair_options(raw, Some("the real answer".to_string()));
        assert_eq!(options.len(), 4);
        assert_eq!(correct, "the real answer");
        assert_eq!(options[3], "the real answer");
    }

    #[test]
    fn test_repair_exam_skips_unusable_questions() {
        let draft = DraftExam {
            title: Some("Drafted".to_string()),
            questions: vec![
                DraftQuestion {
                    kind: Some("multiple-choice".to_string()),
                    prompt: Some("Good question?".to_string()),
                    options: vec!["x".into(), "y".into(), "z".into(), "w".into()],
                    correct_answer: Some("x".to_string()),
                    explanation: None,
                    points: None,
                },
                DraftQuestion {
                    kind: Some("essay".to_string()),
                    prompt: Some("Unknown kind".to_string()),
                    options: vec![],
                    correct_answer: None,
                    explanation: None,
                    points: None,
                },
                DraftQuestion {
                    kind: Some("short-answer".to_string()),
                    prompt: None,
                    options: vec![],
                    correct_answer: None,
                    explanation: None,
                    points: Some(8.0),
                },
            ],
        };

        let exam = repair_exam(draft, Subject::Math).unwrap();
        assert_eq!(exam.questions.len(), 1);
        assert_eq!(exam.questions[0].points, 4);
        assert_eq!(exam.title, "Drafted");
        assert_eq!(exam.source, ContentSource::Ai);
    }

    #[test]
    fn test_repair_exam_empty_draft_is_none() {
        let draft = DraftExam { title: None, questions: vec![] };
        assert!(repair_exam(draft, Subject::Math).is_none());
    }

    #[test]
    fn test_repair_points_defaults() {
        assert_eq!(repair_points(None, 4), 4);
        assert_eq!(repair_points(Some(0.0), 4), 4);
        assert_eq!(repair_points(Some(f64::NAN), 8), 8);
        assert_eq!(repair_points(Some(6.4), 4), 6);
    }

    #[tokio::test]
    async fn test_generate_exam_without_provider_falls_back() {
        let ai = AiClient::disabled();
        let exam = generate_exam(&ai, Subject::History, None).await;
        assert_eq!(exam.source, ContentSource::Fallback);
        assert_eq!(exam.questions.len(), 15);
    }

    struct ScriptedBackend(String);

    #[async_trait::async_trait]
    impl crate::ai::client::CompletionBackend for ScriptedBackend {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, AiError> {
            Ok(self.0.clone())
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<
            futures::stream::BoxStream<'static, Result<axum::body::Bytes, AiError>>,
            AiError,
        > {
            Err(AiError::Malformed("streaming is not scripted".to_string()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_generate_exam_once_parses_scripted_payload() {
        let payload = serde_json::json!({
            "title": "Algebra Check",
            "questions": [
                {
                    "type": "multiple-choice",
                    "question": "What is 2 + 2?",
                    "options": ["3", "4", "5", "6"],
                    "correctAnswer": "4",
                    "points": 4
                },
                {
                    "type": "short-answer",
                    "question": "Define a variable.",
                    "correctAnswer": "A symbol that stands for a number",
                    "points": 8
                }
            ]
        });
        let ai = AiClient::with_backend(std::sync::Arc::new(ScriptedBackend(payload.to_string())));

        let exam = generate_exam_once(&ai, Subject::Math, Some("algebra")).await.unwrap();
        assert_eq!(exam.title, "Algebra Check");
        assert_eq!(exam.questions.len(), 2);
        assert_eq!(exam.total_points, 12);
        assert_eq!(exam.source, ContentSource::Ai);
        assert_eq!(exam.questions[0].correct_answer.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_generate_exam_once_surfaces_empty_drafts() {
        let ai = AiClient::with_backend(std::sync::Arc::new(ScriptedBackend(
            r#"{"title": "Empty", "questions": []}"#.to_string(),
        )));
        let result = generate_exam_once(&ai, Subject::Math, None).await;
        assert!(matches!(result, Err(AiError::Malformed(_))));
    }
}
