//! Strict parsing of generated multiple-choice questions.
//!
//! Model output is untrusted: it only becomes `Question`s after every item
//! passes validation, otherwise the whole batch is rejected.

use serde::Deserialize;

use study_core::model::{Choice, ChoiceToken, QUESTIONS_PER_TEST, Question};

use crate::error::TestGenerationError;

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    choices: Vec<RawChoice>,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    label: String,
    text: String,
}

/// Parse a model response into exactly `QUESTIONS_PER_TEST` questions on `topic`.
///
/// The response may wrap the array in a markdown code fence or surrounding
/// prose; the array itself must match the requested shape exactly.
///
/// # Errors
///
/// Returns `TestGenerationError` if no JSON array is found, the count is
/// wrong, a label or answer is not one of `a`-`d`, or a question fails
/// validation (duplicate labels, missing text, wrong number of choices).
pub fn parse_questions(raw: &str, topic: &str) -> Result<Vec<Question>, TestGenerationError> {
    let json = extract_json_array(raw)
        .ok_or_else(|| TestGenerationError::Malformed("no JSON array in response".into()))?;
    let items: Vec<RawQuestion> = serde_json::from_str(json)
        .map_err(|err| TestGenerationError::Malformed(err.to_string()))?;

    if items.len() != QUESTIONS_PER_TEST {
        return Err(TestGenerationError::QuestionCount { found: items.len() });
    }

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| to_question(idx + 1, item, topic))
        .collect()
}

fn to_question(
    number: usize,
    item: RawQuestion,
    topic: &str,
) -> Result<Question, TestGenerationError> {
    let choices = item
        .choices
        .into_iter()
        .map(|choice| {
            let label = ChoiceToken::parse(&choice.label).map_err(|_| {
                TestGenerationError::InvalidChoiceLabel {
                    number,
                    raw: choice.label.clone(),
                }
            })?;
            Ok(Choice {
                label,
                text: choice.text,
            })
        })
        .collect::<Result<Vec<_>, TestGenerationError>>()?;

    let correct = ChoiceToken::parse(&item.answer).map_err(|_| {
        TestGenerationError::InvalidCorrectChoice {
            number,
            raw: item.answer.clone(),
        }
    })?;

    Question::new(topic, item.question, choices, correct)
        .map_err(|source| TestGenerationError::InvalidQuestion { number, source })
}

fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}


#[cfg(test)]
mod tests {
    use super::fixtures::response;
    use super::*;
    use study_core::model::QuestionError;

    #[test]
    fn parses_well_formed_response() {
        let raw = response(&["b", "a", "d", "C", "b"]);
        let questions = parse_questions(&raw, "Fourier Series").unwrap();

        assert_eq!(questions.len(), 5);
        assert!(questions.iter().all(|q| q.topic() == "Fourier Series"));
        assert_eq!(questions[0].correct_choice(), ChoiceToken::B);
        assert_eq!(questions[3].correct_choice(), ChoiceToken::C);
        assert_eq!(questions[2].choice_text(ChoiceToken::D), "fourth 3");
    }

    #[test]
    fn accepts_code_fenced_output() {
        let raw = format!("Here you go:\n```json\n{}\n```", response(&["a"; 5]));
        assert!(parse_questions(&raw, "Optics").is_ok());
    }

    #[test]
    fn rejects_wrong_count() {
        let raw = response(&["a"; 4]);
        assert_eq!(
            parse_questions(&raw, "Optics").unwrap_err(),
            TestGenerationError::QuestionCount { found: 4 }
        );
    }

    #[test]
    fn rejects_missing_correct_choice() {
        let raw = response(&["a", "a", "e", "a", "a"]);
        assert!(matches!(
            parse_questions(&raw, "Optics").unwrap_err(),
            TestGenerationError::InvalidCorrectChoice { number: 3, .. }
        ));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let raw = response(&["a"; 5]).replacen(r#""label": "b""#, r#""label": "a""#, 1);
        assert_eq!(
            parse_questions(&raw, "Optics").unwrap_err(),
            TestGenerationError::InvalidQuestion {
                number: 1,
                source: QuestionError::DuplicateChoice(ChoiceToken::A),
            }
        );
    }

    #[test]
    fn rejects_prose() {
        assert!(matches!(
            parse_questions("I cannot write a test about that.", "Optics"),
            Err(TestGenerationError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_answer_field() {
        let raw = response(&["a"; 5]).replace(r#", "answer": "a""#, "");
        assert!(matches!(
            parse_questions(&raw, "Optics"),
            Err(TestGenerationError::Malformed(_))
        ));
    }
}
