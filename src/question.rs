use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canvas quiz question types.
///
/// Unknown types deserialize to `Other` instead of failing, mirroring how
/// the API adds kinds over time.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionType {
    #[serde(rename = "multiple_choice_question")]
    MultipleChoice,
    #[serde(rename = "true_false_question")]
    TrueFalse,
    #[serde(rename = "multiple_answers_question")]
    MultipleAnswers,
    #[serde(rename = "short_answer_question")]
    ShortAnswer,
    #[serde(rename = "numerical_question")]
    Numerical,
    #[serde(rename = "essay_question")]
    Essay,
    #[serde(rename = "fill_in_multiple_blanks_question")]
    FillInMultipleBlanks,
    #[serde(rename = "multiple_dropdowns_question")]
    MultipleDropdowns,
    #[serde(rename = "matching_question")]
    Matching,
    #[serde(rename = "file_upload_question")]
    FileUpload,
    #[serde(rename = "text_only_question")]
    TextOnly,
    #[serde(rename = "calculated_question")]
    Calculated,
    #[serde(other, rename = "other")]
    Other,
}

/// One answer option of a question.
///
/// Which fields are meaningful depends on the owning question's type:
/// `left`/`right` for matching, `blank_id` for fill-in-blanks and dropdowns,
/// numeric range fields travel in `extra`. The `answer_*` fields are the
/// write-representation counterparts produced by
/// [`normalize_answers_for_write`]; Canvas reads and writes the same logical
/// fields under different names.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Answer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blank_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_match_left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_match_right: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A quiz question as fetched from or pushed to Canvas.
///
/// `quiz_group_id` is always serialized, even when null, because null is how
/// a question is detached from its group. Fields the crate does not reason
/// about round-trip through `extra`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Question {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub quiz_group_id: Option<u64>,
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_possible: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<Answer>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Rewrites answers from the read shape into the shape update and create
/// calls require.
///
/// Canvas is not round-trip-symmetric: it emits `html`, `left`, `right`,
/// `weight` and `text` but accepts `answer_html`, `answer_match_left`,
/// `answer_match_right`, `answer_weight` and `answer_text`. The html body is
/// copied (the read field stays); the matching and dropdown fields are moved
/// (the read field is cleared), so repeated normalization cannot duplicate
/// option data. This is the only place such renaming happens and it must run
/// immediately before every question create or update.
pub fn normalize_answers_for_write(question: &mut Question) {
    let question_type = question.question_type;
    let answers = match question.answers.as_mut() {
        Some(answers) => answers,
        None => return,
    };
    for answer in answers {
        if let Some(html) = &answer.html {
            answer.answer_html = Some(html.clone());
        }
        match question_type {
            QuestionType::Matching => {
                if let Some(left) = answer.left.take() {
                    answer.answer_match_left = Some(left);
                }
                if let Some(right) = answer.right.take() {
                    answer.answer_match_right = Some(right);
                }
            }
            QuestionType::MultipleDropdowns => {
                if let Some(weight) = answer.weight.take() {
                    answer.answer_weight = Some(weight);
                }
                if let Some(text) = answer.text.take() {
                    answer.answer_text = Some(text);
                }
            }
            _ => {}
        }
    }
}

/// Collapses fill-in-multiple-blanks answers into a compact
/// `options: {blank_id: text | [texts]}` map, the alternate document format.
///
/// Other question types are left untouched.
pub fn answers_to_options(question: &mut Question) {
    if question.question_type != QuestionType::FillInMultipleBlanks {
        return;
    }
    let answers = match question.answers.take() {
        Some(answers) => answers,
        None => return,
    };
    let mut options = Map::new();
    for answer in answers {
        let blank_id = match answer.blank_id {
            Some(blank_id) => blank_id,
            None => continue,
        };
        let text = Value::from(answer.text.unwrap_or_default());
        match options.entry(blank_id) {
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(text);
            }
            serde_json::map::Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if let Value::Array(values) = existing {
                    values.push(text);
                } else {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, text]);
                }
            }
        }
    }
    question.extra.insert("options".to_string(), Value::Object(options));
}

/// Expands a compact `options` map back into Canvas answer records, the
/// inverse of [`answers_to_options`]. Every expanded option is a full-credit
/// answer for its blank.
pub fn options_to_answers(question: &mut Question) {
    if question.question_type != QuestionType::FillInMultipleBlanks {
        return;
    }
    let options = match question.extra.remove("options") {
        Some(Value::Object(options)) => options,
        Some(other) => {
            question.extra.insert("options".to_string(), other);
            return;
        }
        None => return,
    };
    let mut answers = Vec::new();
    for (blank_id, value) in options {
        let texts: Vec<Value> = match value {
            Value::Array(values) => values,
            single => vec![single],
        };
        for text in texts {
            answers.push(Answer {
                text: text.as_str().map(String::from),
                weight: Some(100.0),
                blank_id: Some(blank_id.clone()),
                ..Answer::default()
            });
        }
    }
    question.answers = Some(answers);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question_with_answers(question_type: QuestionType, answers: Vec<Answer>) -> Question {
        Question {
            id: Some(1),
            quiz_group_id: None,
            question_type,
            question_name: Some("q".to_string()),
            question_text: None,
            points_possible: Some(1.0),
            position: None,
            answers: Some(answers),
            extra: Map::new(),
        }
    }

    #[test]
    fn matching_answers_move_left_and_right() {
        let mut question = question_with_answers(
            QuestionType::Matching,
            vec![Answer {
                left: Some("A".to_string()),
                right: Some("B".to_string()),
                ..Answer::default()
            }],
        );
        normalize_answers_for_write(&mut question);

        let answer = &question.answers.as_ref().unwrap()[0];
        assert_eq!(answer.answer_match_left.as_deref(), Some("A"));
        assert_eq!(answer.answer_match_right.as_deref(), Some("B"));
        // Move policy: the read fields are cleared.
        assert!(answer.left.is_none());
        assert!(answer.right.is_none());
    }

    #[test]
    fn dropdown_answers_move_weight_and_text() {
        let mut question = question_with_answers(
            QuestionType::MultipleDropdowns,
            vec![Answer {
                text: Some("red".to_string()),
                weight: Some(100.0),
                blank_id: Some("color".to_string()),
                ..Answer::default()
            }],
        );
        normalize_answers_for_write(&mut question);

        let answer = &question.answers.as_ref().unwrap()[0];
        assert_eq!(answer.answer_text.as_deref(), Some("red"));
        assert_eq!(answer.answer_weight, Some(100.0));
        assert!(answer.text.is_none());
        assert!(answer.weight.is_none());
        // blank_id is not renamed.
        assert_eq!(answer.blank_id.as_deref(), Some("color"));
    }

    #[test]
    fn html_body_is_copied_not_moved() {
        let mut question = question_with_answers(
            QuestionType::MultipleChoice,
            vec![Answer {
                html: Some("<p>x</p>".to_string()),
                ..Answer::default()
            }],
        );
        normalize_answers_for_write(&mut question);

        let answer = &question.answers.as_ref().unwrap()[0];
        assert_eq!(answer.answer_html.as_deref(), Some("<p>x</p>"));
        assert_eq!(answer.html.as_deref(), Some("<p>x</p>"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut question = question_with_answers(
            QuestionType::Matching,
            vec![Answer {
                left: Some("A".to_string()),
                right: Some("B".to_string()),
                html: Some("<p>x</p>".to_string()),
                ..Answer::default()
            }],
        );
        normalize_answers_for_write(&mut question);
        let once = serde_json::to_value(&question).unwrap();
        normalize_answers_for_write(&mut question);
        let twice = serde_json::to_value(&question).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn dropdown_text_untouched_for_other_types() {
        let mut question = question_with_answers(
            QuestionType::MultipleChoice,
            vec![Answer {
                text: Some("red".to_string()),
                weight: Some(100.0),
                ..Answer::default()
            }],
        );
        normalize_answers_for_write(&mut question);
        let answer = &question.answers.as_ref().unwrap()[0];
        assert_eq!(answer.text.as_deref(), Some("red"));
        assert!(answer.answer_text.is_none());
    }

    #[test]
    fn question_round_trips_unknown_fields() {
        let raw = json!({
            "id": 9,
            "quiz_group_id": null,
            "question_type": "numerical_question",
            "question_name": "N",
            "answers": [{"id": 1, "text": "4", "exact": 4.0, "margin": 0.5}],
            "assessment_question_id": 1234
        });
        let question: Question = serde_json::from_value(raw).unwrap();
        assert_eq!(question.question_type, QuestionType::Numerical);
        assert_eq!(question.extra["assessment_question_id"], json!(1234));
        let answer = &question.answers.as_ref().unwrap()[0];
        assert_eq!(answer.extra["exact"], json!(4.0));

        let back = serde_json::to_value(&question).unwrap();
        assert_eq!(back["assessment_question_id"], json!(1234));
        assert_eq!(back["answers"][0]["margin"], json!(0.5));
    }

    #[test]
    fn unknown_question_type_becomes_other() {
        let question: Question = serde_json::from_value(json!({
            "question_type": "hologram_question"
        }))
        .unwrap();
        assert_eq!(question.question_type, QuestionType::Other);
    }

    #[test]
    fn blanks_answers_collapse_to_options_and_back() {
        let mut question = question_with_answers(
            QuestionType::FillInMultipleBlanks,
            vec![
                Answer {
                    text: Some("colour".to_string()),
                    blank_id: Some("b1".to_string()),
                    ..Answer::default()
                },
                Answer {
                    text: Some("color".to_string()),
                    blank_id: Some("b1".to_string()),
                    ..Answer::default()
                },
                Answer {
                    text: Some("two".to_string()),
                    blank_id: Some("b2".to_string()),
                    ..Answer::default()
                },
            ],
        );
        answers_to_options(&mut question);
        assert!(question.answers.is_none());
        let options = question.extra["options"].as_object().unwrap();
        assert_eq!(options["b1"], json!(["colour", "color"]));
        assert_eq!(options["b2"], json!("two"));

        options_to_answers(&mut question);
        assert!(question.extra.get("options").is_none());
        let answers = question.answers.as_ref().unwrap();
        assert_eq!(answers.len(), 3);
        assert!(answers
            .iter()
            .all(|answer| answer.weight == Some(100.0) && answer.blank_id.is_some()));
    }
}
