use crate::quiz::{Quiz, SubmissionInclude};
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;

/// One manually graded score for one question of one attempt.
///
/// The student is identified by SIS user id, the way grade sheets refer to
/// students. Parsing the sheet itself (CSV or otherwise) is the caller's
/// job; entries arrive here already structured.
#[derive(Deserialize, Debug, Clone)]
pub struct GradeEntry {
    pub student: String,
    pub attempt: u64,
    pub question_id: u64,
    pub score: f64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// One grade update ready to send: the quiz submission it lands on plus the
/// per-question payload.
#[derive(Debug, Clone)]
pub struct GradeUpdate {
    pub quiz_submission: Value,
    pub question_id: u64,
    pub score: f64,
    pub comment: Option<String>,
}

/// Indexes submissions by the owning student's SIS user id.
///
/// Students without a SIS id land under `"0"`, the same placeholder the
/// course roster uses.
fn submissions_by_student(submissions: &HashMap<u64, Value>) -> HashMap<String, Vec<u64>> {
    let mut by_student: HashMap<String, Vec<u64>> = HashMap::new();
    for (id, submission) in submissions {
        let sis_user_id = submission["user"]["sis_user_id"]
            .as_str()
            .unwrap_or("0")
            .to_string();
        by_student.entry(sis_user_id).or_default().push(*id);
    }
    by_student
}

/// Matches grade entries against fetched submissions.
///
/// For every entry, every quiz submission belonging to the student with the
/// matching attempt number yields one update. Entries for unknown students
/// or attempts produce none and are only logged: the grade sheet may cover
/// students who never submitted.
pub fn plan_grade_updates(
    quiz_submissions: &[Value],
    submissions: &HashMap<u64, Value>,
    grades: &[GradeEntry],
) -> Vec<GradeUpdate> {
    let by_student = submissions_by_student(submissions);
    let mut updates = Vec::new();
    for grade in grades {
        let submission_ids = match by_student.get(&grade.student) {
            Some(ids) => ids,
            None => {
                warn!("no submission found for student {}", grade.student);
                continue;
            }
        };
        let mut matched = false;
        for quiz_submission in quiz_submissions {
            let belongs = quiz_submission["submission_id"]
                .as_u64()
                .map(|id| submission_ids.contains(&id))
                .unwrap_or(false);
            if belongs && quiz_submission["attempt"].as_u64() == Some(grade.attempt) {
                matched = true;
                updates.push(GradeUpdate {
                    quiz_submission: quiz_submission.clone(),
                    question_id: grade.question_id,
                    score: grade.score,
                    comment: grade.comment.clone(),
                });
            }
        }
        if !matched {
            warn!(
                "no attempt {} found for student {}",
                grade.attempt, grade.student
            );
        }
    }
    updates
}

/// Pushes a batch of grades to a quiz, one request per update.
///
/// Returns the number of updates sent. Sequential on purpose: each PUT is
/// confirmed before the next goes out, and a failure aborts the batch with
/// the remaining entries unsent.
pub fn push_quiz_grades(quiz: &Quiz, grades: &[GradeEntry]) -> Result<usize, Box<dyn Error>> {
    info!("fetching submissions for grade push");
    let (quiz_submissions, submissions) = quiz.submissions(&SubmissionInclude::default())?;
    let updates = plan_grade_updates(&quiz_submissions, &submissions, grades);
    info!("sending {} grade updates", updates.len());
    for update in &updates {
        quiz.send_grade(
            &update.quiz_submission,
            update.question_id,
            update.score,
            update.comment.as_deref(),
        )?;
    }
    Ok(updates.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission(id: u64, sis_user_id: &str) -> (u64, Value) {
        (id, json!({"id": id, "user": {"sis_user_id": sis_user_id}}))
    }

    fn quiz_submission(id: u64, submission_id: u64, attempt: u64) -> Value {
        json!({"id": id, "submission_id": submission_id, "attempt": attempt})
    }

    fn grade(student: &str, attempt: u64, question_id: u64, score: f64) -> GradeEntry {
        GradeEntry {
            student: student.to_string(),
            attempt,
            question_id,
            score,
            comment: None,
        }
    }

    #[test]
    fn grades_match_student_and_attempt() {
        let submissions: HashMap<u64, Value> =
            [submission(500, "s123"), submission(501, "s456")]
                .into_iter()
                .collect();
        let quiz_submissions = vec![
            quiz_submission(1, 500, 1),
            quiz_submission(2, 500, 2),
            quiz_submission(3, 501, 1),
        ];
        let grades = vec![grade("s123", 2, 77, 1.5)];

        let updates = plan_grade_updates(&quiz_submissions, &submissions, &grades);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].quiz_submission["id"], json!(2));
        assert_eq!(updates[0].question_id, 77);
        assert_eq!(updates[0].score, 1.5);
    }

    #[test]
    fn unknown_student_yields_no_update() {
        let submissions: HashMap<u64, Value> = [submission(500, "s123")].into_iter().collect();
        let quiz_submissions = vec![quiz_submission(1, 500, 1)];
        let grades = vec![grade("missing", 1, 77, 1.0)];

        let updates = plan_grade_updates(&quiz_submissions, &submissions, &grades);
        assert!(updates.is_empty());
    }

    #[test]
    fn wrong_attempt_yields_no_update() {
        let submissions: HashMap<u64, Value> = [submission(500, "s123")].into_iter().collect();
        let quiz_submissions = vec![quiz_submission(1, 500, 1)];
        let grades = vec![grade("s123", 3, 77, 1.0)];

        let updates = plan_grade_updates(&quiz_submissions, &submissions, &grades);
        assert!(updates.is_empty());
    }

    #[test]
    fn grade_entry_deserializes_from_document_row() {
        let entry: GradeEntry = serde_json::from_value(json!({
            "student": "s123",
            "attempt": 1,
            "question_id": 9,
            "score": 0.5,
            "comment": "partial credit"
        }))
        .unwrap();
        assert_eq!(entry.comment.as_deref(), Some("partial credit"));
    }
}
