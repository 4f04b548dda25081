use crate::connection::{is_not_found, request_paginated};
use crate::prompt::Prompter;
use crate::quiz::Quiz;
use crate::CanvasCredentials;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

/// Details of a Canvas course: the root scope every other resource hangs off.
///
/// Created once from a listing or lookup call and immutable for the process
/// lifetime. The shared credentials live here and are handed down to every
/// sub-resource at construction.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CourseInfo {
    pub id: u64,
    pub term: String,
    pub course_code: String,
    #[serde(skip)]
    pub canvas_info: Arc<CanvasCredentials>,
}

/// Cheaply clonable handle to a Canvas course.
#[derive(Clone)]
pub struct Course {
    pub info: Arc<CourseInfo>,
}

impl Course {
    /// Builds a course from one object of a courses listing response.
    ///
    /// Listing entries without a numeric id are skipped by returning `None`;
    /// a missing term is tolerated because not every enrollment exposes one.
    pub fn from_json(canvas_info: &Arc<CanvasCredentials>, course: &Value) -> Option<Course> {
        let id = course["id"].as_u64()?;
        let term = course["term"]["name"].as_str().unwrap_or("NO TERM").to_string();
        let course_code = course["course_code"]
            .as_str()
            .unwrap_or("UNKNOWN COURSE")
            .to_string();
        Some(Course {
            info: Arc::new(CourseInfo {
                id,
                term,
                course_code,
                canvas_info: Arc::clone(canvas_info),
            }),
        })
    }

    /// URL prefix every sub-resource of this course is addressed under.
    pub fn url_prefix(&self) -> String {
        format!("/courses/{}", self.info.id)
    }

    /// Fetches the assignment-type quizzes of this course, all pages.
    ///
    /// Surveys and practice quizzes are filtered out, matching what the quiz
    /// pickers should offer.
    pub fn quizzes(&self) -> Result<Vec<Quiz>, Box<dyn Error>> {
        let path = format!("{}/quizzes", self.url_prefix());
        let mut quizzes = Vec::new();
        for page in request_paginated(&self.info.canvas_info, &path, false)? {
            if let Value::Array(entries) = page {
                quizzes.extend(
                    entries
                        .into_iter()
                        .filter(|quiz| quiz["quiz_type"] == "assignment")
                        .map(|quiz| Quiz::new(self, quiz)),
                );
            }
        }
        debug!("fetched {} quizzes for course {}", quizzes.len(), self.info.id);
        Ok(quizzes)
    }

    /// Fetches one quiz by id. Missing quizzes surface as `Ok(None)`.
    pub fn quiz(&self, quiz_id: u64) -> Result<Option<Quiz>, Box<dyn Error>> {
        let path = format!("{}/quizzes/{}", self.url_prefix(), quiz_id);
        let pages = match request_paginated(&self.info.canvas_info, &path, true) {
            Ok(pages) => pages,
            Err(error) => {
                if is_not_found(&error) {
                    warn!("quiz {} not found in course {}", quiz_id, self.info.id);
                    return Ok(None);
                }
                return Err(error);
            }
        };
        Ok(pages.into_iter().next().map(|data| Quiz::new(self, data)))
    }

    /// Resolves a quiz from an explicit id, or by asking the prompter to pick
    /// one from the course's quiz list. `Ok(None)` means the user backed out.
    pub fn resolve_quiz(
        &self,
        quiz_id: Option<u64>,
        prompter: Option<&dyn Prompter>,
    ) -> Result<Option<Quiz>, Box<dyn Error>> {
        if let Some(id) = quiz_id {
            if let Some(quiz) = self.quiz(id)? {
                return Ok(Some(quiz));
            }
        }
        let prompter = match prompter {
            Some(prompter) => prompter,
            None => return Ok(None),
        };
        let mut quizzes = self.quizzes()?;
        let items: Vec<String> = quizzes
            .iter()
            .map(|quiz| {
                format!(
                    "{:7} - {}",
                    quiz.id().unwrap_or(0),
                    quiz.title().unwrap_or("(untitled)")
                )
            })
            .collect();
        match prompter.select("Which quiz?", &items) {
            Some(index) if index < quizzes.len() => Ok(Some(quizzes.swap_remove(index))),
            _ => Ok(None),
        }
    }

    /// Fetches the students of this course keyed by SIS user id.
    ///
    /// Students without a SIS id are keyed under `"0"`, matching how grade
    /// exports refer to them.
    pub fn students(&self) -> Result<HashMap<String, Value>, Box<dyn Error>> {
        let path = format!("{}/users?enrollment_type=student", self.url_prefix());
        let mut students = HashMap::new();
        for page in request_paginated(&self.info.canvas_info, &path, false)? {
            if let Value::Array(entries) = page {
                for student in entries {
                    let sis_user_id = student["sis_user_id"]
                        .as_str()
                        .unwrap_or("0")
                        .to_string();
                    students.insert(sis_user_id, student);
                }
            }
        }
        Ok(students)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials() -> Arc<CanvasCredentials> {
        Arc::new(CanvasCredentials::new("https://canvas.test/api/v1", "token"))
    }

    #[test]
    fn course_from_listing_entry() {
        let course = Course::from_json(
            &credentials(),
            &json!({
                "id": 101,
                "term": {"name": "2024W1"},
                "course_code": "CPSC 999"
            }),
        )
        .unwrap();
        assert_eq!(course.info.id, 101);
        assert_eq!(course.info.term, "2024W1");
        assert_eq!(course.url_prefix(), "/courses/101");
    }

    #[test]
    fn course_without_term_gets_placeholder() {
        let course = Course::from_json(
            &credentials(),
            &json!({"id": 7, "course_code": "X"}),
        )
        .unwrap();
        assert_eq!(course.info.term, "NO TERM");
    }

    #[test]
    fn course_without_id_is_rejected() {
        assert!(Course::from_json(&credentials(), &json!({"course_code": "X"})).is_none());
    }
}
