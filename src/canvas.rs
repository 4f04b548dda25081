use crate::connection::{is_not_found, request_paginated};
use crate::prompt::Prompter;
use crate::{CanvasCredentials, Course};
use log::{debug, warn};
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;

/// Entry point for talking to a Canvas instance.
///
/// Owns the credentials and answers course-level lookups; everything below a
/// course goes through [`Course`] and the resources it hands out.
pub struct Canvas {
    credentials: Arc<CanvasCredentials>,
}

impl Canvas {
    pub fn new(credentials: CanvasCredentials) -> Canvas {
        Canvas {
            credentials: Arc::new(credentials),
        }
    }

    pub fn credentials(&self) -> &Arc<CanvasCredentials> {
        &self.credentials
    }

    /// Fetches the available courses of the token's user, all pages.
    pub fn courses(&self) -> Result<Vec<Course>, Box<dyn Error>> {
        let path = "/courses?include[]=term&state[]=available";
        let mut courses = Vec::new();
        for page in request_paginated(&self.credentials, path, false)? {
            if let Value::Array(entries) = page {
                courses.extend(
                    entries
                        .iter()
                        .filter_map(|course| Course::from_json(&self.credentials, course)),
                );
            }
        }
        debug!("fetched {} courses", courses.len());
        Ok(courses)
    }

    /// Fetches one course by id. Missing courses surface as `Ok(None)`.
    pub fn course(&self, course_id: u64) -> Result<Option<Course>, Box<dyn Error>> {
        let path = format!("/courses/{}?include[]=term", course_id);
        let pages = match request_paginated(&self.credentials, &path, true) {
            Ok(pages) => pages,
            Err(error) => {
                if is_not_found(&error) {
                    warn!("course {} not found", course_id);
                    return Ok(None);
                }
                return Err(error);
            }
        };
        Ok(pages
            .first()
            .and_then(|course| Course::from_json(&self.credentials, course)))
    }

    /// Resolves a course from an explicit id, or by asking the prompter to
    /// pick one from the listing. `Ok(None)` means the user backed out.
    pub fn resolve_course(
        &self,
        course_id: Option<u64>,
        prompter: Option<&dyn Prompter>,
    ) -> Result<Option<Course>, Box<dyn Error>> {
        if let Some(id) = course_id {
            if let Some(course) = self.course(id)? {
                return Ok(Some(course));
            }
        }
        let prompter = match prompter {
            Some(prompter) => prompter,
            None => return Ok(None),
        };
        let mut courses = self.courses()?;
        let items: Vec<String> = courses
            .iter()
            .map(|course| {
                format!(
                    "{:7} - {:10} / {}",
                    course.info.id, course.info.term, course.info.course_code
                )
            })
            .collect();
        match prompter.select("Which course?", &items) {
            Some(index) if index < courses.len() => Ok(Some(courses.swap_remove(index))),
            _ => Ok(None),
        }
    }
}
