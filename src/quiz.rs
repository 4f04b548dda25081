use crate::connection::{delete_json, is_not_found, post_json, put_json, request_paginated};
use crate::question::{normalize_answers_for_write, Question};
use crate::question_group::QuestionGroup;
use crate::resource::{Resource, ResourceBuilder, ResourceParent};
use crate::{CanvasCredentials, Course};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

/// Broad classification of a quiz, derived rather than stored: Canvas marks
/// practice quizzes explicitly, and among graded quizzes a time limit is
/// what distinguishes a sit-down exam from take-home work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizKind {
    Exam,
    Homework,
    Practice,
}

/// One entry of a quiz ordering: a group slot or an ungrouped question slot.
///
/// The id is kept as a raw JSON value because sync documents may refer to
/// not-yet-created resources by a textual local key; by the time an order is
/// pushed the ids have been rewritten to numbers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrderItem {
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Group,
    Question,
}

/// Which related records a submissions fetch asks Canvas to embed.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionInclude {
    pub user: bool,
    pub submission: bool,
    pub history: bool,
    /// Keep placeholder attempts Canvas creates when a student merely opens
    /// the quiz settings.
    pub settings_only: bool,
}

impl Default for SubmissionInclude {
    fn default() -> SubmissionInclude {
        SubmissionInclude {
            user: true,
            submission: true,
            history: true,
            settings_only: false,
        }
    }
}

/// A Canvas quiz and the operations on its nested content.
#[derive(Clone)]
pub struct Quiz {
    resource: Resource,
}

impl Quiz {
    pub fn new(course: &Course, data: Value) -> Quiz {
        Quiz {
            resource: ResourceBuilder::new(
                ResourceParent::Course(course.clone()),
                "quizzes",
                data,
            )
            .build(),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn id(&self) -> Option<u64> {
        self.resource.id().and_then(Value::as_u64)
    }

    pub fn title(&self) -> Option<&str> {
        self.resource.get("title").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.resource.get(field)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.resource.set(field, value);
    }

    pub fn data(&self) -> Value {
        Value::Object(self.resource.data().clone())
    }

    pub fn kind(&self) -> QuizKind {
        if self.get("quiz_type").and_then(Value::as_str) == Some("practice_quiz") {
            QuizKind::Practice
        } else if self
            .get("time_limit")
            .map(|limit| !limit.is_null())
            .unwrap_or(false)
        {
            QuizKind::Exam
        } else {
            QuizKind::Homework
        }
    }

    fn date_field(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.get(field)?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|date| date.with_timezone(&Utc))
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.date_field("due_at")
    }

    pub fn lock_at(&self) -> Option<DateTime<Utc>> {
        self.date_field("lock_at")
    }

    pub fn unlock_at(&self) -> Option<DateTime<Utc>> {
        self.date_field("unlock_at")
    }

    fn credentials(&self) -> &Arc<CanvasCredentials> {
        self.resource.credentials()
    }

    fn url(&self) -> Result<String, Box<dyn Error>> {
        self.resource
            .url()
            .ok_or_else(|| "quiz has no id yet; create it first".into())
    }

    /// Pushes the quiz's own fields, creating the quiz when it has no id.
    pub fn update(&mut self, data: Option<Value>) -> Result<&mut Quiz, Box<dyn Error>> {
        self.resource.update(data)?;
        Ok(self)
    }

    /// Fetches one question group by id.
    ///
    /// `None` in means "no group" out; an id Canvas does not know is also
    /// answered with `Ok(None)` so callers can fall back to ungrouped
    /// handling instead of aborting a whole assembly.
    pub fn question_group(
        &self,
        group_id: Option<u64>,
    ) -> Result<Option<QuestionGroup>, Box<dyn Error>> {
        let group_id = match group_id {
            Some(group_id) => group_id,
            None => return Ok(None),
        };
        let path = format!("{}/groups/{}", self.url()?, group_id);
        let pages = match request_paginated(self.credentials(), &path, true) {
            Ok(pages) => pages,
            Err(error) => {
                if is_not_found(&error) {
                    warn!("question group {} not found, treating as ungrouped", group_id);
                    return Ok(None);
                }
                return Err(error);
            }
        };
        match pages.into_iter().next() {
            Some(page) => Ok(Some(serde_json::from_value(page)?)),
            None => Ok(None),
        }
    }

    /// Creates or updates a question group, dispatching on whether an id is
    /// supplied. Returns the group as Canvas stored it.
    ///
    /// Groups use their own envelope: the body nests the group in a
    /// `quiz_groups` array and the response comes back the same way.
    pub fn update_question_group(
        &self,
        group_id: Option<u64>,
        group: &QuestionGroup,
    ) -> Result<QuestionGroup, Box<dyn Error>> {
        let body = json!({ "quiz_groups": [group] });
        let response = match group_id {
            Some(id) => put_json(
                self.credentials(),
                &format!("{}/groups/{}", self.url()?, id),
                body,
            )?,
            None => post_json(self.credentials(), &format!("{}/groups", self.url()?), body)?,
        };
        let response = response.ok_or("empty response from question group update")?;
        let stored = response
            .get("quiz_groups")
            .and_then(|groups| groups.get(0))
            .ok_or("malformed quiz_groups envelope in response")?;
        Ok(serde_json::from_value(stored.clone())?)
    }

    /// Fetches every question of this quiz and assembles the merged ordering.
    ///
    /// Returns questions and groups sorted ascending by their computed
    /// position; see [`assemble_questions`] for the position rules. The
    /// optional filter selects questions by id without affecting position
    /// assignment.
    pub fn questions(
        &self,
        filter: Option<&dyn Fn(u64) -> bool>,
    ) -> Result<(Vec<Question>, Vec<QuestionGroup>), Box<dyn Error>> {
        let path = format!("{}/questions?per_page=100", self.url()?);
        let pages = request_paginated(self.credentials(), &path, false)?;
        assemble_questions(pages, |group_id| self.question_group(group_id), filter)
    }

    /// Creates or updates one question, dispatching on id presence.
    ///
    /// The answers are rewritten into the write shape immediately before the
    /// call; the caller's question is not modified. Returns the question as
    /// Canvas stored it.
    pub fn update_question(
        &self,
        question_id: Option<u64>,
        question: &Question,
    ) -> Result<Question, Box<dyn Error>> {
        let mut outbound = question.clone();
        normalize_answers_for_write(&mut outbound);
        let body = json!({ "question": outbound });
        let response = match question_id {
            Some(id) => put_json(
                self.credentials(),
                &format!("{}/questions/{}", self.url()?, id),
                body,
            )?,
            None => post_json(
                self.credentials(),
                &format!("{}/questions", self.url()?),
                body,
            )?,
        };
        let response = response.ok_or("empty response from question update")?;
        Ok(serde_json::from_value(response)?)
    }

    pub fn delete_question(&self, question_id: u64) -> Result<(), Box<dyn Error>> {
        info!("deleting question {}", question_id);
        delete_json(
            self.credentials(),
            &format!("{}/questions/{}", self.url()?, question_id),
        )?;
        Ok(())
    }

    /// Pushes an explicit ordering of groups and ungrouped questions.
    pub fn reorder_questions(&self, order: &[OrderItem]) -> Result<(), Box<dyn Error>> {
        debug!("reordering {} entries", order.len());
        post_json(
            self.credentials(),
            &format!("{}/reorder", self.url()?),
            json!({ "order": order }),
        )?;
        Ok(())
    }

    /// Fetches the submission history of this quiz, all pages.
    ///
    /// Returns the quiz submissions (one per attempt series) and the plain
    /// submissions they hang off, keyed by submission id.
    pub fn submissions(
        &self,
        include: &SubmissionInclude,
    ) -> Result<(Vec<Value>, HashMap<u64, Value>), Box<dyn Error>> {
        let mut query = String::new();
        if include.user {
            query.push_str("include[]=user&");
        }
        if include.submission {
            query.push_str("include[]=submission&");
        }
        if include.history {
            query.push_str("include[]=submission_history&");
        }
        let path = format!("{}/submissions?{}", self.url()?, query);

        let mut quiz_submissions = Vec::new();
        let mut submissions = HashMap::new();
        for page in request_paginated(self.credentials(), &path, false)? {
            if let Some(entries) = page["quiz_submissions"].as_array() {
                quiz_submissions.extend(
                    entries
                        .iter()
                        .filter(|qs| {
                            include.settings_only || qs["workflow_state"] != "settings_only"
                        })
                        .cloned(),
                );
            }
            if include.submission {
                if let Some(entries) = page["submissions"].as_array() {
                    for submission in entries {
                        if let Some(id) = submission["id"].as_u64() {
                            submissions.insert(id, submission.clone());
                        }
                    }
                }
            }
        }
        info!("fetched {} quiz submissions", quiz_submissions.len());
        Ok((quiz_submissions, submissions))
    }

    /// Fetches the per-attempt question records of one quiz submission.
    ///
    /// This endpoint is rooted at the API root, not under the course.
    pub fn submission_questions(
        &self,
        quiz_submission: &Value,
    ) -> Result<HashMap<u64, Value>, Box<dyn Error>> {
        let submission_id = quiz_submission["id"]
            .as_u64()
            .ok_or("quiz submission without id")?;
        let path = format!("/quiz_submissions/{}/questions", submission_id);
        let mut questions = HashMap::new();
        for page in request_paginated(self.credentials(), &path, false)? {
            if let Some(entries) = page["quiz_submission_questions"].as_array() {
                for question in entries {
                    if let Some(id) = question["id"].as_u64() {
                        questions.insert(id, question.clone());
                    }
                }
            }
        }
        Ok(questions)
    }

    /// Posts a score and optional comment for one question of one attempt.
    pub fn send_grade(
        &self,
        quiz_submission: &Value,
        question_id: u64,
        score: f64,
        comment: Option<&str>,
    ) -> Result<(), Box<dyn Error>> {
        let submission_id = quiz_submission["id"]
            .as_u64()
            .ok_or("quiz submission without id")?;
        let attempt = quiz_submission["attempt"]
            .as_u64()
            .ok_or("quiz submission without attempt")?;
        let mut questions = serde_json::Map::new();
        questions.insert(
            question_id.to_string(),
            json!({ "score": score, "comment": comment }),
        );
        let body = json!({
            "quiz_submissions": [{
                "attempt": attempt,
                "questions": questions
            }]
        });
        put_json(
            self.credentials(),
            &format!("{}/submissions/{}", self.url()?, submission_id),
            body,
        )?;
        Ok(())
    }
}

/// Assembles fetched question pages into the merged quiz ordering.
///
/// Position rules:
/// - a question whose group resolves takes the group's `position` and
///   inherits the group's `question_points`;
/// - an ungrouped question (including one whose group lookup misses) takes a
///   1-based counter in page-arrival order;
/// - afterwards, for every group, every ungrouped question at or past the
///   group's position is shifted up by one so the group keeps a single
///   contiguous slot. A question past several groups is shifted once per
///   group; the compounding is deliberate, it is the only ordering rule
///   available without a server-side combined ordering.
///
/// Group lookups are memoized per distinct id, the null sentinel included,
/// and the memo lives only for this call: positions are recomputed from
/// scratch every time, never accumulated across calls.
pub fn assemble_questions<F>(
    pages: Vec<Value>,
    mut lookup_group: F,
    filter: Option<&dyn Fn(u64) -> bool>,
) -> Result<(Vec<Question>, Vec<QuestionGroup>), Box<dyn Error>>
where
    F: FnMut(Option<u64>) -> Result<Option<QuestionGroup>, Box<dyn Error>>,
{
    let mut questions: Vec<Question> = Vec::new();
    // Memo keyed by group id in first-seen order; order matters because the
    // renumber pass below walks it.
    let mut group_memo: Vec<(Option<u64>, Option<QuestionGroup>)> = Vec::new();
    let mut next_ungrouped_position = 1u32;

    for page in pages {
        let entries = match page {
            Value::Array(entries) => entries,
            _ => continue,
        };
        for entry in entries {
            let mut question: Question = serde_json::from_value(entry)?;

            let memo_index = match group_memo
                .iter()
                .position(|(id, _)| *id == question.quiz_group_id)
            {
                Some(index) => index,
                None => {
                    let group = lookup_group(question.quiz_group_id)?;
                    group_memo.push((question.quiz_group_id, group));
                    group_memo.len() - 1
                }
            };

            match &group_memo[memo_index].1 {
                Some(group) if group.position.is_some() => {
                    question.points_possible = group.question_points;
                    question.position = group.position;
                }
                _ => {
                    question.position = Some(next_ungrouped_position);
                    next_ungrouped_position += 1;
                }
            }

            let include = match (filter, question.id) {
                (Some(filter), Some(id)) => filter(id),
                (Some(_), None) => false,
                (None, _) => true,
            };
            if include {
                questions.push(question);
            }
        }
    }

    // Drop the null sentinel, keep real groups in first-seen order.
    let mut groups: Vec<QuestionGroup> = group_memo
        .into_iter()
        .filter(|(id, _)| id.is_some())
        .filter_map(|(_, group)| group)
        .collect();

    for group in &groups {
        let group_position = match group.position {
            Some(position) => position,
            None => continue,
        };
        for question in questions
            .iter_mut()
            .filter(|question| question.quiz_group_id.is_none())
        {
            if let Some(position) = question.position {
                if position >= group_position {
                    question.position = Some(position + 1);
                }
            }
        }
    }

    questions.sort_by_key(|question| question.position.unwrap_or(u32::MAX));
    groups.sort_by_key(|group| group.position.unwrap_or(u32::MAX));
    Ok((questions, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashSet;

    fn group(id: u64, position: u32, points: f64) -> QuestionGroup {
        QuestionGroup {
            id: Some(id),
            name: format!("G{}", id),
            pick_count: None,
            question_points: Some(points),
            position: Some(position),
            ..QuestionGroup::default()
        }
    }

    fn question_page(entries: Vec<Value>) -> Vec<Value> {
        vec![Value::Array(entries)]
    }

    fn raw_question(id: u64, group_id: Option<u64>) -> Value {
        json!({
            "id": id,
            "quiz_group_id": group_id,
            "question_type": "essay_question",
            "question_name": format!("Q{}", id)
        })
    }

    #[test]
    fn grouped_and_ungrouped_positions_merge_without_collision() {
        // Group G sits at position 2; questions 1 and 2 belong to it.
        // Question 3 arrives first among the ungrouped, then 4 and 5.
        let pages = question_page(vec![
            raw_question(3, None),
            raw_question(1, Some(10)),
            raw_question(2, Some(10)),
            raw_question(4, None),
            raw_question(5, None),
        ]);
        let (questions, groups) = assemble_questions(
            pages,
            |group_id| Ok(group_id.map(|_| group(10, 2, 1.5))),
            None,
        )
        .unwrap();

        let position_of = |id: u64| {
            questions
                .iter()
                .find(|question| question.id == Some(id))
                .and_then(|question| question.position)
                .unwrap()
        };
        // Question 3 sat at 1, before the group slot: no shift.
        assert_eq!(position_of(3), 1);
        // Group members share the group's slot and points.
        assert_eq!(position_of(1), 2);
        assert_eq!(position_of(2), 2);
        assert!(questions
            .iter()
            .filter(|question| question.quiz_group_id == Some(10))
            .all(|question| question.points_possible == Some(1.5)));
        // Questions 4 and 5 started at 2 and 3 and were pushed past the slot.
        assert_eq!(position_of(4), 3);
        assert_eq!(position_of(5), 4);

        // No two top-level slots coincide: ungrouped positions and group
        // positions are all distinct.
        let mut slots: Vec<u32> = questions
            .iter()
            .filter(|question| question.quiz_group_id.is_none())
            .filter_map(|question| question.position)
            .chain(groups.iter().filter_map(|group| group.position))
            .collect();
        let total = slots.len();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), total);
    }

    #[test]
    fn unresolved_group_is_treated_as_ungrouped() {
        let pages = question_page(vec![
            raw_question(1, Some(99)),
            raw_question(2, None),
        ]);
        let (questions, groups) =
            assemble_questions(pages, |_| Ok(None), None).unwrap();

        assert!(groups.is_empty());
        assert_eq!(questions[0].position, Some(1));
        assert_eq!(questions[1].position, Some(2));
    }

    #[test]
    fn group_lookup_is_memoized_per_distinct_id() {
        let lookups = RefCell::new(Vec::new());
        let pages = question_page(vec![
            raw_question(1, Some(10)),
            raw_question(2, Some(10)),
            raw_question(3, None),
            raw_question(4, None),
            raw_question(5, Some(20)),
        ]);
        assemble_questions(
            pages,
            |group_id| {
                lookups.borrow_mut().push(group_id);
                Ok(group_id.map(|id| group(id, (id / 10) as u32, 1.0)))
            },
            None,
        )
        .unwrap();

        // One lookup per distinct id, the null sentinel included.
        assert_eq!(*lookups.borrow(), vec![Some(10), None, Some(20)]);
    }

    #[test]
    fn filter_selects_without_affecting_positions() {
        let pages = question_page(vec![
            raw_question(1, None),
            raw_question(2, None),
            raw_question(3, None),
        ]);
        let keep: HashSet<u64> = [3].into_iter().collect();
        let filter = |id: u64| keep.contains(&id);
        let (questions, _) =
            assemble_questions(pages, |_| Ok(None), Some(&filter)).unwrap();

        assert_eq!(questions.len(), 1);
        // Question 3 keeps the position it earned by arrival order.
        assert_eq!(questions[0].id, Some(3));
        assert_eq!(questions[0].position, Some(3));
    }

    #[test]
    fn shifts_compound_across_groups() {
        // Two groups at positions 1 and 2; one ungrouped question arriving
        // first. Its counter position 1 is shifted once per group: 1 -> 2 -> 3.
        let pages = question_page(vec![
            raw_question(1, None),
            raw_question(2, Some(10)),
            raw_question(3, Some(20)),
        ]);
        let (questions, _) = assemble_questions(
            pages,
            |group_id| {
                Ok(group_id.map(|id| match id {
                    10 => group(10, 1, 1.0),
                    _ => group(20, 2, 1.0),
                }))
            },
            None,
        )
        .unwrap();

        let ungrouped = questions
            .iter()
            .find(|question| question.quiz_group_id.is_none())
            .unwrap();
        assert_eq!(ungrouped.position, Some(3));
    }

    #[test]
    fn results_are_sorted_by_position() {
        let pages = question_page(vec![
            raw_question(1, Some(20)),
            raw_question(2, None),
            raw_question(3, Some(10)),
        ]);
        let (questions, groups) = assemble_questions(
            pages,
            |group_id| {
                Ok(group_id.map(|id| match id {
                    10 => group(10, 1, 1.0),
                    _ => group(20, 3, 1.0),
                }))
            },
            None,
        )
        .unwrap();

        let positions: Vec<u32> = questions
            .iter()
            .filter_map(|question| question.position)
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
        assert_eq!(
            groups.iter().map(|group| group.id).collect::<Vec<_>>(),
            vec![Some(10), Some(20)]
        );
    }

    #[test]
    fn order_item_serializes_with_type_tag() {
        let item = OrderItem {
            kind: OrderKind::Group,
            id: json!(12),
            name: None,
            points: None,
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"type": "group", "id": 12})
        );
    }

    #[test]
    fn date_fields_parse_as_utc() {
        let course = crate::course::Course {
            info: Arc::new(crate::course::CourseInfo {
                id: 1,
                term: String::new(),
                course_code: String::new(),
                canvas_info: Arc::new(CanvasCredentials::new("https://canvas.test", "t")),
            }),
        };
        let quiz = Quiz::new(
            &course,
            json!({"id": 1, "due_at": "2024-10-01T06:59:00-07:00", "lock_at": null}),
        );
        let due = quiz.due_at().unwrap();
        assert_eq!(due.to_rfc3339(), "2024-10-01T13:59:00+00:00");
        assert!(quiz.lock_at().is_none());
        assert!(quiz.unlock_at().is_none());
    }

    #[test]
    fn quiz_kind_follows_time_limit_and_type() {
        let course = crate::course::Course {
            info: Arc::new(crate::course::CourseInfo {
                id: 1,
                term: String::new(),
                course_code: String::new(),
                canvas_info: Arc::new(CanvasCredentials::new("https://canvas.test", "t")),
            }),
        };
        let exam = Quiz::new(&course, json!({"id": 1, "time_limit": 60}));
        assert_eq!(exam.kind(), QuizKind::Exam);
        let homework = Quiz::new(&course, json!({"id": 2, "time_limit": null}));
        assert_eq!(homework.kind(), QuizKind::Homework);
        let practice = Quiz::new(
            &course,
            json!({"id": 3, "time_limit": 60, "quiz_type": "practice_quiz"}),
        );
        assert_eq!(practice.kind(), QuizKind::Practice);
    }
}
