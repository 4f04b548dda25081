use crate::prompt::Prompter;
use crate::question::{answers_to_options, options_to_answers, Question};
use crate::question_group::QuestionGroup;
use crate::quiz::{OrderItem, OrderKind, Quiz};
use crate::Course;
use log::info;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::error::Error;

/// External sync document: the JSON file shape produced by an export and
/// consumed by a patch run.
///
/// All four sections are optional; an absent section means "do not touch
/// that category". Group and question entries are keyed by a local id: the
/// real Canvas id for exported resources, or any non-numeric key for
/// resources the document introduces. New questions may reference a new
/// group by its local key in `quiz_group_id`.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct SyncDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<OrderItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Map<String, Value>>,
}

impl SyncDocument {
    /// Validates document structure before any network call is attempted.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if let Some(quiz) = &self.quiz {
            if !quiz.is_object() {
                return Err("document 'quiz' section must be an object".into());
            }
        }
        if let Some(groups) = &self.groups {
            for (key, group) in groups {
                if !group.is_object() {
                    return Err(format!("document group '{}' must be an object", key).into());
                }
            }
        }
        if let Some(questions) = &self.questions {
            for (key, question) in questions {
                if !question.is_object() {
                    return Err(format!("document question '{}' must be an object", key).into());
                }
                if question.get("question_type").map(Value::is_null).unwrap_or(true) {
                    return Err(
                        format!("document question '{}' is missing question_type", key).into(),
                    );
                }
                // A textual group reference must name a group entry of this
                // same document, or it could never be resolved.
                if let Some(reference) = question.get("quiz_group_id").and_then(Value::as_str) {
                    let known = self
                        .groups
                        .as_ref()
                        .map(|groups| groups.contains_key(reference))
                        .unwrap_or(false);
                    if !known {
                        return Err(format!(
                            "document question '{}' references unknown group key '{}'",
                            key, reference
                        )
                        .into());
                    }
                }
            }
        }
        Ok(())
    }
}

/// How a quiz clone mutates the copy before creating it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneOptions {
    /// Turn the copy into an open practice quiz: no dates, no time limit,
    /// unlimited attempts, answers shown.
    pub practice: bool,
    /// New quizzes are unpublished unless this is set.
    pub published: bool,
}

/// Export tuning for [`export_document`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Drop fields Canvas refuses on update pushes.
    pub strip: bool,
    /// Collapse fill-in-multiple-blanks answers into the compact `options`
    /// map.
    pub alternate_format: bool,
}

// Fields Canvas accepts back on update pushes; everything else is read-only
// decoration that a stripped export drops.
static QUIZ_WRITABLE_FIELDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "id",
        "title",
        "description",
        "quiz_type",
        "assignment_group_id",
        "time_limit",
        "shuffle_answers",
        "hide_results",
        "show_correct_answers",
        "show_correct_answers_at",
        "hide_correct_answers_at",
        "show_correct_answers_last_attempt",
        "allowed_attempts",
        "scoring_policy",
        "one_question_at_a_time",
        "cant_go_back",
        "access_code",
        "ip_filter",
        "due_at",
        "lock_at",
        "unlock_at",
        "published",
        "one_time_results",
        "only_visible_to_overrides",
    ]
    .into_iter()
    .collect()
});

static GROUP_WRITABLE_FIELDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "id",
        "name",
        "pick_count",
        "question_points",
        "assessment_question_bank_id",
        "position",
    ]
    .into_iter()
    .collect()
});

static QUESTION_WRITABLE_FIELDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "id",
        "question_name",
        "question_text",
        "quiz_group_id",
        "question_type",
        "position",
        "points_possible",
        "correct_comments",
        "incorrect_comments",
        "neutral_comments",
        "text_after_answers",
        "answers",
        "options",
    ]
    .into_iter()
    .collect()
});

fn retain_fields(value: &mut Value, allowed: &HashSet<&'static str>) {
    if let Value::Object(map) = value {
        map.retain(|key, _| allowed.contains(key.as_str()));
    }
}

/// Builds the merged ordering list for assembled questions and groups:
/// one entry per group at its first occurrence, one entry per ungrouped
/// question, in the questions' (position-sorted) order. Grouped questions
/// beyond the first never add entries.
pub fn build_order(questions: &[Question], groups: &[QuestionGroup]) -> Vec<OrderItem> {
    let mut order = Vec::new();
    let mut groups_seen = HashSet::new();
    for question in questions {
        match question.quiz_group_id {
            Some(group_id) => {
                if groups_seen.insert(group_id) {
                    let group = groups.iter().find(|group| group.id == Some(group_id));
                    order.push(OrderItem {
                        kind: OrderKind::Group,
                        id: json!(group_id),
                        name: group.map(|group| group.name.clone()),
                        points: group.and_then(|group| group.question_points),
                    });
                }
            }
            None => {
                let id = match question.id {
                    Some(id) => id,
                    None => continue,
                };
                order.push(OrderItem {
                    kind: OrderKind::Question,
                    id: json!(id),
                    name: question.question_name.clone(),
                    points: question.points_possible,
                });
            }
        }
    }
    order
}

/// Mutates a quiz data object into its practice-run form.
pub fn convert_to_practice(data: &mut Map<String, Value>) {
    data.insert("quiz_type".to_string(), json!("practice_quiz"));
    let lock_at = data.get("lock_at").cloned().unwrap_or(Value::Null);
    data.insert("unlock_at".to_string(), lock_at);
    data.insert("due_at".to_string(), Value::Null);
    data.insert("lock_at".to_string(), Value::Null);
    data.insert("allowed_attempts".to_string(), json!(-1));
    data.insert("time_limit".to_string(), Value::Null);
    data.insert("show_correct_answers".to_string(), json!(true));
    data.insert("show_correct_answers_at".to_string(), Value::Null);
    if let Some(title) = data.get("title").and_then(Value::as_str) {
        let title = format!("{} (Practice Version)", title);
        data.insert("title".to_string(), json!(title));
    }
}

/// A question prepared for cloning into another quiz: no id (so the push
/// creates), group reference rewritten to the clone's group when the source
/// group was cloned. Unmapped group references pass through untouched.
fn remap_question_for_clone(question: &Question, group_ids: &HashMap<u64, u64>) -> Question {
    let mut clone = question.clone();
    clone.id = None;
    if let Some(group_id) = clone.quiz_group_id {
        if let Some(new_id) = group_ids.get(&group_id) {
            clone.quiz_group_id = Some(*new_id);
        }
    }
    clone
}

/// Rewrites a clone ordering from source ids to the ids the clone got.
fn remap_order_ids(
    order: &[OrderItem],
    question_ids: &HashMap<u64, u64>,
    group_ids: &HashMap<u64, u64>,
) -> Vec<OrderItem> {
    order
        .iter()
        .cloned()
        .map(|mut item| {
            if let Some(old_id) = item.id.as_u64() {
                let new_id = match item.kind {
                    OrderKind::Question => question_ids.get(&old_id),
                    OrderKind::Group => group_ids.get(&old_id),
                };
                if let Some(new_id) = new_id {
                    item.id = json!(new_id);
                }
            }
            item
        })
        .collect()
}

/// Clones a quiz into the same course: quiz shell first, then groups, then
/// questions with group references remapped, then one explicit reorder.
///
/// Creates happen strictly in that order because every later step needs the
/// server ids the earlier step returned. On failure the already-created
/// resources stay live on Canvas; the operation is not rolled back and a
/// re-run starts from the top.
pub fn clone_quiz(
    course: &Course,
    source: &Quiz,
    questions: &[Question],
    groups: &[QuestionGroup],
    options: &CloneOptions,
) -> Result<Quiz, Box<dyn Error>> {
    let mut shell = source.resource().data().clone();
    // The shell must not carry the source id, or the push would dispatch an
    // update against the source quiz.
    shell.remove("id");
    if options.practice {
        convert_to_practice(&mut shell);
    } else if let Some(title) = shell.get("title").and_then(Value::as_str) {
        let title = format!("{} (copy)", title);
        shell.insert("title".to_string(), json!(title));
    }
    shell.insert("published".to_string(), json!(options.published));

    info!("creating quiz copy");
    let mut new_quiz = Quiz::new(course, Value::Object(shell));
    new_quiz.update(None)?;

    info!("pushing {} question groups", groups.len());
    let mut group_ids: HashMap<u64, u64> = HashMap::new();
    for group in groups {
        let old_id = match group.id {
            Some(id) => id,
            None => continue,
        };
        let mut copy = group.clone();
        copy.id = None;
        let stored = new_quiz.update_question_group(None, &copy)?;
        if let Some(new_id) = stored.id {
            group_ids.insert(old_id, new_id);
        }
    }

    info!("pushing {} questions", questions.len());
    let mut question_ids: HashMap<u64, u64> = HashMap::new();
    for question in questions {
        let copy = remap_question_for_clone(question, &group_ids);
        let stored = new_quiz.update_question(None, &copy)?;
        if let (Some(old_id), Some(new_id)) = (question.id, stored.id) {
            question_ids.insert(old_id, new_id);
        }
    }

    let order = remap_order_ids(&build_order(questions, groups), &question_ids, &group_ids);
    new_quiz.reorder_questions(&order)?;

    Ok(new_quiz)
}

// Document keys are strings; an entry refers to an existing resource only
// when its key parses as an integer that is currently known on the quiz.
fn existing_id(key: &str, known: &[u64]) -> Option<u64> {
    key.parse::<u64>().ok().filter(|id| known.contains(id))
}

// A textual quiz_group_id is a document-local reference to a group pushed in
// this run; numeric references already point at real groups and pass through.
fn rewrite_group_reference(
    question: &mut Value,
    groups_from_file: &HashMap<String, QuestionGroup>,
) {
    let key = match question.get("quiz_group_id").and_then(Value::as_str) {
        Some(key) => key.to_string(),
        None => return,
    };
    if let Some(stored) = groups_from_file.get(&key) {
        if let Some(id) = stored.id {
            question["quiz_group_id"] = json!(id);
        }
    }
}

/// Rewrites a document ordering so local keys point at the resources this
/// run created. Entries that reference nothing pushed in this run keep
/// their id; unmapped ids are skipped rather than rejected.
fn rewrite_order(
    order: &[OrderItem],
    questions_from_file: &HashMap<String, Question>,
    groups_from_file: &HashMap<String, QuestionGroup>,
) -> Vec<OrderItem> {
    order
        .iter()
        .cloned()
        .map(|mut item| {
            let key = match item.id.as_str() {
                Some(key) => key.to_string(),
                None => return item,
            };
            let new_id = match item.kind {
                OrderKind::Question => {
                    questions_from_file.get(&key).and_then(|question| question.id)
                }
                OrderKind::Group => groups_from_file.get(&key).and_then(|group| group.id),
            };
            if let Some(id) = new_id {
                item.id = json!(id);
            }
            item
        })
        .collect()
}

/// Applies a sync document to a quiz: quiz fields, then groups, then
/// questions, then orphan deletion (each confirmed through the prompter),
/// then the explicit ordering.
///
/// Create-vs-update is decided per entry from its key: keys naming a known
/// id update in place, anything else creates. Like [`clone_quiz`], a failure
/// partway leaves earlier pushes live; there is no rollback.
pub fn apply_document(
    quiz: &mut Quiz,
    document: &SyncDocument,
    prompter: &dyn Prompter,
) -> Result<(), Box<dyn Error>> {
    document.validate()?;

    let (questions, mut groups) = quiz.questions(None)?;

    if let Some(quiz_fields) = &document.quiz {
        info!("pushing quiz field updates");
        quiz.update(Some(quiz_fields.clone()))?;
    }

    let mut groups_from_file: HashMap<String, QuestionGroup> = HashMap::new();
    if let Some(document_groups) = &document.groups {
        info!("pushing {} question group entries", document_groups.len());
        for (key, value) in document_groups {
            let known: Vec<u64> = groups.iter().filter_map(|group| group.id).collect();
            let target = existing_id(key, &known);
            let group: QuestionGroup = serde_json::from_value(value.clone())?;
            let stored = quiz.update_question_group(target, &group)?;
            match groups.iter_mut().find(|group| group.id == stored.id) {
                Some(slot) => *slot = stored.clone(),
                None => groups.push(stored.clone()),
            }
            groups_from_file.insert(key.clone(), stored);
        }
    }

    let mut questions_from_file: HashMap<String, Question> = HashMap::new();
    if let Some(document_questions) = &document.questions {
        info!("pushing {} question entries", document_questions.len());
        let known: Vec<u64> = questions.iter().filter_map(|question| question.id).collect();
        let mut updated: HashSet<u64> = HashSet::new();
        for (key, value) in document_questions {
            let mut value = value.clone();
            rewrite_group_reference(&mut value, &groups_from_file);
            let mut question: Question = serde_json::from_value(value)?;
            options_to_answers(&mut question);
            let target = existing_id(key, &known);
            let stored = quiz.update_question(target, &question)?;
            if let Some(id) = target {
                updated.insert(id);
            }
            if let Some(id) = stored.id {
                updated.insert(id);
            }
            questions_from_file.insert(key.clone(), stored);
        }

        // Existing questions the document does not mention are orphans;
        // deleting each needs an explicit confirmation.
        for question in &questions {
            let id = match question.id {
                Some(id) => id,
                None => continue,
            };
            if updated.contains(&id) {
                continue;
            }
            let prompt = format!(
                "Question {} ({}) not found in document. Delete?",
                id,
                question.question_name.as_deref().unwrap_or("unnamed"),
            );
            if prompter.confirm(&prompt) {
                quiz.delete_question(id)?;
            }
        }
    }

    if let Some(order) = &document.order {
        info!("pushing question order ({} entries)", order.len());
        let rewritten = rewrite_order(order, &questions_from_file, &groups_from_file);
        quiz.reorder_questions(&rewritten)?;
    }

    Ok(())
}

/// Builds the sync document for an assembled quiz, the inverse of
/// [`apply_document`].
pub fn export_document(
    quiz: &Quiz,
    questions: &[Question],
    groups: &[QuestionGroup],
    options: &ExportOptions,
) -> Result<SyncDocument, Box<dyn Error>> {
    let order = build_order(questions, groups);

    let mut quiz_value = quiz.data();

    let mut group_entries = Map::new();
    for group in groups {
        if let Some(id) = group.id {
            group_entries.insert(id.to_string(), serde_json::to_value(group)?);
        }
    }

    let mut question_entries = Map::new();
    for question in questions {
        let id = match question.id {
            Some(id) => id,
            None => continue,
        };
        let mut question = question.clone();
        if options.alternate_format {
            answers_to_options(&mut question);
        }
        question_entries.insert(id.to_string(), serde_json::to_value(&question)?);
    }

    if options.strip {
        retain_fields(&mut quiz_value, &QUIZ_WRITABLE_FIELDS);
        for entry in group_entries.values_mut() {
            retain_fields(entry, &GROUP_WRITABLE_FIELDS);
        }
        for entry in question_entries.values_mut() {
            retain_fields(entry, &QUESTION_WRITABLE_FIELDS);
        }
    }

    Ok(SyncDocument {
        quiz: Some(quiz_value),
        order: Some(order),
        groups: Some(group_entries),
        questions: Some(question_entries),
    })
}
