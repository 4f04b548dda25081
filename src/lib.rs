//! # Canvas Quiz Synchronization Library
//!
//! This Rust library synchronizes structured quiz content — quizzes,
//! question groups, questions and answers — with the Canvas Learning
//! Management System API. It uses the `reqwest` blocking client and is
//! fully synchronous: resources are created and updated one request at a
//! time, in program order, because the Canvas API is request-per-page and
//! order-sensitive.
//!
//! ## Core Features
//!
//! - **Paginated reading:** every listing call transparently follows the
//!   `Link` header relations until the terminal page.
//! - **Generic resources:** one [`Resource`] type covers any nested Canvas
//!   object; whether a push creates or updates is decided from the presence
//!   of the resource's identifier.
//! - **Question assembly:** [`Quiz::questions`] merges grouped and
//!   ungrouped questions into a single consistent ordering, resolving each
//!   question's group once and renumbering around group slots.
//! - **Write-shape normalization:** answer fields that Canvas names
//!   differently on reads and writes are rewritten in one place before
//!   every question push.
//! - **Cloning and document sync:** [`sync::clone_quiz`] duplicates a quiz
//!   (optionally as a practice run); [`sync::apply_document`] applies an
//!   external JSON document, creating, updating, reordering and — after
//!   confirmation — deleting questions.
//! - **Grade push:** [`grading::push_quiz_grades`] posts per-question
//!   scores and comments onto quiz submission attempts.
//!
//! ## Usage
//!
//! ```no_run
//! use canvas_quiz_sync::{Canvas, CanvasCredentials};
//!
//! let credentials = CanvasCredentials::obtain().expect("no Canvas credentials");
//! let canvas = Canvas::new(credentials);
//! let course = canvas.course(12345).unwrap().expect("course not found");
//! let quiz = course.quiz(678).unwrap().expect("quiz not found");
//! let (questions, groups) = quiz.questions(None).unwrap();
//! println!("{} questions in {} groups", questions.len(), groups.len());
//! ```
//!
//! A failed request surfaces the HTTP status and response body and aborts
//! the operation; multi-step flows are not rolled back and a re-run starts
//! from the top.

pub mod canvas;
mod connection; // HTTP transport, pagination and mutation calls.
pub mod course; // Course lookup and the resources it owns.
pub mod credentials; // Storage and retrieval of Canvas API credentials.
pub mod grading; // Grade push onto quiz submission attempts.
pub mod prompt; // Interactive selection and confirmation port.
pub mod question; // Typed questions, answers and write-shape normalization.
pub mod question_group;
pub mod quiz; // Quiz operations and the question/group assembler.
pub mod resource; // Generic create-or-update wrapper for nested resources.
pub mod sync; // Quiz duplication and document-driven synchronization.

// Exports key structures for external use.
pub use canvas::Canvas;
pub use connection::{is_not_found, HttpError, HttpMethod};
pub use course::{Course, CourseInfo};
pub use credentials::CanvasCredentials;
pub use grading::{push_quiz_grades, GradeEntry};
pub use prompt::{Prompter, TerminalPrompter};
pub use question::{
    normalize_answers_for_write, Answer, Question, QuestionType,
};
pub use question_group::QuestionGroup;
pub use quiz::{OrderItem, OrderKind, Quiz, QuizKind, SubmissionInclude};
pub use resource::{Mutation, Resource, ResourceBuilder, ResourceParent, UpdatePlan};
pub use sync::{
    apply_document, build_order, clone_quiz, export_document, CloneOptions, ExportOptions,
    SyncDocument,
};
