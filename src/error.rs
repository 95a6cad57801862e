use serde::Serialize;
use thiserror::Error;

/// Fatal import failures. Either one rejects the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("document contains no topic")]
    EmptyDocument,

    #[error("'{title}' (line {line}) has no answer section")]
    MissingAnswer { title: String, line: usize },
}

/// Non-fatal findings collected while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    #[error("line {line}: malformed resource '{text}'")]
    MalformedResource { line: usize, text: String },

    #[error("concept '{concept}' relates to unknown concept '{target}'")]
    DanglingRelatedConcept { concept: String, target: String },

    #[error("line {line}: concept '{concept}' jumps from level {expected} to {found}")]
    LevelGap {
        concept: String,
        line: usize,
        expected: u32,
        found: u32,
    },

    #[error("line {line}: concept '{concept}' has level {found} out of order, skipped")]
    LevelOutOfOrder {
        concept: String,
        line: usize,
        found: u32,
    },

    #[error("line {line}: unrecognised {key} value '{value}', using default")]
    UnknownMetadata {
        line: usize,
        key: String,
        value: String,
    },

    #[error("line {line}: {what} outside of the section it belongs to")]
    StrayContent { line: usize, what: String },

    #[error("line {line}: '{header}' belongs to the other import format, kept as text")]
    ForeignHeader { line: usize, header: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("confidence must be between 1 and 5, got {0}")]
    InvalidConfidence(i64),
}

/// A soft reference that did not resolve. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LookupWarning {
    #[error("concept '{concept}' relates to '{target}', which does not exist")]
    UnknownRelatedConcept { concept: String, target: String },

    #[error("question {question_id} points at missing parent {parent_id}")]
    UnknownParent { question_id: i64, parent_id: i64 },
}

/// Top-level error for the command line front end.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("import failed: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidInput(String),
}

pub type AppResult<T> = Result<T, AppError>;
