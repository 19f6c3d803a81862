//! Error types for the quiz service

use sqz_common::QuizPhase;
use thiserror::Error;

/// Result type for quiz operations
pub type Result<T> = std::result::Result<T, QuizError>;

/// Quiz error types
///
/// Audio failures never appear here: the controller logs them and keeps the
/// game playable.
#[derive(Error, Debug)]
pub enum QuizError {
    /// Asset listing failed; the quiz cannot start
    #[error("Question bank load failed: {0}")]
    QuestionBankLoad(String),

    /// Listing worked but no sound had a matching image
    #[error("Question bank is empty")]
    EmptyBank,

    /// Operation not allowed in the current phase
    #[error("Not allowed while quiz is {0}")]
    InvalidPhase(QuizPhase),

    /// An answer was already selected for the current question
    #[error("Answer already selected")]
    AlreadyAnswered,

    #[error("No current question")]
    NoCurrentQuestion,

    /// Choice is not one of the current question's options
    #[error("Invalid choice: {0}")]
    InvalidChoice(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for QuizError {
    fn from(err: reqwest::Error) -> Self {
        QuizError::Http(err.to_string())
    }
}

impl QuizError {
    /// Whether the error prevents a question bank from being built
    pub fn is_bank_error(&self) -> bool {
        matches!(
            self,
            QuizError::QuestionBankLoad(_) | QuizError::EmptyBank | QuizError::Http(_) | QuizError::Io(_)
        )
    }
}
