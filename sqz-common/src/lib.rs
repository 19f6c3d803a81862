//! # SQZ Common Library
//!
//! Shared code for the SQZ sound quiz crates:
//! - Event types (SqzEvent enum) and the EventBus
//! - Question and collection data model
//! - Configuration loading
//! - Asset listing helpers
//! - Time utilities

pub mod assets;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use model::{CollectionItem, QuestionRecord, QuizPhase};
