//! # SQZ Quiz
//!
//! Sound quiz service: hear a sound, pick the matching picture.
//!
//! - [`bank`]: question bank construction from asset lists
//! - [`source`]: where asset lists come from (directories, HTTP, fixed lists)
//! - [`session`]: the quiz state machine
//! - [`controller`]: drives the session and the audio coordinator
//! - [`catalog`]: gallery listing and filtering
//! - [`api`]: HTTP/SSE control surface

pub mod api;
pub mod bank;
pub mod catalog;
pub mod controller;
pub mod error;
pub mod session;
pub mod source;

pub use controller::{ControllerConfig, QuizController, QuizSnapshot};
pub use error::{QuizError, Result};
pub use source::{DirectorySource, HttpSource, QuestionSource, StaticSource};
