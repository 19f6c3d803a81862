//! Quiz session state machine
//!
//! Pure state: no audio, no timers. Every time-dependent call takes the
//! current instant so the controller (and tests) decide what "now" is.
//!
//! Phases: `Ready` → `Playing` → `Finished`, back to `Ready` only through
//! [`QuizSession::restart`]. `Error` is entered when the bank fails to load.
//!
//! Timing: the current question's clock runs from the moment it is shown
//! until an answer is selected. Advancing adds the frozen value to the
//! session total, so time between questions never counts.

use crate::error::{QuizError, Result};
use serde::Serialize;
use sqz_common::time::floor_to_tick;
use sqz_common::{QuestionRecord, QuizPhase};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Result of selecting an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub index: usize,
    pub choice: String,
    pub correct: bool,
    pub correct_answer: String,
}

/// Result of advancing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the question at this index
    Next(usize),
    /// Advanced past the last question
    Finished,
}

/// Final tally
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub correct: u32,
    pub incorrect: u32,
    pub total: usize,
    pub total_elapsed_ms: u64,
    /// Percentage with one decimal
    pub accuracy: f64,
}

/// One quiz run
#[derive(Debug, Clone)]
pub struct QuizSession {
    id: Uuid,
    phase: QuizPhase,
    questions: Vec<QuestionRecord>,
    current_index: usize,
    /// Current question's options in display order
    choices: Vec<String>,
    selected: Option<String>,
    correct: u32,
    incorrect: u32,
    question_started: Option<Instant>,
    /// Set when the answer is selected
    question_frozen: Option<Duration>,
    total_elapsed_ms: u64,
    tick_ms: u64,
    error: Option<String>,
}

impl QuizSession {
    /// New session in `Ready`; elapsed values are floored to `tick_ms`
    pub fn new(tick_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: QuizPhase::Ready,
            questions: Vec::new(),
            current_index: 0,
            choices: Vec::new(),
            selected: None,
            correct: 0,
            incorrect: 0,
            question_started: None,
            question_frozen: None,
            total_elapsed_ms: 0,
            tick_ms,
            error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<&QuestionRecord> {
        if self.phase != QuizPhase::Playing {
            return None;
        }
        self.questions.get(self.current_index)
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn selected_answer(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn correct_count(&self) -> u32 {
        self.correct
    }

    pub fn incorrect_count(&self) -> u32 {
        self.incorrect
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether `index` is the question on screen right now
    pub fn is_current(&self, index: usize) -> bool {
        self.phase == QuizPhase::Playing && self.current_index == index
    }

    /// `Ready` → `Playing` with a fresh bank.
    ///
    /// `choices` are the first question's options in display order.
    pub fn start(&mut self, questions: Vec<QuestionRecord>, choices: Vec<String>, now: Instant) -> Result<()> {
        if self.phase != QuizPhase::Ready {
            return Err(QuizError::InvalidPhase(self.phase));
        }
        if questions.is_empty() {
            return Err(QuizError::EmptyBank);
        }
        *self = Self::new(self.tick_ms);
        self.questions = questions;
        self.choices = choices;
        self.phase = QuizPhase::Playing;
        self.question_started = Some(now);
        Ok(())
    }

    /// Record the answer for the current question; does not advance
    pub fn select_answer(&mut self, choice: &str, now: Instant) -> Result<AnswerOutcome> {
        if self.phase != QuizPhase::Playing {
            return Err(QuizError::InvalidPhase(self.phase));
        }
        if self.selected.is_some() {
            return Err(QuizError::AlreadyAnswered);
        }
        let question = self
            .questions
            .get(self.current_index)
            .ok_or(QuizError::NoCurrentQuestion)?;
        if !question.offers(choice) {
            return Err(QuizError::InvalidChoice(choice.to_string()));
        }

        let correct = question.is_correct(choice);
        let correct_answer = question.correct_answer.clone();
        if correct {
            self.correct += 1;
        } else {
            self.incorrect += 1;
        }
        self.question_frozen = Some(self.running(now));
        self.selected = Some(choice.to_string());

        Ok(AnswerOutcome {
            index: self.current_index,
            choice: choice.to_string(),
            correct,
            correct_answer,
        })
    }

    /// Bank the current question's time and move on.
    ///
    /// `next_choices` are the options of the following question (ignored when
    /// the session finishes). Allowed without a selected answer.
    pub fn advance(&mut self, next_choices: Vec<String>, now: Instant) -> Result<Advance> {
        if self.phase != QuizPhase::Playing {
            return Err(QuizError::InvalidPhase(self.phase));
        }
        self.total_elapsed_ms += self.question_elapsed_ms(now);
        self.question_frozen = None;
        self.selected = None;

        if self.current_index + 1 >= self.questions.len() {
            self.phase = QuizPhase::Finished;
            self.question_started = None;
            self.choices.clear();
            return Ok(Advance::Finished);
        }

        self.current_index += 1;
        self.choices = next_choices;
        self.question_started = Some(now);
        Ok(Advance::Next(self.current_index))
    }

    /// Question after the current one, if any
    pub fn next_question(&self) -> Option<&QuestionRecord> {
        self.questions.get(self.current_index + 1)
    }

    /// Enter `Error` after a failed bank load
    pub fn fail(&mut self, message: impl Into<String>) {
        *self = Self::new(self.tick_ms);
        self.phase = QuizPhase::Error;
        self.error = Some(message.into());
    }

    /// Back to `Ready` with every counter cleared
    pub fn restart(&mut self) {
        *self = Self::new(self.tick_ms);
    }

    fn running(&self, now: Instant) -> Duration {
        self.question_started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }

    /// Elapsed time on the current question
    pub fn question_elapsed_ms(&self, now: Instant) -> u64 {
        if self.phase != QuizPhase::Playing {
            return 0;
        }
        let elapsed = self.question_frozen.unwrap_or_else(|| self.running(now));
        floor_to_tick(elapsed, self.tick_ms)
    }

    /// Sum of the time spent on finished questions
    pub fn total_elapsed_ms(&self) -> u64 {
        self.total_elapsed_ms
    }

    /// Tally; accuracy is only meaningful once finished
    pub fn score(&self) -> Score {
        let total = self.questions.len();
        let accuracy = if total == 0 {
            0.0
        } else {
            (self.correct as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Score {
            correct: self.correct,
            incorrect: self.incorrect,
            total,
            total_elapsed_ms: self.total_elapsed_ms,
            accuracy,
        }
    }
}
