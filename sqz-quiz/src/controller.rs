//! Quiz progression controller
//!
//! Drives a [`QuizSession`] and the audio coordinator:
//! - start: load a fresh bank, stop menu BGM, play the first question's sound
//! - answer: score, then auto-advance after the reveal delay
//! - advance: next question's sound, or finish (stop effects, resume menu BGM)
//! - restart: clear everything, resume menu BGM
//!
//! Audio failures are logged and never change the quiz state. Background
//! work (question sound retries, the reveal timer, the elapsed ticker) is
//! owned by the controller and aborted when its question or session ends.

use crate::bank::{answer_choices, load_bank, BankOptions};
use crate::error::{QuizError, Result};
use crate::session::{Advance, AnswerOutcome, QuizSession};
use crate::source::QuestionSource;
use serde::Serialize;
use sqz_ap::{AudioCoordinator, AudioError};
use sqz_common::config::{AssetConfig, AudioConfig, QuizConfig};
use sqz_common::events::{EventBus, SqzEvent};
use sqz_common::QuizPhase;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Period of `ElapsedTick` events; values inside are floored to the tick resolution
const ELAPSED_EVENT_INTERVAL: Duration = Duration::from_millis(100);

/// Controller tuning, assembled from the TOML sections
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub bank: BankOptions,
    pub tick_ms: u64,
    pub reveal_delay: Duration,
    pub auto_advance: bool,
    /// Offsets from question start for safety-net replays
    pub retry_schedule: Vec<Duration>,
    pub effect_volume: f32,
    pub assets: AssetConfig,
}

impl ControllerConfig {
    pub fn new(quiz: &QuizConfig, audio: &AudioConfig, assets: &AssetConfig) -> Self {
        Self {
            bank: BankOptions::from(quiz),
            tick_ms: quiz.tick_interval().as_millis() as u64,
            reveal_delay: quiz.reveal_delay(),
            auto_advance: quiz.auto_advance,
            retry_schedule: quiz.retry_schedule(),
            effect_volume: audio.effect_volume,
            assets: assets.clone(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(&QuizConfig::default(), &AudioConfig::default(), &AssetConfig::default())
    }
}

/// One answer option as shown to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Value to send back when answering
    pub name: String,
    pub image_ref: String,
}

/// Serializable view of the quiz for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    pub session_id: Uuid,
    pub phase: QuizPhase,
    pub current_index: usize,
    pub total_questions: usize,
    pub prompt_text: Option<String>,
    pub sound_ref: Option<String>,
    pub choices: Vec<Choice>,
    pub selected_answer: Option<String>,
    /// Revealed once an answer is selected
    pub correct_answer: Option<String>,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub question_elapsed_ms: u64,
    pub total_elapsed_ms: u64,
    /// Percentage, present once finished
    pub accuracy: Option<f64>,
    pub error: Option<String>,
}

#[derive(Default)]
struct Tasks {
    /// Sound start and replays for the current question
    question: Vec<JoinHandle<()>>,
    /// Pending auto-advance
    reveal: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_question(&mut self) {
        for task in self.question.drain(..) {
            task.abort();
        }
    }

    fn abort_reveal(&mut self) {
        if let Some(task) = self.reveal.take() {
            task.abort();
        }
    }

    fn abort_all(&mut self) {
        self.abort_question();
        self.abort_reveal();
        if let Some(task) = self.ticker.take() {
            task.abort();
        }
    }
}

struct Inner {
    session: Mutex<QuizSession>,
    tasks: Mutex<Tasks>,
    coordinator: AudioCoordinator,
    source: Arc<dyn QuestionSource>,
    events: Arc<EventBus>,
    config: ControllerConfig,
}

/// Quiz progression controller; cheap to clone
#[derive(Clone)]
pub struct QuizController {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QuizController {
    pub fn new(
        coordinator: AudioCoordinator,
        source: Arc<dyn QuestionSource>,
        events: Arc<EventBus>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(QuizSession::new(config.tick_ms)),
                tasks: Mutex::new(Tasks::default()),
                coordinator,
                source,
                events,
                config,
            }),
        }
    }

    pub fn coordinator(&self) -> &AudioCoordinator {
        &self.inner.coordinator
    }

    fn session(&self) -> MutexGuard<'_, QuizSession> {
        lock(&self.inner.session)
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        lock(&self.inner.tasks)
    }

    fn emit(&self, event: SqzEvent) {
        self.inner.events.emit_lossy(event);
    }

    fn emit_phase(&self, session_id: Uuid, old_phase: QuizPhase, new_phase: QuizPhase) {
        info!("Quiz phase: {} -> {}", old_phase, new_phase);
        self.emit(SqzEvent::QuizPhaseChanged {
            session_id,
            old_phase,
            new_phase,
            timestamp: chrono::Utc::now(),
        });
    }

    fn is_current(&self, session_id: Uuid, index: usize) -> bool {
        let session = self.session();
        session.id() == session_id && session.is_current(index)
    }

    // ----------------------------------------------------------------------
    // Transitions
    // ----------------------------------------------------------------------

    /// `Ready` → `Playing` with a freshly loaded and shuffled bank.
    ///
    /// A failed load moves the session to `Error` and returns the load error.
    pub async fn start(&self) -> Result<QuizSnapshot> {
        let phase = self.session().phase();
        if phase != QuizPhase::Ready {
            return Err(QuizError::InvalidPhase(phase));
        }

        let questions = match load_bank(self.inner.source.as_ref(), &self.inner.config.bank).await {
            Ok(questions) => questions,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        let first_choices = questions
            .first()
            .map(|q| answer_choices(q, &mut rand::thread_rng()))
            .unwrap_or_default();

        let (session_id, total, first_sound) = {
            let mut session = self.session();
            session.start(questions, first_choices, Instant::now())?;
            (
                session.id(),
                session.total_questions(),
                session.current_question().map(|q| q.sound_ref.clone()),
            )
        };

        self.tasks().abort_all();
        self.emit_phase(session_id, QuizPhase::Ready, QuizPhase::Playing);
        self.emit(SqzEvent::QuestionAdvanced {
            session_id,
            index: 0,
            total,
            timestamp: chrono::Utc::now(),
        });

        self.inner.coordinator.stop_bgm();
        self.spawn_ticker(session_id);
        if let Some(sound) = first_sound {
            self.spawn_question_sound(session_id, 0, &sound);
        }
        Ok(self.snapshot())
    }

    fn fail(&self, error: &QuizError) {
        let message = error.to_string();
        let session_id = {
            let mut session = self.session();
            if session.phase() != QuizPhase::Ready {
                return;
            }
            session.fail(message.clone());
            session.id()
        };
        warn!("Quiz cannot start: {}", message);
        self.emit(SqzEvent::QuestionBankLoadFailed {
            message,
            timestamp: chrono::Utc::now(),
        });
        self.emit_phase(session_id, QuizPhase::Ready, QuizPhase::Error);
    }

    /// Record the player's choice for the current question
    pub fn select_answer(&self, choice: &str) -> Result<AnswerOutcome> {
        let (outcome, session_id) = {
            let mut session = self.session();
            let outcome = session.select_answer(choice, Instant::now())?;
            (outcome, session.id())
        };
        debug!(
            "Question {} answered {} ({})",
            outcome.index + 1,
            outcome.choice,
            if outcome.correct { "correct" } else { "incorrect" }
        );
        self.emit(SqzEvent::AnswerSelected {
            session_id,
            index: outcome.index,
            choice: outcome.choice.clone(),
            correct: outcome.correct,
            timestamp: chrono::Utc::now(),
        });

        if self.inner.config.auto_advance {
            let this = self.clone();
            let index = outcome.index;
            let delay = self.inner.config.reveal_delay;
            let task = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = this.advance_from(Some((session_id, index))).await {
                    debug!("Auto-advance skipped: {}", e);
                }
            });
            self.tasks().reveal = Some(task);
        }
        Ok(outcome)
    }

    /// Move to the next question, or finish after the last one.
    ///
    /// Allowed whether or not the current question was answered.
    pub async fn advance(&self) -> Result<QuizSnapshot> {
        self.advance_from(None).await?;
        Ok(self.snapshot())
    }

    /// Advance; with `expected`, only if that answered question is still current
    async fn advance_from(&self, expected: Option<(Uuid, usize)>) -> Result<()> {
        let step = {
            let mut session = self.session();
            if let Some((session_id, index)) = expected {
                let answered = session.selected_answer().is_some();
                if session.id() != session_id || !session.is_current(index) || !answered {
                    return Ok(());
                }
            }
            let next_choices = session
                .next_question()
                .map(|q| answer_choices(q, &mut rand::thread_rng()))
                .unwrap_or_default();
            let advance = session.advance(next_choices, Instant::now())?;
            (
                advance,
                session.id(),
                session.total_questions(),
                session.current_question().map(|q| q.sound_ref.clone()),
                session.score(),
            )
        };
        let (advance, session_id, total, sound, score) = step;

        {
            let mut tasks = self.tasks();
            tasks.abort_question();
            if expected.is_none() {
                tasks.abort_reveal();
            } else {
                // This call is the reveal task; just forget its handle
                tasks.reveal = None;
            }
        }

        match advance {
            Advance::Next(index) => {
                self.emit(SqzEvent::QuestionAdvanced {
                    session_id,
                    index,
                    total,
                    timestamp: chrono::Utc::now(),
                });
                if let Some(sound) = sound {
                    self.spawn_question_sound(session_id, index, &sound);
                }
            }
            Advance::Finished => {
                let ticker = self.tasks().ticker.take();
                if let Some(ticker) = ticker {
                    ticker.abort();
                }
                info!(
                    "Quiz finished: {}/{} correct ({}%) in {} s",
                    score.correct,
                    score.total,
                    score.accuracy,
                    sqz_common::time::format_seconds(score.total_elapsed_ms)
                );
                self.emit_phase(session_id, QuizPhase::Playing, QuizPhase::Finished);
                self.emit(SqzEvent::GameFinished {
                    session_id,
                    correct: score.correct,
                    incorrect: score.incorrect,
                    total: score.total,
                    total_elapsed_ms: score.total_elapsed_ms,
                    timestamp: chrono::Utc::now(),
                });
                self.inner.coordinator.stop_all().await;
                self.inner.coordinator.resume_bgm().await;
            }
        }
        Ok(())
    }

    /// Clear the session from any phase, stop all effects, resume menu BGM
    pub async fn restart(&self) -> QuizSnapshot {
        self.tasks().abort_all();
        let (old_phase, session_id) = {
            let mut session = self.session();
            let old_phase = session.phase();
            session.restart();
            (old_phase, session.id())
        };

        self.inner.coordinator.stop_all().await;
        self.emit_phase(session_id, old_phase, QuizPhase::Ready);
        self.inner.coordinator.resume_bgm().await;
        self.snapshot()
    }

    /// Play the current question's sound again
    pub async fn replay_sound(&self) -> Result<()> {
        let sound = {
            let session = self.session();
            match session.current_question() {
                Some(question) => question.sound_ref.clone(),
                None => return Err(QuizError::InvalidPhase(session.phase())),
            }
        };
        let source = self.inner.config.assets.sound_source(&sound);

        self.inner.coordinator.stop_all().await;
        if let Err(e) = self
            .inner
            .coordinator
            .play_sound_effect(&source, self.inner.config.effect_volume)
            .await
        {
            warn!("Replay of {} failed: {}", source, e);
        }
        Ok(())
    }

    /// Menu music for `source`.
    ///
    /// The track is recorded right away so finishing or restarting a quiz
    /// resumes it. It starts once the player has interacted, unless a quiz is
    /// running by then.
    pub fn spawn_menu_bgm(&self, source: &str, volume: f32) {
        let coordinator = self.inner.coordinator.clone();
        coordinator.remember_bgm(source, volume, true);

        let this = self.clone();
        tokio::spawn(async move {
            coordinator.gate().wait_granted().await;
            if this.phase() == QuizPhase::Playing {
                debug!("Menu BGM held back until the quiz ends");
                return;
            }
            coordinator.resume_bgm().await;
        });
    }

    /// Abort every background task
    pub fn shutdown(&self) {
        self.tasks().abort_all();
        debug!("Quiz controller tasks stopped");
    }

    // ----------------------------------------------------------------------
    // Background work
    // ----------------------------------------------------------------------

    /// Start the question's sound with a gate-aware retry and timed safety-net replays
    fn spawn_question_sound(&self, session_id: Uuid, index: usize, sound: &str) {
        let source = self.inner.config.assets.sound_source(sound);
        let started = Arc::new(AtomicBool::new(false));
        let settle = self.inner.coordinator.config().settle_delay;
        self.inner.coordinator.stop_bgm();

        let this = self.clone();
        let (first_source, first_started) = (source.clone(), Arc::clone(&started));
        let primary = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let result = this
                .attempt_sound(session_id, index, &first_source, &first_started)
                .await;
            if result == Err(AudioError::AutoplayBlocked) {
                debug!("Question {} sound waiting for user interaction", index + 1);
                this.inner.coordinator.gate().wait_granted().await;
                let _ = this
                    .attempt_sound(session_id, index, &first_source, &first_started)
                    .await;
            }
        });

        let this = self.clone();
        let schedule = self.inner.config.retry_schedule.clone();
        let retries = tokio::spawn(async move {
            let base = Instant::now();
            for offset in schedule {
                tokio::time::sleep_until(base + offset).await;
                if started.load(Ordering::SeqCst) {
                    break;
                }
                debug!("Retrying question {} sound", index + 1);
                let _ = this.attempt_sound(session_id, index, &source, &started).await;
            }
        });

        let mut tasks = self.tasks();
        tasks.question.push(primary);
        tasks.question.push(retries);
    }

    /// One playback attempt; no-op once started or when the question moved on
    async fn attempt_sound(
        &self,
        session_id: Uuid,
        index: usize,
        source: &str,
        started: &AtomicBool,
    ) -> std::result::Result<(), AudioError> {
        if started.load(Ordering::SeqCst) || !self.is_current(session_id, index) {
            return Ok(());
        }
        let coordinator = &self.inner.coordinator;
        match coordinator
            .play_sound_effect(source, self.inner.config.effect_volume)
            .await
        {
            Ok(()) => {
                // A repeat request returns before the first one is heard
                if coordinator.is_audible(source) {
                    started.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
            Err(AudioError::AutoplayBlocked) => {
                debug!("Question {} sound blocked: no user interaction yet", index + 1);
                Err(AudioError::AutoplayBlocked)
            }
            Err(e) => {
                warn!("Question {} sound {} failed: {}", index + 1, source, e);
                Err(e)
            }
        }
    }

    fn spawn_ticker(&self, session_id: Uuid) {
        let this = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ELAPSED_EVENT_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let elapsed = {
                    let session = this.session();
                    if session.id() != session_id || session.phase() != QuizPhase::Playing {
                        None
                    } else {
                        let now = Instant::now();
                        Some((session.question_elapsed_ms(now), session.total_elapsed_ms()))
                    }
                };
                let Some((question_elapsed_ms, total_elapsed_ms)) = elapsed else {
                    break;
                };
                this.emit(SqzEvent::ElapsedTick {
                    session_id,
                    question_elapsed_ms,
                    total_elapsed_ms,
                });
            }
        });
        if let Some(previous) = self.tasks().ticker.replace(task) {
            previous.abort();
        }
    }

    // ----------------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------------

    pub fn phase(&self) -> QuizPhase {
        self.session().phase()
    }

    pub fn snapshot(&self) -> QuizSnapshot {
        let session = self.session();
        let assets = &self.inner.config.assets;
        let now = Instant::now();
        let question = session.current_question();
        let answered = session.selected_answer().is_some();

        QuizSnapshot {
            session_id: session.id(),
            phase: session.phase(),
            current_index: session.current_index(),
            total_questions: session.total_questions(),
            prompt_text: question.map(|q| q.prompt_text.clone()),
            sound_ref: question.map(|q| assets.sound_source(&q.sound_ref)),
            choices: session
                .choices()
                .iter()
                .map(|name| Choice {
                    name: name.clone(),
                    image_ref: assets.image_source(name),
                })
                .collect(),
            selected_answer: session.selected_answer().map(str::to_string),
            correct_answer: question
                .filter(|_| answered)
                .map(|q| q.correct_answer.clone()),
            correct_count: session.correct_count(),
            incorrect_count: session.incorrect_count(),
            question_elapsed_ms: session.question_elapsed_ms(now),
            total_elapsed_ms: session.total_elapsed_ms(),
            accuracy: (session.phase() == QuizPhase::Finished).then(|| session.score().accuracy),
            error: session.error().map(str::to_string),
        }
    }
}
