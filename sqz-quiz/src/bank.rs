//! Question bank construction
//!
//! Sounds are paired with the image sharing their base name; unpaired sounds
//! are dropped silently since partial catalogs are normal while assets are
//! being curated. Distractors are drawn without replacement from every other
//! image.

use crate::error::{QuizError, Result};
use crate::source::QuestionSource;
use rand::seq::SliceRandom;
use rand::Rng;
use sqz_common::assets::base_name;
use sqz_common::config::QuizConfig;
use sqz_common::QuestionRecord;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Parameters for building a bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankOptions {
    /// Wrong options per question
    pub distractor_count: usize,
    /// Session length cap; `None` keeps every question
    pub max_questions: Option<usize>,
    pub prompt_text: String,
}

impl From<&QuizConfig> for BankOptions {
    fn from(config: &QuizConfig) -> Self {
        Self {
            distractor_count: config.distractor_count,
            max_questions: Some(config.max_questions),
            prompt_text: config.prompt_text.clone(),
        }
    }
}

impl Default for BankOptions {
    fn default() -> Self {
        Self::from(&QuizConfig::default())
    }
}

/// Build shuffled questions from sound and image file names.
///
/// When fewer other images exist than `distractor_count`, every remaining
/// image is used.
pub fn build_questions<R: Rng + ?Sized>(
    sounds: &[String],
    images: &[String],
    options: &BankOptions,
    rng: &mut R,
) -> Vec<QuestionRecord> {
    let mut seen = HashSet::new();
    let images: Vec<&String> = images.iter().filter(|i| seen.insert(i.as_str())).collect();

    let by_base: HashMap<&str, &String> = images
        .iter()
        .map(|image| (base_name(image), *image))
        .collect();

    let mut used = HashSet::new();
    let mut questions: Vec<QuestionRecord> = sounds
        .iter()
        .filter_map(|sound| {
            let correct = by_base.get(base_name(sound))?;
            if !used.insert(correct.as_str()) {
                return None;
            }
            let others: Vec<&String> = images.iter().copied().filter(|i| i != correct).collect();
            let distractors = others
                .choose_multiple(rng, options.distractor_count)
                .map(|i| (*i).clone())
                .collect();
            Some(QuestionRecord {
                sound_ref: sound.clone(),
                correct_answer: (*correct).clone(),
                distractors,
                prompt_text: options.prompt_text.clone(),
            })
        })
        .collect();

    let dropped = sounds.len() - questions.len();
    if dropped > 0 {
        debug!("Dropped {} sounds without a matching image", dropped);
    }

    questions.shuffle(rng);
    if let Some(max) = options.max_questions {
        questions.truncate(max);
    }
    questions
}

/// Options of `record` in shuffled display order
pub fn answer_choices<R: Rng + ?Sized>(record: &QuestionRecord, rng: &mut R) -> Vec<String> {
    let mut choices: Vec<String> = record.options().map(str::to_string).collect();
    choices.shuffle(rng);
    choices
}

/// List both asset kinds from `source` and build a fresh bank
pub async fn load_bank(source: &dyn QuestionSource, options: &BankOptions) -> Result<Vec<QuestionRecord>> {
    let sounds = source.list_sounds().await?;
    let images = source.list_images().await?;

    let questions = build_questions(&sounds, &images, options, &mut rand::thread_rng());
    if questions.is_empty() {
        return Err(QuizError::EmptyBank);
    }
    info!(
        "Loaded {} questions from {} ({} sounds, {} images)",
        questions.len(),
        source.describe(),
        sounds.len(),
        images.len()
    );
    Ok(questions)
}
