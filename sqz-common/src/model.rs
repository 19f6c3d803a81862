//! Quiz data model shared between the audio and quiz crates
//!
//! Asset references are stored as bare file names (`"cat.mp3"`, `"cat.webp"`);
//! the quiz crate joins them with the configured asset directories when it
//! needs a playable or displayable path.

use serde::{Deserialize, Serialize};

/// One quiz question: a sound, the matching image and the wrong options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    /// Sound asset file name
    pub sound_ref: String,
    /// Image asset file name of the right answer; unique per question
    pub correct_answer: String,
    /// Wrong image options (never contains `correct_answer`, no duplicates)
    pub distractors: Vec<String>,
    /// Display-only prompt
    pub prompt_text: String,
}

impl QuestionRecord {
    /// All selectable options, correct answer first.
    pub fn options(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.correct_answer.as_str()).chain(self.distractors.iter().map(String::as_str))
    }

    /// Whether `choice` is one of this question's options.
    pub fn offers(&self, choice: &str) -> bool {
        self.options().any(|option| option == choice)
    }

    /// Whether `choice` is the right answer.
    pub fn is_correct(&self, choice: &str) -> bool {
        self.correct_answer == choice
    }
}

/// Gallery category derived from an asset's base name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Animals,
    FoodAndDrink,
    Space,
    Onomatopoeia,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Animals => "animals",
            Category::FoodAndDrink => "food_and_drink",
            Category::Space => "space",
            Category::Onomatopoeia => "onomatopoeia",
            Category::Other => "other",
        }
    }

    /// Parse a category name; `None` for unknown names (including "all").
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "animals" => Some(Category::Animals),
            "food_and_drink" => Some(Category::FoodAndDrink),
            "space" => Some(Category::Space),
            "onomatopoeia" => Some(Category::Onomatopoeia),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gallery entry pairing an image with its sound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    /// 1-based position padded to three digits ("001")
    pub id: String,
    pub display_text: String,
    pub image_ref: String,
    pub audio_ref: String,
    pub category: Category,
}

/// Quiz game phase
///
/// `Error` is reported when the question bank could not be loaded; it is only
/// left through an explicit restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizPhase {
    Ready,
    Playing,
    Finished,
    Error,
}

impl std::fmt::Display for QuizPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuizPhase::Ready => write!(f, "ready"),
            QuizPhase::Playing => write!(f, "playing"),
            QuizPhase::Finished => write!(f, "finished"),
            QuizPhase::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> QuestionRecord {
        QuestionRecord {
            sound_ref: "s1.mp3".to_string(),
            correct_answer: "i1.webp".to_string(),
            distractors: vec!["i2.webp".to_string(), "i3.webp".to_string()],
            prompt_text: "Which one?".to_string(),
        }
    }

    #[test]
    fn test_options_start_with_correct_answer() {
        let q = record();
        let options: Vec<&str> = q.options().collect();
        assert_eq!(options, vec!["i1.webp", "i2.webp", "i3.webp"]);
    }

    #[test]
    fn test_offers_and_is_correct() {
        let q = record();
        assert!(q.offers("i3.webp"));
        assert!(!q.offers("i9.webp"));
        assert!(q.is_correct("i1.webp"));
        assert!(!q.is_correct("i2.webp"));
    }

    #[test]
    fn test_question_record_serializes_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["soundRef"], "s1.mp3");
        assert_eq!(json["correctAnswer"], "i1.webp");
        assert_eq!(json["promptText"], "Which one?");
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("Animals"), Some(Category::Animals));
        assert_eq!(Category::parse("food_and_drink"), Some(Category::FoodAndDrink));
        assert_eq!(Category::parse("all"), None);
    }

    #[test]
    fn test_quiz_phase_display() {
        assert_eq!(QuizPhase::Ready.to_string(), "ready");
        assert_eq!(QuizPhase::Error.to_string(), "error");
        assert_eq!(serde_json::to_string(&QuizPhase::Finished).unwrap(), "\"finished\"");
    }
}
