//! Gallery catalog
//!
//! Lists every image that has a sound, with a category guessed from keywords
//! in its name, and filters the list for the collection view.

use serde::Deserialize;
use sqz_common::assets::base_name;
use sqz_common::config::AssetConfig;
use sqz_common::model::Category;
use sqz_common::CollectionItem;
use std::collections::HashSet;

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Animals,
        &["cat", "gato", "chimpa", "elefant", "girafa", "orangutini"],
    ),
    (Category::FoodAndDrink, &["cappuccin", "frigo", "frutti"]),
    (Category::Space, &["saturn", "celestre"]),
    (Category::Onomatopoeia, &["brrr", "tata", "ding", "trala"]),
];

/// First category whose keyword appears in `name` (case-insensitive)
pub fn categorize(name: &str) -> Category {
    let lower = name.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

/// One item per image with a same-named sound, in image order
pub fn build_collection(images: &[String], sounds: &[String], assets: &AssetConfig) -> Vec<CollectionItem> {
    let sound_bases: HashSet<&str> = sounds.iter().map(|s| base_name(s)).collect();

    images
        .iter()
        .filter(|image| sound_bases.contains(base_name(image)))
        .enumerate()
        .map(|(index, image)| {
            let word = base_name(image);
            let sound = sounds
                .iter()
                .find(|s| base_name(s) == word)
                .cloned()
                .unwrap_or_else(|| format!("{}.{}", word, assets.sound_extension));
            CollectionItem {
                id: format!("{:03}", index + 1),
                display_text: word.to_string(),
                image_ref: assets.image_source(image),
                audio_ref: assets.sound_source(&sound),
                category: categorize(word),
            }
        })
        .collect()
}

/// Collection view filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionQuery {
    /// Case-insensitive substring of the display text
    #[serde(default)]
    pub search: Option<String>,
    /// Category name; "all" or absent means no filter
    #[serde(default)]
    pub category: Option<String>,
}

impl CollectionQuery {
    pub fn matches(&self, item: &CollectionItem) -> bool {
        let search_ok = match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => item
                .display_text
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        };
        let category_ok = match self.category.as_deref() {
            None | Some("") | Some("all") => true,
            Some(name) => Category::parse(name) == Some(item.category),
        };
        search_ok && category_ok
    }

    pub fn apply(&self, items: Vec<CollectionItem>) -> Vec<CollectionItem> {
        items.into_iter().filter(|item| self.matches(item)).collect()
    }
}

/// Distinct categories in first-seen order
pub fn categories(items: &[CollectionItem]) -> Vec<Category> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item.category) {
            seen.push(item.category);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn collection() -> Vec<CollectionItem> {
        build_collection(
            &names(&["Chimpanzini.webp", "ding_dong.webp", "lonely.webp", "Saturnita.webp"]),
            &names(&["Chimpanzini.mp3", "ding_dong.mp3", "Saturnita.mp3"]),
            &AssetConfig::default(),
        )
    }

    #[test]
    fn test_categorize() {
        assert_eq!(categorize("Tralalero"), Category::Onomatopoeia);
        assert_eq!(categorize("Cappuccino_Assassino"), Category::FoodAndDrink);
        assert_eq!(categorize("SATURNITA"), Category::Space);
        assert_eq!(categorize("Elefanto"), Category::Animals);
        assert_eq!(categorize("Bombardiro"), Category::Other);
    }

    #[test]
    fn test_build_collection_pairs_and_numbers() {
        let items = collection();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].id, "001");
        assert_eq!(items[0].display_text, "Chimpanzini");
        assert_eq!(items[0].image_ref, "/img/Chimpanzini.webp");
        assert_eq!(items[0].audio_ref, "/sound/Chimpanzini.mp3");
        assert_eq!(items[0].category, Category::Animals);
        assert_eq!(items[2].id, "003");
        assert_eq!(items[2].display_text, "Saturnita");
    }

    #[test]
    fn test_query_search_and_category() {
        let query = CollectionQuery {
            search: Some("DING".into()),
            category: None,
        };
        let found = query.apply(collection());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_text, "ding_dong");

        let query = CollectionQuery {
            search: None,
            category: Some("space".into()),
        };
        assert_eq!(query.apply(collection()).len(), 1);

        let query = CollectionQuery {
            search: Some("  ".into()),
            category: Some("all".into()),
        };
        assert_eq!(query.apply(collection()).len(), 3);
    }

    #[test]
    fn test_categories_first_seen_order() {
        let items = collection();
        assert_eq!(
            categories(&items),
            vec![Category::Animals, Category::Onomatopoeia, Category::Space]
        );
    }
}
