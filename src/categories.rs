use lazy_static::lazy_static;
use std::collections::HashMap;

pub const DEFAULT_CATEGORY: &str = "general";

/// Categories in display order with their default subreddits.
pub static CATEGORIES: [(&str, &[&str]); 6] = [
    ("general", &["news", "worldnews"]),
    ("technology", &["technology", "programming", "gadgets"]),
    ("sports", &["sports", "soccer", "nba"]),
    ("entertainment", &["entertainment", "movies", "television"]),
    ("business", &["business", "economy", "stocks"]),
    ("science", &["science"]),
];

lazy_static! {
    static ref SUBREDDITS_BY_CATEGORY: HashMap<&'static str, &'static [&'static str]> =
        CATEGORIES.iter().cloned().collect();
}

pub fn is_known(category: &str) -> bool {
    SUBREDDITS_BY_CATEGORY.contains_key(category)
}

/// Default subreddits for `category`, falling back to the general list.
pub fn default_subreddits(category: &str) -> Vec<String> {
    SUBREDDITS_BY_CATEGORY
        .get(category)
        .or_else(|| SUBREDDITS_BY_CATEGORY.get(DEFAULT_CATEGORY))
        .map(|subs| subs.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

pub fn names() -> impl Iterator<Item = &'static str> {
    CATEGORIES.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_category_defaults() {
        assert_eq!(
            default_subreddits("technology"),
            ["technology", "programming", "gadgets"]
        );
        assert_eq!(default_subreddits("science"), ["science"]);
    }

    #[test]
    fn unknown_category_uses_general() {
        assert!(!is_known("weather"));
        assert_eq!(default_subreddits("weather"), ["news", "worldnews"]);
    }

    #[test]
    fn names_keep_display_order() {
        let names: Vec<_> = names().collect();
        assert_eq!(names.first(), Some(&"general"));
        assert_eq!(names.len(), 6);
    }
}
