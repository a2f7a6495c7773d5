//! Emphasis vocabulary and icon associations

use std::collections::HashSet;

use once_cell::sync::Lazy;

static EMPHASIS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "god", "jesus", "lord", "father", "spirit", "love", "faith", "hope", "grace", "mercy",
        "forever", "eternal", "salvation", "blessed", "always", "never", "all", "every",
        "everyone",
    ]
    .into_iter()
    .collect()
});

/// Word to icon, in lookup order
const ICONS: &[(&str, &str)] = &[
    ("god", "✨"),
    ("love", "❤️"),
    ("faith", "🙏"),
    ("hope", "🌟"),
    ("peace", "🕊️"),
    ("strength", "💪"),
    ("joy", "😊"),
    ("light", "💡"),
    ("heaven", "☁️"),
    ("prayer", "🙏"),
    ("blessed", "🙌"),
    ("grace", "✨"),
    ("mercy", "💝"),
    ("salvation", "✝️"),
    ("glory", "👑"),
    ("miracle", "✨"),
    ("wisdom", "🧠"),
    ("power", "⚡"),
    ("fire", "🔥"),
    ("victory", "🏆"),
];

/// Lowercase a word and strip surrounding punctuation
#[must_use]
pub fn normalize(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

#[must_use]
pub fn is_emphasis(word: &str) -> bool {
    EMPHASIS.contains(normalize(word).as_str())
}

#[must_use]
pub fn icon_for(word: &str) -> Option<&'static str> {
    let word = normalize(word);
    ICONS.iter().find(|(w, _)| *w == word).map(|(_, icon)| *icon)
}

/// Icon of the first word in `words` that has one
pub fn first_icon<'a>(words: impl IntoIterator<Item = &'a str>) -> Option<&'static str> {
    words.into_iter().find_map(icon_for)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize("Lord,"), "lord");
        assert_eq!(normalize("\"Faith!\""), "faith");
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn emphasis_matches_whole_words_only() {
        assert!(is_emphasis("God."));
        assert!(is_emphasis("EVERYONE"));
        assert!(!is_emphasis("gods"));
        assert!(!is_emphasis("tall"));
    }

    #[test]
    fn first_icon_wins() {
        let words = ["the", "light", "of", "love"];
        assert_eq!(first_icon(words), Some("💡"));
        assert_eq!(first_icon(["nothing", "here"]), None);
    }
}
