/// Words that mark a request as a cover/thumbnail generation.
pub const COVER_VOCABULARY: &[&str] = &[
    "cover",
    "covers",
    "thumbnail",
    "thumbnails",
    "youtube",
    "banner",
];

/// Whole-word, case-insensitive match against [`COVER_VOCABULARY`].
pub fn is_cover_topic(text: &str) -> bool {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| {
            let lowered = word.to_lowercase();
            COVER_VOCABULARY.contains(&lowered.as_str())
        })
}

#[cfg(test)]
mod tests {
    use super::is_cover_topic;

    #[test]
    fn matches_vocabulary_words() {
        assert!(is_cover_topic("YouTube thumbnail for a Rust tutorial"));
        assert!(is_cover_topic("Book COVER, bold title"));
        assert!(is_cover_topic("cover-image: dark mode"));
        assert!(is_cover_topic("channel banner"));
    }

    #[test]
    fn ignores_substrings_and_unrelated_prompts() {
        assert!(!is_cover_topic("Discover how the borrow checker works"));
        assert!(!is_cover_topic("Recovery timeline diagram"));
        assert!(!is_cover_topic("A flowchart of the request pipeline"));
        assert!(!is_cover_topic(""));
    }
}
