use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Result, SearchError};

/// A validated locale tag, e.g. `en`, `de-CH` or `zh-Hans-CN`.
///
/// The tag selects the word segmenter used for indexing and querying. An
/// unparseable tag fails with [`SearchError::UnknownLocale`] before any
/// index write happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(String);

impl Locale {
    pub fn parse(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        if !valid_tag(tag) {
            return Err(SearchError::UnknownLocale(tag.to_string()));
        }
        Ok(Locale(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segment `text` into lowercase word tokens following the Unicode
    /// word boundary rules (UAX #29). Whitespace and punctuation runs are
    /// dropped; order is preserved and duplicates are retained so callers
    /// can count term frequencies.
    pub fn words(&self, text: &str) -> Vec<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale("en".to_string())
    }
}

fn valid_tag(tag: &str) -> bool {
    let mut subtags = tag.split('-');
    let primary = match subtags.next() {
        Some(s) => s,
        None => return false,
    };
    if primary.len() < 2 || primary.len() > 8 || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    subtags.all(|s| !s.is_empty() && s.len() <= 8 && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_lowercased() {
        let locale = Locale::default();
        assert_eq!(locale.words("Hello WORLD"), vec!["hello", "world"]);
    }

    #[test]
    fn punctuation_is_dropped() {
        let locale = Locale::default();
        assert_eq!(
            locale.words("quick, brown... fox!"),
            vec!["quick", "brown", "fox"]
        );
    }

    #[test]
    fn duplicates_and_order_are_kept() {
        let locale = Locale::default();
        assert_eq!(locale.words("b a b"), vec!["b", "a", "b"]);
    }

    #[test]
    fn locale_tags_are_validated() {
        assert!(Locale::parse("en").is_ok());
        assert!(Locale::parse("de-CH").is_ok());
        assert!(Locale::parse("zh-Hans-CN").is_ok());
        assert!(matches!(
            Locale::parse(""),
            Err(SearchError::UnknownLocale(_))
        ));
        assert!(matches!(
            Locale::parse("x"),
            Err(SearchError::UnknownLocale(_))
        ));
        assert!(matches!(
            Locale::parse("en_US"),
            Err(SearchError::UnknownLocale(_))
        ));
    }
}
