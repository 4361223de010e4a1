use sitesearch_core::tokenizer::Locale;
use sitesearch_core::SearchError;

#[test]
fn it_lowercases_and_keeps_order() {
    let locale = Locale::parse("en").unwrap();
    let words = locale.words("The Quick BROWN fox");
    assert_eq!(words, vec!["the", "quick", "brown", "fox"]);
}

#[test]
fn it_drops_punctuation_runs() {
    let locale = Locale::default();
    let words = locale.words("one -- two ... three!?");
    assert_eq!(words, vec!["one", "two", "three"]);
}

#[test]
fn it_segments_unicode_words() {
    let locale = Locale::parse("de").unwrap();
    let words = locale.words("Straße, Bäume");
    assert_eq!(words, vec!["straße", "bäume"]);
}

#[test]
fn it_rejects_malformed_locales() {
    assert!(matches!(
        Locale::parse("not a locale"),
        Err(SearchError::UnknownLocale(_))
    ));
}
