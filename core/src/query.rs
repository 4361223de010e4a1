//! Parsing of user-entered query strings into phrases, wildcards, plain,
//! required and excluded terms.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Result, SearchError};
use crate::tokenizer::Locale;

lazy_static! {
    static ref CHUNK: Regex = Regex::new(r#""[^"]*"|\S+"#).expect("valid regex");
}

/// A quoted phrase: the verbatim inner text plus its words, re-tokenized
/// for recall against the term dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    pub text: String,
    pub words: Vec<String>,
}

/// The classified pieces of a query string. Wildcard patterns carry `%` as
/// the any-sequence marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub phrases: Vec<Phrase>,
    pub keywords: Vec<String>,
    pub wildcards: Vec<String>,
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
            && self.keywords.is_empty()
            && self.wildcards.is_empty()
            && self.included.is_empty()
            && self.excluded.is_empty()
    }
}

/// Split `raw` into chunks and classify each one. Plain words shorter than
/// `min_length` are dropped; `fuzzy` turns every plain word into a
/// `%word%` wildcard instead.
pub fn parse_query(
    raw: &str,
    locale: &Locale,
    min_length: usize,
    fuzzy: bool,
) -> Result<ParsedQuery> {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    let mut query = ParsedQuery::default();
    for chunk in CHUNK.find_iter(cleaned).map(|m| m.as_str()) {
        if chunk.ends_with('*') && chunk.chars().count() > 1 {
            push_unique(&mut query.wildcards, chunk.to_lowercase().replace('*', "%"));
            continue;
        }
        match chunk.chars().next() {
            Some('"') => {
                let inner = chunk.trim_matches('"').trim();
                if !inner.is_empty() && !query.phrases.iter().any(|p| p.text == inner) {
                    query.phrases.push(Phrase {
                        text: inner.to_string(),
                        words: locale.words(inner),
                    });
                }
            }
            Some('+') => {
                for word in locale.words(&chunk[1..]) {
                    push_unique(&mut query.included, word);
                }
            }
            Some('-') => {
                for word in locale.words(&chunk[1..]) {
                    push_unique(&mut query.excluded, word);
                }
            }
            Some('*') => {
                push_unique(&mut query.wildcards, chunk.to_lowercase().replace('*', "%"));
            }
            _ => {
                for word in locale.words(chunk) {
                    if word.chars().count() >= min_length {
                        push_unique(&mut query.keywords, word);
                    }
                }
            }
        }
    }

    if fuzzy {
        for word in std::mem::take(&mut query.keywords) {
            push_unique(&mut query.wildcards, format!("%{word}%"));
        }
    }

    Ok(query)
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ParsedQuery {
        parse_query(raw, &Locale::default(), 0, false).unwrap()
    }

    #[test]
    fn blank_input_is_rejected() {
        assert!(matches!(
            parse_query("   ", &Locale::default(), 0, false),
            Err(SearchError::EmptyQuery)
        ));
    }

    #[test]
    fn plain_words_are_tokenized() {
        let q = parse("Quick Brown");
        assert_eq!(q.keywords, vec!["quick", "brown"]);
    }

    #[test]
    fn phrases_keep_text_and_words() {
        let q = parse("\"Brown Fox\" quick");
        assert_eq!(q.phrases.len(), 1);
        assert_eq!(q.phrases[0].text, "Brown Fox");
        assert_eq!(q.phrases[0].words, vec!["brown", "fox"]);
        assert_eq!(q.keywords, vec!["quick"]);
    }

    #[test]
    fn required_and_excluded_prefixes() {
        let q = parse("+quick -fox");
        assert_eq!(q.included, vec!["quick"]);
        assert_eq!(q.excluded, vec!["fox"]);
        assert!(q.keywords.is_empty());
    }

    #[test]
    fn trailing_star_becomes_wildcard() {
        let q = parse("qui* *fix");
        assert_eq!(q.wildcards, vec!["qui%", "%fix"]);
    }

    #[test]
    fn lone_star_is_a_match_all_pattern() {
        let q = parse("* word");
        assert_eq!(q.wildcards, vec!["%"]);
        assert_eq!(q.keywords, vec!["word"]);
    }

    #[test]
    fn min_length_drops_short_plain_words() {
        let q = parse_query("a quick fox", &Locale::default(), 4, false).unwrap();
        assert_eq!(q.keywords, vec!["quick"]);
    }

    #[test]
    fn min_length_does_not_affect_required_terms() {
        let q = parse_query("+ab cd", &Locale::default(), 3, false).unwrap();
        assert_eq!(q.included, vec!["ab"]);
        assert!(q.keywords.is_empty());
    }

    #[test]
    fn fuzzy_converts_plain_words_to_substring_wildcards() {
        let q = parse_query("cat +dog", &Locale::default(), 0, true).unwrap();
        assert!(q.keywords.is_empty());
        assert_eq!(q.wildcards, vec!["%cat%"]);
        assert_eq!(q.included, vec!["dog"]);
    }

    #[test]
    fn duplicates_are_dropped() {
        let q = parse("fox fox +fox +fox");
        assert_eq!(q.keywords, vec!["fox"]);
        assert_eq!(q.included, vec!["fox"]);
    }
}
