//! Typed retrieval plan built from a parsed query.
//!
//! The plan assigns every non-phrase clause an index, carries compiled
//! matchers for the term dictionary, and keeps phrase patterns for
//! verification against the stored document text. The ranker evaluates it
//! against a store snapshot.

use regex::{Regex, RegexBuilder};

use crate::query::ParsedQuery;
use crate::search::SearchOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseRole {
    Wildcard,
    Keyword,
    Included,
    Excluded,
    PhraseWord,
}

#[derive(Debug)]
pub enum TermMatcher {
    Exact(String),
    Like { pattern: String, regex: Regex },
}

impl TermMatcher {
    pub fn like(pattern: &str) -> Self {
        TermMatcher::Like {
            pattern: pattern.to_string(),
            regex: like_regex(pattern),
        }
    }

    pub fn matches(&self, term: &str) -> bool {
        match self {
            TermMatcher::Exact(literal) => literal == term,
            TermMatcher::Like { regex, .. } => regex.is_match(term),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, TermMatcher::Like { .. })
    }
}

#[derive(Debug)]
pub struct MatchClause {
    pub role: ClauseRole,
    pub matcher: TermMatcher,
}

#[derive(Debug)]
pub struct PhraseClause {
    pub text: String,
    pub words: Vec<String>,
    pub regex: Regex,
}

#[derive(Debug)]
pub struct QueryPlan {
    /// Clause order: wildcards, plains, requireds, excludeds, phrase words.
    pub clauses: Vec<MatchClause>,
    pub phrases: Vec<PhraseClause>,
    pub or_search: bool,
    pub pids: Vec<i64>,
    pub limit: usize,
    pub offset: usize,
}

impl QueryPlan {
    /// Number of scoring clauses: all match clauses minus the excluded ones.
    pub fn active(&self) -> usize {
        self.clauses
            .iter()
            .filter(|c| c.role != ClauseRole::Excluded)
            .count()
    }
}

pub fn build_plan(query: &ParsedQuery, options: &SearchOptions) -> QueryPlan {
    let mut clauses = Vec::new();
    for pattern in &query.wildcards {
        clauses.push(MatchClause {
            role: ClauseRole::Wildcard,
            matcher: TermMatcher::like(pattern),
        });
    }
    for word in &query.keywords {
        clauses.push(MatchClause {
            role: ClauseRole::Keyword,
            matcher: TermMatcher::Exact(word.clone()),
        });
    }
    for word in &query.included {
        clauses.push(MatchClause {
            role: ClauseRole::Included,
            matcher: TermMatcher::Exact(word.clone()),
        });
    }
    for word in &query.excluded {
        clauses.push(MatchClause {
            role: ClauseRole::Excluded,
            matcher: TermMatcher::Exact(word.clone()),
        });
    }
    for phrase in &query.phrases {
        for word in &phrase.words {
            clauses.push(MatchClause {
                role: ClauseRole::PhraseWord,
                matcher: TermMatcher::Exact(word.clone()),
            });
        }
    }

    let phrases = query
        .phrases
        .iter()
        .map(|p| PhraseClause {
            text: p.text.clone(),
            words: p.words.clone(),
            regex: phrase_regex(&p.text),
        })
        .collect();

    QueryPlan {
        clauses,
        phrases,
        or_search: options.or_search,
        pids: options.pids.clone(),
        limit: options.limit,
        offset: options.offset,
    }
}

/// Compile a SQL-style LIKE pattern (`%` matches any sequence) into an
/// anchored regex over a single term.
fn like_regex(pattern: &str) -> Regex {
    let mut source = String::from("^");
    for (i, part) in pattern.split('%').enumerate() {
        if i > 0 {
            source.push_str(".*");
        }
        source.push_str(&regex::escape(part));
    }
    source.push('$');
    Regex::new(&source).expect("escaped pattern is a valid regex")
}

/// Compile a phrase into a case-insensitive substring pattern matching any
/// non-alphanumeric run between the words.
fn phrase_regex(text: &str) -> Regex {
    let source = text
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^[:alnum:]]+");
    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .expect("escaped pattern is a valid regex")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;
    use crate::tokenizer::Locale;

    fn plan_for(raw: &str) -> QueryPlan {
        let parsed = parse_query(raw, &Locale::default(), 0, false).unwrap();
        build_plan(&parsed, &SearchOptions::default())
    }

    #[test]
    fn clause_order_is_wildcards_plains_required_excluded_phrase_words() {
        let plan = plan_for("qui* plain +req -excl \"brown fox\"");
        let roles: Vec<ClauseRole> = plan.clauses.iter().map(|c| c.role).collect();
        assert_eq!(
            roles,
            vec![
                ClauseRole::Wildcard,
                ClauseRole::Keyword,
                ClauseRole::Included,
                ClauseRole::Excluded,
                ClauseRole::PhraseWord,
                ClauseRole::PhraseWord,
            ]
        );
        assert_eq!(plan.active(), 5);
    }

    #[test]
    fn like_patterns_anchor_and_escape() {
        let matcher = TermMatcher::like("qui%");
        assert!(matcher.matches("quick"));
        assert!(matcher.matches("qui"));
        assert!(!matcher.matches("inquiry"));

        let substring = TermMatcher::like("%cat%");
        assert!(substring.matches("cat"));
        assert!(substring.matches("concatenate"));
        assert!(!substring.matches("dog"));

        let dotted = TermMatcher::like("a.b%");
        assert!(dotted.matches("a.bc"));
        assert!(!dotted.matches("axbc"));
    }

    #[test]
    fn phrase_regex_matches_across_punctuation() {
        let plan = plan_for("\"brown fox\"");
        let regex = &plan.phrases[0].regex;
        assert!(regex.is_match("the quick Brown Fox jumps"));
        assert!(regex.is_match("brown-fox"));
        assert!(regex.is_match("brown,  fox"));
        assert!(!regex.is_match("brownfox"));
        assert!(!regex.is_match("brown fix"));
    }
}
