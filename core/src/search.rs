//! Plan execution: candidate recall, cosine scoring, boolean filtering and
//! result assembly.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::Result;
use crate::plan::{build_plan, ClauseRole, QueryPlan, TermMatcher};
use crate::query::parse_query;
use crate::store::{DocId, Document, Store, TermId};
use crate::tokenizer::Locale;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Match any plain keyword instead of all of them.
    pub or_search: bool,
    /// Restrict results to these parent ids; empty means no restriction.
    pub pids: Vec<i64>,
    /// Maximum number of rows to return; 0 means unlimited.
    pub limit: usize,
    pub offset: usize,
    /// Turn plain keywords into substring wildcards.
    pub fuzzy: bool,
    /// Drop plain keywords shorter than this.
    pub min_length: usize,
    pub locale: Locale,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            or_search: false,
            pids: Vec::new(),
            limit: 0,
            offset: 0,
            fuzzy: false,
            min_length: 0,
            locale: Locale::default(),
        }
    }
}

/// One ranked result row: the full document plus its relevance and the
/// matched surface forms for highlighting.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub document: Document,
    pub relevance: f64,
    /// Comma-joined matched surface forms.
    pub matches: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    /// Number of matching documents before paging.
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

/// Parse `query`, build the retrieval plan and execute it against the
/// store's current snapshot.
pub fn search_for(store: &Store, query: &str, options: &SearchOptions) -> Result<SearchResults> {
    let parsed = parse_query(query, &options.locale, options.min_length, options.fuzzy)?;
    let plan = build_plan(&parsed, options);
    tracing::debug!(
        clauses = plan.clauses.len(),
        phrases = plan.phrases.len(),
        or_search = plan.or_search,
        "executing query plan"
    );
    Ok(execute(store, &plan))
}

struct Candidate {
    tf_sums: Vec<f64>,
    matched: Vec<String>,
}

fn execute(store: &Store, plan: &QueryPlan) -> SearchResults {
    if plan.clauses.is_empty() {
        return SearchResults {
            total: 0,
            hits: Vec::new(),
        };
    }

    let reader = store.read();
    let n = reader.document_count() as f64 + 1.0;
    let active = plan.active().max(1) as f64;
    let clause_count = plan.clauses.len();

    // Expand each clause against the term dictionary.
    let mut clause_terms: Vec<Vec<TermId>> = vec![Vec::new(); clause_count];
    for term in reader.terms() {
        for (i, clause) in plan.clauses.iter().enumerate() {
            if clause.matcher.matches(&term.term) {
                clause_terms[i].push(term.id);
            }
        }
    }

    // Per-clause weight: wildcards score against the count of distinct
    // documents matching the pattern, exact clauses against the matched
    // term's document frequency.
    let mut weights = vec![0.0f64; clause_count];
    for (i, clause) in plan.clauses.iter().enumerate() {
        weights[i] = match &clause.matcher {
            TermMatcher::Like { .. } => {
                let mut docs: HashSet<DocId> = HashSet::new();
                for &term in &clause_terms[i] {
                    if let Some(ids) = reader.docs_with_term(term) {
                        docs.extend(ids.iter().copied());
                    }
                }
                (n / (docs.len() as f64).max(1.0)).ln()
            }
            TermMatcher::Exact(_) => {
                let df = clause_terms[i]
                    .first()
                    .and_then(|&term| reader.term(term))
                    .map(|t| t.document_frequency)
                    .unwrap_or(0);
                (n / f64::from(df).max(1.0)).ln()
            }
        };
    }

    // Join matching terms against the postings, grouping by document.
    let mut candidates: HashMap<DocId, Candidate> = HashMap::new();
    for (i, terms) in clause_terms.iter().enumerate() {
        for &term in terms {
            let Some(surface) = reader.term(term).map(|t| t.term.clone()) else {
                continue;
            };
            for (doc, tf) in reader.postings_of_term(term) {
                let candidate = candidates.entry(doc).or_insert_with(|| Candidate {
                    tf_sums: vec![0.0; clause_count],
                    matched: Vec::new(),
                });
                candidate.tf_sums[i] += f64::from(tf);
                if !candidate.matched.contains(&surface) {
                    candidate.matched.push(surface.clone());
                }
            }
        }
    }

    let query_norm = plan
        .clauses
        .iter()
        .enumerate()
        .filter(|(_, c)| c.role != ClauseRole::Excluded)
        .map(|(i, _)| (weights[i] / active) * (weights[i] / active))
        .sum::<f64>()
        .sqrt();

    let mut hits = Vec::new();
    'candidates: for (doc_id, candidate) in &candidates {
        // Boolean constraints: excluded clauses must not match; required
        // clauses always must; plain keywords must unless or-searching.
        for (i, clause) in plan.clauses.iter().enumerate() {
            let present = candidate.tf_sums[i] > 0.0;
            let mandatory = match clause.role {
                ClauseRole::Included => true,
                ClauseRole::Keyword => !plan.or_search,
                _ => false,
            };
            if clause.role == ClauseRole::Excluded && present {
                continue 'candidates;
            }
            if mandatory && !present {
                continue 'candidates;
            }
        }

        let Some(doc) = reader.document(*doc_id) else {
            continue;
        };
        if !plan.pids.is_empty() && !plan.pids.contains(&doc.pid) {
            continue;
        }
        if !plan.phrases.is_empty() {
            let verified = if plan.or_search {
                plan.phrases.iter().any(|p| p.regex.is_match(&doc.text))
            } else {
                plan.phrases.iter().all(|p| p.regex.is_match(&doc.text))
            };
            if !verified {
                continue;
            }
        }

        let mut similarity = 0.0f64;
        for (i, clause) in plan.clauses.iter().enumerate() {
            if clause.role == ClauseRole::Excluded {
                continue;
            }
            let tf_sum = candidate.tf_sums[i];
            if tf_sum > 0.0 {
                similarity += (1.0 + tf_sum.ln()) * weights[i] * weights[i] / active;
            }
        }

        let denominator = query_norm * doc.vector_length;
        let mut relevance = if denominator > 0.0 {
            similarity / denominator
        } else {
            0.0
        };
        if relevance == 0.0 {
            relevance = f64::MIN_POSITIVE;
        }

        hits.push(SearchHit {
            document: doc.clone(),
            relevance,
            matches: highlight_matches(plan, &candidate.matched),
        });
    }

    hits.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(Ordering::Equal)
            .then(a.document.id.cmp(&b.document.id))
    });

    let total = hits.len();
    let hits = page(hits, plan.offset, plan.limit);
    SearchResults { total, hits }
}

/// Surface forms for highlighting: plain and required literals present in
/// the document, document terms matching any wildcard, and each phrase
/// whose words all matched.
fn highlight_matches(plan: &QueryPlan, matched: &[String]) -> String {
    let mut out: Vec<String> = Vec::new();
    for clause in &plan.clauses {
        match (&clause.role, &clause.matcher) {
            (ClauseRole::Excluded | ClauseRole::PhraseWord, _) => {}
            (_, TermMatcher::Exact(literal)) => {
                if matched.contains(literal) && !out.contains(literal) {
                    out.push(literal.clone());
                }
            }
            (_, TermMatcher::Like { regex, .. }) => {
                for surface in matched {
                    if regex.is_match(surface) && !out.contains(surface) {
                        out.push(surface.clone());
                    }
                }
            }
        }
    }
    for phrase in &plan.phrases {
        if !phrase.words.is_empty()
            && phrase.words.iter().all(|w| matched.contains(w))
            && !out.contains(&phrase.text)
        {
            out.push(phrase.text.clone());
        }
    }
    out.join(",")
}

fn page(hits: Vec<SearchHit>, offset: usize, limit: usize) -> Vec<SearchHit> {
    let mut iter = hits.into_iter().skip(offset);
    if limit > 0 {
        iter.by_ref().take(limit).collect()
    } else {
        iter.collect()
    }
}
