//! Query execution: scoring, exclusion, and highlighting
//!
//! Scoring model, per matched term:
//!
//! ```text
//! score += tf * field_boost / sqrt(document_token_count)
//! ```
//!
//! Phrase matches weigh 2× a term match. Fuzzy matches (edit distance
//! within the request's budget) are included with a similarity discount
//! of `1 - distance / max(len)`, so an exact hit always outranks its
//! fuzzy neighbors. Documents matching any excluded term are removed
//! after inclusion scoring.

use crate::document::IndexedDocument;
use crate::fuzzy::{levenshtein, similarity};
use crate::index::SearchIndex;
use crate::query::{parse, ParsedQuery};
use crate::schema::TAGS_FIELD;
use recon_core::EntityId;
use rustc_hash::FxHashMap;
use std::collections::HashMap;

/// Phrase matches count double
const PHRASE_WEIGHT: f32 = 2.0;
/// Edit budget when fuzzy matching is on and the caller named none
const DEFAULT_FUZZINESS: usize = 2;
/// Tags boost search relevance unless the caller overrides it
const DEFAULT_TAG_BOOST: f32 = 2.0;
/// Context window around a highlighted match, in characters
const HIGHLIGHT_WINDOW: usize = 30;
/// Snippets kept per field
const MAX_SNIPPETS_PER_FIELD: usize = 3;

/// A full-text search request
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Raw query string
    pub query: String,
    /// Restrict matching to these fields; `None` searches all
    pub fields: Option<Vec<String>>,
    /// Include fuzzy matches
    pub fuzzy: bool,
    /// Maximum edit distance for fuzzy matches; `None` takes the
    /// engine's configured default
    pub fuzziness: Option<usize>,
    /// Honor double-quoted phrases
    pub phrase_matching: bool,
    /// Honor `-` / `+` / bare operator tokens
    pub boolean_operators: bool,
    /// Per-field score multipliers
    pub boost_fields: HashMap<String, f32>,
    /// Maximum hits returned
    pub limit: Option<usize>,
    /// Hits skipped before returning
    pub offset: usize,
}

impl SearchRequest {
    /// A request with default options
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            fields: None,
            fuzzy: false,
            fuzziness: None,
            phrase_matching: true,
            boolean_operators: true,
            boost_fields: HashMap::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Builder: restrict matching to the given fields
    pub fn in_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Builder: enable fuzzy matching with the default edit budget
    pub fn fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }

    /// Builder: enable fuzzy matching with the given edit budget
    pub fn with_fuzzy(mut self, fuzziness: usize) -> Self {
        self.fuzzy = true;
        self.fuzziness = Some(fuzziness);
        self
    }

    /// Builder: boost a field's matches
    pub fn boost(mut self, field: impl Into<String>, factor: f32) -> Self {
        self.boost_fields.insert(field.into(), factor);
        self
    }

    /// Builder: set the result limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builder: set the result offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Builder: treat quotes as ordinary characters
    pub fn without_phrases(mut self) -> Self {
        self.phrase_matching = false;
        self
    }

    /// Builder: treat `-` / `+` / operators as ordinary text
    pub fn without_operators(mut self) -> Self {
        self.boolean_operators = false;
        self
    }

    fn field_allowed(&self, field: &str) -> bool {
        match &self.fields {
            Some(fields) => fields.iter().any(|f| f == field),
            None => true,
        }
    }

    fn boost_for(&self, field: &str) -> f32 {
        if let Some(factor) = self.boost_fields.get(field) {
            return *factor;
        }
        if field == TAGS_FIELD {
            DEFAULT_TAG_BOOST
        } else {
            1.0
        }
    }
}

/// One scored search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Matched entity
    pub id: EntityId,
    /// Matched entity's type
    pub entity_type: String,
    /// Relevance score, higher is better
    pub score: f32,
    /// field → highlighted snippets
    pub highlights: HashMap<String, Vec<String>>,
}

/// Execute a search against the index
pub fn search(index: &SearchIndex, request: &SearchRequest) -> Vec<SearchHit> {
    let parsed = parse(
        &request.query,
        request.phrase_matching,
        request.boolean_operators,
    );
    if parsed.is_empty() {
        return Vec::new();
    }

    let mut scores: FxHashMap<EntityId, f32> = FxHashMap::default();
    // (field, needle) pairs that matched, for highlight extraction
    let mut matched: FxHashMap<EntityId, Vec<(String, String)>> = FxHashMap::default();
    let mut documents: FxHashMap<EntityId, IndexedDocument> = FxHashMap::default();

    score_terms(index, request, &parsed, &mut scores, &mut matched, &mut documents);
    score_phrases(index, request, &parsed, &mut scores, &mut matched, &mut documents);
    enforce_required(index, request, &parsed, &mut scores);
    apply_exclusions(index, request, &parsed, &mut scores);

    let mut ranked: Vec<(EntityId, f32)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let page = ranked.into_iter().skip(request.offset);
    let page: Vec<(EntityId, f32)> = match request.limit {
        Some(limit) => page.take(limit).collect(),
        None => page.collect(),
    };

    page.into_iter()
        .map(|(id, score)| {
            let doc = documents.get(&id);
            let highlights = doc
                .map(|doc| build_highlights(doc, matched.get(&id).map(Vec::as_slice).unwrap_or(&[])))
                .unwrap_or_default();
            SearchHit {
                id,
                entity_type: doc.map(|d| d.entity_type.clone()).unwrap_or_default(),
                score,
                highlights,
            }
        })
        .collect()
}

/// Score exact and fuzzy term matches
fn score_terms(
    index: &SearchIndex,
    request: &SearchRequest,
    parsed: &ParsedQuery,
    scores: &mut FxHashMap<EntityId, f32>,
    matched: &mut FxHashMap<EntityId, Vec<(String, String)>>,
    documents: &mut FxHashMap<EntityId, IndexedDocument>,
) {
    let vocabulary: Vec<String> = if request.fuzzy { index.terms() } else { Vec::new() };
    let budget = request.fuzziness.unwrap_or(DEFAULT_FUZZINESS);

    for term in parsed.terms.iter().chain(parsed.required.iter()) {
        if let Some(postings) = index.postings_for(term) {
            score_postings(index, request, term, 1.0, &postings, scores, matched, documents);
        }

        if request.fuzzy {
            for candidate in &vocabulary {
                if candidate == term {
                    continue;
                }
                let len_gap = candidate.chars().count().abs_diff(term.chars().count());
                if len_gap > budget {
                    continue;
                }
                let distance = levenshtein(term, candidate);
                if distance == 0 || distance > budget {
                    continue;
                }
                let discount = similarity(term, candidate, distance);
                if let Some(postings) = index.postings_for(candidate) {
                    score_postings(
                        index, request, candidate, discount, &postings, scores, matched, documents,
                    );
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn score_postings(
    index: &SearchIndex,
    request: &SearchRequest,
    needle: &str,
    factor: f32,
    postings: &FxHashMap<EntityId, FxHashMap<String, u32>>,
    scores: &mut FxHashMap<EntityId, f32>,
    matched: &mut FxHashMap<EntityId, Vec<(String, String)>>,
    documents: &mut FxHashMap<EntityId, IndexedDocument>,
) {
    for (id, field_hits) in postings {
        let Some(doc) = fetch_document(index, documents, id) else {
            continue;
        };
        let norm = (doc.token_count as f32).sqrt().max(1.0);
        for (field, tf) in field_hits {
            if !request.field_allowed(field) {
                continue;
            }
            let contribution = *tf as f32 * request.boost_for(field) / norm * factor;
            *scores.entry(*id).or_insert(0.0) += contribution;
            matched
                .entry(*id)
                .or_default()
                .push((field.clone(), needle.to_string()));
        }
    }
}

/// Score contiguous phrase occurrences at double weight
fn score_phrases(
    index: &SearchIndex,
    request: &SearchRequest,
    parsed: &ParsedQuery,
    scores: &mut FxHashMap<EntityId, f32>,
    matched: &mut FxHashMap<EntityId, Vec<(String, String)>>,
    documents: &mut FxHashMap<EntityId, IndexedDocument>,
) {
    for phrase in &parsed.phrases {
        let Some(first) = phrase.first() else { continue };
        let Some(candidates) = index.postings_for(first) else {
            continue;
        };

        for id in candidates.keys() {
            let Some(doc) = fetch_document(index, documents, id) else {
                continue;
            };
            let norm = (doc.token_count as f32).sqrt().max(1.0);
            for (field, text) in &doc.fields {
                if !request.field_allowed(field) {
                    continue;
                }
                let occurrences = count_phrase(&text.tokens, phrase);
                if occurrences == 0 {
                    continue;
                }
                let contribution =
                    PHRASE_WEIGHT * occurrences as f32 * request.boost_for(field) / norm;
                *scores.entry(*id).or_insert(0.0) += contribution;
                matched
                    .entry(*id)
                    .or_default()
                    .push((field.clone(), phrase.join(" ")));
            }
        }
    }
}

fn count_phrase(tokens: &[String], phrase: &[String]) -> usize {
    if phrase.is_empty() || tokens.len() < phrase.len() {
        return 0;
    }
    tokens
        .windows(phrase.len())
        .filter(|window| window.iter().zip(phrase).all(|(a, b)| a == b))
        .count()
}

/// Drop documents missing any `+` term
fn enforce_required(
    index: &SearchIndex,
    request: &SearchRequest,
    parsed: &ParsedQuery,
    scores: &mut FxHashMap<EntityId, f32>,
) {
    for term in &parsed.required {
        let holders: FxHashMap<EntityId, FxHashMap<String, u32>> =
            index.postings_for(term).unwrap_or_default();
        scores.retain(|id, _| {
            holders
                .get(id)
                .map(|fields| fields.keys().any(|f| request.field_allowed(f)))
                .unwrap_or(false)
        });
    }
}

/// Remove documents matching any excluded term, after inclusion scoring
fn apply_exclusions(
    index: &SearchIndex,
    request: &SearchRequest,
    parsed: &ParsedQuery,
    scores: &mut FxHashMap<EntityId, f32>,
) {
    for term in &parsed.excluded {
        if let Some(postings) = index.postings_for(term) {
            scores.retain(|id, _| {
                postings
                    .get(id)
                    .map(|fields| !fields.keys().any(|f| request.field_allowed(f)))
                    .unwrap_or(true)
            });
        }
    }
}

fn fetch_document<'a>(
    index: &SearchIndex,
    documents: &'a mut FxHashMap<EntityId, IndexedDocument>,
    id: &EntityId,
) -> Option<&'a IndexedDocument> {
    if !documents.contains_key(id) {
        documents.insert(*id, index.document(id)?);
    }
    documents.get(id)
}

// ============================================================================
// Highlighting
// ============================================================================

fn build_highlights(
    doc: &IndexedDocument,
    matches: &[(String, String)],
) -> HashMap<String, Vec<String>> {
    let mut highlights: HashMap<String, Vec<String>> = HashMap::new();
    let mut seen: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();

    for (field, needle) in matches {
        if !seen.insert((field.clone(), needle.clone())) {
            continue;
        }
        let Some(text) = doc.fields.get(field) else {
            continue;
        };
        let snippets = highlights.entry(field.clone()).or_default();
        if snippets.len() >= MAX_SNIPPETS_PER_FIELD {
            continue;
        }
        let budget = MAX_SNIPPETS_PER_FIELD - snippets.len();

        let mut found = extract_snippets(&text.raw, needle, budget);
        if found.is_empty() {
            // A stemmed needle may not appear verbatim; fall back to its
            // first word, which is usually a prefix of the original.
            if let Some(first_word) = needle.split(' ').next().filter(|w| *w != needle) {
                found = extract_snippets(&text.raw, first_word, budget);
            }
        }
        for snippet in found {
            if !snippets.contains(&snippet) {
                snippets.push(snippet);
            }
        }
    }

    highlights.retain(|_, snippets| !snippets.is_empty());
    highlights
}

/// Extract up to `cap` windows of ±30 characters around matches,
/// wrapping the match in emphasis markers
fn extract_snippets(raw: &str, needle: &str, cap: usize) -> Vec<String> {
    let haystack: Vec<char> = raw.chars().collect();
    let lowered: Vec<char> = haystack
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();
    let needle_chars: Vec<char> = needle.chars().collect();
    if needle_chars.is_empty() || haystack.len() < needle_chars.len() {
        return Vec::new();
    }

    let mut snippets = Vec::new();
    let mut position = 0;
    while snippets.len() < cap && position + needle_chars.len() <= lowered.len() {
        if lowered[position..position + needle_chars.len()] != needle_chars[..] {
            position += 1;
            continue;
        }
        let start = position.saturating_sub(HIGHLIGHT_WINDOW);
        let end = (position + needle_chars.len() + HIGHLIGHT_WINDOW).min(haystack.len());
        let before: String = haystack[start..position].iter().collect();
        let matched: String = haystack[position..position + needle_chars.len()].iter().collect();
        let after: String = haystack[position + needle_chars.len()..end].iter().collect();
        snippets.push(format!("{}**{}**{}", before, matched, after));
        position += needle_chars.len();
    }
    snippets
}
