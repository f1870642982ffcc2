//! Data structures for the trialmatch pipeline.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// One step of an alignment path: indices into the two sequences being
/// aligned. A negative index marks a position already consumed by an earlier
/// step (a gap introduced during traceback or overlap merging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracePair {
    pub i: i32,
    pub j: i32,
}

impl TracePair {
    pub fn new(i: i32, j: i32) -> Self {
        TracePair { i, j }
    }
}

impl fmt::Display for TracePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.i, self.j)
    }
}

/// Result of aligning two character sequences along one traced path.
///
/// Immutable once constructed. `score` is clamped at zero, so
/// `similarity`, `global_sim` and `local_sim` all lie in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub trace: Vec<TracePair>,
    pub score: i32,
    /// Number of matched (diagonal, equal ignoring case) positions.
    pub matches: usize,
    /// score / (len_i + len_j)
    pub global_sim: f64,
    /// score / (matches * match_score)
    pub local_sim: f64,
    /// r * local + (1 - r) * global, r = matches / max(len_i, len_j)
    pub similarity: f64,
    /// Positions of the first sequence covered by this alignment.
    pub extent_i: Vec<bool>,
    /// Positions of the second sequence covered by this alignment.
    pub extent_j: Vec<bool>,
    /// Matched substring of the first sequence, extended to token boundaries.
    pub token_i: String,
    /// Matched substring of the second sequence, extended to token boundaries.
    pub token_j: String,
    /// Three-row rendering: sequence row, match markers, sequence row.
    pub rendered: String,
}

impl Alignment {
    pub fn is_exact(&self) -> bool {
        self.similarity >= 1.0
    }

    /// Candidate-quality ordering: similarity, then local, then global, then
    /// match count, all descending. Distinct from the raw-score ordering the
    /// alignment engine uses to rank co-optimal traces.
    pub fn quality_cmp(&self, other: &Alignment) -> Ordering {
        other
            .similarity
            .total_cmp(&self.similarity)
            .then_with(|| other.local_sim.total_cmp(&self.local_sim))
            .then_with(|| other.global_sim.total_cmp(&self.global_sim))
            .then_with(|| other.matches.cmp(&self.matches))
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// A found match: a dictionary class, the search term, the synonym it was
/// aligned against and the alignment itself.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub class_id: String,
    pub term: String,
    pub synonym: String,
    pub alignment: Alignment,
}

impl Ord for MatchCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.alignment
            .quality_cmp(&other.alignment)
            .then_with(|| self.class_id.cmp(&other.class_id))
    }
}

impl PartialOrd for MatchCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MatchCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MatchCandidate {}

/// Per-search-term accumulator of ranked candidates.
///
/// Once an exact match (similarity 1.0) is accepted, the set is reduced to
/// that single candidate and every later insertion is rejected.
#[derive(Debug, Clone, Default)]
pub struct TermMatches {
    term: String,
    has_exact: bool,
    results: BTreeSet<MatchCandidate>,
}

impl TermMatches {
    pub fn new(term: impl Into<String>) -> Self {
        TermMatches {
            term: term.into(),
            has_exact: false,
            results: BTreeSet::new(),
        }
    }

    /// Insert a candidate, returning false if the accumulator is locked by a
    /// previous exact match.
    pub fn add(&mut self, candidate: MatchCandidate) -> bool {
        if self.has_exact {
            return false;
        }
        if candidate.alignment.is_exact() {
            self.has_exact = true;
            self.results.clear();
        }
        self.results.insert(candidate);
        true
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn has_exact(&self) -> bool {
        self.has_exact
    }

    pub fn candidates(&self) -> &BTreeSet<MatchCandidate> {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A parsed trial record. Only `id`, `title` and `interventions` feed the
/// matching pipeline; the remaining term lists are carried through for
/// completeness.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub conditions: Vec<String>,
    pub interventions: Vec<String>,
    pub sponsors: Vec<String>,
    pub phases: Vec<String>,
}

impl Record {
    pub fn is_matchable(&self) -> bool {
        !self.interventions.is_empty()
    }
}

/// Scoring and acceptance parameters, passed explicitly into the aligner,
/// the dictionary search and the dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringParams {
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_penalty: i32,
    /// Minimum global similarity for a candidate to be accepted.
    pub min_global: f64,
    /// Minimum modifier-weighted local similarity for acceptance.
    pub min_weighted: f64,
    /// Per-record cap on emitted match rows (floor; raised to the record's
    /// intervention count when that is larger).
    pub max_candidates: usize,
}

impl Default for ScoringParams {
    fn default() -> Self {
        ScoringParams {
            match_score: 2,
            mismatch_penalty: -1,
            gap_penalty: -1,
            min_global: 0.2,
            min_weighted: 0.9,
            max_candidates: 5,
        }
    }
}

/// One row of the match output, shared by the CSV and JSON writers.
/// The candidate fields are `None` for a term with no accepted match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRow {
    pub ct_id: String,
    pub match_term: String,
    pub dict_id: Option<String>,
    pub dict_term: Option<String>,
    pub score: Option<f64>,
    pub global: Option<f64>,
    pub local: Option<f64>,
}

impl MatchRow {
    pub fn unmatched(ct_id: &str, term: &str) -> Self {
        MatchRow {
            ct_id: ct_id.to_string(),
            match_term: term.to_string(),
            dict_id: None,
            dict_term: None,
            score: None,
            global: None,
            local: None,
        }
    }

    pub fn from_candidate(ct_id: &str, candidate: &MatchCandidate) -> Self {
        MatchRow {
            ct_id: ct_id.to_string(),
            match_term: candidate.term.clone(),
            dict_id: Some(candidate.class_id.clone()),
            dict_term: Some(candidate.synonym.clone()),
            score: Some(candidate.alignment.similarity),
            global: Some(candidate.alignment.global_sim),
            local: Some(candidate.alignment.local_sim),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alignment_with(similarity: f64, local: f64, global: f64, matches: usize) -> Alignment {
        Alignment {
            trace: Vec::new(),
            score: 0,
            matches,
            global_sim: global,
            local_sim: local,
            similarity,
            extent_i: Vec::new(),
            extent_j: Vec::new(),
            token_i: String::new(),
            token_j: String::new(),
            rendered: String::new(),
        }
    }

    fn candidate(class_id: &str, similarity: f64, local: f64) -> MatchCandidate {
        MatchCandidate {
            class_id: class_id.to_string(),
            term: "term".to_string(),
            synonym: "synonym".to_string(),
            alignment: alignment_with(similarity, local, 0.5, 4),
        }
    }

    #[test]
    fn ranking_is_total_and_similarity_first() {
        let mut set = BTreeSet::new();
        set.insert(candidate("C1", 0.95, 0.96));
        set.insert(candidate("C2", 0.80, 0.99));
        set.insert(candidate("C3", 0.95, 0.98));

        let ids: Vec<&str> = set.iter().map(|c| c.class_id.as_str()).collect();
        // Both 0.95 entries before 0.80; within the tie the higher local first.
        assert_eq!(ids, vec!["C3", "C1", "C2"]);
    }

    #[test]
    fn ranking_ties_break_on_class_id() {
        let mut set = BTreeSet::new();
        set.insert(candidate("B", 0.9, 0.9));
        set.insert(candidate("A", 0.9, 0.9));
        let ids: Vec<&str> = set.iter().map(|c| c.class_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn exact_match_locks_the_accumulator() {
        let mut results = TermMatches::new("aspirin");
        assert!(results.add(candidate("D1", 0.95, 0.95)));
        assert!(results.add(candidate("D2", 1.0, 1.0)));
        assert!(results.has_exact());
        // The exact match evicts everything accepted before it.
        assert_eq!(results.len(), 1);
        assert_eq!(results.candidates().iter().next().unwrap().class_id, "D2");

        // A second, different exact candidate is rejected outright.
        assert!(!results.add(candidate("D3", 1.0, 1.0)));
        assert_eq!(results.len(), 1);
        assert_eq!(results.candidates().iter().next().unwrap().class_id, "D2");
    }

    #[test]
    fn duplicate_candidates_collapse() {
        let mut results = TermMatches::new("term");
        results.add(candidate("D1", 0.92, 0.95));
        results.add(candidate("D1", 0.92, 0.95));
        assert_eq!(results.len(), 1);
    }
}
