//! Term-vs-dictionary search: align one intervention term against every
//! synonym of every class and accumulate accepted candidates.

use crate::align::align;
use crate::dict::{Dictionary, Modifiers};
use crate::models::{MatchCandidate, ScoringParams, TermMatches};
use tracing::trace;

/// Search `term` against the whole dictionary. A candidate is accepted when
/// its global similarity clears `min_global` and its modifier-weighted local
/// similarity clears `min_weighted`; an exact match aborts the remaining scan
/// since the accumulator is locked anyway. Returns `None` when nothing
/// cleared the thresholds.
pub fn search_term(
    term: &str,
    dict: &Dictionary,
    modifiers: &Modifiers,
    params: &ScoringParams,
) -> Option<TermMatches> {
    let mut results = TermMatches::new(term);
    for (class_id, synonyms) in dict.entries() {
        for synonym in synonyms {
            for alignment in align(term, synonym.as_str(), params) {
                let weight = modifiers.weight(&alignment.token_i.to_lowercase());
                if alignment.global_sim > params.min_global
                    && weight * alignment.local_sim > params.min_weighted
                {
                    trace!(
                        term,
                        class_id,
                        synonym = synonym.as_str(),
                        similarity = alignment.similarity,
                        "candidate accepted"
                    );
                    results.add(MatchCandidate {
                        class_id: class_id.to_string(),
                        term: term.to_string(),
                        synonym: synonym.as_str().to_string(),
                        alignment,
                    });
                }
            }
            if results.has_exact() {
                return Some(results);
            }
        }
    }
    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}
