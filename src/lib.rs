//! Trialmatch: approximate matching of clinical-trial intervention terms
//! against a drug dictionary.
//!
//! Terms are scored with a local alignment that tolerates misspellings,
//! salt/ester suffixes and reordered words, then filtered through global and
//! modifier-weighted local similarity thresholds. Records stream through a
//! bounded queue into a fixed worker pool, with per-term memoization so the
//! many repeated intervention strings are searched once.
//!
//! # Example
//!
//! ```no_run
//! use trialmatch::prelude::*;
//! use std::fs::File;
//!
//! let dict = load_dictionary(File::open("drugs.tsv").unwrap()).unwrap();
//! let modifiers = Modifiers::default();
//! let params = ScoringParams::default();
//!
//! let results = search_term("testosterone decanoate", &dict, &modifiers, &params);
//! if let Some(results) = results {
//!     for candidate in results.candidates() {
//!         println!("{} {}", candidate.class_id, candidate.alignment.similarity);
//!     }
//! }
//! ```

pub mod align;
pub mod dict;
pub mod dispatch;
pub mod fetch;
pub mod models;
pub mod output;
pub mod records;
pub mod search;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::align::align;
    pub use crate::dict::{
        load_dictionary, load_modifiers, DictError, Dictionary, Modifiers, Synonym,
    };
    pub use crate::dispatch::{Dispatcher, DEFAULT_WORKERS, QUEUE_CAPACITY};
    pub use crate::fetch::{download_records, FetchError, DOWNLOAD_URL};
    pub use crate::models::{
        Alignment, MatchCandidate, MatchRow, Record, ScoringParams, TermMatches, TracePair,
    };
    pub use crate::output::{AlignWriter, MatchWriter, OutputError, OutputSink};
    pub use crate::records::{
        count_term_tokens, parse_records, read_archive, RecordError,
    };
    pub use crate::search::search_term;
}

// Re-export commonly used types at the crate root
pub use models::{Alignment, MatchCandidate, Record, ScoringParams, TermMatches};
