//! Drug dictionary and modifier-weight loading.
//!
//! The dictionary maps a class id to the set of synonyms that name it, one
//! `synonym<TAB>class` pair per line. Modifier files assign weights to common
//! tokens ("hydrochloride", "tablet") so that a match on a modifier alone
//! cannot carry a candidate past the acceptance threshold.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, BufRead, BufReader, Read};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DictError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A dictionary synonym. Ordered by length first so that iteration visits
/// short names before long ones within a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synonym(pub String);

impl Synonym {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for Synonym {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Synonym {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Class id -> synonyms. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    classes: BTreeMap<String, BTreeSet<Synonym>>,
}

impl Dictionary {
    pub fn insert(&mut self, class_id: impl Into<String>, synonym: impl Into<String>) {
        self.classes
            .entry(class_id.into())
            .or_default()
            .insert(Synonym(synonym.into()));
    }

    /// Iterate (class id, synonyms) in class-id order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &BTreeSet<Synonym>)> {
        self.classes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Total synonym count across all classes.
    pub fn synonym_count(&self) -> usize {
        self.classes.values().map(|s| s.len()).sum()
    }
}

/// Token -> weight table. Tokens are stored case-folded; unknown tokens
/// weigh 1.0.
#[derive(Debug, Clone, Default)]
pub struct Modifiers {
    weights: HashMap<String, f64>,
}

impl Modifiers {
    pub fn insert(&mut self, token: impl AsRef<str>, weight: f64) {
        self.weights.insert(token.as_ref().to_lowercase(), weight);
    }

    pub fn weight(&self, token: &str) -> f64 {
        self.weights.get(token).copied().unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Load a dictionary from `synonym<TAB>class` lines. Malformed lines are
/// skipped with a warning.
pub fn load_dictionary<R: Read>(reader: R) -> Result<Dictionary, DictError> {
    let mut dict = Dictionary::default();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(2, '\t');
        match (fields.next(), fields.next()) {
            (Some(synonym), Some(class_id)) if !synonym.is_empty() && !class_id.is_empty() => {
                dict.insert(class_id.trim(), synonym.trim());
            }
            _ => {
                warn!(line = lineno + 1, "skipping malformed dictionary line");
            }
        }
    }
    info!(
        classes = dict.len(),
        synonyms = dict.synonym_count(),
        "dictionary loaded"
    );
    Ok(dict)
}

/// Load modifier weights. Lines are `token weight`; a line without a parsable
/// weight field is kept whole as a zero-weight entry, so multi-word modifiers
/// ("extended release") need no quoting. `#` starts a comment line.
pub fn load_modifiers<R: Read>(reader: R) -> Result<Modifiers, DictError> {
    let mut modifiers = Modifiers::default();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() == 2 {
            match tokens[1].parse::<f64>() {
                Ok(weight) => modifiers.insert(tokens[0], weight),
                Err(_) => {
                    warn!(line = lineno + 1, "skipping modifier with malformed weight");
                }
            }
        } else {
            modifiers.insert(line, 0.0);
        }
    }
    info!(entries = modifiers.len(), "modifiers loaded");
    Ok(modifiers)
}
