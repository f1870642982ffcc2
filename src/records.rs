//! Trial record parsing: XML study records, optionally gzip-compressed.

use crate::models::Record;
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Parse study records from XML. A record is kept only when it carries at
/// least one intervention term; duplicate interventions within a record are
/// dropped.
pub fn parse_records<R: BufRead>(reader: R) -> Result<Vec<Record>, RecordError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<Record> = None;
    let mut content = String::new();
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.name().as_ref() == b"study" {
                    current = Some(Record::default());
                }
                content.clear();
            }
            Event::Text(t) => {
                content.push_str(&t.unescape()?);
            }
            Event::End(e) => {
                if e.name().as_ref() == b"study" {
                    if let Some(record) = current.take() {
                        if record.is_matchable() {
                            records.push(record);
                        }
                    }
                } else if let Some(record) = current.as_mut() {
                    let text = content.trim();
                    match e.name().as_ref() {
                        b"nct_id" => record.id = text.to_string(),
                        b"title" => record.title = text.to_string(),
                        b"condition" if !text.is_empty() => {
                            record.conditions.push(text.to_string());
                        }
                        b"intervention" if !text.is_empty() => {
                            let term = text.to_string();
                            if !record.interventions.contains(&term) {
                                record.interventions.push(term);
                            }
                        }
                        b"sponsor" if !text.is_empty() => {
                            record.sponsors.push(text.to_string());
                        }
                        b"phase" if !text.is_empty() => {
                            record.phases.push(text.to_string());
                        }
                        _ => {}
                    }
                    content.clear();
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    info!(records = records.len(), "records parsed");
    Ok(records)
}

/// Read records from a file, transparently decompressing `.gz` archives.
pub fn read_archive(path: &Path) -> Result<Vec<Record>, RecordError> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        parse_records(BufReader::new(GzDecoder::new(file)))
    } else {
        parse_records(BufReader::new(file))
    }
}

/// Whitespace-token frequency over all intervention terms, used to derive
/// modifier candidate lists offline.
pub fn count_term_tokens(records: &[Record]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for record in records {
        for term in &record.interventions {
            for token in term.split_whitespace() {
                *counts.entry(token.to_lowercase()).or_insert(0) += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<studies>
  <study>
    <nct_id>NCT00000100</nct_id>
    <title>Aspirin for Pain</title>
    <condition>Headache</condition>
    <intervention>Aspirin</intervention>
    <intervention>Aspirin</intervention>
    <intervention>Placebo</intervention>
    <sponsor>Example Sponsor</sponsor>
    <phase>Phase 2</phase>
  </study>
  <study>
    <nct_id>NCT00000101</nct_id>
    <title>Observation Only</title>
    <condition>Headache</condition>
  </study>
</studies>
"#;

    #[test]
    fn parses_study_fields() {
        let records = parse_records(SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, "NCT00000100");
        assert_eq!(record.title, "Aspirin for Pain");
        assert_eq!(record.conditions, vec!["Headache"]);
        assert_eq!(record.interventions, vec!["Aspirin", "Placebo"]);
        assert_eq!(record.sponsors, vec!["Example Sponsor"]);
        assert_eq!(record.phases, vec!["Phase 2"]);
    }

    #[test]
    fn records_without_interventions_are_dropped() {
        let records = parse_records(SAMPLE.as_bytes()).unwrap();
        assert!(records.iter().all(|r| r.is_matchable()));
    }

    #[test]
    fn entities_are_unescaped() {
        let xml = "<studies><study><nct_id>N1</nct_id>\
                   <intervention>A &amp; B</intervention></study></studies>";
        let records = parse_records(xml.as_bytes()).unwrap();
        assert_eq!(records[0].interventions, vec!["A & B"]);
    }

    #[test]
    fn token_counts_are_case_folded() {
        let records = vec![
            Record {
                interventions: vec!["Aspirin Tablet".to_string()],
                ..Record::default()
            },
            Record {
                interventions: vec!["aspirin injection".to_string()],
                ..Record::default()
            },
        ];
        let counts = count_term_tokens(&records);
        assert_eq!(counts["aspirin"], 2);
        assert_eq!(counts["tablet"], 1);
    }
}
