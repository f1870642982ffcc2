//! Integration tests for trialmatch.
//!
//! These tests drive the pipeline end to end: dictionary loading, record
//! parsing, dispatch across workers and CSV emission.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use trialmatch::prelude::*;

/// Writer over a shared buffer so tests can read back sink output.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn dictionary() -> Dictionary {
    let data = "aspirin\tD001\n\
                acetylsalicylic acid\tD001\n\
                ibuprofen\tD002\n\
                testosterone undecanoate\tD003\n\
                testosterone enanthate\tD004\n";
    load_dictionary(data.as_bytes()).unwrap()
}

const ARCHIVE: &str = r#"<?xml version="1.0"?>
<studies>
  <study>
    <nct_id>NCT00000001</nct_id>
    <title>Aspirin for Headache</title>
    <intervention>Aspirin</intervention>
  </study>
  <study>
    <nct_id>NCT00000002</nct_id>
    <title>Observation</title>
    <intervention>Placebo</intervention>
  </study>
  <study>
    <nct_id>NCT00000003</nct_id>
    <title>Hormone Therapy</title>
    <intervention>testosterone decanoate</intervention>
  </study>
</studies>
"#;

fn run_pipeline(buf: &SharedBuf, workers: usize) -> usize {
    let records = parse_records(ARCHIVE.as_bytes()).unwrap();
    let sink = Arc::new(Mutex::new(OutputSink {
        match_writer: Some(MatchWriter::new(Box::new(buf.clone())).unwrap()),
        ..OutputSink::default()
    }));
    let dispatcher = Dispatcher::new(
        dictionary(),
        Modifiers::default(),
        ScoringParams::default(),
        sink.clone(),
    )
    .with_workers(workers);
    let processed = dispatcher.run(records);
    sink.lock().unwrap().finish().unwrap();
    processed
}

#[test]
fn pipeline_processes_all_records() {
    let buf = SharedBuf::default();
    assert_eq!(run_pipeline(&buf, 2), 3);

    let out = buf.contents();
    assert!(out.starts_with("CT_ID,MATCH_TERM,DICT_ID,DICT_TERM,SCORE,GLOBAL,LOCAL"));
    // One row per record regardless of match outcome.
    assert_eq!(out.lines().count(), 4);
}

#[test]
fn exact_term_emits_its_class() {
    let buf = SharedBuf::default();
    run_pipeline(&buf, 1);
    let out = buf.contents();
    assert!(out.contains("NCT00000001,\"Aspirin\",D001,\"aspirin\",1.000,1.000,1.000"));
}

#[test]
fn unmatched_term_emits_an_empty_row() {
    let buf = SharedBuf::default();
    run_pipeline(&buf, 1);
    assert!(buf.contents().contains("NCT00000002,\"Placebo\",,,,,,"));
}

#[test]
fn misspelled_ester_still_finds_its_class() {
    let buf = SharedBuf::default();
    run_pipeline(&buf, 1);
    let out = buf.contents();
    let row = out
        .lines()
        .find(|l| l.starts_with("NCT00000003"))
        .unwrap();
    // decanoate vs undecanoate: approximate, not exact.
    assert!(row.contains("D003"));
    assert!(row.contains("\"testosterone undecanoate\""));
    assert!(!row.contains("1.000,1.000,1.000"));
}

#[test]
fn repeated_runs_are_deterministic() {
    let a = SharedBuf::default();
    let b = SharedBuf::default();
    run_pipeline(&a, 1);
    run_pipeline(&b, 4);

    let contents_a = a.contents();
    let contents_b = b.contents();
    let mut lines_a: Vec<&str> = contents_a.lines().skip(1).collect();
    let mut lines_b: Vec<&str> = contents_b.lines().skip(1).collect();
    // Worker interleaving may reorder whole records, never rows within one.
    lines_a.sort_unstable();
    lines_b.sort_unstable();
    assert_eq!(lines_a, lines_b);
}

#[test]
fn json_stream_mirrors_the_csv_rows() {
    let csv = SharedBuf::default();
    let json = SharedBuf::default();
    let records = parse_records(ARCHIVE.as_bytes()).unwrap();
    let sink = OutputSink {
        match_writer: Some(MatchWriter::new(Box::new(csv.clone())).unwrap()),
        ..OutputSink::default()
    }
    .with_json(Box::new(json.clone()));
    let sink = Arc::new(Mutex::new(sink));
    let dispatcher = Dispatcher::new(
        dictionary(),
        Modifiers::default(),
        ScoringParams::default(),
        sink.clone(),
    );
    dispatcher.run(records);
    sink.lock().unwrap().finish().unwrap();

    let rows: serde_json::Value = serde_json::from_str(&json.contents()).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), csv.contents().lines().count() - 1);
    assert!(rows
        .iter()
        .any(|r| r["ct_id"] == "NCT00000001" && r["dict_id"] == "D001"));
}

#[test]
fn self_alignment_is_exact_for_every_synonym() {
    let params = ScoringParams::default();
    for (_, synonyms) in dictionary().entries() {
        for synonym in synonyms {
            let alignments = align(synonym.as_str(), synonym.as_str(), &params);
            let best = &alignments[0];
            assert_eq!(
                best.score,
                2 * synonym.as_str().chars().count() as i32
            );
            assert!(best.is_exact());
        }
    }
}

#[test]
fn overlapping_alignments_collapse_to_one() {
    let alignments = align(
        "testosterone undecanoate",
        "TESTOSTERONE DECANOATE",
        &ScoringParams::default(),
    );
    assert_eq!(alignments.len(), 1);
    assert!(alignments[0].similarity > 0.8);
}

#[test]
fn search_results_rank_similarity_first() {
    let dict = dictionary();
    let results = search_term(
        "testosterone",
        &dict,
        &Modifiers::default(),
        &ScoringParams::default(),
    )
    .unwrap();
    let candidates: Vec<&MatchCandidate> = results.candidates().iter().collect();
    for pair in candidates.windows(2) {
        assert!(pair[0].alignment.similarity >= pair[1].alignment.similarity);
    }
}

#[test]
fn modifier_file_drives_acceptance() {
    let mut dict = Dictionary::default();
    dict.insert("D010", "sodium chloride");
    let modifiers = load_modifiers("sodium 0.1\nchloride 0.1\n".as_bytes()).unwrap();
    let params = ScoringParams::default();

    // Down-weighted tokens cannot carry the candidate on their own.
    let weighted = search_term("sodium", &dict, &modifiers, &params);
    assert!(weighted.is_none());

    // The same search with neutral weights is accepted.
    let neutral = search_term("sodium", &dict, &Modifiers::default(), &params);
    assert!(neutral.is_some());
}
