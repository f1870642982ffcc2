//! Match and alignment output streams (CSV, free-form debug text, JSON).

use crate::models::{MatchCandidate, MatchRow, Record};
use std::collections::{BTreeSet, HashSet};
use std::io::{self, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// CSV stream of match rows. The header is written on construction.
pub struct MatchWriter {
    w: Box<dyn Write + Send>,
}

impl MatchWriter {
    pub fn new(mut w: Box<dyn Write + Send>) -> Result<Self, OutputError> {
        writeln!(w, "CT_ID,MATCH_TERM,DICT_ID,DICT_TERM,SCORE,GLOBAL,LOCAL")?;
        Ok(MatchWriter { w })
    }

    pub fn write_row(&mut self, row: &MatchRow) -> Result<(), OutputError> {
        match (&row.dict_id, &row.dict_term, row.score, row.global, row.local) {
            (Some(dict_id), Some(dict_term), Some(score), Some(global), Some(local)) => {
                writeln!(
                    self.w,
                    "{},\"{}\",{},\"{}\",{:.3},{:.3},{:.3}",
                    row.ct_id, row.match_term, dict_id, dict_term, score, global, local
                )?;
            }
            _ => {
                writeln!(self.w, "{},\"{}\",,,,,,", row.ct_id, row.match_term)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        Ok(self.w.flush()?)
    }
}

/// Free-form stream of rendered alignments for eyeballing match quality.
pub struct AlignWriter {
    w: Box<dyn Write + Send>,
}

impl AlignWriter {
    pub fn new(w: Box<dyn Write + Send>) -> Self {
        AlignWriter { w }
    }

    pub fn write_candidate(
        &mut self,
        record_id: &str,
        candidate: &MatchCandidate,
    ) -> Result<(), OutputError> {
        let aln = &candidate.alignment;
        writeln!(self.w, "++++ {:>12}: \"{}\"", record_id, candidate.term)?;
        writeln!(self.w, "---- {:>12}: \"{}\"", candidate.class_id, candidate.synonym)?;
        writeln!(self.w, "{}", aln.rendered)?;
        writeln!(
            self.w,
            "[{:.3},{:.3},{:.3}]",
            aln.global_sim, aln.local_sim, aln.similarity
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutputError> {
        Ok(self.w.flush()?)
    }
}

/// The sink every worker emits into. Each enabled stream is optional so a run
/// can produce any combination of CSV, alignment text and JSON.
#[derive(Default)]
pub struct OutputSink {
    pub match_writer: Option<MatchWriter>,
    pub align_writer: Option<AlignWriter>,
    pub json_rows: Option<Vec<MatchRow>>,
    pub json_out: Option<Box<dyn Write + Send>>,
}

impl OutputSink {
    pub fn with_json(mut self, w: Box<dyn Write + Send>) -> Self {
        self.json_rows = Some(Vec::new());
        self.json_out = Some(w);
        self
    }

    /// Emit one record's results. Candidate rows are de-duplicated by class
    /// id and capped; a record with no candidates gets one empty row per
    /// intervention term so downstream joins see every term.
    pub fn emit(
        &mut self,
        record: &Record,
        candidates: &BTreeSet<MatchCandidate>,
        max_candidates: usize,
    ) -> Result<(), OutputError> {
        if candidates.is_empty() {
            for term in &record.interventions {
                self.push_row(MatchRow::unmatched(&record.id, term))?;
            }
            return Ok(());
        }

        let cap = record.interventions.len().max(max_candidates);
        let mut unique = HashSet::new();
        for candidate in candidates {
            if let Some(align_writer) = self.align_writer.as_mut() {
                align_writer.write_candidate(&record.id, candidate)?;
            }
            if unique.insert(candidate.class_id.clone()) && unique.len() <= cap {
                self.push_row(MatchRow::from_candidate(&record.id, candidate))?;
            }
        }
        Ok(())
    }

    fn push_row(&mut self, row: MatchRow) -> Result<(), OutputError> {
        if let Some(match_writer) = self.match_writer.as_mut() {
            match_writer.write_row(&row)?;
        }
        if let Some(rows) = self.json_rows.as_mut() {
            rows.push(row);
        }
        Ok(())
    }

    /// Flush every stream and write the accumulated JSON rows.
    pub fn finish(&mut self) -> Result<(), OutputError> {
        if let Some(match_writer) = self.match_writer.as_mut() {
            match_writer.flush()?;
        }
        if let Some(align_writer) = self.align_writer.as_mut() {
            align_writer.flush()?;
        }
        if let (Some(rows), Some(out)) = (self.json_rows.as_ref(), self.json_out.as_mut()) {
            let json = serde_json::to_string_pretty(rows)?;
            out.write_all(json.as_bytes())?;
            out.flush()?;
        }
        Ok(())
    }
}
