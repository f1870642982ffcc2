//! Bounded-queue dispatch of records across a fixed worker pool.
//!
//! The producer blocks when the channel is full, so memory stays bounded no
//! matter how large the record stream is. Workers drain the channel until the
//! producer drops its sender, which closes the channel and ends the run.

use crate::dict::{Dictionary, Modifiers};
use crate::models::{MatchCandidate, Record, ScoringParams, TermMatches};
use crate::output::OutputSink;
use crate::search::search_term;
use crossbeam_channel::{bounded, Receiver};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub const DEFAULT_WORKERS: usize = 2;
pub const QUEUE_CAPACITY: usize = 1000;

pub struct Dispatcher {
    dictionary: Arc<Dictionary>,
    modifiers: Arc<Modifiers>,
    params: ScoringParams,
    // term -> search result; None caches a miss so it is not recomputed.
    memo: Arc<Mutex<HashMap<String, Option<Arc<TermMatches>>>>>,
    sink: Arc<Mutex<OutputSink>>,
    workers: usize,
    queue_capacity: usize,
}

impl Dispatcher {
    pub fn new(
        dictionary: Dictionary,
        modifiers: Modifiers,
        params: ScoringParams,
        sink: Arc<Mutex<OutputSink>>,
    ) -> Self {
        Dispatcher {
            dictionary: Arc::new(dictionary),
            modifiers: Arc::new(modifiers),
            params,
            memo: Arc::new(Mutex::new(HashMap::new())),
            sink,
            workers: DEFAULT_WORKERS,
            queue_capacity: QUEUE_CAPACITY,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Feed every record through the pool. Returns the number of records
    /// processed by the workers.
    pub fn run<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = Record>,
    {
        let (tx, rx) = bounded::<Record>(self.queue_capacity);

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);
            for id in 0..self.workers {
                let rx = rx.clone();
                handles.push(scope.spawn(move || self.worker_loop(id, rx)));
            }
            drop(rx);

            for record in records {
                if tx.send(record).is_err() {
                    // Every worker is gone; nothing left to feed.
                    break;
                }
            }
            drop(tx);

            let mut processed = 0;
            for handle in handles {
                match handle.join() {
                    Ok(count) => processed += count,
                    Err(_) => warn!("worker panicked"),
                }
            }
            processed
        })
    }

    fn worker_loop(&self, id: usize, rx: Receiver<Record>) -> usize {
        debug!(worker = id, "worker started");
        let mut processed = 0;
        for record in rx.iter() {
            let candidates = self.match_record(&record);
            if candidates.is_empty() {
                debug!(worker = id, record = %record.id, "no match");
            } else {
                info!(
                    worker = id,
                    record = %record.id,
                    candidates = candidates.len(),
                    "matched"
                );
            }
            let mut sink = match self.sink.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(err) = sink.emit(&record, &candidates, self.params.max_candidates) {
                warn!(record = %record.id, error = %err, "emit failed");
            }
            processed += 1;
        }
        debug!(worker = id, processed, "worker finished");
        processed
    }

    /// Search every intervention term of a record, memoized, and union the
    /// results. When no intervention term matches anything, the record title
    /// is searched as a fallback.
    pub fn match_record(&self, record: &Record) -> BTreeSet<MatchCandidate> {
        let mut union = BTreeSet::new();
        for term in &record.interventions {
            if let Some(results) = self.lookup(term) {
                union.extend(results.candidates().iter().cloned());
            }
        }
        if union.is_empty() && !record.title.is_empty() {
            if let Some(results) = self.lookup(&record.title) {
                union.extend(results.candidates().iter().cloned());
            }
        }
        union
    }

    fn lookup(&self, term: &str) -> Option<Arc<TermMatches>> {
        {
            let memo = match self.memo.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(cached) = memo.get(term) {
                return cached.clone();
            }
        }
        // Compute outside the lock; a concurrent duplicate is wasted work,
        // not an error. First install wins.
        let computed = search_term(term, &self.dictionary, &self.modifiers, &self.params)
            .map(Arc::new);
        let mut memo = match self.memo.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        memo.entry(term.to_string()).or_insert(computed).clone()
    }
}
