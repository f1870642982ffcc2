//! Trialmatch pipeline: match clinical-trial intervention terms against a
//! drug dictionary and emit ranked match rows.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use trialmatch::prelude::*;

#[derive(Parser)]
#[command(name = "trialmatch")]
#[command(about = "Match clinical-trial intervention terms against a drug dictionary")]
#[command(version)]
struct Cli {
    /// Verbose logging (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full matching pipeline over a record archive
    ///
    /// Scoring parameters default to ScoringParams::default(); override any
    /// of them explicitly to customize behavior.
    Run {
        /// Dictionary file (`synonym<TAB>class` lines); empty dictionary if absent
        #[arg(long)]
        dict: Option<PathBuf>,

        /// Modifier weight file; no modifiers if absent
        #[arg(long)]
        modifiers: Option<PathBuf>,

        /// Record archive (.xml or .xml.gz); downloaded when absent
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Download URL used when no archive is given
        #[arg(long, default_value = DOWNLOAD_URL)]
        url: String,

        /// Number of worker threads
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,

        /// Match CSV output path
        #[arg(long, default_value = "crawler_match.csv")]
        match_out: PathBuf,

        /// Alignment debug output path (omitted: no alignment stream)
        #[arg(long)]
        align_out: Option<PathBuf>,

        /// Also write the match rows as JSON next to the CSV
        #[arg(long)]
        json: bool,

        /// Minimum global similarity [default: 0.2]
        #[arg(long)]
        min_global: Option<f64>,

        /// Minimum modifier-weighted local similarity [default: 0.9]
        #[arg(long)]
        min_weighted: Option<f64>,

        /// Per-record match row cap [default: 5]
        #[arg(long)]
        max_candidates: Option<usize>,

        /// Suppress progress output
        #[arg(long)]
        quiet: bool,
    },

    /// Align two strings and print every alignment with its scores
    Align {
        term: String,
        synonym: String,
    },

    /// Print intervention token frequencies from an archive
    Tokens {
        /// Record archive (.xml or .xml.gz)
        #[arg(long)]
        archive: PathBuf,

        /// Print only the N most frequent tokens
        #[arg(long)]
        top: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Run {
            dict,
            modifiers,
            archive,
            url,
            workers,
            match_out,
            align_out,
            json,
            min_global,
            min_weighted,
            max_candidates,
            quiet,
        } => {
            let defaults = ScoringParams::default();
            let params = ScoringParams {
                min_global: min_global.unwrap_or(defaults.min_global),
                min_weighted: min_weighted.unwrap_or(defaults.min_weighted),
                max_candidates: max_candidates.unwrap_or(defaults.max_candidates),
                ..defaults
            };

            let dictionary = match dict {
                Some(path) => load_dictionary(File::open(path)?)?,
                None => Dictionary::default(),
            };
            let modifiers = match modifiers {
                Some(path) => load_modifiers(File::open(path)?)?,
                None => Modifiers::default(),
            };

            // The temp file guard must outlive the parse.
            let mut downloaded: Option<tempfile::NamedTempFile> = None;
            let archive_path = match archive {
                Some(path) => path,
                None => {
                    let file = download_records(&url)?;
                    let path = file.path().to_path_buf();
                    downloaded = Some(file);
                    path
                }
            };
            let records = read_archive(&archive_path)?;
            drop(downloaded);

            let mut sink = OutputSink {
                match_writer: Some(MatchWriter::new(Box::new(File::create(&match_out)?))?),
                ..OutputSink::default()
            };
            if let Some(path) = align_out {
                sink.align_writer = Some(AlignWriter::new(Box::new(File::create(path)?)));
            }
            if json {
                let json_path = match_out.with_extension("json");
                sink = sink.with_json(Box::new(File::create(json_path)?));
            }
            let sink = Arc::new(Mutex::new(sink));

            let max_candidates = params.max_candidates;
            let dispatcher = Dispatcher::new(dictionary, modifiers, params, sink.clone())
                .with_workers(workers);

            let pb = if quiet {
                ProgressBar::hidden()
            } else {
                let pb = ProgressBar::new(records.len() as u64);
                pb.set_style(
                    ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} records")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                pb
            };
            let processed = dispatcher.run(pb.wrap_iter(records.into_iter()));
            pb.finish_and_clear();

            let mut sink = match sink.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            sink.finish()?;

            if !quiet {
                eprintln!(
                    "{} records processed (cap {} rows/record), match output: {}",
                    processed,
                    max_candidates,
                    match_out.display()
                );
            }
        }

        Commands::Align { term, synonym } => {
            let params = ScoringParams::default();
            let alignments = align(&term, &synonym, &params);
            if alignments.is_empty() {
                println!("no alignment");
            }
            for alignment in alignments {
                println!("{}", alignment.rendered);
                println!(
                    "score={} matches={} global={:.3} local={:.3} similarity={:.3}",
                    alignment.score,
                    alignment.matches,
                    alignment.global_sim,
                    alignment.local_sim,
                    alignment.similarity
                );
            }
        }

        Commands::Tokens { archive, top } => {
            let records = read_archive(&archive)?;
            let counts = count_term_tokens(&records);
            let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            if let Some(n) = top {
                counts.truncate(n);
            }
            for (token, count) in counts {
                println!("{:>8} {}", count, token);
            }
        }
    }

    Ok(())
}
