//! Extraction of watch history entries from a Google Takeout `watch-history.html` export.
//!
//! The document is loaded, cut into content cells, and each cell is mapped to zero or one
//! [`HistoryEntry`]. Cells that give no entry are kept as short previews for review.

use crate::{Result, models::HistoryEntry, util::progress_bar, util::write_json_pretty};
use scraper::Html;
use std::{
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info};

pub mod aggregate;
pub mod extract;
pub mod load;
pub mod segment;
pub mod timestamp;

pub use aggregate::{Aggregated, Aggregator};
pub use extract::extract_entry;

#[derive(Debug, Clone)]
pub struct ParseOpts {
    pub input: PathBuf,
    pub output: PathBuf,
    pub invalid_output: PathBuf,
    /// Where to keep temporary batch files. None keeps everything in memory.
    pub batch_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub max_entries: Option<usize>,
    /// Only hand the body of the document to the HTML parser
    pub body_only: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseSummary {
    pub valid: usize,
    pub invalid: usize,
    pub output: PathBuf,
    /// Set if there were invalid entries to write
    pub invalid_output: Option<PathBuf>,
}

/// Run all cells of the document through the extractor
pub fn extract_all(doc: &Html, max_entries: Option<usize>, mut agg: Aggregator) -> Result<Aggregated> {
    let limit = max_entries.unwrap_or(usize::MAX);
    let total = segment::count(doc).min(limit);
    info!(total, "Found potential entries");

    let pb = progress_bar(total as u64, agg.progress_enabled());
    for cell in segment::content_cells(doc).take(limit) {
        match extract_entry(&cell) {
            Some(entry) => agg.push(entry)?,
            None => agg.reject(&cell.text().collect::<Vec<_>>().join(" ")),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    debug!(valid = agg.accepted(), invalid = agg.rejected(), "Extraction done");

    agg.finish()
}

/// Load, extract and write everything according to opts
pub fn run(opts: &ParseOpts) -> Result<ParseSummary> {
    let start = Instant::now();
    info!(path = %opts.input.display(), "Reading history file");
    let raw = load::load(&opts.input)?;
    let doc = if opts.body_only {
        Html::parse_document(load::body(&raw))
    } else {
        Html::parse_document(&raw)
    };
    drop(raw);
    debug!("Parsed document in {:?}", start.elapsed());

    let agg = match opts.batch_dir.as_ref() {
        Some(dir) => Aggregator::with_batch_files(dir, opts.batch_size)?,
        None => Aggregator::in_memory(),
    }
    .show_progress(opts.show_progress);

    let out = extract_all(&doc, opts.max_entries, agg)?;
    write_entries(&opts.output, &out.entries)?;

    let invalid_output = aggregate::write_rejected(&opts.invalid_output, &out.rejected)?
        .then(|| opts.invalid_output.clone());

    info!(
        valid = out.entries.len(),
        invalid = out.rejected.len(),
        "Done in {:?}",
        start.elapsed()
    );

    Ok(ParseSummary {
        valid: out.entries.len(),
        invalid: out.rejected.len(),
        output: opts.output.clone(),
        invalid_output,
    })
}

pub fn write_entries<P: AsRef<Path>>(path: P, entries: &[HistoryEntry]) -> Result<()> {
    write_json_pretty(path, entries)
}
