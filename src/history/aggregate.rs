use crate::{
    Result,
    models::HistoryEntry,
    util::{progress_bar, read_json, reduce_whitespace, truncate_chars, write_json_pretty},
};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

/// How much of a rejected fragment's text to keep for the diagnostics file
pub const PREVIEW_CHARS: usize = 100;

static BATCH_FILE_PREFIX: &str = "watch-history-batch-";

/// Collects extracted entries and previews of rejected fragments.
/// With a batch dir set, entries are flushed to numbered JSON files every batch_size entries,
/// and read back in order by finish().
#[derive(Debug)]
pub struct Aggregator {
    batch_dir: Option<PathBuf>,
    batch_size: usize,
    current: Vec<HistoryEntry>,
    batch_files: Vec<PathBuf>,
    rejected: Vec<String>,
    accepted: usize,
    show_progress: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Aggregated {
    pub entries: Vec<HistoryEntry>,
    pub rejected: Vec<String>,
}

impl Aggregator {
    pub fn in_memory() -> Self {
        Self {
            batch_dir: None,
            batch_size: usize::MAX,
            current: Vec::new(),
            batch_files: Vec::new(),
            rejected: Vec::new(),
            accepted: 0,
            show_progress: false,
        }
    }

    pub fn with_batch_files<P: AsRef<Path>>(dir: P, batch_size: usize) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let batch_size = batch_size.max(1);
        Ok(Self {
            batch_dir: Some(dir.to_path_buf()),
            batch_size,
            current: Vec::with_capacity(batch_size),
            ..Self::in_memory()
        })
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn push(&mut self, entry: HistoryEntry) -> Result<()> {
        self.current.push(entry);
        self.accepted += 1;
        if self.batch_dir.is_some() && self.current.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Keep a one-line preview of the text of a fragment that gave no entry
    pub fn reject(&mut self, fragment_text: &str) {
        let text = reduce_whitespace(fragment_text);
        self.rejected
            .push(truncate_chars(&text, PREVIEW_CHARS).to_string());
    }

    pub fn progress_enabled(&self) -> bool {
        self.show_progress
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn rejected(&self) -> usize {
        self.rejected.len()
    }

    fn flush(&mut self) -> Result<()> {
        let Some(dir) = self.batch_dir.as_ref() else {
            return Ok(());
        };
        if self.current.is_empty() {
            return Ok(());
        }
        let path = dir.join(format!(
            "{}{:06}.json",
            BATCH_FILE_PREFIX,
            self.batch_files.len() + 1
        ));
        trace!(path = %path.display(), entries = self.current.len(), "Saving batch");
        write_json_pretty(&path, &self.current)?;
        self.current.clear();
        self.batch_files.push(path);
        Ok(())
    }

    /// Merge all batches, in the order they were written, and remove the batch files once
    /// everything has been read back.
    pub fn finish(mut self) -> Result<Aggregated> {
        self.flush()?;
        let Some(dir) = self.batch_dir.take() else {
            return Ok(Aggregated {
                entries: self.current,
                rejected: self.rejected,
            });
        };

        debug!(files = self.batch_files.len(), "Merging batch files");
        let pb = progress_bar(self.batch_files.len() as u64, self.show_progress);
        let mut entries = Vec::with_capacity(self.accepted);
        for p in &self.batch_files {
            let mut batch: Vec<HistoryEntry> = read_json(p)?;
            entries.append(&mut batch);
            pb.inc(1);
        }
        pb.finish_and_clear();

        for p in &self.batch_files {
            fs::remove_file(p)?;
        }
        if fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
        }

        Ok(Aggregated {
            entries,
            rejected: self.rejected,
        })
    }
}

/// Write the previews one per line. Nothing is written for an empty list, and the return value
/// tells if the file was written.
pub fn write_rejected<P: AsRef<Path>>(path: P, rejected: &[String]) -> Result<bool> {
    if rejected.is_empty() {
        return Ok(false);
    }
    let mut f = BufWriter::new(File::create(path)?);
    for r in rejected {
        writeln!(f, "{r}")?;
    }
    f.flush()?;
    Ok(true)
}
