//! The metadata refresh run: select stale videos, fetch their metadata, write the results to
//! files and back to the store.

use crate::{
    Result,
    db::{Store, UpdateSummary},
    fetch::{Fetcher, MetadataSource},
    models::MetadataRecord,
    util::{read_json, timestamped_file_name, write_json_pretty},
};
use chrono::{DateTime, Utc};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, warn};

pub static PROCESSED_FILE: &str = "youtube_data_processed.json";
pub static ERRORS_FILE: &str = "youtube_data_errors.json";
pub static UPDATE_ERRORS_PREFIX: &str = "update_errors";

#[derive(Debug, Clone)]
pub struct RefreshOpts {
    pub limit: usize,
    /// Metadata older than this is refreshed
    pub stale_after: Duration,
    pub output_dir: PathBuf,
    /// Fetch and write files, but leave the store as is
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RefreshSummary {
    pub selected: usize,
    pub fetched: usize,
    pub failures: usize,
    pub missing: usize,
    pub aborted: bool,
    pub processed_file: PathBuf,
    pub errors_file: Option<PathBuf>,
    /// None on dry runs
    pub written_back: Option<WriteBack>,
}

/// What happened to the records sent to the store
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WriteBack {
    pub updates: UpdateSummary,
    /// Only written when some updates failed
    pub errors_file: Option<PathBuf>,
}

pub async fn run<S, D>(store: &D, fetcher: &Fetcher<S>, opts: &RefreshOpts) -> Result<RefreshSummary>
where
    S: MetadataSource,
    D: Store,
{
    let stale_before = chrono::Duration::from_std(opts.stale_after)
        .ok()
        .and_then(|d| Utc::now().checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let ids = store.videos_needing_update(stale_before, opts.limit).await?;
    info!(count = ids.len(), "Videos needing a metadata update");

    let mut sum = RefreshSummary {
        selected: ids.len(),
        processed_file: opts.output_dir.join(PROCESSED_FILE),
        ..Default::default()
    };
    if ids.is_empty() {
        info!("Nothing to refresh");
        return Ok(sum);
    }

    let out = fetcher.fetch(&ids).await;
    sum.fetched = out.records.len();
    sum.failures = out.failures.len();
    sum.missing = out.missing.len();
    sum.aborted = out.aborted;

    fs::create_dir_all(&opts.output_dir)?;
    write_json_pretty(&sum.processed_file, &out.records)?;
    debug!(path = %sum.processed_file.display(), "Wrote processed records");

    let errors_file = opts.output_dir.join(ERRORS_FILE);
    if out.failures.is_empty() {
        // left over from an earlier run
        if errors_file.exists() {
            fs::remove_file(&errors_file)?;
        }
    } else {
        write_json_pretty(&errors_file, &out.failures)?;
        warn!(path = %errors_file.display(), failures = out.failures.len(), "Wrote fetch failures");
        sum.errors_file = Some(errors_file);
    }

    if opts.dry_run {
        info!("Dry run, not writing to the store");
    } else {
        sum.written_back = Some(write_back(store, &out.records, &opts.output_dir).await?);
    }

    Ok(sum)
}

async fn write_back<D: Store>(
    store: &D,
    records: &[MetadataRecord],
    error_dir: &Path,
) -> Result<WriteBack> {
    let updates = store.update_metadata(records).await?;
    info!(
        updated = updates.updated,
        skipped = updates.skipped,
        failed = updates.errors.len(),
        "Updated store"
    );
    if updates.skipped > 0 {
        warn!(skipped = updates.skipped, "Some records had no matching video");
    }

    let mut res = WriteBack {
        updates,
        errors_file: None,
    };
    if !res.updates.errors.is_empty() {
        fs::create_dir_all(error_dir)?;
        let p = error_dir.join(timestamped_file_name(UPDATE_ERRORS_PREFIX, Utc::now()));
        write_json_pretty(&p, &res.updates.errors)?;
        warn!(path = %p.display(), failed = res.updates.errors.len(), "Wrote update failures");
        res.errors_file = Some(p);
    }
    Ok(res)
}

/// Write a processed records file from an earlier run to the store. Failed updates go to a
/// timestamped file in error_dir.
pub async fn apply<D: Store>(store: &D, input: &Path, error_dir: &Path) -> Result<WriteBack> {
    let records: Vec<MetadataRecord> = read_json(input)?;
    info!(path = %input.display(), records = records.len(), "Applying records");
    write_back(store, &records, error_dir).await
}
