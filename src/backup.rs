//! Dump of the whole store to a JSON file.

use crate::{
    Result,
    db::Store,
    util::{timestamped_file_name, write_json_pretty},
};
use chrono::Utc;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

static BACKUP_PREFIX: &str = "backup_data";

#[derive(Debug, Clone, PartialEq)]
pub struct BackupSummary {
    pub videos: usize,
    pub watches: usize,
    pub file: PathBuf,
}

/// Write every video, with its watches, to backup_data_<timestamp>.json in output_dir
pub async fn run<D: Store>(store: &D, output_dir: &Path) -> Result<BackupSummary> {
    let videos = store.export().await?;
    let watches = videos.iter().map(|v| v.watches.len()).sum();

    fs::create_dir_all(output_dir)?;
    let file = output_dir.join(timestamped_file_name(BACKUP_PREFIX, Utc::now()));
    write_json_pretty(&file, &videos)?;
    info!(path = %file.display(), videos = videos.len(), watches, "Wrote backup");

    Ok(BackupSummary {
        videos: videos.len(),
        watches,
        file,
    })
}
