use reqwest::StatusCode;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The history document does not exist
    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),
    /// The history document exists, but has no content
    #[error("input file is empty: {}", .0.display())]
    EmptyInput(PathBuf),
    /// The metadata source answered, but not with a success status
    #[error("metadata source returned {status}: {message}")]
    Source { status: StatusCode, message: String },
    #[error("request to metadata source failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("an error occurred with the database")]
    Sqlx(#[from] sqlx::Error),
    #[error("database migration failed")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl Error {
    /// Whether this error stops a run before any work is done
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::MissingInput(_) | Self::EmptyInput(_))
    }
}
