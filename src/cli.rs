use anyhow::{Error, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel, log::LevelFilter};
use std::{io, path::PathBuf, time::Duration};
use tracing_subscriber::filter::LevelFilter as TFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Normal,
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None, propagate_version = true, long_version = crate::build::CLAP_LONG_VERSION)]
pub struct Cli {
    /// Log level verbosity
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Which log formatter to use
    // env will pick up the value if the field name is given as the key in uppercase
    #[arg(short = 'f', long, env, default_value_t, value_enum, global = true)]
    pub log_format: LogFormat,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Extract watch history entries from a Takeout HTML export into JSON
    Parse(ParseArgs),
    /// Fetch metadata for videos that lack it or have stale metadata
    Refresh(RefreshArgs),
    /// Import extracted watch history JSON into the DB
    Import(ImportArgs),
    /// Write a processed metadata file from an earlier refresh to the DB
    Apply(ApplyArgs),
    /// Dump all videos and watches from the DB to a JSON file
    Backup(BackupArgs),
    /// Create or update the DB schema
    Migrate {
        #[command(flatten)]
        db: DbArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ParseArgs {
    /// Takeout watch history HTML file
    #[arg(
        short,
        long,
        env = "YOUTUBE_HISTORY_FILE",
        default_value = "./watch-history-snippet.html"
    )]
    pub input: PathBuf,

    /// Where to write the entries
    #[arg(short, long, default_value = "watch-history.json")]
    pub output: PathBuf,

    /// Where to write previews of fragments that gave no entry
    #[arg(long, default_value = "invalid-entries.txt")]
    pub invalid_output: PathBuf,

    /// Directory for temporary batch files [default: "batches" next to the output file]
    #[arg(long)]
    pub batch_dir: Option<PathBuf>,

    /// Entries per batch file
    #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_size: u32,

    /// Keep all entries in memory instead of using batch files
    #[arg(long, conflicts_with = "batch_dir")]
    pub no_batch_files: bool,

    /// Stop after this many fragments
    #[arg(short, long)]
    pub max_entries: Option<usize>,

    /// Hand the whole document to the HTML parser, not just the body
    #[arg(long)]
    pub full_document: bool,

    /// Do not show a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl ParseArgs {
    pub fn batch_dir(&self) -> Option<PathBuf> {
        if self.no_batch_files {
            return None;
        }
        self.batch_dir.clone().or_else(|| {
            Some(
                self.output
                    .parent()
                    .map(|p| p.join("batches"))
                    .unwrap_or_else(|| PathBuf::from("batches")),
            )
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct DbArgs {
    /// Postgres connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Max number of DB connections
    #[arg(long, default_value_t = 2)]
    pub max_connections: u32,

    /// How long to wait for a DB connection
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    pub db_timeout: Duration,
}

#[derive(Debug, Clone, Args)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// YouTube Data API key
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// videos.list endpoint
    #[arg(long, default_value = crate::fetch::youtube::DEFAULT_BASE_URL)]
    pub api_url: Url,

    /// Max number of videos to refresh
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,

    /// Ids per request, at most 50
    #[arg(short, long, default_value_t = 50)]
    pub chunk_size: usize,

    /// Pause between requests
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub request_delay: Duration,

    /// Timeout for each request, 0s for none
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Refresh metadata older than this
    #[arg(long, default_value = "30days", value_parser = humantime::parse_duration)]
    pub stale_after: Duration,

    /// Where to write processed records and errors
    #[arg(short, long, default_value = "data/youtube")]
    pub output_dir: PathBuf,

    /// Fetch and write files, but do not update the DB
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Watch history JSON from the parse command
    #[arg(short, long, default_value = "watch-history.json")]
    pub input: PathBuf,

    /// Where to write entries that could not be imported
    #[arg(long, default_value = ".")]
    pub error_dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Processed metadata JSON from the refresh command
    #[arg(short, long, default_value = "data/youtube/youtube_data_processed.json")]
    pub input: PathBuf,

    /// Where to write records the DB refused
    #[arg(long, default_value = ".")]
    pub error_dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct BackupArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Directory for the backup file
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,
}

impl Cli {
    /// Wrapper for clap::Parser::try_parse_from
    pub fn try_parse_opts<I, T>(itr: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(itr).map_err(Error::from)
    }

    // this thin wrapper makes it possible to do the parsing without importing clap::Parser at the
    // call site
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Maps clap_verbosity_flag::LevelFilter values to tracing_subscriber::filter::LevelFilter
    /// values
    fn tracing_level_filter(&self) -> TFilter {
        match self.verbosity.log_level_filter() {
            LevelFilter::Off => TFilter::OFF,
            LevelFilter::Error => TFilter::ERROR,
            LevelFilter::Warn => TFilter::WARN,
            LevelFilter::Info => TFilter::INFO,
            LevelFilter::Debug => TFilter::DEBUG,
            LevelFilter::Trace => TFilter::TRACE,
        }
    }

    pub fn init_logger(&self) -> Result<()> {
        let layer = match self.log_format {
            LogFormat::Json => fmt::layer().json().with_writer(io::stderr).boxed(),
            LogFormat::Pretty => fmt::layer().pretty().with_writer(io::stderr).boxed(),
            LogFormat::Compact => fmt::layer()
                .without_time()
                .compact()
                .with_writer(io::stderr)
                .boxed(),
            LogFormat::Normal => fmt::layer().with_writer(io::stderr).boxed(),
        };
        tracing_subscriber::registry()
            .with(
                EnvFilter::builder()
                    .with_default_directive(self.tracing_level_filter().into())
                    .from_env()?,
            )
            .with(layer)
            .init();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let cli = Cli::try_parse_opts(["tubelog", "parse", "-o", "out/history.json"]).unwrap();
        let Commands::Parse(args) = cli.command else {
            panic!("expected parse command");
        };
        assert_eq!(100, args.batch_size);
        assert_eq!(Some(PathBuf::from("out/batches")), args.batch_dir());
        assert_eq!(None, args.max_entries);
        assert!(!args.full_document);
    }

    #[test]
    fn parse_without_batch_files() {
        let cli = Cli::try_parse_opts(["tubelog", "parse", "--no-batch-files"]).unwrap();
        let Commands::Parse(args) = cli.command else {
            panic!("expected parse command");
        };
        assert_eq!(None, args.batch_dir());
        assert!(
            Cli::try_parse_opts(["tubelog", "parse", "--no-batch-files", "--batch-dir", "x"])
                .is_err()
        );
        assert!(Cli::try_parse_opts(["tubelog", "parse", "-b", "0"]).is_err());
    }

    #[test]
    fn refresh_durations() {
        let cli = Cli::try_parse_opts([
            "tubelog",
            "refresh",
            "--database-url",
            "postgres://localhost/tubelog",
            "--api-key",
            "k",
            "--request-delay",
            "250ms",
            "--stale-after",
            "7days",
            "--dry-run",
        ])
        .unwrap();
        let Commands::Refresh(args) = cli.command else {
            panic!("expected refresh command");
        };
        assert_eq!(Duration::from_millis(250), args.request_delay);
        assert_eq!(Duration::from_secs(7 * 86_400), args.stale_after);
        assert_eq!(Duration::from_secs(30), args.request_timeout);
        assert_eq!(50, args.limit);
        assert!(args.dry_run);
        assert_eq!("www.googleapis.com", args.api_url.host_str().unwrap());
    }

    #[test]
    fn apply_and_backup_dirs() {
        let url = "postgres://localhost/tubelog";
        let cli = Cli::try_parse_opts(["tubelog", "apply", "--database-url", url]).unwrap();
        let Commands::Apply(args) = cli.command else {
            panic!("expected apply command");
        };
        assert_eq!(PathBuf::from("."), args.error_dir);

        let cli =
            Cli::try_parse_opts(["tubelog", "backup", "--database-url", url, "-o", "backups"])
                .unwrap();
        let Commands::Backup(args) = cli.command else {
            panic!("expected backup command");
        };
        assert_eq!(PathBuf::from("backups"), args.output_dir);
        assert_eq!(2, args.db.max_connections);
    }
}
