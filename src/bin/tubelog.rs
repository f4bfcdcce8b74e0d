use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing::{debug, info};
use tubelog::{
    backup,
    cli::{self, Commands, DbArgs},
    client,
    db::PgStore,
    fetch::{Fetcher, YouTubeSource},
    history, import, refresh,
};

#[cfg(all(target_env = "musl", target_pointer_width = "64"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

// Bad or missing input, nothing was done
static EXIT_STARTUP: u8 = 2;

// Everything runs in sequence, so a single thread is all we need
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = cli::Cli::parse_args();
    if let Err(err) = cli.init_logger() {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }
    debug!(version = tubelog::build::PKG_VERSION, "Starting");

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_code(&err)
        }
    }
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    let startup = err
        .downcast_ref::<tubelog::Error>()
        .is_some_and(tubelog::Error::is_startup);
    if startup {
        ExitCode::from(EXIT_STARTUP)
    } else {
        ExitCode::FAILURE
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Parse(args) => parse(args),
        Commands::Refresh(args) => {
            let store = connect(&args.db).await?;
            let res = run_refresh(&store, args).await;
            store.close().await;
            res
        }
        Commands::Import(args) => {
            let store = connect(&args.db).await?;
            let res = import::run(
                &store,
                &import::ImportOpts {
                    input: args.input,
                    error_dir: args.error_dir,
                },
            )
            .await;
            store.close().await;
            let sum = res?;
            println!(
                "Imported {} of {} entries: {} new videos, {} watches",
                sum.entries - sum.failed,
                sum.entries,
                sum.imported.videos,
                sum.imported.watches
            );
            if let Some(p) = sum.errors_file {
                println!("Failed entries written to {}", p.display());
            }
            Ok(())
        }
        Commands::Apply(args) => {
            let store = connect(&args.db).await?;
            let res = refresh::apply(&store, &args.input, &args.error_dir).await;
            store.close().await;
            print_write_back(&res?);
            Ok(())
        }
        Commands::Backup(args) => {
            let store = connect(&args.db).await?;
            let res = backup::run(&store, &args.output_dir).await;
            store.close().await;
            let sum = res?;
            println!(
                "Backed up {} videos and {} watches to {}",
                sum.videos,
                sum.watches,
                sum.file.display()
            );
            Ok(())
        }
        Commands::Migrate { db } => {
            let store = connect(&db).await?;
            let res = store.migrate().await;
            store.close().await;
            res?;
            println!("DB schema is up to date");
            Ok(())
        }
    }
}

async fn connect(db: &DbArgs) -> Result<PgStore> {
    PgStore::connect(&db.database_url, db.max_connections, db.db_timeout)
        .await
        .context("failed to connect to the DB")
}

fn parse(args: cli::ParseArgs) -> Result<()> {
    let opts = history::ParseOpts {
        batch_dir: args.batch_dir(),
        input: args.input,
        output: args.output,
        invalid_output: args.invalid_output,
        batch_size: args.batch_size as usize,
        max_entries: args.max_entries,
        body_only: !args.full_document,
        show_progress: !args.no_progress,
    };
    let sum = history::run(&opts)?;
    println!(
        "Extracted {} entries to {}",
        sum.valid,
        sum.output.display()
    );
    if let Some(p) = sum.invalid_output {
        println!("{} invalid entries written to {}", sum.invalid, p.display());
    }
    Ok(())
}

async fn run_refresh(store: &PgStore, args: cli::RefreshArgs) -> Result<()> {
    let client = client::Client::build(client::Opts {
        request_timeout: args.request_timeout,
    })?;
    let source = YouTubeSource::new(client, args.api_key, args.api_url);
    let fetcher = Fetcher::new(source, args.chunk_size, args.request_delay);
    let opts = refresh::RefreshOpts {
        limit: args.limit,
        stale_after: args.stale_after,
        output_dir: args.output_dir,
        dry_run: args.dry_run,
    };

    let sum = refresh::run(store, &fetcher, &opts).await?;
    info!(?sum, "Refresh done");
    println!(
        "Selected {} videos, fetched {}, {} failures, {} not found",
        sum.selected, sum.fetched, sum.failures, sum.missing
    );
    if sum.aborted {
        println!("Stopped early after a failed request");
    }
    if sum.fetched > 0 {
        println!("Records written to {}", sum.processed_file.display());
    }
    if let Some(p) = sum.errors_file {
        println!("Failures written to {}", p.display());
    }
    if let Some(w) = sum.written_back {
        print_write_back(&w);
    }
    Ok(())
}

fn print_write_back(w: &refresh::WriteBack) {
    println!(
        "Updated {} videos, skipped {}, {} failed",
        w.updates.updated,
        w.updates.skipped,
        w.updates.errors.len()
    );
    if let Some(p) = &w.errors_file {
        println!("Failed updates written to {}", p.display());
    }
}
