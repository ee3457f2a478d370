//! mysql-pg-migrate CLI - dependency-ordered MySQL to PostgreSQL migration.

use clap::{Parser, Subcommand};
use mysql_pg_migrate::core::Destination;
use mysql_pg_migrate::{
    ArtifactFormat, Config, Exporter, ImportReport, Importer, MigrateError, MysqlReader,
    PostgresDestination,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-pg-migrate")]
#[command(about = "Dependency-ordered MySQL to PostgreSQL migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export MySQL tables to artifact files
    Export {
        /// Override export directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Override artifact format (json or csv)
        #[arg(long)]
        format: Option<ArtifactFormat>,
    },

    /// Import artifact files into PostgreSQL in dependency order
    Import {
        /// Override export directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Override artifact format (json or csv)
        #[arg(long)]
        format: Option<ArtifactFormat>,

        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,
    },

    /// Export, then import
    Run {
        /// Override export directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Override artifact format (json or csv)
        #[arg(long)]
        format: Option<ArtifactFormat>,

        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,
    },

    /// Print the import order without moving any data
    Plan {
        /// Order the source tables instead of the destination tables
        #[arg(long)]
        source: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Returns `Ok(false)` when an import finished with failed tables.
async fn run() -> Result<bool, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Export { dir, format } => {
            apply_overrides(&mut config, dir, format, None);
            let source = Arc::new(MysqlReader::new(&config.source, config.export.workers).await?);
            let result = Exporter::new(source.clone(), config.export.clone())
                .with_ignore_list(config.import.clone())
                .run(cancel_token)
                .await;
            source.close().await;
            let report = result?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            }
            Ok(true)
        }

        Commands::Import {
            dir,
            format,
            target_schema,
        } => {
            apply_overrides(&mut config, dir, format, target_schema);
            let report = import(&config, cancel_token).await?;
            print_import_report(&report, cli.output_json)?;
            Ok(report.is_success())
        }

        Commands::Run {
            dir,
            format,
            target_schema,
        } => {
            apply_overrides(&mut config, dir, format, target_schema);

            let source = Arc::new(MysqlReader::new(&config.source, config.export.workers).await?);
            let exported = Exporter::new(source.clone(), config.export.clone())
                .with_ignore_list(config.import.clone())
                .run(cancel_token.clone())
                .await;
            source.close().await;
            let exported = exported?;
            info!(
                "Exported {} rows from {} tables",
                exported.rows_exported,
                exported.tables.len()
            );

            let report = import(&config, cancel_token).await?;
            print_import_report(&report, cli.output_json)?;
            Ok(report.is_success())
        }

        Commands::Plan { source } => {
            let order = if source {
                let reader = MysqlReader::new(&config.source, 1).await?;
                let order = mysql_pg_migrate::plan_order(&reader, &config.import).await;
                reader.close().await;
                order?
            } else {
                let destination = PostgresDestination::new(&config.target).await?;
                let order =
                    mysql_pg_migrate::plan_order(&destination.catalog(), &config.import).await;
                destination.close().await;
                order?
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&order)?);
            } else {
                for (i, table) in order.iter().enumerate() {
                    println!("{:>4}  {}", i + 1, table);
                }
            }
            Ok(true)
        }
    }
}

async fn import(config: &Config, cancel: CancellationToken) -> Result<ImportReport, MigrateError> {
    let destination = Arc::new(PostgresDestination::new(&config.target).await?);
    let result = Importer::new(
        Arc::new(destination.catalog()),
        destination.clone(),
        &config.export.dir,
    )
    .with_format(config.export.format)
    .with_import_config(config.import.clone())
    .run(cancel)
    .await;
    destination.close().await;
    result
}

fn apply_overrides(
    config: &mut Config,
    dir: Option<PathBuf>,
    format: Option<ArtifactFormat>,
    target_schema: Option<String>,
) {
    if let Some(dir) = dir {
        config.export.dir = dir;
    }
    if let Some(format) = format {
        config.export.format = format;
    }
    if let Some(schema) = target_schema {
        config.target.schema = schema;
    }
}

fn print_import_report(report: &ImportReport, as_json: bool) -> Result<(), MigrateError> {
    if as_json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    println!(
        "Import {}: {} rows inserted across {} tables in {:.1}s",
        if report.is_success() { "completed" } else { "failed" },
        report.rows_inserted,
        report.order.len(),
        report.duration_seconds
    );
    for table in &report.tables {
        match (&table.error, &table.reason) {
            (Some(err), _) => println!("  {:<32} {:?}  {}", table.name, table.status, err),
            (None, Some(reason)) => println!("  {:<32} {:?}  ({})", table.name, table.status, reason),
            (None, None) => println!(
                "  {:<32} {:?}  {} inserted, {} skipped",
                table.name, table.status, table.stats.rows_inserted, table.stats.rows_skipped
            ),
        }
    }
    if !report.is_success() {
        error!("Failed tables: {}", report.failed_tables().join(", "));
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// Running work stops at the next batch boundary; tables already imported
/// stay imported.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current batch...", name);
                    token.cancel();
                }
                Err(e) => error!("Failed to install {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
                token.cancel();
            }
            Err(e) => error!("Failed to install Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}
