// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use debrec::repository::cache;
use debrec::repository::RepositoryClient;
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "debrec")]
#[command(author, version, about = "Debian repository mirror and metadata recorder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the debrec database
    Init {
        /// Database path (default: /var/lib/debrec/debrec.db)
        #[arg(short, long, default_value = "/var/lib/debrec/debrec.db")]
        db_path: String,
    },
    /// Build the local package-list cache from scratch
    CreateCache {
        /// Repository root URL (the directory holding `distributions`)
        repository_root: String,
        /// Cache directory
        #[arg(short, long, default_value = "/var/cache/debrec")]
        cache_dir: PathBuf,
    },
    /// Refresh the cache and record every changed package list
    UpdateCache {
        /// Repository root URL (the directory holding `distributions`)
        repository_root: String,
        /// Cache directory
        #[arg(short, long, default_value = "/var/cache/debrec")]
        cache_dir: PathBuf,
        /// Database path (default: /var/lib/debrec/debrec.db)
        #[arg(short, long, default_value = "/var/lib/debrec/debrec.db")]
        db_path: String,
    },
    /// Record every package list already present in the cache
    Fill {
        /// Cache directory
        #[arg(short, long, default_value = "/var/cache/debrec")]
        cache_dir: PathBuf,
        /// Database path (default: /var/lib/debrec/debrec.db)
        #[arg(short, long, default_value = "/var/lib/debrec/debrec.db")]
        db_path: String,
    },
    /// Query recorded packages
    Query {
        /// Package name (optional, lists all if omitted)
        name: Option<String>,
        /// Database path (default: /var/lib/debrec/debrec.db)
        #[arg(short, long, default_value = "/var/lib/debrec/debrec.db")]
        db_path: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn print_report(report: &debrec::recorder::sync::SyncReport) {
    println!("Sync complete:");
    println!("  Recorded:  {}", report.recorded);
    println!("  Updated:   {}", report.updated);
    println!("  Unchanged: {}", report.unchanged);
    println!("  Removed:   {}", report.removed);
    println!("  Failed:    {}", report.failed);
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { db_path }) => {
            info!("Initializing debrec database at: {}", db_path);
            debrec::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Some(Commands::CreateCache {
            repository_root,
            cache_dir,
        }) => {
            info!("Creating cache from {}", repository_root);
            let client = RepositoryClient::new()?;
            cache::create_cache(&client, &repository_root, &cache_dir)?;
            println!("Cache created at: {}", cache_dir.display());
            Ok(())
        }
        Some(Commands::UpdateCache {
            repository_root,
            cache_dir,
            db_path,
        }) => {
            info!("Updating cache from {}", repository_root);
            let conn = debrec::db::open(&db_path)?;
            let client = RepositoryClient::new()?;
            let report = cache::update_cache(&conn, &client, &repository_root, &cache_dir)?;
            print_report(&report);
            Ok(())
        }
        Some(Commands::Fill { cache_dir, db_path }) => {
            info!("Filling database from {}", cache_dir.display());
            let conn = debrec::db::open(&db_path)?;
            let report = debrec::recorder::sync::fill_db_from_cache(&conn, &cache_dir)?;
            print_report(&report);
            Ok(())
        }
        Some(Commands::Query { name, db_path }) => {
            let conn = debrec::db::open(&db_path)?;

            let packages = if let Some(name) = name {
                debrec::db::models::Package::find_by_name(&conn, &name)?
                    .into_iter()
                    .collect()
            } else {
                debrec::db::models::Package::list_all(&conn)?
            };

            if packages.is_empty() {
                println!("No packages found.");
            } else {
                println!("Recorded packages:");
                for package in &packages {
                    print!("  {}", package.name);
                    if let Some(section) = &package.section {
                        print!(" ({})", section);
                    }
                    println!();
                    for details in package.details(&conn)? {
                        println!(
                            "    {} [{}] in {}",
                            details.version.as_deref().unwrap_or("unknown"),
                            details.architecture,
                            details.distribution
                        );
                    }
                }
                println!("\nTotal: {} package(s)", packages.len());
            }

            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("debrec v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'debrec --help' for usage information");
            Ok(())
        }
    }
}
