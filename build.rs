// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("debrec")
        .version(env!("CARGO_PKG_VERSION"))
        .author("debrec Contributors")
        .about("Debian repository mirror and metadata recorder")
        .subcommand_required(false)
        .subcommand(
            Command::new("init")
                .about("Initialize the debrec database")
                .arg(
                    Arg::new("db_path")
                        .short('d')
                        .long("db-path")
                        .value_name("PATH")
                        .default_value("/var/lib/debrec/debrec.db")
                        .help("Database path"),
                ),
        )
        .subcommand(
            Command::new("create-cache")
                .about("Build the local package-list cache from scratch")
                .arg(
                    Arg::new("repository_root")
                        .required(true)
                        .help("Repository root URL"),
                )
                .arg(
                    Arg::new("cache_dir")
                        .short('c')
                        .long("cache-dir")
                        .default_value("/var/cache/debrec")
                        .help("Cache directory"),
                ),
        )
        .subcommand(
            Command::new("update-cache")
                .about("Refresh the cache and record every changed package list")
                .arg(
                    Arg::new("repository_root")
                        .required(true)
                        .help("Repository root URL"),
                )
                .arg(
                    Arg::new("cache_dir")
                        .short('c')
                        .long("cache-dir")
                        .default_value("/var/cache/debrec")
                        .help("Cache directory"),
                )
                .arg(
                    Arg::new("db_path")
                        .short('d')
                        .long("db-path")
                        .default_value("/var/lib/debrec/debrec.db"),
                ),
        )
        .subcommand(
            Command::new("fill")
                .about("Record every package list already present in the cache")
                .arg(
                    Arg::new("cache_dir")
                        .short('c')
                        .long("cache-dir")
                        .default_value("/var/cache/debrec")
                        .help("Cache directory"),
                )
                .arg(
                    Arg::new("db_path")
                        .short('d')
                        .long("db-path")
                        .default_value("/var/lib/debrec/debrec.db"),
                ),
        )
        .subcommand(
            Command::new("query")
                .about("Query recorded packages")
                .arg(Arg::new("name").help("Package name (optional)"))
                .arg(
                    Arg::new("db_path")
                        .short('d')
                        .long("db-path")
                        .default_value("/var/lib/debrec/debrec.db"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("debrec.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
