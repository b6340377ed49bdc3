// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use pkgcore::config::DEFAULT_CONFFILE;
use pkgcore::db::StateStore;
use pkgcore::events::{Phase, Reporter, StateEvent};
use pkgcore::packages::archive::{PACKAGE_PROPS, read_member};
use pkgcore::packages::{PackageProps, PackageRecord, TransactionType};
use pkgcore::repository::RepositoryPool;
use pkgcore::transaction::Transaction;
use pkgcore::unpack::Unpacker;
use pkgcore::{Config, Error};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "pkgcore")]
#[command(author, version, about = "Binary package installation core", long_about = None)]
struct Cli {
    /// Root directory packages are installed into
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file (default: /etc/pkgcore.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Package database path (default: <root>/var/db/pkgcore/pkgdb.sqlite)
    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the package database
    Init,
    /// Add a local repository
    RepoAdd {
        /// Repository name
        name: String,
        /// Directory holding index.json and the binary packages
        location: String,
        /// Priority (higher is consulted first)
        #[arg(short, long, default_value_t = 0)]
        priority: i32,
        /// Add the repository disabled
        #[arg(long)]
        disabled: bool,
    },
    /// List repositories
    RepoList,
    /// Remove a repository
    RepoRemove {
        /// Repository name
        name: String,
    },
    /// Enable a repository
    RepoEnable {
        /// Repository name
        name: String,
    },
    /// Disable a repository
    RepoDisable {
        /// Repository name
        name: String,
    },
    /// Find a package in the repository pool
    Find {
        /// Package name, pattern or pkgver
        package: String,
        /// Treat the query as a package pattern
        #[arg(long)]
        pattern: bool,
        /// Search every repository for the newest version
        #[arg(long)]
        best: bool,
    },
    /// Install packages from the repository pool
    Install {
        /// Package names, patterns or pkgvers
        #[arg(required = true)]
        packages: Vec<String>,
        /// Install again even if already up to date
        #[arg(long)]
        reinstall: bool,
    },
    /// Update one or all installed packages
    Update {
        /// Package to update (all if omitted)
        package: Option<String>,
    },
    /// Unpack a local binary package file
    Unpack {
        /// Path to the binary package
        archive: PathBuf,
    },
    /// Show the install state of a package
    State {
        /// Package name
        pkgname: String,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Prints state events to the terminal
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, event: &StateEvent) {
        let message = event.message.as_deref().unwrap_or_default();
        match event.phase {
            Phase::Unpack => println!("{}-{}: unpacking ...", event.pkgname, event.version),
            Phase::UnpackFail | Phase::RemoveFileObsoleteFail => {
                eprintln!("ERROR: {} (code {})", message, event.code)
            }
            Phase::ConfigFile | Phase::RemoveFileObsolete => {
                println!("{}-{}: {}", event.pkgname, event.version, message)
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let default_conffile = Path::new(DEFAULT_CONFFILE);
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None if default_conffile.exists() => Config::load(default_conffile)?,
        None => Config::default(),
    };

    if let Some(root) = &cli.root {
        config = config.with_rootdir(root);
    }
    if let Some(db_path) = &cli.db_path {
        config = config.with_db_path(db_path);
    }
    Ok(config)
}

/// Record for a local binary package file, described by its own props.json
fn local_record(conn: &rusqlite::Connection, archive: &Path) -> Result<PackageRecord> {
    let props = read_member(archive, PACKAGE_PROPS)?
        .ok_or_else(|| Error::InvalidPackage(archive.display().to_string()))?;
    let props = PackageProps::from_slice(&props)?;

    let filename = archive
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid package path: {}", archive.display()))?;
    let location = archive
        .parent()
        .map(|dir| dir.to_string_lossy().to_string())
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| ".".to_string());

    let mut record = PackageRecord::from_props(&props, &filename);
    record.repository = Some(location);
    record.transaction = Some(match conn.state(&record.pkgname)? {
        pkgcore::db::PkgState::NotInstalled => TransactionType::Install,
        _ => TransactionType::Update,
    });
    Ok(record)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(&cli)?;
    let db_path = config.pkgdb_path();

    match cli.command {
        Some(Commands::Init) => {
            info!("Initializing package database at: {}", db_path.display());
            pkgcore::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path.display());
            Ok(())
        }
        Some(Commands::RepoAdd {
            name,
            location,
            priority,
            disabled,
        }) => {
            let conn = pkgcore::db::open(&db_path)?;
            let repo = pkgcore::repository::add_repository(&conn, name, location, !disabled, priority)?;
            println!("Added repository: {} ({})", repo.name, repo.location);
            Ok(())
        }
        Some(Commands::RepoList) => {
            let conn = pkgcore::db::open(&db_path)?;
            let repos = pkgcore::repository::list_repositories(&conn)?;

            if repos.is_empty() {
                println!("No repositories configured.");
            } else {
                println!("Repositories:");
                for repo in &repos {
                    println!(
                        "  [{}] {} {} (priority {})",
                        if repo.enabled { "x" } else { " " },
                        repo.name,
                        repo.location,
                        repo.priority
                    );
                }
            }
            Ok(())
        }
        Some(Commands::RepoRemove { name }) => {
            let conn = pkgcore::db::open(&db_path)?;
            pkgcore::repository::remove_repository(&conn, &name)?;
            println!("Removed repository: {}", name);
            Ok(())
        }
        Some(Commands::RepoEnable { name }) => {
            let conn = pkgcore::db::open(&db_path)?;
            pkgcore::repository::set_repository_enabled(&conn, &name, true)?;
            println!("Repository '{}' enabled", name);
            Ok(())
        }
        Some(Commands::RepoDisable { name }) => {
            let conn = pkgcore::db::open(&db_path)?;
            pkgcore::repository::set_repository_enabled(&conn, &name, false)?;
            println!("Repository '{}' disabled", name);
            Ok(())
        }
        Some(Commands::Find {
            package,
            pattern,
            best,
        }) => {
            let conn = pkgcore::db::open(&db_path)?;
            let pool = RepositoryPool::from_db(&config, &conn)?;

            let found = match pool.find_pkg(&package, pattern, best)? {
                Some(pkg) => Some(pkg),
                None => pool.find_virtualpkg(&package, pattern)?,
            };
            match found {
                Some(pkg) => {
                    println!("{}", pkg.pkgver);
                    if let Some(desc) = &pkg.short_desc {
                        println!("  {}", desc);
                    }
                    println!("  Repository: {}", pkg.repository.as_deref().unwrap_or("-"));
                    println!("  File: {}", pkg.filename);
                    Ok(())
                }
                None => Err(anyhow::anyhow!("Package '{}' not found", package)),
            }
        }
        Some(Commands::Install {
            packages,
            reinstall,
        }) => {
            let conn = pkgcore::db::open_or_init(&db_path)?;
            let pool = RepositoryPool::from_db(&config, &conn)?;
            let mut trans = Transaction::new(&conn, &pool);

            for pkg in &packages {
                match trans.install_pkg(pkg, reinstall) {
                    Ok(()) => {}
                    Err(Error::ExistsError(msg)) => println!("{}", msg),
                    Err(e) => return Err(e.into()),
                }
            }

            let unpacker = Unpacker::new(&config, &conn).with_reporter(&ConsoleReporter);
            let results = trans.commit(&unpacker)?;
            println!("{} package(s) unpacked.", results.len());
            Ok(())
        }
        Some(Commands::Update { package }) => {
            let conn = pkgcore::db::open(&db_path)?;
            let pool = RepositoryPool::from_db(&config, &conn)?;
            let mut trans = Transaction::new(&conn, &pool);

            let queued = match &package {
                Some(pkg) => trans.update_pkg(pkg),
                None => trans.update_packages(),
            };
            match queued {
                Ok(()) => {}
                Err(Error::ExistsError(msg)) => {
                    println!("{}", msg);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let unpacker = Unpacker::new(&config, &conn).with_reporter(&ConsoleReporter);
            for (pkgver, summary) in trans.commit(&unpacker)? {
                println!(
                    "{}: {} file(s) written, {} unchanged, {} obsolete removed",
                    pkgver, summary.extracted, summary.skipped, summary.obsoletes_removed
                );
            }
            Ok(())
        }
        Some(Commands::Unpack { archive }) => {
            let conn = pkgcore::db::open_or_init(&db_path)?;
            let record = local_record(&conn, &archive)?;

            let unpacker = Unpacker::new(&config, &conn).with_reporter(&ConsoleReporter);
            let summary = unpacker.unpack_binary_pkg(&record)?;
            println!(
                "{}: {} file(s) written, {} unchanged, {} configuration file(s) kept",
                record.pkgver, summary.extracted, summary.skipped, summary.conf_kept
            );
            Ok(())
        }
        Some(Commands::State { pkgname }) => {
            let conn = pkgcore::db::open(&db_path)?;
            println!("{}: {}", pkgname, conn.state(&pkgname)?);
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pkgcore", &mut std::io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("pkgcore v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pkgcore --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "pkgcore", "find", "foo>=1.0", "--pattern", "--best", "--root", "/mnt",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/mnt")));
        assert!(matches!(
            cli.command,
            Some(Commands::Find {
                pattern: true,
                best: true,
                ..
            })
        ));
    }

    #[test]
    fn test_install_requires_package() {
        assert!(Cli::try_parse_from(["pkgcore", "install"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
