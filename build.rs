// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("pkgcore")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgcore Contributors")
        .about("Binary package installation core")
        .subcommand_required(false)
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .global(true)
                .help("Root directory packages are installed into"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Configuration file (default: /etc/pkgcore.toml when present)"),
        )
        .arg(
            Arg::new("db_path")
                .short('d')
                .long("db-path")
                .value_name("PATH")
                .global(true)
                .help("Package database path"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug output"),
        )
        .subcommand(Command::new("init").about("Initialize the package database"))
        .subcommand(
            Command::new("repo-add")
                .about("Add a local repository")
                .arg(Arg::new("name").required(true).help("Repository name"))
                .arg(
                    Arg::new("location")
                        .required(true)
                        .help("Directory holding index.json and the binary packages"),
                )
                .arg(
                    Arg::new("priority")
                        .short('p')
                        .long("priority")
                        .default_value("0")
                        .help("Priority (higher is consulted first)"),
                )
                .arg(
                    Arg::new("disabled")
                        .long("disabled")
                        .action(ArgAction::SetTrue)
                        .help("Add the repository disabled"),
                ),
        )
        .subcommand(Command::new("repo-list").about("List repositories"))
        .subcommand(
            Command::new("repo-remove")
                .about("Remove a repository")
                .arg(Arg::new("name").required(true).help("Repository name")),
        )
        .subcommand(
            Command::new("repo-enable")
                .about("Enable a repository")
                .arg(Arg::new("name").required(true).help("Repository name")),
        )
        .subcommand(
            Command::new("repo-disable")
                .about("Disable a repository")
                .arg(Arg::new("name").required(true).help("Repository name")),
        )
        .subcommand(
            Command::new("find")
                .about("Find a package in the repository pool")
                .arg(Arg::new("package").required(true).help("Package name, pattern or pkgver"))
                .arg(
                    Arg::new("pattern")
                        .long("pattern")
                        .action(ArgAction::SetTrue)
                        .help("Treat the query as a package pattern"),
                )
                .arg(
                    Arg::new("best")
                        .long("best")
                        .action(ArgAction::SetTrue)
                        .help("Search every repository for the newest version"),
                ),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages from the repository pool")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names, patterns or pkgvers"),
                )
                .arg(
                    Arg::new("reinstall")
                        .long("reinstall")
                        .action(ArgAction::SetTrue)
                        .help("Install again even if already up to date"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Update one or all installed packages")
                .arg(Arg::new("package").help("Package to update (all if omitted)")),
        )
        .subcommand(
            Command::new("unpack")
                .about("Unpack a local binary package file")
                .arg(Arg::new("archive").required(true).help("Path to the binary package")),
        )
        .subcommand(
            Command::new("state")
                .about("Show the install state of a package")
                .arg(Arg::new("pkgname").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Target shell"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pkgcore.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
