// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    let root_arg = Arg::new("root")
        .short('r')
        .long("root")
        .value_name("DIR")
        .global(true)
        .help("Root directory holding the database and artifact cache");

    Command::new("cairn")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Cairn Contributors")
        .about("Package transaction engine with staged resolve/download/test/run execution")
        .arg(root_arg)
        .subcommand_required(false)
        .subcommand(Command::new("init").about("Initialize the package database"))
        .subcommand(
            Command::new("repo-add")
                .about("Add a repository")
                .arg(Arg::new("id").required(true).help("Repository id"))
                .arg(
                    Arg::new("url")
                        .required(true)
                        .help("Repository base URL (http(s), file, or absolute path)"),
                )
                .arg(
                    Arg::new("priority")
                        .short('p')
                        .long("priority")
                        .default_value("0")
                        .help("Priority (higher = preferred)"),
                )
                .arg(
                    Arg::new("nogpgcheck")
                        .long("nogpgcheck")
                        .action(clap::ArgAction::SetTrue)
                        .help("Skip artifact verification for this repository"),
                )
                .arg(
                    Arg::new("disabled")
                        .long("disabled")
                        .action(clap::ArgAction::SetTrue)
                        .help("Add the repository disabled"),
                ),
        )
        .subcommand(
            Command::new("repo-list")
                .about("List configured repositories")
                .arg(
                    Arg::new("all")
                        .short('a')
                        .long("all")
                        .action(clap::ArgAction::SetTrue)
                        .help("Show disabled repositories too"),
                ),
        )
        .subcommand(
            Command::new("repo-remove")
                .about("Remove a repository")
                .arg(Arg::new("id").required(true).help("Repository id")),
        )
        .subcommand(Command::new("sync").about("Load repository metadata and report package counts"))
        .subcommand(
            Command::new("search")
                .about("Search packages by name or summary")
                .arg(Arg::new("pattern").required(true).help("Search pattern")),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages from repositories")
                .arg(Arg::new("packages").required(true).num_args(1..).help("Package names")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(Arg::new("packages").required(true).num_args(1..).help("Package names")),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade installed packages (all of them if none given)")
                .arg(Arg::new("packages").num_args(0..).help("Package names")),
        )
        .subcommand(Command::new("history").about("Show changeset history"))
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

    let man_path = man_dir.join("cairn.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
