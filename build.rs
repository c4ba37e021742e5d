// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn pattern_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(Arg::new("pattern").required(true).help("Shell-style name pattern"))
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .global(true)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("sprig")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Sprig Contributors")
        .about("Lightweight package manager for embedded Linux systems")
        .subcommand_required(true)
        .arg(
            Arg::new("conf")
                .short('f')
                .long("conf")
                .value_name("FILE")
                .global(true)
                .default_value("/etc/sprig/sprig.toml")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("offline_root")
                .short('o')
                .long("offline-root")
                .value_name("DIR")
                .global(true)
                .help("Operate on an image rooted here instead of the running system"),
        )
        .arg(
            Arg::new("dest")
                .short('d')
                .long("dest")
                .value_name("NAME")
                .global(true)
                .help("Restrict operations to this destination"),
        )
        .arg(flag("force-depends", "Install or remove despite unsatisfied dependencies"))
        .arg(flag("force-reinstall", "Reinstall packages that are already installed"))
        .arg(flag("force-downgrade", "Allow replacing a package with an older version"))
        .arg(flag(
            "force-removal-of-dependent-packages",
            "Remove packages other packages depend on",
        ))
        .arg(flag("nodeps", "Do not follow dependencies"))
        .arg(flag("noaction", "Resolve and report without writing status"))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log detail (repeatable)"),
        )
        .subcommand(Command::new("update").about("Refresh package lists from every source"))
        .subcommand(
            Command::new("install")
                .about("Install packages by name or archive URL")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                )
                .arg(
                    Arg::new("purge")
                        .long("purge")
                        .action(ArgAction::SetTrue)
                        .help("Also drop the recorded file list"),
                ),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade the named packages, or everything installed")
                .arg(
                    Arg::new("packages")
                        .num_args(0..)
                        .help("Package names (all installed packages if omitted)"),
                ),
        )
        .subcommand(
            Command::new("configure")
                .about("Configure unpacked packages")
                .arg(Arg::new("pattern").help("Shell-style name pattern")),
        )
        .subcommand(
            Command::new("list")
                .about("List known packages")
                .arg(Arg::new("pattern").help("Shell-style name pattern"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print JSON instead of text"),
                ),
        )
        .subcommand(
            Command::new("list-installed").about("List installed packages").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Print JSON instead of text"),
            ),
        )
        .subcommand(
            Command::new("status")
                .about("Show the state of installed packages")
                .arg(Arg::new("pattern").help("Shell-style name pattern")),
        )
        .subcommand(
            Command::new("info")
                .about("Show every known record of a package")
                .arg(Arg::new("pattern").help("Shell-style name pattern")),
        )
        .subcommand(
            Command::new("files")
                .about("List the files of an installed package")
                .arg(Arg::new("package").required(true).help("Package name")),
        )
        .subcommand(
            Command::new("search")
                .about("Find the installed package owning a file")
                .arg(Arg::new("pattern").required(true).help("Shell-style path pattern")),
        )
        .subcommand(
            Command::new("download")
                .about("Download a package archive without installing it")
                .arg(Arg::new("package").required(true).help("Package name"))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .default_value(".")
                        .help("Target directory"),
                ),
        )
        .subcommand(pattern_command("whatdepends", "Packages depending on a name"))
        .subcommand(pattern_command("whatrecommends", "Packages recommending a name"))
        .subcommand(pattern_command("whatprovides", "Packages providing a name"))
        .subcommand(pattern_command("whatconflicts", "Packages conflicting with a name"))
        .subcommand(pattern_command("whatreplaces", "Packages replacing a name"))
        .subcommand(
            Command::new("option-get")
                .about("Print a configuration option")
                .arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
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

    let man_path = man_dir.join("sprig.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
