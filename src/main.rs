// src/main.rs

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use indicatif::{ProgressBar, ProgressStyle};
use sprig::config::{DEFAULT_CONFIG_PATH, OptionValue};
use sprig::package::{Package, PackageSummary};
use sprig::progress::{LogSink, ProgressSink};
use sprig::{Config, Session};
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser)]
#[command(name = "sprig")]
#[command(author, version, about = "Lightweight package manager for embedded Linux systems", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Configuration file
    #[arg(short = 'f', long = "conf", global = true, default_value = DEFAULT_CONFIG_PATH)]
    conf: PathBuf,

    /// Operate on an image rooted here instead of the running system
    #[arg(short = 'o', long, global = true)]
    offline_root: Option<PathBuf>,

    /// Restrict operations to this destination
    #[arg(short = 'd', long, global = true)]
    dest: Option<String>,

    /// Install or remove despite unsatisfied dependencies
    #[arg(long, global = true)]
    force_depends: bool,

    /// Reinstall packages that are already installed
    #[arg(long, global = true)]
    force_reinstall: bool,

    /// Allow replacing a package with an older version
    #[arg(long, global = true)]
    force_downgrade: bool,

    /// Remove packages other packages depend on
    #[arg(long, global = true)]
    force_removal_of_dependent_packages: bool,

    /// Do not follow dependencies
    #[arg(long, global = true)]
    nodeps: bool,

    /// Resolve and report without writing status
    #[arg(long, global = true)]
    noaction: bool,

    /// Increase log detail (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh package lists from every source
    Update,
    /// Install packages by name or archive URL
    Install {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Remove installed packages
    Remove {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Also drop the recorded file list
        #[arg(long)]
        purge: bool,
    },
    /// Upgrade the named packages, or everything installed
    Upgrade {
        /// Package names (all installed packages if omitted)
        packages: Vec<String>,
    },
    /// Configure unpacked packages
    Configure {
        /// Shell-style name pattern (all unpacked packages if omitted)
        pattern: Option<String>,
    },
    /// List known packages
    List {
        /// Shell-style name pattern
        pattern: Option<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List installed packages
    ListInstalled {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the state of installed packages
    Status {
        /// Shell-style name pattern
        pattern: Option<String>,
    },
    /// Show every known record of a package
    Info {
        /// Shell-style name pattern
        pattern: Option<String>,
    },
    /// List the files of an installed package
    Files {
        /// Package name
        package: String,
    },
    /// Find the installed package owning a file
    Search {
        /// Shell-style path pattern
        pattern: String,
    },
    /// Download a package archive without installing it
    Download {
        /// Package name
        package: String,
        /// Target directory
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
    /// Packages depending on a name
    Whatdepends { pattern: String },
    /// Packages recommending a name
    Whatrecommends { pattern: String },
    /// Packages providing a name
    Whatprovides { pattern: String },
    /// Packages conflicting with a name
    Whatconflicts { pattern: String },
    /// Packages replacing a name
    Whatreplaces { pattern: String },
    /// Print a configuration option
    OptionGet { name: String },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Engine progress: a bar on a terminal, log lines otherwise
enum Reporter {
    Bar(ProgressBar),
    Log(LogSink),
}

impl Reporter {
    fn new(label: &str) -> Result<Self> {
        if !std::io::stderr().is_terminal() {
            return Ok(Reporter::Log(LogSink::new(label)));
        }

        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{msg:>12} [{bar:40.cyan/blue}] {pos:>3}%")
                .context("Invalid progress template")?
                .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        Ok(Reporter::Bar(bar))
    }

    fn done(self) {
        if let Reporter::Bar(bar) = self {
            bar.finish_and_clear();
        }
    }
}

impl ProgressSink for Reporter {
    fn report(&mut self, percent: u8) {
        match self {
            Reporter::Bar(bar) => bar.set_position(u64::from(percent)),
            Reporter::Log(log) => log.report(percent),
        }
    }
}

/// Command line values, applied as runtime overrides
fn cli_overrides(global: &GlobalArgs) -> BTreeMap<String, OptionValue> {
    let switches = [
        ("force_depends", global.force_depends),
        ("force_reinstall", global.force_reinstall),
        ("force_downgrade", global.force_downgrade),
        (
            "force_removal_of_dependent_packages",
            global.force_removal_of_dependent_packages,
        ),
        ("nodeps", global.nodeps),
        ("noaction", global.noaction),
    ];
    let mut overrides: BTreeMap<String, OptionValue> = switches
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| (name.to_string(), OptionValue::Bool(true)))
        .collect();

    if let Some(root) = &global.offline_root {
        overrides.insert(
            "offline_root".to_string(),
            OptionValue::String(Some(root.display().to_string())),
        );
    }
    if let Some(dest) = &global.dest {
        overrides.insert("default_dest".to_string(), OptionValue::String(Some(dest.clone())));
        overrides.insert("restrict_to_default_dest".to_string(), OptionValue::Bool(true));
    }
    overrides
}

fn load_config(global: &GlobalArgs) -> Result<Config> {
    let overrides = cli_overrides(global);
    let mut config = if global.conf.exists() {
        // An offline root also reroots the destinations and lists
        Config::from_file_with_overrides(&global.conf, &overrides)?
    } else {
        let root = global.offline_root.as_deref().unwrap_or(Path::new("/"));
        debug!(
            "{} not found, using a single destination at {}",
            global.conf.display(),
            root.display()
        );
        let mut config = Config::for_root(root)?;
        for (name, value) in overrides {
            config.set_option(&name, value)?;
        }
        config
    };

    if global.verbose > 0 {
        let verbosity = config.flags.verbosity + i64::from(global.verbose);
        config.set_option("verbosity", OptionValue::Int(verbosity))?;
    }
    Ok(config)
}

fn print_summaries(summaries: &[PackageSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }
    for pkg in summaries {
        match &pkg.description {
            Some(desc) => println!("{} - {} - {}", pkg.name, pkg.version, desc),
            None => println!("{} - {}", pkg.name, pkg.version),
        }
    }
    Ok(())
}

fn print_record(pkg: &Package) {
    println!("Package: {}", pkg.name);
    println!("Version: {}", pkg.version);
    if let Some(arch) = &pkg.architecture {
        println!("Architecture: {}", arch);
    }
    for (field, rels) in [
        ("Depends", &pkg.relations.depends),
        ("Recommends", &pkg.relations.recommends),
        ("Provides", &pkg.relations.provides),
        ("Conflicts", &pkg.relations.conflicts),
        ("Replaces", &pkg.relations.replaces),
    ] {
        if !rels.is_empty() {
            let joined: Vec<String> = rels.iter().map(ToString::to_string).collect();
            println!("{}: {}", field, joined.join(", "));
        }
    }
    let flags: Vec<String> = pkg
        .state_flag
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect();
    println!("Status: {} {}", pkg.state_status, flags.join(","));
    if let Some(dest) = &pkg.dest {
        println!("Destination: {}", dest);
    }
    if let Some(src) = &pkg.src {
        println!("Source: {}", src);
    }
    if let Some(when) = pkg.installed_time {
        if let Some(time) = chrono::DateTime::from_timestamp(when, 0) {
            println!("Installed-Time: {}", time.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    if let Some(desc) = &pkg.description {
        println!("Description: {}", desc);
    }
    println!();
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "sprig", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli.global)?;
    let mut session = Session::open(config)?;

    match cli.command {
        Commands::Update => {
            let mut bar = Reporter::new("update")?;
            let report = session.update_package_lists(Some(&mut bar))?;
            bar.done();

            for outcome in &report.outcomes {
                match &outcome.error {
                    None => println!("Updated {} ({:?})", outcome.source, outcome.signature),
                    Some(e) => eprintln!("Failed to update {}: {}", outcome.source, e),
                }
            }
            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Install { packages } => {
            for name in &packages {
                let mut bar = Reporter::new(name)?;
                let result = session.install_package(name, Some(&mut bar));
                bar.done();
                result?;
                println!("Installed {}", name);
            }
        }
        Commands::Remove { packages, purge } => {
            for name in &packages {
                let mut bar = Reporter::new(name)?;
                let result = session.remove_package(name, purge, Some(&mut bar));
                bar.done();
                result?;
                println!("Removed {}", name);
            }
        }
        Commands::Upgrade { packages } => {
            if packages.is_empty() {
                let mut bar = Reporter::new("upgrade")?;
                let result = session.upgrade_all(Some(&mut bar));
                bar.done();
                result?;
            }
            for name in &packages {
                let mut bar = Reporter::new(name)?;
                let result = session.upgrade_package(name, Some(&mut bar));
                bar.done();
                result?;
            }
        }
        Commands::Configure { pattern } => {
            session.configure_packages(pattern.as_deref())?;
        }
        Commands::List { pattern, json } => {
            let mut found = Vec::new();
            session.list_packages(pattern.as_deref(), |p| found.push(p.clone()))?;
            print_summaries(&found, json)?;
        }
        Commands::ListInstalled { json } => {
            let mut found = Vec::new();
            session.list_installed(|p| found.push(p.clone()))?;
            print_summaries(&found, json)?;
        }
        Commands::Status { pattern } => {
            session.package_status(pattern.as_deref(), print_record)?;
        }
        Commands::Info { pattern } => {
            session.package_info(pattern.as_deref(), print_record)?;
        }
        Commands::Files { package } => {
            println!("Package {} contains:", package);
            session.package_files(&package, |file| println!("{}", file))?;
        }
        Commands::Search { pattern } => {
            session.search_file(&pattern, |pkg, file| {
                println!("{} - {} - {}", pkg.name, pkg.version, file)
            })?;
        }
        Commands::Download { package, output } => {
            let path = session.download_package(&package, &output)?;
            println!("Downloaded {}", path.display());
        }
        Commands::Whatdepends { pattern } => {
            session.what_depends(&pattern, |p| println!("{} - {}", p.name, p.version))?;
        }
        Commands::Whatrecommends { pattern } => {
            session.what_recommends(&pattern, |p| println!("{} - {}", p.name, p.version))?;
        }
        Commands::Whatprovides { pattern } => {
            session.what_provides(&pattern, |p| println!("{} - {}", p.name, p.version))?;
        }
        Commands::Whatconflicts { pattern } => {
            session.what_conflicts(&pattern, |p| println!("{} - {}", p.name, p.version))?;
        }
        Commands::Whatreplaces { pattern } => {
            session.what_replaces(&pattern, |p| println!("{} - {}", p.name, p.version))?;
        }
        Commands::OptionGet { name } => {
            println!("{}", session.get_option(&name)?);
        }
        // Handled before the session opens
        Commands::Completions { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = match cli.global.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<sprig::Error>()
                .map(sprig::Error::code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
