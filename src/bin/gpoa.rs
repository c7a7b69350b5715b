//! gpoa command line.
//!
//! Resolves machine and user policy and prints the merged entries for
//! appliers or an operator to inspect.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use gpoa::config::DEFAULT_CONFIG_PATH;
use gpoa::{
    GpoaConfig, GpoaError, Identity, ManifestDirectory, PolicyEntry, PolicyResolver,
    ResolutionCache, Session, Sid,
};

/// Group Policy resolution for Linux domain members
#[derive(Parser, Debug)]
#[command(name = "gpoa", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "GPOA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve and print machine and user policy
    Resolve {
        /// Account name of the user; omit for a machine-only run
        #[arg(long, requires = "sid")]
        username: Option<String>,

        /// SID of the user
        #[arg(long, requires = "username")]
        sid: Option<Sid>,

        /// SID of this computer's account
        #[arg(long)]
        machine_sid: Sid,

        /// Host name used to derive the computer account name
        #[arg(long)]
        hostname: Option<String>,

        /// Policy object manifest [default: <cache_dir>/gpos.json]
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the resolution cache
    ShowCache,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("gpoa=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gpoa=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<GpoaConfig, GpoaError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    Ok(GpoaConfig::load(path)?)
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GpoaError> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Resolve {
            username,
            sid,
            machine_sid,
            hostname,
            manifest,
            json,
        } => {
            let hostname = hostname.unwrap_or_else(local_hostname);
            let user = username.zip(sid).map(|(name, sid)| Identity::new(name, sid));
            cmd_resolve(config, &hostname, machine_sid, user, manifest, json)
        }
        Commands::ShowCache => cmd_show_cache(&config),
    }
}

fn cmd_resolve(
    config: GpoaConfig,
    hostname: &str,
    machine_sid: Sid,
    user: Option<Identity>,
    manifest: Option<PathBuf>,
    json: bool,
) -> Result<(), GpoaError> {
    let machine_name = config.machine_account(hostname);
    let machine = Identity::new(machine_name.clone(), machine_sid);

    // Resolving "for" the computer account itself is a machine-only run.
    let user = user.filter(|u| !u.is_machine_account(&machine_name));

    let manifest = manifest.unwrap_or_else(|| config.cache_dir.join("gpos.json"));
    info!(manifest = %manifest.display(), machine = %machine, "starting policy resolution");

    let directory = Arc::new(ManifestDirectory::new(manifest));
    let mut resolver = PolicyResolver::new(config, directory);
    let session = resolver.run_session(&machine, user.as_ref())?;

    if json {
        let out = serde_json::to_string_pretty(&session)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string());
        println!("{out}");
    } else {
        print_session(&session);
    }
    Ok(())
}

fn print_entries(title: &str, entries: &[PolicyEntry]) {
    println!("{title} ({} entries)", entries.len());
    for entry in entries {
        println!("  {}\\{} = {}", entry.key, entry.value_name, entry.value);
    }
}

fn print_session(session: &Session) {
    println!("machine: {} [{:?}]", session.machine.identity, session.machine.outcome);
    print_entries("machine policy", &session.machine_values());
    if let Some(user) = &session.user {
        println!("user: {} [{:?}]", user.identity, user.outcome);
        print_entries("user policy", &session.user_values());
    }
}

fn cmd_show_cache(config: &GpoaConfig) -> Result<(), GpoaError> {
    let cache = ResolutionCache::new(config.cache_path());
    let records = cache.try_load()?;

    println!("cache: {} ({} records)", cache.path().display(), records.len());
    for (sid, record) in &records {
        println!("{sid} resolved at {}", record.resolved_at);
        for file in &record.files.machine_files {
            println!("  machine {}", file.display());
        }
        for file in &record.files.user_files {
            println!("  user    {}", file.display());
        }
    }
    Ok(())
}
