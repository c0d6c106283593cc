use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

use jmap_backup::backup::{BackupOptions, check_dest_dir, run_backup};
use jmap_backup::config::{ConfigFile, EnvSettings, HttpConfig, default_config_path, expand_tilde};
use jmap_backup::hooks;
use jmap_backup::mail::transport::HttpTransport;

#[derive(Parser)]
#[command(name = "jmap-backup")]
#[command(about = "Back up a Fastmail JMAP mailbox in .eml format", long_about = None)]
struct Cli {
    /// Fully verify backed up emails and redownload if missing
    #[arg(short, long)]
    verify: bool,

    /// Open the configured dest_dir in the file browser
    #[arg(short, long)]
    open: bool,

    /// Path to config file (default: ~/.jmapbackup/fastmail.yml)
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(debug: bool) {
    let default = if debug {
        "jmap_backup=debug"
    } else {
        "jmap_backup=info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env = EnvSettings::from_env();
    init_logging(env.debug);

    let cfg_path = match &cli.config {
        Some(p) => PathBuf::from(expand_tilde(p)),
        None => default_config_path()?,
    };
    let mut file = ConfigFile::load(&cfg_path)?;

    hooks::run_if(&file.config.pre_command());
    check_dest_dir(&file.config.dest_dir)?;

    if cli.open {
        open::that(&file.config.dest_dir)
            .with_context(|| format!("opening {}", file.config.dest_dir.display()))?;
        return Ok(());
    }

    let transport = HttpTransport::new(HttpConfig::default())?;
    let opts = BackupOptions {
        verify: cli.verify,
        env,
    };
    let post = file.config.post_command();
    let result = run_backup(&transport, &mut file, &opts, Utc::now());

    if let Ok(report) = &result {
        if cli.verify {
            println!("Verified: {}", report.verified);
        }
        println!("Archived: {}", report.archived);
        if !report.failed.is_empty() {
            eprintln!("Failed after retry: {}", report.failed.join(", "));
        }
    }

    // unmount even when the run failed
    hooks::run_if(&post);
    result.map(|_| ())
}
