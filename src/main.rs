//! kextcache - Kernel extension resolver
//!
//! Entry point that handles CLI argument parsing, builds the session index
//! and either prints its status or drops into the interactive REPL.

mod ui;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use kextcache::{KernelSession, SearchConfig, SessionConfig, SessionKind};
use ui::cli::{run_cli, CliContext};

/// kextcache: find the exact kext binaries a kernel debug session needs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target architecture, used to classify the session (e.g. x86_64, armv7)
    #[arg(long)]
    arch: Option<String>,

    /// Session kind (ios, macos, unknown); overrides --arch
    #[arg(long)]
    session: Option<SessionKind>,

    /// Xcode developer directory
    #[arg(long, env = "DEVELOPER_DIR")]
    developer_dir: Option<PathBuf>,

    /// Vendor-internal KDK directory
    #[arg(long, default_value = SearchConfig::DEFAULT_INTERNAL_KDK_DIR)]
    kdk_dir: PathBuf,

    /// Host kernel extensions directory
    #[arg(long, default_value = SearchConfig::DEFAULT_SYSTEM_EXTENSIONS_DIR)]
    extensions_dir: PathBuf,

    /// Root of the remote module cache
    #[arg(long, default_value = "/tmp/kextcache")]
    cache_root: PathBuf,

    /// Name of the remote host whose modules are cached
    #[arg(long, default_value = "remote")]
    hostname: String,

    /// Print the session status and exit
    #[arg(long, default_value_t = false)]
    status: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let kind = self
            .session
            .or_else(|| self.arch.as_deref().map(SessionKind::from_arch))
            .unwrap_or_default();

        SessionConfig {
            kind,
            search: SearchConfig {
                developer_dir: self.developer_dir.clone(),
                internal_kdk_dir: self.kdk_dir.clone(),
                system_extensions_dir: self.extensions_dir.clone(),
                ..SearchConfig::default()
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    // 1. Parse command line arguments
    let args = Args::parse();

    // 2. Initialize logger with verbosity level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    log::debug!("Arguments: {:?}", args);

    // 3. Index local kexts once, up front
    let session = KernelSession::new(&args.session_config());

    if args.status {
        print!("{}", session.status());
        return Ok(());
    }

    println!("[*] kextcache v{}", env!("CARGO_PKG_VERSION"));
    let context = CliContext {
        session,
        cache_root: args.cache_root,
        hostname: args.hostname,
    };
    run_cli(&context).context("REPL failed")
}
