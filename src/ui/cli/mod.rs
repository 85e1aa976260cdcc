//! CLI - reedline-based REPL interface
//!
//! Interactive front end over a [`KernelSession`]: resolve kexts from the
//! local index and move modules in and out of the remote module cache.

use anyhow::Result;
use colored::Colorize;
use reedline::{Prompt, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

use kextcache::{ContentFingerprint, KernelSession, LoadedModule, ModuleError, ModuleIdentity};

/// What the REPL operates on
pub struct CliContext {
    /// Indexed session
    pub session: KernelSession,
    /// Root of the remote module cache
    pub cache_root: PathBuf,
    /// Remote host the cache mirror is kept for
    pub hostname: String,
}

/// Custom prompt for the kextcache CLI
pub struct KextPrompt {
    /// Remote host name
    hostname: String,
    /// Number of kexts in the session index
    indexed: usize,
}

impl KextPrompt {
    pub fn new(hostname: &str, indexed: usize) -> Self {
        Self {
            hostname: hostname.to_string(),
            indexed,
        }
    }
}

impl Prompt for KextPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(format!("[{}:{} kexts]", self.hostname, self.indexed))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "(failed) ",
        };
        Cow::Owned(format!("(search: {}{}) ", prefix, history_search.term))
    }
}

/// Command parsing result
#[derive(Debug, PartialEq)]
pub enum ParsedCommand {
    /// Show session status: status
    Status,
    /// Resolve an indexed kext: resolve <bundle-id> [uuid]
    Resolve {
        identifier: String,
        uuid: Option<String>,
    },
    /// Load a module from the cache: get <path> <uuid>
    Get { path: String, uuid: String },
    /// Commit a downloaded module to the cache: put <path> <uuid> <file>
    Put {
        path: String,
        uuid: String,
        file: String,
    },
    /// Help: ? or help
    Help,
    /// Quit: q or exit
    Quit,
    /// Unknown command
    Unknown(String),
}

/// Parse a command string into a structured command
fn parse_command(input: &str) -> ParsedCommand {
    let input = input.trim();
    let parts: Vec<&str> = input.split_whitespace().collect();
    let cmd = parts.first().copied().unwrap_or("");
    let args = parts.get(1..).unwrap_or_default();

    match (cmd, args) {
        ("st" | "status", []) => ParsedCommand::Status,

        ("r" | "resolve", [identifier]) => ParsedCommand::Resolve {
            identifier: identifier.to_string(),
            uuid: None,
        },
        ("r" | "resolve", [identifier, uuid]) => ParsedCommand::Resolve {
            identifier: identifier.to_string(),
            uuid: Some(uuid.to_string()),
        },

        ("get", [path, uuid]) => ParsedCommand::Get {
            path: path.to_string(),
            uuid: uuid.to_string(),
        },
        ("put", [path, uuid, file]) => ParsedCommand::Put {
            path: path.to_string(),
            uuid: uuid.to_string(),
            file: file.to_string(),
        },

        ("?" | "help", _) => ParsedCommand::Help,
        ("q" | "quit" | "exit", _) => ParsedCommand::Quit,

        _ => ParsedCommand::Unknown(input.to_string()),
    }
}

/// Print the help message
fn print_help() {
    println!("{}", "kextcache CLI Commands".bold().cyan());
    println!("{}", "═".repeat(50).cyan());

    println!("\n{}", "Session:".bold().yellow());
    println!("  {}                       Show indexed roots", "status".green());
    println!(
        "  {}  Resolve kext by bundle id",
        "resolve <bundle-id> [uuid]".green()
    );

    println!("\n{}", "Module cache:".bold().yellow());
    println!("  {}            Load a cached module", "get <path> <uuid>".green());
    println!(
        "  {}     Cache a downloaded module",
        "put <path> <uuid> <file>".green()
    );

    println!("\n{}", "Other:".bold().yellow());
    println!("  {}                            Show this help", "?".green());
    println!("  {}                            Quit", "q".green());
}

fn print_module(module: &LoadedModule) {
    for line in module.summary().lines() {
        println!("    {}", line);
    }
}

fn print_error(e: &ModuleError) {
    let tag = match e {
        ModuleError::NotFound(_) => "[not found]",
        ModuleError::Mismatch { .. } => "[mismatch]",
        ModuleError::Invalid { .. } => "[invalid]",
        ModuleError::Io { .. } => "[io]",
    };
    println!("{} {} {}", "[!]".red(), tag.yellow(), e);
}

fn cache_identity(path: &str, uuid: &str) -> Result<ModuleIdentity, ModuleError> {
    let fingerprint: ContentFingerprint = uuid.parse()?;
    Ok(ModuleIdentity::new(path).with_fingerprint(fingerprint))
}

/// Execute a parsed command; returns false when the REPL should stop
fn execute_command(ctx: &CliContext, cmd: ParsedCommand) -> bool {
    let result = match cmd {
        ParsedCommand::Status => {
            print!("{}", ctx.session.status());
            Ok(())
        }
        ParsedCommand::Resolve { identifier, uuid } => {
            println!("[*] Resolving {}", identifier);
            uuid.as_deref()
                .map(str::parse::<ContentFingerprint>)
                .transpose()
                .and_then(|fp| ctx.session.resolve(Path::new(&identifier), fp.as_ref()))
                .map(|module| print_module(&module))
        }
        ParsedCommand::Get { path, uuid } => cache_identity(&path, &uuid)
            .and_then(|id| ctx.session.cache().get(&ctx.cache_root, &ctx.hostname, &id))
            .map(|module| print_module(&module)),
        ParsedCommand::Put { path, uuid, file } => cache_identity(&path, &uuid)
            .and_then(|id| {
                ctx.session
                    .cache()
                    .put(&ctx.cache_root, &ctx.hostname, &id, Path::new(&file))
            })
            .map(|()| println!("[*] Cached {} for {}", path, ctx.hostname)),
        ParsedCommand::Help => {
            print_help();
            Ok(())
        }
        ParsedCommand::Quit => {
            println!("[*] Shutting down...");
            return false;
        }
        ParsedCommand::Unknown(input) => {
            println!("{} Unknown command: '{}'", "[!]".red(), input);
            println!("    Type '?' for help");
            Ok(())
        }
    };

    if let Err(e) = result {
        print_error(&e);
    }
    true
}

/// Run the CLI REPL
pub fn run_cli(ctx: &CliContext) -> Result<()> {
    let mut line_editor = Reedline::create();
    let prompt = KextPrompt::new(&ctx.hostname, ctx.session.index().len());

    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║  kextcache CLI - Type '?' for help, 'q' to quit              ║".cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝".cyan()
    );

    loop {
        let sig = line_editor.read_line(&prompt)?;
        match sig {
            Signal::Success(buffer) => {
                let input = buffer.trim();
                if input.is_empty() {
                    continue;
                }

                if !execute_command(ctx, parse_command(input)) {
                    break;
                }
            }
            Signal::CtrlD | Signal::CtrlC => {
                println!("\n[*] Interrupted");
                break;
            }
        }
    }

    Ok(())
}
