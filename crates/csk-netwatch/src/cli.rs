//! Clap derive structures for the `csk-netwatch` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// csk-netwatch -- inspect and watch NetworkManager from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "csk-netwatch",
    version,
    about = "Inspect and watch NetworkManager devices and access points",
    long_about = "Mirrors the NetworkManager daemon's devices and access points over D-Bus.\n\n\
        One-shot commands wait briefly for the mirror to settle before printing;\n\
        `watch` streams every change until interrupted.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Message bus to connect to (overrides config)
    #[arg(long, global = true)]
    pub bus: Option<BusChoice>,

    /// Bus name of the network daemon (overrides config)
    #[arg(long, global = true)]
    pub daemon: Option<String>,

    /// Output format (overrides config)
    #[arg(long, short = 'o', global = true)]
    pub output: Option<OutputFormat>,

    /// Milliseconds to wait for the mirror to settle (overrides config)
    #[arg(long, global = true)]
    pub settle_ms: Option<u64>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusChoice {
    /// The system bus, where NetworkManager normally lives
    System,
    /// The per-user session bus
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one name per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List ready network devices
    #[command(alias = "dev", alias = "d")]
    Devices,

    /// List access points of every device, or of one
    #[command(alias = "ap")]
    Aps(ApsArgs),

    /// Print change events as they happen
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Ask a Wi-Fi device to rescan
    Scan(ScanArgs),

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command Arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ApsArgs {
    /// Device interface or display name
    pub device: Option<String>,

    /// Include weaker duplicates of the same network
    #[arg(long, short = 'a')]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show events about this device (interface or display name)
    pub device: Option<String>,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Device interface or display name
    pub device: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,
    /// Print the effective configuration
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
