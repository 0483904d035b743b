//! Change-aware test selector.
//!
//! Prints the test modules (crossed with the configured matrix) that a change
//! set since a base reference can affect. Exit codes are stable and documented
//! in [`testsel::exit_codes`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use testsel::core::shard::{ShardSpec, ShardStrategy, shard};
use testsel::core::types::Mode;
use testsel::exit_codes;
use testsel::io::changes::{ChangeDetector, GitChangeDetector};
use testsel::io::config::{CONFIG_FILE, SelectorConfig, load_config, write_config};
use testsel::io::git::Git;
use testsel::logging;
use testsel::render::{Format, render_cases, render_selection};
use testsel::select::select_from_root;

#[derive(Parser)]
#[command(
    name = "testsel",
    version,
    about = "Select the tests affected by a change set, expanded over a test matrix"
)]
struct Cli {
    /// Repository root.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file (defaults to `<root>/testsel.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `testsel.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the selected tests.
    Select {
        /// Overrides the configured mode.
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        /// Base reference to diff against (`WORKTREE` for uncommitted changes).
        #[arg(long)]
        base: Option<String>,
        /// Only print shard K of N (1-based).
        #[arg(long, value_name = "K/N")]
        shard: Option<ShardSpec>,
        #[arg(long, value_enum, default_value_t)]
        shard_strategy: ShardStrategy,
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// Print the expanded matrix cases.
    Matrix {
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// Print the files changed since the base reference.
    Changes {
        #[arg(long)]
        base: Option<String>,
    },
}

fn main() {
    logging::init();
    match run(Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILE));
    match cli.command {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Select {
            mode,
            base,
            shard,
            shard_strategy,
            format,
        } => {
            let config = load_config(&config_path)?;
            let mode = mode.unwrap_or(config.mode);
            let base = base.unwrap_or_else(|| config.base_ref.clone());
            cmd_select(&cli.root, config, mode, &base, shard, shard_strategy, format)
        }
        Command::Matrix { format } => {
            let config = load_config(&config_path)?;
            let design = config.matrix.design()?;
            print!("{}", render_cases(design.cases(), format)?);
            Ok(exit_codes::OK)
        }
        Command::Changes { base } => {
            let config = load_config(&config_path)?;
            let base = base.unwrap_or_else(|| config.base_ref.clone());
            cmd_changes(&cli.root, &config, &base)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &SelectorConfig::default())?;
    Ok(exit_codes::OK)
}

fn cmd_select(
    root: &Path,
    config: SelectorConfig,
    mode: Mode,
    base: &str,
    shard_spec: Option<ShardSpec>,
    strategy: ShardStrategy,
    format: Format,
) -> Result<i32> {
    let mut result = select_from_root(root, config, mode, base)?;
    if let Some(spec) = shard_spec {
        result.entries = shard(&result.entries, spec, strategy);
    }
    print!("{}", render_selection(&result, format)?);
    if result.entries.is_empty() {
        return Ok(exit_codes::EMPTY);
    }
    Ok(exit_codes::OK)
}

fn cmd_changes(root: &Path, config: &SelectorConfig, base: &str) -> Result<i32> {
    let git = Git::new(root).with_limits(config.vcs_timeout(), config.vcs_output_limit_bytes);
    let changed = GitChangeDetector::new(git)
        .detect_changes(base)
        .with_context(|| format!("detect changes since {base}"))?;
    for file in &changed {
        println!("{}\t{}\t{}", file.kind.as_str(), file.revision, file.path);
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["testsel", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["testsel", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_select_defaults() {
        let cli = Cli::parse_from(["testsel", "select"]);
        match cli.command {
            Command::Select {
                mode,
                base,
                shard,
                shard_strategy,
                format,
            } => {
                assert_eq!(mode, None);
                assert_eq!(base, None);
                assert_eq!(shard, None);
                assert_eq!(shard_strategy, ShardStrategy::Hash);
                assert_eq!(format, Format::Text);
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parse_select_with_overrides() {
        let cli = Cli::parse_from([
            "testsel",
            "--root",
            "/repo",
            "select",
            "--mode",
            "changed-only",
            "--base",
            "origin/main",
            "--shard",
            "2/3",
            "--shard-strategy",
            "round-robin",
            "--format",
            "json",
        ]);
        assert_eq!(cli.root, PathBuf::from("/repo"));
        match cli.command {
            Command::Select {
                mode,
                base,
                shard,
                shard_strategy,
                format,
            } => {
                assert_eq!(mode, Some(Mode::ChangedOnly));
                assert_eq!(base.as_deref(), Some("origin/main"));
                assert_eq!(shard, Some(ShardSpec { index: 2, count: 3 }));
                assert_eq!(shard_strategy, ShardStrategy::RoundRobin);
                assert_eq!(format, Format::Json);
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn rejects_out_of_range_shard() {
        assert!(Cli::try_parse_from(["testsel", "select", "--shard", "4/3"]).is_err());
    }

    #[test]
    fn init_writes_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        assert_eq!(cmd_init(&path, false).expect("init"), exit_codes::OK);
        assert_eq!(load_config(&path).expect("load"), SelectorConfig::default());
    }
}
