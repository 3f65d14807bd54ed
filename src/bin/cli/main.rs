mod app;
mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use app::{App, Overrides};

#[derive(Parser)]
#[command(name = "helix-cli", about = "Triple Helix maths drill", version)]
struct Cli {
    /// Learner id (default: from config)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Use bundled content only; never touch the content API
    #[arg(long, global = true)]
    offline: bool,

    /// Config file (default: <config dir>/helix/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Play stitches interactively
    Play {
        /// Number of stitches to play
        #[arg(long, default_value = "3")]
        stitches: usize,
    },

    /// Show the learner's progress and cache state
    Status,

    /// List stitch positions in one tube, or all three
    Tubes {
        /// Tube index (1-3)
        tube: Option<u8>,
    },

    /// Make a tube the active one
    Select {
        /// Tube index (1-3)
        tube: u8,
    },

    /// Warm the content cache ahead of the learner
    Prefetch {
        /// Stitches to fetch (default: from config)
        #[arg(long)]
        window: Option<usize>,
    },

    /// Drop downloaded content; bundled content stays
    ClearCache,

    /// Delete the learner's saved progress
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && atty_check();

    let app = App::new(Overrides {
        config_path: cli.config.as_deref(),
        user: cli.user.as_deref(),
        offline: cli.offline,
    })?;

    match cli.command {
        Command::Play { stitches } => {
            commands::play::run(&app, stitches, &cli.format, use_color).await?;
        }
        Command::Status => {
            commands::status::run(&app, &cli.format, use_color).await?;
        }
        Command::Tubes { tube } => {
            commands::tubes::run(&app, tube, &cli.format, use_color).await?;
        }
        Command::Select { tube } => {
            commands::select::run(&app, tube, &cli.format).await?;
        }
        Command::Prefetch { window } => {
            commands::prefetch::run(&app, window, &cli.format).await?;
        }
        Command::ClearCache => {
            commands::cache::run_clear(&app, &cli.format)?;
        }
        Command::Reset { yes } => {
            commands::reset::run(&app, yes, &cli.format).await?;
        }
    }

    Ok(())
}

/// Parse a tube index given on the command line
pub fn parse_tube(tube: u8) -> anyhow::Result<helix_lib::scheduler::TubeIndex> {
    helix_lib::scheduler::TubeIndex::try_from(tube).map_err(|e| anyhow::anyhow!(e))
}

/// Check if stdout is a terminal (for color support)
fn atty_check() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}
