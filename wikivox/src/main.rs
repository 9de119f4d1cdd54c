//! wikivox - game voice line wiki synchronizer
//!
//! Decodes Wwise voice banks, resolves audio events to playable files,
//! and keeps a MediaWiki's audio pages and uploads in sync with the game
//! data.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wikivox::commands;
use wikivox::wiki::DuplicatePolicy;
use wikivox_common::{load_settings, resolve_root_folder, RootLayout, Settings};

#[derive(Parser, Debug)]
#[command(name = "wikivox")]
#[command(about = "Sync game voice lines and audio pages to a MediaWiki")]
#[command(version)]
struct Cli {
    /// Root of the game export tree
    #[arg(short, long, global = true, env = "WIKIVOX_ROOT_FOLDER")]
    root_folder: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode banks, rebuild the voice catalog, and update the store
    Gen {
        /// Reuse existing decoded files instead of re-running the export
        #[arg(long)]
        skip_export: bool,
        /// Drop store records that no longer exist in the game data
        #[arg(long)]
        discard_non_local: bool,
    },
    /// Upload audio files and save audio pages
    Push {
        /// Character name; all characters when omitted
        character: Option<String>,
        /// Report what would change without editing the wiki
        #[arg(long)]
        dry_run: bool,
        /// Overwrite wiki files that differ acoustically from local ones
        #[arg(long)]
        force_replace: bool,
        /// What to do when an upload duplicates an existing file
        #[arg(long, value_enum, default_value = "ignore")]
        on_duplicate: DuplicatePolicy,
    },
    /// Fold wiki-side editorial changes back into the local store
    Pull {
        /// Character name; all characters when omitted
        character: Option<String>,
    },
    /// Consistency diagnostics over the generated data
    Test,
    /// Transcribe voices that have audio but no text
    Transcribe,
    /// Translate transcriptions into the remaining UI languages
    Translate,
}

async fn run(cli: Cli) -> Result<()> {
    let root = resolve_root_folder(cli.root_folder.as_deref(), "WIKIVOX_ROOT_FOLDER")?;
    let layout = RootLayout::new(root);
    // The wiki section is only needed by the networked subcommands
    let settings = load_settings().unwrap_or_else(|_| Settings::default());

    match cli.command {
        Command::Gen {
            skip_export,
            discard_non_local,
        } => commands::generate(&layout, skip_export, discard_non_local).await,
        Command::Push {
            character,
            dry_run,
            force_replace,
            on_duplicate,
        } => {
            commands::push(
                &layout,
                &settings,
                character.as_deref(),
                dry_run,
                force_replace,
                on_duplicate,
            )
            .await
        }
        Command::Pull { character } => {
            commands::pull(&layout, &settings, character.as_deref()).await
        }
        Command::Test => {
            let problems = commands::check(&layout)?;
            if problems > 0 {
                anyhow::bail!("{} problems found", problems);
            }
            Ok(())
        }
        Command::Transcribe => commands::transcribe(&layout),
        Command::Translate => commands::translate(&layout),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wikivox=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
