use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{io, path::PathBuf};

use crate::{
    config::Config,
    context::AppContext,
    ipc::{dispatcher::Dispatcher, sink::ResponseSink},
    media::{self, DEFAULT_SEARCH_LIMIT},
    storage,
};

#[derive(Parser)]
#[command(name = "wavex-core")]
#[command(version = "0.1")]
#[command(about = "Music search, streaming and download core for the UB-WaveX desktop app")]
pub struct Cli {
    /// Path to an optional config TOML file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve JSON requests on stdin, answering on stdout (default)
    Serve,
    /// Search the media backend and print the hits
    Search {
        query: String,
        /// Maximum number of hits
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Show what the library knows about a track
    Show {
        /// Media backend id of the track
        video_id: String,
    },
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(cli.config.as_deref())?;
    let ctx = AppContext::from_config(&cfg).context("Failed to initialize the core")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            log::info!(
                "serving on stdio, database at {}",
                ctx.paths().db_path.to_string_lossy()
            );
            let mut dispatcher = Dispatcher::new(ctx, ResponseSink::stdout());
            dispatcher
                .run(io::stdin().lock())
                .context("Failed to read from stdin")?;
        }

        Commands::Search { query, limit } => {
            let results = media::search(ctx.backend.as_ref(), &query, limit)?;
            for result in &results {
                println!(
                    "{}  {}  ({}, {}s)",
                    result.youtube_id, result.title, result.uploader, result.duration
                );
            }
        }

        Commands::Show { video_id } => {
            let storage = storage::lock(&ctx.storage)?;
            let Some(track) = storage.find_track(&video_id)? else {
                println!("Track {video_id} is not in the library");
                return Ok(());
            };

            println!("Track: {} ({})", track.title, track.external_id);
            println!("  Artist: {}", track.artist_name);
            println!("  Duration: {}s", track.duration_secs);
            println!(
                "  Added: {}",
                track.created_at.with_timezone(&chrono::Local)
            );
            match storage.find_download(track.id)? {
                Some(download) => println!(
                    "  Downloaded: {} ({}, {} bytes)",
                    download.file_path.to_string_lossy(),
                    download.quality,
                    download.file_size
                ),
                None => println!("  Not downloaded"),
            }
        }
    }

    Ok(())
}
