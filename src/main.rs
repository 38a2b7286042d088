use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use narration_batch::config::{load_config, BatchConfig};
use narration_batch::credentials::{CredentialPool, JsonFileStore};
use narration_batch::persistence::{JobStore, JsonSessionStore, SessionSnapshot};
use narration_batch::segmenter::{char_len, Segmenter};
use narration_batch::utils::logger::init_logger;

const DEFAULT_SESSION_FILE: &str = "session.json";

#[derive(Parser, Debug)]
#[command(name = "narration-batch", version, about = "Batch narration queue tools")]
struct Args {
    /// Configuration file (JSON)
    #[arg(short, long, default_value = "narration.json")]
    config: PathBuf,

    /// Debug logging for the crate
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print saved jobs and API key status
    Status,
    /// Reset interrupted jobs to waiting and save the session
    Recover,
    /// Print subtitle segmentation of a text (reads stdin when TEXT is omitted)
    Segment {
        text: Option<String>,

        /// Target segment length in characters
        #[arg(short, long)]
        target: Option<usize>,
    },
}

fn session_store(config: &BatchConfig) -> JsonSessionStore {
    let path = config
        .services
        .session_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));
    JsonSessionStore::new(path)
}

fn status(config: &BatchConfig) -> Result<()> {
    let store = session_store(config);
    match store.load()? {
        Some(snapshot) => {
            let stats = snapshot.stats;
            println!(
                "{} job(s): {} waiting, {} processing, {} completed, {} failed, {} skipped",
                stats.total, stats.waiting, stats.processing, stats.completed, stats.failed, stats.skipped
            );
            for url in &snapshot.url_queue {
                let status = snapshot
                    .url_status
                    .get(url)
                    .copied()
                    .flatten()
                    .unwrap_or_default();
                let message = snapshot.url_status_message.get(url).map(String::as_str).unwrap_or("");
                println!("  [{:<10}] {} {}", status.as_str(), url, message);
            }
        }
        None => println!("No saved session at {}", store.path().display()),
    }

    if let Some(path) = &config.services.credentials_file {
        let pool = CredentialPool::new(Arc::new(JsonFileStore::new(path)));
        println!("API keys:");
        for credential in pool.status() {
            println!("  {}", credential);
        }
    }
    Ok(())
}

fn recover(config: &BatchConfig) -> Result<()> {
    let store = session_store(config);
    let snapshot = store
        .load()?
        .with_context(|| format!("no saved session at {}", store.path().display()))?;
    let before = snapshot.stats.processing;
    let jobs = snapshot.into_jobs();
    store.save(&SessionSnapshot::from_jobs(&jobs))?;
    info!("Recovered session with {} job(s)", jobs.len());
    println!("{} interrupted job(s) reset to waiting", before);
    Ok(())
}

fn segment(config: &BatchConfig, text: Option<String>, target: Option<usize>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read text from stdin")?;
            buffer
        }
    };

    let segmenter = Segmenter::new(&config.segmenter);
    let target = target.unwrap_or(segmenter.target_len());
    for (i, line) in segmenter.segment_with_target(&text, target).iter().enumerate() {
        println!("{:>3} ({:>2}) {}", i + 1, char_len(line), line);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let config = load_config(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    match args.command {
        Command::Status => status(&config),
        Command::Recover => recover(&config),
        Command::Segment { text, target } => segment(&config, text, target),
    }
}
