//! Card Scanner - OCR card-code recognition and collection tracking
//!
//! Reads card codes off camera frames, confirms them over several frames,
//! and records each confirmed card once in a local collection database.

mod capture;
mod vision;
mod analysis;
mod storage;
mod config;
mod shared;
mod app;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, Sender};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::analysis::{ScanEvent, TimestampedEvent};
use crate::app::ScanSession;
use crate::capture::{CameraSource, DirectoryFrameSource, SampleSource, ScanLoop, TranscriptSource};
use crate::config::AppConfig;
use crate::shared::LoopCommand;
use crate::storage::{variant_for, CollectionStore, Database, PersistenceBridge};
use crate::vision::{card_code, CardCode, CommandOcr};

/// Card Scanner - OCR card-code recognition and collection tracking
#[derive(Parser, Debug)]
#[command(name = "card-scanner")]
#[command(about = "Scan trading cards by their printed code and track your collection")]
struct Args {
    /// Configuration file (default: config.toml in the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the capture loop over image frames in a directory
    Scan {
        /// Directory with frame images
        #[arg(long)]
        frames: PathBuf,
        /// Scan in alt-art mode
        #[arg(long)]
        alt_art: bool,
        /// Start over from the first frame after the last one
        #[arg(long)]
        cycle: bool,
        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Feed recorded OCR output through a scanning session
    Replay {
        /// Transcript file, samples separated by `---` lines
        #[arg(long)]
        transcript: PathBuf,
        /// Scan in alt-art mode
        #[arg(long)]
        alt_art: bool,
    },
    /// Add a card by typing its code
    Add {
        /// Card code, e.g. OP05-060
        code: String,
        /// Add the alt-art printing
        #[arg(long)]
        alt_art: bool,
    },
    /// Inspect and edit the collection
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Manage the card catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Print the card code found in a piece of text
    Parse {
        /// Raw OCR text
        text: String,
    },
}

#[derive(Subcommand, Debug)]
enum CollectionAction {
    /// List every card, newest first
    List,
    /// Show the most recent scans
    Recent {
        /// Number of scans to show (default from config)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show collection totals
    Stats,
    /// Change how many copies an entry holds; 0 removes it
    SetQuantity { id: String, quantity: i64 },
    /// Remove an entry
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum CatalogAction {
    /// Import a cards.json card list export
    Import { file: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_or_create_config(args.config.as_deref())?;

    match args.command {
        Command::Parse { text } => {
            match card_code::parse(&text) {
                Some(code) => print_code(&code),
                None => println!("No card code found"),
            }
            Ok(())
        }
        Command::Scan {
            frames,
            alt_art,
            cycle,
            max_ticks,
        } => {
            let store = open_store(&config)?;
            let frames = DirectoryFrameSource::new(&frames)?.cycling(cycle);
            if frames.is_empty() {
                bail!("No frame images found");
            }
            let source = CameraSource::new(frames, CommandOcr::from_settings(&config.ocr));
            run_scan(&config, store, Box::new(source), alt_art, max_ticks)
        }
        Command::Replay { transcript, alt_art } => {
            let store = open_store(&config)?;
            let source = TranscriptSource::from_file(&transcript)?;
            run_replay(&config, store, source, alt_art)
        }
        Command::Add { code, alt_art } => {
            let store = open_store(&config)?;
            add_manually(&config, store, &code, alt_art)
        }
        Command::Collection { action } => {
            let store = open_store(&config)?;
            run_collection(&config, &*store, action)
        }
        Command::Catalog {
            action: CatalogAction::Import { file },
        } => {
            let store = open_store(&config)?;
            let written = storage::catalog::import_catalog(&*store, &file)?;
            println!("Imported {} catalog cards", written);
            Ok(())
        }
    }
}

/// Load configuration from file or create default
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    let config_path = storage::get_config_dir()?.join("config.toml");
    if config_path.exists() {
        match config::load_config(&config_path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", config_path);
                return Ok(config);
            }
            Err(e) => warn!("Ignoring invalid configuration: {:#}", e),
        }
    } else {
        let config = AppConfig::default();
        config::save_config(&config, &config_path)?;
        info!("Wrote default configuration to {:?}", config_path);
        return Ok(config);
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn open_store(config: &AppConfig) -> Result<Arc<Database>> {
    let path = match &config.storage.database_path {
        Some(path) => path.clone(),
        None => storage::get_data_dir()?.join("collection.db"),
    };
    Ok(Arc::new(Database::open(&path)?))
}

fn new_session(config: &AppConfig, store: Arc<Database>) -> ScanSession {
    let bridge = PersistenceBridge::new(store, config.storage.catalog_policy);
    ScanSession::new(&config.scanner, bridge, config.storage.user_id.clone())
}

/// Capture loop over a live sample source
fn run_scan(
    config: &AppConfig,
    store: Arc<Database>,
    source: Box<dyn SampleSource>,
    alt_art: bool,
    max_ticks: Option<u64>,
) -> Result<()> {
    let session = Arc::new(new_session(config, store));
    let printer = spawn_event_printer(session.subscribe());

    let interval = Duration::from_millis(config.scanner.throttle_ms.max(1));
    session.set_scanning(true);
    let handle = ScanLoop::new(interval)
        .with_max_ticks(max_ticks)
        .with_alt_art(alt_art)
        .spawn(session.clone(), source);
    spawn_console_reader(handle.commands(), alt_art);
    let stats = handle.join();
    session.set_scanning(false);
    session.shutdown();

    println!(
        "{} ticks, {} skipped while busy, {} samples",
        stats.ticks, stats.skipped, stats.samples
    );
    finish_session(session, printer);
    Ok(())
}

/// Feed a transcript one throttle interval apart on the session clock
fn run_replay(config: &AppConfig, store: Arc<Database>, mut source: TranscriptSource, alt_art: bool) -> Result<()> {
    let session = Arc::new(new_session(config, store));
    let printer = spawn_event_printer(session.subscribe());
    let step = config.scanner.throttle_ms.max(1);

    info!("Replaying {} samples", source.remaining());
    session.set_scanning(true);
    let mut now_ms = 0;
    while let Some(text) = source.next_sample() {
        let transition = session.feed_at(&text, alt_art, now_ms);
        debug!("t={}ms {:?}", now_ms, transition);
        now_ms += step;
    }
    session.set_scanning(false);
    session.shutdown();

    finish_session(session, printer);
    Ok(())
}

/// Forward console lines to the scan loop. The reader is left blocked on
/// stdin when the loop ends on its own.
fn spawn_console_reader(commands: Sender<LoopCommand>, mut is_alt_art: bool) {
    println!("Commands: {}", LoopCommand::CONSOLE_HELP);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let Some(command) = LoopCommand::from_console(&line, is_alt_art) else {
                if !line.trim().is_empty() {
                    println!("Unknown command '{}' ({})", line.trim(), LoopCommand::CONSOLE_HELP);
                }
                continue;
            };
            if let LoopCommand::SetAltArt(value) = command {
                is_alt_art = value;
            }
            if commands.send(command).is_err() || command == LoopCommand::Stop {
                break;
            }
        }
    });
}

fn finish_session(session: Arc<ScanSession>, printer: JoinHandle<()>) {
    let runtime = session.runtime();
    println!("{} saved, {} failed", runtime.saved_count, runtime.failed_count);
    for scan in &runtime.recent {
        println!(
            "  {} ({}) entry {}",
            scan.full_code,
            variant_for(scan.is_alt_art),
            scan.entry_id
        );
    }
    if let Some(error) = &runtime.last_error {
        println!("Last error: {}", error);
    }

    // The printer exits once the session and its event senders are gone
    drop(session);
    let _ = printer.join();
}

fn spawn_event_printer(events: Receiver<TimestampedEvent>) -> JoinHandle<()> {
    let started = Instant::now();
    std::thread::spawn(move || {
        for stamped in events {
            let at = stamped.timestamp.saturating_duration_since(started).as_secs_f32();
            match stamped.event {
                ScanEvent::Confirmed { full_code, is_alt_art } => {
                    println!("[{:7.2}s] Confirmed {} ({})", at, full_code, variant_for(is_alt_art));
                }
                ScanEvent::SaveSucceeded { full_code, entry_id } => {
                    println!("[{:7.2}s] Saved {} as {}", at, full_code, entry_id);
                }
                ScanEvent::SaveFailed { full_code, reason } => {
                    println!("[{:7.2}s] Could not save {}: {}", at, full_code, reason);
                }
                ScanEvent::StateChanged(state) => debug!("Detection state: {:?}", state),
                ScanEvent::DisplayCleared { full_code } => debug!("Cleared {}", full_code),
            }
        }
    })
}

/// Manual entry goes straight to the bridge, without debouncing
fn add_manually(config: &AppConfig, store: Arc<Database>, text: &str, alt_art: bool) -> Result<()> {
    let Some(code) = card_code::parse_valid(text) else {
        bail!("'{}' is not a card code", text);
    };
    let bridge = PersistenceBridge::new(store, config.storage.catalog_policy);
    let entry = bridge.add_to_collection(&config.storage.user_id, code.full_code(), alt_art)?;
    println!(
        "Added {} ({}, {}) as {}",
        code.full_code(),
        variant_for(alt_art),
        card_code::set_name(code.set()),
        entry.id
    );
    Ok(())
}

fn run_collection(config: &AppConfig, store: &dyn CollectionStore, action: CollectionAction) -> Result<()> {
    let user_id = config.storage.user_id.as_str();
    match action {
        CollectionAction::List => {
            let items = store.list_collection(user_id)?;
            for item in &items {
                println!(
                    "{}  {:<9} {:<14} x{}  {}",
                    item.entry.id, item.card.code, item.card.variant, item.entry.quantity, item.card.name
                );
            }
            println!("{} entries", items.len());
        }
        CollectionAction::Recent { limit } => {
            let limit = limit.unwrap_or(config.scanner.recent_cards_limit);
            for item in store.recent_scans(user_id, limit)? {
                println!(
                    "{}  {} ({})  {}",
                    item.entry.scanned_at.to_rfc3339(),
                    item.card.code,
                    item.card.variant,
                    item.card.name
                );
            }
        }
        CollectionAction::Stats => {
            let stats = store.stats(user_id)?;
            println!("Total cards:  {}", stats.total_cards);
            println!("Unique cards: {}", stats.unique_cards);
            println!("Alt arts:     {}", stats.alt_arts);
            match stats.last_scan {
                Some(at) => println!("Last scan:    {}", at.to_rfc3339()),
                None => println!("Last scan:    never"),
            }
        }
        CollectionAction::SetQuantity { id, quantity } => match store.update_quantity(&id, quantity)? {
            Some(entry) => println!("{} now holds {}", entry.id, entry.quantity),
            None => println!("Removed {}", id),
        },
        CollectionAction::Delete { id } => {
            if store.delete_entry(&id)? {
                println!("Removed {}", id);
            } else {
                bail!("No collection entry {}", id);
            }
        }
    }
    Ok(())
}

fn print_code(code: &CardCode) {
    println!(
        "{}  set={} number={} valid={}  {}",
        code.full_code(),
        code.set(),
        code.number(),
        code.is_valid(),
        card_code::set_name(code.set())
    );
}
