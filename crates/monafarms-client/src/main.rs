//! Console client for the MonaFarms reconciliation engine.
//!
//! Wires the tile cache, refresh scheduler, action dispatcher, view loop,
//! and activity tracker to an in-memory backend, then reads commands from
//! standard input until `quit`, end of input, or Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `monafarms-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing, to stderr)
//! 3. Create the demo backend and the player's farm
//! 4. Choose the time source and synchronize it if trusted
//! 5. Spawn the refresh scheduler and wait for the first farm load
//! 6. Open the activity tracker and build the dispatcher
//! 7. Spawn the view loop
//! 8. Run the command console
//! 9. Wait for pending actions, stop background tasks, and save stats

mod console;
mod demo;
mod error;
mod pending;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use monafarms_core::config::{ClientConfig, ClockMode, LoggingConfig};
use monafarms_core::{
    ActionDispatcher, ActivityTracker, CacheEvent, DispatchSettings, FarmBackend, JsonFileStore,
    MemoryBackend, MemoryStore, RefreshHandle, RefreshReason, RefreshScheduler,
    RefreshTarget, SharedTileCache, StatsStore, SyncedClock, TimeSource, WallClock,
    spawn_view_loop,
};
use monafarms_farm::availability::offered_actions;
use monafarms_types::{FarmAction, FarmView, PlayerAddress, TileIndex};

use crate::console::{Command, ParseError};
use crate::error::ClientError;
use crate::pending::PendingActions;

type Backend = MemoryBackend<WallClock>;
type Clock = Arc<dyn TimeSource>;

/// Path of the configuration file, relative to the working directory.
const CONFIG_PATH: &str = "monafarms-config.yaml";

/// Application entry point for the console client.
///
/// # Errors
///
/// Returns an error if configuration, the stats store, or the console
/// fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("monafarms-client starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    let player = config.player_address().map_err(ClientError::from)?;
    info!(
        player = %player,
        refresh_interval_ms = config.refresh.periodic_interval_ms,
        action_timeout_ms = config.actions.timeout_ms,
        clock_mode = ?config.clock.mode,
        "Configuration loaded"
    );

    // 3. Demo backend.
    let backend = Arc::new(MemoryBackend::new(
        WallClock::new(),
        config.farm.rarity_rules(),
    ));
    demo::seed(&backend, &player).await;

    // 4. Time source.
    let synced = Arc::new(SyncedClock::new());
    let clock: Clock = match config.clock.mode {
        ClockMode::Trusted => {
            let chain_time = backend.read_chain_time().await.map_err(ClientError::from)?;
            let offset = synced.observe_trusted(chain_time);
            info!(offset_secs = offset, "Clock synchronized to chain time");
            Arc::clone(&synced) as Clock
        }
        ClockMode::Local => Arc::new(WallClock::new()),
    };

    // 5. Refresh scheduler.
    let cache = SharedTileCache::new();
    let mut scheduler = RefreshScheduler::new(
        config.refresh.clone(),
        Arc::clone(&backend),
        cache.clone(),
        player.clone(),
    );
    if config.clock.mode == ClockMode::Trusted {
        scheduler = scheduler.with_clock_sync(Arc::clone(&synced));
    }
    let mut cache_events = cache.subscribe();
    let (refresh, scheduler_task) = scheduler.spawn();
    wait_for_first_load(&mut cache_events, config.refresh.read_timeout()).await;

    // 6. Activity tracker and dispatcher.
    let store: Box<dyn StatsStore> = match &config.stats.path {
        Some(path) => Box::new(JsonFileStore::new(path)),
        None => Box::new(MemoryStore::new()),
    };
    let activity = Arc::new(
        ActivityTracker::open(player.clone(), store, config.stats.activity_capacity)
            .map_err(ClientError::from)?,
    );
    let dispatcher = Arc::new(
        ActionDispatcher::new(
            Arc::clone(&backend),
            cache.clone(),
            Arc::clone(&clock),
            player.clone(),
            refresh.clone(),
            DispatchSettings::from_config(&config),
        )
        .with_activity(Arc::clone(&activity)),
    );

    // 7. View loop.
    let (view, view_task) =
        spawn_view_loop(cache.clone(), Arc::clone(&clock), config.clock.view_tick());

    // 8. Console.
    let mut session = Session {
        backend,
        cache,
        dispatcher,
        refresh: refresh.clone(),
        view,
        activity: Arc::clone(&activity),
        player,
        clock,
        pending: PendingActions::default(),
    };
    println!("{}", console::render_farm(&session.view.borrow()));
    println!("type 'help' for commands");
    run_console(&mut session).await.map_err(ClientError::from)?;

    // 9. Shutdown. Pending submissions finish first so their receipts are
    // recorded before the final save.
    session.pending.drain().await;
    drop(session);
    refresh.shutdown();
    scheduler_task.await.map_err(|e| ClientError::Task {
        message: format!("refresh scheduler: {e}"),
    })?;
    view_task.await.map_err(|e| ClientError::Task {
        message: format!("view loop: {e}"),
    })?;
    activity.flush().map_err(ClientError::from)?;

    info!(
        actions = activity.stats().total_actions(),
        "monafarms-client shutdown complete"
    );
    Ok(())
}

/// Load configuration from [`CONFIG_PATH`], falling back to defaults.
///
/// Returns whether the file was found.
fn load_config() -> Result<(ClientConfig, bool), ClientError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        Ok((ClientConfig::from_file(path)?, true))
    } else {
        Ok((ClientConfig::default(), false))
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn wait_for_first_load(events: &mut broadcast::Receiver<CacheEvent>, limit: Duration) {
    match timeout(limit, events.recv()).await {
        Ok(Ok(_)) => info!("Farm loaded"),
        Ok(Err(e)) => warn!(error = %e, "Tile cache closed before the first load"),
        Err(_elapsed) => warn!(
            timeout_ms = limit.as_millis(),
            "Initial farm load not finished, continuing with an empty view"
        ),
    }
}

/// Everything a console command can touch.
struct Session {
    backend: Arc<Backend>,
    cache: SharedTileCache,
    dispatcher: Arc<ActionDispatcher<Backend, Clock>>,
    refresh: RefreshHandle,
    view: watch::Receiver<FarmView>,
    activity: Arc<ActivityTracker>,
    player: PlayerAddress,
    clock: Clock,
    pending: PendingActions,
}

async fn run_console(session: &mut Session) -> Result<(), std::io::Error> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            return Ok(());
        };
        match console::parse(&line) {
            Ok(Command::Quit) => return Ok(()),
            Ok(command) => session.execute(command).await,
            Err(ParseError::Empty) => {}
            Err(e) => println!("{e}"),
        }
    }
}

impl Session {
    async fn execute(&mut self, command: Command) {
        match command {
            Command::Show => println!("{}", console::render_farm(&self.view.borrow())),
            Command::Act { tile, action } => self.submit(tile, action),
            Command::Actions { tile } => self.show_actions(tile).await,
            Command::Refresh { tile } => {
                let target = tile.map_or(RefreshTarget::All, RefreshTarget::Tile);
                match self.refresh.schedule_refresh(target, RefreshReason::Manual) {
                    Ok(()) => println!("refreshing {target}"),
                    Err(e) => println!("{e}"),
                }
            }
            Command::Inventory => match self.backend.read_inventory(&self.player).await {
                Ok(inventory) => println!("{}", console::render_inventory(&inventory)),
                Err(e) => println!("could not read inventory: {e}"),
            },
            Command::Crops => println!("{}", console::render_crops()),
            Command::Stats => {
                println!("{}", console::render_stats(&self.activity.stats()));
                if let Err(e) = self.activity.flush() {
                    warn!(error = %e, "Could not save stats");
                }
            }
            Command::Help => println!("{}", console::HELP),
            Command::Quit => {}
        }
    }

    /// Submit in the background so the console stays responsive while the
    /// action is pending.
    fn submit(&mut self, tile: TileIndex, action: FarmAction) {
        let dispatcher = Arc::clone(&self.dispatcher);
        println!("{} on tile {tile}: submitted", action.kind());
        self.pending.spawn(async move {
            match dispatcher.submit(tile, action).await {
                Ok(receipt) => println!(
                    "{} on tile {tile}: confirmed ({})",
                    action.kind(),
                    receipt.tx_hash
                ),
                Err(e) => println!("{} on tile {tile}: {}", action.kind(), e.user_message()),
            }
        });
    }

    async fn show_actions(&self, tile: TileIndex) {
        let Some(record) = self.cache.get(tile).await else {
            println!("tile {tile} is not loaded");
            return;
        };
        match self.backend.read_inventory(&self.player).await {
            Ok(inventory) => {
                let offered = offered_actions(&record, self.clock.now(), &inventory);
                println!("{}", console::render_actions(tile, &offered));
            }
            Err(e) => println!("could not read inventory: {e}"),
        }
    }
}
