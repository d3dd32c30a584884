//! CLI Command Implementations
//!
//! Each command opens a [`DashboardStore`] over the configured storage
//! directory, loads the saved layout, acts on it and saves it back.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};

use crate::config::EngineConfig;
use crate::layout::{duplicate_ids, grid_height, Layout, LayoutItem, LayoutItemPatch};
use crate::state::{
    migrate_fallback_to_durable, FileDurableStore, FileKeyValueStore, LegacyMigration,
    PersistenceManager,
};
use crate::store::DashboardStore;
use crate::sync::SyncStatus;

const WATCH_TICK: Duration = Duration::from_millis(100);
const PUSH_GRACE: Duration = Duration::from_secs(1);

fn open_store(config: &EngineConfig) -> DashboardStore {
    let mut store = DashboardStore::open(config);
    store.load();
    store
}

fn store_error(store: &DashboardStore, fallback: &str) -> anyhow::Error {
    anyhow!(store.error().unwrap_or(fallback).to_string())
}

fn save(store: &mut DashboardStore) -> Result<()> {
    if !store.save() {
        return Err(store_error(store, "save failed"));
    }
    Ok(())
}

fn print_layout(layout: &Layout) {
    if layout.is_empty() {
        println!("Layout is empty.");
        return;
    }

    println!(
        "{:<20} {:<20} {:>4} {:>4} {:>4} {:>4}  flags",
        "id", "component", "x", "y", "w", "h"
    );
    println!("{:-<70}", "");
    for item in layout {
        let flag = if item.is_pinned() { "static" } else { "" };
        println!(
            "{:<20} {:<20} {:>4} {:>4} {:>4} {:>4}  {}",
            item.id, item.component, item.x, item.y, item.w, item.h, flag
        );
    }
    println!("{:-<70}", "");
    println!("{} items, {} rows", layout.len(), grid_height(layout));

    let duplicates = duplicate_ids(layout);
    if !duplicates.is_empty() {
        warn!("Duplicate ids in layout: {}", duplicates.join(", "));
    }
    for (a, b) in overlapping_pairs(layout) {
        warn!("Widgets '{}' and '{}' overlap", a, b);
    }
}

fn overlapping_pairs(layout: &Layout) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for (i, a) in layout.iter().enumerate() {
        for b in &layout[i + 1..] {
            if a.overlaps(b) {
                pairs.push((a.id.as_str(), b.id.as_str()));
            }
        }
    }
    pairs
}

/// Print the saved layout.
pub fn show(config: &EngineConfig, json: bool) -> Result<()> {
    let store = open_store(config);
    if let Some(err) = store.error() {
        bail!("{}", err);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(store.layout())?);
    } else {
        print_layout(store.layout());
        if let Some(saved) = store.last_saved() {
            println!("Last saved: {}", saved.to_rfc3339());
        }
    }
    Ok(())
}

/// Add a widget and save.
pub fn add(
    config: &EngineConfig,
    id: &str,
    component: &str,
    (x, y, w, h): (u32, u32, u32, u32),
    props: Option<&str>,
    pinned: bool,
) -> Result<()> {
    let mut item = LayoutItem::new(id, component, x, y, w, h);
    if let Some(props) = props {
        let value = serde_json::from_str(props).context("--props must be valid JSON")?;
        item = item.with_props(value);
    }
    if pinned {
        item = item.pinned();
    }

    let mut store = open_store(config);
    if !store.add_item(item) {
        return Err(store_error(&store, "add failed"));
    }
    save(&mut store)?;

    println!("Added {} ({})", id, component);
    Ok(())
}

/// Remove a widget and save.
pub fn remove(config: &EngineConfig, id: &str) -> Result<()> {
    let mut store = open_store(config);
    if !store.remove_item(id) {
        bail!("No widget with id '{}'", id);
    }
    save(&mut store)?;

    println!("Removed {}", id);
    Ok(())
}

/// Patch a widget and save.
pub fn update(
    config: &EngineConfig,
    id: &str,
    (x, y, w, h): (Option<u32>, Option<u32>, Option<u32>, Option<u32>),
    component: Option<String>,
) -> Result<()> {
    let patch = LayoutItemPatch {
        x,
        y,
        w,
        h,
        component,
        ..LayoutItemPatch::default()
    };
    if patch.is_empty() {
        bail!("Nothing to update; pass at least one of -x, -y, -w, --height, --component");
    }

    let mut store = open_store(config);
    if !store.update_item(id, &patch) {
        bail!("No widget with id '{}'", id);
    }
    save(&mut store)?;

    println!("Updated {}", id);
    Ok(())
}

/// Import the legacy fallback record into durable storage.
pub fn migrate(config: &EngineConfig) -> Result<()> {
    let mut durable = FileDurableStore::open(&config.durable_dir());
    let mut fallback = FileKeyValueStore::new(&config.fallback_path());

    let outcome = migrate_fallback_to_durable(
        &mut durable,
        &mut fallback,
        &config.legacy_key,
        &config.layout_key,
    )?;

    match outcome {
        LegacyMigration::NothingToMigrate => println!("Nothing to migrate."),
        LegacyMigration::Migrated(layout) => {
            println!("Migrated {} items into record '{}'", layout.len(), config.layout_key)
        }
        LegacyMigration::ImportFailed { reason, .. } => {
            bail!("Migration failed, legacy record kept: {}", reason)
        }
    }
    Ok(())
}

/// Parse a `--since` value: RFC 3339 or epoch milliseconds.
fn parse_since(raw: &str) -> Result<i64> {
    if let Ok(millis) = raw.trim().parse::<i64>() {
        return Ok(millis);
    }
    let time = chrono::DateTime::parse_from_rfc3339(raw.trim())
        .with_context(|| format!("--since {:?} is neither RFC 3339 nor epoch millis", raw))?;
    Ok(time.timestamp_millis())
}

/// List (or clear) durable layout records.
pub fn records(config: &EngineConfig, since: Option<&str>, clear: bool) -> Result<()> {
    let mut persistence = PersistenceManager::with_keys(
        Box::new(FileDurableStore::open(&config.durable_dir())),
        Box::new(FileKeyValueStore::new(&config.fallback_path())),
        config.layout_key.clone(),
        config.legacy_key.clone(),
    );

    if clear {
        let removed = persistence.clear_records()?;
        println!("Deleted {} durable records.", removed);
        return Ok(());
    }

    let records = match since {
        Some(raw) => persistence.list_records_since(parse_since(raw)?)?,
        None => persistence.list_records()?,
    };

    if records.is_empty() {
        println!("No durable records.");
        return Ok(());
    }

    println!("  {:<24} {:>6} {:>8}  saved", "id", "items", "version");
    println!("{:-<72}", "");
    for record in records {
        let saved = chrono::DateTime::from_timestamp_millis(record.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| record.timestamp.to_string());
        let active = if record.id == persistence.layout_key() { "*" } else { " " };
        println!(
            "{} {:<24} {:>6} {:>8}  {}",
            active,
            record.id,
            record.layout.len(),
            record.version,
            saved
        );
    }
    Ok(())
}

/// One-shot request/response sync of the saved layout.
pub fn push(config: &EngineConfig) -> Result<()> {
    if !config.sync.enabled {
        bail!("Sync is disabled in the configuration");
    }

    let mut store = open_store(config);
    store.sync();

    let give_up = Instant::now() + config.sync.http_timeout() + PUSH_GRACE;
    while store
        .sync_engine()
        .map_or(false, |sync| sync.is_delivery_pending())
    {
        if Instant::now() >= give_up {
            bail!("Push to {} did not finish", config.sync.http_url);
        }
        thread::sleep(WATCH_TICK);
        store.poll();
    }

    if store.sync_status() != SyncStatus::Success {
        return Err(store_error(&store, "sync failed"));
    }
    println!("Pushed {} items to {}", store.layout().len(), config.sync.http_url);
    Ok(())
}

/// Live sync loop. Adopted remote layouts are saved by autosave.
pub fn watch(config: &EngineConfig, seconds: Option<u64>) -> Result<()> {
    if !config.sync.enabled {
        bail!("Sync is disabled in the configuration");
    }

    let mut store = open_store(config);
    let stop_at = seconds.map(|s| Instant::now() + Duration::from_secs(s));

    store.start();
    info!("Watching {} ({})", config.sync.ws_url, store.connection_state());

    let mut state = store.connection_state();
    let mut layout = store.layout().clone();
    loop {
        store.poll();

        if store.connection_state() != state {
            state = store.connection_state();
            println!("Connection: {}", state);
        }
        if *store.layout() != layout {
            layout = store.layout().clone();
            println!("Layout changed ({} items)", layout.len());
        }
        if let Some(err) = store.error() {
            warn!("{}", err);
            store.clear_error();
        }

        if stop_at.map_or(false, |at| Instant::now() >= at) {
            break;
        }
        let wait = store
            .next_deadline()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(WATCH_TICK)
            .min(WATCH_TICK);
        thread::sleep(wait);
    }

    store.shutdown();
    Ok(())
}

const SHELL_HELP: &str = "\
commands:
  show                          print the layout
  add <id> <component> x y w h  add a widget
  remove <id>                   remove a widget
  move <id> x y                 move a widget
  resize <id> w h               resize a widget
  undo | redo                   step through history
  clear-history                 forget undo/redo states
  save | load                   persist or reload
  connect | disconnect          live sync channel
  sync                          push the layout now
  status                        store status
  quit                          save and exit";

fn parse_u32(arg: Option<&str>, name: &str) -> Result<u32> {
    let raw = arg.ok_or_else(|| anyhow!("missing {}", name))?;
    raw.parse()
        .with_context(|| format!("{} must be a non-negative integer", name))
}

fn print_status(store: &DashboardStore) {
    println!(
        "items={} dirty={} undo={} redo={} connection={} sync={}",
        store.layout().len(),
        store.is_dirty(),
        store.can_undo(),
        store.can_redo(),
        store.connection_state(),
        store.sync_status()
    );
    if let Some(saved) = store.last_saved() {
        println!("last saved {}", saved.to_rfc3339());
    }
    if let Some(err) = store.error() {
        println!("error: {}", err);
    }
}

/// Run one shell line. Returns false when the session should end.
fn run_shell_line(store: &mut DashboardStore, line: &str) -> Result<bool> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(true);
    };

    match command {
        "help" => println!("{}", SHELL_HELP),
        "show" => print_layout(store.layout()),
        "add" => {
            let id = parts.next().ok_or_else(|| anyhow!("missing id"))?;
            let component = parts.next().ok_or_else(|| anyhow!("missing component"))?;
            let x = parse_u32(parts.next(), "x")?;
            let y = parse_u32(parts.next(), "y")?;
            let w = parse_u32(parts.next(), "w")?;
            let h = parse_u32(parts.next(), "h")?;
            if !store.add_item(LayoutItem::new(id, component, x, y, w, h)) {
                println!("not added");
            }
        }
        "remove" => {
            let id = parts.next().ok_or_else(|| anyhow!("missing id"))?;
            if !store.remove_item(id) {
                println!("no widget '{}'", id);
            }
        }
        "move" | "resize" => {
            let id = parts.next().ok_or_else(|| anyhow!("missing id"))?;
            let a = parse_u32(parts.next(), "first value")?;
            let b = parse_u32(parts.next(), "second value")?;
            let patch = if command == "move" {
                LayoutItemPatch::position(a, b)
            } else {
                LayoutItemPatch::size(a, b)
            };
            if !store.update_item(id, &patch) {
                println!("no widget '{}'", id);
            }
        }
        "undo" => {
            if !store.undo() {
                println!("nothing to undo");
            }
        }
        "redo" => {
            if !store.redo() {
                println!("nothing to redo");
            }
        }
        "clear-history" => store.clear_history(),
        "save" => {
            store.save();
        }
        "load" => {
            if !store.load() {
                println!("no saved layout");
            }
        }
        "connect" => store.reconnect(),
        "disconnect" => store.disconnect(),
        "sync" => store.sync(),
        "status" => print_status(store),
        "quit" | "exit" => return Ok(false),
        other => println!("unknown command '{}', try 'help'", other),
    }
    Ok(true)
}

/// Line-oriented editing session over stdin.
pub fn shell(config: &EngineConfig) -> Result<()> {
    let mut store = open_store(config);
    if config.sync.enabled {
        store.start();
    }

    println!("gridsync shell, 'help' for commands");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        store.poll();
        match run_shell_line(&mut store, line.trim()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("error: {}", e),
        }
        if let Some(err) = store.error() {
            println!("error: {}", err);
            store.clear_error();
        }
    }

    store.shutdown();
    Ok(())
}
