//! Command handlers.

use crate::app::{App, Observed};
use crate::config::{CliConfig, OutputFormat};
use crate::history::IpHistory;
use chrono::Utc;
use console::style;
use ipscope_cache::{ClientSession, ReconcileService};
use ipscope_core::IpSnapshot;
use ipscope_core::ports::{CacheStorage, IpLookup};
use ipscope_net::IpInfoClient;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type HandlerResult = Result<(), Box<dyn std::error::Error>>;

async fn start(config: &CliConfig) -> Result<App, Box<dyn std::error::Error>> {
    let cache_dir = config.cache_dir()?;
    Ok(App::start(config.clone(), cache_dir).await?)
}

fn load_history(config: &CliConfig) -> Result<IpHistory, Box<dyn std::error::Error>> {
    Ok(IpHistory::load(
        CliConfig::history_path()?,
        config.history_limit,
    )?)
}

fn print_structured<T: Serialize>(format: OutputFormat, value: &T) -> HandlerResult {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Json | OutputFormat::Table => {
            println!("{}", serde_json::to_string_pretty(value)?)
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &IpSnapshot) {
    println!("{} {}", style("●").green(), style(&snapshot.ip).bold());
    if let Some(hostname) = &snapshot.hostname {
        println!("  Hostname: {}", hostname);
    }
    if let Some(location) = snapshot.location() {
        println!("  Location: {}", location);
    }
    if let Some(org) = &snapshot.org {
        println!("  Network:  {}", org);
    }
}

/// Record a fresh observation and hand it to the caching layer.
async fn record(app: &App, history: &mut IpHistory, snapshot: &IpSnapshot) -> HandlerResult {
    history.record(snapshot, Utc::now());
    history.save()?;
    app.remember(snapshot).await;
    Ok(())
}

/// Show the current public address.
pub async fn show(config: &CliConfig) -> HandlerResult {
    let app = start(config).await?;
    let Observed {
        snapshot,
        cached_at,
    } = app.lookup().await?;

    match cached_at {
        Some(_) => debug!("Serving cached lookup"),
        None => {
            let mut history = load_history(config)?;
            record(&app, &mut history, &snapshot).await?;
        }
    }

    match config.output_format {
        OutputFormat::Table => {
            print_snapshot(&snapshot);
            if let Some(at) = cached_at {
                println!(
                    "{} Offline, showing result cached at {}",
                    style("!").yellow(),
                    at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        format => print_structured(format, &snapshot)?,
    }
    Ok(())
}

/// Compare the current address with the last recorded one.
pub async fn check(config: &CliConfig) -> HandlerResult {
    let client = IpInfoClient::new(config.lookup.clone())?;
    let current = client.current_ip().await?;
    let mut history = load_history(config)?;

    let previous = history.latest().map(|e| e.snapshot.ip.clone());
    match previous.as_deref() {
        Some(ip) if ip == current => {
            println!("{} Address unchanged: {}", style("✓").green(), current);
            return Ok(());
        }
        Some(ip) => println!(
            "{} Address changed: {} → {}",
            style("!").yellow(),
            style(ip).dim(),
            style(&current).bold()
        ),
        None => println!("{} Current address: {}", style("i").blue(), current),
    }

    let app = start(config).await?;
    let routed = IpInfoClient::with_fetcher(config.lookup.clone(), app.registration.clone());
    let snapshot = routed.lookup().await?;
    record(&app, &mut history, &snapshot).await?;
    print_snapshot(&snapshot);
    Ok(())
}

/// Watch for address changes until interrupted.
pub async fn watch(config: &CliConfig, interval: Option<u64>) -> HandlerResult {
    let app = start(config).await?;
    let lookup: Arc<dyn IpLookup> = Arc::new(IpInfoClient::new(config.lookup.clone())?);
    let interval = interval
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.reconcile_interval());

    let mut history = load_history(config)?;
    let mut session = ClientSession::new(history.latest().map(|e| e.snapshot.ip.clone()));
    let mut connection = app.clients().connect().await;

    let service = Arc::new(ReconcileService::new(
        lookup,
        app.clients().clone(),
        interval,
    ));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = {
        let service = service.clone();
        tokio::spawn(async move { service.run(shutdown_rx).await })
    };

    println!(
        "Watching for address changes every {}s (Ctrl+C to stop)...",
        interval.as_secs()
    );
    if let Some(ip) = session.last_ip() {
        println!("  Last known: {}", style(ip).dim());
    }

    loop {
        tokio::select! {
            message = connection.rx.recv() => {
                let Some(message) = message else { break };
                match session.handle(&message) {
                    Some(snapshot) => {
                        println!(
                            "{} [{}] Address is now {}",
                            style("▶").cyan(),
                            Utc::now().format("%H:%M:%S"),
                            style(&snapshot.ip).bold()
                        );
                        record(&app, &mut history, &snapshot).await?;
                    }
                    None => debug!("Address unchanged"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    task.await?;
    app.clients().disconnect(connection.id).await;
    println!("{} Stopped", style("✓").green());
    Ok(())
}

/// List or clear the address history.
pub fn history(config: &CliConfig, clear: bool) -> HandlerResult {
    let mut history = load_history(config)?;

    if clear {
        history.clear();
        history.save()?;
        println!("{} History cleared", style("✓").green());
        return Ok(());
    }

    match config.output_format {
        OutputFormat::Table => {
            if history.is_empty() {
                println!("{} No addresses recorded", style("i").blue());
                return Ok(());
            }
            for entry in history.entries() {
                println!(
                    "{:<40} {}  {}",
                    style(&entry.snapshot.ip).bold(),
                    entry.last_seen.format("%Y-%m-%d %H:%M"),
                    style(entry.snapshot.location().unwrap_or_default()).dim()
                );
            }
        }
        format => print_structured(format, &history.entries())?,
    }
    Ok(())
}

/// Show the installed cache version.
pub async fn cache_version(config: &CliConfig) -> HandlerResult {
    let app = start(config).await?;
    println!("{}", app.version().await?);
    Ok(())
}

/// List cache partitions and their entries.
pub async fn list_cache(config: &CliConfig) -> HandlerResult {
    let app = start(config).await?;

    let mut partitions = BTreeMap::new();
    for name in app.store.keys().await? {
        let entries = app.store.entries(&name).await?;
        partitions.insert(name, entries);
    }

    match config.output_format {
        OutputFormat::Table => {
            if partitions.values().all(Vec::is_empty) {
                println!("{} No cache entries", style("i").blue());
            }
            for (name, entries) in &partitions {
                if entries.is_empty() {
                    continue;
                }
                println!("{} ({} entries)", style(name).bold(), entries.len());
                for entry in entries {
                    let stored = entry
                        .stored_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default();
                    println!(
                        "  {} {:>8}B  {}  {}",
                        entry.status,
                        entry.size_bytes,
                        style(stored).dim(),
                        entry.key.url
                    );
                }
            }
        }
        format => print_structured(format, &partitions)?,
    }
    Ok(())
}

/// Delete every cache partition.
pub async fn clear_cache(config: &CliConfig) -> HandlerResult {
    let app = start(config).await?;
    app.clear().await?;
    println!("{} Cache cleared", style("✓").green());
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> HandlerResult {
    println!("Current configuration:");
    println!("  lookup.base_url: {}", config.lookup.base_url);
    println!(
        "  lookup.token: {}",
        if config.lookup.token.is_some() {
            "***"
        } else {
            "(not set)"
        }
    );
    println!("  lookup.timeout_ms: {}", config.lookup.timeout_ms);
    println!("  worker.origin: {}", config.worker.origin);
    println!("  worker.version: {}", config.worker.version);
    println!("  worker.fetch_timeout_ms: {}", config.worker.fetch_timeout_ms);
    println!("  worker.install_policy: {:?}", config.worker.install_policy);
    match config.cache_dir() {
        Ok(dir) => println!("  cache_dir: {}", dir.display()),
        Err(_) => println!("  cache_dir: (unavailable)"),
    }
    println!("  history_limit: {}", config.history_limit);
    println!(
        "  reconcile_interval_secs: {}",
        config.reconcile_interval_secs
    );
    println!("  output_format: {:?}", config.output_format);

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}
