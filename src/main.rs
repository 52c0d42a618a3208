//! dc-import - Concurrent two-phase importer
//!
//! Entry point for the CLI application.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use dc_import::bridge::{FileGeometry, FsBridge};
use dc_import::config::{AppConfig, CliArgs};
use dc_import::import::{ImportDriver, ImportSummary, LoadMode};
use dc_import::progress::{print_header, print_summary, ProgressReporter};
use dc_import::ImportEvent;
use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = AppConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(&config.sources, config.import.worker_count, config.reload);
    }

    let bridge = FsBridge::new(config.max_payload)
        .with_exclude_patterns(config.exclude_patterns.clone());
    let driver = Arc::new(ImportDriver::new(bridge, config.import));

    // Setup signal handler for graceful shutdown
    let cancel_flag = driver.cancel_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping import...");
        cancel_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let summary = run_pass(&driver, &config, LoadMode::Import)?;
    print_summary("Import Complete", &summary, total_bytes(&driver));

    if config.reload && summary.completed {
        let summary = run_pass(&driver, &config, LoadMode::Reload)?;
        print_summary("Reload Complete", &summary, total_bytes(&driver));
    }

    if let Some(ref path) = config.tree_json {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        driver
            .tree()
            .snapshot()
            .write_json(BufWriter::new(file))
            .context("Failed to write tree snapshot")?;
        info!(path = %path.display(), "Tree snapshot written");
    }

    Ok(())
}

/// Queue every source in `mode` and run one batch on the control thread
fn run_pass(
    driver: &Arc<ImportDriver<FsBridge>>,
    config: &AppConfig,
    mode: LoadMode,
) -> Result<ImportSummary> {
    let events = driver.subscribe();

    for source in &config.sources {
        driver.enqueue(source.display().to_string(), source.clone(), mode);
    }

    let progress = if config.show_progress {
        Some(ProgressReporter::new())
    } else {
        None
    };

    let handle = driver.spawn().context("Failed to start import thread")?;

    let report = |event: &ImportEvent<FileGeometry>| {
        if let Some(ref p) = progress {
            p.handle(event);
        }
    };

    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(ImportEvent::RenderSuspendRequested(false)) => break,
            Ok(event) => report(&event),
            Err(RecvTimeoutError::Timeout) if handle.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let summary = handle
        .join()
        .map_err(|_| anyhow!("Import thread panicked"))?
        .context("Nothing to import")?;

    for event in events.try_iter() {
        report(&event);
    }

    if let Some(ref p) = progress {
        if summary.completed {
            p.finish("Import completed");
        } else {
            p.finish("Import interrupted");
        }
    }

    if !summary.completed {
        warn!(
            remaining = driver.pending_items(),
            "Import was interrupted before completion"
        );
    }

    Ok(summary)
}

/// Bytes held by every applied node
fn total_bytes(driver: &ImportDriver<FsBridge>) -> u64 {
    let tree = driver.tree();
    tree.roots()
        .iter()
        .flat_map(|root| tree.children(root.id()))
        .filter_map(|node| node.geometry())
        .map(|geometry| geometry.size())
        .sum()
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("dc_import=debug,warn")
    } else {
        EnvFilter::new("dc_import=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
