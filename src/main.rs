mod cli;

use tracklift::{config, import, probe};
use tracklift_core::TrackId;
use tracklift_import::SessionStatus;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tracklift=trace,tracklift_import=trace,tracklift_media=debug,tracklift_core=debug"
                .to_string()
        } else {
            "tracklift=info,tracklift_import=info,tracklift_media=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::Import {
            file,
            tracks,
            capacity,
            cancel_after,
            json,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(capacity) = capacity {
                config.import.queue_capacity = capacity;
                config.check()?;
            }
            let options = import::ImportOptions {
                tracks: tracks.into_iter().map(TrackId).collect(),
                cancel_after,
            };
            import_file(&file, &config, &options, json)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("tracklift {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let report = probe::probe_file(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", report.file_path.display());
    println!("Size: {} bytes", report.file_size);
    let secs = report.duration as u64;
    println!(
        "Duration: {:02}:{:02}:{:02}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    println!("Faststart: {}", if report.faststart { "yes" } else { "no" });
    if let Some(interval) = report.max_keyframe_interval {
        println!("Max keyframe interval: {:.3}s", interval);
    }

    println!("\nTracks: {}", report.tracks.len());
    for track in &report.tracks {
        print!(
            "  [{}] {} {} {} samples, {:.3}s",
            track.id,
            track.kind,
            track.codec,
            track.sample_count,
            track.duration_secs()
        );
        if let (Some(w), Some(h)) = (track.width, track.height) {
            print!(", {}x{}", w, h);
        }
        if let (Some(rate), Some(channels)) = (track.sample_rate, track.channels) {
            print!(", {} Hz {}ch", rate, channels);
        }
        if let Some(ref lang) = track.language {
            print!(" ({})", lang);
        }
        println!();
    }

    Ok(())
}

fn import_file(
    file: &Path,
    config: &config::Config,
    options: &import::ImportOptions,
    json: bool,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let report = import::import_file(file, config, options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("File: {}", file.display());
        for track in &report.tracks {
            print!(
                "  [{}] {} {}: {} samples ({} sync), {} bytes",
                track.id, track.kind, track.codec, track.samples, track.sync_samples, track.bytes
            );
            if let (Some(first), Some(last)) = (track.first_dts, track.last_dts) {
                print!(", dts {}..{} /{}", first, last, track.timescale);
            }
            println!();
        }
        println!("Samples: {}", report.total_samples());
        println!("Status: {}", report.status);
        println!("Progress: {:.1}%", report.progress * 100.0);
    }

    if let SessionStatus::Failed(detail) = &report.status {
        anyhow::bail!("Import failed: {}", detail);
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Queue capacity: {}", config.import.queue_capacity);
    println!("  Progress event step: {}", config.import.progress_event_step);
    println!("  Worker thread prefix: {}", config.import.thread_name_prefix);
    println!("  Event bus capacity: {}", config.events.capacity);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }

    Ok(())
}
