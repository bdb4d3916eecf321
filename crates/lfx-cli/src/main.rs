//! loopfx: command-line control surface for the loopback processing pipeline
//!
//! `loopfx devices` lists the playback endpoints (the capture side is a
//! loopback monitor of one of them); `loopfx run` loads the configuration,
//! starts the engine and shows live level / gain-reduction meters until
//! Enter is pressed.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use lfx_audio::{AudioEngine, DeviceManager};
use lfx_core::{linear_to_db, SharedParams, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use lfx_state::AppConfig;

#[derive(Parser)]
#[command(name = "loopfx", version, about = "System-audio loopback post-processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List playback endpoints
    Devices,
    /// Run the processing pipeline
    Run {
        /// Configuration file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Block size override in frames
        #[arg(long)]
        block_size: Option<u32>,

        /// Endpoint whose monitor mix is captured (overrides the config)
        #[arg(long)]
        capture_from: Option<String>,

        /// Endpoint the processed stream plays to (overrides the config)
        #[arg(long)]
        play_to: Option<String>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Devices => list_devices(),
        Command::Run {
            config,
            block_size,
            capture_from,
            play_to,
        } => run(config, block_size, capture_from, play_to),
    };
    std::process::exit(code);
}

fn list_devices() -> i32 {
    let manager = DeviceManager::new();
    let devices = manager.devices();

    if devices.is_empty() {
        eprintln!("no playback endpoints found");
        return 1;
    }

    println!("Playback endpoints (capture is a loopback monitor of one):");
    for (idx, device) in devices.iter().enumerate() {
        let marker = if device.is_default { " (default)" } else { "" };
        println!(
            "  [{idx}] {}{marker} - {} ch, {:?} Hz",
            device.name, device.channels, device.sample_rates
        );
    }
    0
}

fn run(
    config_path: Option<PathBuf>,
    block_size: Option<u32>,
    capture_from: Option<String>,
    play_to: Option<String>,
) -> i32 {
    let config = match &config_path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    log::info!(
        "loaded config \"{}\" with {} EQ bands",
        config.name,
        config.bands.len()
    );

    let params = Arc::new(SharedParams::new());
    config.apply_to_params(&params);

    if let Some(block_size) = block_size {
        params
            .block_size
            .store(block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE), Ordering::Relaxed);
    }

    // Resolve display names to endpoint indices; flags win over the config
    let manager = DeviceManager::new();
    let capture_name = capture_from.or_else(|| non_empty(&config.devices.capture_from));
    let play_name = play_to.or_else(|| non_empty(&config.devices.play_to));

    let capture_idx = resolve(&manager, capture_name.as_deref(), "capture");
    let playback_idx = resolve(&manager, play_name.as_deref(), "playback");

    let mut engine = AudioEngine::new(Arc::clone(&params));
    if !engine.start(capture_idx, playback_idx) {
        eprintln!(
            "start failed [{}]: {}",
            engine.status().as_str(),
            engine.error_detail()
        );
        return 1;
    }

    println!("running - press Enter to stop");
    let meters = engine.meters();

    // Watch stdin from a helper thread so the meter loop stays responsive
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = tx.send(());
    });

    loop {
        if rx.recv_timeout(Duration::from_millis(200)).is_ok() {
            break;
        }
        print!(
            "\r[{}] in {:>6.1}/{:>6.1} dB  out {:>6.1}/{:>6.1} dB  GR {:>5.1} dB   ",
            engine.status().as_str(),
            linear_to_db(meters.input_l.load(Ordering::Relaxed)),
            linear_to_db(meters.input_r.load(Ordering::Relaxed)),
            linear_to_db(meters.output_l.load(Ordering::Relaxed)),
            linear_to_db(meters.output_r.load(Ordering::Relaxed)),
            meters.gain_reduction_db.load(Ordering::Relaxed),
        );
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }
    println!();

    engine.stop();

    // Write the (possibly flag-adjusted) settings back to the document
    let mut saved = config;
    saved.update_from_params(&params);
    if let Some(name) = capture_name {
        saved.devices.capture_from = name;
    }
    if let Some(name) = play_name {
        saved.devices.play_to = name;
    }
    let result = match &config_path {
        Some(path) => saved.save_to(path),
        None => saved.save(),
    };
    if let Err(e) = result {
        log::warn!("config save failed: {e}");
    }

    0
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn resolve(manager: &DeviceManager, name: Option<&str>, role: &str) -> Option<usize> {
    match name {
        Some(name) => match manager.resolve_index(Some(name)) {
            Some(idx) => Some(idx),
            None => {
                log::warn!("{role} endpoint \"{name}\" not found, using default");
                None
            }
        },
        None => None,
    }
}
