//! KleagMFX controller - input engine daemon
//!
//! Polls the pedal's controls and drives the effect engine over MIDI.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mfx_controller::board::{Board, I2cPins};
use mfx_controller::config::AppConfig;
use mfx_controller::dispatcher::{ControlState, DispatcherActor};
use mfx_controller::output::OutputSinks;
use mfx_controller::ports::{self, MidiLink, PointerDevice, UinputPointer};
use mfx_controller::scheduler::PollScheduler;

/// KleagMFX controller - footswitches, encoders, keypad and joystick to MIDI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MFX_CONFIG", default_value = "mfx.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Validate the configuration and print the wiring
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref())?;

    if args.list_ports {
        print_ports()?;
        return Ok(());
    }

    info!("Starting KleagMFX controller...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;

    if args.check_config {
        print_config(&config);
        return Ok(());
    }

    run(config, shutdown_signal()).await?;

    info!("KleagMFX controller shutdown complete");
    Ok(())
}

async fn run(config: AppConfig, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
    // Hardware first, so a wiring problem fails before any port is created
    let mut pins = I2cPins::open(&config)?;
    let board = Board::build(&config, &mut pins)?;
    info!(
        toggles = config.toggles.len(),
        encoders = board.encoder_ccs.len(),
        keypad = board.inputs.keypad.is_some(),
        joystick = board.inputs.joystick.is_some(),
        "Board initialised"
    );

    let (sinks, receivers) = OutputSinks::channel();
    let state = ControlState::new(config.dispatch_settings(), config.toggles.len(), &board.encoder_ccs);
    // Nothing is driven until every port and poller is up
    let (dispatcher, pending) = DispatcherActor::prepare(state, board.indicators, sinks);

    let link = MidiLink::open(&config.midi, dispatcher.clone()).context("Failed to open MIDI ports")?;
    let midi_task = ports::midi::spawn_sender(link, receivers.midi);

    // The keypad aux buttons need the pointer even without a joystick
    let device_name = config
        .joystick
        .as_ref()
        .map(|js| js.device_name.clone())
        .unwrap_or_else(|| format!("{} Pointer", config.midi.port_name));
    let pointer: Option<Box<dyn PointerDevice>> = if config.joystick.is_some() || config.keypad.is_some() {
        Some(Box::new(UinputPointer::create(&device_name)?))
    } else {
        None
    };
    let pointer_task = ports::pointer::spawn_sender(pointer, receivers.pointer);

    // Bring the effect engine in line with the controller
    dispatcher.announce();

    let mut scheduler = PollScheduler::new();
    if let Err(e) = board.inputs.spawn(&config, &mut scheduler, &dispatcher) {
        scheduler.shutdown().await;
        return Err(e);
    }
    pending.start();
    info!(pollers = scheduler.len(), "{}", "Ready".green());

    shutdown.await;

    info!("Shutting down...");
    scheduler.shutdown().await;
    dispatcher.shutdown().await;

    // Senders drain until the dispatcher's sinks are dropped
    for (name, task) in [("MIDI", midi_task), ("pointer", pointer_task)] {
        if let Err(e) = task.await {
            warn!("{} output task failed: {}", name, e);
        }
    }

    Ok(())
}

fn init_logging(level: &str, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(true),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
}

fn print_ports() -> Result<()> {
    let (inputs, outputs) = ports::midi::list_ports()?;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());
    for (title, names) in [("Input Ports:", inputs), ("Output Ports:", outputs)] {
        println!("\n{}", title.bold());
        if names.is_empty() {
            println!("  {}", "No ports found".dimmed());
        }
        for name in names {
            println!("  {}", name);
        }
    }
    println!();
    Ok(())
}

fn print_config(config: &AppConfig) {
    println!("\n{}", "=== Configuration OK ===".bold().green());

    println!("\n{}", "Expanders:".bold());
    for expander in &config.expanders {
        println!("  {} at 0x{:02X}", expander.name.bright_white(), expander.address);
    }

    let midi = &config.midi;
    println!("\n{}", "MIDI:".bold());
    if midi.virtual_port {
        println!("  {} '{}'", "[VIRTUAL]".yellow(), midi.port_name);
    } else {
        println!(
            "  {} in '{}' / out '{}'",
            "[PORT]".green(),
            midi.input_port.as_deref().unwrap_or(&midi.port_name),
            midi.output_port.as_deref().unwrap_or(&midi.port_name)
        );
    }
    println!("  channel {}, listen {}", midi.channel + 1, midi.listen);

    println!("\n{}", "Toggles:".bold());
    for (idx, toggle) in config.toggles.iter().enumerate() {
        println!(
            "  {} button {} led {} -> CC {}",
            idx,
            toggle.button,
            toggle.led,
            usize::from(midi.toggle_base_cc) + idx
        );
    }

    println!("\n{}", "Encoders:".bold());
    for (idx, unit) in config.encoders.units.iter().enumerate() {
        let reverse = if unit.reverse { " (reversed)".yellow().to_string() } else { String::new() };
        println!(
            "  {} {} clk {} dt {} sw {} -> CC {}{}",
            idx, unit.expander, unit.clk, unit.dt, unit.sw, unit.cc, reverse
        );
    }

    match &config.keypad {
        Some(kp) => println!(
            "\n{} {} rows {:?} cols {:?}, {:?}",
            "Keypad:".bold(),
            kp.expander,
            kp.rows,
            kp.cols,
            kp.mode
        ),
        None => println!("\n{} {}", "Keypad:".bold(), "disabled".dimmed()),
    }

    match &config.joystick {
        Some(js) => println!(
            "{} ADC {}/{}, {:?} curve, power {:.2}, sensitivity {}",
            "Joystick:".bold(),
            js.x_channel,
            js.y_channel,
            js.curve,
            js.power(),
            js.sensitivity
        ),
        None => println!("{} {}", "Joystick:".bold(), "disabled".dimmed()),
    }
    println!();
}
