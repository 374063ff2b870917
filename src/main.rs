//! GHS-DRS1000 Monitor CLI
//!
//! Command-line front end for the gas handling panel and the gauge
//! controller of the DRS1000 dilution refrigerator.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ghs_monitor::acquisition::{Acquisition, AcquisitionEvent, EventKind, drain_until_idle};
use ghs_monitor::config::AppConfig;
use ghs_monitor::device::{GhsPanel, MaxiGauge, PressureGauge, SerialConnector};
use ghs_monitor::protocol::{KeyState, PanelReading};
use ghs_monitor::storage;
use ghs_monitor::utils::formatting::{IVC_CHANNEL, STILL_CHANNEL, channel_pressure};
use ghs_monitor::utils::indicators::indicator_at;
use ghs_monitor::utils::{IndicatorTracker, format_pressure};

// =============================================================================
// CLI Arguments
// =============================================================================

/// GHS-DRS1000 Monitor
#[derive(Parser, Debug)]
#[command(name = "ghs-monitor-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Panel serial port (overrides the config file)
    #[arg(long, global = true)]
    panel_port: Option<String>,

    /// Gauge controller serial port (overrides the config file)
    #[arg(long, global = true)]
    gauge_port: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll panel and gauge continuously (Ctrl+C to stop)
    Monitor {
        /// Poll period in seconds (overrides the config file)
        #[arg(short, long)]
        interval: Option<f64>,

        /// Also stop on the first transient fault
        #[arg(long)]
        stop_on_fault: bool,
    },

    /// Read the eight ADC channels once
    Adc,

    /// Read the key/indicator states once
    Keys {
        /// Show every reported index, not only named indicators
        #[arg(short, long)]
        all: bool,
    },

    /// Show the panel system status
    Status,

    /// Show the panel identification
    Id,

    /// Read the gauge pressures once
    Pressures,

    /// Show or change the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
    /// Store the panel and gauge ports
    SetPorts { panel: String, gauge: String },
    /// Store the poll period in seconds
    SetInterval { seconds: f64 },
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = storage::load_config().context("Failed to load configuration")?;
    if let Some(port) = &args.panel_port {
        config.panel_port = port.clone();
    }
    if let Some(port) = &args.gauge_port {
        config.gauge_port = port.clone();
    }

    match args.command {
        Command::Monitor {
            interval,
            stop_on_fault,
        } => {
            if let Some(seconds) = interval {
                config.update_interval_secs = seconds;
            }
            cmd_monitor(&config, stop_on_fault)
        }
        Command::Adc => cmd_adc(&config),
        Command::Keys { all } => cmd_keys(&config, all),
        Command::Status => cmd_status(&config),
        Command::Id => cmd_id(&config),
        Command::Pressures => cmd_pressures(&config),
        Command::Config { action } => cmd_config(config, action),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_monitor(config: &AppConfig, stop_on_fault: bool) -> Result<()> {
    let settings = config
        .acquisition_settings()
        .context("Invalid acquisition settings")?;

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    println!("📡 Monitoring GHS panel on {} and gauge on {} (Ctrl+C to stop)", settings.panel_port, settings.gauge_port);
    println!("   Interval: {:.2}s\n", settings.period.as_secs_f64());

    let mut acquisition = Acquisition::new();
    let events = acquisition
        .start(settings, SerialConnector)
        .context("Failed to start acquisition")?;
    let mut tracker = IndicatorTracker::new();

    while running.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => event,
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
        };

        match &event.kind {
            EventKind::Problem(true) => {
                for pending in drain_until_idle(&events, Duration::from_secs(2)) {
                    print_event(&pending, &mut tracker);
                }
                println!("❌ Initialization problem, stopping.");
                break;
            }
            EventKind::Problem(false) if stop_on_fault => {
                println!("❌ Fault reported, stopping.");
                break;
            }
            _ => print_event(&event, &mut tracker),
        }
    }

    acquisition.stop().context("Failed to stop acquisition")?;
    println!("Stopped {}", chrono::Local::now().format("[%H:%M:%S, %d-%m-%Y]"));
    Ok(())
}

fn print_event(event: &AcquisitionEvent, tracker: &mut IndicatorTracker) {
    let time = event.timestamp.format("%H:%M:%S");

    match &event.kind {
        EventKind::AdcOk(reading) => println!("{}  ADC  {}", time, reading),
        EventKind::KeysOk(keys) => {
            for change in tracker.update(keys) {
                println!(
                    "{} {}",
                    change,
                    event.timestamp.format("[%H:%M:%S, %d-%m-%Y]")
                );
            }
        }
        EventKind::PressuresOk(values) => {
            let ivc = channel_pressure(values, IVC_CHANNEL);
            let still = channel_pressure(values, STILL_CHANNEL);
            println!(
                "{}  IVC {}  STILL {}",
                time,
                ivc.map(format_pressure).unwrap_or_else(|| "-".into()),
                still.map(format_pressure).unwrap_or_else(|| "-".into()),
            );
        }
        EventKind::Message(_) => {
            if let Some(line) = event.log_line() {
                println!("{}", line);
            }
        }
        EventKind::State(state) => info!(%state, "Acquisition state changed"),
        EventKind::AdcError(_)
        | EventKind::KeysError(_)
        | EventKind::PressuresError(_)
        | EventKind::Problem(_) => {}
    }
}

fn open_panel(config: &AppConfig) -> Result<GhsPanel> {
    GhsPanel::connect(&config.panel_port)
        .with_context(|| format!("Failed to open GHS panel on {}", config.panel_port))
}

fn cmd_adc(config: &AppConfig) -> Result<()> {
    let mut panel = open_panel(config)?;
    let reply = panel.get_adc().context("Failed to read ADC")?;
    if !reply.is_ok() {
        bail!("[ADC] Error code returned: {} ({})", reply.code.code(), reply.code);
    }

    let reading = PanelReading::try_from(reply.values)?;
    println!("{}", reading);
    Ok(())
}

fn cmd_keys(config: &AppConfig, all: bool) -> Result<()> {
    let mut panel = open_panel(config)?;
    let reply = panel.get_keys().context("Failed to read keys")?;
    if !reply.is_ok() {
        bail!("[KEYS] Error code returned: {} ({})", reply.code.code(), reply.code);
    }

    for (index, state) in reply.values.iter() {
        let name = indicator_at(index).map(|i| i.name);
        if name.is_none() && !all {
            continue;
        }
        let mark = match state {
            KeyState::Asserted => "●",
            KeyState::Deasserted => "○",
            KeyState::Unknown => "?",
        };
        println!("{:>3}  {}  {}", index, mark, name.unwrap_or("-"));
    }
    Ok(())
}

fn cmd_status(config: &AppConfig) -> Result<()> {
    let mut panel = open_panel(config)?;
    let reply = panel.check_status().context("Failed to read status")?;
    if !reply.is_ok() {
        bail!("[STATUS] Error code returned: {} ({})", reply.code.code(), reply.code);
    }

    match reply.values {
        Some(status) => println!("System status: {}", status),
        None => println!("System status: (no value reported)"),
    }
    Ok(())
}

fn cmd_id(config: &AppConfig) -> Result<()> {
    let mut panel = open_panel(config)?;
    let id = panel.identify().context("Failed to read ID")?;
    let id2 = panel.identify2().context("Failed to read ID2")?;

    println!("ID:  {} ({})", id.values, id.code);
    println!("ID2: {} ({})", id2.values, id2.code);
    Ok(())
}

fn cmd_pressures(config: &AppConfig) -> Result<()> {
    let mut gauge = MaxiGauge::connect(&config.gauge_port)
        .with_context(|| format!("Failed to open gauge controller on {}", config.gauge_port))?;

    for reading in gauge.pressures().context("Failed to read pressures")? {
        println!(
            "CH{}  {}  {}",
            reading.channel,
            format_pressure(reading.pressure),
            reading.status
        );
    }
    Ok(())
}

fn cmd_config(mut config: AppConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", storage::get_config_path()?.display());
        }
        ConfigAction::SetPorts { panel, gauge } => {
            config.panel_port = panel;
            config.gauge_port = gauge;
            storage::save_config(&config).context("Failed to save configuration")?;
            println!("✅ New ports set: panel {}, gauge {}", config.panel_port, config.gauge_port);
        }
        ConfigAction::SetInterval { seconds } => {
            config.update_interval_secs = seconds;
            if let Err(e) = storage::save_config(&config) {
                warn!(error = %e, "Configuration not saved");
                return Err(e).context("Failed to save configuration");
            }
            println!("✅ Poll interval set to {}s", seconds);
        }
    }
    Ok(())
}
