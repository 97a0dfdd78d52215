//! Posture Coach Agent CLI
//!
//! On-device posture detection and break coaching.

use clap::{Parser, Subcommand};
use posture_coach_agent::{
    config::Config,
    report::{ReportDispatcher, RetryPolicy},
    runtime::{create_shared_status, spawn_reporter, Agent, ReportSink, Reporter, StatusSnapshot},
    sampler::SimulatedPeripheral,
    telemetry::create_shared_log_with_persistence,
    ApiConfig, BlockingApiClient, LogActuator, DATA_DECLARATION, VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "posture-coach")]
#[command(author = "Posture Coach")]
#[command(version = VERSION)]
#[command(about = "On-device posture detection and break coaching", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        /// Use the simulated peripheral instead of real sensors
        #[arg(long)]
        simulate: bool,

        /// Verbose logging
        #[arg(long)]
        debug: bool,

        /// Serve the status API on this port (requires server feature)
        #[arg(long)]
        serve: Option<u16>,

        /// Seed for the simulated peripheral
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Validate the configuration file
    CheckConfig,

    /// Show configuration
    Config,

    /// Show delivery and break statistics from previous sessions
    Status,

    /// Display data declaration
    Data,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            simulate,
            debug,
            serve,
            seed,
        } => {
            cmd_run(simulate, debug, serve, seed);
        }
        Commands::CheckConfig => {
            cmd_check_config();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Data => {
            println!("{DATA_DECLARATION}");
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug {
        "posture_coach_agent=debug,posture_coach=debug"
    } else {
        "posture_coach_agent=info,posture_coach=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cmd_run(simulate: bool, debug: bool, serve: Option<u16>, seed: Option<u64>) {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };
    init_logging(debug || config.debug);

    let config = match config.validated() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            eprintln!("Run 'posture-coach check-config' for details.");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    if !simulate {
        eprintln!("Error: no hardware peripheral is available on this host.");
        eprintln!("Run with --simulate to use the simulated sensor.");
        std::process::exit(1);
    }

    let device_id = config.device.resolve_device_id();

    println!("Posture Coach Agent v{VERSION}");
    println!();
    println!("  Device ID: {device_id}");
    println!("  Posture endpoint: {}", config.device.posture_url());
    println!("  Sensor endpoint: {}", config.device.sensor_url());
    println!(
        "  Thresholds: posture {} / anomaly {}",
        config.thresholds.posture_threshold, config.thresholds.anomaly_threshold
    );
    println!(
        "  Breaks: every {}-{} min",
        config.breaks.interval_min_minutes, config.breaks.interval_max_minutes
    );
    println!(
        "  Privacy mode: {}",
        if config.privacy_mode { "on" } else { "off" }
    );

    let telemetry = create_shared_log_with_persistence(config.data_path.join("telemetry.json"));

    // Reporting thread
    let client = match BlockingApiClient::new(ApiConfig::from_config(&config, device_id.clone())) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error creating API client: {e}");
            std::process::exit(1);
        }
    };
    match client.test_connection() {
        Ok(true) => println!("  API connection: OK"),
        Ok(false) => eprintln!("Warning: API health check failed; reports will be retried"),
        Err(e) => eprintln!("Warning: Could not reach API ({e}); reports will be retried"),
    }

    let (handoff_tx, handoff_rx) = crossbeam_channel::bounded(config.tasks.handoff_capacity);
    let dispatcher = ReportDispatcher::new(
        client,
        RetryPolicy::from_config(&config.reporting),
        config.reporting.queue_capacity,
        telemetry.clone(),
    );
    let reporter = Reporter::new(
        dispatcher,
        handoff_rx,
        config.tasks.report_interval,
        config.tasks.priority_medium,
    );
    let reporter_handle = match spawn_reporter(reporter) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error starting reporter: {e}");
            std::process::exit(1);
        }
    };

    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    let status = create_shared_status(StatusSnapshot::new(device_id.clone(), telemetry.stats()));

    // Status API
    #[cfg(feature = "server")]
    let server = serve.and_then(|port| {
        start_server(
            port,
            status.clone(),
            command_tx.clone(),
            Config::clone(&config),
        )
    });
    #[cfg(not(feature = "server"))]
    if serve.is_some() {
        eprintln!("Warning: --serve ignored (server feature not enabled at compile time)");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut agent = Agent::builder(config.clone(), SimulatedPeripheral::new(seed), LogActuator)
        .status(status)
        .build(ReportSink::new(handoff_tx, telemetry.clone()), command_rx);
    agent.run(&running);

    for (name, stats) in agent.task_stats() {
        tracing::debug!(
            task = name,
            runs = stats.runs,
            deadline_misses = stats.deadline_misses,
            worst_case_us = stats.worst_case_us,
            "Task statistics"
        );
    }

    // Dropping the agent closes the handoff; the reporter makes a final flush.
    drop(agent);
    println!();
    println!("Stopping...");
    if reporter_handle.join().is_err() {
        eprintln!("Warning: reporter thread panicked");
    }

    #[cfg(feature = "server")]
    if let Some((runtime, shutdown_tx)) = server {
        let _ = shutdown_tx.send(());
        runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    }
    drop(command_tx);

    // Save telemetry
    if let Err(e) = telemetry.save() {
        eprintln!("Warning: Could not save telemetry: {e}");
    }

    // Final stats
    println!();
    println!("{}", telemetry.summary());
}

/// Start the status API on a background runtime.
#[cfg(feature = "server")]
fn start_server(
    port: u16,
    status: posture_coach_agent::runtime::SharedStatus,
    commands: crossbeam_channel::Sender<posture_coach_agent::runtime::Command>,
    settings: Config,
) -> Option<(tokio::runtime::Runtime, tokio::sync::oneshot::Sender<()>)> {
    use posture_coach_agent::server::{run, ServerConfig};

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Warning: Could not start status API runtime: {e}");
            return None;
        }
    };

    let config = ServerConfig::new(port, status, commands)
        .with_settings(settings)
        .with_bind(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    match runtime.block_on(run(config)) {
        Ok((addr, shutdown_tx)) => {
            println!("  Status API: http://{addr}");
            Some((runtime, shutdown_tx))
        }
        Err(e) => {
            eprintln!("Warning: Could not start status API: {e}");
            None
        }
    }
}

fn cmd_check_config() {
    let path = Config::config_path();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading {path:?}: {e}");
            std::process::exit(1);
        }
    };

    match config.validated() {
        Ok(_) => {
            if path.exists() {
                println!("Configuration OK ({path:?})");
            } else {
                println!("No config file at {path:?}; defaults are valid");
            }
        }
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Posture Coach Agent Status");
    println!("==========================");
    println!();

    println!("Configuration:");
    println!("  Device ID: {}", config.device.device_id.as_deref().unwrap_or("(derived at start)"));
    println!("  API URL: {}", config.device.api_url);
    println!(
        "  Posture detection: {}",
        if config.features.posture_detection {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Sensor monitoring: {}",
        if config.features.sensor_monitoring {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Privacy mode: {}", config.privacy_mode);
    println!();

    // Load and show persisted telemetry if available
    let stats_path = config.data_path.join("telemetry.json");
    if !stats_path.exists() {
        println!("No previous session data found.");
        return;
    }

    let stats = std::fs::read_to_string(&stats_path)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok());
    let Some(stats) = stats else {
        eprintln!("Could not read {stats_path:?}");
        return;
    };

    println!("Cumulative Statistics:");
    for (label, key) in [
        ("Samples taken", "samples_taken"),
        ("Sensor unavailable", "sensor_unavailable"),
        ("Sensor faults", "sensor_faults"),
        ("Posture transitions", "posture_transitions"),
        ("Reports enqueued", "reports_enqueued"),
        ("Reports delivered", "reports_delivered"),
        ("Delivery retries", "delivery_retries"),
        ("Reports dropped", "reports_dropped"),
        ("Queue overflows", "queue_overflows"),
        ("Breaks due", "breaks_due"),
        ("Breaks taken", "breaks_acknowledged"),
        ("Breaks snoozed", "breaks_snoozed"),
        ("Escalations", "escalations"),
    ] {
        if let Some(value) = stats.get(key) {
            println!("  {label}: {value}");
        }
    }

    let lost = ["reports_dropped", "queue_overflows"]
        .iter()
        .filter_map(|key| stats.get(*key).and_then(|v| v.as_u64()))
        .sum::<u64>();
    println!();
    println!("Telemetry losses: {lost}");
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
