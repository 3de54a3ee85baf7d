//! Memory Cleaner - reclaim physical memory on Windows
//!
//! Without a subcommand the arguments are memory area tokens and the binary
//! runs one headless optimization, e.g. `memory-cleaner /StandbyList /WorkingSet`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use memory_cleaner::{
    create_backend, AutoOptimizer, MemoryArea, MemoryBackend, MemoryOptimizer, MemoryStatus,
    OptimizationGate, OptimizationReason, OptimizationReport, OptimizationRequest,
    OptimizerConfig, Progress,
};

#[derive(Parser)]
#[command(name = "memory-cleaner", version)]
#[command(about = "Reclaims physical memory from the Windows memory manager", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Memory areas to optimize once, e.g. /StandbyList /WorkingSet
    #[arg(value_name = "AREA", allow_hyphen_values = true)]
    areas: Vec<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: per-user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one-time optimization
    Optimize {
        /// Areas to optimize (default: the configured areas)
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        areas: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current memory status and supported areas
    Status,

    /// Show configuration
    Config {
        /// Only print the config file location
        #[arg(long)]
        path: bool,
    },

    /// Start the automatic optimization loop
    Daemon {
        /// Seconds between trigger checks
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => OptimizerConfig::default_path()?,
    };

    match cli.command {
        None if cli.areas.is_empty() => print_status(&MemoryOptimizer::new(create_backend())),

        // Headless run: always exits 0, the outcome goes to the log.
        None => {
            let config = load_config(&config_path);
            let areas = parse_areas(&cli.areas);
            let request = OptimizationRequest::new(OptimizationReason::CommandLine, areas)
                .with_excluded_processes(config.excluded_processes.iter().cloned());
            let optimizer = MemoryOptimizer::new(create_backend());
            optimizer.optimize(&request, |_| {});
        }

        Some(Commands::Optimize { areas, json }) => {
            let optimizer = MemoryOptimizer::new(create_backend());
            let mut config = load_config(&config_path);
            let request = if areas.is_empty() {
                config.sanitize(optimizer.capabilities());
                config.request(OptimizationReason::Manual)
            } else {
                OptimizationRequest::new(OptimizationReason::Manual, parse_areas(&areas))
                    .with_excluded_processes(config.excluded_processes.iter().cloned())
            };

            if request.areas.is_empty() {
                println!("Nothing to optimize on this system.");
                return Ok(());
            }

            let report = optimizer.optimize(&request, |progress| {
                if !json {
                    print_progress(progress);
                }
            });

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Some(Commands::Status) => print_status(&MemoryOptimizer::new(create_backend())),

        Some(Commands::Config { path }) => {
            if path {
                println!("{}", config_path.display());
            } else {
                let config = OptimizerConfig::load_or_default(&config_path)?;
                println!("# {}", config_path.display());
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }

        Some(Commands::Daemon { interval }) => {
            let optimizer = MemoryOptimizer::new(create_backend());
            let mut config = load_config(&config_path);
            config.sanitize(optimizer.capabilities());

            info!(
                "Starting optimization daemon (areas: {}, check every {}s)",
                config.memory_areas.describe(),
                interval
            );

            let mut scheduler = AutoOptimizer::new(&config);
            scheduler
                .run_loop(
                    Arc::new(optimizer),
                    Arc::new(OptimizationGate::new()),
                    Arc::new(config),
                    Duration::from_secs(interval.max(1)),
                )
                .await;
        }
    }

    Ok(())
}

/// Config from `path`, or defaults when it cannot be read.
fn load_config(path: &std::path::Path) -> OptimizerConfig {
    OptimizerConfig::load_or_default(path).unwrap_or_else(|e| {
        warn!("{}; using default configuration", e);
        OptimizerConfig::default()
    })
}

fn parse_areas(tokens: &[String]) -> MemoryArea {
    let (areas, unknown) = MemoryArea::from_tokens(tokens.iter().map(String::as_str));
    for token in unknown {
        warn!("Ignoring unknown memory area '{}'", token);
    }
    areas
}

fn print_progress(progress: &Progress) {
    println!(
        "[{}/{}] {:>3}% {}",
        progress.step,
        progress.total,
        progress.percentage(),
        progress.label
    );
}

fn print_report(report: &OptimizationReport) {
    println!("Optimization complete ({}):", report.reason);
    for result in &report.results {
        let outcome = match result.error_message() {
            None => "ok".to_string(),
            Some(message) => message,
        };
        println!(
            "  {:<28} {:>6.1}s  {}",
            result.area.label(),
            result.duration.as_secs_f64(),
            outcome
        );
    }
    println!("  Duration:  {:.1}s", report.total_duration.as_secs_f64());
    if let Some(freed) = report.freed_mb() {
        println!("  Freed:     {:.1} MB", freed);
    }
}

fn print_status<B: MemoryBackend>(optimizer: &MemoryOptimizer<B>) {
    let caps = optimizer.capabilities();
    let status = optimizer
        .backend()
        .memory_status()
        .unwrap_or_else(MemoryStatus::current);

    println!("Memory Status:");
    println!("  Total:     {:.0} MB", status.total_physical_mb);
    println!("  Available: {:.0} MB", status.available_physical_mb);
    println!("  Used:      {:.0} MB", status.used_physical_mb());
    println!("  Load:      {}%", status.memory_load_percent);
    println!(
        "  Pressure:  {}",
        if status.is_high_pressure() { "HIGH" } else { "Normal" }
    );
    println!();
    match caps.version {
        Some(version) => println!(
            "Windows {} ({}-bit)",
            version,
            if caps.is_64bit { 64 } else { 32 }
        ),
        None => println!(
            "Platform: {} (no memory areas available)",
            memory_cleaner::platform::platform_name()
        ),
    }
    println!("Supported areas:");
    for area in MemoryArea::execution_order() {
        let mark = if caps.supports(area) { "yes" } else { "no" };
        let token = area.token().unwrap_or_default();
        println!("  {:<28} {:<4} /{}", area.label(), mark, token);
    }
}
