//! Windows Service entry point for Memory Cleaner
//!
//! Runs the automatic optimization triggers from the user config under the
//! service control manager until stopped.

#[cfg(windows)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use windows_service::{
        define_windows_service,
        service::{
            ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
            ServiceType,
        },
        service_control_handler::{self, ServiceControlHandlerResult},
        service_dispatcher,
    };
    use std::ffi::OsString;
    use std::sync::mpsc;
    use std::time::Duration;
    use tracing::{error, info};

    use memory_cleaner::{
        create_backend, AutoOptimizer, MemoryOptimizer, OptimizationGate, OptimizerConfig,
    };

    const SERVICE_NAME: &str = "MemoryCleaner";
    const CHECK_INTERVAL: Duration = Duration::from_secs(60);

    define_windows_service!(ffi_service_main, service_main);

    fn service_main(arguments: Vec<OsString>) {
        if let Err(e) = run_service(arguments) {
            error!("Service error: {}", e);
        }
    }

    fn run_service(_arguments: Vec<OsString>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();

        let event_handler = move |control_event| -> ServiceControlHandlerResult {
            match control_event {
                ServiceControl::Stop => {
                    let _ = shutdown_tx.send(());
                    ServiceControlHandlerResult::NoError
                }
                ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
                _ => ServiceControlHandlerResult::NotImplemented,
            }
        };

        let status_handle = service_control_handler::register(SERVICE_NAME, event_handler)?;

        status_handle.set_service_status(ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: ServiceState::Running,
            controls_accepted: ServiceControlAccept::STOP,
            exit_code: ServiceExitCode::Win32(0),
            checkpoint: 0,
            wait_hint: Duration::default(),
            process_id: None,
        })?;

        let optimizer = MemoryOptimizer::new(create_backend());
        let mut config = OptimizerConfig::default_path()
            .and_then(|path| OptimizerConfig::load_or_default(&path))
            .unwrap_or_else(|e| {
                error!("{}; using default configuration", e);
                OptimizerConfig::default()
            });
        config.sanitize(optimizer.capabilities());

        let gate = OptimizationGate::new();
        let mut scheduler = AutoOptimizer::new(&config);
        info!(
            "Service started (areas: {}, automatic: {})",
            config.memory_areas.describe(),
            scheduler.is_enabled()
        );

        loop {
            match shutdown_rx.recv_timeout(CHECK_INTERVAL) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    scheduler.run_scheduled(&optimizer, &gate, &config);
                }
            }
        }

        info!("Service stopping");
        status_handle.set_service_status(ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: ServiceState::Stopped,
            controls_accepted: ServiceControlAccept::empty(),
            exit_code: ServiceExitCode::Win32(0),
            checkpoint: 0,
            wait_hint: Duration::default(),
            process_id: None,
        })?;

        Ok(())
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .init();

    service_dispatcher::start(SERVICE_NAME, ffi_service_main)?;
    Ok(())
}

#[cfg(not(windows))]
fn main() {
    eprintln!("Windows service only runs on Windows");
}
