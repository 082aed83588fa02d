mod address;
mod broker;
mod clock;
mod config;
mod heartbeat;
mod logging;
mod pools;
mod shutdown;
mod transport;
mod utils;
mod wire;

use std::process;
use std::sync::Arc;

use broker::{Broker, BrokerOptions};
use clock::MonotonicClock;
use config::{AppConfig, ConfigSource};
use logging::{LogLevel, Logger, LoggerConfig};
use serde_json::json;
use shutdown::ShutdownHooks;
use transport::tcp::TcpRouter;
use utils::runtime::{ensure_posix_or_exit, exit_startup_failure, EXIT_BROKER_FAILURE};
use utils::startup_banner::print_startup_banner;

fn main() {
    ensure_posix_or_exit();
    print_startup_banner();

    let source = ConfigSource::from_args(std::env::args().skip(1));
    let app_config = AppConfig::load(&source)
        .unwrap_or_else(|error| exit_startup_failure(&format!("configuration error: {error}")));
    let log_level = LogLevel::from_config_value(&app_config.logging.level).unwrap_or_else(|| {
        exit_startup_failure(&format!(
            "invalid logging.level '{}'. Allowed values: error, warn, info, debug, verbose",
            app_config.logging.level
        ))
    });

    let logger = Arc::new(Logger::new(LoggerConfig {
        min_level: log_level,
        human_friendly: app_config.logging.human_friendly,
    }));
    if source.explicit_path {
        logger.info(
            Some("main::config"),
            &format!("Using config file: {}", source.path.display()),
        );
    }

    let frontend = TcpRouter::bind(&app_config.frontend)
        .unwrap_or_else(|error| exit_startup_failure(&format!("frontend bind error: {error}")));
    let backend = TcpRouter::bind(&app_config.backend)
        .unwrap_or_else(|error| exit_startup_failure(&format!("backend bind error: {error}")));
    logger.log(
        LogLevel::Info,
        Some("main::transport"),
        "Channels bound",
        Some(json!({
            "frontend": app_config.frontend,
            "frontend_local_addr": frontend.local_addr().ok().map(|addr| addr.to_string()),
            "backend": app_config.backend,
            "backend_local_addr": backend.local_addr().ok().map(|addr| addr.to_string()),
            "client_violations": app_config.broker.client_violations
        })),
    );

    let shutdown_hooks = ShutdownHooks::install().unwrap_or_else(|error| {
        exit_startup_failure(&format!("failed to install shutdown hooks: {error}"))
    });
    logger.info(
        Some("main::shutdown"),
        "Shutdown hooks installed for SIGINT/SIGTERM",
    );

    let mut broker = Broker::new(
        frontend,
        backend,
        Arc::new(MonotonicClock::new()),
        Arc::clone(&logger),
        BrokerOptions {
            heartbeat: app_config.heartbeat_config(),
            client_violations: app_config.broker.client_violations,
        },
    )
    .unwrap_or_else(|error| exit_startup_failure(&format!("broker configuration error: {error}")));

    if let Err(error) = broker.run(&shutdown_hooks.signal()) {
        logger.error(Some("main::broker"), &format!("fatal broker error: {error}"));
        process::exit(EXIT_BROKER_FAILURE);
    }

    drop(broker);
    logger.info(
        Some("main::shutdown"),
        "Shutdown signal received, channels closed",
    );
}
