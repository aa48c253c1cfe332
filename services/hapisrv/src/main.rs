//! HAPI node service (`hapisrv`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use common::service_bootstrap::print_startup_banner;
use common::shutdown::cancel_on_signal;
use hapi_model::Site;
use hapi_store::Store;
use hapisrv::bootstrap::{self, Args};
use hapisrv::console::{self, Console};
use hapisrv::device::{ArpScanner, Communicator, DeviceLink, Registry};
use hapisrv::router::{mqtt, MqttPublisher, Publisher, Router};
use hapisrv::scheduler::{JobExecutor, Scheduler};
use hapisrv::status::StatusReporter;
use hapisrv::telemetry::TelemetrySink;
use hapisrv::HapiConfig;

/// How long running tasks get to finish after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = HapiConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    let service = bootstrap::service_info();
    let _log_guard = bootstrap::initialize_logging(&args, &service, &config)?;
    if !args.no_color {
        print_startup_banner(&service);
    }

    if args.validate {
        bootstrap::validate_configuration(&config)?;
        info!("Validation completed successfully");
        return Ok(());
    }

    // ============ Store ============
    let node = config.node_name();
    let store = Store::open(&config.database.path, node.clone())
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    info!("Node {} using database {}", node, config.database.path);

    let site = match store.load_site().await {
        Ok(Some(site)) => site,
        Ok(None) => {
            warn!("No site profile configured");
            Site::default()
        },
        Err(e) => {
            warn!("Failed to load site profile: {}", e);
            Site::default()
        },
    };

    // ============ Devices ============
    let link: Arc<dyn DeviceLink> = Arc::new(Communicator::new(&config.devices));
    let scanner = ArpScanner::new(
        config.devices.signature.clone(),
        Duration::from_secs(config.devices.scan_timeout_secs),
    );
    let registry = Arc::new(Registry::new(
        store.clone(),
        link,
        Box::new(scanner),
        config.devices.clone(),
    ));

    let iface = config.devices.scan_iface(&site.net_iface);
    let online = registry.discover(&iface).await;
    let incongruent = registry.validate_pin_modes(&online).await;
    if !incongruent.is_empty() {
        let ids: Vec<&str> = incongruent.iter().map(|r| r.rtuid.as_str()).collect();
        warn!("Pin configuration mismatch on: {}", ids.join(", "));
    }

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let status = Arc::new(StatusReporter::new(
        env!("CARGO_PKG_VERSION"),
        config.node.is_scheduler,
    ));
    let executor = Arc::new(JobExecutor::new(
        Arc::clone(&registry),
        TelemetrySink::new(store.clone()),
        store.clone(),
        Arc::clone(&status),
    ));
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // ============ Scheduler ============
    // `stop` from the console shuts the whole node down
    let control = if config.scheduler.enabled {
        let (mut scheduler, handle) = Scheduler::new(
            store.clone(),
            Arc::clone(&executor),
            Duration::from_millis(config.scheduler.tick_ms),
            cancel.clone(),
        );
        if let Err(e) = scheduler.load().await {
            warn!("Failed to load jobs: {}", e);
        }
        tasks.push(tokio::spawn(scheduler.run()));
        Some(handle)
    } else {
        info!("Scheduler disabled");
        None
    };

    // ============ Pub/sub ============
    if config.mqtt.enabled {
        let client_id = config.mqtt.client_id.clone().unwrap_or_else(|| node.clone());
        let (client, eventloop) = mqtt::connect(&config.mqtt, &client_id);
        let publisher: Arc<dyn Publisher> = Arc::new(MqttPublisher::new(client.clone()));
        let router = Arc::new(Router::new(
            store.clone(),
            Arc::clone(&registry),
            Arc::clone(&status),
            publisher,
            &config.asset,
            config.console.command_timeout(),
        )
        .with_sync_payload_limit(config.mqtt.max_payload_bytes()));
        tasks.push(tokio::spawn(mqtt::run_event_loop(
            eventloop,
            client,
            router,
            config.mqtt.clone(),
            client_id,
            cancel.clone(),
        )));
    } else {
        info!("MQTT disabled");
    }

    // ============ Console ============
    if config.console.enabled {
        let listener = console::bind(&config.console.bind).await?;
        let console = Arc::new(Console::new(
            site,
            store.clone(),
            Arc::clone(&executor),
            control,
            Arc::clone(&status),
            config.console.command_timeout(),
        ));
        tasks.push(tokio::spawn(console::serve(
            listener,
            console,
            config.console.max_sessions,
            cancel.clone(),
        )));
    }

    info!("hapisrv started");
    cancel.cancelled().await;

    info!("Shutting down...");
    for task in tasks {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("Task did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }
    store.close().await;
    info!("hapisrv stopped");
    Ok(())
}
