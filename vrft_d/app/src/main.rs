use anyhow::{Context, Result};
use api::{Channels, StopToken};
use common::{Config, TrackingStore};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use vrft_d::modules::{builtin, ModuleDiscovery, ModuleManager};
use vrft_d::osc::{
    spawn_avatar_listener, OscQueryService, OscTransport, ParameterRegistry, UdpOscSocket,
};
use vrft_d::reload::{self, ConfigEvent};
use vrft_d::status::{spawn_status_logger, StatusAggregate};
use vrft_d::status_host::spawn_status_host;
use vrft_d::MainLoop;

fn config_path() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return PathBuf::from(path);
        }
    }
    PathBuf::from("config.json")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting...");
    debug!("Debug logging is active");

    let stop = StopToken::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            info!("Received Ctrl-C, shutting down...");
            stop.stop();
        })
        .expect("Error setting Ctrl-C handler");
    }

    let config_path = config_path();
    let config = Config::load_or_create(&config_path).unwrap_or_else(|e| {
        error!("Failed to load config: {:#}. Using defaults.", e);
        Config::default()
    });
    debug!("Loaded Config: {:?}", config);

    let store = Arc::new(TrackingStore::new());
    let registry = Arc::new(ParameterRegistry::new());

    // Avatar configuration
    let (events_tx, events_rx) = channel::<ConfigEvent>();
    let reload_worker =
        reload::spawn_reload_worker(events_rx, registry.clone(), store.clone(), stop.clone())?;

    let mut workers: Vec<(&str, JoinHandle<()>)> = vec![("config reload", reload_worker)];
    if config.osc.query_enabled {
        let (change_tx, change_rx) = channel::<String>();
        let query = OscQueryService::new(events_tx.clone(), change_rx, stop.clone()).start()?;
        workers.extend(query.into_iter().map(|h| ("OSC query", h)));
        match UdpOscSocket::listener(config.osc.receive_port, Duration::from_millis(500)) {
            Ok(socket) => workers.push((
                "OSC listener",
                spawn_avatar_listener(socket, change_tx, stop.clone())?,
            )),
            Err(e) => warn!("Avatar change listener disabled: {:#}", e),
        }
    } else {
        info!(
            "OSC Query disabled, using {} static parameters",
            config.osc.static_parameters.len()
        );
        events_tx
            .send(ConfigEvent::Loaded(reload::static_parameters(
                &config.osc.static_parameters,
            )))
            .context("Config reload worker is gone")?;
    }

    // Modules
    let status = Arc::new(StatusAggregate::new());
    spawn_status_logger(status.subscribe())?;

    let discovery = ModuleDiscovery::new(&config.modules.directory)
        .with_builtins(builtin::descriptors(&config));
    let manager = Arc::new(ModuleManager::new(
        discovery,
        status,
        store.clone(),
        config.frame_interval(),
    ));
    manager.start(Channels::new(config.modules.eye, config.modules.lip))?;

    if config.status_host.enabled {
        match spawn_status_host(config.status_host.port, manager.clone(), stop.clone()) {
            Ok((handle, _addr)) => workers.push(("status host", handle)),
            Err(e) => error!("Status host disabled: {:#}", e),
        }
    }

    // Output
    let socket = UdpOscSocket::sender()?;
    let transport = OscTransport::new(
        socket,
        config.osc.target_addr(),
        config.osc.max_bundle_bytes,
    );
    let main_loop = MainLoop::new(
        store,
        registry,
        transport,
        Duration::from_millis(config.osc.tick_ms.max(1)),
    );
    main_loop.run(&stop);

    info!("Shutting down...");
    manager.teardown();
    drop(events_tx);
    stop.stop();
    for (name, handle) in workers {
        if handle.join().is_err() {
            error!("{} thread panicked", name);
        }
    }

    info!("Shutdown complete.");
    Ok(())
}
