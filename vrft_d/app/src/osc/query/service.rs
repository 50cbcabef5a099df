use crate::osc::parameters::{AvatarParameters, ParamType};
use crate::reload::ConfigEvent;
use anyhow::{Context, Result};
use api::StopToken;
use log::{error, info, warn};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SERVICE_TYPE: &str = "_oscjson._tcp.local.";
const CLIENT_PREFIX: &str = "VRChat-Client-";
const DEBOUNCE: Duration = Duration::from_millis(500);
const MAX_RETRIES: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const POLL: Duration = Duration::from_millis(500);

#[derive(Deserialize, Debug)]
pub(crate) struct OscQueryNode {
    #[serde(rename = "FULL_PATH")]
    full_path: String,
    #[serde(rename = "TYPE")]
    type_: Option<String>,
    #[serde(rename = "CONTENTS")]
    contents: Option<HashMap<String, OscQueryNode>>,
}

/// Watches mDNS for the game client and turns its OSC Query parameter tree
/// into [`ConfigEvent`]s.
pub struct OscQueryService {
    events: Sender<ConfigEvent>,
    changes: Receiver<String>,
    stop: StopToken,
}

type CurrentUrl = Arc<Mutex<Option<String>>>;

impl OscQueryService {
    pub fn new(events: Sender<ConfigEvent>, changes: Receiver<String>, stop: StopToken) -> Self {
        Self {
            events,
            changes,
            stop,
        }
    }

    /// Spawns the mDNS discovery and avatar refetch threads. Both exit once
    /// the stop token fires; the caller joins the returned handles.
    pub fn start(self) -> Result<Vec<JoinHandle<()>>> {
        let current_url: CurrentUrl = Arc::new(Mutex::new(None));

        let discovery = {
            let events = self.events.clone();
            let current_url = current_url.clone();
            let stop = self.stop.clone();
            thread::Builder::new()
                .name("osc-query-mdns".into())
                .spawn(move || discovery_loop(events, current_url, stop))
                .context("Failed to spawn mDNS discovery thread")?
        };

        let Self {
            events,
            changes,
            stop,
        } = self;
        let refetch = thread::Builder::new()
            .name("osc-query-refetch".into())
            .spawn(move || refetch_loop(changes, events, current_url, stop))
            .context("Failed to spawn avatar refetch thread")?;

        Ok(vec![discovery, refetch])
    }
}

fn discovery_loop(events: Sender<ConfigEvent>, current_url: CurrentUrl, stop: StopToken) {
    info!("Starting mDNS Discovery Thread...");

    while !stop.is_stopped() {
        let mdns = match ServiceDaemon::new() {
            Ok(d) => d,
            Err(e) => {
                error!("Failed to create mDNS daemon: {}. Retrying in 5s...", e);
                stop.wait_timeout(Duration::from_secs(5));
                continue;
            }
        };

        let receiver = match mdns.browse(SERVICE_TYPE) {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to browse for service: {}. Retrying in 5s...", e);
                let _ = mdns.shutdown();
                stop.wait_timeout(Duration::from_secs(5));
                continue;
            }
        };

        info!("mDNS Daemon started. Browsing for {}...", SERVICE_TYPE);

        while !stop.is_stopped() {
            let event = match receiver.recv_timeout(POLL) {
                Ok(event) => event,
                Err(_) if receiver.is_disconnected() => break,
                Err(_) => continue,
            };

            match event {
                ServiceEvent::ServiceResolved(info) => {
                    let instance_name = info.get_fullname().split('.').next().unwrap_or("");
                    if !instance_name.starts_with(CLIENT_PREFIX) {
                        info!("Ignored non-VRChat service: {}", instance_name);
                        continue;
                    }

                    let Some(ip) = info.get_addresses().iter().find(|ip| ip.is_ipv4()) else {
                        info!(
                            "Ignored VRChat service with no IPv4 address: {}",
                            instance_name
                        );
                        continue;
                    };

                    let url = format!("http://{}:{}/avatar", ip, info.get_port());
                    info!("VRChat Discovered at: {}", url);
                    *current_url.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(url.clone());

                    fetch_with_retry(&url, &events, &stop);
                }
                ServiceEvent::ServiceRemoved(_type, fullname) => {
                    if fullname.starts_with(CLIENT_PREFIX) {
                        info!(
                            "VRChat Service Removed: {}. Restarting mDNS discovery...",
                            fullname
                        );
                        *current_url.lock().unwrap_or_else(PoisonError::into_inner) = None;
                        let _ = events.send(ConfigEvent::Unloaded);
                        // Fresh daemon; removals usually follow an interface change.
                        break;
                    }
                }
                _ => {}
            }
        }

        let _ = mdns.shutdown();
        stop.wait_timeout(Duration::from_secs(2));
    }
    info!("mDNS discovery thread exiting");
}

fn refetch_loop(
    changes: Receiver<String>,
    events: Sender<ConfigEvent>,
    current_url: CurrentUrl,
    stop: StopToken,
) {
    let mut last_fetch: Option<Instant> = None;

    while !stop.is_stopped() {
        match changes.recv_timeout(POLL) {
            Ok(_avatar_id) => {}
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_fetch.is_some_and(|last| last.elapsed() < DEBOUNCE) {
            info!("Avatar change debounced (too rapid).");
            continue;
        }

        info!("Avatar Change Signal Received. Re-fetching...");
        last_fetch = Some(Instant::now());

        let url = current_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match url {
            Some(url) => fetch_with_retry(&url, &events, &stop),
            None => warn!("Avatar change received but VRChat service not yet discovered."),
        }
    }
}

/// Fetches on the calling thread. Retry delays are cut short by `stop`.
fn fetch_with_retry(url: &str, events: &Sender<ConfigEvent>, stop: &StopToken) {
    for attempt in 1..=MAX_RETRIES {
        if stop.is_stopped() {
            return;
        }
        info!(
            "Fetching avatar info (Attempt {}/{})...",
            attempt, MAX_RETRIES
        );
        match fetch_avatar_parameters(url) {
            Ok(params) => {
                info!("Successfully fetched {} parameters.", params.len());
                let _ = events.send(ConfigEvent::Loaded(params));
                return;
            }
            Err(e) => {
                warn!(
                    "Failed to fetch avatar parameters: {}. Retrying in {:?}...",
                    e, RETRY_DELAY
                );
                if stop.wait_timeout(RETRY_DELAY) {
                    return;
                }
            }
        }
    }
    error!(
        "Failed to fetch avatar parameters after {} attempts.",
        MAX_RETRIES
    );
}

fn fetch_avatar_parameters(url: &str) -> Result<AvatarParameters> {
    let root: OscQueryNode = ureq::get(url)
        .timeout(Duration::from_secs(2))
        .call()?
        .into_json()?;
    Ok(avatar_parameters(&root))
}

/// Flattens the `parameters` subtree of an `/avatar` node.
pub(crate) fn avatar_parameters(root: &OscQueryNode) -> AvatarParameters {
    let mut params = AvatarParameters::new();
    if let Some(parameters) = root.contents.as_ref().and_then(|c| c.get("parameters")) {
        flatten_node(parameters, &mut params);
    }
    params
}

fn flatten_node(node: &OscQueryNode, params: &mut AvatarParameters) {
    if let Some(contents) = &node.contents {
        for child in contents.values() {
            flatten_node(child, params);
        }
    }

    // A node can carry both children and a type.
    if let Some(type_tag) = node.type_.as_deref().filter(|t| !t.is_empty()) {
        params.insert(
            node.full_path.clone(),
            ParamType::from_osc_type_tag(type_tag),
        );
    }
}
