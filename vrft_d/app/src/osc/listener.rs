use super::socket::OscSocket;
use anyhow::{Context, Result};
use api::StopToken;
use log::{error, info};
use rosc::{decoder, OscPacket, OscType};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

const AVATAR_CHANGE: &str = "/avatar/change";

/// Spawns the receive thread that forwards avatar ids from `/avatar/change`.
///
/// The socket must have a read timeout so the thread notices `stop`.
pub fn spawn_avatar_listener<S>(
    socket: S,
    changes: Sender<String>,
    stop: StopToken,
) -> Result<JoinHandle<()>>
where
    S: OscSocket + 'static,
{
    thread::Builder::new()
        .name("osc-listener".into())
        .spawn(move || {
            let mut buf = [0u8; 2048];
            while !stop.is_stopped() {
                match socket.receive(&mut buf) {
                    Ok(Some(size)) => {
                        if let Ok((_, packet)) = decoder::decode_udp(&buf[..size]) {
                            for avatar_id in avatar_changes(packet) {
                                info!("Avatar change detected! New Avatar ID: {}", avatar_id);
                                if changes.send(avatar_id).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        error!("Error receiving OSC packet: {}", e);
                        // Back off instead of spinning on a dead socket.
                        stop.wait_timeout(std::time::Duration::from_millis(500));
                    }
                }
            }
            info!("OSC listener thread exiting gracefully");
        })
        .context("Failed to spawn OSC listener thread")
}

/// Avatar ids carried by `/avatar/change` messages anywhere in the packet.
pub fn avatar_changes(packet: OscPacket) -> Vec<String> {
    let mut ids = Vec::new();
    collect_changes(packet, &mut ids);
    ids
}

fn collect_changes(packet: OscPacket, ids: &mut Vec<String>) {
    match packet {
        OscPacket::Message(msg) => {
            if msg.addr == AVATAR_CHANGE {
                let avatar_id = match msg.args.first() {
                    Some(OscType::String(s)) => s.clone(),
                    _ => "Unknown".to_string(),
                };
                ids.push(avatar_id);
            }
        }
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                collect_changes(packet, ids);
            }
        }
    }
}
