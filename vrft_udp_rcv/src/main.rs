//! Prints the OSC traffic the daemon sends, one line per parameter change.

use anyhow::{Context, Result};
use log::{error, info, warn};
use rosc::{decoder, OscPacket, OscType};
use std::collections::HashMap;
use std::net::UdpSocket;

fn port_from_args() -> u16 {
    std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(9000)
}

fn format_arg(arg: &OscType) -> String {
    match arg {
        OscType::Float(v) => format!("{:.4}", v),
        OscType::Int(v) => v.to_string(),
        OscType::Bool(v) => v.to_string(),
        OscType::String(s) => format!("{:?}", s),
        other => format!("{:?}", other),
    }
}

/// Flattens bundles into `(address, args)` pairs.
fn collect(packet: OscPacket, out: &mut Vec<(String, Vec<OscType>)>) {
    match packet {
        OscPacket::Message(msg) => out.push((msg.addr, msg.args)),
        OscPacket::Bundle(bundle) => {
            for p in bundle.content {
                collect(p, out);
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let port = port_from_args();
    let addr = format!("0.0.0.0:{}", port);
    let socket = UdpSocket::bind(&addr).with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening for OSC on {}...", addr);

    let mut buf = [0u8; 65535];
    let mut last: HashMap<String, Vec<OscType>> = HashMap::new();
    let mut datagrams: u64 = 0;

    loop {
        let (amt, src) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) => {
                error!("Error receiving data: {}", e);
                continue;
            }
        };
        datagrams += 1;

        let packet = match decoder::decode_udp(&buf[..amt]) {
            Ok((_, packet)) => packet,
            Err(e) => {
                warn!("Not an OSC packet from {} ({} bytes): {:?}", src, amt, e);
                continue;
            }
        };

        let is_bundle = matches!(packet, OscPacket::Bundle(_));
        let mut messages = Vec::new();
        collect(packet, &mut messages);
        info!(
            "#{} from {}: {} bytes, {} messages{}",
            datagrams,
            src,
            amt,
            messages.len(),
            if is_bundle { " (bundle)" } else { "" }
        );

        for (address, args) in messages {
            if last.get(&address) == Some(&args) {
                continue;
            }
            let values: Vec<String> = args.iter().map(format_arg).collect();
            println!("  {} = {}", address, values.join(", "));
            last.insert(address, args);
        }
    }
}
