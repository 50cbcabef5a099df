//! Dirty-parameter collection, bundle packing and sending.

use super::parameters::BaseParam;
use super::socket::OscSocket;
use anyhow::{Context, Result};
use log::trace;
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime};

pub const DEFAULT_MAX_BUNDLE_BYTES: usize = 4096;

/// `#bundle\0` plus the 8-byte timetag.
pub const BUNDLE_HEADER_BYTES: usize = 16;

/// Size prefix in front of every bundle element.
pub const ELEMENT_PREFIX_BYTES: usize = 4;

/// "Immediately" in OSC timetag terms.
const IMMEDIATE: OscTime = OscTime {
    seconds: 0,
    fractional: 1,
};

/// Messages for every dirty parameter, in input order. Clears the flags.
pub fn build_messages(params: &[BaseParam]) -> Vec<OscMessage> {
    params.iter().filter_map(BaseParam::take_message).collect()
}

fn empty_bundle() -> OscBundle {
    OscBundle {
        timetag: IMMEDIATE,
        content: Vec::new(),
    }
}

/// Greedily packs messages into bundles that stay under `max_bundle_bytes`.
///
/// A message that cannot fit even in an empty bundle is sent in a bundle of its own.
pub fn pack_bundles(messages: Vec<OscMessage>, max_bundle_bytes: usize) -> Result<Vec<OscBundle>> {
    let mut bundles = Vec::new();
    let mut current = empty_bundle();
    let mut size = BUNDLE_HEADER_BYTES;

    for message in messages {
        let packet = OscPacket::Message(message);
        let framed = encoder::encode(&packet)
            .context("Failed to encode OSC message")?
            .len()
            + ELEMENT_PREFIX_BYTES;

        if size + framed >= max_bundle_bytes && !current.content.is_empty() {
            bundles.push(std::mem::replace(&mut current, empty_bundle()));
            size = BUNDLE_HEADER_BYTES;
        }

        current.content.push(packet);
        size += framed;
    }

    if !current.content.is_empty() {
        bundles.push(current);
    }

    Ok(bundles)
}

/// Sends bundles to one destination through an [`OscSocket`].
pub struct OscTransport<S: OscSocket> {
    socket: S,
    destination: String,
    max_bundle_bytes: usize,
}

impl<S: OscSocket> OscTransport<S> {
    pub fn new(socket: S, destination: impl Into<String>, max_bundle_bytes: usize) -> Self {
        Self {
            socket,
            destination: destination.into(),
            max_bundle_bytes,
        }
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Encodes one bundle and hands it to the socket.
    pub fn send(&self, bundle: &OscBundle) -> Result<()> {
        let bytes = encoder::encode(&OscPacket::Bundle(bundle.clone()))
            .context("Failed to encode OSC bundle")?;
        trace!(
            "Sending bundle: {} messages, {} bytes",
            bundle.content.len(),
            bytes.len()
        );
        self.socket.send(&bytes, &self.destination)
    }

    /// Packs and sends all messages, one socket call per bundle. Returns the
    /// number of bundles sent.
    pub fn send_messages(&self, messages: Vec<OscMessage>) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }
        let bundles = pack_bundles(messages, self.max_bundle_bytes)?;
        for bundle in &bundles {
            self.send(bundle)?;
        }
        Ok(bundles.len())
    }
}
