//! A single bound avatar parameter: one OSC address, its value cell and dirty flag.

use super::ParamType;
use common::UnifiedTrackingData;
use fancy_regex::Regex;
use rosc::{OscMessage, OscType};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

pub const DEFAULT_PREFIX: &str = "/avatar/parameters/";

/// Smallest float change that marks a parameter dirty.
const FLOAT_EPSILON: f32 = 0.00001;

pub type ValueGetter = Arc<dyn Fn(&UnifiedTrackingData) -> f32 + Send + Sync>;

/// Matches parameter addresses with flexible prefix support.
///
/// This matches:
/// - Exact parameter name after stripping `/avatar/parameters/`
/// - Any address ending with `/{name}` (e.g., `FT/`, `OSCm/Float/FT/`, custom prefixes)
///
/// Uses negative lookbehind to reject nested version prefixes (e.g., `/v1/v2/EyeLeftX`)
pub fn matches_address(name: &str, addr: &str) -> bool {
    let stripped = match addr.strip_prefix(DEFAULT_PREFIX) {
        Some(s) => s,
        None => return false,
    };

    let escaped_name = fancy_regex::escape(name);
    let pattern = format!(r"(?<!v\d)(/{escaped_name})$|^({escaped_name})$");

    match Regex::new(&pattern) {
        Ok(re) => re.is_match(stripped).unwrap_or(false),
        Err(_) => false,
    }
}

/// Parameter bound to one avatar address.
///
/// The value and the dirty flag are separate atomics: the producer stores the
/// value before raising the flag, the consumer clears the flag before reading
/// the value. A write racing a send is therefore either included in the send
/// or leaves the flag raised for the next one; it is never lost.
pub struct BaseParam {
    name: String,
    address: String,
    param_type: ParamType,
    get_value: ValueGetter,
    value: AtomicU32,
    has_value: AtomicBool,
    dirty: AtomicBool,
}

impl BaseParam {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        param_type: ParamType,
        get_value: ValueGetter,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            param_type,
            get_value,
            value: AtomicU32::new(0),
            has_value: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }

    /// Parameter with a constant getter, mostly useful for tests and static wiring.
    pub fn fixed(address: impl Into<String>, param_type: ParamType) -> Self {
        let address = address.into();
        Self::new(
            address.clone(),
            address,
            param_type,
            Arc::new(|_: &UnifiedTrackingData| 0.0_f32),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Raise the dirty flag without changing the value.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Current value encoded as the OSC argument for this parameter type.
    pub fn value(&self) -> OscType {
        let bits = self.value.load(Ordering::Acquire);
        match self.param_type {
            ParamType::Float => OscType::Float(f32::from_bits(bits)),
            ParamType::Bool => OscType::Bool(bits != 0),
            ParamType::Int => OscType::Int(bits as i32),
        }
    }

    /// Pull this parameter's value out of a tracking snapshot.
    pub fn update(&self, data: &UnifiedTrackingData) {
        self.set((self.get_value)(data));
    }

    /// Store a raw value, marking the parameter dirty when the encoded value changed.
    ///
    /// Floats use a small delta so sensor noise does not flood the wire. The
    /// first value after creation is always dirty.
    pub fn set(&self, raw: f32) {
        let bits = encode(self.param_type, raw);
        let first = !self.has_value.swap(true, Ordering::AcqRel);
        let previous = self.value.load(Ordering::Acquire);
        if first || changed(self.param_type, previous, bits) {
            self.value.store(bits, Ordering::Release);
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Clear the dirty flag and return the message to send, if it was set.
    pub fn take_message(&self) -> Option<OscMessage> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(OscMessage {
            addr: self.address.clone(),
            args: vec![self.value()],
        })
    }
}

impl std::fmt::Debug for BaseParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseParam")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("param_type", &self.param_type)
            .field("value", &self.value())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

fn encode(param_type: ParamType, raw: f32) -> u32 {
    match param_type {
        ParamType::Float => raw.to_bits(),
        ParamType::Bool => u32::from(raw >= 0.5),
        ParamType::Int => (raw.round() as i32) as u32,
    }
}

fn changed(param_type: ParamType, old: u32, new: u32) -> bool {
    match param_type {
        ParamType::Float => {
            let (old, new) = (f32::from_bits(old), f32::from_bits(new));
            if old.is_nan() || new.is_nan() {
                old.is_nan() != new.is_nan()
            } else {
                (new - old).abs() > FLOAT_EPSILON
            }
        }
        ParamType::Bool | ParamType::Int => old != new,
    }
}
