pub mod base_param;
pub mod registry;

pub use base_param::BaseParam;
pub use registry::{ParameterDefinition, ParameterRegistry, RelevantParameters};

use std::collections::HashMap;

/// Parameter type information from avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamType {
    Float,
    Bool,
    Int,
}

impl ParamType {
    /// Parse OSC type tag string (e.g., "f", "i", "T", "F"). Unknown tags are treated as floats.
    pub fn from_osc_type_tag(tag: &str) -> Self {
        match tag {
            "i" | "h" => ParamType::Int,
            "T" | "F" => ParamType::Bool,
            _ => ParamType::Float,
        }
    }
}

/// Address → type of every parameter the active avatar exposes.
pub type AvatarParameters = HashMap<String, ParamType>;
