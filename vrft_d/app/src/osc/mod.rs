pub mod listener;
pub mod parameters;
pub mod query;
pub mod socket;
pub mod transport;

pub use listener::spawn_avatar_listener;
pub use parameters::{
    AvatarParameters, BaseParam, ParamType, ParameterRegistry, RelevantParameters,
};
pub use query::OscQueryService;
pub use socket::{OscSocket, UdpOscSocket};
pub use transport::{build_messages, pack_bundles, OscTransport, DEFAULT_MAX_BUNDLE_BYTES};
