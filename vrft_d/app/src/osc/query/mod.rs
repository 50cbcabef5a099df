pub mod service;

pub use service::OscQueryService;
