//! # V2Ray Fixture
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a staged `.proto` schema
//! directory and in-process V2Ray control servers for integration testing `v2mgr-core`.
//! It is not intended for production use.

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/v2ray.rs"));
}

pub use pb::v2ray::core::app::log::command::logger_service_server::{
    LoggerService, LoggerServiceServer,
};
pub use pb::v2ray::core::app::proxyman::command::handler_service_server::{
    HandlerService, HandlerServiceServer,
};
pub use pb::v2ray::core::app::stats::command::stats_service_server::{
    StatsService, StatsServiceServer,
};
pub use pb::v2ray::core::testing::stream_service_server::{
    StreamService, StreamServiceServer,
};

/// Root of the staged schema tree, laid out like the upstream V2Ray source.
pub const PROTO_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/proto");
