//! # Configuration
//!
//! [`ManagerConfig`] tells a [`crate::V2rayManager`] where the V2Ray API listens and where the
//! staged schema tree lives. Values are supplied by the embedding application.
use std::path::PathBuf;

/// Address of the V2Ray API inbound in the stock example configs.
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:10085";

/// Schema directory used when none is configured.
pub const DEFAULT_PROTO_DIR: &str = "protos";

/// Inbound and proxy config schemas loaded eagerly at startup.
pub const DEFAULT_PRELOAD: [&str; 4] = [
    "app/proxyman/config.proto",
    "proxy/vmess/inbound/config.proto",
    "proxy/vless/inbound/config.proto",
    "proxy/trojan/config.proto",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// The API endpoint, either `host:port` or a full URI.
    pub endpoint: String,
    /// Root of the staged `.proto` tree, laid out like the V2Ray source.
    pub proto_dir: PathBuf,
    /// Schema files (relative to `proto_dir`) to load right after the control services.
    pub preload: Vec<String>,
}

impl ManagerConfig {
    pub fn new(endpoint: impl Into<String>, proto_dir: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: endpoint.into(),
            proto_dir: proto_dir.into(),
            ..Self::default()
        }
    }

    /// Replaces the list of schema files loaded at startup.
    pub fn with_preload<I, T>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.preload = files.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            proto_dir: PathBuf::from(DEFAULT_PROTO_DIR),
            preload: DEFAULT_PRELOAD.iter().map(|s| s.to_string()).collect(),
        }
    }
}
