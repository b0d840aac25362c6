use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The outcome of a remote call: the projected response, or a failure with the gRPC code and
/// details reported by the transport or the server.
pub type Reply = Result<serde_json::Value, RpcFailure>;

/// The uniform failure shape of the facade operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFailure {
    /// Numeric gRPC status code.
    pub code: i32,
    pub details: String,
}

impl RpcFailure {
    pub fn new(code: tonic::Code, details: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            details: details.into(),
        }
    }

    pub fn code(&self) -> tonic::Code {
        tonic::Code::from_i32(self.code)
    }
}

impl From<tonic::Status> for RpcFailure {
    fn from(status: tonic::Status) -> Self {
        Self::new(status.code(), status.message())
    }
}

/// Renders a reply as a plain value, failures as `{"error": {"code": .., "details": ..}}`.
pub fn reply_to_plain(reply: Reply) -> serde_json::Value {
    match reply {
        Ok(value) => value,
        Err(failure) => serde_json::json!({ "error": failure }),
    }
}

/// The proxy protocols whose users and inbounds can be managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Trojan,
    Vmess,
    Vless,
}

impl ProxyProtocol {
    pub const ALL: [ProxyProtocol; 3] = [
        ProxyProtocol::Trojan,
        ProxyProtocol::Vmess,
        ProxyProtocol::Vless,
    ];

    /// Fully qualified name of the protocol's account type.
    pub fn account_type(self) -> &'static str {
        match self {
            ProxyProtocol::Trojan => "v2ray.core.proxy.trojan.Account",
            ProxyProtocol::Vmess => "v2ray.core.proxy.vmess.Account",
            ProxyProtocol::Vless => "v2ray.core.proxy.vless.Account",
        }
    }

    /// Schema file declaring [`ProxyProtocol::account_type`].
    pub fn account_schema(self) -> &'static str {
        match self {
            ProxyProtocol::Trojan => "proxy/trojan/config.proto",
            ProxyProtocol::Vmess => "proxy/vmess/account.proto",
            ProxyProtocol::Vless => "proxy/vless/account.proto",
        }
    }

    /// Fully qualified name of the protocol's inbound proxy settings type.
    pub fn inbound_config_type(self) -> &'static str {
        match self {
            ProxyProtocol::Trojan => "v2ray.core.proxy.trojan.ServerConfig",
            ProxyProtocol::Vmess => "v2ray.core.proxy.vmess.inbound.Config",
            ProxyProtocol::Vless => "v2ray.core.proxy.vless.inbound.Config",
        }
    }

    /// Schema file declaring [`ProxyProtocol::inbound_config_type`].
    pub fn inbound_config_schema(self) -> &'static str {
        match self {
            ProxyProtocol::Trojan => "proxy/trojan/config.proto",
            ProxyProtocol::Vmess => "proxy/vmess/inbound/config.proto",
            ProxyProtocol::Vless => "proxy/vless/inbound/config.proto",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProxyProtocol::Trojan => "trojan",
            ProxyProtocol::Vmess => "vmess",
            ProxyProtocol::Vless => "vless",
        }
    }
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown proxy protocol '{0}', expected one of: trojan, vmess, vless")]
pub struct UnknownProtocol(pub String);

impl FromStr for ProxyProtocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProxyProtocol::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownProtocol(s.to_string()))
    }
}

/// A user to add to an inbound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSpec {
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub email: Option<String>,
    /// Protocol specific account fields (e.g. `{"id": "<uuid>"}` for vmess).
    #[serde(default)]
    pub account: Option<serde_json::Value>,
}

/// A whole inbound handler to add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSettings {
    pub tag: String,
    pub port: u32,
    /// An IP address or a domain name.
    pub listen: String,
    pub protocol: ProxyProtocol,
    #[serde(default)]
    pub allocate: Option<serde_json::Value>,
    #[serde(default)]
    pub stream_settings: Option<serde_json::Value>,
    #[serde(default)]
    pub sniffing: Option<serde_json::Value>,
    /// Protocol specific inbound settings.
    #[serde(default)]
    pub settings: serde_json::Value,
}
