//! # CLI
//!
//! This module defines the command-line interface of `v2mgr` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring
//! `--account` is valid JSON and `--protocol` names a supported proxy).
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use v2mgr_core::{
    ProxyProtocol,
    config::{DEFAULT_ENDPOINT, DEFAULT_PROTO_DIR},
};

#[derive(Parser)]
#[command(name = "v2mgr", version, about = "Manage a running V2Ray instance over its gRPC API")]
pub struct Cli {
    /// Address of the V2Ray API inbound (e.g. 127.0.0.1:10085)
    #[arg(long, global = true, env = "V2RAY_API_ADDR", default_value = DEFAULT_ENDPOINT)]
    pub addr: String,

    /// Directory holding the staged V2Ray .proto tree
    #[arg(long, global = true, env = "V2RAY_PROTOS_DIR", default_value = DEFAULT_PROTO_DIR)]
    pub protos: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read traffic counters and runtime statistics
    Stats {
        #[command(subcommand)]
        sub: StatsCommands,
    },

    /// Control the V2Ray logger
    Logger {
        #[command(subcommand)]
        sub: LoggerCommands,
    },

    /// Add or remove users of an inbound
    User {
        #[command(subcommand)]
        sub: UserCommands,
    },

    /// Copy every .proto file of a V2Ray source checkout into the schema directory
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// v2mgr --protos ./protos sync-protos ~/src/v2ray-core
    /// ```
    SyncProtos {
        /// Root of the V2Ray source checkout
        source: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum StatsCommands {
    /// Runtime statistics of the V2Ray process
    Sys,
    /// Query every counter matching a regular expression
    Query {
        /// Regular expression over counter names (e.g. 'user>>>'). Matches all when omitted.
        pattern: Option<String>,
        /// Reset the matched counters after reading them
        #[arg(long)]
        reset: bool,
    },
    /// Read a single counter
    Get {
        /// Full counter name (e.g. 'user>>>a@b.com>>>traffic>>>uplink')
        name: String,
        /// Reset the counter after reading it
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Subcommand)]
pub enum LoggerCommands {
    /// Restart the logger, reopening its files
    Restart,
    /// Print log records as the server emits them
    Follow,
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add a user to an inbound
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// v2mgr user add --protocol vmess --tag vmess-in --email a@b.com \
    ///     --account '{"id": "b831381d-6324-4d53-ad4f-8cda48b30811"}'
    /// ```
    Add {
        /// Proxy protocol of the inbound (trojan, vmess, vless)
        #[arg(long, value_parser = parse_protocol)]
        protocol: ProxyProtocol,
        /// Tag of the inbound
        #[arg(long)]
        tag: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        level: Option<u32>,
        /// Protocol specific account fields as a JSON object
        #[arg(long, value_parser = parse_json)]
        account: Option<serde_json::Value>,
    },
    /// Remove a user from an inbound
    Remove {
        #[arg(long)]
        email: String,
        /// Tag of the inbound
        #[arg(long)]
        tag: String,
    },
}

fn parse_protocol(value: &str) -> Result<ProxyProtocol, String> {
    value.parse().map_err(|e| format!("{e}"))
}

fn parse_json(value: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(value).map_err(|e| format!("Invalid JSON: {e}"))
}
