//! # v2mgr Core
//!
//! `v2mgr-core` drives the gRPC control API of a running V2Ray instance without any
//! generated stubs. Every service, request and response type is resolved at runtime from
//! `.proto` schema files staged on disk.
//!
//! ## Key Components
//!
//! * **[`SchemaRegistry`]:** Compiles schema files on demand and resolves message and service
//!   descriptors by their fully qualified name. Loading is append-only and idempotent.
//! * **[`ServiceClient`]:** A data-driven gRPC client synthesized from a service descriptor.
//!   It holds one [`MethodMetadata`] per method and a single generic invocation primitive
//!   for each of the four RPC shapes.
//! * **[`EnvelopeCodec`] & [`AnyEnvelope`]:** Build and verify messages from plain JSON values,
//!   and wrap them as `{type_url, value}` envelopes for polymorphic fields.
//! * **[`ResponseProjector`]:** Turns decoded responses back into plain JSON values.
//! * **[`V2rayManager`]:** The facade. Stats, logger and inbound user management, each
//!   composed into a single request/response cycle.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod config;
pub mod envelope;
pub mod grpc;
pub mod manager;
pub mod projector;
pub mod schema;

pub use config::ManagerConfig;
pub use envelope::{AnyEnvelope, EnvelopeCodec, EnvelopeError};
pub use grpc::client::{MethodMetadata, ServiceClient};
pub use manager::{
    ManagerInitError, OperationError, V2rayManager,
    types::{InboundSettings, ProxyProtocol, Reply, RpcFailure, UserSpec, reply_to_plain},
};
pub use projector::{ProjectionError, ResponseProjector};
pub use schema::registry::{SchemaError, SchemaRegistry};

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
