//! # Schema Registry
//!
//! This module owns the runtime view of the V2Ray protobuf schema.
//!
//! Schema files are compiled from source with `protox` the first time they are needed
//! and merged into a single `prost_reflect::DescriptorPool`. Nothing is generated ahead
//! of time, which lets the manager pick up per-protocol account and config types lazily.
pub mod registry;
mod resolver;
