//! # Generic gRPC Transport
//!
//! This module contains the building blocks for performing gRPC calls against services
//! whose shape is only known at runtime.
//!
//! Unlike standard `tonic` clients which are generated per service (e.g. `StatsServiceClient`),
//! a [`client::ServiceClient`] is synthesized from a `ServiceDescriptor`, and moves
//! `prost_reflect::DynamicMessage` values over the wire through [`codec::DynamicCodec`].
pub mod client;
pub mod codec;
