//! # Response Projector
//!
//! Converts decoded responses into plain `serde_json::Value`s with a stable, portable shape:
//!
//! * 64-bit integers are rendered as decimal strings, so no precision is lost in JSON.
//! * Enums are rendered by name.
//! * Bytes are rendered as base64 strings.
//! * Fields holding their default value are omitted.
use crate::schema::registry::{SchemaError, SchemaRegistry};
use prost::Message;
use prost_reflect::{DynamicMessage, ReflectMessage, SerializeOptions};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Failed to transcode message: '{0}'")]
    Decode(#[from] prost::DecodeError),
    #[error("Failed to map message to JSON: '{0}'")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ResponseProjector {
    registry: Arc<SchemaRegistry>,
    options: SerializeOptions,
}

impl ResponseProjector {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        let options = SerializeOptions::new()
            .stringify_64_bit_integers(true)
            .use_enum_numbers(false)
            .skip_default_fields(true);

        Self { registry, options }
    }

    /// Projects a message into a plain value.
    ///
    /// The type is resolved again by the message's own full name. A message decoded against an
    /// older registry snapshot is transcoded to the current descriptor first.
    pub fn to_plain(&self, message: &DynamicMessage) -> Result<serde_json::Value, ProjectionError> {
        let descriptor = self.registry.lookup_type(message.descriptor().full_name())?;

        let transcoded;
        let message = if descriptor == message.descriptor() {
            message
        } else {
            transcoded = DynamicMessage::decode(descriptor, message.encode_to_vec().as_slice())?;
            &transcoded
        };

        Ok(message.serialize_with_options(serde_json::value::Serializer, &self.options)?)
    }
}
