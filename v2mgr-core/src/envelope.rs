//! # Envelope Codec
//!
//! Builds concrete messages from plain JSON values against the [`SchemaRegistry`], and wraps
//! them as "any" envelopes.
//!
//! V2Ray's control API is deliberately generic: an `AlterInbound` call carries its operation
//! as a `TypedMessage { type, value }`, and a user carries its protocol specific account the
//! same way. [`AnyEnvelope`] is the boundary type for that pattern. It is built from a
//! verified message, then placed into the envelope-typed field of an outer message with
//! [`embed`].
//!
//! ## Verification
//!
//! Construction is lenient (unknown keys are dropped), while verification walks the plain
//! value against the descriptor and reports the first structural problem. Verification
//! failures are logged with the calling operation's name and returned as `false`, they never
//! stop construction. Values that cannot be converted at all are construction errors.
mod verify;

use crate::schema::registry::{SchemaError, SchemaRegistry};
use prost::Message;
use prost_reflect::{
    DeserializeOptions, DynamicMessage, FieldDescriptor, Kind, MessageDescriptor,
    ReflectMessage, SetFieldError, Value,
};
use std::sync::Arc;
use tracing::error;

/// `google.protobuf.Any` stores a URL rather than a bare type name.
const ANY_TYPE: &str = "google.protobuf.Any";
const ANY_URL_PREFIX: &str = "type.googleapis.com/";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Cannot build a '{type_name}' message from the given value: '{source}'")]
    Construct {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Message '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },
    #[error("Field '{field}' of '{type_name}' is not a singular message field")]
    NotAMessageField { type_name: String, field: String },
    #[error("Message '{0}' cannot hold an envelope, it needs a type name and a bytes value field")]
    NotAnEnvelope(String),
    #[error("Failed to set field: '{0}'")]
    SetField(#[from] SetFieldError),
}

/// A type name paired with the wire encoding of a message of that type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyEnvelope {
    /// Fully qualified name of the wrapped type (e.g. `v2ray.core.proxy.vmess.Account`).
    pub type_url: String,
    /// Wire-encoded bytes of the wrapped message.
    pub value: Vec<u8>,
}

impl AnyEnvelope {
    /// Wraps an already built message.
    pub fn pack(message: &DynamicMessage) -> Self {
        Self {
            type_url: message.descriptor().full_name().to_string(),
            value: message.encode_to_vec(),
        }
    }

    /// Decodes the payload as an instance of `descriptor`.
    ///
    /// The type name is not checked. Decoding as an incompatible type either fails or yields
    /// a meaningless message, exactly as decoding the bytes by hand would.
    pub fn unpack(&self, descriptor: MessageDescriptor) -> Result<DynamicMessage, prost::DecodeError> {
        DynamicMessage::decode(descriptor, self.value.as_slice())
    }

    /// Writes the envelope into a message of the given envelope type.
    ///
    /// Both `google.protobuf.Any` (`type_url` + `value`) and V2Ray's `TypedMessage`
    /// (`type` + `value`) are accepted.
    pub fn to_message(&self, envelope: &MessageDescriptor) -> Result<DynamicMessage, EnvelopeError> {
        let type_field = envelope
            .get_field_by_name("type_url")
            .or_else(|| envelope.get_field_by_name("type"))
            .filter(|f| matches!(f.kind(), Kind::String) && !f.is_list());
        let value_field = envelope
            .get_field_by_name("value")
            .filter(|f| matches!(f.kind(), Kind::Bytes) && !f.is_list());

        let (Some(type_field), Some(value_field)) = (type_field, value_field) else {
            return Err(EnvelopeError::NotAnEnvelope(envelope.full_name().to_string()));
        };

        let type_url = if envelope.full_name() == ANY_TYPE && !self.type_url.contains('/') {
            format!("{ANY_URL_PREFIX}{}", self.type_url)
        } else {
            self.type_url.clone()
        };

        let mut message = DynamicMessage::new(envelope.clone());
        message.try_set_field(&type_field, Value::String(type_url))?;
        message.try_set_field(&value_field, Value::Bytes(self.value.clone().into()))?;
        Ok(message)
    }
}

/// Builds and verifies messages against a shared [`SchemaRegistry`].
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    registry: Arc<SchemaRegistry>,
}

impl EnvelopeCodec {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Verifies a plain value against `type_name`, loading `schema_file` first if the type
    /// is not known yet.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The value matches the type's structure.
    /// * `Ok(false)` - Verification reported a problem. It has been logged under `operation`.
    /// * `Err(EnvelopeError)` - The type could not be resolved.
    pub fn verify_message(
        &self,
        operation: &str,
        type_name: &str,
        plain: &serde_json::Value,
        schema_file: Option<&str>,
    ) -> Result<bool, EnvelopeError> {
        let descriptor = self.registry.resolve_type(type_name, schema_file)?;
        Ok(check(operation, &descriptor, plain))
    }

    /// Builds a message of `type_name` from a plain value, loading `schema_file` first if the
    /// type is not known yet. The value is verified, a failed verification is only logged.
    pub fn build_message(
        &self,
        operation: &str,
        type_name: &str,
        plain: serde_json::Value,
        schema_file: Option<&str>,
    ) -> Result<DynamicMessage, EnvelopeError> {
        let descriptor = self.registry.resolve_type(type_name, schema_file)?;
        self.build_with_descriptor(operation, &descriptor, plain)
    }

    /// Same as [`EnvelopeCodec::build_message`], for a descriptor that is already resolved.
    pub fn build_with_descriptor(
        &self,
        operation: &str,
        descriptor: &MessageDescriptor,
        plain: serde_json::Value,
    ) -> Result<DynamicMessage, EnvelopeError> {
        check(operation, descriptor, &plain);

        let options = DeserializeOptions::new().deny_unknown_fields(false);
        DynamicMessage::deserialize_with_options(descriptor.clone(), plain, &options).map_err(
            |source| EnvelopeError::Construct {
                type_name: descriptor.full_name().to_string(),
                source,
            },
        )
    }

    /// Builds a message like [`EnvelopeCodec::build_message`] and wraps it in an envelope.
    pub fn build_any(
        &self,
        operation: &str,
        type_name: &str,
        plain: serde_json::Value,
        schema_file: Option<&str>,
    ) -> Result<AnyEnvelope, EnvelopeError> {
        let message = self.build_message(operation, type_name, plain, schema_file)?;
        Ok(AnyEnvelope::pack(&message))
    }
}

/// Places an envelope into the envelope-typed field at `path` (e.g. `user.account`),
/// creating intermediate messages as needed.
pub fn embed(
    message: &mut DynamicMessage,
    path: &str,
    envelope: &AnyEnvelope,
) -> Result<(), EnvelopeError> {
    let (parent, field) = descend(message, path)?;

    let Kind::Message(envelope_type) = field.kind() else {
        return Err(EnvelopeError::NotAMessageField {
            type_name: parent.descriptor().full_name().to_string(),
            field: field.name().to_string(),
        });
    };

    let value = Value::Message(envelope.to_message(&envelope_type)?);
    parent.try_set_field(&field, value)?;
    Ok(())
}

/// Sets a raw value at `path`, creating intermediate messages as needed.
///
/// Useful for values plain JSON cannot express directly, such as raw IP bytes.
pub fn set_path(message: &mut DynamicMessage, path: &str, value: Value) -> Result<(), EnvelopeError> {
    let (parent, field) = descend(message, path)?;
    parent.try_set_field(&field, value)?;
    Ok(())
}

fn descend<'m>(
    message: &'m mut DynamicMessage,
    path: &str,
) -> Result<(&'m mut DynamicMessage, FieldDescriptor), EnvelopeError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or_default();

    let mut current = message;
    for segment in segments {
        let descriptor = current.descriptor();
        let field = find_field(&descriptor, segment)?;
        let not_a_message = || EnvelopeError::NotAMessageField {
            type_name: descriptor.full_name().to_string(),
            field: segment.to_string(),
        };
        if field.is_list() || field.is_map() || !matches!(field.kind(), Kind::Message(_)) {
            return Err(not_a_message());
        }
        current = current
            .get_field_mut(&field)
            .as_message_mut()
            .ok_or_else(not_a_message)?;
    }

    let field = find_field(&current.descriptor(), last)?;
    Ok((current, field))
}

fn find_field(descriptor: &MessageDescriptor, name: &str) -> Result<FieldDescriptor, EnvelopeError> {
    descriptor
        .get_field_by_name(name)
        .or_else(|| descriptor.get_field_by_json_name(name))
        .ok_or_else(|| EnvelopeError::UnknownField {
            type_name: descriptor.full_name().to_string(),
            field: name.to_string(),
        })
}

fn check(operation: &str, descriptor: &MessageDescriptor, plain: &serde_json::Value) -> bool {
    match verify::verify(descriptor, plain) {
        Ok(()) => true,
        Err(problem) => {
            error!(
                operation = %operation,
                message_type = %descriptor.full_name(),
                %problem,
                "Message failed verification"
            );
            false
        }
    }
}
