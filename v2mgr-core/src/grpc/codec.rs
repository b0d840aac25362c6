//! # Dynamic Protobuf Codec
//!
//! This module implements `tonic::codec::Codec` for `prost_reflect::DynamicMessage`, so
//! `tonic` can transport messages whose types were resolved at runtime.
//!
//! 1. **Encoder**: Checks the outgoing message against the request type by name, then writes
//!    its wire encoding into the gRPC buffer.
//! 2. **Decoder**: Reads raw bytes and merges them into a fresh `DynamicMessage` of the
//!    response type.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, ReflectMessage};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A Codec bound to the request and response descriptors of one method.
#[derive(Debug, Clone)]
pub struct DynamicCodec {
    req_desc: MessageDescriptor,
    res_desc: MessageDescriptor,
}

impl DynamicCodec {
    /// Creates a new `DynamicCodec`.
    ///
    /// # Arguments
    /// * `req_desc` - Descriptor for the request message type.
    /// * `res_desc` - Descriptor for the response message type.
    pub fn new(req_desc: MessageDescriptor, res_desc: MessageDescriptor) -> Self {
        Self { req_desc, res_desc }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder(self.req_desc.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.res_desc.clone())
    }
}

/// Writes a `DynamicMessage` as Protobuf bytes.
#[derive(Debug)]
pub struct DynamicEncoder(MessageDescriptor);

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        // Descriptors resolved from different registry snapshots never compare equal,
        // so the check goes by name.
        let found = item.descriptor();
        if found.full_name() != self.0.full_name() {
            return Err(Status::invalid_argument(format!(
                "Expected a '{}' message, got '{}'",
                self.0.full_name(),
                found.full_name()
            )));
        }

        item.encode_raw(dst);
        Ok(())
    }
}

/// Reads Protobuf bytes into a `DynamicMessage`.
#[derive(Debug)]
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut msg = DynamicMessage::new(self.0.clone());
        msg.merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode Protobuf bytes: {}", e)))?;

        Ok(Some(msg))
    }
}
