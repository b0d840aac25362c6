//! # Generic Service Client
//!
//! This module synthesizes gRPC clients from runtime service descriptors.
//!
//! ## How it works
//!
//! [`ServiceClient`] is built once per service. For every method of the service it resolves
//! the request and response types through the [`SchemaRegistry`] and freezes them into a
//! [`MethodMetadata`]: the wire path, the streaming flags, and the codec bound to the
//! resolved types. Calls then go through one generic primitive per RPC shape, parameterized
//! by that metadata.
//!
//! ## Error Handling
//!
//! - **`ClientBuildError`**: A method's types could not be resolved, or the endpoint is not a
//!   valid URI. Construction fails as a whole, there is no partially usable client.
//! - **`GrpcRequestError`**: The call could not be issued (unknown method, wrong shape, wrong
//!   request type, transport not ready).
//! - **`tonic::Status`**: The call was issued and the server answered with an error code.
//!
//! The invocation methods keep the last two apart by returning
//! `Result<Result<T, Status>, GrpcRequestError>`.
use super::codec::DynamicCodec;
use crate::{
    BoxError,
    schema::registry::{SchemaError, SchemaRegistry},
};
use futures_util::Stream;
use http::uri::PathAndQuery;
use http_body::Body as HttpBody;
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor, ReflectMessage};
use std::{fmt, str::FromStr};
use tonic::{
    Request, Streaming,
    client::{Grpc, GrpcService},
    transport::{Channel, Endpoint},
};

/// Errors that can occur while synthesizing a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Invalid endpoint '{0}': '{1}'")]
    InvalidEndpoint(String, #[source] tonic::transport::Error),
    #[error("Invalid gRPC path '{path}': '{source}'")]
    InvalidPath {
        path: String,
        source: http::uri::InvalidUri,
    },
}

/// Errors that prevent a call from being issued.
#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { service: String, method: String },
    #[error("Method '{path}' is {actual} and cannot be called as {requested}")]
    WrongShape {
        path: String,
        actual: CallShape,
        requested: CallShape,
    },
    #[error("Method '{path}' expects a '{expected}' request, got '{found}'")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },
}

/// The four RPC shapes, derived from a method's streaming flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Bidirectional,
}

impl CallShape {
    pub fn from_flags(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => CallShape::Unary,
            (true, false) => CallShape::ClientStreaming,
            (false, true) => CallShape::ServerStreaming,
            (true, true) => CallShape::Bidirectional,
        }
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallShape::Unary => "unary",
            CallShape::ClientStreaming => "client streaming",
            CallShape::ServerStreaming => "server streaming",
            CallShape::Bidirectional => "bidirectional streaming",
        };
        f.write_str(name)
    }
}

/// Everything needed to invoke one method without generated code.
///
/// Computed once when the owning [`ServiceClient`] is built and never recomputed.
#[derive(Debug, Clone)]
pub struct MethodMetadata {
    name: String,
    path: String,
    http_path: PathAndQuery,
    client_streaming: bool,
    server_streaming: bool,
    request: MessageDescriptor,
    response: MessageDescriptor,
}

impl MethodMetadata {
    /// Resolves a method's request and response types through the registry.
    pub fn resolve(
        registry: &SchemaRegistry,
        method: &MethodDescriptor,
    ) -> Result<Self, ClientBuildError> {
        let request = registry.lookup_type(method.input().full_name())?;
        let response = registry.lookup_type(method.output().full_name())?;

        let path = format!("{}/{}", method.parent_service().full_name(), method.name());
        let http_path = PathAndQuery::from_str(&format!("/{path}")).map_err(|source| {
            ClientBuildError::InvalidPath {
                path: path.clone(),
                source,
            }
        })?;

        Ok(Self {
            name: method.name().to_string(),
            path,
            http_path,
            client_streaming: method.is_client_streaming(),
            server_streaming: method.is_server_streaming(),
            request,
            response,
        })
    }

    /// The method name (e.g. `QueryStats`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire path, `<fully-qualified-service>/<method>`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_client_streaming(&self) -> bool {
        self.client_streaming
    }

    pub fn is_server_streaming(&self) -> bool {
        self.server_streaming
    }

    pub fn shape(&self) -> CallShape {
        CallShape::from_flags(self.client_streaming, self.server_streaming)
    }

    pub fn request_type(&self) -> &MessageDescriptor {
        &self.request
    }

    pub fn response_type(&self) -> &MessageDescriptor {
        &self.response
    }

    /// Encodes a request message to bytes.
    pub fn serialize(&self, message: &DynamicMessage) -> Result<Vec<u8>, GrpcRequestError> {
        self.check_request(message)?;
        Ok(message.encode_to_vec())
    }

    /// Decodes bytes into an instance of the request type.
    pub fn deserialize_request(&self, bytes: &[u8]) -> Result<DynamicMessage, prost::DecodeError> {
        DynamicMessage::decode(self.request.clone(), bytes)
    }

    /// Decodes bytes into an instance of the response type.
    pub fn deserialize_response(
        &self,
        bytes: &[u8],
    ) -> Result<DynamicMessage, prost::DecodeError> {
        DynamicMessage::decode(self.response.clone(), bytes)
    }

    /// A `tonic` codec bound to this method's types.
    pub fn codec(&self) -> DynamicCodec {
        DynamicCodec::new(self.request.clone(), self.response.clone())
    }

    fn check_request(&self, message: &DynamicMessage) -> Result<(), GrpcRequestError> {
        let found = message.descriptor();
        if found.full_name() == self.request.full_name() {
            return Ok(());
        }

        Err(GrpcRequestError::TypeMismatch {
            path: self.path.clone(),
            expected: self.request.full_name().to_string(),
            found: found.full_name().to_string(),
        })
    }
}

/// A gRPC client for one service, bound to one transport.
///
/// The client is stateless between calls. Every call works on a cheap clone of the
/// underlying `tonic` client, so concurrent calls can share a `&ServiceClient`.
#[derive(Debug, Clone)]
pub struct ServiceClient<S = Channel> {
    service: String,
    methods: Vec<MethodMetadata>,
    client: Grpc<S>,
}

impl ServiceClient<Channel> {
    /// Builds a client talking to `endpoint` over a plaintext channel.
    ///
    /// The channel connects lazily on first use and must be created from within a Tokio
    /// runtime. `endpoint` may be a bare `host:port`.
    ///
    /// # Returns
    ///
    /// * `Ok(ServiceClient)` - Every method of the service was resolved.
    /// * `Err(ClientBuildError)` - The service or one of its types is unknown, or the endpoint is invalid.
    pub fn connect_lazy(
        registry: &SchemaRegistry,
        service: &str,
        endpoint: &str,
    ) -> Result<Self, ClientBuildError> {
        let uri = endpoint_uri(endpoint);
        let channel = Endpoint::new(uri.clone())
            .map_err(|e| ClientBuildError::InvalidEndpoint(uri, e))?
            .connect_lazy();

        Self::from_service(registry, service, channel)
    }
}

impl<S> ServiceClient<S> {
    /// Builds a client over an existing Tonic service (e.g. a `Channel` or an in-process `Routes`).
    pub fn from_service(
        registry: &SchemaRegistry,
        service: &str,
        transport: S,
    ) -> Result<Self, ClientBuildError> {
        let descriptor = registry.lookup_service(service)?;

        let methods = descriptor
            .methods()
            .map(|method| MethodMetadata::resolve(registry, &method))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            service: descriptor.full_name().to_string(),
            methods,
            client: Grpc::new(transport),
        })
    }

    /// The fully qualified service name.
    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// Method metadata in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodMetadata> {
        self.methods.iter()
    }

    pub fn method(&self, name: &str) -> Result<&MethodMetadata, GrpcRequestError> {
        self.methods
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| GrpcRequestError::MethodNotFound {
                service: self.service.clone(),
                method: name.to_string(),
            })
    }

    fn prepare(
        &self,
        name: &str,
        requested: CallShape,
    ) -> Result<&MethodMetadata, GrpcRequestError> {
        let method = self.method(name)?;
        if method.shape() != requested {
            return Err(GrpcRequestError::WrongShape {
                path: method.path.clone(),
                actual: method.shape(),
                requested,
            });
        }
        Ok(method)
    }
}

impl<S> ServiceClient<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// # Returns
    /// * `Ok(Ok(DynamicMessage))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - The call could not be issued.
    pub async fn unary(
        &self,
        method: &str,
        request: DynamicMessage,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        let method = self.prepare(method, CallShape::Unary)?;
        method.check_request(&request)?;
        let mut client = self.ready().await?;

        match client
            .unary(Request::new(request), method.http_path.clone(), method.codec())
            .await
        {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Server Streaming gRPC call (Single Request -> Stream of Responses).
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(Streaming))` - The stream was opened.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - The call could not be issued.
    pub async fn server_streaming(
        &self,
        method: &str,
        request: DynamicMessage,
    ) -> Result<Result<Streaming<DynamicMessage>, tonic::Status>, GrpcRequestError> {
        let method = self.prepare(method, CallShape::ServerStreaming)?;
        method.check_request(&request)?;
        let mut client = self.ready().await?;

        match client
            .server_streaming(Request::new(request), method.http_path.clone(), method.codec())
            .await
        {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Client Streaming gRPC call (Stream of Requests -> Single Response).
    ///
    /// Requests of the wrong type are rejected by the codec with `INVALID_ARGUMENT`.
    pub async fn client_streaming(
        &self,
        method: &str,
        requests: impl Stream<Item = DynamicMessage> + Send + 'static,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        let method = self.prepare(method, CallShape::ClientStreaming)?;
        let mut client = self.ready().await?;

        match client
            .client_streaming(Request::new(requests), method.http_path.clone(), method.codec())
            .await
        {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    /// Performs a Bidirectional Streaming gRPC call (Stream of Requests -> Stream of Responses).
    pub async fn streaming(
        &self,
        method: &str,
        requests: impl Stream<Item = DynamicMessage> + Send + 'static,
    ) -> Result<Result<Streaming<DynamicMessage>, tonic::Status>, GrpcRequestError> {
        let method = self.prepare(method, CallShape::Bidirectional)?;
        let mut client = self.ready().await?;

        match client
            .streaming(Request::new(requests), method.http_path.clone(), method.codec())
            .await
        {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }

    async fn ready(&self) -> Result<Grpc<S>, GrpcRequestError> {
        let mut client = self.client.clone();
        client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;
        Ok(client)
    }
}

/// V2Ray configs name the API endpoint as `host:port`, tonic wants a URI.
fn endpoint_uri(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
