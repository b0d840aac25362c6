//! # V2Ray Manager
//!
//! [`V2rayManager`] is the facade over the V2Ray control API. It owns the schema registry and
//! one [`ServiceClient`] per control service (handler, stats, logger), built once at startup.
//!
//! Every operation is a single request/response cycle: build the request with the
//! [`EnvelopeCodec`], invoke the method, project the response with the [`ResponseProjector`].
//!
//! ## Error Handling
//!
//! Operations return `Result<Reply, OperationError>`:
//!
//! * `Ok(Ok(value))` - The call succeeded, `value` is the projected response.
//! * `Ok(Err(RpcFailure))` - The transport or the server reported an error. It has been logged
//!   with the operation name. Failed calls look like successful ones apart from the error.
//! * `Err(OperationError)` - The request could not be built or the response could not be
//!   projected. These point at a broken schema tree or invalid input, not at the server.
//!
//! ## Example
//!
//! ```rust,no_run
//! use v2mgr_core::{ManagerConfig, V2rayManager, reply_to_plain};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = V2rayManager::connect(&ManagerConfig::new("127.0.0.1:10085", "protos"))?;
//! let reply = manager.query_stats(Some("user>>>"), false).await?;
//! println!("{}", reply_to_plain(reply));
//! # Ok(())
//! # }
//! ```
pub mod types;

use crate::{
    BoxError,
    config::ManagerConfig,
    envelope::{AnyEnvelope, EnvelopeCodec, EnvelopeError, embed, set_path},
    grpc::client::{ClientBuildError, GrpcRequestError, ServiceClient},
    projector::{ProjectionError, ResponseProjector},
    schema::registry::{SchemaError, SchemaRegistry},
};
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, Value as FieldValue};
use serde_json::{Value, json};
use std::{net::IpAddr, sync::Arc};
use tonic::{client::GrpcService, transport::Channel};
use tracing::{error, info};
use types::{InboundSettings, ProxyProtocol, Reply, RpcFailure, UserSpec};

const HANDLER_SCHEMA: &str = "app/proxyman/command/command.proto";
const STATS_SCHEMA: &str = "app/stats/command/command.proto";
const LOGGER_SCHEMA: &str = "app/log/command/config.proto";

const HANDLER_SERVICE: &str = "v2ray.core.app.proxyman.command.HandlerService";
const STATS_SERVICE: &str = "v2ray.core.app.stats.command.StatsService";
const LOGGER_SERVICE: &str = "v2ray.core.app.log.command.LoggerService";

const ADD_USER_OPERATION: &str = "v2ray.core.app.proxyman.command.AddUserOperation";
const REMOVE_USER_OPERATION: &str = "v2ray.core.app.proxyman.command.RemoveUserOperation";

const RECEIVER_CONFIG: &str = "v2ray.core.app.proxyman.ReceiverConfig";
const RECEIVER_SCHEMA: &str = "app/proxyman/config.proto";

const GET_SYS_STATS: &str = "GetSysStats";
const QUERY_STATS: &str = "QueryStats";
const GET_STATS: &str = "GetStats";
const RESTART_LOGGER: &str = "RestartLogger";
const FOLLOW_LOG: &str = "FollowLog";
const ADD_INBOUND: &str = "AddInbound";
const ALTER_INBOUND: &str = "AlterInbound";
const ALTER_OUTBOUND: &str = "AlterOutbound";

/// Errors that can occur while setting up a manager.
#[derive(Debug, thiserror::Error)]
pub enum ManagerInitError {
    #[error("Failed to load V2Ray schema: '{0}'")]
    Schema(#[from] SchemaError),
    #[error("Failed to build V2Ray API client: '{0}'")]
    Client(#[from] ClientBuildError),
}

/// Local failures of a facade operation.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Failed to build request: '{0}'")]
    Envelope(#[from] EnvelopeError),
    #[error("Failed to project response: '{0}'")]
    Projection(#[from] ProjectionError),
    #[error("Failed to issue request: '{0}'")]
    Request(#[from] GrpcRequestError),
}

/// A client for the handler, stats and logger services of one V2Ray instance.
#[derive(Debug)]
pub struct V2rayManager<S = Channel> {
    registry: Arc<SchemaRegistry>,
    codec: EnvelopeCodec,
    projector: ResponseProjector,
    handler: ServiceClient<S>,
    stats: ServiceClient<S>,
    logger: ServiceClient<S>,
}

impl V2rayManager<Channel> {
    /// Loads the control schemas and builds one plaintext channel per service.
    ///
    /// Channels connect lazily, so this succeeds even when V2Ray is not running yet. It must
    /// be called from within a Tokio runtime.
    pub fn connect(config: &ManagerConfig) -> Result<Self, ManagerInitError> {
        Self::assemble(config, |registry, service| {
            ServiceClient::connect_lazy(registry, service, &config.endpoint)
        })
    }
}

impl<S> V2rayManager<S>
where
    S: Clone,
{
    /// Builds a manager whose three clients share an existing Tonic service
    /// (e.g. an in-process `Routes`).
    pub fn from_service(config: &ManagerConfig, transport: S) -> Result<Self, ManagerInitError> {
        Self::assemble(config, |registry, service| {
            ServiceClient::from_service(registry, service, transport.clone())
        })
    }
}

impl<S> V2rayManager<S> {
    fn assemble<F>(config: &ManagerConfig, mut build: F) -> Result<Self, ManagerInitError>
    where
        F: FnMut(&SchemaRegistry, &str) -> Result<ServiceClient<S>, ClientBuildError>,
    {
        let registry = Arc::new(SchemaRegistry::new(config.proto_dir.clone()));

        registry.load(HANDLER_SCHEMA)?;
        let handler = build(registry.as_ref(), HANDLER_SERVICE)?;
        registry.load(STATS_SCHEMA)?;
        let stats = build(registry.as_ref(), STATS_SERVICE)?;
        registry.load(LOGGER_SCHEMA)?;
        let logger = build(registry.as_ref(), LOGGER_SERVICE)?;

        for schema in &config.preload {
            registry.load(schema)?;
        }

        info!(
            endpoint = %config.endpoint,
            schemas = registry.loaded_files().len(),
            "V2Ray manager ready"
        );

        Ok(Self {
            codec: EnvelopeCodec::new(registry.clone()),
            projector: ResponseProjector::new(registry.clone()),
            registry,
            handler,
            stats,
            logger,
        })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub fn projector(&self) -> &ResponseProjector {
        &self.projector
    }

    pub fn handler_client(&self) -> &ServiceClient<S> {
        &self.handler
    }

    pub fn stats_client(&self) -> &ServiceClient<S> {
        &self.stats
    }

    pub fn logger_client(&self) -> &ServiceClient<S> {
        &self.logger
    }
}

impl<S> V2rayManager<S>
where
    S: GrpcService<tonic::body::Body> + Clone,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Runtime statistics of the V2Ray process (goroutines, memory, uptime).
    pub async fn get_sys_stats(&self) -> Result<Reply, OperationError> {
        self.call(&self.stats, GET_SYS_STATS, json!({})).await
    }

    /// Queries every counter matching `pattern` as a regular expression.
    ///
    /// A missing pattern matches all counters.
    pub async fn query_stats(
        &self,
        pattern: Option<&str>,
        reset: bool,
    ) -> Result<Reply, OperationError> {
        let plain = json!({
            "patterns": [pattern.unwrap_or_default()],
            "reset": reset,
            "regexp": true,
        });
        self.call(&self.stats, QUERY_STATS, plain).await
    }

    /// Reads a single counter (e.g. `user>>>a@b.com>>>traffic>>>uplink`).
    pub async fn get_stats(&self, name: &str, reset: bool) -> Result<Reply, OperationError> {
        let plain = json!({ "name": name, "reset": reset });
        self.call(&self.stats, GET_STATS, plain).await
    }

    pub async fn restart_logger(&self) -> Result<Reply, OperationError> {
        self.call(&self.logger, RESTART_LOGGER, json!({})).await
    }

    /// Subscribes to the server's log stream.
    ///
    /// `on_event` is invoked once per log record with its projected value, or once with the
    /// gRPC failure that ended the subscription. Returns when the server closes the stream.
    ///
    /// Local failures (building the request, projecting a record) end the subscription
    /// without reaching `on_event` and are returned as `Err`.
    pub async fn follow_log<F>(&self, mut on_event: F) -> Result<(), OperationError>
    where
        F: FnMut(Reply),
    {
        let request = self.request(&self.logger, FOLLOW_LOG, json!({}))?;

        let opened = self.logger.server_streaming(FOLLOW_LOG, request).await;
        let mut stream = match settle(FOLLOW_LOG, opened)? {
            Ok(stream) => stream,
            Err(failure) => {
                on_event(Err(failure));
                return Ok(());
            }
        };

        loop {
            match stream.message().await {
                Ok(Some(record)) => on_event(Ok(self.projector.to_plain(&record)?)),
                Ok(None) => break,
                Err(status) => {
                    on_event(Err(report(FOLLOW_LOG, status.into())));
                    break;
                }
            }
        }

        Ok(())
    }

    /// Adds a user to the inbound tagged `tag`.
    ///
    /// The account envelope is built from `user.account` (or `{}`) as the protocol's account
    /// type, loading its schema on first use.
    pub async fn add_inbound_user(
        &self,
        protocol: ProxyProtocol,
        user: UserSpec,
        tag: &str,
    ) -> Result<Reply, OperationError> {
        let account = self.codec.build_any(
            "add_inbound_user",
            protocol.account_type(),
            object_or_empty(user.account),
            Some(protocol.account_schema()),
        )?;

        let plain = json!({
            "user": {
                "level": user.level.unwrap_or(0),
                "email": user.email.unwrap_or_default(),
            }
        });
        let mut operation =
            self.codec
                .build_message("add_inbound_user", ADD_USER_OPERATION, plain, None)?;
        embed(&mut operation, "user.account", &account)?;

        self.alter_inbound(tag, &AnyEnvelope::pack(&operation)).await
    }

    /// Removes the user identified by `email` from the inbound tagged `tag`.
    pub async fn remove_inbound_user(&self, email: &str, tag: &str) -> Result<Reply, OperationError> {
        let operation = self.codec.build_any(
            "remove_inbound_user",
            REMOVE_USER_OPERATION,
            json!({ "email": email }),
            None,
        )?;

        self.alter_inbound(tag, &operation).await
    }

    /// Applies an operation envelope to an outbound handler.
    ///
    /// Provisional: V2Ray does not document any outbound operation type yet, so `operation`
    /// is forwarded untouched.
    pub async fn alter_outbound(
        &self,
        tag: &str,
        operation: &AnyEnvelope,
    ) -> Result<Reply, OperationError> {
        let mut request = self.request(&self.handler, ALTER_OUTBOUND, json!({ "tag": tag }))?;
        embed(&mut request, "operation", operation)?;
        self.dispatch(&self.handler, ALTER_OUTBOUND, request).await
    }

    /// Adds a whole inbound handler.
    ///
    /// Provisional: the receiver settings mirror `app/proxyman/config.proto` and have not been
    /// confirmed against every V2Ray release.
    pub async fn add_inbound(&self, settings: &InboundSettings) -> Result<Reply, OperationError> {
        let listen_ip = settings.listen.parse::<IpAddr>().ok();

        let mut receiver_plain = json!({
            "port_range": { "From": settings.port, "To": settings.port },
            "allocation_strategy": object_or_empty(settings.allocate.clone()),
            "stream_settings": object_or_empty(settings.stream_settings.clone()),
            "receive_original_destination": false,
            "sniffing_settings": object_or_empty(settings.sniffing.clone()),
        });
        if listen_ip.is_none() {
            receiver_plain["listen"] = json!({ "domain": settings.listen });
        }

        let mut receiver = self.codec.build_message(
            "add_inbound",
            RECEIVER_CONFIG,
            receiver_plain,
            Some(RECEIVER_SCHEMA),
        )?;
        if let Some(ip) = listen_ip {
            set_path(&mut receiver, "listen.ip", FieldValue::Bytes(ip_octets(ip).into()))?;
        }

        let protocol = settings.protocol;
        let proxy = self.codec.build_any(
            "add_inbound",
            protocol.inbound_config_type(),
            object_or_empty(Some(settings.settings.clone())),
            Some(protocol.inbound_config_schema()),
        )?;

        let mut request = self.request(
            &self.handler,
            ADD_INBOUND,
            json!({ "inbound": { "tag": settings.tag } }),
        )?;
        embed(&mut request, "inbound.receiver_settings", &AnyEnvelope::pack(&receiver))?;
        embed(&mut request, "inbound.proxy_settings", &proxy)?;

        self.dispatch(&self.handler, ADD_INBOUND, request).await
    }

    async fn alter_inbound(
        &self,
        tag: &str,
        operation: &AnyEnvelope,
    ) -> Result<Reply, OperationError> {
        let mut request = self.request(&self.handler, ALTER_INBOUND, json!({ "tag": tag }))?;
        embed(&mut request, "operation", operation)?;
        self.dispatch(&self.handler, ALTER_INBOUND, request).await
    }

    fn request(
        &self,
        client: &ServiceClient<S>,
        method: &str,
        plain: Value,
    ) -> Result<DynamicMessage, OperationError> {
        let descriptor = client.method(method)?.request_type().clone();
        Ok(self.codec.build_with_descriptor(method, &descriptor, plain)?)
    }

    async fn call(
        &self,
        client: &ServiceClient<S>,
        method: &str,
        plain: Value,
    ) -> Result<Reply, OperationError> {
        let request = self.request(client, method, plain)?;
        self.dispatch(client, method, request).await
    }

    async fn dispatch(
        &self,
        client: &ServiceClient<S>,
        method: &str,
        request: DynamicMessage,
    ) -> Result<Reply, OperationError> {
        match settle(method, client.unary(method, request).await)? {
            Ok(response) => Ok(Ok(self.projector.to_plain(&response)?)),
            Err(failure) => Ok(Err(failure)),
        }
    }
}

/// Folds remote statuses and unready transports into [`RpcFailure`]s, and keeps everything
/// else as a local error.
fn settle<T>(
    operation: &str,
    outcome: Result<Result<T, tonic::Status>, GrpcRequestError>,
) -> Result<Result<T, RpcFailure>, OperationError> {
    match outcome {
        Ok(Ok(value)) => Ok(Ok(value)),
        Ok(Err(status)) => Ok(Err(report(operation, status.into()))),
        Err(GrpcRequestError::ClientNotReady(source)) => Ok(Err(report(
            operation,
            RpcFailure::new(tonic::Code::Unavailable, source.to_string()),
        ))),
        Err(err) => Err(err.into()),
    }
}

fn report(operation: &str, failure: RpcFailure) -> RpcFailure {
    error!(
        operation = %operation,
        code = failure.code,
        details = %failure.details,
        "V2Ray API call failed"
    );
    failure
}

fn object_or_empty(value: Option<Value>) -> Value {
    match value {
        Some(Value::Null) | None => json!({}),
        Some(value) => value,
    }
}

fn ip_octets(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}
