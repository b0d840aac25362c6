#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming, service::Routes};
use v2mgr_core::ManagerConfig;
use v2ray_fixture::pb::v2ray::core::app::log::command as log;
use v2ray_fixture::pb::v2ray::core::app::proxyman::command as proxyman;
use v2ray_fixture::pb::v2ray::core::app::stats::command as stats;
use v2ray_fixture::pb::v2ray::core::testing;
use v2ray_fixture::{
    HandlerService, HandlerServiceServer, LoggerService, LoggerServiceServer, StatsService,
    StatsServiceServer, StreamService, StreamServiceServer,
};

/// A counter value above 2^53, which a double cannot hold exactly.
pub const BIG_COUNTER: i64 = 9_007_199_254_740_993;

/// Requests received by the mock servers, shared with the test.
#[derive(Clone, Default)]
pub struct Recorded {
    pub query_stats: Arc<Mutex<Vec<stats::QueryStatsRequest>>>,
    pub add_inbound: Arc<Mutex<Vec<proxyman::AddInboundRequest>>>,
    pub alter_inbound: Arc<Mutex<Vec<proxyman::AlterInboundRequest>>>,
    pub alter_outbound: Arc<Mutex<Vec<proxyman::AlterOutboundRequest>>>,
}

pub struct MockStats {
    recorded: Recorded,
}

#[tonic::async_trait]
impl StatsService for MockStats {
    async fn get_stats(
        &self,
        request: Request<stats::GetStatsRequest>,
    ) -> Result<Response<stats::GetStatsResponse>, Status> {
        let request = request.into_inner();
        if request.name == "missing" {
            return Err(Status::not_found("missing not found."));
        }

        Ok(Response::new(stats::GetStatsResponse {
            stat: Some(stats::Stat {
                name: request.name,
                value: BIG_COUNTER,
            }),
        }))
    }

    async fn query_stats(
        &self,
        request: Request<stats::QueryStatsRequest>,
    ) -> Result<Response<stats::QueryStatsResponse>, Status> {
        self.recorded
            .query_stats
            .lock()
            .unwrap()
            .push(request.into_inner());

        Ok(Response::new(stats::QueryStatsResponse {
            stat: vec![
                stats::Stat {
                    name: "user>>>a@b.com>>>traffic>>>uplink".to_string(),
                    value: 1024,
                },
                stats::Stat {
                    name: "user>>>a@b.com>>>traffic>>>downlink".to_string(),
                    value: 0,
                },
            ],
        }))
    }

    async fn get_sys_stats(
        &self,
        _request: Request<stats::SysStatsRequest>,
    ) -> Result<Response<stats::SysStatsResponse>, Status> {
        Ok(Response::new(stats::SysStatsResponse {
            num_goroutine: 12,
            alloc: 2048,
            uptime: 60,
            ..Default::default()
        }))
    }
}

pub struct MockLogger {
    fail: bool,
}

#[tonic::async_trait]
impl LoggerService for MockLogger {
    type FollowLogStream = ReceiverStream<Result<log::FollowLogResponse, Status>>;

    async fn restart_logger(
        &self,
        _request: Request<log::RestartLoggerRequest>,
    ) -> Result<Response<log::RestartLoggerResponse>, Status> {
        Ok(Response::new(log::RestartLoggerResponse {}))
    }

    async fn follow_log(
        &self,
        _request: Request<log::FollowLogRequest>,
    ) -> Result<Response<Self::FollowLogStream>, Status> {
        let (tx, rx) = mpsc::channel(4);
        let fail = self.fail;

        tokio::spawn(async move {
            for i in 0..3 {
                let response = log::FollowLogResponse {
                    message: format!("accepted tcp:example.com:443 [{i}]"),
                };
                tx.send(Ok(response)).await.ok();
            }
            if fail {
                tx.send(Err(Status::unavailable("logger closed"))).await.ok();
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

pub struct MockHandler {
    recorded: Recorded,
}

#[tonic::async_trait]
impl HandlerService for MockHandler {
    async fn add_inbound(
        &self,
        request: Request<proxyman::AddInboundRequest>,
    ) -> Result<Response<proxyman::AddInboundResponse>, Status> {
        self.recorded
            .add_inbound
            .lock()
            .unwrap()
            .push(request.into_inner());
        Ok(Response::new(proxyman::AddInboundResponse {}))
    }

    async fn remove_inbound(
        &self,
        _request: Request<proxyman::RemoveInboundRequest>,
    ) -> Result<Response<proxyman::RemoveInboundResponse>, Status> {
        Err(Status::unimplemented("not used by the manager"))
    }

    async fn alter_inbound(
        &self,
        request: Request<proxyman::AlterInboundRequest>,
    ) -> Result<Response<proxyman::AlterInboundResponse>, Status> {
        let request = request.into_inner();
        let tag = request.tag.clone();
        self.recorded.alter_inbound.lock().unwrap().push(request);

        if tag == "missing" {
            return Err(Status::not_found("handler not found: missing"));
        }
        Ok(Response::new(proxyman::AlterInboundResponse {}))
    }

    async fn add_outbound(
        &self,
        _request: Request<proxyman::AddOutboundRequest>,
    ) -> Result<Response<proxyman::AddOutboundResponse>, Status> {
        Err(Status::unimplemented("not used by the manager"))
    }

    async fn remove_outbound(
        &self,
        _request: Request<proxyman::RemoveOutboundRequest>,
    ) -> Result<Response<proxyman::RemoveOutboundResponse>, Status> {
        Err(Status::unimplemented("not used by the manager"))
    }

    async fn alter_outbound(
        &self,
        request: Request<proxyman::AlterOutboundRequest>,
    ) -> Result<Response<proxyman::AlterOutboundResponse>, Status> {
        self.recorded
            .alter_outbound
            .lock()
            .unwrap()
            .push(request.into_inner());
        Err(Status::unimplemented("outbound operations are not supported"))
    }
}

pub struct MockStream;

#[tonic::async_trait]
impl StreamService for MockStream {
    type EchoStream = ReceiverStream<Result<testing::Sample, Status>>;

    async fn collect(
        &self,
        request: Request<Streaming<testing::Sample>>,
    ) -> Result<Response<testing::Tally>, Status> {
        let mut samples = request.into_inner();
        let mut tally = testing::Tally::default();

        while let Some(sample) = samples.message().await? {
            tally.sum += sample.value;
            tally.count += 1;
        }

        Ok(Response::new(tally))
    }

    async fn echo(
        &self,
        request: Request<Streaming<testing::Sample>>,
    ) -> Result<Response<Self::EchoStream>, Status> {
        let mut samples = request.into_inner();
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            loop {
                match samples.message().await {
                    Ok(Some(sample)) => {
                        let doubled = testing::Sample {
                            value: sample.value * 2,
                        };
                        if tx.send(Ok(doubled)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        tx.send(Err(status)).await.ok();
                        break;
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// The streaming test service: `Collect` sums samples, `Echo` doubles each one.
pub fn stream_routes() -> Routes {
    Routes::new(StreamServiceServer::new(MockStream))
}

/// All three control services on one in-process transport.
pub fn routes(recorded: &Recorded) -> Routes {
    routes_with_log_failure(recorded, false)
}

/// Like [`routes`], with a log stream that ends in an error after three records.
pub fn routes_with_log_failure(recorded: &Recorded, fail: bool) -> Routes {
    Routes::new(HandlerServiceServer::new(MockHandler {
        recorded: recorded.clone(),
    }))
    .add_service(StatsServiceServer::new(MockStats {
        recorded: recorded.clone(),
    }))
    .add_service(LoggerServiceServer::new(MockLogger { fail }))
}

pub fn config() -> ManagerConfig {
    ManagerConfig::new("127.0.0.1:10085", v2ray_fixture::PROTO_DIR)
}
