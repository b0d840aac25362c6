use mock_v2ray_impl::{Recorded, config, routes, routes_with_log_failure};
use prost::Message;
use prost_reflect::DynamicMessage;
use serde_json::json;
use tonic::{Code, service::Routes};
use v2mgr_core::{
    AnyEnvelope, InboundSettings, ManagerConfig, ManagerInitError, ProxyProtocol, RpcFailure,
    UserSpec, V2rayManager, reply_to_plain,
};
use v2ray_fixture::pb::v2ray::core::app::proxyman::command::{
    AddUserOperation, RemoveUserOperation,
};

mod mock_v2ray_impl;

fn setup() -> (V2rayManager<Routes>, Recorded) {
    let recorded = Recorded::default();
    let manager = V2rayManager::from_service(&config(), routes(&recorded)).unwrap();
    (manager, recorded)
}

#[test]
fn test_construction_loads_services_and_preload() {
    let (manager, _) = setup();

    assert_eq!(
        manager.handler_client().service_name(),
        "v2ray.core.app.proxyman.command.HandlerService"
    );
    assert_eq!(
        manager.stats_client().service_name(),
        "v2ray.core.app.stats.command.StatsService"
    );
    assert_eq!(
        manager.logger_client().service_name(),
        "v2ray.core.app.log.command.LoggerService"
    );

    let registry = manager.registry();
    assert!(registry.is_loaded("app/proxyman/config.proto"));
    assert!(registry.is_loaded("proxy/trojan/config.proto"));
    assert!(!registry.is_loaded("proxy/vmess/account.proto"));
}

#[test]
fn test_construction_fails_without_schemas() {
    let config = ManagerConfig::new("127.0.0.1:10085", "/definitely/not/a/schema/dir");
    let err = V2rayManager::from_service(&config, routes(&Recorded::default())).unwrap_err();

    assert!(matches!(err, ManagerInitError::Schema(_)));
}

#[tokio::test]
async fn test_query_stats_defaults() {
    let (manager, recorded) = setup();

    let reply = manager.query_stats(None, false).await.unwrap();

    assert_eq!(
        reply.unwrap(),
        json!({ "stat": [
            { "name": "user>>>a@b.com>>>traffic>>>uplink", "value": "1024" },
            { "name": "user>>>a@b.com>>>traffic>>>downlink" }
        ] })
    );

    let requests = recorded.query_stats.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].patterns, vec![String::new()]);
    assert!(requests[0].regexp);
    assert!(!requests[0].reset);
}

#[tokio::test]
async fn test_query_stats_with_pattern() {
    let (manager, recorded) = setup();

    manager.query_stats(Some("user>>>"), true).await.unwrap().unwrap();

    let requests = recorded.query_stats.lock().unwrap();
    assert_eq!(requests[0].patterns, vec!["user>>>".to_string()]);
    assert!(requests[0].reset);
}

#[tokio::test]
async fn test_get_stats() {
    let (manager, _) = setup();

    let reply = manager.get_stats("inbound>>>api>>>traffic>>>uplink", false).await.unwrap();

    assert_eq!(
        reply.unwrap(),
        json!({ "stat": { "name": "inbound>>>api>>>traffic>>>uplink", "value": "9007199254740993" } })
    );
}

#[tokio::test]
async fn test_remote_failure_shape() {
    let (manager, _) = setup();

    let reply = manager.get_stats("missing", false).await.unwrap();

    let failure = reply.clone().unwrap_err();
    assert_eq!(failure, RpcFailure::new(Code::NotFound, "missing not found."));
    assert_eq!(failure.code(), Code::NotFound);
    assert_eq!(
        reply_to_plain(reply),
        json!({ "error": { "code": 5, "details": "missing not found." } })
    );
}

#[tokio::test]
async fn test_unreachable_server() {
    let config = ManagerConfig::new("127.0.0.1:1", v2ray_fixture::PROTO_DIR);
    let manager = V2rayManager::connect(&config).unwrap();

    let failure = manager.get_sys_stats().await.unwrap().unwrap_err();

    assert_eq!(failure.code(), Code::Unavailable);
}

#[tokio::test]
async fn test_sys_stats_and_logger() {
    let (manager, _) = setup();

    let stats = manager.get_sys_stats().await.unwrap().unwrap();
    assert_eq!(stats, json!({ "NumGoroutine": 12, "Alloc": "2048", "Uptime": 60 }));

    let restarted = manager.restart_logger().await.unwrap().unwrap();
    assert_eq!(restarted, json!({}));
}

#[tokio::test]
async fn test_follow_log() {
    let (manager, _) = setup();

    let mut events = Vec::new();
    manager.follow_log(|event| events.push(event)).await.unwrap();

    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        Ok(json!({ "message": "accepted tcp:example.com:443 [0]" }))
    );
}

#[tokio::test]
async fn test_follow_log_ends_with_failure() {
    let recorded = Recorded::default();
    let manager =
        V2rayManager::from_service(&config(), routes_with_log_failure(&recorded, true)).unwrap();

    let mut events = Vec::new();
    manager.follow_log(|event| events.push(event)).await.unwrap();

    assert_eq!(events.len(), 4);
    assert!(events[..3].iter().all(Result::is_ok));
    assert_eq!(events[3].as_ref().unwrap_err().code(), Code::Unavailable);
}

#[tokio::test]
async fn test_add_vmess_user_without_account() {
    let (manager, recorded) = setup();

    let user = UserSpec {
        email: Some("a@b.com".to_string()),
        ..Default::default()
    };
    let reply = manager
        .add_inbound_user(ProxyProtocol::Vmess, user, "my-tag")
        .await
        .unwrap();
    assert_eq!(reply.unwrap(), json!({}));

    let requests = recorded.alter_inbound.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tag, "my-tag");

    let typed = requests[0].operation.as_ref().unwrap();
    assert_eq!(typed.r#type, "v2ray.core.app.proxyman.command.AddUserOperation");

    let operation = AddUserOperation::decode(typed.value.as_slice()).unwrap();
    let user = operation.user.unwrap();
    assert_eq!(user.email, "a@b.com");
    assert_eq!(user.level, 0);

    let account = user.account.unwrap();
    assert_eq!(account.r#type, "v2ray.core.proxy.vmess.Account");
    assert!(account.value.is_empty());

    assert!(manager.registry().is_loaded("proxy/vmess/account.proto"));
}

#[tokio::test]
async fn test_add_vless_user_with_account() {
    let (manager, recorded) = setup();

    let user = UserSpec {
        level: Some(1),
        email: Some("c@d.com".to_string()),
        account: Some(json!({ "id": "27848739-7e62-4138-9fd3-098a63964b6b", "flow": "" })),
    };
    manager
        .add_inbound_user(ProxyProtocol::Vless, user, "vless-in")
        .await
        .unwrap()
        .unwrap();

    let requests = recorded.alter_inbound.lock().unwrap();
    let typed = requests[0].operation.as_ref().unwrap();
    let operation = AddUserOperation::decode(typed.value.as_slice()).unwrap();
    let user = operation.user.unwrap();
    assert_eq!(user.level, 1);

    let account = user.account.unwrap();
    assert_eq!(account.r#type, "v2ray.core.proxy.vless.Account");

    let descriptor = manager
        .registry()
        .lookup_type("v2ray.core.proxy.vless.Account")
        .unwrap();
    let decoded = DynamicMessage::decode(descriptor, account.value.as_slice()).unwrap();
    assert_eq!(
        decoded.get_field_by_name("id").unwrap().as_str(),
        Some("27848739-7e62-4138-9fd3-098a63964b6b")
    );
}

#[tokio::test]
async fn test_add_user_to_missing_inbound() {
    let (manager, _) = setup();

    let reply = manager
        .add_inbound_user(ProxyProtocol::Trojan, UserSpec::default(), "missing")
        .await
        .unwrap();

    assert_eq!(reply.unwrap_err().code(), Code::NotFound);
}

#[tokio::test]
async fn test_remove_inbound_user() {
    let (manager, recorded) = setup();

    manager
        .remove_inbound_user("a@b.com", "my-tag")
        .await
        .unwrap()
        .unwrap();

    let requests = recorded.alter_inbound.lock().unwrap();
    assert_eq!(requests[0].tag, "my-tag");

    let typed = requests[0].operation.as_ref().unwrap();
    assert_eq!(typed.r#type, "v2ray.core.app.proxyman.command.RemoveUserOperation");

    let operation = RemoveUserOperation::decode(typed.value.as_slice()).unwrap();
    assert_eq!(operation.email, "a@b.com");
}

#[tokio::test]
async fn test_alter_outbound() {
    let (manager, recorded) = setup();

    let operation = AnyEnvelope {
        type_url: "v2ray.core.app.proxyman.command.RemoveUserOperation".to_string(),
        value: vec![0x0a, 0x01, b'x'],
    };
    let reply = manager.alter_outbound("out", &operation).await.unwrap();

    assert_eq!(reply.unwrap_err().code(), Code::Unimplemented);

    let requests = recorded.alter_outbound.lock().unwrap();
    let typed = requests[0].operation.as_ref().unwrap();
    assert_eq!(requests[0].tag, "out");
    assert_eq!(typed.value, vec![0x0a, 0x01, b'x']);
}

#[tokio::test]
async fn test_add_inbound() {
    let (manager, recorded) = setup();

    let settings = InboundSettings {
        tag: "vmess-in".to_string(),
        port: 10086,
        listen: "127.0.0.1".to_string(),
        protocol: ProxyProtocol::Vmess,
        allocate: None,
        stream_settings: None,
        sniffing: Some(json!({ "enabled": true, "destinationOverride": ["http", "tls"] })),
        settings: json!({ "user": [{ "email": "a@b.com" }] }),
    };
    manager.add_inbound(&settings).await.unwrap().unwrap();

    let requests = recorded.add_inbound.lock().unwrap();
    let inbound = requests[0].inbound.as_ref().unwrap();
    assert_eq!(inbound.tag, "vmess-in");

    let receiver = inbound.receiver_settings.as_ref().unwrap();
    assert_eq!(receiver.r#type, "v2ray.core.app.proxyman.ReceiverConfig");
    let descriptor = manager
        .registry()
        .lookup_type("v2ray.core.app.proxyman.ReceiverConfig")
        .unwrap();
    let decoded = DynamicMessage::decode(descriptor, receiver.value.as_slice()).unwrap();
    let plain = manager.projector().to_plain(&decoded).unwrap();
    assert_eq!(plain["portRange"], json!({ "From": 10086, "To": 10086 }));
    assert_eq!(plain["listen"], json!({ "ip": "fwAAAQ==" }));
    assert_eq!(plain["sniffingSettings"]["destinationOverride"], json!(["http", "tls"]));

    let proxy = inbound.proxy_settings.as_ref().unwrap();
    assert_eq!(proxy.r#type, "v2ray.core.proxy.vmess.inbound.Config");
}

#[tokio::test]
async fn test_add_inbound_on_domain() {
    let (manager, recorded) = setup();

    let settings = InboundSettings {
        tag: "trojan-in".to_string(),
        port: 443,
        listen: "proxy.example.com".to_string(),
        protocol: ProxyProtocol::Trojan,
        allocate: None,
        stream_settings: None,
        sniffing: None,
        settings: serde_json::Value::Null,
    };
    manager.add_inbound(&settings).await.unwrap().unwrap();

    let requests = recorded.add_inbound.lock().unwrap();
    let receiver = requests[0]
        .inbound
        .as_ref()
        .and_then(|inbound| inbound.receiver_settings.as_ref())
        .unwrap();
    let descriptor = manager
        .registry()
        .lookup_type("v2ray.core.app.proxyman.ReceiverConfig")
        .unwrap();
    let decoded = DynamicMessage::decode(descriptor, receiver.value.as_slice()).unwrap();
    let plain = manager.projector().to_plain(&decoded).unwrap();

    assert_eq!(plain["listen"], json!({ "domain": "proxy.example.com" }));
}
