// Full-pass tests for the V7000 driver against a wiremock console.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sanpoll_core::{ArrayConfig, ComponentKind, Credentials, IbmDriver, Vendor};

fn config(server: &MockServer, dir: &tempfile::TempDir) -> ArrayConfig {
    let mut config = ArrayConfig::new(
        Vendor::IbmV7000,
        server.uri().parse().unwrap(),
        Credentials {
            username: "superuser".into(),
            password: secrecy::SecretString::from("passw0rd".to_owned()),
        },
        dir.path().join("ibm_v7000.session"),
    );
    // No throttle against the mock.
    config.pre_login_delay = Duration::ZERO;
    config
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "JSESSIONID=seed; Path=/")
                .append_header("set-cookie", "_sync=0001; Path=/"),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "_auth=deadbeef; Path=/; HttpOnly")
                .append_header("set-cookie", "JSESSIONID=0000abcd; Path=/")
                .append_header("set-cookie", "_ignored=x; Path=/"),
        )
        .mount(server)
        .await;
}

async fn mount_rpc(server: &MockServer, method_name: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/RPCAdapter"))
        .and(body_partial_json(json!({ "methodName": method_name })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_pass_over_the_rpc_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    mount_login(&server).await;
    mount_rpc(
        &server,
        "getClusterSystemBytes",
        json!({ "total": 20000, "used": 12000, "free": 8000 }),
    )
    .await;
    mount_rpc(
        &server,
        "getPools",
        json!([{ "id": "0", "name": "mdiskgrp0", "status": "online",
                 "capacity": 20000, "freeCapacity": 8000 }]),
    )
    .await;
    mount_rpc(
        &server,
        "getClusterStats",
        json!([{ "stat_name": "cpu_pc", "stat_current": 9 }]),
    )
    .await;
    mount_rpc(
        &server,
        "getNodeStats",
        json!([{ "stat_name": "write_cache_pc", "stat_current": 25, "node_id": "1" }]),
    )
    .await;
    mount_rpc(
        &server,
        "getHosts",
        json!([{ "id": "0", "name": "esx-01", "status": "degraded" }]),
    )
    .await;
    mount_rpc(
        &server,
        "getInternalDriveInfo",
        json!([{ "id": "7", "status": "online", "use": "member", "capacity": 4000 }]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/VDiskGridDataHandler"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [{ "id": "12", "name": "vdisk12", "status": "online", "capacity": 1000 }]
        })))
        .mount(&server)
        .await;

    let mut driver = IbmDriver::new(&config(&server, &dir)).unwrap();
    let report = driver.collect().await.unwrap();

    assert_eq!(report.vendor, Vendor::IbmV7000);
    assert_eq!(report.capacity.total_bytes, 20000);
    assert_eq!(report.capacity.used_bytes, 12000);
    assert_eq!(report.capacity.free_bytes, 8000);

    let pool = report
        .components_of(ComponentKind::StoragePool)
        .next()
        .unwrap();
    assert_eq!(pool.health, "online");
    assert_eq!(pool.total_bytes, Some(20000));

    let host = report.components_of(ComponentKind::Host).next().unwrap();
    assert_eq!(host.health, "degraded");

    let drive = report.components_of(ComponentKind::Disk).next().unwrap();
    assert_eq!(drive.running_state.as_deref(), Some("member"));

    let volume = report.components_of(ComponentKind::Volume).next().unwrap();
    assert_eq!(volume.name.as_deref(), Some("vdisk12"));

    assert_eq!(report.performance.len(), 2);
    let node_stat = report
        .performance
        .iter()
        .find(|s| s.object_kind == "node")
        .unwrap();
    assert_eq!(node_stat.object_id, "1");

    // Only the session cookies were kept, in response order.
    let cached = std::fs::read_to_string(dir.path().join("ibm_v7000.session")).unwrap();
    assert_eq!(cached, "_auth=deadbeef;JSESSIONID=0000abcd");
}

#[tokio::test]
async fn test_cached_token_skips_login_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    // No login mocks at all: a cached token must be enough.
    std::fs::write(
        dir.path().join("ibm_v7000.session"),
        "_auth=cached;JSESSIONID=cached",
    )
    .unwrap();

    mount_rpc(&server, "getClusterSystemBytes", json!({ "total": 1, "used": 1, "free": 0 })).await;
    mount_rpc(&server, "getPools", json!([])).await;
    mount_rpc(&server, "getClusterStats", json!([])).await;
    mount_rpc(&server, "getNodeStats", json!([])).await;
    mount_rpc(&server, "getHosts", json!([])).await;
    mount_rpc(&server, "getInternalDriveInfo", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/VDiskGridDataHandler"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rows": [] })))
        .mount(&server)
        .await;

    let mut driver = IbmDriver::new(&config(&server, &dir)).unwrap();
    let report = driver.collect().await.unwrap();
    assert_eq!(report.capacity.total_bytes, 1);
}

#[tokio::test]
async fn test_rejected_token_invalidates_and_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    std::fs::write(
        dir.path().join("ibm_v7000.session"),
        "_auth=stale;JSESSIONID=stale",
    )
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/RPCAdapter"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut driver = IbmDriver::new(&config(&server, &dir)).unwrap();
    let result = driver.collect().await;

    assert!(
        matches!(result, Err(sanpoll_core::CoreError::SessionExpired)),
        "expected SessionExpired, got: {result:?}"
    );
    assert!(!dir.path().join("ibm_v7000.session").exists());
}
