//! End-to-end behaviour of the forwarding stage.

use std::time::{Duration, Instant};

use circuit_proxy::config::ProxyConfig;
use circuit_proxy::resilience::BreakerState;
use reqwest::StatusCode;

mod common;

fn config_with_payloads(dir: &tempfile::TempDir, payloads: &[(&str, &str, &str)]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.fallback.base_dir = Some(dir.path().to_string_lossy().into_owned());
    for (key, file, content) in payloads {
        std::fs::write(dir.path().join(file), content).unwrap();
        config.fallback.payloads.insert(key.to_string(), file.to_string());
    }
    config
}

#[tokio::test]
async fn passes_upstream_response_through() {
    let (backend, recorded) = common::start_programmable_backend(|| async { (201, "created".into()) }).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_payloads(&dir, &[]);
    config.routes.push(common::route("orders", "/orders", format!("http://{backend}/api")));
    let proxy = common::start_proxy(config).await;

    let res = common::client()
        .post(proxy.url("/orders/create?x=1"))
        .header("SOAPAction", "\"http://x/CreateOrder\"")
        .header("X-Tenant", "acme")
        .header("Content-Type", "text/xml")
        .body("<order/>")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(res.headers().get("mock-payload").is_none());
    assert!(res.headers().get("x-request-id").is_some());
    assert_eq!(res.text().await.unwrap(), "created");

    let seen = recorded.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    let request = &seen[0];
    assert!(request.starts_with("POST /api/orders/create?x=1 HTTP/1.1\r\n"), "{request}");
    assert!(request.to_ascii_lowercase().contains("x-tenant: acme"));
    assert!(request.to_ascii_lowercase().contains("content-length: 8"));
    assert!(request.to_ascii_lowercase().contains("content-type: text/xml"));
    assert!(!request.to_ascii_lowercase().contains("transfer-encoding"));
    assert!(request.ends_with("<order/>"));

    let registry = proxy.stage.executor().registry();
    assert_eq!(registry.state("orders-create-CreateOrder"), Some(BreakerState::Closed));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn chunked_upload_is_forwarded_chunked() {
    let (backend, recorded) = common::start_mock_backend("stored").await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_payloads(&dir, &[]);
    config.routes.push(common::route("uploads", "/uploads", format!("http://{backend}")));
    let proxy = common::start_proxy(config).await;

    let response = common::send_raw(
        proxy.addr,
        "POST /uploads/doc HTTP/1.1\r\n\
         Host: proxy\r\n\
         Content-Type: application/xml\r\n\
         Transfer-Encoding: chunked\r\n\
         Connection: close\r\n\
         \r\n\
         4\r\n<a/>\r\n0\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("stored"));

    let seen = recorded.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    let request = seen[0].to_ascii_lowercase();
    assert!(request.starts_with("post /uploads/doc http/1.1\r\n"), "{request}");
    assert!(request.contains("transfer-encoding: chunked"));
    assert!(!request.contains("content-length"));
    assert!(request.contains("content-type: application/xml"));
    assert!(request.contains("<a/>"));

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn upstream_5xx_is_not_replaced() {
    let (backend, _) = common::start_programmable_backend(|| async { (502, "bad gateway".into()) }).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_payloads(&dir, &[("orders", "orders.json", "{}")]);
    config.routes.push(common::route("orders", "/orders", format!("http://{backend}")));
    let proxy = common::start_proxy(config).await;

    let res = common::client().get(proxy.url("/orders/list")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(res.headers().get("mock-payload").is_none());

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn unreachable_upstream_serves_json_fallback() {
    let upstream = common::closed_port().await;
    let dir = tempfile::tempdir().unwrap();
    let payload = r#"{"status":"unavailable"}"#;
    let mut config = config_with_payloads(&dir, &[("orders-create-CreateOrder", "create.json", payload)]);
    config.routes.push(common::route("orders", "/orders", format!("http://{upstream}")));
    let proxy = common::start_proxy(config).await;

    let res = common::client()
        .post(proxy.url("/orders/create"))
        .header("SOAPAction", "http://x/CreateOrder")
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.headers()["mock-payload"], "true");
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "unavailable");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn broader_key_payload_is_used() {
    let upstream = common::closed_port().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_payloads(&dir, &[("billing", "billing.json", r#"{"billing":"down"}"#)]);
    config.routes.push(common::route("billing", "/billing", format!("http://{upstream}")));
    let proxy = common::start_proxy(config).await;

    let res = common::client().get(proxy.url("/billing/invoices")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), r#"{"billing":"down"}"#);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn hanging_upstream_times_out_to_xml_fallback() {
    let upstream = common::start_hanging_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_payloads(&dir, &[("soap-svc-", "fault.xml", "<fault/>")]);
    config.breaker.execution_timeout_ms = 200;
    config.routes.push(common::route("soap", "/soap", format!("http://{upstream}")));
    let proxy = common::start_proxy(config).await;

    let started = Instant::now();
    let res = common::client().get(proxy.url("/soap/svc.asmx")).send().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()["content-type"], "text/xml");
    assert_eq!(res.headers()["mock-payload"], "true");
    assert_eq!(res.text().await.unwrap(), "<fault/>");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn breaker_opens_after_repeated_failures() {
    let upstream = common::closed_port().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_payloads(&dir, &[("inventory", "inventory.json", "{}")]);
    config.breaker.request_volume_threshold = 3;
    config.breaker.sleep_window_ms = 60_000;
    config.routes.push(common::route("inventory", "/inventory", format!("http://{upstream}")));
    let proxy = common::start_proxy(config).await;

    let client = common::client();
    for _ in 0..5 {
        let res = client.get(proxy.url("/inventory/count")).send().await.unwrap();
        assert_eq!(res.headers()["mock-payload"], "true");
    }

    let registry = proxy.stage.executor().registry();
    assert_eq!(registry.state("inventory-count-"), Some(BreakerState::Open));
    assert_eq!(registry.get(&"inventory-count-".into()).counts().total, 3);

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn missing_fallback_is_a_plain_500() {
    let upstream = common::closed_port().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_payloads(&dir, &[]);
    config.routes.push(common::route("orders", "/orders", format!("http://{upstream}")));
    let proxy = common::start_proxy(config).await;

    let res = common::client().get(proxy.url("/orders/list")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.headers().get("mock-payload").is_none());
    assert_eq!(res.headers()["content-type"], "text/plain");

    proxy.shutdown.trigger();
}

#[tokio::test]
async fn unrouted_request_is_404() {
    let (backend, recorded) = common::start_mock_backend("never").await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_payloads(&dir, &[]);
    config.routes.push(common::route("orders", "/orders", format!("http://{backend}")));
    let proxy = common::start_proxy(config).await;

    let res = common::client().get(proxy.url("/billing/x")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "No matching route found");
    assert!(recorded.lock().unwrap().is_empty());

    proxy.shutdown.trigger();
}
