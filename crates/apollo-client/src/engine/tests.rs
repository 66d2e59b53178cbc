#![allow(clippy::unwrap_used)]

use super::*;
use crate::config::RetryPolicy;
use apollo_types::{Env, ServiceInstance, NEVER_SYNCED};
use serde_json::json;
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG_PATH: &str = "/configs/sample/default/application";
const NOTIFY_PATH: &str = "/notifications/v2";
const REGISTRY_PATH: &str = "/eureka/apps/APOLLO-CONFIGSERVICE";

fn options(server: &str, cache_dir: &Path) -> ClientOptions {
    ClientOptions::new("sample", "DEV")
        .with_meta_server(Env::Dev, server)
        .with_local_ip("127.0.0.1")
        .with_cache_dir(cache_dir)
        .with_settings(SyncSettings {
            error_backoff: Duration::from_millis(50),
            registry_refresh_interval: Duration::from_millis(50),
            poll_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(5),
            registry_retry: RetryPolicy { max_attempts: 1, delay: Duration::from_millis(10) },
            ..SyncSettings::default()
        })
}

fn payload(namespace: &str, pairs: &[(&str, &str)]) -> String {
    let configurations: serde_json::Map<String, serde_json::Value> =
        pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect();
    json!({
        "appId": "sample",
        "cluster": "default",
        "namespaceName": namespace,
        "configurations": configurations,
        "releaseKey": "20240101-abc"
    })
    .to_string()
}

fn registry_xml(base: &str) -> String {
    format!(
        "<application><name>APOLLO-CONFIGSERVICE</name>\
           <instance><instanceId>cfg-1</instanceId><hostName>cfg-1</hostName>\
             <status>UP</status><homePageUrl>{}/</homePageUrl></instance>\
         </application>",
        base
    )
}

/// A URL nothing listens on.
fn dead_server() -> String {
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    format!("http://127.0.0.1:{}", port)
}

async fn seed_fallback(dir: &Path, namespace: &str, pairs: &[(&str, &str)]) {
    FallbackStore::new(dir)
        .save(&FallbackKey::new("sample", "default", namespace), payload(namespace, pairs).as_bytes())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bootstrap_falls_back_when_server_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    seed_fallback(dir.path(), "application", &[("db.url", "postgres://cached")]).await;

    let engine = SyncEngine::new(options(&dead_server(), dir.path())).unwrap();
    engine.bootstrap().await.unwrap();

    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(engine.cache().get("application", "db.url").as_deref(), Some("postgres://cached"));
}

#[tokio::test]
async fn test_bootstrap_fails_without_remote_or_fallback() {
    let dir = tempfile::tempdir().unwrap();

    let engine = SyncEngine::new(options(&dead_server(), dir.path())).unwrap();
    let err = engine.bootstrap().await.unwrap_err();

    assert!(matches!(err, ClientError::FallbackNotFound { .. }));
    assert_eq!(engine.state(), EngineState::Failed);
    assert!(!engine.cache().contains("application"));
}

#[tokio::test]
async fn test_bootstrap_fetches_and_persists() {
    let server = MockServer::start().await;
    let body = payload("application", &[("timeout", "30")]);
    Mock::given(method("GET"))
        .and(path(REGISTRY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(registry_xml(&server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .and(query_param("ip", "127.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    engine.bootstrap().await.unwrap();

    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(engine.directory().len(), 1);
    assert_eq!(engine.cache().get("application", "timeout").as_deref(), Some("30"));

    let saved = FallbackStore::new(dir.path())
        .load(&FallbackKey::new("sample", "default", "application"))
        .await
        .unwrap();
    assert_eq!(saved, body.into_bytes());
}

#[tokio::test]
async fn test_registry_failure_does_not_block_bootstrap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REGISTRY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload("application", &[("a", "1")])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    engine.bootstrap().await.unwrap();

    assert_eq!(engine.state(), EngineState::Running);
    assert!(engine.directory().is_empty());
    assert_eq!(engine.cache().get("application", "a").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_empty_and_not_modified_fetch_apply_nothing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    engine.cache().update("application", [("a".to_string(), "1".to_string())].into());

    {
        let _empty = Mock::given(method("GET"))
            .and(path(CONFIG_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount_as_scoped(&server)
            .await;
        assert!(!engine.fetch_namespace("application").await.unwrap());
    }
    {
        let _not_modified = Mock::given(method("GET"))
            .and(path(CONFIG_PATH))
            .respond_with(ResponseTemplate::new(304))
            .mount_as_scoped(&server)
            .await;
        assert!(!engine.fetch_namespace("application").await.unwrap());
    }

    assert_eq!(engine.cache().get("application", "a").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_fetch_rejects_error_status_and_bad_payload() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();

    {
        let _missing = Mock::given(method("GET"))
            .and(path(CONFIG_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount_as_scoped(&server)
            .await;
        let err = engine.fetch_namespace("application").await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 404, .. }));
    }
    {
        let _garbage = Mock::given(method("GET"))
            .and(path(CONFIG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount_as_scoped(&server)
            .await;
        let err = engine.fetch_namespace("application").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    assert!(!engine.cache().contains("application"));
}

#[tokio::test]
async fn test_not_modified_after_keepalive_threshold_refetches_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(NOTIFY_PATH))
        .and(query_param("appId", "sample"))
        .and(query_param("cluster", "default"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload("application", &[("a", "2")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/configs/sample/default/billing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload("billing", &[("b", "2")])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    engine.cache().update("application", [("a".to_string(), "1".to_string())].into());
    engine.cache().update("billing", [("b".to_string(), "1".to_string())].into());
    *engine.last_update.write() = Utc::now() - chrono::Duration::hours(13);

    assert_eq!(engine.poll_once().await.unwrap(), PollOutcome::KeepAlive);
    assert_eq!(engine.cache().get("application", "a").as_deref(), Some("2"));
    assert_eq!(engine.cache().get("billing", "b").as_deref(), Some("2"));
    assert!(!engine.keepalive_due());
}

#[tokio::test]
async fn test_not_modified_within_keepalive_window_does_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload("application", &[("a", "2")])))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    engine.cache().update("application", [("a".to_string(), "1".to_string())].into());
    *engine.last_update.write() = Utc::now() - chrono::Duration::hours(1);

    assert_eq!(engine.poll_once().await.unwrap(), PollOutcome::Unchanged);
    assert_eq!(engine.cache().get("application", "a").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_notification_updates_tracker_and_refetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(NOTIFY_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "namespaceName": "application", "notificationId": 42 }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload("application", &[("a", "2")])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    engine.notifications().register("application");

    let outcome = engine.poll_once().await.unwrap();
    assert_eq!(outcome, PollOutcome::Changed(vec!["application".to_string()]));
    assert_eq!(engine.notifications().sequence_for("application"), 42);
    assert_eq!(engine.cache().get("application", "a").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_poll_errors_on_unexpected_status_and_body() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();

    {
        let _unavailable = Mock::given(method("GET"))
            .and(path(NOTIFY_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount_as_scoped(&server)
            .await;
        let err = engine.poll_once().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 503, .. }));
    }
    {
        let _garbage = Mock::given(method("GET"))
            .and(path(NOTIFY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount_as_scoped(&server)
            .await;
        let err = engine.poll_once().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}

#[tokio::test]
async fn test_route_via_instances_uses_selected_instance() {
    let meta = MockServer::start().await;
    let replica = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload("application", &[("a", "1")])))
        .expect(0)
        .mount(&meta)
        .await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload("application", &[("a", "replica")])))
        .expect(1)
        .mount(&replica)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(&meta.uri(), dir.path());
    opts.settings.route_via_instances = true;
    let engine = SyncEngine::new(opts).unwrap();
    engine.directory().replace(vec![ServiceInstance {
        id: "replica".to_string(),
        host: "127.0.0.1".to_string(),
        status: "UP".to_string(),
        home_page_url: format!("{}/", replica.uri()),
    }]);

    assert!(engine.fetch_namespace("application").await.unwrap());
    assert_eq!(engine.cache().get("application", "a").as_deref(), Some("replica"));
}

#[tokio::test]
async fn test_on_demand_namespace_falls_back_to_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/configs/sample/default/billing"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    seed_fallback(dir.path(), "billing", &[("currency", "EUR")]).await;
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();

    assert!(engine.ensure_namespace("billing").await);
    assert_eq!(engine.cache().get("billing", "currency").as_deref(), Some("EUR"));
    assert_eq!(engine.notifications().sequence_for("billing"), NEVER_SYNCED);
    assert!(engine.notifications().namespaces().contains(&"billing".to_string()));

    assert!(!engine.ensure_namespace("audit").await);
    assert!(engine.notifications().namespaces().contains(&"audit".to_string()));
}

#[tokio::test]
async fn test_failed_poll_degrades_and_recovers() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    engine.set_state(EngineState::Running);

    let failing = Mock::given(method("GET"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount_as_scoped(&server)
        .await;

    let handles = engine.spawn_loops();
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.state() != EngineState::Degraded {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    drop(failing);
    Mock::given(method("GET"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(304).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.state() != EngineState::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    engine.signal_shutdown();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn test_undecodable_body_does_not_count_as_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>502 Bad Gateway</html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    *engine.last_update.write() = Utc::now() - chrono::Duration::hours(13);

    let err = engine.fetch_namespace("application").await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    assert!(engine.keepalive_due());
}

#[tokio::test]
async fn test_route_via_instances_skips_instance_without_address() {
    let meta = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload("application", &[("a", "meta")])))
        .expect(1)
        .mount(&meta)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(&meta.uri(), dir.path());
    opts.settings.route_via_instances = true;
    let engine = SyncEngine::new(opts).unwrap();
    engine.directory().replace(vec![ServiceInstance {
        id: "blank".to_string(),
        host: "cfg-1".to_string(),
        status: "UP".to_string(),
        home_page_url: String::new(),
    }]);

    assert!(engine.fetch_namespace("application").await.unwrap());
    assert_eq!(engine.cache().get("application", "a").as_deref(), Some("meta"));
}

#[tokio::test]
async fn test_registry_loop_populates_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REGISTRY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(registry_xml(&server.uri())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(304).set_delay(Duration::from_secs(1)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    assert!(engine.directory().is_empty());

    let handles = engine.spawn_loops();
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.directory().len() != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(engine.directory().select_instance().unwrap().id, "cfg-1");

    engine.signal_shutdown();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_panicking_poll_keeps_loop_alive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(304).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(options(&server.uri(), dir.path())).unwrap();
    engine.set_state(EngineState::Running);
    engine.panic_next_poll.store(true, std::sync::atomic::Ordering::SeqCst);

    let handles = engine.spawn_loops();
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.state() != EngineState::Degraded {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // The loop survives the panic and the next clean poll restores health.
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.state() != EngineState::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(handles.iter().all(|handle| !handle.is_finished()));

    engine.signal_shutdown();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[test]
fn test_panic_message_extraction() {
    let boxed: Box<dyn Any + Send> = Box::new("boom");
    assert_eq!(panic_message(&*boxed), "boom");
    let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
    assert_eq!(panic_message(&*boxed), "bang");
    let boxed: Box<dyn Any + Send> = Box::new(7_u8);
    assert_eq!(panic_message(&*boxed), "unknown panic");
}
