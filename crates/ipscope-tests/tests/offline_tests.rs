//! End-to-end tests of the caching layer over HTTP and on disk.
//!
//! Run with: `cargo test -p ipscope-tests --test offline_tests`

use ipscope_cache::{ReconcileService, WorkerState};
use ipscope_core::ports::{CacheStorage, IpLookup};
use ipscope_core::{Error, InboundMessage, OutboundMessage, Reply, Request};
use ipscope_net::IpInfoClient;
use ipscope_tests::{
    SHELL_CSS, SHELL_HTML, TestContext, lookup_body, mount_font_css, mount_lookup, mount_shell,
    wait_for,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

async fn start_v1(ctx: &TestContext) {
    let worker = ctx
        .worker(ctx.worker_config("v1"))
        .expect("Failed to build worker");
    let state = ctx
        .registration
        .register(worker)
        .await
        .expect("Failed to register worker");
    assert_eq!(state, WorkerState::Activated);
}

#[tokio::test]
async fn test_installed_shell_is_served_offline() {
    let ctx = TestContext::new().await;
    mount_shell(&ctx.origin).await;
    start_v1(&ctx).await;

    ctx.set_offline(true);
    let page = ctx
        .registration
        .resolve(&Request::navigate(ctx.url("/")))
        .await
        .expect("Shell not served offline");
    assert_eq!(page.text().unwrap(), SHELL_HTML);

    let css = ctx
        .registration
        .resolve(&Request::get(ctx.url("/style.css")))
        .await
        .expect("Stylesheet not served offline");
    assert_eq!(css.text().unwrap(), SHELL_CSS);

    let entries = ctx.store.entries("static-v1").await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_lookup_falls_back_to_cached_copy() {
    let ctx = TestContext::new().await;
    mount_shell(&ctx.origin).await;
    mount_lookup(&ctx.api, "203.0.113.7").await;
    start_v1(&ctx).await;

    let online = ctx.routed_lookup().lookup().await.expect("Lookup failed");
    assert_eq!(online.ip, "203.0.113.7");

    ctx.set_offline(true);
    let offline = ctx
        .routed_lookup()
        .lookup()
        .await
        .expect("Cached lookup failed");
    assert_eq!(offline, online);
}

#[tokio::test]
async fn test_lookup_offline_without_cache_fails() {
    let ctx = TestContext::new().await;
    mount_shell(&ctx.origin).await;
    start_v1(&ctx).await;

    ctx.set_offline(true);
    let err = ctx.routed_lookup().lookup().await.unwrap_err();
    assert!(err.is_network(), "got {:?}", err);
}

#[tokio::test]
async fn test_upgrade_evicts_previous_version_on_disk() {
    let ctx = TestContext::new().await;
    mount_shell(&ctx.origin).await;
    start_v1(&ctx).await;
    let _client = ctx.clients.connect().await;

    let v2 = ctx
        .worker(ctx.worker_config("v2").with_skip_waiting(false))
        .unwrap();
    let state = ctx.registration.register(v2).await.unwrap();
    assert_eq!(state, WorkerState::Installed);
    assert!(ctx.cache_dir.path().join("static-v1").exists());

    let reply = ctx
        .registration
        .post_message(InboundMessage::SkipWaiting)
        .await
        .unwrap();
    assert!(reply.is_none());

    assert_eq!(
        ctx.store.keys().await.unwrap(),
        vec!["dynamic-v2".to_string(), "static-v2".to_string()]
    );
    assert!(!ctx.cache_dir.path().join("static-v1").exists());
    assert_eq!(ctx.store.entries("static-v2").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_upgrade_keeps_active_version() {
    let ctx = TestContext::new().await;
    mount_shell(&ctx.origin).await;
    start_v1(&ctx).await;

    // The new version's stylesheet is missing.
    ctx.origin.reset().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SHELL_HTML))
        .mount(&ctx.origin)
        .await;

    let v2 = ctx.worker(ctx.worker_config("v2")).unwrap();
    let err = ctx.registration.register(v2.clone()).await.unwrap_err();
    assert!(matches!(err, Error::InstallFailed { .. }), "got {:?}", err);
    assert_eq!(v2.state(), WorkerState::Redundant);

    let active = ctx.registration.active().await.unwrap();
    assert_eq!(active.version(), "v1");
    assert!(!ctx.cache_dir.path().join("static-v2").exists());
    assert_eq!(ctx.store.entries("static-v1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_partitions_survive_restart() {
    let ctx = TestContext::new().await;
    mount_shell(&ctx.origin).await;
    start_v1(&ctx).await;

    let reopened = ctx.reopen_store();
    let page = reopened
        .lookup("static-v1", &Request::get(ctx.url("/")).key())
        .await
        .unwrap()
        .expect("Entry lost across restart");
    assert_eq!(page.text().unwrap(), SHELL_HTML);
    assert!(page.stored_at.is_some());
}

#[tokio::test]
async fn test_font_stylesheet_revalidates_in_background() {
    let ctx = TestContext::new().await;
    mount_shell(&ctx.origin).await;
    mount_font_css(&ctx.origin, "/* first */").await;
    start_v1(&ctx).await;

    let request = Request::get(ctx.url("/css2?family=Inter"));
    let first = ctx.registration.resolve(&request).await.unwrap();
    assert_eq!(first.text().unwrap(), "/* first */");

    ctx.origin.reset().await;
    mount_font_css(&ctx.origin, "/* second */").await;

    let stale = ctx.registration.resolve(&request).await.unwrap();
    assert_eq!(stale.text().unwrap(), "/* first */");

    let key = request.key();
    let refreshed = wait_for(Duration::from_secs(5), Duration::from_millis(20), || {
        let store = ctx.store.clone();
        let key = key.clone();
        async move {
            matches!(
                store.lookup("dynamic-v1", &key).await,
                Ok(Some(ref r)) if r.body == b"/* second */"
            )
        }
    })
    .await;
    assert!(refreshed, "Background revalidation never landed");
}

#[tokio::test]
async fn test_client_messages() {
    let ctx = TestContext::new().await;
    mount_shell(&ctx.origin).await;
    start_v1(&ctx).await;

    let reply = ctx
        .registration
        .post_message(InboundMessage::GetVersion)
        .await
        .unwrap();
    assert_eq!(
        reply,
        Some(Reply::Version {
            version: "v1".to_string()
        })
    );

    let payload = lookup_body("203.0.113.7");
    let reply = ctx
        .registration
        .post_message(InboundMessage::CacheIpData(payload.clone()))
        .await
        .unwrap();
    assert!(reply.is_none());
    let active = ctx.registration.active().await.unwrap();
    assert_eq!(
        active.cached_ip_data("203.0.113.7").await.unwrap(),
        Some(payload)
    );

    let reply = ctx
        .registration
        .post_message(InboundMessage::ClearCache)
        .await
        .unwrap();
    assert_eq!(
        reply,
        Some(Reply::CacheCleared {
            success: true,
            error: None
        })
    );
    assert!(ctx.store.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_pushes_lookup_to_clients() {
    let ctx = TestContext::new().await;
    mount_lookup(&ctx.api, "198.51.100.9").await;
    let mut connection = ctx.clients.connect().await;

    let lookup: Arc<dyn IpLookup> =
        Arc::new(IpInfoClient::new(ctx.lookup_config()).expect("Failed to create client"));
    let service = ReconcileService::new(lookup, ctx.clients.clone(), Duration::from_secs(60));
    assert_eq!(service.reconcile_once().await.unwrap(), 1);

    match connection.rx.recv().await {
        Some(OutboundMessage::IpUpdate(snapshot)) => assert_eq!(snapshot.ip, "198.51.100.9"),
        other => panic!("unexpected message: {:?}", other),
    }
}
