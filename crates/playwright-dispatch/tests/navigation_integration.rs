//! Integration tests for navigation against a scripted driver
//!
//! Each test plays the driver's side of a `goto` or `waitForNavigation`:
//! navigation start, request/response creation, commit and lifecycle
//! events, and checks which outcome the client settles on.

use playwright_dispatch::server::channel_owner::downcast;
use playwright_dispatch::server::connection::ConnectionLike;
use playwright_dispatch::{
    Connection, Error, GotoOptions, LoadState, Page, UrlMatcher, WaitForNavigationOptions,
    WaitUntil,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

mod common;

use common::FakeDriver;

async fn setup() -> (Arc<Connection>, FakeDriver, Page) {
    let (connection, mut driver) = common::connect();
    driver.create_page("page@1", "frame@1", "D0").await;
    let c = Arc::clone(&connection);
    common::wait_until(move || c.get_object("page@1").is_ok()).await;
    let page = downcast::<Page>(&connection.get_object("page@1").unwrap()).unwrap();
    (connection, driver, page)
}

async fn started(driver: &mut FakeDriver, document_id: &str, url: &str) {
    driver
        .event(
            "frame@1",
            "navigationStarted",
            json!({ "documentId": document_id, "url": url }),
        )
        .await;
}

async fn request(driver: &mut FakeDriver, guid: &str, url: &str, redirected_from: Option<&str>) {
    let mut initializer = json!({
        "url": url,
        "method": "GET",
        "resourceType": "document",
        "isNavigationRequest": true,
        "frame": { "guid": "frame@1" },
        "headers": [],
    });
    if let Some(previous) = redirected_from {
        initializer["redirectedFrom"] = json!({ "guid": previous });
    }
    driver.create("page@1", "Request", guid, initializer).await;
}

async fn response(driver: &mut FakeDriver, guid: &str, request: &str, url: &str, status: u16) {
    driver
        .create(
            request,
            "Response",
            guid,
            json!({
                "url": url,
                "status": status,
                "statusText": if status == 200 { "OK" } else { "Found" },
                "headers": [{ "name": "content-type", "value": "text/html" }],
                "request": { "guid": request },
            }),
        )
        .await;
}

async fn committed(driver: &mut FakeDriver, document_id: &str, url: &str, request: &str) {
    driver
        .event(
            "frame@1",
            "navigated",
            json!({
                "url": url,
                "name": "",
                "newDocument": { "documentId": document_id, "request": { "guid": request } },
            }),
        )
        .await;
}

async fn load_state(driver: &mut FakeDriver, state: &str) {
    driver
        .event("frame@1", "loadstate", json!({ "add": state }))
        .await;
}

#[tokio::test]
async fn test_new_document_with_load_resolves_with_its_response() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;
    let url = "https://example.test/";

    let nav = common::spawn({
        let page = page.clone();
        async move { page.goto("https://example.test/", None).await }
    });

    let goto = driver.expect_request("frame@1", "goto").await;
    assert_eq!(goto["params"]["url"], url);
    assert_eq!(goto["params"]["waitUntil"], "load");
    assert_eq!(goto["params"]["timeout"], 30000);
    assert!(goto["params"].get("referer").is_none());

    started(&mut driver, "D1", url).await;
    request(&mut driver, "request@1", url, None).await;
    response(&mut driver, "response@1", "request@1", url, 200).await;
    committed(&mut driver, "D1", url, "request@1").await;
    load_state(&mut driver, "domcontentloaded").await;
    load_state(&mut driver, "load").await;
    driver
        .respond(&goto["id"], json!({ "response": { "guid": "response@1" } }))
        .await;

    let response = nav.await.unwrap().unwrap().expect("navigation response");
    assert_eq!(response.guid(), "response@1");
    assert_eq!(response.status(), 200);
    assert!(response.ok());
    assert_eq!(response.headers()["content-type"], "text/html");
    assert_eq!(response.request().unwrap().url(), url);

    let frame = page.main_frame().unwrap();
    assert_eq!(page.url(), url);
    assert_eq!(frame.document_id().as_deref(), Some("D1"));
    assert!(frame.load_states().contains(&LoadState::Load));
}

#[tokio::test]
async fn test_same_document_navigation_resolves_without_response() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;

    let nav = common::spawn({
        let page = page.clone();
        async move { page.goto("about:blank#section", None).await }
    });
    let goto = driver.expect_request("frame@1", "goto").await;

    driver
        .event(
            "frame@1",
            "navigated",
            json!({ "url": "about:blank#section", "name": "" }),
        )
        .await;
    driver.respond(&goto["id"], json!({})).await;

    assert!(nav.await.unwrap().unwrap().is_none());
    let frame = page.main_frame().unwrap();
    assert_eq!(frame.url(), "about:blank#section");
    assert_eq!(frame.document_id().as_deref(), Some("D0"));
}

#[tokio::test]
async fn test_second_navigation_cancels_the_first() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;

    let first = common::spawn({
        let page = page.clone();
        async move { page.goto("https://example.test/one", None).await }
    });
    let goto = driver.expect_request("frame@1", "goto").await;
    started(&mut driver, "D1", "https://example.test/one").await;
    driver
        .respond(&goto["id"], json!({ "newDocumentId": "D1" }))
        .await;

    // A script-initiated navigation takes over before D1 commits
    started(&mut driver, "D2", "https://example.test/two").await;
    request(&mut driver, "request@2", "https://example.test/two", None).await;
    committed(&mut driver, "D2", "https://example.test/two", "request@2").await;
    load_state(&mut driver, "load").await;

    let err = first.await.unwrap().unwrap_err();
    assert!(err.is_canceled(), "expected cancellation, got {err}");
    assert!(!err.is_timeout());
    assert!(err.to_string().contains("https://example.test/two"));
}

#[tokio::test]
async fn test_missing_milestone_times_out() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;

    let nav = common::spawn({
        let page = page.clone();
        async move {
            page.goto(
                "https://slow.test/",
                Some(GotoOptions::new().timeout(Duration::from_millis(50))),
            )
            .await
        }
    });
    let goto = driver.expect_request("frame@1", "goto").await;
    assert_eq!(goto["params"]["timeout"], 50);

    started(&mut driver, "D1", "https://slow.test/").await;
    request(&mut driver, "request@1", "https://slow.test/", None).await;
    committed(&mut driver, "D1", "https://slow.test/", "request@1").await;
    driver
        .respond(&goto["id"], json!({ "newDocumentId": "D1" }))
        .await;

    match nav.await.unwrap() {
        Err(Error::NavigationTimeout { url, duration_ms }) => {
            assert_eq!(url, "https://slow.test/");
            assert_eq!(duration_ms, 50);
        }
        other => panic!("expected a navigation timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_redirect_chain_resolves_with_final_response() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;
    let (a, b, c) = (
        "https://example.test/a",
        "https://example.test/b",
        "https://example.test/c",
    );

    let nav = common::spawn({
        let page = page.clone();
        async move { page.goto("https://example.test/a", None).await }
    });
    let goto = driver.expect_request("frame@1", "goto").await;

    started(&mut driver, "D1", a).await;
    request(&mut driver, "request@1", a, None).await;
    response(&mut driver, "response@1", "request@1", a, 302).await;
    request(&mut driver, "request@2", b, Some("request@1")).await;
    response(&mut driver, "response@2", "request@2", b, 302).await;
    request(&mut driver, "request@3", c, Some("request@2")).await;
    response(&mut driver, "response@3", "request@3", c, 200).await;
    committed(&mut driver, "D1", c, "request@1").await;
    load_state(&mut driver, "load").await;
    driver
        .respond(&goto["id"], json!({ "newDocumentId": "D1" }))
        .await;

    let response = nav.await.unwrap().unwrap().expect("navigation response");
    assert_eq!(response.guid(), "response@3");
    assert_eq!(response.url(), c);
    assert_eq!(response.status(), 200);

    let chain: Vec<String> = response
        .request()
        .unwrap()
        .redirect_chain()
        .iter()
        .map(|r| r.url().to_string())
        .collect();
    assert_eq!(chain, vec![a, b, c]);
}

#[tokio::test]
async fn test_commit_wait_until_resolves_before_load() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;
    let url = "https://example.test/fast";

    let nav = common::spawn({
        let page = page.clone();
        async move {
            page.goto(
                "https://example.test/fast",
                Some(GotoOptions::new().wait_until(WaitUntil::Commit)),
            )
            .await
        }
    });
    let goto = driver.expect_request("frame@1", "goto").await;
    assert_eq!(goto["params"]["waitUntil"], "commit");

    started(&mut driver, "D1", url).await;
    request(&mut driver, "request@1", url, None).await;
    response(&mut driver, "response@1", "request@1", url, 200).await;
    committed(&mut driver, "D1", url, "request@1").await;
    driver
        .respond(&goto["id"], json!({ "newDocumentId": "D1" }))
        .await;

    let response = nav.await.unwrap().unwrap().expect("navigation response");
    assert_eq!(response.guid(), "response@1");
}

#[tokio::test]
async fn test_goto_error_wins_over_watcher() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;

    let nav = common::spawn({
        let page = page.clone();
        async move { page.goto("https://unreachable.test/", None).await }
    });
    let goto = driver.expect_request("frame@1", "goto").await;
    driver
        .fail(&goto["id"], "Error", "net::ERR_NAME_NOT_RESOLVED")
        .await;

    match nav.await.unwrap() {
        Err(Error::Remote { message, .. }) => assert!(message.contains("ERR_NAME_NOT_RESOLVED")),
        other => panic!("expected the goto error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_frame_detach_cancels_navigation() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;

    let nav = common::spawn({
        let page = page.clone();
        async move { page.goto("https://example.test/", None).await }
    });
    driver.expect_request("frame@1", "goto").await;
    driver
        .event("page@1", "frameDetached", json!({ "frame": { "guid": "frame@1" } }))
        .await;

    let err = nav.await.unwrap().unwrap_err();
    assert!(err.is_canceled());
    assert!(err.to_string().contains("detached"));
    assert!(page.main_frame().unwrap().is_detached());
}

#[tokio::test]
async fn test_disconnect_during_navigation() {
    common::init_tracing();
    let (connection, mut driver, page) = setup().await;

    let nav = common::spawn({
        let page = page.clone();
        async move { page.goto("https://example.test/", None).await }
    });
    driver.expect_request("frame@1", "goto").await;
    driver.close().await;

    let err = nav.await.unwrap().unwrap_err();
    assert!(err.is_disconnected(), "expected Disconnected, got {err}");
    let c = Arc::clone(&connection);
    common::wait_until(move || c.object_count() == 0).await;
    assert!(page.is_closed());
}

#[tokio::test]
async fn test_referer_conflict_with_extra_header() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;

    let set_headers = common::spawn({
        let page = page.clone();
        async move {
            let mut headers = HashMap::new();
            headers.insert("Referer".to_string(), "https://from.test/".to_string());
            page.set_extra_http_headers(headers).await
        }
    });
    let request = driver.expect_request("page@1", "setExtraHTTPHeaders").await;
    assert_eq!(
        request["params"]["headers"],
        json!([{ "name": "Referer", "value": "https://from.test/" }])
    );
    driver.respond(&request["id"], json!({})).await;
    set_headers.await.unwrap().unwrap();

    let err = page
        .goto(
            "https://example.test/",
            Some(GotoOptions::new().referer("https://other.test/")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains("\"referer\" is already specified")));

    // The same value is not a conflict
    let nav = common::spawn({
        let page = page.clone();
        async move {
            page.goto(
                "https://example.test/#same",
                Some(GotoOptions::new().referer("https://from.test/")),
            )
            .await
        }
    });
    let goto = driver.expect_request("frame@1", "goto").await;
    assert_eq!(goto["params"]["referer"], "https://from.test/");
    driver
        .event(
            "frame@1",
            "navigated",
            json!({ "url": "https://example.test/#same", "name": "" }),
        )
        .await;
    driver.respond(&goto["id"], json!({})).await;
    assert!(nav.await.unwrap().unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_url_is_rejected_before_sending() {
    common::init_tracing();
    let (_connection, _driver, page) = setup().await;

    let err = page.goto("not a url", None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_page_default_navigation_timeout_applies() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;
    page.set_default_timeout(Duration::from_secs(5));
    page.set_default_navigation_timeout(Duration::from_millis(40));

    let nav = common::spawn({
        let page = page.clone();
        async move { page.goto("https://example.test/", None).await }
    });
    let goto = driver.expect_request("frame@1", "goto").await;
    assert_eq!(goto["params"]["timeout"], 40);

    let err = nav.await.unwrap().unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_wait_for_navigation_filters_by_url() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;

    let waiting = common::spawn({
        let page = page.clone();
        async move {
            page.wait_for_navigation(Some(
                WaitForNavigationOptions::new()
                    .url(UrlMatcher::glob("**/done").unwrap())
                    .wait_until(WaitUntil::DomContentLoaded),
            ))
            .await
        }
    });
    tokio::task::yield_now().await;

    // A navigation to a URL the waiter does not care about
    started(&mut driver, "D1", "https://example.test/step").await;
    request(&mut driver, "request@1", "https://example.test/step", None).await;
    committed(&mut driver, "D1", "https://example.test/step", "request@1").await;
    load_state(&mut driver, "domcontentloaded").await;

    started(&mut driver, "D2", "https://example.test/done").await;
    request(&mut driver, "request@2", "https://example.test/done", None).await;
    response(&mut driver, "response@2", "request@2", "https://example.test/done", 200).await;
    committed(&mut driver, "D2", "https://example.test/done", "request@2").await;
    load_state(&mut driver, "domcontentloaded").await;

    let response = waiting.await.unwrap().unwrap().expect("navigation response");
    assert_eq!(response.guid(), "response@2");
}

#[tokio::test]
async fn test_same_document_change_before_load_keeps_response() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;
    let url = "https://example.test/app";

    let waiting = common::spawn({
        let page = page.clone();
        async move { page.wait_for_navigation(None).await }
    });
    tokio::task::yield_now().await;

    started(&mut driver, "D1", url).await;
    request(&mut driver, "request@1", url, None).await;
    response(&mut driver, "response@1", "request@1", url, 200).await;
    committed(&mut driver, "D1", url, "request@1").await;
    // The new page rewrites its URL with the History API before load
    driver
        .event(
            "frame@1",
            "navigated",
            json!({ "url": "https://example.test/app#x", "name": "" }),
        )
        .await;
    load_state(&mut driver, "load").await;

    let response = waiting.await.unwrap().unwrap().expect("navigation response");
    assert_eq!(response.guid(), "response@1");
    assert_eq!(page.url(), "https://example.test/app#x");
}

#[tokio::test]
async fn test_wait_for_load_state() {
    common::init_tracing();
    let (_connection, mut driver, page) = setup().await;

    // Already fired for the initial document
    page.wait_for_load_state(Some(LoadState::Load), None)
        .await
        .unwrap();

    let waiting = common::spawn({
        let page = page.clone();
        async move {
            page.wait_for_load_state(Some(LoadState::NetworkIdle), None)
                .await
        }
    });
    tokio::task::yield_now().await;
    load_state(&mut driver, "networkidle").await;
    waiting.await.unwrap().unwrap();

    let err = page
        .wait_for_load_state(
            Some(LoadState::DomContentLoaded),
            Some(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_child_frames_follow_attach_and_detach() {
    common::init_tracing();
    let (connection, mut driver, page) = setup().await;

    driver
        .create(
            "",
            "Frame",
            "frame@2",
            json!({ "url": "https://ads.test/", "name": "ad", "parentFrame": { "guid": "frame@1" }, "loadStates": [] }),
        )
        .await;
    driver
        .event("page@1", "frameAttached", json!({ "frame": { "guid": "frame@2" } }))
        .await;
    {
        let page = page.clone();
        common::wait_until(move || page.frames().len() == 2).await;
    }

    let main = page.main_frame().unwrap();
    let children = main.child_frames();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name(), "ad");
    assert_eq!(children[0].parent_frame().unwrap().guid(), "frame@1");
    assert_eq!(children[0].page().unwrap().guid(), "page@1");

    driver
        .event("page@1", "frameDetached", json!({ "frame": { "guid": "frame@2" } }))
        .await;
    {
        let page = page.clone();
        common::wait_until(move || page.frames().len() == 1).await;
    }
    let detached = downcast::<playwright_dispatch::Frame>(&connection.get_object("frame@2").unwrap())
        .unwrap();
    assert!(detached.is_detached());
    assert!(main.child_frames().is_empty());
}
