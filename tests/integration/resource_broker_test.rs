// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::integration::helpers::broker;
use crate::integration::helpers::fake_browser::{FakeLauncher, FakeSite};
use futures::future::join_all;
use harvestrs::engines::request_queue::RequestQueueOptions;
use harvestrs::engines::resource_broker::PageScope;
use harvestrs::engines::traits::{EngineError, HttpRequest, PageProvider, Requester};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test(start_paused = true)]
async fn test_browser_launch_is_single_flight() {
    let launcher = Arc::new(FakeLauncher::new(FakeSite::new()).with_delay(Duration::from_millis(200)));
    let broker = broker(launcher.clone());
    assert!(!broker.is_browser_launched());

    let pages = join_all((0..5).map(|_| broker.new_page())).await;

    assert!(pages.iter().all(|page| page.is_ok()));
    assert_eq!(launcher.launches(), 1);
    assert!(broker.is_browser_launched());
    assert_eq!(launcher.browser().unwrap().pages().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_reaches_every_caller() {
    let launcher = Arc::new(FakeLauncher::failing().with_delay(Duration::from_millis(50)));
    let broker = broker(launcher.clone());

    let results = join_all((0..3).map(|_| broker.new_page())).await;

    for result in results {
        assert!(matches!(result, Err(EngineError::LaunchFailed(_))));
    }
    assert!(matches!(broker.new_page().await, Err(EngineError::LaunchFailed(_))));
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn test_close_without_browser_is_safe_and_idempotent() {
    let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
    let broker = broker(launcher.clone());

    broker.close().await.unwrap();
    broker.close().await.unwrap();

    assert!(broker.is_closed());
    assert_eq!(launcher.launches(), 0);
    assert!(matches!(broker.new_page().await, Err(EngineError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn test_close_waits_for_inflight_launch() {
    let launcher = Arc::new(FakeLauncher::new(FakeSite::new()).with_delay(Duration::from_millis(300)));
    let broker = broker(launcher.clone());

    let opening = {
        let broker = broker.clone();
        tokio::spawn(async move { broker.new_page().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    broker.close().await.unwrap();

    // The launch completes; the page may or may not open before the browser closes
    let opened = opening.await.unwrap();
    assert!(opened.is_ok() || matches!(opened, Err(EngineError::Closed)));
    assert_eq!(launcher.launches(), 1);
    assert!(launcher.browser().unwrap().is_closed());
    assert!(matches!(broker.new_page().await, Err(EngineError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn test_page_scope_closes_only_its_pages() {
    let launcher = Arc::new(FakeLauncher::new(FakeSite::new()));
    let broker = broker(launcher.clone());

    let scope = PageScope::new(broker.clone());
    scope.new_page().await.unwrap();
    scope.new_page().await.unwrap();
    broker.new_page().await.unwrap();
    assert_eq!(scope.open_pages(), 2);

    scope.close_all().await;

    let pages = launcher.browser().unwrap().pages();
    assert!(pages[0].is_closed());
    assert!(pages[1].is_closed());
    assert!(!pages[2].is_closed());
    assert_eq!(scope.open_pages(), 0);
}

#[tokio::test]
async fn test_close_cancels_queued_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let broker = broker(Arc::new(FakeLauncher::new(FakeSite::new())));
    let channel = broker.request_channel(Some(RequestQueueOptions {
        concurrency: 1,
        delay: 0,
    }));

    let requests: Vec<_> = (0..3)
        .map(|_| {
            let channel = channel.clone();
            let url = server.uri();
            tokio::spawn(async move { channel.request(HttpRequest::get(url)).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    broker.close().await.unwrap();

    for request in requests {
        let result = tokio::time::timeout(Duration::from_secs(5), request)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(EngineError::Closed)));
    }
    assert!(matches!(
        broker.request(HttpRequest::get(server.uri())).await,
        Err(EngineError::Closed)
    ));
}
