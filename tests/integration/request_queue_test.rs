// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::integration::helpers::http_client;
use async_trait::async_trait;
use futures::future::join_all;
use harvestrs::engines::request_queue::{RequestQueue, RequestQueueOptions};
use harvestrs::engines::traits::{EngineError, HttpClient, HttpRequest, HttpResponse, Requester};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 记录并发数与开始时间的慢速客户端
#[derive(Default)]
struct SlowClient {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

#[async_trait]
impl HttpClient for SlowClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, EngineError> {
        self.started.lock().push(Instant::now());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(HttpResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body: request.url,
        })
    }
}

fn queue(client: Arc<SlowClient>, concurrency: usize, delay: u64) -> Arc<RequestQueue> {
    Arc::new(RequestQueue::new(client, RequestQueueOptions { concurrency, delay }))
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit() {
    let client = Arc::new(SlowClient::default());
    let queue = queue(client.clone(), 2, 0);

    let responses = join_all((0..6).map(|i| queue.request(HttpRequest::get(format!("https://q.test/{}", i))))).await;

    assert!(responses.iter().all(|r| r.is_ok()));
    assert_eq!(responses[5].as_ref().unwrap().body, "https://q.test/5");
    assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(queue.active_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_delay_holds_slot_after_response() {
    let client = Arc::new(SlowClient::default());
    let queue = queue(client.clone(), 1, 500);

    join_all((0..3).map(|_| queue.request(HttpRequest::get("https://q.test/")))).await;

    let started = client.started.lock().clone();
    assert_eq!(started.len(), 3);
    for pair in started.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(600));
    }
}

#[tokio::test(start_paused = true)]
async fn test_closed_queue_rejects_requests() {
    let client = Arc::new(SlowClient::default());
    let queue = queue(client.clone(), 1, 0);

    let pending = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.request(HttpRequest::get("https://q.test/slow")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.close();

    assert!(queue.is_closed());
    assert!(matches!(pending.await.unwrap(), Err(EngineError::Closed)));
    assert!(matches!(
        queue.request(HttpRequest::get("https://q.test/")).await,
        Err(EngineError::Closed)
    ));
}

#[tokio::test]
async fn test_requests_reach_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss/>"))
        .expect(3)
        .mount(&server)
        .await;

    let queue = RequestQueue::new(http_client(), RequestQueueOptions::default());
    let url = format!("{}/feed.xml", server.uri());
    let responses = join_all((0..3).map(|_| queue.request(HttpRequest::get(url.clone())))).await;

    for response in responses {
        assert_eq!(response.unwrap().body, "<rss/>");
    }
}
