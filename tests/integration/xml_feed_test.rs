// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::integration::helpers::fake_browser::FakeSite;
use crate::integration::helpers::Harness;
use harvestrs::abstracts::xml_feed::{Feed, FeedPaths, XmlFeed};
use harvestrs::domain::models::list_node::ValueParser;
use harvestrs::domain::models::options::RunOptions;
use harvestrs::domain::models::source::Source;
use harvestrs::engines::traits::HttpRequest;
use harvestrs::utils::errors::ErrorKind;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rss(channels: usize, items: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?><rss version=\"2.0\">");
    for c in 0..channels {
        xml.push_str(&format!("<channel><title>Channel {}</title>", c));
        for i in 0..items {
            xml.push_str(&format!(
                "<item><title>10.0.{}.{}:8080</title><category>http</category></item>",
                c, i
            ));
        }
        xml.push_str("</channel>");
    }
    xml.push_str("</rss>");
    xml
}

async fn serve(server: &MockServer, route: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn feed(server: &MockServer, route: &str) -> Feed {
    Feed::new(
        HttpRequest::get(format!("{}{}", server.uri(), route)),
        FeedPaths::new("rss/channel", "item")
            .attribute("ip", "title/0")
            .attribute("protocol", "category/0")
            .attribute("country", "country/0"),
    )
    .with_parser("ip", ValueParser::pattern("^([0-9.]+):").unwrap())
}

#[tokio::test]
async fn test_failed_feed_does_not_stop_others() {
    let server = MockServer::start().await;
    serve(&server, "/good.xml", 200, rss(2, 3)).await;
    serve(&server, "/bad.xml", 500, String::new()).await;

    let harness = Harness::new(FakeSite::new());
    harness
        .orchestrator
        .add_source(Source::new(
            "feeds",
            XmlFeed::new(vec![feed(&server, "/bad.xml"), feed(&server, "/good.xml")]),
        ))
        .unwrap();

    let collected = harness.run(RunOptions::default()).await;

    assert_eq!(collected.ends, 1);
    assert_eq!(
        collected.messages(),
        vec![format!(
            "[feeds] HTTP 500 ({}/bad.xml): Internal Server Error",
            server.uri()
        )]
    );
    assert_eq!(collected.errors[0].kind, ErrorKind::Request);
    assert_eq!(collected.batches.len(), 2);
    assert_eq!(collected.records().len(), 6);

    let first = collected.records()[0];
    assert_eq!(first["ip"], json!("10.0.0.0"));
    assert_eq!(first["protocol"], json!("http"));
    assert_eq!(first["source"], json!("feeds"));
    assert!(first.get("country").is_none());
    assert_eq!(harness.launcher.launches(), 0);
}

#[tokio::test]
async fn test_sample_mode_limits_feeds_groups_and_items() {
    let server = MockServer::start().await;
    serve(&server, "/big.xml", 200, rss(7, 12)).await;
    serve(&server, "/other.xml", 200, rss(1, 1)).await;

    let harness = Harness::new(FakeSite::new());
    harness
        .orchestrator
        .add_source(Source::new(
            "feeds",
            XmlFeed::new(vec![feed(&server, "/big.xml"), feed(&server, "/other.xml")]),
        ))
        .unwrap();

    let collected = harness.run(RunOptions::default().sample(true)).await;

    assert!(collected.errors.is_empty(), "{:?}", collected.messages());
    assert_eq!(collected.batches.len(), 5);
    assert!(collected.batches.iter().all(|batch| batch.len() == 10));
}

#[tokio::test]
async fn test_malformed_feed_is_a_parse_error() {
    let server = MockServer::start().await;
    serve(&server, "/broken.xml", 200, "<rss><channel></rss>".to_string()).await;

    let harness = Harness::new(FakeSite::new());
    harness
        .orchestrator
        .add_source(Source::new("feeds", XmlFeed::new(vec![feed(&server, "/broken.xml")])))
        .unwrap();

    let collected = harness.run(RunOptions::default().series(true)).await;

    assert_eq!(collected.errors.len(), 1);
    assert_eq!(collected.errors[0].kind, ErrorKind::Parse);
    assert!(collected.errors[0].message.starts_with("[feeds] "));
    assert!(collected.batches.is_empty());
    assert_eq!(collected.ends, 1);
}
