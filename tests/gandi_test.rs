//! Gandi LiveDNS backend against a mocked HTTP API.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zonecrab::config::{DNSServerConfig, DNSServerType, Readiness};
use zonecrab::dns::{DNSServer, Gandi};
use zonecrab::error::Error;

const RECORD_PATH: &str = "/domains/example.com/records/_acme-challenge.www/TXT";
const RECORD: &str = "_acme-challenge.www.example.com.";

async fn connected(server: &MockServer) -> Gandi {
    Mock::given(method("GET"))
        .and(path("/domains"))
        .and(header("authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "fqdn": "example.com", "automatic_snapshots": true }
        ])))
        .mount(server)
        .await;

    let mut config = DNSServerConfig::new("gandi-test", DNSServerType::Gandi, server.uri(), "token");
    config.readiness = Readiness {
        attempts: 2,
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    };
    Gandi::connect(config).await.unwrap()
}

#[tokio::test]
async fn test_zones_from_domains() {
    let server = MockServer::start().await;
    let gandi = connected(&server).await;

    let zones = gandi.list_zones().await.unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].name, "example.com.");
    assert_eq!(zones[0].id, "example.com");
    assert!(gandi.is_authoritative_for_domain("www.example.com").await);
}

#[tokio::test]
async fn test_add_then_clean_twice() {
    let server = MockServer::start().await;
    let gandi = connected(&server).await;

    Mock::given(method("PUT"))
        .and(path(RECORD_PATH))
        .and(body_json(json!({ "rrset_ttl": 300, "rrset_values": ["\"value\""] })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    gandi
        .add_txt_record("www.example.com", RECORD, "\"value\"")
        .await
        .unwrap();
    gandi
        .clean_txt_record("www.example.com", RECORD)
        .await
        .unwrap();
    gandi
        .clean_txt_record("www.example.com", RECORD)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_write_rejected() {
    let server = MockServer::start().await;
    let gandi = connected(&server).await;

    Mock::given(method("PUT"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    assert!(matches!(
        gandi.add_txt_record("www.example.com", RECORD, "\"value\"").await,
        Err(Error::BackendWriteFailed { operation: "add", .. })
    ));
}

#[tokio::test]
async fn test_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/domains"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = DNSServerConfig::new("gandi-test", DNSServerType::Gandi, server.uri(), "bad");
    config.readiness = Readiness {
        attempts: 3,
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    };
    assert!(matches!(
        Gandi::connect(config).await,
        Err(Error::BackendUnreachable { attempts: 3, .. })
    ));
}
