// Integration tests for ApiClient against a mock REIMS backend.

use std::net::TcpListener;
use std::time::Duration;

use futures::future::BoxFuture;

use reims_query::api::ApiClient;
use reims_query::api::keys;
use reims_query::api::models::{AlertSeverity, ChatRequest, DocumentStatus, DocumentStatusReport, DocumentUpload};
use reims_query::query::{QueryClient, QueryConfig, QueryError, QueryOptions};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_get_kpis_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/kpis"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_properties": 4,
            "total_value": 48_500_000.0,
            "occupancy_rate": 0.91,
            "noi": 3_100_000.0,
            "dscr": 1.45
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&server.uri()).expect("client").with_token("secret");
    let kpis = api.kpis().await.expect("kpis");

    assert_eq!(kpis.total_properties, 4);
    assert_eq!(kpis.dscr, Some(1.45));
}

#[tokio::test]
async fn test_market_analysis_sends_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/market-analysis"))
        .and(query_param("location", "Austin, TX"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "location": "Austin, TX",
            "market_data": { "cap_rate": "5.2%", "median_price": 525000 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&server.uri()).expect("client");
    let analysis = api.market_analysis("Austin, TX").await.expect("analysis");
    let snapshot = analysis.snapshot().expect("snapshot");

    assert_eq!(snapshot.cap_rate, Some(5.2));
    assert_eq!(snapshot.median_price, Some(525_000.0));
}

#[tokio::test]
async fn test_acknowledge_alert_posts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/alerts/12/acknowledge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12,
            "severity": "critical",
            "message": "DSCR below covenant",
            "acknowledged": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&server.uri()).expect("client");
    let alert = api.acknowledge_alert_mutation().run(12).await.expect("acknowledge");

    assert!(alert.acknowledged);
    assert_eq!(alert.severity, AlertSeverity::Critical);
}

#[tokio::test]
async fn test_chat_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ai/chat"))
        .and(body_json(json!({ "message": "Which property has the lowest DSCR?", "property_id": 3 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Maple Court at 1.12",
            "sources": ["t12_2024.pdf"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&server.uri()).expect("client");
    let reply = api
        .chat(&ChatRequest::new("Which property has the lowest DSCR?").about(3))
        .await
        .expect("chat");

    assert_eq!(reply.response, "Maple Court at 1.12");
    assert_eq!(reply.sources, vec!["t12_2024.pdf".to_string()]);
}

#[tokio::test]
async fn test_upload_document_is_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/documents"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("filename=\"rent_roll.pdf\""))
        .and(body_string_contains("name=\"property_id\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 31,
            "filename": "rent_roll.pdf",
            "status": "pending",
            "property_id": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&server.uri()).expect("client");
    let upload = DocumentUpload::new("rent_roll.pdf", b"%PDF-1.7".to_vec()).for_property(2);
    let document = api.upload_document_mutation().run(upload).await.expect("upload");

    assert_eq!(document.id, 31);
    assert_eq!(document.status, DocumentStatus::Pending);
    assert_eq!(document.financials(), Ok(None));
}

#[tokio::test]
async fn test_error_categories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/properties/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Property not found" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/documents/1/status"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let api = ApiClient::new(&server.uri()).expect("client");

    let err = api.property(404).await.expect_err("application error");
    assert!(err.is_application());
    assert_eq!(
        err,
        QueryError::Application {
            status: 404,
            message: "Property not found".to_string(),
        }
    );

    let err = api.document_status(1).await.expect_err("http error");
    assert!(err.is_network());
    assert_eq!(err.status(), Some(503));

    let err = api.alerts().await.expect_err("decode error");
    assert!(matches!(err, QueryError::Decode(_)));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_network_error() {
    // nothing listens on a port we bound and released
    let addr = TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("free port");

    let api = ApiClient::new(&format!("http://{addr}")).expect("client");
    let err = api.documents().await.expect_err("network error");

    assert!(matches!(err, QueryError::NetworkError(_)));
}

#[tokio::test]
async fn test_query_client_deduplicates_backend_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/5/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": 5, "status": "processing", "progress": 0.4 }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(&server.uri()).expect("client");
    let client = QueryClient::with_config(QueryConfig::new(Duration::from_secs(30), Duration::from_secs(300)));
    let key = keys::document_status(5);
    let options = QueryOptions::default();

    let fetch = || {
        let api = api.clone();
        move || -> BoxFuture<'static, Result<DocumentStatusReport, QueryError>> {
            let api = api.clone();
            Box::pin(async move { api.document_status(5).await })
        }
    };

    let (a, b) = tokio::join!(
        client.fetch_query(&key, fetch(), &options),
        client.fetch_query(&key, fetch(), &options),
    );
    let cached = client.fetch_query(&key, fetch(), &options).await.expect("cached");

    assert_eq!(a.expect("first").status, DocumentStatus::Processing);
    assert_eq!(b.expect("second").progress, Some(0.4));
    assert_eq!(cached.id, 5);
}
