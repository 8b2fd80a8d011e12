//! Integration tests for ReqwestTransport using wiremock.

use std::sync::Arc;

use courier_core::{
    Body, MultipartForm, Request, ResponseKind, Transport,
};
use courier_reqwest::ReqwestTransport;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> ReqwestTransport {
    ReqwestTransport::new(reqwest::Client::new())
}

#[tokio::test]
async fn get_decodes_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 0,
            "items": ["a", "b"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::get(format!("{}/data", server.uri())).param("page", 2);
    let response = transport().send(request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.business_code(), Some(0));
    let json = response.body.as_json().unwrap();
    assert_eq!(json["items"][1], "b");
}

#[tokio::test]
async fn error_statuses_still_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secure"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({"code": 401})),
        )
        .mount(&server)
        .await;

    let request = Request::get(format!("{}/secure", server.uri()));
    let response = transport().send(request).await.unwrap();

    // The pipeline interprets codes; the adapter only carries them.
    assert_eq!(response.status, 401);
    assert_eq!(response.business_code(), Some(401));
}

#[tokio::test]
async fn multipart_form_reaches_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_string_contains("chunkIndex"))
        .and(body_string_contains("fileMd5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let form = MultipartForm::new()
        .blob("file", bytes::Bytes::from_static(b"chunk-data"), Some("f.bin".into()))
        .text("chunkIndex", "0")
        .text("totalChunks", "1")
        .text("fileMd5", "00112233445566778899aabbccddeeff");
    let request = Request::post(format!("{}/upload", server.uri())).body(Body::Form(form));
    let response = transport().send(request).await.unwrap();
    assert_eq!(response.business_code(), Some(0));
}

#[tokio::test]
async fn response_kind_selects_decoding() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2, 3]))
        .mount(&server)
        .await;

    let request =
        Request::get(format!("{}/blob", server.uri())).response_kind(ResponseKind::Bytes);
    let response = transport().send(request).await.unwrap();
    assert_eq!(response.body.as_bytes().unwrap().as_ref(), &[0, 1, 2, 3]);
}

#[tokio::test]
async fn courier_caches_over_the_reqwest_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0})))
        .expect(1) // the second call must come from the cache
        .mount(&server)
        .await;

    let client = courier::Courier::new(
        Arc::new(transport()),
        courier::CourierConfig::builder()
            .cache_ttl(std::time::Duration::from_secs(60))
            .build(),
    );
    let url = format!("{}/cached", server.uri());

    let first = client
        .get(&url, courier::CallOptions::default())
        .await
        .unwrap();
    let second = client
        .get(&url, courier::CallOptions::default())
        .await
        .unwrap();
    assert!(!first.is_from_cache());
    assert!(second.is_from_cache());
    assert_eq!(first.body, second.body);
}

#[tokio::test]
async fn upload_progress_reports_settled_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/bin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0})))
        .mount(&server)
        .await;

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let request = Request::put(format!("{}/bin", server.uri()))
        .body(bytes::Bytes::from_static(b"0123456789"))
        .upload_progress(Arc::new(move |sent, total| {
            sink.lock().unwrap().push((sent, total));
        }));
    transport().send(request).await.unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), &[(10, 10)]);
}
