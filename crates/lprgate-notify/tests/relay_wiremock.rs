//! Integration tests for the relay client using wiremock

use lprgate_notify::{NotifyError, RelayConfig, RelayNotifier};
use std::io::Write;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

async fn connected_relay() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "connected"})),
        )
        .mount(&mock_server)
        .await;
    mock_server
}

fn notifier_for(server: &MockServer) -> RelayNotifier {
    RelayNotifier::new(RelayConfig::new(
        format!("{}/api/send", server.uri()),
        "5511999990000,Portaria",
    ))
    .unwrap()
}

fn capture_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    file.write_all(b"JFIF capture bytes").unwrap();
    file
}

#[tokio::test]
async fn test_send_success() {
    let mock_server = connected_relay().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .and(body_string_contains("5511999990000,Portaria"))
        .and(body_string_contains("Nova entrada"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = notifier_for(&mock_server);
    notifier
        .send("Nova entrada: Veículo *ABC1234*", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_attaches_image() {
    let mock_server = connected_relay().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("image/jpeg"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let image = capture_file();
    let notifier = notifier_for(&mock_server);
    notifier.send("hello", Some(image.path())).await.unwrap();
}

#[tokio::test]
async fn test_send_refused_when_not_connected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "qr"})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let notifier = notifier_for(&mock_server);
    match notifier.send("hello", None).await {
        Err(NotifyError::NotConnected { url }) => assert_eq!(url, mock_server.uri()),
        other => panic!("expected NotConnected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_status_error_means_not_connected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    assert!(!notifier_for(&mock_server).is_connected().await);
}

#[tokio::test]
async fn test_relay_error_carries_status_and_body() {
    let mock_server = connected_relay().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "status": "error",
            "erro": "Destinatários inválidos",
            "erros": ["Portaria"]
        })))
        .mount(&mock_server)
        .await;

    match notifier_for(&mock_server).send("hello", None).await {
        Err(NotifyError::Relay { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("Destinatários inválidos"));
        }
        other => panic!("expected Relay error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_body_preview_is_truncated() {
    let mock_server = connected_relay().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(2000)))
        .mount(&mock_server)
        .await;

    match notifier_for(&mock_server).send("hello", None).await {
        Err(NotifyError::Relay { body, .. }) => assert_eq!(body.len(), 500),
        other => panic!("expected Relay error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ok_without_success_status_is_rejected() {
    let mock_server = connected_relay().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "queued"})),
        )
        .mount(&mock_server)
        .await;

    assert!(matches!(
        notifier_for(&mock_server).send("hello", None).await,
        Err(NotifyError::Rejected)
    ));
}

#[tokio::test]
async fn test_timeout_with_image_retries_without_it() {
    let mock_server = connected_relay().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .and(body_string_contains("name=\"file\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "success"}))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = RelayNotifier::new(
        RelayConfig::new(format!("{}/api/send", mock_server.uri()), "Portaria")
            .with_send_timeout(Duration::from_millis(300)),
    )
    .unwrap();

    let image = capture_file();
    notifier.send("hello", Some(image.path())).await.unwrap();
}

#[tokio::test]
async fn test_missing_image_file_sends_text_only() {
    let mock_server = connected_relay().await;
    Mock::given(method("POST"))
        .and(path("/api/send"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = notifier_for(&mock_server);
    notifier
        .send("hello", Some(std::path::Path::new("/nonexistent/capture.jpg")))
        .await
        .unwrap();
}
