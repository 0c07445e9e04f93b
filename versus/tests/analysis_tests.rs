//! End-to-end analysis sessions against mocked providers

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;
use versus::ai::{AIError, ProgressLog, ProgressPhase, ProviderAdapter};
use versus::prelude::*;
use versus::{Attachment, PropertyDefinition, SessionState};

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(path).unwrap()
}

fn headphones() -> Comparison {
    let mut comparison = Comparison::new("Headphones");
    comparison.add_property(PropertyDefinition::new("Price", PropertyType::Number));
    comparison.add_property(PropertyDefinition::new("Rating", PropertyType::Rating));
    comparison
}

fn described(comparison: &Comparison) -> Contender {
    let mut contender = Contender::new(comparison.id, "Model X");
    contender.description = Some("Price: $10, Rating: 4".to_string());
    contender
}

fn anthropic_registry(relay_url: &str) -> ProviderRegistry {
    let mut registry = ProviderRegistry::in_memory(relay_url);
    registry
        .upsert_provider(ProviderConfig::new(ProviderKind::Anthropic).with_credential("sk-ant-test"))
        .unwrap();
    registry
        .set_active_provider(Some(ProviderKind::Anthropic))
        .unwrap();
    registry
}

async fn mock_connection_ok(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/api/ai/proxy")
        .match_body(Matcher::PartialJson(json!({"maxTokens": 10})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"content":[{"type":"text","text":"OK"}]}"#)
        .create_async()
        .await
}

async fn mock_analysis(server: &mut ServerGuard, body: String) -> Mock {
    server
        .mock("POST", "/api/ai/proxy")
        .match_body(Matcher::PartialJson(json!({
            "provider": "anthropic",
            "apiKey": "sk-ant-test",
            "maxTokens": 4096
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

#[tokio::test]
async fn test_extract_merges_flags_and_persists() {
    let mut server = mockito::Server::new_async().await;
    let connection = mock_connection_ok(&mut server).await;
    let analysis = mock_analysis(&mut server, fixture("anthropic_message.json")).await;

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let registry = anthropic_registry(&server.url());
    let progress = ProgressLog::new();

    let mut session = AnalysisSession::new(described(&comparison));
    let outcome = session
        .run(
            AnalysisKind::ExtractProperties,
            &comparison,
            &registry,
            &store,
            &progress,
        )
        .await
        .unwrap();

    connection.assert_async().await;
    analysis.assert_async().await;

    match outcome {
        AnalysisOutcome::Merged(report) => {
            assert_eq!(report.matched, 2);
            assert_eq!(report.changed, vec!["price".to_string(), "rating".to_string()]);
        }
        other => panic!("expected a merge, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Merged);
    assert!(session.is_changed("price"));
    assert!(session.is_changed("rating"));
    assert_eq!(
        progress.phases(),
        vec![
            ProgressPhase::Preparing,
            ProgressPhase::Contacting,
            ProgressPhase::Processing,
            ProgressPhase::Done,
        ]
    );

    let saved = store.contender(session.contender().id).unwrap().unwrap();
    assert_eq!(saved.properties.get("price"), Some(&PropertyValue::Number(10.0)));
    assert_eq!(saved.properties.get("rating"), Some(&PropertyValue::Rating(4)));
}

#[tokio::test]
async fn test_malformed_response_leaves_properties_untouched() {
    let mut server = mockito::Server::new_async().await;
    mock_connection_ok(&mut server).await;
    mock_analysis(
        &mut server,
        json!({"content": [{"type": "text", "text": "I could not find any details."}]}).to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let registry = anthropic_registry(&server.url());

    let mut contender = described(&comparison);
    contender
        .properties
        .insert("price".to_string(), PropertyValue::Number(99.0));
    let before = contender.properties.clone();

    let mut session = AnalysisSession::new(contender);
    let err = session
        .run(
            AnalysisKind::ExtractProperties,
            &comparison,
            &registry,
            &store,
            &NoProgress,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::NothingExtracted));
    assert_eq!(err.to_string(), "No property values could be extracted");
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.contender().properties, before);
    assert!(!session.can_undo());
    assert!(store.contenders().unwrap().is_empty());
}

#[tokio::test]
async fn test_disabled_provider_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let proxy = server
        .mock("POST", "/api/ai/proxy")
        .expect(0)
        .create_async()
        .await;

    let mut registry = ProviderRegistry::in_memory(server.url());
    let mut config = ProviderConfig::new(ProviderKind::OpenAi).with_credential("sk-test");
    config.enabled = false;
    registry.upsert_provider(config).unwrap();
    registry.set_active_provider(Some(ProviderKind::OpenAi)).unwrap();

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let mut session = AnalysisSession::new(described(&comparison));

    let err = session
        .run(
            AnalysisKind::ExtractProperties,
            &comparison,
            &registry,
            &store,
            &NoProgress,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ProviderUnavailable));
    proxy.assert_async().await;
}

#[tokio::test]
async fn test_failed_connection_check_stops_analysis() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/ai/proxy")
        .match_body(Matcher::PartialJson(json!({"maxTokens": 10})))
        .with_status(401)
        .with_body(r#"{"error":"invalid x-api-key"}"#)
        .create_async()
        .await;
    let analysis = server
        .mock("POST", "/api/ai/proxy")
        .match_body(Matcher::PartialJson(json!({"maxTokens": 4096})))
        .expect(0)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let registry = anthropic_registry(&server.url());
    let mut session = AnalysisSession::new(described(&comparison));

    let err = session
        .run(
            AnalysisKind::ExtractProperties,
            &comparison,
            &registry,
            &store,
            &NoProgress,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ConnectionFailed(ref m) if m.contains("API key")));
    analysis.assert_async().await;
}

#[tokio::test]
async fn test_double_undo_restores_snapshot_once() {
    let mut server = mockito::Server::new_async().await;
    mock_connection_ok(&mut server).await;
    mock_analysis(&mut server, fixture("anthropic_message.json")).await;

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let registry = anthropic_registry(&server.url());

    let mut contender = described(&comparison);
    contender
        .properties
        .insert("price".to_string(), PropertyValue::Number(12.5));
    let before = contender.properties.clone();

    let mut session = AnalysisSession::new(contender);
    session
        .run(
            AnalysisKind::ExtractProperties,
            &comparison,
            &registry,
            &store,
            &NoProgress,
        )
        .await
        .unwrap();

    assert!(session.undo_all());
    assert!(!session.undo_all());
    assert_eq!(session.contender().properties, before);

    store.save_contender(session.contender()).unwrap();
    let saved = store.contender(session.contender().id).unwrap().unwrap();
    assert_eq!(saved.properties, before);
}

#[tokio::test]
async fn test_suggest_values_through_openai() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/ai/proxy")
        .match_body(Matcher::PartialJson(json!({"provider": "openai", "maxTokens": 10})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"content":"OK"}}]}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/api/ai/proxy")
        .match_body(Matcher::PartialJson(json!({"provider": "openai", "maxTokens": 4096})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixture("openai_completion.json"))
        .create_async()
        .await;

    let mut registry = ProviderRegistry::in_memory(server.url());
    registry
        .upsert_provider(ProviderConfig::new(ProviderKind::OpenAi).with_credential("sk-test"))
        .unwrap();
    registry.set_active_provider(Some(ProviderKind::OpenAi)).unwrap();

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let mut session = AnalysisSession::new(described(&comparison));

    let outcome = session
        .run(
            AnalysisKind::SuggestValues,
            &comparison,
            &registry,
            &store,
            &NoProgress,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, AnalysisOutcome::Merged(ref r) if r.changed == vec!["price".to_string()]));
    assert_eq!(
        session.contender().properties.get("price"),
        Some(&PropertyValue::Number(12.0))
    );
}

#[tokio::test]
async fn test_image_on_text_only_local_model_is_rejected_without_request() {
    let mut server = mockito::Server::new_async().await;
    let generate = server
        .mock("POST", "/api/generate")
        .expect(0)
        .create_async()
        .await;

    let config = ProviderConfig::new(ProviderKind::Ollama)
        .with_endpoint(server.url())
        .with_model("llama3.1:8b");
    let adapter = ProviderAdapter::from_config(&config, "http://127.0.0.1:9").unwrap();

    let request = versus::ai::AnalysisRequest::new(
        AnalysisKind::AnalyzeAttachment,
        versus::ai::AnalysisContent::Binary(Attachment {
            media_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
            file_name: Some("photo.png".to_string()),
        }),
    );

    let err = adapter.analyze(&request).await.unwrap_err();
    match err {
        AIError::UnsupportedAttachment {
            model,
            capable_models,
            ..
        } => {
            assert_eq!(model, "llama3.1:8b");
            assert!(capable_models.iter().any(|m| m == "llava"));
        }
        other => panic!("expected capability error, got {:?}", other),
    }
    generate.assert_async().await;
}

#[tokio::test]
async fn test_cancelled_session_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let proxy = server
        .mock("POST", "/api/ai/proxy")
        .expect(0)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let registry = anthropic_registry(&server.url());
    let mut session = AnalysisSession::new(described(&comparison));

    let handle = session.arm_abort();
    handle.abort();

    let err = session
        .run(
            AnalysisKind::ExtractProperties,
            &comparison,
            &registry,
            &store,
            &NoProgress,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Cancelled));
    assert_eq!(session.state(), SessionState::Idle);
    proxy.assert_async().await;
}

#[tokio::test]
async fn test_summary_returns_text_without_touching_properties() {
    let mut server = mockito::Server::new_async().await;
    mock_connection_ok(&mut server).await;
    mock_analysis(
        &mut server,
        json!({"content": [{"type": "text", "text": "Affordable and well reviewed."}]}).to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = Comparison::new("Headphones");
    let registry = anthropic_registry(&server.url());

    let mut session = AnalysisSession::new(described(&comparison));
    let outcome = session
        .run(
            AnalysisKind::GenerateSummary,
            &comparison,
            &registry,
            &store,
            &NoProgress,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        AnalysisOutcome::Text("Affordable and well reviewed.".to_string())
    );
    assert!(session.contender().properties.is_empty());
    assert!(!session.can_undo());
    assert!(store.contenders().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_json_reply_is_a_provider_error_not_an_extraction_failure() {
    let mut server = mockito::Server::new_async().await;
    mock_connection_ok(&mut server).await;
    mock_analysis(&mut server, "<html><body>502 Bad Gateway</body></html>".to_string()).await;

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let registry = anthropic_registry(&server.url());

    for kind in [AnalysisKind::GenerateSummary, AnalysisKind::ExtractProperties] {
        let mut session = AnalysisSession::new(described(&comparison));
        let err = session
            .run(kind, &comparison, &registry, &store, &NoProgress)
            .await
            .unwrap_err();

        assert!(
            matches!(err, SessionError::Provider(AIError::InvalidResponse(_))),
            "{}: got {:?}",
            kind,
            err
        );
        assert_eq!(session.state(), SessionState::Failed);
    }
}

#[tokio::test]
async fn test_abort_while_request_in_flight_returns_to_idle() {
    // accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path()).unwrap();
    let comparison = headphones();
    let registry = anthropic_registry(&format!("http://{}", addr));
    let mut session = AnalysisSession::new(described(&comparison));

    let handle = session.arm_abort();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        handle.abort();
    });

    let err = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        session.run(
            AnalysisKind::ExtractProperties,
            &comparison,
            &registry,
            &store,
            &NoProgress,
        ),
    )
    .await
    .expect("abort did not interrupt the pending request")
    .unwrap_err();

    assert!(matches!(err, SessionError::Cancelled));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.contender().properties.is_empty());
    assert!(store.contenders().unwrap().is_empty());
}
