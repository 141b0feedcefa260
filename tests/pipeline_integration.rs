//! End-to-end pipeline tests: in-memory channel, file-backed libSQL store,
//! and a mocked HTTP backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;

use receipt_agent::channels::{
    InMemoryAdapter, ListenerConfig, MessageListener, RawAttachment, RawMessage, SharedAdapter,
};
use receipt_agent::pipeline::orchestrator::FALLBACK_REPLY;
use receipt_agent::pipeline::{BatchSummary, Orchestrator, OrchestratorConfig};
use receipt_agent::processor::BackendClient;
use receipt_agent::store::{LibSqlStore, TransactionStore};

const COUNTERPARTY: &str = "(555) 123-4567";

struct Agent {
    orchestrator: Orchestrator,
    adapter: Arc<InMemoryAdapter>,
    store: Arc<LibSqlStore>,
}

async fn agent(backend_url: String, store: Arc<LibSqlStore>) -> Agent {
    let adapter = Arc::new(InMemoryAdapter::new());
    let shared = SharedAdapter::new(adapter.clone());

    let mut listener = MessageListener::new(
        shared.clone(),
        ListenerConfig {
            monitored_address: Some(COUNTERPARTY.to_string()),
            ..Default::default()
        },
    )
    .with_start_time(Utc::now() - chrono::Duration::minutes(5));
    listener.load_processed_ids(store.get_processed_message_ids().await.unwrap());

    let backend = Arc::new(BackendClient::new(backend_url, None));
    let orchestrator = Orchestrator::new(
        listener,
        store.clone(),
        backend.clone(),
        backend,
        shared,
        OrchestratorConfig {
            chat_user_id: "tester".into(),
            poll_interval: Duration::from_millis(10),
        },
    );

    Agent {
        orchestrator,
        adapter,
        store,
    }
}

fn text_from(guid: &str, sender: &str, text: &str) -> RawMessage {
    RawMessage {
        guid: Some(guid.into()),
        sender: Some(sender.into()),
        text: Some(text.into()),
        date: Utc::now(),
        ..Default::default()
    }
}

#[tokio::test]
async fn receipt_and_chat_flow_end_to_end() {
    let backend = MockServer::start_async().await;
    let extract = backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/receipts/extract");
            then.status(200).json_body(json!({
                "receipt": {
                    "merchant": {"name": "Trader Joe's", "category": null},
                    "transaction": {"total": 12.5, "paymentMethod": null},
                    "items": [{"description": "Milk", "price": 3.5}]
                }
            }));
        })
        .await;
    let chat = backend
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/chat")
                .json_body(json!({"user_id": "tester", "message": "what did I buy?"}));
            then.status(200).json_body(json!({"response": "You bought milk."}));
        })
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let image = tmp.path().join("IMG_0001.PNG");
    std::fs::write(&image, b"\x89PNG\r\n").unwrap();

    let store = Arc::new(LibSqlStore::new_local(&tmp.path().join("agent.db")).await.unwrap());
    let mut agent = agent(backend.base_url(), store).await;

    agent.adapter.push(RawMessage {
        guid: Some("img-1".into()),
        sender: Some("+15551234567".into()),
        date: Utc::now(),
        attachments: vec![
            RawAttachment {
                filename: Some("notes.pdf".into()),
                path: Some(tmp.path().join("notes.pdf")),
            },
            RawAttachment {
                filename: Some("IMG_0001.PNG".into()),
                path: Some(image.clone()),
            },
        ],
        ..Default::default()
    });
    agent
        .adapter
        .push(text_from("txt-1", "5551234567", "what did I buy?"));
    // Not the monitored counterparty.
    agent.adapter.push(text_from("txt-2", "+15559999999", "spam"));
    agent
        .adapter
        .push(text_from("txt-3", "+15551234567", "Liked “what did I buy?”"));

    let summary = agent.orchestrator.run_once().await;
    assert_eq!(
        summary,
        BatchSummary {
            candidates: 2,
            completed: 2,
            failed: 0
        }
    );

    extract.assert_async().await;
    chat.assert_async().await;

    let sent = agent.adapter.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].text.contains("Merchant: Trader Joe's"));
    assert!(sent[0].text.contains("Total: $12.50"));
    assert_eq!(sent[1].text, "You bought milk.");
    assert!(sent.iter().all(|s| s.recipient == "+15551234567"));

    let txn = agent.store.get_transaction("img-1").await.unwrap().unwrap();
    assert_eq!(txn.sender_address, "+15551234567");
    assert!(agent.store.is_processed("txt-1").await.unwrap());

    // Platform echo of our own reply is classified, not answered.
    agent
        .adapter
        .push(text_from("txt-4", "+15551234567", "You bought milk."));
    let summary = agent.orchestrator.run_once().await;
    assert_eq!(summary.completed, 1);
    assert!(agent.store.is_processed("txt-4").await.unwrap());
    assert_eq!(chat.calls_async().await, 1);
    assert_eq!(agent.adapter.sent().len(), 2);
}

#[tokio::test]
async fn restart_does_not_reprocess() {
    let backend = MockServer::start_async().await;
    let chat = backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(200).json_body(json!({"response": "hello back"}));
        })
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("agent.db");
    let message = text_from("txt-1", "+15551234567", "hello");

    {
        let store = Arc::new(LibSqlStore::new_local(&db_path).await.unwrap());
        let mut first = agent(backend.base_url(), store).await;
        first.adapter.push(message.clone());
        first.orchestrator.run_once().await;
        assert_eq!(first.adapter.sent().len(), 1);
        first.orchestrator.shutdown(None).await;
    }

    let store = Arc::new(LibSqlStore::new_local(&db_path).await.unwrap());
    let mut second = agent(backend.base_url(), store).await;
    second.adapter.push(message);
    let summary = second.orchestrator.run_once().await;

    assert_eq!(summary.candidates, 0);
    assert!(second.adapter.sent().is_empty());
    assert_eq!(chat.calls_async().await, 1);
}

#[tokio::test]
async fn backend_outage_sends_fallback_once() {
    let backend = MockServer::start_async().await;
    backend
        .mock_async(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(503);
        })
        .await;

    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let mut agent = agent(backend.base_url(), store).await;
    agent.adapter.push(text_from("txt-1", "+15551234567", "hi"));

    agent.orchestrator.run_once().await;
    agent.orchestrator.run_once().await;

    let sent = agent.adapter.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, FALLBACK_REPLY);
    assert!(agent.store.is_bot_response(FALLBACK_REPLY).await.unwrap());
}
