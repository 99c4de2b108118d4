//! End-to-end message handling through the authorization gate

mod common;

use common::*;
use std::collections::HashSet;
use std::sync::Arc;
use tg_rag_bot::bot::Command;
use tg_rag_bot::handlers::{Handler, NO_DOCUMENTS_REPLY, RESET_FAILED_REPLY, RESET_OK_REPLY};
use tg_rag_bot::transport::{Inbound, Payload};

#[tokio::test]
async fn upload_is_indexed_previewed_and_cleaned_up() {
    let h = Harness::new().await;

    h.gate.handle(document(Some("notes.pdf"))).await.unwrap();

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2, "{:?}", sent);
    assert_eq!(sent[0], "File 'notes.pdf' received. Processing...");

    let previews: Vec<_> = sent
        .iter()
        .filter(|m| m.starts_with("File processed successfully! Here's a preview:\n- "))
        .collect();
    assert_eq!(previews.len(), 1);

    let ids = h.tracked_ids().await;
    assert_eq!(ids.len(), 3);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    assert_eq!(h.stored().await, ids.len());

    let expected: String = page_text(1).chars().take(100).collect();
    assert_eq!(
        previews[0],
        &format!("File processed successfully! Here's a preview:\n- {}: {}...", ids[0], expected)
    );

    assert_eq!(h.transport.downloads().len(), 1);
    assert!(!h.transport.downloads()[0].exists());
    assert!(h.upload_dir_is_empty());
}

#[tokio::test]
async fn reset_token_removes_everything_the_chat_uploaded() {
    let h = Harness::new().await;
    h.gate.handle(document(Some("notes.pdf"))).await.unwrap();
    assert_eq!(h.tracked_ids().await.len(), 3);

    h.gate.handle(text("RESET")).await.unwrap();

    assert!(h.tracked_ids().await.is_empty());
    assert_eq!(h.stored().await, 0);
    assert_eq!(h.transport.sent().last().unwrap(), RESET_OK_REPLY);
}

#[tokio::test]
async fn reset_prefix_and_command_both_reset() {
    let h = Harness::new().await;

    h.gate.handle(document(Some("a.pdf"))).await.unwrap();
    h.gate.handle(text("RESET everything please")).await.unwrap();
    assert_eq!(h.transport.sent().last().unwrap(), RESET_OK_REPLY);

    h.gate.handle(document(Some("b.pdf"))).await.unwrap();
    h.gate
        .handle(from_owner(Payload::Command(Command::Reset)))
        .await
        .unwrap();
    assert_eq!(h.transport.sent().last().unwrap(), RESET_OK_REPLY);
    assert_eq!(h.stored().await, 0);
    assert_eq!(h.chat.calls(), 0);
}

#[tokio::test]
async fn lowercase_reset_is_a_question() {
    let h = Harness::new().await;
    h.gate.handle(text("reset")).await.unwrap();

    assert_eq!(h.transport.sent(), vec![NO_DOCUMENTS_REPLY.to_string()]);
}

#[tokio::test]
async fn reset_with_nothing_tracked_fails() {
    let h = Harness::new().await;
    h.gate.handle(text("RESET")).await.unwrap();

    assert_eq!(h.transport.sent(), vec![RESET_FAILED_REPLY.to_string()]);
}

#[tokio::test]
async fn rejected_delete_keeps_the_session() {
    let h = Harness::build(Arc::new(RejectingIndex::default()), RecordingTransport::default()).await;
    h.gate.handle(document(Some("notes.pdf"))).await.unwrap();
    let before = h.tracked_ids().await;

    h.gate.handle(text("RESET")).await.unwrap();

    assert_eq!(h.tracked_ids().await, before);
    assert_eq!(h.stored().await, 3);
    assert_eq!(h.transport.sent().last().unwrap(), RESET_FAILED_REPLY);
}

#[tokio::test]
async fn question_on_empty_store_skips_the_model() {
    let h = Harness::new().await;

    h.gate
        .handle(text("What was Q3 revenue?"))
        .await
        .unwrap();

    assert_eq!(h.transport.sent(), vec![NO_DOCUMENTS_REPLY.to_string()]);
    assert_eq!(h.chat.calls(), 0);
}

#[tokio::test]
async fn question_is_answered_from_uploaded_chunks() {
    let h = Harness::new().await;
    h.gate.handle(document(Some("notes.pdf"))).await.unwrap();

    h.gate.handle(text("How did revenue change?")).await.unwrap();

    assert_eq!(h.chat.calls(), 1);
    assert_eq!(
        h.transport.sent().last().unwrap(),
        &format!("LLM's response: {}", ANSWER)
    );

    let prompt = h.chat.last_prompt().unwrap();
    assert_eq!(prompt[0].content, "You are a helpful assistant.");
    assert!(prompt[1].content.starts_with("Based on these documents: [Document(page_content="));
    assert!(prompt[1].content.ends_with("], answer the query: How did revenue change?"));
    assert!(prompt[1].content.contains("notes.pdf"));
}

#[tokio::test]
async fn strangers_get_no_reply_and_no_work() {
    let h = Harness::new().await;
    let stranger = |payload| Inbound {
        chat_id: CHAT,
        sender_id: Some("2002".to_string()),
        payload,
    };

    h.gate
        .handle(stranger(Payload::Document {
            file_id: "file-1".to_string(),
            file_name: Some("notes.pdf".to_string()),
        }))
        .await
        .unwrap();
    h.gate
        .handle(stranger(Payload::Text("RESET".to_string())))
        .await
        .unwrap();
    h.gate
        .handle(stranger(Payload::Text("What was Q3 revenue?".to_string())))
        .await
        .unwrap();
    h.gate
        .handle(Inbound {
            chat_id: CHAT,
            sender_id: None,
            payload: Payload::Text("hello".to_string()),
        })
        .await
        .unwrap();

    assert!(h.transport.sent().is_empty());
    assert!(h.transport.downloads().is_empty());
    assert_eq!(h.chat.calls(), 0);
    assert_eq!(h.stored().await, 0);
}

#[tokio::test]
async fn unsupported_upload_is_rejected_and_removed() {
    let h = Harness::new().await;
    h.gate.handle(document(Some("firmware.bin"))).await.unwrap();

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].starts_with("Could not process 'firmware.bin'"), "{}", sent[1]);
    assert!(h.tracked_ids().await.is_empty());
    assert_eq!(h.stored().await, 0);
    assert!(h.upload_dir_is_empty());
}

#[tokio::test]
async fn store_failure_during_upload_leaves_no_trace() {
    let h = Harness::build(Arc::new(FailingInsertIndex::default()), RecordingTransport::default()).await;
    h.gate.handle(document(Some("notes.pdf"))).await.unwrap();

    assert_eq!(
        h.transport.sent().last().unwrap(),
        "An error occurred while processing the file. Please try again."
    );
    assert!(h.tracked_ids().await.is_empty());
    assert!(h.upload_dir_is_empty());
}

#[tokio::test]
async fn failed_download_is_reported() {
    let h = Harness::build(Arc::new(tg_rag_bot::memory::MemoryIndex::new()), RecordingTransport::failing_downloads()).await;
    h.gate.handle(document(Some("notes.pdf"))).await.unwrap();

    assert_eq!(
        h.transport.sent().last().unwrap(),
        "An error occurred while downloading the file. Please try again."
    );
    assert!(h.tracked_ids().await.is_empty());
    assert!(h.upload_dir_is_empty());
}

#[tokio::test]
async fn nameless_upload_is_refused() {
    let h = Harness::new().await;
    h.gate.handle(document(None)).await.unwrap();
    h.gate.handle(document(Some(""))).await.unwrap();

    assert_eq!(
        h.transport.sent(),
        vec!["File name is missing.".to_string(), "File name is missing.".to_string()]
    );
    assert!(h.transport.downloads().is_empty());
}

#[tokio::test]
async fn start_help_and_other_messages_get_replies() {
    let h = Harness::new().await;
    h.gate.handle(from_owner(Payload::Command(Command::Start))).await.unwrap();
    h.gate.handle(from_owner(Payload::Command(Command::Help))).await.unwrap();
    h.gate.handle(from_owner(Payload::Other)).await.unwrap();

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].contains("RESET"));
    assert!(sent[1].contains("/reset"));
    assert_eq!(sent[2], "Please send a valid text message.");
}
