use std::io;

use bytes::Bytes;
use futures_util::stream;
use futures_util::Stream;
use sparrow_cli::protocol::chat::{Role, Usage, CHAT_COMPLETION_OBJECT};
use sparrow_cli::stream::{
    decode_stream, decode_stream_outcome, decode_stream_to_channel, decode_stream_with_callback,
    StreamError, StreamEvent,
};
use tokio::sync::mpsc;

fn body_from_parts(parts: Vec<String>) -> impl Stream<Item = Result<Bytes, io::Error>> {
    stream::iter(parts.into_iter().map(|part| Ok(Bytes::from(part))))
}

fn body_from_lines(lines: &[&str]) -> impl Stream<Item = Result<Bytes, io::Error>> {
    let text: String = lines.iter().map(|line| format!("{line}\n")).collect();
    body_from_parts(vec![text])
}

fn content_chunk(id: &str, fragment: &str) -> String {
    format!(
        "data: {{\"id\":\"{id}\",\"object\":\"chat.completion.chunk\",\"created\":7,\"model\":\"m\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":{}}}}}]}}",
        serde_json::to_string(fragment).expect("encode fragment")
    )
}

type Calls = Vec<(String, bool)>;

async fn decode_recording<S>(
    body: S,
) -> (Result<sparrow_cli::protocol::chat::CompletionResult, StreamError>, Calls)
where
    S: Stream<Item = Result<Bytes, io::Error>>,
{
    let mut calls = Vec::new();
    let result = decode_stream_with_callback(
        body,
        Some(|fragment: &str, finished: bool| calls.push((fragment.to_string(), finished))),
    )
    .await;
    (result, calls)
}

#[tokio::test]
async fn test_end_to_end_example() {
    let lines = [
        r#"data: {"id":"c1","created":1,"model":"m","choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"}}]}"#,
        "",
        r#"data: {"id":"c1","created":1,"model":"m","choices":[{"index":0,"delta":{"content":" there"},"finish_reason":"stop","usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}]}"#,
        "",
        "data: [DONE]",
    ];

    let (result, calls) = decode_recording(body_from_lines(&lines)).await;
    let result = result.expect("decode");

    assert_eq!(result.id, "c1");
    assert_eq!(result.model, "m");
    assert_eq!(result.created, 1);
    assert_eq!(result.kind, CHAT_COMPLETION_OBJECT);
    assert_eq!(result.choices.len(), 1);
    assert_eq!(result.choices[0].index, 0);
    assert_eq!(result.choices[0].message.role, Role::Assistant);
    assert_eq!(result.choices[0].message.content, "Hi there");
    assert_eq!(result.finish_reason(), Some("stop"));
    assert_eq!(
        result.usage,
        Usage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        }
    );
    assert_eq!(
        calls,
        vec![
            ("Hi".to_string(), false),
            (" there".to_string(), false),
            (String::new(), true),
        ]
    );
}

#[tokio::test]
async fn test_fragments_concatenate_in_arrival_order_skipping_empty() {
    let fragments = ["The", " quick", "", " brown", "", " fox"];
    let mut lines: Vec<String> = fragments
        .iter()
        .map(|fragment| content_chunk("c1", fragment))
        .collect();
    lines.push("data: [DONE]".to_string());
    let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();

    let (result, calls) = decode_recording(body_from_lines(&borrowed)).await;

    assert_eq!(result.expect("decode").content(), "The quick brown fox");
    let notified: Vec<&str> = calls
        .iter()
        .filter(|(_, finished)| !finished)
        .map(|(fragment, _)| fragment.as_str())
        .collect();
    assert_eq!(notified, vec!["The", " quick", " brown", " fox"]);
}

#[tokio::test]
async fn test_fragments_survive_arbitrary_transport_splits() {
    let mut text = String::new();
    for fragment in ["alpha ", "beta ", "gamma ", "\u{1F600} delta"] {
        text.push_str(&content_chunk("c1", fragment));
        text.push_str("\r\n\r\n");
    }
    text.push_str("data: [DONE]\r\n");

    for piece in [1, 3, 7, 64] {
        let parts: Vec<Bytes> = text
            .as_bytes()
            .chunks(piece)
            .map(Bytes::copy_from_slice)
            .collect();
        let body = stream::iter(parts.into_iter().map(Ok::<_, io::Error>));
        let outcome = decode_stream_outcome(body).await.expect("decode");
        assert_eq!(outcome.result.content(), "alpha beta gamma \u{1F600} delta");
        assert!(outcome.terminated, "piece size {piece}");
    }
}

#[tokio::test]
async fn test_terminator_notifies_finished_exactly_once() {
    let first = content_chunk("c1", "a");
    let lines = [first.as_str(), "data: [DONE]", "data: [DONE]", ""];

    let (result, calls) = decode_recording(body_from_lines(&lines)).await;

    assert_eq!(result.expect("decode").content(), "a");
    assert_eq!(calls.iter().filter(|(_, finished)| *finished).count(), 1);
    assert_eq!(calls.last(), Some(&(String::new(), true)));
}

#[tokio::test]
async fn test_lines_after_terminator_are_not_read() {
    let before = content_chunk("c1", "kept");
    let after = content_chunk("c1", " dropped");
    let lines = [before.as_str(), "data: [DONE]", after.as_str()];

    let (result, calls) = decode_recording(body_from_lines(&lines)).await;

    assert_eq!(result.expect("decode").content(), "kept");
    assert_eq!(calls.len(), 2);
}

#[tokio::test]
async fn test_missing_terminator_is_not_an_error() {
    let first = content_chunk("c1", "partial ");
    let second = content_chunk("c1", "answer");
    let lines = [first.as_str(), "", second.as_str()];

    let (result, calls) = decode_recording(body_from_lines(&lines)).await;

    assert_eq!(result.expect("decode").content(), "partial answer");
    assert!(calls.iter().all(|(_, finished)| !finished));

    let outcome = decode_stream_outcome(body_from_lines(&lines))
        .await
        .expect("decode");
    assert!(!outcome.terminated);
}

#[tokio::test]
async fn test_malformed_chunk_between_valid_chunks_is_skipped() {
    let first = content_chunk("c1", "left");
    let second = content_chunk("c1", "right");
    let lines = [
        first.as_str(),
        r#"data: {"id":"c1","choices":[{"delta":{"content":"#,
        second.as_str(),
        "data: [DONE]",
    ];

    let (result, calls) = decode_recording(body_from_lines(&lines)).await;
    assert_eq!(result.expect("decode").content(), "leftright");
    assert_eq!(calls.len(), 3);

    let outcome = decode_stream_outcome(body_from_lines(&lines))
        .await
        .expect("decode");
    assert_eq!(outcome.skipped_chunks, 1);
    assert!(outcome.terminated);
}

#[tokio::test]
async fn test_metadata_latches_from_first_identified_chunk() {
    let lines = [
        r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
        r#"data: {"id":"first","created":11,"model":"model-a","choices":[{"index":0,"delta":{"content":"x"}}]}"#,
        r#"data: {"id":"second","created":22,"model":"model-b","choices":[{"index":0,"delta":{"content":"y"}}]}"#,
        "data: [DONE]",
    ];

    let result = decode_stream(body_from_lines(&lines)).await.expect("decode");

    assert_eq!(result.id, "first");
    assert_eq!(result.model, "model-a");
    assert_eq!(result.created, 11);
    assert_eq!(result.content(), "xy");
}

#[tokio::test]
async fn test_metadata_latches_from_chunks_without_id() {
    let lines = [
        r#"data: {"object":"chat.completion.chunk","created":5,"model":"m","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#,
        r#"data: {"object":"chat.completion.chunk","created":6,"model":"other","choices":[{"index":0,"delta":{"content":"!"}}]}"#,
        "data: [DONE]",
    ];

    let result = decode_stream(body_from_lines(&lines)).await.expect("decode");

    assert_eq!(result.content(), "Hi!");
    assert_eq!(result.model, "m");
    assert_eq!(result.created, 5);
    assert_eq!(result.id, "");
    assert_eq!(result.kind, CHAT_COMPLETION_OBJECT);
}

#[tokio::test]
async fn test_oversized_line_fails_however_it_arrives() {
    let huge = content_chunk("c1", &"x".repeat(2 * 1024 * 1024));
    let text = format!("{huge}\ndata: [DONE]\n");

    let whole = body_from_parts(vec![text.clone()]);
    let (head, tail) = text.split_at(1024 * 1024);
    let split = body_from_parts(vec![head.to_string(), tail.to_string()]);

    for body in [whole, split] {
        let result = decode_stream(body).await;
        assert!(matches!(result, Err(StreamError::LineTooLong { .. })));
    }
}

#[tokio::test]
async fn test_finish_reason_and_usage_are_last_write_wins() {
    let lines = [
        r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"a"},"finish_reason":"length","usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}]}"#,
        r#"data: {"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop","usage":{"prompt_tokens":4}}]}"#,
        r#"data: {"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":null}]}"#,
        "data: [DONE]",
    ];

    let result = decode_stream(body_from_lines(&lines)).await.expect("decode");

    assert_eq!(result.finish_reason(), Some("stop"));
    assert_eq!(
        result.usage,
        Usage {
            prompt_tokens: 4,
            completion_tokens: 0,
            total_tokens: 0,
        }
    );
}

#[tokio::test]
async fn test_empty_stream_yields_empty_result() {
    let (result, calls) = decode_recording(body_from_parts(Vec::new())).await;
    let result = result.expect("decode");

    assert_eq!(result.content(), "");
    assert_eq!(result.finish_reason(), None);
    assert_eq!(result.usage, Usage::default());
    assert_eq!(result.choices.len(), 1);
    assert_eq!(result.choices[0].message.role, Role::Assistant);
    assert!(calls.is_empty());
}

#[tokio::test]
async fn test_keep_alive_and_unknown_lines_are_ignored() {
    let chunk = content_chunk("c1", "ok");
    let lines = [
        ": keep-alive",
        "event: message",
        "retry: 1000",
        chunk.as_str(),
        "id: 42",
        "data: [DONE]",
    ];

    let (result, calls) = decode_recording(body_from_lines(&lines)).await;

    assert_eq!(result.expect("decode").content(), "ok");
    assert_eq!(calls.len(), 2);
}

#[tokio::test]
async fn test_read_error_propagates_after_partial_notifications() {
    let parts = vec![
        Ok(Bytes::from(format!("{}\n", content_chunk("c1", "half")))),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
        Ok(Bytes::from_static(b"data: [DONE]\n")),
    ];
    let mut calls = Vec::new();
    let result = decode_stream_with_callback(
        stream::iter(parts),
        Some(|fragment: &str, finished: bool| calls.push((fragment.to_string(), finished))),
    )
    .await;

    match result {
        Err(StreamError::Read(source)) => assert!(source.to_string().contains("reset by peer")),
        other => panic!("expected read error, got {other:?}"),
    }
    assert_eq!(calls, vec![("half".to_string(), false)]);
}

#[tokio::test]
async fn test_decode_without_notifier() {
    let chunk = content_chunk("c1", "quiet");
    let lines = [chunk.as_str(), "data: [DONE]"];

    let result = decode_stream_with_callback(body_from_lines(&lines), None::<fn(&str, bool)>)
        .await
        .expect("decode");

    assert_eq!(result.content(), "quiet");
}

#[tokio::test]
async fn test_channel_delivery_matches_callback_order() {
    let first = content_chunk("c1", "one");
    let second = content_chunk("c1", " two");
    let lines = [first.as_str(), second.as_str(), "data: [DONE]"];
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let outcome = decode_stream_to_channel(body_from_lines(&lines), events_tx)
        .await
        .expect("decode");

    let mut events = Vec::new();
    while let Some(event) = events_rx.recv().await {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            StreamEvent::Fragment("one".to_string()),
            StreamEvent::Fragment(" two".to_string()),
            StreamEvent::Done,
        ]
    );
    assert!(outcome.terminated);
    assert_eq!(outcome.result.content(), "one two");
}

#[tokio::test]
async fn test_channel_decode_continues_after_receiver_dropped() {
    let first = content_chunk("c1", "still ");
    let second = content_chunk("c1", "decoded");
    let lines = [first.as_str(), second.as_str()];
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    drop(events_rx);

    let outcome = decode_stream_to_channel(body_from_lines(&lines), events_tx)
        .await
        .expect("decode");

    assert_eq!(outcome.result.content(), "still decoded");
    assert!(!outcome.terminated);
}
