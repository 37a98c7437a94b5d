// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Tests for M2 -- SSE re-framing, duplicate suppression, stream lifecycle
//
// Tests cover:
//  1. Growing text events relayed in order, upstream sentinel forwarded
//  2. Trailing-overlap resend suppressed
//  3. Terminal event synthesized when upstream never sends one
//  4. Repeated sentinel yields exactly one terminal event
//  5. Early client disconnect cancels the upstream read
//  6. Upstream transport error closes without a terminal event
//  7. Idle upstream closes the stream
//  8. Arbitrary chunk boundaries produce identical output
//  9. Malformed / raw / blank lines
// 10. Concurrent streams stay independent
// 11. Unterminated oversized line closes the stream as an upstream error

use super::*;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One Gemini-style SSE event carrying `text` as its only part.
fn gemini_event(text: &str) -> String {
    let body = serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]
    });
    format!("data: {body}\n\n")
}

/// Upstream body made of the given chunks, each delivered separately.
fn upstream(
    chunks: Vec<Vec<u8>>,
) -> impl futures_util::Stream<Item = Result<Bytes, String>> + Unpin + Send {
    tokio_stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect::<Vec<_>>())
}

async fn collect(mut rx: mpsc::Receiver<Bytes>) -> String {
    let mut output = String::new();
    while let Some(event) = rx.recv().await {
        output.push_str(&String::from_utf8_lossy(&event));
    }
    output
}

/// Run a full relay over in-memory chunks and return client output + outcome.
async fn relay(chunks: Vec<Vec<u8>>) -> (String, StreamOutcome) {
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let (outcome, output) = tokio::join!(
        proxy_stream(upstream(chunks), tx, CancellationToken::new()),
        collect(rx)
    );
    (output, outcome)
}

fn chunks(parts: &[&str]) -> Vec<Vec<u8>> {
    parts.iter().map(|p| p.as_bytes().to_vec()).collect()
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

// ---------------------------------------------------------------------------
// Test 1: growing text relayed in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn growing_text_relayed_in_order_with_single_terminal() {
    let (output, outcome) = relay(chunks(&[
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi there\"}]}}]}\n\n",
        "data: [DONE]\n\n",
    ]))
    .await;

    assert_eq!(
        output,
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n\
         data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi there\"}]}}]}\n\n\
         data: [DONE]\n\n"
    );
    assert_eq!(outcome.events_emitted, 2);
    assert_eq!(outcome.events_suppressed, 0);
    assert!(outcome.terminal_sent);
    assert_eq!(outcome.end, StreamEnd::Completed);
}

#[tokio::test]
async fn json_is_reserialized_compactly() {
    let (output, _) = relay(chunks(&["data: { \"b\" : 1,\n", "\n"])).await;
    // A line split by a bare newline is two lines; the first is not JSON.
    assert!(output.starts_with("data: { \"b\" : 1,\n\n"));

    let (output, _) = relay(chunks(&["data: {  \"b\" :  1 }\n\n"])).await;
    assert_eq!(output, "data: {\"b\":1}\n\ndata: [DONE]\n\n");
}

// ---------------------------------------------------------------------------
// Test 2: trailing-overlap resend suppressed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn suffix_resend_is_suppressed() {
    let first = gemini_event("Hi there, friend");
    let resend = gemini_event("friend");
    let (output, outcome) = relay(vec![first.clone().into_bytes(), resend.into_bytes()]).await;

    assert_eq!(count(&output, "data: "), 2, "one content event plus terminal: {output}");
    assert!(output.contains("Hi there, friend"));
    assert!(output.ends_with("data: [DONE]\n\n"));
    assert_eq!(outcome.events_emitted, 1);
    assert_eq!(outcome.events_suppressed, 1);
}

#[tokio::test]
async fn suppression_compares_against_last_emitted_only() {
    let (output, outcome) = relay(chunks(&[
        &gemini_event("alpha beta"),
        &gemini_event("beta"),
        &gemini_event("gamma"),
        &gemini_event("alpha beta"),
    ]))
    .await;

    // "beta" repeats the tail of "alpha beta"; the final "alpha beta" is not a
    // suffix of "gamma" and is relayed again.
    assert_eq!(outcome.events_emitted, 3);
    assert_eq!(outcome.events_suppressed, 1);
    let gamma = output.find("gamma").unwrap();
    let last_alpha = output.rfind("alpha beta").unwrap();
    assert!(gamma < last_alpha);
}

// ---------------------------------------------------------------------------
// Test 3: terminal synthesized
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_sentinel_is_synthesized_once() {
    let (output, outcome) = relay(chunks(&[&gemini_event("a"), &gemini_event("ab")])).await;

    assert_eq!(count(&output, "data: [DONE]\n\n"), 1);
    assert!(output.ends_with("data: [DONE]\n\n"));
    assert!(outcome.terminal_sent);
    assert_eq!(outcome.end, StreamEnd::Completed);
}

#[tokio::test]
async fn empty_upstream_still_gets_terminal() {
    let (output, outcome) = relay(Vec::new()).await;
    assert_eq!(output, "data: [DONE]\n\n");
    assert_eq!(outcome.events_emitted, 0);
}

#[tokio::test]
async fn unterminated_final_line_is_salvaged() {
    let (output, _) = relay(chunks(&[&gemini_event("one"), "data: {\"x\":2}"])).await;
    assert!(output.ends_with("data: {\"x\":2}\n\ndata: [DONE]\n\n"), "{output}");
}

#[tokio::test]
async fn unterminated_final_sentinel_is_not_duplicated() {
    let (output, _) = relay(chunks(&[&gemini_event("one"), "data: [DONE]"])).await;
    assert_eq!(count(&output, "[DONE]"), 1);
}

// ---------------------------------------------------------------------------
// Test 4: repeated sentinel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_sentinel_yields_one_terminal() {
    let (output, outcome) = relay(chunks(&[
        &gemini_event("x"),
        "data: [DONE]\n\n",
        "data: [DONE]\n\n",
    ]))
    .await;

    assert_eq!(count(&output, "[DONE]"), 1);
    assert!(outcome.terminal_sent);
}

#[tokio::test]
async fn nothing_forwarded_after_sentinel() {
    let body = format!(
        "{}data: [DONE]\n\n{}data: [DONE]\n\n",
        gemini_event("before"),
        gemini_event("after")
    );
    let (output, outcome) = relay(vec![body.into_bytes()]).await;

    assert!(output.contains("before"));
    assert!(!output.contains("after"));
    assert_eq!(count(&output, "[DONE]"), 1);
    assert_eq!(outcome.events_emitted, 1);
}

#[tokio::test]
async fn sentinel_stops_upstream_read() {
    let (up_tx, up_rx) = mpsc::channel::<Result<Bytes, String>>(8);
    let (tx, rx) = mpsc::channel(8);

    up_tx.send(Ok(Bytes::from("data: [DONE]\n\n"))).await.unwrap();
    let outcome = StreamOrchestrator::new(None)
        .run(ReceiverStream::new(up_rx), tx, CancellationToken::new())
        .await;

    // Upstream never signalled end of data, yet the relay finished.
    assert_eq!(outcome.end, StreamEnd::Completed);
    assert!(up_tx.is_closed());
    assert_eq!(collect(rx).await, "data: [DONE]\n\n");
}

// ---------------------------------------------------------------------------
// Test 5: early client disconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnect_after_first_event_cancels_upstream() {
    let (up_tx, up_rx) = mpsc::channel::<Result<Bytes, String>>(8);
    let (tx, mut rx) = mpsc::channel(8);
    let disconnect = CancellationToken::new();

    let handle = tokio::spawn({
        let disconnect = disconnect.clone();
        async move {
            StreamOrchestrator::new(None)
                .run(ReceiverStream::new(up_rx), tx, disconnect)
                .await
        }
    });

    up_tx.send(Ok(Bytes::from(gemini_event("one")))).await.unwrap();
    let first = rx.recv().await.expect("first event");
    assert!(String::from_utf8_lossy(&first).contains("one"));

    disconnect.cancel();
    let outcome = handle.await.unwrap();

    assert_eq!(outcome.end, StreamEnd::ClientDisconnected);
    assert_eq!(outcome.events_emitted, 1);
    assert!(!outcome.terminal_sent);

    // Upstream read released: the remaining events have nowhere to go.
    assert!(up_tx.is_closed());
    assert!(up_tx.send(Ok(Bytes::from(gemini_event("two")))).await.is_err());
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn dropped_client_receiver_counts_as_disconnect() {
    let (up_tx, up_rx) = mpsc::channel::<Result<Bytes, String>>(8);
    let (tx, mut rx) = mpsc::channel(8);

    let handle = tokio::spawn(async move {
        StreamOrchestrator::new(None)
            .run(ReceiverStream::new(up_rx), tx, CancellationToken::new())
            .await
    });

    up_tx.send(Ok(Bytes::from(gemini_event("one")))).await.unwrap();
    rx.recv().await.expect("first event");
    drop(rx);

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.end, StreamEnd::ClientDisconnected);
    assert!(up_tx.is_closed());
}

#[tokio::test]
async fn cancelled_before_start_emits_nothing() {
    let (tx, rx) = mpsc::channel(8);
    let disconnect = CancellationToken::new();
    disconnect.cancel();

    let outcome = StreamOrchestrator::default()
        .run(upstream(chunks(&[&gemini_event("x")])), tx, disconnect)
        .await;

    assert_eq!(outcome.end, StreamEnd::ClientDisconnected);
    assert_eq!(collect(rx).await, "");
}

// ---------------------------------------------------------------------------
// Test 6: upstream transport error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upstream_error_closes_without_terminal() {
    let items: Vec<Result<Bytes, String>> = vec![
        Ok(Bytes::from(gemini_event("partial answer"))),
        Ok(Bytes::from("data: {\"candidates\":[{\"con")),
        Err("connection reset by peer".to_string()),
    ];
    let (tx, rx) = mpsc::channel(8);
    let (outcome, output) = tokio::join!(
        proxy_stream(tokio_stream::iter(items), tx, CancellationToken::new()),
        collect(rx)
    );

    assert_eq!(
        outcome.end,
        StreamEnd::UpstreamError("connection reset by peer".to_string())
    );
    assert!(!outcome.terminal_sent);
    assert!(output.contains("partial answer"));
    assert!(!output.contains("[DONE]"));
    assert!(!output.contains("\"con"), "partial frame must not be relayed");
}

// ---------------------------------------------------------------------------
// Test 7: idle upstream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_upstream_times_out() {
    let (up_tx, up_rx) = mpsc::channel::<Result<Bytes, String>>(8);
    let (tx, rx) = mpsc::channel(8);

    up_tx.send(Ok(Bytes::from(gemini_event("slow")))).await.unwrap();
    let orchestrator = StreamOrchestrator::new(Some(Duration::from_millis(50)));
    let (outcome, output) = tokio::join!(
        orchestrator.run(ReceiverStream::new(up_rx), tx, CancellationToken::new()),
        collect(rx)
    );

    assert_eq!(outcome.end, StreamEnd::IdleTimeout);
    assert!(output.contains("slow"));
    assert!(!output.contains("[DONE]"));
    assert!(up_tx.is_closed());
}

// ---------------------------------------------------------------------------
// Test 8: chunk boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn byte_at_a_time_matches_single_chunk() {
    let body = format!(
        "{}{}{}: comment\n\ndata: not json\n\n{}data: [DONE]\n\n",
        gemini_event("Grüße"),
        gemini_event("Grüße, 世界"),
        gemini_event("世界"),
        gemini_event("done now"),
    );

    let (whole, whole_outcome) = relay(vec![body.clone().into_bytes()]).await;
    let bytes: Vec<Vec<u8>> = body.as_bytes().iter().map(|b| vec![*b]).collect();
    let (split, split_outcome) = relay(bytes).await;

    assert_eq!(whole, split);
    assert_eq!(whole_outcome, split_outcome);
    assert!(whole.contains("Grüße, 世界"));
    assert_eq!(whole_outcome.events_suppressed, 1);
    assert!(whole.contains("data: not json\n\n"));
}

// ---------------------------------------------------------------------------
// Test 9: malformed, raw and blank lines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blank_and_non_data_lines_never_forwarded() {
    let (output, outcome) = relay(chunks(&[
        "\n\n",
        "data: \n\n",
        "data:    \n\n",
        "event: ping\n\n",
        "retry: 100\n\n",
        ": keep-alive\n\n",
    ]))
    .await;

    assert_eq!(output, "data: [DONE]\n\n");
    assert_eq!(outcome.events_emitted, 0);
    assert_eq!(outcome.events_suppressed, 0);
}

#[tokio::test]
async fn metadata_events_without_text_always_relayed() {
    let usage = "data: {\"usageMetadata\":{\"totalTokenCount\":3}}\n\n";
    let (output, outcome) = relay(chunks(&[&gemini_event("t"), usage, usage])).await;

    assert_eq!(count(&output, "usageMetadata"), 2);
    assert_eq!(outcome.events_emitted, 3);
}

// ---------------------------------------------------------------------------
// Test 10: concurrent streams
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_streams_are_independent() {
    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(tokio::spawn(async move {
            let text = format!("stream-{i}");
            // Every stream resends its own tail; suppression must not leak
            // across streams.
            relay(chunks(&[&gemini_event(&text), &gemini_event(&i.to_string())])).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let (output, outcome) = handle.await.unwrap();
        assert!(output.contains(&format!("stream-{i}")));
        for other in (0..8).filter(|o| *o != i) {
            assert!(!output.contains(&format!("stream-{other}")));
        }
        assert_eq!(outcome.events_emitted, 1);
        assert_eq!(outcome.events_suppressed, 1);
    }
}

// ---------------------------------------------------------------------------
// Test 11: unterminated oversized line
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversized_partial_line_closes_without_terminal() {
    let mut first = gemini_event("kept").into_bytes();
    first.extend_from_slice(b"data: ");
    first.extend(std::iter::repeat(b'x').take(40));
    let more = vec![b'y'; 40];
    let trailing = gemini_event("never").into_bytes();

    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let orchestrator = StreamOrchestrator::new(None).with_max_line_bytes(64);
    let (outcome, output) = tokio::join!(
        orchestrator.run(upstream(vec![first, more, trailing]), tx, CancellationToken::new()),
        collect(rx)
    );

    assert!(matches!(outcome.end, StreamEnd::UpstreamError(ref e) if e.contains("64 byte limit")));
    assert!(output.contains("kept"));
    assert!(!output.contains("never"));
    assert!(!outcome.terminal_sent);
    assert_eq!(count(&output, "[DONE]"), 0);
}

#[tokio::test]
async fn partial_line_within_limit_is_reassembled() {
    let event = gemini_event("fits");
    let (head, tail) = event.as_bytes().split_at(20);

    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let orchestrator = StreamOrchestrator::new(None).with_max_line_bytes(event.len());
    let (outcome, output) = tokio::join!(
        orchestrator.run(
            upstream(vec![head.to_vec(), tail.to_vec()]),
            tx,
            CancellationToken::new()
        ),
        collect(rx)
    );

    assert_eq!(outcome.end, StreamEnd::Completed);
    assert_eq!(output, format!("{event}data: [DONE]\n\n"));
}
