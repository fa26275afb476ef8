//! Unit tests for request/response correlation.
//!
//! The correlator's writer channel stands in for the server's stdin: each
//! test reads the outbound envelopes from the channel and answers them by
//! calling `dispatch` directly.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mcp_stdio_bridge::correlator::Correlator;
use mcp_stdio_bridge::{AppError, Result};

async fn attached(timeout: Duration) -> (Arc<Correlator>, mpsc::Receiver<Value>) {
    let correlator = Arc::new(Correlator::new(timeout));
    let (tx, rx) = mpsc::channel(64);
    correlator.attach(tx).await;
    (correlator, rx)
}

fn spawn_send(correlator: &Arc<Correlator>, method: &str) -> JoinHandle<Result<Value>> {
    let correlator = Arc::clone(correlator);
    let method = method.to_owned();
    tokio::spawn(async move { correlator.send(&method, json!({})).await })
}

fn response(id: u64, result: &Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

fn outbound_id(envelope: &Value) -> u64 {
    envelope["id"].as_u64().expect("outbound request carries an integer id")
}

#[tokio::test]
async fn request_envelope_is_written_with_version_method_and_params() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let c = Arc::clone(&correlator);
    let call = tokio::spawn(async move { c.send("tools/list", json!({"cursor": "a"})).await });

    let outbound = rx.recv().await.expect("request written");
    assert_eq!(outbound["jsonrpc"], "2.0");
    assert_eq!(outbound["method"], "tools/list");
    assert_eq!(outbound["params"], json!({"cursor": "a"}));

    correlator
        .dispatch(&response(outbound_id(&outbound), &json!({"tools": []})))
        .await;
    call.await.expect("join").expect("resolved");
}

#[tokio::test]
async fn ping_resolves_with_exact_envelope() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let call = spawn_send(&correlator, "ping");

    let outbound = rx.recv().await.expect("request written");
    assert_eq!(outbound_id(&outbound), 0, "first request uses id 0");

    let line = r#"{"jsonrpc":"2.0","id":0,"result":"pong"}"#;
    assert_eq!(correlator.dispatch(line).await, 1);

    let envelope = call.await.expect("join").expect("resolved");
    assert_eq!(envelope, json!({"jsonrpc": "2.0", "id": 0, "result": "pong"}));
}

#[tokio::test]
async fn concurrent_requests_get_distinct_ids() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let calls: Vec<_> = (0..16).map(|_| spawn_send(&correlator, "ping")).collect();

    let mut ids = HashSet::new();
    for _ in 0..16 {
        let outbound = rx.recv().await.expect("request written");
        assert!(ids.insert(outbound_id(&outbound)), "ids must be unique");
    }
    assert_eq!(correlator.pending_count().await, 16);

    for id in &ids {
        correlator.dispatch(&response(*id, &json!(id))).await;
    }
    for call in calls {
        let envelope = call.await.expect("join").expect("resolved");
        assert_eq!(envelope["id"], envelope["result"], "each caller gets its own response");
    }
    assert_eq!(correlator.pending_count().await, 0);
}

#[tokio::test]
async fn out_of_order_responses_reach_their_callers() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let first = spawn_send(&correlator, "first");
    let first_id = outbound_id(&rx.recv().await.expect("first written"));
    let second = spawn_send(&correlator, "second");
    let second_id = outbound_id(&rx.recv().await.expect("second written"));

    correlator.dispatch(&response(second_id, &json!("two"))).await;
    correlator.dispatch(&response(first_id, &json!("one"))).await;

    assert_eq!(first.await.expect("join").expect("first")["result"], "one");
    assert_eq!(second.await.expect("join").expect("second")["result"], "two");
}

#[tokio::test]
async fn duplicate_response_is_a_noop() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let call = spawn_send(&correlator, "ping");
    let id = outbound_id(&rx.recv().await.expect("request written"));

    assert_eq!(correlator.dispatch(&response(id, &json!("pong"))).await, 1);
    assert_eq!(
        correlator.dispatch(&response(id, &json!("again"))).await,
        0,
        "second dispatch for the same id must do nothing"
    );

    let envelope = call.await.expect("join").expect("resolved");
    assert_eq!(envelope["result"], "pong");
    assert_eq!(correlator.pending_count().await, 0);
}

#[tokio::test]
async fn error_response_still_resolves_the_caller() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let call = spawn_send(&correlator, "tools/call");
    let id = outbound_id(&rx.recv().await.expect("request written"));

    let line = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": -32601, "message": "Method not found"}
    })
    .to_string();
    correlator.dispatch(&line).await;

    let envelope = call.await.expect("join").expect("error envelopes are passed through");
    assert_eq!(envelope["error"]["code"], -32601);
}

#[tokio::test]
async fn timeout_rejects_and_drops_late_response() {
    let (correlator, mut rx) = attached(Duration::from_millis(50)).await;
    let call = spawn_send(&correlator, "slow/tool");
    let id = outbound_id(&rx.recv().await.expect("request written"));

    let err = call.await.expect("join").expect_err("must time out");
    match &err {
        AppError::Timeout { method, after } => {
            assert_eq!(method, "slow/tool");
            assert_eq!(*after, Duration::from_millis(50));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert!(err.to_string().contains("timeout"), "message: {err}");
    assert_eq!(correlator.pending_count().await, 0);

    assert_eq!(
        correlator.dispatch(&response(id, &json!("late"))).await,
        0,
        "late response must be dropped"
    );
}

#[tokio::test]
async fn send_without_attached_writer_is_disconnected() {
    let correlator = Correlator::new(Duration::from_secs(5));
    let err = correlator
        .send("ping", json!({}))
        .await
        .expect_err("no writer attached");
    assert!(matches!(err, AppError::Disconnected(_)));
    assert_eq!(correlator.pending_count().await, 0);
}

#[tokio::test]
async fn closed_writer_channel_is_disconnected() {
    let (correlator, rx) = attached(Duration::from_secs(5)).await;
    drop(rx);

    let err = correlator
        .send("ping", json!({}))
        .await
        .expect_err("writer gone");
    assert!(matches!(err, AppError::Disconnected(_)));
    assert_eq!(correlator.pending_count().await, 0, "failed send leaves no entry");
}

#[tokio::test]
async fn disconnect_rejects_every_pending_request() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let calls: Vec<_> = (0..3).map(|_| spawn_send(&correlator, "ping")).collect();
    for _ in 0..3 {
        rx.recv().await.expect("request written");
    }

    assert_eq!(correlator.disconnect().await, 3);
    for call in calls {
        let err = call.await.expect("join").expect_err("rejected");
        assert!(matches!(err, AppError::Disconnected(_)), "got {err:?}");
    }
    assert_eq!(correlator.pending_count().await, 0);

    let err = correlator
        .send("ping", json!({}))
        .await
        .expect_err("writer detached");
    assert!(matches!(err, AppError::Disconnected(_)));
}

#[tokio::test]
async fn ids_keep_increasing_across_reattach() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let call = spawn_send(&correlator, "ping");
    let first = outbound_id(&rx.recv().await.expect("written"));
    correlator.dispatch(&response(first, &json!("pong"))).await;
    call.await.expect("join").expect("resolved");

    correlator.disconnect().await;
    let (tx, mut rx) = mpsc::channel(8);
    correlator.attach(tx).await;

    let call = spawn_send(&correlator, "ping");
    let second = outbound_id(&rx.recv().await.expect("written"));
    assert!(second > first, "ids are never reused after a restart");
    correlator.dispatch(&response(second, &json!("pong"))).await;
    call.await.expect("join").expect("resolved");
}

#[tokio::test]
async fn notification_is_written_without_id_and_not_tracked() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    correlator
        .notify("notifications/initialized", None)
        .await
        .expect("notification written");

    let outbound = rx.recv().await.expect("notification written");
    assert_eq!(
        outbound,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
    );
    assert_eq!(correlator.pending_count().await, 0);
}

#[tokio::test]
async fn non_response_lines_are_dropped() {
    let (correlator, mut rx) = attached(Duration::from_secs(5)).await;
    let call = spawn_send(&correlator, "ping");
    let id = outbound_id(&rx.recv().await.expect("written"));

    let server_request = json!({"jsonrpc": "2.0", "id": id, "method": "roots/list"}).to_string();
    let string_id = json!({"jsonrpc": "2.0", "id": id.to_string(), "result": "x"}).to_string();
    for line in [
        "",
        "Knowledge Graph MCP Server running on stdio",
        "{not json",
        r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#,
        server_request.as_str(),
        string_id.as_str(),
    ] {
        assert_eq!(correlator.dispatch(line).await, 0, "line must be dropped: {line}");
    }
    assert_eq!(correlator.pending_count().await, 1);

    correlator.dispatch(&response(id, &json!("pong"))).await;
    call.await.expect("join").expect("resolved");
}
