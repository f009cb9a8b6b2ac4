// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod common;

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use reconciler::api::{AppState, router};
use reconciler::chain_adapter::FetchError;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;

use common::{ETH, EVM_RECIPIENT, Harness, ScriptedAdapter, confirmed_transfer, evm_tx_id, wei};

#[derive(Debug, Deserialize)]
struct InstructionsResponse {
    ok: bool,
    pending_payment_id: i64,
    chain: String,
    recipient_address: String,
    amount: String,
    human_readable_amount: String,
    expires_at_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ReconciledResponse {
    ok: bool,
    status: String,
    tx_key: String,
    pending_payment_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    ok: bool,
    code: String,
    message: String,
    retryable: bool,
}

#[derive(Debug, Deserialize)]
struct ActiveResponse {
    ok: bool,
    promotions: Vec<serde_json::Value>,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_instructions_validate_and_repeat() {
    let eth = Arc::new(ScriptedAdapter::new(ETH));
    let harness = Harness::new("http-flow", &[Arc::clone(&eth)]);
    let Some(runtime) = start_server(&harness).await else {
        return;
    };

    let (status, body) = post_json(
        runtime.addr,
        "/payments/instructions",
        serde_json::json!({
            "user_id": "alice",
            "target": "token-42",
            "kind": "trending",
            "duration_hours": 24,
            "chain": "ethereum",
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, 200, "instructions should succeed: body={body}");
    let instructions: InstructionsResponse = serde_json::from_str(&body).expect("parse body");
    assert!(instructions.ok);
    assert_eq!(instructions.chain, "ethereum");
    assert_eq!(instructions.recipient_address, EVM_RECIPIENT);
    assert_eq!(instructions.amount, "200000000000000000");
    assert_eq!(instructions.human_readable_amount, "0.2 ETH");
    assert!(instructions.expires_at_ms > 0);

    let tx_id = evm_tx_id(0xab);
    eth.script(
        &tx_id,
        Ok(confirmed_transfer(
            ETH,
            &tx_id,
            EVM_RECIPIENT,
            &[wei(200_000_000_000_000_000)],
        )),
    );
    let validate = serde_json::json!({ "user_id": "alice", "tx_id": tx_id }).to_string();

    let (status, body) = post_json(runtime.addr, "/payments/validate", validate.clone()).await;
    assert_eq!(status, 200, "validate should succeed: body={body}");
    let reconciled: ReconciledResponse = serde_json::from_str(&body).expect("parse body");
    assert!(reconciled.ok);
    assert_eq!(reconciled.status, "credited");
    assert_eq!(reconciled.tx_key, format!("ethereum:{tx_id}"));
    assert_eq!(
        reconciled.pending_payment_id,
        Some(instructions.pending_payment_id)
    );

    let (status, body) = post_json(runtime.addr, "/payments/validate", validate).await;
    assert_eq!(status, 200, "repeat should be benign: body={body}");
    let repeat: ReconciledResponse = serde_json::from_str(&body).expect("parse body");
    assert_eq!(repeat.status, "already_credited");

    let (status, body) = post_json(
        runtime.addr,
        "/payments/validate",
        serde_json::json!({ "user_id": "mallory", "tx_id": tx_id }).to_string(),
    )
    .await;
    assert_eq!(status, 422, "reuse should be refused: body={body}");
    let error: ErrorResponse = serde_json::from_str(&body).expect("parse body");
    assert!(!error.ok);
    assert_eq!(error.code, "ALREADY_PROCESSED");
    assert!(!error.retryable);
    assert!(error.message.contains("another account"));

    let (status, body) = get(runtime.addr, "/promotions/active?target=token-42&kind=trending").await;
    assert_eq!(status, 200, "active promotions: body={body}");
    let active: ActiveResponse = serde_json::from_str(&body).expect("parse body");
    assert!(active.ok);
    assert_eq!(active.promotions.len(), 1);
    assert_eq!(active.promotions[0]["source_tx_id"], format!("ethereum:{tx_id}"));

    shutdown(runtime).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_rejections_map_to_status_codes() {
    let eth = Arc::new(ScriptedAdapter::new(ETH));
    let harness = Harness::new("http-errors", &[Arc::clone(&eth)]);
    let Some(runtime) = start_server(&harness).await else {
        return;
    };

    let (status, body) =
        post_json(runtime.addr, "/payments/validate", "{not json".to_string()).await;
    assert_eq!(status, 400, "body={body}");
    let error: ErrorResponse = serde_json::from_str(&body).expect("parse body");
    assert_eq!(error.code, "BAD_REQUEST");

    let (status, body) = post_json(
        runtime.addr,
        "/payments/instructions",
        serde_json::json!({
            "user_id": "alice",
            "target": "token-42",
            "kind": "trending",
            "duration_hours": 5,
            "chain": "ethereum",
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, 422, "unknown duration: body={body}");

    for days in [u32::MAX, 536_870_913] {
        let (status, body) = post_json(
            runtime.addr,
            "/payments/instructions",
            serde_json::json!({
                "user_id": "alice",
                "target": "token-42",
                "kind": "trending",
                "duration_days": days,
                "chain": "ethereum",
            })
            .to_string(),
        )
        .await;
        assert_eq!(status, 400, "oversized duration_days {days}: body={body}");
        let error: ErrorResponse = serde_json::from_str(&body).expect("parse body");
        assert_eq!(error.code, "BAD_REQUEST");
        assert!(!error.retryable);
    }

    let transient = evm_tx_id(0x10);
    eth.script(&transient, Err(FetchError::Transient("upstream 502".to_string())));
    let (status, body) = post_json(
        runtime.addr,
        "/payments/validate",
        serde_json::json!({ "user_id": "alice", "tx_id": transient }).to_string(),
    )
    .await;
    assert_eq!(status, 503, "transient: body={body}");
    let error: ErrorResponse = serde_json::from_str(&body).expect("parse body");
    assert_eq!(error.code, "TRANSIENT_ERROR");
    assert!(error.retryable);

    let (status, body) = post_json(
        runtime.addr,
        "/payments/999/process",
        serde_json::json!({ "tx_id": evm_tx_id(0x11) }).to_string(),
    )
    .await;
    assert_eq!(status, 422, "unknown pending payment: body={body}");

    shutdown(runtime).await;
}

struct ServerRuntime {
    addr: std::net::SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_task: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for ServerRuntime {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.server_task.take() {
            task.abort();
        }
    }
}

async fn start_server(harness: &Harness) -> Option<ServerRuntime> {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(value) => value,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            eprintln!("skipping http test: cannot bind test listener in this environment");
            return None;
        }
        Err(err) => panic!("bind test listener: {err}"),
    };
    let addr = listener.local_addr().expect("read listener addr");

    let state = Arc::new(AppState {
        reconciler: harness.reconciler.clone(),
    });
    let app = router(state, 16 * 1024);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let server_task = tokio::spawn(async move {
        server.await.expect("run test server");
    });

    Some(ServerRuntime {
        addr,
        shutdown_tx: Some(shutdown_tx),
        server_task: Some(server_task),
    })
}

async fn shutdown(mut runtime: ServerRuntime) {
    if let Some(tx) = runtime.shutdown_tx.take() {
        let _ = tx.send(());
    }
    if let Some(task) = runtime.server_task.take() {
        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("wait for server task")
            .expect("join server task");
    }
}

async fn post_json(addr: std::net::SocketAddr, path: &str, body: String) -> (u16, String) {
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    send(addr, request).await
}

async fn get(addr: std::net::SocketAddr, path: &str) -> (u16, String) {
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    send(addr, request).await
}

async fn send(addr: std::net::SocketAddr, request: String) -> (u16, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect http socket");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("write http request");
    stream.flush().await.expect("flush http request");

    let mut response = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read_result = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut chunk))
            .await
            .expect("timed out while reading http response")
            .expect("read http response");
        if read_result == 0 {
            break;
        }
        response.extend_from_slice(&chunk[..read_result]);

        if let Some((header_end, content_length)) = response_content_len(response.as_slice())
            && response.len() >= header_end.saturating_add(content_length)
        {
            break;
        }
    }
    parse_http_response(response.as_slice())
}

fn parse_http_response(raw: &[u8]) -> (u16, String) {
    let text = String::from_utf8(raw.to_vec()).expect("http response utf8");
    let mut sections = text.splitn(2, "\r\n\r\n");
    let headers = sections.next().unwrap_or_default();
    let body = sections.next().unwrap_or_default().to_string();

    let status = headers
        .lines()
        .next()
        .expect("http status line")
        .split_whitespace()
        .nth(1)
        .expect("status code")
        .parse::<u16>()
        .expect("parse status code");
    (status, body)
}

fn response_content_len(raw: &[u8]) -> Option<(usize, usize)> {
    let header_end = raw.windows(4).position(|window| window == b"\r\n\r\n")? + 4;
    let headers = std::str::from_utf8(&raw[..header_end]).ok()?;
    let mut content_length = None;
    for line in headers.lines() {
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse::<usize>().ok();
            break;
        }
    }
    content_length.map(|len| (header_end, len))
}
