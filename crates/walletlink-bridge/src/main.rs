//! walletlink-bridge console
//!
//! - Loads `walletlink.yaml` (or the path given as the first argument)
//! - Connects lazily to the backend on the first call
//! - Reads one query per stdin line, calls concurrently, prints results
//!   and push notifications as JSON lines on stdout
//! - Optional ops server: /healthz, /readyz, /metrics

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use walletlink_core::error::{BridgeError, Result};
use walletlink_bridge::{app_state::AppState, config, router, Bridge};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        tracing::error!(code = e.code().as_str(), error = %e, "walletlink-bridge failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "walletlink.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let state = AppState::new(cfg);

    if let Some(listen) = state.cfg().ops.listen.as_deref() {
        let listen: SocketAddr = listen
            .parse()
            .map_err(|_| BridgeError::BadRequest("ops.listen must be a valid SocketAddr".into()))?;
        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .map_err(|e| BridgeError::Internal(format!("ops bind failed: {e}")))?;
        let app = router::build_ops_router(state.clone());
        tracing::info!(%listen, "ops endpoints listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "ops server failed");
            }
        });
    }

    let bridge = state.bridge();
    let pushes = bridge.subscribe(|msg| println!("{}", json!({ "push": msg })));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut inflight = FuturesUnordered::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.map_err(|e| BridgeError::Internal(format!("stdin read failed: {e}")))?;
                let Some(query) = line else { break; };
                let query = query.trim().to_string();
                if query.is_empty() {
                    continue;
                }
                inflight.push(issue(Arc::clone(&bridge), query));
            }
            Some((query, res)) = inflight.next(), if !inflight.is_empty() => {
                print_result(&query, res);
            }
        }
    }

    while let Some((query, res)) = inflight.next().await {
        print_result(&query, res);
    }

    pushes.unsubscribe();
    tracing::info!(
        constructions = bridge.channel_constructions(),
        "stdin closed; shutting down"
    );
    Ok(())
}

async fn issue(bridge: Arc<Bridge>, query: String) -> (String, Result<Value>) {
    let res = bridge.call(&query).await;
    (query, res)
}

fn print_result(query: &str, res: Result<Value>) {
    let line = match res {
        Ok(v) => json!({ "query": query, "response": v }),
        Err(e) => json!({
            "query": query,
            "error": { "code": e.code().as_str(), "msg": e.to_string() }
        }),
    };
    println!("{line}");
}
