//! Two contexts exchanging an RPC over an in-memory hub.
//!
//! Run with: `cargo run --example ping_pong`

use std::time::Duration;

use serde_json::json;

use crosspane::{ContextId, InMemoryHub, MessageBus, PeerPolicy, RpcClient, RpcServer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async {
        let hub = InMemoryHub::new();
        let host_id = ContextId::new("host")?;
        let frame_id = ContextId::new("frame")?;

        let host_bus = MessageBus::new(
            host_id.clone(),
            hub.endpoint(&host_id),
            PeerPolicy::allow([frame_id.clone()]),
        );
        let frame_bus = MessageBus::new(
            frame_id.clone(),
            hub.endpoint(&frame_id),
            PeerPolicy::allow([host_id.clone()]),
        );
        hub.attach(&host_bus);
        hub.attach(&frame_bus);

        // The frame answers "ping" with "pong" plus whatever it was sent.
        let server = RpcServer::new(&frame_bus);
        server.define("ping", |args, reply| {
            tracing::info!(?args, "frame received ping");
            let mut response = vec![json!("pong")];
            response.extend(args);
            if let Err(error) = reply.send(response) {
                tracing::warn!(%error, "reply failed");
            }
        });

        let client = RpcClient::new(&host_bus, frame_id);
        let response = client
            .call_with_timeout("ping", vec![json!(1)], Duration::from_secs(5))
            .await?;
        tracing::info!(?response, "host received response");

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
