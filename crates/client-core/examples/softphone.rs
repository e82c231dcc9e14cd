//! A minimal softphone session against the in-process fakes: register,
//! place a call, let the scripted remote party answer, then hang up.
//!
//! Run with:
//! ```text
//! cargo run -p crossline-client-core --example softphone
//! ```

use async_trait::async_trait;
use crossline_client_core::{
    CallClient, CallEventHandler, CallState, ClientConfig, MediaStream, RegistrationData,
};
use crossline_infra_common::logging::{setup_logging, LoggingConfig};
use crossline_media_core::testing::FakeMediaEngine;
use crossline_media_core::IceConnectionState;
use crossline_session_core::testing::FakeSignalingClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

struct Printer;

#[async_trait]
impl CallEventHandler for Printer {
    async fn on_call_state_changed(&self, state: CallState) {
        info!(%state, "call state");
    }

    async fn on_local_stream(&self, stream: MediaStream) {
        info!(tracks = stream.tracks().len(), "local stream ready");
    }

    async fn on_remote_stream(&self, stream: MediaStream) {
        info!(tracks = stream.tracks().len(), "remote stream arrived");
    }

    async fn on_ended(&self) {
        info!("call ended");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registration = RegistrationData::new("pbx.example.com", "1004")
        .with_credentials("alice", "secret")
        .with_ws_url("wss://pbx.example.com:7443")
        .with_log_level("info");
    setup_logging(LoggingConfig::from_verbosity(&registration.log_level)?)?;

    let engine = Arc::new(FakeMediaEngine::new());
    let signaling = Arc::new(FakeSignalingClient::new());
    let client = CallClient::new(
        ClientConfig::new(),
        engine.clone(),
        signaling.clone(),
        Arc::new(Printer),
    );

    client.register(registration).await?;
    wait_for(&client, CallState::Registered).await;

    client.call("42").await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The fake engine never reaches real connectivity on its own; drive ICE
    // the way a network would.
    if let Some(connection) = engine.last_connection() {
        connection.set_ice_connection_state(IceConnectionState::Connected);
    }
    wait_for(&client, CallState::Connected).await;

    client.disconnect().await?;
    wait_for(&client, CallState::Disconnected).await;

    client.end().await?;
    Ok(())
}

async fn wait_for(client: &CallClient, state: CallState) {
    while client.current_state() != state {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
