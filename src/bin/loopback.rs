//! Microphone-to-speaker loopback through an in-process echo transport.
//!
//! Exercises the whole pipeline without a remote agent: captured audio is
//! encoded, sent over the channel seam, echoed back as agent replies and
//! scheduled for playback. Ctrl-C hangs up.
//!
//! `RUST_LOG=debug cargo run --bin loopback` for verbose output.

use anyhow::Context;
use std::future::Future;
use tracing_subscriber::EnvFilter;

use live_call_engine::capture::SystemCapture;
use live_call_engine::channel::{channel_pair, ChannelConnector, ChannelHandle};
use live_call_engine::config::CallConfig;
use live_call_engine::error::ChannelError;
use live_call_engine::playback::SystemPlayback;
use live_call_engine::protocol::{ChannelEvent, OutboundMedia};
use live_call_engine::session::{CallMode, CallSession};

/// Transport that plays the role of the remote agent by echoing every
/// captured audio chunk straight back. Video frames are discarded.
struct LoopbackConnector {
    capacity: usize,
}

impl ChannelConnector for LoopbackConnector {
    fn open(&self) -> impl Future<Output = Result<ChannelHandle, ChannelError>> + Send {
        let capacity = self.capacity;
        async move {
            let (handle, mut endpoint) = channel_pair(capacity);

            tokio::spawn(async move {
                while let Some(media) = endpoint.outbound.recv().await {
                    let OutboundMedia::Audio(chunk) = media else {
                        continue;
                    };
                    // Echoed audio keeps the capture rate
                    if endpoint.events.send(ChannelEvent::Audio(chunk)).await.is_err() {
                        break;
                    }
                }
                let _ = endpoint
                    .events
                    .send(ChannelEvent::Closed {
                        reason: Some("loopback transport drained".into()),
                    })
                    .await;
            });

            Ok(handle)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CallConfig::load_or_default();

    let capture = SystemCapture::new(
        config.audio.input_sample_rate,
        config.audio.channels,
        config.audio.chunk_ms,
    );
    // The echo comes back at the capture rate, so the sink runs there too
    let sink = SystemPlayback::new(config.audio.input_sample_rate)
        .context("failed to open playback device")?;
    let connector = LoopbackConnector {
        capacity: config.channel_capacity,
    };

    let session = CallSession::connect(config, CallMode::VoiceOnly, &capture, sink, &connector)
        .await
        .context("failed to connect loopback session")?;

    tracing::info!(id = %session.id(), "loopback call running, Ctrl-C to hang up");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    session.hangup();
    session.wait_ended().await;
    tracing::info!(reason = ?session.end_reason(), "loopback call ended");

    Ok(())
}
