//! Session channel seam
//!
//! The remote transport is an opaque collaborator: the engine only sees a
//! pair of bounded queues. Outbound sends suspend on transport
//! backpressure; inbound events arrive in delivery order. Dropping every
//! outbound sender is the close handshake: transports treat the closed
//! queue as "hang up".

use std::future::Future;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::protocol::{ChannelEvent, OutboundMedia};

/// The session's half of an open duplex channel
pub struct ChannelHandle {
    outbound: mpsc::Sender<OutboundMedia>,
    events: mpsc::Receiver<ChannelEvent>,
}

impl ChannelHandle {
    /// Send one media chunk, suspending while the transport is congested
    pub async fn send(&self, media: OutboundMedia) -> Result<(), ChannelError> {
        self.outbound
            .send(media)
            .await
            .map_err(|_| ChannelError::SendFailed("transport gone".into()))
    }

    /// Split into an outbound sender (clonable, one per producer loop) and
    /// the inbound event stream
    pub fn split(self) -> (mpsc::Sender<OutboundMedia>, mpsc::Receiver<ChannelEvent>) {
        (self.outbound, self.events)
    }
}

/// The transport's half of the channel, produced by [`channel_pair`]
pub struct TransportEndpoint {
    /// Media the session wants transmitted; `None` from `recv` means the
    /// session closed the channel
    pub outbound: mpsc::Receiver<OutboundMedia>,
    /// Where the transport delivers inbound events
    pub events: mpsc::Sender<ChannelEvent>,
}

/// Create a connected handle/endpoint pair with bounded queues
pub fn channel_pair(capacity: usize) -> (ChannelHandle, TransportEndpoint) {
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let (events_tx, events_rx) = mpsc::channel(capacity);
    (
        ChannelHandle {
            outbound: outbound_tx,
            events: events_rx,
        },
        TransportEndpoint {
            outbound: outbound_rx,
            events: events_tx,
        },
    )
}

/// Opens the duplex channel to the remote endpoint.
///
/// Called once per session inside the connect timeout; a failed or
/// timed-out open ends the session before it ever becomes active.
pub trait ChannelConnector {
    fn open(&self) -> impl Future<Output = Result<ChannelHandle, ChannelError>> + Send;
}
